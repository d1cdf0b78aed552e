// ---------------------------------------------------------------------------
// Content cache
// ---------------------------------------------------------------------------
//
// Bounded map of file path -> text. When an insert would exceed the byte
// ceiling, the lowest 20% of entries (by count) are swept, ordered by
// `(access_count, last_access)` ascending. If that still leaves too little
// room, the insert is declined. `current_size` never exceeds `max_size`.
//
// The entries persist to `file_cache.json` as `{cache, size, last_update}`.
// On load the byte count is recomputed from the contents; the stored `size`
// is informational only.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VfmError;
use crate::path::is_within;

pub const DEFAULT_CACHE_LIMIT: u64 = 50 * 1024 * 1024;
pub const CACHE_FILE: &str = "file_cache.json";

/// Fraction of entries dropped by one eviction sweep.
const EVICTION_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
	pub content: String,
	#[serde(rename = "size", default)]
	pub size_bytes: u64,
	/// Logical clock value of the last get/put.
	#[serde(default)]
	pub last_access: u64,
	#[serde(default)]
	pub access_count: u64,
}

#[derive(Serialize, Deserialize)]
struct CacheDocument {
	#[serde(default)]
	cache: BTreeMap<String, Value>,
	#[serde(default)]
	size: u64,
	#[serde(default)]
	last_update: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
	pub hits: u64,
	pub misses: u64,
	/// Percent in `[0, 100]`; 0 when nothing has been requested.
	pub hit_rate: f64,
	pub entries: usize,
	pub current_size: u64,
	pub max_size: u64,
}

#[derive(Debug, Clone)]
pub struct ContentCache {
	entries: HashMap<String, CacheEntry>,
	current_size: u64,
	max_size: u64,
	hits: u64,
	misses: u64,
	clock: u64,
}

impl Default for ContentCache {
	fn default() -> Self {
		Self::new(DEFAULT_CACHE_LIMIT)
	}
}

impl ContentCache {
	pub fn new(max_size: u64) -> Self {
		Self {
			entries: HashMap::new(),
			current_size: 0,
			max_size,
			hits: 0,
			misses: 0,
			clock: 0,
		}
	}

	fn tick(&mut self) -> u64 {
		self.clock += 1;
		self.clock
	}

	/// Look up `path`. Counts a hit or a miss.
	pub fn get(&mut self, path: &str) -> Option<String> {
		let now = self.tick();
		match self.entries.get_mut(path) {
			Some(entry) => {
				entry.access_count += 1;
				entry.last_access = now;
				self.hits += 1;
				Some(entry.content.clone())
			}
			None => {
				self.misses += 1;
				None
			}
		}
	}

	/// Insert or replace `path`. Returns false if the content was declined.
	pub fn put(&mut self, path: &str, content: &str) -> bool {
		self.remove(path);
		let size = content.len() as u64;
		if size > self.max_size {
			tracing::debug!(path, size, "Content larger than cache, not cached");
			return false;
		}
		if self.current_size + size > self.max_size {
			self.evict();
			if self.current_size + size > self.max_size {
				tracing::debug!(path, size, "Cache full after eviction, not cached");
				return false;
			}
		}
		let now = self.tick();
		self.entries.insert(
			path.to_string(),
			CacheEntry {
				content: content.to_string(),
				size_bytes: size,
				last_access: now,
				access_count: 1,
			},
		);
		self.current_size += size;
		true
	}

	/// Drop the coldest 20% of entries (at least one).
	fn evict(&mut self) {
		if self.entries.is_empty() {
			return;
		}
		let mut order: Vec<(&String, u64, u64)> = self
			.entries
			.iter()
			.map(|(k, e)| (k, e.access_count, e.last_access))
			.collect();
		order.sort_by_key(|&(_, count, last)| (count, last));
		let n = ((self.entries.len() as f64 * EVICTION_FRACTION) as usize).max(1);
		let victims: Vec<String> = order.into_iter().take(n).map(|(k, _, _)| k.clone()).collect();
		for key in &victims {
			self.remove(key);
		}
		tracing::debug!(evicted = victims.len(), remaining = self.entries.len(), "Cache eviction");
	}

	/// Remove one entry. Returns the freed byte count.
	pub fn remove(&mut self, path: &str) -> Option<u64> {
		let entry = self.entries.remove(path)?;
		self.current_size -= entry.size_bytes;
		Some(entry.size_bytes)
	}

	/// Remove `dir_path` and every entry below it. Returns how many went.
	pub fn invalidate_prefix(&mut self, dir_path: &str) -> usize {
		let keys: Vec<String> = self
			.entries
			.keys()
			.filter(|k| is_within(k, dir_path))
			.cloned()
			.collect();
		for key in &keys {
			self.remove(key);
		}
		keys.len()
	}

	/// Keep only the entries for which `keep(path, content)` holds.
	/// Returns how many were dropped.
	pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) -> usize {
		let before = self.entries.len();
		let mut freed = 0;
		self.entries.retain(|path, entry| {
			let kept = keep(path, &entry.content);
			if !kept {
				freed += entry.size_bytes;
			}
			kept
		});
		self.current_size -= freed;
		before - self.entries.len()
	}

	pub fn contains(&self, path: &str) -> bool {
		self.entries.contains_key(path)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn current_size(&self) -> u64 {
		self.current_size
	}

	pub fn max_size(&self) -> u64 {
		self.max_size
	}

	pub fn hit_rate(&self) -> f64 {
		let total = self.hits + self.misses;
		if total == 0 {
			0.0
		} else {
			self.hits as f64 / total as f64 * 100.0
		}
	}

	pub fn stats(&self) -> CacheStats {
		CacheStats {
			hits: self.hits,
			misses: self.misses,
			hit_rate: self.hit_rate(),
			entries: self.entries.len(),
			current_size: self.current_size,
			max_size: self.max_size,
		}
	}

	// -- Persistence ------------------------------------------------------

	/// Read `file_cache.json` from `data_dir`. A missing or unreadable file
	/// gives an empty cache. Entries are admitted hottest first until
	/// `max_size` is reached; the rest are dropped.
	pub fn load(data_dir: &Path, max_size: u64) -> Self {
		let mut cache = Self::new(max_size);
		let path = data_dir.join(CACHE_FILE);
		let Ok(raw) = fs::read_to_string(&path) else {
			return cache;
		};
		let doc: CacheDocument = match serde_json::from_str(&raw) {
			Ok(doc) => doc,
			Err(e) => {
				tracing::warn!(path = %path.display(), error = %e, "Failed to parse content cache");
				return cache;
			}
		};

		let total = doc.cache.len();
		let mut entries: Vec<(String, CacheEntry)> = doc
			.cache
			.into_iter()
			.filter_map(|(key, value)| serde_json::from_value(value).ok().map(|e| (key, e)))
			.collect();
		entries.sort_by(|(_, a), (_, b)| {
			(b.access_count, b.last_access).cmp(&(a.access_count, a.last_access))
		});
		for (key, mut entry) in entries {
			entry.size_bytes = entry.content.len() as u64;
			if cache.current_size + entry.size_bytes > cache.max_size {
				continue;
			}
			cache.clock = cache.clock.max(entry.last_access);
			cache.current_size += entry.size_bytes;
			cache.entries.insert(key, entry);
		}
		if cache.entries.len() < total || doc.size != cache.current_size {
			tracing::debug!(
				stored = total,
				loaded = cache.entries.len(),
				stored_size = doc.size,
				size = cache.current_size,
				"Content cache adjusted on load"
			);
		}
		cache
	}

	pub fn save(&self, data_dir: &Path) -> Result<(), VfmError> {
		fs::create_dir_all(data_dir)?;
		let doc = CacheDocument {
			cache: self
				.entries
				.iter()
				.map(|(key, entry)| serde_json::to_value(entry).map(|v| (key.clone(), v)))
				.collect::<Result<_, _>>()?,
			size: self.current_size,
			last_update: Some(Utc::now().to_rfc3339()),
		};
		fs::write(data_dir.join(CACHE_FILE), serde_json::to_string_pretty(&doc)?)?;
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
