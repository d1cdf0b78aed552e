// ---------------------------------------------------------------------------
// Access log: bounded journal of operation outcomes
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VfmError;

pub const LOG_FILE: &str = "system_log.json";
pub const DEFAULT_LOG_CAPACITY: usize = 1000;
const TOP_PATHS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
	Read,
	Write,
	Create,
	CreateDir,
	Delete,
	Rename,
	Copy,
	Move,
	SetHidden,
	ClipboardCopy,
	ClipboardCut,
	Paste,
}

impl Operation {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Write => "write",
			Self::Create => "create",
			Self::CreateDir => "create_dir",
			Self::Delete => "delete",
			Self::Rename => "rename",
			Self::Copy => "copy",
			Self::Move => "move",
			Self::SetHidden => "set_hidden",
			Self::ClipboardCopy => "clipboard_copy",
			Self::ClipboardCut => "clipboard_cut",
			Self::Paste => "paste",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
	#[serde(with = "log_timestamp")]
	pub timestamp: DateTime<Utc>,
	#[serde(rename = "file_path", alias = "path")]
	pub path: String,
	pub operation: Operation,
	pub username: String,
	#[serde(default = "default_success")]
	pub success: bool,
}

fn default_success() -> bool {
	true
}

/// RFC 3339 on output. Input may also be a naive ISO timestamp, read as
/// local time.
mod log_timestamp {
	use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&ts.to_rfc3339())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
		let raw = String::deserialize(d)?;
		if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
			return Ok(ts.with_timezone(&Utc));
		}
		let naive = raw
			.parse::<NaiveDateTime>()
			.map_err(serde::de::Error::custom)?;
		Local
			.from_local_datetime(&naive)
			.earliest()
			.map(|ts| ts.with_timezone(&Utc))
			.ok_or_else(|| serde::de::Error::custom("nonexistent local time"))
	}
}

/// Aggregate over a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSummary {
	pub window_hours: i64,
	pub total_operations: usize,
	pub by_operation: BTreeMap<String, usize>,
	pub by_user: BTreeMap<String, usize>,
	/// `(path, count)`, most frequent first.
	pub top_paths: Vec<(String, usize)>,
}

#[derive(Serialize, Deserialize)]
struct LogDocument {
	#[serde(default)]
	access_log: Vec<Value>,
	#[serde(default)]
	last_update: Option<String>,
}

// ---------------------------------------------------------------------------
// AccessLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AccessLog {
	entries: VecDeque<AccessLogEntry>,
	capacity: usize,
}

impl Default for AccessLog {
	fn default() -> Self {
		Self::new(DEFAULT_LOG_CAPACITY)
	}
}

impl AccessLog {
	pub fn new(capacity: usize) -> Self {
		Self {
			entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
			capacity,
		}
	}

	pub fn record(&mut self, path: &str, operation: Operation, username: &str, success: bool) {
		self.push(AccessLogEntry {
			timestamp: Utc::now(),
			path: path.to_string(),
			operation,
			username: username.to_string(),
			success,
		});
	}

	/// Append, dropping the oldest entry once at capacity.
	pub fn push(&mut self, entry: AccessLogEntry) {
		if self.capacity == 0 {
			return;
		}
		while self.entries.len() >= self.capacity {
			self.entries.pop_front();
		}
		self.entries.push_back(entry);
	}

	pub fn entries(&self) -> impl Iterator<Item = &AccessLogEntry> {
		self.entries.iter()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn summarize(&self, window_hours: i64) -> AccessSummary {
		self.summarize_at(Utc::now(), window_hours)
	}

	/// A negative window behaves like zero; one reaching past the
	/// representable range covers every entry.
	pub fn summarize_at(&self, now: DateTime<Utc>, window_hours: i64) -> AccessSummary {
		let cutoff = window_start(now, Duration::try_hours(window_hours.max(0)));
		let mut by_operation = BTreeMap::new();
		let mut by_user = BTreeMap::new();
		let mut by_path: HashMap<&str, usize> = HashMap::new();
		let mut total = 0;

		for entry in self
			.entries
			.iter()
			.filter(|e| cutoff.is_none_or(|c| e.timestamp >= c))
		{
			total += 1;
			*by_operation.entry(entry.operation.as_str().to_string()).or_insert(0) += 1;
			*by_user.entry(entry.username.clone()).or_insert(0) += 1;
			*by_path.entry(entry.path.as_str()).or_insert(0) += 1;
		}

		let mut top_paths: Vec<(String, usize)> = by_path
			.into_iter()
			.map(|(p, c)| (p.to_string(), c))
			.collect();
		top_paths.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		top_paths.truncate(TOP_PATHS);

		AccessSummary {
			window_hours,
			total_operations: total,
			by_operation,
			by_user,
			top_paths,
		}
	}

	/// Drop entries older than `days`. Returns how many were removed.
	pub fn cleanup_older_than(&mut self, days: i64) -> usize {
		self.cleanup_older_than_at(Utc::now(), days)
	}

	/// Negative `days` behave like zero; a retention reaching past the
	/// representable range keeps everything.
	pub fn cleanup_older_than_at(&mut self, now: DateTime<Utc>, days: i64) -> usize {
		let Some(cutoff) = window_start(now, Duration::try_days(days.max(0))) else {
			return 0;
		};
		let before = self.entries.len();
		self.entries.retain(|e| e.timestamp >= cutoff);
		before - self.entries.len()
	}

	// -- Persistence ------------------------------------------------------

	/// Load `data_dir/system_log.json`. Unreadable entries are skipped.
	pub fn load(data_dir: &Path, capacity: usize) -> Self {
		let mut log = Self::new(capacity);
		let path = log_path(data_dir);
		let raw = match fs::read_to_string(&path) {
			Ok(raw) => raw,
			Err(_) => return log,
		};
		let doc: LogDocument = match serde_json::from_str(&raw) {
			Ok(doc) => doc,
			Err(e) => {
				tracing::warn!(path = %path.display(), error = %e, "Failed to parse access log");
				return log;
			}
		};
		let mut skipped = 0usize;
		for value in doc.access_log {
			match serde_json::from_value::<AccessLogEntry>(value) {
				Ok(entry) => log.push(entry),
				Err(_) => skipped += 1,
			}
		}
		if skipped > 0 {
			tracing::warn!(skipped, "Skipped unreadable access log entries");
		}
		log
	}

	pub fn save(&self, data_dir: &Path) -> Result<(), VfmError> {
		fs::create_dir_all(data_dir)?;
		let doc = LogDocument {
			access_log: self
				.entries
				.iter()
				.map(serde_json::to_value)
				.collect::<Result<_, _>>()?,
			last_update: Some(Utc::now().to_rfc3339()),
		};
		fs::write(log_path(data_dir), serde_json::to_string_pretty(&doc)?)?;
		Ok(())
	}
}

/// `now - span`, or `None` when either the span or the result does not fit
/// in a timestamp (no lower bound).
fn window_start(now: DateTime<Utc>, span: Option<Duration>) -> Option<DateTime<Utc>> {
	span.and_then(|d| now.checked_sub_signed(d))
}

fn log_path(data_dir: &Path) -> PathBuf {
	data_dir.join(LOG_FILE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn entry_at(ts: DateTime<Utc>, path: &str, op: Operation, user: &str) -> AccessLogEntry {
		AccessLogEntry {
			timestamp: ts,
			path: path.into(),
			operation: op,
			username: user.into(),
			success: true,
		}
	}

	#[test]
	fn keeps_most_recent_entries() {
		let mut log = AccessLog::new(1000);
		for i in 0..1500 {
			log.record(&format!("/f{}", i), Operation::Read, "alice", true);
		}
		assert_eq!(log.len(), 1000);
		assert_eq!(log.entries().next().unwrap().path, "/f500");
		assert_eq!(log.entries().last().unwrap().path, "/f1499");
	}

	#[test]
	fn summarize_filters_by_window() {
		let now = Utc::now();
		let mut log = AccessLog::new(100);
		log.push(entry_at(now - Duration::hours(30), "/old", Operation::Read, "bob"));
		log.push(entry_at(now - Duration::hours(1), "/a", Operation::Read, "alice"));
		log.push(entry_at(now - Duration::hours(2), "/a", Operation::Write, "alice"));
		log.push(entry_at(now, "/b", Operation::Delete, "bob"));

		let s = log.summarize_at(now, 24);
		assert_eq!(s.total_operations, 3);
		assert_eq!(s.by_operation["read"], 1);
		assert_eq!(s.by_operation["write"], 1);
		assert_eq!(s.by_user["alice"], 2);
		assert_eq!(s.top_paths[0], ("/a".to_string(), 2));
		assert!(!s.top_paths.iter().any(|(p, _)| p == "/old"));
	}

	#[test]
	fn summarize_caps_top_paths() {
		let now = Utc::now();
		let mut log = AccessLog::new(100);
		for i in 0..15 {
			log.push(entry_at(now, &format!("/p{:02}", i), Operation::Read, "u"));
		}
		let s = log.summarize_at(now, 1);
		assert_eq!(s.top_paths.len(), 10);
		assert_eq!(s.top_paths[0].0, "/p00");
	}

	#[test]
	fn cleanup_removes_old_entries() {
		let now = Utc::now();
		let mut log = AccessLog::new(100);
		log.push(entry_at(now - Duration::days(40), "/old", Operation::Read, "u"));
		log.push(entry_at(now - Duration::days(1), "/new", Operation::Read, "u"));
		assert_eq!(log.cleanup_older_than(30), 1);
		assert_eq!(log.len(), 1);
	}

	#[test]
	fn huge_windows_cover_everything() {
		let now = Utc::now();
		let mut log = AccessLog::new(10);
		log.push(entry_at(now - Duration::days(4000), "/ancient", Operation::Read, "u"));
		log.push(entry_at(now, "/new", Operation::Read, "u"));

		assert_eq!(log.summarize_at(now, i64::MAX).total_operations, 2);
		assert_eq!(log.summarize_at(now, 1_000_000_000_000).total_operations, 2);
		assert_eq!(log.summarize_at(now, i64::MIN).total_operations, 1);

		assert_eq!(log.cleanup_older_than_at(now, i64::MAX), 0);
		assert_eq!(log.cleanup_older_than(i64::MAX), 0);
		assert_eq!(log.len(), 2);
	}

	#[test]
	fn negative_retention_drops_past_entries() {
		let now = Utc::now();
		let mut log = AccessLog::new(10);
		log.push(entry_at(now - Duration::hours(1), "/a", Operation::Read, "u"));
		log.push(entry_at(now, "/b", Operation::Read, "u"));
		assert_eq!(log.cleanup_older_than_at(now, i64::MIN), 1);
		assert_eq!(log.entries().next().unwrap().path, "/b");
	}

	#[test]
	fn save_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let mut log = AccessLog::new(10);
		log.record("/home/alice/a.txt", Operation::Create, "alice", true);
		log.record("/home/bob", Operation::Read, "alice", false);
		log.save(dir.path()).unwrap();

		let raw = fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
		let v: Value = serde_json::from_str(&raw).unwrap();
		assert_eq!(v["access_log"][0]["file_path"], "/home/alice/a.txt");
		assert!(v["last_update"].is_string());

		let loaded = AccessLog::load(dir.path(), 10);
		assert_eq!(loaded.len(), 2);
		assert!(!loaded.entries().nth(1).unwrap().success);
	}

	#[test]
	fn load_accepts_naive_timestamps_and_skips_junk() {
		let dir = tempfile::tempdir().unwrap();
		let raw = serde_json::json!({
			"access_log": [
				{"timestamp": "2024-03-01T10:00:00.123456", "file_path": "/a", "operation": "read", "username": "u", "success": true},
				{"timestamp": "nonsense", "file_path": "/b", "operation": "read", "username": "u"},
				{"timestamp": "2024-03-01T10:00:00+00:00", "file_path": "/c", "operation": "teleport", "username": "u"}
			],
			"last_update": "2024-03-01T10:00:00"
		});
		fs::write(dir.path().join(LOG_FILE), raw.to_string()).unwrap();
		let log = AccessLog::load(dir.path(), 10);
		assert_eq!(log.len(), 1);
		assert_eq!(log.entries().next().unwrap().path, "/a");
	}

	#[test]
	fn missing_file_loads_empty() {
		let dir = tempfile::tempdir().unwrap();
		assert!(AccessLog::load(dir.path(), 10).is_empty());
	}
}
