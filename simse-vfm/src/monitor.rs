// ---------------------------------------------------------------------------
// Monitor: disk usage, performance history and health scoring
// ---------------------------------------------------------------------------
//
// Host metrics (CPU, memory, disk) come from an external probe. Nothing in
// here samples the machine.
// ---------------------------------------------------------------------------

use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access_log::AccessSummary;
use crate::cache::ContentCache;
use crate::index::NameIndex;
use crate::node::Node;
use crate::tree::Tree;

pub const PERFORMANCE_HISTORY: usize = 100;
const LARGE_TREE_BYTES: u64 = 1024 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Metrics probe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
	#[serde(default)]
	pub cpu_percent: f64,
	#[serde(default)]
	pub memory_percent: f64,
	#[serde(default)]
	pub memory_available: u64,
	#[serde(default)]
	pub memory_total: u64,
	#[serde(default)]
	pub disk_percent: f64,
	#[serde(default)]
	pub disk_free: u64,
	#[serde(default)]
	pub disk_total: u64,
}

/// Supplies host metrics on demand.
pub trait MetricsProbe {
	fn sample(&self) -> SystemMetrics;
}

/// Probe that returns whatever a client last reported.
#[derive(Debug, Default)]
pub struct ReportedMetrics {
	latest: Cell<SystemMetrics>,
}

impl ReportedMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn report(&self, metrics: SystemMetrics) {
		self.latest.set(metrics);
	}
}

impl MetricsProbe for ReportedMetrics {
	fn sample(&self) -> SystemMetrics {
		self.latest.get()
	}
}

impl MetricsProbe for SystemMetrics {
	fn sample(&self) -> SystemMetrics {
		*self
	}
}

// ---------------------------------------------------------------------------
// Disk usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DirectoryUsage {
	pub files: usize,
	pub dirs: usize,
	pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OwnerUsage {
	pub files: usize,
	pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
	pub total_files: usize,
	pub total_dirs: usize,
	pub total_size: u64,
	/// Direct children of each directory, keyed by its path.
	pub directory_stats: BTreeMap<String, DirectoryUsage>,
	/// File count per lower-cased extension.
	pub file_type_stats: BTreeMap<String, usize>,
	/// Files owned per user; files without an owner count as `unknown`.
	pub user_stats: BTreeMap<String, OwnerUsage>,
}

pub fn disk_usage(tree: &Tree) -> DiskUsage {
	let mut usage = DiskUsage::default();
	for id in tree.preorder(tree.root()) {
		let Some(Node::Directory(dir)) = tree.get(id) else {
			continue;
		};
		usage.total_dirs += 1;
		let mut stats = DirectoryUsage::default();
		for &child in &dir.children {
			match tree.get(child) {
				Some(Node::File(f)) => {
					let size = f.size();
					stats.files += 1;
					stats.size += size;
					usage.total_files += 1;
					usage.total_size += size;
					if let Some((_, ext)) = f.meta.name.rsplit_once('.') {
						*usage.file_type_stats.entry(ext.to_lowercase()).or_insert(0) += 1;
					}
					let owner = f.owner.as_deref().unwrap_or("unknown");
					let entry = usage.user_stats.entry(owner.to_string()).or_default();
					entry.files += 1;
					entry.size += size;
				}
				Some(Node::Directory(_)) => stats.dirs += 1,
				None => {}
			}
		}
		usage.directory_stats.insert(dir.meta.path.clone(), stats);
	}
	usage
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
	pub timestamp: DateTime<Utc>,
	#[serde(flatten)]
	pub system: SystemMetrics,
	pub cache_hit_rate: f64,
	pub cache_size: u64,
	pub cache_entries: usize,
	pub index_entries: usize,
}

impl PerformanceStats {
	pub fn collect(system: SystemMetrics, cache: &ContentCache, index: &NameIndex) -> Self {
		Self {
			timestamp: Utc::now(),
			system,
			cache_hit_rate: cache.hit_rate(),
			cache_size: cache.current_size(),
			cache_entries: cache.len(),
			index_entries: index.len(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct PerformanceHistory {
	samples: VecDeque<PerformanceStats>,
	capacity: usize,
}

impl Default for PerformanceHistory {
	fn default() -> Self {
		Self::new(PERFORMANCE_HISTORY)
	}
}

impl PerformanceHistory {
	pub fn new(capacity: usize) -> Self {
		Self {
			samples: VecDeque::with_capacity(capacity),
			capacity,
		}
	}

	pub fn push(&mut self, stats: PerformanceStats) {
		if self.capacity == 0 {
			return;
		}
		while self.samples.len() >= self.capacity {
			self.samples.pop_front();
		}
		self.samples.push_back(stats);
	}

	pub fn samples(&self) -> impl Iterator<Item = &PerformanceStats> {
		self.samples.iter()
	}

	pub fn len(&self) -> usize {
		self.samples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.samples.is_empty()
	}
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Score in `[0, 100]`.
pub fn health_score(perf: &PerformanceStats) -> u8 {
	let mut score: i32 = 100;

	if perf.system.cpu_percent > 80.0 {
		score -= 20;
	} else if perf.system.cpu_percent > 60.0 {
		score -= 10;
	}

	if perf.system.memory_percent > 90.0 {
		score -= 20;
	} else if perf.system.memory_percent > 80.0 {
		score -= 10;
	}

	if perf.cache_hit_rate < 50.0 {
		score -= 15;
	} else if perf.cache_hit_rate < 70.0 {
		score -= 5;
	}

	score.clamp(0, 100) as u8
}

pub fn recommendations(perf: &PerformanceStats, usage: &DiskUsage) -> Vec<String> {
	let mut out = Vec::new();
	if perf.system.cpu_percent > 80.0 {
		out.push("CPU usage is high; close unnecessary programs".to_string());
	}
	if perf.system.memory_percent > 90.0 {
		out.push("Memory usage is high; free memory or add more".to_string());
	}
	if perf.cache_hit_rate < 50.0 {
		out.push("Cache hit rate is low; raise the cache limit or revisit access patterns".to_string());
	}
	if usage.total_size > LARGE_TREE_BYTES {
		out.push("File system is large; clean up unused files".to_string());
	}
	out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
	pub health_score: u8,
	pub performance: PerformanceStats,
	pub disk_usage: DiskUsage,
	pub access_summary: AccessSummary,
	pub recommendations: Vec<String>,
}

impl HealthReport {
	pub fn build(performance: PerformanceStats, disk_usage: DiskUsage, access_summary: AccessSummary) -> Self {
		Self {
			health_score: health_score(&performance),
			recommendations: recommendations(&performance, &disk_usage),
			performance,
			disk_usage,
			access_summary,
		}
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn perf(cpu: f64, mem: f64, hit_rate: f64) -> PerformanceStats {
		PerformanceStats {
			timestamp: Utc::now(),
			system: SystemMetrics {
				cpu_percent: cpu,
				memory_percent: mem,
				..Default::default()
			},
			cache_hit_rate: hit_rate,
			cache_size: 0,
			cache_entries: 0,
			index_entries: 0,
		}
	}

	#[test]
	fn healthy_system_scores_100() {
		assert_eq!(health_score(&perf(10.0, 20.0, 95.0)), 100);
	}

	#[test]
	fn score_bands() {
		assert_eq!(health_score(&perf(85.0, 20.0, 95.0)), 80);
		assert_eq!(health_score(&perf(65.0, 20.0, 95.0)), 90);
		assert_eq!(health_score(&perf(10.0, 95.0, 95.0)), 80);
		assert_eq!(health_score(&perf(10.0, 85.0, 95.0)), 90);
		assert_eq!(health_score(&perf(10.0, 20.0, 40.0)), 85);
		assert_eq!(health_score(&perf(10.0, 20.0, 60.0)), 95);
		assert_eq!(health_score(&perf(99.0, 99.0, 0.0)), 45);
	}

	#[test]
	fn recommendations_follow_thresholds() {
		let usage = DiskUsage {
			total_size: 2 * LARGE_TREE_BYTES,
			..Default::default()
		};
		assert_eq!(recommendations(&perf(90.0, 95.0, 10.0), &usage).len(), 4);
		assert!(recommendations(&perf(10.0, 10.0, 90.0), &DiskUsage::default()).is_empty());
	}

	#[test]
	fn disk_usage_walks_tree() {
		let mut tree = Tree::new();
		let root = tree.root();
		let home = tree.insert_child(root, Node::directory("home")).unwrap();
		tree.insert_child(home, Node::file("a.TXT", "1234", Some("alice".into())))
			.unwrap();
		tree.insert_child(home, Node::file("b.txt", "12", None)).unwrap();
		let sub = tree.insert_child(home, Node::directory("sub")).unwrap();
		tree.insert_child(sub, Node::file("c.md", "1", Some("alice".into())))
			.unwrap();

		let usage = disk_usage(&tree);
		assert_eq!(usage.total_files, 3);
		assert_eq!(usage.total_dirs, 3);
		assert_eq!(usage.total_size, 7);
		assert_eq!(usage.directory_stats["/home"], DirectoryUsage { files: 2, dirs: 1, size: 6 });
		assert_eq!(usage.directory_stats["/"].dirs, 1);
		assert_eq!(usage.file_type_stats["txt"], 2);
		assert_eq!(usage.user_stats["alice"], OwnerUsage { files: 2, size: 5 });
		assert_eq!(usage.user_stats["unknown"].files, 1);
	}

	#[test]
	fn history_is_bounded() {
		let mut h = PerformanceHistory::new(3);
		for i in 0..5 {
			h.push(perf(i as f64, 0.0, 0.0));
		}
		assert_eq!(h.len(), 3);
		assert_eq!(h.samples().next().unwrap().system.cpu_percent, 2.0);
	}

	#[test]
	fn reported_probe_returns_last_report() {
		let probe = ReportedMetrics::new();
		assert_eq!(probe.sample(), SystemMetrics::default());
		probe.report(SystemMetrics {
			cpu_percent: 42.0,
			..Default::default()
		});
		assert_eq!(probe.sample().cpu_percent, 42.0);
	}

	#[test]
	fn performance_serializes_flat() {
		let v = serde_json::to_value(perf(1.0, 2.0, 3.0)).unwrap();
		assert_eq!(v["cpuPercent"], 1.0);
		assert_eq!(v["cacheHitRate"], 3.0);
	}
}
