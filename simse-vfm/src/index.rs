// ---------------------------------------------------------------------------
// Name index: lower-cased file name and `*.ext` -> file paths
// ---------------------------------------------------------------------------
//
// Built only by a full `rebuild` over the tree. It is not maintained on
// mutation, so results may be stale until the next rebuild.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::VfmError;
use crate::node::Node;
use crate::tree::Tree;

pub const INDEX_FILE: &str = "file_index.json";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameIndex {
	keys: BTreeMap<String, BTreeSet<String>>,
}

/// Index keys for a file name: the lower-cased name, plus `*.<ext>` when
/// the name contains a dot.
pub fn index_keys(name: &str) -> Vec<String> {
	let lower = name.to_lowercase();
	let mut keys = Vec::with_capacity(2);
	if let Some((_, ext)) = lower.rsplit_once('.') {
		keys.push(format!("*.{}", ext));
	}
	keys.insert(0, lower);
	keys
}

impl NameIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the contents with a fresh walk of `tree`.
	pub fn rebuild(&mut self, tree: &Tree) {
		self.keys.clear();
		for id in tree.preorder(tree.root()) {
			if let Some(Node::File(f)) = tree.get(id) {
				for key in index_keys(&f.meta.name) {
					self.keys.entry(key).or_default().insert(f.meta.path.clone());
				}
			}
		}
		tracing::debug!(keys = self.keys.len(), "Name index rebuilt");
	}

	/// Exact key hits plus every key containing `query` as a substring.
	/// Case-insensitive; deduplicated and sorted.
	pub fn search(&self, query: &str) -> Vec<String> {
		let query = query.to_lowercase();
		if query.is_empty() {
			return Vec::new();
		}
		let mut out = BTreeSet::new();
		for (key, paths) in &self.keys {
			if key.contains(&query) {
				out.extend(paths.iter().cloned());
			}
		}
		out.into_iter().collect()
	}

	/// Number of distinct keys.
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	// -- Persistence ------------------------------------------------------

	pub fn load(data_dir: &Path) -> Self {
		let path = data_dir.join(INDEX_FILE);
		let Ok(raw) = fs::read_to_string(&path) else {
			return Self::default();
		};
		match serde_json::from_str::<BTreeMap<String, BTreeSet<String>>>(&raw) {
			Ok(keys) => Self { keys },
			Err(e) => {
				tracing::warn!(path = %path.display(), error = %e, "Failed to parse name index");
				Self::default()
			}
		}
	}

	pub fn save(&self, data_dir: &Path) -> Result<(), VfmError> {
		fs::create_dir_all(data_dir)?;
		fs::write(data_dir.join(INDEX_FILE), serde_json::to_string_pretty(&self.keys)?)?;
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn tree() -> Tree {
		let mut tree = Tree::new();
		let root = tree.root();
		let home = tree.insert_child(root, Node::directory("home")).unwrap();
		tree.insert_child(home, Node::file("Report.TXT", "", None)).unwrap();
		tree.insert_child(home, Node::file("notes.txt", "", None)).unwrap();
		tree.insert_child(home, Node::file("Makefile", "", None)).unwrap();
		let sub = tree.insert_child(home, Node::directory("report")).unwrap();
		tree.insert_child(sub, Node::file("report.txt", "", None)).unwrap();
		tree
	}

	#[test]
	fn keys_include_extension_wildcard() {
		assert_eq!(index_keys("Report.TXT"), vec!["report.txt", "*.txt"]);
		assert_eq!(index_keys("Makefile"), vec!["makefile"]);
	}

	#[test]
	fn rebuild_indexes_files_only() {
		let mut idx = NameIndex::new();
		idx.rebuild(&tree());
		let txt = idx.keys.get("*.txt").unwrap();
		assert_eq!(txt.len(), 3);
		assert!(idx.keys.get("report").is_none());
		let report = idx.keys.get("report.txt").unwrap();
		assert!(report.contains("/home/Report.TXT"));
		assert!(report.contains("/home/report/report.txt"));
	}

	#[test]
	fn search_merges_exact_and_substring_hits() {
		let mut idx = NameIndex::new();
		idx.rebuild(&tree());
		let hits = idx.search("REPORT");
		assert_eq!(
			hits,
			vec!["/home/Report.TXT".to_string(), "/home/report/report.txt".to_string()]
		);
		assert_eq!(idx.search("make"), vec!["/home/Makefile".to_string()]);
		assert!(idx.search("").is_empty());
	}

	#[test]
	fn index_goes_stale_until_rebuilt() {
		let mut t = tree();
		let mut idx = NameIndex::new();
		idx.rebuild(&t);
		let home = t.resolve("/home").unwrap();
		t.insert_child(home, Node::file("late.md", "", None)).unwrap();
		assert!(idx.search("late").is_empty());
		idx.rebuild(&t);
		assert_eq!(idx.search("late"), vec!["/home/late.md".to_string()]);
	}

	#[test]
	fn save_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let mut idx = NameIndex::new();
		idx.rebuild(&tree());
		idx.save(dir.path()).unwrap();
		assert_eq!(NameIndex::load(dir.path()), idx);
	}
}
