// ---------------------------------------------------------------------------
// Tree: arena of nodes with a directory path index
// ---------------------------------------------------------------------------
//
// Nodes live in `slots` and are addressed by `NodeId`. Each directory keeps
// its children in insertion order. `dir_index` maps every directory's
// absolute path to its id, so `resolve` never walks segments. Stored node
// paths are always re-derived from the parent chain; they are never patched
// by string replacement.
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use crate::node::{now, Node, NodeId, NodeKind, SnapshotNode};
use crate::path::{copy_name, join, normalize_path, DEFAULT_COPY_SUFFIX, ROOT_NAME, ROOT_PATH};

#[derive(Debug, Clone)]
struct Slot {
	node: Node,
	parent: Option<NodeId>,
}

/// Structural counts for a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
	pub node_count: usize,
	pub file_count: usize,
	pub directory_count: usize,
	pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct Tree {
	slots: Vec<Option<Slot>>,
	free: Vec<usize>,
	dir_index: HashMap<String, NodeId>,
	root: NodeId,
}

impl Default for Tree {
	fn default() -> Self {
		Self::new()
	}
}

impl Tree {
	// -- Construction -----------------------------------------------------

	/// An empty tree holding only the root directory.
	pub fn new() -> Self {
		let mut root = Node::directory(ROOT_NAME);
		root.meta_mut().path = ROOT_PATH.to_string();
		let mut dir_index = HashMap::new();
		dir_index.insert(ROOT_PATH.to_string(), NodeId(0));
		Self {
			slots: vec![Some(Slot {
				node: root,
				parent: None,
			})],
			free: Vec::new(),
			dir_index,
			root: NodeId(0),
		}
	}

	/// Build a tree from a snapshot root. The root is forced to be named
	/// `root` at `/`; every other path is re-derived from the structure.
	/// A later sibling that repeats an earlier same-kind name is renamed
	/// to the next free copy name. Returns `None` if the snapshot root is
	/// not a directory.
	pub fn from_snapshot(root: SnapshotNode) -> Option<Self> {
		if root.kind() != NodeKind::Directory {
			return None;
		}
		let (mut root_node, children) = root.into_parts();
		root_node.meta_mut().name = ROOT_NAME.to_string();
		root_node.meta_mut().path = ROOT_PATH.to_string();

		let mut tree = Self::new();
		tree.slots[0] = Some(Slot {
			node: root_node,
			parent: None,
		});
		let root_id = tree.root;
		for child in children {
			tree.graft_subtree(root_id, child, None, false, Some(DEFAULT_COPY_SUFFIX));
		}
		Some(tree)
	}

	// -- Basic access -----------------------------------------------------

	pub fn root(&self) -> NodeId {
		self.root
	}

	pub fn get(&self, id: NodeId) -> Option<&Node> {
		self.slots
			.get(id.0)
			.and_then(|s| s.as_ref())
			.map(|s| &s.node)
	}

	pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
		self.slots
			.get_mut(id.0)
			.and_then(|s| s.as_mut())
			.map(|s| &mut s.node)
	}

	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.slots.get(id.0).and_then(|s| s.as_ref()).and_then(|s| s.parent)
	}

	pub fn children(&self, id: NodeId) -> &[NodeId] {
		self.get(id).map(|n| n.children()).unwrap_or(&[])
	}

	pub fn len(&self) -> usize {
		self.slots.len() - self.free.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	// -- Navigation -------------------------------------------------------

	/// Resolve a path to a directory. Only directories are addressable by
	/// path; a file path or any missing segment yields `None`.
	pub fn resolve(&self, path: &str) -> Option<NodeId> {
		if path == ROOT_PATH {
			return Some(self.root);
		}
		self.dir_index.get(&normalize_path(path)).copied()
	}

	/// Linear scan of a directory's children in insertion order. With
	/// `kind`, only nodes of that kind match, so a file and a directory may
	/// share a name.
	pub fn find_child(
		&self,
		parent: NodeId,
		name: &str,
		kind: Option<NodeKind>,
	) -> Option<(usize, NodeId)> {
		self.children(parent)
			.iter()
			.enumerate()
			.find(|(_, &id)| {
				self.get(id)
					.is_some_and(|n| n.name() == name && kind.is_none_or(|k| n.kind() == k))
			})
			.map(|(i, &id)| (i, id))
	}

	/// First name free for `kind` under `parent`: `name` itself, then
	/// `name - <suffix>`, `name - <suffix>2`, ... File extensions are kept
	/// after the suffix.
	pub fn free_name(&self, parent: NodeId, name: &str, kind: NodeKind, suffix: &str) -> String {
		if self.find_child(parent, name, Some(kind)).is_none() {
			return name.to_string();
		}
		let keep_extension = kind == NodeKind::File;
		let mut attempt = 1;
		loop {
			let candidate = copy_name(name, attempt, suffix, keep_extension);
			if self.find_child(parent, &candidate, Some(kind)).is_none() {
				return candidate;
			}
			attempt += 1;
		}
	}

	/// Ids of the subtree rooted at `id`, parents before children.
	pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack = vec![id];
		while let Some(current) = stack.pop() {
			if self.get(current).is_none() {
				continue;
			}
			out.push(current);
			for &child in self.children(current).iter().rev() {
				stack.push(child);
			}
		}
		out
	}

	/// True if `id` is `ancestor` or lies below it.
	pub fn is_descendant_or_self(&self, id: NodeId, ancestor: NodeId) -> bool {
		let mut current = Some(id);
		while let Some(c) = current {
			if c == ancestor {
				return true;
			}
			current = self.parent(c);
		}
		false
	}

	pub fn stats(&self) -> TreeStats {
		let mut stats = TreeStats::default();
		for id in self.preorder(self.root) {
			stats.node_count += 1;
			match self.get(id) {
				Some(Node::Directory(_)) => stats.directory_count += 1,
				Some(Node::File(f)) => {
					stats.file_count += 1;
					stats.total_size += f.size();
				}
				None => {}
			}
		}
		stats
	}

	// -- Structural mutation ----------------------------------------------

	fn allocate(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
		let slot = Some(Slot { node, parent });
		match self.free.pop() {
			Some(i) => {
				self.slots[i] = slot;
				NodeId(i)
			}
			None => {
				self.slots.push(slot);
				NodeId(self.slots.len() - 1)
			}
		}
	}

	/// Append `node` as the last child of `parent`, deriving its path.
	/// Returns `None` if `parent` is not a live directory. Name uniqueness
	/// is the caller's responsibility.
	pub fn insert_child(&mut self, parent: NodeId, mut node: Node) -> Option<NodeId> {
		let parent_path = match self.get(parent) {
			Some(Node::Directory(d)) => d.meta.path.clone(),
			_ => return None,
		};
		let path = join(&parent_path, node.name());
		node.meta_mut().path = path.clone();
		let is_dir = node.is_directory();
		let id = self.allocate(node, Some(parent));
		if is_dir {
			self.dir_index.insert(path, id);
		}
		if let Some(Node::Directory(d)) = self.get_mut(parent) {
			d.children.push(id);
		}
		Some(id)
	}

	/// Detach and free the subtree rooted at `id`. Returns the paths of every
	/// file that was removed. The root cannot be removed.
	pub fn remove(&mut self, id: NodeId) -> Vec<String> {
		if id == self.root {
			return Vec::new();
		}
		let ids = self.preorder(id);
		if let Some(parent) = self.parent(id) {
			if let Some(Node::Directory(d)) = self.get_mut(parent) {
				d.children.retain(|&c| c != id);
			}
		}
		let mut removed_files = Vec::new();
		for node_id in ids {
			if let Some(slot) = self.slots[node_id.0].take() {
				match slot.node {
					Node::Directory(d) => {
						if self.dir_index.get(&d.meta.path) == Some(&node_id) {
							self.dir_index.remove(&d.meta.path);
						}
					}
					Node::File(f) => removed_files.push(f.meta.path),
				}
				self.free.push(node_id.0);
			}
		}
		removed_files
	}

	/// Rename a node in place and re-derive the paths of its whole subtree.
	pub fn rename(&mut self, id: NodeId, new_name: &str) {
		if id == self.root {
			return;
		}
		if let Some(node) = self.get_mut(id) {
			let meta = node.meta_mut();
			meta.name = new_name.to_string();
			meta.modified_at = now();
		}
		self.rebase(id, false);
	}

	/// Re-derive `path` for `id` and every descendant from their parents,
	/// keeping `dir_index` in step. With `touch`, each rebased node's
	/// `modified_at` is set to now.
	pub fn rebase(&mut self, id: NodeId, touch: bool) {
		let ts = now();
		for node_id in self.preorder(id) {
			let parent_path = match self.parent(node_id).and_then(|p| self.get(p)) {
				Some(p) => p.path().to_string(),
				None => continue,
			};
			let Some(node) = self.get_mut(node_id) else {
				continue;
			};
			let new_path = join(&parent_path, node.name());
			let old_path = std::mem::replace(&mut node.meta_mut().path, new_path.clone());
			if touch {
				node.meta_mut().modified_at = ts;
			}
			if node.is_directory() {
				if self.dir_index.get(&old_path) == Some(&node_id) {
					self.dir_index.remove(&old_path);
				}
				self.dir_index.insert(new_path, node_id);
			}
		}
	}

	/// Set `modified_at` to now.
	pub fn touch(&mut self, id: NodeId) {
		if let Some(node) = self.get_mut(id) {
			node.meta_mut().modified_at = now();
		}
	}

	// -- Snapshots --------------------------------------------------------

	/// Deep, owned copy of the subtree rooted at `id`.
	pub fn snapshot(&self, id: NodeId) -> Option<SnapshotNode> {
		let node = self.get(id)?;
		let meta = node.meta();
		Some(match node {
			Node::Directory(d) => SnapshotNode::Directory {
				name: meta.name.clone(),
				path: meta.path.clone(),
				created: meta.created_at,
				modified: meta.modified_at,
				hidden: meta.hidden,
				children: d.children.iter().filter_map(|&c| self.snapshot(c)).collect(),
				extra: meta.extra.clone(),
			},
			Node::File(f) => SnapshotNode::File {
				name: meta.name.clone(),
				path: meta.path.clone(),
				created: meta.created_at,
				modified: meta.modified_at,
				hidden: meta.hidden,
				content: f.content.clone(),
				size: f.size(),
				owner: f.owner.clone(),
				extra: meta.extra.clone(),
			},
		})
	}

	/// Snapshot of the whole tree.
	pub fn to_snapshot(&self) -> Option<SnapshotNode> {
		self.snapshot(self.root)
	}

	/// Insert an owned subtree under `parent`, optionally renaming its top
	/// node. All paths are derived from `parent`; with `touch`, every grafted
	/// node's `modified_at` is set to now.
	pub fn graft(
		&mut self,
		parent: NodeId,
		subtree: SnapshotNode,
		rename_to: Option<&str>,
		touch: bool,
	) -> Option<NodeId> {
		self.graft_subtree(parent, subtree, rename_to, touch, None)
	}

	/// With `dedupe_suffix`, every node whose name is already taken by a
	/// same-kind sibling is renamed before insertion.
	fn graft_subtree(
		&mut self,
		parent: NodeId,
		subtree: SnapshotNode,
		rename_to: Option<&str>,
		touch: bool,
		dedupe_suffix: Option<&str>,
	) -> Option<NodeId> {
		let ts = now();
		let mut pending = vec![(parent, subtree, rename_to.map(str::to_string))];
		let mut top = None;
		while let Some((dest, snap, rename)) = pending.pop() {
			let (mut node, children) = snap.into_parts();
			if let Some(name) = rename {
				node.meta_mut().name = name;
			}
			if touch {
				node.meta_mut().modified_at = ts;
			}
			if let Some(suffix) = dedupe_suffix {
				let free = self.free_name(dest, node.name(), node.kind(), suffix);
				if free != node.name() {
					tracing::warn!(
						parent = %self.get(dest).map(Node::path).unwrap_or_default(),
						name = node.name(),
						renamed = %free,
						"Duplicate name in snapshot renamed"
					);
					node.meta_mut().name = free;
				}
			}
			let Some(id) = self.insert_child(dest, node) else {
				continue;
			};
			top.get_or_insert(id);
			// Reverse so children pop in order and keep their sibling order.
			for child in children.into_iter().rev() {
				pending.push((id, child, None));
			}
		}
		top
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_tree() -> Tree {
		let mut tree = Tree::new();
		let root = tree.root();
		let home = tree.insert_child(root, Node::directory("home")).unwrap();
		let alice = tree.insert_child(home, Node::directory("alice")).unwrap();
		let docs = tree.insert_child(alice, Node::directory("docs")).unwrap();
		tree.insert_child(docs, Node::file("notes.txt", "hello", None))
			.unwrap();
		tree
	}

	#[test]
	fn new_tree_has_root() {
		let tree = Tree::new();
		let root = tree.get(tree.root()).unwrap();
		assert_eq!(root.name(), "root");
		assert_eq!(root.path(), "/");
		assert_eq!(tree.resolve("/"), Some(tree.root()));
		assert_eq!(tree.len(), 1);
	}

	#[test]
	fn resolve_only_addresses_directories() {
		let tree = sample_tree();
		let docs = tree.resolve("/home/alice/docs").unwrap();
		assert_eq!(tree.get(docs).unwrap().name(), "docs");
		assert!(tree.resolve("/home/alice/docs/notes.txt").is_none());
		assert!(tree.resolve("/home/bob").is_none());
		assert_eq!(tree.resolve("/home//alice/"), tree.resolve("/home/alice"));
	}

	#[test]
	fn find_child_respects_kind() {
		let mut tree = Tree::new();
		let root = tree.root();
		tree.insert_child(root, Node::file("report", "", None)).unwrap();
		tree.insert_child(root, Node::directory("report")).unwrap();

		let (idx, _) = tree.find_child(root, "report", None).unwrap();
		assert_eq!(idx, 0);
		let (idx, id) = tree.find_child(root, "report", Some(NodeKind::Directory)).unwrap();
		assert_eq!(idx, 1);
		assert!(tree.get(id).unwrap().is_directory());
		assert!(tree.find_child(root, "missing", None).is_none());
	}

	#[test]
	fn rename_cascades_paths() {
		let mut tree = sample_tree();
		let docs = tree.resolve("/home/alice/docs").unwrap();
		tree.rename(docs, "papers");

		assert!(tree.resolve("/home/alice/docs").is_none());
		let papers = tree.resolve("/home/alice/papers").unwrap();
		let (_, file) = tree.find_child(papers, "notes.txt", Some(NodeKind::File)).unwrap();
		assert_eq!(tree.get(file).unwrap().path(), "/home/alice/papers/notes.txt");
	}

	#[test]
	fn remove_frees_subtree_and_reports_files() {
		let mut tree = sample_tree();
		let alice = tree.resolve("/home/alice").unwrap();
		let removed = tree.remove(alice);
		assert_eq!(removed, vec!["/home/alice/docs/notes.txt".to_string()]);
		assert!(tree.resolve("/home/alice").is_none());
		assert!(tree.resolve("/home/alice/docs").is_none());
		assert_eq!(tree.len(), 2);
	}

	#[test]
	fn remove_root_is_a_no_op() {
		let mut tree = sample_tree();
		let root = tree.root();
		assert!(tree.remove(root).is_empty());
		assert_eq!(tree.len(), 5);
	}

	#[test]
	fn freed_slots_are_reused() {
		let mut tree = sample_tree();
		let docs = tree.resolve("/home/alice/docs").unwrap();
		tree.remove(docs);
		let alice = tree.resolve("/home/alice").unwrap();
		let again = tree.insert_child(alice, Node::directory("again")).unwrap();
		assert!(again.0 < 5);
		assert_eq!(tree.resolve("/home/alice/again"), Some(again));
	}

	#[test]
	fn graft_rebases_subtree_under_new_parent() {
		let mut tree = sample_tree();
		let docs = tree.resolve("/home/alice/docs").unwrap();
		let snap = tree.snapshot(docs).unwrap();
		let home = tree.resolve("/home").unwrap();
		let shared = tree.insert_child(home, Node::directory("shared")).unwrap();

		let copy = tree.graft(shared, snap, Some("docs - copy"), true).unwrap();
		assert_eq!(tree.get(copy).unwrap().path(), "/home/shared/docs - copy");
		let (_, f) = tree.find_child(copy, "notes.txt", None).unwrap();
		assert_eq!(tree.get(f).unwrap().path(), "/home/shared/docs - copy/notes.txt");
		assert!(tree.resolve("/home/shared/docs - copy").is_some());
		// original untouched
		assert!(tree.resolve("/home/alice/docs").is_some());
	}

	#[test]
	fn graft_preserves_sibling_order() {
		let mut tree = Tree::new();
		let root = tree.root();
		let src = tree.insert_child(root, Node::directory("src")).unwrap();
		for name in ["a", "b", "c"] {
			tree.insert_child(src, Node::file(name, "", None)).unwrap();
		}
		let snap = tree.snapshot(src).unwrap();
		let copy = tree.graft(root, snap, Some("dst"), false).unwrap();
		let names: Vec<&str> = tree
			.children(copy)
			.iter()
			.map(|&id| tree.get(id).unwrap().name())
			.collect();
		assert_eq!(names, vec!["a", "b", "c"]);
	}

	#[test]
	fn from_snapshot_rederives_paths() {
		let tree = sample_tree();
		let mut snap = tree.to_snapshot().unwrap();
		// corrupt a stored path; loading must repair it
		if let SnapshotNode::Directory { children, .. } = &mut snap {
			if let SnapshotNode::Directory { path, .. } = &mut children[0] {
				*path = "/bogus".to_string();
			}
		}
		let rebuilt = Tree::from_snapshot(snap).unwrap();
		assert!(rebuilt.resolve("/home").is_some());
		assert!(rebuilt.resolve("/bogus").is_none());
		assert!(rebuilt.resolve("/home/alice/docs").is_some());
		assert_eq!(rebuilt.stats(), tree.stats());
	}

	#[test]
	fn from_snapshot_renames_duplicate_siblings() {
		let doc = serde_json::json!({
			"name": "root", "type": "dir", "children": [
				{"name": "shared", "type": "dir", "children": [
					{"name": "d", "type": "dir", "children": [
						{"name": "x.txt", "type": "file", "content": "x"}
					]},
					{"name": "d", "type": "dir", "children": []},
					{"name": "a.txt", "type": "file", "content": "1"},
					{"name": "a.txt", "type": "file", "content": "2"},
					{"name": "d", "type": "file", "content": "same name, other kind"}
				]}
			]
		});
		let snap: SnapshotNode = serde_json::from_value(doc).unwrap();
		let tree = Tree::from_snapshot(snap).unwrap();

		let shared = tree.resolve("/shared").unwrap();
		let d = tree.resolve("/shared/d").unwrap();
		let (_, first) = tree.find_child(shared, "d", Some(NodeKind::Directory)).unwrap();
		assert_eq!(first, d);
		assert!(tree.find_child(d, "x.txt", Some(NodeKind::File)).is_some());
		assert!(tree.resolve("/shared/d - copy").is_some());

		let names: Vec<&str> = tree
			.children(shared)
			.iter()
			.filter_map(|&id| tree.get(id))
			.map(Node::name)
			.collect();
		assert_eq!(names, vec!["d", "d - copy", "a.txt", "a - copy.txt", "d"]);
	}

	#[test]
	fn unknown_attributes_survive_snapshot() {
		let doc = serde_json::json!({
			"name": "root", "type": "dir", "children": [
				{"name": "a.txt", "type": "file", "content": "a", "icon": "doc.png"},
				{"name": "pics", "type": "dir", "color": "blue"}
			]
		});
		let snap: SnapshotNode = serde_json::from_value(doc).unwrap();
		let tree = Tree::from_snapshot(snap).unwrap();
		let out = serde_json::to_value(tree.to_snapshot().unwrap()).unwrap();
		assert_eq!(out["children"][0]["icon"], "doc.png");
		assert_eq!(out["children"][0]["type"], "file");
		assert_eq!(out["children"][1]["color"], "blue");
		assert!(out["children"][1].get("extra").is_none());
	}

	#[test]
	fn from_snapshot_rejects_file_root() {
		let snap = SnapshotNode::File {
			name: "x".into(),
			path: "/".into(),
			created: now(),
			modified: now(),
			hidden: false,
			content: String::new(),
			size: 0,
			owner: None,
			extra: Default::default(),
		};
		assert!(Tree::from_snapshot(snap).is_none());
	}

	#[test]
	fn stats_count_nodes() {
		let tree = sample_tree();
		let stats = tree.stats();
		assert_eq!(stats.node_count, 5);
		assert_eq!(stats.directory_count, 4);
		assert_eq!(stats.file_count, 1);
		assert_eq!(stats.total_size, 5);
	}

	#[test]
	fn descendant_check() {
		let tree = sample_tree();
		let home = tree.resolve("/home").unwrap();
		let docs = tree.resolve("/home/alice/docs").unwrap();
		assert!(tree.is_descendant_or_self(docs, home));
		assert!(tree.is_descendant_or_self(home, home));
		assert!(!tree.is_descendant_or_self(home, docs));
	}
}
