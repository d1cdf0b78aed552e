// ---------------------------------------------------------------------------
// FileManager: the single owned aggregate behind every operation
// ---------------------------------------------------------------------------
//
// Every public operation takes the acting username, is gated by the user
// store's path check, and records its outcome in the access log. Successful
// structural mutations are followed by a snapshot save; if that save fails
// the in-memory change stays in place and the caller gets
// `VfmError::Persistence`.
//
// Cache coherence:
//   write    -> put (write-through)
//   delete   -> remove every file in the removed subtree
//   rename   -> remove the old path (file) or old prefix (directory)
//   move/cut -> remove the original paths
//   open     -> drop persisted entries that differ from the tree
// ---------------------------------------------------------------------------

use std::path::PathBuf;

use crate::access_log::{AccessLog, AccessSummary, Operation, DEFAULT_LOG_CAPACITY};
use crate::cache::{CacheStats, ContentCache, DEFAULT_CACHE_LIMIT};
use crate::clipboard::{Clipboard, ClipboardInfo, ClipboardMode, ItemRef};
use crate::error::VfmError;
use crate::index::NameIndex;
use crate::monitor::{
	disk_usage, DiskUsage, HealthReport, MetricsProbe, PerformanceHistory, PerformanceStats,
};
use crate::node::{now, Node, NodeId, NodeKind, NodeSummary, SnapshotNode};
use crate::path::{
	base_name, home_of, join, normalize_path, parent_path, split_parent,
	validate_name, HOME_PATH, ROOT_PATH, SHARED_PATH, SYSTEM_PATH,
};
use crate::snapshot::SnapshotStore;
use crate::tree::Tree;
use crate::users::{Role, UserStatus, UserStore};

/// Legacy folder under `/home` dropped on load.
const LEGACY_USERS_DIR: &str = "users";

pub use crate::path::DEFAULT_COPY_SUFFIX;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FileManagerConfig {
	/// Directory holding the snapshot, user store, access log and index.
	pub data_dir: PathBuf,
	/// Content cache ceiling in bytes.
	pub cache_limit: u64,
	/// Access log ring size.
	pub log_capacity: usize,
	/// Word used by auto-rename (`name - <suffix>.ext`).
	pub copy_suffix: String,
}

impl Default for FileManagerConfig {
	fn default() -> Self {
		Self {
			data_dir: PathBuf::from("data"),
			cache_limit: DEFAULT_CACHE_LIMIT,
			log_capacity: DEFAULT_LOG_CAPACITY,
			copy_suffix: DEFAULT_COPY_SUFFIX.to_string(),
		}
	}
}

impl FileManagerConfig {
	pub fn new(data_dir: impl Into<PathBuf>) -> Self {
		Self {
			data_dir: data_dir.into(),
			..Self::default()
		}
	}
}

// ---------------------------------------------------------------------------
// FileManager
// ---------------------------------------------------------------------------

pub struct FileManager {
	config: FileManagerConfig,
	tree: Tree,
	store: SnapshotStore,
	users: UserStore,
	clipboard: Clipboard,
	cache: ContentCache,
	log: AccessLog,
	index: NameIndex,
	history: PerformanceHistory,
}

impl FileManager {
	/// Load (or create) the file system under `config.data_dir`, make sure
	/// the required directories exist and persist the result.
	pub fn open(config: FileManagerConfig) -> Result<Self, VfmError> {
		let store = SnapshotStore::new(&config.data_dir);
		let tree = store.load()?.unwrap_or_default();
		let users = UserStore::open(&config.data_dir);
		let log = AccessLog::load(&config.data_dir, config.log_capacity);
		let index = NameIndex::load(&config.data_dir);

		let cache = ContentCache::load(&config.data_dir, config.cache_limit);

		let mut fm = Self {
			cache,
			config,
			tree,
			store,
			users,
			clipboard: Clipboard::new(),
			log,
			index,
			history: PerformanceHistory::default(),
		};
		fm.ensure_required_directories();
		fm.persist()?;
		fm.index.rebuild(&fm.tree);
		let tree = &fm.tree;
		let stale = fm.cache.retain(|path, content| stored_content(tree, path) == Some(content));
		if stale > 0 {
			tracing::debug!(stale, "Dropped cache entries that no longer match the tree");
		}

		tracing::info!(
			data_dir = %fm.config.data_dir.display(),
			nodes = fm.tree.len(),
			users = fm.users.len(),
			"File manager opened"
		);
		Ok(fm)
	}

	pub fn config(&self) -> &FileManagerConfig {
		&self.config
	}

	pub fn users(&self) -> &UserStore {
		&self.users
	}

	pub fn cache(&self) -> &ContentCache {
		&self.cache
	}

	pub fn access_log(&self) -> &AccessLog {
		&self.log
	}

	pub fn tree(&self) -> &Tree {
		&self.tree
	}

	/// Explicit persist of the current tree.
	pub fn save(&self) -> Result<(), VfmError> {
		self.persist()
	}

	// -- Internal helpers -------------------------------------------------

	fn persist(&self) -> Result<(), VfmError> {
		self.store.save(&self.tree)
	}

	/// Run `f`, then record its outcome in the access log.
	fn logged<T>(
		&mut self,
		path: &str,
		operation: Operation,
		actor: &str,
		f: impl FnOnce(&mut Self) -> Result<T, VfmError>,
	) -> Result<T, VfmError> {
		let result = f(self);
		if let Err(e) = &result {
			tracing::debug!(path, op = operation.as_str(), actor, error = %e, "Operation failed");
		}
		self.log.record(path, operation, actor, result.is_ok());
		result
	}

	fn gate(&self, actor: &str, path: &str) -> Result<(), VfmError> {
		if self.users.can_access(actor, path) {
			Ok(())
		} else {
			tracing::warn!(actor, path, "Access denied");
			Err(VfmError::Denied(path.to_string()))
		}
	}

	fn resolve_dir(&self, path: &str) -> Result<NodeId, VfmError> {
		self.tree
			.resolve(path)
			.ok_or_else(|| VfmError::NotFound(path.to_string()))
	}

	fn find(&self, parent: NodeId, parent_path: &str, name: &str, kind: Option<NodeKind>) -> Result<NodeId, VfmError> {
		self.tree
			.find_child(parent, name, kind)
			.map(|(_, id)| id)
			.ok_or_else(|| VfmError::NotFound(join(parent_path, name)))
	}

	/// Protected paths cannot be deleted, renamed, moved or cut.
	pub fn is_protected(&self, path: &str) -> bool {
		let path = normalize_path(path);
		if [ROOT_PATH, HOME_PATH, SHARED_PATH, SYSTEM_PATH].contains(&path.as_str()) {
			return true;
		}
		parent_path(&path).as_deref() == Some(HOME_PATH) && self.users.contains(base_name(&path))
	}

	fn check_protected(&self, id: NodeId) -> Result<(), VfmError> {
		match self.tree.get(id) {
			Some(node) if node.is_directory() && self.is_protected(node.path()) => {
				Err(VfmError::Protected(node.path().to_string()))
			}
			_ => Ok(()),
		}
	}

	fn free_name(&self, parent: NodeId, name: &str, kind: NodeKind) -> String {
		self.tree.free_name(parent, name, kind, &self.config.copy_suffix)
	}

	fn evict_paths(&mut self, paths: &[String]) {
		for path in paths {
			self.cache.remove(path);
		}
	}

	fn node_path(&self, id: NodeId) -> String {
		self.tree
			.get(id)
			.map(|n| n.path().to_string())
			.unwrap_or_default()
	}

	// -- Bootstrap --------------------------------------------------------

	fn ensure_dir(&mut self, parent: NodeId, name: &str) -> NodeId {
		if let Some((_, id)) = self.tree.find_child(parent, name, Some(NodeKind::Directory)) {
			return id;
		}
		tracing::info!(parent = %self.node_path(parent), name, "Creating required directory");
		self.tree.touch(parent);
		self.tree
			.insert_child(parent, Node::directory(name))
			.unwrap_or(parent)
	}

	fn ensure_required_directories(&mut self) {
		let root = self.tree.root();
		let home = self.ensure_dir(root, base_name(HOME_PATH));

		if !self.users.contains(LEGACY_USERS_DIR) {
			if let Some((_, legacy)) =
				self.tree
					.find_child(home, LEGACY_USERS_DIR, Some(NodeKind::Directory))
			{
				tracing::info!("Removing legacy /home/users directory");
				self.tree.remove(legacy);
			}
		}

		self.ensure_dir(home, base_name(SHARED_PATH));
		let names: Vec<String> = self.users.usernames().map(str::to_string).collect();
		for name in names {
			if validate_name(&name).is_none() {
				self.ensure_dir(home, &name);
			}
		}
		self.ensure_dir(root, base_name(SYSTEM_PATH));
	}

	/// Create `/home/<username>` if missing. Returns true if it was created.
	pub fn create_user_directory(&mut self, username: &str) -> Result<bool, VfmError> {
		if let Some(msg) = validate_name(username) {
			return Err(VfmError::InvalidName(msg));
		}
		let root = self.tree.root();
		let home = self.ensure_dir(root, base_name(HOME_PATH));
		if self
			.tree
			.find_child(home, username, Some(NodeKind::Directory))
			.is_some()
		{
			return Ok(false);
		}
		self.ensure_dir(home, username);
		self.persist()?;
		Ok(true)
	}

	// -- Users ------------------------------------------------------------

	/// Record a new user and create their home directory.
	pub fn create_user(&mut self, username: &str, password: &str, role: Role) -> Result<String, VfmError> {
		self.users.create_user(username, password, role)?;
		self.create_user_directory(username)?;
		Ok(home_of(username))
	}

	pub fn set_user_status(&mut self, username: &str, status: UserStatus) -> Result<(), VfmError> {
		self.users.set_status(username, status)
	}

	pub fn reset_password(&mut self, username: &str, password: &str) -> Result<(), VfmError> {
		self.users.reset_password(username, password)
	}

	// -- Reads ------------------------------------------------------------

	/// Children of the directory at `path` in insertion order. Hidden
	/// children are left out unless `show_hidden`.
	pub fn list(&self, path: &str, actor: &str, show_hidden: bool) -> Result<Vec<NodeSummary>, VfmError> {
		let path = normalize_path(path);
		self.gate(actor, &path)?;
		let dir = self.resolve_dir(&path)?;
		Ok(self
			.tree
			.children(dir)
			.iter()
			.filter_map(|&id| self.tree.get(id))
			.filter(|n| show_hidden || !n.meta().hidden)
			.map(Node::summary)
			.collect())
	}

	/// Summary of the item at `path`. Without `kind` the first child with
	/// that name (insertion order) is used.
	pub fn info(&self, path: &str, actor: &str, kind: Option<NodeKind>) -> Result<NodeSummary, VfmError> {
		let path = normalize_path(path);
		if path == ROOT_PATH {
			self.gate(actor, ROOT_PATH)?;
			return self
				.tree
				.get(self.tree.root())
				.map(Node::summary)
				.ok_or_else(|| VfmError::NotFound(path));
		}
		let (parent_path, name) = split_parent(&path);
		self.gate(actor, &parent_path)?;
		let parent = self.resolve_dir(&parent_path)?;
		let id = self.find(parent, &parent_path, name, kind)?;
		self.tree
			.get(id)
			.map(Node::summary)
			.ok_or_else(|| VfmError::NotFound(path.clone()))
	}

	/// The tree as a nested snapshot, as far as `actor` may see it. Admins
	/// get everything. For other users a file is kept when its directory
	/// passes the access check, and a directory when it passes the check
	/// itself or still has a kept descendant. The root is always returned.
	pub fn full_tree(&self, actor: &str) -> Result<SnapshotNode, VfmError> {
		let root = self
			.tree
			.to_snapshot()
			.ok_or_else(|| VfmError::InvalidState("tree has no root".into()))?;
		if self.users.is_admin(actor) {
			return Ok(root);
		}
		self.visible_subtree(root, actor, false)
			.ok_or_else(|| VfmError::InvalidState("tree root is not a directory".into()))
	}

	fn visible_subtree(&self, node: SnapshotNode, actor: &str, parent_open: bool) -> Option<SnapshotNode> {
		match node {
			file @ SnapshotNode::File { .. } => parent_open.then_some(file),
			SnapshotNode::Directory {
				name,
				path,
				created,
				modified,
				hidden,
				children,
				extra,
			} => {
				let open = self.users.can_access(actor, &path);
				let children: Vec<SnapshotNode> = children
					.into_iter()
					.filter_map(|child| self.visible_subtree(child, actor, open))
					.collect();
				let keep = open || !children.is_empty() || path == ROOT_PATH;
				keep.then_some(SnapshotNode::Directory {
					name,
					path,
					created,
					modified,
					hidden,
					children,
					extra,
				})
			}
		}
	}

	/// File content, from the cache when possible. Access is checked on
	/// the parent directory before the cache is consulted.
	pub fn read(&mut self, file_path: &str, actor: &str) -> Result<String, VfmError> {
		let path = normalize_path(file_path);
		self.logged(&path, Operation::Read, actor, |fm| {
			let (parent_path, name) = split_parent(&path);
			fm.gate(actor, &parent_path)?;
			if let Some(content) = fm.cache.get(&path) {
				return Ok(content);
			}
			let parent = fm.resolve_dir(&parent_path)?;
			let id = fm.find(parent, &parent_path, name, Some(NodeKind::File))?;
			let content = match fm.tree.get(id) {
				Some(Node::File(f)) => f.content.clone(),
				_ => return Err(VfmError::NotFound(path.clone())),
			};
			fm.cache.put(&path, &content);
			Ok(content)
		})
	}

	pub fn is_hidden(&self, parent_path: &str, name: &str, kind: NodeKind) -> bool {
		self.tree
			.resolve(parent_path)
			.and_then(|p| self.tree.find_child(p, name, Some(kind)))
			.and_then(|(_, id)| self.tree.get(id))
			.is_some_and(|n| n.meta().hidden)
	}

	// -- Mutations --------------------------------------------------------

	/// Create a file or directory under `parent_path`. A clash with a
	/// same-kind sibling picks the next free copy name. Returns the path of
	/// the created node.
	pub fn create(
		&mut self,
		parent_path: &str,
		name: &str,
		kind: NodeKind,
		content: Option<&str>,
		actor: &str,
	) -> Result<String, VfmError> {
		let parent_path = normalize_path(parent_path);
		let op = match kind {
			NodeKind::File => Operation::Create,
			NodeKind::Directory => Operation::CreateDir,
		};
		self.logged(&join(&parent_path, name), op, actor, |fm| {
			fm.gate(actor, &parent_path)?;
			if let Some(msg) = validate_name(name) {
				return Err(VfmError::InvalidName(msg));
			}
			let parent = fm.resolve_dir(&parent_path)?;
			let free = fm.free_name(parent, name, kind);
			let node = match kind {
				NodeKind::Directory => Node::directory(free),
				NodeKind::File => Node::file(free, content.unwrap_or_default(), Some(actor.to_string())),
			};
			let id = fm
				.tree
				.insert_child(parent, node)
				.ok_or_else(|| VfmError::NotFound(parent_path.clone()))?;
			fm.tree.touch(parent);
			fm.persist()?;
			Ok(fm.node_path(id))
		})
	}

	pub fn delete(&mut self, parent_path: &str, name: &str, kind: NodeKind, actor: &str) -> Result<(), VfmError> {
		let parent_path = normalize_path(parent_path);
		self.logged(&join(&parent_path, name), Operation::Delete, actor, |fm| {
			fm.gate(actor, &parent_path)?;
			let parent = fm.resolve_dir(&parent_path)?;
			let id = fm.find(parent, &parent_path, name, Some(kind))?;
			fm.check_protected(id)?;
			let removed = fm.tree.remove(id);
			fm.evict_paths(&removed);
			fm.tree.touch(parent);
			fm.persist()
		})
	}

	/// Rename without auto-rename: a same-kind sibling called `new_name`
	/// is a collision. Returns the new path.
	pub fn rename(
		&mut self,
		parent_path: &str,
		old_name: &str,
		new_name: &str,
		kind: NodeKind,
		actor: &str,
	) -> Result<String, VfmError> {
		let parent_path = normalize_path(parent_path);
		self.logged(&join(&parent_path, old_name), Operation::Rename, actor, |fm| {
			fm.gate(actor, &parent_path)?;
			if let Some(msg) = validate_name(new_name) {
				return Err(VfmError::InvalidName(msg));
			}
			let parent = fm.resolve_dir(&parent_path)?;
			let id = fm.find(parent, &parent_path, old_name, Some(kind))?;
			if old_name == new_name {
				return Ok(fm.node_path(id));
			}
			fm.check_protected(id)?;
			if fm.tree.find_child(parent, new_name, Some(kind)).is_some() {
				return Err(VfmError::Collision(join(&parent_path, new_name)));
			}
			let old_path = fm.node_path(id);
			fm.tree.rename(id, new_name);
			match kind {
				NodeKind::File => {
					fm.cache.remove(&old_path);
				}
				NodeKind::Directory => {
					fm.cache.invalidate_prefix(&old_path);
				}
			}
			fm.tree.touch(parent);
			fm.persist()?;
			Ok(fm.node_path(id))
		})
	}

	/// Replace a file's content in place and refresh its cache entry.
	pub fn write(&mut self, parent_path: &str, filename: &str, content: &str, actor: &str) -> Result<(), VfmError> {
		let parent_path = normalize_path(parent_path);
		self.logged(&join(&parent_path, filename), Operation::Write, actor, |fm| {
			fm.gate(actor, &parent_path)?;
			let parent = fm.resolve_dir(&parent_path)?;
			let id = fm.find(parent, &parent_path, filename, Some(NodeKind::File))?;
			let path = match fm.tree.get_mut(id) {
				Some(Node::File(f)) => {
					f.content = content.to_string();
					f.meta.modified_at = now();
					f.meta.path.clone()
				}
				_ => return Err(VfmError::NotFound(join(&parent_path, filename))),
			};
			fm.tree.touch(parent);
			fm.cache.put(&path, content);
			fm.persist()
		})
	}

	pub fn set_hidden(
		&mut self,
		parent_path: &str,
		name: &str,
		kind: NodeKind,
		hidden: bool,
		actor: &str,
	) -> Result<(), VfmError> {
		let parent_path = normalize_path(parent_path);
		self.logged(&join(&parent_path, name), Operation::SetHidden, actor, |fm| {
			fm.gate(actor, &parent_path)?;
			let parent = fm.resolve_dir(&parent_path)?;
			let id = fm.find(parent, &parent_path, name, Some(kind))?;
			if let Some(node) = fm.tree.get_mut(id) {
				let meta = node.meta_mut();
				meta.hidden = hidden;
				meta.modified_at = now();
			}
			fm.tree.touch(parent);
			fm.persist()
		})
	}

	pub fn hide(&mut self, parent_path: &str, name: &str, kind: NodeKind, actor: &str) -> Result<(), VfmError> {
		self.set_hidden(parent_path, name, kind, true, actor)
	}

	pub fn unhide(&mut self, parent_path: &str, name: &str, kind: NodeKind, actor: &str) -> Result<(), VfmError> {
		self.set_hidden(parent_path, name, kind, false, actor)
	}

	// -- Single-item copy / move -------------------------------------------

	/// Locate the source and destination of a copy or move and check them.
	/// Returns `(source id, destination parent id, destination name)`.
	fn prepare_transfer<'a>(
		&self,
		source: &str,
		dest: &'a str,
		kind: Option<NodeKind>,
		actor: &str,
	) -> Result<(NodeId, NodeId, &'a str), VfmError> {
		let (source_parent_path, source_name) = split_parent(source);
		let (dest_parent_path, dest_name) = split_parent(dest);
		if let Some(msg) = validate_name(dest_name) {
			return Err(VfmError::InvalidName(msg));
		}
		self.gate(actor, &source_parent_path)?;
		self.gate(actor, &dest_parent_path)?;

		let source_parent = self.resolve_dir(&source_parent_path)?;
		let id = self.find(source_parent, &source_parent_path, source_name, kind)?;
		let dest_parent = self.resolve_dir(&dest_parent_path)?;

		let source_kind = self
			.tree
			.get(id)
			.map(Node::kind)
			.ok_or_else(|| VfmError::NotFound(source.to_string()))?;
		if source_kind == NodeKind::Directory && self.tree.is_descendant_or_self(dest_parent, id) {
			return Err(VfmError::InvalidState(format!(
				"Cannot place {} inside itself",
				source
			)));
		}
		if self.tree.find_child(dest_parent, dest_name, Some(source_kind)).is_some() {
			return Err(VfmError::Collision(dest.to_string()));
		}
		Ok((id, dest_parent, dest_name))
	}

	/// Deep-copy the node at `source_path` to `dest_path` (parent directory
	/// plus new name). Returns the destination path.
	pub fn copy_single(
		&mut self,
		source_path: &str,
		dest_path: &str,
		kind: Option<NodeKind>,
		actor: &str,
	) -> Result<String, VfmError> {
		let source = normalize_path(source_path);
		let dest = normalize_path(dest_path);
		self.logged(&source, Operation::Copy, actor, |fm| {
			let (id, dest_parent, dest_name) = fm.prepare_transfer(&source, &dest, kind, actor)?;
			let snapshot = fm
				.tree
				.snapshot(id)
				.ok_or_else(|| VfmError::NotFound(source.clone()))?;
			let copy = fm
				.tree
				.graft(dest_parent, snapshot, Some(dest_name), true)
				.ok_or_else(|| VfmError::NotFound(dest.clone()))?;
			fm.tree.touch(dest_parent);
			fm.persist()?;
			Ok(fm.node_path(copy))
		})
	}

	/// Move the node at `source_path` to `dest_path`. The original is
	/// removed by id, so its actual kind decides what is deleted. Returns
	/// the destination path.
	pub fn move_single(
		&mut self,
		source_path: &str,
		dest_path: &str,
		kind: Option<NodeKind>,
		actor: &str,
	) -> Result<String, VfmError> {
		let source = normalize_path(source_path);
		let dest = normalize_path(dest_path);
		self.logged(&source, Operation::Move, actor, |fm| {
			let (id, dest_parent, dest_name) = fm.prepare_transfer(&source, &dest, kind, actor)?;
			fm.check_protected(id)?;
			let snapshot = fm
				.tree
				.snapshot(id)
				.ok_or_else(|| VfmError::NotFound(source.clone()))?;
			let source_parent = fm.tree.parent(id);
			let moved = fm
				.tree
				.graft(dest_parent, snapshot, Some(dest_name), true)
				.ok_or_else(|| VfmError::NotFound(dest.clone()))?;
			let removed = fm.tree.remove(id);
			fm.evict_paths(&removed);
			if let Some(p) = source_parent {
				fm.tree.touch(p);
			}
			fm.tree.touch(dest_parent);
			fm.persist()?;
			Ok(fm.node_path(moved))
		})
	}

	// -- Clipboard --------------------------------------------------------

	fn stage(
		&mut self,
		source_path: &str,
		items: &[ItemRef],
		mode: ClipboardMode,
		actor: &str,
	) -> Result<usize, VfmError> {
		self.gate(actor, source_path)?;
		let source = self.resolve_dir(source_path)?;
		let mut staged = Vec::with_capacity(items.len());
		for item in items {
			let Some((_, id)) = self.tree.find_child(source, &item.name, Some(item.kind)) else {
				tracing::debug!(name = %item.name, "Clipboard item not found, skipped");
				continue;
			};
			if mode == ClipboardMode::Cut {
				self.check_protected(id)?;
			}
			if let Some(snapshot) = self.tree.snapshot(id) {
				staged.push(snapshot);
			}
		}
		if staged.is_empty() {
			return Err(VfmError::NotFound(format!("no matching items in {}", source_path)));
		}
		let count = staged.len();
		self.clipboard.stage(mode, source_path.to_string(), staged);
		Ok(count)
	}

	/// Stage deep copies of `items` from `source_path`. Unknown names are
	/// skipped; if none match the clipboard is left as it was. Returns the
	/// number of staged items.
	pub fn copy(&mut self, source_path: &str, items: &[ItemRef], actor: &str) -> Result<usize, VfmError> {
		let source = normalize_path(source_path);
		self.logged(&source, Operation::ClipboardCopy, actor, |fm| {
			fm.stage(&source, items, ClipboardMode::Copy, actor)
		})
	}

	/// Like `copy`, but the originals are removed by the next paste.
	pub fn cut(&mut self, source_path: &str, items: &[ItemRef], actor: &str) -> Result<usize, VfmError> {
		let source = normalize_path(source_path);
		self.logged(&source, Operation::ClipboardCut, actor, |fm| {
			fm.stage(&source, items, ClipboardMode::Cut, actor)
		})
	}

	/// Paste the staged items into `target_path`, auto-renaming on clashes.
	/// After a cut, the originals are removed once every item is in place
	/// and the clipboard is cleared; a copy stays staged. Returns the paths
	/// of the pasted nodes.
	pub fn paste(&mut self, target_path: &str, actor: &str) -> Result<Vec<String>, VfmError> {
		let target = normalize_path(target_path);
		self.logged(&target, Operation::Paste, actor, |fm| fm.paste_into(&target, actor))
	}

	fn paste_into(&mut self, target: &str, actor: &str) -> Result<Vec<String>, VfmError> {
		if self.clipboard.is_empty() {
			return Err(VfmError::InvalidState("Clipboard is empty".into()));
		}
		self.gate(actor, target)?;
		let Some(target_id) = self.tree.resolve(target) else {
			let (parent_path, name) = split_parent(target);
			let is_file = self
				.tree
				.resolve(&parent_path)
				.and_then(|p| self.tree.find_child(p, name, Some(NodeKind::File)))
				.is_some();
			return Err(if is_file {
				VfmError::InvalidState(format!("Paste target is not a directory: {}", target))
			} else {
				VfmError::NotFound(target.to_string())
			});
		};

		let mode = self.clipboard.mode();
		let source_path = self.clipboard.source_path().map(str::to_string);

		if mode == ClipboardMode::Cut {
			// the originals are removed, so the paster must reach the source
			if let Some(source) = source_path.as_deref() {
				self.gate(actor, source)?;
			}
			if self.clipboard.overlaps(target) {
				return Err(VfmError::InvalidState(format!(
					"Cannot paste into a directory being moved: {}",
					target
				)));
			}
			if source_path.as_deref() == Some(target) {
				let paths: Vec<String> = self
					.clipboard
					.items()
					.iter()
					.map(|item| join(target, item.name()))
					.collect();
				self.clipboard.clear();
				return Ok(paths);
			}
		}

		let items = self.clipboard.items().to_vec();
		let mut pasted = Vec::with_capacity(items.len());
		for item in &items {
			let name = self.free_name(target_id, item.name(), item.kind());
			if let Some(id) = self.tree.graft(target_id, item.clone(), Some(&name), true) {
				pasted.push(self.node_path(id));
			}
		}

		if mode == ClipboardMode::Cut {
			if let Some(source_id) = source_path.as_deref().and_then(|p| self.tree.resolve(p)) {
				for item in &items {
					if let Some((_, original)) = self.tree.find_child(source_id, item.name(), Some(item.kind())) {
						let removed = self.tree.remove(original);
						self.evict_paths(&removed);
					}
				}
				self.tree.touch(source_id);
			} else {
				tracing::warn!(source = ?source_path, "Cut source vanished before paste");
			}
			self.clipboard.clear();
		}

		self.tree.touch(target_id);
		self.persist()?;
		Ok(pasted)
	}

	pub fn clipboard_info(&self) -> ClipboardInfo {
		self.clipboard.info()
	}

	pub fn clear_clipboard(&mut self) {
		self.clipboard.clear();
	}

	// -- Cache / monitor --------------------------------------------------

	pub fn cache_stats(&self) -> CacheStats {
		self.cache.stats()
	}

	/// Rebuild the name index from the tree. Returns the key count.
	pub fn rebuild_index(&mut self) -> usize {
		self.index.rebuild(&self.tree);
		self.index.len()
	}

	pub fn search(&self, query: &str) -> Vec<String> {
		self.index.search(query)
	}

	pub fn disk_usage(&self) -> DiskUsage {
		disk_usage(&self.tree)
	}

	pub fn access_summary(&self, window_hours: i64) -> AccessSummary {
		self.log.summarize(window_hours)
	}

	/// Sample `probe`, combine it with cache and index figures and append
	/// the result to the performance history.
	pub fn performance(&mut self, probe: &dyn MetricsProbe) -> PerformanceStats {
		let stats = PerformanceStats::collect(probe.sample(), &self.cache, &self.index);
		self.history.push(stats.clone());
		stats
	}

	pub fn performance_history(&self) -> &PerformanceHistory {
		&self.history
	}

	pub fn health_report(&mut self, probe: &dyn MetricsProbe) -> HealthReport {
		let performance = self.performance(probe);
		HealthReport::build(performance, self.disk_usage(), self.access_summary(24))
	}

	/// Drop access log entries older than `days` and persist the log.
	pub fn cleanup_old_logs(&mut self, days: i64) -> Result<usize, VfmError> {
		let removed = self.log.cleanup_older_than(days);
		tracing::info!(removed, days, "Old access log entries removed");
		self.save_monitor_data()?;
		Ok(removed)
	}

	/// Persist the access log and the name index.
	pub fn save_monitor_data(&self) -> Result<(), VfmError> {
		self.log.save(&self.config.data_dir)?;
		self.cache.save(&self.config.data_dir)?;
		self.index.save(&self.config.data_dir)?;
		Ok(())
	}
}

/// Content of the file at `path`, if there is one.
fn stored_content<'a>(tree: &'a Tree, path: &str) -> Option<&'a str> {
	let (parent_path, name) = split_parent(path);
	let (_, id) = tree.find_child(tree.resolve(&parent_path)?, name, Some(NodeKind::File))?;
	match tree.get(id)? {
		Node::File(f) => Some(f.content.as_str()),
		Node::Directory(_) => None,
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
