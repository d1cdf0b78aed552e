// ---------------------------------------------------------------------------
// Snapshot store: `{ "root": Node }` document with backup/restore
// ---------------------------------------------------------------------------
//
// Save sequence:
//   1. copy the current file to `<file>.backup` (if it exists)
//   2. write the new pretty-printed document
//   3. read it back and parse it
//   4. on success delete the backup, on failure restore it (the backup
//      is deleted once the restore succeeded)
//
// A crash between 2 and 4 leaves the backup on disk; `load` falls back to
// it when the primary document does not parse.
// ---------------------------------------------------------------------------

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::VfmError;
use crate::node::SnapshotNode;
use crate::tree::Tree;

pub const SNAPSHOT_FILE: &str = "filesystem.json";
const BACKUP_SUFFIX: &str = ".backup";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
	pub root: SnapshotNode,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
	path: PathBuf,
	backup: PathBuf,
}

impl SnapshotStore {
	/// Store rooted at `data_dir/filesystem.json`.
	pub fn new(data_dir: &Path) -> Self {
		Self::at(data_dir.join(SNAPSHOT_FILE))
	}

	pub fn at(path: PathBuf) -> Self {
		let mut backup = path.clone().into_os_string();
		backup.push(BACKUP_SUFFIX);
		Self {
			path,
			backup: PathBuf::from(backup),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn backup_path(&self) -> &Path {
		&self.backup
	}

	/// Load the persisted tree. Returns `Ok(None)` when no usable document
	/// exists (missing, or both primary and backup unparsable), so the
	/// caller starts from a fresh tree.
	pub fn load(&self) -> Result<Option<Tree>, VfmError> {
		if !self.path.exists() {
			if self.backup.exists() {
				tracing::warn!(path = %self.path.display(), "Snapshot missing, trying backup");
				return Ok(self.read_document(&self.backup).and_then(into_tree));
			}
			return Ok(None);
		}
		if let Some(tree) = self.read_document(&self.path).and_then(into_tree) {
			return Ok(Some(tree));
		}
		if self.backup.exists() {
			tracing::warn!(path = %self.path.display(), "Snapshot unreadable, trying backup");
			if let Some(tree) = self.read_document(&self.backup).and_then(into_tree) {
				return Ok(Some(tree));
			}
		}
		tracing::error!(path = %self.path.display(), "No usable snapshot, starting fresh");
		Ok(None)
	}

	fn read_document(&self, path: &Path) -> Option<SnapshotDocument> {
		let raw = match fs::read_to_string(path) {
			Ok(raw) => raw,
			Err(e) => {
				tracing::warn!(path = %path.display(), error = %e, "Failed to read snapshot");
				return None;
			}
		};
		match serde_json::from_str::<SnapshotDocument>(&raw) {
			Ok(doc) => Some(doc),
			Err(e) => {
				tracing::warn!(path = %path.display(), error = %e, "Failed to parse snapshot");
				None
			}
		}
	}

	/// Persist `tree`. Every failure surfaces as `VfmError::Persistence`;
	/// one after the backup was taken restores the previous document.
	pub fn save(&self, tree: &Tree) -> Result<(), VfmError> {
		let root = tree
			.to_snapshot()
			.ok_or_else(|| VfmError::Persistence("tree has no root".into()))?;
		let json = serde_json::to_string_pretty(&SnapshotDocument { root }).map_err(persistence)?;
		self.replace(&json, write_verified)
	}

	/// Swap in `json` through `write`, keeping a backup of the current
	/// document until `write` succeeds.
	fn replace(
		&self,
		json: &str,
		write: impl FnOnce(&Path, &str) -> Result<(), VfmError>,
	) -> Result<(), VfmError> {
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent).map_err(persistence)?;
			}
		}

		let had_backup = if self.path.exists() {
			fs::copy(&self.path, &self.backup).map_err(persistence)?;
			true
		} else {
			false
		};

		match write(&self.path, json) {
			Ok(()) => {
				if had_backup {
					if let Err(e) = fs::remove_file(&self.backup) {
						tracing::warn!(error = %e, "Failed to remove snapshot backup");
					}
				}
				tracing::debug!(path = %self.path.display(), bytes = json.len(), "Snapshot saved");
				Ok(())
			}
			Err(e) => {
				tracing::error!(path = %self.path.display(), error = %e, "Snapshot save failed");
				if had_backup {
					self.restore_backup();
				} else if self.path.exists() {
					// nothing to restore; drop the partial first document
					if let Err(remove) = fs::remove_file(&self.path) {
						tracing::warn!(error = %remove, "Failed to remove partial snapshot");
					}
				}
				Err(persistence(e))
			}
		}
	}

	/// Copy the backup over the document. The backup is kept when the copy
	/// fails so `load` can still fall back to it.
	fn restore_backup(&self) {
		match fs::copy(&self.backup, &self.path) {
			Ok(_) => {
				tracing::info!("Snapshot restored from backup");
				if let Err(e) = fs::remove_file(&self.backup) {
					tracing::warn!(error = %e, "Failed to remove snapshot backup");
				}
			}
			Err(e) => tracing::error!(error = %e, "Failed to restore snapshot backup"),
		}
	}
}

/// Write `json` to `path` and check that it reads back as a document.
fn write_verified(path: &Path, json: &str) -> Result<(), VfmError> {
	fs::write(path, json)?;
	let written = fs::read_to_string(path)?;
	serde_json::from_str::<SnapshotDocument>(&written)?;
	Ok(())
}

fn persistence(e: impl std::fmt::Display) -> VfmError {
	VfmError::Persistence(e.to_string())
}

fn into_tree(doc: SnapshotDocument) -> Option<Tree> {
	let tree = Tree::from_snapshot(doc.root);
	if tree.is_none() {
		tracing::warn!("Snapshot root is not a directory");
	}
	tree
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
