// ---------------------------------------------------------------------------
// Clipboard: staged deep copies awaiting paste
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::node::{NodeKind, SnapshotNode};
use crate::path::{is_within, join};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardMode {
	#[default]
	None,
	Copy,
	Cut,
}

/// A `{name, type}` reference to a child of some directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: NodeKind,
}

impl ItemRef {
	pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
		Self {
			name: name.into(),
			kind,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardInfo {
	pub mode: ClipboardMode,
	pub count: usize,
	pub source_path: Option<String>,
	/// `"name (kind)"` per staged item.
	pub items: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
	mode: ClipboardMode,
	source_path: Option<String>,
	items: Vec<SnapshotNode>,
}

impl Clipboard {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the staged content.
	pub fn stage(&mut self, mode: ClipboardMode, source_path: String, items: Vec<SnapshotNode>) {
		self.mode = mode;
		self.source_path = Some(source_path);
		self.items = items;
	}

	pub fn clear(&mut self) {
		*self = Self::default();
	}

	pub fn mode(&self) -> ClipboardMode {
		self.mode
	}

	pub fn source_path(&self) -> Option<&str> {
		self.source_path.as_deref()
	}

	pub fn items(&self) -> &[SnapshotNode] {
		&self.items
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// True if `target` is a staged directory's original location or lies
	/// below it.
	pub fn overlaps(&self, target: &str) -> bool {
		let Some(source) = self.source_path.as_deref() else {
			return false;
		};
		self.items
			.iter()
			.filter(|item| item.kind() == NodeKind::Directory)
			.any(|item| is_within(target, &join(source, item.name())))
	}

	pub fn info(&self) -> ClipboardInfo {
		ClipboardInfo {
			mode: self.mode,
			count: self.items.len(),
			source_path: self.source_path.clone(),
			items: self
				.items
				.iter()
				.map(|item| format!("{} ({})", item.name(), item.kind().as_str()))
				.collect(),
		}
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
