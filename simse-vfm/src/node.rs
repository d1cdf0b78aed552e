// ---------------------------------------------------------------------------
// Node model: tagged directory/file nodes and their snapshot form
// ---------------------------------------------------------------------------
//
// Live nodes sit in the tree arena and reference children by `NodeId`.
// `SnapshotNode` is the owned, nested form used for the on-disk document,
// clipboard staging and full-tree export.
// ---------------------------------------------------------------------------

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local wall-clock time truncated to whole seconds (the persisted precision).
pub fn now() -> NaiveDateTime {
	Local::now().naive_local().trunc_subsecs(0)
}

/// Serde adapter for `"%Y-%m-%d %H:%M:%S"` timestamps. Also accepts ISO 8601
/// (`2024-01-01T12:00:00`) on input.
pub mod timestamp {
	use chrono::NaiveDateTime;
	use serde::{Deserialize, Deserializer, Serializer};

	use super::TIMESTAMP_FORMAT;

	pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
		let raw = String::deserialize(d)?;
		NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
			.or_else(|_| raw.parse::<NaiveDateTime>())
			.map_err(serde::de::Error::custom)
	}
}

// ---------------------------------------------------------------------------
// Kinds & ids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
	#[serde(rename = "dir", alias = "directory")]
	Directory,
	#[serde(rename = "file")]
	File,
}

impl NodeKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Directory => "dir",
			Self::File => "file",
		}
	}
}

/// Index of a node slot in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

// ---------------------------------------------------------------------------
// Live nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NodeMeta {
	pub name: String,
	pub path: String,
	pub created_at: NaiveDateTime,
	pub modified_at: NaiveDateTime,
	pub hidden: bool,
	/// Attributes this engine does not interpret (e.g. `icon`), kept so a
	/// load/save cycle does not drop them.
	pub extra: Map<String, Value>,
}

impl NodeMeta {
	pub fn new(name: impl Into<String>) -> Self {
		let ts = now();
		Self {
			name: name.into(),
			path: String::new(),
			created_at: ts,
			modified_at: ts,
			hidden: false,
			extra: Map::new(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct DirectoryNode {
	pub meta: NodeMeta,
	pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct FileNode {
	pub meta: NodeMeta,
	pub content: String,
	pub owner: Option<String>,
}

impl FileNode {
	/// Byte length of the content.
	pub fn size(&self) -> u64 {
		self.content.len() as u64
	}
}

#[derive(Debug, Clone)]
pub enum Node {
	Directory(DirectoryNode),
	File(FileNode),
}

impl Node {
	pub fn directory(name: impl Into<String>) -> Self {
		Self::Directory(DirectoryNode {
			meta: NodeMeta::new(name),
			children: Vec::new(),
		})
	}

	pub fn file(name: impl Into<String>, content: impl Into<String>, owner: Option<String>) -> Self {
		Self::File(FileNode {
			meta: NodeMeta::new(name),
			content: content.into(),
			owner,
		})
	}

	pub fn kind(&self) -> NodeKind {
		match self {
			Self::Directory(_) => NodeKind::Directory,
			Self::File(_) => NodeKind::File,
		}
	}

	pub fn meta(&self) -> &NodeMeta {
		match self {
			Self::Directory(d) => &d.meta,
			Self::File(f) => &f.meta,
		}
	}

	pub fn meta_mut(&mut self) -> &mut NodeMeta {
		match self {
			Self::Directory(d) => &mut d.meta,
			Self::File(f) => &mut f.meta,
		}
	}

	pub fn name(&self) -> &str {
		&self.meta().name
	}

	pub fn path(&self) -> &str {
		&self.meta().path
	}

	pub fn is_directory(&self) -> bool {
		matches!(self, Self::Directory(_))
	}

	pub fn children(&self) -> &[NodeId] {
		match self {
			Self::Directory(d) => &d.children,
			Self::File(_) => &[],
		}
	}

	pub fn summary(&self) -> NodeSummary {
		let meta = self.meta();
		let (size, owner, child_count) = match self {
			Self::Directory(d) => (None, None, Some(d.children.len())),
			Self::File(f) => (Some(f.size()), f.owner.clone(), None),
		};
		NodeSummary {
			name: meta.name.clone(),
			kind: self.kind(),
			path: meta.path.clone(),
			created: meta.created_at,
			modified: meta.modified_at,
			hidden: meta.hidden,
			size,
			owner,
			child_count,
		}
	}
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Listing / info view of a single node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: NodeKind,
	pub path: String,
	#[serde(with = "timestamp")]
	pub created: NaiveDateTime,
	#[serde(with = "timestamp")]
	pub modified: NaiveDateTime,
	pub hidden: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub owner: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub child_count: Option<usize>,
}

// ---------------------------------------------------------------------------
// Snapshot form
// ---------------------------------------------------------------------------

fn is_false(b: &bool) -> bool {
	!*b
}

fn default_now() -> NaiveDateTime {
	now()
}

/// Owned, nested node as persisted in `filesystem.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SnapshotNode {
	#[serde(rename = "dir", alias = "directory")]
	Directory {
		name: String,
		#[serde(default)]
		path: String,
		#[serde(with = "timestamp", default = "default_now")]
		created: NaiveDateTime,
		#[serde(with = "timestamp", default = "default_now")]
		modified: NaiveDateTime,
		#[serde(default, skip_serializing_if = "is_false")]
		hidden: bool,
		#[serde(default)]
		children: Vec<SnapshotNode>,
		#[serde(flatten)]
		extra: Map<String, Value>,
	},
	#[serde(rename = "file")]
	File {
		name: String,
		#[serde(default)]
		path: String,
		#[serde(with = "timestamp", default = "default_now")]
		created: NaiveDateTime,
		#[serde(with = "timestamp", default = "default_now")]
		modified: NaiveDateTime,
		#[serde(default, skip_serializing_if = "is_false")]
		hidden: bool,
		#[serde(default)]
		content: String,
		#[serde(default)]
		size: u64,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		owner: Option<String>,
		#[serde(flatten)]
		extra: Map<String, Value>,
	},
}

impl SnapshotNode {
	pub fn name(&self) -> &str {
		match self {
			Self::Directory { name, .. } | Self::File { name, .. } => name,
		}
	}

	pub fn path(&self) -> &str {
		match self {
			Self::Directory { path, .. } | Self::File { path, .. } => path,
		}
	}

	pub fn kind(&self) -> NodeKind {
		match self {
			Self::Directory { .. } => NodeKind::Directory,
			Self::File { .. } => NodeKind::File,
		}
	}

	pub fn children(&self) -> &[SnapshotNode] {
		match self {
			Self::Directory { children, .. } => children,
			Self::File { .. } => &[],
		}
	}

	/// Split into a childless live node plus the snapshot children.
	/// File sizes are re-derived from the content.
	pub(crate) fn into_parts(self) -> (Node, Vec<SnapshotNode>) {
		match self {
			Self::Directory {
				name,
				path,
				created,
				modified,
				hidden,
				children,
				extra,
			} => (
				Node::Directory(DirectoryNode {
					meta: NodeMeta {
						name,
						path,
						created_at: created,
						modified_at: modified,
						hidden,
						extra,
					},
					children: Vec::new(),
				}),
				children,
			),
			Self::File {
				name,
				path,
				created,
				modified,
				hidden,
				content,
				owner,
				extra,
				..
			} => (
				Node::File(FileNode {
					meta: NodeMeta {
						name,
						path,
						created_at: created,
						modified_at: modified,
						hidden,
						extra,
					},
					content,
					owner,
				}),
				Vec::new(),
			),
		}
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
