use serde::Deserialize;

use crate::clipboard::ItemRef;
use crate::monitor::SystemMetrics;
use crate::node::NodeKind;
use crate::users::{Role, UserStatus};

// ── JSON-RPC 2.0 error codes ────────────────────────────────────────────────

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const VFM_ERROR: i32 = -32000;

// ── Incoming request ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

// ── fs/* params ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub username: String,
    pub path: String,
    #[serde(default)]
    pub show_hidden: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoParams {
    pub username: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: Option<NodeKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    pub username: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    pub username: String,
    pub parent_path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub content: Option<String>,
}

/// Target of delete and setHidden: a named child of `parent_path`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemParams {
    pub username: String,
    pub parent_path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameParams {
    pub username: String,
    pub parent_path: String,
    pub old_name: String,
    pub new_name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteParams {
    pub username: String,
    pub parent_path: String,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    pub username: String,
    pub source: String,
    pub destination: String,
    #[serde(rename = "type")]
    pub kind: Option<NodeKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetHiddenParams {
    #[serde(flatten)]
    pub item: ItemParams,
    pub hidden: bool,
}

// ── clipboard/* params ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageParams {
    pub username: String,
    pub source_path: String,
    pub items: Vec<ItemRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteParams {
    pub username: String,
    pub target_path: String,
}

// ── auth/* and users/* params ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsParams {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameParams {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanAccessParams {
    pub username: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserParams {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    /// Required (and must be an admin) when `role` is admin.
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatusParams {
    pub actor: String,
    pub username: String,
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordParams {
    pub actor: String,
    pub username: String,
    pub password: String,
}

// ── monitor/* params ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryParams {
    pub hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetricsParams {
    #[serde(flatten)]
    pub metrics: SystemMetrics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupLogsParams {
    pub days: Option<i64>,
}
