// ---------------------------------------------------------------------------
// VfmServer: JSON-RPC dispatcher
// ---------------------------------------------------------------------------
//
// Routes incoming JSON-RPC 2.0 requests (NDJSON over stdin) to FileManager
// operations: a main `run()` loop, a `dispatch()` match, and free-standing
// handler functions for each method. Successful tree mutations are followed
// by an `fs/changed` notification naming the directory that changed.
// ---------------------------------------------------------------------------

use std::io::{self, BufRead, Write};

use crate::error::VfmError;
use crate::fs::FileManager;
use crate::monitor::ReportedMetrics;
use crate::path::normalize_path;
use crate::protocol::*;
use crate::transport::NdjsonTransport;
use crate::users::Role;

const DEFAULT_SUMMARY_HOURS: i64 = 24;
const DEFAULT_LOG_RETENTION_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Handler errors
// ---------------------------------------------------------------------------

enum HandlerError {
	Params(String),
	Vfm(VfmError),
}

impl From<VfmError> for HandlerError {
	fn from(e: VfmError) -> Self {
		Self::Vfm(e)
	}
}

type HandlerResult = Result<serde_json::Value, HandlerError>;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// JSON-RPC server that dispatches requests to a [`FileManager`].
pub struct VfmServer<W: Write = io::Stdout> {
	transport: NdjsonTransport<W>,
	manager: FileManager,
	metrics: ReportedMetrics,
}

impl<W: Write> VfmServer<W> {
	pub fn new(transport: NdjsonTransport<W>, manager: FileManager) -> Self {
		Self {
			transport,
			manager,
			metrics: ReportedMetrics::new(),
		}
	}

	/// Main loop: read JSON-RPC messages from stdin, dispatch to handlers.
	pub fn run(&mut self) -> Result<(), VfmError> {
		let stdin = io::stdin();
		self.run_with(stdin.lock())
	}

	pub fn run_with<R: BufRead>(&mut self, reader: R) -> Result<(), VfmError> {
		for line_result in reader.lines() {
			let line = line_result?;
			if line.trim().is_empty() {
				continue;
			}

			let request: JsonRpcRequest = match serde_json::from_str(&line) {
				Ok(r) => r,
				Err(e) => {
					tracing::error!("Failed to parse request: {}", e);
					continue;
				}
			};

			self.dispatch(request);
		}

		if let Err(e) = self.manager.save_monitor_data() {
			tracing::error!("Failed to save monitor data on shutdown: {}", e);
		}
		Ok(())
	}

	pub fn manager(&self) -> &FileManager {
		&self.manager
	}

	pub fn into_writer(self) -> W {
		self.transport.into_inner()
	}

	// ── Dispatch ──────────────────────────────────────────────────────────

	fn dispatch(&mut self, req: JsonRpcRequest) {
		let id = req.id;
		let changed = changed_directory(&req.method, &req.params);
		let fm = &mut self.manager;
		let result = match req.method.as_str() {
			// -- Reads ---------------------------------------------------
			"fs/list" => handle_list(fm, req.params),
			"fs/info" => handle_info(fm, req.params),
			"fs/tree" => handle_tree(fm, req.params),
			"fs/read" => handle_read(fm, req.params),

			// -- Mutations -----------------------------------------------
			"fs/create" => handle_create(fm, req.params),
			"fs/delete" => handle_delete(fm, req.params),
			"fs/rename" => handle_rename(fm, req.params),
			"fs/write" => handle_write(fm, req.params),
			"fs/copyItem" => handle_copy_item(fm, req.params),
			"fs/moveItem" => handle_move_item(fm, req.params),
			"fs/setHidden" => handle_set_hidden(fm, req.params),
			"fs/save" => fm
				.save()
				.map(|()| serde_json::json!({}))
				.map_err(HandlerError::from),

			// -- Clipboard -----------------------------------------------
			"clipboard/copy" => handle_stage(fm, req.params, false),
			"clipboard/cut" => handle_stage(fm, req.params, true),
			"clipboard/paste" => handle_paste(fm, req.params),
			"clipboard/info" => to_value(&fm.clipboard_info()),
			"clipboard/clear" => {
				fm.clear_clipboard();
				Ok(serde_json::json!({}))
			}

			// -- Auth ----------------------------------------------------
			"auth/verify" => handle_verify(fm, req.params),
			"auth/login" => handle_login(fm, req.params),
			"auth/isAdmin" => handle_is_admin(fm, req.params),
			"auth/canAccess" => handle_can_access(fm, req.params),

			// -- Users ---------------------------------------------------
			"users/create" => handle_create_user(fm, req.params),
			"users/list" => Ok(serde_json::json!({ "users": fm.users().list() })),
			"users/setStatus" => handle_set_status(fm, req.params),
			"users/resetPassword" => handle_reset_password(fm, req.params),

			// -- Cache / monitor -----------------------------------------
			"cache/stats" => to_value(&fm.cache_stats()),
			"monitor/summary" => handle_summary(fm, req.params),
			"monitor/rebuildIndex" => Ok(serde_json::json!({ "keys": fm.rebuild_index() })),
			"monitor/search" => handle_search(fm, req.params),
			"monitor/diskUsage" => to_value(&fm.disk_usage()),
			"monitor/reportMetrics" => handle_report_metrics(&self.metrics, req.params),
			"monitor/performance" => to_value(&fm.performance(&self.metrics)),
			"monitor/health" => to_value(&fm.health_report(&self.metrics)),
			"monitor/cleanupLogs" => handle_cleanup_logs(fm, req.params),
			"monitor/save" => fm
				.save_monitor_data()
				.map(|()| serde_json::json!({}))
				.map_err(HandlerError::from),

			// -- Unknown -------------------------------------------------
			_ => {
				self.transport.write_error(
					id,
					METHOD_NOT_FOUND,
					format!("Unknown method: {}", req.method),
					None,
				);
				return;
			}
		};

		match result {
			Ok(value) => {
				self.transport.write_response(id, value);
				if let Some(path) = changed {
					self.transport
						.write_notification("fs/changed", serde_json::json!({ "path": path }));
				}
			}
			Err(HandlerError::Params(message)) => {
				self.transport.write_error(id, INVALID_PARAMS, message, None)
			}
			Err(HandlerError::Vfm(e)) => self.transport.write_error(
				id,
				VFM_ERROR,
				e.to_string(),
				Some(e.to_json_rpc_error()),
			),
		}
	}
}

/// Directory whose listing a successful call of `method` changes.
fn changed_directory(method: &str, params: &serde_json::Value) -> Option<String> {
	let key = match method {
		"fs/create" | "fs/delete" | "fs/rename" | "fs/write" | "fs/setHidden" => "parentPath",
		"fs/copyItem" | "fs/moveItem" => "destination",
		"clipboard/paste" => "targetPath",
		_ => return None,
	};
	let path = normalize_path(params.get(key)?.as_str()?);
	Some(match key {
		"destination" => crate::path::parent_path(&path).unwrap_or(path),
		_ => path,
	})
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, HandlerError> {
	serde_json::from_value(params).map_err(|e| HandlerError::Params(format!("Invalid params: {}", e)))
}

fn to_value(value: &impl serde::Serialize) -> HandlerResult {
	serde_json::to_value(value).map_err(|e| HandlerError::Vfm(e.into()))
}

// ---------------------------------------------------------------------------
// fs/* handlers
// ---------------------------------------------------------------------------

fn handle_list(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: ListParams = parse_params(params)?;
	let items = fm.list(&p.path, &p.username, p.show_hidden)?;
	Ok(serde_json::json!({ "items": items }))
}

fn handle_info(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: InfoParams = parse_params(params)?;
	to_value(&fm.info(&p.path, &p.username, p.kind)?)
}

fn handle_tree(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: UsernameParams = parse_params(params)?;
	let root = fm.full_tree(&p.username)?;
	Ok(serde_json::json!({ "root": root }))
}

fn handle_read(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: ReadParams = parse_params(params)?;
	let content = fm.read(&p.path, &p.username)?;
	Ok(serde_json::json!({ "content": content }))
}

fn handle_create(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: CreateParams = parse_params(params)?;
	let path = fm.create(&p.parent_path, &p.name, p.kind, p.content.as_deref(), &p.username)?;
	Ok(serde_json::json!({ "path": path }))
}

fn handle_delete(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: ItemParams = parse_params(params)?;
	fm.delete(&p.parent_path, &p.name, p.kind, &p.username)?;
	Ok(serde_json::json!({}))
}

fn handle_rename(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: RenameParams = parse_params(params)?;
	let path = fm.rename(&p.parent_path, &p.old_name, &p.new_name, p.kind, &p.username)?;
	Ok(serde_json::json!({ "path": path }))
}

fn handle_write(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: WriteParams = parse_params(params)?;
	fm.write(&p.parent_path, &p.name, &p.content, &p.username)?;
	Ok(serde_json::json!({}))
}

fn handle_copy_item(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: TransferParams = parse_params(params)?;
	let path = fm.copy_single(&p.source, &p.destination, p.kind, &p.username)?;
	Ok(serde_json::json!({ "path": path }))
}

fn handle_move_item(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: TransferParams = parse_params(params)?;
	let path = fm.move_single(&p.source, &p.destination, p.kind, &p.username)?;
	Ok(serde_json::json!({ "path": path }))
}

fn handle_set_hidden(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: SetHiddenParams = parse_params(params)?;
	let item = p.item;
	fm.set_hidden(&item.parent_path, &item.name, item.kind, p.hidden, &item.username)?;
	Ok(serde_json::json!({}))
}

// ---------------------------------------------------------------------------
// clipboard/* handlers
// ---------------------------------------------------------------------------

fn handle_stage(fm: &mut FileManager, params: serde_json::Value, cut: bool) -> HandlerResult {
	let p: StageParams = parse_params(params)?;
	let count = if cut {
		fm.cut(&p.source_path, &p.items, &p.username)?
	} else {
		fm.copy(&p.source_path, &p.items, &p.username)?
	};
	Ok(serde_json::json!({ "count": count }))
}

fn handle_paste(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: PasteParams = parse_params(params)?;
	let paths = fm.paste(&p.target_path, &p.username)?;
	Ok(serde_json::json!({ "paths": paths }))
}

// ---------------------------------------------------------------------------
// auth/* and users/* handlers
// ---------------------------------------------------------------------------

fn handle_verify(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: CredentialsParams = parse_params(params)?;
	let valid = fm.users().verify_password(&p.username, &p.password);
	Ok(serde_json::json!({ "valid": valid }))
}

fn handle_login(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: CredentialsParams = parse_params(params)?;
	let authenticated = fm.users().authenticate(&p.username, &p.password);
	if !authenticated {
		tracing::warn!(username = %p.username, "Login rejected");
	}
	Ok(serde_json::json!({
		"authenticated": authenticated,
		"isAdmin": authenticated && fm.users().is_admin(&p.username),
	}))
}

fn handle_is_admin(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: UsernameParams = parse_params(params)?;
	Ok(serde_json::json!({ "isAdmin": fm.users().is_admin(&p.username) }))
}

fn handle_can_access(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: CanAccessParams = parse_params(params)?;
	Ok(serde_json::json!({ "allowed": fm.users().can_access(&p.username, &p.path) }))
}

/// Anyone may register a plain user. Creating an admin needs an admin
/// actor, except for the very first account.
fn handle_create_user(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: CreateUserParams = parse_params(params)?;
	if p.role == Role::Admin && !fm.users().is_empty() {
		let allowed = p.actor.as_deref().is_some_and(|a| fm.users().is_admin(a));
		if !allowed {
			tracing::warn!(actor = ?p.actor, username = %p.username, "Admin creation denied");
			return Err(VfmError::Denied(format!("create admin {}", p.username)).into());
		}
	}
	let home = fm.create_user(&p.username, &p.password, p.role)?;
	Ok(serde_json::json!({ "home": home }))
}

fn handle_set_status(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: SetStatusParams = parse_params(params)?;
	if !fm.users().is_admin(&p.actor) {
		tracing::warn!(actor = %p.actor, username = %p.username, "Status change denied");
		return Err(VfmError::Denied(format!("set status of {}", p.username)).into());
	}
	fm.set_user_status(&p.username, p.status)?;
	Ok(serde_json::json!({}))
}

/// Admins may reset any password; users only their own.
fn handle_reset_password(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: ResetPasswordParams = parse_params(params)?;
	if p.actor != p.username && !fm.users().is_admin(&p.actor) {
		tracing::warn!(actor = %p.actor, username = %p.username, "Password reset denied");
		return Err(VfmError::Denied(format!("reset password of {}", p.username)).into());
	}
	fm.reset_password(&p.username, &p.password)?;
	Ok(serde_json::json!({}))
}

// ---------------------------------------------------------------------------
// monitor/* handlers
// ---------------------------------------------------------------------------

fn handle_summary(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: SummaryParams = parse_params(params)?;
	to_value(&fm.access_summary(p.hours.unwrap_or(DEFAULT_SUMMARY_HOURS)))
}

fn handle_search(fm: &FileManager, params: serde_json::Value) -> HandlerResult {
	let p: SearchParams = parse_params(params)?;
	Ok(serde_json::json!({ "paths": fm.search(&p.query) }))
}

fn handle_report_metrics(metrics: &ReportedMetrics, params: serde_json::Value) -> HandlerResult {
	let p: ReportMetricsParams = parse_params(params)?;
	metrics.report(p.metrics);
	Ok(serde_json::json!({}))
}

fn handle_cleanup_logs(fm: &mut FileManager, params: serde_json::Value) -> HandlerResult {
	let p: CleanupLogsParams = parse_params(params)?;
	let removed = fm.cleanup_old_logs(p.days.unwrap_or(DEFAULT_LOG_RETENTION_DAYS))?;
	Ok(serde_json::json!({ "removed": removed }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::FileManagerConfig;
	use serde_json::{json, Value};

	fn run(requests: &[Value]) -> Vec<Value> {
		let dir = tempfile::tempdir().unwrap();
		let manager = FileManager::open(FileManagerConfig::new(dir.path())).unwrap();
		let mut server = VfmServer::new(NdjsonTransport::with_writer(Vec::new()), manager);
		let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
		server.run_with(input.as_bytes()).unwrap();
		String::from_utf8(server.into_writer())
			.unwrap()
			.lines()
			.map(|l| serde_json::from_str(l).unwrap())
			.collect()
	}

	fn req(id: u64, method: &str, params: Value) -> Value {
		json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
	}

	fn responses(out: &[Value]) -> Vec<&Value> {
		out.iter().filter(|v| v.get("id").is_some()).collect()
	}

	fn bootstrap() -> Vec<Value> {
		vec![
			req(1, "users/create", json!({ "username": "admin", "password": "pw", "role": "admin" })),
			req(2, "users/create", json!({ "username": "alice", "password": "pw" })),
		]
	}

	#[test]
	fn unknown_method_is_method_not_found() {
		let out = run(&[req(1, "fs/teleport", json!({}))]);
		assert_eq!(out[0]["error"]["code"], METHOD_NOT_FOUND);
	}

	#[test]
	fn bad_params_are_invalid_params() {
		let out = run(&[req(1, "fs/list", json!({ "path": 5 }))]);
		assert_eq!(out[0]["error"]["code"], INVALID_PARAMS);
	}

	#[test]
	fn malformed_lines_are_skipped() {
		let dir = tempfile::tempdir().unwrap();
		let manager = FileManager::open(FileManagerConfig::new(dir.path())).unwrap();
		let mut server = VfmServer::new(NdjsonTransport::with_writer(Vec::new()), manager);
		let input = "not json\n\n{\"id\":7,\"method\":\"cache/stats\"}\n";
		server.run_with(input.as_bytes()).unwrap();
		let out = String::from_utf8(server.into_writer()).unwrap();
		assert_eq!(out.lines().count(), 1);
		assert!(out.contains("\"id\":7"));
	}

	#[test]
	fn create_then_read_and_notify() {
		let mut reqs = bootstrap();
		reqs.push(req(
			3,
			"fs/create",
			json!({ "username": "alice", "parentPath": "/home/alice", "name": "a.txt", "type": "file", "content": "hi" }),
		));
		reqs.push(req(4, "fs/read", json!({ "username": "alice", "path": "/home/alice/a.txt" })));
		let out = run(&reqs);

		let resp = responses(&out);
		assert_eq!(resp[2]["result"]["path"], "/home/alice/a.txt");
		assert_eq!(resp[3]["result"]["content"], "hi");

		let note = out.iter().find(|v| v["method"] == "fs/changed").unwrap();
		assert_eq!(note["params"]["path"], "/home/alice");
	}

	#[test]
	fn denial_carries_vfm_code() {
		let mut reqs = bootstrap();
		reqs.push(req(3, "fs/list", json!({ "username": "alice", "path": "/system" })));
		let out = run(&reqs);
		let err = &responses(&out)[2]["error"];
		assert_eq!(err["code"], VFM_ERROR);
		assert_eq!(err["data"]["vfmCode"], "VFM_DENIED");
	}

	#[test]
	fn second_admin_needs_admin_actor() {
		let mut reqs = bootstrap();
		reqs.push(req(3, "users/create", json!({ "username": "eve", "password": "x", "role": "admin", "actor": "alice" })));
		reqs.push(req(4, "users/create", json!({ "username": "root2", "password": "x", "role": "admin", "actor": "admin" })));
		let out = run(&reqs);
		let resp = responses(&out);
		assert_eq!(resp[2]["error"]["data"]["vfmCode"], "VFM_DENIED");
		assert_eq!(resp[3]["result"]["home"], "/home/root2");
	}

	#[test]
	fn login_respects_status() {
		let mut reqs = bootstrap();
		reqs.push(req(3, "users/setStatus", json!({ "actor": "admin", "username": "alice", "status": "disabled" })));
		reqs.push(req(4, "auth/login", json!({ "username": "alice", "password": "pw" })));
		reqs.push(req(5, "auth/verify", json!({ "username": "alice", "password": "pw" })));
		let out = run(&reqs);
		let resp = responses(&out);
		assert_eq!(resp[3]["result"]["authenticated"], false);
		assert_eq!(resp[4]["result"]["valid"], true);
	}

	#[test]
	fn health_uses_reported_metrics() {
		let reqs = vec![
			req(1, "monitor/reportMetrics", json!({ "cpuPercent": 90.0, "memoryPercent": 95.0 })),
			req(2, "monitor/health", json!({})),
		];
		let out = run(&reqs);
		let report = &out[1]["result"];
		// cpu -20, memory -20, hit rate 0 -15
		assert_eq!(report["healthScore"], 45);
		assert_eq!(report["performance"]["cpuPercent"], 90.0);
	}

	#[test]
	fn clipboard_round_trip_over_rpc() {
		let mut reqs = bootstrap();
		reqs.push(req(
			3,
			"fs/create",
			json!({ "username": "alice", "parentPath": "/home/alice", "name": "d", "type": "dir" }),
		));
		reqs.push(req(
			4,
			"clipboard/cut",
			json!({ "username": "alice", "sourcePath": "/home/alice", "items": [{ "name": "d", "type": "dir" }] }),
		));
		reqs.push(req(5, "clipboard/info", json!({})));
		reqs.push(req(6, "clipboard/paste", json!({ "username": "alice", "targetPath": "/home/shared" })));
		reqs.push(req(7, "fs/list", json!({ "username": "alice", "path": "/home/alice" })));
		let out = run(&reqs);
		let resp = responses(&out);
		assert_eq!(resp[3]["result"]["count"], 1);
		assert_eq!(resp[4]["result"]["items"][0], "d (dir)");
		assert_eq!(resp[5]["result"]["paths"][0], "/home/shared/d");
		assert_eq!(resp[6]["result"]["items"].as_array().unwrap().len(), 0);
	}

	#[test]
	fn tree_is_filtered_by_caller() {
		let mut reqs = bootstrap();
		reqs.push(req(3, "users/create", json!({ "username": "bob", "password": "pw" })));
		reqs.push(req(
			4,
			"fs/create",
			json!({ "username": "bob", "parentPath": "/home/bob", "name": "secret.txt", "type": "file", "content": "s" }),
		));
		reqs.push(req(5, "fs/tree", json!({ "username": "alice" })));
		reqs.push(req(6, "fs/tree", json!({ "username": "admin" })));
		reqs.push(req(7, "fs/tree", json!({})));
		let out = run(&reqs);
		let resp = responses(&out);

		let alice = resp[4]["result"]["root"].to_string();
		assert!(alice.contains("/home/alice"));
		assert!(!alice.contains("/home/bob"));
		assert!(!alice.contains("secret.txt"));
		assert!(resp[5]["result"]["root"].to_string().contains("/home/bob/secret.txt"));
		assert_eq!(resp[6]["error"]["code"], INVALID_PARAMS);
	}

	#[test]
	fn reset_password_needs_self_or_admin() {
		let mut reqs = bootstrap();
		reqs.push(req(3, "users/create", json!({ "username": "bob", "password": "pw" })));
		reqs.push(req(4, "users/resetPassword", json!({ "actor": "bob", "username": "alice", "password": "x" })));
		reqs.push(req(5, "users/resetPassword", json!({ "actor": "alice", "username": "alice", "password": "a2" })));
		reqs.push(req(6, "users/resetPassword", json!({ "actor": "admin", "username": "bob", "password": "b2" })));
		reqs.push(req(7, "auth/verify", json!({ "username": "alice", "password": "a2" })));
		reqs.push(req(8, "auth/verify", json!({ "username": "bob", "password": "b2" })));
		reqs.push(req(9, "users/resetPassword", json!({ "actor": "admin", "username": "ghost", "password": "x" })));
		let out = run(&reqs);
		let resp = responses(&out);
		assert_eq!(resp[3]["error"]["data"]["vfmCode"], "VFM_DENIED");
		assert!(resp[4]["result"].is_object());
		assert!(resp[5]["result"].is_object());
		assert_eq!(resp[6]["result"]["valid"], true);
		assert_eq!(resp[7]["result"]["valid"], true);
		assert_eq!(resp[8]["error"]["data"]["vfmCode"], "VFM_NOT_FOUND");
	}
}
