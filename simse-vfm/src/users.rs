// ---------------------------------------------------------------------------
// User store & access control
// ---------------------------------------------------------------------------
//
// `users.json` is read in any of three shapes:
//   { "users": [ { "username": ..., ... }, ... ] }
//   { "<username>": { ... }, ... }
//   [ { "username": ..., ... }, ... ]
// and always written back as the flat map.
//
// Password digests are unsalted SHA-256 hex, matching existing data files.
// `verify_password` does not look at account status; `authenticate` does.
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::VfmError;
use crate::node::TIMESTAMP_FORMAT;
use crate::path::{home_of, is_within, normalize_path, validate_name, HOME_PATH, SHARED_PATH};

pub const USERS_FILE: &str = "users.json";

/// Names that would collide with a bootstrap directory under `/home`.
const RESERVED_USERNAMES: &[&str] = &["shared"];

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Admin,
	#[default]
	User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
	#[default]
	Active,
	Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
	#[serde(alias = "password_hash", default)]
	pub password: String,
	#[serde(default)]
	pub role: Role,
	#[serde(alias = "created_at", default)]
	pub created_time: String,
	#[serde(default)]
	pub status: UserStatus,
}

/// Public view of a user, without the digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
	pub username: String,
	pub role: Role,
	pub created_time: String,
	pub status: UserStatus,
}

/// Lowercase hex SHA-256 of `plaintext`.
pub fn hash_password(plaintext: &str) -> String {
	let digest = Sha256::digest(plaintext.as_bytes());
	digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// ---------------------------------------------------------------------------
// UserStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct UserStore {
	path: Option<PathBuf>,
	users: BTreeMap<String, UserRecord>,
}

impl UserStore {
	/// In-memory store with no backing file.
	pub fn in_memory() -> Self {
		Self::default()
	}

	/// Load `data_dir/users.json`. A missing or unparsable file yields an
	/// empty store bound to that path.
	pub fn open(data_dir: &Path) -> Self {
		let path = data_dir.join(USERS_FILE);
		let users = match fs::read_to_string(&path) {
			Ok(raw) => match serde_json::from_str::<Value>(&raw) {
				Ok(value) => parse_users(value),
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "Failed to parse user store");
					BTreeMap::new()
				}
			},
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
			Err(e) => {
				tracing::warn!(path = %path.display(), error = %e, "Failed to read user store");
				BTreeMap::new()
			}
		};
		tracing::debug!(count = users.len(), "User store loaded");
		Self {
			path: Some(path),
			users,
		}
	}

	/// Write the canonical flat map. No-op for in-memory stores.
	pub fn save(&self) -> Result<(), VfmError> {
		let Some(path) = &self.path else {
			return Ok(());
		};
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let json = serde_json::to_string_pretty(&self.users)?;
		fs::write(path, json)?;
		Ok(())
	}

	// -- Queries ----------------------------------------------------------

	pub fn usernames(&self) -> impl Iterator<Item = &str> {
		self.users.keys().map(String::as_str)
	}

	pub fn get(&self, username: &str) -> Option<&UserRecord> {
		self.users.get(username)
	}

	pub fn contains(&self, username: &str) -> bool {
		self.users.contains_key(username)
	}

	pub fn len(&self) -> usize {
		self.users.len()
	}

	pub fn is_empty(&self) -> bool {
		self.users.is_empty()
	}

	pub fn list(&self) -> Vec<UserSummary> {
		self.users
			.iter()
			.map(|(name, rec)| UserSummary {
				username: name.clone(),
				role: rec.role,
				created_time: rec.created_time.clone(),
				status: rec.status,
			})
			.collect()
	}

	// -- Access control ---------------------------------------------------

	pub fn is_admin(&self, username: &str) -> bool {
		self.users
			.get(username)
			.is_some_and(|u| u.role == Role::Admin)
	}

	/// Path-prefix containment check. Admins may access everything; other
	/// users only their own home, the shared directory, and `/home` itself.
	/// The check is purely syntactic on the (normalized) path string.
	pub fn can_access(&self, username: &str, path: &str) -> bool {
		if self.is_admin(username) {
			return true;
		}
		let path = normalize_path(path);
		if !username.is_empty() && is_within(&path, &home_of(username)) {
			return true;
		}
		is_within(&path, SHARED_PATH) || path == HOME_PATH
	}

	/// Compare the digest of `plaintext` with the stored one. Account
	/// status is not consulted.
	pub fn verify_password(&self, username: &str, plaintext: &str) -> bool {
		self.users
			.get(username)
			.is_some_and(|u| u.password == hash_password(plaintext))
	}

	/// Credential check for the login flow: the password must match and
	/// the account must be active.
	pub fn authenticate(&self, username: &str, plaintext: &str) -> bool {
		self.verify_password(username, plaintext)
			&& self
				.users
				.get(username)
				.is_some_and(|u| u.status == UserStatus::Active)
	}

	// -- Administration ---------------------------------------------------

	/// Insert a new active user and persist the store.
	pub fn create_user(&mut self, username: &str, password: &str, role: Role) -> Result<(), VfmError> {
		if let Some(msg) = validate_name(username) {
			return Err(VfmError::InvalidName(msg));
		}
		if RESERVED_USERNAMES.contains(&username) {
			return Err(VfmError::InvalidName(format!("Username is reserved: {}", username)));
		}
		if self.users.contains_key(username) {
			return Err(VfmError::Collision(username.to_string()));
		}
		self.users.insert(
			username.to_string(),
			UserRecord {
				password: hash_password(password),
				role,
				created_time: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
				status: UserStatus::Active,
			},
		);
		self.save()?;
		tracing::info!(username, ?role, "User created");
		Ok(())
	}

	pub fn set_status(&mut self, username: &str, status: UserStatus) -> Result<(), VfmError> {
		let user = self
			.users
			.get_mut(username)
			.ok_or_else(|| VfmError::NotFound(format!("user {}", username)))?;
		user.status = status;
		self.save()?;
		tracing::info!(username, ?status, "User status changed");
		Ok(())
	}

	pub fn reset_password(&mut self, username: &str, password: &str) -> Result<(), VfmError> {
		let user = self
			.users
			.get_mut(username)
			.ok_or_else(|| VfmError::NotFound(format!("user {}", username)))?;
		user.password = hash_password(password);
		self.save()?;
		tracing::info!(username, "Password reset");
		Ok(())
	}
}

/// Accept the three historical shapes of `users.json`. Entries without a
/// username are skipped.
fn parse_users(value: Value) -> BTreeMap<String, UserRecord> {
	let list = match value {
		Value::Object(mut map) => match map.remove("users") {
			Some(Value::Array(list)) => list,
			other => {
				if let Some(v) = other {
					map.insert("users".to_string(), v);
				}
				return map
					.into_iter()
					.filter_map(|(name, rec)| record_from(rec).map(|r| (name, r)))
					.collect();
			}
		},
		Value::Array(list) => list,
		_ => return BTreeMap::new(),
	};
	list.into_iter()
		.filter_map(|entry| {
			let name = entry.get("username")?.as_str()?.to_string();
			if name.is_empty() {
				return None;
			}
			Some((name, record_from(entry)?))
		})
		.collect()
}

fn record_from(value: Value) -> Option<UserRecord> {
	match serde_json::from_value(value) {
		Ok(rec) => Some(rec),
		Err(e) => {
			tracing::warn!(error = %e, "Skipping malformed user record");
			None
		}
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn store() -> UserStore {
		let mut s = UserStore::in_memory();
		s.create_user("root", "toor", Role::Admin).unwrap();
		s.create_user("alice", "secret", Role::User).unwrap();
		s.create_user("bob", "hunter2", Role::User).unwrap();
		s
	}

	#[test]
	fn hash_is_lowercase_sha256_hex() {
		assert_eq!(
			hash_password("abc"),
			"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
		);
	}

	#[test]
	fn access_is_path_containment() {
		let s = store();
		assert!(s.can_access("alice", "/home/alice"));
		assert!(s.can_access("alice", "/home/alice/docs/deep"));
		assert!(s.can_access("alice", "/home/shared/x"));
		assert!(s.can_access("alice", "/home"));
		assert!(!s.can_access("alice", "/home/bob"));
		assert!(!s.can_access("alice", "/home/alice2"));
		assert!(!s.can_access("alice", "/system"));
		assert!(!s.can_access("alice", "/"));
		assert!(s.can_access("root", "/system/anything"));
		assert!(s.can_access("root", "/"));
	}

	#[test]
	fn access_normalizes_before_checking() {
		let s = store();
		assert!(!s.can_access("alice", "/home/alice/../bob"));
		assert!(s.can_access("alice", "/home/shared/../alice/"));
	}

	#[test]
	fn unknown_user_only_gets_public_paths() {
		let s = store();
		assert!(s.can_access("ghost", "/home/shared"));
		assert!(!s.can_access("ghost", "/home/alice"));
		assert!(!s.is_admin("ghost"));
	}

	#[test]
	fn verify_ignores_status_but_authenticate_does_not() {
		let mut s = store();
		s.set_status("alice", UserStatus::Disabled).unwrap();
		assert!(s.verify_password("alice", "secret"));
		assert!(!s.authenticate("alice", "secret"));
		assert!(s.authenticate("bob", "hunter2"));
		assert!(!s.verify_password("bob", "wrong"));
		assert!(!s.verify_password("nobody", "x"));
	}

	#[test]
	fn create_user_rejects_duplicates_and_reserved_names() {
		let mut s = store();
		assert!(matches!(
			s.create_user("alice", "x", Role::User),
			Err(VfmError::Collision(_))
		));
		assert!(matches!(
			s.create_user("shared", "x", Role::User),
			Err(VfmError::InvalidName(_))
		));
		assert!(matches!(
			s.create_user("a/b", "x", Role::User),
			Err(VfmError::InvalidName(_))
		));
	}

	#[test]
	fn reset_password_changes_digest() {
		let mut s = store();
		s.reset_password("bob", "new").unwrap();
		assert!(s.verify_password("bob", "new"));
		assert!(!s.verify_password("bob", "hunter2"));
		assert!(matches!(
			s.reset_password("ghost", "x"),
			Err(VfmError::NotFound(_))
		));
	}

	#[test]
	fn loads_flat_map_shape() {
		let dir = tempfile::tempdir().unwrap();
		let raw = serde_json::json!({
			"admin": {"password": hash_password("pw"), "role": "admin", "created_time": "2024-01-01 00:00:00", "status": "active"},
			"carol": {"password": hash_password("pw"), "role": "user"}
		});
		fs::write(dir.path().join(USERS_FILE), raw.to_string()).unwrap();
		let s = UserStore::open(dir.path());
		assert_eq!(s.usernames().collect::<Vec<_>>(), vec!["admin", "carol"]);
		assert!(s.is_admin("admin"));
		assert_eq!(s.get("carol").unwrap().status, UserStatus::Active);
	}

	#[test]
	fn loads_users_list_and_bare_list_shapes() {
		let dir = tempfile::tempdir().unwrap();
		let wrapped = serde_json::json!({"users": [
			{"username": "dave", "password_hash": hash_password("pw")},
			{"password": "orphan"}
		]});
		fs::write(dir.path().join(USERS_FILE), wrapped.to_string()).unwrap();
		let s = UserStore::open(dir.path());
		assert_eq!(s.usernames().collect::<Vec<_>>(), vec!["dave"]);
		assert!(s.verify_password("dave", "pw"));

		let bare = serde_json::json!([{"username": "erin"}, {"username": "frank", "role": "admin"}]);
		fs::write(dir.path().join(USERS_FILE), bare.to_string()).unwrap();
		let s = UserStore::open(dir.path());
		assert_eq!(s.len(), 2);
		assert!(s.is_admin("frank"));
	}

	#[test]
	fn save_writes_flat_map() {
		let dir = tempfile::tempdir().unwrap();
		let bare = serde_json::json!([{"username": "erin", "password": "abc"}]);
		fs::write(dir.path().join(USERS_FILE), bare.to_string()).unwrap();
		let mut s = UserStore::open(dir.path());
		s.create_user("gina", "pw", Role::User).unwrap();

		let raw = fs::read_to_string(dir.path().join(USERS_FILE)).unwrap();
		let v: Value = serde_json::from_str(&raw).unwrap();
		assert_eq!(v["erin"]["password"], "abc");
		assert_eq!(v["gina"]["status"], "active");
		assert_eq!(v["gina"]["role"], "user");
	}

	#[test]
	fn garbage_file_yields_empty_store() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join(USERS_FILE), "not json").unwrap();
		assert!(UserStore::open(dir.path()).is_empty());
	}
}
