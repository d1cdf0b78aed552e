use thiserror::Error;

#[derive(Debug, Error)]
pub enum VfmError {
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Access denied: {0}")]
	Denied(String),
	#[error("Name already in use: {0}")]
	Collision(String),
	#[error("Invalid state: {0}")]
	InvalidState(String),
	#[error("Invalid name: {0}")]
	InvalidName(String),
	#[error("Protected path: {0}")]
	Protected(String),
	#[error("Persistence failure: {0}")]
	Persistence(String),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl VfmError {
	pub fn code(&self) -> &str {
		match self {
			Self::NotFound(_) => "VFM_NOT_FOUND",
			Self::Denied(_) => "VFM_DENIED",
			Self::Collision(_) => "VFM_COLLISION",
			Self::InvalidState(_) => "VFM_INVALID_STATE",
			Self::InvalidName(_) => "VFM_INVALID_NAME",
			Self::Protected(_) => "VFM_PROTECTED",
			Self::Persistence(_) => "VFM_PERSISTENCE",
			Self::Io(_) => "VFM_IO_ERROR",
			Self::Json(_) => "VFM_JSON_ERROR",
		}
	}

	pub fn to_json_rpc_error(&self) -> serde_json::Value {
		serde_json::json!({
			"vfmCode": self.code(),
			"message": self.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codes_are_stable() {
		assert_eq!(VfmError::NotFound("x".into()).code(), "VFM_NOT_FOUND");
		assert_eq!(VfmError::Denied("x".into()).code(), "VFM_DENIED");
		assert_eq!(VfmError::Collision("x".into()).code(), "VFM_COLLISION");
	}

	#[test]
	fn json_rpc_payload_carries_code_and_message() {
		let err = VfmError::InvalidState("Clipboard is empty".into());
		let v = err.to_json_rpc_error();
		assert_eq!(v["vfmCode"], "VFM_INVALID_STATE");
		assert_eq!(v["message"], "Invalid state: Clipboard is empty");
	}
}
