use std::io::{self, Write};

use serde::Serialize;

#[derive(Serialize)]
struct JsonRpcResponse<'a> {
    jsonrpc: &'a str,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Serialize)]
struct JsonRpcErrorBody {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct JsonRpcNotification<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
}

/// One JSON object per line on `out` (stdout for the engine binary).
pub struct NdjsonTransport<W: Write = io::Stdout> {
    out: W,
}

impl Default for NdjsonTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NdjsonTransport {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> NdjsonTransport<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn write_response(&mut self, id: u64, result: serde_json::Value) {
        self.write_line(&JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        });
    }

    pub fn write_error(
        &mut self,
        id: u64,
        code: i32,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        self.write_line(&JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcErrorBody {
                code,
                message: message.into(),
                data,
            }),
        });
    }

    pub fn write_notification(&mut self, method: &str, params: serde_json::Value) {
        self.write_line(&JsonRpcNotification {
            jsonrpc: "2.0",
            method,
            params: Some(params),
        });
    }

    fn write_line(&mut self, value: &impl Serialize) {
        if let Err(e) = serde_json::to_writer(&mut self.out, value) {
            tracing::error!("Failed to serialize: {}", e);
            return;
        }
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(transport: NdjsonTransport<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(transport.into_inner())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn response_and_error_are_one_line_each() {
        let mut t = NdjsonTransport::with_writer(Vec::new());
        t.write_response(1, serde_json::json!({ "ok": true }));
        t.write_error(2, -32000, "boom", Some(serde_json::json!({ "vfmCode": "VFM_DENIED" })));
        let out = lines(t);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["jsonrpc"], "2.0");
        assert_eq!(out[0]["result"]["ok"], true);
        assert!(out[0].get("error").is_none());
        assert_eq!(out[1]["error"]["code"], -32000);
        assert_eq!(out[1]["error"]["data"]["vfmCode"], "VFM_DENIED");
    }

    #[test]
    fn notification_has_no_id() {
        let mut t = NdjsonTransport::with_writer(Vec::new());
        t.write_notification("fs/changed", serde_json::json!({ "path": "/home" }));
        let out = lines(t);
        assert!(out[0].get("id").is_none());
        assert_eq!(out[0]["method"], "fs/changed");
    }
}
