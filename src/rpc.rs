//! Line-delimited JSON-RPC loop over stdio.
//!
//! Each request line is `{ "id": ..., "method": "...", "params": {...} }`.
//! The reply is `{ "id": ..., "ok": true, "result": ... }` or
//! `{ "id": ..., "ok": false, "error": { code, message, path?, suggestion } }`.
//! Malformed frames produce an error reply, never a crash.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sandfs_core::error::{ErrorCode, ServiceError};
use sandfs_core::ops::FsService;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Catalog of method names, surfaced by the `tools` method.
const METHODS: &[&str] = &[
    "initialize",
    "list",
    "tree",
    "find",
    "grep",
    "read",
    "readMany",
    "stat",
    "statMany",
    "checksum",
    "write",
    "patch",
    "roots",
    "tools",
    "shutdown",
];

/// Run the request loop until stdin closes or a `shutdown` method arrives.
pub async fn serve(service: FsService) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await.context("reading request line")? {
        if line.trim().is_empty() {
            continue;
        }

        let (reply, shutdown) = handle_line(&service, &line).await;
        let mut payload = serde_json::to_vec(&reply).context("serializing reply")?;
        payload.push(b'\n');
        stdout.write_all(&payload).await.context("writing reply")?;
        stdout.flush().await.context("flushing stdout")?;

        if shutdown {
            break;
        }
    }
    Ok(())
}

async fn handle_line(service: &FsService, line: &str) -> (Value, bool) {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, "malformed request frame");
            let err =
                ServiceError::invalid_input(format!("Malformed request: {error}")).to_envelope();
            return (json!({ "id": null, "ok": false, "error": err }), false);
        }
    };

    let id = request.id.clone();
    debug!(method = %request.method, "dispatching request");
    if request.method == "shutdown" {
        return (json!({ "id": id, "ok": true, "result": { "stopping": true } }), true);
    }

    let reply = match dispatch(service, &request).await {
        Ok(result) => json!({ "id": id, "ok": true, "result": result }),
        Err(error) => json!({ "id": id, "ok": false, "error": error.to_envelope() }),
    };
    (reply, false)
}

async fn dispatch(service: &FsService, request: &Request) -> Result<Value, ServiceError> {
    // No caller-side abort channel exists on plain stdio; deadlines come from
    // the per-request `timeoutMs` and still flow through the same signal.
    let cancel: Option<CancellationToken> = None;

    fn params<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, ServiceError> {
        serde_json::from_value(value.clone())
            .map_err(|e| ServiceError::invalid_input(format!("Invalid params: {e}")))
    }

    fn result<T: serde::Serialize>(value: T) -> Result<Value, ServiceError> {
        serde_json::to_value(value).map_err(|e| {
            ServiceError::new(ErrorCode::Unknown, format!("Result serialization failed: {e}"))
        })
    }

    match request.method.as_str() {
        "list" => result(service.list(params(&request.params)?, cancel).await?),
        "tree" => result(service.tree(params(&request.params)?, cancel).await?),
        "find" => result(service.find(params(&request.params)?, cancel).await?),
        "grep" => result(service.grep(params(&request.params)?, cancel).await?),
        "read" => result(service.read(params(&request.params)?, cancel).await?),
        "readMany" => result(service.read_many(params(&request.params)?, cancel).await?),
        "stat" => result(service.stat(params(&request.params)?, cancel).await?),
        "statMany" => result(service.stat_many(params(&request.params)?, cancel).await?),
        "checksum" => result(service.checksum(params(&request.params)?, cancel).await?),
        "write" => result(service.write(params(&request.params)?, cancel).await?),
        "patch" => result(service.patch(params(&request.params)?, cancel).await?),
        "initialize" => result(json!({
            "name": "sandfs",
            "version": env!("CARGO_PKG_VERSION"),
            "methods": METHODS,
        })),
        "roots" => {
            let roots: Vec<String> = service
                .roots()
                .entries()
                .iter()
                .map(|entry| entry.path.display().to_string())
                .collect();
            result(json!({ "roots": roots }))
        }
        "tools" => result(json!({ "methods": METHODS })),
        other => Err(ServiceError::invalid_input(format!(
            "Unknown method '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sandfs_core::roots::RootSet;

    fn service(dir: &std::path::Path) -> FsService {
        FsService::new(RootSet::resolve(&[dir.to_path_buf()], false).unwrap())
    }

    #[tokio::test]
    async fn dispatches_list_requests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let service = service(dir.path());

        let line = format!(
            r#"{{"id":1,"method":"list","params":{{"path":"{}"}}}}"#,
            dir.path().display()
        );
        let (reply, shutdown) = handle_line(&service, &line).await;
        assert!(!shutdown);
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["entries"][0]["name"], "a.txt");
    }

    #[tokio::test]
    async fn malformed_frames_return_error_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let (reply, _) = handle_line(&service, "not json at all").await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "E_INVALID_INPUT");
    }

    #[tokio::test]
    async fn unknown_method_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let (reply, _) = handle_line(&service, r#"{"id":7,"method":"explode"}"#).await;
        assert_eq!(reply["ok"], false);
        assert!(
            reply["error"]["message"]
                .as_str()
                .unwrap()
                .contains("explode")
        );
    }

    #[tokio::test]
    async fn errors_carry_code_and_suggestion() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let line = format!(
            r#"{{"id":2,"method":"read","params":{{"path":"{}/missing.txt"}}}}"#,
            dir.path().display()
        );
        let (reply, _) = handle_line(&service, &line).await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "E_NOT_FOUND");
        assert!(reply["error"]["suggestion"].as_str().is_some());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let (reply, shutdown) = handle_line(&service, r#"{"id":9,"method":"shutdown"}"#).await;
        assert!(shutdown);
        assert_eq!(reply["ok"], true);
    }
}
