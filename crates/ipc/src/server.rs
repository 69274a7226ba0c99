//! IPC server
//!
//! Binds a Unix socket, accepts connections, and dispatches newline-delimited
//! JSON-RPC requests to an [`IpcHandler`] implementation.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    RpcRequest, RpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR,
};

/// Error returned by a handler, carried to the client as a JSON-RPC error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub code: i32,
    pub message: String,
}

impl HandlerError {
    pub fn method_not_found(method: &str) -> Self {
        Self { code: METHOD_NOT_FOUND, message: format!("Method not found: {}", method) }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self { code: INVALID_PARAMS, message: message.into() }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self { code: SERVER_ERROR, message: message.into() }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Trait that services implement to handle IPC requests.
pub trait IpcHandler: Send + Sync + 'static {
    fn handle(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send + '_>>;
}

/// Decode one request line, run it through the handler, and build the reply.
pub async fn dispatch(handler: &dyn IpcHandler, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(req) => {
            debug!("IPC request: method={} id={}", req.method, req.id);
            match handler.handle(&req.method, req.params).await {
                Ok(result) => RpcResponse::success(req.id, result),
                Err(e) => RpcResponse::error(Some(req.id), e.code, e.message),
            }
        }
        Err(e) => {
            warn!("Invalid JSON-RPC request: {}", e);
            RpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e))
        }
    }
}

/// IPC server that accepts connections and dispatches to a handler.
pub struct IpcServer {
    socket_path: PathBuf,
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self { socket_path: socket_path.as_ref().to_path_buf() }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale file left by an earlier run.
    #[cfg(unix)]
    pub fn bind(&self) -> std::io::Result<tokio::net::UnixListener> {
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = tokio::net::UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {}", self.socket_path.display());
        Ok(listener)
    }

    /// [`bind`](Self::bind) then [`serve`](Self::serve).
    #[cfg(unix)]
    pub async fn run(
        &self,
        handler: Arc<dyn IpcHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let listener = self.bind()?;
        self.serve(listener, handler, shutdown).await;
        Ok(())
    }

    /// Accept connections until `shutdown` flips to `true` or its sender is dropped.
    #[cfg(unix)]
    pub async fn serve(
        &self,
        listener: tokio::net::UnixListener,
        handler: Arc<dyn IpcHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        tokio::spawn(Self::handle_connection(stream, handler.clone()));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("IPC server stopped");
    }

    #[cfg(unix)]
    async fn handle_connection(stream: tokio::net::UnixStream, handler: Arc<dyn IpcHandler>) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("IPC client disconnected");
                    break;
                }
                Ok(_) => {
                    let request = line.trim();
                    if request.is_empty() {
                        continue;
                    }

                    let response = dispatch(handler.as_ref(), request).await;
                    let json = match serde_json::to_string(&response) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to encode IPC response: {}", e);
                            break;
                        }
                    };
                    if writer.write_all(format!("{}\n", json).as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("IPC read error: {}", e);
                    break;
                }
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        #[cfg(unix)]
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{IpcClient, IpcError};

    struct Echo;

    impl IpcHandler for Echo {
        fn handle(
            &self,
            method: &str,
            params: Option<Value>,
        ) -> Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send + '_>> {
            let method = method.to_string();
            Box::pin(async move {
                match method.as_str() {
                    "echo" => Ok(params.unwrap_or(Value::Null)),
                    "fail" => Err(HandlerError::server("boom")),
                    other => Err(HandlerError::method_not_found(other)),
                }
            })
        }
    }

    #[tokio::test]
    async fn test_dispatch_success_and_errors() {
        let ok = dispatch(&Echo, r#"{"jsonrpc":"2.0","method":"echo","params":{"a":1},"id":4}"#).await;
        assert_eq!(ok.id, Some(4));
        assert_eq!(ok.result, Some(serde_json::json!({"a": 1})));

        let missing = dispatch(&Echo, r#"{"jsonrpc":"2.0","method":"nope","id":5}"#).await;
        assert_eq!(missing.error.unwrap().code, METHOD_NOT_FOUND);

        let failed = dispatch(&Echo, r#"{"jsonrpc":"2.0","method":"fail","id":6}"#).await;
        assert_eq!(failed.error.unwrap().message, "boom");
    }

    #[tokio::test]
    async fn test_dispatch_parse_error() {
        let resp = dispatch(&Echo, "not json").await;
        assert_eq!(resp.id, None);
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence-test.sock");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = IpcServer::new(&path);
        let task = tokio::spawn(async move { server.run(Arc::new(Echo), shutdown_rx).await });

        let client = IpcClient::new(&path);
        let mut attempts = 0;
        while !client.is_daemon_running().await && attempts < 50 {
            attempts += 1;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let echoed = client.send_request("echo", Some(serde_json::json!([1, 2]))).await.unwrap();
        assert_eq!(echoed, serde_json::json!([1, 2]));

        let err = client.send_request("fail", None).await.unwrap_err();
        assert!(matches!(err, IpcError::DaemonError { code: SERVER_ERROR, .. }));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
