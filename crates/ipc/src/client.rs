//! Client side of the local socket.
//!
//! One connection per request: write a request line, read one reply line.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::protocol::{RpcRequest, RpcResponse};

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("daemon not running at {0}")]
    DaemonNotRunning(PathBuf),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("daemon error {code}: {message}")]
    DaemonError { code: i32, message: String },
}

pub type Result<T> = std::result::Result<T, IpcError>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct IpcClient {
    socket_path: PathBuf,
    timeout: Duration,
    next_id: AtomicU64,
}

impl IpcClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Call `method` and return the raw `result` value.
    #[cfg(unix)]
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);

        let response = tokio::time::timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| IpcError::Timeout(self.timeout))??;

        if response.id != Some(id) {
            return Err(IpcError::InvalidResponse(format!(
                "reply id {:?} for request {id}",
                response.id
            )));
        }
        response
            .into_result()
            .map_err(|e| IpcError::DaemonError { code: e.code, message: e.message })
    }

    /// [`send_request`](Self::send_request), decoding the result into `T`.
    #[cfg(unix)]
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let value = self.send_request(method, params).await?;
        serde_json::from_value(value).map_err(|e| IpcError::InvalidResponse(e.to_string()))
    }

    #[cfg(unix)]
    pub async fn is_daemon_running(&self) -> bool {
        tokio::net::UnixStream::connect(&self.socket_path).await.is_ok()
    }

    #[cfg(unix)]
    async fn exchange(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let stream = tokio::net::UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| IpcError::DaemonNotRunning(self.socket_path.clone()))?;
        let (reader, mut writer) = stream.into_split();

        let mut payload =
            serde_json::to_vec(request).map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;
        payload.push(b'\n');
        debug!(method = %request.method, id = request.id, "ipc request");
        writer
            .write_all(&payload)
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;

        let mut line = String::new();
        let read = BufReader::new(reader)
            .read_line(&mut line)
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;
        if read == 0 {
            return Err(IpcError::InvalidResponse("connection closed before reply".into()));
        }

        serde_json::from_str(line.trim()).map_err(|e| IpcError::InvalidResponse(e.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(dir.path().join("absent.sock"));
        assert!(!client.is_daemon_running().await);
        let result = client.send_request("status", None).await;
        assert!(matches!(result, Err(IpcError::DaemonNotRunning(_))));
    }

    #[tokio::test]
    async fn test_closed_without_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mute.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).await.unwrap();
        });

        let err = IpcClient::new(&path).send_request("status", None).await.unwrap_err();
        assert!(matches!(err, IpcError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_silent_daemon_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = IpcClient::new(&path).with_timeout(Duration::from_millis(50));
        let err = client.send_request("status", None).await.unwrap_err();
        assert!(matches!(err, IpcError::Timeout(_)));
    }
}
