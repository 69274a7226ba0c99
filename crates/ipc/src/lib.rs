//! Cadence IPC
//!
//! JSON-RPC 2.0 over a local Unix socket, newline-delimited. The coordinator
//! daemon serves its registration API through [`IpcServer`]; [`IpcClient`] is
//! the matching client used by tooling and tests. The protocol types are also
//! reused by the executor's HTTP gateway client.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{IpcClient, IpcError};
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use server::{HandlerError, IpcHandler, IpcServer};

use std::path::PathBuf;

/// Default socket path for a service.
///
/// - Linux: `$XDG_RUNTIME_DIR/{service}.sock` or `/tmp/{service}.sock`
/// - elsewhere: `/tmp/{service}.sock`
pub fn default_socket_path(service: &str) -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_RUNTIME_DIR")
            .map(|dir| PathBuf::from(dir).join(format!("{}.sock", service)))
            .unwrap_or_else(|_| PathBuf::from(format!("/tmp/{}.sock", service)))
    }
    #[cfg(not(target_os = "linux"))]
    {
        PathBuf::from(format!("/tmp/{}.sock", service))
    }
}
