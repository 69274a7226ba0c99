//! Cadence Coordinator
//!
//! Daemon that accepts payout schedule registrations over IPC and pays out
//! due schedules on an interval. See [`daemon::run`] for how the pieces are
//! wired together.

pub mod config;
pub mod daemon;
pub mod handler;
pub mod registry;

pub use config::CoordinatorConfig;
pub use handler::CoordinatorHandler;
pub use registry::{RegistrationError, RegistrationRequest, Registry};

use thiserror::Error;

pub const SERVICE_NAME: &str = "cadence-coordinator";

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("invalid config field {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error(transparent)]
    Settings(#[from] cadence_settings::SettingsError),
    #[error(transparent)]
    Logging(#[from] cadence_logging::LoggingError),
    #[error(transparent)]
    Store(#[from] cadence_store::StoreError),
    #[error(transparent)]
    Executor(#[from] cadence_executor::ExecutorError),
    #[error("IPC server error: {0}")]
    Ipc(#[from] std::io::Error),
}
