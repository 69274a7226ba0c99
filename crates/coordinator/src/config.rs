//! Daemon configuration, persisted through `cadence-settings`.

use std::path::PathBuf;
use std::time::Duration;

use cadence_core::Address;
use cadence_executor::{ConfirmPolicy, PipelineConfig, PollerConfig};
use serde::{Deserialize, Serialize};

use crate::CoordinatorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub ledger_rpc_url: String,
    pub rollup_rpc_url: String,
    /// Payout program address, base58.
    pub program_id: String,
    /// Address the gateways sign delegate / claim / commit with, base58.
    pub authority: String,
    pub poll_interval_secs: u64,
    /// SQLite file. In-memory store when unset.
    pub database_path: Option<PathBuf>,
    /// IPC socket. Platform default when unset.
    pub socket_path: Option<PathBuf>,
    /// Total delegation attempts per run; 2 means one retry.
    pub delegate_attempts: u32,
    pub retry_delay_ms: u64,
    pub confirm_poll_interval_ms: u64,
    pub confirm_max_wait_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let zero = bs58::encode([0u8; 32]).into_string();
        Self {
            ledger_rpc_url: "http://127.0.0.1:8899".to_string(),
            rollup_rpc_url: "http://127.0.0.1:7799".to_string(),
            program_id: zero.clone(),
            authority: zero,
            poll_interval_secs: 60,
            database_path: None,
            socket_path: None,
            delegate_attempts: 2,
            retry_delay_ms: 1_000,
            confirm_poll_interval_ms: 500,
            confirm_max_wait_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn program_id(&self) -> Result<Address, CoordinatorError> {
        decode_config_address("program_id", &self.program_id)
    }

    pub fn authority(&self) -> Result<Address, CoordinatorError> {
        decode_config_address("authority", &self.authority)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig { interval: Duration::from_secs(self.poll_interval_secs.max(1)) }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            delegate_attempts: self.delegate_attempts.max(1),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy::from_millis(self.confirm_poll_interval_ms, self.confirm_max_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        self.program_id()?;
        self.authority()?;
        for (field, url) in [("ledger_rpc_url", &self.ledger_rpc_url), ("rollup_rpc_url", &self.rollup_rpc_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CoordinatorError::InvalidConfig {
                    field,
                    reason: format!("{} is not an http(s) url", url),
                });
            }
        }
        Ok(())
    }
}

fn decode_config_address(field: &'static str, value: &str) -> Result<Address, CoordinatorError> {
    let bytes = bs58::decode(value)
        .into_vec()
        .map_err(|e| CoordinatorError::InvalidConfig { field, reason: e.to_string() })?;
    Address::try_from(bytes.as_slice()).map_err(|_| CoordinatorError::InvalidConfig {
        field,
        reason: format!("expected 32 bytes, got {}", bytes.len()),
    })
}
