//! Daemon wiring: store, remote clients, poller, and IPC server.

use std::path::PathBuf;
use std::sync::Arc;

use cadence_executor::{
    DuePoller, ExecutionPipeline, JsonRpcClient, RpcLedgerClient, RpcRollupClient,
};
use cadence_ipc::IpcServer;
use cadence_store::{MemoryStore, PhaseJournal, ScheduleStore, SqliteStore};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::CoordinatorConfig;
use crate::handler::CoordinatorHandler;
use crate::registry::Registry;
use crate::{CoordinatorError, SERVICE_NAME};

/// Commitment store and phase journal, backed by the same storage.
pub struct Storage {
    pub schedules: Arc<dyn ScheduleStore>,
    pub journal: Arc<dyn PhaseJournal>,
}

/// SQLite at `database_path` if set, otherwise in memory.
pub fn open_storage(config: &CoordinatorConfig) -> Result<Storage, CoordinatorError> {
    match &config.database_path {
        Some(path) => {
            info!(path = %path.display(), "opening sqlite store");
            let store = Arc::new(SqliteStore::open(path)?);
            Ok(Storage { schedules: store.clone(), journal: store })
        }
        None => {
            warn!("no database_path configured, registrations will not survive a restart");
            let store = Arc::new(MemoryStore::new());
            Ok(Storage { schedules: store.clone(), journal: store })
        }
    }
}

pub fn socket_path(config: &CoordinatorConfig) -> PathBuf {
    config
        .socket_path
        .clone()
        .unwrap_or_else(|| cadence_ipc::default_socket_path(SERVICE_NAME))
}

/// Run until `shutdown` becomes `true`.
///
/// Fails before anything is spawned if the config is invalid or the socket
/// cannot be bound.
/// The IPC server stops accepting immediately; the poller finishes the
/// schedule it is working on before returning.
pub async fn run(
    config: CoordinatorConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), CoordinatorError> {
    config.validate()?;
    let program_id = config.program_id()?;
    let authority = config.authority()?;
    let storage = open_storage(&config)?;

    let confirm = config.confirm_policy();
    let ledger = Arc::new(RpcLedgerClient::new(
        JsonRpcClient::new(config.ledger_rpc_url.clone(), config.request_timeout())?,
        program_id,
        authority,
        confirm,
    ));
    let rollup = Arc::new(RpcRollupClient::new(
        JsonRpcClient::new(config.rollup_rpc_url.clone(), config.request_timeout())?,
        program_id,
        authority,
        confirm,
    ));

    let pipeline = ExecutionPipeline::new(
        ledger.clone(),
        rollup,
        storage.journal,
        config.pipeline_config(),
    );
    let poller = DuePoller::new(ledger, storage.schedules.clone(), pipeline, config.poller_config());

    let registry = Arc::new(Registry::new(storage.schedules));
    let handler = Arc::new(CoordinatorHandler::new(registry));
    let server = IpcServer::new(socket_path(&config));
    let listener = server.bind()?;

    info!(
        ledger = %config.ledger_rpc_url,
        rollup = %config.rollup_rpc_url,
        program_id = %config.program_id,
        socket = %server.socket_path().display(),
        "coordinator running"
    );

    let poller_task = tokio::spawn(poller.run(shutdown.clone()));
    server.serve(listener, handler, shutdown).await;

    if let Err(e) = poller_task.await {
        error!(error = %e, "poller task ended abnormally");
    }
    Ok(())
}
