//! IPC method routing for the coordinator daemon.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use cadence_ipc::{HandlerError, IpcHandler};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::registry::{RegistrationError, RegistrationRequest, Registry};
use crate::SERVICE_NAME;

/// Application error codes, in the JSON-RPC server-error range.
pub const NOT_FOUND: i32 = -32004;
pub const CONFLICT: i32 = -32009;

#[derive(Debug, Deserialize)]
struct ScheduleParams {
    schedule: String,
}

pub struct CoordinatorHandler {
    registry: Arc<Registry>,
}

impl CoordinatorHandler {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, HandlerError> {
        match method {
            "status" => Ok(json!({ "service": SERVICE_NAME, "status": "running" })),
            "health" => to_value(self.registry.health().await.map_err(into_handler_error)?),
            "schedules.register" => {
                let request: RegistrationRequest = parse_params(params)?;
                to_value(self.registry.register(request).await.map_err(into_handler_error)?)
            }
            "schedules.get" => {
                let ScheduleParams { schedule } = parse_params(params)?;
                to_value(self.registry.describe(&schedule).await.map_err(into_handler_error)?)
            }
            other => Err(HandlerError::method_not_found(other)),
        }
    }
}

impl IpcHandler for CoordinatorHandler {
    fn handle(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send + '_>> {
        let method = method.to_string();
        Box::pin(async move { self.dispatch(&method, params).await })
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, HandlerError> {
    let params = params.ok_or_else(|| HandlerError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(|e| HandlerError::invalid_params(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::server(e.to_string()))
}

fn into_handler_error(e: RegistrationError) -> HandlerError {
    let code = match &e {
        RegistrationError::MissingField(_)
        | RegistrationError::InvalidField { .. }
        | RegistrationError::EmptyRecipients => cadence_ipc::protocol::INVALID_PARAMS,
        RegistrationError::NotFound(_) => NOT_FOUND,
        RegistrationError::Conflict { .. } => CONFLICT,
        RegistrationError::Store(_) => cadence_ipc::protocol::SERVER_ERROR,
    };
    HandlerError { code, message: e.to_string() }
}
