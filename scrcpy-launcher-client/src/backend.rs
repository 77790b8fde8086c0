//! Backend boundary.
//!
//! Everything the launcher actually does (adb, scrcpy, config files) lives
//! behind this trait: one generic invoke call plus an event feed.

use async_trait::async_trait;
use scrcpy_launcher_core::{BackendCall, BackendEvent};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend transport error: {0}")]
    Transport(String),
    /// The backend handled the call and reported an error string.
    #[error("{0}")]
    Rejected(String),
    #[error("invalid response to {command}: {detail}")]
    InvalidResponse {
        command: &'static str,
        detail: String,
    },
    #[error("backend connection closed")]
    Closed,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn invoke(&self, call: BackendCall) -> Result<Value, BackendError>;

    /// New receiver for backend-pushed events. Dropping it unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}

/// Invokes `call` and decodes the reply into `T`.
pub async fn call<T: DeserializeOwned>(
    backend: &dyn Backend,
    call: BackendCall,
) -> Result<T, BackendError> {
    let command = call.command();
    let value = backend.invoke(call).await?;
    serde_json::from_value(value).map_err(|err| BackendError::InvalidResponse {
        command,
        detail: err.to_string(),
    })
}
