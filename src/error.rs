//! Error types for Hydrogen

use crate::pool::{InstanceId, PoolId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HydrogenError {
    #[error("Unknown pool: {0}")]
    UnknownPool(PoolId),

    #[error("Unknown or idle instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("Worker is busy (state: {0})")]
    WorkerBusy(String),

    #[error("Pool {pool} exhausted ({capacity} instances active)")]
    PoolExhausted { pool: PoolId, capacity: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Duplicate audio key: {0}")]
    DuplicateKey(String),

    #[error("Unknown audio key: {0}")]
    UnknownKey(String),

    #[error("Audio stack full ({0} items)")]
    StackFull(usize),
}

/// Failures reported by a [`Transport`](crate::web::Transport).
///
/// These never reach request callers as `Err`; the dispatcher turns them into
/// a callback with [`TRANSPORT_FAILURE_STATUS`](crate::web::TRANSPORT_FAILURE_STATUS).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HydrogenError>;
