// src/utils/errors.rs
//! Engine error types

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the simulation engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected configuration; the table is not started
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure while loading configuration sources
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("fork {id} out of range (table has {len} forks)")]
    ForkOutOfRange { id: usize, len: usize },

    #[error("fork {0} is closed")]
    ForkClosed(usize),

    /// An agent task panicked or was aborted
    #[error("agent {agent} failed: {source}")]
    AgentFailed {
        agent: usize,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("no tokio runtime to run philosophers on: {0}")]
    NoRuntime(String),

    #[error("agents did not exit within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("observability setup failed: {0}")]
    Observability(String),
}

/// Result type used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;
