// src/utils/mod.rs
//! Configuration and error plumbing shared by the engine

pub mod config;
pub mod errors;

pub use self::config::{EngineConfig, LoggingConfig};
pub use self::errors::{EngineError, Result};
