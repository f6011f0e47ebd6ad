// src/lib.rs
//! Dining Engine Library
//!
//! A concurrent simulation of the dining philosophers: N philosophers share
//! N forks around a table, each needing both neighbouring forks to eat.
//! Deadlock is prevented by resource ordering: every philosopher picks up
//! the lower-numbered of its two forks first.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **runtime**: forks, philosophers and the table lifecycle
//! - **observer**: state-change callbacks and ready-made observers
//! - **observability**: tracing setup
//! - **utils**: configuration and errors
//!
//! # Example
//!
//! ```no_run
//! use dining_engine::observer::StateBoard;
//! use dining_engine::{Table, TableConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> dining_engine::Result<()> {
//! let board = Arc::new(StateBoard::new(5));
//! let table = Table::start(TableConfig::default(), board.clone())?;
//! tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//! println!("{}", board.render());
//! let report = table.stop().await?;
//! assert!(report.forks_free());
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod observability;
pub mod observer;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use observer::{AgentState, StateObserver};
pub use runtime::table::{Table, TableConfig, TableReport};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
