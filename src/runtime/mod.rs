// src/runtime/mod.rs
//! Philosopher execution runtime
//!
//! This module provides the simulation itself:
//!
//! - **Forks**: the shared set of mutually exclusive resources
//! - **Philosopher**: one agent's think/wait/eat cycle with ordered acquisition
//! - **Table**: starting, stopping and reporting on a whole simulation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Table                            │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐              │
//! │  │ P0 task  │  │ P1 task  │  │ P2 task  │  ...         │
//! │  └──────────┘  └──────────┘  └──────────┘              │
//! │     │     ╲      │     ╲       │     ╲                  │
//! │     ▼      ▼     ▼      ▼      ▼      ▼                 │
//! │  [fork 0] [fork 1]   [fork 2]      [fork 3] ...         │
//! │                                                         │
//! │   every task: lower fork id first, then the higher      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!            StateObserver (agent, state) events
//! ```

pub mod forks;
pub mod philosopher;
pub mod table;

// Re-export commonly used types
pub use forks::{ForkGuard, ForkSet, ForkStats};
pub use philosopher::{fork_ids, ForkPair, Philosopher, PhilosopherConfig, PhilosopherReport};
pub use table::{Table, TableConfig, TableReport};
