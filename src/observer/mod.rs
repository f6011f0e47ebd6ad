// src/observer/mod.rs
//! State-change observers
//!
//! Philosophers never touch presentation state. Each one reports its own
//! transitions through a [`StateObserver`], synchronously, from its own task.
//! Whatever sits behind the observer (a terminal, a channel, a UI thread) is
//! responsible for its own thread affinity.
//!
//! - **ChannelObserver**: non-blocking forwarder into a crossbeam channel
//! - **StateBoard**: latest state per agent, readable from any thread
//! - **LogObserver**: one `tracing` event per transition
//! - **Fanout**: forwards to several observers

pub mod board;
pub mod channel;

pub use board::StateBoard;
pub use channel::{ChannelObserver, ChannelStats, StateEvent};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Life-cycle state of a philosopher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AgentState {
    /// Holding no forks
    Thinking = 0,

    /// Holding the lower fork, waiting for the higher one
    WaitingForForks = 1,

    /// Holding both forks
    Eating = 2,
}

impl AgentState {
    /// State that must follow this one
    pub fn next(self) -> Self {
        match self {
            AgentState::Thinking => AgentState::WaitingForForks,
            AgentState::WaitingForForks => AgentState::Eating,
            AgentState::Eating => AgentState::Thinking,
        }
    }

    /// Single-character tag used by compact renderings
    pub fn symbol(self) -> char {
        match self {
            AgentState::Thinking => 'T',
            AgentState::WaitingForForks => 'W',
            AgentState::Eating => 'E',
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AgentState::Thinking),
            1 => Some(AgentState::WaitingForForks),
            2 => Some(AgentState::Eating),
            _ => None,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Thinking => "thinking",
            AgentState::WaitingForForks => "waiting",
            AgentState::Eating => "eating",
        };
        f.write_str(name)
    }
}

/// Receiver of philosopher state transitions
///
/// Called from the reporting agent's own task. Implementations may block
/// briefly but should hand slow work off elsewhere.
pub trait StateObserver: Send + Sync {
    fn on_state_changed(&self, agent: usize, state: AgentState);
}

impl<F> StateObserver for F
where
    F: Fn(usize, AgentState) + Send + Sync,
{
    fn on_state_changed(&self, agent: usize, state: AgentState) {
        self(agent, state)
    }
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StateObserver for NoopObserver {
    fn on_state_changed(&self, _agent: usize, _state: AgentState) {}
}

/// Observer that logs each transition at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl StateObserver for LogObserver {
    fn on_state_changed(&self, agent: usize, state: AgentState) {
        debug!(agent, state = %state, "philosopher state changed");
    }
}

/// Forwards every transition to each registered observer, in order
#[derive(Default)]
pub struct Fanout {
    observers: RwLock<Vec<Arc<dyn StateObserver>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register another observer; takes effect for the next transition
    pub fn push(&self, observer: Arc<dyn StateObserver>) {
        self.observers.write().push(observer);
    }

    pub fn with(self, observer: Arc<dyn StateObserver>) -> Self {
        self.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

impl StateObserver for Fanout {
    fn on_state_changed(&self, agent: usize, state: AgentState) {
        for observer in self.observers.read().iter() {
            observer.on_state_changed(agent, state);
        }
    }
}
