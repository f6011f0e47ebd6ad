// src/observer/board.rs
//! Latest known state of every philosopher
//!
//! Replaces a presentation-owned array of per-agent widgets: agents write
//! their own slot through the observer callback, readers take snapshots.

use crate::observer::{AgentState, StateObserver};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

const UNREPORTED: u8 = u8::MAX;

/// Lock-free per-agent state snapshot
pub struct StateBoard {
    slots: Vec<AtomicU8>,
    transitions: AtomicU64,
}

impl StateBoard {
    pub fn new(agents: usize) -> Self {
        Self {
            slots: (0..agents).map(|_| AtomicU8::new(UNREPORTED)).collect(),
            transitions: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Last reported state, `None` before the agent's first report
    pub fn state(&self, agent: usize) -> Option<AgentState> {
        self.slots
            .get(agent)
            .and_then(|slot| AgentState::from_u8(slot.load(Ordering::Acquire)))
    }

    pub fn snapshot(&self) -> Vec<Option<AgentState>> {
        (0..self.slots.len()).map(|i| self.state(i)).collect()
    }

    /// Total transitions recorded so far
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// Number of agents currently in `state`
    pub fn count(&self, state: AgentState) -> usize {
        self.snapshot().into_iter().filter(|s| *s == Some(state)).count()
    }

    /// Compact one-line rendering, e.g. `T W E T .`
    pub fn render(&self) -> String {
        self.snapshot()
            .into_iter()
            .map(|s| s.map(AgentState::symbol).unwrap_or('.').to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl StateObserver for StateBoard {
    fn on_state_changed(&self, agent: usize, state: AgentState) {
        // reports for agents outside the board are ignored
        if let Some(slot) = self.slots.get(agent) {
            slot.store(state as u8, Ordering::Release);
            self.transitions.fetch_add(1, Ordering::Relaxed);
        }
    }
}
