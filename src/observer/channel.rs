// src/observer/channel.rs
//! Fire-and-forget observer backed by a crossbeam channel
//!
//! Agents never wait on the consumer: a full bounded channel drops the
//! event and counts the drop.

use crate::observer::{AgentState, StateObserver};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// A recorded state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEvent {
    /// Agent index
    pub agent: usize,

    /// New state
    pub state: AgentState,

    /// When the agent reported it
    pub timestamp: DateTime<Utc>,
}

/// Observer forwarding transitions as [`StateEvent`]s
pub struct ChannelObserver {
    tx: Sender<StateEvent>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelObserver {
    /// Bounded channel; events are dropped while it is full
    pub fn bounded(capacity: usize) -> (Self, Receiver<StateEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::from_sender(tx), rx)
    }

    pub fn unbounded() -> (Self, Receiver<StateEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::from_sender(tx), rx)
    }

    fn from_sender(tx: Sender<StateEvent>) -> Self {
        Self {
            tx,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pending: self.tx.len(),
        }
    }
}

impl StateObserver for ChannelObserver {
    fn on_state_changed(&self, agent: usize, state: AgentState) {
        let event = StateEvent {
            agent,
            state,
            timestamp: Utc::now(),
        };

        match self.tx.try_send(event) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                trace!(agent, "state event dropped");
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Channel observer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Events delivered into the channel
    pub sent: u64,

    /// Events dropped (channel full or receiver gone)
    pub dropped: u64,

    /// Events waiting to be received
    pub pending: usize,
}

impl ChannelStats {
    pub fn drop_rate(&self) -> f64 {
        let total = self.sent + self.dropped;
        if total == 0 {
            0.0
        } else {
            (self.dropped as f64 / total as f64) * 100.0
        }
    }
}
