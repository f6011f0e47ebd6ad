// src/runtime/forks.rs
//! The shared forks on the table
//!
//! A fixed set of N binary mutual-exclusion resources. Each fork is a
//! one-permit semaphore; holding the permit is holding the fork.
//!
//! Possession is represented by a [`ForkGuard`]. Releasing consumes the
//! guard, and dropping a guard releases the fork, so a fork can neither be
//! released twice nor leaked by a cancelled agent.

use crate::utils::errors::{EngineError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

const FREE: usize = usize::MAX;

struct Fork {
    id: usize,
    permit: Arc<Semaphore>,

    /// Agent currently holding the fork, or `FREE`
    holder: AtomicUsize,

    acquisitions: AtomicU64,
    releases: AtomicU64,
}

impl Fork {
    fn new(id: usize) -> Self {
        Self {
            id,
            permit: Arc::new(Semaphore::new(1)),
            holder: AtomicUsize::new(FREE),
            acquisitions: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    fn holder(&self) -> Option<usize> {
        match self.holder.load(Ordering::Acquire) {
            FREE => None,
            agent => Some(agent),
        }
    }
}

/// Fixed-size set of forks indexed `0..len`
pub struct ForkSet {
    forks: Vec<Arc<Fork>>,
}

impl ForkSet {
    pub fn new(count: usize) -> Self {
        Self {
            forks: (0..count).map(|id| Arc::new(Fork::new(id))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.forks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forks.is_empty()
    }

    fn fork(&self, id: usize) -> Result<&Arc<Fork>> {
        self.forks.get(id).ok_or(EngineError::ForkOutOfRange {
            id,
            len: self.forks.len(),
        })
    }

    /// Wait until fork `id` is free, then take it on behalf of `agent`
    ///
    /// Waiters are served in FIFO order. Cancel-safe: dropping the future
    /// before it completes leaves the fork untouched.
    pub async fn acquire(&self, id: usize, agent: usize) -> Result<ForkGuard> {
        let fork = self.fork(id)?;

        let permit = Arc::clone(&fork.permit)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::ForkClosed(id))?;

        let previous = fork.holder.swap(agent, Ordering::AcqRel);
        debug_assert_eq!(
            previous, FREE,
            "fork {} granted to agent {} while held by agent {}",
            id, agent, previous
        );
        fork.acquisitions.fetch_add(1, Ordering::Relaxed);
        trace!(fork = id, agent, "fork acquired");

        Ok(ForkGuard {
            fork: Arc::clone(fork),
            agent,
            _permit: permit,
        })
    }

    /// Give a held fork back to the table
    pub fn release(&self, guard: ForkGuard) {
        debug_assert!(
            self.forks
                .get(guard.id())
                .map_or(false, |fork| Arc::ptr_eq(fork, &guard.fork)),
            "fork {} released into a set it was not taken from",
            guard.id()
        );
        drop(guard);
    }

    /// Agent holding fork `id`, if any
    pub fn holder(&self, id: usize) -> Result<Option<usize>> {
        Ok(self.fork(id)?.holder())
    }

    /// True when no fork is held
    pub fn all_free(&self) -> bool {
        self.forks.iter().all(|fork| fork.holder().is_none())
    }

    pub fn stats(&self) -> Vec<ForkStats> {
        self.forks
            .iter()
            .map(|fork| ForkStats {
                id: fork.id,
                holder: fork.holder(),
                acquisitions: fork.acquisitions.load(Ordering::Relaxed),
                releases: fork.releases.load(Ordering::Relaxed),
            })
            .collect()
    }
}

impl fmt::Debug for ForkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkSet")
            .field("len", &self.forks.len())
            .field(
                "holders",
                &self.forks.iter().map(|fork| fork.holder()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Exclusive possession of one fork
///
/// The fork is released when the guard is passed to [`ForkSet::release`],
/// consumed by [`ForkGuard::release`], or dropped.
#[must_use = "dropping a ForkGuard releases the fork immediately"]
pub struct ForkGuard {
    fork: Arc<Fork>,
    agent: usize,
    _permit: OwnedSemaphorePermit,
}

impl ForkGuard {
    pub fn id(&self) -> usize {
        self.fork.id
    }

    pub fn agent(&self) -> usize {
        self.agent
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ForkGuard {
    fn drop(&mut self) {
        // clear the holder before the permit goes back to the semaphore
        let cleared = self.fork.holder.compare_exchange(
            self.agent,
            FREE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        debug_assert!(
            cleared.is_ok(),
            "fork {} released by agent {} but held by {:?}",
            self.fork.id,
            self.agent,
            cleared
        );
        self.fork.releases.fetch_add(1, Ordering::Relaxed);
        trace!(fork = self.fork.id, agent = self.agent, "fork released");
    }
}

impl fmt::Debug for ForkGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkGuard")
            .field("fork", &self.fork.id)
            .field("agent", &self.agent)
            .finish()
    }
}

/// Per-fork statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForkStats {
    pub id: usize,
    pub holder: Option<usize>,
    pub acquisitions: u64,
    pub releases: u64,
}
