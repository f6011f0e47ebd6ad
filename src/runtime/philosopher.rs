// src/runtime/philosopher.rs
//! A single philosopher's think → wait → eat cycle
//!
//! # Fork ordering
//!
//! Philosopher `i` needs forks `i` and `(i + 1) % n`. Every philosopher
//! takes the lower-numbered of its two forks first. Fork ids are totally
//! ordered, so no cycle of "holds one, waits for the next" can form and the
//! table cannot deadlock, including at the wraparound seat where philosopher
//! `n - 1` shares fork 0 with philosopher 0.
//!
//! ```text
//!        fork 0
//!   P4 ───────── P0          P4: left 4, right 0 → takes 0, then 4
//!   │              │         P0: left 0, right 1 → takes 0, then 1
//! fork 4        fork 1
//!   │              │
//!   P3            P1
//!     └─ fork 3 ─ P2 ─ fork 2
//! ```
//!
//! # State machine
//!
//! `Thinking → WaitingForForks → Eating → Thinking → ...`, reported by the
//! philosopher itself through its observer. `WaitingForForks` means "holding
//! the lower fork, waiting for the higher one".

use crate::observer::{AgentState, StateObserver};
use crate::runtime::forks::{ForkGuard, ForkSet};
use crate::runtime::table::TableConfig;
use crate::utils::errors::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// The two forks a philosopher uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkPair {
    pub left: usize,
    pub right: usize,

    /// Taken first
    pub low: usize,

    /// Taken second
    pub high: usize,
}

impl ForkPair {
    /// True at a one-seat table, where left and right are the same fork
    pub fn is_single(&self) -> bool {
        self.low == self.high
    }
}

/// Forks used by philosopher `agent` at a table of `num_forks`
///
/// # Panics
///
/// Panics if `num_forks` is zero.
pub fn fork_ids(agent: usize, num_forks: usize) -> ForkPair {
    assert!(num_forks > 0, "a table needs at least one fork");
    debug_assert!(agent < num_forks, "agent {} has no seat at a table of {}", agent, num_forks);

    let left = agent;
    let right = (agent + 1) % num_forks;

    ForkPair {
        left,
        right,
        low: left.min(right),
        high: left.max(right),
    }
}

/// Timing and bounds for a philosopher
#[derive(Debug, Clone)]
pub struct PhilosopherConfig {
    /// Length of one slot of thinking or eating
    pub timescale: Duration,

    /// Each phase lasts `0..think_slots` slots, drawn uniformly
    pub think_slots: u32,

    /// Stop after this many completed cycles
    pub max_cycles: Option<u64>,

    /// Seed base; the philosopher's generator uses `seed + index`
    pub seed: u64,
}

impl Default for PhilosopherConfig {
    fn default() -> Self {
        Self::from(&TableConfig::default())
    }
}

impl From<&TableConfig> for PhilosopherConfig {
    fn from(config: &TableConfig) -> Self {
        Self {
            timescale: config.timescale(),
            think_slots: config.think_slots,
            max_cycles: config.max_cycles,
            seed: config.seed,
        }
    }
}

/// Live counters for one philosopher, shared with the table
#[derive(Debug, Default)]
pub struct AgentCounters {
    meals: AtomicU64,
    cycles: AtomicU64,
    wait_ns_total: AtomicU64,
    wait_ns_max: AtomicU64,
}

impl AgentCounters {
    fn record_wait(&self, waited: Duration) {
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.wait_ns_total.fetch_add(nanos, Ordering::Relaxed);
        self.wait_ns_max.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn meals(&self) -> u64 {
        self.meals.load(Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, index: usize) -> PhilosopherReport {
        PhilosopherReport {
            index,
            meals: self.meals(),
            cycles: self.cycles(),
            total_wait: Duration::from_nanos(self.wait_ns_total.load(Ordering::Relaxed)),
            longest_wait: Duration::from_nanos(self.wait_ns_max.load(Ordering::Relaxed)),
        }
    }
}

/// Summary of one philosopher's activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhilosopherReport {
    pub index: usize,

    /// Times the philosopher started eating
    pub meals: u64,

    /// Cycles completed through release of both forks
    pub cycles: u64,

    /// Time spent between requesting the first fork and holding both
    pub total_wait: Duration,
    pub longest_wait: Duration,
}

/// One philosopher seated at a table
pub struct Philosopher {
    index: usize,
    forks: ForkPair,
    config: PhilosopherConfig,
    rng: StdRng,
    state: Option<AgentState>,
    counters: Arc<AgentCounters>,

    #[cfg(test)]
    on_release: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl Philosopher {
    pub fn new(index: usize, num_forks: usize, config: PhilosopherConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed.wrapping_add(index as u64));

        Self {
            index,
            forks: fork_ids(index, num_forks),
            config,
            rng,
            state: None,
            counters: Arc::new(AgentCounters::default()),
            #[cfg(test)]
            on_release: None,
        }
    }

    /// Share counters with an outside reader
    pub fn with_counters(mut self, counters: Arc<AgentCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Run `hook` with this philosopher's index just before it puts its
    /// forks down after eating
    #[cfg(test)]
    fn with_release_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_release = Some(Arc::new(hook));
        self
    }

    #[cfg(test)]
    fn before_release(&self) {
        if let Some(hook) = &self.on_release {
            hook(self.index);
        }
    }

    #[cfg(not(test))]
    fn before_release(&self) {}

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn fork_pair(&self) -> ForkPair {
        self.forks
    }

    /// Last reported state
    pub fn state(&self) -> Option<AgentState> {
        self.state
    }

    pub fn counters(&self) -> &Arc<AgentCounters> {
        &self.counters
    }

    /// Duration of the next thinking or eating phase
    fn phase_duration(&mut self) -> Duration {
        let slots = self.rng.gen_range(0..self.config.think_slots);
        self.config.timescale * slots
    }

    fn finished(&self) -> bool {
        self.config
            .max_cycles
            .map_or(false, |max| self.counters.cycles() >= max)
    }

    fn report(&mut self, observer: &dyn StateObserver, state: AgentState) {
        debug_assert_eq!(
            state,
            self.state.map_or(AgentState::Thinking, AgentState::next),
            "philosopher {} skipped a state",
            self.index
        );
        self.state = Some(state);
        observer.on_state_changed(self.index, state);
    }

    /// Sleep through one phase; false if cancelled first
    async fn pause(&mut self, cancel: &CancellationToken) -> bool {
        let duration = self.phase_duration();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Wait for fork `id`; `None` if cancelled first
    async fn take(
        &self,
        forks: &ForkSet,
        id: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<ForkGuard>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            guard = forks.acquire(id, self.index) => guard.map(Some),
        }
    }

    /// Think and eat until cancelled or `max_cycles` is reached
    ///
    /// Any fork held when cancellation arrives is released before returning.
    pub async fn run(
        &mut self,
        forks: &ForkSet,
        observer: &dyn StateObserver,
        cancel: &CancellationToken,
    ) -> Result<PhilosopherReport> {
        debug!(
            agent = self.index,
            low = self.forks.low,
            high = self.forks.high,
            "philosopher seated"
        );

        loop {
            if cancel.is_cancelled() || self.finished() {
                break;
            }

            self.report(observer, AgentState::Thinking);
            if !self.pause(cancel).await {
                break;
            }

            let requested = Instant::now();
            let Some(low) = self.take(forks, self.forks.low, cancel).await? else {
                break;
            };
            self.report(observer, AgentState::WaitingForForks);

            let high = if self.forks.is_single() {
                None
            } else {
                match self.take(forks, self.forks.high, cancel).await? {
                    Some(guard) => Some(guard),
                    None => {
                        forks.release(low);
                        break;
                    }
                }
            };
            self.counters.record_wait(requested.elapsed());

            self.report(observer, AgentState::Eating);
            self.counters.meals.fetch_add(1, Ordering::Relaxed);
            let completed = self.pause(cancel).await;

            self.before_release();
            if let Some(high) = high {
                forks.release(high);
            }
            forks.release(low);

            if !completed {
                break;
            }
            let cycles = self.counters.cycles.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(agent = self.index, cycles, "cycle complete");
        }

        // a later run starts over from Thinking
        self.state = None;

        let report = self.counters.snapshot(self.index);
        debug!(agent = self.index, meals = report.meals, "philosopher left the table");
        Ok(report)
    }
}

/// Seat philosopher `index` and run it to completion
pub async fn run(
    index: usize,
    forks: Arc<ForkSet>,
    observer: Arc<dyn StateObserver>,
    config: PhilosopherConfig,
    cancel: CancellationToken,
) -> Result<PhilosopherReport> {
    let mut philosopher = Philosopher::new(index, forks.len(), config);
    philosopher.run(&forks, observer.as_ref(), &cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    type Recorded = Arc<Mutex<Vec<(usize, AgentState)>>>;

    fn recorder() -> (Recorded, Arc<dyn StateObserver>) {
        let events: Recorded = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&events);
        let observer: Arc<dyn StateObserver> =
            Arc::new(move |agent: usize, state: AgentState| sink.lock().push((agent, state)));
        (events, observer)
    }

    fn fast_config() -> PhilosopherConfig {
        PhilosopherConfig {
            timescale: Duration::from_millis(1),
            ..Default::default()
        }
    }

    async fn wait_until(events: &Recorded, state: AgentState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !events.lock().iter().any(|(_, s)| *s == state) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("state never reported");
    }

    #[test]
    fn test_wraparound_fork_ids() {
        let pair = fork_ids(4, 5);
        assert_eq!(pair.left, 4);
        assert_eq!(pair.right, 0);
        assert_eq!(pair.low, 0);
        assert_eq!(pair.high, 4);

        let pair = fork_ids(0, 5);
        assert_eq!((pair.low, pair.high), (0, 1));
    }

    #[test]
    fn test_single_seat() {
        let pair = fork_ids(0, 1);
        assert!(pair.is_single());
        assert_eq!((pair.low, pair.high), (0, 0));
    }

    #[test]
    #[should_panic]
    fn test_empty_table_panics() {
        fork_ids(0, 0);
    }

    proptest! {
        #[test]
        fn prop_low_before_high(n in 2usize..64, seat in 0usize..64) {
            let agent = seat % n;
            let pair = fork_ids(agent, n);
            prop_assert!(pair.low < pair.high);
            prop_assert_eq!(pair.low, agent.min((agent + 1) % n));
            prop_assert_eq!(pair.high, agent.max((agent + 1) % n));
            prop_assert_ne!(pair.left, pair.right);
        }

        #[test]
        fn prop_every_fork_shared_by_two(n in 2usize..64) {
            let mut users = vec![0usize; n];
            for agent in 0..n {
                let pair = fork_ids(agent, n);
                users[pair.low] += 1;
                users[pair.high] += 1;
            }
            prop_assert!(users.iter().all(|&count| count == 2));
        }

        #[test]
        fn prop_neighbours_share_exactly_one(n in 2usize..64, seat in 0usize..64) {
            let agent = seat % n;
            let mine = fork_ids(agent, n);
            let next = fork_ids((agent + 1) % n, n);
            let shared = [mine.low, mine.high]
                .iter()
                .filter(|id| **id == next.low || **id == next.high)
                .count();
            prop_assert_eq!(shared, if n == 2 { 2 } else { 1 });
        }
    }

    #[test]
    fn test_phase_durations_deterministic() {
        let config = PhilosopherConfig {
            timescale: Duration::from_millis(200),
            ..Default::default()
        };
        let mut a = Philosopher::new(3, 5, config.clone());
        let mut b = Philosopher::new(3, 5, config.clone());
        let mut other = Philosopher::new(4, 5, config);

        let first: Vec<_> = (0..32).map(|_| a.phase_duration()).collect();
        let second: Vec<_> = (0..32).map(|_| b.phase_duration()).collect();
        let third: Vec<_> = (0..32).map(|_| other.phase_duration()).collect();

        assert_eq!(first, second);
        assert_ne!(first, third);
        assert!(first.iter().all(|d| *d <= Duration::from_millis(1800)));
        assert!(first.iter().all(|d| d.as_millis() % 200 == 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_neighbours_never_eat_together() {
        let n = 5;
        let forks = Arc::new(ForkSet::new(n));
        // set from the Eating report, cleared before the forks go back
        let eating: Arc<Vec<AtomicBool>> =
            Arc::new((0..n).map(|_| AtomicBool::new(false)).collect());
        let overlaps = Arc::new(AtomicUsize::new(0));

        let observer: Arc<dyn StateObserver> = {
            let eating = Arc::clone(&eating);
            let overlaps = Arc::clone(&overlaps);
            Arc::new(move |agent: usize, state: AgentState| {
                if state == AgentState::Eating {
                    eating[agent].store(true, Ordering::SeqCst);
                    let left = (agent + n - 1) % n;
                    let right = (agent + 1) % n;
                    if eating[left].load(Ordering::SeqCst) || eating[right].load(Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        };
        let config = PhilosopherConfig {
            max_cycles: Some(50),
            ..fast_config()
        };

        let handles: Vec<_> = (0..n)
            .map(|index| {
                let eating = Arc::clone(&eating);
                let mut philosopher = Philosopher::new(index, n, config.clone())
                    .with_release_hook(move |agent| eating[agent].store(false, Ordering::SeqCst));
                let forks = Arc::clone(&forks);
                let observer = Arc::clone(&observer);
                tokio::spawn(async move {
                    let cancel = CancellationToken::new();
                    philosopher.run(&forks, observer.as_ref(), &cancel).await
                })
            })
            .collect();

        for handle in handles {
            let report = tokio::time::timeout(Duration::from_secs(30), handle)
                .await
                .expect("table deadlocked")
                .unwrap()
                .unwrap();
            assert_eq!(report.meals, 50);
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(eating.iter().all(|bit| !bit.load(Ordering::SeqCst)));
        assert!(forks.all_free());
    }

    #[tokio::test]
    async fn test_state_sequence() {
        let forks = ForkSet::new(2);
        let (events, observer) = recorder();
        let cancel = CancellationToken::new();
        let config = PhilosopherConfig {
            max_cycles: Some(5),
            ..fast_config()
        };

        let mut philosopher = Philosopher::new(0, forks.len(), config);
        let report = philosopher
            .run(&forks, observer.as_ref(), &cancel)
            .await
            .unwrap();

        assert_eq!(report.meals, 5);
        assert_eq!(report.cycles, 5);
        assert!(forks.all_free());

        let states: Vec<_> = events.lock().iter().map(|(_, s)| *s).collect();
        let expected: Vec<_> = [
            AgentState::Thinking,
            AgentState::WaitingForForks,
            AgentState::Eating,
        ]
        .iter()
        .copied()
        .cycle()
        .take(15)
        .collect();
        assert_eq!(states, expected);
        assert!(events.lock().iter().all(|(agent, _)| *agent == 0));
    }

    #[tokio::test]
    async fn test_single_seat_runs() {
        let forks = ForkSet::new(1);
        let (_events, observer) = recorder();
        let config = PhilosopherConfig {
            max_cycles: Some(3),
            ..fast_config()
        };

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            run(0, Arc::new(forks), observer, config, CancellationToken::new()),
        )
        .await
        .expect("single philosopher deadlocked")
        .unwrap();
        assert_eq!(report.cycles, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_takes_low_fork_first_at_wraparound() {
        let forks = Arc::new(ForkSet::new(5));
        let (events, observer) = recorder();
        let cancel = CancellationToken::new();

        // neighbour 3 sits on fork 4, the higher fork of philosopher 4
        let blocker = forks.acquire(4, 3).await.unwrap();

        let handle = tokio::spawn(run(
            4,
            Arc::clone(&forks),
            observer,
            fast_config(),
            cancel.clone(),
        ));

        wait_until(&events, AgentState::WaitingForForks).await;
        assert_eq!(forks.holder(0).unwrap(), Some(4));
        assert_eq!(forks.holder(4).unwrap(), Some(3));
        assert!(!events.lock().iter().any(|(_, s)| *s == AgentState::Eating));

        forks.release(blocker);
        wait_until(&events, AgentState::Eating).await;

        cancel.cancel();
        let report = handle.await.unwrap().unwrap();
        assert!(report.meals >= 1);
        assert!(forks.all_free());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_never_takes_high_fork_without_low() {
        let forks = Arc::new(ForkSet::new(5));
        let (events, observer) = recorder();
        let cancel = CancellationToken::new();

        // neighbour 0 sits on fork 0, the lower fork of philosopher 4
        let blocker = forks.acquire(0, 0).await.unwrap();

        let handle = tokio::spawn(run(
            4,
            Arc::clone(&forks),
            observer,
            fast_config(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(forks.holder(4).unwrap(), None);
        assert!(events
            .lock()
            .iter()
            .all(|(_, s)| *s == AgentState::Thinking));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelled philosopher did not exit")
            .unwrap()
            .unwrap();

        forks.release(blocker);
        assert!(forks.all_free());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_while_waiting_releases_low_fork() {
        let forks = Arc::new(ForkSet::new(3));
        let (events, observer) = recorder();
        let cancel = CancellationToken::new();

        // philosopher 1 needs forks 1 and 2; hold 2 forever
        let blocker = forks.acquire(2, 2).await.unwrap();

        let handle = tokio::spawn(run(
            1,
            Arc::clone(&forks),
            observer,
            fast_config(),
            cancel.clone(),
        ));

        wait_until(&events, AgentState::WaitingForForks).await;
        assert_eq!(forks.holder(1).unwrap(), Some(1));

        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelled philosopher did not exit")
            .unwrap()
            .unwrap();

        assert_eq!(report.meals, 0);
        assert_eq!(forks.holder(1).unwrap(), None);
        assert_eq!(forks.holder(2).unwrap(), Some(2));
        forks.release(blocker);
    }
}
