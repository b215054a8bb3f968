//! Clock-driven playback of an [`Orchestrator`].
//!
//! The orchestrator only knows virtual time. A [`Player`] ties it to a
//! [`Clock`]: [`SystemClock`] sleeps for real, [`ManualClock`] jumps straight
//! to the next deadline, which makes runs instantaneous and reproducible.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Orchestrator, RunState, SchedulerError};
use crate::label::CpuCore;
use crate::types::Millis;

/// Longest single sleep, so a stop request is noticed promptly.
const POLL_SLICE_MS: Millis = 50;

/// Source of the current time in milliseconds.
pub trait Clock {
    fn now(&self) -> Millis;

    /// Blocks (or pretends to) until `deadline`.
    fn sleep_until(&self, deadline: Millis);
}

/// Real time, measured from construction.
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }

    fn sleep_until(&self, deadline: Millis) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(Duration::from_millis(deadline - now));
        }
    }
}

/// Virtual clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, ms: Millis) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Moves the clock to `at`; never backwards.
    pub fn set(&self, at: Millis) {
        self.now.fetch_max(at, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_until(&self, deadline: Millis) {
        self.set(deadline);
    }
}

/// Requests a stop of a [`Player`] from another thread.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Runs an orchestrator against a clock.
pub struct Player<C: CpuCore, K: Clock> {
    orchestrator: Orchestrator<C>,
    clock: K,
    stop: StopHandle,
}

impl<C: CpuCore, K: Clock> Player<C, K> {
    pub fn new(orchestrator: Orchestrator<C>, clock: K) -> Self {
        Self {
            orchestrator,
            clock,
            stop: StopHandle::default(),
        }
    }

    /// Starts the current instruction's flow and plays it to the end.
    pub fn play(&mut self) -> Result<RunState, SchedulerError> {
        self.stop.take();
        let now = self.clock.now();
        self.orchestrator.start(now)?;
        Ok(self.run_to_end())
    }

    /// Plays the flow registered for `mnemonic`.
    pub fn play_mnemonic(&mut self, mnemonic: &str) -> RunState {
        self.stop.take();
        let now = self.clock.now();
        self.orchestrator.start_mnemonic(mnemonic, now);
        self.run_to_end()
    }

    /// Sleeps from deadline to deadline until nothing is pending or a stop
    /// is requested.
    pub fn run_to_end(&mut self) -> RunState {
        while let Some(deadline) = self.orchestrator.next_deadline() {
            if self.stop.take() {
                self.orchestrator.stop();
                break;
            }
            let target = deadline.min(self.clock.now().saturating_add(POLL_SLICE_MS));
            self.clock.sleep_until(target);
            self.orchestrator.advance_to(self.clock.now());
        }
        self.orchestrator.state()
    }

    /// Fires whatever is due right now without sleeping.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        self.orchestrator.advance_to(now)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn orchestrator(&self) -> &Orchestrator<C> {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator<C> {
        &mut self.orchestrator
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn into_inner(self) -> Orchestrator<C> {
        self.orchestrator
    }
}
