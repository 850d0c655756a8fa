//! This module contains the cooperative cancellation hooks that the explorer
//! polls while it works through its queue of branches.
//!
//! # Best-Effort Monitoring
//!
//! Exploration is synchronous, so a watchdog can only stop the decompiler at
//! the points where it is polled. Between polls the explorer keeps stepping
//! opcodes, which means that a stop request is honoured within
//! [`Watchdog::poll_every`] steps rather than immediately.

use std::{
    fmt::Debug,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::constant::DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;

/// A dynamically dispatched [`Watchdog`] instance.
pub type DynWatchdog = Rc<dyn Watchdog>;

/// The interface to an object that can be polled to see if the decompiler
/// needs to abort exploration.
pub trait Watchdog
where
    Self: Debug,
{
    /// Checks if the decompiler should abandon exploration and return
    /// [`crate::error::execution::Error::ExplorationAborted`].
    #[must_use]
    fn should_stop(&self) -> bool;

    /// Gets the number of opcode steps the explorer should take between polls
    /// of the watchdog.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// A watchdog that never asks the decompiler to stop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    /// Wraps `self` into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        // Large enough that it is effectively never consulted.
        usize::MAX
    }
}

/// A watchdog that stops the decompiler once an externally-owned flag is
/// raised.
///
/// It polls every [`DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS`] steps unless
/// configured otherwise using [`Self::polling_every`].
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    /// The flag that is raised from another thread to stop the decompiler.
    flag: Arc<AtomicBool>,

    /// The number of steps between polls.
    poll_loop_iterations: usize,
}

impl FlagWatchdog {
    /// Constructs a new `FlagWatchdog` observing the provided `flag`.
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            flag,
            poll_loop_iterations,
        }
    }

    /// Sets the number of steps between polls to `iterations`.
    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        self.poll_loop_iterations = iterations.max(1);
        self
    }

    /// Wraps the watchdog into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}

/// A watchdog that stops the decompiler once a wall-clock budget has elapsed.
///
/// The clock starts when the watchdog is constructed, not when exploration
/// begins.
#[derive(Clone, Debug)]
pub struct DeadlineWatchdog {
    deadline: Instant,
    poll_loop_iterations: usize,
}

impl DeadlineWatchdog {
    /// Constructs a watchdog that expires `budget` from now.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        let deadline = Instant::now() + budget;
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            deadline,
            poll_loop_iterations,
        }
    }

    /// Wraps the watchdog into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for DeadlineWatchdog {
    fn should_stop(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}
