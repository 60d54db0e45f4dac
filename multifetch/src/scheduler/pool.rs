//! Worker slot accounting.
//!
//! Each slot is `Idle`, `Fetching` or `Draining`. A slot moves to `Fetching`
//! only while `active + draining < max`; lowering `max` never preempts running
//! fetches, it just holds back further dispatch until enough of them finish.
//!
//! Abandoning the active fetches (on `clear_queue`) moves their slots to
//! `Draining`. A draining slot no longer counts as network activity, but it
//! stays occupied until its task has actually exited.
//!
//! The pool also tracks the last activity state it reported so that callers
//! publish `Activity(true)`/`Activity(false)` only on real transitions.

/// Minimum number of worker slots.
pub const MIN_WORKERS: usize = 1;

/// Bounded set of worker slots.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    max: usize,
    active: usize,
    draining: usize,
    peak: usize,
    reported_active: bool,
}

impl WorkerPool {
    /// Creates a pool with `max` slots (at least one).
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(MIN_WORKERS),
            active: 0,
            draining: 0,
            peak: 0,
            reported_active: false,
        }
    }

    /// Returns true if another fetch may start.
    pub fn has_capacity(&self) -> bool {
        self.active + self.draining < self.max
    }

    /// Marks a slot as fetching.
    ///
    /// Returns false without changing anything when the pool is full.
    pub fn acquire(&mut self) -> bool {
        if !self.has_capacity() {
            return false;
        }
        self.active += 1;
        self.peak = self.peak.max(self.active + self.draining);
        true
    }

    /// Returns a slot to idle.
    pub fn release(&mut self) {
        debug_assert!(self.active > 0, "release() without a matching acquire()");
        self.active = self.active.saturating_sub(1);
    }

    /// Moves every fetching slot to draining.
    ///
    /// Returns the number of slots moved.
    pub fn abandon_active(&mut self) -> usize {
        let abandoned = self.active;
        self.draining += abandoned;
        self.active = 0;
        abandoned
    }

    /// Frees a slot whose abandoned task has exited.
    pub fn release_draining(&mut self) {
        debug_assert!(self.draining > 0, "release_draining() without an abandoned slot");
        self.draining = self.draining.saturating_sub(1);
    }

    /// Changes the slot limit (at least one).
    pub fn set_max(&mut self, max: usize) {
        self.max = max.max(MIN_WORKERS);
    }

    /// Configured slot limit.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Slots currently fetching.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Abandoned slots whose tasks have not exited yet.
    pub fn draining(&self) -> usize {
        self.draining
    }

    /// Highest number of simultaneously occupied slots observed.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Returns the activity state to publish, if it changed since last time.
    pub fn take_activity_change(&mut self) -> Option<bool> {
        let active = self.active > 0;
        if active == self.reported_active {
            return None;
        }
        self.reported_active = active;
        Some(active)
    }
}
