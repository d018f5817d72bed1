//! Discrete-event timing on a virtual tick counter.
//!
//! A [`TimingEvent`] counts down a number of ticks and reports when it is
//! due. It never calls back into its owner: the owner advances it, asks
//! whether it is due with [`TimingEvent::take_due`], and then runs its own
//! handler. This keeps the owner's state borrowable while the event fires,
//! and makes the "run it now" path used by register reads
//! ([`TimingEvent::invoke_early`]) an ordinary method call rather than a
//! re-entrant trip through a scheduler.
//!
//! # Lifecycle
//!
//! ```text
//! schedule(period) ──► active, downcount = period
//!        │
//!   add_ticks(n)  ──► downcount -= n   (may go negative: overdue)
//!        │
//!   take_due()    ──► Some(ticks since last run) once downcount <= 0,
//!                     countdown restarts from the interval
//!        │
//!   deactivate()  ──► pending firing is dropped
//! ```

use crate::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Signed tick count on the emulated master clock.
pub type TickCount = i32;

/// A one-shot or periodic event on the virtual tick counter
#[derive(Debug, Clone)]
pub struct TimingEvent {
    name: &'static str,
    /// Ticks between the last (re)schedule and the first firing
    period: TickCount,
    /// Ticks between subsequent firings
    interval: TickCount,
    /// Ticks left until due; zero or negative means due
    downcount: TickCount,
    time_since_last_run: TickCount,
    active: bool,
}

/// Serializable snapshot of a [`TimingEvent`] (everything but its name)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimingEventState {
    pub period: TickCount,
    pub interval: TickCount,
    pub downcount: TickCount,
    pub time_since_last_run: TickCount,
    pub active: bool,
}

impl TimingEvent {
    /// Create an inactive event
    pub fn new(name: &'static str, period: TickCount, interval: TickCount) -> Self {
        Self {
            name,
            period,
            interval,
            downcount: period,
            time_since_last_run: 0,
            active: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> TickCount {
        self.period
    }

    pub fn interval(&self) -> TickCount {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Ticks until the event is due (zero or negative when due/overdue)
    pub fn ticks_until_due(&self) -> TickCount {
        self.downcount
    }

    pub fn ticks_since_last_run(&self) -> TickCount {
        self.time_since_last_run
    }

    /// True when active and the countdown has elapsed
    pub fn is_due(&self) -> bool {
        self.active && self.downcount <= 0
    }

    /// Set a new period (also used as the interval) and restart the countdown.
    pub fn schedule(&mut self, period: TickCount) {
        self.period = period;
        self.interval = period;
        self.downcount = period;
        self.time_since_last_run = 0;
        self.active = true;
        log(LogCategory::Timing, LogLevel::Trace, || {
            format!("{}: scheduled in {} ticks", self.name, period)
        });
    }

    /// Activate with the current period, restarting the countdown
    pub fn activate(&mut self) {
        if self.active {
            return;
        }
        self.downcount = self.period;
        self.time_since_last_run = 0;
        self.active = true;
    }

    /// Deactivate; any pending firing is dropped.
    pub fn deactivate(&mut self) {
        if self.active {
            log(LogCategory::Timing, LogLevel::Trace, || {
                format!("{}: deactivated with {} ticks left", self.name, self.downcount)
            });
        }
        self.active = false;
    }

    /// Advance the countdown without dispatching. Inactive events ignore time.
    pub fn add_ticks(&mut self, ticks: TickCount) {
        if !self.active {
            return;
        }
        self.downcount -= ticks;
        self.time_since_last_run += ticks;
    }

    /// Consume a firing if the event is due.
    ///
    /// Returns the ticks elapsed since the previous run. The countdown
    /// restarts from the interval, so a periodic event keeps firing until
    /// the owner reschedules or deactivates it.
    pub fn take_due(&mut self) -> Option<TickCount> {
        if !self.is_due() {
            return None;
        }
        let elapsed = self.time_since_last_run;
        self.downcount = self.interval;
        self.time_since_last_run = 0;
        Some(elapsed)
    }

    /// Fire now if the event is due or overdue.
    ///
    /// Used when an observer needs the most recent state before the event's
    /// natural dispatch point (e.g. a register read in the middle of a CPU
    /// slice). Does nothing for an event that is not due yet.
    pub fn invoke_early(&mut self) -> Option<TickCount> {
        let fired = self.take_due();
        if let Some(elapsed) = fired {
            log(LogCategory::Timing, LogLevel::Trace, || {
                format!("{}: invoked early after {} ticks", self.name, elapsed)
            });
        }
        fired
    }

    pub fn save_state(&self) -> TimingEventState {
        TimingEventState {
            period: self.period,
            interval: self.interval,
            downcount: self.downcount,
            time_since_last_run: self.time_since_last_run,
            active: self.active,
        }
    }

    pub fn load_state(&mut self, state: &TimingEventState) {
        self.period = state.period;
        self.interval = state.interval;
        self.downcount = state.downcount;
        self.time_since_last_run = state.time_since_last_run;
        self.active = state.active;
    }
}
