//! Conservative time-window synchronization.
//!
//! Each round, the controller grants its managers a bounded window of
//! simulated time. The window is sized so that no event originating outside
//! it can influence events inside it: its width never exceeds the smallest
//! end-to-end network latency known so far (with a configurable floor), so
//! events within the window can be processed without cross-worker
//! coordination.

use tracing::debug;

use crate::units::{Millisecs, Nanosecs};

/// Window width used until the topology reports a smaller path latency.
pub const DEFAULT_MIN_TIME_JUMP: Nanosecs = Nanosecs::new(10_000_000);

/// A half-open interval `[start, end)` of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecWindow {
    pub start: Nanosecs,
    pub end: Nanosecs,
}

/// The controller's answer to a finished round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStatus {
    /// The next execute window.
    pub window: ExecWindow,
    /// Whether the manager should run another round.
    pub keep_running: bool,
}

/// Tracks window bounds and the minimum allowed time jump between rounds.
#[derive(Debug)]
pub struct WindowEngine {
    /// User-supplied lower bound for the jump; zero when unset.
    min_jump_config: Nanosecs,
    /// Effective minimum jump, promoted from `next_min_jump` between rounds.
    min_jump: Nanosecs,
    /// Candidate jump observed from the topology; shrinks monotonically over
    /// the whole run and is never reset after promotion.
    next_min_jump: Nanosecs,
    window: ExecWindow,
    end_time: Nanosecs,
    bootstrap_end: Nanosecs,
}

impl WindowEngine {
    pub fn new(runahead: Millisecs) -> Self {
        Self {
            min_jump_config: runahead.into(),
            min_jump: Nanosecs::ZERO,
            next_min_jump: Nanosecs::ZERO,
            window: ExecWindow {
                start: Nanosecs::ZERO,
                end: Nanosecs::ZERO,
            },
            end_time: Nanosecs::ZERO,
            bootstrap_end: Nanosecs::ZERO,
        }
    }

    /// Sets the run boundaries and the initial window. With workers, the
    /// first window is one minimum jump wide; single-threaded runs get the
    /// whole simulation in one round.
    pub fn initialize(&mut self, workers: u32, stop_time: Nanosecs, bootstrap_end: Nanosecs) {
        self.end_time = stop_time;
        self.bootstrap_end = bootstrap_end;
        let end = if workers > 0 {
            self.min_time_jump()
        } else {
            Nanosecs::MAX
        };
        self.window = ExecWindow {
            start: Nanosecs::ZERO,
            end: end.min(self.end_time),
        };
    }

    /// The current lower bound on window width: the smallest observed path
    /// latency, floored by the default and by the configured runahead.
    pub fn min_time_jump(&self) -> Nanosecs {
        let mut jump = if self.min_jump > Nanosecs::ZERO {
            self.min_jump
        } else {
            DEFAULT_MIN_TIME_JUMP
        };
        if self.min_jump_config > Nanosecs::ZERO && jump < self.min_jump_config {
            jump = self.min_jump_config;
        }
        jump
    }

    /// Records a path latency reported by the topology. The candidate only
    /// ever shrinks; it takes effect at the next round boundary. `observed`
    /// must be positive.
    pub fn update_min_time_jump(&mut self, observed: Millisecs) {
        let observed: Nanosecs = observed.into();
        if self.next_min_jump == Nanosecs::ZERO || observed < self.next_min_jump {
            assert!(
                observed > Nanosecs::ZERO,
                "observed path latency must be positive"
            );
            debug!(
                old = %self.next_min_jump,
                new = %observed,
                config_floor = %self.min_jump_config,
                "updated topology minimum time jump"
            );
            self.next_min_jump = observed;
        }
    }

    /// Advances the window after a manager finishes its round, reporting the
    /// earliest event time still pending. Returns the committed window and
    /// whether the run continues.
    ///
    /// Both bounds are clamped to `end_time`, so `start <= end <= end_time`
    /// holds for every committed window; the continuation flag is unaffected
    /// by the clamp.
    pub fn finish_round(&mut self, min_next_event: Nanosecs) -> RoundStatus {
        if self.next_min_jump != Nanosecs::ZERO {
            self.min_jump = self.next_min_jump;
        }

        let end = min_next_event
            .saturating_add(self.min_time_jump())
            .min(self.end_time);
        let start = min_next_event.min(end);
        self.window = ExecWindow { start, end };

        RoundStatus {
            window: self.window,
            keep_running: start < end,
        }
    }

    /// Forces the run to wind down: the next round's window clamps to zero.
    pub fn terminate(&mut self) {
        self.end_time = Nanosecs::ZERO;
    }

    pub fn window(&self) -> ExecWindow {
        self.window
    }

    pub fn end_time(&self) -> Nanosecs {
        self.end_time
    }

    /// Simulated time before which bandwidth caps are not enforced.
    pub fn bootstrap_end(&self) -> Nanosecs {
        self.bootstrap_end
    }
}
