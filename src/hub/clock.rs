//! Per-side chess clocks. Generalizes `gameroom::timer::Timer`'s single
//! optional deadline to two independently-armed clocks (one per side), since
//! only the side to move ever has a running flag timer.
//!
//! Time arithmetic matches the source's `updateGameStateAfterMove`: on a
//! move, the mover's remaining time is reduced by the wall-clock elapsed
//! since `time_of_last_move` and then credited the per-move increment; the
//! flag deadline is rearmed for the new side to move using *their* stored
//! remaining time, unadjusted for elapsed wall-clock until they actually
//! move or it's queried for display.

use std::time::{Duration, Instant};

use crate::model::TimeControl;
use crate::rules::position::Color;

/// Stand-in for "no deadline" while a clock is unarmed, per spec §4.D: "The
/// initial position has `timerArmed = false`." Large enough that no
/// `select!` branch keyed on [`Clocks::time_until_flag`] ever actually fires.
const UNARMED: Duration = Duration::from_secs(86_400 * 365);

#[derive(Debug, Clone, Copy)]
pub struct Clocks {
    pub white_ms_remaining: i64,
    pub black_ms_remaining: i64,
    pub increment_ms: i64,
    /// Wall-clock instant the side to move's flag deadline falls on.
    deadline: Instant,
    /// Whether a side's clock is actually counting down. False for a freshly
    /// created match until its first ply is played — per spec §4.D, arming
    /// happens "on the first `postMove`", not at hub construction.
    armed: bool,
}

impl Clocks {
    /// A brand-new match's clocks: both sides at the full time-control
    /// budget, unarmed until the first move is played.
    pub fn new(time_control: TimeControl) -> Self {
        Clocks {
            white_ms_remaining: time_control.total_ms,
            black_ms_remaining: time_control.total_ms,
            increment_ms: time_control.increment_ms,
            deadline: Instant::now(),
            armed: false,
        }
    }

    /// Restores clocks from persisted remaining-time values (used when a
    /// hub is (re)constructed from a live match row rather than created
    /// fresh). `armed` should reflect whether the match is past its first
    /// move (spec §4.D's lifecycle rule); a freshly paired match restored
    /// before any ply stays unarmed just like [`Self::new`].
    pub fn restore(
        white_ms_remaining: i64,
        black_ms_remaining: i64,
        increment_ms: i64,
        side_to_move: Color,
        armed: bool,
    ) -> Self {
        let mut clocks = Clocks {
            white_ms_remaining,
            black_ms_remaining,
            increment_ms,
            deadline: Instant::now(),
            armed: false,
        };
        if armed {
            clocks.rearm(side_to_move);
        }
        clocks
    }

    pub fn remaining_ms(&self, color: Color) -> i64 {
        match color {
            Color::White => self.white_ms_remaining,
            Color::Black => self.black_ms_remaining,
        }
    }

    fn set_remaining_ms(&mut self, color: Color, value: i64) {
        match color {
            Color::White => self.white_ms_remaining = value,
            Color::Black => self.black_ms_remaining = value,
        }
    }

    /// Duration until the side to move's flag falls, used to schedule the
    /// hub's flag timer. Clamped to zero if already past due; [`UNARMED`]
    /// while the clock hasn't started yet.
    pub fn time_until_flag(&self) -> Duration {
        if !self.armed {
            return UNARMED;
        }
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn has_flagged(&self) -> bool {
        self.armed && Instant::now() >= self.deadline
    }

    /// Applies the elapsed-time deduction for `mover` making a move right
    /// now, credits the increment, and rearms the deadline for `mover`'s
    /// opponent. Relies on the invariant that `remaining_ms(mover)` already
    /// equals the budget the deadline was last armed with for them, so the
    /// live-remaining value is just [`Self::time_until_flag`] — unless the
    /// clock hasn't been armed yet (this is the first ply of the match), in
    /// which case `mover`'s stored budget hasn't started counting down at
    /// all and is used as-is.
    pub fn apply_move(&mut self, mover: Color) {
        let live_remaining =
            if self.armed { self.time_until_flag().as_millis() as i64 } else { self.remaining_ms(mover) };
        let new_remaining = (live_remaining + self.increment_ms).max(0);
        self.set_remaining_ms(mover, new_remaining);
        self.rearm(mover.opponent());
    }

    fn rearm(&mut self, side_to_move: Color) {
        let budget = self.remaining_ms(side_to_move).max(0);
        self.deadline = Instant::now() + Duration::from_millis(budget as u64);
        self.armed = true;
    }

    /// Snapshot of both sides' remaining time *right now*, accounting for
    /// elapsed wall-clock on whichever side is to move. Used when a new
    /// connection asks for current state, per the source's
    /// `getCurrentMatchStateForNewConnection`. Before the clock is armed,
    /// both sides' stored budgets are accurate as-is since neither has
    /// started counting down.
    pub fn snapshot(&self, side_to_move: Color) -> (i64, i64) {
        if !self.armed {
            return (self.white_ms_remaining, self.black_ms_remaining);
        }
        let live_remaining = self.time_until_flag().as_millis() as i64;
        match side_to_move {
            Color::White => (live_remaining, self.black_ms_remaining),
            Color::Black => (self.white_ms_remaining, live_remaining),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clock_is_unarmed_until_first_move() {
        let clocks = Clocks::new(TimeControl { total_ms: 60_000, increment_ms: 0 });
        assert_eq!(clocks.time_until_flag(), UNARMED);
        assert!(!clocks.has_flagged());
        assert_eq!(clocks.snapshot(Color::White), (60_000, 60_000));
    }

    #[test]
    fn first_move_arms_the_opponent_clock() {
        let mut clocks = Clocks::new(TimeControl { total_ms: 60_000, increment_ms: 2_000 });
        clocks.apply_move(Color::White);
        assert!(clocks.white_ms_remaining >= 60_000);
        assert!(clocks.time_until_flag() <= Duration::from_millis(60_000));
        assert_ne!(clocks.time_until_flag(), UNARMED);
    }

    #[test]
    fn restore_mid_game_arms_immediately() {
        let clocks = Clocks::restore(30_000, 45_000, 0, Color::Black, true);
        assert!(clocks.time_until_flag() <= Duration::from_millis(45_000));
        assert!(clocks.time_until_flag() > Duration::from_millis(44_000));
    }

    #[test]
    fn restore_before_first_move_stays_unarmed() {
        let clocks = Clocks::restore(60_000, 60_000, 0, Color::White, false);
        assert_eq!(clocks.time_until_flag(), UNARMED);
        assert!(!clocks.has_flagged());
    }
}
