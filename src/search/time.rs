//! Time management.
//!
//! Converts clock state into a soft (ideal) and a hard (maximum) budget.
//! The soft budget shrinks while the best move stays stable and while the
//! root spends most of its nodes on the best move; the hard budget is an
//! absolute ceiling checked inside the search.

use std::time::{Duration, Instant};

use super::SearchParams;

/// Outcome of the previous search's ponder prediction, reported by the
/// front-end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MoveHint {
    #[default]
    None,
    /// Opponent played the predicted move.
    Hit,
    /// Opponent played something else.
    Miss,
}

const MOVES_LEFT_MIDPOINT: f64 = 41.0;
const MOVES_LEFT_STEEPNESS: f64 = 2.13;
const IDEAL_TIME_FACTOR: f64 = 0.83;
const PREDICTED_HIT_SCALE: f64 = 0.9;
const PREDICTED_MISS_SCALE: f64 = 1.1;
const STABILITY_OFFSET: f64 = 1.312;
const STABILITY_SCALE: f64 = 0.032;
const NODE_FRACTION_SCALE: f64 = 2.02;
const NODE_FRACTION_OFFSET: f64 = 0.55;
const TIME_MARGIN: f64 = 0.5;

/// Resolved budgets for one search.
#[derive(Clone, Copy, Debug)]
pub struct TimeLimits {
    pub start: Instant,
    /// Soft budget before per-iteration scaling.
    pub ideal_base: Option<Duration>,
    /// Soft budget after scaling; compared between iterations.
    pub ideal_current: Option<Duration>,
    /// Hard ceiling; checked every few hundred nodes.
    pub max_time: Option<Duration>,
}

impl TimeLimits {
    #[must_use]
    pub fn infinite(start: Instant) -> Self {
        TimeLimits {
            start,
            ideal_base: None,
            ideal_current: None,
            max_time: None,
        }
    }

    #[must_use]
    pub fn hard_deadline(&self) -> Option<Instant> {
        self.max_time.map(|d| self.start + d)
    }

    /// True once the soft budget is spent (checked between iterations).
    #[must_use]
    pub fn soft_expired(&self, now: Instant) -> bool {
        match self.ideal_current {
            Some(ideal) => now.duration_since(self.start) >= ideal,
            None => false,
        }
    }
}

/// Per-game state the manager carries between iterations.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeManagerState {
    pub stability_counter: u32,
}

/// Expected number of remaining moves, by game length so far.
fn estimate_moves_left(moves_played: u32) -> f64 {
    let moves = f64::from(moves_played);
    let midpoint = MOVES_LEFT_MIDPOINT;
    let steepness = MOVES_LEFT_STEEPNESS;
    midpoint * (1.0 + 1.5 * (moves / midpoint).powf(steepness)).powf(1.0 / steepness) - moves
}

/// Build the initial budgets from clock state.
#[must_use]
pub fn init_limits(params: &SearchParams, moves_played: u32, start: Instant) -> TimeLimits {
    let mut limits = TimeLimits::infinite(start);

    if let Some(remaining) = params.remaining_time {
        let remaining_ms = remaining.as_secs_f64() * 1000.0;
        let increment_ms = params
            .time_increment
            .map_or(0.0, |d| d.as_secs_f64() * 1000.0);
        let overhead_ms = params.move_overhead.as_secs_f64() * 1000.0;

        let moves_left = match params.moves_to_go {
            Some(n) => f64::from(n.max(1)),
            None => estimate_moves_left(moves_played),
        };

        let mut ideal = IDEAL_TIME_FACTOR * (remaining_ms / moves_left + increment_ms);
        let mut max_time = (remaining_ms - overhead_ms) / moves_left.sqrt() + increment_ms;

        let cap = (TIME_MARGIN * remaining_ms).max(0.001);
        ideal = ideal.clamp(0.0, cap);
        max_time = max_time.clamp(0.0, cap);

        match params.previous_move_hint {
            MoveHint::Hit => ideal *= PREDICTED_HIT_SCALE,
            MoveHint::Miss => ideal *= PREDICTED_MISS_SCALE,
            MoveHint::None => {}
        }

        limits.ideal_base = Some(Duration::from_secs_f64(ideal / 1000.0));
        limits.ideal_current = limits.ideal_base;
        limits.max_time = Some(Duration::from_secs_f64(max_time.max(0.0) / 1000.0));
    }

    if let Some(move_time) = params.move_time {
        limits.ideal_base = Some(move_time);
        limits.ideal_current = Some(move_time);
        limits.max_time = Some(move_time);
    }

    limits
}

/// Rescale the soft budget after a completed iteration.
///
/// `best_move_node_fraction` is the share of root nodes spent on the best
/// move; a huge share means the decision is already made.
pub fn update_limits(
    limits: &mut TimeLimits,
    state: &mut TimeManagerState,
    depth: u32,
    best_move_stable: bool,
    best_move_node_fraction: Option<f64>,
) {
    let Some(base) = limits.ideal_base else {
        return;
    };
    if depth < 5 {
        return;
    }

    if best_move_stable {
        state.stability_counter += 1;
    } else {
        state.stability_counter = 0;
    }

    let mut scale =
        STABILITY_OFFSET - STABILITY_SCALE * f64::from(state.stability_counter.min(10));

    if let Some(fraction) = best_move_node_fraction {
        let non_best = 1.0 - fraction;
        scale *= non_best * NODE_FRACTION_SCALE + NODE_FRACTION_OFFSET;
        if fraction > 0.98 {
            scale *= 0.001;
        }
    }

    limits.ideal_current = Some(Duration::from_secs_f64(base.as_secs_f64() * scale));
}
