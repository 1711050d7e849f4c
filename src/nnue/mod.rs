//! NNUE evaluation: king-bucketed, perspective-relative feature set with
//! incrementally maintained first-layer accumulators.
//!
//! Feature space per perspective: 13 king buckets x 12 piece planes x 64
//! squares, with ranks flipped for black and files mirrored so the own
//! king always sits on files a-d. The output layer is bucketed by piece
//! count and queen presence.

mod accumulator;
mod network;

pub use accumulator::{Accumulator, AccumulatorStack, KingContext};
pub use network::{
    feature_index, Network, NetworkDimensionError, DEFAULT_KING_BUCKETS, QA, QB, SCALE,
};

use crate::board::material::evaluate_terminal;
use crate::board::{evaluate_classical, Color, Piece, Position};

/// First-layer width.
pub const HIDDEN: usize = 256;

/// Number of king buckets in the feature set.
pub const NUM_KING_BUCKETS: usize = 13;

/// Input features per perspective.
pub const NUM_FEATURES: usize = NUM_KING_BUCKETS * 12 * 64;

/// Output buckets: piece-count octile x queen presence.
pub const NUM_OUTPUT_BUCKETS: usize = 16;

/// Output bucket for a position: `min(pieces/4, 7)` plus a queen-presence
/// offset.
#[inline]
#[must_use]
pub fn output_bucket(pos: &Position) -> usize {
    let count_bucket = (pos.num_pieces_excluding_kings() / 4).min(7) as usize;
    let queens = (pos.pieces(Color::White, Piece::Queen)
        | pos.pieces(Color::Black, Piece::Queen))
    .any();
    count_bucket + if queens { 8 } else { 0 }
}

/// Position evaluator: terminal-material recognition in front of either
/// the network or the classical fallback.
pub struct Evaluator {
    network: Option<Network>,
}

impl Evaluator {
    /// Evaluator with no network: classical material + piece-square eval.
    #[must_use]
    pub fn classical() -> Self {
        Evaluator { network: None }
    }

    /// Evaluator backed by loader-supplied weights.
    #[must_use]
    pub fn with_network(network: Network) -> Self {
        Evaluator {
            network: Some(network),
        }
    }

    #[must_use]
    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    /// Evaluate without accumulator reuse (root calls, tests). Output is
    /// from the side-to-move perspective.
    #[must_use]
    pub fn evaluate(&self, pos: &Position) -> i32 {
        if let Some(score) = evaluate_terminal(pos) {
            return score;
        }
        match &self.network {
            Some(network) => {
                let mut stack = AccumulatorStack::new();
                stack.reset_root(pos, network);
                stack.evaluate(0, pos, network)
            }
            None => evaluate_classical(pos),
        }
    }

    /// Evaluate at a search ply with the thread's accumulator stack.
    #[must_use]
    pub fn evaluate_at(
        &self,
        stack: &mut AccumulatorStack,
        ply: usize,
        pos: &Position,
    ) -> i32 {
        if let Some(score) = evaluate_terminal(pos) {
            return score;
        }
        match &self.network {
            Some(network) => stack.evaluate(ply, pos, network),
            None => evaluate_classical(pos),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::classical()
    }
}

/// Deterministic random network for accumulator and search plumbing tests.
#[cfg(test)]
pub(crate) fn test_network(seed: u64) -> Network {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    let feature_weights = (0..NUM_FEATURES * HIDDEN)
        .map(|_| rng.gen_range(-32i16..=32))
        .collect();
    let feature_bias = (0..HIDDEN).map(|_| rng.gen_range(-64i16..=64)).collect();
    let output_weights = (0..NUM_OUTPUT_BUCKETS * 2 * HIDDEN)
        .map(|_| rng.gen_range(-64i16..=64))
        .collect();
    let output_bias = (0..NUM_OUTPUT_BUCKETS)
        .map(|_| rng.gen_range(-1000i32..=1000))
        .collect();
    Network::from_parts(
        feature_weights,
        feature_bias,
        output_weights,
        output_bias,
        DEFAULT_KING_BUCKETS,
    )
    .expect("test network dimensions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_bucket() {
        let pos = Position::start();
        // 30 non-king pieces, queens on board
        assert_eq!(output_bucket(&pos), 7 + 8);
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        assert_eq!(output_bucket(&pos), 0);
    }

    #[test]
    fn test_classical_evaluator_terminal_overrides() {
        let eval = Evaluator::classical();
        let draw = Position::from_fen("4k2K/8/8/8/3N4/8/8/8 w - - 0 1").unwrap();
        assert_eq!(eval.evaluate(&draw), 0);
    }

    #[test]
    fn test_network_eval_is_stm_relative() {
        let eval = Evaluator::with_network(test_network(11));
        let pos =
            Position::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3")
                .unwrap();
        // the same arrangement with colors swapped scores identically for
        // the side to move
        let swapped = pos.swap_colors();
        assert_eq!(eval.evaluate(&pos), eval.evaluate(&swapped));
    }
}
