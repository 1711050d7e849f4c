//! First-layer accumulators and their incremental maintenance.
//!
//! Each search ply owns a pair of perspective accumulators. On a move the
//! node only records the dirty pieces; the first evaluation walks down to
//! the nearest clean ancestor whose king kept its bucket and replays the
//! dirty lists upward, refreshing from scratch when the walk would cost
//! more than rebuilding from the piece list.

use crate::board::{Color, DirtyPieces, Piece, Position, Square, MAX_PLY};

use super::network::{feature_index, Network};
use super::HIDDEN;

/// Per-perspective king placement context: bucket plus the applied square
/// transform. A perspective's accumulator can only be reused while this is
/// unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct KingContext {
    bucket: u8,
    flip: u8,
}

impl KingContext {
    #[must_use]
    pub fn of(pos: &Position, perspective: Color, network: &Network) -> Self {
        let king = pos.king_square(perspective);
        // rank flip for black, file mirror towards files a-d
        let mut flip = if perspective == Color::Black { 56u8 } else { 0 };
        let relative = Square::from_index(king.index() ^ flip as usize);
        if relative.file() > 3 {
            flip |= 7;
        }
        let relative = Square::from_index(king.index() ^ flip as usize);
        let half_index = relative.rank() * 4 + relative.file();
        KingContext {
            bucket: network.king_bucket(half_index) as u8,
            flip,
        }
    }
}

/// Dual-perspective first-layer activations.
#[derive(Clone)]
pub struct Accumulator {
    pub values: [[i16; HIDDEN]; 2],
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator {
            values: [[0; HIDDEN]; 2],
        }
    }
}

struct Entry {
    acc: Accumulator,
    fresh: [bool; 2],
    king_ctx: [KingContext; 2],
    dirty: DirtyPieces,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            acc: Accumulator::default(),
            fresh: [false; 2],
            king_ctx: [KingContext::default(); 2],
            dirty: DirtyPieces::new(),
        }
    }
}

/// One accumulator slot per search ply.
pub struct AccumulatorStack {
    entries: Vec<Entry>,
}

impl AccumulatorStack {
    #[must_use]
    pub fn new() -> Self {
        AccumulatorStack {
            entries: (0..MAX_PLY).map(|_| Entry::default()).collect(),
        }
    }

    /// Install the root position: both perspectives refreshed from scratch.
    pub fn reset_root(&mut self, pos: &Position, network: &Network) {
        for perspective in Color::BOTH {
            let ctx = KingContext::of(pos, perspective, network);
            self.entries[0].king_ctx[perspective.index()] = ctx;
            refresh(
                &mut self.entries[0].acc.values[perspective.index()],
                pos,
                perspective,
                ctx,
                network,
            );
            self.entries[0].fresh[perspective.index()] = true;
        }
        self.entries[0].dirty.clear();
    }

    /// Record a move made from ply `ply - 1` into ply `ply`.
    pub fn on_move(
        &mut self,
        ply: usize,
        pos_after: &Position,
        dirty: &DirtyPieces,
        network: &Network,
    ) {
        let entry = &mut self.entries[ply];
        entry.fresh = [false; 2];
        entry.dirty = *dirty;
        for perspective in Color::BOTH {
            entry.king_ctx[perspective.index()] =
                KingContext::of(pos_after, perspective, network);
        }
    }

    /// Evaluate at `ply`, making both perspective accumulators current
    /// first.
    pub fn evaluate(&mut self, ply: usize, pos: &Position, network: &Network) -> i32 {
        for perspective in Color::BOTH {
            self.ensure(ply, perspective, pos, network);
        }
        let entry = &self.entries[ply];
        let stm = pos.side_to_move();
        let us = &entry.acc.values[stm.index()];
        let them = &entry.acc.values[(!stm).index()];
        network.evaluate(us, them, pos)
    }

    fn ensure(&mut self, ply: usize, perspective: Color, pos: &Position, network: &Network) {
        let p = perspective.index();
        if self.entries[ply].fresh[p] {
            return;
        }

        let ctx = self.entries[ply].king_ctx[p];
        // walk towards the root looking for a reusable ancestor
        let mut start = None;
        let mut cursor = ply;
        let max_walk = pos.num_pieces_excluding_kings() as usize + 2;
        while cursor > 0 {
            if self.entries[cursor].king_ctx[p] != ctx || ply - cursor >= max_walk {
                break;
            }
            cursor -= 1;
            if self.entries[cursor].king_ctx[p] == ctx && self.entries[cursor].fresh[p] {
                start = Some(cursor);
                break;
            }
        }

        match start {
            Some(from) => {
                for i in from + 1..=ply {
                    let (lower, upper) = self.entries.split_at_mut(i);
                    let prev = &lower[i - 1];
                    let entry = &mut upper[0];
                    entry.acc.values[p] = prev.acc.values[p];
                    apply_dirty(
                        &mut entry.acc.values[p],
                        &entry.dirty,
                        perspective,
                        ctx,
                        network,
                    );
                    entry.fresh[p] = true;
                }
            }
            None => {
                refresh(
                    &mut self.entries[ply].acc.values[p],
                    pos,
                    perspective,
                    ctx,
                    network,
                );
                self.entries[ply].fresh[p] = true;
            }
        }
    }
}

impl Default for AccumulatorStack {
    fn default() -> Self {
        AccumulatorStack::new()
    }
}

/// Rebuild one perspective from the piece list.
fn refresh(
    acc: &mut [i16; HIDDEN],
    pos: &Position,
    perspective: Color,
    ctx: KingContext,
    network: &Network,
) {
    acc.copy_from_slice(network.bias());
    for color in Color::BOTH {
        for piece in Piece::ALL {
            for sq in pos.pieces(color, piece) {
                let feature = feature_index(
                    perspective,
                    ctx.bucket as usize,
                    ctx.flip as usize,
                    color,
                    piece.index(),
                    sq.index(),
                );
                add_row(acc, network.feature_row(feature));
            }
        }
    }
}

/// Apply one node's dirty list; paired add/remove of the same piece on the
/// same square cancel out before touching the vectors.
fn apply_dirty(
    acc: &mut [i16; HIDDEN],
    dirty: &DirtyPieces,
    perspective: Color,
    ctx: KingContext,
    network: &Network,
) {
    let mut adds = [0usize; 3];
    let mut removes = [0usize; 3];
    let mut num_adds = 0;
    let mut num_removes = 0;

    for dp in dirty.as_slice() {
        if dp.from.is_valid() {
            removes[num_removes] = feature_index(
                perspective,
                ctx.bucket as usize,
                ctx.flip as usize,
                dp.color,
                dp.piece.index(),
                dp.from.index(),
            );
            num_removes += 1;
        }
        if dp.to.is_valid() {
            adds[num_adds] = feature_index(
                perspective,
                ctx.bucket as usize,
                ctx.flip as usize,
                dp.color,
                dp.piece.index(),
                dp.to.index(),
            );
            num_adds += 1;
        }
    }

    // cancel matching pairs
    let mut i = 0;
    while i < num_adds {
        if let Some(j) = removes[..num_removes].iter().position(|&r| r == adds[i]) {
            num_removes -= 1;
            removes.swap(j, num_removes);
            num_adds -= 1;
            adds.swap(i, num_adds);
        } else {
            i += 1;
        }
    }

    for &feature in &adds[..num_adds] {
        add_row(acc, network.feature_row(feature));
    }
    for &feature in &removes[..num_removes] {
        sub_row(acc, network.feature_row(feature));
    }
}

#[inline]
fn add_row(acc: &mut [i16; HIDDEN], row: &[i16]) {
    for (a, &w) in acc.iter_mut().zip(row) {
        *a = a.wrapping_add(w);
    }
}

#[inline]
fn sub_row(acc: &mut [i16; HIDDEN], row: &[i16]) {
    for (a, &w) in acc.iter_mut().zip(row) {
        *a = a.wrapping_sub(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{GenMode, MoveList};
    use crate::nnue::test_network;

    /// Incremental updates must land on the same accumulator as a refresh
    /// from scratch, across random play.
    #[test]
    fn test_incremental_matches_refresh() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let network = test_network(7);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..8 {
            let mut stack = AccumulatorStack::new();
            let mut pos = Position::start();
            stack.reset_root(&pos, &network);

            for ply in 1..24 {
                let mut list = MoveList::new();
                pos.generate_moves(GenMode::Captures, &mut list);
                pos.generate_moves(GenMode::Quiets, &mut list);
                // random legal move
                let mut candidates: Vec<_> = list
                    .iter()
                    .copied()
                    .filter(|&mv| {
                        let mut c = pos.clone();
                        c.make_move(mv)
                    })
                    .collect();
                if candidates.is_empty() {
                    break;
                }
                let pick = rng.gen_range(0..candidates.len());
                let mv = candidates.swap_remove(pick);

                let mut dirty = DirtyPieces::new();
                assert!(pos.do_move(mv, &mut dirty));
                stack.on_move(ply, &pos, &dirty, &network);

                let incremental = stack.evaluate(ply, &pos, &network);

                // compare against a from-scratch stack
                let mut fresh_stack = AccumulatorStack::new();
                fresh_stack.reset_root(&pos, &network);
                let scratch = fresh_stack.evaluate(0, &pos, &network);

                assert_eq!(incremental, scratch, "divergence at ply {ply} after {mv}");
            }
        }
    }

    #[test]
    fn test_king_context_mirrors() {
        let network = test_network(3);
        let pos = Position::start();
        // white king e1 sits on files e-h, so the file mirror applies
        let ctx = KingContext::of(&pos, Color::White, &network);
        assert_eq!(ctx.flip & 7, 7);
        // black king e8: rank flip plus file mirror
        let ctx = KingContext::of(&pos, Color::Black, &network);
        assert_eq!(ctx.flip, 56 | 7);
    }
}
