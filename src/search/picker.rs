//! Staged lazy move production.
//!
//! Moves come out in the order: previous-iteration PV move, TT move, good
//! captures and queen promotions, the two killers, then everything else by
//! ordering score. Stages generate and score only when reached, so a
//! cutoff on the TT move never pays for move generation.

use crate::board::{GenMode, Move, MoveList, Position};

use super::constants::{
    KILLER_MOVE_SCORE, PROMOTION_SCORE, PV_MOVE_SCORE, TT_MOVE_SCORE,
};
use super::history::{HistoryContext, MoveOrderer};
use super::node_cache::NodeCacheEntry;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    PvMove,
    TtMove,
    GenCaptures,
    Captures,
    Killer1,
    Killer2,
    GenQuiets,
    Pick,
    End,
}

/// Borrowed context for scoring moves at one node.
pub struct PickContext<'a> {
    pub pos: &'a Position,
    pub orderer: &'a MoveOrderer,
    pub history: &'a HistoryContext,
    pub height: usize,
    /// Near-root node statistics, when available.
    pub node_cache: Option<&'a NodeCacheEntry>,
}

pub struct MovePicker {
    stage: Stage,
    pv_move: Move,
    tt_move: Move,
    killers: [Move; 2],
    generate_quiets: bool,
    skip_quiets: bool,
    list: MoveList,
}

impl MovePicker {
    /// `generate_quiets` is false in quiescence: only good captures and
    /// queen promotions are produced.
    #[must_use]
    pub fn new(pv_move: Move, tt_move: Move, generate_quiets: bool) -> Self {
        MovePicker {
            stage: Stage::PvMove,
            pv_move,
            tt_move,
            killers: [Move::NONE; 2],
            generate_quiets,
            skip_quiets: false,
            list: MoveList::new(),
        }
    }

    /// Drop the remaining quiet stages (futility at the caller's request).
    pub fn skip_remaining_quiets(&mut self) {
        self.skip_quiets = true;
    }

    /// Next move with its ordering score, or `None` when exhausted.
    pub fn next(&mut self, ctx: &PickContext) -> Option<(Move, i32)> {
        loop {
            match self.stage {
                Stage::PvMove => {
                    self.stage = Stage::TtMove;
                    let mv = self.pv_move;
                    if mv.is_valid()
                        && (self.generate_quiets || mv.is_tactical())
                        && ctx.pos.is_move_pseudo_legal(mv)
                    {
                        return Some((mv, PV_MOVE_SCORE));
                    }
                }

                Stage::TtMove => {
                    self.stage = Stage::GenCaptures;
                    let mv = self.tt_move;
                    if mv.is_valid()
                        && mv != self.pv_move
                        && (self.generate_quiets || mv.is_tactical())
                        && ctx.pos.is_move_pseudo_legal(mv)
                    {
                        return Some((mv, TT_MOVE_SCORE));
                    }
                }

                Stage::GenCaptures => {
                    ctx.pos.generate_moves(GenMode::Captures, &mut self.list);
                    self.list.remove(self.pv_move);
                    self.list.remove(self.tt_move);
                    for i in 0..self.list.len() {
                        let score = ctx.orderer.score_capture(ctx.pos, self.list.get(i));
                        self.list.set_score(i, score);
                    }
                    self.stage = Stage::Captures;
                }

                Stage::Captures => {
                    if let Some(best) = self.list.best_index() {
                        let score = self.list.score(best);
                        if score >= PROMOTION_SCORE {
                            let mv = self.list.get(best);
                            self.list.remove_at(best);
                            return Some((mv, score));
                        }
                    }
                    if !self.generate_quiets {
                        self.stage = Stage::End;
                        return None;
                    }
                    self.killers = ctx.orderer.killers(ctx.height);
                    self.stage = Stage::Killer1;
                }

                Stage::Killer1 => {
                    self.stage = Stage::Killer2;
                    if let Some(mv) = self.killer_candidate(ctx, 0) {
                        return Some((mv, KILLER_MOVE_SCORE));
                    }
                }

                Stage::Killer2 => {
                    self.stage = Stage::GenQuiets;
                    if let Some(mv) = self.killer_candidate(ctx, 1) {
                        return Some((mv, KILLER_MOVE_SCORE - 1));
                    }
                }

                Stage::GenQuiets => {
                    if self.skip_quiets {
                        // leftover losing captures still deserve a look
                        self.stage = Stage::Pick;
                        continue;
                    }
                    let first_quiet = self.list.len();
                    ctx.pos.generate_moves(GenMode::Quiets, &mut self.list);
                    self.list.remove(self.pv_move);
                    self.list.remove(self.tt_move);
                    self.list.remove(self.killers[0]);
                    self.list.remove(self.killers[1]);
                    for i in 0..self.list.len() {
                        let mv = self.list.get(i);
                        // leftover captures before `first_quiet` are scored
                        if i >= first_quiet || mv.is_quiet() {
                            let score = self.quiet_score(ctx, mv);
                            self.list.set_score(i, score);
                        }
                    }
                    self.stage = Stage::Pick;
                }

                Stage::Pick => {
                    let Some(best) = self.list.best_index() else {
                        self.stage = Stage::End;
                        return None;
                    };
                    let mv = self.list.get(best);
                    let score = self.list.score(best);
                    self.list.remove_at(best);
                    if self.skip_quiets && mv.is_quiet() {
                        continue;
                    }
                    return Some((mv, score));
                }

                Stage::End => return None,
            }
        }
    }

    fn killer_candidate(&self, ctx: &PickContext, index: usize) -> Option<Move> {
        let mv = self.killers[index];
        (mv.is_valid()
            && mv.is_quiet()
            && mv != self.pv_move
            && mv != self.tt_move
            && ctx.pos.is_move_pseudo_legal(mv))
        .then_some(mv)
    }

    fn quiet_score(&self, ctx: &PickContext, mv: Move) -> i32 {
        if !mv.is_quiet() {
            return ctx.orderer.score_capture(ctx.pos, mv);
        }
        let Some((_, piece)) = ctx.pos.piece_at(mv.from()) else {
            return 0;
        };
        let mut score = ctx.orderer.score_quiet(ctx.history, mv, piece);

        // bias near-root ordering towards moves that soaked up nodes in
        // earlier iterations
        if let Some(cache) = ctx.node_cache {
            if let Some(permille) = cache.node_fraction(mv) {
                score += permille as i32 * 32;
            }
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Piece;
    use crate::search::history::HistoryContext;

    fn context<'a>(
        pos: &'a Position,
        orderer: &'a MoveOrderer,
        history: &'a HistoryContext,
    ) -> PickContext<'a> {
        PickContext {
            pos,
            orderer,
            history,
            height: 2,
            node_cache: None,
        }
    }

    fn drain(picker: &mut MovePicker, ctx: &PickContext) -> Vec<Move> {
        let mut out = Vec::new();
        while let Some((mv, _)) = picker.next(ctx) {
            out.push(mv);
        }
        out
    }

    #[test]
    fn test_tt_move_first_and_not_repeated() {
        let pos = Position::start();
        let orderer = MoveOrderer::new();
        let history = HistoryContext {
            stm_white: true,
            ..Default::default()
        };
        let ctx = context(&pos, &orderer, &history);
        let tt_move = pos.move_from_lan("e2e4").unwrap();

        let mut picker = MovePicker::new(Move::NONE, tt_move, true);
        let moves = drain(&mut picker, &ctx);
        assert_eq!(moves[0], tt_move);
        assert_eq!(moves.iter().filter(|&&m| m == tt_move).count(), 1);
        assert_eq!(moves.len(), 20);
    }

    #[test]
    fn test_good_captures_before_killers() {
        // white can win a queen with a pawn capture
        let pos =
            Position::from_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let mut orderer = MoveOrderer::new();
        let killer = pos.move_from_lan("e1d2").unwrap();
        orderer.update_killers(2, killer);
        let history = HistoryContext {
            stm_white: true,
            ..Default::default()
        };
        let ctx = context(&pos, &orderer, &history);

        let mut picker = MovePicker::new(Move::NONE, Move::NONE, true);
        let moves = drain(&mut picker, &ctx);
        let capture = pos.move_from_lan("e4d5").unwrap();
        let cap_idx = moves.iter().position(|&m| m == capture).unwrap();
        let killer_idx = moves.iter().position(|&m| m == killer).unwrap();
        assert!(cap_idx < killer_idx);
    }

    #[test]
    fn test_quiescence_mode_good_captures_only() {
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let orderer = MoveOrderer::new();
        let history = HistoryContext {
            stm_white: true,
            ..Default::default()
        };
        let ctx = context(&pos, &orderer, &history);

        let mut picker = MovePicker::new(Move::NONE, Move::NONE, false);
        let moves = drain(&mut picker, &ctx);
        assert!(!moves.is_empty());
        for mv in moves {
            assert!(mv.is_tactical());
        }
    }

    #[test]
    fn test_skip_quiets_still_yields_losing_captures() {
        // queen can only make a losing capture; quiets are skipped
        let pos =
            Position::from_fen("4k3/8/2p5/3p4/8/8/3Q4/4K3 w - - 0 1").unwrap();
        let orderer = MoveOrderer::new();
        let history = HistoryContext {
            stm_white: true,
            ..Default::default()
        };
        let ctx = context(&pos, &orderer, &history);

        let mut picker = MovePicker::new(Move::NONE, Move::NONE, true);
        picker.skip_remaining_quiets();
        let moves = drain(&mut picker, &ctx);
        let losing = pos.move_from_lan("d2d5").unwrap();
        assert!(moves.contains(&losing));
        assert!(moves.iter().all(|m| m.is_capture()));
    }

    #[test]
    fn test_no_duplicates_full_position() {
        let pos = Position::from_fen(
            "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        )
        .unwrap();
        let mut orderer = MoveOrderer::new();
        orderer.update_killers(2, pos.move_from_lan("a3a4").unwrap());
        let history = HistoryContext {
            stm_white: true,
            ..Default::default()
        };
        let ctx = context(&pos, &orderer, &history);
        let tt_move = pos.move_from_lan("d3d4").unwrap();

        let mut picker = MovePicker::new(Move::NONE, tt_move, true);
        let moves = drain(&mut picker, &ctx);

        let mut seen = std::collections::HashSet::new();
        for mv in &moves {
            assert!(seen.insert(*mv), "duplicate {mv}");
        }

        // same coverage as the raw generator
        let mut reference = MoveList::new();
        pos.generate_all_moves(&mut reference);
        assert_eq!(moves.len(), reference.len());
    }

    #[test]
    fn test_underpromotions_last() {
        let pos = Position::from_fen("8/P7/8/8/8/8/7k/K7 w - - 0 1").unwrap();
        let orderer = MoveOrderer::new();
        let history = HistoryContext {
            stm_white: true,
            ..Default::default()
        };
        let ctx = context(&pos, &orderer, &history);
        let mut picker = MovePicker::new(Move::NONE, Move::NONE, true);
        let moves = drain(&mut picker, &ctx);
        assert_eq!(moves[0].promotion_piece(), Some(Piece::Queen));
        // underpromotions are ordered behind every quiet move
        let rook_promo_idx = moves
            .iter()
            .position(|m| m.promotion_piece() == Some(Piece::Rook))
            .unwrap();
        for (i, mv) in moves.iter().enumerate() {
            if mv.is_quiet() {
                assert!(i < rook_promo_idx);
            }
        }
    }
}
