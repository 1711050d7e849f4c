//! The per-thread search: iterative deepening, aspiration windows, negamax
//! and quiescence.
//!
//! Node types (Root / PV / NonPV) are an enum dispatched with plain
//! branches; the compiler folds the comparisons where it matters. Each ply
//! copies its parent's position and applies one move, so there is no
//! unmake path anywhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::board::material::is_insufficient_material;
use crate::board::{
    Color, DirtyPieces, Move, MoveList, Piece, Position, Square, MAX_PLY,
};
use crate::nnue::{AccumulatorStack, Evaluator};
use crate::tt::{Bounds, TranspositionTable};

use super::constants::*;
use super::correction::EvalCorrection;
use super::history::{HistoryContext, MoveOrderer, PrevMove};
use super::node::{is_repetition, new_stack, upcoming_repetition, NodeInfo};
use super::node_cache::NodeCache;
use super::picker::{MovePicker, PickContext};
use super::score::{is_mate_score, mated_in, INF, KNOWN_WIN, MATE, TB_WIN};
use super::time::{TimeLimits, TimeManagerState};
use super::{PvLine, SearchParams, SharedStats};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeType {
    Root,
    Pv,
    NonPv,
}

/// Result of one worker's full iterative deepening run.
pub(crate) struct WorkerResult {
    pub lines: Vec<PvLine>,
    pub depth_completed: u32,
    pub nodes: u64,
}

/// Per-thread tables that survive across searches.
pub(crate) struct ThreadTables {
    pub orderer: MoveOrderer,
    pub correction: EvalCorrection,
    pub node_cache: NodeCache,
}

impl ThreadTables {
    pub fn new() -> Self {
        ThreadTables {
            orderer: MoveOrderer::new(),
            correction: EvalCorrection::new(),
            node_cache: NodeCache::new(),
        }
    }
}

pub(crate) struct Worker<'a> {
    pub id: usize,
    pub tt: &'a TranspositionTable,
    pub evaluator: &'a Evaluator,
    pub stop: &'a AtomicBool,
    pub stats: &'a SharedStats,
    pub params: &'a SearchParams,
    /// Hashes of the game positions before the root (for repetitions).
    pub game_history: Vec<u64>,
    pub limits: TimeLimits,
    pub tables: &'a mut ThreadTables,

    stack: Vec<NodeInfo>,
    accumulators: AccumulatorStack,
    root_stm: Color,
    nodes: u64,
    unflushed_nodes: u64,
    aborted: bool,
    prev_pv: Vec<Move>,
    excluded_root: Vec<Move>,
    tm_state: TimeManagerState,
    rng: StdRng,
}

impl<'a> Worker<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        tt: &'a TranspositionTable,
        evaluator: &'a Evaluator,
        stop: &'a AtomicBool,
        stats: &'a SharedStats,
        params: &'a SearchParams,
        game_history: Vec<u64>,
        limits: TimeLimits,
        tables: &'a mut ThreadTables,
    ) -> Self {
        let seed = params.seed ^ (id as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Worker {
            id,
            tt,
            evaluator,
            stop,
            stats,
            params,
            game_history,
            limits,
            tables,
            stack: new_stack(),
            accumulators: AccumulatorStack::new(),
            root_stm: Color::White,
            nodes: 0,
            unflushed_nodes: 0,
            aborted: false,
            prev_pv: Vec::new(),
            excluded_root: Vec::new(),
            tm_state: TimeManagerState::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    // ==================================================================
    // iterative deepening
    // ==================================================================

    pub fn run(&mut self, root: Position) -> WorkerResult {
        self.root_stm = root.side_to_move();
        self.tables.orderer.new_search();
        self.tables.node_cache.on_new_search();

        if let Some(network) = self.evaluator.network() {
            self.accumulators.reset_root(&root, network);
        }
        self.stack[0].position = root.clone();
        self.stack[0].prev_move = Move::NONE;
        self.stack[0].prev_piece = None;
        self.stack[0].is_null = false;

        let root_moves = root.legal_moves();
        let multi_pv = self.params.multi_pv.max(1).min(root_moves.len().max(1));
        let max_depth = self.params.max_depth.clamp(1, MAX_PLY as u32 - 8);

        let mut result: Vec<PvLine> = Vec::new();
        let mut depth_completed = 0;
        let mut prev_scores: Vec<i32> = vec![0; multi_pv];

        'deepening: for depth in 1..=max_depth {
            let mut lines: Vec<PvLine> = Vec::new();
            self.excluded_root = self.params.excluded_root_moves.clone();

            for pv_index in 0..multi_pv {
                let line = self.aspiration_search(depth as i32, prev_scores[pv_index]);
                if self.aborted {
                    break 'deepening;
                }
                if let Some(&first) = line.moves.first() {
                    self.excluded_root.push(first);
                }
                lines.push(line);
            }

            if lines.is_empty() || lines[0].moves.is_empty() {
                break;
            }

            let best_move_stable = result
                .first()
                .and_then(|r| r.moves.first())
                .zip(lines[0].moves.first())
                .is_some_and(|(a, b)| a == b);

            for (i, line) in lines.iter().enumerate() {
                prev_scores[i] = i32::from(line.score);
            }
            self.prev_pv = lines[0].moves.clone();
            depth_completed = depth;
            result = lines;

            log::debug!(
                "worker {} depth {} score {} nodes {}",
                self.id,
                depth,
                result[0].score,
                self.nodes
            );

            if self.check_soft_limits(depth, best_move_stable, &root, &result, root_moves.len()) {
                break;
            }
            if self.stop.load(Ordering::Acquire) {
                break;
            }
        }

        self.flush_nodes();
        WorkerResult {
            lines: result,
            depth_completed,
            nodes: self.nodes,
        }
    }

    /// Between-iteration stop conditions. Only the main worker arbitrates
    /// time; any worker honors the node soft-limit.
    fn check_soft_limits(
        &mut self,
        depth: u32,
        best_move_stable: bool,
        root: &Position,
        result: &[PvLine],
        num_root_moves: usize,
    ) -> bool {
        if let Some(soft_nodes) = self.params.soft_max_nodes {
            if self.stats.nodes() >= soft_nodes {
                self.stop.store(true, Ordering::Release);
                return true;
            }
        }

        if self.id != 0 {
            return false;
        }

        // a single legal reply needs no deep deliberation
        if num_root_moves == 1 && depth >= 4 && !self.params.analysis {
            self.stop.store(true, Ordering::Release);
            return true;
        }

        // a proven mate cannot change with a few extra plies
        let score = i32::from(result[0].score);
        if is_mate_score(score) && !self.params.analysis {
            let mate_distance = MATE - score.abs();
            if depth as i32 >= mate_distance + 4 {
                self.stop.store(true, Ordering::Release);
                return true;
            }
        }

        let fraction = self
            .tables
            .node_cache
            .probe(root)
            .and_then(|entry| {
                let best = *result[0].moves.first()?;
                let nodes = entry.move_nodes(best)?;
                (entry.nodes_sum() > 0)
                    .then(|| nodes as f64 / entry.nodes_sum() as f64)
            });
        super::time::update_limits(
            &mut self.limits,
            &mut self.tm_state,
            depth,
            best_move_stable,
            fraction,
        );

        if self.limits.soft_expired(Instant::now()) {
            self.stop.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Search one depth with a window around the previous score, widening
    /// on failure.
    fn aspiration_search(&mut self, depth: i32, prev_score: i32) -> PvLine {
        let mut delta = ASPIRATION_WINDOW_START + prev_score * prev_score / 16384;
        let (mut alpha, mut beta) = if depth >= 5 {
            (
                (prev_score - delta).max(-INF),
                (prev_score + delta).min(INF),
            )
        } else {
            (-INF, INF)
        };
        let mut search_depth = depth;
        let mut line = PvLine::default();

        loop {
            self.stack[0].filtered_move = Move::NONE;
            self.stack[0].on_prev_pv = true;
            self.stack[0].is_cut_node = false;
            self.stack[0].double_extensions = 0;
            self.stack[0].pv_len = 0;

            let score = self.negamax(NodeType::Root, 0, search_depth, alpha, beta, true);
            if self.aborted {
                return line;
            }

            if score <= alpha {
                // fail low: full-depth re-search with a lower bound
                alpha = (score - delta).max(-INF);
                search_depth = depth;
            } else if score >= beta {
                // fail high: cheaper confirmation first
                beta = (score + delta).min(INF);
                search_depth = (search_depth - 1).max((depth - 4).max(1));
                line = self.extract_pv_line(score);
            } else {
                return self.extract_pv_line(score);
            }

            delta += delta / 3;
            if delta > ASPIRATION_WINDOW_MAX {
                alpha = -INF;
                beta = INF;
            }
        }
    }

    /// Rebuild the root PV as playable moves.
    fn extract_pv_line(&self, score: i32) -> PvLine {
        let mut moves = Vec::new();
        let mut pos = self.stack[0].position.clone();
        for i in 0..self.stack[0].pv_len as usize {
            let Some(mv) = pos.resolve_packed(self.stack[0].pv[i]) else {
                break;
            };
            if !pos.make_move(mv) {
                break;
            }
            moves.push(mv);
        }
        PvLine {
            score: score.clamp(-INF, INF) as i16,
            tb_score: None,
            moves,
        }
    }

    // ==================================================================
    // bookkeeping
    // ==================================================================

    #[inline]
    fn visit_node(&mut self, ply: usize) {
        self.nodes += 1;
        self.unflushed_nodes += 1;
        if self.unflushed_nodes >= 1024 {
            self.flush_nodes();
        }
        self.stats.update_max_depth(ply as u32);
    }

    fn flush_nodes(&mut self) {
        self.stats.add_nodes(self.unflushed_nodes);
        self.unflushed_nodes = 0;
    }

    /// Hard stop: stop flag, node ceiling, hard deadline. The deadline is
    /// polled every few hundred nodes.
    #[inline]
    fn should_abort(&mut self) -> bool {
        if self.aborted {
            return true;
        }
        if self.stop.load(Ordering::Acquire) {
            self.aborted = true;
            return true;
        }
        if self.nodes % HARD_LIMIT_CHECK_INTERVAL == 0 {
            if let Some(max_nodes) = self.params.max_nodes {
                if self.stats.nodes() + self.unflushed_nodes >= max_nodes {
                    self.stop.store(true, Ordering::Release);
                    self.aborted = true;
                    return true;
                }
            }
            if self.id == 0 {
                if let Some(deadline) = self.limits.hard_deadline() {
                    if Instant::now() >= deadline {
                        self.stop.store(true, Ordering::Release);
                        self.aborted = true;
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Raw static eval (no correction), side-to-move view.
    fn raw_eval(&mut self, ply: usize) -> i32 {
        self.evaluator
            .evaluate_at(&mut self.accumulators, ply, &self.stack[ply].position)
    }

    /// Correction, contempt and (for helpers) a grain of randomness.
    /// Decided-material scores pass through untouched.
    fn adjust_eval(&mut self, ply: usize, raw: i32) -> i32 {
        if raw.abs() >= KNOWN_WIN {
            return raw;
        }
        let pos = &self.stack[ply].position;
        let mut eval = self.tables.correction.apply(raw, pos);
        if self.params.contempt != 0 {
            if pos.side_to_move() == self.root_stm {
                eval += self.params.contempt;
            } else {
                eval -= self.params.contempt;
            }
        }
        if self.id != 0 {
            eval += self.rng.gen_range(-4..=4);
        }
        eval.clamp(-KNOWN_WIN + 1, KNOWN_WIN - 1)
    }

    /// Continuation-history coordinates for the path into `ply`.
    fn history_context(&self, ply: usize) -> HistoryContext {
        let mut ctx = HistoryContext {
            stm_white: self.stack[ply].position.side_to_move() == Color::White,
            threats: self.stack[ply].threats,
            prev: [None; 4],
        };
        for (chain, lookback) in [1usize, 2, 4, 6].into_iter().enumerate() {
            if lookback > ply {
                continue;
            }
            let node = &self.stack[ply + 1 - lookback];
            if node.is_null || !node.prev_move.is_valid() {
                continue;
            }
            let Some(piece) = node.prev_piece else { continue };
            ctx.prev[chain] = Some(PrevMove {
                piece,
                to: node.prev_move.to(),
                is_capture: node.prev_move.is_capture(),
                stm_white: node.position.side_to_move() == Color::Black,
            });
        }
        ctx
    }

    /// Install a child node after `do_move` succeeded on `position`.
    fn set_child_node(
        &mut self,
        ply: usize,
        position: Position,
        mv: Move,
        piece: Piece,
        dirty: DirtyPieces,
        on_prev_pv: bool,
        is_cut_node: bool,
    ) {
        let parent_double_ext = self.stack[ply - 1].double_extensions;
        let child = &mut self.stack[ply];
        child.position = position;
        child.prev_move = mv;
        child.prev_piece = Some(piece);
        child.dirty = dirty;
        child.is_null = false;
        child.filtered_move = Move::NONE;
        child.double_extensions = parent_double_ext;
        child.on_prev_pv = on_prev_pv;
        child.is_cut_node = is_cut_node;
        child.pv_len = 0;
        child.height = ply as u16;
        if let Some(network) = self.evaluator.network() {
            self.accumulators
                .on_move(ply, &self.stack[ply].position, &self.stack[ply].dirty, network);
        }
    }

    fn set_null_child(&mut self, ply: usize) {
        let mut position = self.stack[ply - 1].position.clone();
        position.do_null_move();
        let child = &mut self.stack[ply];
        child.position = position;
        child.prev_move = Move::NONE;
        child.prev_piece = None;
        child.dirty.clear();
        child.is_null = true;
        child.filtered_move = Move::NONE;
        child.on_prev_pv = false;
        child.is_cut_node = true;
        child.pv_len = 0;
        child.height = ply as u16;
        if let Some(network) = self.evaluator.network() {
            self.accumulators
                .on_move(ply, &self.stack[ply].position, &self.stack[ply].dirty, network);
        }
    }

    /// Prepend `mv` to the child PV and adopt it.
    fn update_pv(&mut self, ply: usize, mv: Move) {
        let (head, tail) = self.stack.split_at_mut(ply + 1);
        let parent = &mut head[ply];
        let child = &tail[0];
        parent.pv[0] = mv.packed();
        let child_len = (child.pv_len as usize).min(MAX_PLY - 1);
        parent.pv[1..=child_len].copy_from_slice(&child.pv[..child_len]);
        parent.pv_len = child_len as u16 + 1;
    }

    // ==================================================================
    // negamax
    // ==================================================================

    #[allow(clippy::too_many_lines)]
    fn negamax(
        &mut self,
        node_type: NodeType,
        ply: usize,
        depth: i32,
        mut alpha: i32,
        mut beta: i32,
        allow_null: bool,
    ) -> i32 {
        let is_root = node_type == NodeType::Root;
        let is_pv = node_type != NodeType::NonPv;

        if ply >= MAX_PLY - 2 {
            return 0;
        }
        self.stack[ply].height = ply as u16;

        self.visit_node(ply);
        if self.should_abort() {
            return 0;
        }

        let in_check = {
            let pos = &self.stack[ply].position;
            pos.is_in_check(pos.side_to_move())
        };
        self.stack[ply].in_check = in_check;

        // ---- draws and bound sharpening -------------------------------
        if !is_root {
            let halfmove = self.stack[ply].position.halfmove_clock();
            if halfmove >= 100 {
                return 0;
            }
            if is_insufficient_material(&self.stack[ply].position) {
                return 0;
            }
            if is_repetition(&self.stack, ply, &self.game_history, is_pv) {
                return 0;
            }
            // a reachable repetition turns a lost position into a draw
            if alpha < 0 && upcoming_repetition(&self.stack, ply) {
                alpha = 0;
                if alpha >= beta {
                    return alpha;
                }
            }

            // mate-distance pruning
            alpha = alpha.max(mated_in(ply as i32));
            beta = beta.min(MATE - ply as i32 - 1);
            if alpha >= beta {
                return alpha;
            }
        }

        if depth <= 0 {
            return self.quiescence(is_pv, ply, alpha, beta);
        }

        // ---- transposition table --------------------------------------
        let filtered_move = self.stack[ply].filtered_move;
        let mut tt_move = Move::NONE;
        let mut tt_score = -INF;
        let mut tt_static_eval = -INF;
        let mut tt_bounds = Bounds::Invalid;
        let mut tt_depth = -1;

        if !filtered_move.is_valid() {
            if let Some(entry) = self.tt.read(&self.stack[ply].position, ply as i32) {
                tt_move = self
                    .stack[ply]
                    .position
                    .resolve_packed(entry.mv)
                    .unwrap_or(Move::NONE);
                tt_score = i32::from(entry.score);
                tt_static_eval = i32::from(entry.static_eval);
                tt_bounds = entry.bounds;
                tt_depth = i32::from(entry.depth);

                let can_cut = !is_pv
                    && tt_depth >= depth
                    && self.stack[ply].position.halfmove_clock() < 90
                    && match tt_bounds {
                        Bounds::Exact => true,
                        Bounds::Lower => tt_score >= beta,
                        Bounds::Upper => tt_score <= alpha,
                        Bounds::Invalid => false,
                    };
                if can_cut {
                    return tt_score;
                }
            }
        }

        // ---- static evaluation ----------------------------------------
        let raw_eval = if in_check {
            -INF
        } else if tt_static_eval > -INF {
            tt_static_eval
        } else {
            self.raw_eval(ply)
        };
        let static_eval = if in_check {
            -INF
        } else {
            self.adjust_eval(ply, raw_eval)
        };
        self.stack[ply].static_eval = static_eval;

        // the searched score is a better estimate than the static eval
        let mut eval = static_eval;
        if !in_check
            && tt_score > -INF
            && match tt_bounds {
                Bounds::Lower => tt_score > eval,
                Bounds::Upper => tt_score < eval,
                Bounds::Exact => true,
                Bounds::Invalid => false,
            }
        {
            eval = tt_score;
        }

        let improving = !in_check
            && if ply >= 2 && self.stack[ply - 2].static_eval > -INF {
                static_eval > self.stack[ply - 2].static_eval
            } else if ply >= 4 && self.stack[ply - 4].static_eval > -INF {
                static_eval > self.stack[ply - 4].static_eval
            } else {
                true
            };

        {
            let pos = &self.stack[ply].position;
            self.stack[ply].threats = pos.compute_threats(!pos.side_to_move());
        }

        // ---- whole-node pruning ---------------------------------------
        if !is_pv && !in_check && !filtered_move.is_valid() && beta.abs() < KNOWN_WIN {
            // reverse futility: hopeless for the opponent
            if depth <= BETA_PRUNING_DEPTH {
                let safely_improving = improving
                    && !opp_can_win_material(&self.stack[ply].position, &self.stack[ply].threats);
                let margin = BETA_MARGIN_BIAS
                    + BETA_MARGIN_MULTIPLIER * (depth - i32::from(safely_improving));
                if eval - margin >= beta {
                    return (eval + beta) / 2;
                }
            }

            // razoring: hopeless for us
            if depth <= RAZORING_START_DEPTH
                && eval + RAZORING_MARGIN_MULTIPLIER * depth + RAZORING_MARGIN_BIAS < beta
            {
                let score = self.quiescence(false, ply, alpha, beta);
                if score < beta || self.aborted {
                    return score;
                }
            }

            // null-move pruning: the TT-substituted estimate must clear
            // beta (with a margin at shallow depth) and so must the plain
            // static eval, so a cached score alone cannot trigger it
            if allow_null
                && depth >= NULL_MOVE_START_DEPTH
                && eval >= beta + if depth < 4 { 20 } else { 0 }
                && static_eval >= beta
                && self
                    .stack[ply]
                    .position
                    .has_non_pawn_material(self.stack[ply].position.side_to_move())
            {
                let reduction = NULL_MOVE_DEPTH_REDUCTION
                    + depth / 3
                    + ((eval - beta) / 256).clamp(0, 3)
                    + i32::from(improving);
                self.set_null_child(ply + 1);
                let mut score = -self.negamax(
                    NodeType::NonPv,
                    ply + 1,
                    depth - reduction,
                    -beta,
                    -beta + 1,
                    false,
                );
                if self.aborted {
                    return 0;
                }
                if score >= beta {
                    if score >= TB_WIN {
                        score = beta;
                    }
                    if depth < NULL_MOVE_VERIFICATION_DEPTH && beta.abs() < KNOWN_WIN {
                        return score;
                    }
                    // zugzwang guard: confirm without the null move
                    let verification = self.negamax(
                        NodeType::NonPv,
                        ply,
                        depth - NULL_MOVE_RESEARCH_REDUCTION,
                        beta - 1,
                        beta,
                        false,
                    );
                    if self.aborted {
                        return 0;
                    }
                    if verification >= beta {
                        return score;
                    }
                }
            }

            // probcut: a good capture clearing beta by a margin usually
            // holds at full depth
            if depth >= PROBCUT_START_DEPTH && eval > -INF {
                let probcut_beta = beta + PROBCUT_BETA_OFFSET;
                if let Some(score) = self.probcut(ply, depth, probcut_beta) {
                    return score;
                }
                if self.aborted {
                    return 0;
                }
            }
        }

        // internal iterative reduction: no TT move at high depth means the
        // previous iteration never visited, a shallower pass is cheaper
        let mut depth = depth;
        if depth >= IIR_MIN_DEPTH && !tt_move.is_valid() && !filtered_move.is_valid() {
            depth -= 1;
        }

        // ---- singular extension ---------------------------------------
        let mut singular_extension = 0i32;
        if !is_root
            && !filtered_move.is_valid()
            && depth >= SINGULAR_EXTENSION_MIN_DEPTH
            && tt_move.is_valid()
            && tt_depth >= depth - 3
            && matches!(tt_bounds, Bounds::Lower | Bounds::Exact)
            && tt_score.abs() < KNOWN_WIN
        {
            let singular_beta = (tt_score - depth).max(-MATE);
            self.stack[ply].filtered_move = tt_move;
            let score = self.negamax(
                NodeType::NonPv,
                ply,
                (depth - 1) / 2,
                singular_beta - 1,
                singular_beta,
                allow_null,
            );
            self.stack[ply].filtered_move = Move::NONE;
            if self.aborted {
                return 0;
            }

            if score < singular_beta {
                singular_extension = 1;
                if !is_pv
                    && self.stack[ply].double_extensions < SINGULAR_DOUBLE_EXTENSION_QUOTA
                    && score < singular_beta - SINGULAR_DOUBLE_EXTENSION_MARGIN
                {
                    singular_extension = 2;
                    self.stack[ply].double_extensions += 1;
                }
            } else if singular_beta >= beta {
                // multi-cut: even without the TT move we clear beta
                return singular_beta;
            } else if tt_score >= beta {
                singular_extension = -2;
            } else if self.stack[ply].is_cut_node {
                singular_extension = -1;
            }
        }

        // ---- move loop ------------------------------------------------
        let hctx = self.history_context(ply);
        let pv_move = self.previous_pv_move(ply);
        let mut picker = MovePicker::new(pv_move, tt_move, true);

        let stm = self.stack[ply].position.side_to_move();
        let original_alpha = alpha;
        let mut best_score = -INF;
        let mut best_move = Move::NONE;
        let mut move_index = 0usize;
        let mut quiet_index = 0usize;
        let mut quiets_tried: Vec<(Move, Piece)> = Vec::with_capacity(32);
        let mut captures_tried: Vec<Move> = Vec::with_capacity(16);

        loop {
            let picked = {
                let ctx = PickContext {
                    pos: &self.stack[ply].position,
                    orderer: &self.tables.orderer,
                    history: &hctx,
                    height: ply,
                    node_cache: if ply == 0 {
                        self.tables.node_cache.probe(&self.stack[ply].position)
                    } else {
                        None
                    },
                };
                picker.next(&ctx)
            };
            let Some((mv, move_score)) = picked else { break };

            if mv == filtered_move {
                continue;
            }
            if is_root && self.excluded_root.contains(&mv) {
                continue;
            }

            let is_quiet = mv.is_quiet();
            let Some((_, piece)) = self.stack[ply].position.piece_at(mv.from()) else {
                continue;
            };
            let stat_score = if is_quiet {
                self.tables.orderer.stat_score(&hctx, mv, piece)
            } else {
                0
            };

            // ---- shallow-move pruning ---------------------------------
            if !is_root
                && best_score > -KNOWN_WIN
                && self.stack[ply].position.has_non_pawn_material(stm)
            {
                if is_quiet && !in_check {
                    let lmp_limit =
                        ((LATE_MOVE_PRUNING_BASE + depth * depth) * (1 + i32::from(improving)))
                            / 2;
                    if quiet_index as i32 >= lmp_limit {
                        picker.skip_remaining_quiets();
                        continue;
                    }
                    if stat_score
                        < -(HISTORY_PRUNING_LINEAR * depth
                            + HISTORY_PRUNING_QUADRATIC * depth * depth)
                    {
                        continue;
                    }
                    if depth <= FUTILITY_PRUNING_DEPTH
                        && eval > -INF
                        && eval
                            + FUTILITY_PRUNING_SCALE * depth * depth
                            + stat_score / FUTILITY_PRUNING_STATSCORE_DIV
                            <= alpha
                    {
                        picker.skip_remaining_quiets();
                        continue;
                    }
                    if depth <= SEE_PRUNING_DEPTH_QUIETS
                        && !self
                            .stack[ply]
                            .position
                            .see_ge(mv, -SEE_PRUNING_MULTIPLIER_QUIETS * depth)
                    {
                        continue;
                    }
                } else if mv.is_capture()
                    && depth <= SEE_PRUNING_DEPTH_CAPTURES
                    && !self
                        .stack[ply]
                        .position
                        .see_ge(mv, -SEE_PRUNING_MULTIPLIER_CAPTURES * depth)
                {
                    continue;
                }
            }

            // ---- extensions -------------------------------------------
            let mut extension = 0i32;
            if mv.promotion_piece() == Some(Piece::Queen) {
                extension = 1;
            }
            if piece == Piece::Pawn && relative_rank(stm, mv.to()) >= PAWN_PUSH_EXTENSION_RANK {
                extension = extension.max(1);
            }
            if mv == tt_move && singular_extension != 0 {
                extension = singular_extension;
            }

            // ---- make the move ----------------------------------------
            let mut child_pos = self.stack[ply].position.clone();
            let mut dirty = DirtyPieces::new();
            if !child_pos.do_move(mv, &mut dirty) {
                continue;
            }
            self.tt.prefetch(child_pos.hash());

            move_index += 1;
            if is_quiet {
                quiet_index += 1;
                if quiets_tried.len() < 64 {
                    quiets_tried.push((mv, piece));
                }
            } else if mv.is_capture() && captures_tried.len() < 32 {
                captures_tried.push(mv);
            }

            let gives_check = child_pos.is_in_check(child_pos.side_to_move());
            let child_on_pv = self.stack[ply].on_prev_pv && mv == pv_move;
            let parent_cut = self.stack[ply].is_cut_node;
            // first child inherits the node type, later ones are expected
            // to fail high under the null window
            let child_cut = if move_index == 1 {
                !is_pv && !parent_cut
            } else {
                true
            };
            self.set_child_node(ply + 1, child_pos, mv, piece, dirty, child_on_pv, child_cut);

            let new_depth = depth - 1 + extension;

            // ---- late-move reductions ---------------------------------
            let mut reduction = 0i32;
            if depth >= 2 && move_index > 1 + 2 * usize::from(is_root) && !in_check {
                if is_quiet {
                    reduction = lmr_reduction(true, depth, move_index);
                    reduction += i32::from(!is_pv);
                    reduction += i32::from(tt_move.is_valid() && tt_move.is_capture());
                    if move_score >= KILLER_MOVE_SCORE - 1 {
                        reduction -= 2;
                    }
                    reduction -= (stat_score + LMR_STAT_OFFSET) / LMR_STAT_DIV;
                    if parent_cut {
                        reduction += 2;
                    }
                } else {
                    reduction = lmr_reduction(false, depth, move_index);
                    if parent_cut {
                        reduction += 1;
                    }
                }
                reduction += i32::from(!improving);
                reduction -= i32::from(gives_check);
                reduction = reduction.clamp(0, (new_depth - 1).max(0));
            }

            let nodes_before = self.nodes;

            // ---- principal variation search ---------------------------
            let mut score;
            if move_index == 1 {
                let child_type = if is_pv { NodeType::Pv } else { NodeType::NonPv };
                score = -self.negamax(child_type, ply + 1, new_depth, -beta, -alpha, true);
            } else {
                score = -self.negamax(
                    NodeType::NonPv,
                    ply + 1,
                    new_depth - reduction,
                    -alpha - 1,
                    -alpha,
                    true,
                );
                if reduction > 0 && score > alpha && !self.aborted {
                    self.stack[ply + 1].is_cut_node = !parent_cut;
                    score = -self.negamax(
                        NodeType::NonPv,
                        ply + 1,
                        new_depth,
                        -alpha - 1,
                        -alpha,
                        true,
                    );
                }
                if is_pv && score > alpha && score < beta && !self.aborted {
                    self.stack[ply + 1].is_cut_node = false;
                    score = -self.negamax(NodeType::Pv, ply + 1, new_depth, -beta, -alpha, true);
                }
            }

            if self.aborted {
                return 0;
            }

            if is_root {
                let spent = self.nodes - nodes_before;
                if let Some(entry) = self.tables.node_cache.entry_mut(&self.stack[0].position) {
                    entry.add_move_nodes(mv, spent);
                }
            }

            if score > best_score {
                best_score = score;
                best_move = mv;
                if score > alpha {
                    alpha = score;
                    if is_pv {
                        self.update_pv(ply, mv);
                    }
                    if score >= beta {
                        break;
                    }
                }
            }
        }

        // ---- terminal nodes -------------------------------------------
        if move_index == 0 {
            if filtered_move.is_valid() {
                // every move was excluded: report the window floor
                return alpha;
            }
            return if in_check { mated_in(ply as i32) } else { 0 };
        }

        // ---- history updates on cutoff --------------------------------
        if best_score >= beta {
            if best_move.is_quiet() {
                self.tables.orderer.update_quiet_histories(
                    &hctx,
                    ply,
                    &quiets_tried,
                    best_move,
                    depth,
                );
            }
            if !captures_tried.is_empty() {
                let (head, _) = self.stack.split_at(ply + 1);
                self.tables.orderer.update_capture_histories(
                    &head[ply].position,
                    &captures_tried,
                    best_move,
                    depth,
                );
            }
        }

        // ---- transposition store --------------------------------------
        if !self.aborted && !filtered_move.is_valid() {
            let bounds = if best_score >= beta {
                Bounds::Lower
            } else if is_pv && best_score > original_alpha {
                Bounds::Exact
            } else {
                Bounds::Upper
            };
            self.tt.write(
                &self.stack[ply].position,
                best_score,
                if raw_eval > -INF { raw_eval } else { 0 },
                depth,
                bounds,
                best_move.packed(),
                ply as i32,
            );

            // feed the eval-correction tables from quiet, settled results
            if !in_check
                && best_score.abs() < KNOWN_WIN
                && (!best_move.is_valid() || best_move.is_quiet())
                && raw_eval > -INF
                && raw_eval.abs() < KNOWN_WIN
            {
                let usable = match bounds {
                    Bounds::Exact => true,
                    Bounds::Lower => best_score > eval,
                    Bounds::Upper => best_score < eval,
                    Bounds::Invalid => false,
                };
                if usable {
                    let (head, _) = self.stack.split_at(ply + 1);
                    self.tables
                        .correction
                        .update(&head[ply].position, raw_eval, best_score);
                }
            }
        }

        best_score
    }

    /// Previous-iteration PV move for this node, when the path matches.
    fn previous_pv_move(&self, ply: usize) -> Move {
        if self.stack[ply].on_prev_pv {
            self.prev_pv.get(ply).copied().unwrap_or(Move::NONE)
        } else {
            Move::NONE
        }
    }

    /// Shallow verification that a strong capture refutes the position.
    fn probcut(&mut self, ply: usize, depth: i32, probcut_beta: i32) -> Option<i32> {
        let see_threshold = probcut_beta - self.stack[ply].static_eval;
        let mut captures = MoveList::new();
        self.stack[ply]
            .position
            .generate_moves(crate::board::GenMode::Captures, &mut captures);

        for i in 0..captures.len() {
            let mv = captures.get(i);
            if !self.stack[ply].position.see_ge(mv, see_threshold) {
                continue;
            }
            let Some((_, piece)) = self.stack[ply].position.piece_at(mv.from()) else {
                continue;
            };
            let mut child_pos = self.stack[ply].position.clone();
            let mut dirty = DirtyPieces::new();
            if !child_pos.do_move(mv, &mut dirty) {
                continue;
            }
            self.set_child_node(ply + 1, child_pos, mv, piece, dirty, false, true);

            // cheap qualifier before the reduced verification search
            let mut score =
                -self.quiescence(false, ply + 1, -probcut_beta, -probcut_beta + 1);
            if self.aborted {
                return None;
            }
            if score >= probcut_beta {
                score = -self.negamax(
                    NodeType::NonPv,
                    ply + 1,
                    depth - PROBCUT_DEPTH_REDUCTION,
                    -probcut_beta,
                    -probcut_beta + 1,
                    true,
                );
                if self.aborted {
                    return None;
                }
                if score >= probcut_beta {
                    return Some(score);
                }
            }
        }
        None
    }

    // ==================================================================
    // quiescence
    // ==================================================================

    fn quiescence(&mut self, is_pv: bool, ply: usize, mut alpha: i32, beta: i32) -> i32 {
        if ply >= MAX_PLY - 2 {
            return 0;
        }
        self.stack[ply].height = ply as u16;
        self.visit_node(ply);
        if self.should_abort() {
            return 0;
        }

        {
            let pos = &self.stack[ply].position;
            if pos.halfmove_clock() >= 100 || is_insufficient_material(pos) {
                return 0;
            }
        }
        if is_repetition(&self.stack, ply, &self.game_history, is_pv) {
            return 0;
        }

        let in_check = {
            let pos = &self.stack[ply].position;
            pos.is_in_check(pos.side_to_move())
        };
        self.stack[ply].in_check = in_check;

        // ---- transposition table --------------------------------------
        let mut tt_move = Move::NONE;
        if let Some(entry) = self.tt.read(&self.stack[ply].position, ply as i32) {
            tt_move = self
                .stack[ply]
                .position
                .resolve_packed(entry.mv)
                .unwrap_or(Move::NONE);
            if !is_pv && entry.depth >= 0 {
                let score = i32::from(entry.score);
                let cut = match entry.bounds {
                    Bounds::Exact => true,
                    Bounds::Lower => score >= beta,
                    Bounds::Upper => score <= alpha,
                    Bounds::Invalid => false,
                };
                if cut {
                    return score;
                }
            }
        }

        // ---- stand pat ------------------------------------------------
        let mut best_score = -INF;
        let mut raw_eval = -INF;
        if !in_check {
            raw_eval = self.raw_eval(ply);
            best_score = self.adjust_eval(ply, raw_eval);
            if best_score >= beta {
                return best_score;
            }
            alpha = alpha.max(best_score);
        }
        self.stack[ply].static_eval = best_score;
        let futility_base = best_score + QSEARCH_FUTILITY_OFFSET;

        {
            let pos = &self.stack[ply].position;
            self.stack[ply].threats = pos.compute_threats(!pos.side_to_move());
        }

        // in check all evasions are generated, otherwise only good
        // captures and queen promotions
        let hctx = self.history_context(ply);
        let mut picker = MovePicker::new(Move::NONE, tt_move, in_check);

        let original_alpha = alpha;
        let mut best_move = Move::NONE;
        let mut move_index = 0usize;

        loop {
            let picked = {
                let ctx = PickContext {
                    pos: &self.stack[ply].position,
                    orderer: &self.tables.orderer,
                    history: &hctx,
                    height: ply,
                    node_cache: None,
                };
                picker.next(&ctx)
            };
            let Some((mv, _)) = picked else { break };

            // futility: a cheap victim cannot rescue a lost stand-pat
            if !in_check && mv.is_capture() && !mv.is_promotion() && futility_base <= alpha {
                let victim = match self.stack[ply].position.piece_at(mv.to()) {
                    Some((_, piece)) => piece,
                    None => Piece::Pawn,
                };
                let futility_value = futility_base + crate::board::piece_value(victim);
                if futility_value <= alpha {
                    best_score = best_score.max(futility_value);
                    continue;
                }
            }

            let Some((_, piece)) = self.stack[ply].position.piece_at(mv.from()) else {
                continue;
            };
            let mut child_pos = self.stack[ply].position.clone();
            let mut dirty = DirtyPieces::new();
            if !child_pos.do_move(mv, &mut dirty) {
                continue;
            }
            self.tt.prefetch(child_pos.hash());
            move_index += 1;
            self.set_child_node(ply + 1, child_pos, mv, piece, dirty, false, false);

            let score = -self.quiescence(is_pv, ply + 1, -beta, -alpha);
            if self.aborted {
                return 0;
            }

            if score > best_score {
                best_score = score;
                best_move = mv;
                if score > alpha {
                    alpha = score;
                    if score >= beta {
                        break;
                    }
                }
            }
        }

        if in_check && move_index == 0 {
            return mated_in(ply as i32);
        }

        if !self.aborted {
            let bounds = if best_score >= beta {
                Bounds::Lower
            } else if is_pv && best_score > original_alpha {
                Bounds::Exact
            } else {
                Bounds::Upper
            };
            self.tt.write(
                &self.stack[ply].position,
                best_score,
                if raw_eval > -INF { raw_eval } else { 0 },
                0,
                bounds,
                best_move.packed(),
                ply as i32,
            );
        }

        best_score
    }
}

/// Does the opponent attack any of our pieces with something cheaper?
/// Gates reverse futility: a static margin means little with a piece
/// hanging.
#[inline]
fn opp_can_win_material(pos: &Position, threats: &crate::board::Threats) -> bool {
    let us = pos.side_to_move();
    let queens = pos.pieces(us, Piece::Queen);
    let rooks = pos.pieces(us, Piece::Rook);
    let minors = pos.pieces(us, Piece::Knight) | pos.pieces(us, Piece::Bishop);

    ((threats.by_rooks & queens)
        | (threats.by_minors & (queens | rooks))
        | (threats.by_pawns & (queens | rooks | minors)))
        .any()
}

/// Rank of `sq` from `color`'s point of view.
#[inline]
fn relative_rank(color: Color, sq: Square) -> usize {
    match color {
        Color::White => sq.rank(),
        Color::Black => 7 - sq.rank(),
    }
}

/// Log-log reduction tables for quiets and captures.
fn lmr_reduction(quiet: bool, depth: i32, move_index: usize) -> i32 {
    use once_cell::sync::Lazy;
    const SIZE: usize = 64;
    type Table = [[u8; SIZE]; SIZE];

    static TABLES: Lazy<(Table, Table)> = Lazy::new(|| {
        let build = |scale: i32, bias: i32| {
            let mut table = [[0u8; SIZE]; SIZE];
            for (d, row) in table.iter_mut().enumerate().skip(1) {
                for (m, cell) in row.iter_mut().enumerate().skip(1) {
                    let value = (d as f64).ln() * (m as f64).ln() * f64::from(scale) / 100.0
                        + f64::from(bias) / 100.0;
                    *cell = value.max(0.0) as u8;
                }
            }
            table
        };
        (
            build(LMR_SCALE_QUIETS, LMR_BIAS_QUIETS),
            build(LMR_SCALE_CAPTURES, LMR_BIAS_CAPTURES),
        )
    });

    let d = (depth.max(0) as usize).min(SIZE - 1);
    let m = move_index.min(SIZE - 1);
    let table = if quiet { &TABLES.0 } else { &TABLES.1 };
    i32::from(table[d][m])
}
