//! Search: iterative-deepening alpha-beta over a shared transposition
//! table, with lazy-SMP parallelism.
//!
//! The UCI layer builds a [`Game`] and a [`SearchParams`], calls
//! [`Search::run`] and renders the returned [`PvLine`]s. Progress is read
//! from the shared [`SearchStats`] atomics; there are no callbacks.

pub(crate) mod constants;
mod correction;
mod history;
mod node;
mod node_cache;
mod picker;
pub mod score;
mod smp;
pub mod time;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::board::{FenError, Move, MoveParseError, Position};
use crate::nnue::Evaluator;
use crate::tt::TranspositionTable;

pub use time::MoveHint;

use self::score::{is_mate_score, INF};
use smp::WorkerPool;
use worker::{ThreadTables, Worker, WorkerResult};

/// A game in progress: initial position plus the moves played.
#[derive(Clone)]
pub struct Game {
    initial: Position,
    position: Position,
    moves: Vec<Move>,
    /// Hashes of every position reached, the current one included.
    hashes: Vec<u64>,
}

impl Game {
    #[must_use]
    pub fn new(initial: Position) -> Self {
        let hash = initial.hash();
        Game {
            position: initial.clone(),
            initial,
            moves: Vec::new(),
            hashes: vec![hash],
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        Ok(Game::new(Position::from_fen(fen)?))
    }

    #[must_use]
    pub fn position(&self) -> &Position {
        &self.position
    }

    #[must_use]
    pub fn initial_position(&self) -> &Position {
        &self.initial
    }

    #[must_use]
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Apply a legal move; rejects illegal ones and leaves the game
    /// untouched.
    pub fn do_move(&mut self, mv: Move) -> bool {
        let mut next = self.position.clone();
        if !next.make_move(mv) {
            return false;
        }
        self.position = next;
        self.moves.push(mv);
        self.hashes.push(self.position.hash());
        true
    }

    /// Apply a move given in UCI notation.
    pub fn do_lan_move(&mut self, lan: &str) -> Result<(), MoveParseError> {
        let mv = self.position.move_from_lan(lan)?;
        self.do_move(mv);
        Ok(())
    }

    /// Position hashes before the current one, oldest first; feeds
    /// repetition detection inside the search.
    #[must_use]
    pub fn history_before_current(&self) -> Vec<u64> {
        self.hashes[..self.hashes.len() - 1].to_vec()
    }

    /// How often `hash` occurred before the current position.
    #[must_use]
    pub fn repetition_count(&self, hash: u64) -> u32 {
        self.hashes[..self.hashes.len() - 1]
            .iter()
            .filter(|&&h| h == hash)
            .count() as u32
    }
}

/// Limits and knobs for one search call.
#[derive(Clone, Debug)]
pub struct SearchParams {
    /// Maximum iterative-deepening depth.
    pub max_depth: u32,
    /// Hard node ceiling, checked during search.
    pub max_nodes: Option<u64>,
    /// Soft node ceiling, checked between iterations.
    pub soft_max_nodes: Option<u64>,
    /// Exact time for this move; overrides the clock fields.
    pub move_time: Option<Duration>,
    pub remaining_time: Option<Duration>,
    pub time_increment: Option<Duration>,
    pub moves_to_go: Option<u32>,
    /// Communication latency budget subtracted from the clock.
    pub move_overhead: Duration,
    /// Did the opponent play the move predicted by the last search?
    pub previous_move_hint: MoveHint,
    /// Number of principal variations to report.
    pub multi_pv: usize,
    pub num_threads: usize,
    /// Root moves never searched (UCI `searchmoves` complement).
    pub excluded_root_moves: Vec<Move>,
    /// Analysis mode: never stop early on singular roots or found mates.
    pub analysis: bool,
    /// Seed for per-thread search diversity.
    pub seed: u64,
    /// Static contempt in centipawns, from the root player's view.
    pub contempt: i32,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            max_depth: 64,
            max_nodes: None,
            soft_max_nodes: None,
            move_time: None,
            remaining_time: None,
            time_increment: None,
            moves_to_go: None,
            move_overhead: Duration::from_millis(10),
            previous_move_hint: MoveHint::None,
            multi_pv: 1,
            num_threads: 1,
            excluded_root_moves: Vec::new(),
            analysis: false,
            seed: 0,
            contempt: 0,
        }
    }
}

impl SearchParams {
    #[must_use]
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    #[must_use]
    pub fn with_max_nodes(mut self, nodes: u64) -> Self {
        self.max_nodes = Some(nodes);
        self
    }

    #[must_use]
    pub fn with_move_time(mut self, time: Duration) -> Self {
        self.move_time = Some(time);
        self
    }

    #[must_use]
    pub fn with_remaining_time(mut self, time: Duration) -> Self {
        self.remaining_time = Some(time);
        self
    }

    #[must_use]
    pub fn with_multi_pv(mut self, lines: usize) -> Self {
        self.multi_pv = lines.max(1);
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads.max(1);
        self
    }
}

/// One principal variation: score in centipawns (mate encoded as
/// `±(MATE - distance)`), optional tablebase score, and the line itself.
#[derive(Clone, Debug, Default)]
pub struct PvLine {
    pub score: i16,
    pub tb_score: Option<i16>,
    pub moves: Vec<Move>,
}

impl PvLine {
    #[must_use]
    pub fn best_move(&self) -> Option<Move> {
        self.moves.first().copied()
    }
}

/// Shared counters the UCI layer polls for `info` lines.
#[derive(Default)]
pub struct SearchStats {
    nodes: AtomicU64,
    tb_hits: AtomicU64,
    max_depth: AtomicU32,
}

impl SearchStats {
    #[must_use]
    pub fn nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn tb_hits(&self) -> u64 {
        self.tb_hits.load(Ordering::Relaxed)
    }

    /// Highest tree height reached by any thread (selective depth).
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth.load(Ordering::Relaxed)
    }

    pub(crate) fn add_nodes(&self, nodes: u64) {
        self.nodes.fetch_add(nodes, Ordering::Relaxed);
    }

    pub(crate) fn update_max_depth(&self, depth: u32) {
        self.max_depth.fetch_max(depth, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.nodes.store(0, Ordering::Relaxed);
        self.tb_hits.store(0, Ordering::Relaxed);
        self.max_depth.store(0, Ordering::Relaxed);
    }
}

pub(crate) use self::SearchStats as SharedStats;

/// The engine's search driver. Owns the transposition table, the
/// evaluator and the worker pool; lives across searches.
pub struct Search {
    tt: Arc<TranspositionTable>,
    evaluator: Arc<Evaluator>,
    stop: Arc<AtomicBool>,
    stats: Arc<SearchStats>,
    main_tables: ThreadTables,
    pool: WorkerPool,
}

impl Search {
    /// Search with the classical evaluator and a TT of `tt_mb` megabytes.
    #[must_use]
    pub fn new(tt_mb: usize) -> Self {
        Search::with_evaluator(tt_mb, Evaluator::classical())
    }

    #[must_use]
    pub fn with_evaluator(tt_mb: usize, evaluator: Evaluator) -> Self {
        Search {
            tt: Arc::new(TranspositionTable::new(tt_mb)),
            evaluator: Arc::new(evaluator),
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SearchStats::default()),
            main_tables: ThreadTables::new(),
            pool: WorkerPool::new(),
        }
    }

    /// Shared flag; setting it aborts a running search.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    #[must_use]
    pub fn stats(&self) -> Arc<SearchStats> {
        Arc::clone(&self.stats)
    }

    /// TT occupancy in permille, for `info hashfull`.
    #[must_use]
    pub fn hash_full(&self) -> u32 {
        self.tt.hash_full()
    }

    /// Resize the transposition table (only between searches).
    pub fn set_hash_size(&mut self, megabytes: usize) {
        match Arc::get_mut(&mut self.tt) {
            Some(tt) => tt.resize(megabytes * 1024 * 1024),
            None => self.tt = Arc::new(TranspositionTable::new(megabytes)),
        }
    }

    /// Drop all cached state: TT, histories, correction tables.
    pub fn clear(&mut self) {
        if let Some(tt) = Arc::get_mut(&mut self.tt) {
            tt.clear();
        }
        self.main_tables = ThreadTables::new();
        self.pool.clear_tables();
    }

    /// Run a search and return the principal variations, best first.
    /// An empty vector means the side to move has no legal moves.
    pub fn run(&mut self, game: &Game, params: &SearchParams) -> Vec<PvLine> {
        self.stop.store(false, Ordering::Release);
        self.stats.reset();
        self.tt.next_generation();

        let root = game.position().clone();
        let legal_moves = root.legal_moves();
        if legal_moves.is_empty() {
            // a completed fifty-move period outranks the mate
            if root.halfmove_clock() >= 100 {
                return vec![PvLine::default()];
            }
            return vec![];
        }

        let limits = time::init_limits(
            params,
            u32::from(root.fullmove_number()),
            Instant::now(),
        );
        let history = game.history_before_current();
        let num_threads = params.num_threads.max(1);

        // helpers run on the persistent pool
        self.pool.ensure_threads(num_threads - 1);
        for i in 1..num_threads {
            let tt = Arc::clone(&self.tt);
            let evaluator = Arc::clone(&self.evaluator);
            let stop = Arc::clone(&self.stop);
            let stats = Arc::clone(&self.stats);
            let params = params.clone();
            let history = history.clone();
            let root = root.clone();
            self.pool.dispatch(
                i - 1,
                Box::new(move |tables| {
                    let mut worker = Worker::new(
                        i,
                        tt.as_ref(),
                        evaluator.as_ref(),
                        stop.as_ref(),
                        stats.as_ref(),
                        &params,
                        history,
                        limits,
                        tables,
                    );
                    worker.run(root)
                }),
            );
        }

        // the calling thread is worker 0 and owns time management
        let main_result = {
            let mut worker = Worker::new(
                0,
                self.tt.as_ref(),
                self.evaluator.as_ref(),
                self.stop.as_ref(),
                self.stats.as_ref(),
                params,
                history,
                limits,
                &mut self.main_tables,
            );
            worker.run(root.clone())
        };

        self.stop.store(true, Ordering::Release);
        let mut results: Vec<WorkerResult> = vec![main_result];
        results.extend(self.pool.collect(num_threads - 1));

        let best = pick_best_result(results);
        if best.lines.is_empty() {
            // aborted before any depth completed: still answer with a
            // legal move
            return vec![PvLine {
                score: 0,
                tb_score: None,
                moves: vec![legal_moves[0]],
            }];
        }
        best.lines
    }
}

impl Default for Search {
    fn default() -> Self {
        Search::new(16)
    }
}

/// Deepest completed result wins; mate scores always beat non-mate, ties
/// break by score.
fn pick_best_result(results: Vec<WorkerResult>) -> WorkerResult {
    results
        .into_iter()
        .max_by_key(|r| {
            let score = r.lines.first().map_or(-INF, |l| i32::from(l.score));
            let has_line = i32::from(!r.lines.is_empty());
            let mate = i32::from(is_mate_score(score) && score > 0);
            (has_line, mate, r.depth_completed, score)
        })
        .expect("at least the main worker result")
}
