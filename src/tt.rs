//! Shared transposition table.
//!
//! Four 10-byte entries per 64-byte cluster, addressed by a multiplicative
//! hash. All threads read and write without locks: an entry is two atomics
//! (packed payload plus depth/bounds/generation), stored relaxed. A torn
//! entry fails the key16 + bounds validation and reads as a miss; it can
//! cost work, never correctness.

use std::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering};

use crate::board::{PackedMove, Position};
use crate::search::score::{MATE, MAX_SEARCH_DEPTH, TB_WIN};

/// Bound kind of a stored score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bounds {
    Invalid = 0,
    Lower = 1,
    Upper = 2,
    Exact = 3,
}

impl Bounds {
    #[inline]
    fn from_bits(bits: u16) -> Bounds {
        match bits & 3 {
            1 => Bounds::Lower,
            2 => Bounds::Upper,
            3 => Bounds::Exact,
            _ => Bounds::Invalid,
        }
    }
}

/// Decoded table entry.
#[derive(Clone, Copy, Debug)]
pub struct TtEntry {
    pub mv: PackedMove,
    pub score: i16,
    pub static_eval: i16,
    pub depth: i8,
    pub bounds: Bounds,
    pub generation: u8,
}

const GENERATION_CYCLE: i32 = 64;

/// Mate scores are stored relative to the probing node so they stay valid
/// across transpositions: distance-to-mate counts from the node, not the
/// root.
#[inline]
#[must_use]
pub fn score_to_tt(score: i32, height: i32) -> i16 {
    debug_assert!(score.abs() < MATE);
    let adjusted = if score >= TB_WIN - MAX_SEARCH_DEPTH {
        score + height
    } else if score <= -TB_WIN + MAX_SEARCH_DEPTH {
        score - height
    } else {
        score
    };
    adjusted as i16
}

/// Inverse of [`score_to_tt`], with the fifty-move guard: a mate that the
/// clock would annul reads back as a large-but-not-mate score.
#[inline]
#[must_use]
pub fn score_from_tt(score: i32, height: i32, fifty_move_count: i32) -> i32 {
    if score >= TB_WIN - MAX_SEARCH_DEPTH {
        if score >= MATE - MAX_SEARCH_DEPTH && MATE - score > 99 - fifty_move_count {
            return MATE - MAX_SEARCH_DEPTH - 1;
        }
        return (score - height).min(MATE - 1);
    }
    if score <= -TB_WIN + MAX_SEARCH_DEPTH {
        if score <= -MATE + MAX_SEARCH_DEPTH && MATE + score > 99 - fifty_move_count {
            return -MATE + MAX_SEARCH_DEPTH + 1;
        }
        return (score + height).max(-MATE + 1);
    }
    score
}

#[derive(Default)]
struct Slot {
    /// `key16 | move16 << 16 | score16 << 32 | eval16 << 48`
    data: AtomicU64,
    /// `depth8 | (bounds2 | generation6 << 2) << 8`
    meta: AtomicU16,
}

impl Slot {
    #[inline]
    fn key(&self) -> u16 {
        self.data.load(Ordering::Relaxed) as u16
    }

    #[inline]
    fn decode(&self) -> TtEntry {
        let data = self.data.load(Ordering::Relaxed);
        let meta = self.meta.load(Ordering::Relaxed);
        TtEntry {
            mv: PackedMove::from_u16((data >> 16) as u16),
            score: (data >> 32) as u16 as i16,
            static_eval: (data >> 48) as u16 as i16,
            depth: meta as u8 as i8,
            bounds: Bounds::from_bits(meta >> 8),
            generation: (meta >> 10) as u8 & 63,
        }
    }

    #[inline]
    fn encode(&self, key: u16, entry: &TtEntry) {
        let data = u64::from(key)
            | u64::from(entry.mv.as_u16()) << 16
            | u64::from(entry.score as u16) << 32
            | u64::from(entry.static_eval as u16) << 48;
        let meta = u16::from(entry.depth as u8)
            | u16::from(entry.bounds as u8) << 8
            | u16::from(entry.generation & 63) << 10;
        self.data.store(data, Ordering::Relaxed);
        self.meta.store(meta, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.data.store(0, Ordering::Relaxed);
        self.meta.store(0, Ordering::Relaxed);
    }
}

const ENTRIES_PER_CLUSTER: usize = 4;

#[repr(align(64))]
#[derive(Default)]
struct Cluster {
    entries: [Slot; ENTRIES_PER_CLUSTER],
}

/// Lossy concurrent cache of search results.
pub struct TranspositionTable {
    clusters: Vec<Cluster>,
    generation: AtomicU8,
}

impl TranspositionTable {
    /// Allocate with the given budget in megabytes. On allocation failure
    /// the size is halved until it fits; a zero-size table degrades to
    /// always-miss reads and no-op writes.
    #[must_use]
    pub fn new(size_mb: usize) -> Self {
        let mut tt = TranspositionTable {
            clusters: Vec::new(),
            generation: AtomicU8::new(0),
        };
        tt.resize(size_mb * 1024 * 1024);
        tt
    }

    /// Resize to `bytes`, dropping all contents.
    pub fn resize(&mut self, bytes: usize) {
        let mut num_clusters = bytes / std::mem::size_of::<Cluster>();
        loop {
            self.clusters = Vec::new();
            if num_clusters == 0 {
                log::warn!("transposition table disabled (no memory)");
                return;
            }
            let mut clusters: Vec<Cluster> = Vec::new();
            if clusters.try_reserve_exact(num_clusters).is_ok() {
                clusters.resize_with(num_clusters, Cluster::default);
                self.clusters = clusters;
                return;
            }
            log::warn!(
                "transposition table allocation of {num_clusters} clusters failed, halving"
            );
            num_clusters /= 2;
        }
    }

    /// Number of entries the table can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.clusters.len() * ENTRIES_PER_CLUSTER
    }

    /// Zero every entry. Large tables are wiped by a few helper threads.
    pub fn clear(&mut self) {
        let num_threads = std::thread::available_parallelism()
            .map_or(1, |n| n.get().min(4));
        if self.clusters.len() < 1 << 16 || num_threads == 1 {
            for cluster in &self.clusters {
                for slot in &cluster.entries {
                    slot.clear();
                }
            }
        } else {
            let chunk = self.clusters.len().div_ceil(num_threads);
            std::thread::scope(|scope| {
                for part in self.clusters.chunks(chunk) {
                    scope.spawn(move || {
                        for cluster in part {
                            for slot in &cluster.entries {
                                slot.clear();
                            }
                        }
                    });
                }
            });
        }
        self.generation.store(0, Ordering::Relaxed);
    }

    /// Advance the write generation (6-bit, wrapping). Called once per
    /// search.
    pub fn next_generation(&self) {
        let gen = self.generation.load(Ordering::Relaxed);
        self.generation.store((gen + 1) & 63, Ordering::Relaxed);
    }

    #[inline]
    fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed)
    }

    #[inline]
    fn cluster_index(&self, hash: u64) -> usize {
        // multiplicative mapping of the high bits onto the cluster range
        ((u128::from(hash) * self.clusters.len() as u128) >> 64) as usize
    }

    /// Hint the cache to pull in the cluster for `hash`.
    #[inline]
    pub fn prefetch(&self, hash: u64) {
        if self.clusters.is_empty() {
            return;
        }
        #[cfg(target_arch = "x86_64")]
        unsafe {
            let ptr = std::ptr::addr_of!(self.clusters[self.cluster_index(hash)]);
            std::arch::x86_64::_mm_prefetch::<{ std::arch::x86_64::_MM_HINT_T0 }>(ptr.cast());
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = hash;
        }
    }

    /// First matching valid entry in the cluster, with the mate score
    /// rebased to the probing height.
    #[must_use]
    pub fn read(&self, pos: &Position, height: i32) -> Option<TtEntry> {
        if self.clusters.is_empty() {
            return None;
        }
        let hash = pos.hash();
        let cluster = &self.clusters[self.cluster_index(hash)];
        let key = hash as u16;

        for slot in &cluster.entries {
            if slot.key() == key {
                let mut entry = slot.decode();
                if entry.bounds == Bounds::Invalid {
                    continue;
                }
                entry.score = score_from_tt(
                    i32::from(entry.score),
                    height,
                    i32::from(pos.halfmove_clock()),
                ) as i16;
                return Some(entry);
            }
        }
        None
    }

    /// Store a search result, evicting by `depth - age` relevance.
    pub fn write(
        &self,
        pos: &Position,
        score: i32,
        static_eval: i32,
        depth: i32,
        bounds: Bounds,
        mv: PackedMove,
        height: i32,
    ) {
        if self.clusters.is_empty() {
            return;
        }
        debug_assert_eq!(pos.hash(), pos.compute_hash());

        let hash = pos.hash();
        let key = hash as u16;
        let cluster = &self.clusters[self.cluster_index(hash)];
        let generation = self.generation();

        let mut entry = TtEntry {
            mv,
            score: score_to_tt(score, height),
            static_eval: static_eval.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
            depth: depth.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8,
            bounds,
            generation,
        };

        let mut replace_index = 0;
        let mut min_relevance = i32::MAX;
        let mut prev_key = 0u16;
        let mut prev = cluster.entries[0].decode();

        for (i, slot) in cluster.entries.iter().enumerate() {
            let slot_key = slot.key();
            let data = slot.decode();

            // same position or free slot: always the target
            if slot_key == key || data.bounds == Bounds::Invalid {
                replace_index = i;
                prev_key = slot_key;
                prev = data;
                break;
            }

            let age = (GENERATION_CYCLE + i32::from(generation) - i32::from(data.generation))
                & (GENERATION_CYCLE - 1);
            let relevance = i32::from(data.depth) - age;
            if relevance < min_relevance {
                min_relevance = relevance;
                replace_index = i;
                prev_key = slot_key;
                prev = data;
            }
        }

        // keep a clearly deeper entry for the same position unless the new
        // bounds are exact
        if entry.bounds != Bounds::Exact
            && prev_key == key
            && i32::from(entry.depth) < i32::from(prev.depth) - 5
        {
            return;
        }

        // never erase a known move with an empty one
        if prev_key == key && !entry.mv.is_valid() {
            entry.mv = prev.mv;
        }

        cluster.entries[replace_index].encode(key, &entry);
    }

    /// Occupancy estimate in permille: current-generation entries among
    /// the first 1000 / 4 clusters.
    #[must_use]
    pub fn hash_full(&self) -> u32 {
        let probe = 1000 / ENTRIES_PER_CLUSTER;
        if self.clusters.len() < probe {
            return 0;
        }
        let generation = self.generation();
        let mut count = 0;
        for cluster in &self.clusters[..probe] {
            for slot in &cluster.entries {
                let entry = slot.decode();
                if entry.bounds != Bounds::Invalid && entry.generation == generation {
                    count += 1;
                }
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Move, Square};

    fn test_move() -> PackedMove {
        Move::quiet(Square::new(6, 0), Square::new(5, 2)).packed()
    }

    #[test]
    fn test_read_after_write() {
        let tt = TranspositionTable::new(1);
        let pos = Position::start();
        tt.write(&pos, 37, 12, 5, Bounds::Exact, test_move(), 0);

        let entry = tt.read(&pos, 0).expect("entry present");
        assert_eq!(entry.score, 37);
        assert_eq!(entry.static_eval, 12);
        assert_eq!(entry.depth, 5);
        assert_eq!(entry.bounds, Bounds::Exact);
        assert_eq!(entry.mv, test_move());
    }

    #[test]
    fn test_miss_on_other_position() {
        let tt = TranspositionTable::new(1);
        let pos = Position::start();
        tt.write(&pos, 1, 0, 1, Bounds::Lower, PackedMove::NONE, 0);

        let other =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")
                .unwrap();
        assert!(tt.read(&other, 0).is_none());
    }

    #[test]
    fn test_mate_score_normalization() {
        let tt = TranspositionTable::new(1);
        let pos = Position::start();
        // mate in 3 plies found at height 4: stored relative to the node
        let score = MATE - 7;
        tt.write(&pos, score, 0, 10, Bounds::Exact, test_move(), 4);

        // read back at height 2: two plies closer to the root
        let entry = tt.read(&pos, 2).unwrap();
        assert_eq!(i32::from(entry.score), MATE - 7 + 4 - 2);
    }

    #[test]
    fn test_mate_clamped_by_fifty_move_rule() {
        let pos = Position::from_fen(
            "7k/7p/5Q2/8/2Br1PK1/6P1/4P3/5q2 b - - 99 100",
        )
        .unwrap();
        let tt = TranspositionTable::new(1);
        tt.write(&pos, MATE - 4, 0, 10, Bounds::Exact, PackedMove::NONE, 0);
        let entry = tt.read(&pos, 0).unwrap();
        // distance 4 > 99 - 99 remaining: not reported as mate
        assert!(i32::from(entry.score) < MATE - MAX_SEARCH_DEPTH);
    }

    #[test]
    fn test_preserves_move_on_moveless_rewrite() {
        let tt = TranspositionTable::new(1);
        let pos = Position::start();
        tt.write(&pos, 10, 0, 5, Bounds::Exact, test_move(), 0);
        tt.write(&pos, 20, 0, 6, Bounds::Lower, PackedMove::NONE, 0);

        let entry = tt.read(&pos, 0).unwrap();
        assert_eq!(entry.score, 20);
        assert_eq!(entry.mv, test_move());
    }

    #[test]
    fn test_depth_guard_for_non_exact() {
        let tt = TranspositionTable::new(1);
        let pos = Position::start();
        tt.write(&pos, 50, 0, 20, Bounds::Exact, test_move(), 0);
        // shallow non-exact result must not clobber the deep entry
        tt.write(&pos, -10, 0, 2, Bounds::Upper, PackedMove::NONE, 0);

        let entry = tt.read(&pos, 0).unwrap();
        assert_eq!(entry.score, 50);
        assert_eq!(entry.depth, 20);
    }

    #[test]
    fn test_generation_aging() {
        let tt = TranspositionTable::new(1);
        tt.next_generation();
        assert_eq!(tt.generation(), 1);
        for _ in 0..63 {
            tt.next_generation();
        }
        assert_eq!(tt.generation(), 0);
    }

    #[test]
    fn test_zero_size_table_is_inert() {
        let mut tt = TranspositionTable::new(0);
        assert_eq!(tt.capacity(), 0);
        let pos = Position::start();
        tt.write(&pos, 1, 1, 1, Bounds::Exact, test_move(), 0);
        assert!(tt.read(&pos, 0).is_none());
        tt.clear();
        tt.prefetch(pos.hash());
    }

    #[test]
    fn test_score_round_trip_non_mate() {
        for score in [-2000, -1, 0, 1, 777] {
            let stored = score_to_tt(score, 12);
            assert_eq!(score_from_tt(i32::from(stored), 12, 0), score);
        }
    }
}
