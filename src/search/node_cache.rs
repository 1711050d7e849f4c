//! Near-root node statistics.
//!
//! Remembers how many nodes each move at a near-root position consumed in
//! earlier iterations. High-effort moves get an ordering boost, and the
//! time manager reads the best-move node fraction from the root entry.

use crate::board::{Move, Position};

const CACHE_SIZE: usize = 64;
const MAX_MOVES_PER_ENTRY: usize = 32;

/// Node counts per move for one cached position.
#[derive(Clone)]
pub struct NodeCacheEntry {
    position: Option<Position>,
    generation: u32,
    moves: [(Move, u64); MAX_MOVES_PER_ENTRY],
    nodes_sum: u64,
}

impl Default for NodeCacheEntry {
    fn default() -> Self {
        NodeCacheEntry {
            position: None,
            generation: 0,
            moves: [(Move::NONE, 0); MAX_MOVES_PER_ENTRY],
            nodes_sum: 0,
        }
    }
}

impl NodeCacheEntry {
    #[must_use]
    pub fn nodes_sum(&self) -> u64 {
        self.nodes_sum
    }

    /// Nodes previously spent on `mv` here.
    #[must_use]
    pub fn move_nodes(&self, mv: Move) -> Option<u64> {
        self.moves
            .iter()
            .find(|(m, _)| *m == mv)
            .map(|(_, nodes)| *nodes)
    }

    /// Fraction of this position's nodes spent on `mv`, in permille.
    #[must_use]
    pub fn node_fraction(&self, mv: Move) -> Option<u32> {
        if self.nodes_sum == 0 {
            return None;
        }
        self.move_nodes(mv)
            .map(|nodes| (nodes.saturating_mul(1000) / self.nodes_sum) as u32)
    }

    /// Account `nodes` to `mv`, evicting the least-visited slot when full.
    pub fn add_move_nodes(&mut self, mv: Move, nodes: u64) {
        let mut min_index = None;
        let mut min_nodes = u64::MAX;

        for (i, slot) in self.moves.iter_mut().enumerate() {
            if slot.0 == mv {
                slot.1 += nodes;
                self.nodes_sum += nodes;
                if slot.1 >= u64::MAX / MAX_MOVES_PER_ENTRY as u64 {
                    self.scale_down();
                }
                return;
            }
            if !slot.0.is_valid() || (slot.1 < min_nodes && slot.1 < nodes) {
                min_nodes = slot.1;
                min_index = Some(i);
            }
        }

        if let Some(i) = min_index {
            self.nodes_sum = self.nodes_sum - self.moves[i].1 + nodes;
            self.moves[i] = (mv, nodes);
        }
    }

    fn scale_down(&mut self) {
        self.nodes_sum = 0;
        for (_, nodes) in &mut self.moves {
            *nodes /= 2;
            self.nodes_sum += *nodes;
        }
    }
}

/// Hash-indexed cache of [`NodeCacheEntry`], generation-recycled.
pub struct NodeCache {
    entries: Vec<NodeCacheEntry>,
    generation: u32,
}

impl NodeCache {
    #[must_use]
    pub fn new() -> Self {
        NodeCache {
            entries: vec![NodeCacheEntry::default(); CACHE_SIZE],
            generation: 0,
        }
    }

    pub fn on_new_search(&mut self) {
        self.generation += 1;
    }

    pub fn reset(&mut self) {
        self.generation = 0;
        self.entries.fill(NodeCacheEntry::default());
    }

    #[must_use]
    pub fn probe(&self, pos: &Position) -> Option<&NodeCacheEntry> {
        let entry = &self.entries[pos.hash() as usize % CACHE_SIZE];
        match &entry.position {
            Some(cached) if cached == pos => Some(entry),
            _ => None,
        }
    }

    /// Existing entry for `pos`, or a recycled slot; `None` when the slot
    /// is still owned by a same-generation position.
    pub fn entry_mut(&mut self, pos: &Position) -> Option<&mut NodeCacheEntry> {
        let index = pos.hash() as usize % CACHE_SIZE;
        let generation = self.generation;
        let entry = &mut self.entries[index];

        match &entry.position {
            Some(cached) if cached == pos => {
                entry.generation = generation;
                Some(entry)
            }
            _ if entry.generation < generation => {
                *entry = NodeCacheEntry {
                    position: Some(pos.clone()),
                    generation,
                    ..NodeCacheEntry::default()
                };
                Some(entry)
            }
            _ => None,
        }
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        NodeCache::new()
    }
}
