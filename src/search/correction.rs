//! Static-eval correction tables.
//!
//! Two small per-thread tables accumulate the observed gap between static
//! eval and search score, keyed by material signature and by pawn
//! structure. The learned offset removes systematic evaluator bias in
//! recurring structures.

use crate::board::material::MaterialKey;
use crate::board::Position;

const TABLE_SIZE: usize = 2048;
const GRAIN: i32 = 512;
const LEARNING_RATE: i32 = 256;
const LIMIT: i32 = 63 * GRAIN;

pub struct EvalCorrection {
    /// `[stm][material hash % N]`
    material: Vec<i16>,
    /// `[stm][pawn hash % N]`
    pawns: Vec<i16>,
}

impl EvalCorrection {
    #[must_use]
    pub fn new() -> Self {
        EvalCorrection {
            material: vec![0; 2 * TABLE_SIZE],
            pawns: vec![0; 2 * TABLE_SIZE],
        }
    }

    pub fn clear(&mut self) {
        self.material.fill(0);
        self.pawns.fill(0);
    }

    #[inline]
    fn indices(pos: &Position) -> (usize, usize) {
        let stm = pos.side_to_move().index();
        let mat = MaterialKey::from_position(pos).hash() as usize % TABLE_SIZE;
        let pawn = pos.pawn_hash() as usize % TABLE_SIZE;
        (stm * TABLE_SIZE + mat, stm * TABLE_SIZE + pawn)
    }

    /// Corrected static eval.
    #[must_use]
    pub fn apply(&self, raw: i32, pos: &Position) -> i32 {
        let (mat_idx, pawn_idx) = Self::indices(pos);
        raw + (i32::from(self.material[mat_idx]) + i32::from(self.pawns[pawn_idx])) / GRAIN
    }

    /// Nudge both tables towards the observed search score.
    pub fn update(&mut self, pos: &Position, raw: i32, true_score: i32) {
        let (mat_idx, pawn_idx) = Self::indices(pos);
        let error = GRAIN * (true_score - raw)
            - (i32::from(self.material[mat_idx]) + i32::from(self.pawns[pawn_idx]));

        let mat = i32::from(self.material[mat_idx]) + error / LEARNING_RATE;
        self.material[mat_idx] = mat.clamp(-LIMIT, LIMIT) as i16;
        let pawn = i32::from(self.pawns[pawn_idx]) + error / LEARNING_RATE;
        self.pawns[pawn_idx] = pawn.clamp(-LIMIT, LIMIT) as i16;
    }
}

impl Default for EvalCorrection {
    fn default() -> Self {
        EvalCorrection::new()
    }
}
