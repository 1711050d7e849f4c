//! Zobrist hashing keys.
//!
//! 792 keys generated by SplitMix64 from a fixed seed: 2*6*64 piece keys,
//! 8 en-passant file keys, 16 castling-rook keys. The side-to-move key is
//! a separate constant.

use once_cell::sync::Lazy;

use crate::board::types::{Color, Piece, Square};

const NUM_KEYS: usize = 2 * 6 * 64 + 8 + 16;

const SEED: u64 = 0xa7a5_7e2f_ba74_af2c;

/// Key XORed into the hash when black is to move.
pub const SIDE_TO_MOVE_KEY: u64 = 1;

static KEYS: Lazy<[u64; NUM_KEYS]> = Lazy::new(|| {
    let mut state = SEED;
    std::array::from_fn(|_| {
        // SplitMix64, https://prng.di.unimi.it/splitmix64.c
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    })
});

#[inline]
#[must_use]
pub fn piece_key(color: Color, piece: Piece, sq: Square) -> u64 {
    let offset = color.index() + 2 * (sq.index() + 64 * piece.index());
    KEYS[offset]
}

#[inline]
#[must_use]
pub fn en_passant_key(file: usize) -> u64 {
    debug_assert!(file < 8);
    KEYS[2 * 6 * 64 + file]
}

/// Key for the castling right tied to the rook starting on `rook_file`.
#[inline]
#[must_use]
pub fn castling_key(color: Color, rook_file: usize) -> u64 {
    debug_assert!(rook_file < 8);
    KEYS[2 * 6 * 64 + 8 + 2 * rook_file + color.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_distinct() {
        let mut sorted: Vec<u64> = KEYS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), NUM_KEYS);
    }

    #[test]
    fn test_splitmix_first_output() {
        // first SplitMix64 output for the fixed seed; pins the generator
        let mut state = SEED;
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        assert_eq!(piece_key(Color::White, Piece::Pawn, Square::from_index(0)), z);
    }

    #[test]
    fn test_key_layout() {
        // black pawn on a1 is the second key, white pawn on b1 the third
        assert_eq!(
            piece_key(Color::Black, Piece::Pawn, Square::from_index(0)),
            KEYS[1]
        );
        assert_eq!(
            piece_key(Color::White, Piece::Pawn, Square::from_index(1)),
            KEYS[2]
        );
        assert_eq!(en_passant_key(0), KEYS[768]);
        assert_eq!(castling_key(Color::White, 0), KEYS[776]);
        assert_eq!(castling_key(Color::Black, 7), KEYS[791]);
    }
}
