//! Precomputed leaper attacks and geometry masks.

use once_cell::sync::Lazy;

use crate::board::types::{Bitboard, Color, Square};

/// The eight compass directions as (file, rank) steps. Order: N, S, E, W,
/// NE, NW, SE, SW.
pub(crate) const DIRECTIONS: [(i32, i32); 8] = [
    (0, 1),
    (0, -1),
    (1, 0),
    (-1, 0),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

pub(crate) const ROOK_DIRECTIONS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
pub(crate) const BISHOP_DIRECTIONS: [(i32, i32); 4] = [(1, 1), (-1, 1), (1, -1), (-1, -1)];

#[inline]
fn offset_square(sq: Square, df: i32, dr: i32) -> Option<Square> {
    let file = sq.file() as i32 + df;
    let rank = sq.rank() as i32 + dr;
    if (0..8).contains(&file) && (0..8).contains(&rank) {
        Some(Square::new(file as usize, rank as usize))
    } else {
        None
    }
}

/// All squares strictly beyond `sq` in the given direction, up to the edge.
pub(crate) fn ray_bitboard(sq: Square, (df, dr): (i32, i32)) -> Bitboard {
    let mut bb = Bitboard::EMPTY;
    let mut cur = sq;
    while let Some(next) = offset_square(cur, df, dr) {
        bb |= Bitboard::from_square(next);
        cur = next;
    }
    bb
}

static PAWN_ATTACKS: Lazy<[[Bitboard; 64]; 2]> = Lazy::new(|| {
    let mut table = [[Bitboard::EMPTY; 64]; 2];
    for idx in 0..64 {
        let sq = Square::from_index(idx);
        let bb = Bitboard::from_square(sq);
        table[0][idx] = bb.shift_north().shift_east() | bb.shift_north().shift_west();
        table[1][idx] = bb.shift_south().shift_east() | bb.shift_south().shift_west();
    }
    table
});

static KNIGHT_ATTACKS: Lazy<[Bitboard; 64]> = Lazy::new(|| {
    let mut table = [Bitboard::EMPTY; 64];
    let jumps = [
        (1, 2),
        (2, 1),
        (2, -1),
        (1, -2),
        (-1, -2),
        (-2, -1),
        (-2, 1),
        (-1, 2),
    ];
    for (idx, slot) in table.iter_mut().enumerate() {
        let sq = Square::from_index(idx);
        for (df, dr) in jumps {
            if let Some(to) = offset_square(sq, df, dr) {
                *slot |= Bitboard::from_square(to);
            }
        }
    }
    table
});

static KING_ATTACKS: Lazy<[Bitboard; 64]> = Lazy::new(|| {
    let mut table = [Bitboard::EMPTY; 64];
    for (idx, slot) in table.iter_mut().enumerate() {
        let sq = Square::from_index(idx);
        for (df, dr) in DIRECTIONS {
            if let Some(to) = offset_square(sq, df, dr) {
                *slot |= Bitboard::from_square(to);
            }
        }
    }
    table
});

/// `BETWEEN[a][b]`: squares strictly between `a` and `b` when they share a
/// rank, file or diagonal; empty otherwise.
static BETWEEN: Lazy<Box<[[Bitboard; 64]; 64]>> = Lazy::new(|| {
    let mut table = Box::new([[Bitboard::EMPTY; 64]; 64]);
    for a in 0..64 {
        let from = Square::from_index(a);
        for dir in DIRECTIONS {
            let mut path = Bitboard::EMPTY;
            let mut cur = from;
            while let Some(next) = offset_square(cur, dir.0, dir.1) {
                table[a][next.index()] = path;
                path |= Bitboard::from_square(next);
                cur = next;
            }
        }
    }
    table
});

static RAYS: Lazy<Box<[[Bitboard; 64]; 8]>> = Lazy::new(|| {
    let mut table = Box::new([[Bitboard::EMPTY; 64]; 8]);
    for (d, dir) in DIRECTIONS.iter().enumerate() {
        for idx in 0..64 {
            table[d][idx] = ray_bitboard(Square::from_index(idx), *dir);
        }
    }
    table
});

/// Squares attacked by a `color` pawn standing on `sq`.
#[inline]
#[must_use]
pub fn pawn_attacks(sq: Square, color: Color) -> Bitboard {
    PAWN_ATTACKS[color.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn knight_attacks(sq: Square) -> Bitboard {
    KNIGHT_ATTACKS[sq.index()]
}

#[inline]
#[must_use]
pub fn king_attacks(sq: Square) -> Bitboard {
    KING_ATTACKS[sq.index()]
}

/// Squares strictly between `a` and `b` on a shared line or diagonal.
#[inline]
#[must_use]
pub fn between(a: Square, b: Square) -> Bitboard {
    BETWEEN[a.index()][b.index()]
}

/// Squares strictly beyond `sq` in compass direction `dir` (0-7: N, S, E,
/// W, NE, NW, SE, SW).
#[inline]
#[must_use]
pub fn ray(sq: Square, dir: usize) -> Bitboard {
    RAYS[dir][sq.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pawn_attacks() {
        let e4 = Square::new(4, 3);
        let attacks = pawn_attacks(e4, Color::White);
        assert!(attacks.contains(Square::new(3, 4))); // d5
        assert!(attacks.contains(Square::new(5, 4))); // f5
        assert_eq!(attacks.popcount(), 2);

        // edge pawn attacks only one square
        let a2 = Square::new(0, 1);
        assert_eq!(pawn_attacks(a2, Color::White).popcount(), 1);

        let attacks = pawn_attacks(e4, Color::Black);
        assert!(attacks.contains(Square::new(3, 2))); // d3
        assert!(attacks.contains(Square::new(5, 2))); // f3
    }

    #[test]
    fn test_knight_attacks() {
        assert_eq!(knight_attacks(Square::new(4, 3)).popcount(), 8);
        assert_eq!(knight_attacks(Square::new(0, 0)).popcount(), 2);
        let from_g1 = knight_attacks(Square::new(6, 0));
        assert!(from_g1.contains(Square::new(5, 2))); // f3
        assert!(from_g1.contains(Square::new(7, 2))); // h3
        assert!(from_g1.contains(Square::new(4, 1))); // e2
    }

    #[test]
    fn test_king_attacks() {
        assert_eq!(king_attacks(Square::new(4, 3)).popcount(), 8);
        assert_eq!(king_attacks(Square::new(0, 0)).popcount(), 3);
        assert_eq!(king_attacks(Square::new(4, 0)).popcount(), 5);
    }

    #[test]
    fn test_between() {
        let a1 = Square::new(0, 0);
        let h8 = Square::new(7, 7);
        let diag = between(a1, h8);
        assert_eq!(diag.popcount(), 6);
        assert!(diag.contains(Square::new(3, 3)));
        assert!(!diag.contains(a1));
        assert!(!diag.contains(h8));

        // not aligned -> empty
        assert!(between(a1, Square::new(1, 2)).is_empty());
        // adjacent -> empty
        assert!(between(a1, Square::new(1, 1)).is_empty());
        // symmetric
        assert_eq!(between(a1, h8), between(h8, a1));
    }

    #[test]
    fn test_rays() {
        let e4 = Square::new(4, 3);
        let north = ray(e4, 0);
        assert_eq!(north.popcount(), 4); // e5..e8
        assert!(north.contains(Square::new(4, 7)));
        assert!(!north.contains(e4));
    }
}
