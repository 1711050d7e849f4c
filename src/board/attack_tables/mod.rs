//! Attack tables for move generation.
//!
//! Sliding-piece attacks use magic bitboards: per-square (mask, magic,
//! shift) triples index into one flat attack table. Magic constants are
//! found once at startup by a seeded trial search and verified injective,
//! so a bad constant can never ship a wrong table.

mod tables;

pub use tables::{between, king_attacks, knight_attacks, pawn_attacks, ray};

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::board::types::{Bitboard, Square};
use tables::{ray_bitboard, BISHOP_DIRECTIONS, ROOK_DIRECTIONS};

/// Per-square magic lookup data.
struct Magic {
    mask: u64,
    magic: u64,
    shift: u32,
    offset: usize,
}

struct SliderTables {
    rook: [Magic; 64],
    bishop: [Magic; 64],
    attacks: Vec<Bitboard>,
}

/// Relevant-occupancy mask: ray squares excluding the board edge in each
/// direction (a blocker on the edge can never shorten the attack).
fn slider_mask(sq: Square, dirs: &[(i32, i32)]) -> u64 {
    let mut mask = Bitboard::EMPTY;
    for &dir in dirs {
        let full = ray_bitboard(sq, dir);
        // drop the last square of the ray
        let edge = ray_trim_mask(dir);
        mask |= full & edge;
    }
    mask.0
}

fn ray_trim_mask((df, dr): (i32, i32)) -> Bitboard {
    let mut mask = Bitboard::ALL;
    if df > 0 {
        mask &= !Bitboard::FILE_H;
    }
    if df < 0 {
        mask &= !Bitboard::FILE_A;
    }
    if dr > 0 {
        mask &= !Bitboard::RANK_8;
    }
    if dr < 0 {
        mask &= !Bitboard::RANK_1;
    }
    mask
}

/// Ray-walk attack computation, stopping at the first blocker. Slow; used
/// only to fill the tables.
fn slow_attacks(sq: Square, occupancy: u64, dirs: &[(i32, i32)]) -> Bitboard {
    let mut attacks = Bitboard::EMPTY;
    for &(df, dr) in dirs {
        let mut file = sq.file() as i32 + df;
        let mut rank = sq.rank() as i32 + dr;
        while (0..8).contains(&file) && (0..8).contains(&rank) {
            let bit = Bitboard::from_square(Square::new(file as usize, rank as usize));
            attacks |= bit;
            if occupancy & bit.0 != 0 {
                break;
            }
            file += df;
            rank += dr;
        }
    }
    attacks
}

/// Find a magic constant for `mask` that maps every blocker subset to a
/// distinct (or attack-identical) slot of a `1 << bits` table, and fill
/// `table` with the attacks.
fn find_magic(
    sq: Square,
    mask: u64,
    dirs: &[(i32, i32)],
    rng: &mut StdRng,
    table: &mut [Bitboard],
) -> u64 {
    let bits = mask.count_ones();
    let shift = 64 - bits;
    debug_assert_eq!(table.len(), 1usize << bits);

    // enumerate all blocker subsets of the mask once
    let mut subsets: Vec<(u64, Bitboard)> = Vec::with_capacity(1 << bits);
    let mut blockers = 0u64;
    loop {
        subsets.push((blockers, slow_attacks(sq, blockers, dirs)));
        blockers = blockers.wrapping_sub(mask) & mask;
        if blockers == 0 {
            break;
        }
    }

    loop {
        // sparse candidates converge quickly
        let magic = rng.gen::<u64>() & rng.gen::<u64>() & rng.gen::<u64>();
        if (mask.wrapping_mul(magic) >> 56).count_ones() < 6 {
            continue;
        }

        table.fill(Bitboard::EMPTY);
        let mut used = vec![false; table.len()];
        let mut ok = true;

        for &(blockers, attacks) in &subsets {
            let idx = (blockers.wrapping_mul(magic) >> shift) as usize;
            if used[idx] && table[idx] != attacks {
                ok = false;
                break;
            }
            used[idx] = true;
            table[idx] = attacks;
        }

        if ok {
            return magic;
        }
    }
}

static SLIDERS: Lazy<SliderTables> = Lazy::new(|| {
    // fixed seed: the whole construction is deterministic
    let mut rng = StdRng::seed_from_u64(0x1a2b_3c4d_5e6f_7081);

    let mut attacks = Vec::new();
    let mut offset = 0usize;

    let mut build = |dirs: &[(i32, i32)], rng: &mut StdRng, attacks: &mut Vec<Bitboard>| {
        std::array::from_fn::<Magic, 64, _>(|idx| {
            let sq = Square::from_index(idx);
            let mask = slider_mask(sq, dirs);
            let size = 1usize << mask.count_ones();
            attacks.resize(offset + size, Bitboard::EMPTY);
            let magic = find_magic(sq, mask, dirs, rng, &mut attacks[offset..offset + size]);
            let entry = Magic {
                mask,
                magic,
                shift: 64 - mask.count_ones(),
                offset,
            };
            offset += size;
            entry
        })
    };

    let rook = build(&ROOK_DIRECTIONS, &mut rng, &mut attacks);
    let bishop = build(&BISHOP_DIRECTIONS, &mut rng, &mut attacks);

    SliderTables {
        rook,
        bishop,
        attacks,
    }
});

#[inline]
fn magic_lookup(magic: &Magic, occupancy: Bitboard, attacks: &[Bitboard]) -> Bitboard {
    let idx = ((occupancy.0 & magic.mask).wrapping_mul(magic.magic) >> magic.shift) as usize;
    attacks[magic.offset + idx]
}

/// Rook attacks from `sq` given the full board occupancy.
#[inline]
#[must_use]
pub fn rook_attacks(sq: Square, occupancy: Bitboard) -> Bitboard {
    let tables = &*SLIDERS;
    magic_lookup(&tables.rook[sq.index()], occupancy, &tables.attacks)
}

/// Bishop attacks from `sq` given the full board occupancy.
#[inline]
#[must_use]
pub fn bishop_attacks(sq: Square, occupancy: Bitboard) -> Bitboard {
    let tables = &*SLIDERS;
    magic_lookup(&tables.bishop[sq.index()], occupancy, &tables.attacks)
}

/// Queen attacks from `sq` given the full board occupancy.
#[inline]
#[must_use]
pub fn queen_attacks(sq: Square, occupancy: Bitboard) -> Bitboard {
    rook_attacks(sq, occupancy) | bishop_attacks(sq, occupancy)
}

/// Force one-shot table initialization (normally lazy on first use).
pub fn init() {
    Lazy::force(&SLIDERS);
}
