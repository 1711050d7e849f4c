//! Classical tapered material + piece-square evaluation.
//!
//! Used whenever no NNUE network is loaded, so the search stays fully
//! functional on a bare install. Tables are the classic simplified set;
//! the king is the only piece with separate middlegame and endgame tables.

use super::types::{Color, Piece};
use super::Position;

const MATERIAL: [i32; 6] = [100, 320, 330, 500, 900, 0];

const PHASE_WEIGHTS: [i32; 6] = [0, 1, 1, 2, 4, 0];
const MAX_PHASE: i32 = 24;

#[rustfmt::skip]
const PAWN_PST: [i32; 64] = [
     0,  0,  0,  0,  0,  0,  0,  0,
     5, 10, 10,-20,-20, 10, 10,  5,
     5, -5,-10,  0,  0,-10, -5,  5,
     0,  0,  0, 20, 20,  0,  0,  0,
     5,  5, 10, 25, 25, 10,  5,  5,
    10, 10, 20, 30, 30, 20, 10, 10,
    50, 50, 50, 50, 50, 50, 50, 50,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const KNIGHT_PST: [i32; 64] = [
    -50,-40,-30,-30,-30,-30,-40,-50,
    -40,-20,  0,  5,  5,  0,-20,-40,
    -30,  5, 10, 15, 15, 10,  5,-30,
    -30,  0, 15, 20, 20, 15,  0,-30,
    -30,  5, 15, 20, 20, 15,  5,-30,
    -30,  0, 10, 15, 15, 10,  0,-30,
    -40,-20,  0,  0,  0,  0,-20,-40,
    -50,-40,-30,-30,-30,-30,-40,-50,
];

#[rustfmt::skip]
const BISHOP_PST: [i32; 64] = [
    -20,-10,-10,-10,-10,-10,-10,-20,
    -10,  5,  0,  0,  0,  0,  5,-10,
    -10, 10, 10, 10, 10, 10, 10,-10,
    -10,  0, 10, 10, 10, 10,  0,-10,
    -10,  5,  5, 10, 10,  5,  5,-10,
    -10,  0,  5, 10, 10,  5,  0,-10,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -20,-10,-10,-10,-10,-10,-10,-20,
];

#[rustfmt::skip]
const ROOK_PST: [i32; 64] = [
     0,  0,  0,  5,  5,  0,  0,  0,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
     5, 10, 10, 10, 10, 10, 10,  5,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const QUEEN_PST: [i32; 64] = [
    -20,-10,-10, -5, -5,-10,-10,-20,
    -10,  0,  5,  0,  0,  0,  0,-10,
    -10,  5,  5,  5,  5,  5,  0,-10,
      0,  0,  5,  5,  5,  5,  0, -5,
     -5,  0,  5,  5,  5,  5,  0, -5,
    -10,  0,  5,  5,  5,  5,  0,-10,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -20,-10,-10, -5, -5,-10,-10,-20,
];

#[rustfmt::skip]
const KING_PST_MG: [i32; 64] = [
     20, 30, 10,  0,  0, 10, 30, 20,
     20, 20,  0,  0,  0,  0, 20, 20,
    -10,-20,-20,-20,-20,-20,-20,-10,
    -20,-30,-30,-40,-40,-30,-30,-20,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
];

#[rustfmt::skip]
const KING_PST_EG: [i32; 64] = [
    -50,-30,-30,-30,-30,-30,-30,-50,
    -30,-30,  0,  0,  0,  0,-30,-30,
    -30,-10, 20, 30, 30, 20,-10,-30,
    -30,-10, 30, 40, 40, 30,-10,-30,
    -30,-10, 30, 40, 40, 30,-10,-30,
    -30,-10, 20, 30, 30, 20,-10,-30,
    -30,-20,-10,  0,  0,-10,-20,-30,
    -50,-40,-30,-20,-20,-30,-40,-50,
];

const BISHOP_PAIR_BONUS: i32 = 30;

fn pst(piece: Piece, sq_idx: usize) -> (i32, i32) {
    match piece {
        Piece::Pawn => (PAWN_PST[sq_idx], PAWN_PST[sq_idx]),
        Piece::Knight => (KNIGHT_PST[sq_idx], KNIGHT_PST[sq_idx]),
        Piece::Bishop => (BISHOP_PST[sq_idx], BISHOP_PST[sq_idx]),
        Piece::Rook => (ROOK_PST[sq_idx], ROOK_PST[sq_idx]),
        Piece::Queen => (QUEEN_PST[sq_idx], QUEEN_PST[sq_idx]),
        Piece::King => (KING_PST_MG[sq_idx], KING_PST_EG[sq_idx]),
    }
}

/// Tapered classical evaluation from the side-to-move perspective.
#[must_use]
pub(crate) fn evaluate_classical(pos: &Position) -> i32 {
    let mut mg = 0i32;
    let mut eg = 0i32;
    let mut phase = 0i32;

    for color in Color::BOTH {
        let sign = if color == Color::White { 1 } else { -1 };
        for piece in Piece::ALL {
            let bb = pos.pieces(color, piece);
            phase += PHASE_WEIGHTS[piece.index()] * bb.popcount() as i32;
            for sq in bb {
                // tables are laid out from white's point of view
                let idx = if color == Color::White {
                    sq.index()
                } else {
                    sq.flip_rank().index()
                };
                let (p_mg, p_eg) = pst(piece, idx);
                mg += sign * (MATERIAL[piece.index()] + p_mg);
                eg += sign * (MATERIAL[piece.index()] + p_eg);
            }
        }
        if pos.pieces(color, Piece::Bishop).popcount() >= 2 {
            mg += sign * BISHOP_PAIR_BONUS;
            eg += sign * BISHOP_PAIR_BONUS;
        }
    }

    let phase = phase.min(MAX_PHASE);
    let blended = (mg * phase + eg * (MAX_PHASE - phase)) / MAX_PHASE;

    if pos.side_to_move() == Color::White {
        blended
    } else {
        -blended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_position_near_zero() {
        let pos = Position::start();
        let eval = evaluate_classical(&pos);
        assert_eq!(eval, 0);
    }

    #[test]
    fn test_material_advantage() {
        // white up a queen
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 w - - 0 1").unwrap();
        assert!(evaluate_classical(&pos) > 500);
        // same position from black's view
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/Q3K3 b - - 0 1").unwrap();
        assert!(evaluate_classical(&pos) < -500);
    }

    #[test]
    fn test_color_symmetry() {
        let fens = [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        ];
        for fen in fens {
            let pos = Position::from_fen(fen).unwrap();
            let swapped = pos.swap_colors();
            // side to move flips with the colors, so the side-relative
            // score is unchanged
            assert_eq!(
                evaluate_classical(&pos),
                evaluate_classical(&swapped),
                "{fen}"
            );
        }
    }
}
