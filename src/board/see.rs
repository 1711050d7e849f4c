//! Static exchange evaluation.
//!
//! Plays out the capture sequence on one square, always recapturing with
//! the least valuable attacker, and reports the material balance for the
//! side making the first capture. Sliding x-rays are picked up by
//! recomputing attackers against the shrinking occupancy.

use super::attack_tables::pawn_attacks;
use super::types::{Bitboard, Color, Move, Piece, Square};
use super::Position;

/// Piece values used for exchange evaluation, pawn = 100.
pub const SEE_VALUES: [i32; 6] = [100, 325, 325, 500, 975, 20000];

#[inline]
#[must_use]
pub fn piece_value(piece: Piece) -> i32 {
    SEE_VALUES[piece.index()]
}

impl Position {
    /// Exchange balance of `mv` for the side to move, in centipawns.
    #[must_use]
    pub fn see(&self, mv: Move) -> i32 {
        if mv.is_castle() {
            return 0;
        }

        let to = mv.to();
        let us = self.side_to_move();
        let mut occ = self.occupancy();

        let first_victim = if mv.is_en_passant() {
            occ ^= Bitboard::from_square(Square::new(to.file(), mv.from().rank()));
            piece_value(Piece::Pawn)
        } else {
            match self.piece_at(to) {
                Some((_, piece)) => piece_value(piece),
                None => 0,
            }
        };

        let Some((_, mut attacker)) = self.piece_at(mv.from()) else {
            return 0;
        };

        let mut gain = [0i32; 32];
        gain[0] = first_victim;
        occ ^= Bitboard::from_square(mv.from());

        let mut stm = !us;
        let mut depth = 0usize;

        while depth + 1 < gain.len() {
            let Some((piece, from)) = self.least_valuable_attacker(to, stm, occ) else {
                break;
            };
            depth += 1;
            gain[depth] = piece_value(attacker) - gain[depth - 1];
            // stop once the capture is pointless for both sides
            if gain[depth].max(-gain[depth - 1]) < 0 {
                break;
            }
            occ ^= Bitboard::from_square(from);
            attacker = piece;
            stm = !stm;
        }

        while depth > 0 {
            gain[depth - 1] = -gain[depth].max(-gain[depth - 1]);
            depth -= 1;
        }
        gain[0]
    }

    /// True if the exchange balance meets `threshold`.
    #[inline]
    #[must_use]
    pub fn see_ge(&self, mv: Move, threshold: i32) -> bool {
        self.see(mv) >= threshold
    }

    fn least_valuable_attacker(
        &self,
        to: Square,
        by: Color,
        occ: Bitboard,
    ) -> Option<(Piece, Square)> {
        // pawns first without the full attack scan
        let pawns = self.pieces(by, Piece::Pawn) & occ & pawn_attacks(to, !by);
        if pawns.any() {
            return Some((Piece::Pawn, pawns.lsb()));
        }
        let attackers = self.attackers_to(to, by, occ) & occ;
        if attackers.is_empty() {
            return None;
        }
        for piece in [
            Piece::Knight,
            Piece::Bishop,
            Piece::Rook,
            Piece::Queen,
            Piece::King,
        ] {
            let subset = attackers & self.pieces(by, piece);
            if subset.any() {
                return Some((piece, subset.lsb()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_capture(fen: &str, lan: &str) -> (Position, Move) {
        let pos = Position::from_fen(fen).unwrap();
        let mv = pos.move_from_lan(lan).unwrap();
        (pos, mv)
    }

    #[test]
    fn test_see_free_pawn() {
        let (pos, mv) = parse_capture("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1", "e4d5");
        assert_eq!(pos.see(mv), 100);
    }

    #[test]
    fn test_see_defended_pawn() {
        // pawn takes defended pawn: wins 100, loses nothing (pawn recapture
        // is met by nothing)
        let (pos, mv) = parse_capture("4k3/8/2p5/3p4/4P3/8/8/4K3 w - - 0 1", "e4d5");
        assert_eq!(pos.see(mv), 0);
    }

    #[test]
    fn test_see_queen_takes_defended_pawn() {
        let (pos, mv) = parse_capture("4k3/8/2p5/3p4/8/8/3Q4/4K3 w - - 0 1", "d2d5");
        assert_eq!(pos.see(mv), 100 - 975);
    }

    #[test]
    fn test_see_undefended_rook() {
        // nothing recaptures; the battery rook behind does not change it
        let (pos, mv) = parse_capture("4k3/8/8/3r4/8/8/3R4/3RK3 w - - 0 1", "d2d5");
        assert_eq!(pos.see(mv), 500);
    }

    #[test]
    fn test_see_xray_recapture() {
        // bishop takes knight defended by pawn, queen x-rays behind the
        // bishop: BxN, pxB, Qxp
        let (pos, mv) = parse_capture("4k3/8/2p5/3n4/8/5B2/6Q1/4K3 w - - 0 1", "f3d5");
        assert_eq!(pos.see(mv), 325 - 325 + 100);
    }

    #[test]
    fn test_see_quiet_move_into_attack() {
        // moving a rook onto a pawn-attacked empty square loses the rook
        let pos = Position::from_fen("4k3/8/2p5/8/8/8/3R4/4K3 w - - 0 1").unwrap();
        let mv = pos.move_from_lan("d2d5").unwrap();
        assert_eq!(pos.see(mv), -500);
    }

    #[test]
    fn test_see_en_passant() {
        let pos =
            Position::from_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1").unwrap();
        let mv = pos.move_from_lan("e5d6").unwrap();
        assert!(mv.is_en_passant());
        assert_eq!(pos.see(mv), 100);
    }
}
