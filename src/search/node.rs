//! Per-ply search state and repetition detection.
//!
//! The stack is a flat vector of `NodeInfo`; nodes refer to neighbours by
//! index, never by pointer. Draw-by-repetition looks back through the
//! stack and then the game history; the upcoming-repetition probe uses
//! the Marcel van Kervinck cuckoo scheme over reversible-move keys.

use once_cell::sync::Lazy;

use crate::board::attack_tables::{between, bishop_attacks, king_attacks, knight_attacks, rook_attacks};
use crate::board::{
    zobrist, Bitboard, Color, DirtyPieces, Move, PackedMove, Piece, Position, Threats, MAX_PLY,
};

use super::score::INF;

/// Everything one ply of the search owns.
#[derive(Clone)]
pub struct NodeInfo {
    pub position: Position,
    /// Move that produced this node (NONE at the root or after a null move).
    pub prev_move: Move,
    /// Piece that made `prev_move`, before promotion.
    pub prev_piece: Option<Piece>,
    /// NNUE delta of `prev_move`.
    pub dirty: DirtyPieces,
    pub static_eval: i32,
    pub height: u16,
    pub threats: Threats,
    /// Excluded move during a singular-extension verification search.
    pub filtered_move: Move,
    pub double_extensions: u8,
    pub is_null: bool,
    pub in_check: bool,
    pub is_cut_node: bool,
    /// This node lies on the previous iteration's principal variation.
    pub on_prev_pv: bool,
    pub pv_len: u16,
    pub pv: Vec<PackedMove>,
}

impl NodeInfo {
    fn new() -> Self {
        NodeInfo {
            position: Position::start(),
            prev_move: Move::NONE,
            prev_piece: None,
            dirty: DirtyPieces::new(),
            static_eval: -INF,
            height: 0,
            threats: Threats::default(),
            filtered_move: Move::NONE,
            double_extensions: 0,
            is_null: false,
            in_check: false,
            is_cut_node: false,
            on_prev_pv: false,
            pv_len: 0,
            pv: vec![PackedMove::NONE; MAX_PLY],
        }
    }

    /// Was the move into this node irreversible (pawn move, capture or
    /// castle)?
    #[must_use]
    pub fn entered_irreversibly(&self) -> bool {
        self.prev_move.is_capture()
            || self.prev_move.is_castle()
            || self.prev_piece == Some(Piece::Pawn)
    }
}

/// Allocate the fixed-depth node stack.
#[must_use]
pub fn new_stack() -> Vec<NodeInfo> {
    (0..MAX_PLY).map(|_| NodeInfo::new()).collect()
}

/// Draw by repetition at `stack[ply]`: a twofold repetition inside the
/// search (non-PV), or a threefold counting the pre-search game history.
#[must_use]
pub fn is_repetition(
    stack: &[NodeInfo],
    ply: usize,
    game_history: &[u64],
    is_pv: bool,
) -> bool {
    let hash = stack[ply].position.hash();
    let mut count = 0u32;
    let mut i = ply;

    loop {
        if i == 0 {
            break;
        }
        // an irreversible move cuts off everything behind it
        if stack[i].is_null || stack[i].entered_irreversibly() {
            return false;
        }
        i -= 1;
        if (ply - i) % 2 != 0 {
            continue;
        }
        let candidate = &stack[i];
        if candidate.position.hash() == hash && candidate.position == stack[ply].position {
            // twofold inside the tree is as good as a draw off the PV
            if !is_pv && i > 0 {
                return true;
            }
            count += 1;
            if count >= 2 {
                return true;
            }
        }
    }

    let in_game = game_history.iter().filter(|&&h| h == hash).count() as u32;
    count + in_game >= 2
}

const CUCKOO_SIZE: usize = 8192;

struct CuckooTables {
    keys: Vec<u64>,
    moves: Vec<PackedMove>,
}

#[inline]
fn cuckoo_h1(key: u64) -> usize {
    (key % CUCKOO_SIZE as u64) as usize
}

#[inline]
fn cuckoo_h2(key: u64) -> usize {
    ((key >> 16) % CUCKOO_SIZE as u64) as usize
}

/// Hashes of every reversible move (piece on empty board), cuckoo-addressed
/// by the move's zobrist delta.
static CUCKOO: Lazy<CuckooTables> = Lazy::new(|| {
    let mut keys = vec![0u64; CUCKOO_SIZE];
    let mut moves = vec![PackedMove::NONE; CUCKOO_SIZE];
    let mut count = 0u32;

    for color in Color::BOTH {
        for piece in [
            Piece::Knight,
            Piece::Bishop,
            Piece::Rook,
            Piece::Queen,
            Piece::King,
        ] {
            for a in 0..64usize {
                let sq_a = crate::board::Square::from_index(a);
                let attacks = match piece {
                    Piece::Knight => knight_attacks(sq_a),
                    Piece::Bishop => bishop_attacks(sq_a, Bitboard::EMPTY),
                    Piece::Rook => rook_attacks(sq_a, Bitboard::EMPTY),
                    Piece::Queen => {
                        bishop_attacks(sq_a, Bitboard::EMPTY) | rook_attacks(sq_a, Bitboard::EMPTY)
                    }
                    _ => king_attacks(sq_a),
                };
                for sq_b in attacks {
                    if sq_b.index() <= a {
                        continue;
                    }
                    let mut key = zobrist::piece_key(color, piece, sq_a)
                        ^ zobrist::piece_key(color, piece, sq_b)
                        ^ zobrist::SIDE_TO_MOVE_KEY;
                    let mut mv = PackedMove::new(sq_a, sq_b, None);
                    let mut index = cuckoo_h1(key);
                    loop {
                        std::mem::swap(&mut keys[index], &mut key);
                        std::mem::swap(&mut moves[index], &mut mv);
                        if !mv.is_valid() {
                            break;
                        }
                        index = if index == cuckoo_h1(key) {
                            cuckoo_h2(key)
                        } else {
                            cuckoo_h1(key)
                        };
                    }
                    count += 1;
                }
            }
        }
    }

    debug_assert_eq!(count, 3668);
    CuckooTables { keys, moves }
});

/// Can the side to move force a position already seen in the tree with one
/// reversible move? Lets losing nodes bail out to a draw score early.
#[must_use]
pub fn upcoming_repetition(stack: &[NodeInfo], ply: usize) -> bool {
    let node = &stack[ply];
    if ply < 1 || node.position.halfmove_clock() < 3 {
        return false;
    }
    if node.is_null || node.entered_irreversibly() {
        return false;
    }

    let tables = &*CUCKOO;
    let original = node.position.hash();
    let occupancy = node.position.occupancy();
    let own = node.position.occupied(node.position.side_to_move());

    // compare against positions an odd number of plies up: their hash
    // difference is a single opponent move plus the side key
    let mut i = ply - 1;
    loop {
        if i < 2 {
            break;
        }
        if stack[i].is_null || stack[i].entered_irreversibly() {
            break;
        }
        i -= 1;
        if stack[i].is_null || stack[i].entered_irreversibly() {
            break;
        }
        i -= 1;

        debug_assert!(
            stack[i].position.side_to_move() != node.position.side_to_move()
        );
        let move_key = original ^ stack[i].position.hash();

        let index = if tables.keys[cuckoo_h1(move_key)] == move_key {
            cuckoo_h1(move_key)
        } else if tables.keys[cuckoo_h2(move_key)] == move_key {
            cuckoo_h2(move_key)
        } else {
            continue;
        };

        let mv = tables.moves[index];
        // the connecting move must be playable over the current occupancy
        if (between(mv.from(), mv.to()) & occupancy).any() {
            continue;
        }
        // and involve one of our pieces
        if (own & (Bitboard::from_square(mv.from()) | Bitboard::from_square(mv.to()))).any() {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_after(stack: &mut [NodeInfo], ply: usize, mv: Move) {
        let mut pos = stack[ply - 1].position.clone();
        let (_, piece) = pos.piece_at(mv.from()).unwrap();
        let mut dirty = DirtyPieces::new();
        assert!(pos.do_move(mv, &mut dirty));
        stack[ply].position = pos;
        stack[ply].prev_move = mv;
        stack[ply].prev_piece = Some(piece);
        stack[ply].is_null = false;
        stack[ply].height = ply as u16;
    }

    fn lan(pos: &Position, s: &str) -> Move {
        pos.move_from_lan(s).unwrap()
    }

    #[test]
    fn test_cuckoo_tables_complete() {
        // forces the lazy init and the 3668-entry invariant (debug assert)
        let tables = &*CUCKOO;
        let occupied = tables.moves.iter().filter(|m| m.is_valid()).count();
        assert_eq!(occupied, 3668);
    }

    #[test]
    fn test_in_search_repetition_detected() {
        let mut stack = new_stack();
        stack[0].position = Position::start();

        // knights out and back: position repeats at ply 4
        let m1 = lan(&stack[0].position, "g1f3");
        node_after(&mut stack, 1, m1);
        let m2 = lan(&stack[1].position, "g8f6");
        node_after(&mut stack, 2, m2);
        let m3 = lan(&stack[2].position, "f3g1");
        node_after(&mut stack, 3, m3);
        let m4 = lan(&stack[3].position, "f6g8");
        node_after(&mut stack, 4, m4);

        assert_eq!(stack[4].position.hash(), stack[0].position.hash());
        // twofold inside the search tree counts in non-PV nodes; the
        // match sits at the root so only the game history can confirm it
        assert!(!is_repetition(&stack, 4, &[], true));
        assert!(is_repetition(
            &stack,
            4,
            &[stack[0].position.hash()],
            true
        ));
    }

    #[test]
    fn test_irreversible_move_blocks_repetition() {
        let mut stack = new_stack();
        stack[0].position = Position::start();
        let m1 = lan(&stack[0].position, "e2e4");
        node_after(&mut stack, 1, m1);
        // pawn move into ply 1: nothing before it can repeat
        assert!(!is_repetition(&stack, 1, &[stack[0].position.hash()], false));
    }

    #[test]
    fn test_upcoming_repetition() {
        let mut stack = new_stack();
        // shuffle position with halfmove clock high enough
        stack[0].position =
            Position::from_fen("4k3/8/8/8/8/8/8/3QK3 w - - 5 20").unwrap();

        let m1 = lan(&stack[0].position, "d1d2");
        node_after(&mut stack, 1, m1);
        let m2 = lan(&stack[1].position, "e8d8");
        node_after(&mut stack, 2, m2);
        let m3 = lan(&stack[2].position, "d2d1");
        node_after(&mut stack, 3, m3);
        // black to move can step back to e8, reaching the ply-1 position
        assert!(upcoming_repetition(&stack, 3));
    }

    #[test]
    fn test_no_upcoming_repetition_fresh_position() {
        let mut stack = new_stack();
        stack[0].position = Position::start();
        let m1 = lan(&stack[0].position, "g1f3");
        node_after(&mut stack, 1, m1);
        assert!(!is_repetition(&stack, 1, &[], false));
        assert!(!upcoming_repetition(&stack, 1));
    }
}
