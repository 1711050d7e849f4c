//! Board representation and game rules.
//!
//! Bitboard-based position state with magic-bitboard sliding attacks,
//! staged pseudo-legal move generation and copy-make move application.
//!
//! # Example
//! ```
//! use caracal::board::Position;
//!
//! let pos = Position::start();
//! assert_eq!(pos.legal_moves().len(), 20);
//! ```

pub mod attack_tables;
mod error;
mod fen;
pub mod material;
mod movegen;
mod pst;
mod see;
mod state;
mod types;
pub mod zobrist;

#[cfg(test)]
mod tests;

pub use error::{FenError, MoveParseError, PositionError, SquareError};
pub use fen::START_FEN;
pub use movegen::GenMode;
pub use see::{piece_value, SEE_VALUES};
pub use state::{DirtyPiece, DirtyPieces, Position, Threats};
pub use types::{Bitboard, BitboardIter, Color, Move, MoveList, PackedMove, Piece, Square, MAX_PLY};

pub(crate) use pst::evaluate_classical;
