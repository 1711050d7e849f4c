//! Chess engine core: board representation, move generation, NNUE evaluation
//! and a lazy-SMP alpha-beta search sharing one transposition table.
//!
//! The crate exposes everything a UCI front-end needs: build a [`Game`] from
//! a start position and move history, describe limits in [`SearchParams`],
//! and call [`Search::run`] to get back a list of [`PvLine`]s.
//!
//! # Example
//! ```
//! use caracal::board::Position;
//! use caracal::search::{Game, Search, SearchParams};
//!
//! let game = Game::new(Position::start());
//! let mut search = Search::new(16);
//! let params = SearchParams::default().with_max_depth(4);
//! let lines = search.run(&game, &params);
//! assert!(!lines.is_empty());
//! ```

pub mod board;
pub mod nnue;
pub mod search;
pub mod tt;

pub use board::{Bitboard, Color, Move, MoveList, Piece, Position, Square};
pub use search::{Game, PvLine, Search, SearchParams};
