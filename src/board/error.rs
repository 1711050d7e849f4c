//! Error types for board construction and parsing.

use std::error::Error;
use std::fmt;

/// Invalid square notation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SquareError {
    InvalidNotation { notation: String },
}

impl fmt::Display for SquareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SquareError::InvalidNotation { notation } => {
                write!(f, "invalid square notation '{notation}'")
            }
        }
    }
}

impl Error for SquareError {}

/// FEN parsing failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FenError {
    WrongFieldCount { found: usize },
    InvalidPiece { symbol: char },
    InvalidRankLength { rank: usize },
    InvalidSideToMove { field: String },
    InvalidCastling { field: String },
    InvalidEnPassant { field: String },
    InvalidCounter { field: String },
    IllegalPosition(PositionError),
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenError::WrongFieldCount { found } => {
                write!(f, "expected at least 4 FEN fields, found {found}")
            }
            FenError::InvalidPiece { symbol } => write!(f, "invalid piece symbol '{symbol}'"),
            FenError::InvalidRankLength { rank } => {
                write!(f, "rank {} does not describe 8 files", rank + 1)
            }
            FenError::InvalidSideToMove { field } => {
                write!(f, "invalid side to move '{field}'")
            }
            FenError::InvalidCastling { field } => write!(f, "invalid castling field '{field}'"),
            FenError::InvalidEnPassant { field } => {
                write!(f, "invalid en passant field '{field}'")
            }
            FenError::InvalidCounter { field } => write!(f, "invalid move counter '{field}'"),
            FenError::IllegalPosition(err) => write!(f, "illegal position: {err}"),
        }
    }
}

impl Error for FenError {}

impl From<PositionError> for FenError {
    fn from(err: PositionError) -> Self {
        FenError::IllegalPosition(err)
    }
}

/// Structural position invariant violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PositionError {
    KingCount { color_white: bool, count: u32 },
    PawnOnBackRank,
    SideNotToMoveInCheck,
    CastlingRightsWithoutRook,
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::KingCount { color_white, count } => {
                let side = if *color_white { "white" } else { "black" };
                write!(f, "{side} has {count} kings, expected exactly one")
            }
            PositionError::PawnOnBackRank => write!(f, "pawn on rank 1 or rank 8"),
            PositionError::SideNotToMoveInCheck => {
                write!(f, "side not to move is in check")
            }
            PositionError::CastlingRightsWithoutRook => {
                write!(f, "castling rights without a rook on the starting rank")
            }
        }
    }
}

impl Error for PositionError {}

/// Move parsing (LAN) failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveParseError {
    InvalidNotation { notation: String },
    IllegalMove { notation: String },
}

impl fmt::Display for MoveParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveParseError::InvalidNotation { notation } => {
                write!(f, "invalid move notation '{notation}'")
            }
            MoveParseError::IllegalMove { notation } => {
                write!(f, "move '{notation}' is not legal in this position")
            }
        }
    }
}

impl Error for MoveParseError {}
