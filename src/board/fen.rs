//! FEN round-trip and LAN move parsing (glue for the UCI layer).

use super::error::{FenError, MoveParseError};
use super::types::{Color, Move, Piece, Square};
use super::Position;

/// FEN of the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl Position {
    /// Parse a FEN string. The halfmove/fullmove fields may be omitted.
    pub fn from_fen(fen: &str) -> Result<Position, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(FenError::WrongFieldCount {
                found: fields.len(),
            });
        }

        let mut pos = Position::empty();

        // piece placement, rank 8 down to rank 1
        for (rank_idx, rank_str) in fields[0].split('/').enumerate() {
            if rank_idx >= 8 {
                return Err(FenError::InvalidRankLength { rank: 7 });
            }
            let rank = 7 - rank_idx;
            let mut file = 0usize;
            for symbol in rank_str.chars() {
                if let Some(skip) = symbol.to_digit(10) {
                    file += skip as usize;
                } else {
                    let piece = Piece::from_char(symbol)
                        .ok_or(FenError::InvalidPiece { symbol })?;
                    if file >= 8 {
                        return Err(FenError::InvalidRankLength { rank });
                    }
                    let color = if symbol.is_ascii_uppercase() {
                        Color::White
                    } else {
                        Color::Black
                    };
                    pos.add_piece(color, piece, Square::new(file, rank));
                    file += 1;
                }
            }
            if file != 8 {
                return Err(FenError::InvalidRankLength { rank });
            }
        }

        match fields[1] {
            "w" => pos.set_side_to_move(Color::White),
            "b" => pos.set_side_to_move(Color::Black),
            other => {
                return Err(FenError::InvalidSideToMove {
                    field: other.to_string(),
                })
            }
        }

        let (white_rooks, black_rooks) = parse_castling(&pos, fields[2])?;
        pos.load_castle_rooks(white_rooks, black_rooks);

        let ep = match fields[3] {
            "-" => None,
            sq => Some(sq.parse::<Square>().map_err(|_| FenError::InvalidEnPassant {
                field: sq.to_string(),
            })?),
        };
        pos.load_en_passant(ep);

        let halfmove = match fields.get(4) {
            Some(f) => f.parse::<u16>().map_err(|_| FenError::InvalidCounter {
                field: (*f).to_string(),
            })?,
            None => 0,
        };
        let fullmove = match fields.get(5) {
            Some(f) => f.parse::<u16>().map_err(|_| FenError::InvalidCounter {
                field: (*f).to_string(),
            })?,
            None => 1,
        };
        pos.set_counters(halfmove, fullmove);

        pos.validate()?;
        Ok(pos)
    }

    /// Serialize to FEN. Standard-chess castling renders as `KQkq`;
    /// non-corner rook files fall back to Shredder-FEN file letters.
    #[must_use]
    pub fn to_fen(&self) -> String {
        let mut fen = String::with_capacity(90);

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_at(Square::new(file, rank)) {
                    None => empty += 1,
                    Some((color, piece)) => {
                        if empty > 0 {
                            fen.push(char::from_digit(empty, 10).unwrap_or('0'));
                            empty = 0;
                        }
                        let c = piece.to_char();
                        fen.push(if color == Color::White {
                            c.to_ascii_uppercase()
                        } else {
                            c
                        });
                    }
                }
            }
            if empty > 0 {
                fen.push(char::from_digit(empty, 10).unwrap_or('0'));
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(if self.side_to_move() == Color::White {
            'w'
        } else {
            'b'
        });

        fen.push(' ');
        let castling = castling_string(self);
        if castling.is_empty() {
            fen.push('-');
        } else {
            fen.push_str(&castling);
        }

        fen.push(' ');
        match self.en_passant_square() {
            Some(sq) => fen.push_str(&sq.to_string()),
            None => fen.push('-'),
        }

        fen.push_str(&format!(
            " {} {}",
            self.halfmove_clock(),
            self.fullmove_number()
        ));
        fen
    }

    /// Parse a move in UCI long algebraic notation against this position.
    pub fn move_from_lan(&self, lan: &str) -> Result<Move, MoveParseError> {
        if !(4..=5).contains(&lan.len()) || !lan.is_ascii() {
            return Err(MoveParseError::InvalidNotation {
                notation: lan.to_string(),
            });
        }
        self.legal_moves()
            .into_iter()
            .find(|mv| mv.to_string() == lan)
            .ok_or_else(|| MoveParseError::IllegalMove {
                notation: lan.to_string(),
            })
    }
}

fn parse_castling(pos: &Position, field: &str) -> Result<(u8, u8), FenError> {
    let mut white = 0u8;
    let mut black = 0u8;
    if field == "-" {
        return Ok((white, black));
    }

    for c in field.chars() {
        let (color, mask) = match c {
            'K' => (Color::White, outermost_rook_file(pos, Color::White, true)),
            'Q' => (Color::White, outermost_rook_file(pos, Color::White, false)),
            'k' => (Color::Black, outermost_rook_file(pos, Color::Black, true)),
            'q' => (Color::Black, outermost_rook_file(pos, Color::Black, false)),
            'A'..='H' => (Color::White, Some(c as usize - 'A' as usize)),
            'a'..='h' => (Color::Black, Some(c as usize - 'a' as usize)),
            _ => {
                return Err(FenError::InvalidCastling {
                    field: field.to_string(),
                })
            }
        };
        let Some(file) = mask else {
            return Err(FenError::InvalidCastling {
                field: field.to_string(),
            });
        };
        match color {
            Color::White => white |= 1 << file,
            Color::Black => black |= 1 << file,
        }
    }
    Ok((white, black))
}

/// Outermost rook file on the back rank, on the king's short (`true`) or
/// long side. Resolves `K`/`Q`/`k`/`q` for Chess960 setups too.
fn outermost_rook_file(pos: &Position, color: Color, short: bool) -> Option<usize> {
    let rank = color.back_rank();
    let king_file = pos.king_square(color).file();
    let rooks = pos.pieces(color, Piece::Rook);
    let files: Vec<usize> = (0..8)
        .filter(|&f| rooks.contains(Square::new(f, rank)))
        .collect();
    if short {
        files.into_iter().filter(|&f| f > king_file).max()
    } else {
        files.into_iter().filter(|&f| f < king_file).min()
    }
}

fn castling_string(pos: &Position) -> String {
    let mut out = String::new();
    for color in Color::BOTH {
        let king_file = pos.king_square(color).file();
        let mut files = pos.castle_rooks(color);
        let mut parts: Vec<char> = Vec::new();
        while files != 0 {
            let file = files.trailing_zeros() as usize;
            files &= files - 1;
            let c = match (file, file > king_file) {
                (7, true) => 'k',
                (0, false) => 'q',
                (f, _) => (b'a' + f as u8) as char,
            };
            parts.push(c);
        }
        // short side printed first
        parts.sort_by_key(|&c| (c != 'k', c));
        for c in parts {
            out.push(if color == Color::White {
                c.to_ascii_uppercase()
            } else {
                c
            });
        }
    }
    out
}
