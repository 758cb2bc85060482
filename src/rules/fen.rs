//! Parsing and serialization of the canonical six-field position string.

use super::position::{Board, CastlingRights, Color, Piece, Position, Square};

/// Parses a standard space-delimited position string. Returns `None` on any
/// malformed input — per the rules engine's contract, callers treat a
/// parse failure as a caller error, not an engine panic.
pub fn from_fen(fen: &str) -> Option<Position> {
    let mut fields = fen.split_whitespace();
    let placement = fields.next()?;
    let side = fields.next()?;
    let castling = fields.next()?;
    let en_passant = fields.next()?;
    let halfmove = fields.next()?;
    let fullmove = fields.next()?;

    let board = parse_placement(placement)?;
    let side_to_move = Color::from_fen_char(side.chars().next()?)?;
    let castling = CastlingRights::from_fen(castling);
    let en_passant = if en_passant == "-" {
        None
    } else {
        Some(Square::from_algebraic(en_passant)?)
    };
    let halfmove_clock: u32 = halfmove.parse().ok()?;
    let fullmove_number: u32 = fullmove.parse().ok()?;

    let position = Position {
        board,
        side_to_move,
        castling,
        en_passant,
        halfmove_clock,
        fullmove_number,
        king_square: [Square(0), Square(0)],
    };
    Some(position.with_refreshed_king_squares())
}

fn parse_placement(placement: &str) -> Option<Board> {
    let mut board: Board = [None; 64];
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return None;
    }
    for (row, rank_str) in ranks.iter().enumerate() {
        let mut col = 0u8;
        for c in rank_str.chars() {
            if let Some(skip) = c.to_digit(10) {
                col += skip as u8;
            } else {
                let piece = Piece::from_fen_char(c)?;
                if col >= 8 {
                    return None;
                }
                board[row * 8 + col as usize] = Some(piece);
                col += 1;
            }
        }
        if col != 8 {
            return None;
        }
    }
    Some(board)
}

/// Serializes a position to the canonical six-field string. Round-trips any
/// position produced by [`super::movegen::apply_move`].
pub fn to_fen(pos: &Position) -> String {
    to_fen_fields(pos, 6)
}

/// Serializes the first `n` fields of a position (used for the repetition
/// key, which only needs placement/side/castling/en-passant).
pub fn to_fen_fields(pos: &Position, n: usize) -> String {
    let mut parts = Vec::with_capacity(6);
    parts.push(serialize_placement(&pos.board));
    parts.push(pos.side_to_move.to_fen_char().to_string());
    parts.push(pos.castling.to_fen());
    parts.push(match pos.en_passant {
        Some(sq) => sq.to_algebraic(),
        None => "-".to_string(),
    });
    parts.push(pos.halfmove_clock.to_string());
    parts.push(pos.fullmove_number.to_string());
    parts.truncate(n.max(1));
    parts.join(" ")
}

fn serialize_placement(board: &Board) -> String {
    let mut ranks = Vec::with_capacity(8);
    for row in 0..8 {
        let mut rank = String::new();
        let mut empty_run = 0u8;
        for col in 0..8 {
            match board[row * 8 + col] {
                Some(piece) => {
                    if empty_run > 0 {
                        rank.push_str(&empty_run.to_string());
                        empty_run = 0;
                    }
                    rank.push(piece.to_fen_char());
                }
                None => empty_run += 1,
            }
        }
        if empty_run > 0 {
            rank.push_str(&empty_run.to_string());
        }
        ranks.push(rank);
    }
    ranks.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const STARTING: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn round_trips_starting_position() {
        let pos = from_fen(STARTING).expect("parses");
        assert_eq!(to_fen(&pos), STARTING);
    }

    #[test]
    fn round_trips_en_passant_and_partial_castling() {
        let fen = "rnbqkbnr/pp1ppppp/8/2pP4/8/8/PPP1PPPP/RNBQKBNR w KQkq c6 0 3";
        let pos = from_fen(fen).expect("parses");
        assert_eq!(to_fen(&pos), fen);
        assert_eq!(pos.en_passant, Square::from_algebraic("c6"));
    }

    #[test]
    fn rejects_malformed_placement() {
        assert!(from_fen("not-a-fen w KQkq - 0 1").is_none());
    }

    #[test]
    fn finds_king_squares() {
        let pos = from_fen(STARTING).unwrap();
        assert_eq!(pos.king_square(Color::White).to_algebraic(), "e1");
        assert_eq!(pos.king_square(Color::Black).to_algebraic(), "e8");
    }
}
