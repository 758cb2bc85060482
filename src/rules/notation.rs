//! Standard algebraic notation for a single move, per spec §4.A step 1.
//! Check/checkmate suffixes are appended by the caller once the resulting
//! position is known (notation generation only sees the move itself).

use super::movegen::legal_moves_for_piece;
use super::position::{Piece, PieceKind, Position, Square};

/// Builds the SAN text for moving `piece` from `from` to `to` in `pos`
/// (the position *before* the move is applied). `promotion` is the
/// requested promotion letter, defaulting to queen.
pub fn algebraic_notation(
    pos: &Position,
    from: Square,
    to: Square,
    piece: Piece,
    promotion: Option<char>,
) -> String {
    if piece.kind == PieceKind::King && (to.col() as i16 - from.col() as i16).abs() == 2 {
        return if to.col() > from.col() {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        };
    }

    let is_capture = pos.piece_at(to).is_some()
        || (piece.kind == PieceKind::Pawn && Some(to) == pos.en_passant && from.col() != to.col());

    let mut out = String::new();

    if piece.kind == PieceKind::Pawn {
        if is_capture {
            out.push((b'a' + from.col()) as char);
        }
    } else {
        out.push_str(piece.kind.to_algebraic_letter());
        let (needs_file, needs_rank) = disambiguation(pos, from, to, piece);
        if needs_file {
            out.push((b'a' + from.col()) as char);
        }
        if needs_rank {
            out.push((b'0' + (8 - from.row())) as char);
        }
    }

    if is_capture {
        out.push('x');
    }

    out.push_str(&to.to_algebraic());

    if piece.kind == PieceKind::Pawn && to.row() == piece.color.promotion_row() {
        out.push('=');
        out.push(promotion.unwrap_or('q').to_ascii_uppercase());
    }

    out
}

/// Scans all of the mover's other pieces of the same kind that could also
/// legally reach `to`. Per spec: add the source file if another such piece
/// shares the source rank, add the source rank if one shares the source
/// file; when neither is shared but disambiguation is still needed, the
/// file alone suffices (standard SAN tie-break).
fn disambiguation(pos: &Position, from: Square, to: Square, piece: Piece) -> (bool, bool) {
    let mut same_rank = false;
    let mut same_file = false;
    let mut ambiguous = false;

    for idx in 0..64 {
        let sq = Square::from_index(idx);
        if sq == from {
            continue;
        }
        let Some(other) = pos.piece_at(sq) else {
            continue;
        };
        if other.kind != piece.kind || other.color != piece.color {
            continue;
        }
        let moves = legal_moves_for_piece(pos, sq);
        if moves.quiet.contains(&to) || moves.capture.contains(&to) {
            ambiguous = true;
            if sq.row() == from.row() {
                same_rank = true;
            }
            if sq.col() == from.col() {
                same_file = true;
            }
        }
    }

    if !ambiguous {
        return (false, false);
    }
    let needs_rank = same_file;
    let needs_file = same_rank || (!same_rank && !same_file);
    (needs_file, needs_rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fen::from_fen;
    use crate::rules::position::Color;

    #[test]
    fn simple_pawn_push_has_no_letter() {
        let pos = from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").unwrap();
        let notation = algebraic_notation(
            &pos,
            Square::from_algebraic("e2").unwrap(),
            Square::from_algebraic("e4").unwrap(),
            Piece::new(PieceKind::Pawn, Color::White),
            None,
        );
        assert_eq!(notation, "e4");
    }

    #[test]
    fn pawn_capture_keeps_source_file() {
        let pos = from_fen("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2").unwrap();
        let notation = algebraic_notation(
            &pos,
            Square::from_algebraic("e4").unwrap(),
            Square::from_algebraic("d5").unwrap(),
            Piece::new(PieceKind::Pawn, Color::White),
            None,
        );
        assert_eq!(notation, "exd5");
    }

    #[test]
    fn disambiguates_rooks_sharing_a_rank() {
        let pos = from_fen("4k3/8/8/8/R6R/8/8/4K3 w - - 0 1").unwrap();
        let notation = algebraic_notation(
            &pos,
            Square::from_algebraic("a4").unwrap(),
            Square::from_algebraic("d4").unwrap(),
            Piece::new(PieceKind::Rook, Color::White),
            None,
        );
        assert_eq!(notation, "Rad4");
    }

    #[test]
    fn castling_notation() {
        let pos = from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let notation = algebraic_notation(
            &pos,
            Square::from_algebraic("e1").unwrap(),
            Square::from_algebraic("g1").unwrap(),
            Piece::new(PieceKind::King, Color::White),
            None,
        );
        assert_eq!(notation, "O-O");
    }
}
