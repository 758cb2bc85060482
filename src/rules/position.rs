//! Board, piece, and position types for the rules engine.
//!
//! Square indices are row-major, `idx = row * 8 + col`, with row 0 the rank
//! holding the black back row (i.e. the top of a standard diagram). This is
//! the opposite convention from a `rank * 8 + file` scheme — do not mix the
//! two.

use serde::{Deserialize, Serialize};

pub const BOARD_SQUARES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Square(pub u8);

impl Square {
    pub fn new(row: u8, col: u8) -> Self {
        Square(row * 8 + col)
    }

    pub fn row(self) -> u8 {
        self.0 / 8
    }

    pub fn col(self) -> u8 {
        self.0 % 8
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(idx: usize) -> Self {
        Square(idx as u8)
    }

    /// Parses a square from algebraic notation, e.g. `"e4"`.
    pub fn from_algebraic(s: &str) -> Option<Square> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0];
        let rank = bytes[1];
        if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
            return None;
        }
        let col = file - b'a';
        let rank_num = rank - b'0';
        let row = 8 - rank_num;
        Some(Square::new(row, col))
    }

    pub fn to_algebraic(self) -> String {
        let file = (b'a' + self.col()) as char;
        let rank_digit = 8 - self.row();
        format!("{}{}", file, (b'0' + rank_digit) as char)
    }

    /// True if applying `offset` to this square stays on the board without
    /// the one-dimensional index wrapping across a rank edge. Callers still
    /// need [`crate::rules::movegen::step_wraps`] for piece-specific wrap
    /// rules; this only guards the raw index bounds.
    pub fn checked_add(self, offset: i16) -> Option<Square> {
        let new_idx = self.0 as i16 + offset;
        if (0..64).contains(&new_idx) {
            Some(Square(new_idx as u8))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_algebraic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Row a side's pawns start on.
    pub fn pawn_start_row(self) -> u8 {
        match self {
            Color::White => 6,
            Color::Black => 1,
        }
    }

    /// Row a side's pawns promote on.
    pub fn promotion_row(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    /// Row delta (in the row-major square index) of a single forward push.
    pub fn forward_offset(self) -> i16 {
        match self {
            Color::White => -8,
            Color::Black => 8,
        }
    }

    pub fn as_index(self) -> usize {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }

    pub fn from_fen_char(c: char) -> Option<Color> {
        match c {
            'w' => Some(Color::White),
            'b' => Some(Color::Black),
            _ => None,
        }
    }

    pub fn to_fen_char(self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum PieceKind {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

impl PieceKind {
    pub fn from_fen_char(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }

    pub fn to_fen_char(self, color: Color) -> char {
        let c = match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        };
        if color == Color::White {
            c.to_ascii_uppercase()
        } else {
            c
        }
    }

    pub fn to_algebraic_letter(self) -> &'static str {
        match self {
            PieceKind::Pawn => "",
            PieceKind::Knight => "N",
            PieceKind::Bishop => "B",
            PieceKind::Rook => "R",
            PieceKind::Queen => "Q",
            PieceKind::King => "K",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    pub fn new(kind: PieceKind, color: Color) -> Self {
        Piece { kind, color }
    }

    pub fn from_fen_char(c: char) -> Option<Piece> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        PieceKind::from_fen_char(c).map(|kind| Piece { kind, color })
    }

    pub fn to_fen_char(self) -> char {
        self.kind.to_fen_char(self.color)
    }
}

/// Static movement data for a piece variant, replacing a runtime
/// dispatch-by-variant map. Indexed by `PieceKind as usize`.
pub struct PieceRules {
    /// Step offsets in row-major index space. For `Pawn` this holds the
    /// single white-relative forward offset; callers flip the sign for
    /// black and handle attacks/double-push/en-passant separately.
    pub offsets: &'static [i16],
    pub max_ray: u8,
}

pub const ORTHOGONAL_OFFSETS: [i16; 4] = [1, -1, 8, -8];
pub const DIAGONAL_OFFSETS: [i16; 4] = [7, -7, 9, -9];
pub const KNIGHT_OFFSETS: [i16; 8] = [6, -6, 10, -10, 15, -15, 17, -17];
pub const KING_OFFSETS: [i16; 8] = [1, -1, 8, -8, 7, -7, 9, -9];
pub const QUEEN_OFFSETS: [i16; 8] = [1, -1, 8, -8, 7, -7, 9, -9];
pub const PAWN_FORWARD_WHITE: [i16; 1] = [-8];
pub const PAWN_ATTACKS_WHITE: [i16; 2] = [-7, -9];

pub static PIECE_RULES: [PieceRules; 6] = [
    PieceRules {
        offsets: &PAWN_FORWARD_WHITE,
        max_ray: 1,
    },
    PieceRules {
        offsets: &KNIGHT_OFFSETS,
        max_ray: 1,
    },
    PieceRules {
        offsets: &DIAGONAL_OFFSETS,
        max_ray: 7,
    },
    PieceRules {
        offsets: &ORTHOGONAL_OFFSETS,
        max_ray: 7,
    },
    PieceRules {
        offsets: &QUEEN_OFFSETS,
        max_ray: 7,
    },
    PieceRules {
        offsets: &KING_OFFSETS,
        max_ray: 1,
    },
];

/// Pawn attack-only offsets (captures, including en passant), white-relative;
/// black uses the negation.
pub fn pawn_attack_offsets(color: Color) -> [i16; 2] {
    match color {
        Color::White => PAWN_ATTACKS_WHITE,
        Color::Black => [-PAWN_ATTACKS_WHITE[0], -PAWN_ATTACKS_WHITE[1]],
    }
}

pub fn pawn_forward_offset(color: Color) -> i16 {
    color.forward_offset()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to_fen(self) -> String {
        let mut s = String::new();
        if self.white_kingside {
            s.push('K');
        }
        if self.white_queenside {
            s.push('Q');
        }
        if self.black_kingside {
            s.push('k');
        }
        if self.black_queenside {
            s.push('q');
        }
        if s.is_empty() {
            s.push('-');
        }
        s
    }

    pub fn from_fen(s: &str) -> Self {
        if s == "-" {
            return Self::none();
        }
        CastlingRights {
            white_kingside: s.contains('K'),
            white_queenside: s.contains('Q'),
            black_kingside: s.contains('k'),
            black_queenside: s.contains('q'),
        }
    }

    pub fn kingside(&self, color: Color) -> bool {
        match color {
            Color::White => self.white_kingside,
            Color::Black => self.black_kingside,
        }
    }

    pub fn queenside(&self, color: Color) -> bool {
        match color {
            Color::White => self.white_queenside,
            Color::Black => self.black_queenside,
        }
    }

    pub fn revoke_both(&mut self, color: Color) {
        match color {
            Color::White => {
                self.white_kingside = false;
                self.white_queenside = false;
            }
            Color::Black => {
                self.black_kingside = false;
                self.black_queenside = false;
            }
        }
    }
}

pub type Board = [Option<Piece>; BOARD_SQUARES];

/// An immutable snapshot of a chess position. The rules engine never
/// mutates a `Position` in place; every operation produces a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub board: Board,
    pub side_to_move: Color,
    pub castling: CastlingRights,
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
    pub king_square: [Square; 2],
}

impl Position {
    pub fn king_square(&self, color: Color) -> Square {
        self.king_square[color.as_index()]
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.board[sq.index()]
    }

    fn find_king(board: &Board, color: Color) -> Option<Square> {
        board.iter().enumerate().find_map(|(i, slot)| match slot {
            Some(p) if p.kind == PieceKind::King && p.color == color => {
                Some(Square::from_index(i))
            }
            _ => None,
        })
    }

    /// Rebuilds the cached king squares by scanning the board. Used after
    /// constructing a board directly (e.g. from FEN) rather than via a move.
    pub fn with_refreshed_king_squares(mut self) -> Self {
        if let Some(sq) = Self::find_king(&self.board, Color::White) {
            self.king_square[Color::White.as_index()] = sq;
        }
        if let Some(sq) = Self::find_king(&self.board, Color::Black) {
            self.king_square[Color::Black.as_index()] = sq;
        }
        self
    }

    /// The first four FEN fields (placement, side, castling, en passant),
    /// used as the repetition key per spec: positions with the same piece
    /// placement, side to move, and castling/en-passant rights repeat.
    pub fn repetition_key(&self) -> String {
        crate::rules::fen::to_fen_fields(self, 4)
    }
}
