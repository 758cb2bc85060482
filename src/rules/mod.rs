//! The rules engine: board representation, FEN, legal move generation, and
//! move application. Pure and synchronous — no I/O, no async, no clocks.
//! Everything above it (the hub, the socket client, the HTTP edge) treats
//! this module as the single source of truth for "is this move legal" and
//! "what does the position look like afterward".

pub mod fen;
pub mod movegen;
pub mod notation;
pub mod position;

pub use fen::{from_fen, to_fen};
pub use movegen::{apply_move, is_in_check, legal_moves_for_piece, AppliedMove, LegalMoves, TerminalStatus};
pub use position::{CastlingRights, Color, Piece, PieceKind, Position, Square};
