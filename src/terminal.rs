//! Local two-player terminal chess, per SPEC_FULL.md component K: a
//! secondary entry point reusing the rules engine directly, bypassing the
//! server, matchmaking, and persistence entirely.
//!
//! Grounded on the teacher's `terminal.rs` for the overall shape (colored
//! board rendering, a command loop, draw/resign handling) and on
//! `crate::rules` for all position state — there is no `Game` struct here;
//! the loop just threads a FEN string plus the move/position history it
//! needs for display and repetition/fifty-move draw claims.

use colored::Colorize;
use std::io::{self, Write};

use crate::model::{ResultCode, ResultReason};
use crate::rules::{self, Color, Piece, PieceKind, Position, Square};

const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

struct TerminalGame {
    fen: String,
    position: Position,
    /// One entry per played half-move: `(side that moved, notation)`.
    history: Vec<(Color, String)>,
    /// Repetition keys (placement + side + castling/en-passant) of every
    /// position reached, including the starting one, for threefold claims.
    repetition_keys: Vec<String>,
    result: Option<(ResultCode, ResultReason)>,
}

impl TerminalGame {
    fn new() -> Self {
        let position = rules::from_fen(STARTING_FEN).expect("starting FEN is always valid");
        let repetition_keys = vec![position.repetition_key()];
        TerminalGame { fen: STARTING_FEN.to_string(), position, history: Vec::new(), repetition_keys, result: None }
    }

    fn is_over(&self) -> bool {
        self.result.is_some()
    }

    fn legal_moves_from(&self, source: Square) -> rules::LegalMoves {
        rules::legal_moves_for_piece(&self.position, source)
    }

    fn all_legal_moves(&self) -> Vec<(Square, Square)> {
        let mut out = Vec::new();
        for idx in 0..64 {
            let source = Square::from_index(idx);
            if self.position.piece_at(source).map(|p| p.color) != Some(self.position.side_to_move) {
                continue;
            }
            let moves = self.legal_moves_from(source);
            for dest in moves.quiet.iter().chain(moves.capture.iter()) {
                out.push((source, *dest));
            }
        }
        out
    }

    fn make_move(&mut self, from: Square, to: Square, promotion: Option<char>) -> Result<(), String> {
        let legal = self.legal_moves_from(from);
        let destination_ok = legal.quiet.contains(&to) || legal.capture.contains(&to);
        if !destination_ok {
            return Err(format!("{} is not a legal destination from {}", to.to_algebraic(), from.to_algebraic()));
        }

        let mover = self.position.side_to_move;
        let applied = rules::apply_move(&self.fen, from, to, promotion)
            .ok_or_else(|| "move application failed unexpectedly".to_string())?;

        self.fen = applied.fen.clone();
        self.position = rules::from_fen(&applied.fen).expect("apply_move always returns valid FEN");
        self.history.push((mover, applied.notation));
        self.repetition_keys.push(self.position.repetition_key());

        if applied.status.is_terminal() {
            self.result = Some(ResultReason::from_terminal(applied.status, self.position.side_to_move));
        }
        Ok(())
    }

    fn repetition_count(&self) -> usize {
        let Some(current) = self.repetition_keys.last() else { return 0 };
        self.repetition_keys.iter().filter(|k| *k == current).count()
    }

    fn resign(&mut self) {
        let (result, reason) = match self.position.side_to_move {
            Color::White => (ResultCode::Black, ResultReason::WhiteResigned),
            Color::Black => (ResultCode::White, ResultReason::BlackResigned),
        };
        self.result = Some((result, reason));
    }

    fn claim_draw(&mut self) -> Result<(), String> {
        if self.repetition_count() >= 3 {
            self.result = Some((ResultCode::Draw, ResultReason::ThreefoldRepetition));
            return Ok(());
        }
        if self.position.halfmove_clock >= 100 {
            self.result = Some((ResultCode::Draw, ResultReason::Draw));
            return Ok(());
        }
        Err(format!(
            "no draw available yet (halfmove clock {}, current position seen {}x)",
            self.position.halfmove_clock,
            self.repetition_count()
        ))
    }
}

/// Renders the board to the terminal with colors and piece symbols, from
/// White's perspective (row 0 — the back rank — printed at the bottom).
pub fn print_board(game: &TerminalGame) {
    println!();
    println!("  +---+---+---+---+---+---+---+---+");

    for row in (0..8u8).rev() {
        print!("{} ", 8 - row);
        for col in 0..8u8 {
            let sq = Square::new(row, col);
            let is_dark_square = (row + col) % 2 == 1;

            let piece_str = match game.position.piece_at(sq) {
                Some(piece) => {
                    let symbol = piece_to_unicode(piece);
                    if piece.color == Color::White {
                        symbol.white().bold().to_string()
                    } else {
                        symbol.blue().bold().to_string()
                    }
                }
                None => {
                    if is_dark_square {
                        "\u{b7}".dimmed().to_string()
                    } else {
                        " ".to_string()
                    }
                }
            };

            print!("| {} ", piece_str);
        }
        println!("|");
        println!("  +---+---+---+---+---+---+---+---+");
    }
    println!("    a   b   c   d   e   f   g   h");
    println!();
}

fn piece_to_unicode(piece: Piece) -> &'static str {
    match (piece.color, piece.kind) {
        (Color::White, PieceKind::King) => "K",
        (Color::White, PieceKind::Queen) => "Q",
        (Color::White, PieceKind::Rook) => "R",
        (Color::White, PieceKind::Bishop) => "B",
        (Color::White, PieceKind::Knight) => "N",
        (Color::White, PieceKind::Pawn) => "P",
        (Color::Black, PieceKind::King) => "k",
        (Color::Black, PieceKind::Queen) => "q",
        (Color::Black, PieceKind::Rook) => "r",
        (Color::Black, PieceKind::Bishop) => "b",
        (Color::Black, PieceKind::Knight) => "n",
        (Color::Black, PieceKind::Pawn) => "p",
    }
}

/// Prints the game status bar (turn, check, move number, castling rights).
pub fn print_status(game: &TerminalGame) {
    let turn_str = match game.position.side_to_move {
        Color::White => "White".white().bold(),
        Color::Black => "Black".blue().bold(),
    };

    let is_check = rules::is_in_check(&game.position, game.position.side_to_move);
    let legal_move_count = game.all_legal_moves().len();

    print!("Move {}, {} to play", game.position.fullmove_number, turn_str);

    if is_check {
        print!("  {}", "CHECK".red().bold());
    }

    println!("  ({legal_move_count} legal moves)");

    let rights = game.position.castling.to_fen();
    println!("Castling: {rights}  Halfmove clock: {}", game.position.halfmove_clock);

    if let Some(ep) = game.position.en_passant {
        println!("En passant target: {}", ep.to_algebraic());
    }

    println!();
}

pub fn print_game_result(game: &TerminalGame) {
    if let Some((result, reason)) = &game.result {
        println!();
        println!("{}", "\u{2550}".repeat(37).yellow());
        println!("  {} \u{2014} {reason:?}", "GAME OVER".yellow().bold());
        println!("{}", format!("Result: {result:?}").green().bold());
        println!("{}", "\u{2550}".repeat(37).yellow());
        println!();
    }
}

pub fn print_help() {
    println!("{}", "Commands:".yellow().bold());
    println!("  {}      - make a move (e.g. e2e4, e7e8q for promotion)", "e2e4".green());
    println!("  {}     - list legal moves for the side to move", "moves".green());
    println!("  {}      - redraw the board", "board".green());
    println!("  {}    - resign the game", "resign".green());
    println!("  {}      - claim a draw (threefold repetition or fifty-move rule)", "draw".green());
    println!("  {}   - show move history", "history".green());
    println!("  {}       - print the current FEN", "fen".green());
    println!("  {}      - show this help", "help".green());
    println!("  {}      - quit", "quit".green());
    println!();
}

pub fn print_history(game: &TerminalGame) {
    if game.history.is_empty() {
        println!("No moves played yet.");
        return;
    }
    println!("{}", "Move history:".yellow().bold());
    for (i, (side, notation)) in game.history.iter().enumerate() {
        let side = match side {
            Color::White => "White",
            Color::Black => "Black",
        };
        println!("  {}. {} {}", i + 1, side, notation);
    }
    println!();
}

/// Runs the interactive terminal chess game. Two players alternate entering
/// moves until checkmate, stalemate, a claimed draw, or resignation.
pub fn run_terminal_game() {
    println!();
    println!("{}", "\u{2554}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2557}".cyan());
    println!("{}", "\u{2551}           gambit \u{2014} local play           \u{2551}".cyan());
    println!("{}", "\u{255a}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{255d}".cyan());
    println!();

    let mut game = TerminalGame::new();

    print_help();
    print_board(&game);
    print_status(&game);

    loop {
        if game.is_over() {
            print_game_result(&game);
            break;
        }

        let turn_prompt = match game.position.side_to_move {
            Color::White => "White".white().bold(),
            Color::Black => "Black".blue().bold(),
        };

        print!("{turn_prompt} > ");
        io::stdout().flush().unwrap();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("could not read input, try again");
            continue;
        }
        let input = input.trim().to_lowercase();

        if input.is_empty() {
            continue;
        }

        match input.as_str() {
            "quit" | "exit" | "q" => {
                println!("goodbye");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "board" | "b" => {
                print_board(&game);
                print_status(&game);
            }
            "moves" | "m" => {
                let moves = game.all_legal_moves();
                println!("{} {} legal moves:", "Legal moves".yellow().bold(), moves.len());
                for (i, (from, to)) in moves.iter().enumerate() {
                    if i > 0 && i % 8 == 0 {
                        println!();
                    }
                    print!("  {}", format!("{}{}", from.to_algebraic(), to.to_algebraic()).green());
                }
                println!();
                println!();
            }
            "resign" | "r" => {
                game.resign();
                print_board(&game);
                print_game_result(&game);
                break;
            }
            "draw" | "d" => match game.claim_draw() {
                Ok(()) => {
                    print_game_result(&game);
                    break;
                }
                Err(e) => println!("{}: {e}", "Error".red().bold()),
            },
            "history" => print_history(&game),
            "fen" => println!("{}\n", game.fen),
            _ => {
                if let Some((from, to, promotion)) = parse_move_input(&input) {
                    match game.make_move(from, to, promotion) {
                        Ok(()) => {
                            print_board(&game);
                            print_status(&game);
                            if game.is_over() {
                                print_game_result(&game);
                                break;
                            }
                        }
                        Err(e) => println!("{}: {e}", "Illegal move".red().bold()),
                    }
                } else {
                    println!("unrecognized input {:?} (type 'help' for commands)", input);
                }
            }
        }
    }
}

/// Parses a move input string like "e2e4" or "e7e8q" into `(from, to, promotion)`.
fn parse_move_input(input: &str) -> Option<(Square, Square, Option<char>)> {
    let input = input.replace(' ', "");
    let input = input.trim();

    if input.len() < 4 || input.len() > 5 {
        return None;
    }

    let from = Square::from_algebraic(&input[0..2])?;
    let to = Square::from_algebraic(&input[2..4])?;

    let promotion = if input.len() == 5 {
        let promo_char = input.chars().nth(4)?.to_ascii_lowercase();
        match promo_char {
            'q' | 'r' | 'b' | 'n' => Some(promo_char),
            _ => return None,
        }
    } else {
        None
    };

    Some((from, to, promotion))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_move_normal() {
        let (from, to, promo) = parse_move_input("e2e4").unwrap();
        assert_eq!(from.to_algebraic(), "e2");
        assert_eq!(to.to_algebraic(), "e4");
        assert_eq!(promo, None);
    }

    #[test]
    fn parse_move_promotion() {
        let (from, to, promo) = parse_move_input("e7e8q").unwrap();
        assert_eq!(from.to_algebraic(), "e7");
        assert_eq!(to.to_algebraic(), "e8");
        assert_eq!(promo, Some('q'));
    }

    #[test]
    fn parse_move_with_space() {
        let (from, to, _) = parse_move_input("e2 e4").unwrap();
        assert_eq!(from.to_algebraic(), "e2");
        assert_eq!(to.to_algebraic(), "e4");
    }

    #[test]
    fn parse_invalid() {
        assert!(parse_move_input("abc").is_none());
        assert!(parse_move_input("z9z9").is_none());
        assert!(parse_move_input("e2e4x").is_none());
    }

    #[test]
    fn opening_move_updates_history_and_side_to_move() {
        let mut game = TerminalGame::new();
        let from = Square::from_algebraic("e2").unwrap();
        let to = Square::from_algebraic("e4").unwrap();
        game.make_move(from, to, None).unwrap();
        assert_eq!(game.position.side_to_move, Color::Black);
        assert_eq!(game.history.len(), 1);
    }

    #[test]
    fn resigning_ends_the_game_for_the_side_to_move() {
        let mut game = TerminalGame::new();
        game.resign();
        assert_eq!(game.result, Some((ResultCode::Black, ResultReason::WhiteResigned)));
    }
}
