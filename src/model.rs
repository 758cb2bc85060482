//! Persisted and wire data-transfer types shared across the match store,
//! the hub, and the HTTP edge. Field lists mirror spec §3 verbatim; derives
//! follow the teacher's `types.rs` DTO style (`Serialize`/`Deserialize` +
//! `utoipa::ToSchema` on every wire type).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::rules::position::Square;

/// The pair `(totalMs, incrementMs)` configured at match creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Hash)]
pub struct TimeControl {
    pub total_ms: i64,
    pub increment_ms: i64,
}

/// One played half-move, or the synthetic entry describing the starting
/// position. `last_move` is `None` only for that synthetic entry — per the
/// Open Question resolution in DESIGN.md, this replaces the source's
/// collision-prone `(0, 0)` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchHistoryEntry {
    pub fen: String,
    pub last_move: Option<(u8, u8)>,
    pub algebraic_notation: String,
    pub white_ms_remaining: i64,
    pub black_ms_remaining: i64,
}

impl MatchHistoryEntry {
    pub fn initial(fen: String, time_control: TimeControl) -> Self {
        MatchHistoryEntry {
            fen,
            last_move: None,
            algebraic_notation: String::new(),
            white_ms_remaining: time_control.total_ms,
            black_ms_remaining: time_control.total_ms,
        }
    }

    pub fn last_move_squares(&self) -> Option<(Square, Square)> {
        self.last_move.map(|(f, t)| (Square(f), Square(t)))
    }
}

/// Result of a finished match, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResultCode {
    Draw,
    White,
    Black,
}

/// The specific reason a match ended, used for rating-history display and
/// analytics; distinct from the rules engine's `TerminalStatus` in that it
/// survives into the past-match record unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    Checkmate,
    Stalemate,
    ThreefoldRepetition,
    InsufficientMaterial,
    Draw,
    WhiteFlagged,
    BlackFlagged,
    WhiteResigned,
    BlackResigned,
    WhiteDisconnected,
    BlackDisconnected,
}

impl ResultReason {
    /// Computes `(result, reason)` from a terminal rules-engine status and
    /// whose turn it was when the game ended (needed because `Checkmate`
    /// does not itself say who delivered it).
    pub fn from_terminal(
        status: crate::rules::movegen::TerminalStatus,
        side_to_move_at_end: crate::rules::position::Color,
    ) -> (ResultCode, ResultReason) {
        use crate::rules::movegen::TerminalStatus as T;
        use crate::rules::position::Color;
        match status {
            T::Checkmate => {
                let winner = match side_to_move_at_end {
                    Color::White => ResultCode::Black,
                    Color::Black => ResultCode::White,
                };
                (winner, ResultReason::Checkmate)
            }
            T::Stalemate => (ResultCode::Draw, ResultReason::Stalemate),
            T::ThreefoldRepetition => (ResultCode::Draw, ResultReason::ThreefoldRepetition),
            T::InsufficientMaterial => (ResultCode::Draw, ResultReason::InsufficientMaterial),
            T::Draw => (ResultCode::Draw, ResultReason::Draw),
            T::WhiteFlagged => (ResultCode::Black, ResultReason::WhiteFlagged),
            T::BlackFlagged => (ResultCode::White, ResultReason::BlackFlagged),
            T::WhiteResigned => (ResultCode::Black, ResultReason::WhiteResigned),
            T::BlackResigned => (ResultCode::White, ResultReason::BlackResigned),
            T::WhiteDisconnected => (ResultCode::Black, ResultReason::WhiteDisconnected),
            T::BlackDisconnected => (ResultCode::White, ResultReason::BlackDisconnected),
            T::Ongoing => unreachable!("from_terminal called on a non-terminal status"),
        }
    }
}

/// A persisted in-progress match row, per spec §3 "Live match record".
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LiveMatch {
    pub match_id: i64,
    pub white_player_id: i64,
    pub black_player_id: i64,
    pub white_username: Option<String>,
    pub black_username: Option<String>,
    pub last_move: Option<(u8, u8)>,
    pub current_fen: String,
    pub time_control: TimeControl,
    pub white_ms_remaining: i64,
    pub black_ms_remaining: i64,
    pub history: Vec<MatchHistoryEntry>,
    pub time_of_last_move_ms: i64,
    pub average_rating: i32,
    pub started_at_ms: i64,
}

/// A completed match row, per spec §3 "Past match record".
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PastMatch {
    pub match_id: i64,
    pub white_player_id: i64,
    pub black_player_id: i64,
    pub final_fen: String,
    pub history: Vec<MatchHistoryEntry>,
    pub result: ResultCode,
    pub result_reason: ResultReason,
    pub white_rating_delta: i32,
    pub black_rating_delta: i32,
    pub time_control: TimeControl,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
}

/// A registered user, per spec §3. The password hash primitive is an
/// explicit Non-goal; the field is carried as an opaque string produced by
/// an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub player_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    pub joined_at_ms: i64,
    pub last_seen_ms: i64,
}

/// Per-time-control rating buckets for one player, per spec §3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct UserRatings {
    pub player_id: i64,
    pub bullet: i32,
    pub blitz: i32,
    pub rapid: i32,
    pub classical: i32,
}

impl UserRatings {
    pub const DEFAULT_RATING: i32 = 1500;

    pub fn default_for(player_id: i64) -> Self {
        UserRatings {
            player_id,
            bullet: Self::DEFAULT_RATING,
            blitz: Self::DEFAULT_RATING,
            rapid: Self::DEFAULT_RATING,
            classical: Self::DEFAULT_RATING,
        }
    }

    /// The rating bucket a time control falls into, used to read/write the
    /// right column of `UserRatings`. Boundaries follow common online-chess
    /// convention (bullet < 3min, blitz < 10min, rapid < 30min, else
    /// classical), applied to `total_ms` alone since increment is a minor
    /// factor at these boundaries.
    pub fn bucket_for(time_control: TimeControl) -> RatingBucket {
        if time_control.total_ms < 3 * 60_000 {
            RatingBucket::Bullet
        } else if time_control.total_ms < 10 * 60_000 {
            RatingBucket::Blitz
        } else if time_control.total_ms < 30 * 60_000 {
            RatingBucket::Rapid
        } else {
            RatingBucket::Classical
        }
    }

    pub fn get(&self, bucket: RatingBucket) -> i32 {
        match bucket {
            RatingBucket::Bullet => self.bullet,
            RatingBucket::Blitz => self.blitz,
            RatingBucket::Rapid => self.rapid,
            RatingBucket::Classical => self.classical,
        }
    }

    pub fn set(&mut self, bucket: RatingBucket, value: i32) {
        let value = value.max(0);
        match bucket {
            RatingBucket::Bullet => self.bullet = value,
            RatingBucket::Blitz => self.blitz = value,
            RatingBucket::Rapid => self.rapid = value,
            RatingBucket::Classical => self.classical = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RatingBucket {
    Bullet,
    Blitz,
    Rapid,
    Classical,
}

/// Elo expected score, per spec §4.D. `K` is chosen by the mover's own
/// rating, not the opponent's, matching standard USCF/FIDE K-factor bands.
pub fn expected_score(rating: i32, opponent_rating: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent_rating - rating) as f64 / 400.0))
}

pub fn k_factor(rating: i32) -> f64 {
    if rating < 2100 {
        32.0
    } else if rating <= 2400 {
        24.0
    } else {
        16.0
    }
}

/// Rounded rating delta for a side, clamped so the new rating never drops
/// below zero (the clamp is applied by the caller via [`UserRatings::set`]).
pub fn rating_delta(rating: i32, opponent_rating: i32, score: f64) -> i32 {
    let delta = k_factor(rating) * (score - expected_score(rating, opponent_rating));
    delta.round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_draw_has_zero_delta() {
        assert_eq!(rating_delta(1500, 1500, 0.5), 0);
    }

    #[test]
    fn underdog_win_gains_more_than_favorite_win() {
        let underdog_gain = rating_delta(1500, 1900, 1.0);
        let favorite_gain = rating_delta(1900, 1500, 1.0);
        assert!(underdog_gain > favorite_gain);
    }

    #[test]
    fn rating_bucket_boundaries() {
        assert_eq!(
            UserRatings::bucket_for(TimeControl { total_ms: 60_000, increment_ms: 0 }),
            RatingBucket::Bullet
        );
        assert_eq!(
            UserRatings::bucket_for(TimeControl { total_ms: 5 * 60_000, increment_ms: 0 }),
            RatingBucket::Blitz
        );
        assert_eq!(
            UserRatings::bucket_for(TimeControl { total_ms: 15 * 60_000, increment_ms: 10_000 }),
            RatingBucket::Rapid
        );
        assert_eq!(
            UserRatings::bucket_for(TimeControl { total_ms: 60 * 60_000, increment_ms: 0 }),
            RatingBucket::Classical
        );
    }
}
