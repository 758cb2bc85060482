//! Wire messages exchanged between a hub and its connected clients, per
//! spec §4.D/§5. Outbound messages follow the tagged-enum shape of
//! `gameroom::message::ServerMessage` (`#[serde(tag = "type", rename_all =
//! "snake_case")]`); inbound messages mirror the source's `postMove`/
//! `playerEvent` request bodies.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{MatchHistoryEntry, ResultCode, ResultReason};

/// One side's view of "what happened to the opponent" — connection drops
/// and reconnects, and the handful of one-sided/offer events a peer can
/// raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    Takeback,
    Draw,
    Rematch,
}

/// Event kinds a player may raise, matching spec §4.D's inbound
/// `playerEvent` kinds verbatim: `takeback`, `draw`, and `rematch` are
/// two-sided — the same kind both offers (no pending offer yet) and accepts
/// (an identical offer is already pending from the opponent) — while
/// `resign`/`disconnect`/`abort`/`extraTime` are one-sided and
/// `threefoldRepetitionClaim` only succeeds when the threefold flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayerEventKind {
    Takeback,
    Draw,
    Rematch,
    Resign,
    Disconnect,
    Abort,
    ExtraTime,
    Decline,
    ThreefoldRepetitionClaim,
}

/// `postMove` request body, per spec §6.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PostMoveRequest {
    pub from: String,
    pub to: String,
    pub promotion: Option<char>,
}

/// An inbound frame from a socket client, after the identifier byte has
/// been stripped off by [`crate::socket`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientAction {
    Move { from: String, to: String, promotion: Option<char> },
    Event { kind: PlayerEventKind },
}

/// Everything a hub ever sends to a connected socket. Tagged so a single
/// client-side `match` on `type` dispatches every case, matching the
/// reference dependency's `ServerMessage` pattern.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, immediately after a connection registers: identifies the
    /// recipient's seat and hands them the full current state, per spec
    /// §4.D's `onConnect` (history, threefold flag, both connection
    /// booleans, ms-until-disconnect-claim for a disconnected opponent, and
    /// both usernames).
    Connected {
        seat: Seat,
        match_id: i64,
        fen: String,
        white_ms_remaining: i64,
        black_ms_remaining: i64,
        history: Vec<MatchHistoryEntry>,
        threefold_available: bool,
        white_connected: bool,
        black_connected: bool,
        white_username: Option<String>,
        black_username: Option<String>,
        ms_until_disconnect_claim: Option<i64>,
    },
    /// Broadcast to both sides after every applied move, per spec §4.D's
    /// `onMove`.
    MoveMade {
        fen: String,
        notation: String,
        white_ms_remaining: i64,
        black_ms_remaining: i64,
        is_terminal: bool,
        threefold_available: bool,
    },
    /// A side's live connection state changed, per spec §4.D's
    /// `connectionStatus`.
    ConnectionStatus { seat: Seat, connected: bool, ms_until_timeout: Option<i64> },
    /// An opponent raised a one-sided event or an offer.
    OpponentEvent { kind: PlayerEventKind },
    /// An offer was accepted; `kind` says which one.
    OfferAccepted { kind: OfferKind },
    /// An offer was declined.
    OfferDeclined { kind: OfferKind },
    /// The match ended, for any reason.
    MatchEnded {
        result: ResultCode,
        reason: ResultReason,
        white_rating_delta: i32,
        black_rating_delta: i32,
    },
    /// A rejected action, carrying a human-readable reason (invalid move,
    /// wrong turn, no offer pending, etc).
    ActionRejected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    White,
    Black,
    Spectator,
}
