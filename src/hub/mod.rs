//! The per-match event loop ("hub"), per spec §4.D.
//!
//! Grounded on the source's `matchRoomWebSocketHub.go` for the overall
//! shape (a single task owning all mutable match state, driven by a
//! `select!`-style loop over register/unregister/flag-timer/inbound
//! channels, broadcasting to a backpressure-dropping set of clients) and on
//! `gameroom::room::Room::run` for the Rust idiom of expressing that loop as
//! a plain `tokio::spawn`ed async function rather than an actor — the
//! reference dependency's actor type is a process-wide singleton
//! broadcaster, not a per-match registry entry, so it doesn't fit this
//! component; the manager in [`crate::hub::manager`] owns each hub's
//! lifetime exactly the way `hosting::casino::Casino` owns a `Room`'s.
//!
//! Deliberately *not* an `actix::Actor`: see the REDESIGN FLAGS discussion
//! carried into DESIGN.md.

pub mod clock;
pub mod manager;
pub mod messages;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_postgres::Client;
use uuid::Uuid;

use crate::error::GambitError;
use crate::model::{LiveMatch, MatchHistoryEntry, ResultReason, TimeControl, UserRatings};
use crate::persistence::{store, PersistenceQueue};
use crate::rules::position::Color;
use crate::rules::{self, Square, TerminalStatus};

use clock::Clocks;
use manager::HubManager;
use messages::{ClientAction, OfferKind, PlayerEventKind, Seat, ServerMessage};

/// Grace period an opponent has to claim a win after a side disconnects,
/// before which a reconnect cancels the claim. Per spec §5 "Timeouts":
/// disconnect-claim window 20s.
pub const DISCONNECT_CLAIM_GRACE: Duration = Duration::from_secs(20);

/// A long-but-finite duration used in place of "never" for a `select!`
/// branch that should not currently fire (`Duration::MAX` overflows
/// `tokio::time::sleep`'s internal arithmetic).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

struct ConnectedClient {
    outbound: mpsc::UnboundedSender<String>,
}

pub struct RegisterClient {
    pub connection_id: Uuid,
    pub seat: Seat,
    pub outbound: mpsc::UnboundedSender<String>,
    pub ready: oneshot::Sender<()>,
}

struct PendingOffer {
    kind: OfferKind,
    offered_by: Color,
}

/// The outcome of the persistence worker's rating computation, fed back
/// into the hub's own event loop so the final `MatchEnded` broadcast can
/// carry real deltas instead of placeholders.
struct FinishResult {
    result: crate::model::ResultCode,
    reason: ResultReason,
    white_rating_delta: i32,
    black_rating_delta: i32,
}

/// Handle a socket connection uses to talk to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    pub match_id: i64,
    /// Exposed so the socket edge can derive a connecting session's seat
    /// (white/black/spectator) itself by comparing the authenticated player
    /// id against these, per spec §4.F — the identifier byte is "attached
    /// by the socket layer from the player's authenticated identity", never
    /// taken on the client's word.
    pub white_player_id: i64,
    pub black_player_id: i64,
    register_tx: mpsc::UnboundedSender<RegisterClient>,
    unregister_tx: mpsc::UnboundedSender<Uuid>,
    action_tx: mpsc::UnboundedSender<(Uuid, Color, ClientAction)>,
}

impl HubHandle {
    /// Derives the seat a connecting player should be registered under,
    /// per spec §4.F: compare the authenticated player id (`None` for an
    /// unauthenticated caller) against the match's white/black ids.
    pub fn seat_for(&self, player_id: Option<i64>) -> Seat {
        match player_id {
            Some(id) if id == self.white_player_id => Seat::White,
            Some(id) if id == self.black_player_id => Seat::Black,
            _ => Seat::Spectator,
        }
    }

    pub fn register(&self, msg: RegisterClient) {
        let _ = self.register_tx.send(msg);
    }

    pub fn unregister(&self, connection_id: Uuid) {
        let _ = self.unregister_tx.send(connection_id);
    }

    pub fn submit_action(&self, connection_id: Uuid, seat_color: Color, action: ClientAction) {
        let _ = self.action_tx.send((connection_id, seat_color, action));
    }
}

pub struct Hub {
    match_id: i64,
    white_player_id: i64,
    black_player_id: i64,
    white_username: Option<String>,
    black_username: Option<String>,
    queue: PersistenceQueue<Client>,
    manager: Arc<HubManager>,
    /// Completion signal of the most recently submitted persistence write,
    /// if one is still outstanding. Every new write waits on this before
    /// running and replaces it with its own completion signal, per spec
    /// §4.D/§5's "chained via barriers" ordering contract.
    write_barrier: Option<oneshot::Receiver<()>>,

    fen: String,
    side_to_move: Color,
    history: Vec<MatchHistoryEntry>,
    repetition: HashMap<String, u32>,
    threefold_available: bool,
    clocks: Clocks,
    time_control: TimeControl,
    game_ended: bool,
    average_rating: i32,
    started_at_ms: i64,

    white_clients: HashMap<Uuid, ConnectedClient>,
    black_clients: HashMap<Uuid, ConnectedClient>,
    spectators: HashMap<Uuid, ConnectedClient>,
    white_connected: bool,
    black_connected: bool,
    white_disconnect_deadline: Option<std::time::Instant>,
    black_disconnect_deadline: Option<std::time::Instant>,

    pending_offer: Option<PendingOffer>,

    register_rx: mpsc::UnboundedReceiver<RegisterClient>,
    unregister_rx: mpsc::UnboundedReceiver<Uuid>,
    action_rx: mpsc::UnboundedReceiver<(Uuid, Color, ClientAction)>,
    finish_tx: mpsc::UnboundedSender<FinishResult>,
    finish_rx: mpsc::UnboundedReceiver<FinishResult>,
}

impl Hub {
    /// Builds a hub from a persisted live match row, spawns its event loop,
    /// and returns a handle. Called exactly once per match id by
    /// [`manager::HubManager::get_or_create`].
    pub fn spawn(live: LiveMatch, queue: PersistenceQueue<Client>, manager: Arc<HubManager>) -> HubHandle {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (finish_tx, finish_rx) = mpsc::unbounded_channel();

        let pos = rules::from_fen(&live.current_fen).expect("persisted FEN is always valid");
        let side_to_move = pos.side_to_move;

        let mut repetition = HashMap::new();
        for entry in &live.history {
            if let Some(p) = rules::from_fen(&entry.fen) {
                *repetition.entry(p.repetition_key()).or_insert(0) += 1;
            }
        }
        let threefold_available = repetition.get(&pos.repetition_key()).copied().unwrap_or(0) >= 3;

        // Timers only apply once the match is past its first move (spec
        // §4.D lifecycle); the synthetic initial entry is the only history
        // row a match has before that.
        let timers_apply = live.history.len() > 1;
        let clocks = Clocks::restore(
            live.white_ms_remaining,
            live.black_ms_remaining,
            live.time_control.increment_ms,
            side_to_move,
            timers_apply,
        );

        let match_id = live.match_id;
        let white_player_id = live.white_player_id;
        let black_player_id = live.black_player_id;

        let hub = Hub {
            match_id: live.match_id,
            white_player_id: live.white_player_id,
            black_player_id: live.black_player_id,
            white_username: live.white_username,
            black_username: live.black_username,
            queue,
            manager,
            write_barrier: None,
            fen: live.current_fen,
            side_to_move,
            history: live.history,
            repetition,
            threefold_available,
            clocks,
            time_control: live.time_control,
            game_ended: false,
            average_rating: live.average_rating,
            started_at_ms: live.started_at_ms,
            white_clients: HashMap::new(),
            black_clients: HashMap::new(),
            spectators: HashMap::new(),
            white_connected: false,
            black_connected: false,
            white_disconnect_deadline: None,
            black_disconnect_deadline: None,
            pending_offer: None,
            register_rx,
            unregister_rx,
            action_rx,
            finish_tx,
            finish_rx,
        };

        tokio::spawn(hub.run());

        HubHandle {
            match_id,
            white_player_id,
            black_player_id,
            register_tx,
            unregister_tx,
            action_tx,
        }
    }

    fn flag_sleep_duration(&self) -> Duration {
        if self.game_ended {
            FAR_FUTURE
        } else {
            self.clocks.time_until_flag()
        }
    }

    fn disconnect_sleep_duration(&self) -> Duration {
        if self.game_ended {
            return FAR_FUTURE;
        }
        let now = std::time::Instant::now();
        [self.white_disconnect_deadline, self.black_disconnect_deadline]
            .into_iter()
            .flatten()
            .map(|d| d.saturating_duration_since(now))
            .min()
            .unwrap_or(FAR_FUTURE)
    }

    async fn run(mut self) {
        self.broadcast_move_state(None);
        loop {
            if self.game_ended && self.all_disconnected() {
                break;
            }
            let flag_sleep = tokio::time::sleep(self.flag_sleep_duration());
            let disconnect_sleep = tokio::time::sleep(self.disconnect_sleep_duration());

            tokio::select! {
                _ = flag_sleep, if !self.game_ended => {
                    self.handle_flag();
                }
                _ = disconnect_sleep, if !self.game_ended => {
                    self.handle_disconnect_deadlines();
                }
                msg = self.register_rx.recv() => {
                    match msg {
                        Some(reg) => self.handle_register(reg),
                        None => break,
                    }
                }
                conn = self.unregister_rx.recv() => {
                    match conn {
                        Some(id) => self.handle_unregister(id),
                        None => break,
                    }
                }
                action = self.action_rx.recv() => {
                    match action {
                        Some((id, seat_color, action)) => self.handle_action(id, seat_color, action),
                        None => break,
                    }
                }
                finished = self.finish_rx.recv() => {
                    if let Some(finished) = finished {
                        self.broadcast(&ServerMessage::MatchEnded {
                            result: finished.result,
                            reason: finished.reason,
                            white_rating_delta: finished.white_rating_delta,
                            black_rating_delta: finished.black_rating_delta,
                        });
                    }
                }
            }
        }
        self.manager.unregister(self.match_id).await;
        log::info!("hub for match {} shutting down", self.match_id);
    }

    /// Returns the previous write's completion receiver (if any, to wait on
    /// before this write runs) and a sender this write must signal when
    /// done, then advances the hub's barrier to the new receiver. Per spec
    /// §4.D/§5: the persistence queue's worker pool can run submissions
    /// out of order across workers, so each per-match write is chained to
    /// wait on the one before it.
    fn next_write_barrier(&mut self) -> (Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let wait_on = self.write_barrier.replace(rx);
        (wait_on, tx)
    }

    fn all_disconnected(&self) -> bool {
        self.white_clients.is_empty() && self.black_clients.is_empty() && self.spectators.is_empty()
    }

    fn seat_clients_mut(&mut self, seat: Seat) -> &mut HashMap<Uuid, ConnectedClient> {
        match seat {
            Seat::White => &mut self.white_clients,
            Seat::Black => &mut self.black_clients,
            Seat::Spectator => &mut self.spectators,
        }
    }

    /// Milliseconds remaining before a disconnected side's opponent gains
    /// the right to claim a win, or `None` if that side isn't mid-grace.
    fn ms_until_disconnect_claim(&self, seat: Seat) -> Option<i64> {
        let deadline = match seat {
            Seat::White => self.white_disconnect_deadline,
            Seat::Black => self.black_disconnect_deadline,
            Seat::Spectator => None,
        }?;
        Some(deadline.saturating_duration_since(std::time::Instant::now()).as_millis() as i64)
    }

    fn handle_register(&mut self, reg: RegisterClient) {
        let RegisterClient { connection_id, seat, outbound, ready } = reg;

        let (white_ms, black_ms) = self.clocks.snapshot(self.side_to_move);
        let connected_msg = ServerMessage::Connected {
            seat,
            match_id: self.match_id,
            fen: self.fen.clone(),
            white_ms_remaining: white_ms,
            black_ms_remaining: black_ms,
            history: self.history.clone(),
            threefold_available: self.threefold_available,
            white_connected: self.white_connected,
            black_connected: self.black_connected,
            white_username: self.white_username.clone(),
            black_username: self.black_username.clone(),
            ms_until_disconnect_claim: self
                .ms_until_disconnect_claim(Seat::White)
                .or_else(|| self.ms_until_disconnect_claim(Seat::Black)),
        };
        send_to(&outbound, &connected_msg);

        self.seat_clients_mut(seat).insert(connection_id, ConnectedClient { outbound });

        match seat {
            Seat::White => {
                self.white_connected = true;
                self.white_disconnect_deadline = None;
            }
            Seat::Black => {
                self.black_connected = true;
                self.black_disconnect_deadline = None;
            }
            Seat::Spectator => {}
        }
        if seat != Seat::Spectator {
            self.broadcast(&ServerMessage::ConnectionStatus { seat, connected: true, ms_until_timeout: None });
        }
        let _ = ready.send(());
    }

    fn handle_unregister(&mut self, connection_id: Uuid) {
        let was_white = self.white_clients.remove(&connection_id).is_some();
        let was_black = self.black_clients.remove(&connection_id).is_some();
        self.spectators.remove(&connection_id);

        if was_white && self.white_clients.is_empty() {
            self.white_connected = false;
            if !self.game_ended {
                self.white_disconnect_deadline = Some(std::time::Instant::now() + DISCONNECT_CLAIM_GRACE);
            }
            self.broadcast(&ServerMessage::ConnectionStatus {
                seat: Seat::White,
                connected: false,
                ms_until_timeout: Some(DISCONNECT_CLAIM_GRACE.as_millis() as i64),
            });
        }
        if was_black && self.black_clients.is_empty() {
            self.black_connected = false;
            if !self.game_ended {
                self.black_disconnect_deadline = Some(std::time::Instant::now() + DISCONNECT_CLAIM_GRACE);
            }
            self.broadcast(&ServerMessage::ConnectionStatus {
                seat: Seat::Black,
                connected: false,
                ms_until_timeout: Some(DISCONNECT_CLAIM_GRACE.as_millis() as i64),
            });
        }
    }

    fn handle_action(&mut self, connection_id: Uuid, seat_color: Color, action: ClientAction) {
        match action {
            ClientAction::Move { from, to, promotion } => {
                if self.game_ended {
                    return;
                }
                self.handle_move(seat_color, connection_id, &from, &to, promotion)
            }
            ClientAction::Event { kind } => {
                if self.game_ended {
                    self.reject(seat_color, connection_id, "match has ended");
                    return;
                }
                self.handle_event(seat_color, connection_id, kind)
            }
        }
    }

    fn reject(&self, seat_color: Color, connection_id: Uuid, reason: &str) {
        let clients = match seat_color {
            Color::White => &self.white_clients,
            Color::Black => &self.black_clients,
        };
        if let Some(client) = clients.get(&connection_id) {
            send_to(&client.outbound, &ServerMessage::ActionRejected { reason: reason.to_string() });
        }
    }

    /// Per spec §4.D: an invalid move (wrong turn, malformed squares, or
    /// illegal per the rules engine) is dropped silently rather than
    /// answered with a rejection message.
    fn handle_move(&mut self, mover: Color, _connection_id: Uuid, from: &str, to: &str, promotion: Option<char>) {
        if mover != self.side_to_move {
            return;
        }
        let (Some(from_sq), Some(to_sq)) = (Square::from_algebraic(from), Square::from_algebraic(to)) else {
            return;
        };

        let Some(pos) = rules::from_fen(&self.fen) else {
            log::error!("match {}: current fen is corrupt: {}", self.match_id, self.fen);
            return;
        };
        let legal = rules::legal_moves_for_piece(&pos, from_sq);
        if !legal.quiet.contains(&to_sq) && !legal.capture.contains(&to_sq) {
            return;
        }

        let Some(applied) = rules::apply_move(&self.fen, from_sq, to_sq, promotion) else {
            return;
        };

        self.clocks.apply_move(mover);
        self.pending_offer = None;
        self.fen = applied.fen.clone();
        self.side_to_move = mover.opponent();

        let next_pos = rules::from_fen(&self.fen).expect("apply_move always returns valid FEN");
        let key = next_pos.repetition_key();
        let count = {
            let entry = self.repetition.entry(key).or_insert(0);
            *entry += 1;
            *entry
        };
        self.threefold_available = count >= 3;

        self.history.push(MatchHistoryEntry {
            fen: applied.fen.clone(),
            last_move: Some((from_sq.0, to_sq.0)),
            algebraic_notation: applied.notation.clone(),
            white_ms_remaining: self.clocks.white_ms_remaining,
            black_ms_remaining: self.clocks.black_ms_remaining,
        });

        self.persist_snapshot();
        self.broadcast_move_state(Some(&applied.notation));

        if applied.status.is_terminal() {
            self.end_game(applied.status);
        }
    }

    fn handle_event(&mut self, actor: Color, connection_id: Uuid, kind: PlayerEventKind) {
        match kind {
            PlayerEventKind::Resign => {
                let status = match actor {
                    Color::White => TerminalStatus::WhiteResigned,
                    Color::Black => TerminalStatus::BlackResigned,
                };
                self.end_game(status);
            }
            PlayerEventKind::Disconnect => {
                // Bookkeeping no-op: the transport-level unregister is what
                // actually arms the disconnect-claim timer. An explicit
                // disconnect event lets a client announce an intentional
                // drop (e.g. tab close) ahead of the socket closing.
                log::info!("match {}: {:?} announced disconnect", self.match_id, actor);
            }
            PlayerEventKind::Abort => {
                // Accepted no-op per the Open Question resolution recorded
                // in DESIGN.md: aborts before a meaningful clock commitment
                // are logged but do not currently end the match.
                log::info!("match {}: {:?} requested abort", self.match_id, actor);
            }
            PlayerEventKind::ExtraTime => {
                log::info!("match {}: {:?} granted extra time (no-op)", self.match_id, actor);
            }
            PlayerEventKind::ThreefoldRepetitionClaim => {
                if actor == self.side_to_move {
                    self.reject(actor, connection_id, "only the side not to move may claim threefold repetition");
                    return;
                }
                if !self.threefold_available {
                    self.reject(actor, connection_id, "no threefold repetition to claim");
                    return;
                }
                self.end_game(TerminalStatus::ThreefoldRepetition);
            }
            PlayerEventKind::Takeback => self.offer_or_accept(actor, OfferKind::Takeback),
            PlayerEventKind::Draw => self.offer_or_accept(actor, OfferKind::Draw),
            PlayerEventKind::Rematch => self.offer_or_accept(actor, OfferKind::Rematch),
            PlayerEventKind::Decline => self.decline_offer(actor, connection_id),
        }
    }

    /// A `takeback`/`draw`/`rematch` event either opens a new offer or, if
    /// an identical one is already pending from the opponent, accepts it —
    /// per spec §4.D there is no separate accept message on the wire.
    fn offer_or_accept(&mut self, actor: Color, kind: OfferKind) {
        match &self.pending_offer {
            Some(offer) if offer.kind == kind && offer.offered_by != actor => {
                self.pending_offer = None;
                self.broadcast(&ServerMessage::OfferAccepted { kind });
                match kind {
                    OfferKind::Draw => self.end_game(TerminalStatus::Draw),
                    OfferKind::Takeback => self.apply_takeback(),
                    OfferKind::Rematch => {
                        // Rematch creation (a fresh match id, paired
                        // players) is the matchmaking service's job once it
                        // observes this past match; the hub only records
                        // the accepted intent.
                        log::info!("match {}: rematch accepted, awaiting new match creation", self.match_id);
                    }
                }
            }
            Some(_) => {
                // A different offer is already outstanding; the slot is
                // occupied until it's declined or accepted.
            }
            None => {
                self.pending_offer = Some(PendingOffer { kind, offered_by: actor });
                self.broadcast_to_opponent(actor, &ServerMessage::OpponentEvent {
                    kind: match kind {
                        OfferKind::Takeback => PlayerEventKind::Takeback,
                        OfferKind::Draw => PlayerEventKind::Draw,
                        OfferKind::Rematch => PlayerEventKind::Rematch,
                    },
                });
            }
        }
    }

    fn decline_offer(&mut self, decliner: Color, connection_id: Uuid) {
        let Some(offer) = self.pending_offer.take() else {
            self.reject(decliner, connection_id, "no offer pending");
            return;
        };
        self.broadcast(&ServerMessage::OfferDeclined { kind: offer.kind });
    }

    /// Rewinds history by one full move pair (or one ply if only one has
    /// been played), restoring the FEN, clocks, and repetition table to
    /// that point.
    fn apply_takeback(&mut self) {
        if self.history.len() <= 1 {
            return;
        }
        let target_len = if self.history.len() >= 3 { self.history.len() - 2 } else { 1 };
        let removed = self.history.split_off(target_len);
        for entry in &removed {
            if let Some(p) = rules::from_fen(&entry.fen) {
                let key = p.repetition_key();
                if let Some(count) = self.repetition.get_mut(&key) {
                    *count = count.saturating_sub(1);
                }
            }
        }
        let restored = self.history.last().expect("history never empties below 1");
        self.fen = restored.fen.clone();
        let timers_apply = self.history.len() > 1;
        self.clocks = Clocks::restore(
            restored.white_ms_remaining,
            restored.black_ms_remaining,
            self.time_control.increment_ms,
            rules::from_fen(&self.fen).expect("history FEN always valid").side_to_move,
            timers_apply,
        );
        self.side_to_move = rules::from_fen(&self.fen).expect("history FEN always valid").side_to_move;
        self.persist_snapshot();
        self.broadcast_move_state(None);
    }

    fn handle_flag(&mut self) {
        if self.game_ended || !self.clocks.has_flagged() {
            return;
        }
        let status = match self.side_to_move {
            Color::White => TerminalStatus::WhiteFlagged,
            Color::Black => TerminalStatus::BlackFlagged,
        };
        self.end_game(status);
    }

    fn handle_disconnect_deadlines(&mut self) {
        if self.game_ended {
            return;
        }
        let now = std::time::Instant::now();
        if self.white_disconnect_deadline.is_some_and(|d| now >= d) {
            self.end_game(TerminalStatus::WhiteDisconnected);
            return;
        }
        if self.black_disconnect_deadline.is_some_and(|d| now >= d) {
            self.end_game(TerminalStatus::BlackDisconnected);
        }
    }

    fn end_game(&mut self, status: TerminalStatus) {
        if self.game_ended {
            return;
        }
        self.game_ended = true;
        let side_to_move = self.side_to_move;
        let (result, reason) = crate::model::ResultReason::from_terminal(status, side_to_move);

        let match_id = self.match_id;
        let white_id = self.white_player_id;
        let black_id = self.black_player_id;
        let live = LiveMatch {
            match_id,
            white_player_id: white_id,
            black_player_id: black_id,
            white_username: self.white_username.clone(),
            black_username: self.black_username.clone(),
            last_move: self.history.last().and_then(|h| h.last_move),
            current_fen: self.fen.clone(),
            time_control: self.time_control,
            white_ms_remaining: self.clocks.white_ms_remaining,
            black_ms_remaining: self.clocks.black_ms_remaining,
            history: self.history.clone(),
            time_of_last_move_ms: now_ms(),
            average_rating: self.average_rating,
            started_at_ms: self.started_at_ms,
        };

        let (wait_on, blocks) = self.next_write_barrier();
        let queue = self.queue.clone();
        let finish_tx = self.finish_tx.clone();
        tokio::spawn(async move {
            let outcome = queue
                .submit(wait_on, Some(blocks), move |client| {
                    let live = live.clone();
                    async move { finish_and_rate(&client, &live, result, reason).await }
                })
                .await;
            match outcome {
                Ok((white_rating_delta, black_rating_delta)) => {
                    let _ = finish_tx.send(FinishResult {
                        result,
                        reason,
                        white_rating_delta,
                        black_rating_delta,
                    });
                }
                Err(e) => log::error!("failed to finish match {match_id}: {e}"),
            }
        });
    }

    fn broadcast_move_state(&mut self, notation: Option<&str>) {
        let (white_ms, black_ms) = self.clocks.snapshot(self.side_to_move);
        self.broadcast(&ServerMessage::MoveMade {
            fen: self.fen.clone(),
            notation: notation.unwrap_or_default().to_string(),
            white_ms_remaining: white_ms,
            black_ms_remaining: black_ms,
            is_terminal: false,
            threefold_available: self.threefold_available,
        });
    }

    fn broadcast(&mut self, msg: &ServerMessage) {
        broadcast_and_prune(&mut self.white_clients, msg);
        broadcast_and_prune(&mut self.black_clients, msg);
        broadcast_and_prune(&mut self.spectators, msg);
    }

    fn broadcast_to_opponent(&mut self, of: Color, msg: &ServerMessage) {
        match of.opponent() {
            Color::White => broadcast_and_prune(&mut self.white_clients, msg),
            Color::Black => broadcast_and_prune(&mut self.black_clients, msg),
        }
    }

    fn persist_snapshot(&mut self) {
        let live = LiveMatch {
            match_id: self.match_id,
            white_player_id: self.white_player_id,
            black_player_id: self.black_player_id,
            white_username: self.white_username.clone(),
            black_username: self.black_username.clone(),
            last_move: self.history.last().and_then(|h| h.last_move),
            current_fen: self.fen.clone(),
            time_control: self.time_control,
            white_ms_remaining: self.clocks.white_ms_remaining,
            black_ms_remaining: self.clocks.black_ms_remaining,
            history: self.history.clone(),
            time_of_last_move_ms: now_ms(),
            average_rating: self.average_rating,
            started_at_ms: self.started_at_ms,
        };
        let (wait_on, blocks) = self.next_write_barrier();
        self.queue.submit_fire_and_forget(wait_on, Some(blocks), move |client| async move {
            if let Err(e) = store::update_live_match(&client, &live).await {
                log::error!("failed to persist match {}: {e}", live.match_id);
            }
        });
    }
}

/// Sends a message to one client's outbound channel; a full or closed
/// channel is silently dropped here — pruning happens at the next
/// broadcast, matching the source's `sendMessageToAllClients` behavior of
/// closing a slow client rather than blocking the hub on it.
fn send_to(outbound: &mpsc::UnboundedSender<String>, msg: &ServerMessage) {
    let text = serde_json::to_string(msg).expect("ServerMessage always serializes");
    let _ = outbound.send(text);
}

fn broadcast_and_prune(clients: &mut HashMap<Uuid, ConnectedClient>, msg: &ServerMessage) {
    let text = serde_json::to_string(msg).expect("ServerMessage always serializes");
    clients.retain(|_, client| client.outbound.send(text.clone()).is_ok());
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Runs inside a persistence worker: computes both sides' Elo deltas,
/// applies them, and moves the match from live to past.
async fn finish_and_rate(
    client: &tokio_postgres::Client,
    live: &LiveMatch,
    result: crate::model::ResultCode,
    reason: ResultReason,
) -> Result<(i32, i32), GambitError> {
    use crate::model::{rating_delta, ResultCode};

    let white_ratings = store::fetch_ratings(client, live.white_player_id).await?;
    let black_ratings = store::fetch_ratings(client, live.black_player_id).await?;
    let bucket = UserRatings::bucket_for(live.time_control);
    let white_rating = white_ratings.get(bucket);
    let black_rating = black_ratings.get(bucket);

    let (white_score, black_score) = match result {
        ResultCode::White => (1.0, 0.0),
        ResultCode::Black => (0.0, 1.0),
        ResultCode::Draw => (0.5, 0.5),
    };
    let white_delta = rating_delta(white_rating, black_rating, white_score);
    let black_delta = rating_delta(black_rating, white_rating, black_score);

    store::apply_rating_delta(client, live.white_player_id, bucket, white_delta).await?;
    store::apply_rating_delta(client, live.black_player_id, bucket, black_delta).await?;

    store::finish_match(client, live, result, reason, white_delta, black_delta, now_ms()).await?;
    Ok((white_delta, black_delta))
}
