//! Per-connection WebSocket bridge between a client socket and a running
//! hub, per spec §4.F.
//!
//! Grounded on the teacher's `ws.rs` for the actor shape (`actix::Actor` +
//! `actix_web_actors::ws::WebsocketContext`, heartbeat via
//! `ctx.run_interval`, a `Handler<T>` impl used to push text frames the
//! actor didn't originate itself) and on the source's
//! `matchRoomWebSocketClient.go` for the connection semantics it
//! generalizes: a seat identifier assigned at connect time (white/black/
//! spectator, replacing the source's leading identifier byte — JSON framing
//! here carries that information in the `Connected` message instead), a
//! bounded read size, and ping/pong liveness. `frame size` coalescing (the
//! source's `writePump` joining queued frames with newlines into one
//! websocket frame) is unnecessary here since every hub broadcast is already
//! one JSON value per frame and actix's per-message `ctx.text` call has no
//! equivalent backpressure cost to amortize.

use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::api::PlayerIdentity;
use crate::hub::manager::HubManager;
use crate::hub::messages::{ClientAction, Seat};
use crate::hub::RegisterClient;
use crate::rules::position::Color;

/// Writer ping period and reader pong deadline, per spec §5 "Timeouts":
/// writer ping period ~18s, per-connection read/pong deadline ~20s.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(18);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Matches the source's `readPump`'s `SetReadLimit(512)` — an inbound frame
/// larger than this is a protocol violation, not a legitimate long message
/// (every inbound frame is a short move or event request).
const MAX_INBOUND_MESSAGE_BYTES: usize = 4096;

/// A text frame pushed into this session from outside the actor's own
/// `StreamHandler` (i.e. from the hub, via the forwarding task spawned in
/// [`MatchSocket::started`]).
struct Outbound(String);

impl Message for Outbound {
    type Result = ();
}

/// Delivered once, from the registration task back into the actor, once the
/// hub has told us which seat this connection actually holds.
struct SeatAssigned(Seat);

impl Message for SeatAssigned {
    type Result = ();
}

impl Handler<SeatAssigned> for MatchSocket {
    type Result = ();

    fn handle(&mut self, msg: SeatAssigned, _ctx: &mut Self::Context) {
        self.seat = msg.0;
    }
}

pub struct MatchSocket {
    connection_id: Uuid,
    match_id: i64,
    /// The authenticated player id behind this connection, or `None` for a
    /// spectator. The actual seat (white/black/spectator) is derived from
    /// this against the match's real white/black ids once the hub is known
    /// — never trusted from anything the client sends directly — per spec
    /// §4.F.
    player_id: Option<i64>,
    /// Filled in once [`Self::started`]'s lookup resolves; `Spectator`
    /// until then (there is no connection to misattribute in that window).
    seat: Seat,
    hub_manager: std::sync::Arc<HubManager>,
    last_heartbeat: Instant,
}

impl MatchSocket {
    pub fn new(match_id: i64, player_id: Option<i64>, hub_manager: std::sync::Arc<HubManager>) -> Self {
        MatchSocket {
            connection_id: Uuid::new_v4(),
            match_id,
            player_id,
            seat: Seat::Spectator,
            hub_manager,
            last_heartbeat: Instant::now(),
        }
    }

    /// Fires an unregister at whatever hub is (or becomes) responsible for
    /// this match, used both on an explicit heartbeat timeout and on normal
    /// actor shutdown. Best-effort: if the hub never existed there is
    /// nothing to unregister from.
    fn unregister(&self) {
        let hub_manager = self.hub_manager.clone();
        let match_id = self.match_id;
        let connection_id = self.connection_id;
        actix::spawn(async move {
            if let Ok(hub) = hub_manager.get_or_create(match_id).await {
                hub.unregister(connection_id);
            }
        });
    }

    fn seat_color(&self) -> Option<Color> {
        match self.seat {
            Seat::White => Some(Color::White),
            Seat::Black => Some(Color::Black),
            Seat::Spectator => None,
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                log::warn!("match {} connection {} timed out, dropping", act.match_id, act.connection_id);
                act.unregister();
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for MatchSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);

        let hub_manager = self.hub_manager.clone();
        let match_id = self.match_id;
        let connection_id = self.connection_id;
        let player_id = self.player_id;
        let addr = ctx.address();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (ready_tx, ready_rx) = oneshot::channel();

        actix::spawn(async move {
            let hub = match hub_manager.get_or_create(match_id).await {
                Ok(hub) => hub,
                Err(e) => {
                    log::error!("match {match_id}: failed to attach connection: {e}");
                    addr.do_send(Outbound(
                        serde_json::json!({"type": "action_rejected", "reason": e.to_string()}).to_string(),
                    ));
                    return;
                }
            };
            // Derived from the match's real white/black ids, never from
            // anything the client asserted, per spec §4.F.
            let seat = hub.seat_for(player_id);
            addr.do_send(SeatAssigned(seat));

            hub.register(RegisterClient { connection_id, seat, outbound: outbound_tx, ready: ready_tx });
            let _ = ready_rx.await;

            while let Some(text) = outbound_rx.recv().await {
                addr.do_send(Outbound(text));
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.unregister();
    }
}

impl Handler<Outbound> for MatchSocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MatchSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                if text.len() > MAX_INBOUND_MESSAGE_BYTES {
                    log::warn!("match {} connection {}: oversized frame dropped", self.match_id, self.connection_id);
                    return;
                }
                self.dispatch_inbound(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                log::warn!("match {} connection {}: binary frames unsupported", self.match_id, self.connection_id);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                log::error!("match {} connection {}: protocol error: {e}", self.match_id, self.connection_id);
                ctx.stop();
            }
        }
    }
}

impl MatchSocket {
    fn dispatch_inbound(&mut self, text: &str, _ctx: &mut ws::WebsocketContext<Self>) {
        let Some(color) = self.seat_color() else {
            log::debug!("spectator connection sent an action, ignoring");
            return;
        };
        let action: ClientAction = match serde_json::from_str(text) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("match {} connection {}: malformed action: {e}", self.match_id, self.connection_id);
                return;
            }
        };

        let hub_manager = self.hub_manager.clone();
        let match_id = self.match_id;
        let connection_id = self.connection_id;
        actix::spawn(async move {
            match hub_manager.get_or_create(match_id).await {
                Ok(hub) => hub.submit_action(connection_id, color, action),
                Err(e) => log::error!("match {match_id}: action dropped, no hub: {e}"),
            }
        });
    }
}

/// `GET /matchroom/{matchID}/ws` — upgrades to a WebSocket connection and
/// attaches it to the match's hub, creating the hub if this is the first
/// connection to reach it. Per spec §4.F/§6, the identifier byte (here, the
/// [`Seat`]) is derived server-side from the caller's authenticated
/// [`PlayerIdentity`] against the match's actual white/black ids — never
/// taken from anything the client presents directly; a caller with no
/// session, or one that isn't seated in this match, connects as a
/// spectator.
pub async fn match_room_ws(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<i64>,
    identity: PlayerIdentity,
    hub_manager: web::Data<std::sync::Arc<HubManager>>,
) -> Result<HttpResponse, actix_web::Error> {
    let match_id = path.into_inner();
    let socket = MatchSocket::new(match_id, identity.0, hub_manager.get_ref().clone());
    ws::start(socket, &req, stream)
}
