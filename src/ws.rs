//! WebSocket gateway for the fourline server.
//!
//! This module owns the real-time side of the protocol: one actor per
//! client connection, a central broadcaster that fans events out by
//! scope, and the asynchronous AI turn driver.
//!
//! ## Architecture
//!
//! - **`RoomBroadcaster`** — A singleton actor tracking every connected
//!   session and per-game room membership. A single `Publish` message
//!   covers all three fan-out scopes: the game room, every connected
//!   client, or exactly one private target.
//!
//! - **`WsSession`** — An actor representing a single WebSocket
//!   connection. Parses JSON events from the client, drives the session
//!   state machine through the registry, and forwards broadcaster frames
//!   back to its client.
//!
//! ## Client → Server events
//!
//! | Event                  | Fields                                              |
//! |------------------------|-----------------------------------------------------|
//! | `join_game`            | `game_id`, `player_name`                            |
//! | `make_move`            | `game_id`, `col`                                    |
//! | `reset_game`           | `game_id`                                           |
//! | `global_action`        | `game_id`, `action_type`, `payload`, `scope`, `sid?`|
//! | `private_action`       | `game_id`, `sid`, `payload`                         |
//! | `send_private_message` | `game_id`, `target_sid`, `message`, `sender_name`, `sender_sid` |
//!
//! ## Server → Client events
//!
//! Every frame is `{"event": "<name>", "data": {...}}`:
//! `player_assigned`, `player_joined`, `player_left`, `spectator_joined`,
//! `spectator_left`, `game_state`, `move_made`, `game_ended`,
//! `game_terminated`, `error`, relayed `global_action` / `private_action`,
//! and `private_message`.
//!
//! A `private`-scope relay is delivered only to its target. The sender's
//! own copy of an outgoing private message is rendered locally by the
//! sender's client; the router never echoes it back. This is a fixed
//! protocol rule, so server and client never disagree about who renders
//! what.

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::ai::AiPlayer;
use crate::api::AppState;
use crate::session::{Joined, Left};
use crate::types::{Difficulty, SessionError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How often the server sends a WebSocket ping frame to keep the
/// connection alive and detect stale clients.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum time the server waits for a pong response before
/// considering the connection dead.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before the AI answers, so its reply reads as a turn rather
/// than an instant echo.
const AI_MOVE_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Broadcast scopes
// ---------------------------------------------------------------------------

/// Fan-out target of a [`Publish`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every connection joined to the given game.
    Room(Uuid),
    /// Every connected client, room membership notwithstanding. Used
    /// for admin-style broadcasts; spectators of unrelated games
    /// receive these too.
    All,
    /// Exactly one target connection. The sender never receives an
    /// echo of its own private relay.
    Private(Uuid),
}

// ---------------------------------------------------------------------------
// Broadcaster messages (actor mailbox protocol)
// ---------------------------------------------------------------------------

/// Message sent by a `WsSession` to register itself with the broadcaster.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    /// The address of the connecting session.
    pub addr: Addr<WsSession>,
    /// Unique identifier for the connection.
    pub session_id: Uuid,
}

/// Message sent by a `WsSession` to unregister from the broadcaster.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    /// Unique identifier of the disconnecting connection.
    pub session_id: Uuid,
}

/// Message joining a connection to a game room.
#[derive(Message)]
#[rtype(result = "()")]
pub struct JoinRoom {
    /// The connection entering the room.
    pub session_id: Uuid,
    /// The game whose room to join.
    pub game_id: Uuid,
}

/// Message removing a connection from a game room.
#[derive(Message)]
#[rtype(result = "()")]
pub struct LeaveRoom {
    /// The connection leaving the room.
    pub session_id: Uuid,
    /// The game whose room to leave.
    pub game_id: Uuid,
}

/// An event to fan out to every connection the scope resolves to.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct Publish {
    /// Where to deliver.
    pub scope: Scope,
    /// The event name (e.g. "game_state", "move_made").
    pub event: String,
    /// The event payload, embedded as the `data` field.
    pub payload: serde_json::Value,
}

/// Internal message: deliver a text frame to a single `WsSession`.
#[derive(Message)]
#[rtype(result = "()")]
pub struct WsText(pub String);

// ---------------------------------------------------------------------------
// RoomBroadcaster — central fan-out hub (actor)
// ---------------------------------------------------------------------------

/// Singleton actor that tracks connections and room membership and
/// delivers scoped events.
#[derive(Default)]
pub struct RoomBroadcaster {
    /// Map of connection id → session actor address (all connections).
    sessions: HashMap<Uuid, Addr<WsSession>>,
    /// Map of game id → set of member connection ids.
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

impl RoomBroadcaster {
    /// Creates a new broadcaster with empty state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for RoomBroadcaster {
    type Context = Context<Self>;
}

impl Handler<Connect> for RoomBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self>) {
        log::debug!("WS session {} connected to broadcaster", msg.session_id);
        self.sessions.insert(msg.session_id, msg.addr);
    }
}

/// Removes the connection from every room and the connection registry.
impl Handler<Disconnect> for RoomBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Context<Self>) {
        log::debug!("WS session {} disconnected from broadcaster", msg.session_id);
        self.sessions.remove(&msg.session_id);

        for members in self.rooms.values_mut() {
            members.remove(&msg.session_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }
}

impl Handler<JoinRoom> for RoomBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: JoinRoom, _ctx: &mut Context<Self>) {
        log::debug!(
            "WS session {} joined room {}",
            msg.session_id,
            msg.game_id
        );
        self.rooms
            .entry(msg.game_id)
            .or_default()
            .insert(msg.session_id);
    }
}

impl Handler<LeaveRoom> for RoomBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: LeaveRoom, _ctx: &mut Context<Self>) {
        log::debug!("WS session {} left room {}", msg.session_id, msg.game_id);
        if let Some(members) = self.rooms.get_mut(&msg.game_id) {
            members.remove(&msg.session_id);
            if members.is_empty() {
                self.rooms.remove(&msg.game_id);
            }
        }
    }
}

/// Resolves a scope against current membership and delivers the frame.
impl Handler<Publish> for RoomBroadcaster {
    type Result = ();

    fn handle(&mut self, msg: Publish, _ctx: &mut Context<Self>) {
        let frame = event_json(&msg.event, &msg.payload);
        for sid in resolve_scope(&msg.scope, self.sessions.keys(), &self.rooms) {
            if let Some(addr) = self.sessions.get(&sid) {
                addr.do_send(WsText(frame.clone()));
            }
        }
    }
}

/// Resolves a scope to the connection ids that must receive the frame.
///
/// `Private` resolves to the target alone — never the sender — which is
/// what keeps private relays free of duplicate delivery.
fn resolve_scope<'a>(
    scope: &Scope,
    connected: impl Iterator<Item = &'a Uuid>,
    rooms: &HashMap<Uuid, HashSet<Uuid>>,
) -> Vec<Uuid> {
    match scope {
        Scope::Room(game_id) => rooms
            .get(game_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default(),
        Scope::All => connected.copied().collect(),
        Scope::Private(target) => vec![*target],
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Builds one outbound frame: `{"event": ..., "data": ...}`.
fn event_json(event: &str, data: &serde_json::Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

/// Builds an `error` frame with a stable code and a human message.
fn error_json(code: &str, message: &str) -> String {
    event_json("error", &json!({ "code": code, "message": message }))
}

/// Builds an `error` frame from a session error.
fn session_error_json(err: SessionError) -> String {
    error_json(err.code(), &err.to_string())
}

// ---------------------------------------------------------------------------
// Client → Server message type
// ---------------------------------------------------------------------------

/// A single JSON event received from a WebSocket client.
///
/// Uses `#[serde(default)]` on every optional field so clients only
/// supply what their event needs.
#[derive(Debug, Deserialize)]
struct WsClientMessage {
    /// The event to process.
    event: String,

    /// Game id (required by all game-scoped events).
    #[serde(default)]
    game_id: Option<String>,

    /// Display name (for `join_game`).
    #[serde(default)]
    player_name: Option<String>,

    /// Target column (for `make_move`).
    #[serde(default)]
    col: Option<i64>,

    /// Action label relayed by `global_action`.
    #[serde(default)]
    action_type: Option<String>,

    /// Opaque payload relayed by `global_action` / `private_action`.
    #[serde(default)]
    payload: Option<serde_json::Value>,

    /// Fan-out scope for `global_action`: "room" (default), "all", or
    /// "private".
    #[serde(default)]
    scope: Option<String>,

    /// Target connection id (for `private_action`, and `global_action`
    /// with the "private" scope).
    #[serde(default)]
    sid: Option<String>,

    /// Target connection id (for `send_private_message`).
    #[serde(default)]
    target_sid: Option<String>,

    /// Message text (for `send_private_message`).
    #[serde(default)]
    message: Option<String>,

    /// Sender display name echoed into the relayed frame.
    #[serde(default)]
    sender_name: Option<String>,

    /// Sender connection id echoed into the relayed frame.
    #[serde(default)]
    sender_sid: Option<String>,
}

// ---------------------------------------------------------------------------
// WsSession — per-connection actor
// ---------------------------------------------------------------------------

/// Actor representing a single WebSocket client connection.
///
/// Responsibilities:
/// - Parse incoming JSON events and drive the session state machine
/// - Report rejections to the offending client only
/// - Maintain a heartbeat (ping/pong) to detect stale connections
/// - Register/unregister with the `RoomBroadcaster`
/// - Turn a transport drop into a `leave()` through the session lock
pub struct WsSession {
    /// Unique identifier for this connection.
    id: Uuid,

    /// Display name, once the client has joined a game.
    name: Option<String>,

    /// The game this connection has joined, if any.
    game: Option<Uuid>,

    /// Timestamp of the last received pong (or initial connect time).
    last_heartbeat: Instant,

    /// Shared application state (contains the session registry).
    app_state: web::Data<AppState>,

    /// Address of the central broadcaster actor.
    broadcaster: Addr<RoomBroadcaster>,
}

impl WsSession {
    /// Creates a new WebSocket session.
    pub fn new(app_state: web::Data<AppState>, broadcaster: Addr<RoomBroadcaster>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            game: None,
            last_heartbeat: Instant::now(),
            app_state,
            broadcaster,
        }
    }

    /// Starts a periodic heartbeat check. If the client has not responded
    /// to a ping within `CLIENT_TIMEOUT`, the connection is closed.
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                log::warn!("WS session {} heartbeat timeout, disconnecting", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Publishes an event into this connection's game room.
    fn publish_room(&self, game_id: Uuid, event: &str, payload: serde_json::Value) {
        self.broadcaster.do_send(Publish {
            scope: Scope::Room(game_id),
            event: event.to_string(),
            payload,
        });
    }

    // -----------------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------------

    /// Top-level event dispatcher.
    fn handle_message(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let msg: WsClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                ctx.text(error_json("BAD_REQUEST", &format!("Invalid JSON: {}", e)));
                return;
            }
        };

        match msg.event.as_str() {
            "join_game" => self.handle_join_game(&msg, ctx),
            "make_move" => self.handle_make_move(&msg, ctx),
            "reset_game" => self.handle_reset_game(&msg, ctx),
            "global_action" => self.handle_global_action(&msg, ctx),
            "private_action" => self.handle_private_action(&msg, ctx),
            "send_private_message" => self.handle_private_message(&msg, ctx),
            other => {
                ctx.text(error_json(
                    "BAD_REQUEST",
                    &format!("Unknown event: '{}'", other),
                ));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers: field extraction
    // -----------------------------------------------------------------------

    /// Extracts and parses the `game_id` field. Returns
    /// `Err(response_string)` with a pre-built error frame if missing or
    /// invalid, so callers can return early.
    fn parse_game_id(&self, msg: &WsClientMessage) -> Result<Uuid, String> {
        let id_str = msg
            .game_id
            .as_deref()
            .ok_or_else(|| error_json("BAD_REQUEST", "Missing field: game_id"))?;
        Uuid::parse_str(id_str)
            .map_err(|_| error_json("BAD_REQUEST", &format!("Invalid game_id: {}", id_str)))
    }

    /// Parses a connection id out of an optional field.
    fn parse_sid(&self, value: Option<&str>, field: &str) -> Result<Uuid, String> {
        let raw = value.ok_or_else(|| {
            error_json("BAD_REQUEST", &format!("Missing field: {}", field))
        })?;
        Uuid::parse_str(raw)
            .map_err(|_| error_json("BAD_REQUEST", &format!("Invalid {}: {}", field, raw)))
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// Joins this connection to a game: a free seat if one is open,
    /// spectator otherwise. Announces the assignment privately, the
    /// arrival to the room, then rebroadcasts the canonical state.
    fn handle_join_game(&mut self, msg: &WsClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let game_id = match self.parse_game_id(msg) {
            Ok(id) => id,
            Err(e) => return ctx.text(e),
        };
        let player_name = msg
            .player_name
            .clone()
            .unwrap_or_else(|| "Anonymous".to_string());

        let Some(handle) = self.app_state.registry.get(&game_id) else {
            ctx.text(session_error_json(SessionError::SessionNotFound));
            return;
        };

        let (joined, humans, spectators, state) = {
            let mut session = handle.lock().unwrap();
            let joined = session.join(self.id, &player_name);
            (
                joined,
                session.human_count(),
                session.spectator_count(),
                session.to_state_json(),
            )
        };

        self.name = Some(player_name.clone());
        self.game = Some(game_id);
        self.broadcaster.do_send(JoinRoom {
            session_id: self.id,
            game_id,
        });

        match joined {
            Joined::Player(number) => {
                log::info!(
                    "session {}: {} joined as player {}",
                    game_id,
                    player_name,
                    number
                );
                ctx.text(event_json(
                    "player_assigned",
                    &json!({
                        "player_number": u8::from(number),
                        "name": player_name,
                        "sid": self.id.to_string(),
                        "role": "player",
                    }),
                ));
                self.publish_room(
                    game_id,
                    "player_joined",
                    json!({
                        "player_name": player_name,
                        "player_number": u8::from(number),
                        "players_count": humans,
                        "spectators_count": spectators,
                    }),
                );
            }
            Joined::Spectator => {
                log::info!("session {}: {} joined as spectator", game_id, player_name);
                ctx.text(event_json(
                    "player_assigned",
                    &json!({
                        "player_number": serde_json::Value::Null,
                        "name": player_name,
                        "sid": self.id.to_string(),
                        "role": "spectator",
                    }),
                ));
                self.publish_room(
                    game_id,
                    "spectator_joined",
                    json!({
                        "spectator_name": player_name,
                        "players_count": humans,
                        "spectators_count": spectators,
                    }),
                );
            }
        }

        self.publish_room(
            game_id,
            "game_state",
            serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
        );
    }

    /// Applies a move for this connection. A rejection goes back to this
    /// client alone; an accepted move broadcasts a `move_made` delta and
    /// the canonical state, then hands the turn to the AI if it holds
    /// the next seat.
    fn handle_make_move(&mut self, msg: &WsClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let game_id = match self.parse_game_id(msg) {
            Ok(id) => id,
            Err(e) => return ctx.text(e),
        };
        let Some(raw_col) = msg.col else {
            ctx.text(error_json("BAD_REQUEST", "Missing field: col"));
            return;
        };
        let Ok(col) = usize::try_from(raw_col) else {
            ctx.text(session_error_json(SessionError::InvalidColumn));
            return;
        };

        let Some(handle) = self.app_state.registry.get(&game_id) else {
            ctx.text(session_error_json(SessionError::SessionNotFound));
            return;
        };

        let result = {
            let mut session = handle.lock().unwrap();
            session.apply_move(self.id, col).map(|applied| {
                (
                    json!({
                        "player": u8::from(applied.record.player),
                        "column": applied.record.column,
                        "row": applied.record.row,
                        "player_name": applied.player_name,
                    }),
                    session.to_state_json(),
                    session.ai_to_move(),
                )
            })
        };

        match result {
            Ok((move_payload, state, ai_next)) => {
                log::info!(
                    "session {}: move in column {} accepted from {}",
                    game_id,
                    col,
                    self.id
                );
                self.publish_room(game_id, "move_made", move_payload);
                self.publish_room(
                    game_id,
                    "game_state",
                    serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
                );
                if let Some((difficulty, generation)) = ai_next {
                    schedule_ai_turn(
                        self.app_state.clone(),
                        self.broadcaster.clone(),
                        game_id,
                        difficulty,
                        generation,
                    );
                }
            }
            Err(err) => {
                log::warn!(
                    "session {}: move in column {} rejected ({}) for {}",
                    game_id,
                    col,
                    err.code(),
                    self.id
                );
                ctx.text(session_error_json(err));
            }
        }
    }

    /// Starts a new game on the same session; the score survives.
    fn handle_reset_game(&mut self, msg: &WsClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let game_id = match self.parse_game_id(msg) {
            Ok(id) => id,
            Err(e) => return ctx.text(e),
        };
        let Some(handle) = self.app_state.registry.get(&game_id) else {
            ctx.text(session_error_json(SessionError::SessionNotFound));
            return;
        };

        let state = {
            let mut session = handle.lock().unwrap();
            session.reset();
            session.to_state_json()
        };

        log::info!("session {}: reset by {}", game_id, self.id);
        self.publish_room(
            game_id,
            "game_state",
            serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
        );
    }

    /// Relays an application-defined action to the requested scope:
    /// the game room (default), every connected client, or one private
    /// target.
    fn handle_global_action(&mut self, msg: &WsClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let game_id = match self.parse_game_id(msg) {
            Ok(id) => id,
            Err(e) => return ctx.text(e),
        };

        let scope_str = msg.scope.as_deref().unwrap_or("room");
        let scope = match scope_str {
            "all" => Scope::All,
            "private" => match self.parse_sid(msg.sid.as_deref(), "sid") {
                Ok(target) => Scope::Private(target),
                Err(e) => return ctx.text(e),
            },
            _ => Scope::Room(game_id),
        };

        let payload = json!({
            "game_id": game_id.to_string(),
            "action_type": msg.action_type,
            "payload": msg.payload,
            "scope": scope_str,
            "sender_sid": self.id.to_string(),
            "sender_name": self.name,
        });

        log::debug!(
            "session {}: global_action '{}' relayed with scope {}",
            game_id,
            msg.action_type.as_deref().unwrap_or(""),
            scope_str
        );
        self.broadcaster.do_send(Publish {
            scope,
            event: "global_action".to_string(),
            payload,
        });
    }

    /// Relays an application-defined action to exactly one target.
    fn handle_private_action(&mut self, msg: &WsClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let game_id = match self.parse_game_id(msg) {
            Ok(id) => id,
            Err(e) => return ctx.text(e),
        };
        let target = match self.parse_sid(msg.sid.as_deref(), "sid") {
            Ok(target) => target,
            Err(e) => return ctx.text(e),
        };

        self.broadcaster.do_send(Publish {
            scope: Scope::Private(target),
            event: "private_action".to_string(),
            payload: json!({
                "game_id": game_id.to_string(),
                "payload": msg.payload,
                "sender_sid": self.id.to_string(),
                "sender_name": self.name,
            }),
        });
    }

    /// Relays a private chat message to its target only. The sender's
    /// client renders its own copy; no server echo.
    fn handle_private_message(&mut self, msg: &WsClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        if let Err(e) = self.parse_game_id(msg) {
            ctx.text(e);
            return;
        }
        let target = match self.parse_sid(msg.target_sid.as_deref(), "target_sid") {
            Ok(target) => target,
            Err(e) => return ctx.text(e),
        };
        let Some(message) = msg.message.clone() else {
            ctx.text(error_json("BAD_REQUEST", "Missing field: message"));
            return;
        };

        let sender_name = msg
            .sender_name
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| "Anonymous".to_string());
        let sender_sid = msg
            .sender_sid
            .clone()
            .unwrap_or_else(|| self.id.to_string());

        self.broadcaster.do_send(Publish {
            scope: Scope::Private(target),
            event: "private_message".to_string(),
            payload: json!({
                "sender_name": sender_name,
                "sender_sid": sender_sid,
                "message": message,
            }),
        });
    }

    // -----------------------------------------------------------------------
    // Disconnect handling
    // -----------------------------------------------------------------------

    /// Runs the `leave()` transition for a dropped transport.
    ///
    /// A seated player dropping out of a running human-vs-human game
    /// terminates the session and the room is told via `game_ended`; the
    /// registry entry is removed, so the id is not rejoinable. Leaving
    /// an AI session only frees the seat. Spectator departure updates
    /// the count.
    fn handle_departure(&mut self) {
        let Some(game_id) = self.game.take() else {
            return;
        };
        let Some(handle) = self.app_state.registry.get(&game_id) else {
            return;
        };

        let (left, humans, spectators) = {
            let mut session = handle.lock().unwrap();
            let left = session.leave(self.id);
            (left, session.human_count(), session.spectator_count())
        };

        match left {
            Left::Player {
                name,
                ends_session: true,
                ..
            } => {
                log::info!(
                    "session {}: player {} disconnected, terminating session",
                    game_id,
                    name
                );
                self.publish_room(
                    game_id,
                    "game_ended",
                    json!({
                        "reason": "player_left",
                        "message": format!("{} left the game. The game is over.", name),
                        "redirect": true,
                    }),
                );
                self.app_state.registry.remove(&game_id);
            }
            Left::Player {
                name,
                ends_session: false,
                ..
            } => {
                log::info!("session {}: player {} disconnected", game_id, name);
                self.publish_room(
                    game_id,
                    "player_left",
                    json!({
                        "player_name": name,
                        "players_count": humans,
                        "spectators_count": spectators,
                    }),
                );
            }
            Left::Spectator { name } => {
                self.publish_room(
                    game_id,
                    "spectator_left",
                    json!({
                        "spectator_name": name,
                        "players_count": humans,
                        "spectators_count": spectators,
                    }),
                );
            }
            Left::NotPresent => {}
        }

        self.broadcaster.do_send(LeaveRoom {
            session_id: self.id,
            game_id,
        });
    }
}

// ---------------------------------------------------------------------------
// AI turn driver
// ---------------------------------------------------------------------------

/// Kicks off one AI turn.
///
/// The computation runs on a board snapshot outside the session lock,
/// after a short think delay. The chosen column re-enters through the
/// serialized apply path guarded by `generation`: if the session was
/// reset or terminated in the meantime, the stale result is discarded
/// silently.
fn schedule_ai_turn(
    app_state: web::Data<AppState>,
    broadcaster: Addr<RoomBroadcaster>,
    game_id: Uuid,
    difficulty: Difficulty,
    generation: u64,
) {
    actix_web::rt::spawn(async move {
        actix_web::rt::time::sleep(AI_MOVE_DELAY).await;

        let Some(handle) = app_state.registry.get(&game_id) else {
            return;
        };

        let board = {
            let session = handle.lock().unwrap();
            if session.generation() != generation || session.is_over() {
                return;
            }
            session.board_snapshot()
        };

        let Some(col) = AiPlayer::new(difficulty).choose_move(&board) else {
            return;
        };

        let broadcastable = {
            let mut session = handle.lock().unwrap();
            match session.apply_ai_move(col, generation) {
                Ok(Some(applied)) => Some((
                    json!({
                        "player": u8::from(applied.record.player),
                        "column": applied.record.column,
                        "row": applied.record.row,
                        "player_name": applied.player_name,
                    }),
                    session.to_state_json(),
                )),
                Ok(None) => {
                    log::debug!("session {}: stale AI move discarded", game_id);
                    None
                }
                Err(err) => {
                    log::warn!("session {}: AI move rejected: {}", game_id, err);
                    None
                }
            }
        };

        if let Some((move_payload, state)) = broadcastable {
            log::info!("session {}: AI played column {}", game_id, col);
            broadcaster.do_send(Publish {
                scope: Scope::Room(game_id),
                event: "move_made".to_string(),
                payload: move_payload,
            });
            broadcaster.do_send(Publish {
                scope: Scope::Room(game_id),
                event: "game_state".to_string(),
                payload: serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
            });
        }
    });
}

// ---------------------------------------------------------------------------
// WsSession — Actor + StreamHandler implementation
// ---------------------------------------------------------------------------

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the session actor starts. Registers with the
    /// broadcaster and begins the heartbeat timer.
    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("WS session {} started", self.id);

        self.start_heartbeat(ctx);

        self.broadcaster.do_send(Connect {
            addr: ctx.address(),
            session_id: self.id,
        });
    }

    /// Called when the session actor stops. A transport drop lands here,
    /// so the `leave()` transition runs through the same serialized path
    /// as every other session mutation.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!("WS session {} stopped", self.id);

        self.handle_departure();
        self.broadcaster.do_send(Disconnect {
            session_id: self.id,
        });
    }
}

/// Handler for incoming WebSocket frames (text, binary, ping, pong, close).
impl actix::StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.handle_message(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                log::warn!("WS session {}: binary messages not supported", self.id);
                ctx.text(error_json(
                    "BAD_REQUEST",
                    "Binary messages are not supported. Please send JSON text.",
                ));
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                log::info!("WS session {} closed: {:?}", self.id, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                // Continuation frames are handled internally by actix
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                log::error!("WS session {} protocol error: {}", self.id, e);
                ctx.stop();
            }
        }
    }
}

/// Handler for broadcaster-pushed text frames.
impl Handler<WsText> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: WsText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

// ---------------------------------------------------------------------------
// HTTP → WebSocket upgrade handler
// ---------------------------------------------------------------------------

/// Upgrades an HTTP request to a WebSocket connection.
///
/// This is the entry point registered as a route. It creates a new
/// `WsSession` actor and starts the WebSocket handshake.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    broadcaster: web::Data<Addr<RoomBroadcaster>>,
) -> Result<HttpResponse, actix_web::Error> {
    let session = WsSession::new(app_state, broadcaster.get_ref().clone());
    log::info!("New WebSocket connection request from {:?}", req.peer_addr());
    ws::start(session, &req, stream)
}

// ---------------------------------------------------------------------------
// Broadcast helper for REST API handlers
// ---------------------------------------------------------------------------

/// Sends an event into a game room from outside the actor system. Used
/// by REST handlers (e.g. the admin force-terminate) so WebSocket
/// clients see state changes made over HTTP.
pub fn broadcast_room_event(
    broadcaster: &web::Data<Addr<RoomBroadcaster>>,
    game_id: Uuid,
    event: &str,
    data: &serde_json::Value,
) {
    broadcaster.do_send(Publish {
        scope: Scope::Room(game_id),
        event: event.to_string(),
        payload: data.clone(),
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_shape() {
        let frame = event_json("move_made", &json!({ "column": 3 }));
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "move_made");
        assert_eq!(value["data"]["column"], 3);
    }

    #[test]
    fn test_error_envelope_carries_code_and_message() {
        let frame = session_error_json(SessionError::NotYourTurn);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["code"], "NOT_YOUR_TURN");
        assert!(value["data"]["message"].as_str().unwrap().contains("turn"));
    }

    #[test]
    fn test_client_message_parses_with_missing_optionals() {
        let msg: WsClientMessage =
            serde_json::from_str(r#"{"event":"reset_game","game_id":"abc"}"#).unwrap();
        assert_eq!(msg.event, "reset_game");
        assert_eq!(msg.game_id.as_deref(), Some("abc"));
        assert!(msg.col.is_none());
        assert!(msg.scope.is_none());
    }

    #[test]
    fn test_room_scope_resolves_to_members_only() {
        let game = Uuid::new_v4();
        let member_a = Uuid::new_v4();
        let member_b = Uuid::new_v4();
        let outsider = Uuid::new_v4();

        let mut rooms = HashMap::new();
        rooms.insert(game, HashSet::from([member_a, member_b]));
        let connected = [member_a, member_b, outsider];

        let mut recipients = resolve_scope(&Scope::Room(game), connected.iter(), &rooms);
        recipients.sort();
        let mut expected = vec![member_a, member_b];
        expected.sort();
        assert_eq!(recipients, expected);
    }

    #[test]
    fn test_all_scope_reaches_every_connection() {
        let connected = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let recipients = resolve_scope(&Scope::All, connected.iter(), &HashMap::new());
        assert_eq!(recipients.len(), connected.len());
    }

    #[test]
    fn test_private_scope_targets_exactly_one_connection() {
        let game = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let target = Uuid::new_v4();

        let mut rooms = HashMap::new();
        rooms.insert(game, HashSet::from([sender, target]));
        let connected = [sender, target];

        // Delivery goes to the target alone; the sender renders its own
        // copy locally and must not receive an echo.
        let recipients = resolve_scope(&Scope::Private(target), connected.iter(), &rooms);
        assert_eq!(recipients, vec![target]);
    }

    #[test]
    fn test_unknown_room_resolves_to_nobody() {
        let connected: Vec<Uuid> = Vec::new();
        let recipients = resolve_scope(
            &Scope::Room(Uuid::new_v4()),
            connected.iter(),
            &HashMap::new(),
        );
        assert!(recipients.is_empty());
    }
}
