//! Session state management for the fourline server.
//!
//! This module owns the authoritative state of one match: the board,
//! seat assignment, turn, move history, terminal state, and the score
//! accumulated across resets. It also provides the `SessionRegistry`
//! that maps opaque session ids to live sessions.
//!
//! Concurrency model: every session lives behind its own `Mutex`, so
//! joins, leaves, moves, resets, and forced terminations for one session
//! are serialized while other sessions stay untouched. The registry's
//! own map uses a separate, coarse lock that is only held for the
//! structural operation itself — never while a session lock is taken.

use crate::rules;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::ToSchema;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Session operations — result types
// ---------------------------------------------------------------------------

/// How a connection entered the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joined {
    /// Took a free seat.
    Player(PlayerNum),
    /// Both seats taken — admitted read-only.
    Spectator,
}

/// What happened when a connection left the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Left {
    /// A seated player left.
    Player {
        /// The departing player's display name.
        name: String,
        /// The seat they held.
        number: PlayerNum,
        /// `true` when the departure terminated the session (a
        /// human-vs-human game that was still running). The caller is
        /// expected to broadcast `game_ended` and drop the registry
        /// entry.
        ends_session: bool,
    },
    /// A spectator left.
    Spectator {
        /// The departing spectator's display name.
        name: String,
    },
    /// The connection was not part of this session.
    NotPresent,
}

/// A successfully applied move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveApplied {
    /// The recorded move.
    pub record: MoveRecord,
    /// Set when this move ended the game.
    pub outcome: Option<Outcome>,
    /// Display name of the mover, for the `move_made` delta.
    pub player_name: String,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One match instance: board, seats, spectators, turn, history, terminal
/// state, and score.
///
/// Game state is only mutable through the operation set below, and
/// callers reach that through the per-session lock handed out by the
/// registry.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque session id.
    pub id: Uuid,

    /// The grid.
    board: Board,

    /// The two player slots. Index 0 is player 1. An AI session has
    /// `Seat::Ai` fixed in slot 2 from creation.
    seats: [Option<Seat>; 2],

    /// Spectator display names keyed by connection id.
    spectators: HashMap<Uuid, String>,

    /// Whose turn it is. Player 1 always starts.
    current_player: PlayerNum,

    /// Every accepted move, in order.
    history: Vec<MoveRecord>,

    /// Whether the game has ended (win, draw, or termination).
    game_over: bool,

    /// Win/draw result. Stays `None` on termination.
    winner: Option<Outcome>,

    /// Win/draw tally across resets.
    score: Score,

    /// Bumped on every reset or termination; stale asynchronous results
    /// (AI moves) carry the generation they were issued under and are
    /// discarded when it no longer matches.
    generation: u64,

    /// Unix timestamp of session creation.
    pub created_at: u64,
}

impl Session {
    /// Creates a fresh session waiting for players. Passing a difficulty
    /// seats the AI in slot 2.
    pub fn new(id: Uuid, ai: Option<Difficulty>) -> Self {
        Self {
            id,
            board: Board::new(),
            seats: [None, ai.map(|difficulty| Seat::Ai { difficulty })],
            spectators: HashMap::new(),
            current_player: PlayerNum::One,
            history: Vec::new(),
            game_over: false,
            winner: None,
            score: Score::default(),
            generation: 0,
            created_at: unix_timestamp(),
        }
    }

    /// Returns `true` if slot 2 is the AI.
    pub fn is_ai_enabled(&self) -> bool {
        matches!(self.seats[1], Some(Seat::Ai { .. }))
    }

    /// Returns `true` once the game has ended.
    pub fn is_over(&self) -> bool {
        self.game_over
    }

    /// The win/draw result, if the game ended in one.
    pub fn winner(&self) -> Option<Outcome> {
        self.winner
    }

    /// Whose turn it is.
    pub fn current_player(&self) -> PlayerNum {
        self.current_player
    }

    /// The accepted moves so far.
    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    /// The score accumulated across resets.
    pub fn score(&self) -> Score {
        self.score
    }

    /// The current generation; capture it before kicking off an
    /// asynchronous computation whose result will re-enter later.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A clone of the board, for AI computation outside the lock.
    pub fn board_snapshot(&self) -> Board {
        self.board.clone()
    }

    /// The piece at `(row, col)`, if any.
    pub fn cell(&self, row: usize, col: usize) -> Option<PlayerNum> {
        self.board.get(row, col)
    }

    /// Number of occupied seats (the AI counts).
    pub fn player_count(&self) -> usize {
        self.seats.iter().flatten().count()
    }

    /// Number of seated humans.
    pub fn human_count(&self) -> usize {
        self.seats
            .iter()
            .flatten()
            .filter(|seat| !seat.is_ai())
            .count()
    }

    /// Number of spectators.
    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    /// Returns the seat number held by a connection, if any.
    pub fn seat_of(&self, sid: Uuid) -> Option<PlayerNum> {
        self.seats.iter().position(|seat| {
            seat.as_ref().and_then(Seat::sid) == Some(sid)
        })
        .map(PlayerNum::from_index)
    }

    /// Admits a connection: the lowest free seat if one is open (1
    /// before 2), spectator otherwise. Joining twice returns the seat
    /// already held.
    pub fn join(&mut self, sid: Uuid, name: &str) -> Joined {
        if let Some(number) = self.seat_of(sid) {
            return Joined::Player(number);
        }
        for index in 0..2 {
            if self.seats[index].is_none() {
                self.seats[index] = Some(Seat::Human {
                    sid,
                    name: name.to_string(),
                });
                return Joined::Player(PlayerNum::from_index(index));
            }
        }
        self.spectators.insert(sid, name.to_string());
        Joined::Spectator
    }

    /// Removes a connection from the session.
    ///
    /// A seated player leaving a running human-vs-human game terminates
    /// the session; leaving an AI session just frees the seat so the id
    /// stays joinable. Spectator departure only shrinks the count.
    pub fn leave(&mut self, sid: Uuid) -> Left {
        for index in 0..2 {
            if self.seats[index].as_ref().and_then(Seat::sid) == Some(sid) {
                let seat = self.seats[index].take().expect("seat checked above");
                let ends_session = !self.is_ai_enabled() && !self.game_over;
                if ends_session {
                    self.terminate();
                }
                return Left::Player {
                    name: seat.name().to_string(),
                    number: PlayerNum::from_index(index),
                    ends_session,
                };
            }
        }
        match self.spectators.remove(&sid) {
            Some(name) => Left::Spectator { name },
            None => Left::NotPresent,
        }
    }

    /// Applies a move submitted by a connection.
    ///
    /// Validation order: both seats filled, game still running, sender
    /// holds a seat, it is the sender's turn, column in range, column
    /// not full. Rejections leave the session untouched.
    pub fn apply_move(&mut self, sid: Uuid, col: usize) -> Result<MoveApplied, SessionError> {
        if self.seats.iter().any(Option::is_none) {
            return Err(SessionError::WaitingPlayers);
        }
        if self.game_over {
            return Err(SessionError::GameOver);
        }
        let number = self.seat_of(sid).ok_or(SessionError::SpectatorForbidden)?;
        if number != self.current_player {
            return Err(SessionError::NotYourTurn);
        }
        self.commit_drop(number, col)
    }

    /// Applies an asynchronously computed AI move.
    ///
    /// The result re-enters through the same serialized path as human
    /// moves, guarded by the generation captured when the computation
    /// started. A stale generation — the session was reset or terminated
    /// in the meantime — or a turn that is no longer the AI's yields
    /// `Ok(None)`: the result is discarded with no error and no
    /// mutation.
    pub fn apply_ai_move(
        &mut self,
        col: usize,
        generation: u64,
    ) -> Result<Option<MoveApplied>, SessionError> {
        if generation != self.generation || self.game_over {
            return Ok(None);
        }
        let current = &self.seats[self.current_player.index()];
        if !current.as_ref().is_some_and(Seat::is_ai) {
            return Ok(None);
        }
        self.commit_drop(self.current_player, col).map(Some)
    }

    /// Drops a piece for `player`, records the move, and runs the
    /// terminal checks anchored at the landing cell.
    fn commit_drop(
        &mut self,
        player: PlayerNum,
        col: usize,
    ) -> Result<MoveApplied, SessionError> {
        if col >= COLS {
            return Err(SessionError::InvalidColumn);
        }
        if rules::landing_row(&self.board, col).is_none() {
            return Err(SessionError::ColumnFull);
        }

        let row = self
            .board
            .drop_into(col, player)
            .expect("column checked non-full above");
        let record = MoveRecord {
            player,
            column: col,
            row,
            index: self.history.len(),
        };
        self.history.push(record);

        let outcome = if rules::has_win(&self.board, row, col, player) {
            Some(Outcome::Win(player))
        } else if self.board.is_full() {
            Some(Outcome::Draw)
        } else {
            None
        };

        match outcome {
            Some(result) => {
                self.game_over = true;
                self.winner = Some(result);
                self.score.record(result);
                log::info!("session {}: game over, {}", self.id, result);
            }
            None => {
                self.current_player = self.current_player.opponent();
            }
        }

        Ok(MoveApplied {
            record,
            outcome,
            player_name: self.seat_name(player),
        })
    }

    /// Display name of the occupant of `player`'s seat.
    pub fn seat_name(&self, player: PlayerNum) -> String {
        self.seats[player.index()]
            .as_ref()
            .map(|seat| seat.name().to_string())
            .unwrap_or_default()
    }

    /// If the game is running and the seat on turn is the AI, returns
    /// its difficulty and the generation to guard the computation with.
    pub fn ai_to_move(&self) -> Option<(Difficulty, u64)> {
        if self.game_over {
            return None;
        }
        match &self.seats[self.current_player.index()] {
            Some(Seat::Ai { difficulty }) => Some((*difficulty, self.generation)),
            _ => None,
        }
    }

    /// Starts a new game on the same session: clears board, history,
    /// and terminal state; player 1 starts. Seats and score survive.
    /// Pending asynchronous results die with the generation bump.
    pub fn reset(&mut self) {
        self.board = Board::new();
        self.history.clear();
        self.current_player = PlayerNum::One;
        self.game_over = false;
        self.winner = None;
        self.generation += 1;
    }

    /// Marks the session over without a winner (player departure or
    /// admin force-terminate). The generation bump cancels the effect of
    /// any in-flight AI computation.
    pub fn terminate(&mut self) {
        self.game_over = true;
        self.generation += 1;
    }

    /// Builds the canonical `game_state` snapshot for broadcasting.
    pub fn to_state_json(&self) -> GameStateJson {
        let mut players = HashMap::new();
        for (index, seat) in self.seats.iter().enumerate() {
            if let Some(Seat::Human { sid, name }) = seat {
                players.insert(
                    sid.to_string(),
                    PlayerPublic {
                        number: PlayerNum::from_index(index),
                        name: name.clone(),
                        sid: sid.to_string(),
                    },
                );
            }
        }
        let spectators = self
            .spectators
            .iter()
            .map(|(sid, name)| {
                (
                    sid.to_string(),
                    SpectatorPublic {
                        name: name.clone(),
                        sid: sid.to_string(),
                    },
                )
            })
            .collect();

        GameStateJson {
            board: self.board.to_rows(),
            players,
            spectators,
            current_player: self.current_player,
            game_over: self.game_over,
            winner: self.winner,
            ai_enabled: self.is_ai_enabled(),
            global_score: self.score,
        }
    }

    /// Builds the admin introspection summary.
    pub fn overview(&self) -> SessionOverview {
        let players = self
            .seats
            .iter()
            .enumerate()
            .filter_map(|(index, seat)| {
                seat.as_ref().map(|seat| SeatOverview {
                    name: seat.name().to_string(),
                    number: PlayerNum::from_index(index),
                })
            })
            .collect();

        SessionOverview {
            game_id: self.id.to_string(),
            players,
            players_count: self.player_count(),
            spectators_count: self.spectator_count(),
            current_player: self.current_player,
            game_over: self.game_over,
            ai_enabled: self.is_ai_enabled(),
            moves_count: self.history.len(),
            created_at: self.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Session registry
// ---------------------------------------------------------------------------

/// Maps opaque session ids to live sessions.
///
/// The internal map lock is coarse but short-held: lookups clone the
/// `Arc` out and release it, so one session's activity never blocks
/// another's.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a fresh session and returns its id.
    pub fn create(&self, ai: Option<Difficulty>) -> Uuid {
        let id = Uuid::new_v4();
        self.create_with_id(id, ai);
        id
    }

    /// Creates a session under a caller-chosen id.
    pub fn create_with_id(&self, id: Uuid, ai: Option<Difficulty>) {
        let session = Arc::new(Mutex::new(Session::new(id, ai)));
        self.sessions.lock().unwrap().insert(id, session);
    }

    /// Returns a handle to a session, if it exists.
    pub fn get(&self, id: &Uuid) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    /// Removes a session. Returns `false` if the id was unknown.
    pub fn remove(&self, id: &Uuid) -> bool {
        self.sessions.lock().unwrap().remove(id).is_some()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Returns `true` if no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Admin introspection over every live session. The registry lock is
    /// released before any session lock is taken.
    pub fn overviews(&self) -> Vec<SessionOverview> {
        let handles: Vec<Arc<Mutex<Session>>> = {
            let sessions = self.sessions.lock().unwrap();
            sessions.values().cloned().collect()
        };
        handles
            .iter()
            .map(|handle| handle.lock().unwrap().overview())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// REST request/response types
// ---------------------------------------------------------------------------

/// Response returned when a new session is created.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateGameResponse {
    /// The id to join the game under.
    pub game_id: String,
}

/// Request body for creating an AI session.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateAiGameRequest {
    /// AI strength; defaults to medium.
    #[serde(default)]
    pub difficulty: Difficulty,
}

/// Response returned when a new AI session is created.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateAiGameResponse {
    /// The id to join the game under.
    pub game_id: String,
    /// The difficulty the AI was seated with.
    pub difficulty: Difficulty,
}

/// Admin listing of live sessions.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActiveGamesResponse {
    /// One overview per live session.
    pub active_games: Vec<SessionOverview>,
    /// Number of live sessions.
    pub count: usize,
}

/// Error response for the REST API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
}

// ---------------------------------------------------------------------------
// Utility: current unix timestamp
// ---------------------------------------------------------------------------

/// Returns the current Unix timestamp in seconds.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn human_session() -> (Session, Uuid, Uuid) {
        let mut session = Session::new(Uuid::new_v4(), None);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(session.join(a, "Alice"), Joined::Player(PlayerNum::One));
        assert_eq!(session.join(b, "Bob"), Joined::Player(PlayerNum::Two));
        (session, a, b)
    }

    #[test]
    fn test_join_assigns_lowest_free_seat_then_spectator() {
        let mut session = Session::new(Uuid::new_v4(), None);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_eq!(session.join(a, "Alice"), Joined::Player(PlayerNum::One));
        assert_eq!(session.join(b, "Bob"), Joined::Player(PlayerNum::Two));
        assert_eq!(session.join(c, "Carol"), Joined::Spectator);
        assert_eq!(session.player_count(), 2);
        assert_eq!(session.spectator_count(), 1);
    }

    #[test]
    fn test_rejoin_returns_existing_seat() {
        let (mut session, a, _) = human_session();
        assert_eq!(session.join(a, "Alice"), Joined::Player(PlayerNum::One));
        assert_eq!(session.player_count(), 2);
    }

    #[test]
    fn test_ai_session_seats_human_first_then_spectates() {
        let mut session = Session::new(Uuid::new_v4(), Some(Difficulty::Medium));
        assert!(session.is_ai_enabled());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(session.join(a, "Alice"), Joined::Player(PlayerNum::One));
        assert_eq!(session.join(b, "Bob"), Joined::Spectator);
    }

    #[test]
    fn test_first_move_lands_on_bottom_row() {
        let (mut session, a, _) = human_session();
        let applied = session.apply_move(a, 3).unwrap();

        assert_eq!(applied.record.row, ROWS - 1);
        assert_eq!(applied.record.column, 3);
        assert_eq!(applied.record.player, PlayerNum::One);
        assert_eq!(applied.player_name, "Alice");
        assert_eq!(session.cell(ROWS - 1, 3), Some(PlayerNum::One));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.current_player(), PlayerNum::Two);
    }

    #[test]
    fn test_turns_alternate_and_off_turn_moves_are_rejected() {
        let (mut session, a, b) = human_session();
        assert_eq!(session.apply_move(b, 0), Err(SessionError::NotYourTurn));
        session.apply_move(a, 0).unwrap();
        assert_eq!(session.apply_move(a, 1), Err(SessionError::NotYourTurn));
        session.apply_move(b, 1).unwrap();
        assert_eq!(session.current_player(), PlayerNum::One);
    }

    #[test]
    fn test_spectator_moves_are_forbidden() {
        let (mut session, _, _) = human_session();
        let spectator = Uuid::new_v4();
        session.join(spectator, "Carol");
        assert_eq!(
            session.apply_move(spectator, 0),
            Err(SessionError::SpectatorForbidden)
        );
        assert_eq!(session.history().len(), 0);
    }

    #[test]
    fn test_move_before_both_seats_filled_is_rejected() {
        let mut session = Session::new(Uuid::new_v4(), None);
        let a = Uuid::new_v4();
        session.join(a, "Alice");
        assert_eq!(session.apply_move(a, 0), Err(SessionError::WaitingPlayers));
    }

    #[test]
    fn test_invalid_and_full_columns_are_rejected_without_mutation() {
        let (mut session, a, b) = human_session();
        assert_eq!(session.apply_move(a, COLS), Err(SessionError::InvalidColumn));

        // Fill column 0 completely.
        for _ in 0..3 {
            session.apply_move(a, 0).unwrap();
            session.apply_move(b, 0).unwrap();
        }
        let before = session.history().len();
        assert_eq!(session.apply_move(a, 0), Err(SessionError::ColumnFull));
        assert_eq!(session.history().len(), before);
        assert_eq!(session.current_player(), PlayerNum::One);
    }

    #[test]
    fn test_vertical_win_on_fourth_drop() {
        let (mut session, a, b) = human_session();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        let applied = session.apply_move(a, 0).unwrap();

        assert_eq!(applied.outcome, Some(Outcome::Win(PlayerNum::One)));
        assert!(session.is_over());
        assert_eq!(session.winner(), Some(Outcome::Win(PlayerNum::One)));
        assert_eq!(session.score().player1, 1);
        // No further moves are accepted.
        assert_eq!(session.apply_move(b, 2), Err(SessionError::GameOver));
    }

    #[test]
    fn test_history_matches_piece_count_with_unique_cells() {
        let (mut session, a, b) = human_session();
        let moves = [3, 3, 2, 4, 2, 0, 6, 5];
        for (i, &col) in moves.iter().enumerate() {
            let sid = if i % 2 == 0 { a } else { b };
            session.apply_move(sid, col).unwrap();
        }

        assert_eq!(
            session.history().len(),
            session.board_snapshot().piece_count()
        );

        let mut cells: Vec<(usize, usize)> = session
            .history()
            .iter()
            .map(|m| (m.row, m.column))
            .collect();
        cells.sort_unstable();
        cells.dedup();
        assert_eq!(cells.len(), session.history().len());
    }

    #[test]
    fn test_draw_fills_board_without_a_winner() {
        let (mut session, a, b) = human_session();
        // A full 42-move game with no four-in-a-row: two column pairs
        // played in a fixed 12-move pattern, then the last three columns
        // interleaved. Verified drawn by construction.
        let pair = |x: usize, y: usize| [x, y, x, y, y, x, y, x, x, y, y, x];
        let tail = [4, 5, 6, 5, 4, 4, 6, 6, 5, 4, 5, 6, 4, 5, 6, 4, 5, 6];
        let moves: Vec<usize> = pair(0, 1)
            .into_iter()
            .chain(pair(2, 3))
            .chain(tail)
            .collect();
        assert_eq!(moves.len(), ROWS * COLS);

        for (i, &col) in moves.iter().enumerate() {
            let sid = if i % 2 == 0 { a } else { b };
            assert!(!session.is_over(), "game ended early at move {}", i);
            session.apply_move(sid, col).unwrap();
        }

        assert!(session.is_over());
        assert_eq!(session.winner(), Some(Outcome::Draw));
        assert_eq!(session.score().draws, 1);
        assert_eq!(session.score().player1, 0);
        assert_eq!(session.score().player2, 0);
    }

    #[test]
    fn test_reset_clears_game_but_keeps_seats_and_score() {
        let (mut session, a, b) = human_session();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        session.apply_move(a, 0).unwrap();
        assert_eq!(session.score().player1, 1);

        let generation = session.generation();
        session.reset();

        assert!(!session.is_over());
        assert_eq!(session.winner(), None);
        assert_eq!(session.history().len(), 0);
        assert_eq!(session.current_player(), PlayerNum::One);
        assert_eq!(session.cell(ROWS - 1, 0), None);
        assert_eq!(session.score().player1, 1);
        assert_eq!(session.player_count(), 2);
        assert_eq!(session.generation(), generation + 1);
    }

    #[test]
    fn test_score_accumulates_across_resets() {
        let (mut session, a, b) = human_session();
        for _ in 0..2 {
            session.apply_move(a, 0).unwrap();
            session.apply_move(b, 1).unwrap();
            session.apply_move(a, 0).unwrap();
            session.apply_move(b, 1).unwrap();
            session.apply_move(a, 0).unwrap();
            session.apply_move(b, 1).unwrap();
            session.apply_move(a, 0).unwrap();
            session.reset();
        }
        assert_eq!(session.score().player1, 2);
    }

    #[test]
    fn test_ai_move_applies_on_matching_generation() {
        let mut session = Session::new(Uuid::new_v4(), Some(Difficulty::Medium));
        let a = Uuid::new_v4();
        session.join(a, "Alice");
        session.apply_move(a, 3).unwrap();

        let (_, generation) = session.ai_to_move().expect("AI should be on turn");
        let applied = session.apply_ai_move(2, generation).unwrap();
        assert!(applied.is_some());
        assert_eq!(session.current_player(), PlayerNum::One);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_stale_ai_move_is_discarded_silently() {
        let mut session = Session::new(Uuid::new_v4(), Some(Difficulty::Medium));
        let a = Uuid::new_v4();
        session.join(a, "Alice");
        session.apply_move(a, 3).unwrap();

        let (_, generation) = session.ai_to_move().expect("AI should be on turn");
        session.reset();

        assert_eq!(session.apply_ai_move(2, generation), Ok(None));
        assert_eq!(session.history().len(), 0);
    }

    #[test]
    fn test_ai_move_out_of_turn_is_discarded() {
        let mut session = Session::new(Uuid::new_v4(), Some(Difficulty::Medium));
        let a = Uuid::new_v4();
        session.join(a, "Alice");
        // Player 1 has not moved yet — it is not the AI's turn.
        let generation = session.generation();
        assert_eq!(session.apply_ai_move(0, generation), Ok(None));
    }

    #[test]
    fn test_player_leave_terminates_running_human_game() {
        let (mut session, a, _) = human_session();
        let left = session.leave(a);
        assert_eq!(
            left,
            Left::Player {
                name: "Alice".into(),
                number: PlayerNum::One,
                ends_session: true,
            }
        );
        assert!(session.is_over());
        assert_eq!(session.winner(), None);
    }

    #[test]
    fn test_player_leave_after_game_over_does_not_end_session() {
        let (mut session, a, b) = human_session();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        session.apply_move(a, 0).unwrap();
        session.apply_move(b, 1).unwrap();
        session.apply_move(a, 0).unwrap();

        match session.leave(b) {
            Left::Player { ends_session, .. } => assert!(!ends_session),
            other => panic!("unexpected leave result: {:?}", other),
        }
    }

    #[test]
    fn test_player_leave_keeps_ai_session_alive() {
        let mut session = Session::new(Uuid::new_v4(), Some(Difficulty::Easy));
        let a = Uuid::new_v4();
        session.join(a, "Alice");
        match session.leave(a) {
            Left::Player { ends_session, .. } => assert!(!ends_session),
            other => panic!("unexpected leave result: {:?}", other),
        }
        assert!(!session.is_over());
        // The freed seat is joinable again.
        let c = Uuid::new_v4();
        assert_eq!(session.join(c, "Carol"), Joined::Player(PlayerNum::One));
    }

    #[test]
    fn test_spectator_leave_only_updates_count() {
        let (mut session, _, _) = human_session();
        let spectator = Uuid::new_v4();
        session.join(spectator, "Carol");
        assert_eq!(
            session.leave(spectator),
            Left::Spectator {
                name: "Carol".into()
            }
        );
        assert!(!session.is_over());
        assert_eq!(session.spectator_count(), 0);
    }

    #[test]
    fn test_terminate_bumps_generation_and_ends_game() {
        let (mut session, _, _) = human_session();
        let generation = session.generation();
        session.terminate();
        assert!(session.is_over());
        assert_eq!(session.generation(), generation + 1);
    }

    #[test]
    fn test_state_json_reflects_session() {
        let (mut session, a, _) = human_session();
        session.apply_move(a, 3).unwrap();
        let state = session.to_state_json();

        assert_eq!(state.board[ROWS - 1][3], 1);
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.current_player, PlayerNum::Two);
        assert!(!state.game_over);
        assert_eq!(state.winner, None);
        assert!(!state.ai_enabled);
        assert_eq!(state.players[&a.to_string()].name, "Alice");
    }

    #[test]
    fn test_registry_create_get_remove() {
        let registry = SessionRegistry::new();
        let id = registry.create(None);
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&id));
        assert!(registry.get(&id).is_none());
        assert!(!registry.remove(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_accepts_caller_chosen_ids() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.create_with_id(id, Some(Difficulty::Easy));
        let handle = registry.get(&id).unwrap();
        assert!(handle.lock().unwrap().is_ai_enabled());
    }

    #[test]
    fn test_registry_overviews_expose_live_sessions() {
        let registry = SessionRegistry::new();
        let id = registry.create(Some(Difficulty::Hard));
        let handle = registry.get(&id).unwrap();
        {
            let mut session = handle.lock().unwrap();
            session.join(Uuid::new_v4(), "Alice");
        }

        let overviews = registry.overviews();
        assert_eq!(overviews.len(), 1);
        assert_eq!(overviews[0].game_id, id.to_string());
        assert!(overviews[0].ai_enabled);
        assert_eq!(overviews[0].players_count, 2);
        assert_eq!(overviews[0].moves_count, 0);
    }
}
