//! Core types for the fourline Connect Four server.
//!
//! This module defines the fundamental data structures used throughout the
//! server: player identity, board representation, seat assignment, move
//! records, scores, and the JSON protocol types exchanged with clients
//! over the WebSocket and REST APIs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Board dimensions
// ---------------------------------------------------------------------------

/// Number of board rows. Row 0 is the top, row `ROWS - 1` the bottom.
pub const ROWS: usize = 6;

/// Number of board columns, indexed left to right.
pub const COLS: usize = 7;

/// Number of aligned pieces required to win.
pub const WIN_LENGTH: usize = 4;

// ---------------------------------------------------------------------------
// PlayerNum
// ---------------------------------------------------------------------------

/// One of the two player slots in a session.
///
/// Serialized as the number `1` or `2` on the wire, matching the cell
/// values in the board grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerNum {
    One,
    Two,
}

impl PlayerNum {
    /// Returns the other player slot.
    pub fn opponent(self) -> PlayerNum {
        match self {
            PlayerNum::One => PlayerNum::Two,
            PlayerNum::Two => PlayerNum::One,
        }
    }

    /// Returns the 0-based seat index for this slot.
    pub fn index(self) -> usize {
        match self {
            PlayerNum::One => 0,
            PlayerNum::Two => 1,
        }
    }

    /// Returns the slot for a 0-based seat index. Panics if `index >= 2`.
    pub fn from_index(index: usize) -> PlayerNum {
        match index {
            0 => PlayerNum::One,
            1 => PlayerNum::Two,
            _ => unreachable!("seat index out of range"),
        }
    }
}

impl From<PlayerNum> for u8 {
    fn from(p: PlayerNum) -> u8 {
        match p {
            PlayerNum::One => 1,
            PlayerNum::Two => 2,
        }
    }
}

impl TryFrom<u8> for PlayerNum {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(PlayerNum::One),
            2 => Ok(PlayerNum::Two),
            other => Err(format!("invalid player number: {}", other)),
        }
    }
}

impl fmt::Display for PlayerNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// The 6×7 Connect Four grid.
///
/// Each cell is `Option<PlayerNum>` — `None` means empty. Cells are only
/// ever filled through [`Board::drop_into`], which applies gravity; there
/// is no direct cell addressing in the mutation API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[Option<PlayerNum>; COLS]; ROWS],
}

impl Default for Board {
    /// Returns an empty board.
    fn default() -> Self {
        Self {
            cells: [[None; COLS]; ROWS],
        }
    }
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the piece at `(row, col)`, if any.
    ///
    /// Out-of-range coordinates read as empty, so win-detection rays can
    /// probe past the edges without a separate bounds check.
    pub fn get(&self, row: usize, col: usize) -> Option<PlayerNum> {
        if row < ROWS && col < COLS {
            self.cells[row][col]
        } else {
            None
        }
    }

    /// Drops a piece into `col`, letting it fall to the lowest empty cell.
    ///
    /// Returns the landing row, or `None` if the column is out of range
    /// or full. This is the only way a cell becomes occupied.
    pub fn drop_into(&mut self, col: usize, player: PlayerNum) -> Option<usize> {
        if col >= COLS {
            return None;
        }
        for row in (0..ROWS).rev() {
            if self.cells[row][col].is_none() {
                self.cells[row][col] = Some(player);
                return Some(row);
            }
        }
        None
    }

    /// Returns `true` if every cell is occupied.
    pub fn is_full(&self) -> bool {
        (0..COLS).all(|col| self.cells[0][col].is_some())
    }

    /// Counts the occupied cells.
    pub fn piece_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| cell.is_some())
            .count()
    }

    /// Converts the grid to the wire format: rows of `0` / `1` / `2`,
    /// top row first.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(u8::from).unwrap_or(0))
                    .collect()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Difficulty & Seat
// ---------------------------------------------------------------------------

/// AI strength levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Random legal column.
    Easy,
    /// Immediate win / block detection with a center preference.
    #[default]
    Medium,
    /// Minimax with alpha-beta pruning.
    Hard,
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("invalid difficulty: '{}'", other)),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// Occupant of a player slot.
///
/// The opponent-is-AI case is a distinct variant rather than a flag, so
/// the turn-advance step dispatches on the seat itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seat {
    /// A connected human player.
    Human {
        /// Connection id of the occupant.
        sid: Uuid,
        /// Display name chosen at join time.
        name: String,
    },
    /// The built-in AI opponent.
    Ai {
        /// Search strength.
        difficulty: Difficulty,
    },
}

impl Seat {
    /// Returns `true` for the AI variant.
    pub fn is_ai(&self) -> bool {
        matches!(self, Seat::Ai { .. })
    }

    /// Returns the connection id for a human seat.
    pub fn sid(&self) -> Option<Uuid> {
        match self {
            Seat::Human { sid, .. } => Some(*sid),
            Seat::Ai { .. } => None,
        }
    }

    /// Returns the display name of the occupant.
    pub fn name(&self) -> &str {
        match self {
            Seat::Human { name, .. } => name,
            Seat::Ai { .. } => "AI",
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome & Score
// ---------------------------------------------------------------------------

/// The result of a finished game.
///
/// Wire format: `0` for a draw, `1` / `2` for the winning player, so the
/// `winner` field of `game_state` is `null | 0 | 1 | 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Outcome {
    /// Board filled with no winning line.
    Draw,
    /// Four-in-a-row for this player.
    Win(PlayerNum),
}

impl From<Outcome> for u8 {
    fn from(o: Outcome) -> u8 {
        match o {
            Outcome::Draw => 0,
            Outcome::Win(p) => p.into(),
        }
    }
}

impl TryFrom<u8> for Outcome {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Outcome::Draw),
            1 | 2 => Ok(Outcome::Win(PlayerNum::try_from(v)?)),
            other => Err(format!("invalid outcome: {}", other)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Draw => write!(f, "draw"),
            Outcome::Win(p) => write!(f, "player {} wins", p),
        }
    }
}

/// Win/draw tally for one session.
///
/// Incremented exactly once per terminal transition; survives `reset()`,
/// discarded when the session is destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Score {
    /// Wins for the player in seat 1.
    pub player1: u32,
    /// Wins for the player in seat 2.
    pub player2: u32,
    /// Drawn games.
    pub draws: u32,
}

impl Score {
    /// Records one finished game.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win(PlayerNum::One) => self.player1 += 1,
            Outcome::Win(PlayerNum::Two) => self.player2 += 1,
            Outcome::Draw => self.draws += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// MoveRecord
// ---------------------------------------------------------------------------

/// A record of a single accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MoveRecord {
    /// Which player dropped the piece.
    #[schema(value_type = u8)]
    pub player: PlayerNum,
    /// The column the piece was dropped into.
    pub column: usize,
    /// The row the piece landed on.
    pub row: usize,
    /// 0-based position of this move in the session history.
    pub index: usize,
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// A rejected session operation.
///
/// Every variant carries a stable code reported to the offending
/// connection; rejected operations never mutate state or broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// A move was attempted before both seats were filled.
    WaitingPlayers,
    /// The sender does not hold the `current_player` seat.
    NotYourTurn,
    /// The game has already ended.
    GameOver,
    /// The targeted column is full.
    ColumnFull,
    /// The targeted column is out of range.
    InvalidColumn,
    /// The sender is a spectator (or not in the session at all).
    SpectatorForbidden,
    /// No session exists under the given id.
    SessionNotFound,
}

impl SessionError {
    /// Returns the stable error code sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::WaitingPlayers => "WAITING_PLAYERS",
            SessionError::NotYourTurn => "NOT_YOUR_TURN",
            SessionError::GameOver => "GAME_OVER",
            SessionError::ColumnFull => "COLUMN_FULL",
            SessionError::InvalidColumn => "INVALID_COLUMN",
            SessionError::SpectatorForbidden => "SPECTATOR_FORBIDDEN",
            SessionError::SessionNotFound => "SESSION_NOT_FOUND",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::WaitingPlayers => {
                write!(f, "Wait for another player to join the game")
            }
            SessionError::NotYourTurn => write!(f, "It is not your turn"),
            SessionError::GameOver => write!(f, "The game is already over"),
            SessionError::ColumnFull => write!(f, "That column is full"),
            SessionError::InvalidColumn => write!(f, "That column does not exist"),
            SessionError::SpectatorForbidden => {
                write!(f, "You are not a player in this game")
            }
            SessionError::SessionNotFound => write!(f, "Game not found"),
        }
    }
}

impl std::error::Error for SessionError {}

// ---------------------------------------------------------------------------
// JSON protocol types
// ---------------------------------------------------------------------------

/// Public view of a seated player, keyed by connection id in `game_state`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlayerPublic {
    /// Seat number (1 or 2).
    #[schema(value_type = u8)]
    pub number: PlayerNum,
    /// Display name.
    pub name: String,
    /// Connection id.
    pub sid: String,
}

/// Public view of a spectator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SpectatorPublic {
    /// Display name.
    pub name: String,
    /// Connection id.
    pub sid: String,
}

/// The canonical session snapshot broadcast to the room after every
/// successful mutation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GameStateJson {
    /// The grid as rows of `0` / `1` / `2`, top row first.
    pub board: Vec<Vec<u8>>,
    /// Seated human players, keyed by connection id. The AI never
    /// appears here; `ai_enabled` marks its presence.
    pub players: HashMap<String, PlayerPublic>,
    /// Spectators, keyed by connection id.
    pub spectators: HashMap<String, SpectatorPublic>,
    /// Whose turn it is.
    #[schema(value_type = u8)]
    pub current_player: PlayerNum,
    /// Whether the game has ended.
    pub game_over: bool,
    /// `null` while in progress; `0` draw, `1` / `2` winner.
    #[schema(value_type = Option<u8>)]
    pub winner: Option<Outcome>,
    /// Whether seat 2 is occupied by the AI.
    pub ai_enabled: bool,
    /// Win/draw tally accumulated across resets.
    pub global_score: Score,
}

/// Admin introspection summary of one live session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionOverview {
    /// Session id.
    pub game_id: String,
    /// Seated players (the AI included, as "AI").
    pub players: Vec<SeatOverview>,
    /// Number of occupied seats.
    pub players_count: usize,
    /// Number of spectators.
    pub spectators_count: usize,
    /// Whose turn it is.
    #[schema(value_type = u8)]
    pub current_player: PlayerNum,
    /// Whether the game has ended.
    pub game_over: bool,
    /// Whether seat 2 is the AI.
    pub ai_enabled: bool,
    /// Number of accepted moves.
    pub moves_count: usize,
    /// Unix timestamp of session creation.
    pub created_at: u64,
}

/// One seat in a [`SessionOverview`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeatOverview {
    /// Occupant display name.
    pub name: String,
    /// Seat number (1 or 2).
    #[schema(value_type = u8)]
    pub number: PlayerNum,
}
