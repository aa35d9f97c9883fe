//! The built-in Connect Four AI opponent.
//!
//! Three strength levels:
//!
//! - **easy** — a uniformly random legal column.
//! - **medium** — takes an immediate win, otherwise blocks the
//!   opponent's immediate win, otherwise prefers the center.
//! - **hard** — minimax with alpha-beta pruning over a window-count
//!   evaluation of the position.
//!
//! The engine is stateless: `choose_move` works on a board snapshot and
//! never touches session state, so the caller is free to run it outside
//! any lock and validate the result afterwards.

use crate::rules;
use crate::types::{Board, Difficulty, PlayerNum, COLS, ROWS};
use rand::seq::IndexedRandom;

/// The seat the AI always occupies.
pub const AI_PLAYER: PlayerNum = PlayerNum::Two;

/// The center column, preferred by the medium policy.
const CENTER_COL: usize = 3;

/// Score assigned to a forced win inside the minimax search. Depth is
/// added on top so nearer wins outrank distant ones.
const WIN_SCORE: i32 = 1_000_000;

/// Column-choice engine for one difficulty level.
pub struct AiPlayer {
    difficulty: Difficulty,
    max_depth: u32,
}

impl AiPlayer {
    /// Creates an engine for the given difficulty.
    pub fn new(difficulty: Difficulty) -> Self {
        let max_depth = match difficulty {
            Difficulty::Easy => 2,
            Difficulty::Medium => 4,
            Difficulty::Hard => 6,
        };
        Self {
            difficulty,
            max_depth,
        }
    }

    /// Picks a column for the AI to play, or `None` if the board is full.
    pub fn choose_move(&self, board: &Board) -> Option<usize> {
        match self.difficulty {
            Difficulty::Easy => random_move(board),
            Difficulty::Medium => heuristic_move(board, AI_PLAYER),
            Difficulty::Hard => self.minimax_move(board, AI_PLAYER),
        }
    }

    fn minimax_move(&self, board: &Board, player: PlayerNum) -> Option<usize> {
        self.minimax(board, self.max_depth, i32::MIN, i32::MAX, true, player)
            .1
    }

    /// Alpha-beta minimax. `maximizing` alternates between `player` and
    /// the opponent; a winning drop terminates the branch immediately, so
    /// the search never needs a full-board winner scan.
    fn minimax(
        &self,
        board: &Board,
        depth: u32,
        mut alpha: i32,
        mut beta: i32,
        maximizing: bool,
        player: PlayerNum,
    ) -> (i32, Option<usize>) {
        let valid = rules::valid_columns(board);
        if depth == 0 || valid.is_empty() {
            return (evaluate(board, player), None);
        }

        let mover = if maximizing { player } else { player.opponent() };
        let mut best_col = Some(valid[0]);

        if maximizing {
            let mut best = i32::MIN;
            for col in valid {
                let (child, row) = simulate_drop(board, col, mover);
                let score = if rules::has_win(&child, row, col, mover) {
                    WIN_SCORE + depth as i32
                } else {
                    self.minimax(&child, depth - 1, alpha, beta, false, player).0
                };
                if score > best {
                    best = score;
                    best_col = Some(col);
                }
                alpha = alpha.max(score);
                if beta <= alpha {
                    break;
                }
            }
            (best, best_col)
        } else {
            let mut best = i32::MAX;
            for col in valid {
                let (child, row) = simulate_drop(board, col, mover);
                let score = if rules::has_win(&child, row, col, mover) {
                    -(WIN_SCORE + depth as i32)
                } else {
                    self.minimax(&child, depth - 1, alpha, beta, true, player).0
                };
                if score < best {
                    best = score;
                    best_col = Some(col);
                }
                beta = beta.min(score);
                if beta <= alpha {
                    break;
                }
            }
            (best, best_col)
        }
    }
}

/// Easy policy: any legal column, uniformly at random.
fn random_move(board: &Board) -> Option<usize> {
    let valid = rules::valid_columns(board);
    valid.choose(&mut rand::rng()).copied()
}

/// Medium policy: win now, block now, then center-out preference.
fn heuristic_move(board: &Board, player: PlayerNum) -> Option<usize> {
    let valid = rules::valid_columns(board);
    if valid.is_empty() {
        return None;
    }

    // 1. Take an immediate win.
    for &col in &valid {
        if wins_with(board, col, player) {
            return Some(col);
        }
    }

    // 2. Block the opponent's immediate win.
    let opponent = player.opponent();
    for &col in &valid {
        if wins_with(board, col, opponent) {
            return Some(col);
        }
    }

    // 3. Center first, then the nearest legal column to it.
    if valid.contains(&CENTER_COL) {
        return Some(CENTER_COL);
    }
    for offset in 1..=CENTER_COL {
        for col in [CENTER_COL.wrapping_sub(offset), CENTER_COL + offset] {
            if col < COLS && valid.contains(&col) {
                return Some(col);
            }
        }
    }

    random_move(board)
}

/// Returns `true` if dropping into `col` wins the game for `player`.
fn wins_with(board: &Board, col: usize, player: PlayerNum) -> bool {
    match rules::landing_row(board, col) {
        Some(_) => {
            let (child, row) = simulate_drop(board, col, player);
            rules::has_win(&child, row, col, player)
        }
        None => false,
    }
}

/// Clones the board and drops a piece; the column must be legal.
fn simulate_drop(board: &Board, col: usize, player: PlayerNum) -> (Board, usize) {
    let mut child = board.clone();
    let row = child
        .drop_into(col, player)
        .expect("simulated drop on a full column");
    (child, row)
}

/// Scores the whole position for `player` by summing every 4-cell window.
fn evaluate(board: &Board, player: PlayerNum) -> i32 {
    let mut score = 0;
    for row in 0..ROWS {
        for col in 0..COLS {
            // Horizontal
            if col + 3 < COLS {
                score += evaluate_window(board, row, col, 0, 1, player);
            }
            // Vertical
            if row + 3 < ROWS {
                score += evaluate_window(board, row, col, 1, 0, player);
            }
            // Diagonal ↘
            if row + 3 < ROWS && col + 3 < COLS {
                score += evaluate_window(board, row, col, 1, 1, player);
            }
            // Diagonal ↗
            if row >= 3 && col + 3 < COLS {
                score += evaluate_window(board, row, col, -1, 1, player);
            }
        }
    }
    score
}

/// Scores one 4-cell window: reward own runs, penalize opponent threats.
fn evaluate_window(
    board: &Board,
    row: usize,
    col: usize,
    dr: isize,
    dc: isize,
    player: PlayerNum,
) -> i32 {
    let opponent = player.opponent();
    let mut own = 0;
    let mut theirs = 0;
    let mut empty = 0;

    for i in 0..4isize {
        let r = (row as isize + dr * i) as usize;
        let c = (col as isize + dc * i) as usize;
        match board.get(r, c) {
            Some(p) if p == player => own += 1,
            Some(p) if p == opponent => theirs += 1,
            _ => empty += 1,
        }
    }

    let mut score = 0;
    if own == 4 {
        score += 100;
    } else if own == 3 && empty == 1 {
        score += 10;
    } else if own == 2 && empty == 2 {
        score += 2;
    }
    if theirs == 3 && empty == 1 {
        score -= 80;
    } else if theirs == 2 && empty == 2 {
        score -= 5;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a board from column stacks given bottom-to-top as 1/2 values.
    fn board_of(columns: &[&[u8]]) -> Board {
        let mut board = Board::new();
        for (col, stack) in columns.iter().enumerate() {
            for &v in *stack {
                let player = PlayerNum::try_from(v).unwrap();
                board.drop_into(col, player).unwrap();
            }
        }
        board
    }

    #[test]
    fn test_easy_returns_a_legal_column() {
        let ai = AiPlayer::new(Difficulty::Easy);
        let board = board_of(&[&[1, 2, 1, 2, 1, 2]]);
        let col = ai.choose_move(&board).unwrap();
        assert!(col > 0 && col < COLS, "column 0 is full, got {}", col);
    }

    #[test]
    fn test_full_board_yields_no_move() {
        let mut board = Board::new();
        for col in 0..COLS {
            for i in 0..ROWS {
                let player = if (col + i) % 2 == 0 {
                    PlayerNum::One
                } else {
                    PlayerNum::Two
                };
                board.drop_into(col, player).unwrap();
            }
        }
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert_eq!(AiPlayer::new(difficulty).choose_move(&board), None);
        }
    }

    #[test]
    fn test_medium_takes_immediate_win() {
        // Three AI pieces on the bottom row, columns 0..2.
        let board = board_of(&[&[2], &[2], &[2]]);
        let ai = AiPlayer::new(Difficulty::Medium);
        assert_eq!(ai.choose_move(&board), Some(3));
    }

    #[test]
    fn test_medium_blocks_opponent_win() {
        // Player 1 threatens a vertical four in column 5.
        let board = board_of(&[&[], &[], &[], &[], &[], &[1, 1, 1]]);
        let ai = AiPlayer::new(Difficulty::Medium);
        assert_eq!(ai.choose_move(&board), Some(5));
    }

    #[test]
    fn test_medium_prefers_center_without_threats() {
        let ai = AiPlayer::new(Difficulty::Medium);
        assert_eq!(ai.choose_move(&Board::new()), Some(CENTER_COL));
    }

    #[test]
    fn test_medium_win_beats_block() {
        // Double threat: player 1 wins at column 3, the AI wins at
        // column 6. Taking the win outranks blocking.
        let board = board_of(&[&[1], &[1], &[1], &[], &[], &[], &[2, 2, 2]]);
        let ai = AiPlayer::new(Difficulty::Medium);
        assert_eq!(ai.choose_move(&board), Some(6));
    }

    #[test]
    fn test_hard_takes_immediate_win() {
        let board = board_of(&[&[], &[], &[], &[2, 2, 2], &[1, 1], &[1]]);
        let ai = AiPlayer::new(Difficulty::Hard);
        assert_eq!(ai.choose_move(&board), Some(3));
    }

    #[test]
    fn test_hard_blocks_forced_loss() {
        // Player 1 threatens a vertical four in column 0; any non-blocking
        // reply loses next turn, so the search must pick column 0.
        let board = board_of(&[&[1, 1, 1], &[2], &[2]]);
        let ai = AiPlayer::new(Difficulty::Hard);
        assert_eq!(ai.choose_move(&board), Some(0));
    }

    #[test]
    fn test_evaluation_favors_own_threats() {
        let strong = board_of(&[&[2], &[2], &[2]]);
        let weak = board_of(&[&[1], &[1], &[1]]);
        assert!(evaluate(&strong, AI_PLAYER) > evaluate(&weak, AI_PLAYER));
    }
}
