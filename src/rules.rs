//! Move validation and win detection for Connect Four.
//!
//! Everything in this module is a pure function over an immutable board:
//! column legality, the gravity landing row, four-in-a-row detection
//! anchored at the most recently placed piece, and the full-board check.
//! Session state handling lives in `session`; this module knows nothing
//! about players' identities, turns, or scores.

use crate::types::{Board, PlayerNum, COLS, ROWS, WIN_LENGTH};

/// The four line axes a win can lie on, as `(row, col)` steps:
/// horizontal, vertical, diagonal ↘ and diagonal ↗.
const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Returns the row a piece dropped into `col` would land on, or `None`
/// if the column is out of range or full.
///
/// Gravity: the landing cell is the lowest empty cell of the column,
/// scanning from the bottom of the grid.
pub fn landing_row(board: &Board, col: usize) -> Option<usize> {
    if col >= COLS {
        return None;
    }
    (0..ROWS).rev().find(|&row| board.get(row, col).is_none())
}

/// Returns all columns that can still accept a piece, left to right.
pub fn valid_columns(board: &Board) -> Vec<usize> {
    (0..COLS)
        .filter(|&col| board.get(0, col).is_none())
        .collect()
}

/// Returns `true` if the piece just placed at `(row, col)` completes a
/// line of four or more for `player`.
///
/// Counts contiguous same-player cells extending outward in both
/// directions along each axis, including the placed cell itself, and
/// short-circuits as soon as one axis reaches four. Only the anchored
/// cell is examined — no full-board rescan.
pub fn has_win(board: &Board, row: usize, col: usize, player: PlayerNum) -> bool {
    for (dr, dc) in AXES {
        let total = 1 + ray(board, row, col, dr, dc, player) + ray(board, row, col, -dr, -dc, player);
        if total >= WIN_LENGTH {
            return true;
        }
    }
    false
}

/// Counts consecutive `player` cells from `(row, col)` exclusive,
/// stepping by `(dr, dc)` until the run or the board ends.
fn ray(board: &Board, row: usize, col: usize, dr: isize, dc: isize, player: PlayerNum) -> usize {
    let mut count = 0;
    let mut r = row as isize + dr;
    let mut c = col as isize + dc;
    while r >= 0 && c >= 0 && board.get(r as usize, c as usize) == Some(player) {
        count += 1;
        r += dr;
        c += dc;
    }
    count
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
    fn test_empty_column_lands_on_bottom_row() {
        let board = Board::new();
        assert_eq!(landing_row(&board, 0), Some(ROWS - 1));
        assert_eq!(landing_row(&board, COLS - 1), Some(ROWS - 1));
    }

    #[test]
    fn test_gravity_lands_on_first_empty_from_bottom() {
        // Column 2 filled [1, 1] bottom-up: next piece lands on row 3.
        let board = board_of(&[&[], &[], &[1, 1]]);
        assert_eq!(landing_row(&board, 2), Some(3));
    }

    #[test]
    fn test_full_column_rejects_drop() {
        let board = board_of(&[&[1, 2, 1, 2, 1, 2]]);
        assert_eq!(landing_row(&board, 0), None);
    }

    #[test]
    fn test_out_of_range_column() {
        let board = Board::new();
        assert_eq!(landing_row(&board, COLS), None);
    }

    #[test]
    fn test_valid_columns_skips_full_ones() {
        let board = board_of(&[&[1, 2, 1, 2, 1, 2], &[1]]);
        assert_eq!(valid_columns(&board), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_horizontal_win_detected_from_any_anchor() {
        let board = board_of(&[&[1], &[1], &[1], &[1]]);
        // All four pieces sit on the bottom row; any of them anchors the line.
        for col in 0..4 {
            assert!(has_win(&board, ROWS - 1, col, PlayerNum::One));
        }
        assert!(!has_win(&board, ROWS - 1, 0, PlayerNum::Two));
    }

    #[test]
    fn test_vertical_win_detected() {
        let board = board_of(&[&[], &[2, 2, 2, 2]]);
        assert!(has_win(&board, 2, 1, PlayerNum::Two));
    }

    #[test]
    fn test_diagonal_down_right_win_detected() {
        // Line through (2,0), (3,1), (4,2), (5,3) — descending to the right.
        let board = board_of(&[
            &[2, 2, 2, 1],
            &[2, 2, 1],
            &[2, 1],
            &[1],
        ]);
        assert!(has_win(&board, 2, 0, PlayerNum::One));
        assert!(has_win(&board, 5, 3, PlayerNum::One));
    }

    #[test]
    fn test_diagonal_up_right_win_detected() {
        // Line through (5,0), (4,1), (3,2), (2,3) — ascending to the right.
        let board = board_of(&[
            &[1],
            &[2, 1],
            &[2, 2, 1],
            &[2, 2, 2, 1],
        ]);
        assert!(has_win(&board, 5, 0, PlayerNum::One));
        assert!(has_win(&board, 2, 3, PlayerNum::One));
    }

    #[test]
    fn test_three_in_a_row_is_not_a_win() {
        let board = board_of(&[&[1], &[1], &[1]]);
        for col in 0..3 {
            assert!(!has_win(&board, ROWS - 1, col, PlayerNum::One));
        }
    }

    #[test]
    fn test_interrupted_line_is_not_a_win() {
        let board = board_of(&[&[1], &[1], &[2], &[1], &[1]]);
        assert!(!has_win(&board, ROWS - 1, 4, PlayerNum::One));
    }

    #[test]
    fn test_win_needs_the_anchored_cell_in_the_line() {
        // Four player-1 pieces in columns 0..4, anchor on a player-2 piece
        // elsewhere: the anchored check must not claim a win for player 2.
        let board = board_of(&[&[1], &[1], &[1], &[1], &[2]]);
        assert!(!has_win(&board, ROWS - 1, 4, PlayerNum::Two));
    }
}
