//! Computer player.
//!
//! Every call re-evaluates the board from scratch; the selector keeps no
//! game state, only its random source. Search never goes past one ply:
//! Medium and Hard share the same win/block scan and differ only in how
//! they fall back when neither applies.
//!
//! # Stage order
//!
//! ```text
//! Easy:          overwrite (2 in 3) -> random free cell
//! Medium / Hard: forced (only when nothing is available)
//!                -> win -> block -> tier fallback
//! ```

use std::fmt;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{can_place, AvailableCells, Board, Inventory, Move, Player, Pos};

/// Bot strength.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Tier index as used by the menus (0, 1, 2).
    pub fn index(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(name)
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" | "0" => Ok(Difficulty::Easy),
            "medium" | "1" => Ok(Difficulty::Medium),
            "hard" | "2" => Ok(Difficulty::Hard),
            other => Err(format!("Unknown difficulty: {}", other)),
        }
    }
}

/// Cells Hard tries, in order, when no win, block or overwrite applies.
const STRATEGIC_CELLS: [Pos; 5] = [Pos(4), Pos(0), Pos(2), Pos(6), Pos(8)];

/// Picks a move for the owner of the bot's reserve.
///
/// The random source is injected so the Easy tier can be replayed.
pub struct MoveSelector<R = SmallRng> {
    rng: R,
}

impl MoveSelector<SmallRng> {
    /// Deterministic selector.
    pub fn seeded(seed: u64) -> Self {
        Self::new(SmallRng::seed_from_u64(seed))
    }

    /// Selector seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self::new(SmallRng::from_os_rng())
    }
}

impl<R: Rng> MoveSelector<R> {
    pub fn new(rng: R) -> Self {
        MoveSelector { rng }
    }

    /// Choose a move for `bot_stock.owner()`, or None if the bot has to pass.
    #[instrument(skip_all, fields(bot = ?bot_stock.owner(), %difficulty, opponent_cups = opponent_stock.total()))]
    pub fn select(
        &mut self,
        board: &Board,
        bot_stock: &Inventory,
        opponent_stock: &Inventory,
        difficulty: Difficulty,
    ) -> Option<Move> {
        debug_assert_ne!(bot_stock.owner(), opponent_stock.owner());
        if bot_stock.is_empty() {
            debug!("reserve exhausted");
            return None;
        }

        let mov = match difficulty {
            Difficulty::Easy => self.easy(board, bot_stock),
            Difficulty::Medium => one_ply(board, bot_stock, medium_fallback),
            Difficulty::Hard => one_ply(board, bot_stock, hard_fallback),
        };
        if mov.is_none() {
            debug!("no move available");
        }
        mov
    }

    fn easy(&mut self, board: &Board, stock: &Inventory) -> Option<Move> {
        let bot = stock.owner();
        let cells = AvailableCells::scan(board, stock);
        if cells.is_empty() {
            return None;
        }

        if !cells.overwritable.is_empty() && self.rng.random_range(0..3) != 0 {
            let to = cells.overwritable[self.rng.random_range(0..cells.overwritable.len())];
            let size = stock.first_at_least(board.occupant_value(to) + 1)?;
            debug!(stage = "overwrite", %to, ?size);
            Some(Move::new(bot, size, to))
        } else if !cells.free.is_empty() {
            let to = cells.free[self.rng.random_range(0..cells.free.len())];
            let size = stock.first_at_least(0)?;
            debug!(stage = "free", %to, ?size);
            Some(Move::new(bot, size, to))
        } else {
            None
        }
    }
}

/// Shared Medium/Hard pipeline: forced, win, block, then the tier fallback.
fn one_ply(
    board: &Board,
    stock: &Inventory,
    fallback: fn(&Board, &Inventory, &AvailableCells) -> Option<Move>,
) -> Option<Move> {
    let bot = stock.owner();
    let cells = AvailableCells::scan(board, stock);
    if cells.is_empty() {
        return forced_move(board, stock);
    }

    if let Some(mov) = line_move(board, stock, &cells, bot) {
        debug!(stage = "win", %mov);
        return Some(mov);
    }
    if let Some(mov) = line_move(board, stock, &cells, bot.opponent()) {
        debug!(stage = "block", %mov);
        return Some(mov);
    }
    fallback(board, stock, &cells)
}

/// Scan the win lines for two cups of `side` plus one open cell.
///
/// With `side` the bot this finds a winning move and spends the largest cup;
/// with `side` the opponent it finds a block and spends the first cup big
/// enough. Lines are tried in `WIN_LINES` order and the first playable one
/// wins.
pub fn line_move(board: &Board, stock: &Inventory, cells: &AvailableCells, side: Player) -> Option<Move> {
    let bot = stock.owner();
    let winning = side == bot;

    for line in &Board::WIN_LINES {
        let mut count = 0;
        let mut target = None;
        let mut min_size = 0;

        for &pos in line {
            match board.cell(pos) {
                Some(piece) if piece.owner == side => count += 1,
                None => target = Some(pos),
                Some(piece) if winning => {
                    target = Some(pos);
                    min_size = min_size.max(piece.size.value() + 1);
                }
                Some(_) => {}
            }
        }

        let Some(to) = target else { continue };
        if count != 2 || !cells.contains(to) {
            continue;
        }

        let size = if winning {
            stock.largest()
        } else {
            stock.first_at_least(min_size)
        };
        if let Some(size) = size.filter(|s| s.value() >= min_size) {
            return Some(Move::new(bot, size, to));
        }
    }
    None
}

/// Last resort when nothing is free or overwritable: the first cell, in
/// row-major order, some reserve cup is large enough for. Ownership of the
/// cell is not checked.
pub fn forced_move(board: &Board, stock: &Inventory) -> Option<Move> {
    let bot = stock.owner();
    for pos in Pos::all() {
        for size in stock.sizes() {
            if can_place(size, board.occupant_size(pos)) {
                debug!(stage = "forced", %pos, ?size);
                return Some(Move::new(bot, size, pos));
            }
        }
    }
    None
}

fn medium_fallback(board: &Board, stock: &Inventory, cells: &AvailableCells) -> Option<Move> {
    let bot = stock.owner();

    if let Some(&to) = cells.overwritable.first() {
        if let Some(size) = stock.first_at_least(board.occupant_value(to) + 1) {
            debug!(stage = "overwrite", %to, ?size);
            return Some(Move::new(bot, size, to));
        }
    }
    if cells.free.contains(&Pos::CENTER) {
        if let Some(size) = stock.first_at_least(0) {
            debug!(stage = "center", ?size);
            return Some(Move::new(bot, size, Pos::CENTER));
        }
    }
    first_free(stock, cells)
}

fn hard_fallback(board: &Board, stock: &Inventory, cells: &AvailableCells) -> Option<Move> {
    let bot = stock.owner();

    if let Some(&to) = cells.overwritable.first() {
        if let Some(size) = stock.largest().filter(|s| s.value() > board.occupant_value(to)) {
            debug!(stage = "overwrite", %to, ?size);
            return Some(Move::new(bot, size, to));
        }
    }
    for to in STRATEGIC_CELLS {
        if cells.free.contains(&to) {
            if let Some(size) = stock.first_at_least(0) {
                debug!(stage = "strategic", %to, ?size);
                return Some(Move::new(bot, size, to));
            }
        }
    }
    first_free(stock, cells)
}

fn first_free(stock: &Inventory, cells: &AvailableCells) -> Option<Move> {
    let to = *cells.free.first()?;
    let size = stock.first_at_least(0)?;
    debug!(stage = "first_free", %to, ?size);
    Some(Move::new(stock.owner(), size, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Piece, Size};

    fn put(board: &mut Board, idx: u8, owner: Player, size: Size) {
        board.set_cell(Pos(idx), Some(Piece::new(owner, size)));
    }

    fn pick(board: &Board, bot: Inventory, difficulty: Difficulty) -> Option<Move> {
        let opponent = Inventory::new(bot.owner().opponent());
        MoveSelector::seeded(7).select(board, &bot, &opponent, difficulty)
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("easy".parse::<Difficulty>(), Ok(Difficulty::Easy));
        assert_eq!("Medium".parse::<Difficulty>(), Ok(Difficulty::Medium));
        assert_eq!("2".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert!("expert".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::Hard.to_string(), "hard");
        assert_eq!(Difficulty::Medium.index(), 1);
    }

    #[test]
    fn test_empty_reserve_passes() {
        let board = Board::new();
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            let stock = Inventory::with_counts(Player::Two, [0, 0, 0]);
            assert_eq!(pick(&board, stock, difficulty), None);
        }
    }

    // ========== Win / Block ==========

    #[test]
    fn test_win_uses_largest_cup() {
        let mut board = Board::new();
        put(&mut board, 0, Player::Two, Size::Small);
        put(&mut board, 1, Player::Two, Size::Small);

        for difficulty in [Difficulty::Medium, Difficulty::Hard] {
            let mov = pick(&board, Inventory::with_counts(Player::Two, [0, 2, 2]), difficulty);
            assert_eq!(mov, Some(Move::new(Player::Two, Size::Large, Pos(2))));
        }
    }

    #[test]
    fn test_win_by_overwrite() {
        let mut board = Board::new();
        put(&mut board, 3, Player::Two, Size::Small);
        put(&mut board, 4, Player::Two, Size::Medium);
        put(&mut board, 5, Player::One, Size::Medium);

        let mov = pick(&board, Inventory::with_counts(Player::Two, [1, 0, 1]), Difficulty::Medium);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Large, Pos(5))));
    }

    #[test]
    fn test_win_blocked_by_large_falls_through_to_block() {
        let mut board = Board::new();
        // Bot's row 0 is capped by an opposing Large.
        put(&mut board, 0, Player::Two, Size::Small);
        put(&mut board, 1, Player::Two, Size::Small);
        put(&mut board, 2, Player::One, Size::Large);
        // Opponent threatens column 2 at (2,2).
        put(&mut board, 5, Player::One, Size::Small);

        let mov = pick(&board, Inventory::new(Player::Two), Difficulty::Medium);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Small, Pos(8))));
    }

    #[test]
    fn test_block_uses_first_fitting_cup() {
        let mut board = Board::new();
        put(&mut board, 0, Player::One, Size::Large);
        put(&mut board, 4, Player::One, Size::Large);

        let mov = pick(&board, Inventory::with_counts(Player::Two, [0, 1, 2]), Difficulty::Hard);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Medium, Pos(8))));
    }

    #[test]
    fn test_win_preferred_over_block() {
        let mut board = Board::new();
        put(&mut board, 0, Player::One, Size::Small);
        put(&mut board, 1, Player::One, Size::Small);
        put(&mut board, 6, Player::Two, Size::Small);
        put(&mut board, 7, Player::Two, Size::Small);

        let mov = pick(&board, Inventory::new(Player::Two), Difficulty::Medium);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Large, Pos(8))));
    }

    #[test]
    fn test_line_move_skips_unreachable_target() {
        let mut board = Board::new();
        put(&mut board, 0, Player::Two, Size::Small);
        put(&mut board, 1, Player::Two, Size::Small);
        put(&mut board, 2, Player::One, Size::Medium);

        let stock = Inventory::with_counts(Player::Two, [2, 2, 0]);
        let cells = AvailableCells::scan(&board, &stock);
        assert_eq!(line_move(&board, &stock, &cells, Player::Two), None);
    }

    // ========== Fallbacks ==========

    #[test]
    fn test_medium_takes_center() {
        let mut board = Board::new();
        put(&mut board, 0, Player::One, Size::Large);

        let mov = pick(&board, Inventory::with_counts(Player::Two, [0, 2, 2]), Difficulty::Medium);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Medium, Pos(4))));
    }

    #[test]
    fn test_medium_overwrites_first_with_smallest() {
        let mut board = Board::new();
        put(&mut board, 2, Player::One, Size::Small);
        put(&mut board, 3, Player::One, Size::Medium);

        let mov = pick(&board, Inventory::new(Player::Two), Difficulty::Medium);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Medium, Pos(2))));
    }

    #[test]
    fn test_medium_first_free_when_center_taken() {
        let mut board = Board::new();
        put(&mut board, 4, Player::One, Size::Large);

        let mov = pick(&board, Inventory::new(Player::Two), Difficulty::Medium);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Small, Pos(0))));
    }

    #[test]
    fn test_hard_overwrites_with_largest() {
        let mut board = Board::new();
        put(&mut board, 2, Player::One, Size::Small);
        put(&mut board, 3, Player::One, Size::Medium);

        let mov = pick(&board, Inventory::new(Player::Two), Difficulty::Hard);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Large, Pos(2))));
    }

    #[test]
    fn test_hard_prefers_corner_after_center() {
        let mut board = Board::new();
        put(&mut board, 4, Player::One, Size::Large);
        put(&mut board, 0, Player::Two, Size::Small);

        let mov = pick(&board, Inventory::with_counts(Player::Two, [1, 2, 2]), Difficulty::Hard);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Small, Pos(2))));
    }

    #[test]
    fn test_hard_center_on_empty_board() {
        let mov = pick(&Board::new(), Inventory::new(Player::Two), Difficulty::Hard);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Small, Pos(4))));
    }

    // ========== Forced ==========

    #[test]
    fn test_forced_move_scans_row_major() {
        let mut board = Board::new();
        // Opposing Larges everywhere except own Small cells at 3 and 7.
        for idx in 0..9 {
            put(&mut board, idx, Player::One, Size::Large);
        }
        put(&mut board, 3, Player::Two, Size::Small);
        put(&mut board, 7, Player::Two, Size::Small);

        let stock = Inventory::with_counts(Player::Two, [0, 1, 0]);
        assert!(AvailableCells::scan(&board, &stock).is_empty());
        let mov = pick(&board, stock, Difficulty::Hard);
        assert_eq!(mov, Some(Move::new(Player::Two, Size::Medium, Pos(3))));
    }

    #[test]
    fn test_forced_move_none_when_nothing_fits() {
        let mut board = Board::new();
        for idx in 0..9 {
            put(&mut board, idx, Player::One, Size::Large);
        }
        let stock = Inventory::new(Player::Two);
        assert_eq!(forced_move(&board, &stock), None);
        assert_eq!(pick(&board, stock, Difficulty::Medium), None);
    }

    #[test]
    fn test_easy_has_no_forced_move() {
        let mut board = Board::new();
        for idx in 0..9 {
            put(&mut board, idx, Player::One, Size::Large);
        }
        put(&mut board, 3, Player::Two, Size::Small);
        let stock = Inventory::with_counts(Player::Two, [0, 1, 0]);
        assert_eq!(pick(&board, stock, Difficulty::Easy), None);
    }

    // ========== Easy ==========

    #[test]
    fn test_easy_is_reproducible() {
        let mut board = Board::new();
        put(&mut board, 0, Player::One, Size::Small);
        put(&mut board, 8, Player::One, Size::Medium);
        let bot = Inventory::new(Player::Two);
        let opp = Inventory::new(Player::One);

        let mut a = MoveSelector::seeded(42);
        let mut b = MoveSelector::seeded(42);
        for _ in 0..20 {
            assert_eq!(
                a.select(&board, &bot, &opp, Difficulty::Easy),
                b.select(&board, &bot, &opp, Difficulty::Easy)
            );
        }
    }

    #[test]
    fn test_easy_moves_are_legal() {
        let mut board = Board::new();
        put(&mut board, 0, Player::One, Size::Small);
        put(&mut board, 4, Player::One, Size::Large);
        put(&mut board, 8, Player::Two, Size::Medium);
        let bot = Inventory::with_counts(Player::Two, [1, 1, 1]);
        let opp = Inventory::new(Player::One);

        let mut selector = MoveSelector::seeded(3);
        let mut saw_overwrite = false;
        let mut saw_free = false;
        for _ in 0..200 {
            let mov = selector.select(&board, &bot, &opp, Difficulty::Easy).unwrap();
            assert!(board.check(&bot, mov).is_ok(), "illegal easy move {}", mov);
            if mov.to == Pos(0) {
                // Smallest cup that covers a Small.
                assert_eq!(mov.size, Size::Medium);
                saw_overwrite = true;
            } else {
                assert_eq!(mov.size, Size::Small);
                saw_free = true;
            }
        }
        assert!(saw_overwrite && saw_free);
    }

    #[test]
    fn test_easy_free_only() {
        let bot = Inventory::with_counts(Player::One, [0, 0, 1]);
        let opp = Inventory::new(Player::Two);
        let mut selector = MoveSelector::seeded(11);
        let mov = selector.select(&Board::new(), &bot, &opp, Difficulty::Easy).unwrap();
        assert_eq!(mov.size, Size::Large);
        assert_eq!(mov.actor, Player::One);
    }
}
