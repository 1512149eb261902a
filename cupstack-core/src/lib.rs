//! Stacking tic-tac-toe rules engine.
//!
//! Each side owns two cups of each size (Small, Medium, Large). A cup is
//! placed from the owner's reserve onto an empty cell, or onto a cell held
//! by a strictly smaller opposing cup. The covered cup is destroyed: it
//! leaves the game and is credited to nobody.
//!
//! # Board Layout
//!
//! ```text
//! Cell indices (row-major order):
//!   (0,0)=0  (0,1)=1  (0,2)=2
//!   (1,0)=3  (1,1)=4  (1,2)=5
//!   (2,0)=6  (2,1)=7  (2,2)=8
//!
//! Each cell is either empty or holds exactly one Piece { owner, size }.
//! Size values: Small=1, Medium=2, Large=3 (an empty cell counts as 0
//! when computing the minimum size needed to take it).
//! ```
//!
//! # Modules
//!
//! - this module: board state, reserves and the rule engine
//! - [`bot`]: difficulty-tiered move selection for a computer player
//! - [`game`]: turn controller alternating players and tracking the result
//! - [`relay`]: translation of two-player relay text lines into moves

pub mod bot;
pub mod game;
pub mod relay;

#[cfg(feature = "wasm")]
pub mod wasm;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use bot::{Difficulty, MoveSelector};
pub use game::{Game, GameMode, TurnOutcome};
pub use relay::{PieceId, RelayError, RelayMessage};

/// Player identifier.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum Player {
    One,
    Two,
}

impl Player {
    /// Get the opponent player.
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Player number (1 or 2).
    #[inline]
    pub fn number(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }

    /// Convert from a player number (1 or 2).
    #[inline]
    pub fn from_number(n: u8) -> Option<Player> {
        match n {
            1 => Some(Player::One),
            2 => Some(Player::Two),
            _ => None,
        }
    }
}

/// Cup size. Ordered by value, larger covers smaller.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Size {
    Small = 1,
    Medium = 2,
    Large = 3,
}

impl Size {
    /// Numeric value (1, 2, 3).
    #[inline]
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Check if this size can overwrite (cover) another size.
    #[inline]
    pub fn can_overwrite(self, other: Size) -> bool {
        self.value() > other.value()
    }

    /// Convert from value (1, 2, 3) to Size.
    #[inline]
    pub fn from_value(value: u8) -> Option<Size> {
        match value {
            1 => Some(Size::Small),
            2 => Some(Size::Medium),
            3 => Some(Size::Large),
            _ => None,
        }
    }

    /// All sizes, smallest first.
    pub fn all() -> impl DoubleEndedIterator<Item = Size> {
        [Size::Small, Size::Medium, Size::Large].into_iter()
    }

    #[inline]
    fn index(self) -> usize {
        self as usize - 1
    }
}

/// Position on the 3x3 board (0-8).
///
/// Layout:
/// ```text
///   0 1 2
///   3 4 5
///   6 7 8
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Pos(pub u8);

impl Pos {
    pub const CENTER: Pos = Pos(4);

    /// Create a position from row and column, rejecting anything outside 0-2.
    #[inline]
    pub fn new(row: u8, col: u8) -> Result<Pos, IllegalMove> {
        if row < 3 && col < 3 {
            Ok(Pos(row * 3 + col))
        } else {
            Err(IllegalMove::OutOfBounds { row, col })
        }
    }

    /// Get the row (0-2).
    #[inline]
    pub fn row(self) -> u8 {
        self.0 / 3
    }

    /// Get the column (0-2).
    #[inline]
    pub fn col(self) -> u8 {
        self.0 % 3
    }

    /// Check if this is a valid position (0-8).
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 < 9
    }

    /// Iterate over all 9 positions in row-major order.
    pub fn all() -> impl Iterator<Item = Pos> {
        (0..9).map(Pos)
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row(), self.col())
    }
}

/// A cup standing on the board.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub owner: Player,
    pub size: Size,
}

impl Piece {
    #[inline]
    pub fn new(owner: Player, size: Size) -> Piece {
        Piece { owner, size }
    }
}

/// A placement from `actor`'s reserve onto `to`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Move {
    pub actor: Player,
    pub size: Size,
    pub to: Pos,
}

impl Move {
    #[inline]
    pub fn new(actor: Player, size: Size, to: Pos) -> Move {
        Move { actor, size, to }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size_char = match self.size {
            Size::Small => 'S',
            Size::Medium => 'M',
            Size::Large => 'L',
        };
        write!(f, "P{} {}{}", self.actor.number(), size_char, self.to)
    }
}

/// Outcome of evaluating a board.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum GameResult {
    InProgress,
    Win(Player),
    Draw,
}

impl GameResult {
    #[inline]
    pub fn is_over(self) -> bool {
        self != GameResult::InProgress
    }
}

/// Why a move was rejected. Always recoverable: the driver drops the move
/// and the game continues.
#[derive(Clone, Copy, PartialEq, Eq, Debug, derive_more::Display)]
pub enum IllegalMove {
    #[display("Position ({row},{col}) is off the board")]
    OutOfBounds { row: u8, col: u8 },

    #[display("Cell {_0} already holds the mover's own cup")]
    OwnPiece(Pos),

    #[display("Cell {at} holds a {occupant:?} cup, a {size:?} cannot cover it")]
    Blocked { at: Pos, occupant: Size, size: Size },

    #[display("Player {} has no {size:?} cup left", player.number())]
    NotInReserve { player: Player, size: Size },

    #[display("It is not player {}'s turn", _0.number())]
    OutOfTurn(Player),

    #[display("Game is already over")]
    GameOver,
}

impl std::error::Error for IllegalMove {}

// ============================================================================
// RESERVES
// ============================================================================

/// Unplayed cups of one player.
///
/// Sizes are always visited smallest first, so "the first available cup of
/// at least size n" is the smallest one that fits.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Inventory {
    owner: Player,
    counts: [u8; 3],
}

impl Inventory {
    /// Cups of each size a player starts with.
    pub const PER_SIZE: u8 = 2;

    /// A full starting reserve.
    pub fn new(owner: Player) -> Inventory {
        Inventory {
            owner,
            counts: [Self::PER_SIZE; 3],
        }
    }

    /// A reserve with explicit counts `[small, medium, large]`, each capped at two.
    pub fn with_counts(owner: Player, counts: [u8; 3]) -> Inventory {
        Inventory {
            owner,
            counts: counts.map(|c| c.min(Self::PER_SIZE)),
        }
    }

    #[inline]
    pub fn owner(&self) -> Player {
        self.owner
    }

    /// Counts as `[small, medium, large]`.
    #[inline]
    pub fn counts(&self) -> [u8; 3] {
        self.counts
    }

    #[inline]
    pub fn count(&self, size: Size) -> u8 {
        self.counts[size.index()]
    }

    #[inline]
    pub fn has(&self, size: Size) -> bool {
        self.count(size) > 0
    }

    #[inline]
    pub fn total(&self) -> u8 {
        self.counts.iter().sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Sizes with at least one cup left, smallest first.
    pub fn sizes(&self) -> impl Iterator<Item = Size> + '_ {
        Size::all().filter(|&s| self.has(s))
    }

    /// Largest size still available.
    pub fn largest(&self) -> Option<Size> {
        Size::all().rev().find(|&s| self.has(s))
    }

    /// First available size whose value is at least `min`.
    ///
    /// `min` is a raw value so that 0 means "any cup".
    pub fn first_at_least(&self, min: u8) -> Option<Size> {
        self.sizes().find(|s| s.value() >= min)
    }

    /// Remove one cup of `size`. Returns false if none is left.
    pub fn take(&mut self, size: Size) -> bool {
        let slot = &mut self.counts[size.index()];
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }
}

/// Both players' reserves.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Reserves {
    one: Inventory,
    two: Inventory,
}

impl Reserves {
    pub fn new() -> Reserves {
        Reserves {
            one: Inventory::new(Player::One),
            two: Inventory::new(Player::Two),
        }
    }

    /// Build from two inventories, in either order.
    pub fn from_inventories(a: Inventory, b: Inventory) -> Reserves {
        debug_assert_ne!(a.owner(), b.owner());
        if a.owner() == Player::One {
            Reserves { one: a, two: b }
        } else {
            Reserves { one: b, two: a }
        }
    }

    #[inline]
    pub fn get(&self, player: Player) -> &Inventory {
        match player {
            Player::One => &self.one,
            Player::Two => &self.two,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, player: Player) -> &mut Inventory {
        match player {
            Player::One => &mut self.one,
            Player::Two => &mut self.two,
        }
    }
}

impl Default for Reserves {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// BOARD
// ============================================================================

/// `true` iff a cup of `size` may go onto a cell whose occupant has size
/// `existing` (`None` for an empty cell). Ownership is not considered here.
#[inline]
pub fn can_place(size: Size, existing: Option<Size>) -> bool {
    match existing {
        None => true,
        Some(occupant) => size.can_overwrite(occupant),
    }
}

/// The 3x3 grid. At most one cup per cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Board {
    cells: [Option<Piece>; 9],
}

impl Board {
    /// The 8 winning lines: 3 rows, 3 columns, 2 diagonals.
    pub const WIN_LINES: [[Pos; 3]; 8] = [
        [Pos(0), Pos(1), Pos(2)], // Row 0
        [Pos(3), Pos(4), Pos(5)], // Row 1
        [Pos(6), Pos(7), Pos(8)], // Row 2
        [Pos(0), Pos(3), Pos(6)], // Col 0
        [Pos(1), Pos(4), Pos(7)], // Col 1
        [Pos(2), Pos(5), Pos(8)], // Col 2
        [Pos(0), Pos(4), Pos(8)], // Main diagonal
        [Pos(2), Pos(4), Pos(6)], // Anti-diagonal
    ];

    /// Create a new empty board.
    #[inline]
    pub fn new() -> Board {
        Board { cells: [None; 9] }
    }

    /// The cup at a position, or None if the cell is empty or off the board.
    #[inline]
    pub fn cell(&self, pos: Pos) -> Option<Piece> {
        self.cells.get(pos.0 as usize).copied().flatten()
    }

    /// Put a cup on a cell without any validation (test and setup helper).
    #[inline]
    pub fn set_cell(&mut self, pos: Pos, piece: Option<Piece>) {
        if let Some(cell) = self.cells.get_mut(pos.0 as usize) {
            *cell = piece;
        }
    }

    /// Size of the occupant, or None if empty.
    #[inline]
    pub fn occupant_size(&self, pos: Pos) -> Option<Size> {
        self.cell(pos).map(|p| p.size)
    }

    /// Occupant size as a raw value (0 for an empty cell).
    #[inline]
    pub fn occupant_value(&self, pos: Pos) -> u8 {
        self.occupant_size(pos).map_or(0, Size::value)
    }

    #[inline]
    pub fn is_empty(&self, pos: Pos) -> bool {
        self.cell(pos).is_none()
    }

    /// All 9 cells occupied.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Check if a cup of the given size fits on this cell by size alone.
    #[inline]
    pub fn can_place(&self, size: Size, pos: Pos) -> bool {
        pos.is_valid() && can_place(size, self.occupant_size(pos))
    }

    /// Cells `actor` may drop a cup of `size` on: empty ones, and ones held
    /// by a smaller opposing cup.
    pub fn drop_targets(&self, actor: Player, size: Size) -> Vec<Pos> {
        Pos::all()
            .filter(|&pos| match self.cell(pos) {
                None => true,
                Some(p) => p.owner != actor && size.can_overwrite(p.size),
            })
            .collect()
    }

    /// Validate a move against this board and the mover's reserve.
    pub fn check(&self, stock: &Inventory, mov: Move) -> Result<(), IllegalMove> {
        if !mov.to.is_valid() {
            return Err(IllegalMove::OutOfBounds {
                row: mov.to.row(),
                col: mov.to.col(),
            });
        }
        if let Some(occupant) = self.cell(mov.to) {
            if occupant.owner == mov.actor {
                return Err(IllegalMove::OwnPiece(mov.to));
            }
            if !mov.size.can_overwrite(occupant.size) {
                return Err(IllegalMove::Blocked {
                    at: mov.to,
                    occupant: occupant.size,
                    size: mov.size,
                });
            }
        }
        if !stock.has(mov.size) {
            return Err(IllegalMove::NotInReserve {
                player: mov.actor,
                size: mov.size,
            });
        }
        Ok(())
    }

    /// Apply a move, taking the cup from `stock`.
    ///
    /// Returns the destroyed occupant, if any. On error neither the board
    /// nor the reserve is touched.
    pub fn apply(&mut self, stock: &mut Inventory, mov: Move) -> Result<Option<Piece>, IllegalMove> {
        debug_assert_eq!(stock.owner(), mov.actor);
        self.check(stock, mov)?;
        stock.take(mov.size);
        let destroyed = self.cell(mov.to);
        self.set_cell(mov.to, Some(Piece::new(mov.actor, mov.size)));
        Ok(destroyed)
    }

    // ========== Win Detection ==========

    /// First line (in `WIN_LINES` order) fully owned by `player`.
    pub fn winning_line(&self, player: Player) -> Option<[Pos; 3]> {
        Self::WIN_LINES.iter().copied().find(|line| {
            line.iter()
                .all(|&pos| self.cell(pos).is_some_and(|p| p.owner == player))
        })
    }

    /// Evaluate the board. A completed line beats a full board.
    pub fn result(&self) -> GameResult {
        for line in &Self::WIN_LINES {
            let owners = line.map(|pos| self.cell(pos).map(|p| p.owner));
            if let [Some(a), Some(b), Some(c)] = owners {
                if a == b && b == c {
                    return GameResult::Win(a);
                }
            }
        }
        if self.is_full() {
            GameResult::Draw
        } else {
            GameResult::InProgress
        }
    }
}

// ============================================================================
// RULE ENGINE ENTRY POINTS
// ============================================================================

/// Candidate cells for the owner of a reserve.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct AvailableCells {
    /// Empty cells, row-major.
    pub free: Vec<Pos>,
    /// Opposing cells smaller than the largest cup left in the reserve, row-major.
    pub overwritable: Vec<Pos>,
}

impl AvailableCells {
    /// Scan the board on behalf of `stock`'s owner.
    pub fn scan(board: &Board, stock: &Inventory) -> AvailableCells {
        let actor = stock.owner();
        let largest = stock.largest();
        let mut cells = AvailableCells::default();

        for pos in Pos::all() {
            match board.cell(pos) {
                None => cells.free.push(pos),
                Some(p) if p.owner != actor => {
                    if largest.is_some_and(|l| l.can_overwrite(p.size)) {
                        cells.overwritable.push(pos);
                    }
                }
                Some(_) => {}
            }
        }
        cells
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty() && self.overwritable.is_empty()
    }

    #[inline]
    pub fn contains(&self, pos: Pos) -> bool {
        self.free.contains(&pos) || self.overwritable.contains(&pos)
    }
}

/// Apply a move to the board and the mover's reserve, then evaluate.
///
/// This is the only way game state changes.
#[instrument(skip(board, reserves), fields(mov = %mov))]
pub fn apply_move(board: &mut Board, reserves: &mut Reserves, mov: Move) -> Result<GameResult, IllegalMove> {
    let destroyed = board.apply(reserves.get_mut(mov.actor), mov)?;
    if let Some(piece) = destroyed {
        debug!(?piece, "cup destroyed");
    }
    let result = board.result();
    debug!(?result, "move applied");
    Ok(result)
}
