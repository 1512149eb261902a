//! Turn controller.
//!
//! Alternates the player to move after each accepted placement and keeps
//! the latest result. All rule and strategy decisions are delegated to the
//! rule engine and the [`MoveSelector`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::bot::{Difficulty, MoveSelector};
use crate::{apply_move, AvailableCells, Board, GameResult, IllegalMove, Move, Player, Pos, Reserves, Size};

/// Who sits on the other side of the board.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum GameMode {
    /// Two humans, local or over the relay.
    Friend,
    /// Human plays `Player::One`, the bot plays `Player::Two`.
    Bot { difficulty: Difficulty },
}

/// What happened on the bot's turn.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum TurnOutcome {
    Placed { mov: Move, result: GameResult },
    /// No move found, or the one found was rejected. The turn goes back.
    Passed,
}

/// One game: board, reserves, whose turn it is.
#[derive(Clone, Debug)]
pub struct Game {
    board: Board,
    reserves: Reserves,
    to_move: Player,
    mode: GameMode,
    result: GameResult,
}

impl Game {
    /// The side the bot plays in [`GameMode::Bot`].
    pub const BOT: Player = Player::Two;

    /// Fresh game, `Player::One` to move.
    pub fn new(mode: GameMode) -> Game {
        Game {
            board: Board::new(),
            reserves: Reserves::new(),
            to_move: Player::One,
            mode,
            result: GameResult::InProgress,
        }
    }

    /// Restart with the same mode.
    pub fn reset(&mut self) {
        *self = Game::new(self.mode);
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn reserves(&self) -> &Reserves {
        &self.reserves
    }

    pub fn to_move(&self) -> Player {
        self.to_move
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn is_over(&self) -> bool {
        self.result.is_over()
    }

    /// True when the game is running in bot mode and the bot should move.
    pub fn is_bot_turn(&self) -> bool {
        matches!(self.mode, GameMode::Bot { .. }) && self.to_move == Self::BOT && !self.is_over()
    }

    /// Free and overwritable cells for the player to move.
    pub fn available_cells(&self) -> AvailableCells {
        AvailableCells::scan(&self.board, self.reserves.get(self.to_move))
    }

    /// Where the player to move may drop a cup of `size` right now.
    pub fn drop_targets(&self, size: Size) -> Vec<Pos> {
        if !self.reserves.get(self.to_move).has(size) {
            return Vec::new();
        }
        self.board.drop_targets(self.to_move, size)
    }

    /// Validate and apply a move for the player to move.
    #[instrument(skip(self), fields(mov = %mov))]
    pub fn play(&mut self, mov: Move) -> Result<GameResult, IllegalMove> {
        if self.is_over() {
            return Err(IllegalMove::GameOver);
        }
        if mov.actor != self.to_move {
            return Err(IllegalMove::OutOfTurn(mov.actor));
        }

        let result = apply_move(&mut self.board, &mut self.reserves, mov)?;
        self.result = result;
        match result {
            GameResult::InProgress => self.to_move = self.to_move.opponent(),
            GameResult::Win(winner) => info!(winner = winner.number(), "game won"),
            GameResult::Draw => info!("game drawn"),
        }
        Ok(result)
    }

    /// Let the bot move. Only meaningful while [`Game::is_bot_turn`] holds.
    pub fn bot_turn<R: Rng>(&mut self, selector: &mut MoveSelector<R>) -> TurnOutcome {
        let GameMode::Bot { difficulty } = self.mode else {
            warn!("bot turn requested outside bot mode");
            return TurnOutcome::Passed;
        };
        if !self.is_bot_turn() {
            warn!(to_move = self.to_move.number(), "bot turn requested out of turn");
            return TurnOutcome::Passed;
        }

        let bot = self.reserves.get(Self::BOT);
        let opponent = self.reserves.get(Self::BOT.opponent());
        let Some(mov) = selector.select(&self.board, bot, opponent, difficulty) else {
            self.pass();
            return TurnOutcome::Passed;
        };

        match self.play(mov) {
            Ok(result) => TurnOutcome::Placed { mov, result },
            Err(err) => {
                warn!(%mov, %err, "bot move rejected, passing");
                self.pass();
                TurnOutcome::Passed
            }
        }
    }

    /// Hand the turn to the other player without placing.
    pub fn pass(&mut self) {
        if !self.is_over() {
            self.to_move = self.to_move.opponent();
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Game::new(GameMode::Friend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Inventory, Piece};

    fn mv(actor: Player, size: Size, row: u8, col: u8) -> Move {
        Move::new(actor, size, Pos::new(row, col).unwrap())
    }

    #[test]
    fn test_new_game() {
        let game = Game::new(GameMode::Friend);
        assert_eq!(game.to_move(), Player::One);
        assert_eq!(game.result(), GameResult::InProgress);
        assert_eq!(game.available_cells().free.len(), 9);
    }

    #[test]
    fn test_play_alternates() {
        let mut game = Game::default();
        assert_eq!(game.play(mv(Player::One, Size::Small, 1, 1)), Ok(GameResult::InProgress));
        assert_eq!(game.to_move(), Player::Two);
        assert_eq!(game.play(mv(Player::Two, Size::Medium, 1, 1)), Ok(GameResult::InProgress));
        assert_eq!(game.to_move(), Player::One);
        assert_eq!(game.board().cell(Pos::CENTER), Some(Piece::new(Player::Two, Size::Medium)));
    }

    #[test]
    fn test_play_out_of_turn() {
        let mut game = Game::default();
        let err = game.play(mv(Player::Two, Size::Small, 0, 0));
        assert_eq!(err, Err(IllegalMove::OutOfTurn(Player::Two)));
        assert_eq!(game.to_move(), Player::One);
    }

    #[test]
    fn test_illegal_move_keeps_turn() {
        let mut game = Game::default();
        game.play(mv(Player::One, Size::Large, 0, 0)).unwrap();
        let err = game.play(mv(Player::Two, Size::Large, 0, 0));
        assert!(matches!(err, Err(IllegalMove::Blocked { .. })));
        assert_eq!(game.to_move(), Player::Two);
        assert_eq!(game.reserves().get(Player::Two).total(), 6);
    }

    #[test]
    fn test_win_ends_game() {
        let mut game = Game::default();
        game.play(mv(Player::One, Size::Small, 0, 0)).unwrap();
        game.play(mv(Player::Two, Size::Small, 1, 0)).unwrap();
        game.play(mv(Player::One, Size::Small, 0, 1)).unwrap();
        game.play(mv(Player::Two, Size::Small, 1, 1)).unwrap();
        let result = game.play(mv(Player::One, Size::Medium, 0, 2));
        assert_eq!(result, Ok(GameResult::Win(Player::One)));
        assert!(game.is_over());
        assert_eq!(game.to_move(), Player::One);
        assert_eq!(game.play(mv(Player::Two, Size::Large, 2, 2)), Err(IllegalMove::GameOver));
    }

    #[test]
    fn test_reset() {
        let mut game = Game::new(GameMode::Bot { difficulty: Difficulty::Hard });
        game.play(mv(Player::One, Size::Small, 0, 0)).unwrap();
        game.reset();
        assert_eq!(game.board(), &Board::new());
        assert_eq!(game.reserves(), &Reserves::new());
        assert_eq!(game.to_move(), Player::One);
        assert_eq!(game.mode(), GameMode::Bot { difficulty: Difficulty::Hard });
    }

    #[test]
    fn test_drop_targets_respect_reserve() {
        let mut game = Game::default();
        game.play(mv(Player::One, Size::Small, 0, 0)).unwrap();
        assert_eq!(game.drop_targets(Size::Medium).len(), 9);
        assert_eq!(game.drop_targets(Size::Small).len(), 8);
    }

    #[test]
    fn test_bot_turn_places_and_returns_turn() {
        let mut game = Game::new(GameMode::Bot { difficulty: Difficulty::Medium });
        let mut selector = MoveSelector::seeded(1);
        assert!(!game.is_bot_turn());
        game.play(mv(Player::One, Size::Small, 0, 0)).unwrap();
        assert!(game.is_bot_turn());

        let outcome = game.bot_turn(&mut selector);
        // Medium covers the first overwritable cell with the smallest fitting cup.
        assert_eq!(
            outcome,
            TurnOutcome::Placed {
                mov: mv(Player::Two, Size::Medium, 0, 0),
                result: GameResult::InProgress,
            }
        );
        assert_eq!(game.to_move(), Player::One);
    }

    #[test]
    fn test_bot_turn_out_of_turn_is_noop() {
        let mut game = Game::new(GameMode::Bot { difficulty: Difficulty::Easy });
        let mut selector = MoveSelector::seeded(1);
        game.bot_turn(&mut selector);
        // Not the bot's turn: nothing changes.
        assert_eq!(game.to_move(), Player::One);
        assert_eq!(game.board(), &Board::new());
    }

    #[test]
    fn test_bot_turn_passes_with_empty_reserve() {
        let mut game = Game::new(GameMode::Bot { difficulty: Difficulty::Medium });
        game.reserves = Reserves::from_inventories(
            Inventory::new(Player::One),
            Inventory::with_counts(Player::Two, [0, 0, 0]),
        );
        game.play(mv(Player::One, Size::Small, 0, 0)).unwrap();
        let before = (game.board, game.reserves);

        let mut selector = MoveSelector::seeded(1);
        assert_eq!(game.bot_turn(&mut selector), TurnOutcome::Passed);
        assert_eq!(game.to_move(), Player::One);
        assert_eq!((game.board, game.reserves), before);
    }

    #[test]
    fn test_bot_turn_passes_on_rejected_forced_move() {
        // Own Smalls on 1, 4, 5, 6; opposing Larges elsewhere. Nothing is free
        // or overwritable, so the forced scan lands on the bot's own cup.
        let mut board = Board::new();
        for idx in [0, 2, 3, 7, 8] {
            board.set_cell(Pos(idx), Some(Piece::new(Player::One, Size::Large)));
        }
        for idx in [1, 4, 5, 6] {
            board.set_cell(Pos(idx), Some(Piece::new(Player::Two, Size::Small)));
        }
        assert_eq!(board.result(), GameResult::InProgress);

        let mut game = Game::new(GameMode::Bot { difficulty: Difficulty::Hard });
        game.board = board;
        game.reserves = Reserves::from_inventories(
            Inventory::with_counts(Player::One, [2, 2, 0]),
            Inventory::with_counts(Player::Two, [0, 1, 0]),
        );
        game.to_move = Player::Two;
        let before = (game.board, game.reserves);

        let mut selector = MoveSelector::seeded(1);
        assert_eq!(game.bot_turn(&mut selector), TurnOutcome::Passed);
        assert_eq!(game.to_move(), Player::One);
        assert_eq!((game.board, game.reserves), before);
    }

    #[test]
    fn test_bot_turn_outside_bot_mode() {
        let mut game = Game::default();
        game.play(mv(Player::One, Size::Small, 0, 0)).unwrap();
        let mut selector = MoveSelector::seeded(1);
        assert_eq!(game.bot_turn(&mut selector), TurnOutcome::Passed);
        assert_eq!(game.to_move(), Player::Two);
    }

    #[test]
    fn test_mode_serde() {
        let mode = GameMode::Bot { difficulty: Difficulty::Hard };
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, r#"{"mode":"bot","difficulty":"hard"}"#);
        let friend: GameMode = serde_json::from_str(r#"{"mode":"friend"}"#).unwrap();
        assert_eq!(friend, GameMode::Friend);
    }
}
