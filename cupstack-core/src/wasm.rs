//! WASM bindings for cupstack-core
//!
//! Provides a JavaScript-friendly API for a browser front end: the page
//! renders and handles dragging, this wrapper owns the game.

use wasm_bindgen::prelude::*;

use crate::{
    Difficulty, Game, GameMode, GameResult, Move, MoveSelector, Player, Pos, RelayMessage, Size, TurnOutcome,
};

/// WASM-friendly wrapper around a game and its bot.
#[wasm_bindgen]
pub struct WasmGame {
    inner: Game,
    selector: MoveSelector,
}

#[wasm_bindgen]
impl WasmGame {
    /// Create a new game. `difficulty` is 0-2 for a bot game, or undefined
    /// for two humans.
    #[wasm_bindgen(constructor)]
    pub fn new(difficulty: Option<u8>) -> WasmGame {
        WasmGame {
            inner: Game::new(mode_for(difficulty)),
            selector: MoveSelector::from_os_rng(),
        }
    }

    /// Restart, optionally switching mode.
    pub fn reset(&mut self, difficulty: Option<u8>) {
        self.inner = Game::new(mode_for(difficulty));
    }

    /// Player to move (1 or 2)
    #[wasm_bindgen(js_name = currentPlayer)]
    pub fn current_player(&self) -> u8 {
        self.inner.to_move().number()
    }

    /// Whether the bot should move now
    #[wasm_bindgen(js_name = isBotTurn)]
    pub fn is_bot_turn(&self) -> bool {
        self.inner.is_bot_turn()
    }

    /// Game result: "ongoing", "player_one_wins", "player_two_wins", or "draw"
    pub fn result(&self) -> String {
        result_name(self.inner.result()).to_string()
    }

    /// Get winning line as array of positions [row, col, row, col, row, col]
    /// Returns empty array if no winner
    #[wasm_bindgen(js_name = winningLine)]
    pub fn winning_line(&self) -> Vec<u8> {
        if let GameResult::Win(winner) = self.inner.result() {
            if let Some(line) = self.inner.board().winning_line(winner) {
                return line.iter().flat_map(|pos| [pos.row(), pos.col()]).collect();
            }
        }
        vec![]
    }

    /// Get reserves for a player as [small, medium, large]
    pub fn reserves(&self, player: u8) -> Vec<u8> {
        let p = Player::from_number(player).unwrap_or(Player::One);
        self.inner.reserves().get(p).counts().to_vec()
    }

    /// Cell contents as [player, size], or empty for an empty cell
    pub fn cell(&self, row: u8, col: u8) -> Vec<u8> {
        match Pos::new(row, col).ok().and_then(|pos| self.inner.board().cell(pos)) {
            Some(piece) => vec![piece.owner.number(), piece.size.value()],
            None => vec![],
        }
    }

    /// Cells to highlight while a cup of `size` (1-3) is dragged, as
    /// [row, col, row, col, ...]
    #[wasm_bindgen(js_name = dropTargets)]
    pub fn drop_targets(&self, size: u8) -> Vec<u8> {
        let Some(size) = Size::from_value(size) else {
            return vec![];
        };
        self.inner
            .drop_targets(size)
            .iter()
            .flat_map(|pos| [pos.row(), pos.col()])
            .collect()
    }

    /// Apply a placement for the player to move. Returns an error message
    /// if the move is illegal, undefined on success.
    #[wasm_bindgen(js_name = applyMove)]
    pub fn apply_move(&mut self, row: u8, col: u8, size: u8) -> Option<String> {
        let Some(size) = Size::from_value(size) else {
            return Some(format!("Invalid size: {}", size));
        };
        let to = match Pos::new(row, col) {
            Ok(pos) => pos,
            Err(err) => return Some(err.to_string()),
        };
        self.inner
            .play(Move::new(self.inner.to_move(), size, to))
            .err()
            .map(|err| err.to_string())
    }

    /// Run the bot's turn. Returns the placed move as [row, col, size], or
    /// an empty array if the bot passed.
    #[wasm_bindgen(js_name = botMove)]
    pub fn bot_move(&mut self) -> Vec<u8> {
        match self.inner.bot_turn(&mut self.selector) {
            TurnOutcome::Placed { mov, .. } => vec![mov.to.row(), mov.to.col(), mov.size.value()],
            TurnOutcome::Passed => vec![],
        }
    }

    /// Apply a `move:` line received from the relay. Returns an error
    /// message if the line is malformed or the move illegal.
    #[wasm_bindgen(js_name = applyRelayLine)]
    pub fn apply_relay_line(&mut self, line: &str) -> Option<String> {
        let msg = match line.parse::<RelayMessage>() {
            Ok(msg) => msg,
            Err(err) => return Some(err.to_string()),
        };
        let mov = msg.to_move()?;
        self.inner.play(mov).err().map(|err| err.to_string())
    }

    /// Board and reserves as a JS object
    pub fn snapshot(&self) -> JsValue {
        let snapshot = Snapshot {
            board: self.inner.board(),
            reserves: self.inner.reserves(),
        };
        serde_wasm_bindgen::to_value(&snapshot).unwrap_or(JsValue::NULL)
    }
}

impl Default for WasmGame {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(serde::Serialize)]
struct Snapshot<'a> {
    board: &'a crate::Board,
    reserves: &'a crate::Reserves,
}

fn mode_for(difficulty: Option<u8>) -> GameMode {
    match difficulty {
        None => GameMode::Friend,
        Some(0) => GameMode::Bot { difficulty: Difficulty::Easy },
        Some(1) => GameMode::Bot { difficulty: Difficulty::Medium },
        Some(_) => GameMode::Bot { difficulty: Difficulty::Hard },
    }
}

fn result_name(result: GameResult) -> &'static str {
    match result {
        GameResult::InProgress => "ongoing",
        GameResult::Win(Player::One) => "player_one_wins",
        GameResult::Win(Player::Two) => "player_two_wins",
        GameResult::Draw => "draw",
    }
}
