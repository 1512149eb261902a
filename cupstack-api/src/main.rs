//! Cupstack Web API
//!
//! Serves one in-memory game over JSON. A browser front end renders the
//! board and cups; every rule decision and every bot move happens here.
//!
//! In bot mode the human plays `Player::One`. After an accepted human move
//! the `/move` handler waits the configured thinking delay, then lets the
//! bot answer in the same response.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};
use tracing_subscriber::EnvFilter;

use cupstack_core::{
    Difficulty, Game, GameMode, GameResult, IllegalMove, Inventory, Move, MoveSelector, Player, Pos, RelayError,
    RelayMessage, Size, TurnOutcome,
};

// =============================================================================
// Configuration
// =============================================================================

/// Who the human faces when the server starts or a reset names no mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
enum ModeName {
    Bot,
    Friend,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cupstack-api", about = "Stacking tic-tac-toe over HTTP")]
struct Config {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// How long the bot "thinks" before answering, in milliseconds
    #[arg(long, default_value_t = 1000)]
    think_ms: u64,

    #[arg(long, value_enum, default_value_t = ModeName::Bot)]
    mode: ModeName,

    /// easy, medium or hard
    #[arg(long, default_value = "easy")]
    difficulty: Difficulty,

    /// Fixed seed for a reproducible bot
    #[arg(long)]
    seed: Option<u64>,
}

impl Config {
    fn game_mode(&self) -> GameMode {
        match self.mode {
            ModeName::Bot => GameMode::Bot {
                difficulty: self.difficulty,
            },
            ModeName::Friend => GameMode::Friend,
        }
    }
}

// =============================================================================
// Session State
// =============================================================================

/// The running game and the bot's random source.
struct Session {
    game: Game,
    selector: MoveSelector,
}

/// Shared application state
struct AppStateInner {
    session: Mutex<Session>,
    think: Duration,
}

impl AppStateInner {
    fn new(config: &Config) -> Self {
        let selector = match config.seed {
            Some(seed) => MoveSelector::seeded(seed),
            None => MoveSelector::from_os_rng(),
        };
        AppStateInner {
            session: Mutex::new(Session {
                game: Game::new(config.game_mode()),
                selector,
            }),
            think: Duration::from_millis(config.think_ms),
        }
    }

    /// Handlers never panic while holding the lock, so a poisoned session
    /// is still consistent.
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

type AppState = Arc<AppStateInner>;

/// The human's side in bot mode.
const HUMAN: Player = Player::One;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, derive_more::Display, derive_more::From)]
enum ApiError {
    #[display("{_0}")]
    Illegal(IllegalMove),
    #[display("{_0}")]
    Relay(RelayError),
    #[display("{_0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorModel {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(error = %self, "rejected request");
        let body = Json(ErrorModel {
            detail: self.to_string(),
        });
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

// =============================================================================
// JSON Models
// =============================================================================

#[derive(Serialize)]
struct PieceModel {
    player: u8,
    size: u8, // 1=small, 2=medium, 3=large
}

#[derive(Serialize)]
struct ReservesModel {
    small: u8,
    medium: u8,
    large: u8,
}

#[derive(Serialize)]
struct GameStateModel {
    /// Rows of cells, `null` for an empty cell
    board: Vec<Vec<Option<PieceModel>>>,
    reserves: HashMap<String, ReservesModel>,
    current_player: u8,
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    difficulty: Option<Difficulty>,
    result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    winning_line: Option<Vec<(u8, u8)>>,
}

#[derive(Serialize)]
struct CellsModel {
    free: Vec<(u8, u8)>,
    overwritable: Vec<(u8, u8)>,
}

#[derive(Serialize)]
struct MoveModel {
    player: u8,
    row: u8,
    col: u8,
    size: u8,
}

#[derive(Serialize)]
struct BotReplyModel {
    passed: bool,
    #[serde(rename = "move", skip_serializing_if = "Option::is_none")]
    mov: Option<MoveModel>,
}

#[derive(Serialize)]
struct MoveResponse {
    state: GameStateModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    bot: Option<BotReplyModel>,
    /// Lines for the relay peer (friend mode only)
    relay: Vec<String>,
}

#[derive(Deserialize)]
struct MoveRequest {
    row: u8,
    col: u8,
    size: u8,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ResetRequest {
    mode: Option<ModeName>,
    difficulty: Option<Difficulty>,
}

#[derive(Serialize)]
struct RelayAckModel {
    applied: bool,
    state: GameStateModel,
}

#[derive(Serialize)]
struct HealthModel {
    status: String,
}

// =============================================================================
// Conversion Functions
// =============================================================================

fn game_to_model(game: &Game) -> GameStateModel {
    let board = game.board();
    let rows = (0..3)
        .map(|row| {
            (0..3)
                .map(|col| {
                    board.cell(Pos(row * 3 + col)).map(|piece| PieceModel {
                        player: piece.owner.number(),
                        size: piece.size.value(),
                    })
                })
                .collect()
        })
        .collect();

    let mut reserves = HashMap::new();
    for player in [Player::One, Player::Two] {
        let [small, medium, large] = game.reserves().get(player).counts();
        reserves.insert(player.number().to_string(), ReservesModel { small, medium, large });
    }

    let (result, winning_line) = match game.result() {
        GameResult::InProgress => ("ongoing", None),
        GameResult::Draw => ("draw", None),
        GameResult::Win(winner) => {
            let line = board.winning_line(winner).map(|line| pairs(&line));
            let name = match winner {
                Player::One => "player_one_wins",
                Player::Two => "player_two_wins",
            };
            (name, line)
        }
    };

    let (mode, difficulty) = match game.mode() {
        GameMode::Friend => ("friend", None),
        GameMode::Bot { difficulty } => ("bot", Some(difficulty)),
    };

    GameStateModel {
        board: rows,
        reserves,
        current_player: game.to_move().number(),
        mode,
        difficulty,
        result,
        winning_line,
    }
}

fn pairs(cells: &[Pos]) -> Vec<(u8, u8)> {
    cells.iter().map(|pos| (pos.row(), pos.col())).collect()
}

fn move_to_model(mov: Move) -> MoveModel {
    MoveModel {
        player: mov.actor.number(),
        row: mov.to.row(),
        col: mov.to.col(),
        size: mov.size.value(),
    }
}

fn parse_size(value: u8) -> Result<Size, ApiError> {
    Size::from_value(value).ok_or_else(|| ApiError::BadRequest(format!("Invalid size: {}", value)))
}

/// Cup tint sent to the relay peer, as an html color.
fn cup_color(player: Player) -> &'static str {
    match player {
        Player::One => "e8553eff",
        Player::Two => "3e7be8ff",
    }
}

/// Cup diameter sent to the relay peer.
fn cup_width(size: Size) -> f32 {
    match size {
        Size::Small => 40.0,
        Size::Medium => 60.0,
        Size::Large => 80.0,
    }
}

/// Relay lines for an accepted friend-mode move: the `move` line, then
/// `game_over` if it ended the game.
fn relay_lines(game: &Game, mov: Move) -> Vec<String> {
    let left = game.reserves().get(mov.actor).count(mov.size);
    let slot = Inventory::PER_SIZE - left;
    let width = cup_width(mov.size);
    let placed = RelayMessage::for_move(mov, slot, cup_color(mov.actor), width, width);

    std::iter::once(placed)
        .chain(RelayMessage::for_result(game.result()))
        .map(|msg| msg.to_string())
        .collect()
}

// =============================================================================
// API Endpoints
// =============================================================================

async fn get_game(State(state): State<AppState>) -> Json<GameStateModel> {
    let session = state.session();
    Json(game_to_model(&session.game))
}

async fn get_cells(State(state): State<AppState>) -> Json<CellsModel> {
    let session = state.session();
    let cells = session.game.available_cells();
    Json(CellsModel {
        free: pairs(&cells.free),
        overwritable: pairs(&cells.overwritable),
    })
}

async fn get_targets(
    State(state): State<AppState>,
    Path(size): Path<u8>,
) -> Result<Json<Vec<(u8, u8)>>, ApiError> {
    let size = parse_size(size)?;
    let session = state.session();
    Ok(Json(pairs(&session.game.drop_targets(size))))
}

#[instrument(skip_all, fields(row = req.row, col = req.col, size = req.size))]
async fn make_move(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MoveResponse>, ApiError> {
    let size = parse_size(req.size)?;
    let to = Pos::new(req.row, req.col)?;

    let (mov, bot_to_move) = {
        let mut session = state.session();
        // Against the bot the human is always Player One, so a second move
        // sent while the bot thinks is out of turn.
        let actor = match session.game.mode() {
            GameMode::Bot { .. } => HUMAN,
            GameMode::Friend => session.game.to_move(),
        };
        let mov = Move::new(actor, size, to);
        let result = session.game.play(mov)?;
        info!(player = actor.number(), ?result, "move accepted");
        (mov, session.game.is_bot_turn())
    };

    // The lock is not held while the bot thinks.
    let bot = if bot_to_move {
        tokio::time::sleep(state.think).await;
        let mut session = state.session();
        let Session { game, selector } = &mut *session;
        let reply = match game.bot_turn(selector) {
            TurnOutcome::Placed { mov, result } => {
                info!(%mov, ?result, "bot moved");
                BotReplyModel {
                    passed: false,
                    mov: Some(move_to_model(mov)),
                }
            }
            TurnOutcome::Passed => {
                info!("bot passed");
                BotReplyModel { passed: true, mov: None }
            }
        };
        Some(reply)
    } else {
        None
    };

    let session = state.session();
    let relay = match session.game.mode() {
        GameMode::Friend => relay_lines(&session.game, mov),
        GameMode::Bot { .. } => Vec::new(),
    };
    Ok(Json(MoveResponse {
        state: game_to_model(&session.game),
        bot,
        relay,
    }))
}

async fn reset_game(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Json<GameStateModel> {
    let mut session = state.session();
    let current = session.game.mode();

    let mode = match (req.mode, current) {
        (Some(ModeName::Friend), _) => GameMode::Friend,
        (Some(ModeName::Bot), GameMode::Bot { difficulty }) | (None, GameMode::Bot { difficulty }) => GameMode::Bot {
            difficulty: req.difficulty.unwrap_or(difficulty),
        },
        (Some(ModeName::Bot), GameMode::Friend) => GameMode::Bot {
            difficulty: req.difficulty.unwrap_or_default(),
        },
        (None, GameMode::Friend) => GameMode::Friend,
    };

    session.game = Game::new(mode);
    info!(?mode, "game reset");
    Json(game_to_model(&session.game))
}

/// Feed one line from the relay peer into the session.
async fn relay(State(state): State<AppState>, body: String) -> Result<Json<RelayAckModel>, ApiError> {
    let msg: RelayMessage = body.parse()?;
    let mut session = state.session();

    let applied = match &msg {
        RelayMessage::Move { .. } => {
            if session.game.mode() != GameMode::Friend {
                return Err(ApiError::BadRequest("Relay moves are only accepted in friend mode".to_string()));
            }
            let mov = msg
                .to_move()
                .ok_or_else(|| ApiError::BadRequest(format!("Unplayable relay move: {}", msg)))?;
            session.game.play(mov)?;
            true
        }
        RelayMessage::RestartConfirmed => {
            session.game.reset();
            true
        }
        _ => false,
    };
    info!(line = %msg, applied, "relay line");

    Ok(Json(RelayAckModel {
        applied,
        state: game_to_model(&session.game),
    }))
}

async fn health() -> Json<HealthModel> {
    Json(HealthModel {
        status: "ok".to_string(),
    })
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/game", get(get_game))
        .route("/cells", get(get_cells))
        .route("/targets/{size}", get(get_targets))
        .route("/move", post(make_move))
        .route("/reset", post(reset_game))
        .route("/relay", post(relay))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    debug!(?config, "configuration");

    let state: AppState = Arc::new(AppStateInner::new(&config));
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, mode = ?config.game_mode(), "Cupstack API listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
