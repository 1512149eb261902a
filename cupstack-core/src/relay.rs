//! Relay line codec for two-player sessions.
//!
//! The relay forwards colon-delimited text lines between the two peers and
//! understands none of them. This module turns those lines into typed
//! messages and back, and translates a `move` line into a [`Move`].
//!
//! ```text
//! sync_labels:<nickname>
//! update_labels:<host>:<guest>
//! sync_current_player:<Player1|Player2>
//! move:<piece id>:<row>:<col>:<color>:<w>:<h>:<next player>
//! game_over:win:<Player1|Player2>
//! game_over:draw
//! restart_request:<nickname>
//! restart_confirmed
//! player_left:<nickname>
//! ```
//!
//! A piece id names one physical cup, e.g. `P1_SmallCircle1` is the first
//! small cup of player one. The rules engine never looks at the slot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{GameResult, Move, Player, Pos, Size};

/// Why a relay line was dropped.
#[derive(Clone, PartialEq, Eq, Debug, derive_more::Display)]
pub enum RelayError {
    #[display("Empty relay line")]
    Empty,

    #[display("Unknown message kind: {_0}")]
    UnknownKind(String),

    #[display("{kind} expects {expected} fields, got {found}")]
    FieldCount {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[display("{kind}: invalid {field} '{value}'")]
    BadField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
}

impl std::error::Error for RelayError {}

/// One specific cup: owner, size and which of the two same-size cups.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct PieceId {
    pub owner: Player,
    pub size: Size,
    /// 1 or 2.
    pub slot: u8,
}

impl PieceId {
    pub fn new(owner: Player, size: Size, slot: u8) -> PieceId {
        debug_assert!(slot == 1 || slot == 2);
        PieceId { owner, size, slot }
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}_{:?}Circle{}", self.owner.number(), self.size, self.slot)
    }
}

impl FromStr for PieceId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, rest) = s.split_once('_').ok_or(())?;
        let owner = match prefix {
            "P1" => Player::One,
            "P2" => Player::Two,
            _ => return Err(()),
        };
        let (size, rest) = [Size::Small, Size::Medium, Size::Large]
            .into_iter()
            .find_map(|size| rest.strip_prefix(size_name(size)).map(|r| (size, r)))
            .ok_or(())?;
        let slot = match rest.strip_prefix("Circle").ok_or(())? {
            "1" => 1,
            "2" => 2,
            _ => return Err(()),
        };
        Ok(PieceId { owner, size, slot })
    }
}

fn size_name(size: Size) -> &'static str {
    match size {
        Size::Small => "Small",
        Size::Medium => "Medium",
        Size::Large => "Large",
    }
}

fn player_token(player: Player) -> &'static str {
    match player {
        Player::One => "Player1",
        Player::Two => "Player2",
    }
}

fn parse_player(kind: &'static str, value: &str) -> Result<Player, RelayError> {
    match value {
        "Player1" => Ok(Player::One),
        "Player2" => Ok(Player::Two),
        _ => Err(bad(kind, "player", value)),
    }
}

fn bad(kind: &'static str, field: &'static str, value: &str) -> RelayError {
    RelayError::BadField {
        kind,
        field,
        value: value.to_string(),
    }
}

fn expect_fields(kind: &'static str, parts: &[&str], expected: usize) -> Result<(), RelayError> {
    if parts.len() == expected {
        Ok(())
    } else {
        Err(RelayError::FieldCount {
            kind,
            expected,
            found: parts.len(),
        })
    }
}

fn parse_coord(kind: &'static str, field: &'static str, value: &str) -> Result<u8, RelayError> {
    value
        .parse::<u8>()
        .ok()
        .filter(|&v| v < 3)
        .ok_or_else(|| bad(kind, field, value))
}

fn parse_dimension(kind: &'static str, field: &'static str, value: &str) -> Result<f32, RelayError> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| bad(kind, field, value))
}

/// A typed relay line.
#[derive(Clone, PartialEq, Debug)]
pub enum RelayMessage {
    SyncLabels { nickname: String },
    UpdateLabels { host: String, guest: String },
    SyncCurrentPlayer(Player),
    /// A placed cup. Color and dimensions are presentation data passed
    /// through for the peer's renderer.
    Move {
        piece: PieceId,
        row: u8,
        col: u8,
        color: String,
        width: f32,
        height: f32,
        next: Player,
    },
    /// `None` for a draw.
    GameOver { winner: Option<Player> },
    RestartRequest { nickname: String },
    RestartConfirmed,
    PlayerLeft { nickname: String },
}

impl RelayMessage {
    /// Outgoing `move` line for an accepted placement.
    pub fn for_move(mov: Move, slot: u8, color: &str, width: f32, height: f32) -> RelayMessage {
        RelayMessage::Move {
            piece: PieceId::new(mov.actor, mov.size, slot),
            row: mov.to.row(),
            col: mov.to.col(),
            color: color.to_string(),
            width,
            height,
            next: mov.actor.opponent(),
        }
    }

    /// Outgoing `game_over` line, or None while the game is running.
    pub fn for_result(result: GameResult) -> Option<RelayMessage> {
        match result {
            GameResult::InProgress => None,
            GameResult::Win(winner) => Some(RelayMessage::GameOver { winner: Some(winner) }),
            GameResult::Draw => Some(RelayMessage::GameOver { winner: None }),
        }
    }

    /// The core move carried by a `move` line.
    pub fn to_move(&self) -> Option<Move> {
        match self {
            RelayMessage::Move { piece, row, col, .. } => {
                let to = Pos::new(*row, *col).ok()?;
                Some(Move::new(piece.owner, piece.size, to))
            }
            _ => None,
        }
    }
}

impl FromStr for RelayMessage {
    type Err = RelayError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(RelayError::Empty);
        }
        let parts: Vec<&str> = line.split(':').collect();

        match parts[0] {
            "sync_labels" => {
                expect_fields("sync_labels", &parts, 2)?;
                Ok(RelayMessage::SyncLabels {
                    nickname: parts[1].to_string(),
                })
            }
            "update_labels" => {
                expect_fields("update_labels", &parts, 3)?;
                Ok(RelayMessage::UpdateLabels {
                    host: parts[1].to_string(),
                    guest: parts[2].to_string(),
                })
            }
            "sync_current_player" => {
                expect_fields("sync_current_player", &parts, 2)?;
                Ok(RelayMessage::SyncCurrentPlayer(parse_player("sync_current_player", parts[1])?))
            }
            "move" => {
                const KIND: &str = "move";
                expect_fields(KIND, &parts, 8)?;
                let piece = parts[1].parse::<PieceId>().map_err(|_| bad(KIND, "piece", parts[1]))?;
                Ok(RelayMessage::Move {
                    piece,
                    row: parse_coord(KIND, "row", parts[2])?,
                    col: parse_coord(KIND, "col", parts[3])?,
                    color: parts[4].to_string(),
                    width: parse_dimension(KIND, "width", parts[5])?,
                    height: parse_dimension(KIND, "height", parts[6])?,
                    next: parse_player(KIND, parts[7])?,
                })
            }
            "game_over" => match parts.get(1).copied() {
                Some("win") => {
                    expect_fields("game_over", &parts, 3)?;
                    Ok(RelayMessage::GameOver {
                        winner: Some(parse_player("game_over", parts[2])?),
                    })
                }
                Some("draw") => {
                    expect_fields("game_over", &parts, 2)?;
                    Ok(RelayMessage::GameOver { winner: None })
                }
                Some(other) => Err(bad("game_over", "result", other)),
                None => Err(RelayError::FieldCount {
                    kind: "game_over",
                    expected: 2,
                    found: 1,
                }),
            },
            "restart_request" => {
                expect_fields("restart_request", &parts, 2)?;
                Ok(RelayMessage::RestartRequest {
                    nickname: parts[1].to_string(),
                })
            }
            "restart_confirmed" => {
                expect_fields("restart_confirmed", &parts, 1)?;
                Ok(RelayMessage::RestartConfirmed)
            }
            "player_left" => {
                expect_fields("player_left", &parts, 2)?;
                Ok(RelayMessage::PlayerLeft {
                    nickname: parts[1].to_string(),
                })
            }
            other => Err(RelayError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for RelayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMessage::SyncLabels { nickname } => write!(f, "sync_labels:{}", nickname),
            RelayMessage::UpdateLabels { host, guest } => write!(f, "update_labels:{}:{}", host, guest),
            RelayMessage::SyncCurrentPlayer(player) => {
                write!(f, "sync_current_player:{}", player_token(*player))
            }
            RelayMessage::Move {
                piece,
                row,
                col,
                color,
                width,
                height,
                next,
            } => write!(
                f,
                "move:{}:{}:{}:{}:{}:{}:{}",
                piece,
                row,
                col,
                color,
                width,
                height,
                player_token(*next)
            ),
            RelayMessage::GameOver { winner: Some(winner) } => {
                write!(f, "game_over:win:{}", player_token(*winner))
            }
            RelayMessage::GameOver { winner: None } => f.write_str("game_over:draw"),
            RelayMessage::RestartRequest { nickname } => write!(f, "restart_request:{}", nickname),
            RelayMessage::RestartConfirmed => f.write_str("restart_confirmed"),
            RelayMessage::PlayerLeft { nickname } => write!(f, "player_left:{}", nickname),
        }
    }
}
