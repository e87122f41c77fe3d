use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::rules::RulesState;
use crate::state::{GameState, Seat};

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

pub type MatchId = String;

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "hello")]
    Hello(HelloMsg),
    #[serde(rename = "queue_status")]
    QueueStatus(QueueStatusMsg),
    #[serde(rename = "match_found")]
    MatchFound(MatchFoundMsg),
    #[serde(rename = "match_ended")]
    MatchEnded(MatchEndedMsg),
    #[serde(rename = "snapshot")]
    Snapshot(SnapshotMsg),
    #[serde(rename = "pong")]
    Pong(PongMsg),
    #[serde(rename = "error")]
    Error(ErrorMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct HelloMsg {
    pub protocol_version: u32,
    pub session_id: String,
    /// Durable credential; present it as `?token=` to reclaim a seat.
    pub player_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusMsg {
    pub in_queue: bool,
    /// 1-based position while queued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundMsg {
    pub match_id: MatchId,
    #[ts(type = "0 | 1")]
    pub seat: Seat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    GameOver,
    Forfeit,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct MatchEndedMsg {
    pub match_id: MatchId,
    pub reason: EndReason,
    #[ts(type = "0 | 1 | null")]
    pub winner: Option<Seat>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[ts(type = "number")]
    pub tick: u64,
    #[ts(type = "number")]
    pub server_time_ms: u64,
    pub state: GameState,
    pub rules: RulesState,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMsg {
    pub match_id: MatchId,
    pub snapshot: GameSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PongMsg {
    pub client_time_ms: f64,
    #[ts(type = "number")]
    pub server_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct ErrorMsg {
    pub code: String,
    pub message: String,
}

impl ErrorMsg {
    pub fn bad_message() -> Self {
        Self {
            code: "bad_message".to_string(),
            message: "Unrecognized message.".to_string(),
        }
    }

    pub fn not_implemented(what: &str) -> Self {
        Self {
            code: "not_implemented".to_string(),
            message: format!("{} is not implemented yet.", what),
        }
    }
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "join_queue")]
    JoinQueue(JoinQueueMsg),
    #[serde(rename = "leave_queue")]
    LeaveQueue,
    #[serde(rename = "leave_match")]
    LeaveMatch(MatchRefMsg),
    #[serde(rename = "rematch")]
    Rematch(MatchRefMsg),
    #[serde(rename = "aim")]
    Aim(AimMsg),
    #[serde(rename = "place_cue")]
    PlaceCue(PlaceCueMsg),
    #[serde(rename = "shoot")]
    Shoot(ShootMsg),
    #[serde(rename = "ping")]
    Ping(PingMsg),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct JoinQueueMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct MatchRefMsg {
    pub match_id: MatchId,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct AimMsg {
    pub match_id: MatchId,
    #[ts(type = "number")]
    pub seq: u64,
    pub aim_angle_rad: f64,
    /// Normalized cue power in [0, 1]
    pub power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PlaceCueMsg {
    pub match_id: MatchId,
    #[ts(type = "number")]
    pub seq: u64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct ShootMsg {
    pub match_id: MatchId,
    #[ts(type = "number")]
    pub seq: u64,
    pub client_shot_id: String,
    pub aim_angle_rad: f64,
    /// Normalized cue power in (0, 1]
    pub power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PingMsg {
    pub client_time_ms: f64,
}

impl ClientMsg {
    /// Decode one text frame. Rejects anything serde rejects plus
    /// non-finite numbers.
    pub fn parse(text: &str) -> Option<ClientMsg> {
        let msg: ClientMsg = serde_json::from_str(text).ok()?;
        msg.numbers_finite().then_some(msg)
    }

    fn numbers_finite(&self) -> bool {
        match self {
            ClientMsg::Aim(m) => m.aim_angle_rad.is_finite() && m.power.is_finite(),
            ClientMsg::PlaceCue(m) => m.x.is_finite() && m.y.is_finite(),
            ClientMsg::Shoot(m) => m.aim_angle_rad.is_finite() && m.power.is_finite(),
            ClientMsg::Ping(m) => m.client_time_ms.is_finite(),
            ClientMsg::JoinQueue(_)
            | ClientMsg::LeaveQueue
            | ClientMsg::LeaveMatch(_)
            | ClientMsg::Rematch(_) => true,
        }
    }
}
