use crate::vec2::{length_sq, sub, vec2, Vec2};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Ball number: 0 = cue, 1-7 solids, 8 = eight-ball, 9-15 stripes.
pub type BallId = u8;

pub const CUE_BALL: BallId = 0;
pub const EIGHT_BALL: BallId = 8;
pub const BALL_COUNT: usize = 16;

/// One of the two seats at a table. Serialized as `0` / `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    pub const BOTH: [Seat; 2] = [Seat::First, Seat::Second];

    pub fn opponent(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Seat::First => 0,
            Seat::Second => 1,
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> u8 {
        seat.index() as u8
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Seat::First),
            1 => Ok(Seat::Second),
            other => Err(format!("seat index must be 0 or 1, got {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Aim,
    Simulating,
    BallInHand,
    GameOver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct Ball {
    pub id: BallId,
    pub pos: Vec2,
    pub vel: Vec2,
    pub pocketed: bool,
}

impl Ball {
    pub fn at_rest(id: BallId, pos: Vec2) -> Self {
        Self {
            id,
            pos,
            vel: Vec2::ZERO,
            pocketed: false,
        }
    }
}

/// Table geometry. All lengths in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub width: f64,
    pub height: f64,
    pub ball_radius: f64,
    pub pocket_radius: f64,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            width: 2.84,
            height: 1.42,
            ball_radius: 0.028575,
            pocket_radius: 0.11,
        }
    }
}

impl Table {
    pub fn validate(&self) -> Result<(), String> {
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err("width must be finite and > 0".to_string());
        }
        if !self.height.is_finite() || self.height <= 0.0 {
            return Err("height must be finite and > 0".to_string());
        }
        if !self.ball_radius.is_finite() || self.ball_radius <= 0.0 {
            return Err("ball_radius must be finite and > 0".to_string());
        }
        if 2.0 * self.ball_radius >= self.width.min(self.height) {
            return Err("ball_radius too large for table".to_string());
        }
        if !self.pocket_radius.is_finite() || self.pocket_radius <= 0.0 {
            return Err("pocket_radius must be finite and > 0".to_string());
        }
        Ok(())
    }

    /// Four corners plus the two side-rail midpoints.
    pub fn pocket_centers(&self) -> [Vec2; 6] {
        let w = self.width;
        let h = self.height;
        [
            vec2(0.0, 0.0),
            vec2(w / 2.0, 0.0),
            vec2(w, 0.0),
            vec2(0.0, h),
            vec2(w / 2.0, h),
            vec2(w, h),
        ]
    }

    pub fn is_in_pocket(&self, p: Vec2) -> bool {
        let pr2 = self.pocket_radius * self.pocket_radius;
        self.pocket_centers()
            .iter()
            .any(|c| length_sq(sub(p, *c)) <= pr2)
    }

    /// Clamp a point onto the legal center area (inset by one ball radius).
    pub fn clamp_to_play_area(&self, p: Vec2) -> Vec2 {
        let r = self.ball_radius;
        vec2(
            p.x.clamp(r, self.width - r),
            p.y.clamp(r, self.height - r),
        )
    }

    /// Head spot: where the cue ball starts and returns after a foul.
    pub fn cue_spot(&self) -> Vec2 {
        vec2(self.width * 0.25, self.height / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    #[ts(type = "number")]
    pub tick: u64,
    pub phase: GamePhase,
    #[ts(type = "0 | 1")]
    pub current_player: Seat,
    pub table: Table,
    pub balls: Vec<Ball>,
}

impl GameState {
    /// Fresh game: racked balls, first seat to break.
    pub fn new(table: Table) -> Self {
        Self {
            tick: 0,
            phase: GamePhase::Aim,
            current_player: Seat::First,
            table,
            balls: rack_balls(&table),
        }
    }

    pub fn ball(&self, id: BallId) -> Option<&Ball> {
        self.balls.iter().find(|b| b.id == id)
    }

    pub fn ball_mut(&mut self, id: BallId) -> Option<&mut Ball> {
        self.balls.iter_mut().find(|b| b.id == id)
    }

    pub fn cue_ball(&self) -> Option<&Ball> {
        self.ball(CUE_BALL)
    }

    pub fn cue_ball_mut(&mut self) -> Option<&mut Ball> {
        self.ball_mut(CUE_BALL)
    }
}

/// Cue ball on the head spot and a five-row triangle of object balls
/// with its apex toward the cue.
pub fn rack_balls(table: &Table) -> Vec<Ball> {
    const GAP: f64 = 0.0001;
    let r = table.ball_radius;
    let apex = vec2(table.width * 0.72, table.height / 2.0);
    let row_spacing = 3f64.sqrt() * r + GAP;
    let ball_spacing = 2.0 * r + GAP;

    let mut balls = Vec::with_capacity(BALL_COUNT);
    balls.push(Ball::at_rest(CUE_BALL, table.cue_spot()));

    let mut id: BallId = 1;
    for row in 0..5u8 {
        for k in 0..=row {
            let x = apex.x + row as f64 * row_spacing;
            let y = apex.y + (k as f64 - row as f64 / 2.0) * ball_spacing;
            balls.push(Ball::at_rest(id, vec2(x, y)));
            id += 1;
        }
    }
    balls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec2::length;

    #[test]
    fn default_table_is_valid() {
        assert!(Table::default().validate().is_ok());
    }

    #[test]
    fn zero_width_table_invalid() {
        let table = Table {
            width: 0.0,
            ..Table::default()
        };
        assert!(table.validate().is_err());
    }

    #[test]
    fn rack_has_sixteen_unique_balls() {
        let balls = rack_balls(&Table::default());
        assert_eq!(balls.len(), BALL_COUNT);
        let mut ids: Vec<BallId> = balls.iter().map(|b| b.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..16).collect::<Vec<BallId>>());
    }

    #[test]
    fn rack_has_no_overlaps() {
        let table = Table::default();
        let balls = rack_balls(&table);
        for i in 0..balls.len() {
            for j in i + 1..balls.len() {
                let d = length(sub(balls[i].pos, balls[j].pos));
                assert!(
                    d >= 2.0 * table.ball_radius,
                    "balls {} and {} overlap",
                    balls[i].id,
                    balls[j].id
                );
            }
        }
    }

    #[test]
    fn rack_fits_inside_play_area() {
        let table = Table::default();
        for b in rack_balls(&table) {
            assert_eq!(table.clamp_to_play_area(b.pos), b.pos);
        }
    }

    #[test]
    fn pockets_are_corners_and_side_midpoints() {
        let table = Table {
            width: 2.0,
            height: 1.0,
            ..Table::default()
        };
        let pockets = table.pocket_centers();
        assert!(pockets.contains(&vec2(1.0, 0.0)));
        assert!(pockets.contains(&vec2(1.0, 1.0)));
        assert!(pockets.contains(&vec2(2.0, 1.0)));
        assert!(table.is_in_pocket(vec2(0.05, 0.05)));
        assert!(!table.is_in_pocket(vec2(0.5, 0.5)));
    }

    #[test]
    fn seat_serializes_as_index() {
        assert_eq!(serde_json::to_string(&Seat::Second).unwrap(), "1");
        let seat: Seat = serde_json::from_str("0").unwrap();
        assert_eq!(seat, Seat::First);
        assert!(serde_json::from_str::<Seat>("2").is_err());
        assert_eq!(Seat::First.opponent(), Seat::Second);
    }

    #[test]
    fn phase_wire_names() {
        assert_eq!(
            serde_json::to_string(&GamePhase::BallInHand).unwrap(),
            "\"ball_in_hand\""
        );
        assert_eq!(serde_json::to_string(&GamePhase::Aim).unwrap(), "\"aim\"");
    }
}
