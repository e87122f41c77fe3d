//! Authoritative state for one two-seat match.
//!
//! `MatchRoom` is synchronous: the room's game loop task owns it and feeds
//! it commands and ticks one at a time, so every command is applied whole
//! between two ticks. Invalid commands (wrong seat, wrong phase, bad
//! placement) are dropped without telling the sender.

use crate::config::MatchConfig;
use crate::conn::{ConnHandle, ConnId};
use eightball_shared::physics::step_balls;
use eightball_shared::protocol::{
    AimMsg, EndReason, GameSnapshot, MatchEndedMsg, MatchId, PlaceCueMsg, ServerMsg, ShootMsg,
    SnapshotMsg,
};
use eightball_shared::rules::{analyze_shot, RulesState, ShotContext};
use eightball_shared::state::{GamePhase, GameState, Seat, CUE_BALL};
use eightball_shared::vec2::{from_angle, length_sq, scale, sub, vec2, Vec2};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Gameplay command from a seated player.
#[derive(Debug, Clone)]
pub enum SeatCommand {
    Aim(AimMsg),
    PlaceCue(PlaceCueMsg),
    Shoot(ShootMsg),
}

impl SeatCommand {
    pub fn match_id(&self) -> &str {
        match self {
            SeatCommand::Aim(m) => &m.match_id,
            SeatCommand::PlaceCue(m) => &m.match_id,
            SeatCommand::Shoot(m) => &m.match_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimState {
    pub seq: u64,
    pub aim_angle_rad: f64,
    pub power: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub match_id: MatchId,
    pub reason: EndReason,
    pub winner: Option<Seat>,
}

pub type EndCallback = Box<dyn FnOnce(&MatchOutcome) + Send>;

struct SeatSlot {
    token: String,
    conn: Option<ConnHandle>,
    /// Set while the seat has no live connection after having had one
    disconnected_at: Option<Instant>,
    last_aim: Option<AimState>,
}

impl SeatSlot {
    fn new(token: String) -> Self {
        Self {
            token,
            conn: None,
            disconnected_at: None,
            last_aim: None,
        }
    }
}

pub struct MatchRoom {
    id: MatchId,
    config: MatchConfig,
    seats: [SeatSlot; 2],
    state: GameState,
    rules: RulesState,
    shot: Option<ShotContext>,
    ended: bool,
    on_end: Option<EndCallback>,
}

impl MatchRoom {
    pub fn new(id: MatchId, tokens: [String; 2], config: MatchConfig) -> Self {
        let [first, second] = tokens;
        Self {
            id,
            state: GameState::new(config.table),
            config,
            seats: [SeatSlot::new(first), SeatSlot::new(second)],
            rules: RulesState::default(),
            shot: None,
            ended: false,
            on_end: None,
        }
    }

    /// Register the one-shot cleanup run when the match ends.
    pub fn on_end(mut self, callback: impl FnOnce(&MatchOutcome) + Send + 'static) -> Self {
        self.on_end = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn rules(&self) -> &RulesState {
        &self.rules
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn seat_of(&self, token: &str) -> Option<Seat> {
        Seat::BOTH
            .into_iter()
            .find(|seat| self.seats[seat.index()].token == token)
    }

    pub fn is_connected(&self, seat: Seat) -> bool {
        self.seats[seat.index()].conn.is_some()
    }

    pub fn last_aim(&self, seat: Seat) -> Option<AimState> {
        self.seats[seat.index()].last_aim
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            tick: self.state.tick,
            server_time_ms: unix_millis(),
            state: self.state.clone(),
            rules: self.rules.clone(),
        }
    }

    fn snapshot_msg(&self) -> ServerMsg {
        ServerMsg::Snapshot(SnapshotMsg {
            match_id: self.id.clone(),
            snapshot: self.snapshot(),
        })
    }

    fn broadcast(&self, msg: ServerMsg) {
        for conn in self.seats.iter().filter_map(|s| s.conn.as_ref()) {
            conn.send(msg.clone());
        }
    }

    fn broadcast_snapshot(&self) {
        self.broadcast(self.snapshot_msg());
    }

    // === Connectivity ===

    /// Bind a connection to the token's seat and send it a snapshot right away.
    pub fn attach(&mut self, token: &str, conn: ConnHandle) -> Option<Seat> {
        if self.ended {
            return None;
        }
        let seat = self.seat_of(token)?;
        conn.send(self.snapshot_msg());
        let slot = &mut self.seats[seat.index()];
        slot.conn = Some(conn);
        slot.disconnected_at = None;
        tracing::info!(match_id = %self.id, seat = seat.index(), "Seat attached");
        Some(seat)
    }

    /// Start the grace window for a seat, unless a newer connection already replaced `conn_id`.
    pub fn detach(&mut self, token: &str, conn_id: ConnId, now: Instant) {
        let Some(seat) = self.seat_of(token) else {
            return;
        };
        let slot = &mut self.seats[seat.index()];
        if slot.conn.as_ref().map(|c| c.id) != Some(conn_id) {
            return;
        }
        slot.conn = None;
        slot.disconnected_at = Some(now);
        tracing::info!(match_id = %self.id, seat = seat.index(), "Seat disconnected");
    }

    /// Seat that has been gone longer than the grace window, if any.
    fn expired_seat(&self, now: Instant) -> Option<Seat> {
        Seat::BOTH.into_iter().find(|seat| {
            let slot = &self.seats[seat.index()];
            slot.conn.is_none()
                && slot
                    .disconnected_at
                    .is_some_and(|at| now.saturating_duration_since(at) > self.config.reconnect_grace)
        })
    }

    // === Commands ===

    /// Apply a gameplay command. Returns whether it was accepted.
    pub fn handle_command(&mut self, token: &str, cmd: SeatCommand) -> bool {
        if self.ended {
            return false;
        }
        let Some(seat) = self.seat_of(token) else {
            return false;
        };
        let accepted = match &cmd {
            SeatCommand::Aim(m) => self.apply_aim(seat, m),
            SeatCommand::PlaceCue(m) => self.apply_place_cue(seat, m),
            SeatCommand::Shoot(m) => self.apply_shoot(seat, m),
        };
        if !accepted {
            tracing::debug!(
                match_id = %self.id,
                seat = seat.index(),
                phase = ?self.state.phase,
                ?cmd,
                "Dropped command"
            );
        }
        accepted
    }

    fn may_act(&self, seat: Seat) -> bool {
        matches!(self.state.phase, GamePhase::Aim | GamePhase::BallInHand)
            && seat == self.state.current_player
    }

    fn apply_aim(&mut self, seat: Seat, m: &AimMsg) -> bool {
        if !self.may_act(seat) {
            return false;
        }
        self.seats[seat.index()].last_aim = Some(AimState {
            seq: m.seq,
            aim_angle_rad: m.aim_angle_rad,
            power: m.power.clamp(0.0, 1.0),
        });
        true
    }

    fn apply_place_cue(&mut self, seat: Seat, m: &PlaceCueMsg) -> bool {
        if self.state.phase != GamePhase::BallInHand || seat != self.state.current_player {
            return false;
        }
        let table = self.state.table;
        let target = table.clamp_to_play_area(vec2(m.x, m.y));
        let min_d2 = (2.0 * table.ball_radius).powi(2);
        let blocked = self
            .state
            .balls
            .iter()
            .any(|b| b.id != CUE_BALL && !b.pocketed && length_sq(sub(b.pos, target)) < min_d2);
        if blocked {
            return false;
        }
        let Some(cue) = self.state.cue_ball_mut() else {
            return false;
        };
        cue.pocketed = false;
        cue.vel = Vec2::ZERO;
        cue.pos = target;
        self.broadcast_snapshot();
        true
    }

    fn apply_shoot(&mut self, seat: Seat, m: &ShootMsg) -> bool {
        // `!(x > 0)` also rejects NaN.
        if !self.may_act(seat) || !(m.power > 0.0) {
            return false;
        }
        let speed = m.power.min(1.0) * self.config.max_shot_speed;
        let Some(cue) = self.state.cue_ball_mut() else {
            return false;
        };
        if cue.pocketed {
            return false;
        }
        cue.vel = scale(from_angle(m.aim_angle_rad), speed);

        self.state.phase = GamePhase::Simulating;
        self.rules.ball_in_hand_for = None;
        self.shot = Some(ShotContext::new(seat, self.state.clone()));
        tracing::info!(
            match_id = %self.id,
            seat = seat.index(),
            client_shot_id = %m.client_shot_id,
            speed,
            "Shot taken"
        );
        true
    }

    /// Seated player walked away: the opponent wins.
    pub fn leave(&mut self, token: &str) {
        if let Some(seat) = self.seat_of(token) {
            self.end(EndReason::Forfeit, Some(seat.opponent()));
        }
    }

    // === Tick ===

    pub fn tick(&mut self, now: Instant) {
        if self.ended {
            return;
        }

        if let Some(gone) = self.expired_seat(now) {
            let other = gone.opponent();
            let winner = self.is_connected(other).then_some(other);
            self.end(EndReason::Forfeit, winner);
            return;
        }

        if self.state.phase != GamePhase::Simulating {
            return;
        }

        let table = self.state.table;
        let result = step_balls(
            &mut self.state.balls,
            &table,
            self.config.physics_dt,
            &self.config.physics,
        );
        if let Some(shot) = self.shot.as_mut() {
            shot.events.extend(result.events);
        }
        self.state.tick += 1;

        if !result.any_moving {
            self.finish_shot();
        }

        self.broadcast_snapshot();

        if self.state.phase == GamePhase::GameOver {
            self.end(EndReason::GameOver, self.rules.winner);
        }
    }

    fn finish_shot(&mut self) {
        let shot = self
            .shot
            .take()
            .unwrap_or_else(|| ShotContext::new(self.state.current_player, self.state.clone()));
        let analysis = analyze_shot(&self.rules, &shot, &self.state);

        self.rules.groups = analysis.groups_after;
        self.rules.winner = analysis.winner;
        self.rules.ball_in_hand_for = analysis.ball_in_hand_for;
        self.state.current_player = analysis.next_player;

        self.state.phase = if analysis.winner.is_some() {
            GamePhase::GameOver
        } else if analysis.ball_in_hand_for.is_some() {
            let spot = self.state.table.cue_spot();
            if let Some(cue) = self.state.cue_ball_mut() {
                if cue.pocketed {
                    cue.pocketed = false;
                    cue.pos = spot;
                }
                cue.vel = Vec2::ZERO;
            }
            GamePhase::BallInHand
        } else {
            GamePhase::Aim
        };

        tracing::info!(
            match_id = %self.id,
            shooter = analysis.shooter.index(),
            foul = ?analysis.foul,
            pocketed = ?analysis.pocketed,
            next = analysis.next_player.index(),
            ticks = analysis.duration_ticks,
            "Shot resolved"
        );
    }

    // === Termination ===

    /// End the match once. Later calls are no-ops and return false.
    pub fn end(&mut self, reason: EndReason, winner: Option<Seat>) -> bool {
        if self.ended {
            return false;
        }
        self.ended = true;
        self.shot = None;

        self.broadcast(ServerMsg::MatchEnded(MatchEndedMsg {
            match_id: self.id.clone(),
            reason,
            winner,
        }));

        let outcome = MatchOutcome {
            match_id: self.id.clone(),
            reason,
            winner,
        };
        tracing::info!(match_id = %self.id, ?reason, winner = ?winner.map(Seat::index), "Match ended");
        if let Some(callback) = self.on_end.take() {
            callback(&outcome);
        }
        true
    }

    /// Time since the seat lost its connection.
    pub fn disconnected_for(&self, seat: Seat, now: Instant) -> Option<Duration> {
        self.seats[seat.index()]
            .disconnected_at
            .map(|at| now.saturating_duration_since(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eightball_shared::rules::BallGroup;
    use eightball_shared::state::EIGHT_BALL;
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc::Receiver;

    const ALICE: &str = "alice";
    const BOB: &str = "bob";

    fn room() -> MatchRoom {
        MatchRoom::new(
            "m1".to_string(),
            [ALICE.to_string(), BOB.to_string()],
            MatchConfig::default(),
        )
    }

    fn attach_both(room: &mut MatchRoom) -> (ConnHandle, Receiver<ServerMsg>, ConnHandle, Receiver<ServerMsg>) {
        let (a, a_rx) = ConnHandle::channel(8192);
        let (b, b_rx) = ConnHandle::channel(8192);
        room.attach(ALICE, a.clone());
        room.attach(BOB, b.clone());
        (a, a_rx, b, b_rx)
    }

    fn drain(rx: &mut Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn shoot(angle: f64, power: f64) -> SeatCommand {
        SeatCommand::Shoot(ShootMsg {
            match_id: "m1".to_string(),
            seq: 1,
            client_shot_id: "shot".to_string(),
            aim_angle_rad: angle,
            power,
        })
    }

    fn place(x: f64, y: f64) -> SeatCommand {
        SeatCommand::PlaceCue(PlaceCueMsg {
            match_id: "m1".to_string(),
            seq: 2,
            x,
            y,
        })
    }

    fn aim(angle: f64, power: f64) -> SeatCommand {
        SeatCommand::Aim(AimMsg {
            match_id: "m1".to_string(),
            seq: 3,
            aim_angle_rad: angle,
            power,
        })
    }

    /// Tick until the shot resolves.
    fn run_until_rest(room: &mut MatchRoom, now: Instant) {
        for _ in 0..5000 {
            if room.state().phase != GamePhase::Simulating {
                return;
            }
            room.tick(now);
        }
        panic!("shot never came to rest");
    }

    fn counting_room() -> (MatchRoom, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let room = room().on_end(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (room, calls)
    }

    #[test]
    fn attach_sends_immediate_snapshot() {
        let mut room = room();
        let (conn, mut rx) = ConnHandle::channel(16);
        assert_eq!(room.attach(BOB, conn), Some(Seat::Second));
        match rx.try_recv() {
            Ok(ServerMsg::Snapshot(s)) => {
                assert_eq!(s.match_id, "m1");
                assert_eq!(s.snapshot.state.phase, GamePhase::Aim);
            }
            other => panic!("Expected Snapshot, got {:?}", other),
        }
    }

    #[test]
    fn stranger_cannot_attach_or_act() {
        let mut room = room();
        let (conn, _rx) = ConnHandle::channel(16);
        assert_eq!(room.attach("mallory", conn), None);
        assert!(!room.handle_command("mallory", shoot(0.0, 1.0)));
        assert_eq!(room.state().phase, GamePhase::Aim);
    }

    #[test]
    fn only_current_player_may_shoot() {
        let mut room = room();
        assert!(!room.handle_command(BOB, shoot(0.0, 0.5)));
        assert_eq!(room.state().phase, GamePhase::Aim);
        assert!(room.handle_command(ALICE, shoot(0.0, 0.5)));
        assert_eq!(room.state().phase, GamePhase::Simulating);
    }

    #[test]
    fn non_positive_power_is_ignored() {
        let mut room = room();
        assert!(!room.handle_command(ALICE, shoot(0.0, 0.0)));
        assert!(!room.handle_command(ALICE, shoot(0.0, -0.3)));
        assert_eq!(room.state().phase, GamePhase::Aim);
        assert!(room.state().cue_ball().unwrap().vel.is_zero());
    }

    #[test]
    fn shot_speed_scales_with_power() {
        let mut room = room();
        assert!(room.handle_command(ALICE, shoot(FRAC_PI_2, 0.5)));
        let vel = room.state().cue_ball().unwrap().vel;
        assert!(vel.x.abs() < 1e-9);
        assert!((vel.y - 3.5).abs() < 1e-9);
        let shot = room.shot.as_ref().unwrap();
        assert_eq!(shot.shooter, Seat::First);
        assert_eq!(shot.pre.phase, GamePhase::Simulating);
    }

    #[test]
    fn power_above_one_is_capped() {
        let mut room = room();
        assert!(room.handle_command(ALICE, shoot(0.0, 3.0)));
        let vel = room.state().cue_ball().unwrap().vel;
        assert!((vel.x - 7.0).abs() < 1e-9);
    }

    #[test]
    fn nothing_accepted_while_simulating() {
        let mut room = room();
        assert!(room.handle_command(ALICE, shoot(FRAC_PI_2, 0.3)));
        assert!(!room.handle_command(ALICE, aim(0.0, 0.5)));
        assert!(!room.handle_command(ALICE, shoot(0.0, 0.5)));
        assert!(!room.handle_command(ALICE, place(0.5, 0.5)));
    }

    #[test]
    fn aim_is_stored_for_current_player_only() {
        let mut room = room();
        assert!(room.handle_command(ALICE, aim(1.25, 0.4)));
        assert!(!room.handle_command(BOB, aim(0.5, 0.4)));
        let stored = room.last_aim(Seat::First).unwrap();
        assert_eq!(stored.seq, 3);
        assert!((stored.aim_angle_rad - 1.25).abs() < 1e-12);
        assert!(room.last_aim(Seat::Second).is_none());
    }

    #[test]
    fn place_cue_requires_ball_in_hand() {
        let mut room = room();
        assert!(!room.handle_command(ALICE, place(0.5, 0.5)));
    }

    #[test]
    fn snapshot_broadcast_every_simulating_tick() {
        let mut room = room();
        let (_a, mut a_rx, _b, mut b_rx) = attach_both(&mut room);
        drain(&mut a_rx);
        drain(&mut b_rx);

        assert!(room.handle_command(ALICE, shoot(FRAC_PI_2, 0.3)));
        let now = Instant::now();
        room.tick(now);
        room.tick(now);
        assert_eq!(room.state().tick, 2);
        let got = drain(&mut a_rx);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|m| matches!(m, ServerMsg::Snapshot(_))));
        assert_eq!(drain(&mut b_rx).len(), 2);
    }

    #[test]
    fn idle_tick_sends_nothing() {
        let mut room = room();
        let (_a, mut a_rx, _b, _b_rx) = attach_both(&mut room);
        drain(&mut a_rx);
        room.tick(Instant::now());
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(room.state().tick, 0);
    }

    #[test]
    fn touching_nothing_hands_ball_in_hand_to_opponent() {
        let mut room = room();
        let (_a, _a_rx, _b, mut b_rx) = attach_both(&mut room);
        // Straight down the head string: rails only, no ball contact.
        assert!(room.handle_command(ALICE, shoot(FRAC_PI_2, 0.3)));
        run_until_rest(&mut room, Instant::now());

        assert_eq!(room.state().phase, GamePhase::BallInHand);
        assert_eq!(room.state().current_player, Seat::Second);
        assert_eq!(room.rules().ball_in_hand_for, Some(Seat::Second));
        let cue = room.state().cue_ball().unwrap();
        assert!(!cue.pocketed);
        assert!(cue.vel.is_zero());

        let snapshots = drain(&mut b_rx);
        match snapshots.last() {
            Some(ServerMsg::Snapshot(s)) => {
                assert_eq!(s.snapshot.state.phase, GamePhase::BallInHand);
                assert_eq!(s.snapshot.rules.ball_in_hand_for, Some(Seat::Second));
            }
            other => panic!("Expected Snapshot, got {:?}", other),
        }
    }

    #[test]
    fn ball_in_hand_placement_rules() {
        let mut room = room();
        let (_a, mut a_rx, _b, _b_rx) = attach_both(&mut room);
        assert!(room.handle_command(ALICE, shoot(FRAC_PI_2, 0.3)));
        run_until_rest(&mut room, Instant::now());
        drain(&mut a_rx);

        // The fouling player cannot place.
        assert!(!room.handle_command(ALICE, place(0.5, 0.5)));

        // On top of the rack apex is rejected.
        let apex = room.state().ball(1).unwrap().pos;
        assert!(!room.handle_command(BOB, place(apex.x, apex.y)));
        assert!(drain(&mut a_rx).is_empty());

        assert!(room.handle_command(BOB, place(0.5, 0.6)));
        assert_eq!(room.state().cue_ball().unwrap().pos, vec2(0.5, 0.6));
        assert!(matches!(drain(&mut a_rx).as_slice(), [ServerMsg::Snapshot(_)]));

        // Off-table placement is clamped into the play area.
        assert!(room.handle_command(BOB, place(-3.0, 99.0)));
        let r = room.state().table.ball_radius;
        let h = room.state().table.height;
        assert_eq!(room.state().cue_ball().unwrap().pos, vec2(r, h - r));

        // Ball in hand still allows shooting, and consumes the privilege.
        assert!(room.handle_command(BOB, shoot(0.0, 0.2)));
        assert_eq!(room.rules().ball_in_hand_for, None);
    }

    #[test]
    fn scratched_cue_returns_to_spot() {
        let mut room = room();
        let table = room.state.table;
        // Cue aimed straight into the top-left corner with nothing in the way.
        {
            let cue = room.state.cue_ball_mut().unwrap();
            cue.pos = vec2(0.3, 0.3);
        }
        assert!(room.handle_command(ALICE, shoot(-3.0 * PI / 4.0, 0.5)));
        run_until_rest(&mut room, Instant::now());
        assert_eq!(room.state().phase, GamePhase::BallInHand);
        let cue = room.state().cue_ball().unwrap();
        assert!(!cue.pocketed);
        assert_eq!(cue.pos, table.cue_spot());
    }

    #[test]
    fn legal_eight_after_clearing_wins() {
        let (mut room, calls) = counting_room();
        let (_a, mut a_rx, _b, _b_rx) = attach_both(&mut room);
        room.rules.groups = [Some(BallGroup::Solids), Some(BallGroup::Stripes)];
        for id in 1..=7 {
            room.state.ball_mut(id).unwrap().pocketed = true;
        }
        room.state.ball_mut(EIGHT_BALL).unwrap().pos = vec2(0.2, 0.2);
        room.state.cue_ball_mut().unwrap().pos = vec2(0.4, 0.4);

        assert!(room.handle_command(ALICE, shoot(-3.0 * PI / 4.0, 0.5)));
        run_until_rest(&mut room, Instant::now());

        assert!(room.state().ball(EIGHT_BALL).unwrap().pocketed);
        assert_eq!(room.state().phase, GamePhase::GameOver);
        assert_eq!(room.rules().winner, Some(Seat::First));
        assert!(room.is_ended());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let msgs = drain(&mut a_rx);
        match msgs.last() {
            Some(ServerMsg::MatchEnded(m)) => {
                assert_eq!(m.reason, EndReason::GameOver);
                assert_eq!(m.winner, Some(Seat::First));
            }
            other => panic!("Expected MatchEnded, got {:?}", other),
        }
    }

    #[test]
    fn disconnect_within_grace_is_tolerated() {
        let mut room = room();
        let (a, _a_rx, _b, _b_rx) = attach_both(&mut room);
        let t0 = Instant::now();
        room.detach(ALICE, a.id, t0);
        assert!(!room.is_connected(Seat::First));
        room.tick(t0 + Duration::from_secs(19));
        assert!(!room.is_ended());
        assert_eq!(
            room.disconnected_for(Seat::First, t0 + Duration::from_secs(19)),
            Some(Duration::from_secs(19))
        );
    }

    #[test]
    fn disconnect_past_grace_forfeits_to_connected_seat() {
        let (mut room, calls) = counting_room();
        let (a, _a_rx, _b, mut b_rx) = attach_both(&mut room);
        let t0 = Instant::now();
        room.detach(ALICE, a.id, t0);
        drain(&mut b_rx);
        room.tick(t0 + Duration::from_secs(21));
        assert!(room.is_ended());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match drain(&mut b_rx).as_slice() {
            [ServerMsg::MatchEnded(m)] => {
                assert_eq!(m.reason, EndReason::Forfeit);
                assert_eq!(m.winner, Some(Seat::Second));
            }
            other => panic!("Expected one MatchEnded, got {:?}", other),
        }
    }

    #[test]
    fn both_gone_forfeits_without_winner() {
        let mut room = room();
        let outcome = Arc::new(std::sync::Mutex::new(None));
        let o = outcome.clone();
        room = room.on_end(move |out| {
            *o.lock().unwrap() = Some(out.clone());
        });
        let (a, _a_rx, b, _b_rx) = attach_both(&mut room);
        let t0 = Instant::now();
        room.detach(ALICE, a.id, t0);
        room.detach(BOB, b.id, t0);
        room.tick(t0 + Duration::from_secs(25));
        let out = outcome.lock().unwrap().clone().unwrap();
        assert_eq!(out.reason, EndReason::Forfeit);
        assert_eq!(out.winner, None);
    }

    #[test]
    fn reattach_clears_grace_and_resends_snapshot() {
        let mut room = room();
        let (a, _a_rx, _b, _b_rx) = attach_both(&mut room);
        let t0 = Instant::now();
        room.detach(ALICE, a.id, t0);

        let (a2, mut a2_rx) = ConnHandle::channel(16);
        assert_eq!(room.attach(ALICE, a2), Some(Seat::First));
        assert!(matches!(a2_rx.try_recv(), Ok(ServerMsg::Snapshot(_))));

        room.tick(t0 + Duration::from_secs(60));
        assert!(!room.is_ended());
        assert_eq!(room.disconnected_for(Seat::First, t0), None);
    }

    #[test]
    fn stale_detach_is_ignored() {
        let mut room = room();
        let (old, _old_rx) = ConnHandle::channel(16);
        room.attach(ALICE, old.clone());
        let (fresh, _fresh_rx) = ConnHandle::channel(16);
        room.attach(ALICE, fresh);
        room.detach(ALICE, old.id, Instant::now());
        assert!(room.is_connected(Seat::First));
    }

    #[test]
    fn leaving_forfeits_to_opponent() {
        let (mut room, calls) = counting_room();
        let (_a, mut a_rx, _b, _b_rx) = attach_both(&mut room);
        drain(&mut a_rx);
        room.leave(BOB);
        assert!(room.is_ended());
        match drain(&mut a_rx).as_slice() {
            [ServerMsg::MatchEnded(m)] => {
                assert_eq!(m.reason, EndReason::Forfeit);
                assert_eq!(m.winner, Some(Seat::First));
            }
            other => panic!("Expected one MatchEnded, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ending_is_idempotent_and_silences_room() {
        let (mut room, calls) = counting_room();
        let (_a, mut a_rx, _b, _b_rx) = attach_both(&mut room);
        assert!(room.handle_command(ALICE, shoot(FRAC_PI_2, 0.3)));
        assert!(room.end(EndReason::Forfeit, None));
        assert!(!room.end(EndReason::GameOver, Some(Seat::First)));
        room.leave(ALICE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drain(&mut a_rx);
        room.tick(Instant::now());
        assert!(drain(&mut a_rx).is_empty());
        assert!(!room.handle_command(ALICE, aim(0.0, 0.5)));
        let (late, _late_rx) = ConnHandle::channel(4);
        assert_eq!(room.attach(ALICE, late), None);
    }
}
