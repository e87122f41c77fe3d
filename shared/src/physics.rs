//! Continuous-collision stepper for balls on a rectangular table.
//!
//! Each call advances the table by exactly `dt` of simulated time, split at
//! the earliest upcoming contact so fast balls never pass through each other
//! or through a rail:
//! - find the earliest ball-ball / ball-rail / pocket contact in the budget
//! - move everything up to that instant (with linear rolling friction)
//! - resolve the contact and repeat with what is left of the budget

use crate::config::PhysicsParams;
use crate::state::{Ball, BallId, Table};
use crate::vec2::{add, dot, length, normalize, scale, sub, Vec2};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Contact reported by the stepper, consumed by the rules adjudicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhysicsEvent {
    BallBall { a: BallId, b: BallId },
    BallRail { ball: BallId },
    BallPocket { ball: BallId },
}

#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub any_moving: bool,
    pub collided: bool,
    pub pocketed_any: bool,
    pub events: Vec<PhysicsEvent>,
}

/// Earliest contact inside the current budget. Indices refer to the ball slice.
#[derive(Debug, Clone, Copy)]
enum Contact {
    BallBall { t: f64, a: usize, b: usize, n: Vec2 },
    Rail { t: f64, i: usize, n: Vec2 },
    Pocket { t: f64, i: usize },
}

impl Contact {
    fn time(&self) -> f64 {
        match *self {
            Contact::BallBall { t, .. } | Contact::Rail { t, .. } | Contact::Pocket { t, .. } => t,
        }
    }
}

/// Inner boundary the ball centers live in.
#[derive(Debug, Clone, Copy)]
struct PlayArea {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl PlayArea {
    fn of(table: &Table) -> Self {
        let r = table.ball_radius;
        Self {
            x_min: r,
            x_max: table.width - r,
            y_min: r,
            y_max: table.height - r,
        }
    }

    fn clamp(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x.clamp(self.x_min, self.x_max),
            p.y.clamp(self.y_min, self.y_max),
        )
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn apply_rolling_friction(v: Vec2, t: f64, k_per_sec: f64) -> Vec2 {
    scale(v, clamp01(1.0 - k_per_sec * t))
}

/// Reflect about an inward rail normal. Velocity already leaving the rail
/// (or exactly tangential) is returned unchanged.
fn reflect_velocity(v: Vec2, n_inward: Vec2, restitution: f64) -> Vec2 {
    let vn = dot(v, n_inward);
    if vn >= 0.0 {
        return v;
    }
    sub(v, scale(n_inward, (1.0 + restitution) * vn))
}

/// Time until two balls are exactly `2r` apart, with the contact normal
/// pointing from `a` to `b`. Pairs already touching only count when closing.
fn time_of_impact(a: &Ball, b: &Ball, r: f64, max_t: f64) -> Option<(f64, Vec2)> {
    let dp = sub(b.pos, a.pos);
    let dv = sub(b.vel, a.vel);
    let min_sep = 2.0 * r;
    let c = dot(dp, dp) - min_sep * min_sep;

    if c <= 0.0 {
        // Resting racked balls would otherwise collide at t=0 forever.
        let n = normalize(dp);
        if n.is_zero() || dot(dv, n) >= 0.0 {
            return None;
        }
        return Some((0.0, n));
    }

    let qa = dot(dv, dv);
    if qa == 0.0 {
        return None;
    }
    let qb = 2.0 * dot(dp, dv);
    let disc = qb * qb - 4.0 * qa * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-qb - disc.sqrt()) / (2.0 * qa);
    if t < 0.0 || t > max_t {
        return None;
    }
    let n = normalize(add(dp, scale(dv, t)));
    if dot(dv, n) >= 0.0 {
        return None;
    }
    Some((t, n))
}

/// Time for one coordinate to reach the rail it is heading toward, and the
/// inward normal sign of that rail. A ball already past the rail hits at once.
fn rail_time(pos: f64, vel: f64, min: f64, max: f64) -> Option<(f64, f64)> {
    if vel < 0.0 {
        Some((((min - pos) / vel).max(0.0), 1.0))
    } else if vel > 0.0 {
        Some((((max - pos) / vel).max(0.0), -1.0))
    } else {
        None
    }
}

fn find_earliest_contact(balls: &[Ball], table: &Table, budget: f64) -> Option<Contact> {
    let r = table.ball_radius;
    let area = PlayArea::of(table);
    let mut best: Option<Contact> = None;

    let mut consider = |c: Contact| {
        let t = c.time();
        if !(0.0..=budget).contains(&t) {
            return;
        }
        if best.map_or(true, |b| t < b.time()) {
            best = Some(c);
        }
    };

    for i in 0..balls.len() {
        if balls[i].pocketed {
            continue;
        }
        for j in i + 1..balls.len() {
            if balls[j].pocketed {
                continue;
            }
            if let Some((t, n)) = time_of_impact(&balls[i], &balls[j], r, budget) {
                consider(Contact::BallBall { t, a: i, b: j, n });
            }
        }
    }

    for (i, ball) in balls.iter().enumerate() {
        if ball.pocketed {
            continue;
        }
        let x_hit = rail_time(ball.pos.x, ball.vel.x, area.x_min, area.x_max)
            .map(|(t, sign)| (t, Vec2::new(sign, 0.0)));
        let y_hit = rail_time(ball.pos.y, ball.vel.y, area.y_min, area.y_max)
            .map(|(t, sign)| (t, Vec2::new(0.0, sign)));

        for (t, n) in [x_hit, y_hit].into_iter().flatten() {
            if t > budget {
                continue;
            }
            let contact_point = add(ball.pos, scale(ball.vel, t));
            if table.is_in_pocket(contact_point) {
                consider(Contact::Pocket { t, i });
            } else {
                consider(Contact::Rail { t, i, n });
            }
        }
    }

    best
}

fn resolve_ball_ball(balls: &mut [Ball], a: usize, b: usize, n: Vec2, params: &PhysicsParams, r: f64) {
    let (mut pa, mut va) = (balls[a].pos, balls[a].vel);
    let (mut pb, mut vb) = (balls[b].pos, balls[b].vel);

    // Equal masses: split the impulse evenly.
    let rel = dot(sub(vb, va), n);
    if rel < 0.0 {
        let j = -0.5 * (1.0 + params.restitution_ball) * rel;
        va = sub(va, scale(n, j));
        vb = add(vb, scale(n, j));
    }

    // Nudge apart to exactly 2r so float error cannot leave them interpenetrating.
    let dp = sub(pb, pa);
    let d = length(dp);
    let target = 2.0 * r;
    if d > 0.0 && d < target {
        let push = (target - d) / 2.0;
        let nn = scale(dp, 1.0 / d);
        pa = sub(pa, scale(nn, push));
        pb = add(pb, scale(nn, push));
    }

    balls[a].pos = pa;
    balls[a].vel = va;
    balls[b].pos = pb;
    balls[b].vel = vb;
}

/// Advance every non-pocketed ball by exactly `dt` seconds of simulated time.
pub fn step_balls(balls: &mut [Ball], table: &Table, dt: f64, params: &PhysicsParams) -> StepResult {
    let area = PlayArea::of(table);
    let mut result = StepResult::default();
    let mut remaining = dt;

    for _ in 0..params.max_substeps {
        if remaining <= 0.0 {
            break;
        }
        let contact = find_earliest_contact(balls, table, remaining);
        let t = contact.map_or(remaining, |c| c.time());

        for ball in balls.iter_mut().filter(|b| !b.pocketed) {
            ball.pos = add(ball.pos, scale(ball.vel, t));
            ball.vel = apply_rolling_friction(ball.vel, t, params.rolling_friction_per_sec);
        }
        remaining -= t;

        let Some(contact) = contact else {
            break;
        };
        result.collided = true;

        match contact {
            Contact::Pocket { i, .. } => {
                let ball = &mut balls[i];
                ball.pocketed = true;
                ball.vel = Vec2::ZERO;
                result.pocketed_any = true;
                result.events.push(PhysicsEvent::BallPocket { ball: ball.id });
            }
            Contact::Rail { i, n, .. } => {
                let ball = &mut balls[i];
                ball.vel = reflect_velocity(ball.vel, n, params.restitution_rail);
                ball.pos = area.clamp(ball.pos);
                result.events.push(PhysicsEvent::BallRail { ball: ball.id });
            }
            Contact::BallBall { a, b, n, .. } => {
                result.events.push(PhysicsEvent::BallBall {
                    a: balls[a].id,
                    b: balls[b].id,
                });
                resolve_ball_ball(balls, a, b, n, params, table.ball_radius);
            }
        }
    }

    for ball in balls.iter_mut().filter(|b| !b.pocketed) {
        if length(ball.vel) < params.stop_speed {
            ball.vel = Vec2::ZERO;
        }
    }
    result.any_moving = balls.iter().any(|b| !b.pocketed && !b.vel.is_zero());
    result
}
