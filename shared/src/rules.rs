//! Eight-ball shot adjudication.
//!
//! `analyze_shot` turns one shot's physics events into fouls, group
//! assignment, turn handoff and the match result. It is pure: the caller
//! folds the returned analysis back into its own `RulesState`.

use crate::physics::PhysicsEvent;
use crate::state::{BallId, GameState, Seat, CUE_BALL, EIGHT_BALL};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "snake_case")]
pub enum BallGroup {
    Solids,
    Stripes,
}

impl BallGroup {
    /// Group a ball belongs to; `None` for the cue and the eight-ball.
    pub fn of(id: BallId) -> Option<BallGroup> {
        match id {
            1..=7 => Some(BallGroup::Solids),
            9..=15 => Some(BallGroup::Stripes),
            _ => None,
        }
    }

    pub fn other(self) -> BallGroup {
        match self {
            BallGroup::Solids => BallGroup::Stripes,
            BallGroup::Stripes => BallGroup::Solids,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub enum FoulReason {
    #[serde(rename = "no_contact")]
    NoContact,
    #[serde(rename = "scratch")]
    Scratch,
    #[serde(rename = "hit_8_on_open")]
    Hit8OnOpen,
    #[serde(rename = "hit_8_early")]
    Hit8Early,
    #[serde(rename = "wrong_first_contact")]
    WrongFirstContact,
    #[serde(rename = "no_rail")]
    NoRail,
}

/// Match-level rules bookkeeping, indexed by seat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct RulesState {
    /// `None` while the table is open for that seat.
    pub groups: [Option<BallGroup>; 2],
    #[ts(type = "0 | 1 | null")]
    pub winner: Option<Seat>,
    #[ts(type = "0 | 1 | null")]
    pub ball_in_hand_for: Option<Seat>,
}

impl RulesState {
    pub fn group_of(&self, seat: Seat) -> Option<BallGroup> {
        self.groups[seat.index()]
    }

    pub fn is_open(&self) -> bool {
        self.groups.iter().all(Option::is_none)
    }
}

/// A shot in flight: who took it, the table as it was, and every contact so far.
#[derive(Debug, Clone)]
pub struct ShotContext {
    pub shooter: Seat,
    pub pre: GameState,
    pub events: Vec<PhysicsEvent>,
}

impl ShotContext {
    pub fn new(shooter: Seat, pre: GameState) -> Self {
        Self {
            shooter,
            pre,
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShotAnalysis {
    pub shooter: Seat,
    pub foul: Option<FoulReason>,
    pub first_cue_contact: Option<BallId>,
    pub pocketed: Vec<BallId>,
    pub next_player: Seat,
    pub keep_turn: bool,
    pub groups_after: [Option<BallGroup>; 2],
    pub winner: Option<Seat>,
    pub ball_in_hand_for: Option<Seat>,
    /// Simulation ticks between the shot and the table coming to rest.
    pub duration_ticks: u64,
}

impl ShotAnalysis {
    pub fn is_foul(&self) -> bool {
        self.foul.is_some()
    }
}

/// What the event stream says happened during the shot.
#[derive(Debug, Clone, Default)]
struct ShotFacts {
    pocketed: Vec<BallId>,
    first_cue_contact: Option<BallId>,
    any_rail: bool,
}

impl ShotFacts {
    fn tally(events: &[PhysicsEvent]) -> Self {
        let mut facts = ShotFacts::default();
        for event in events {
            match *event {
                PhysicsEvent::BallPocket { ball } => facts.pocketed.push(ball),
                PhysicsEvent::BallRail { .. } => facts.any_rail = true,
                PhysicsEvent::BallBall { a, b } => {
                    if facts.first_cue_contact.is_none() {
                        if a == CUE_BALL && b != CUE_BALL {
                            facts.first_cue_contact = Some(b);
                        } else if b == CUE_BALL && a != CUE_BALL {
                            facts.first_cue_contact = Some(a);
                        }
                    }
                }
            }
        }
        facts
    }

    fn cue_pocketed(&self) -> bool {
        self.pocketed.contains(&CUE_BALL)
    }

    fn eight_pocketed(&self) -> bool {
        self.pocketed.contains(&EIGHT_BALL)
    }

    fn object_balls_pocketed(&self) -> usize {
        self.pocketed.iter().filter(|&&id| id != CUE_BALL).count()
    }
}

/// Inputs a foul predicate may look at.
struct FoulView<'a> {
    facts: &'a ShotFacts,
    shooter_group: Option<BallGroup>,
    shooter_remaining: usize,
}

type FoulRule = (FoulReason, fn(&FoulView) -> bool);

/// Evaluated top to bottom; the first predicate that holds names the foul.
const FOUL_RULES: [FoulRule; 6] = [
    (FoulReason::NoContact, cue_touched_nothing),
    (FoulReason::Scratch, cue_pocketed),
    (FoulReason::Hit8OnOpen, hit_eight_on_open_table),
    (FoulReason::Hit8Early, hit_eight_before_clearing),
    (FoulReason::WrongFirstContact, hit_wrong_group_first),
    (FoulReason::NoRail, nothing_pocketed_and_no_rail),
];

fn cue_touched_nothing(v: &FoulView) -> bool {
    v.facts.first_cue_contact.is_none()
}

fn cue_pocketed(v: &FoulView) -> bool {
    v.facts.cue_pocketed()
}

fn hit_eight_on_open_table(v: &FoulView) -> bool {
    v.shooter_group.is_none() && v.facts.first_cue_contact == Some(EIGHT_BALL)
}

fn hit_eight_before_clearing(v: &FoulView) -> bool {
    v.shooter_group.is_some()
        && v.facts.first_cue_contact == Some(EIGHT_BALL)
        && v.shooter_remaining > 0
}

fn hit_wrong_group_first(v: &FoulView) -> bool {
    match (v.shooter_group, v.facts.first_cue_contact) {
        (Some(group), Some(first)) => first != EIGHT_BALL && BallGroup::of(first) != Some(group),
        _ => false,
    }
}

// Does not check that the rail came after first contact.
fn nothing_pocketed_and_no_rail(v: &FoulView) -> bool {
    v.facts.object_balls_pocketed() == 0 && !v.facts.any_rail
}

fn first_foul(view: &FoulView) -> Option<FoulReason> {
    FOUL_RULES
        .iter()
        .find(|(_, applies)| applies(view))
        .map(|(reason, _)| *reason)
}

/// Balls of `group` still on the table.
pub fn remaining_in_group(state: &GameState, group: BallGroup) -> usize {
    state
        .balls
        .iter()
        .filter(|b| !b.pocketed && BallGroup::of(b.id) == Some(group))
        .count()
}

/// Adjudicate a finished shot. `post` is the table after everything stopped.
pub fn analyze_shot(rules: &RulesState, shot: &ShotContext, post: &GameState) -> ShotAnalysis {
    let shooter = shot.shooter;
    let opponent = shooter.opponent();
    let facts = ShotFacts::tally(&shot.events);

    let shooter_group = rules.group_of(shooter);
    let view = FoulView {
        facts: &facts,
        shooter_group,
        shooter_remaining: shooter_group.map_or(0, |g| remaining_in_group(post, g)),
    };
    let foul = first_foul(&view);

    let mut groups_after = rules.groups;
    if foul.is_none() && rules.is_open() {
        let first_grouped = facts.pocketed.iter().find_map(|&id| BallGroup::of(id));
        if let Some(group) = first_grouped {
            groups_after[shooter.index()] = Some(group);
            groups_after[opponent.index()] = Some(group.other());
        }
    }

    let winner = match rules.winner {
        Some(decided) => Some(decided),
        None if facts.eight_pocketed() => {
            let cleared = groups_after[shooter.index()]
                .is_some_and(|g| remaining_in_group(post, g) == 0);
            if foul.is_none() && cleared {
                Some(shooter)
            } else {
                Some(opponent)
            }
        }
        None => None,
    };

    let keep_turn = foul.is_none() && facts.object_balls_pocketed() > 0;
    let next_player = if keep_turn { shooter } else { opponent };
    let ball_in_hand_for = foul.map(|_| opponent);

    ShotAnalysis {
        shooter,
        foul,
        first_cue_contact: facts.first_cue_contact,
        pocketed: facts.pocketed,
        next_player,
        keep_turn,
        groups_after,
        winner,
        ball_in_hand_for,
        duration_ticks: post.tick.saturating_sub(shot.pre.tick),
    }
}
