//! The arena's transition model.
//!
//! An outcome distribution is built in two layers. The positional layer
//! applies the mechanics of the agent's cell (movement drift, shooting and
//! melee odds, crafting and gathering yields). The adversary layer then splits
//! or reweights every positional outcome according to the adversary's mode
//! and, when the adversary is ready and within reach, adds the counter-attack
//! branch.

use super::domain::{Action, AdversaryMode, Arrows, Position};
use super::legality::is_legal;
use super::state::StateKey;

/// Chance that a move (or Stay) from C, N or S goes as intended; otherwise the agent slides east.
pub const MOVE_SUCCESS: f64 = 0.85;
/// Arrow hit chance by cell.
pub const SHOOT_HIT_CENTER: f64 = 0.5;
pub const SHOOT_HIT_EAST: f64 = 0.9;
pub const SHOOT_HIT_WEST: f64 = 0.25;
/// Melee hit chance by cell; a melee hit removes two health levels.
pub const MELEE_HIT_CENTER: f64 = 0.1;
pub const MELEE_HIT_EAST: f64 = 0.2;
/// Probabilities of crafting one, two or three arrows from one material.
pub const CRAFT_YIELDS: [(u8, f64); 3] = [(1, 0.5), (2, 0.35), (3, 0.15)];
pub const GATHER_SUCCESS: f64 = 0.75;
/// Chance a dormant adversary stays dormant this step.
pub const DORMANT_PERSIST: f64 = 0.8;
/// Chance a ready adversary attacks (at C or E) or calms down (elsewhere).
pub const READY_RESOLVE: f64 = 0.5;

/// Accepted drift of a distribution's total mass away from 1.
pub const MASS_TOLERANCE: f64 = 0.01;

/// One branch of an outcome distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub probability: f64,
    pub next: StateKey,
    /// Set on the branch where the adversary lands its attack.
    pub counter_attack: bool,
}

impl Outcome {
    fn new(probability: f64, next: StateKey) -> Self {
        Self {
            probability,
            next,
            counter_attack: false,
        }
    }
}

/// Ordered outcome distribution of one (state, action) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    outcomes: Vec<Outcome>,
}

impl Transition {
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Outcome> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn total_mass(&self) -> f64 {
        self.outcomes.iter().map(|outcome| outcome.probability).sum()
    }

    /// Position of the counter-attack branch, if the distribution has one.
    pub fn counter_attack_index(&self) -> Option<usize> {
        self.outcomes.iter().position(|outcome| outcome.counter_attack)
    }

    /// The distribution with every branch that returns to `origin` dropped.
    ///
    /// Used by the LP formulation; the remaining mass is below 1 whenever
    /// something was removed.
    pub fn without_self_loops(&self, origin: &StateKey) -> Transition {
        Transition {
            outcomes: self
                .outcomes
                .iter()
                .filter(|outcome| outcome.next != *origin)
                .copied()
                .collect(),
        }
    }

    /// # Panics
    /// Panics if the total mass is not within [`MASS_TOLERANCE`] of 1.
    pub fn assert_normalized(&self, key: &StateKey, action: Action) {
        let total = self.total_mass();
        assert!(
            (total - 1.0).abs() <= MASS_TOLERANCE,
            "outcome mass of {action} in {key} is {total}, expected 1"
        );
    }
}

impl<'a> IntoIterator for &'a Transition {
    type Item = &'a Outcome;
    type IntoIter = std::slice::Iter<'a, Outcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}

/// Full outcome distribution of taking `action` in `key`.
///
/// # Panics
/// Panics if `action` is not admissible in `key` (callers filter through
/// [`legal_actions`](super::legality::legal_actions) first) or if the resulting
/// mass does not sum to 1.
pub fn outcomes(key: &StateKey, action: Action) -> Transition {
    assert!(is_legal(key, action), "{action} is not admissible in {key}");

    if action == Action::None {
        return Transition {
            outcomes: vec![Outcome::new(1.0, *key)],
        };
    }

    let positional = positional_outcomes(key, action);
    let transition = Transition {
        outcomes: adversary_overlay(key, &positional),
    };
    transition.assert_normalized(key, action);
    transition
}

/// The positional layer alone: `(probability, successor)` pairs before the
/// adversary's mode is taken into account. Successors keep the origin's mode.
///
/// # Panics
/// Panics if `action` is not admissible in `key`.
pub fn positional_outcomes(key: &StateKey, action: Action) -> Vec<(f64, StateKey)> {
    assert!(is_legal(key, action), "{action} is not admissible in {key}");

    match (key.position, action) {
        (_, Action::None) => vec![(1.0, *key)],
        (Position::East | Position::West, Action::Stay | Action::Left | Action::Right) => {
            let to = action.destination(key.position).unwrap_or(key.position);
            vec![(1.0, key.with_position(to))]
        }
        (_, Action::Up | Action::Down | Action::Left | Action::Right | Action::Stay) => {
            let to = action.destination(key.position).unwrap_or(key.position);
            drifting_move(key, to)
        }
        (position, Action::Shoot) => {
            let hit = match position {
                Position::Center => SHOOT_HIT_CENTER,
                Position::East => SHOOT_HIT_EAST,
                _ => SHOOT_HIT_WEST,
            };
            shoot(key, hit)
        }
        (position, Action::Hit) => {
            let hit = match position {
                Position::Center => MELEE_HIT_CENTER,
                _ => MELEE_HIT_EAST,
            };
            vec![
                (1.0 - hit, *key),
                (hit, key.with_health(key.health.saturating_sub(2))),
            ]
        }
        (_, Action::Craft) => {
            let materials = key.materials.saturating_sub(1);
            CRAFT_YIELDS
                .iter()
                .map(|&(made, probability)| {
                    let next = key
                        .with_materials(materials)
                        .with_arrows(key.arrows.saturating_add(made));
                    (probability, next)
                })
                .collect()
        }
        (_, Action::Gather) => vec![
            (1.0 - GATHER_SUCCESS, *key),
            (
                GATHER_SUCCESS,
                key.with_materials(key.materials.saturating_add(1)),
            ),
        ],
    }
}

/// Failed (eastward) branch first.
fn drifting_move(key: &StateKey, to: Position) -> Vec<(f64, StateKey)> {
    vec![
        (1.0 - MOVE_SUCCESS, key.with_position(Position::East)),
        (MOVE_SUCCESS, key.with_position(to)),
    ]
}

/// An arrow is spent on every attempt; a hit also removes one health level.
fn shoot(key: &StateKey, hit: f64) -> Vec<(f64, StateKey)> {
    let spent = key.with_arrows(key.arrows.saturating_sub(1));
    vec![
        (1.0 - hit, spent),
        (hit, spent.with_health(spent.health.saturating_sub(1))),
    ]
}

fn adversary_overlay(origin: &StateKey, positional: &[(f64, StateKey)]) -> Vec<Outcome> {
    let mut layered = Vec::with_capacity(positional.len() * 2 + 1);
    match origin.mode {
        AdversaryMode::Dormant => {
            for &(probability, next) in positional {
                layered.push(Outcome::new(
                    DORMANT_PERSIST * probability,
                    next.with_mode(AdversaryMode::Dormant),
                ));
                layered.push(Outcome::new(
                    (1.0 - DORMANT_PERSIST) * probability,
                    next.with_mode(AdversaryMode::Ready),
                ));
            }
        }
        AdversaryMode::Ready => {
            for &(probability, next) in positional {
                layered.push(Outcome::new((1.0 - READY_RESOLVE) * probability, next));
            }
            if matches!(origin.position, Position::Center | Position::East) {
                layered.push(Outcome {
                    probability: READY_RESOLVE,
                    next: counter_attacked(origin),
                    counter_attack: true,
                });
            } else {
                for &(probability, next) in positional {
                    layered.push(Outcome::new(
                        READY_RESOLVE * probability,
                        next.with_mode(AdversaryMode::Dormant),
                    ));
                }
            }
        }
    }
    layered
}

/// The agent's action is void: it loses every arrow, the adversary heals one
/// level and goes dormant.
fn counter_attacked(origin: &StateKey) -> StateKey {
    origin
        .with_mode(AdversaryMode::Dormant)
        .with_arrows(Arrows::MIN)
        .with_health(origin.health.saturating_add(1))
}
