//! Sampling trajectories from a solved state table.
//!
//! Each step looks up the current state's favoured action, rebuilds its
//! outcome distribution and picks one branch with a single uniform draw
//! walked along the cumulative probabilities.

use log::{info, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::model::{is_legal, outcomes, Action, Outcome, StateKey, StateTable, Transition};

/// Source of uniform draws in `[0, 1)`.
pub trait DrawSource {
    fn next_draw(&mut self) -> f64;
}

/// Draws from any [`Rng`].
#[derive(Debug, Clone)]
pub struct RandomDraws<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomDraws<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomDraws<ChaCha8Rng> {
    /// Reproducible draws for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> DrawSource for RandomDraws<R> {
    fn next_draw(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed sequence of draws, starting over when it runs out.
#[derive(Debug, Clone)]
pub struct ScriptedDraws {
    draws: Vec<f64>,
    cursor: usize,
}

impl ScriptedDraws {
    /// # Panics
    /// Panics if `draws` is empty.
    pub fn new(draws: Vec<f64>) -> Self {
        assert!(!draws.is_empty(), "scripted draws need at least one value");
        Self { draws, cursor: 0 }
    }
}

impl DrawSource for ScriptedDraws {
    fn next_draw(&mut self) -> f64 {
        let draw = self.draws[self.cursor % self.draws.len()];
        self.cursor += 1;
        draw
    }
}

/// Branch selected by `draw`: the first whose cumulative probability exceeds
/// it. Draws beyond the total mass (rounding) land on the last branch.
///
/// # Panics
/// Panics if `transition` has no branches.
pub fn select_outcome(transition: &Transition, draw: f64) -> &Outcome {
    let branches = transition.outcomes();
    let last = branches.len() - 1;
    let mut cumulative = 0.0;
    branches[..last]
        .iter()
        .find(|outcome| {
            cumulative += outcome.probability;
            draw < cumulative
        })
        .unwrap_or(&branches[last])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub from: StateKey,
    pub action: Action,
    pub draw: f64,
    pub to: StateKey,
    pub counter_attack: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub start: StateKey,
    pub steps: Vec<Step>,
    /// Whether the adversary's health reached zero.
    pub terminated: bool,
}

impl Trajectory {
    /// State the trajectory stopped in.
    pub fn end(&self) -> StateKey {
        self.steps.last().map_or(self.start, |step| step.to)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn counter_attacks(&self) -> usize {
        self.steps.iter().filter(|step| step.counter_attack).count()
    }
}

/// Follows the favoured actions of a solved table.
#[derive(Debug)]
pub struct Simulator<'a> {
    table: &'a StateTable,
    config: SimulationConfig,
}

impl<'a> Simulator<'a> {
    /// # Errors
    /// [`Error::IllegalAction`] if some state favours an action it does not
    /// admit, e.g. a table no solver has run on.
    pub fn new(table: &'a StateTable, config: SimulationConfig) -> Result<Self> {
        if let Some(state) = table
            .iter()
            .find(|state| !is_legal(state.key(), state.favoured))
        {
            return Err(Error::IllegalAction {
                index: state.index(),
                action: state.favoured,
            });
        }
        Ok(Self { table, config })
    }

    /// Runs from `start` until health reaches zero or `max_steps` is hit.
    pub fn run<D: DrawSource>(&self, start: StateKey, draws: &mut D) -> Trajectory {
        let mut current = start;
        let mut steps = Vec::new();

        while !current.is_terminal() && steps.len() < self.config.max_steps {
            let action = self.table.resolve(&current).favoured;
            let transition = outcomes(&current, action);
            let draw = draws.next_draw();
            let outcome = select_outcome(&transition, draw);
            trace!("{current} --{action} ({draw:.4})--> {}", outcome.next);

            steps.push(Step {
                from: current,
                action,
                draw,
                to: outcome.next,
                counter_attack: outcome.counter_attack,
            });
            current = outcome.next;
        }

        let trajectory = Trajectory {
            start,
            terminated: current.is_terminal(),
            steps,
        };
        info!(
            "simulated {} steps from {start} to {} ({} counter-attacks, terminated: {})",
            trajectory.len(),
            trajectory.end(),
            trajectory.counter_attacks(),
            trajectory.terminated
        );
        trajectory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_start, SolverConfig};
    use crate::model::{AdversaryMode, Arrows, Health, Materials, Position};
    use crate::solver::value_iteration::{stay_policy, value_iteration};

    fn key(position: Position, arrows: u8, mode: AdversaryMode, health: u8) -> StateKey {
        StateKey::new(
            position,
            Materials::MIN,
            Arrows::new(arrows).unwrap(),
            mode,
            Health::new(health).unwrap(),
        )
    }

    fn staying_table() -> StateTable {
        let mut table = StateTable::new();
        let policy = stay_policy(&table);
        for (state, action) in table.iter_mut().zip(policy) {
            state.favoured = action;
        }
        table
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut table = StateTable::new();
        value_iteration(&mut table, &SolverConfig::default()).unwrap();
        let simulator = Simulator::new(&table, SimulationConfig { max_steps: 500 }).unwrap();

        let first = simulator.run(default_start(), &mut RandomDraws::seeded(7));
        let second = simulator.run(default_start(), &mut RandomDraws::seeded(7));
        assert_eq!(first, second);
        assert!(!first.is_empty());
        for step in &first.steps {
            assert_eq!(step.action, table.resolve(&step.from).favoured);
        }
    }

    #[test]
    fn test_scripted_draws_give_exact_path() {
        let mut table = staying_table();
        let start = key(Position::East, 2, AdversaryMode::Dormant, 2);
        let after_hit = key(Position::East, 1, AdversaryMode::Dormant, 1);
        let after_miss = key(Position::East, 0, AdversaryMode::Dormant, 1);
        table.resolve_mut(&start).favoured = Action::Shoot;
        table.resolve_mut(&after_hit).favoured = Action::Shoot;
        table.resolve_mut(&after_miss).favoured = Action::Hit;

        let simulator = Simulator::new(&table, SimulationConfig::default()).unwrap();
        // Shoot at E while dormant: miss/D 0.08, miss/R 0.02, hit/D 0.72, hit/R 0.18.
        // Hit at E while dormant: miss/D 0.64, miss/R 0.16, hit/D 0.16, hit/R 0.04.
        let mut draws = ScriptedDraws::new(vec![0.5, 0.05, 0.9]);
        let trajectory = simulator.run(start, &mut draws);

        let path: Vec<StateKey> = trajectory.steps.iter().map(|step| step.to).collect();
        assert_eq!(
            path,
            vec![
                after_hit,
                after_miss,
                key(Position::East, 0, AdversaryMode::Dormant, 0)
            ]
        );
        assert!(trajectory.terminated);
        assert_eq!(trajectory.counter_attacks(), 0);
    }

    #[test]
    fn test_terminal_start_takes_no_steps() {
        let table = staying_table();
        let simulator = Simulator::new(&table, SimulationConfig::default()).unwrap();
        let start = key(Position::Center, 1, AdversaryMode::Ready, 0);
        let trajectory = simulator.run(start, &mut RandomDraws::seeded(1));
        assert!(trajectory.is_empty());
        assert!(trajectory.terminated);
        assert_eq!(trajectory.end(), start);
    }

    #[test]
    fn test_step_budget_cuts_endless_runs() {
        let table = staying_table();
        let simulator = Simulator::new(&table, SimulationConfig { max_steps: 25 }).unwrap();
        let trajectory = simulator.run(default_start(), &mut RandomDraws::seeded(3));
        assert_eq!(trajectory.len(), 25);
        assert!(!trajectory.terminated);
    }

    #[test]
    fn test_unsolved_table_is_rejected() {
        let table = StateTable::new();
        assert!(matches!(
            Simulator::new(&table, SimulationConfig::default()),
            Err(Error::IllegalAction { index: 1, .. })
        ));
    }

    #[test]
    fn test_draw_past_total_mass_lands_on_last_branch() {
        let transition = outcomes(&default_start(), Action::Shoot);
        let last = transition.outcomes().last().unwrap();
        assert_eq!(select_outcome(&transition, 1.0), last);
        assert!(select_outcome(&transition, 1.0).counter_attack);
        assert_eq!(select_outcome(&transition, 0.0), &transition.outcomes()[0]);
    }

    #[test]
    fn test_scripted_draws_cycle() {
        let mut draws = ScriptedDraws::new(vec![0.1, 0.2]);
        let seen: Vec<f64> = (0..5).map(|_| draws.next_draw()).collect();
        assert_eq!(seen, vec![0.1, 0.2, 0.1, 0.2, 0.1]);
    }
}
