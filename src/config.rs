//! Tunable parameters for the solvers and the simulator.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{Action, AdversaryMode, Arrows, Health, Materials, Outcome, Position, StateKey, Transition};

/// Step-cost divisors selected by [`RewardConfig::with_rate_index`].
pub const RATE_DIVISORS: [f64; 3] = [0.5, 1.0, 2.0];

/// Rewards attached to transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardConfig {
    /// Reward of every non-terminal step (a cost, so negative).
    pub step_cost: f64,
    /// Added once on the branch where the adversary counter-attacks.
    pub counter_attack_penalty: f64,
    /// Value pinned on health-zero states.
    pub terminal_reward: f64,
    /// When set, Stay carries no step cost.
    pub free_stay: bool,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            step_cost: -5.0,
            counter_attack_penalty: -40.0,
            terminal_reward: 0.0,
            free_stay: false,
        }
    }
}

impl RewardConfig {
    /// Sets the step cost to `-10 / RATE_DIVISORS[index % 3]`.
    pub fn with_rate_index(mut self, index: usize) -> Self {
        self.step_cost = -10.0 / RATE_DIVISORS[index % RATE_DIVISORS.len()];
        self
    }

    pub fn step_cost_for(&self, action: Action) -> f64 {
        match action {
            Action::None => 0.0,
            Action::Stay if self.free_stay => 0.0,
            _ => self.step_cost,
        }
    }

    /// Immediate reward of landing on `outcome` after `action`.
    pub fn outcome_reward(&self, action: Action, outcome: &Outcome) -> f64 {
        let penalty = if outcome.counter_attack {
            self.counter_attack_penalty
        } else {
            0.0
        };
        self.step_cost_for(action) + penalty
    }

    /// Probability-weighted immediate reward over a whole distribution.
    pub fn expected_reward(&self, action: Action, transition: &Transition) -> f64 {
        transition
            .iter()
            .map(|outcome| outcome.probability * self.outcome_reward(action, outcome))
            .sum()
    }
}

/// Limits for the simplex solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LpConfig {
    pub max_pivots: usize,
    /// Wall-clock budget; `None` lets the solve run until `max_pivots`.
    pub time_budget: Option<Duration>,
    /// Pivot and feasibility tolerance.
    pub tolerance: f64,
}

impl Default for LpConfig {
    fn default() -> Self {
        Self {
            max_pivots: 200_000,
            time_budget: Some(Duration::from_secs(120)),
            tolerance: 1e-9,
        }
    }
}

/// Configuration shared by value iteration and the LP solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Discount factor γ.
    pub discount: f64,
    /// Value iteration stops once the largest per-state change is below this.
    pub tolerance: f64,
    /// Sweep budget for value iteration and policy evaluation.
    pub max_iterations: usize,
    pub rewards: RewardConfig,
    pub lp: LpConfig,
    /// Starting-state distribution (α in the LP).
    pub start: Vec<(StateKey, f64)>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            discount: 0.999,
            tolerance: 0.001,
            max_iterations: 10_000,
            rewards: RewardConfig::default(),
            lp: LpConfig::default(),
            start: vec![(default_start(), 1.0)],
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.discount > 0.0 && self.discount <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "discount {} must lie in (0, 1]",
                self.discount
            )));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "tolerance {} must be positive",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 || self.lp.max_pivots == 0 {
            return Err(Error::InvalidConfig(
                "iteration and pivot budgets must be non-zero".to_string(),
            ));
        }
        if self.start.iter().any(|&(_, mass)| mass < 0.0) {
            return Err(Error::InvalidConfig(
                "start distribution has negative mass".to_string(),
            ));
        }
        let total: f64 = self.start.iter().map(|&(_, mass)| mass).sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(Error::InvalidConfig(format!(
                "start distribution sums to {total}, expected 1"
            )));
        }
        Ok(())
    }

    /// Value iteration additionally needs γ < 1 to be a contraction.
    pub fn validate_for_value_iteration(&self) -> Result<()> {
        self.validate()?;
        if self.discount >= 1.0 {
            return Err(Error::InvalidConfig(
                "value iteration needs a discount below 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The reference scenario's start: hub, two materials, three arrows, adversary
/// ready at full health.
pub fn default_start() -> StateKey {
    StateKey::new(
        Position::Center,
        Materials::MAX,
        Arrows::MAX,
        AdversaryMode::Ready,
        Health::MAX,
    )
}

/// Limits for trajectory sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// A trajectory is cut here even if health never reaches zero.
    pub max_steps: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { max_steps: 10_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::outcomes;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.validate_for_value_iteration().is_ok());
        assert_eq!(config.start[0].0.index(), 599);
    }

    #[test]
    fn test_rate_index_selects_step_cost() {
        assert_abs_diff_eq!(RewardConfig::default().with_rate_index(5).step_cost, -5.0);
        assert_abs_diff_eq!(RewardConfig::default().with_rate_index(3).step_cost, -20.0);
        assert_abs_diff_eq!(RewardConfig::default().with_rate_index(4).step_cost, -10.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = SolverConfig {
            discount: 1.5,
            ..SolverConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        config.discount = 1.0;
        assert!(config.validate().is_ok());
        assert!(config.validate_for_value_iteration().is_err());

        config.discount = 0.9;
        config.start = vec![(default_start(), 0.5)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_counter_attack_penalty_applies_once() {
        let rewards = RewardConfig::default();
        let transition = outcomes(&default_start(), Action::Shoot);
        // 0.5 of the mass is the counter-attack branch.
        assert_abs_diff_eq!(
            rewards.expected_reward(Action::Shoot, &transition),
            -5.0 + 0.5 * -40.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_free_stay() {
        let rewards = RewardConfig {
            free_stay: true,
            ..RewardConfig::default()
        };
        assert_eq!(rewards.step_cost_for(Action::Stay), 0.0);
        assert_eq!(rewards.step_cost_for(Action::Up), -5.0);
        assert_eq!(RewardConfig::default().step_cost_for(Action::Stay), -5.0);
    }
}
