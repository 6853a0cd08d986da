//! The arena flattened into index form for the Bellman backups.
//!
//! For every state and each of its admissible actions we store a list of
//! `(next_state, probability, reward)` branches, resolved once against the
//! state table so sweeps never touch state keys again.

use crate::config::SolverConfig;
use crate::model::{outcomes, Action, StateTable};

/// One `(next_state, probability, reward)` entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Branch {
    pub next: usize,
    pub probability: f64,
    pub reward: f64,
}

/// An admissible action and its branches.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub action: Action,
    pub branches: Vec<Branch>,
}

/// Discrete MDP over the arena's state table.
#[derive(Debug, Clone)]
pub struct CompiledMdp {
    /// Discount factor (0 < gamma < 1 for value iteration).
    pub gamma: f64,
    /// Value pinned on terminal states.
    pub terminal_value: f64,
    choices: Vec<Vec<Choice>>,
    terminal: Vec<bool>,
}

impl CompiledMdp {
    /// Expands every (state, admissible action) pair of `table`.
    ///
    /// # Panics
    /// Panics if an outcome distribution is not normalized or a successor key
    /// does not resolve to its own slot in the table.
    pub fn build(table: &StateTable, config: &SolverConfig) -> Self {
        let rewards = &config.rewards;
        let mut choices = Vec::with_capacity(table.len());
        let mut terminal = Vec::with_capacity(table.len());

        for state in table.iter() {
            terminal.push(state.is_terminal());
            let per_state = state
                .actions()
                .iter()
                .map(|&action| {
                    let transition = outcomes(state.key(), action);
                    transition.assert_normalized(state.key(), action);
                    let branches = transition
                        .iter()
                        .map(|outcome| Branch {
                            next: table.resolve(&outcome.next).index(),
                            probability: outcome.probability,
                            reward: rewards.outcome_reward(action, outcome),
                        })
                        .collect();
                    Choice { action, branches }
                })
                .collect();
            choices.push(per_state);
        }

        Self {
            gamma: config.discount,
            terminal_value: rewards.terminal_reward,
            choices,
            terminal,
        }
    }

    /// An MDP given directly by its per-state choices, for models that do not
    /// come from the arena table.
    ///
    /// # Panics
    /// Panics if `choices` and `terminal` differ in length, a state has no
    /// choice, a branch leaves the state range or a choice's probabilities do
    /// not sum to one.
    pub fn new(
        gamma: f64,
        terminal_value: f64,
        choices: Vec<Vec<Choice>>,
        terminal: Vec<bool>,
    ) -> Self {
        assert_eq!(
            choices.len(),
            terminal.len(),
            "one terminal flag per state is required"
        );
        let num_states = choices.len();
        for (state, per_state) in choices.iter().enumerate() {
            assert!(!per_state.is_empty(), "state {state} has no admissible action");
            for choice in per_state {
                let mass: f64 = choice.branches.iter().map(|b| b.probability).sum();
                assert!(
                    (mass - 1.0).abs() < 1e-9,
                    "{} in state {state} has total probability {mass}",
                    choice.action
                );
                assert!(
                    choice.branches.iter().all(|b| b.next < num_states),
                    "{} in state {state} leaves the state range",
                    choice.action
                );
            }
        }
        Self {
            gamma,
            terminal_value,
            choices,
            terminal,
        }
    }

    pub fn num_states(&self) -> usize {
        self.choices.len()
    }

    pub fn choices(&self, state: usize) -> &[Choice] {
        &self.choices[state]
    }

    pub fn is_terminal(&self, state: usize) -> bool {
        self.terminal[state]
    }

    /// Choice for `action` in `state`, if admissible there.
    pub fn choice(&self, state: usize, action: Action) -> Option<&Choice> {
        self.choices[state]
            .iter()
            .find(|choice| choice.action == action)
    }

    /// Q(s, a) = sum over branches of p * (r + gamma * V(s')).
    pub fn q_value(&self, choice: &Choice, values: &[f64]) -> f64 {
        choice
            .branches
            .iter()
            .map(|branch| branch.probability * (branch.reward + self.gamma * values[branch.next]))
            .sum()
    }

    /// Initial value vector: zero everywhere except the pinned terminal states.
    pub fn initial_values(&self) -> Vec<f64> {
        self.terminal
            .iter()
            .map(|&terminal| if terminal { self.terminal_value } else { 0.0 })
            .collect()
    }

    /// Best admissible action and its Q-value; the first action reaching the
    /// maximum wins ties.
    pub fn greedy(&self, state: usize, values: &[f64]) -> (Action, f64) {
        let mut best_action = Action::None;
        let mut best_value = f64::NEG_INFINITY;
        for choice in &self.choices[state] {
            let q = self.q_value(choice, values);
            if q > best_value {
                best_value = q;
                best_action = choice.action;
            }
        }
        (best_action, best_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_start;
    use crate::model::STATE_COUNT;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_build_covers_every_state() {
        let table = StateTable::new();
        let mdp = CompiledMdp::build(&table, &SolverConfig::default());
        assert_eq!(mdp.num_states(), STATE_COUNT);
        for state in table.iter() {
            let choices = mdp.choices(state.index());
            assert_eq!(choices.len(), state.actions().len());
            for choice in choices {
                let mass: f64 = choice.branches.iter().map(|b| b.probability).sum();
                assert_abs_diff_eq!(mass, 1.0, epsilon = 1e-9);
                assert!(choice.branches.iter().all(|b| b.next < STATE_COUNT));
            }
        }
    }

    #[test]
    fn test_q_value_of_shoot_from_start() {
        let table = StateTable::new();
        let mdp = CompiledMdp::build(&table, &SolverConfig::default());
        let start = default_start().index();
        let shoot = mdp.choice(start, Action::Shoot).unwrap();
        let values = vec![0.0; STATE_COUNT];
        assert_abs_diff_eq!(mdp.q_value(shoot, &values), -25.0, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "total probability")]
    fn test_new_rejects_unnormalized_choices() {
        let leaky = Choice {
            action: Action::Stay,
            branches: vec![Branch {
                next: 0,
                probability: 0.5,
                reward: -1.0,
            }],
        };
        CompiledMdp::new(0.9, 0.0, vec![vec![leaky]], vec![false]);
    }

    #[test]
    fn test_terminal_values_are_pinned() {
        let table = StateTable::new();
        let mut config = SolverConfig::default();
        config.rewards.terminal_reward = 50.0;
        let mdp = CompiledMdp::build(&table, &config);
        let values = mdp.initial_values();
        for state in table.iter() {
            let expected = if state.is_terminal() { 50.0 } else { 0.0 };
            assert_eq!(values[state.index()], expected);
        }
    }
}
