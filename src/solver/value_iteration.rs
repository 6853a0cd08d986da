//! Synchronous value iteration on the arena MDP, plus fixed-policy evaluation.
//!
//! Every sweep reads a frozen snapshot of the previous values and writes a
//! fresh vector, so the result does not depend on the order states are
//! visited in. Terminal states keep their pinned value throughout.

use log::{debug, info, log_enabled, trace, Level};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SolverConfig;
use crate::error::Result;
use crate::model::{Action, StateTable};
use crate::solver::mdp::CompiledMdp;

/// How a value-iteration run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueIterationReport {
    /// Sweeps performed.
    pub iterations: usize,
    /// Whether the last max-delta fell below the tolerance.
    pub converged: bool,
    /// Largest per-state change of every sweep, in order.
    pub deltas: Vec<f64>,
}

impl ValueIterationReport {
    pub fn final_delta(&self) -> f64 {
        self.deltas.last().copied().unwrap_or(0.0)
    }
}

/// Solves the arena by value iteration and writes each state's value and
/// favoured action into `table`.
///
/// # Errors
/// Returns [`Error::InvalidConfig`](crate::error::Error::InvalidConfig) if the
/// discount is not in (0, 1) or the budgets are zero.
///
/// # Examples
///
/// ```
/// use arena_mdp::config::SolverConfig;
/// use arena_mdp::model::StateTable;
/// use arena_mdp::solver::value_iteration;
///
/// let mut table = StateTable::new();
/// let report = value_iteration(&mut table, &SolverConfig::default()).unwrap();
/// assert!(report.converged);
/// ```
pub fn value_iteration(table: &mut StateTable, config: &SolverConfig) -> Result<ValueIterationReport> {
    config.validate_for_value_iteration()?;
    let mdp = CompiledMdp::build(table, config);
    info!(
        "value iteration over {} states (gamma {}, tolerance {})",
        mdp.num_states(),
        config.discount,
        config.tolerance
    );

    let (solution, report) = solve(&mdp, config.max_iterations, config.tolerance);
    for (state, &(value, action)) in table.iter_mut().zip(solution.iter()) {
        state.value = value;
        state.favoured = action;
    }

    if report.converged {
        info!(
            "value iteration converged after {} sweeps (delta {:.6})",
            report.iterations,
            report.final_delta()
        );
    } else {
        info!(
            "value iteration stopped at the {}-sweep budget (delta {:.6})",
            report.iterations,
            report.final_delta()
        );
    }
    Ok(report)
}

/// Runs sweeps until the max-delta drops below `tolerance` or `max_iterations`
/// sweeps have been made. Returns `(value, favoured action)` per state.
pub fn solve(
    mdp: &CompiledMdp,
    max_iterations: usize,
    tolerance: f64,
) -> (Vec<(f64, Action)>, ValueIterationReport) {
    let mut values = mdp.initial_values();
    let mut solution: Vec<(f64, Action)> = values.iter().map(|&v| (v, Action::None)).collect();
    let mut deltas = Vec::new();
    let mut converged = false;

    for iteration in 1..=max_iterations {
        let next = sweep(mdp, &values);
        let delta = next
            .iter()
            .zip(values.iter())
            .map(|(&(new, _), &old)| (new - old).abs())
            .fold(0.0_f64, f64::max);

        values = next.iter().map(|&(value, _)| value).collect();
        solution = next;
        deltas.push(delta);
        debug!("iteration {iteration}: max delta {delta:.6}");
        if log_enabled!(Level::Trace) {
            for (index, (value, action)) in solution.iter().enumerate() {
                trace!("  state {index}: {action} [{value:.3}]");
            }
        }

        if delta < tolerance {
            converged = true;
            break;
        }
    }

    let report = ValueIterationReport {
        iterations: deltas.len(),
        converged,
        deltas,
    };
    (solution, report)
}

/// One synchronous Bellman backup of every state against `values`.
fn sweep(mdp: &CompiledMdp, values: &[f64]) -> Vec<(f64, Action)> {
    let backup = |state: usize| {
        if mdp.is_terminal(state) {
            (values[state], Action::None)
        } else {
            let (action, value) = mdp.greedy(state, values);
            (value, action)
        }
    };

    #[cfg(feature = "parallel")]
    {
        (0..mdp.num_states()).into_par_iter().map(backup).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..mdp.num_states()).map(backup).collect()
    }
}

/// Iteratively evaluates a fixed per-state action assignment.
///
/// # Panics
/// Panics if `policy` has the wrong length or names an action that is not
/// admissible in its state.
pub fn evaluate_policy(
    mdp: &CompiledMdp,
    policy: &[Action],
    max_iterations: usize,
    tolerance: f64,
) -> Vec<f64> {
    assert_eq!(
        policy.len(),
        mdp.num_states(),
        "policy must assign one action per state"
    );
    let choices: Vec<_> = policy
        .iter()
        .enumerate()
        .map(|(state, &action)| {
            mdp.choice(state, action)
                .unwrap_or_else(|| panic!("{action} is not admissible in state {state}"))
        })
        .collect();

    let mut values = mdp.initial_values();
    for _ in 0..max_iterations {
        let next: Vec<f64> = (0..mdp.num_states())
            .map(|state| {
                if mdp.is_terminal(state) {
                    values[state]
                } else {
                    mdp.q_value(choices[state], &values)
                }
            })
            .collect();
        let delta = next
            .iter()
            .zip(values.iter())
            .map(|(new, old)| (new - old).abs())
            .fold(0.0_f64, f64::max);
        values = next;
        if delta < tolerance {
            break;
        }
    }
    values
}

/// Assigns Stay to every non-terminal state, None to terminal ones.
pub fn stay_policy(table: &StateTable) -> Vec<Action> {
    table
        .iter()
        .map(|state| {
            if state.is_terminal() {
                Action::None
            } else {
                Action::Stay
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_start;
    use crate::model::{legal_actions, Position, StateKey};
    use approx::assert_abs_diff_eq;

    fn solved() -> (StateTable, ValueIterationReport) {
        let mut table = StateTable::new();
        let report = value_iteration(&mut table, &SolverConfig::default()).unwrap();
        (table, report)
    }

    #[test]
    fn test_converges_with_reference_parameters() {
        let (_, report) = solved();
        assert!(report.converged);
        assert!(report.iterations < SolverConfig::default().max_iterations);
        assert!(report.final_delta() < 0.001);
    }

    #[test]
    fn test_deltas_contract() {
        let (_, report) = solved();
        let gamma = SolverConfig::default().discount;
        for pair in report.deltas.windows(2) {
            assert!(
                pair[1] <= gamma * pair[0] + 1e-9,
                "delta grew from {} to {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_terminal_states_are_fixed() {
        let (table, _) = solved();
        for state in table.iter().filter(|s| s.is_terminal()) {
            assert_eq!(state.value, 0.0);
            assert_eq!(state.favoured, Action::None);
        }
    }

    #[test]
    fn test_terminal_reward_is_kept() {
        let mut table = StateTable::new();
        let mut config = SolverConfig::default();
        config.rewards.terminal_reward = 50.0;
        value_iteration(&mut table, &config).unwrap();
        for state in table.iter().filter(|s| s.is_terminal()) {
            assert_eq!(state.value, 50.0);
        }
    }

    #[test]
    fn test_favoured_actions_are_legal_and_greedy() {
        let (table, _) = solved();
        let config = SolverConfig::default();
        let mdp = CompiledMdp::build(&table, &config);
        let values: Vec<f64> = table.iter().map(|s| s.value).collect();
        for state in table.iter().filter(|s| !s.is_terminal()) {
            assert!(legal_actions(state.key()).contains(&state.favoured));
            let (_, best) = mdp.greedy(state.index(), &values);
            let chosen = mdp.q_value(mdp.choice(state.index(), state.favoured).unwrap(), &values);
            assert!(best - chosen < 0.01, "{} is not greedy", state.key());
        }
    }

    #[test]
    fn test_values_are_negative_costs() {
        let (table, _) = solved();
        let start = table.resolve(&default_start());
        assert!(start.value < 0.0);
        assert!(start.value > -5.0 / (1.0 - 0.999));
    }

    #[test]
    fn test_rejects_undiscounted_runs() {
        let mut table = StateTable::new();
        let config = SolverConfig {
            discount: 1.0,
            ..SolverConfig::default()
        };
        assert!(value_iteration(&mut table, &config).is_err());
    }

    #[test]
    fn test_budget_exhaustion_is_reported() {
        let mut table = StateTable::new();
        let config = SolverConfig {
            max_iterations: 3,
            ..SolverConfig::default()
        };
        let report = value_iteration(&mut table, &config).unwrap();
        assert!(!report.converged);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.deltas.len(), 3);
    }

    #[test]
    fn test_first_sweep_matches_immediate_rewards() {
        let table = StateTable::new();
        let config = SolverConfig::default();
        let mdp = CompiledMdp::build(&table, &config);
        let (solution, _) = solve(&mdp, 1, config.tolerance);
        // A dormant adversary never counter-attacks, so one sweep from zero
        // values gives exactly the step cost.
        let quiet = StateKey::from_index(1).unwrap();
        assert_eq!(quiet.position, Position::West);
        assert_abs_diff_eq!(solution[quiet.index()].0, -5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_policy_evaluation_agrees_with_value_iteration() {
        let (table, _) = solved();
        let config = SolverConfig::default();
        let mdp = CompiledMdp::build(&table, &config);
        let policy: Vec<Action> = table.iter().map(|s| s.favoured).collect();
        let evaluated = evaluate_policy(&mdp, &policy, config.max_iterations, 1e-6);
        let start = default_start().index();
        assert_abs_diff_eq!(evaluated[start], table.states()[start].value, epsilon = 2.0);
    }

    #[test]
    fn test_optimal_beats_staying_put() {
        let (table, _) = solved();
        let config = SolverConfig::default();
        let mdp = CompiledMdp::build(&table, &config);
        let baseline = evaluate_policy(&mdp, &stay_policy(&table), config.max_iterations, 1e-6);
        for state in table.iter() {
            assert!(state.value >= baseline[state.index()] - 0.01);
        }
    }
}
