//! The arena as a discounted occupancy-measure linear program.
//!
//! One variable per (state, admissible action) pair holds the expected
//! discounted number of times that action is taken in that state. Flow
//! conservation gives one equality row per state:
//!
//! ```text
//! Σ_a x(s, a) − γ Σ_{s', a'} P(s | s', a') x(s', a') = α(s),   x ≥ 0
//! ```
//!
//! and maximizing `r · x` over that polytope yields the optimal occupancy.
//! Self-loops are folded into the diagonal: a column's outcomes returning to
//! its own state contribute `(1 − γ)·p` there instead of a separate inflow.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;

use log::{debug, info};
use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::config::SolverConfig;
use crate::error::{LpError, Result};
use crate::model::{Action, StateTable};
use crate::solver::mdp::CompiledMdp;
use crate::solver::simplex::{maximize, LinearProgram};
use crate::solver::value_iteration::evaluate_policy;

/// Largest tolerated |A·x − α| for an accepted occupancy vector.
pub const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// The assembled program: columns, per-state column blocks, A, r and α.
#[derive(Debug, Clone)]
pub struct OccupancyLp {
    /// `(state index, action)` of every column, grouped by state.
    pub columns: Vec<(usize, Action)>,
    /// Column range of each state's block.
    pub blocks: Vec<Range<usize>>,
    pub a: Array2<f64>,
    pub r: Array1<f64>,
    pub alpha: Array1<f64>,
}

impl OccupancyLp {
    /// Builds A, r and α for `table` under `config`, with α taken from the
    /// configured start distribution.
    ///
    /// # Panics
    /// Panics if an outcome distribution is not normalized or a successor does
    /// not resolve to its own slot of `table`.
    pub fn build(table: &StateTable, config: &SolverConfig) -> Self {
        let mdp = CompiledMdp::build(table, config);
        Self::from_mdp(&mdp, start_distribution(table, config))
    }

    /// Builds A and r from the branches of `mdp`. Terminal states get a single
    /// column with +1 on their own row and the pinned terminal value as reward.
    ///
    /// # Panics
    /// Panics if `alpha` does not hold one entry per state.
    pub fn from_mdp(mdp: &CompiledMdp, alpha: Array1<f64>) -> Self {
        let num_states = mdp.num_states();
        assert_eq!(alpha.len(), num_states, "alpha needs one entry per state");
        let gamma = mdp.gamma;

        let mut columns = Vec::new();
        let mut blocks = Vec::with_capacity(num_states);
        for state in 0..num_states {
            let start = columns.len();
            columns.extend(mdp.choices(state).iter().map(|choice| (state, choice.action)));
            blocks.push(start..columns.len());
        }

        let mut a = Array2::zeros((num_states, columns.len()));
        let mut r = Array1::zeros(columns.len());

        for (col, &(row, _)) in columns.iter().enumerate() {
            if mdp.is_terminal(row) {
                a[[row, col]] = 1.0;
                r[col] = mdp.terminal_value;
                continue;
            }

            let choice = &mdp.choices(row)[col - blocks[row].start];
            r[col] = choice
                .branches
                .iter()
                .map(|branch| branch.probability * branch.reward)
                .sum();
            for branch in &choice.branches {
                if branch.next == row {
                    a[[row, col]] += (1.0 - gamma) * branch.probability;
                } else {
                    a[[row, col]] += branch.probability;
                    a[[branch.next, col]] -= gamma * branch.probability;
                }
            }
        }

        Self {
            columns,
            blocks,
            a,
            r,
            alpha,
        }
    }

    /// Number of (state, action) variables.
    pub fn dimension(&self) -> usize {
        self.columns.len()
    }

    /// Largest |A·x − α| over all rows.
    pub fn residual(&self, x: &Array1<f64>) -> f64 {
        (self.a.dot(x) - &self.alpha)
            .iter()
            .fold(0.0_f64, |worst, v| worst.max(v.abs()))
    }

    /// Residual of `x`, provided it is within [`RESIDUAL_TOLERANCE`].
    ///
    /// # Errors
    /// [`LpError::FlowViolation`] when `x` misses α by more than that.
    pub fn verify(&self, x: &Array1<f64>) -> std::result::Result<f64, LpError> {
        let residual = self.residual(x);
        if residual.is_nan() || residual > RESIDUAL_TOLERANCE {
            return Err(LpError::FlowViolation { residual });
        }
        Ok(residual)
    }

    /// Per state, the action whose occupancy is largest in its block; the
    /// first action reaching the maximum wins ties.
    pub fn decode(&self, x: &Array1<f64>) -> Vec<Action> {
        self.blocks
            .iter()
            .map(|block| {
                let mut best = block.start;
                for col in block.clone() {
                    if x[col] > x[best] {
                        best = col;
                    }
                }
                self.columns[best].1
            })
            .collect()
    }

    fn program(&self) -> LinearProgram<f64> {
        LinearProgram {
            objective: self.r.clone(),
            constraints: self.a.clone(),
            rhs: self.alpha.clone(),
        }
    }
}

fn start_distribution(table: &StateTable, config: &SolverConfig) -> Array1<f64> {
    let mut alpha = Array1::zeros(table.len());
    for (key, mass) in &config.start {
        alpha[table.resolve(key).index()] += mass;
    }
    alpha
}

/// Result of [`solve_lp`].
#[derive(Debug, Clone)]
pub struct LpReport {
    pub program: OccupancyLp,
    /// Optimal occupancy vector.
    pub x: Array1<f64>,
    /// `r · x`, the expected discounted reward from α.
    pub objective: f64,
    pub policy: Vec<Action>,
    /// Values of `policy` under iterative evaluation.
    pub values: Vec<f64>,
    pub residual: f64,
    pub pivots: usize,
}

#[derive(Serialize)]
struct LpDump<'a> {
    a: &'a Array2<f64>,
    r: &'a Array1<f64>,
    alpha: &'a Array1<f64>,
    x: &'a Array1<f64>,
    policy: &'a [Action],
    objective: f64,
}

impl LpReport {
    /// Writes A, r, α, x, the decoded policy (as action codes) and the
    /// objective as one JSON document.
    pub fn dump<W: Write>(&self, writer: W) -> Result<()> {
        let dump = LpDump {
            a: &self.program.a,
            r: &self.program.r,
            alpha: &self.program.alpha,
            x: &self.x,
            policy: &self.policy,
            objective: self.objective,
        };
        serde_json::to_writer(writer, &dump)?;
        Ok(())
    }

    pub fn dump_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.dump(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Solves the occupancy LP of `mdp` from start distribution `alpha` and
/// evaluates the decoded policy. The discount comes from `mdp`; `config`
/// supplies the simplex limits and the evaluation budget.
///
/// # Errors
/// [`Error::Lp`](crate::error::Error::Lp) when the simplex solve fails or its
/// vertex breaks flow conservation beyond [`RESIDUAL_TOLERANCE`].
///
/// # Panics
/// Panics if `alpha` does not hold one entry per state.
pub fn solve_occupancy(
    mdp: &CompiledMdp,
    alpha: Array1<f64>,
    config: &SolverConfig,
) -> Result<LpReport> {
    let program = OccupancyLp::from_mdp(mdp, alpha);
    info!(
        "occupancy LP with {} rows and {} columns (gamma {})",
        program.a.nrows(),
        program.dimension(),
        mdp.gamma
    );

    let solution = maximize(&program.program(), &config.lp)?;
    let residual = program.verify(&solution.point)?;
    debug!(
        "simplex finished in {} pivots, residual {residual:e}",
        solution.pivots
    );

    let policy = program.decode(&solution.point);
    let values = evaluate_policy(mdp, &policy, config.max_iterations, config.tolerance);
    info!("LP objective {:.4}", solution.objective);

    Ok(LpReport {
        program,
        x: solution.point,
        objective: solution.objective,
        policy,
        values,
        residual,
        pivots: solution.pivots,
    })
}

/// Solves the arena through its occupancy LP and writes the decoded policy
/// and its evaluated values into `table`.
///
/// # Errors
/// [`Error::InvalidConfig`](crate::error::Error::InvalidConfig) for a rejected
/// configuration, [`Error::Lp`](crate::error::Error::Lp) when the solve fails
/// as described for [`solve_occupancy`].
pub fn solve_lp(table: &mut StateTable, config: &SolverConfig) -> Result<LpReport> {
    config.validate()?;
    let mdp = CompiledMdp::build(table, config);
    let report = solve_occupancy(&mdp, start_distribution(table, config), config)?;

    for (state, (&action, &value)) in table
        .iter_mut()
        .zip(report.policy.iter().zip(report.values.iter()))
    {
        state.favoured = action;
        state.value = value;
    }
    Ok(report)
}
