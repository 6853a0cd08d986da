use log::{debug, trace};
use ndarray::{s, Array1, Array2, Axis};
use num_traits::Float;
use std::fmt::Debug;
use std::time::{Duration, Instant};

use crate::config::LpConfig;
use crate::error::LpError;

/// A linear programming problem in equality standard form.
#[derive(Debug, Clone)]
pub struct LinearProgram<T>
where
    T: Float + Debug,
{
    /// The objective function coefficients (c in max c^T x)
    pub objective: Array1<T>,
    /// The constraint matrix (A in Ax = b)
    pub constraints: Array2<T>,
    /// The right-hand side vector (b in Ax = b)
    pub rhs: Array1<T>,
}

/// Optimal vertex found by [`maximize`].
#[derive(Debug, Clone)]
pub struct SimplexSolution<T>
where
    T: Float + Debug,
{
    pub point: Array1<T>,
    pub objective: T,
    /// Pivots over both phases.
    pub pivots: usize,
}

/// Entries smaller than this are flushed to zero after each pivot.
const ZERO_TOLERANCE: f64 = 1e-12;

/// Consecutive degenerate pivots tolerated before switching to Bland's rule.
const STALL_LIMIT: usize = 50;

/// Size of the right-hand-side perturbation, relative to the largest |b|.
const PERTURBATION: f64 = 1e-7;

// Column layout: n real, m artificial, then the perturbed rhs that drives the
// ratio tests and the exact rhs carried along by every row operation.
struct Layout {
    n: usize,
    m: usize,
}

impl Layout {
    fn rhs(&self) -> usize {
        self.n + self.m
    }

    fn exact(&self) -> usize {
        self.n + self.m + 1
    }
}

/// Maximizes a linear program using the two-phase Simplex Method.
///
/// The method solves linear programs in equality standard form:
/// maximize c^T x
/// subject to Ax = b
///           x ≥ 0
///
/// Pivoting runs on `b + ε`, with a small distinct `ε_i` per row, so every
/// basic variable stays strictly positive and each pivot strictly improves
/// the objective. The unperturbed `b` is carried as an extra tableau column
/// and the returned point is read from it, which makes it the vertex of the
/// optimal basis for the original problem. Phase I drives a full set of
/// artificial variables out of the basis; redundant rows are dropped before
/// Phase II optimizes the real objective. Entering columns follow Dantzig's
/// rule and fall back to Bland's rule while pivots stall.
///
/// # Errors
///
/// * [`LpError::Infeasible`] if no `x ≥ 0` satisfies `Ax = b`, or the final
///   basis misses `b` by more than the feasibility tolerance
/// * [`LpError::Unbounded`] if the objective grows without limit
/// * [`LpError::PivotLimit`] / [`LpError::TimeBudget`] when `config` limits run out
///
/// # Examples
///
/// ```
/// use arena_mdp::config::LpConfig;
/// use arena_mdp::solver::simplex::{maximize, LinearProgram};
/// use ndarray::array;
///
/// // maximize x + y
/// // subject to:
/// //   x + y + s = 1
/// //   x, y, s ≥ 0
/// let lp = LinearProgram {
///     objective: array![1.0_f64, 1.0, 0.0],
///     constraints: array![[1.0, 1.0, 1.0]],
///     rhs: array![1.0],
/// };
///
/// let solution = maximize(&lp, &LpConfig::default()).unwrap();
/// assert!((solution.objective - 1.0).abs() < 1e-9);
/// ```
pub fn maximize<T>(lp: &LinearProgram<T>, config: &LpConfig) -> Result<SimplexSolution<T>, LpError>
where
    T: Float + Debug + 'static,
{
    let (m, n) = lp.constraints.dim();
    if lp.objective.len() != n || lp.rhs.len() != m {
        return Err(LpError::Dimension(format!(
            "{m}x{n} constraints with {} objective and {} rhs entries",
            lp.objective.len(),
            lp.rhs.len()
        )));
    }

    let eps = T::from(config.tolerance).unwrap_or_else(T::epsilon);
    let scale = lp
        .rhs
        .iter()
        .fold(T::one(), |largest, v| largest.max(v.abs()));
    let feasibility = eps.sqrt() * scale;
    let mut clock = PivotClock::new(config);
    let layout = Layout { n, m };

    // Phase I: maximize -sum(artificials) from the all-artificial basis.
    let mut tableau = phase_one_tableau(lp, &layout, scale);
    let mut basis: Vec<usize> = (n..n + m).collect();
    run_phase(
        &mut tableau,
        &mut basis,
        n + m,
        layout.rhs(),
        Some(-eps * scale),
        eps,
        &mut clock,
    )?;

    let residual = -tableau[[0, layout.rhs()]];
    if residual > feasibility {
        return Err(LpError::Infeasible {
            residual: residual.to_f64().unwrap_or(f64::NAN),
        });
    }
    debug!(
        "simplex phase I feasible after {} pivots (residual {:?})",
        clock.pivots, residual
    );

    let redundant = drive_out_artificials(&mut tableau, &mut basis, &layout, eps, &mut clock)?;
    if !redundant.is_empty() {
        trace!("simplex dropping {} redundant rows", redundant.len());
    }

    // Phase II on the tableau without artificial columns.
    let kept_rows: Vec<usize> = std::iter::once(0)
        .chain((1..=m).filter(|row| !redundant.contains(row)))
        .collect();
    let kept_cols: Vec<usize> = (0..n).chain([layout.rhs(), layout.exact()]).collect();
    let mut tableau = tableau
        .select(Axis(0), &kept_rows)
        .select(Axis(1), &kept_cols);
    let mut basis: Vec<usize> = kept_rows[1..].iter().map(|&row| basis[row - 1]).collect();
    let (rhs, exact) = (n, n + 1);

    {
        let mut objective_row = tableau.row_mut(0);
        objective_row.fill(T::zero());
        for j in 0..n {
            objective_row[j] = -lp.objective[j];
        }
    }
    for (k, &col) in basis.iter().enumerate() {
        let coef = tableau[[0, col]];
        if coef != T::zero() {
            let row = tableau.row(k + 1).to_owned();
            tableau.row_mut(0).scaled_add(-coef, &row);
        }
    }
    run_phase(&mut tableau, &mut basis, n, rhs, None, eps, &mut clock)?;

    let mut point = Array1::zeros(n);
    for (k, &col) in basis.iter().enumerate() {
        point[col] = tableau[[k + 1, exact]];
    }
    let lowest = point.iter().fold(T::zero(), |low: T, &v| low.min(v));
    let violation = (lp.constraints.dot(&point) - &lp.rhs)
        .iter()
        .fold(-lowest, |worst: T, v| worst.max(v.abs()));
    if violation > feasibility {
        return Err(LpError::Infeasible {
            residual: violation.to_f64().unwrap_or(f64::NAN),
        });
    }
    point.mapv_inplace(|v| v.max(T::zero()));
    let objective = lp.objective.dot(&point);
    debug!(
        "simplex optimal after {} pivots (objective {:?})",
        clock.pivots, objective
    );

    Ok(SimplexSolution {
        point,
        objective,
        pivots: clock.pivots,
    })
}

/// Counts pivots against the pivot and wall-clock budgets.
struct PivotClock {
    started: Instant,
    budget: Option<Duration>,
    max_pivots: usize,
    pivots: usize,
}

impl PivotClock {
    fn new(config: &LpConfig) -> Self {
        Self {
            started: Instant::now(),
            budget: config.time_budget,
            max_pivots: config.max_pivots,
            pivots: 0,
        }
    }

    fn tick(&mut self) -> Result<(), LpError> {
        self.pivots += 1;
        if self.pivots > self.max_pivots {
            return Err(LpError::PivotLimit(self.max_pivots));
        }
        if let Some(budget) = self.budget {
            if self.started.elapsed() >= budget {
                return Err(LpError::TimeBudget(budget));
            }
        }
        Ok(())
    }
}

/// Offset added to row `row`'s right-hand side; distinct for rows that
/// differ modulo 997, all within `[1, 2) * PERTURBATION * scale`.
fn perturbation<T: Float>(row: usize, scale: T) -> T {
    let spread = ((row * 7919) % 997) as f64 / 997.0;
    T::from(PERTURBATION * (1.0 + spread)).unwrap_or_else(T::epsilon) * scale
}

// Row 0 holds reduced costs; constraint row i+1 starts with artificial n+i basic.
fn phase_one_tableau<T>(lp: &LinearProgram<T>, layout: &Layout, scale: T) -> Array2<T>
where
    T: Float + Debug + 'static,
{
    let Layout { n, m } = *layout;
    let mut tableau = Array2::zeros((m + 1, n + m + 2));

    for i in 0..m {
        // Flip rows so every right-hand side is non-negative.
        let sign = if lp.rhs[i] < T::zero() { -T::one() } else { T::one() };
        for j in 0..n {
            tableau[[i + 1, j]] = sign * lp.constraints[[i, j]];
        }
        tableau[[i + 1, n + i]] = T::one();
        tableau[[i + 1, layout.exact()]] = sign * lp.rhs[i];
        tableau[[i + 1, layout.rhs()]] = sign * lp.rhs[i] + perturbation(i, scale);
    }

    let column_sums = tableau.slice(s![1.., ..]).sum_axis(Axis(0));
    tableau.slice_mut(s![0, n..n + m]).fill(T::one());
    tableau.row_mut(0).scaled_add(-T::one(), &column_sums);
    tableau
}

// Swaps artificials still basic after phase I for real columns, preferring a
// positive entry and otherwise the largest magnitude. The artificial's level is
// zeroed first so the pivot moves no other basic value. Rows with no real entry
// left are redundant and returned.
fn drive_out_artificials<T>(
    tableau: &mut Array2<T>,
    basis: &mut [usize],
    layout: &Layout,
    eps: T,
    clock: &mut PivotClock,
) -> Result<Vec<usize>, LpError>
where
    T: Float + Debug + 'static,
{
    let Layout { n, m } = *layout;
    let mut redundant = Vec::new();
    for row in 1..=m {
        if basis[row - 1] < n {
            continue;
        }
        let largest = |keep: &dyn Fn(T) -> bool| {
            (0..n)
                .filter(|&j| keep(tableau[[row, j]]))
                .fold(None, |best: Option<(usize, T)>, j| {
                    let size = tableau[[row, j]].abs();
                    match best {
                        Some((_, top)) if top >= size => best,
                        _ => Some((j, size)),
                    }
                })
                .map(|(j, _)| j)
        };
        let entering = largest(&|v| v > eps).or_else(|| largest(&|v| v.abs() > eps));
        match entering {
            Some(col) => {
                tableau[[row, layout.rhs()]] = T::zero();
                tableau[[row, layout.exact()]] = T::zero();
                pivot(tableau, row, col);
                basis[row - 1] = col;
                clock.tick()?;
            }
            None => redundant.push(row),
        }
    }
    Ok(redundant)
}

// Pivots until no column below `entering_limit` has a negative reduced cost,
// or until the objective in column `rhs` reaches `stop_at`.
fn run_phase<T>(
    tableau: &mut Array2<T>,
    basis: &mut [usize],
    entering_limit: usize,
    rhs: usize,
    stop_at: Option<T>,
    eps: T,
    clock: &mut PivotClock,
) -> Result<(), LpError>
where
    T: Float + Debug + 'static,
{
    let mut stalled = 0;

    loop {
        if stop_at.is_some_and(|target| tableau[[0, rhs]] >= target) {
            return Ok(());
        }
        let reduced = tableau.row(0);
        let candidates = reduced
            .iter()
            .take(entering_limit)
            .enumerate()
            .filter(|&(_, &cost)| cost < -eps);
        let entering = if stalled >= STALL_LIMIT {
            candidates.map(|(j, _)| j).next()
        } else {
            candidates
                .fold(None, |best: Option<(usize, T)>, (j, &cost)| match best {
                    Some((_, lowest)) if lowest <= cost => best,
                    _ => Some((j, cost)),
                })
                .map(|(j, _)| j)
        };
        let Some(col) = entering else {
            return Ok(());
        };

        // Minimum ratio test, exact ties broken towards the smallest basic index.
        let mut leaving: Option<(usize, T)> = None;
        for row in 1..tableau.nrows() {
            let coef = tableau[[row, col]];
            if coef <= eps {
                continue;
            }
            let ratio = tableau[[row, rhs]].max(T::zero()) / coef;
            leaving = match leaving {
                Some((best_row, best))
                    if ratio > best || (ratio >= best && basis[row - 1] > basis[best_row - 1]) =>
                {
                    Some((best_row, best))
                }
                _ => Some((row, ratio)),
            };
        }
        let Some((row, ratio)) = leaving else {
            return Err(LpError::Unbounded { column: col });
        };

        stalled = if ratio > T::zero() { 0 } else { stalled + 1 };
        pivot(tableau, row, col);
        basis[row - 1] = col;
        clock.tick()?;
    }
}

fn pivot<T>(tableau: &mut Array2<T>, leaving_row: usize, entering_col: usize)
where
    T: Float + Debug + 'static,
{
    let clean = T::from(ZERO_TOLERANCE).unwrap_or_else(T::epsilon);
    let scale = T::one() / tableau[[leaving_row, entering_col]];
    tableau.row_mut(leaving_row).mapv_inplace(|v| v * scale);
    let pivot_row = tableau.row(leaving_row).to_owned();

    for (i, mut row) in tableau.axis_iter_mut(Axis(0)).enumerate() {
        if i == leaving_row {
            continue;
        }
        let factor = row[entering_col];
        if factor != T::zero() {
            row.scaled_add(-factor, &pivot_row);
            row.mapv_inplace(|v| if v.abs() < clean { T::zero() } else { v });
            row[entering_col] = T::zero();
        }
    }
    tableau[[leaving_row, entering_col]] = T::one();
}
