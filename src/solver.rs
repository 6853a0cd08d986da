//! Solvers for the arena MDP: value iteration and the occupancy LP.

pub mod linear_program;
pub mod mdp;
pub mod simplex;
pub mod value_iteration;

pub use linear_program::{solve_lp, solve_occupancy, LpReport, OccupancyLp};
pub use mdp::{Branch, Choice, CompiledMdp};
pub use simplex::{maximize, LinearProgram, SimplexSolution};
pub use value_iteration::{evaluate_policy, stay_policy, value_iteration, ValueIterationReport};
