pub mod config;
pub mod error;
pub mod model;
pub mod policy;
pub mod simulation;
pub mod solver;

pub use config::{LpConfig, RewardConfig, SimulationConfig, SolverConfig};
pub use error::{Error, LpError, Result};
pub use model::{Action, StateKey, StateTable};
