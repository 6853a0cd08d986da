//! The arena MDP: state variables, admissible actions and outcome distributions.

pub mod domain;
pub mod legality;
pub mod state;
pub mod transition;

pub use domain::{Action, AdversaryMode, Arrows, Health, Level, Materials, Position, HEALTH_STEP};
pub use legality::{is_legal, legal_actions};
pub use state::{State, StateKey, StateTable, STATE_COUNT};
pub use transition::{outcomes, positional_outcomes, Outcome, Transition};
