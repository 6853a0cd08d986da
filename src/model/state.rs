//! State keys, their dense mixed-radix index, and the solver's state table.

use std::fmt;

use super::domain::{Action, AdversaryMode, Arrows, Health, Materials, Position};
use super::legality::legal_actions;

/// Number of distinct states: |Position| × |Materials| × |Arrows| × |Mode| × |Health|.
pub const STATE_COUNT: usize =
    Position::COUNT * Materials::COUNT * Arrows::COUNT * AdversaryMode::COUNT * Health::COUNT;

// Radix weights of the index encoding, innermost variable last.
const HEALTH_STRIDE: usize = 1;
const MODE_STRIDE: usize = Health::COUNT * HEALTH_STRIDE;
const ARROWS_STRIDE: usize = AdversaryMode::COUNT * MODE_STRIDE;
const MATERIALS_STRIDE: usize = Arrows::COUNT * ARROWS_STRIDE;
const POSITION_STRIDE: usize = Materials::COUNT * MATERIALS_STRIDE;

/// The immutable 5-tuple identifying a state.
///
/// Transitions derive successors with the `with_*` overrides; nothing is ever
/// mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub position: Position,
    pub materials: Materials,
    pub arrows: Arrows,
    pub mode: AdversaryMode,
    pub health: Health,
}

impl StateKey {
    pub fn new(
        position: Position,
        materials: Materials,
        arrows: Arrows,
        mode: AdversaryMode,
        health: Health,
    ) -> Self {
        Self {
            position,
            materials,
            arrows,
            mode,
            health,
        }
    }

    /// Dense index in `0..STATE_COUNT`.
    pub fn index(&self) -> usize {
        self.position.code() * POSITION_STRIDE
            + self.materials.code() * MATERIALS_STRIDE
            + self.arrows.code() * ARROWS_STRIDE
            + self.mode.code() * MODE_STRIDE
            + self.health.code() * HEALTH_STRIDE
    }

    /// Inverse of [`StateKey::index`]; `None` past the last state.
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= STATE_COUNT {
            return None;
        }
        Some(Self {
            position: Position::from_code(index / POSITION_STRIDE)?,
            materials: Materials::from_code(index % POSITION_STRIDE / MATERIALS_STRIDE)?,
            arrows: Arrows::from_code(index % MATERIALS_STRIDE / ARROWS_STRIDE)?,
            mode: AdversaryMode::from_code(index % ARROWS_STRIDE / MODE_STRIDE)?,
            health: Health::from_code(index % MODE_STRIDE)?,
        })
    }

    /// Health zero is absorbing.
    pub fn is_terminal(&self) -> bool {
        self.health.is_zero()
    }

    pub fn with_position(self, position: Position) -> Self {
        Self { position, ..self }
    }

    pub fn with_materials(self, materials: Materials) -> Self {
        Self { materials, ..self }
    }

    pub fn with_arrows(self, arrows: Arrows) -> Self {
        Self { arrows, ..self }
    }

    pub fn with_mode(self, mode: AdversaryMode) -> Self {
        Self { mode, ..self }
    }

    pub fn with_health(self, health: Health) -> Self {
        Self { health, ..self }
    }

    /// Every key in index order.
    pub fn all() -> impl Iterator<Item = StateKey> {
        Position::ALL.into_iter().flat_map(|position| {
            Materials::all().flat_map(move |materials| {
                Arrows::all().flat_map(move |arrows| {
                    AdversaryMode::ALL.into_iter().flat_map(move |mode| {
                        Health::all()
                            .map(move |health| StateKey::new(position, materials, arrows, mode, health))
                    })
                })
            })
        })
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.position,
            self.materials,
            self.arrows,
            self.mode,
            self.health.points()
        )
    }
}

/// A state together with the annotations solvers write.
#[derive(Debug, Clone)]
pub struct State {
    key: StateKey,
    actions: Vec<Action>,
    /// Current value estimate.
    pub value: f64,
    /// Action currently preferred by the solver.
    pub favoured: Action,
}

impl State {
    fn new(key: StateKey) -> Self {
        Self {
            key,
            actions: legal_actions(&key),
            value: 0.0,
            favoured: Action::None,
        }
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    pub fn index(&self) -> usize {
        self.key.index()
    }

    /// Admissible actions in tie-breaking order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_terminal(&self) -> bool {
        self.key.is_terminal()
    }
}

/// All [`STATE_COUNT`] states, stored at their own index.
///
/// Built once and never resized; persistence relies on this order.
#[derive(Debug, Clone)]
pub struct StateTable {
    states: Vec<State>,
}

impl StateTable {
    pub fn new() -> Self {
        let states: Vec<State> = StateKey::all().map(State::new).collect();
        debug_assert_eq!(states.len(), STATE_COUNT);
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut State> {
        self.states.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&State> {
        self.states.get(index)
    }

    /// Canonical state for `key`.
    ///
    /// # Panics
    /// Panics if the slot at `key.index()` holds a different key, which means
    /// the index encoding and the table order have drifted apart.
    pub fn resolve(&self, key: &StateKey) -> &State {
        let state = &self.states[key.index()];
        assert_eq!(
            state.key, *key,
            "state key {key} resolved to slot {} holding {}",
            key.index(),
            state.key
        );
        state
    }

    /// Mutable counterpart of [`StateTable::resolve`].
    pub fn resolve_mut(&mut self, key: &StateKey) -> &mut State {
        let index = key.index();
        let state = &mut self.states[index];
        assert_eq!(
            state.key, *key,
            "state key {key} resolved to slot {index} holding {}",
            state.key
        );
        state
    }

    /// One `state: ACTION [value]` line per state.
    pub fn summary(&self) -> String {
        self.states
            .iter()
            .map(|state| format!("{}: {} [{:.3}]\n", state.key, state.favoured, state.value))
            .collect()
    }
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_count() {
        assert_eq!(STATE_COUNT, 600);
        assert_eq!(StateTable::new().len(), STATE_COUNT);
    }

    #[test]
    fn test_index_is_a_bijection() {
        let mut seen = vec![false; STATE_COUNT];
        for key in StateKey::all() {
            let index = key.index();
            assert!(!seen[index], "index {index} produced twice");
            seen[index] = true;
            assert_eq!(StateKey::from_index(index), Some(key));
        }
        assert!(seen.iter().all(|&hit| hit));
        assert_eq!(StateKey::from_index(STATE_COUNT), None);
    }

    #[test]
    fn test_index_formula() {
        let key = StateKey::new(
            Position::Center,
            Materials::new(2).unwrap(),
            Arrows::new(3).unwrap(),
            AdversaryMode::Ready,
            Health::new(4).unwrap(),
        );
        // 4*120 + 2*40 + 3*10 + 1*5 + 4
        assert_eq!(key.index(), 599);
        assert_eq!(key.to_string(), "(C, 2, 3, R, 100)");
    }

    #[test]
    fn test_table_is_stored_in_index_order() {
        let table = StateTable::new();
        for (index, state) in table.iter().enumerate() {
            assert_eq!(state.index(), index);
            assert_eq!(table.resolve(state.key()).index(), index);
        }
    }

    #[test]
    fn test_overrides_leave_other_fields() {
        let key = StateKey::from_index(137).unwrap();
        let moved = key.with_position(Position::East);
        assert_eq!(moved.position, Position::East);
        assert_eq!(moved.materials, key.materials);
        assert_eq!(moved.arrows, key.arrows);
        assert_eq!(moved.mode, key.mode);
        assert_eq!(moved.health, key.health);
    }

    #[test]
    fn test_terminal_states_only_allow_none() {
        let table = StateTable::new();
        for state in table.iter() {
            if state.is_terminal() {
                assert_eq!(state.actions(), &[Action::None]);
            } else {
                assert!(!state.actions().contains(&Action::None));
            }
        }
    }
}
