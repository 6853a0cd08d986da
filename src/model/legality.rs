//! Which actions a state admits.
//!
//! Each cell offers a fixed menu; Shoot needs an arrow, Craft needs a
//! material, and a terminal state offers nothing but `None`.

use super::domain::{Action, Position};
use super::state::StateKey;

/// Actions offered at each cell before resource gating, in tie-breaking order.
pub fn position_actions(position: Position) -> &'static [Action] {
    match position {
        Position::Center => &[
            Action::Up,
            Action::Down,
            Action::Left,
            Action::Right,
            Action::Hit,
            Action::Shoot,
            Action::Stay,
        ],
        Position::North => &[Action::Down, Action::Craft, Action::Stay],
        Position::South => &[Action::Up, Action::Gather, Action::Stay],
        Position::East => &[Action::Stay, Action::Left, Action::Shoot, Action::Hit],
        Position::West => &[Action::Stay, Action::Right, Action::Shoot],
    }
}

/// Resource and terminal gating, independent of the cell menu.
pub fn passes_filter(key: &StateKey, action: Action) -> bool {
    match action {
        Action::Shoot => !key.arrows.is_zero(),
        Action::Craft => !key.materials.is_zero(),
        Action::None => key.is_terminal(),
        _ => true,
    }
}

/// Admissible actions for `key`, in the order solvers break ties.
pub fn legal_actions(key: &StateKey) -> Vec<Action> {
    if key.is_terminal() {
        return vec![Action::None];
    }
    position_actions(key.position)
        .iter()
        .copied()
        .filter(|&action| passes_filter(key, action))
        .collect()
}

pub fn is_legal(key: &StateKey, action: Action) -> bool {
    if key.is_terminal() {
        return action == Action::None;
    }
    position_actions(key.position).contains(&action) && passes_filter(key, action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::domain::{AdversaryMode, Arrows, Health, Materials};

    fn key(position: Position, materials: u8, arrows: u8, health: u8) -> StateKey {
        StateKey::new(
            position,
            Materials::new(materials).unwrap(),
            Arrows::new(arrows).unwrap(),
            AdversaryMode::Dormant,
            Health::new(health).unwrap(),
        )
    }

    #[test]
    fn test_shoot_requires_arrows() {
        assert!(!legal_actions(&key(Position::East, 0, 0, 4)).contains(&Action::Shoot));
        assert!(legal_actions(&key(Position::East, 0, 1, 4)).contains(&Action::Shoot));
        assert!(!is_legal(&key(Position::West, 0, 0, 2), Action::Shoot));
    }

    #[test]
    fn test_craft_requires_materials() {
        assert_eq!(
            legal_actions(&key(Position::North, 0, 0, 4)),
            vec![Action::Down, Action::Stay]
        );
        assert_eq!(
            legal_actions(&key(Position::North, 1, 0, 4)),
            vec![Action::Down, Action::Craft, Action::Stay]
        );
    }

    #[test]
    fn test_terminal_state_only_allows_none() {
        let terminal = key(Position::Center, 2, 3, 0);
        assert_eq!(legal_actions(&terminal), vec![Action::None]);
        assert!(is_legal(&terminal, Action::None));
        assert!(!is_legal(&terminal, Action::Stay));
        assert!(!is_legal(&key(Position::Center, 2, 3, 1), Action::None));
    }

    #[test]
    fn test_cell_menus() {
        assert!(!is_legal(&key(Position::West, 0, 3, 4), Action::Hit));
        assert!(!is_legal(&key(Position::South, 0, 3, 4), Action::Shoot));
        assert!(is_legal(&key(Position::South, 2, 0, 4), Action::Gather));
        assert_eq!(legal_actions(&key(Position::Center, 0, 2, 4)).len(), 7);
        assert_eq!(legal_actions(&key(Position::Center, 0, 0, 4)).len(), 6);
    }
}
