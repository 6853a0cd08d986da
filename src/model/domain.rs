//! The closed domains every state variable is drawn from.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Health points represented by one [`Health`] level.
pub const HEALTH_STEP: u32 = 25;

/// One of the five arena cells. `Center` is the hub joining the other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Position {
    West,
    North,
    East,
    South,
    Center,
}

impl Position {
    pub const COUNT: usize = 5;
    pub const ALL: [Position; Self::COUNT] = [
        Position::West,
        Position::North,
        Position::East,
        Position::South,
        Position::Center,
    ];

    pub fn code(self) -> usize {
        self as usize
    }

    pub fn from_code(code: usize) -> Option<Self> {
        Self::ALL.get(code).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Position::West => "W",
            Position::North => "N",
            Position::East => "E",
            Position::South => "S",
            Position::Center => "C",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A quantized quantity with `LEVELS` values `0..LEVELS`.
///
/// Arithmetic saturates at both ends so a yield or a hit can never leave the
/// enumerated domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Level<const LEVELS: u8>(u8);

impl<const LEVELS: u8> Level<LEVELS> {
    pub const COUNT: usize = LEVELS as usize;
    pub const MIN: Self = Level(0);
    pub const MAX: Self = Level(LEVELS - 1);

    pub fn new(value: u8) -> Option<Self> {
        (value < LEVELS).then_some(Level(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn code(self) -> usize {
        self.0 as usize
    }

    pub fn from_code(code: usize) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::new)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, amount: u8) -> Self {
        Level(self.0.saturating_add(amount).min(LEVELS - 1))
    }

    pub fn saturating_sub(self, amount: u8) -> Self {
        Level(self.0.saturating_sub(amount))
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..LEVELS).map(Level)
    }
}

impl<const LEVELS: u8> fmt::Display for Level<LEVELS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Crafting materials held by the agent.
pub type Materials = Level<3>;
/// Arrows held by the agent.
pub type Arrows = Level<4>;
/// Adversary health, in steps of [`HEALTH_STEP`] points. Level 0 ends the episode.
pub type Health = Level<5>;

impl Level<5> {
    /// Health expressed in points (0, 25, ..., 100).
    pub fn points(self) -> u32 {
        self.0 as u32 * HEALTH_STEP
    }
}

/// Behavioural mode of the adversary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdversaryMode {
    Dormant,
    Ready,
}

impl AdversaryMode {
    pub const COUNT: usize = 2;
    pub const ALL: [AdversaryMode; Self::COUNT] = [AdversaryMode::Dormant, AdversaryMode::Ready];

    pub fn code(self) -> usize {
        self as usize
    }

    pub fn from_code(code: usize) -> Option<Self> {
        Self::ALL.get(code).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            AdversaryMode::Dormant => "D",
            AdversaryMode::Ready => "R",
        }
    }
}

impl fmt::Display for AdversaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the agent can attempt. `None` is the only action of a terminal state.
///
/// Serialized as its numeric code so policy files stay compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Action {
    Up,
    Left,
    Down,
    Right,
    Stay,
    Shoot,
    Hit,
    Craft,
    Gather,
    None,
}

impl Action {
    pub const COUNT: usize = 10;
    pub const ALL: [Action; Self::COUNT] = [
        Action::Up,
        Action::Left,
        Action::Down,
        Action::Right,
        Action::Stay,
        Action::Shoot,
        Action::Hit,
        Action::Craft,
        Action::Gather,
        Action::None,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Up => "UP",
            Action::Left => "LEFT",
            Action::Down => "DOWN",
            Action::Right => "RIGHT",
            Action::Stay => "STAY",
            Action::Shoot => "SHOOT",
            Action::Hit => "HIT",
            Action::Craft => "CRAFT",
            Action::Gather => "GATHER",
            Action::None => "NONE",
        }
    }

    /// Cell reached by a successful move from `from`, if this is a move.
    ///
    /// Outer cells only connect to the hub, so any move other than `Stay`
    /// made away from the hub lands on it.
    pub fn destination(self, from: Position) -> Option<Position> {
        let heading = match self {
            Action::Up => Position::North,
            Action::Down => Position::South,
            Action::Left => Position::West,
            Action::Right => Position::East,
            Action::Stay => return Some(from),
            _ => return None,
        };
        if from == Position::Center {
            Some(heading)
        } else {
            Some(Position::Center)
        }
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> u8 {
        action.code()
    }
}

impl TryFrom<u8> for Action {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Action::ALL
            .get(code as usize)
            .copied()
            .ok_or(Error::UnknownAction(code))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_saturates_at_both_ends() {
        let arrows = Arrows::new(2).unwrap();
        assert_eq!(arrows.saturating_add(3), Arrows::MAX);
        assert_eq!(arrows.saturating_sub(5), Arrows::MIN);
        assert_eq!(Materials::MAX.value(), 2);
        assert!(Health::new(5).is_none());
    }

    #[test]
    fn test_health_points() {
        let points: Vec<u32> = Health::all().map(Health::points).collect();
        assert_eq!(points, vec![0, 25, 50, 75, 100]);
    }

    #[test]
    fn test_action_codes_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::try_from(action.code()).unwrap(), action);
        }
        assert!(matches!(
            Action::try_from(10),
            Err(Error::UnknownAction(10))
        ));
    }

    #[test]
    fn test_move_destinations() {
        assert_eq!(
            Action::Up.destination(Position::Center),
            Some(Position::North)
        );
        assert_eq!(
            Action::Down.destination(Position::North),
            Some(Position::Center)
        );
        assert_eq!(
            Action::Stay.destination(Position::South),
            Some(Position::South)
        );
        assert_eq!(
            Action::Left.destination(Position::East),
            Some(Position::Center)
        );
        assert_eq!(Action::Shoot.destination(Position::West), None);
    }
}
