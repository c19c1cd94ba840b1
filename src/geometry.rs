use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Grid coordinate, top-left is (0, 0); `x` grows right and `y` grows down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_next_to(self, other: Position) -> bool {
        (self.x - other.x).abs() + (self.y - other.y).abs() == 1
    }

    /// Heading from `self` toward `target`; vertical offsets win over
    /// horizontal ones.
    pub fn direction_to(self, target: Position) -> Option<Direction> {
        if self.y > target.y {
            Some(Direction::Up)
        } else if self.y < target.y {
            Some(Direction::Down)
        } else if self.x > target.x {
            Some(Direction::Left)
        } else if self.x < target.x {
            Some(Direction::Right)
        } else {
            None
        }
    }

    pub fn neighbors(self) -> [Position; 4] {
        Direction::CYCLE.map(|dir| self + dir)
    }
}

impl Add<Direction> for Position {
    type Output = Position;

    fn add(self, dir: Direction) -> Position {
        let (dx, dy) = dir.delta();
        Position::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Counter-clockwise order; turning left walks forward in it.
    pub const CYCLE: [Direction; 4] = [
        Direction::Up,
        Direction::Left,
        Direction::Down,
        Direction::Right,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn change_direction(self, action: Action) -> Direction {
        let idx = Self::CYCLE
            .iter()
            .position(|dir| *dir == self)
            .unwrap_or_default();
        let step = match action {
            Action::Forward => 0,
            Action::TurnLeft => 1,
            Action::TurnRight => Self::CYCLE.len() - 1,
        };
        Self::CYCLE[(idx + step) % Self::CYCLE.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[default]
    Forward,
    TurnLeft,
    TurnRight,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Forward, Action::TurnLeft, Action::TurnRight];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FORWARD" => Some(Self::Forward),
            "TURN_LEFT" => Some(Self::TurnLeft),
            "TURN_RIGHT" => Some(Self::TurnRight),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Forward => "FORWARD",
            Action::TurnLeft => "TURN_LEFT",
            Action::TurnRight => "TURN_RIGHT",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_keeps_heading() {
        for dir in Direction::CYCLE {
            assert_eq!(dir.change_direction(Action::Forward), dir);
        }
    }

    #[test]
    fn four_left_turns_return_to_heading() {
        for dir in Direction::CYCLE {
            let mut current = dir;
            for _ in 0..4 {
                current = current.change_direction(Action::TurnLeft);
            }
            assert_eq!(current, dir);
        }
    }

    #[test]
    fn left_and_right_turns_are_inverses() {
        for dir in Direction::CYCLE {
            let left = dir.change_direction(Action::TurnLeft);
            assert_eq!(left.change_direction(Action::TurnRight), dir);
            let right = dir.change_direction(Action::TurnRight);
            assert_eq!(right.change_direction(Action::TurnLeft), dir);
        }
    }

    #[test]
    fn turns_follow_compass() {
        assert_eq!(Direction::Up.change_direction(Action::TurnLeft), Direction::Left);
        assert_eq!(Direction::Up.change_direction(Action::TurnRight), Direction::Right);
        assert_eq!(Direction::Right.change_direction(Action::TurnRight), Direction::Down);
    }

    #[test]
    fn position_plus_direction_moves_one_cell() {
        let pos = Position::new(3, 3);
        assert_eq!(pos + Direction::Up, Position::new(3, 2));
        assert_eq!(pos + Direction::Down, Position::new(3, 4));
        assert_eq!(pos + Direction::Left, Position::new(2, 3));
        assert_eq!(pos + Direction::Right, Position::new(4, 3));
    }

    #[test]
    fn direction_to_prefers_vertical_offset() {
        let pos = Position::new(2, 2);
        assert_eq!(pos.direction_to(Position::new(2, 1)), Some(Direction::Up));
        assert_eq!(pos.direction_to(Position::new(3, 3)), Some(Direction::Down));
        assert_eq!(pos.direction_to(Position::new(1, 2)), Some(Direction::Left));
        assert_eq!(pos.direction_to(pos), None);
    }

    #[test]
    fn is_next_to_only_orthogonal_neighbors() {
        let pos = Position::new(2, 2);
        assert!(pos.is_next_to(Position::new(2, 3)));
        assert!(!pos.is_next_to(Position::new(3, 3)));
        assert!(!pos.is_next_to(pos));
    }

    #[test]
    fn action_parses_wire_names() {
        assert_eq!(Action::parse("TURN_LEFT"), Some(Action::TurnLeft));
        assert_eq!(Action::parse("turn_left"), None);
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
    }
}
