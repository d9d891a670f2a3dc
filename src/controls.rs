//! Mapping recognized gestures to maze movement directions.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::classifier::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Which gesture moves in which direction.
///
/// Gestures without an entry don't move at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectionMap(BTreeMap<Label, Direction>);

impl Default for DirectionMap {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("one".to_string(), Direction::Up),
            ("fist".to_string(), Direction::Down),
            ("two".to_string(), Direction::Left),
            ("three".to_string(), Direction::Right),
        ]))
    }
}

impl DirectionMap {
    pub fn direction(&self, gesture: &str) -> Option<Direction> {
        self.0.get(gesture).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mapping() {
        let map = DirectionMap::default();
        assert_eq!(map.direction("one"), Some(Direction::Up));
        assert_eq!(map.direction("fist"), Some(Direction::Down));
        assert_eq!(map.direction("two"), Some(Direction::Left));
        assert_eq!(map.direction("three"), Some(Direction::Right));
        assert_eq!(map.direction("palm"), None);
    }

    #[test]
    fn serialized_as_table() {
        let map: DirectionMap = toml::from_str("peace = \"left\"\nok = \"up\"").unwrap();
        assert_eq!(map.direction("peace"), Some(Direction::Left));
        assert_eq!(map.direction("one"), None);
        assert_eq!(Direction::Right.to_string(), "right");
    }
}
