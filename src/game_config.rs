use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::game_map::{GameMap, TileKind};
use crate::geometry::{Direction, Position};

const DIRECTION_MARKER: char = 'D';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnPoint {
    pub position: Position,
    /// `None` lets the engine face the player toward the map center.
    pub direction: Option<Direction>,
}

/// A scenario: starting terrain plus fixed spawn points handed out in
/// registration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameConfig {
    pub game_map: GameMap,
    pub spawns: Vec<SpawnPoint>,
}

impl GameConfig {
    pub fn blank(map_size: usize) -> Self {
        Self {
            game_map: GameMap::new(map_size),
            spawns: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        text.parse()
    }

    pub fn spawn_positions(&self) -> Vec<Position> {
        self.spawns.iter().map(|spawn| spawn.position).collect()
    }
}

impl FromStr for GameConfig {
    type Err = ConfigError;

    /// Each line is one map row. Terrain symbols are the tile symbols, a
    /// digit marks the spawn of the n-th player and `D` next to a digit
    /// sets the direction that player faces.
    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let lines: Vec<&str> = data
            .trim()
            .lines()
            .map(|line| line.trim_matches(|c: char| c == '\r' || c == '\n' || c == '\t' || c == ' '))
            .collect();
        if lines.is_empty() || lines[0].is_empty() {
            return Err(ConfigError::Empty);
        }

        let map_size = lines.len();
        let mut game_map = GameMap::new(map_size);
        let mut spawns: Vec<(u32, Position)> = Vec::new();
        let mut markers: Vec<Position> = Vec::new();

        for (y, line) in lines.iter().enumerate() {
            let len = line.chars().count();
            if len != map_size {
                return Err(ConfigError::NotSquare {
                    line: y,
                    len,
                    expected: map_size,
                });
            }
            for (x, symbol) in line.chars().enumerate() {
                let position = Position::new(x as i32, y as i32);
                if let Some(kind) = TileKind::from_symbol(symbol) {
                    game_map.set_tile(position, kind, None)?;
                } else if symbol == DIRECTION_MARKER {
                    game_map.set_tile(position, TileKind::Empty, None)?;
                    markers.push(position);
                } else if let Some(order) = symbol.to_digit(10) {
                    spawns.push((order, position));
                } else {
                    return Err(ConfigError::InvalidSymbol { symbol, position });
                }
            }
        }

        spawns.sort();
        let spawns = spawns
            .into_iter()
            .map(|(_, position)| SpawnPoint {
                position,
                direction: markers
                    .iter()
                    .find(|marker| position.is_next_to(**marker))
                    .and_then(|marker| position.direction_to(*marker)),
            })
            .collect();

        Ok(Self { game_map, spawns })
    }
}
