use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::error::MapError;
use crate::geometry::Position;
use crate::rng::Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Empty,
    Asteroid,
    Planet,
    Blitzium,
    BlackHole,
}

impl TileKind {
    pub fn symbol(self) -> char {
        match self {
            TileKind::Empty => ' ',
            TileKind::Asteroid => 'W',
            TileKind::Planet => '%',
            TileKind::Blitzium => '$',
            TileKind::BlackHole => '!',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            ' ' => Some(TileKind::Empty),
            'W' => Some(TileKind::Asteroid),
            '%' => Some(TileKind::Planet),
            '$' => Some(TileKind::Blitzium),
            '!' => Some(TileKind::BlackHole),
            _ => None,
        }
    }

    /// Hazards and items never carry an owner.
    pub fn can_be_owned(self) -> bool {
        matches!(self, TileKind::Empty | TileKind::Planet)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tile {
    pub kind: TileKind,
    pub owner: Option<usize>,
}

impl Tile {
    pub const EMPTY: Tile = Tile {
        kind: TileKind::Empty,
        owner: None,
    };

    pub const ASTEROID: Tile = Tile {
        kind: TileKind::Asteroid,
        owner: None,
    };
}

/// Square tile grid with an asteroid border.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameMap {
    size: usize,
    tiles: Vec<Tile>,
    empty_tiles: usize,
}

impl GameMap {
    pub fn new(size: usize) -> Self {
        let mut tiles = vec![Tile::EMPTY; size * size];
        for y in 0..size {
            for x in 0..size {
                if x == 0 || y == 0 || x == size - 1 || y == size - 1 {
                    tiles[y * size + x] = Tile::ASTEROID;
                }
            }
        }
        Self {
            size,
            tiles,
            empty_tiles: size.saturating_sub(2).pow(2),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tiles that are plain empty space without an owner.
    pub fn empty_tile_count(&self) -> usize {
        self.empty_tiles
    }

    pub fn is_out_of_bounds(&self, position: Position) -> bool {
        position.x < 0
            || position.y < 0
            || position.x as usize >= self.size
            || position.y as usize >= self.size
    }

    fn index_of(&self, position: Position) -> Result<usize, MapError> {
        if self.is_out_of_bounds(position) {
            return Err(MapError::OutOfBounds {
                position,
                size: self.size,
            });
        }
        Ok(position.y as usize * self.size + position.x as usize)
    }

    pub fn get_tile(&self, position: Position) -> Result<Tile, MapError> {
        let idx = self.index_of(position)?;
        Ok(self.tiles[idx])
    }

    pub fn set_tile(
        &mut self,
        position: Position,
        kind: TileKind,
        owner: Option<usize>,
    ) -> Result<(), MapError> {
        let idx = self.index_of(position)?;
        let current = self.tiles[idx];

        if owner.is_some() && !kind.can_be_owned() {
            return Err(MapError::InvalidTileState(format!(
                "{kind:?} at {position} cannot have an owner"
            )));
        }
        if current.kind == TileKind::Asteroid && kind != TileKind::Asteroid {
            return Err(MapError::InvalidTileState(format!(
                "cannot overwrite asteroid at {position}"
            )));
        }
        if current.kind == TileKind::Planet && kind != TileKind::Planet {
            return Err(MapError::InvalidTileState(format!(
                "cannot overwrite planet at {position}"
            )));
        }

        let next = Tile { kind, owner };
        if current == Tile::EMPTY && next != Tile::EMPTY {
            self.empty_tiles -= 1;
        } else if current != Tile::EMPTY && next == Tile::EMPTY {
            self.empty_tiles += 1;
        }
        self.tiles[idx] = next;
        Ok(())
    }

    pub fn conquer_tile(&mut self, position: Position, player_id: usize) -> Result<(), MapError> {
        let current = self.get_tile(position)?;
        self.set_tile(position, current.kind, Some(player_id))
    }

    /// Drops ownership; single-use items revert to empty space.
    pub fn clear_tile(&mut self, position: Position) -> Result<(), MapError> {
        let current = self.get_tile(position)?;
        let kind = match current.kind {
            TileKind::Blitzium | TileKind::BlackHole => TileKind::Empty,
            other => other,
        };
        self.set_tile(position, kind, None)
    }

    pub fn is_empty(&self, position: Position) -> Result<bool, MapError> {
        Ok(self.get_tile(position)? == Tile::EMPTY)
    }

    pub fn is_conquered_by(&self, position: Position, player_id: usize) -> Result<bool, MapError> {
        let tile = self.get_tile(position)?;
        Ok(tile.kind.can_be_owned() && tile.owner == Some(player_id))
    }

    pub fn is_asteroid(&self, position: Position) -> Result<bool, MapError> {
        Ok(self.get_tile(position)?.kind == TileKind::Asteroid)
    }

    pub fn is_black_hole(&self, position: Position) -> Result<bool, MapError> {
        Ok(self.get_tile(position)?.kind == TileKind::BlackHole)
    }

    pub fn is_blitzium(&self, position: Position) -> Result<bool, MapError> {
        Ok(self.get_tile(position)?.kind == TileKind::Blitzium)
    }

    pub fn is_planet(&self, position: Position) -> Result<bool, MapError> {
        Ok(self.get_tile(position)?.kind == TileKind::Planet)
    }

    pub fn owner(&self, position: Position) -> Result<Option<usize>, MapError> {
        Ok(self.get_tile(position)?.owner)
    }

    pub fn clear_tiles_owned_by(&mut self, player_id: usize) -> Result<(), MapError> {
        let owned: Vec<Position> = self
            .iter()
            .filter(|(_, tile)| tile.owner == Some(player_id))
            .map(|(pos, _)| pos)
            .collect();
        for pos in owned {
            self.clear_tile(pos)?;
        }
        Ok(())
    }

    pub fn count_tiles_owned_by(&self, player_id: usize) -> usize {
        self.tiles
            .iter()
            .filter(|tile| tile.owner == Some(player_id))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Position, Tile)> + '_ {
        let size = self.size;
        self.tiles.iter().enumerate().map(move |(idx, tile)| {
            (
                Position::new((idx % size) as i32, (idx / size) as i32),
                *tile,
            )
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Tile]> + '_ {
        self.tiles.chunks(self.size.max(1))
    }

    /// Shortest 4-neighbour path from `start` to `goal` avoiding asteroids,
    /// both ends included. With `owner_filter` every step must stay on
    /// tiles owned by that player, and both ends must already be owned.
    pub fn find_path(
        &self,
        start: Position,
        goal: Position,
        owner_filter: Option<usize>,
    ) -> Result<Option<Vec<Position>>, MapError> {
        let start_idx = self.index_of(start)?;
        let goal_idx = self.index_of(goal)?;
        if let Some(owner) = owner_filter {
            if self.tiles[start_idx].owner != Some(owner)
                || self.tiles[goal_idx].owner != Some(owner)
            {
                return Err(MapError::InvalidTileState(format!(
                    "path ends {start} and {goal} must be owned by player {owner}"
                )));
            }
        }

        let mut came_from: Vec<Option<usize>> = vec![None; self.tiles.len()];
        let mut visited = vec![false; self.tiles.len()];
        let mut queue = VecDeque::new();
        visited[start_idx] = true;
        queue.push_back(start);

        let mut found = false;
        while let Some(current) = queue.pop_front() {
            if current == goal {
                found = true;
                break;
            }
            let current_idx = current.y as usize * self.size + current.x as usize;
            for next in current.neighbors() {
                let Ok(next_idx) = self.index_of(next) else {
                    continue;
                };
                if visited[next_idx] {
                    continue;
                }
                let tile = self.tiles[next_idx];
                if tile.kind == TileKind::Asteroid {
                    continue;
                }
                if owner_filter.is_some() && tile.owner != owner_filter {
                    continue;
                }
                visited[next_idx] = true;
                came_from[next_idx] = Some(current_idx);
                queue.push_back(next);
            }
        }

        if !found {
            return Ok(None);
        }

        let mut path = vec![goal];
        let mut cursor = goal_idx;
        while let Some(prev) = came_from[cursor] {
            path.push(Position::new(
                (prev % self.size) as i32,
                (prev / self.size) as i32,
            ));
            cursor = prev;
        }
        path.reverse();
        Ok(Some(path))
    }

    /// Interior tiles that are empty and unowned, scanned column by column.
    pub fn empty_tiles(&self) -> Vec<Position> {
        let mut empty = Vec::with_capacity(self.empty_tiles);
        for x in 1..self.size.saturating_sub(1) {
            for y in 1..self.size.saturating_sub(1) {
                if self.tiles[y * self.size + x] == Tile::EMPTY {
                    empty.push(Position::new(x as i32, y as i32));
                }
            }
        }
        empty
    }

    pub fn random_empty_position(&self, rng: &mut Rng) -> Option<Position> {
        rng.pick(&self.empty_tiles()).copied()
    }
}

impl fmt::Display for GameMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (y, row) in self.rows().enumerate() {
            if y > 0 {
                writeln!(f)?;
            }
            for tile in row {
                match tile.owner {
                    Some(owner) if tile.kind != TileKind::Planet => write!(f, "{owner}")?,
                    _ => write!(f, "{}", tile.kind.symbol())?,
                }
            }
        }
        Ok(())
    }
}

/// Breadth-first replacement of every `target` cell reachable from the
/// top-left corner.
pub fn flood_fill<T: Copy + PartialEq>(grid: &mut [Vec<T>], target: T, replacement: T) {
    if target == replacement || grid.is_empty() || grid[0].is_empty() {
        return;
    }
    let height = grid.len() as i32;
    let width = grid[0].len() as i32;

    let mut queue = VecDeque::new();
    if grid[0][0] == target {
        grid[0][0] = replacement;
    }
    queue.push_back(Position::new(0, 0));
    while let Some(current) = queue.pop_front() {
        for next in current.neighbors() {
            if next.x < 0 || next.y < 0 || next.x >= width || next.y >= height {
                continue;
            }
            let cell = &mut grid[next.y as usize][next.x as usize];
            if *cell == target {
                *cell = replacement;
                queue.push_back(next);
            }
        }
    }
}
