use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constants::MAX_TICKS_IN_HISTORY;
use crate::geometry::{Direction, Position};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    #[serde(rename = "number_of_kills")]
    pub kills: u32,
    #[serde(rename = "number_of_deaths")]
    pub deaths: u32,
    #[serde(rename = "number_of_suicides")]
    pub suicides: u32,
    #[serde(rename = "number_of_planets_conquered")]
    pub planets: u32,
    #[serde(rename = "number_of_blitziums_collected")]
    pub blitziums: u32,
    #[serde(rename = "number_of_conquered_tiles")]
    pub tiles_owned: u32,
    #[serde(rename = "nemesis_player", skip_serializing_if = "Option::is_none")]
    pub nemesis: Option<String>,
    pub players_killed: BTreeMap<String, u32>,
    pub killed_by_players: BTreeMap<String, u32>,
}

impl PlayerStats {
    pub fn record_kill(&mut self, victim: &str) {
        self.kills += 1;
        *self.players_killed.entry(victim.to_string()).or_insert(0) += 1;
    }

    /// Counts a death and re-derives the nemesis. On a tie the current
    /// nemesis keeps the title.
    pub fn record_death(&mut self, killer: &str) {
        self.deaths += 1;
        let count = {
            let entry = self.killed_by_players.entry(killer.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let current_best = self
            .nemesis
            .as_ref()
            .and_then(|name| self.killed_by_players.get(name))
            .copied()
            .unwrap_or(0);
        if self.nemesis.is_none() || count > current_best {
            self.nemesis = Some(killer.to_string());
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryItem {
    pub timestamp: DateTime<Utc>,
    pub tick: u64,
    pub message: String,
}

/// Newest-first event log that only keeps the last few ticks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct History {
    items: VecDeque<HistoryItem>,
    max_ticks: u64,
}

impl History {
    pub fn new(max_ticks: u64) -> Self {
        Self {
            items: VecDeque::new(),
            max_ticks,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn push(&mut self, tick: u64, message: impl Into<String>) {
        if self.max_ticks == 0 {
            return;
        }
        self.items.push_front(HistoryItem {
            timestamp: Utc::now(),
            tick,
            message: message.into(),
        });
        let cutoff = tick.saturating_sub(self.max_ticks);
        while self.items.back().is_some_and(|item| item.tick < cutoff) {
            self.items.pop_back();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_TICKS_IN_HISTORY)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    pub id: usize,
    pub name: String,
    pub active: bool,
    pub killed: bool,
    pub score: f64,
    pub stats: PlayerStats,
    pub history: History,
    pub spawn_position: Position,
    pub spawn_direction: Direction,
    pub position: Position,
    pub direction: Direction,
    /// Unclaimed path since the last capture or respawn; never empty.
    pub trail: Vec<Position>,
}

impl PlayerState {
    pub fn new(
        id: usize,
        name: impl Into<String>,
        spawn_position: Position,
        spawn_direction: Direction,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            killed: false,
            score: 0.0,
            stats: PlayerStats {
                tiles_owned: 1,
                ..PlayerStats::default()
            },
            history: History::default(),
            spawn_position,
            spawn_direction,
            position: spawn_position,
            direction: spawn_direction,
            trail: vec![spawn_position],
        }
    }

    pub fn name_str(&self) -> String {
        format!("{}-{}", self.name, self.id)
    }

    /// Puts the player back on its spawn; the caller reclaims the tile.
    pub fn reset_position(&mut self) {
        self.position = self.spawn_position;
        self.direction = self.spawn_direction;
        self.trail = vec![self.spawn_position];
        self.stats.tiles_owned = 1;
    }

    pub fn add_history(&mut self, tick: u64, message: impl Into<String>) {
        self.history.push(tick, message);
    }

    /// Trail cells that are lethal for `walker`: the whole trail for other
    /// players, only the interior of its own trail.
    pub fn lethal_trail_for(&self, walker: usize) -> &[Position] {
        if walker != self.id {
            return &self.trail;
        }
        if self.trail.len() < 2 {
            return &[];
        }
        &self.trail[1..self.trail.len() - 1]
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trail: Vec<String> = self.trail.iter().map(|pos| pos.to_string()).collect();
        write!(
            f,
            "['{}': active: {}, killed: {}, score: {:.2}, position: {}, direction: {}, trail: [{}]]",
            self.name_str(),
            self.active,
            self.killed,
            self.score,
            self.position,
            self.direction,
            trail.join(", ")
        )
    }
}

/// Heading that points a fresh spawn toward the middle of the map.
pub fn direction_to_center(position: Position, map_size: usize) -> Direction {
    let center = map_size as f64 / 2.0;
    let dx = position.x as f64 - center;
    let dy = position.y as f64 - center;

    if dx.abs() <= dy.abs() {
        if dx < 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if dy < 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}
