use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::constants::{
    SCORE_CAPTURED_BLITZIUM, SCORE_CONQUERED, SCORE_CONQUERED_PLANET, SCORE_KILL_PLAYER,
    SCORE_NEW_CONQUERED,
};
use crate::error::{EngineError, MapError};
use crate::game_config::{GameConfig, SpawnPoint};
use crate::game_map::{flood_fill, GameMap, TileKind};
use crate::geometry::{Action, Position};
use crate::player_state::{direction_to_center, History, PlayerState};
use crate::rng::Rng;

mod capture_system;
mod spawn_system;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuleOptions {
    pub relocate_black_hole: bool,
    pub relocate_blitzium: bool,
}

/// Full simulation state. Player ids are their index in `players`.
#[derive(Clone, Debug)]
pub struct GameState {
    pub game_map: GameMap,
    pub players: Vec<PlayerState>,
    pub tick: u64,
    spawns: Vec<SpawnPoint>,
    options: RuleOptions,
    rng: Rng,
}

impl GameState {
    pub fn new(config: GameConfig, seed: u32) -> Self {
        Self::with_options(config, seed, RuleOptions::default())
    }

    pub fn with_options(config: GameConfig, seed: u32, options: RuleOptions) -> Self {
        Self {
            game_map: config.game_map,
            players: Vec::new(),
            tick: 0,
            spawns: config.spawns,
            options,
            rng: Rng::new(seed),
        }
    }

    pub fn from_map(game_map: GameMap) -> Self {
        Self::new(
            GameConfig {
                game_map,
                spawns: Vec::new(),
            },
            0,
        )
    }

    pub fn options(&self) -> RuleOptions {
        self.options
    }

    /// How many players the scenario has room for, if it pins spawns.
    pub fn spawn_capacity(&self) -> Option<usize> {
        if self.spawns.is_empty() {
            None
        } else {
            Some(self.spawns.len())
        }
    }

    pub fn player(&self, id: usize) -> Result<&PlayerState, EngineError> {
        self.players.get(id).ok_or(EngineError::UnknownPlayer(id))
    }

    /// Independent copy handed to in-process participants so they can
    /// simulate ahead without touching the match. History is not carried.
    pub fn snapshot_for_ai(&self) -> GameState {
        let mut copy = self.clone();
        for player in &mut copy.players {
            player.history = History::disabled();
        }
        copy
    }

    pub fn apply_action(
        &mut self,
        tick: u64,
        id: usize,
        action: Option<Action>,
    ) -> Result<(), EngineError> {
        self.tick = tick;
        self.player(id)?;

        if self.players[id].killed {
            let message = format!(
                "Player '{}' was killed in the last turn, skip current action.",
                self.players[id].name_str()
            );
            info!(tick, player = %self.players[id].name_str(), "skipping action of killed player");
            self.players[id].add_history(tick, message);
            return self.respawn_player(id);
        }

        let action = action.unwrap_or_default();
        let in_bounds = self.move_player(id, action)?;
        let position = self.players[id].position;

        if !in_bounds || self.game_map.is_asteroid(position)? {
            info!(tick, player = %self.players[id].name_str(), %position, "stepped on an asteroid or outside the map");
            self.commit_suicide(id, "Committed suicide by going out of bound.")?;
            return Ok(());
        }

        if self.stepped_on_black_hole(position, id)? {
            return Ok(());
        }

        if let Some(victim) = self.will_kill_player(id) {
            self.kill_player_by(victim, id)?;
        }
        if self.players[id].killed {
            return Ok(());
        }

        self.check_if_captured_blitzium(position, id)?;

        if self.is_closed_trail(id)? {
            self.fill(id)?;
        }
        Ok(())
    }

    /// Turns and advances the player one cell. Returns `false` when the move
    /// leaves the map, in which case the trail is left untouched.
    fn move_player(&mut self, id: usize, action: Action) -> Result<bool, EngineError> {
        let tick = self.tick;
        let player = &mut self.players[id];
        let previous_position = player.position;
        let previous_direction = player.direction;

        player.direction = player.direction.change_direction(action);
        player.position = player.position + player.direction;
        let message = format!(
            "Moving {action} from {previous_position}-{previous_direction} to {}-{}.",
            player.position, player.direction
        );
        debug!(tick, player = %player.name_str(), position = %player.position, "moving");
        player.add_history(tick, message);

        let position = player.position;
        if self.game_map.is_out_of_bounds(position) {
            return Ok(false);
        }

        let last = self.players[id].trail.last().copied().unwrap_or(position);
        let on_owned = self.game_map.is_conquered_by(position, id)?;
        let from_owned = self.game_map.is_conquered_by(last, id)?;
        let trail = &mut self.players[id].trail;
        if !on_owned || !from_owned {
            trail.push(position);
        } else {
            *trail = vec![position];
        }
        Ok(true)
    }

    /// First player whose trail is lethal at the position of `walker`.
    pub fn will_kill_player(&self, walker: usize) -> Option<usize> {
        let position = self.players.get(walker)?.position;
        self.players
            .iter()
            .find(|player| player.lethal_trail_for(walker).contains(&position))
            .map(|player| player.id)
    }

    fn commit_suicide(&mut self, id: usize, reason: &str) -> Result<(), EngineError> {
        let tick = self.tick;
        self.players[id].stats.suicides += 1;
        self.players[id].add_history(tick, reason);
        self.kill_player(id)
    }

    /// Wipes the victim's territory and sends it back to spawn, pending
    /// respawn on its next turn.
    pub fn kill_player(&mut self, victim: usize) -> Result<(), EngineError> {
        self.player(victim)?;
        self.game_map.clear_tiles_owned_by(victim)?;
        self.reset_player(victim)?;
        let player = &mut self.players[victim];
        player.killed = true;
        player.stats.tiles_owned = 0;
        Ok(())
    }

    pub fn kill_player_by(&mut self, victim: usize, killer: usize) -> Result<(), EngineError> {
        self.player(victim)?;
        self.player(killer)?;
        let tick = self.tick;

        if victim != killer {
            let victim_name = self.players[victim].name.clone();
            let killer_name = self.players[killer].name.clone();
            info!(tick, killer = %self.players[killer].name_str(), victim = %self.players[victim].name_str(), "player killed");

            let attacker = &mut self.players[killer];
            attacker.score += SCORE_KILL_PLAYER;
            attacker.stats.record_kill(&victim_name);
            attacker.add_history(tick, format!("Killed player '{victim_name}'."));

            let target = &mut self.players[victim];
            target.stats.record_death(&killer_name);
            target.add_history(tick, format!("Killed by player '{killer_name}'."));
        } else {
            info!(tick, player = %self.players[killer].name_str(), "player walked on its own trail");
            let player = &mut self.players[killer];
            player.stats.suicides += 1;
            player.add_history(tick, "Committed suicide by walking on player trail.");
        }

        self.kill_player(victim)
    }

    pub fn stepped_on_black_hole(
        &mut self,
        position: Position,
        id: usize,
    ) -> Result<bool, EngineError> {
        if self.game_map.is_black_hole(position)? {
            info!(tick = self.tick, player = %self.players[id].name_str(), %position, "stepped on a black hole");
            self.commit_suicide(id, "Committed suicide by stepping on a black hole.")?;
            if self.options.relocate_black_hole {
                self.relocate_item(position)?;
            }
        }
        Ok(self.players[id].killed)
    }

    pub fn check_if_captured_blitzium(
        &mut self,
        position: Position,
        id: usize,
    ) -> Result<(), EngineError> {
        if !self.game_map.is_blitzium(position)? {
            return Ok(());
        }
        let tick = self.tick;
        info!(tick, player = %self.players[id].name_str(), %position, "blitzium collected");
        let player = &mut self.players[id];
        player.stats.blitziums += 1;
        player.score += SCORE_CAPTURED_BLITZIUM;
        player.add_history(tick, "Found a blitzium.");

        if self.options.relocate_blitzium {
            self.relocate_item(position)?;
        } else {
            self.game_map.clear_tile(position)?;
        }
        Ok(())
    }

    /// Re-derives the owned-tile counters and adds the per-tick territory
    /// income. Ownership can move outside of `apply_action` bookkeeping, so
    /// the grid is the source of truth.
    pub fn update_players_scores(&mut self) {
        for player in &mut self.players {
            player.stats.tiles_owned = 0;
            player.stats.planets = 0;
        }

        for (_, tile) in self.game_map.iter() {
            let Some(owner) = tile.owner else {
                continue;
            };
            let Some(player) = self.players.get_mut(owner) else {
                continue;
            };
            if tile.kind == TileKind::Planet {
                player.score += SCORE_CONQUERED_PLANET;
                player.stats.planets += 1;
            } else {
                player.score += SCORE_CONQUERED;
            }
            player.stats.tiles_owned += 1;
        }
    }

    /// Player ids ordered by score, best first. Ties keep registration order.
    pub fn ranking(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = (0..self.players.len()).collect();
        ids.sort_by(|a, b| {
            self.players[*b]
                .score
                .partial_cmp(&self.players[*a].score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ids
    }
}
