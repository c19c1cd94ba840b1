use super::*;

impl GameState {
    /// Registers a player on the next scenario spawn point, or on a random
    /// free tile when the scenario pins none. Returns the new player id.
    pub fn add_player(&mut self, name: impl Into<String>) -> Result<usize, EngineError> {
        let id = self.players.len();
        let (position, direction) = if self.spawns.is_empty() {
            let position = self
                .pick_free_position()
                .ok_or(MapError::NoEmptyTile)?;
            (position, None)
        } else {
            let spawn = self.spawns.get(id).ok_or(EngineError::NoSpawnPoint(id))?;
            (spawn.position, spawn.direction)
        };
        let direction =
            direction.unwrap_or_else(|| direction_to_center(position, self.game_map.size()));

        let player = PlayerState::new(id, name, position, direction);
        info!(player = %player.name_str(), %position, %direction, "player added");
        self.players.push(player);
        self.game_map.conquer_tile(position, id)?;
        Ok(id)
    }

    /// Brings a killed player back on its spawn. Whoever has a trail across
    /// the spawn tile dies for it.
    pub fn respawn_player(&mut self, id: usize) -> Result<(), EngineError> {
        self.player(id)?;
        let tick = self.tick;
        self.players[id].killed = false;
        self.reset_player(id)?;
        self.players[id].add_history(tick, "Respawned.");
        debug!(tick, player = %self.players[id].name_str(), "respawned");

        if let Some(victim) = self.will_kill_player(id) {
            self.kill_player_by(victim, id)?;
        }
        Ok(())
    }

    pub(super) fn reset_player(&mut self, id: usize) -> Result<(), EngineError> {
        let player = &mut self.players[id];
        player.reset_position();
        let spawn = player.spawn_position;
        self.game_map.conquer_tile(spawn, id)?;
        Ok(())
    }

    /// Moves a collectible or hazard to a random free tile. Returns where it
    /// landed, or `None` when the map had no room and the item vanished.
    pub fn relocate_item(&mut self, position: Position) -> Result<Option<Position>, EngineError> {
        let kind = self.game_map.get_tile(position)?.kind;
        if kind != TileKind::Blitzium && kind != TileKind::BlackHole {
            return Err(MapError::InvalidTileState(format!(
                "cannot relocate {kind:?} at {position}"
            ))
            .into());
        }

        let target = self.pick_free_position();
        self.game_map.clear_tile(position)?;
        if let Some(target) = target {
            self.game_map.set_tile(target, kind, None)?;
            debug!(tick = self.tick, from = %position, to = %target, ?kind, "item relocated");
        }
        Ok(target)
    }

    /// Empty tile that no trail crosses and no player respawns on. Spawn
    /// tiles are reconquered on every reset, so an item there would block it.
    fn pick_free_position(&mut self) -> Option<Position> {
        let taken: BTreeSet<Position> = self
            .players
            .iter()
            .flat_map(|player| player.trail.iter().copied())
            .chain(self.players.iter().map(|player| player.spawn_position))
            .chain(self.spawns.iter().map(|spawn| spawn.position))
            .collect();
        let candidates: Vec<Position> = self
            .game_map
            .empty_tiles()
            .into_iter()
            .filter(|position| !taken.contains(position))
            .collect();
        self.rng.pick(&candidates).copied()
    }
}
