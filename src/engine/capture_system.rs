use super::*;

impl GameState {
    /// The trail left owned land and came back to it.
    pub fn is_closed_trail(&self, id: usize) -> Result<bool, EngineError> {
        let trail = &self.player(id)?.trail;
        let (Some(first), Some(last)) = (trail.first(), trail.last()) else {
            return Ok(false);
        };
        Ok(trail.len() >= 3
            && self.game_map.is_conquered_by(*first, id)?
            && self.game_map.is_conquered_by(*last, id)?)
    }

    /// Claims the trail and everything it encloses together with the
    /// shortest owned path between its two ends. Returns the newly
    /// captured tiles; empty when a black hole inside the loop killed the
    /// capturing player.
    pub fn fill(&mut self, id: usize) -> Result<BTreeSet<Position>, EngineError> {
        let trail = self.player(id)?.trail.clone();
        let (first, last) = match (trail.first(), trail.last()) {
            (Some(first), Some(last)) if trail.len() >= 3 => (*first, *last),
            _ => {
                return Err(EngineError::InvalidCapture(format!(
                    "trail of length {} cannot be closed",
                    trail.len()
                )))
            }
        };
        if !self.game_map.is_conquered_by(first, id)? || !self.game_map.is_conquered_by(last, id)? {
            return Err(EngineError::InvalidCapture(format!(
                "trail ends {first} and {last} are not both owned by player {id}"
            )));
        }

        let owned_before: Vec<usize> = self
            .players
            .iter()
            .map(|player| self.game_map.count_tiles_owned_by(player.id))
            .collect();

        let mut new_conquers: BTreeSet<Position> = trail[1..trail.len() - 1].iter().copied().collect();

        if let Some(closing_path) = self.game_map.find_path(first, last, Some(id))? {
            let enclosed = self.enclosed_tiles(&trail, &closing_path, id)?;

            for position in &enclosed {
                if self.game_map.is_black_hole(*position)? {
                    self.stepped_on_black_hole(*position, id)?;
                    return Ok(BTreeSet::new());
                }
            }

            for position in enclosed {
                self.check_if_captured_blitzium(position, id)?;
                self.game_map.conquer_tile(position, id)?;
                new_conquers.insert(position);
            }
        }

        for position in &trail {
            self.game_map.conquer_tile(*position, id)?;
        }
        let current = self.players[id].position;
        self.players[id].trail = vec![current];

        for other in 0..self.players.len() {
            if other == id {
                continue;
            }
            let crossed = self.players[other]
                .trail
                .iter()
                .any(|pos| new_conquers.contains(pos));
            let wiped_out =
                owned_before[other] > 0 && self.game_map.count_tiles_owned_by(other) == 0;
            if crossed || wiped_out {
                self.kill_player_by(other, id)?;
            }
        }

        let tick = self.tick;
        let captured = new_conquers.len();
        let player = &mut self.players[id];
        player.stats.tiles_owned += captured as u32;
        player.score += SCORE_NEW_CONQUERED * captured as f64;
        player.add_history(tick, format!("Conquered {captured} new tiles."));
        info!(tick, player = %player.name_str(), captured, "territory captured");

        Ok(new_conquers)
    }

    /// Tiles cut off from the top-left corner by the loop, minus those the
    /// player already owns and asteroids.
    fn enclosed_tiles(
        &self,
        trail: &[Position],
        closing_path: &[Position],
        id: usize,
    ) -> Result<Vec<Position>, EngineError> {
        let size = self.game_map.size();
        let mut scratch = vec![vec![1u8; size]; size];
        for position in trail.iter().chain(closing_path) {
            scratch[position.y as usize][position.x as usize] = 0;
        }
        flood_fill(&mut scratch, 1, 0);

        let mut enclosed = Vec::new();
        for (y, row) in scratch.iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                if *cell != 1 {
                    continue;
                }
                let position = Position::new(x as i32, y as i32);
                if self.game_map.is_conquered_by(position, id)? || self.game_map.is_asteroid(position)? {
                    continue;
                }
                enclosed.push(position);
            }
        }
        Ok(enclosed)
    }
}
