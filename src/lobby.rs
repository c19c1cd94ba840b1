use std::time::Duration;

use tracing::info;

use crate::constants::{DEFAULT_MIN_PLAYERS, DEFAULT_START_DELAY};
use crate::error::EngineError;
use crate::game::{Game, Joiner, MatchResult};

#[derive(Clone, Debug)]
pub struct LobbyOptions {
    pub min_players: usize,
    /// How long to wait for `min_players` before starting with whoever
    /// joined.
    pub start_delay: Duration,
}

impl Default for LobbyOptions {
    fn default() -> Self {
        Self {
            min_players: DEFAULT_MIN_PLAYERS,
            start_delay: DEFAULT_START_DELAY,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum LobbyOutcome {
    Played(MatchResult),
    NoPlayers,
}

/// Holds a game until enough players joined or the start delay elapsed.
pub struct Lobby {
    game: Game,
    options: LobbyOptions,
}

impl Lobby {
    pub fn new(game: Game, options: LobbyOptions) -> Self {
        Self { game, options }
    }

    pub fn joiner(&self) -> Joiner {
        self.game.joiner()
    }

    pub async fn run(mut self) -> Result<LobbyOutcome, EngineError> {
        let min_players = self.options.min_players.clamp(1, self.game.max_players().max(1));
        let deadline = tokio::time::sleep(self.options.start_delay);
        tokio::pin!(deadline);

        while self.game.player_count() < min_players {
            tokio::select! {
                join = self.game.next_join() => match join {
                    Some(join) => self.game.admit(join),
                    None => break,
                },
                _ = &mut deadline => {
                    info!(
                        players = self.game.player_count(),
                        min_players,
                        "start delay elapsed"
                    );
                    break;
                }
            }
        }

        if self.game.player_count() == 0 {
            info!("no player registered in given start delay");
            self.game.finish_without_players();
            return Ok(LobbyOutcome::NoPlayers);
        }
        if self.game.player_count() < min_players {
            info!("not all players registered, starting game anyway");
        } else {
            info!("enough players, starting game");
        }

        let result = self.game.run().await?;
        Ok(LobbyOutcome::Played(result))
    }
}
