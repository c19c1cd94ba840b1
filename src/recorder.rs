use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::collaborators::{Recorder, TickInfo};
use crate::engine::GameState;
use crate::error::RecorderError;
use crate::types::{tick_payload, ServerMessage, TickPayload};

#[derive(Serialize)]
struct Replay<'a> {
    ticks: Vec<ServerMessage>,
    /// `name_str` of every player, best first.
    players: Vec<String>,
    winner: Option<&'a str>,
}

/// Keeps every tick in memory and writes the whole match as one JSON file
/// when the game ends.
pub struct JsonRecorder {
    path: PathBuf,
    with_history: bool,
    ticks: Vec<TickPayload>,
}

impl JsonRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            with_history: false,
            ticks: Vec::new(),
        }
    }

    pub fn with_history(mut self, with_history: bool) -> Self {
        self.with_history = with_history;
        self
    }

    fn io_error(&self, source: std::io::Error) -> RecorderError {
        RecorderError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl Recorder for JsonRecorder {
    fn record_tick(&mut self, info: TickInfo, state: &GameState) -> Result<(), RecorderError> {
        self.ticks.push(tick_payload(
            state,
            info.tick,
            info.ticks_left,
            None,
            self.with_history,
        ));
        Ok(())
    }

    fn close(&mut self, state: &GameState, ranking: &[usize]) -> Result<(), RecorderError> {
        let ranked: Vec<_> = ranking
            .iter()
            .filter_map(|id| state.players.get(*id))
            .collect();
        let replay = Replay {
            ticks: self.ticks.drain(..).map(ServerMessage::Tick).collect(),
            players: ranked.iter().map(|player| player.name_str()).collect(),
            winner: ranked.first().map(|player| player.name.as_str()),
        };
        let text = serde_json::to_string_pretty(&replay)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;
            }
        }
        fs::write(&self.path, text).map_err(|error| self.io_error(error))?;
        info!(path = %self.path.display(), ticks = replay.ticks.len(), "replay written");
        Ok(())
    }
}
