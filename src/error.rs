use thiserror::Error;

use crate::geometry::Position;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("position {position} is outside of a {size}x{size} map")]
    OutOfBounds { position: Position, size: usize },

    #[error("invalid tile state: {0}")]
    InvalidTileState(String),

    #[error("no empty tile left on the map")]
    NoEmptyTile,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("map is empty")]
    Empty,

    #[error("map is not square (line {line} has length {len}, expected {expected})")]
    NotSquare {
        line: usize,
        len: usize,
        expected: usize,
    },

    #[error("invalid tile '{symbol}' at {position}")]
    InvalidSymbol { symbol: char, position: Position },

    #[error(transparent)]
    Map(#[from] MapError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error("invalid capture: {0}")]
    InvalidCapture(String),

    #[error("unknown player id {0}")]
    UnknownPlayer(usize),

    #[error("no spawn point left for player {0}")]
    NoSpawnPoint(usize),
}

/// Failures of a remote or in-process participant. The coordinator always
/// recovers from these locally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("timed out")]
    Timeout,

    #[error("action for out of sync game tick ({received} != {expected})")]
    Desync { expected: u64, received: u64 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("disconnected")]
    Disconnected,

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize replay: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("maximum number of players reached ({0})")]
    GameFull(usize),

    #[error("map has no room left for a new player")]
    NoSpawn,

    #[error("game is finished")]
    Finished,
}
