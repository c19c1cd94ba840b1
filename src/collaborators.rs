//! Capability traits for everything the coordinator talks to: players that
//! choose actions, viewers that watch ticks and recorders that persist them.

use futures_util::future::BoxFuture;

use crate::engine::GameState;
use crate::error::{CollaboratorError, RecorderError};
use crate::geometry::Action;
use crate::player_state::PlayerState;

/// Where the match stands when a collaborator is contacted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickInfo {
    pub tick: u64,
    pub ticks_left: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionRequest {
    pub tick: u64,
    pub ticks_left: u64,
    pub player_id: usize,
}

/// An action together with the tick it was chosen for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionReply {
    pub tick: u64,
    pub action: Action,
}

impl ActionReply {
    pub fn new(tick: u64, action: Action) -> Self {
        Self { tick, action }
    }
}

pub trait Player: Send {
    fn name(&self) -> &str;

    /// Asks for the next action. May be dropped mid-flight when the
    /// coordinator times out, and is called again on the next attempt.
    fn request_action<'a>(
        &'a mut self,
        request: ActionRequest,
        state: &'a GameState,
    ) -> BoxFuture<'a, Result<ActionReply, CollaboratorError>>;

    fn close(&mut self) -> BoxFuture<'_, ()>;
}

pub trait Viewer: Send {
    fn id(&self) -> &str;

    fn send_tick<'a>(
        &'a mut self,
        info: TickInfo,
        state: &'a GameState,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;

    fn send_winner<'a>(
        &'a mut self,
        tick: u64,
        winner: &'a PlayerState,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

pub trait Recorder: Send {
    fn record_tick(&mut self, info: TickInfo, state: &GameState) -> Result<(), RecorderError>;

    /// `ranking` lists player ids best first.
    fn close(&mut self, state: &GameState, ranking: &[usize]) -> Result<(), RecorderError>;
}
