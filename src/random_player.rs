use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::collaborators::{ActionReply, ActionRequest, Player};
use crate::engine::GameState;
use crate::error::CollaboratorError;
use crate::geometry::Action;

/// In-process player picking uniformly among the three actions. A cautious
/// player first plays each action on a private copy of the match and only
/// picks among those that keep it alive.
pub struct RandomPlayer {
    name: String,
    rng: StdRng,
    cautious: bool,
}

impl RandomPlayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rng: StdRng::from_os_rng(),
            cautious: false,
        }
    }

    pub fn with_seed(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            rng: StdRng::seed_from_u64(seed),
            cautious: false,
        }
    }

    pub fn cautious(mut self) -> Self {
        self.cautious = true;
        self
    }

    fn surviving_actions(&self, request: ActionRequest, state: &GameState) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| {
                let mut what_if = state.snapshot_for_ai();
                what_if
                    .apply_action(request.tick, request.player_id, Some(*action))
                    .is_ok()
                    && what_if
                        .players
                        .get(request.player_id)
                        .is_some_and(|player| !player.killed)
            })
            .collect()
    }

    pub fn choose_action(&mut self, request: ActionRequest, state: &GameState) -> Action {
        let candidates = if self.cautious {
            self.surviving_actions(request, state)
        } else {
            Vec::new()
        };
        let pool: &[Action] = if candidates.is_empty() {
            &Action::ALL
        } else {
            &candidates
        };
        pool.choose(&mut self.rng).copied().unwrap_or_default()
    }
}

impl Player for RandomPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_action<'a>(
        &'a mut self,
        request: ActionRequest,
        state: &'a GameState,
    ) -> BoxFuture<'a, Result<ActionReply, CollaboratorError>> {
        let action = self.choose_action(request, state);
        debug!(player = %self.name, tick = request.tick, %action, "random action");
        future::ready(Ok(ActionReply::new(request.tick, action))).boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        future::ready(()).boxed()
    }
}
