use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::collaborators::{ActionRequest, Player, Recorder, TickInfo, Viewer};
use crate::constants::{
    get_match_ticks, DEFAULT_FIRST_TICK_TIMEOUT, DEFAULT_MAX_PLAYERS, DEFAULT_MAX_TICKS,
    DEFAULT_MOVE_TIMEOUT, MAX_ACTION_ATTEMPTS,
};
use crate::engine::GameState;
use crate::error::{CollaboratorError, EngineError, RegistrationError};
use crate::geometry::Action;

#[derive(Clone, Debug)]
pub struct GameOptions {
    pub max_ticks: u64,
    pub move_timeout: Duration,
    /// Budget for the very first request, which absorbs client warm-up.
    pub first_tick_timeout: Duration,
    pub game_delay: Duration,
    pub max_players: usize,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            max_ticks: DEFAULT_MAX_TICKS,
            move_timeout: DEFAULT_MOVE_TIMEOUT,
            first_tick_timeout: DEFAULT_FIRST_TICK_TIMEOUT,
            game_delay: Duration::ZERO,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GamePhase {
    NotStarted,
    Running,
    Finished,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Standing {
    pub id: usize,
    pub name: String,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchResult {
    pub ticks: u64,
    pub ranking: Vec<Standing>,
    pub winner: Option<Standing>,
}

pub enum Join {
    Player {
        player: Box<dyn Player>,
        reply: oneshot::Sender<Result<usize, RegistrationError>>,
    },
    Viewer(Box<dyn Viewer>),
}

/// Cloneable handle for registering collaborators with a game owned by
/// another task. Joins are admitted between ticks.
#[derive(Clone)]
pub struct Joiner {
    tx: mpsc::UnboundedSender<Join>,
}

impl Joiner {
    pub async fn join_player(&self, player: Box<dyn Player>) -> Result<usize, RegistrationError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Join::Player { player, reply })
            .map_err(|_| RegistrationError::Finished)?;
        response.await.unwrap_or(Err(RegistrationError::Finished))
    }

    pub fn join_viewer(&self, viewer: Box<dyn Viewer>) -> Result<(), RegistrationError> {
        self.tx
            .send(Join::Viewer(viewer))
            .map_err(|_| RegistrationError::Finished)
    }
}

enum Decision {
    /// Disconnected earlier; frozen for the rest of the match.
    Idle,
    /// Killed last tick; the action is skipped and the player respawns.
    Respawn,
    Act {
        action: Action,
        notes: Vec<String>,
    },
    Disconnected {
        notes: Vec<String>,
    },
}

pub struct Game {
    state: GameState,
    options: GameOptions,
    max_ticks: u64,
    tick: u64,
    phase: GamePhase,
    players: Vec<Box<dyn Player>>,
    viewers: Vec<Box<dyn Viewer>>,
    recorders: Vec<Box<dyn Recorder>>,
    joins: mpsc::UnboundedReceiver<Join>,
    joiner: Joiner,
}

impl Game {
    pub fn new(state: GameState, options: GameOptions) -> Self {
        let max_ticks = get_match_ticks(state.game_map.size(), options.max_ticks);
        let (tx, joins) = mpsc::unbounded_channel();
        Self {
            state,
            options,
            max_ticks,
            tick: 0,
            phase: GamePhase::NotStarted,
            players: Vec::new(),
            viewers: Vec::new(),
            recorders: Vec::new(),
            joins,
            joiner: Joiner { tx },
        }
    }

    pub fn joiner(&self) -> Joiner {
        self.joiner.clone()
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn active_player_count(&self) -> usize {
        self.state.players.iter().filter(|player| player.active).count()
    }

    /// Configured cap, lowered to the number of scenario spawn points.
    pub fn max_players(&self) -> usize {
        match self.state.spawn_capacity() {
            Some(capacity) => self.options.max_players.min(capacity),
            None => self.options.max_players,
        }
    }

    pub fn register_player(&mut self, player: Box<dyn Player>) -> Result<usize, RegistrationError> {
        if self.phase == GamePhase::Finished {
            return Err(RegistrationError::Finished);
        }
        let max_players = self.max_players();
        if self.players.len() >= max_players {
            info!(player = player.name(), "player refused, maximum number of players reached");
            return Err(RegistrationError::GameFull(max_players));
        }

        let id = self.state.add_player(player.name()).map_err(|error| {
            warn!(player = player.name(), %error, "no room to spawn player");
            RegistrationError::NoSpawn
        })?;
        info!(player = %self.state.players[id].name_str(), tick = self.tick, "player joined the game");
        self.players.push(player);
        Ok(id)
    }

    pub fn register_viewer(&mut self, viewer: Box<dyn Viewer>) {
        info!(viewer = viewer.id(), "viewer joined the game");
        self.viewers.push(viewer);
    }

    pub fn register_recorder(&mut self, recorder: Box<dyn Recorder>) {
        self.recorders.push(recorder);
    }

    pub(crate) async fn next_join(&mut self) -> Option<Join> {
        self.joins.recv().await
    }

    pub(crate) fn admit(&mut self, join: Join) {
        match join {
            Join::Player { player, reply } => {
                let result = self.register_player(player);
                let _ = reply.send(result);
            }
            Join::Viewer(viewer) => {
                if self.phase == GamePhase::Finished {
                    return;
                }
                self.register_viewer(viewer);
            }
        }
    }

    fn admit_pending(&mut self) {
        while let Ok(join) = self.joins.try_recv() {
            self.admit(join);
        }
    }

    /// Ends a match that never started. Pending and later joins are refused.
    pub fn finish_without_players(&mut self) {
        self.phase = GamePhase::Finished;
        self.joins.close();
        self.admit_pending();
    }

    pub async fn run(&mut self) -> Result<MatchResult, EngineError> {
        self.phase = GamePhase::Running;
        let rules = self.state.options();
        info!(
            players = self.players.len(),
            max_ticks = self.max_ticks,
            relocate_black_hole = rules.relocate_black_hole,
            relocate_blitzium = rules.relocate_blitzium,
            "game started"
        );

        while self.phase == GamePhase::Running {
            self.admit_pending();
            self.tick += 1;
            let tick = self.tick;
            info!(tick, "playing tick");

            let info = TickInfo {
                tick,
                ticks_left: self.max_ticks.saturating_sub(tick),
            };
            let limit = if tick == 1 {
                self.options.first_tick_timeout
            } else {
                self.options.move_timeout
            };

            let (decisions, delivered) = {
                let state = &self.state;
                let requests = self
                    .players
                    .iter_mut()
                    .zip(state.players.iter())
                    .map(|(player, entity)| {
                        let request = ActionRequest {
                            tick,
                            ticks_left: info.ticks_left,
                            player_id: entity.id,
                        };
                        async move {
                            if !entity.active {
                                Decision::Idle
                            } else if entity.killed {
                                Decision::Respawn
                            } else {
                                request_action(player.as_mut(), request, state, limit).await
                            }
                        }
                    });
                let broadcasts = self
                    .viewers
                    .iter_mut()
                    .map(|viewer| send_tick(viewer.as_mut(), info, state, limit));
                tokio::join!(join_all(requests), join_all(broadcasts))
            };

            for (id, decision) in decisions.into_iter().enumerate() {
                self.apply_decision(tick, id, decision)?;
            }

            let mut delivered = delivered.into_iter();
            self.viewers.retain(|_| delivered.next().unwrap_or(true));

            self.state.update_players_scores();

            if tick >= self.max_ticks {
                info!(tick, "game completed");
                self.phase = GamePhase::Finished;
            } else if self.active_player_count() == 0 {
                info!(tick, "no active player left");
                self.phase = GamePhase::Finished;
            }

            for recorder in &mut self.recorders {
                if let Err(error) = recorder.record_tick(info, &self.state) {
                    warn!(tick, %error, "failed to record tick");
                }
            }

            if self.phase == GamePhase::Running && !self.options.game_delay.is_zero() {
                tokio::time::sleep(self.options.game_delay).await;
            }
        }

        Ok(self.finish().await)
    }

    fn apply_decision(&mut self, tick: u64, id: usize, decision: Decision) -> Result<(), EngineError> {
        match decision {
            Decision::Idle => Ok(()),
            Decision::Respawn => {
                info!(tick, player = %self.state.players[id].name_str(), "player was killed, skipping turn");
                self.state.apply_action(tick, id, None)
            }
            Decision::Act { action, notes } => {
                for note in notes {
                    self.state.players[id].add_history(tick, note);
                }
                debug!(tick, player = %self.state.players[id].name_str(), %action, "applying action");
                self.state.apply_action(tick, id, Some(action))
            }
            Decision::Disconnected { notes } => {
                for note in notes {
                    self.state.players[id].add_history(tick, note);
                }
                warn!(tick, player = %self.state.players[id].name_str(), "player left the game");
                self.state.apply_action(tick, id, Some(Action::default()))?;
                self.state.players[id].active = false;
                Ok(())
            }
        }
    }

    async fn finish(&mut self) -> MatchResult {
        self.phase = GamePhase::Finished;
        let tick = self.tick;
        let ranking = self.state.ranking();
        for id in &ranking {
            info!(player = %self.state.players[*id], "final state");
        }

        if let Some(winner_id) = ranking.first().copied() {
            let winner = &self.state.players[winner_id];
            info!(winner = %winner.name_str(), score = winner.score, "and the winner is");
            let limit = self.options.move_timeout;
            let sends = self.viewers.iter_mut().map(|viewer| async move {
                let id = viewer.id().to_string();
                match timeout(limit, viewer.send_winner(tick, winner)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => warn!(viewer = %id, %error, "failed to send winner"),
                    Err(_) => warn!(viewer = %id, "timeout while sending winner"),
                }
            });
            join_all(sends).await;
        }

        for recorder in &mut self.recorders {
            if let Err(error) = recorder.close(&self.state, &ranking) {
                warn!(%error, "failed to close recorder");
            }
        }
        join_all(self.players.iter_mut().map(|player| player.close())).await;

        self.joins.close();
        self.admit_pending();

        let standings: Vec<Standing> = ranking
            .iter()
            .map(|id| {
                let player = &self.state.players[*id];
                Standing {
                    id: player.id,
                    name: player.name.clone(),
                    score: player.score,
                }
            })
            .collect();
        MatchResult {
            ticks: tick,
            winner: standings.first().cloned(),
            ranking: standings,
        }
    }
}

/// Asks one player for its action, retrying replies tagged with the wrong
/// tick. Anything else that goes wrong falls back to moving forward.
async fn request_action(
    player: &mut dyn Player,
    request: ActionRequest,
    state: &GameState,
    limit: Duration,
) -> Decision {
    let mut notes = Vec::new();
    for _ in 0..MAX_ACTION_ATTEMPTS {
        match timeout(limit, player.request_action(request, state)).await {
            Ok(Ok(reply)) if reply.tick == request.tick => {
                return Decision::Act {
                    action: reply.action,
                    notes,
                };
            }
            Ok(Ok(reply)) => {
                let error = CollaboratorError::Desync {
                    expected: request.tick,
                    received: reply.tick,
                };
                warn!(tick = request.tick, player = player.name(), %error, "discarding action");
                notes.push(format!(
                    "Returned an action for an out of sync game tick ({} != {}).",
                    reply.tick, request.tick
                ));
            }
            Ok(Err(CollaboratorError::Disconnected)) => {
                notes.push("Disconnected.".to_string());
                return Decision::Disconnected { notes };
            }
            Ok(Err(error)) => {
                warn!(tick = request.tick, player = player.name(), %error, "request next move failed");
                notes.push(format!("Request next move failed with: '{error}'."));
                break;
            }
            Err(_) => {
                let error = CollaboratorError::Timeout;
                warn!(tick = request.tick, player = player.name(), %error, "waiting for player action");
                notes.push("Timeout while waiting for player action.".to_string());
                break;
            }
        }
    }
    Decision::Act {
        action: Action::default(),
        notes,
    }
}

/// Returns `false` when the viewer failed and should be dropped. A slow
/// viewer only misses the tick.
async fn send_tick(
    viewer: &mut dyn Viewer,
    info: TickInfo,
    state: &GameState,
    limit: Duration,
) -> bool {
    let id = viewer.id().to_string();
    match timeout(limit, viewer.send_tick(info, state)).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            warn!(tick = info.tick, viewer = %id, %error, "dropping viewer");
            false
        }
        Err(_) => {
            warn!(tick = info.tick, viewer = %id, "timeout for viewer");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use futures_util::future::{self, BoxFuture};
    use futures_util::FutureExt;

    use super::*;
    use crate::collaborators::ActionReply;
    use crate::error::RecorderError;
    use crate::game_config::GameConfig;
    use crate::geometry::{Direction, Position};
    use crate::player_state::PlayerState;

    enum Behavior {
        Script(Vec<Action>),
        Silent,
        Desync { wrong_replies: usize, action: Action },
        Fail(CollaboratorError),
    }

    struct ScriptedPlayer {
        name: String,
        calls: Arc<AtomicUsize>,
        behavior: Behavior,
    }

    impl ScriptedPlayer {
        fn boxed(name: &str, behavior: Behavior) -> (Box<dyn Player>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let player = ScriptedPlayer {
                name: name.to_string(),
                calls: calls.clone(),
                behavior,
            };
            (Box::new(player), calls)
        }
    }

    impl Player for ScriptedPlayer {
        fn name(&self) -> &str {
            &self.name
        }

        fn request_action<'a>(
            &'a mut self,
            request: ActionRequest,
            _state: &'a GameState,
        ) -> BoxFuture<'a, Result<ActionReply, CollaboratorError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let result = match &self.behavior {
                Behavior::Script(actions) => {
                    let idx = (request.tick as usize - 1) % actions.len().max(1);
                    let action = actions.get(idx).copied().unwrap_or_default();
                    Ok(ActionReply::new(request.tick, action))
                }
                Behavior::Silent => return future::pending().boxed(),
                Behavior::Desync {
                    wrong_replies,
                    action,
                } => {
                    let tick = if call < *wrong_replies {
                        request.tick + 100
                    } else {
                        request.tick
                    };
                    Ok(ActionReply::new(tick, *action))
                }
                Behavior::Fail(error) => Err(error.clone()),
            };
            future::ready(result).boxed()
        }

        fn close(&mut self) -> BoxFuture<'_, ()> {
            future::ready(()).boxed()
        }
    }

    #[derive(Clone, Default)]
    struct ViewerLog {
        ticks: Arc<Mutex<Vec<u64>>>,
        winners: Arc<Mutex<Vec<usize>>>,
    }

    struct TestViewer {
        id: String,
        log: ViewerLog,
        fail: bool,
    }

    impl Viewer for TestViewer {
        fn id(&self) -> &str {
            &self.id
        }

        fn send_tick<'a>(
            &'a mut self,
            info: TickInfo,
            _state: &'a GameState,
        ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
            self.log.ticks.lock().unwrap().push(info.tick);
            let result = if self.fail {
                Err(CollaboratorError::Transport("broken pipe".to_string()))
            } else {
                Ok(())
            };
            future::ready(result).boxed()
        }

        fn send_winner<'a>(
            &'a mut self,
            _tick: u64,
            winner: &'a PlayerState,
        ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
            self.log.winners.lock().unwrap().push(winner.id);
            future::ready(Ok(())).boxed()
        }
    }

    fn viewer(id: &str, fail: bool) -> (Box<dyn Viewer>, ViewerLog) {
        let log = ViewerLog::default();
        let viewer = TestViewer {
            id: id.to_string(),
            log: log.clone(),
            fail,
        };
        (Box::new(viewer), log)
    }

    #[derive(Clone, Default)]
    struct RecorderLog {
        ticks: Arc<Mutex<Vec<u64>>>,
        closed_with: Arc<Mutex<Option<Vec<usize>>>>,
    }

    struct TestRecorder {
        log: RecorderLog,
    }

    impl Recorder for TestRecorder {
        fn record_tick(&mut self, info: TickInfo, _state: &GameState) -> Result<(), RecorderError> {
            self.log.ticks.lock().unwrap().push(info.tick);
            Ok(())
        }

        fn close(&mut self, _state: &GameState, ranking: &[usize]) -> Result<(), RecorderError> {
            *self.log.closed_with.lock().unwrap() = Some(ranking.to_vec());
            Ok(())
        }
    }

    fn fast_options(max_ticks: u64) -> GameOptions {
        GameOptions {
            max_ticks,
            move_timeout: Duration::from_millis(20),
            first_tick_timeout: Duration::from_millis(20),
            game_delay: Duration::ZERO,
            max_players: 4,
        }
    }

    fn blank_game(map_size: usize, max_ticks: u64) -> Game {
        Game::new(
            GameState::new(GameConfig::blank(map_size), 7),
            fast_options(max_ticks),
        )
    }

    fn scenario_game(rows: &[String], max_ticks: u64) -> Game {
        let config: GameConfig = rows.join("\n").parse().unwrap();
        Game::new(GameState::new(config, 7), fast_options(max_ticks))
    }

    /// Open square map with a single spawn on `row`, at column 1, facing right.
    fn lane_rows(size: usize, row: usize) -> Vec<String> {
        let wall = "W".repeat(size);
        let open = format!("W{}W", " ".repeat(size - 2));
        let spawn = format!("W1D{}W", " ".repeat(size - 4));
        (0..size)
            .map(|y| {
                if y == 0 || y == size - 1 {
                    wall.clone()
                } else if y == row {
                    spawn.clone()
                } else {
                    open.clone()
                }
            })
            .collect()
    }

    fn history_messages(state: &GameState, id: usize) -> Vec<String> {
        state.players[id]
            .history
            .iter()
            .map(|item| item.message.clone())
            .collect()
    }

    #[tokio::test]
    async fn single_forward_player_gets_every_tick_and_one_winner() {
        let mut game = scenario_game(&lane_rows(13, 6), 10);
        let (player, calls) = ScriptedPlayer::boxed("solo", Behavior::Script(vec![Action::Forward]));
        game.register_player(player).unwrap();
        let (viewer, log) = viewer("v1", false);
        game.register_viewer(viewer);

        let result = game.run().await.unwrap();

        assert_eq!(result.ticks, 10);
        assert_eq!(result.winner.map(|w| w.name), Some("solo".to_string()));
        assert_eq!(*log.ticks.lock().unwrap(), (1..=10).collect::<Vec<u64>>());
        assert_eq!(*log.winners.lock().unwrap(), vec![0]);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(game.phase(), GamePhase::Finished);
        let player = &game.state().players[0];
        assert!(!player.killed);
        assert_eq!(player.stats.suicides, 0);
        assert_eq!(player.stats.deaths, 0);
        assert_eq!(player.position, Position::new(11, 6));
    }

    #[tokio::test]
    async fn silent_player_moves_forward_and_logs_timeouts() {
        let mut game = blank_game(10, 3);
        let (player, _) = ScriptedPlayer::boxed("sleepy", Behavior::Silent);
        game.register_player(player).unwrap();

        let result = game.run().await.unwrap();

        assert_eq!(result.ticks, 3);
        let history = game.state().players[0].history.iter().cloned().collect::<Vec<_>>();
        for tick in 1..=3 {
            assert!(history
                .iter()
                .any(|item| item.tick == tick && item.message == "Timeout while waiting for player action."));
        }
        assert!(history
            .iter()
            .any(|item| item.tick == 1 && item.message.starts_with("Moving FORWARD")));
    }

    #[tokio::test]
    async fn desynced_player_is_retried_then_defaults_to_forward() {
        let mut game = blank_game(10, 1);
        let (player, calls) = ScriptedPlayer::boxed(
            "lagging",
            Behavior::Desync {
                wrong_replies: usize::MAX,
                action: Action::TurnLeft,
            },
        );
        game.register_player(player).unwrap();
        let spawn_direction = game.state().players[0].direction;

        game.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), MAX_ACTION_ATTEMPTS);
        let player = &game.state().players[0];
        assert_eq!(player.direction, spawn_direction);
        let messages = history_messages(game.state(), 0);
        assert_eq!(
            messages
                .iter()
                .filter(|message| message.starts_with("Returned an action for an out of sync game tick (101 != 1)"))
                .count(),
            MAX_ACTION_ATTEMPTS
        );
    }

    #[tokio::test]
    async fn desynced_reply_is_discarded_and_next_attempt_wins() {
        let mut game = scenario_game(&lane_rows(7, 3), 1);
        let (player, calls) = ScriptedPlayer::boxed(
            "late-once",
            Behavior::Desync {
                wrong_replies: 1,
                action: Action::TurnLeft,
            },
        );
        game.register_player(player).unwrap();
        game.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let player = &game.state().players[0];
        assert!(!player.killed);
        assert_eq!(player.direction, Direction::Up);
        assert_eq!(player.position, Position::new(1, 2));
        let messages = history_messages(game.state(), 0);
        assert!(messages.contains(&"Returned an action for an out of sync game tick (101 != 1).".to_string()));
    }

    #[tokio::test]
    async fn failing_player_defaults_to_forward() {
        let mut game = blank_game(10, 2);
        let (player, calls) = ScriptedPlayer::boxed(
            "broken",
            Behavior::Fail(CollaboratorError::Protocol("bad payload".to_string())),
        );
        game.register_player(player).unwrap();

        game.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(history_messages(game.state(), 0)
            .contains(&"Request next move failed with: 'protocol error: bad payload'.".to_string()));
    }

    #[tokio::test]
    async fn disconnected_player_is_frozen_while_others_play_on() {
        let mut game = blank_game(10, 5);
        let (gone, gone_calls) =
            ScriptedPlayer::boxed("gone", Behavior::Fail(CollaboratorError::Disconnected));
        let (stays, stays_calls) =
            ScriptedPlayer::boxed("stays", Behavior::Script(vec![Action::Forward, Action::TurnLeft]));
        game.register_player(gone).unwrap();
        game.register_player(stays).unwrap();

        let result = game.run().await.unwrap();

        assert_eq!(result.ticks, 5);
        assert_eq!(gone_calls.load(Ordering::SeqCst), 1);
        assert!(stays_calls.load(Ordering::SeqCst) >= 2);
        assert!(!game.state().players[0].active);
        assert_eq!(game.active_player_count(), 1);
    }

    #[tokio::test]
    async fn game_stops_when_every_player_left() {
        let mut game = blank_game(10, 50);
        let (gone, _) = ScriptedPlayer::boxed("gone", Behavior::Fail(CollaboratorError::Disconnected));
        game.register_player(gone).unwrap();

        let result = game.run().await.unwrap();

        assert_eq!(result.ticks, 1);
        assert_eq!(result.winner.map(|w| w.id), Some(0));
    }

    #[tokio::test]
    async fn killed_player_is_not_asked_on_its_respawn_tick() {
        let config: GameConfig = "WWWWW\nWD1 W\nW   W\nW   W\nWWWWW".parse().unwrap();
        let mut game = Game::new(GameState::new(config, 1), fast_options(4));
        let (player, calls) = ScriptedPlayer::boxed("runner", Behavior::Script(vec![Action::Forward]));
        game.register_player(player).unwrap();

        game.run().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(game.state().players[0].stats.suicides, 1);
    }

    #[tokio::test]
    async fn failing_viewer_is_dropped() {
        let mut game = blank_game(10, 4);
        let (player, _) = ScriptedPlayer::boxed("p", Behavior::Script(vec![Action::Forward]));
        game.register_player(player).unwrap();
        let (good, good_log) = viewer("good", false);
        let (bad, bad_log) = viewer("bad", true);
        game.register_viewer(good);
        game.register_viewer(bad);

        game.run().await.unwrap();

        assert_eq!(good_log.ticks.lock().unwrap().len(), 4);
        assert_eq!(good_log.winners.lock().unwrap().len(), 1);
        assert_eq!(*bad_log.ticks.lock().unwrap(), vec![1]);
        assert!(bad_log.winners.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recorder_sees_every_tick_and_final_ranking() {
        let mut game = blank_game(10, 6);
        let (a, _) = ScriptedPlayer::boxed("a", Behavior::Script(vec![Action::Forward]));
        let (b, _) = ScriptedPlayer::boxed("b", Behavior::Script(vec![Action::TurnRight]));
        game.register_player(a).unwrap();
        game.register_player(b).unwrap();
        let log = RecorderLog::default();
        game.register_recorder(Box::new(TestRecorder { log: log.clone() }));

        let result = game.run().await.unwrap();

        assert_eq!(*log.ticks.lock().unwrap(), (1..=6).collect::<Vec<u64>>());
        let ranking = log.closed_with.lock().unwrap().clone().unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(
            ranking,
            result.ranking.iter().map(|standing| standing.id).collect::<Vec<_>>()
        );
    }

    async fn scripted_match(seed: u32) -> (String, Vec<f64>) {
        use Action::{Forward as F, TurnLeft as L, TurnRight as R};
        let mut game = Game::new(GameState::new(GameConfig::blank(12), seed), fast_options(40));
        let scripts = [
            vec![F, F, R, F, F, R, F, F, R, F, F],
            vec![F, L, F, F, L, F, F, L, F, R],
            vec![R, F, F, F, L, L, F, F, F],
        ];
        for (idx, script) in scripts.into_iter().enumerate() {
            let (player, _) = ScriptedPlayer::boxed(&format!("p{idx}"), Behavior::Script(script));
            game.register_player(player).unwrap();
        }
        game.run().await.unwrap();
        let scores = game.state().players.iter().map(|player| player.score).collect();
        (game.state().game_map.to_string(), scores)
    }

    #[tokio::test]
    async fn same_seed_and_scripts_replay_identically() {
        let first = scripted_match(99).await;
        let second = scripted_match(99).await;
        assert_eq!(first, second);
    }

    #[test]
    fn registration_is_capped_by_scenario_spawns() {
        let config: GameConfig = "WWWWW\nW1  W\nW   W\nW  2W\nWWWWW".parse().unwrap();
        let mut game = Game::new(GameState::new(config, 1), fast_options(10));
        assert_eq!(game.max_players(), 2);

        for name in ["a", "b"] {
            let (player, _) = ScriptedPlayer::boxed(name, Behavior::Silent);
            game.register_player(player).unwrap();
        }
        let (extra, _) = ScriptedPlayer::boxed("c", Behavior::Silent);
        assert_eq!(game.register_player(extra), Err(RegistrationError::GameFull(2)));
    }

    #[tokio::test]
    async fn late_join_is_admitted_between_ticks() {
        let mut game = Game::new(
            GameState::new(GameConfig::blank(10), 5),
            GameOptions {
                game_delay: Duration::from_millis(5),
                ..fast_options(20)
            },
        );
        let (first, _) = ScriptedPlayer::boxed("first", Behavior::Script(vec![Action::Forward]));
        game.register_player(first).unwrap();
        let joiner = game.joiner();

        let late = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let (player, calls) = ScriptedPlayer::boxed("late", Behavior::Script(vec![Action::TurnLeft]));
            let id = joiner.join_player(player).await;
            (id, calls)
        });

        game.run().await.unwrap();
        let (id, calls) = late.await.unwrap();

        assert_eq!(id, Ok(1));
        assert_eq!(game.state().players.len(), 2);
        let calls = calls.load(Ordering::SeqCst) as u64;
        assert!(calls > 0 && calls < 20);
    }

    #[tokio::test]
    async fn joins_after_the_game_are_refused() {
        let mut game = blank_game(10, 1);
        let (player, _) = ScriptedPlayer::boxed("p", Behavior::Script(vec![Action::Forward]));
        game.register_player(player).unwrap();
        let joiner = game.joiner();
        game.run().await.unwrap();

        let (late, _) = ScriptedPlayer::boxed("late", Behavior::Silent);
        assert_eq!(joiner.join_player(late).await, Err(RegistrationError::Finished));
    }
}
