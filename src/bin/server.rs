use std::collections::HashMap;
use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use conquest_server::constants::{
    DEFAULT_FIRST_TICK_TIMEOUT, DEFAULT_MAP_SIZE, DEFAULT_MAX_PLAYERS, DEFAULT_MAX_TICKS,
    DEFAULT_MIN_PLAYERS, DEFAULT_MOVE_TIMEOUT, DEFAULT_START_DELAY,
};
use conquest_server::engine::{GameState, RuleOptions};
use conquest_server::game::{Game, GameOptions, Joiner};
use conquest_server::game_config::GameConfig;
use conquest_server::lobby::{Lobby, LobbyOptions, LobbyOutcome};
use conquest_server::protocol::{parse_client_message, ClientMessage};
use conquest_server::recorder::JsonRecorder;
use conquest_server::server_utils::{effective_min_players, parse_team_tokens, resolve_player_name};
use conquest_server::socket::{OutboundMessage, SocketPlayer, SocketViewer};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const OUTBOUND_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 16;
const CLOSE_POLICY_VIOLATION: u16 = 1008;
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
const WRITER_DRAIN: Duration = Duration::from_secs(1);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, env = "PORT", default_value_t = 8765)]
    port: u16,
    #[arg(long, env = "SERVER_ADDRESS", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "MIN_NB_PLAYERS", default_value_t = DEFAULT_MIN_PLAYERS)]
    min_players: usize,
    #[arg(long, env = "MAX_NB_PLAYERS", default_value_t = DEFAULT_MAX_PLAYERS)]
    max_players: usize,
    #[arg(long, env = "MAX_NB_TICKS", default_value_t = DEFAULT_MAX_TICKS)]
    max_ticks: u64,
    #[arg(long, env = "MOVE_TIMEOUT", default_value_t = DEFAULT_MOVE_TIMEOUT.as_millis() as u64)]
    move_timeout_ms: u64,
    #[arg(long, default_value_t = DEFAULT_FIRST_TICK_TIMEOUT.as_millis() as u64)]
    first_tick_timeout_ms: u64,
    #[arg(long, env = "START_DELAY_TIMEOUT", default_value_t = DEFAULT_START_DELAY.as_secs())]
    start_delay_secs: u64,
    #[arg(long, env = "GAME_DELAY", default_value_t = 0)]
    game_delay_ms: u64,
    /// Scenario file; a blank map is used when omitted.
    #[arg(long, env = "GAME_CONFIG")]
    game_config: Option<PathBuf>,
    #[arg(long, env = "RECORD_PATH")]
    record_path: Option<PathBuf>,
    /// JSON object mapping registration tokens to team names.
    #[arg(long, env = "TEAM_NAMES_BY_TOKEN")]
    team_names_by_token: Option<String>,
    #[arg(long)]
    seed: Option<u32>,
    #[arg(long)]
    relocate_black_hole: bool,
    #[arg(long)]
    relocate_blitzium: bool,
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

struct ServerContext {
    joiner: Joiner,
    team_names_by_token: Option<HashMap<String, String>>,
}

type SharedState = Arc<ServerContext>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let team_names_by_token = match load_team_tokens(cli.team_names_by_token.as_deref()) {
        Ok(teams) => teams,
        Err(error) => {
            error!(%error, "invalid team tokens");
            return ExitCode::from(2);
        }
    };
    let config = match cli.game_config.as_deref() {
        Some(path) => match GameConfig::from_file(path) {
            Ok(config) => config,
            Err(error) => {
                error!(%error, "failed to load game config");
                return ExitCode::from(2);
            }
        },
        None => GameConfig::blank(DEFAULT_MAP_SIZE),
    };
    let seed = cli.seed.unwrap_or_else(rand::random);

    let state = GameState::with_options(config, seed, rule_options(&cli));
    let mut game = Game::new(state, game_options(&cli));
    if let Some(path) = cli.record_path.as_ref() {
        info!(path = %path.display(), "recording match");
        game.register_recorder(Box::new(JsonRecorder::new(path)));
    }
    let lobby = Lobby::new(
        game,
        LobbyOptions {
            min_players: effective_min_players(cli.min_players, team_names_by_token.as_ref()),
            start_delay: Duration::from_secs(cli.start_delay_secs),
        },
    );

    let shared = Arc::new(ServerContext {
        joiner: lobby.joiner(),
        team_names_by_token,
    });
    let app = build_router(shared, cli.static_dir.as_deref());

    let bind_addr = bind_address(&cli);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%bind_addr, %error, "failed to bind server socket");
            return ExitCode::FAILURE;
        }
    };
    info!(%bind_addr, seed, "listening");

    tokio::select! {
        outcome = lobby.run() => {
            let code = match outcome {
                Ok(LobbyOutcome::Played(result)) => {
                    info!(
                        ticks = result.ticks,
                        winner = result.winner.as_ref().map_or("-", |winner| winner.name.as_str()),
                        "match finished"
                    );
                    ExitCode::SUCCESS
                }
                Ok(LobbyOutcome::NoPlayers) => {
                    warn!("no player joined, shutting down");
                    ExitCode::SUCCESS
                }
                Err(error) => {
                    error!(%error, "game aborted");
                    ExitCode::FAILURE
                }
            };
            tokio::time::sleep(CLOSE_GRACE).await;
            code
        }
        served = axum::serve(listener, app).into_future() => {
            if let Err(error) = served {
                error!(%error, "server runtime failed");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_team_tokens(
    raw: Option<&str>,
) -> Result<Option<HashMap<String, String>>, serde_json::Error> {
    raw.map(parse_team_tokens).transpose()
}

fn rule_options(cli: &Cli) -> RuleOptions {
    RuleOptions {
        relocate_black_hole: cli.relocate_black_hole,
        relocate_blitzium: cli.relocate_blitzium,
    }
}

fn game_options(cli: &Cli) -> GameOptions {
    GameOptions {
        max_ticks: cli.max_ticks,
        move_timeout: Duration::from_millis(cli.move_timeout_ms),
        first_tick_timeout: Duration::from_millis(cli.first_tick_timeout_ms),
        game_delay: Duration::from_millis(cli.game_delay_ms),
        max_players: cli.max_players,
    }
}

fn bind_address(cli: &Cli) -> String {
    format!("{}:{}", cli.host, cli.port)
}

fn build_router(state: SharedState, static_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    match static_dir {
        Some(static_dir) if static_dir.join("index.html").is_file() => {
            info!(path = %static_dir.display(), "serving viewer assets");
            let index_file = static_dir.join("index.html");
            app.fallback_service(ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)))
        }
        Some(static_dir) => {
            warn!(path = %static_dir.display(), "static dir has no index.html, not serving it");
            app
        }
        None => app,
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    match next_text(&mut ws_receiver).await.as_deref().map(parse_client_message) {
        Some(Some(ClientMessage::Register { name, token })) => {
            serve_player(&state, &client_id, name, token, &tx, &mut ws_receiver).await;
        }
        Some(Some(ClientMessage::Viewer)) => {
            serve_viewer(&state, &client_id, &tx, &mut ws_receiver).await;
        }
        Some(_) => {
            warn!(client = %client_id, "first message must register a player or a viewer");
            close(&tx, CLOSE_POLICY_VIOLATION, "expected a register or viewer message").await;
        }
        None => debug!(client = %client_id, "socket closed before registering"),
    }

    drop(tx);
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        abort.abort();
    }
}

async fn serve_player(
    state: &ServerContext,
    client_id: &str,
    name: Option<String>,
    token: Option<String>,
    tx: &mpsc::Sender<OutboundMessage>,
    receiver: &mut SplitStream<WebSocket>,
) {
    let Some(name) = resolve_player_name(
        name.as_deref(),
        token.as_deref(),
        state.team_names_by_token.as_ref(),
    ) else {
        warn!(client = %client_id, "registration refused: unknown team token");
        close(tx, CLOSE_POLICY_VIOLATION, "unknown team token").await;
        return;
    };

    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(INBOUND_QUEUE);
    let player = SocketPlayer::new(name.clone(), tx.clone(), inbound_rx);
    match state.joiner.join_player(Box::new(player)).await {
        Ok(id) => info!(client = %client_id, player = %name, id, "player registered"),
        Err(error) => {
            warn!(client = %client_id, player = %name, %error, "registration refused");
            close(tx, CLOSE_TRY_AGAIN_LATER, &error.to_string()).await;
            return;
        }
    }

    while let Some(raw) = next_text(receiver).await {
        if inbound_tx.send(raw).await.is_err() {
            break;
        }
    }
    info!(client = %client_id, player = %name, "player socket closed");
}

async fn serve_viewer(
    state: &ServerContext,
    client_id: &str,
    tx: &mpsc::Sender<OutboundMessage>,
    receiver: &mut SplitStream<WebSocket>,
) {
    let viewer = SocketViewer::new(client_id, tx.clone());
    if let Err(error) = state.joiner.join_viewer(Box::new(viewer)) {
        warn!(client = %client_id, %error, "viewer refused");
        close(tx, CLOSE_TRY_AGAIN_LATER, &error.to_string()).await;
        return;
    }
    info!(client = %client_id, "viewer connected");

    while next_text(receiver).await.is_some() {}
    info!(client = %client_id, "viewer socket closed");
}

/// Next text payload from the client, or `None` once the socket is gone.
async fn next_text(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(received) = receiver.next().await {
        match received.ok()? {
            Message::Text(raw) => return Some(raw.to_string()),
            Message::Binary(raw) => match String::from_utf8(raw.to_vec()) {
                Ok(text) => return Some(text),
                Err(_) => warn!("ignoring non utf8 binary message"),
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn close(tx: &mpsc::Sender<OutboundMessage>, code: u16, reason: &str) {
    let _ = tx
        .send(OutboundMessage::Close {
            code,
            reason: reason.to_string(),
        })
        .await;
}

fn make_id(prefix: &str) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_flags_drive_game_options() {
        let cli = Cli::parse_from([
            "server",
            "--max-ticks",
            "250",
            "--move-timeout-ms",
            "150",
            "--first-tick-timeout-ms",
            "900",
            "--game-delay-ms",
            "5",
            "--max-players",
            "3",
        ]);
        let options = game_options(&cli);
        assert_eq!(options.max_ticks, 250);
        assert_eq!(options.move_timeout, Duration::from_millis(150));
        assert_eq!(options.first_tick_timeout, Duration::from_millis(900));
        assert_eq!(options.game_delay, Duration::from_millis(5));
        assert_eq!(options.max_players, 3);
    }

    #[test]
    fn rule_toggles_default_off() {
        let cli = Cli::parse_from(["server"]);
        let rules = rule_options(&cli);
        assert!(!rules.relocate_black_hole);
        assert!(!rules.relocate_blitzium);

        let cli = Cli::parse_from(["server", "--relocate-blitzium"]);
        assert!(rule_options(&cli).relocate_blitzium);
    }

    #[test]
    fn bind_address_joins_host_and_port() {
        let cli = Cli::parse_from(["server", "--host", "127.0.0.1", "--port", "9000"]);
        assert_eq!(bind_address(&cli), "127.0.0.1:9000");
    }

    #[test]
    fn team_tokens_are_optional_but_must_be_valid_json() {
        assert!(load_team_tokens(None).unwrap().is_none());
        let teams = load_team_tokens(Some(r#"{"abc": "Red"}"#)).unwrap().unwrap();
        assert_eq!(teams.get("abc").map(String::as_str), Some("Red"));
        assert!(load_team_tokens(Some("not json")).is_err());
    }

    #[test]
    fn make_id_is_unique() {
        let first = make_id("client");
        let second = make_id("client");
        assert_ne!(first, second);
        assert!(first.starts_with("client-"));
    }
}
