use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use conquest_server::constants::{DEFAULT_MAP_SIZE, DEFAULT_MAX_TICKS};
use conquest_server::engine::GameState;
use conquest_server::game::{Game, GameOptions, MatchResult};
use conquest_server::game_config::GameConfig;
use conquest_server::random_player::RandomPlayer;
use conquest_server::recorder::JsonRecorder;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value_t = 4)]
    players: usize,
    #[arg(long, default_value_t = DEFAULT_MAP_SIZE)]
    map_size: usize,
    #[arg(long)]
    game_config: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
    max_ticks: u64,
    #[arg(long)]
    seed: Option<u32>,
    /// Random players skip moves that would kill them right away.
    #[arg(long)]
    cautious: bool,
    #[arg(long)]
    record_path: Option<PathBuf>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct RankingLine {
    rank: usize,
    id: usize,
    name: String,
    score: f64,
    #[serde(rename = "tilesOwned")]
    tiles_owned: u32,
    kills: u32,
    deaths: u32,
    suicides: u32,
    blitziums: u32,
    nemesis: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    seed: u32,
    #[serde(rename = "mapSize")]
    map_size: usize,
    players: usize,
    ticks: u64,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    winner: Option<String>,
    ranking: Vec<RankingLine>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = match load_config(cli.game_config.as_deref(), cli.map_size) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "failed to load game config");
            return ExitCode::from(2);
        }
    };
    let seed = cli.seed.unwrap_or_else(rand::random);
    let map_size = config.game_map.size();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let started = Instant::now();
    let outcome = runtime.block_on(run_match(&cli, config, seed));
    let duration_ms = started.elapsed().as_millis() as u64;

    let (result, state) = match outcome {
        Ok(outcome) => outcome,
        Err(message) => {
            error!(seed, "{message}");
            return ExitCode::FAILURE;
        }
    };

    let ranking = build_ranking_lines(&result, &state);
    for line in &ranking {
        match serde_json::to_string(line) {
            Ok(text) => println!("{text}"),
            Err(error) => error!(%error, "failed to serialize ranking line"),
        }
    }

    let summary = RunSummary {
        seed,
        map_size,
        players: state.players.len(),
        ticks: result.ticks,
        duration_ms,
        winner: result.winner.as_ref().map(|winner| winner.name.clone()),
        ranking,
    };
    info!(
        seed,
        ticks = summary.ticks,
        duration_ms,
        winner = summary.winner.as_deref().unwrap_or("-"),
        "simulation finished"
    );

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            error!(path = %path.display(), %error, "failed to write summary");
            return ExitCode::from(2);
        }
    }
    ExitCode::SUCCESS
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, map_size: usize) -> Result<GameConfig, String> {
    match path {
        Some(path) => GameConfig::from_file(path).map_err(|error| error.to_string()),
        None => Ok(GameConfig::blank(map_size)),
    }
}

async fn run_match(
    cli: &Cli,
    config: GameConfig,
    seed: u32,
) -> Result<(MatchResult, GameState), String> {
    let options = GameOptions {
        max_ticks: cli.max_ticks,
        max_players: cli.players,
        ..GameOptions::default()
    };
    let mut game = Game::new(GameState::new(config, seed), options);

    for index in 0..cli.players {
        let name = format!("AI-{:02}", index + 1);
        let mut player = RandomPlayer::with_seed(name, player_seed(seed, index));
        if cli.cautious {
            player = player.cautious();
        }
        game.register_player(Box::new(player))
            .map_err(|error| format!("failed to register player {}: {error}", index + 1))?;
    }
    if let Some(path) = cli.record_path.as_ref() {
        game.register_recorder(Box::new(JsonRecorder::new(path)));
    }

    let result = game.run().await.map_err(|error| format!("game aborted: {error}"))?;
    Ok((result, game.state().clone()))
}

/// Each player draws from its own stream so adding a player does not change
/// the moves of the others.
fn player_seed(seed: u32, index: usize) -> u64 {
    (u64::from(seed) << 16) ^ (index as u64 + 1)
}

fn build_ranking_lines(result: &MatchResult, state: &GameState) -> Vec<RankingLine> {
    result
        .ranking
        .iter()
        .enumerate()
        .filter_map(|(rank, standing)| {
            let player = state.players.get(standing.id)?;
            Some(RankingLine {
                rank: rank + 1,
                id: standing.id,
                name: standing.name.clone(),
                score: standing.score,
                tiles_owned: player.stats.tiles_owned,
                kills: player.stats.kills,
                deaths: player.stats.deaths,
                suicides: player.stats.suicides,
                blitziums: player.stats.blitziums,
                nemesis: player.stats.nemesis.clone(),
            })
        })
        .collect()
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
