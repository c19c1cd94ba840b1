use std::collections::HashMap;

use crate::constants::MAX_NAME_LEN;

pub const DEFAULT_PLAYER_NAME: &str = "Player";

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return DEFAULT_PLAYER_NAME.to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

/// Parses the `{"token": "Team name"}` object handed to the server.
pub fn parse_team_tokens(raw: &str) -> Result<HashMap<String, String>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Name a registering player plays under. With team tokens configured only
/// a known token is accepted and the free-form name is ignored.
pub fn resolve_player_name(
    name: Option<&str>,
    token: Option<&str>,
    team_names_by_token: Option<&HashMap<String, String>>,
) -> Option<String> {
    match team_names_by_token {
        Some(teams) => token
            .and_then(|token| teams.get(token))
            .map(|team| sanitize_name(team)),
        None => Some(sanitize_name(name.unwrap_or_default())),
    }
}

/// Lobby gate size: every team must show up when tokens are in use.
pub fn effective_min_players(
    min_players: usize,
    team_names_by_token: Option<&HashMap<String, String>>,
) -> usize {
    team_names_by_token.map_or(min_players, |teams| teams.len())
}
