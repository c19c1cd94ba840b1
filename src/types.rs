use serde::Serialize;

use crate::engine::GameState;
use crate::game_map::{GameMap, TileKind};
use crate::geometry::{Direction, Position};
use crate::player_state::{HistoryItem, PlayerState, PlayerStats};

/// Marker used in the map view for owned empty space.
const CONQUERED_SYMBOL: char = 'C';

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub id: usize,
    pub name: String,
    pub active: bool,
    pub killed: bool,
    pub position: Position,
    pub spawn_position: Position,
    pub direction: Direction,
    pub spawn_direction: Direction,
    pub tail: Vec<Position>,
    pub score: f64,
    pub stats: PlayerStats,
    pub history: Vec<HistoryItem>,
}

impl PlayerView {
    pub fn from_player(player: &PlayerState, with_history: bool) -> Self {
        let history = if with_history {
            player.history.iter().cloned().collect()
        } else {
            Vec::new()
        };
        Self {
            id: player.id,
            name: player.name.clone(),
            active: player.active,
            killed: player.killed,
            position: player.position,
            spawn_position: player.spawn_position,
            direction: player.direction,
            spawn_direction: player.spawn_direction,
            tail: player.trail.clone(),
            score: player.score,
            stats: player.stats.clone(),
            history,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct GameView {
    pub map: Vec<Vec<String>>,
    /// Id of the receiving player, `-1` for viewers and recorders.
    pub player_id: i64,
    pub tick: u64,
    pub ticks_left: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TickPayload {
    pub game: GameView,
    pub players: Vec<PlayerView>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Tick(TickPayload),
    Winner { tick: u64, winner: PlayerView },
}

pub fn map_view(game_map: &GameMap) -> Vec<Vec<String>> {
    game_map
        .rows()
        .map(|row| {
            row.iter()
                .map(|tile| match tile.owner {
                    None => tile.kind.symbol().to_string(),
                    Some(owner) if tile.kind == TileKind::Empty => {
                        format!("{CONQUERED_SYMBOL}-{owner}")
                    }
                    Some(owner) => format!("{}-{owner}", tile.kind.symbol()),
                })
                .collect()
        })
        .collect()
}

pub fn tick_payload(
    state: &GameState,
    tick: u64,
    ticks_left: u64,
    player_id: Option<usize>,
    with_history: bool,
) -> TickPayload {
    TickPayload {
        game: GameView {
            map: map_view(&state.game_map),
            player_id: player_id.map_or(-1, |id| id as i64),
            tick,
            ticks_left,
        },
        players: state
            .players
            .iter()
            .map(|player| PlayerView::from_player(player, with_history))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_config::GameConfig;
    use serde_json::json;

    fn two_player_state() -> GameState {
        let config: GameConfig = "WWWWW\nW 1%W\nW $ W\nW! 2W\nWWWWW".parse().unwrap();
        let mut state = GameState::new(config, 3);
        state.add_player("alice").unwrap();
        state.add_player("bob").unwrap();
        state.game_map.conquer_tile(Position::new(3, 1), 1).unwrap();
        state
    }

    #[test]
    fn map_view_marks_owned_tiles_with_owner_id() {
        let state = two_player_state();
        let map = map_view(&state.game_map);

        assert_eq!(map.len(), 5);
        assert_eq!(map[0][0], "W");
        assert_eq!(map[1][1], " ");
        assert_eq!(map[1][2], "C-0");
        assert_eq!(map[1][3], "%-1");
        assert_eq!(map[2][2], "$");
        assert_eq!(map[3][1], "!");
        assert_eq!(map[3][3], "C-1");
    }

    #[test]
    fn tick_message_is_tagged_and_hides_history_when_asked() {
        let mut state = two_player_state();
        state.players[0].add_history(1, "hello");

        let payload = tick_payload(&state, 1, 9, None, false);
        let value = serde_json::to_value(ServerMessage::Tick(payload)).unwrap();

        assert_eq!(value["type"], "tick");
        assert_eq!(value["game"]["player_id"], -1);
        assert_eq!(value["game"]["tick"], 1);
        assert_eq!(value["game"]["ticks_left"], 9);
        assert_eq!(value["players"][0]["name"], "alice");
        assert_eq!(value["players"][0]["position"], json!({"x": 2, "y": 1}));
        assert_eq!(value["players"][0]["tail"], json!([{"x": 2, "y": 1}]));
        assert_eq!(value["players"][0]["history"], json!([]));

        let payload = tick_payload(&state, 1, 9, Some(0), true);
        assert_eq!(payload.game.player_id, 0);
        assert_eq!(payload.players[0].history.len(), 1);
    }

    #[test]
    fn history_items_serialize_with_timestamp() {
        let mut state = two_player_state();
        state.players[0].add_history(3, "Respawned.");

        let payload = tick_payload(&state, 3, 7, Some(0), true);
        let value = serde_json::to_value(ServerMessage::Tick(payload)).unwrap();

        let item = &value["players"][0]["history"][0];
        assert_eq!(item["tick"], 3);
        assert_eq!(item["message"], "Respawned.");
        let timestamp = item["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn winner_message_carries_player_view() {
        let state = two_player_state();
        let message = ServerMessage::Winner {
            tick: 42,
            winner: PlayerView::from_player(&state.players[1], true),
        };
        let value = serde_json::to_value(message).unwrap();

        assert_eq!(value["type"], "winner");
        assert_eq!(value["tick"], 42);
        assert_eq!(value["winner"]["id"], 1);
        assert_eq!(value["winner"]["direction"], "LEFT");
        assert_eq!(value["winner"]["stats"]["number_of_kills"], 0);
    }
}
