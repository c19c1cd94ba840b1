pub mod collaborators;
pub mod constants;
pub mod engine;
pub mod error;
pub mod game;
pub mod game_config;
pub mod game_map;
pub mod geometry;
pub mod lobby;
pub mod player_state;
pub mod protocol;
pub mod random_player;
pub mod recorder;
pub mod rng;
pub mod server_utils;
pub mod socket;
pub mod types;
