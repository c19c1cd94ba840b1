use std::time::Duration;

pub const DEFAULT_MAP_SIZE: usize = 25;

pub const SCORE_NEW_CONQUERED: f64 = 1.0;
pub const SCORE_CONQUERED: f64 = 0.02;
pub const SCORE_CONQUERED_PLANET: f64 = 0.5;
pub const SCORE_CAPTURED_BLITZIUM: f64 = 50.0;
pub const SCORE_KILL_PLAYER: f64 = 50.0;

pub const MAX_TICKS_IN_HISTORY: u64 = 10;

pub const MIN_TICKS_FLOOR: u64 = 100;
pub const DEFAULT_MAX_TICKS: u64 = 1000;
pub const MAX_ACTION_ATTEMPTS: usize = 5;

pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_millis(300);
pub const DEFAULT_FIRST_TICK_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_START_DELAY: Duration = Duration::from_secs(120);

pub const DEFAULT_MIN_PLAYERS: usize = 1;
pub const DEFAULT_MAX_PLAYERS: usize = 4;

pub const MAX_NAME_LEN: usize = 32;

/// Number of ticks a match lasts on a map of `map_size`, capped by the
/// configured maximum.
pub fn get_match_ticks(map_size: usize, configured_max: u64) -> u64 {
    let natural = (16 * map_size as u64 + 70).max(MIN_TICKS_FLOOR);
    natural.min(configured_max)
}
