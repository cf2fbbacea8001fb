//! Application-level configuration loading, including sweep and timer tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WORD_RALLY_BACK_CONFIG_PATH";

/// Target scores the host may choose from.
pub const ALLOWED_TARGET_SCORES: [i64; 3] = [100, 250, 500];
/// Target score applied when the host never picks one.
pub const DEFAULT_TARGET_SCORE: i64 = 100;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How often the cleanup sweep runs.
    pub sweep_interval: Duration,
    /// Inactivity threshold for lobby and finished rooms.
    pub lobby_inactivity: Duration,
    /// Inactivity threshold for rooms with a game in progress.
    pub playing_inactivity: Duration,
    /// Inactivity point at which a one-time warning is broadcast.
    pub warning_after: Duration,
    /// Countdown announced in the inactivity warning, in seconds.
    pub warning_countdown_secs: u64,
    /// Silence after which a lobby player is considered a ghost.
    pub heartbeat_timeout: Duration,
    /// Length of a cooperative challenge countdown, in seconds.
    pub challenge_countdown_secs: i64,
    /// Delay before the first cooperative challenge after game start.
    pub first_challenge_delay: Duration,
    /// Delay between a turn resolution and the next challenge.
    pub next_challenge_delay: Duration,
    /// Length of the shared practice session timer, in seconds.
    pub practice_duration_secs: i64,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration from file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Clamp a requested target score onto the allowed set, falling back to
    /// the default for anything else (including no request at all).
    pub fn normalize_target_score(requested: Option<i64>) -> i64 {
        match requested {
            Some(value) if ALLOWED_TARGET_SCORES.contains(&value) => value,
            _ => DEFAULT_TARGET_SCORE,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            lobby_inactivity: Duration::from_secs(120),
            playing_inactivity: Duration::from_secs(300),
            warning_after: Duration::from_secs(90),
            warning_countdown_secs: 30,
            heartbeat_timeout: Duration::from_secs(90),
            challenge_countdown_secs: 10,
            first_challenge_delay: Duration::from_secs(2),
            next_challenge_delay: Duration::from_secs(3),
            practice_duration_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file; every field is optional.
struct RawConfig {
    sweep_interval_secs: Option<u64>,
    lobby_inactivity_secs: Option<u64>,
    playing_inactivity_secs: Option<u64>,
    warning_after_secs: Option<u64>,
    warning_countdown_secs: Option<u64>,
    heartbeat_timeout_secs: Option<u64>,
    challenge_countdown_secs: Option<i64>,
    first_challenge_delay_secs: Option<u64>,
    next_challenge_delay_secs: Option<u64>,
    practice_duration_secs: Option<i64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };
        Self {
            sweep_interval: secs(raw.sweep_interval_secs, defaults.sweep_interval),
            lobby_inactivity: secs(raw.lobby_inactivity_secs, defaults.lobby_inactivity),
            playing_inactivity: secs(raw.playing_inactivity_secs, defaults.playing_inactivity),
            warning_after: secs(raw.warning_after_secs, defaults.warning_after),
            warning_countdown_secs: raw
                .warning_countdown_secs
                .unwrap_or(defaults.warning_countdown_secs),
            heartbeat_timeout: secs(raw.heartbeat_timeout_secs, defaults.heartbeat_timeout),
            challenge_countdown_secs: raw
                .challenge_countdown_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.challenge_countdown_secs),
            first_challenge_delay: secs(
                raw.first_challenge_delay_secs,
                defaults.first_challenge_delay,
            ),
            next_challenge_delay: secs(raw.next_challenge_delay_secs, defaults.next_challenge_delay),
            practice_duration_secs: raw
                .practice_duration_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.practice_duration_secs),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
