use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use blagues_core::EngineSettings;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// JSON file holding the published jokes.
    pub dataset_path: PathBuf,
    /// Shared secret for the `X-Signature-256` HMAC of inbound events.
    pub webhook_secret: String,
    /// Base URL of the chat transport bridge.
    pub transport_url: String,
    pub transport_token: Option<String>,
    pub engine: EngineSettings,
    /// Optional bearer token for /status endpoint authentication.
    /// If not set, /status is disabled (503).
    pub status_auth_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let webhook_secret = lookup("WEBHOOK_SECRET")
            .filter(|s| !s.is_empty())
            .context("WEBHOOK_SECRET environment variable is required")?;

        let transport_url = lookup("TRANSPORT_URL")
            .filter(|s| !s.is_empty())
            .context("TRANSPORT_URL environment variable is required")?;

        let transport_token = parse_optional_secret(lookup("TRANSPORT_TOKEN"));

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = lookup("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let dataset_path = lookup("DATASET_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("blagues.json"));

        let defaults = EngineSettings::default();

        let quorum = match lookup("NEEDED_APPROVALS") {
            Some(value) => value
                .parse::<usize>()
                .context("NEEDED_APPROVALS must be a valid number")?,
            None => defaults.quorum,
        };
        anyhow::ensure!(quorum > 0, "NEEDED_APPROVALS must be at least 1");

        let confirm_window = parse_secs(&lookup, "CONFIRM_TIMEOUT_SECS", defaults.confirm_window)?;
        let identify_window =
            parse_secs(&lookup, "IDENTIFY_TIMEOUT_SECS", defaults.identify_window)?;
        let change_window = parse_secs(&lookup, "CHANGE_TIMEOUT_SECS", defaults.change_window)?;

        let max_identify_attempts = lookup("MAX_IDENTIFY_ATTEMPTS")
            .filter(|s| !s.trim().is_empty())
            .map(|value| {
                value
                    .parse::<u32>()
                    .context("MAX_IDENTIFY_ATTEMPTS must be a valid number")
            })
            .transpose()?;

        let status_auth_token = parse_optional_secret(lookup("STATUS_AUTH_TOKEN"));

        Ok(Config {
            port,
            state_dir,
            dataset_path,
            webhook_secret,
            transport_url,
            transport_token,
            engine: EngineSettings {
                quorum,
                confirm_window,
                identify_window,
                change_window,
                max_identify_attempts,
                ..defaults
            },
            status_auth_token,
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .with_context(|| format!("{} must be a number of seconds", key)),
        None => Ok(default),
    }
}

/// Treat a missing, empty or whitespace-only secret as unset.
///
/// An empty status token must never enable unauthenticated access.
pub fn parse_optional_secret(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
