use std::collections::HashMap;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Deserialize};

use crate::error::ConfigError;
use crate::plugins::spouse::data::{RosterEntry, DEFAULT_LIMIT};

pub const DEFAULT_CONFIG: &str = "config/spouse.toml";

// host configuration, read once at startup from a toml file
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
    #[serde(default = "default_roster_ttl")]
    pub roster_ttl_secs: u64,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub logging: LoggingConf,
    pub roster: RosterConf,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LoggingConf {
    pub level: Option<String>,
}

/// Which platform member lists come from.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RosterConf {
    Static {
        #[serde(default)]
        groups: HashMap<String, Vec<RosterEntry>>,
    },
    Onebot {
        endpoint: String,
        #[serde(default)]
        access_token: Option<String>,
    },
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_limit() -> u32 {
    DEFAULT_LIMIT
}
fn default_leaderboard_size() -> usize {
    10
}
fn default_roster_ttl() -> u64 {
    300
}

pub fn conf_from_file<T: DeserializeOwned>(path: &str) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    toml::from_str::<T>(&content).map_err(|source| ConfigError::Toml {
        path: path.to_string(),
        source,
    })
}

/// Splits a chat message into its command word and arguments.
/// A single leading `/` on the command is optional.
pub fn convec(content: &str) -> Option<(&str, Vec<&str>)> {
    let mut words = content.split_whitespace();
    let command = words.next()?;
    let command = command.strip_prefix('/').unwrap_or(command);
    if command.is_empty() {
        return None;
    }
    Some((command, words.collect()))
}
