//! Command line, environment and config file handling for the `oldworld`
//! binary.
//!
//! Each setting is taken from the first source that has it: command line,
//! environment, `{data_dir}/config.toml`, built-in default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::identity::Session;
use crate::sync::DEFAULT_POLL_INTERVAL;

pub const ENV_HOME: &str = "OLDWORLD_HOME";
pub const ENV_IDENTITY: &str = "OLDWORLD_IDENTITY";
pub const ENV_POLL_MS: &str = "OLDWORLD_POLL_MS";

/// Local social store: posts, follows, likes, comments, direct messages and
/// notifications kept in one SQLite file.
#[derive(Parser, Debug)]
#[command(name = "oldworld", version, about)]
pub struct Cli {
    /// Data directory holding the database and config.toml [env: OLDWORLD_HOME] [default: ~/.oldworld]
    #[arg(long, short = 'd', global = true)]
    pub data_dir: Option<PathBuf>,

    /// Act as this identity instead of the logged-in one [env: OLDWORLD_IDENTITY]
    #[arg(long, short = 'i', global = true)]
    pub identity: Option<String>,

    /// Polling interval for `watch`, in milliseconds [env: OLDWORLD_POLL_MS] [default: 2000]
    #[arg(long, global = true)]
    pub poll_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a session for IDENTITY
    Login {
        identity: String,
        /// Opaque credential kept with the session
        #[arg(long, default_value = "")]
        token: String,
    },
    /// Forget the stored session
    Logout,
    /// Print the identity commands act as
    Whoami,
    /// Show or edit a profile
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
    /// Publish a post
    Post {
        body: String,
        #[arg(long)]
        media: Option<String>,
    },
    /// List posts, newest first
    Feed {
        /// Only posts by people you follow, and your own
        #[arg(long)]
        following: bool,
    },
    /// Find people by name or handle
    Search { query: String },
    Follow { identity: String },
    Unfollow { identity: String },
    /// Like a post, or remove your like
    Like { post: String },
    /// Comment on a post
    Comment { post: String, text: String },
    /// List a post's likes and comments
    Comments { post: String },
    /// Send a direct message
    Send { to: String, text: String },
    /// Print the thread with another identity
    Messages { with: String },
    /// People you can message
    Conversations,
    /// List notifications
    Notifications {
        /// Mark everything read after listing
        #[arg(long)]
        mark_read: bool,
    },
    /// Follow notifications or a thread until interrupted
    Watch {
        #[command(subcommand)]
        target: WatchCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProfileCommand {
    /// Set your display name and avatar
    Set {
        name: String,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Show a profile; your own by default
    Show { identity: Option<String> },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Notifications,
    Chat { with: String },
}

/// `{data_dir}/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Identity to act as when none is given and nobody is logged in.
    #[serde(default)]
    pub default_identity: Option<String>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(String),
    Invalid { name: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "io error: {e}"),
            ConfigError::Toml(e) => write!(f, "config error: {e}"),
            ConfigError::Invalid { name, value } => {
                write!(f, "invalid value for {name}: {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Load `{data_dir}/config.toml`, or defaults when it does not exist.
pub fn load_file_config(data_dir: &Path) -> Result<FileConfig, ConfigError> {
    let path = config_path(data_dir);
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(&path)?;
    toml::from_str(&contents).map_err(|e| ConfigError::Toml(e.to_string()))
}

pub fn save_file_config(data_dir: &Path, config: &FileConfig) -> Result<(), ConfigError> {
    fs::create_dir_all(data_dir)?;
    let contents =
        toml::to_string_pretty(config).map_err(|e| ConfigError::Toml(e.to_string()))?;
    fs::write(config_path(data_dir), contents)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Explicit identity from the command line or environment.
    pub identity: Option<String>,
    pub poll_interval: Duration,
    pub file: FileConfig,
}

impl Config {
    pub fn from_cli_and_env(cli: &Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_cli_and_env`] with the environment supplied
    /// by `env`.
    pub fn resolve<E>(cli: &Cli, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| env(ENV_HOME).map(PathBuf::from))
            .unwrap_or_else(|| {
                env("HOME")
                    .map(|h| PathBuf::from(h).join(".oldworld"))
                    .unwrap_or_else(|| PathBuf::from(".oldworld"))
            });
        let file = load_file_config(&data_dir)?;

        let identity = cli
            .identity
            .clone()
            .or_else(|| env(ENV_IDENTITY))
            .filter(|id| !id.trim().is_empty());

        let poll_ms = match cli.poll_ms {
            Some(ms) => Some(ms),
            None => match env(ENV_POLL_MS) {
                Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                    ConfigError::Invalid {
                        name: ENV_POLL_MS.to_string(),
                        value: raw.clone(),
                    }
                })?),
                None => file.poll_interval_ms,
            },
        };
        let poll_interval = match poll_ms {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "poll interval".to_string(),
                    value: "0".to_string(),
                })
            }
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            data_dir,
            identity,
            poll_interval,
            file,
        })
    }

    /// The identity commands act as: explicit selection, then the stored
    /// session, then the config file default.
    pub fn active_identity(&self, session: Option<&Session>) -> Option<String> {
        self.identity
            .clone()
            .or_else(|| session.map(|s| s.identity.clone()))
            .or_else(|| self.file.default_identity.clone())
            .filter(|id| !id.trim().is_empty())
    }
}
