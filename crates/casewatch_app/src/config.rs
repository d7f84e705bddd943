//! `casewatch.ron` loading and resolution against CLI flags and environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use casewatch_engine::{
    ClientSettings, ListSettings, ObserverSettings, API_URL_ENV, DEFAULT_API_URL,
};
use casewatch_logging::LogDestination;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = "casewatch.ron";
pub const TOKEN_ENV: &str = "CASEWATCH_TOKEN";

/// Where log output goes; mirrors [`LogDestination`] for the config file and CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    File,
    #[default]
    Terminal,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => LogDestination::File,
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

/// Contents of `casewatch.ron`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub case_poll_secs: u64,
    pub list_poll_secs: u64,
    pub handshake_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub log: LogTarget,
    pub log_file: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        let client = ClientSettings::default();
        let observer = ObserverSettings::default();
        Self {
            base_url: None,
            token: None,
            case_poll_secs: observer.reconciler.poll_interval.as_secs(),
            list_poll_secs: ListSettings::default().poll_interval.as_secs(),
            handshake_timeout_secs: observer.live.handshake_timeout.as_secs(),
            request_timeout_secs: client.request_timeout.as_secs(),
            log: LogTarget::default(),
            log_file: PathBuf::from("casewatch.log"),
        }
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub case_poll_secs: Option<u64>,
    pub list_poll_secs: Option<u64>,
    pub log: Option<LogTarget>,
}

/// Process environment consulted after the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

impl Environment {
    pub fn from_process() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            base_url: read(API_URL_ENV),
            token: read(TOKEN_ENV),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client: ClientSettings,
    pub token: Option<String>,
    pub observer: ObserverSettings,
    pub list: ListSettings,
    pub log: LogDestination,
    pub log_file: PathBuf,
    /// Config file the values came from; `None` when only defaults applied.
    pub source: Option<PathBuf>,
}

/// Reads `path`. A missing file is not an error and yields `None`.
///
/// Runs before the logger exists, so it reports through its return value only.
pub fn load_file(path: &Path) -> Result<Option<FileConfig>> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config {}", path.display()))
        }
    };
    let config = ron::from_str(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(Some(config))
}

/// [`load_file`] followed by [`resolve`], remembering where the file was.
pub fn load(path: &Path, overrides: &Overrides, env: Environment) -> Result<AppConfig> {
    let file = load_file(path)?;
    let source = file.as_ref().map(|_| path.to_path_buf());
    let mut config = resolve(file.unwrap_or_default(), overrides, env)?;
    config.source = source;
    Ok(config)
}

/// Precedence: CLI flag, then config file, then environment, then defaults.
pub fn resolve(file: FileConfig, overrides: &Overrides, env: Environment) -> Result<AppConfig> {
    let case_poll_secs = overrides.case_poll_secs.unwrap_or(file.case_poll_secs);
    let list_poll_secs = overrides.list_poll_secs.unwrap_or(file.list_poll_secs);
    for (name, secs) in [
        ("case poll interval", case_poll_secs),
        ("list poll interval", list_poll_secs),
        ("handshake timeout", file.handshake_timeout_secs),
        ("request timeout", file.request_timeout_secs),
    ] {
        if secs == 0 {
            bail!("{name} must be at least one second");
        }
    }

    let base_url = overrides
        .base_url
        .clone()
        .or(file.base_url)
        .or(env.base_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let token = overrides.token.clone().or(file.token).or(env.token);

    let mut client = ClientSettings {
        base_url,
        ..ClientSettings::default()
    };
    client.request_timeout = Duration::from_secs(file.request_timeout_secs);

    let mut observer = ObserverSettings::default();
    observer.reconciler.poll_interval = Duration::from_secs(case_poll_secs);
    observer.live.handshake_timeout = Duration::from_secs(file.handshake_timeout_secs);

    Ok(AppConfig {
        client,
        token,
        observer,
        list: ListSettings {
            poll_interval: Duration::from_secs(list_poll_secs),
        },
        log: overrides.log.unwrap_or(file.log).into(),
        log_file: file.log_file,
        source: None,
    })
}
