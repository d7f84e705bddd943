use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::config::{LogTarget, Overrides, CONFIG_FILENAME};

#[derive(Parser, Debug)]
#[command(
    name = "casewatch",
    about = "Follow case processing status from the terminal",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to read
    #[arg(long, global = true, default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Backend API base URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Bearer token for the status API
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Where to write log output
    #[arg(long, global = true, value_enum)]
    pub log: Option<LogTarget>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Follow one or more cases until they complete or fail
    Watch {
        /// Case IDs to follow
        #[arg(required = true)]
        case_ids: Vec<String>,

        /// Seconds between status polls
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Show the status summary of every case
    List {
        /// Seconds between list refreshes
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Print one summary and exit
        #[arg(long)]
        once: bool,
    },
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        let (case_poll_secs, list_poll_secs) = match &self.command {
            Command::Watch { poll_interval, .. } => (*poll_interval, None),
            Command::List { poll_interval, .. } => (None, *poll_interval),
        };
        Overrides {
            base_url: self.api_url.clone(),
            token: self.token.clone(),
            case_poll_secs,
            list_poll_secs,
            log: self.log,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
