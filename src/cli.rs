//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{self, Config};

#[derive(Parser, Debug)]
#[command(name = "portquota", version)]
#[command(about = "Per-port time and data quotas enforced through the firewall", long_about = None)]
pub struct Cli {
    /// SQLite quota store shared by the daemon and the front-end
    #[arg(long, global = true, env = "PORTQUOTA_DB", default_value = config::DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Seconds between enforcement cycles
    #[arg(
        long,
        global = true,
        env = "PORTQUOTA_INTERVAL",
        default_value_t = config::POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Ports per dashboard page
    #[arg(
        long,
        global = true,
        default_value_t = config::PAGINATION_LIMIT,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub page_size: usize,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the enforcement loop (used by the systemd unit)
    Daemon,

    /// Open the interactive menu (default)
    Interactive,

    /// Start monitoring a port; re-adding resets its usage
    Add {
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
        /// Minutes until the port is blocked (0 for none)
        #[arg(long)]
        time_limit: Option<u64>,
        /// Megabytes until the port is blocked (0 for none)
        #[arg(long)]
        data_limit: Option<u64>,
    },

    /// Stop monitoring a port and remove its firewall rules
    Delete {
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
    },

    /// Print every monitored port
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Install and start the systemd service for the daemon
    InstallService,
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            db_path: self.db.clone(),
            poll_interval: Duration::from_secs(self.interval),
            page_size: self.page_size,
            ..Config::default()
        }
    }

    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Interactive)
    }
}
