//! Runtime defaults and the `Config` passed to the daemon and the front-end.
//!
//! The constants document the stock values; `Config` carries the values in
//! effect after command-line overrides.

use std::path::PathBuf;
use std::time::Duration;

/// Location of the SQLite quota store shared by the daemon and the front-end.
pub const DEFAULT_DB_PATH: &str = "/root/port_usage.db";

/// Interval between enforcement cycles of the monitor loop (seconds).
pub const POLL_INTERVAL_SECS: u64 = 2;

/// Number of ports shown per dashboard page.
pub const PAGINATION_LIMIT: usize = 15;

/// systemd unit name used by `install-service`.
pub const SERVICE_NAME: &str = "port_master";

/// Directory systemd loads unit files from.
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// How long a store call waits on a lock held by the other process (milliseconds).
pub const DB_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Packet-filter binary used for counting and drop rules.
pub const IPTABLES_BIN: &str = "iptables";

/// Socket tool used to kill established connections on a blocked port.
pub const SS_BIN: &str = "ss";

/// Effective settings for one process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub poll_interval: Duration,
    pub page_size: usize,
    pub service_name: String,
    pub iptables_bin: String,
    pub ss_bin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            page_size: PAGINATION_LIMIT,
            service_name: SERVICE_NAME.to_string(),
            iptables_bin: IPTABLES_BIN.to_string(),
            ss_bin: SS_BIN.to_string(),
        }
    }
}

impl Config {
    /// Path of the systemd unit file written by `install-service`.
    pub fn unit_path(&self) -> PathBuf {
        PathBuf::from(SYSTEMD_UNIT_DIR).join(format!("{}.service", self.service_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.db_path, PathBuf::from("/root/port_usage.db"));
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.page_size, 15);
        assert_eq!(cfg.service_name, "port_master");
    }

    #[test]
    fn test_unit_path_uses_service_name() {
        let cfg = Config::default();
        assert_eq!(
            cfg.unit_path(),
            PathBuf::from("/etc/systemd/system/port_master.service")
        );
    }

    /// Compile-time sanity: all constants are positive.
    #[test]
    fn test_all_intervals_positive() {
        const _: () = assert!(POLL_INTERVAL_SECS > 0);
        const _: () = assert!(PAGINATION_LIMIT > 0);
        const _: () = assert!(DB_BUSY_TIMEOUT_MS > 0);
    }
}
