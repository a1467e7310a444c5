//! Pure front-end operations shared by the menu and the scripted subcommands.
//!
//! These functions take plain parameters (store, firewall, clock) and can be
//! unit-tested without a terminal.

use serde::Serialize;

use crate::db::{Database, MonitoredPort};
use crate::error::AppError;
use crate::firewall::FirewallGateway;

/// Register `port` for monitoring, resetting any previous usage.
///
/// Limits of 0 mean "unlimited". Tracking rules are installed before the row
/// is written so the first daemon cycle already sees counters.
pub fn register_port(
    db: &Database,
    firewall: &dyn FirewallGateway,
    port: u16,
    time_limit_min: Option<u64>,
    data_limit_mb: Option<u64>,
    now: i64,
) -> Result<MonitoredPort, AppError> {
    if port == 0 {
        return Err(AppError::InvalidInput(
            "Port must be between 1 and 65535".into(),
        ));
    }
    let time_limit_min = time_limit_min.filter(|&m| m > 0);
    let data_limit_mb = data_limit_mb.filter(|&mb| mb > 0);

    db.ensure_schema()?;
    firewall.install_tracking(port);
    db.upsert_port(port, now, time_limit_min, data_limit_mb)?;
    tracing::info!(
        "Port {port} registered (limits: {} / {})",
        format_time_limit(time_limit_min),
        format_data_limit(data_limit_mb)
    );

    Ok(MonitoredPort {
        port,
        added_at: now,
        time_limit_min,
        data_limit_mb,
        total_rx: 0,
        total_tx: 0,
        is_blocked: false,
    })
}

/// Stop monitoring `port` and clear its firewall rules.
///
/// Returns `false` (and leaves the firewall alone) when the port was not
/// registered.
pub fn remove_port(
    db: &Database,
    firewall: &dyn FirewallGateway,
    port: u16,
) -> Result<bool, AppError> {
    db.ensure_schema()?;
    if db.get_port(port)?.is_none() {
        return Ok(false);
    }
    // Last look at the counters before the rules and the row disappear.
    let last = firewall.read_counters(port);
    firewall.remove_tracking(port);
    db.delete_port(port)?;
    tracing::info!(
        "Port {port} removed and firewall rules cleared ({} bytes in, {} bytes out)",
        last.rx_bytes,
        last.tx_bytes
    );
    Ok(true)
}

/// Parse a port typed by the operator.
pub fn parse_port(input: &str) -> Result<u16, AppError> {
    match input.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(AppError::InvalidInput(format!(
            "'{}' is not a valid port (1-65535)",
            input.trim()
        ))),
    }
}

/// Parse a limit typed by the operator: empty or `0` means unlimited.
pub fn parse_limit(input: &str) -> Result<Option<u64>, AppError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    match input.parse::<u64>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(AppError::InvalidInput(format!(
            "'{input}' is not a valid limit (whole number, 0 for none)"
        ))),
    }
}

/// Display-ready view of one monitored port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub port: u16,
    pub blocked: bool,
    pub active_time: String,
    pub usage: String,
    pub limits: String,
}

/// Render rows for display, ordered by port number.
pub fn build_status_rows(ports: &[MonitoredPort], now: i64) -> Vec<StatusRow> {
    let mut sorted: Vec<&MonitoredPort> = ports.iter().collect();
    sorted.sort_by_key(|p| p.port);

    sorted
        .into_iter()
        .map(|p| StatusRow {
            port: p.port,
            blocked: p.is_blocked,
            active_time: format_uptime(now.saturating_sub(p.added_at)),
            usage: format_bytes(p.total_bytes()),
            limits: format!(
                "{} / {}",
                format_time_limit(p.time_limit_min),
                format_data_limit(p.data_limit_mb)
            ),
        })
        .collect()
}

/// Format a byte count with binary units and two decimals.
pub fn format_bytes(bytes: u64) -> String {
    const LABELS: [&str; 5] = ["", "K", "M", "G", "T"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size > 1024.0 && unit < LABELS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}B", LABELS[unit])
}

/// Format an age in seconds as `H:MM:SS`, prefixed with days past 24 hours.
pub fn format_uptime(secs: i64) -> String {
    let secs = secs.max(0);
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let clock = format!("{}:{:02}:{:02}", rem / 3_600, (rem % 3_600) / 60, rem % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

pub fn format_time_limit(limit: Option<u64>) -> String {
    limit.map_or_else(|| "∞".to_string(), |m| format!("{m}m"))
}

pub fn format_data_limit(limit: Option<u64>) -> String {
    limit.map_or_else(|| "∞".to_string(), |mb| format!("{mb}MB"))
}

/// Page cursor over a list of rows; moving past either end wraps around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    page_size: usize,
    current: usize,
}

impl Pager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            current: 0,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }

    /// Rows on the current page. Pulls the cursor back if rows disappeared.
    pub fn page<'a, T>(&mut self, rows: &'a [T]) -> &'a [T] {
        let pages = self.page_count(rows.len());
        if self.current >= pages {
            self.current = pages.saturating_sub(1);
        }
        let start = (self.current * self.page_size).min(rows.len());
        let end = (start + self.page_size).min(rows.len());
        &rows[start..end]
    }

    pub fn next(&mut self, total: usize) {
        let pages = self.page_count(total);
        if pages > 0 {
            self.current = (self.current + 1) % pages;
        }
    }

    pub fn previous(&mut self, total: usize) {
        let pages = self.page_count(total);
        if pages > 0 {
            self.current = (self.current + pages - 1) % pages;
        }
    }
}
