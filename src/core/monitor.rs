//! The enforcement daemon.
//!
//! Every polling period the monitor reads all unblocked ports, refreshes their
//! counters from the firewall, persists them and blocks any port whose quota is
//! used up. Work is strictly sequential: one cycle at a time, one port at a
//! time. Failures are contained per port and per cycle; the loop itself only
//! stops when the process is asked to terminate.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::core::quota::{elapsed_minutes, should_block};
use crate::db::{self, Database, MonitoredPort};
use crate::error::AppError;
use crate::firewall::{FirewallGateway, PortCounters};

/// Result of evaluating one port during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortOutcome {
    pub port: u16,
    /// Counters the decision was based on.
    pub counters: PortCounters,
    /// False when the firewall query failed and the stored counters were used.
    pub counters_fresh: bool,
    /// True when this cycle blocked the port.
    pub blocked: bool,
}

/// Summary of one enforcement cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub checked: usize,
    pub blocked: usize,
    pub stale: usize,
    pub failed: usize,
}

pub struct MonitorLoop {
    db: Arc<Database>,
    firewall: Arc<dyn FirewallGateway>,
    poll_interval: Duration,
}

impl MonitorLoop {
    pub fn new(
        db: Arc<Database>,
        firewall: Arc<dyn FirewallGateway>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db,
            firewall,
            poll_interval,
        }
    }

    /// Run until Ctrl-C or SIGTERM.
    pub async fn run(&self) {
        self.run_until(shutdown_signal()).await;
    }

    /// Run cycles until `shutdown` completes.
    ///
    /// Firewall rules installed so far stay in place after the loop ends.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        tracing::info!(
            "Monitor started (poll interval {:?})",
            self.poll_interval
        );

        let mut schema_ready = false;
        loop {
            if !schema_ready {
                match self.db.ensure_schema() {
                    Ok(()) => schema_ready = true,
                    Err(e) => tracing::warn!("Quota store unavailable: {e:#}"),
                }
            }

            if schema_ready {
                match self.run_cycle() {
                    Ok(report) if report.blocked > 0 || report.failed > 0 => {
                        tracing::info!(
                            "Cycle: {} checked, {} blocked, {} stale, {} failed",
                            report.checked,
                            report.blocked,
                            report.stale,
                            report.failed
                        );
                    }
                    Ok(report) => tracing::debug!("Cycle: {report:?}"),
                    Err(e) => tracing::warn!("Cycle aborted: {e}"),
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("Monitor stopping; firewall rules left in place");
                    break;
                }
            }
        }
    }

    /// Run one enforcement cycle at the current wall-clock time.
    pub fn run_cycle(&self) -> Result<CycleReport, AppError> {
        self.run_cycle_at(db::chrono_timestamp())
    }

    /// Run one enforcement cycle as if the time were `now` (Unix seconds).
    ///
    /// Fails only when the store cannot be listed. A malformed record or a
    /// failing port is logged, counted and skipped.
    pub fn run_cycle_at(&self, now: i64) -> Result<CycleReport, AppError> {
        let scanned = self.db.scan_unblocked()?;
        let mut report = CycleReport::default();

        for entry in &scanned {
            report.checked += 1;
            let port = match entry {
                Ok(port) => port,
                Err(bad) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Unreadable record for port {} skipped: {}",
                        bad.port.map_or_else(|| "?".to_string(), |p| p.to_string()),
                        bad.reason
                    );
                    continue;
                }
            };
            match self.evaluate_port(port, now) {
                Ok(outcome) => {
                    if outcome.blocked {
                        report.blocked += 1;
                    }
                    if !outcome.counters_fresh {
                        report.stale += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Port {} skipped this cycle: {e}", port.port);
                }
            }
        }

        Ok(report)
    }

    /// Refresh, persist and enforce the quota of a single port.
    pub fn evaluate_port(&self, port: &MonitoredPort, now: i64) -> Result<PortOutcome, AppError> {
        let (counters, counters_fresh) = match self.firewall.try_read_counters(port.port) {
            Ok(counters) => {
                self.db
                    .update_usage(port.port, counters.rx_bytes, counters.tx_bytes)?;
                (counters, true)
            }
            Err(e) => {
                // Keep the last stored values; the time limit still applies.
                tracing::debug!("Counters for port {} unavailable: {e}", port.port);
                let stored = PortCounters {
                    rx_bytes: port.total_rx,
                    tx_bytes: port.total_tx,
                };
                (stored, false)
            }
        };

        let elapsed = elapsed_minutes(port.added_at, now);
        let blocked = should_block(
            elapsed,
            port.time_limit_min,
            counters.total(),
            port.data_limit_mb,
        );

        if blocked {
            self.firewall.enforce_block(port.port);
            self.db.mark_blocked(port.port)?;
            tracing::info!(
                "Port {} blocked after {:.1} min and {} bytes (limits: {:?} min / {:?} MB)",
                port.port,
                elapsed,
                counters.total(),
                port.time_limit_min,
                port.data_limit_mb
            );
        }

        Ok(PortOutcome {
            port: port.port,
            counters,
            counters_fresh,
            blocked,
        })
    }
}

/// Completes on Ctrl-C or, on Unix, SIGTERM from the service manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl-C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
