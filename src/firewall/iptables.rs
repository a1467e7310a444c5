//! Linux firewall backend using `iptables` for rules and counters and `ss`
//! for killing live connections.
//!
//! Every rule change is issued via `std::process::Command`. Failures are
//! logged and swallowed; the next monitor cycle retries naturally.

use std::process::{Command, Output};

use crate::config::Config;
use crate::error::AppError;

use super::{parse_counters, FirewallGateway, PortCounters};

/// Upper bound on repeated deletions of one rule (clears duplicates left by
/// installs that did not check for an existing rule).
const MAX_RULE_DELETIONS: usize = 16;

/// Which built-in chain a rule lives in, plus its match/target arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RuleSpec {
    chain: &'static str,
    args: Vec<String>,
}

impl RuleSpec {
    fn inbound(port: u16) -> Self {
        Self {
            chain: "INPUT",
            args: vec!["-p".into(), "tcp".into(), "--dport".into(), port.to_string()],
        }
    }

    fn outbound(port: u16) -> Self {
        Self {
            chain: "OUTPUT",
            args: vec!["-p".into(), "tcp".into(), "--sport".into(), port.to_string()],
        }
    }

    fn drop_inbound(port: u16) -> Self {
        let mut rule = Self::inbound(port);
        rule.args.extend(["-j".to_string(), "DROP".to_string()]);
        rule
    }

    /// Full argument vector for an `iptables` action (`-C`, `-I`, `-D`).
    fn command_args(&self, action: &str) -> Vec<String> {
        let mut args = vec!["-w".to_string(), action.to_string(), self.chain.to_string()];
        args.extend(self.args.iter().cloned());
        args
    }
}

/// `ss -K` filter selecting sockets with `port` on either end.
fn kill_filter_args(port: u16) -> Vec<String> {
    let endpoint = format!(":{port}");
    ["-K", "(", "sport", "=", endpoint.as_str(), "or", "dport", "=", endpoint.as_str(), ")"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Firewall gateway backed by the `iptables` and `ss` binaries.
pub struct IptablesGateway {
    iptables_bin: String,
    ss_bin: String,
}

impl IptablesGateway {
    pub fn new(iptables_bin: impl Into<String>, ss_bin: impl Into<String>) -> Self {
        Self {
            iptables_bin: iptables_bin.into(),
            ss_bin: ss_bin.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.iptables_bin.clone(), config.ss_bin.clone())
    }

    fn run(&self, bin: &str, args: &[String]) -> Result<Output, AppError> {
        Command::new(bin)
            .args(args)
            .output()
            .map_err(|e| AppError::Firewall(format!("failed to run {bin}: {e}")))
    }

    fn rule_exists(&self, rule: &RuleSpec) -> bool {
        matches!(
            self.run(&self.iptables_bin, &rule.command_args("-C")),
            Ok(out) if out.status.success()
        )
    }

    /// Insert `rule` at the top of its chain unless it is already present.
    fn insert_once(&self, rule: &RuleSpec) {
        if self.rule_exists(rule) {
            tracing::debug!("Rule already present in {}: {:?}", rule.chain, rule.args);
            return;
        }
        match self.run(&self.iptables_bin, &rule.command_args("-I")) {
            Ok(out) if out.status.success() => {
                tracing::debug!("Inserted rule in {}: {:?}", rule.chain, rule.args);
            }
            Ok(out) => tracing::warn!(
                "iptables refused rule in {}: {}",
                rule.chain,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => tracing::warn!("{e}"),
        }
    }

    /// Delete every copy of `rule`; "rule not found" simply ends the loop.
    fn delete_all(&self, rule: &RuleSpec) {
        for _ in 0..MAX_RULE_DELETIONS {
            match self.run(&self.iptables_bin, &rule.command_args("-D")) {
                Ok(out) if out.status.success() => continue,
                Ok(_) => return,
                Err(e) => {
                    tracing::debug!("{e}");
                    return;
                }
            }
        }
    }
}

impl FirewallGateway for IptablesGateway {
    fn install_tracking(&self, port: u16) {
        self.insert_once(&RuleSpec::inbound(port));
        self.insert_once(&RuleSpec::outbound(port));
    }

    fn remove_tracking(&self, port: u16) {
        self.delete_all(&RuleSpec::inbound(port));
        self.delete_all(&RuleSpec::outbound(port));
        self.delete_all(&RuleSpec::drop_inbound(port));
        tracing::debug!("Removed firewall rules for port {port}");
    }

    fn try_read_counters(&self, port: u16) -> Result<PortCounters, AppError> {
        let args: Vec<String> = ["-w", "-nvx", "-L"].iter().map(|s| s.to_string()).collect();
        let out = self.run(&self.iptables_bin, &args)?;
        if !out.status.success() {
            return Err(AppError::Firewall(format!(
                "iptables listing failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(parse_counters(&String::from_utf8_lossy(&out.stdout), port))
    }

    fn enforce_block(&self, port: u16) {
        self.insert_once(&RuleSpec::drop_inbound(port));

        match self.run(&self.ss_bin, &kill_filter_args(port)) {
            Ok(out) if out.status.success() => {
                tracing::debug!("Killed live connections on port {port}");
            }
            Ok(out) => tracing::warn!(
                "ss could not kill connections on port {port}: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => tracing::warn!("{e}"),
        }
    }
}
