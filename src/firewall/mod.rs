//! Firewall access: counting rules, drop rules and counter readout.
//!
//! The monitor only depends on the [`FirewallGateway`] trait. The production
//! implementation, [`IptablesGateway`], shells out to `iptables` and `ss` and
//! scrapes the rule listing with [`parse_counters`].

pub mod iptables;

pub use iptables::IptablesGateway;

use serde::Serialize;

use crate::error::AppError;

/// Cumulative byte counters the firewall reports for one port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PortCounters {
    /// Bytes received on the port (inbound, destination port match).
    pub rx_bytes: u64,
    /// Bytes sent from the port (outbound, source port match).
    pub tx_bytes: u64,
}

impl PortCounters {
    pub fn total(&self) -> u64 {
        self.rx_bytes.saturating_add(self.tx_bytes)
    }
}

/// Rule management and counter queries for monitored ports.
///
/// Rule changes are best-effort: implementations log tool failures and
/// return normally, so a missing or misbehaving firewall never fails the
/// caller. Counter queries report failures so the monitor can tell a real
/// zero from a failed read.
pub trait FirewallGateway: Send + Sync {
    /// Install the counting rules for inbound and outbound traffic on `port`.
    fn install_tracking(&self, port: u16);

    /// Remove the counting rules and any drop rule for `port`.
    fn remove_tracking(&self, port: u16);

    /// Read the cumulative counters for `port`.
    fn try_read_counters(&self, port: u16) -> Result<PortCounters, AppError>;

    /// Drop new inbound traffic to `port` and kill its live connections.
    fn enforce_block(&self, port: u16);

    /// Read the counters, reporting `(0, 0)` when the query fails. For
    /// callers that only log usage; enforcement needs [`Self::try_read_counters`].
    fn read_counters(&self, port: u16) -> PortCounters {
        self.try_read_counters(port).unwrap_or_else(|e| {
            tracing::debug!("Counter query for port {port} failed: {e}");
            PortCounters::default()
        })
    }
}

/// Extract the counters of `port`'s tracking rules from `iptables -nvx -L` output.
///
/// Tracking rules are the ones without a jump target, so the protocol sits
/// in the third column. Port tokens must match exactly: `dpt:80` is not
/// `dpt:8080`. Directions without a rule report 0. When a rule was installed
/// more than once every copy counts the same packets, so the largest value wins.
pub fn parse_counters(listing: &str, port: u16) -> PortCounters {
    let dpt = format!("dpt:{port}");
    let spt = format!("spt:{port}");
    let mut counters = PortCounters::default();

    for line in listing.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            continue;
        }
        // Header and chain lines have no numeric counter columns.
        let (Ok(_pkts), Ok(bytes)) = (tokens[0].parse::<u64>(), tokens[1].parse::<u64>()) else {
            continue;
        };
        if !matches!(tokens[2], "tcp" | "6") {
            continue;
        }

        if tokens.iter().any(|t| *t == dpt) {
            counters.rx_bytes = counters.rx_bytes.max(bytes);
        } else if tokens.iter().any(|t| *t == spt) {
            counters.tx_bytes = counters.tx_bytes.max(bytes);
        }
    }

    counters
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Deterministic firewall double that records every call.
    #[derive(Default)]
    pub struct ScriptedFirewall {
        counters: Mutex<HashMap<u16, PortCounters>>,
        failing: Mutex<bool>,
        pub installed: Mutex<Vec<u16>>,
        pub removed: Mutex<Vec<u16>>,
        pub blocked: Mutex<Vec<u16>>,
    }

    impl ScriptedFirewall {
        pub fn set_counters(&self, port: u16, rx_bytes: u64, tx_bytes: u64) {
            self.counters
                .lock()
                .unwrap()
                .insert(port, PortCounters { rx_bytes, tx_bytes });
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        pub fn blocked_ports(&self) -> Vec<u16> {
            self.blocked.lock().unwrap().clone()
        }
    }

    impl FirewallGateway for ScriptedFirewall {
        fn install_tracking(&self, port: u16) {
            self.installed.lock().unwrap().push(port);
        }

        fn remove_tracking(&self, port: u16) {
            self.removed.lock().unwrap().push(port);
        }

        fn try_read_counters(&self, port: u16) -> Result<PortCounters, AppError> {
            if *self.failing.lock().unwrap() {
                return Err(AppError::Firewall("iptables: resource temporarily unavailable".into()));
            }
            Ok(self
                .counters
                .lock()
                .unwrap()
                .get(&port)
                .copied()
                .unwrap_or_default())
        }

        fn enforce_block(&self, port: u16) {
            self.blocked.lock().unwrap().push(port);
        }
    }

    const LISTING: &str = "\
Chain INPUT (policy ACCEPT 1024 packets, 88012 bytes)
    pkts      bytes target     prot opt in     out     source               destination
       3      180 DROP       tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:9090
     152    10234            tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:8080
      41     2460            tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:80
      12      720            tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:9090

Chain FORWARD (policy ACCEPT 0 packets, 0 bytes)
    pkts      bytes target     prot opt in     out     source               destination

Chain OUTPUT (policy ACCEPT 998 packets, 120044 bytes)
    pkts      bytes target     prot opt in     out     source               destination
     140   208812            tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp spt:8080
      39    51002            tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp spt:80
";

    #[test]
    fn test_parse_counters_reads_both_directions() {
        let c = parse_counters(LISTING, 8080);
        assert_eq!(c.rx_bytes, 10_234);
        assert_eq!(c.tx_bytes, 208_812);
        assert_eq!(c.total(), 219_046);
    }

    #[test]
    fn test_parse_counters_matches_port_token_exactly() {
        // "dpt:80" must not pick up the dpt:8080 rule.
        let c = parse_counters(LISTING, 80);
        assert_eq!(c.rx_bytes, 2_460);
        assert_eq!(c.tx_bytes, 51_002);
    }

    #[test]
    fn test_parse_counters_ignores_drop_rule() {
        let c = parse_counters(LISTING, 9090);
        assert_eq!(c.rx_bytes, 720);
        assert_eq!(c.tx_bytes, 0);
    }

    #[test]
    fn test_parse_counters_unknown_port_is_zero() {
        assert_eq!(parse_counters(LISTING, 22), PortCounters::default());
    }

    #[test]
    fn test_parse_counters_garbage_is_zero() {
        assert_eq!(parse_counters("", 8080), PortCounters::default());
        assert_eq!(
            parse_counters("iptables v1.8.7 (legacy): can't initialize iptables table", 8080),
            PortCounters::default()
        );
    }

    #[test]
    fn test_parse_counters_numeric_protocol_column() {
        let listing = "    77     4620            6    --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:443\n";
        assert_eq!(parse_counters(listing, 443).rx_bytes, 4_620);
    }

    #[test]
    fn test_parse_counters_duplicate_rules_take_max() {
        let listing = "\
     10     1000            tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:3000
      4      400            tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:3000
";
        assert_eq!(parse_counters(listing, 3000).rx_bytes, 1_000);
    }

    #[test]
    fn test_read_counters_defaults_to_zero_on_failure() {
        let fw = ScriptedFirewall::default();
        fw.set_counters(8080, 5, 6);
        fw.set_failing(true);
        assert_eq!(fw.read_counters(8080), PortCounters::default());

        fw.set_failing(false);
        assert_eq!(
            fw.read_counters(8080),
            PortCounters {
                rx_bytes: 5,
                tx_bytes: 6
            }
        );
    }
}
