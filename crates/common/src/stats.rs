// Transfer counter parsing for `wg show` output

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::types::TransferStats;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

fn transfer_pattern() -> &'static Regex {
    static RE_TRANSFER: OnceLock<Regex> = OnceLock::new();
    RE_TRANSFER.get_or_init(|| {
        Regex::new(
            r"(?i)transfer:\s*(\d+(?:\.\d+)?)\s*(B|KiB|MiB|GiB)\s+received,\s*(\d+(?:\.\d+)?)\s*(B|KiB|MiB|GiB)\s+sent",
        )
        .unwrap()
    })
}

/// Extract received/sent byte counters from tunnel status text.
///
/// Only the first `transfer:` line is used. Text without one yields zero
/// counters; a tunnel that has not moved traffic yet prints no such line.
pub fn parse_transfer(raw: &str) -> TransferStats {
    let Some(caps) = transfer_pattern().captures(raw) else {
        return TransferStats::default();
    };

    TransferStats::new(
        to_bytes(&caps[1], &caps[2]),
        to_bytes(&caps[3], &caps[4]),
    )
}

fn to_bytes(magnitude: &str, unit: &str) -> u64 {
    let value: f64 = magnitude.parse().unwrap_or(0.0);
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "kib" => KIB,
        "mib" => MIB,
        "gib" => GIB,
        _ => 1.0,
    };
    (value * multiplier) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const WG_SHOW: &str = "\
interface: dkt-nl
  public key: q0B0bDWr9V1W2hA0U1MvmS3v+vO2z3N6yJm2QpX5WkE=
  private key: (hidden)
  listening port: 51820

peer: 9nqJ6kQyQ1vC2hS3wQ1Q0t7pE7Jq0x9dL6d5V2hUu2Y=
  endpoint: 203.0.113.7:51820
  allowed ips: 0.0.0.0/0, ::/0
  latest handshake: 12 seconds ago
  transfer: 18.42 MiB received, 2.07 MiB sent
";

    #[test]
    fn test_unit_conversion() {
        let stats = parse_transfer("transfer: 1.50 MiB received, 2.00 KiB sent");
        assert_eq!(stats, TransferStats::new(1_572_864, 2048));
    }

    #[test]
    fn test_missing_pattern_is_zero() {
        assert_eq!(parse_transfer("no data"), TransferStats::default());
        assert_eq!(parse_transfer(""), TransferStats::default());
    }

    #[test]
    fn test_full_wg_show_output() {
        let stats = parse_transfer(WG_SHOW);
        assert_eq!(stats.bytes_received, (18.42 * MIB) as u64);
        assert_eq!(stats.bytes_sent, (2.07 * MIB) as u64);
    }

    #[test]
    fn test_plain_bytes_and_gib() {
        let stats = parse_transfer("transfer: 92 B received, 1.25 GiB sent");
        assert_eq!(stats, TransferStats::new(92, 1_342_177_280));
    }

    #[test]
    fn test_units_case_insensitive() {
        let stats = parse_transfer("Transfer: 1 kib received, 3 MIB sent");
        assert_eq!(stats, TransferStats::new(1024, 3 * 1024 * 1024));
    }

    #[test]
    fn test_first_peer_wins() {
        let raw = "transfer: 1 KiB received, 2 KiB sent\ntransfer: 9 GiB received, 9 GiB sent";
        assert_eq!(parse_transfer(raw), TransferStats::new(1024, 2048));
    }

    #[test]
    fn test_parse_is_idempotent() {
        assert_eq!(parse_transfer(WG_SHOW), parse_transfer(WG_SHOW));
    }

    #[test]
    fn test_unknown_unit_does_not_match() {
        assert_eq!(
            parse_transfer("transfer: 5 TiB received, 1 KiB sent"),
            TransferStats::default()
        );
    }
}
