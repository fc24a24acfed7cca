//! Maps a new connection's peer address and headers to a [`ConnectionClass`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::OnceLock;

use ipnet::IpNet;

use crate::model::ConnectionClass;

fn vpn_range() -> &'static IpNet {
    static RANGE: OnceLock<IpNet> = OnceLock::new();
    RANGE.get_or_init(|| "100.64.0.0/10".parse().expect("static CIDR is valid"))
}

/// Outcome of classification: the assigned class and the peer address to
/// record, which may differ from the raw socket peer (e.g. when
/// `CF-Connecting-IP` substitutes the real client address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Assigned trust class.
    pub class: ConnectionClass,
    /// Peer address to record for this connection, post header-substitution.
    pub peer: String,
}

/// Stateless classifier; headers are matched case-insensitively by the
/// caller (the gateway binary normalizes header names before calling in).
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustClassifier;

impl TrustClassifier {
    /// Classify a connection. `headers` keys are expected already
    /// lower-cased.
    pub fn classify(&self, peer: &str, headers: &HashMap<String, String>) -> Classification {
        if let Some(cf_ip) = headers.get("cf-connecting-ip") {
            return Classification {
                class: ConnectionClass::Tunneled,
                peer: cf_ip.clone(),
            };
        }

        if headers.contains_key("tailscale-user") || Self::in_vpn_range(peer) {
            return Classification {
                class: ConnectionClass::Vpn,
                peer: peer.to_string(),
            };
        }

        // Loopback, or conservative default for anything unclassifiable.
        Classification {
            class: ConnectionClass::Local,
            peer: peer.to_string(),
        }
    }

    fn in_vpn_range(peer: &str) -> bool {
        match peer.parse::<IpAddr>() {
            Ok(ip) => vpn_range().contains(&ip),
            Err(_) => false,
        }
    }

    /// Whether `peer` is a loopback address (127.0.0.0/8 or ::1).
    pub fn is_loopback(peer: &str) -> bool {
        peer.parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn cf_connecting_ip_is_tunneled_and_replaces_peer() {
        let classifier = TrustClassifier;
        let result = classifier.classify(
            "203.0.113.1",
            &headers(&[("cf-connecting-ip", "1.2.3.4")]),
        );
        assert_eq!(result.class, ConnectionClass::Tunneled);
        assert_eq!(result.peer, "1.2.3.4");
    }

    #[test]
    fn tailscale_header_is_vpn() {
        let classifier = TrustClassifier;
        let result = classifier.classify("203.0.113.1", &headers(&[("tailscale-user", "me")]));
        assert_eq!(result.class, ConnectionClass::Vpn);
    }

    #[test]
    fn cgnat_range_is_vpn_without_header() {
        let classifier = TrustClassifier;
        let result = classifier.classify("100.64.1.2", &HashMap::new());
        assert_eq!(result.class, ConnectionClass::Vpn);
    }

    #[test]
    fn loopback_is_local() {
        let classifier = TrustClassifier;
        let result = classifier.classify("127.0.0.1", &HashMap::new());
        assert_eq!(result.class, ConnectionClass::Local);
    }

    #[test]
    fn unclassifiable_defaults_to_local() {
        let classifier = TrustClassifier;
        let result = classifier.classify("8.8.8.8", &HashMap::new());
        assert_eq!(result.class, ConnectionClass::Local);
    }
}
