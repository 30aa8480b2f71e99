//! Client identity resolution
//!
//! An [`Identity`] is the fingerprint used to enforce "one active key per
//! client". It is derived from spoofable request signals and is never an
//! authentication result.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Identity assigned when no provenance signal is available at all.
/// Every such caller shares this single bucket.
pub const UNKNOWN_IDENTITY: &str = "unknown";

const MAX_IDENTITY_LENGTH: usize = 255;

/// Resolved client fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Self::unknown();
        }

        Self(canonicalize(trimmed))
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_IDENTITY.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_IDENTITY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Partially hidden form for logs
    pub fn masked(&self) -> String {
        match self.0.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => {
                let [a, b, c, _] = v4.octets();
                format!("{}.{}.{}.x", a, b, c)
            }
            Ok(IpAddr::V6(v6)) => {
                let segments = v6.segments();
                format!("{:x}:{:x}:{:x}::x", segments[0], segments[1], segments[2])
            }
            Err(_) if self.is_unknown() => self.0.clone(),
            Err(_) => "***".to_string(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<IpAddr> for Identity {
    fn from(addr: IpAddr) -> Self {
        Self(addr.to_canonical().to_string())
    }
}

/// IP literals are rendered canonically so `::ffff:203.0.113.5` and
/// `203.0.113.5` share one bucket.
fn canonicalize(value: &str) -> String {
    match value.parse::<IpAddr>() {
        Ok(addr) => addr.to_canonical().to_string(),
        Err(_) => value.chars().take(MAX_IDENTITY_LENGTH).collect(),
    }
}

/// Raw identity signals extracted from a request
#[derive(Debug, Clone, Default)]
pub struct ClientSignals {
    /// Value of the `x-forwarded-for` header
    pub forwarded_for: Option<String>,
    /// Value of the `x-real-ip` header
    pub real_ip: Option<String>,
    /// Transport-level peer address
    pub peer: Option<IpAddr>,
}

impl ClientSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    pub fn with_real_ip(mut self, value: impl Into<String>) -> Self {
        self.real_ip = Some(value.into());
        self
    }

    pub fn with_peer(mut self, peer: IpAddr) -> Self {
        self.peer = Some(peer);
        self
    }
}

/// Derives a deterministic [`Identity`] from [`ClientSignals`]
///
/// Preference order: first hop of the forwarded-for chain, then the
/// real-ip header, then the peer address, then [`Identity::unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, signals: &ClientSignals) -> Identity {
        let forwarded = signals
            .forwarded_for
            .as_deref()
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());

        if let Some(hop) = forwarded {
            return Identity::new(hop);
        }

        let real_ip = signals
            .real_ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        if let Some(ip) = real_ip {
            return Identity::new(ip);
        }

        match signals.peer {
            Some(peer) => Identity::from(peer),
            None => Identity::unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let signals = ClientSignals::new()
            .with_forwarded_for("203.0.113.5, 10.0.0.1, 10.0.0.2")
            .with_real_ip("198.51.100.7")
            .with_peer(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let identity = IdentityResolver::new().resolve(&signals);
        assert_eq!(identity.as_str(), "203.0.113.5");
    }

    #[test]
    fn test_real_ip_used_without_forwarded_for() {
        let signals = ClientSignals::new()
            .with_forwarded_for("  ")
            .with_real_ip(" 198.51.100.7 ")
            .with_peer(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let identity = IdentityResolver::new().resolve(&signals);
        assert_eq!(identity.as_str(), "198.51.100.7");
    }

    #[test]
    fn test_peer_used_as_last_signal() {
        let signals = ClientSignals::new().with_peer(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));

        let identity = IdentityResolver::new().resolve(&signals);
        assert_eq!(identity.as_str(), "192.0.2.1");
    }

    #[test]
    fn test_no_signal_falls_back_to_unknown() {
        let identity = IdentityResolver::new().resolve(&ClientSignals::new());
        assert!(identity.is_unknown());
        assert_eq!(identity.as_str(), UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_ipv4_mapped_addresses_share_a_bucket() {
        let mapped = ClientSignals::new().with_forwarded_for("::ffff:203.0.113.5");
        let plain = ClientSignals::new().with_forwarded_for("203.0.113.5");

        let resolver = IdentityResolver::new();
        assert_eq!(resolver.resolve(&mapped), resolver.resolve(&plain));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let signals = ClientSignals::new().with_real_ip("198.51.100.7");
        let resolver = IdentityResolver::new();
        assert_eq!(resolver.resolve(&signals), resolver.resolve(&signals));
    }

    #[test]
    fn test_masked_hides_host_part() {
        assert_eq!(Identity::new("203.0.113.5").masked(), "203.0.113.x");
        assert_eq!(
            Identity::from(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 1, 0, 0, 0, 0, 1))).masked(),
            "2001:db8:1::x"
        );
        assert_eq!(Identity::unknown().masked(), "unknown");
        assert_eq!(Identity::new("some-host").masked(), "***");
    }
}
