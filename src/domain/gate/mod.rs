//! Provenance-based admission for key issuance
//!
//! The gate looks only at client-supplied headers (referrer, origin, host),
//! so it is a deterrent against casual bypass of the official issuance link
//! and never an authentication boundary.

use serde::Serialize;
use url::Url;

/// Provenance signals carried by an issuance request
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub referer: Option<String>,
    pub origin: Option<String>,
    pub host: Option<String>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Referrer and origin values that carry information.
    /// Browsers send `Origin: null` for opaque origins.
    fn sources(&self) -> impl Iterator<Item = &str> {
        [self.referer.as_deref(), self.origin.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
    }
}

/// Why an issuance attempt was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDenial {
    /// Neither referrer nor origin was sent
    MissingProvenance,
    /// Referrer/origin present but none matched a trusted domain
    UntrustedProvenance,
}

impl std::fmt::Display for GateDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingProvenance => write!(f, "request carries no referrer or origin"),
            Self::UntrustedProvenance => {
                write!(f, "request was not opened from the official link")
            }
        }
    }
}

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny(GateDenial),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Allow-list driven provenance check
#[derive(Debug, Clone)]
pub struct AccessGate {
    allowed_domains: Vec<String>,
    allow_missing_provenance: bool,
    allow_same_origin: bool,
}

impl AccessGate {
    pub fn new(allowed_domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|d| d.into().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        Self {
            allowed_domains,
            allow_missing_provenance: false,
            allow_same_origin: false,
        }
    }

    /// Treat requests without referrer and origin as allowed
    pub fn with_allow_missing_provenance(mut self, allow: bool) -> Self {
        self.allow_missing_provenance = allow;
        self
    }

    /// Accept referrers pointing back at the request's own host
    pub fn with_allow_same_origin(mut self, allow: bool) -> Self {
        self.allow_same_origin = allow;
        self
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    pub fn check(&self, provenance: &Provenance) -> GateDecision {
        let mut saw_source = false;

        for source in provenance.sources() {
            saw_source = true;

            if self.is_trusted(source) {
                return GateDecision::Allow;
            }

            if self.allow_same_origin && is_same_origin(source, provenance.host.as_deref()) {
                return GateDecision::Allow;
            }
        }

        if saw_source {
            GateDecision::Deny(GateDenial::UntrustedProvenance)
        } else if self.allow_missing_provenance {
            GateDecision::Allow
        } else {
            GateDecision::Deny(GateDenial::MissingProvenance)
        }
    }

    fn is_trusted(&self, source: &str) -> bool {
        match Url::parse(source) {
            Ok(url) => url
                .host_str()
                .map(|host| {
                    let host = host.to_ascii_lowercase();
                    self.allowed_domains.iter().any(|d| domain_matches(&host, d))
                })
                .unwrap_or(false),
            // Not a URL at all, so fall back to a plain substring match
            Err(_) => {
                let source = source.to_ascii_lowercase();
                self.allowed_domains.iter().any(|d| source.contains(d.as_str()))
            }
        }
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn is_same_origin(source: &str, request_host: Option<&str>) -> bool {
    let Some(request_host) = request_host.map(str::trim).filter(|h| !h.is_empty()) else {
        return false;
    };

    let Ok(url) = Url::parse(source) else {
        return false;
    };

    let Some(host) = url.host_str() else {
        return false;
    };

    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    authority.eq_ignore_ascii_case(request_host)
}
