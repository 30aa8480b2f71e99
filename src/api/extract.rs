//! Request context extraction: who is calling and where they came from

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};

use crate::api::state::AppState;
use crate::domain::{ClientSignals, Identity, Provenance};

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Resolved identity and provenance of the current request
///
/// Never rejects: absent signals resolve to the unknown identity and an
/// empty provenance, which the gate then judges.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub identity: Identity,
    pub provenance: Provenance,
}

impl FromRequestParts<AppState> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let signals = client_signals(&parts.headers, peer);

        Ok(Self {
            identity: state.resolver.resolve(&signals),
            provenance: provenance(&parts.headers),
        })
    }
}

fn header_str(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn client_signals(headers: &HeaderMap, peer: Option<std::net::IpAddr>) -> ClientSignals {
    ClientSignals {
        forwarded_for: header_str(headers, FORWARDED_FOR),
        real_ip: header_str(headers, REAL_IP),
        peer,
    }
}

fn provenance(headers: &HeaderMap) -> Provenance {
    Provenance {
        referer: header_str(headers, header::REFERER),
        origin: header_str(headers, header::ORIGIN),
        host: header_str(headers, header::HOST),
    }
}
