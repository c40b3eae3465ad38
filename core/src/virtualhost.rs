//! `VirtualHost` and `SecureVirtualHost`: the fqdn-keyed containers that own
//! a listener's routes, split into a plain and a TLS-bearing variant.

use crate::cluster::Cluster;
use crate::policy::{CorsPolicy, RateLimitPolicy};
use crate::route::Route;
use ahash::AHashMap as HashMap;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualHost {
    pub name: String,
    pub listener_name: String,
    pub cors_policy: Option<CorsPolicy>,
    pub rate_limit_policy: Option<RateLimitPolicy>,
    routes: HashMap<String, Route>,
}

impl VirtualHost {
    pub fn new(name: impl Into<String>, listener_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listener_name: listener_name.into(),
            cors_policy: None,
            rate_limit_policy: None,
            routes: HashMap::default(),
        }
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Inserts (or replaces) a route keyed by `RouteKey`; duplicates replace
    /// the prior route for this virtual host (spec.md §4.2).
    pub fn add_route(&mut self, route: Route) {
        self.routes.insert(route.route_key(), route);
    }

    /// A VirtualHost contains at least one Route to be considered valid
    /// (spec.md §3.1).
    pub fn is_valid(&self) -> bool {
        !self.routes.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TlsVersion {
    #[default]
    Tls12,
    Tls13,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownstreamValidation {
    pub ca_secret: Option<String>,
    pub skip_client_cert_validation: bool,
    /// CRL serials/distribution points, validated by the secret/certificate
    /// validator (spec.md §4.9).
    pub crl_secret: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpProxy {
    pub clusters: Vec<Cluster>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecureVirtualHost {
    pub name: String,
    pub listener_name: String,
    pub secret: Option<String>,
    pub min_tls_version: TlsVersion,
    pub max_tls_version: TlsVersion,
    pub fallback_certificate: Option<String>,
    pub downstream_validation: Option<DownstreamValidation>,
    pub tcp_proxy: Option<TcpProxy>,
    pub authorization_service: Option<String>,
    pub cors_policy: Option<CorsPolicy>,
    pub rate_limit_policy: Option<RateLimitPolicy>,
    routes: HashMap<String, Route>,
}

impl SecureVirtualHost {
    pub fn new(name: impl Into<String>, listener_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listener_name: listener_name.into(),
            secret: None,
            min_tls_version: TlsVersion::default(),
            max_tls_version: TlsVersion::default(),
            fallback_certificate: None,
            downstream_validation: None,
            tcp_proxy: None,
            authorization_service: None,
            cors_policy: None,
            rate_limit_policy: None,
            routes: HashMap::default(),
        }
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.insert(route.route_key(), route);
    }

    /// `Valid(s) ⇔ (s.secret ≠ ∅ ∧ s.routes ≠ ∅) ∨ s.tcpProxy ≠ ∅` (spec.md §8).
    pub fn is_valid(&self) -> bool {
        (self.secret.is_some() && !self.routes.is_empty()) || self.tcp_proxy.is_some()
    }
}

/// A trivial duration newtype alias kept for clarity at call sites that pass
/// TLS handshake timeouts through to the downstream validation config.
pub type HandshakeTimeout = Duration;
