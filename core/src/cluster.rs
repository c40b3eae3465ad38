//! The `Cluster` vertex: a weighted upstream binding a `Route` to a
//! `Service`, carrying the protocol/TLS/health-check/load-balancing policy
//! that applies to traffic sent to that upstream.
//!
//! Grounded on `linkerd-linkerd2/policy-controller/core/src/outbound.rs`'s
//! `WeightedService`/`Backend`, generalized with the upstream-TLS and
//! health-check fields spec.md §3.1 calls for.

use crate::policy::{HealthCheckPolicy, HeadersPolicy, LoadBalancerPolicy};
use crate::service::ServiceKey;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpstreamProtocol {
    #[default]
    None,
    H2,
    H2c,
    Tls,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpstreamValidation {
    pub ca_secret: Option<String>,
    pub subject_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    /// Weak reference; the builder keeps exactly one canonical `Service`
    /// instance per key for the duration of the build (spec.md §3.3).
    pub upstream: ServiceKey,
    pub weight: u32,
    pub protocol: UpstreamProtocol,
    pub sni: Option<String>,
    pub load_balancer_policy: LoadBalancerPolicy,
    pub health_check: Option<HealthCheckPolicy>,
    pub upstream_validation: Option<UpstreamValidation>,
    pub client_certificate_secret: Option<String>,
    pub request_headers_policy: Option<HeadersPolicy>,
    pub response_headers_policy: Option<HeadersPolicy>,
    pub connect_timeout: Duration,
    pub dns_lookup_family: DnsLookupFamily,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DnsLookupFamily {
    #[default]
    Auto,
    V4,
    V6,
}

impl Cluster {
    pub fn new(upstream: ServiceKey, weight: u32) -> Self {
        Self {
            upstream,
            weight,
            protocol: UpstreamProtocol::default(),
            sni: None,
            load_balancer_policy: LoadBalancerPolicy::default(),
            health_check: None,
            upstream_validation: None,
            client_certificate_secret: None,
            request_headers_policy: None,
            response_headers_policy: None,
            connect_timeout: Duration::from_secs(2),
            dns_lookup_family: DnsLookupFamily::default(),
        }
    }
}
