//! DAG policy value types: retry, timeout, headers, CORS, rate-limit, load
//! balancer, hash and health-check policies.
//!
//! Grounded on `linkerd-linkerd2/policy-controller/core/src/outbound.rs`
//! (retry/backend-policy shape) and `core/src/http_route.rs` (header
//! modifier shape), generalized to the richer Contour-style vocabulary
//! described in spec.md §4.8. These types are produced by the policy
//! compiler (`ingress-dag-builder::policy`) and carried on `Route`/`Cluster`.

use std::time::Duration;

/// The Envoy default request timeout used when no timeout is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_on: Vec<String>,
    pub num_retries: u32,
    pub per_try_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_on: vec![],
            num_retries: 1,
            per_try_timeout: None,
        }
    }
}

/// The "least surprise" sentinel described in spec.md §4.8/§9: a timeout is
/// either the Envoy default, an explicit duration (including zero), or
/// "infinite" — the latter covers both the documented `infinity`/`infinite`
/// spelling and the undefined-but-preserved behavior for unparsable
/// durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutPolicy {
    Default,
    Duration(Duration),
    Infinite,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::Default
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadBalancerPolicy {
    #[default]
    Default,
    WeightedLeastRequest,
    Random,
    RoundRobin,
    Cookie,
    RequestHash,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadersPolicy {
    pub set: Vec<(String, String)>,
    pub add: Vec<(String, String)>,
    pub remove: Vec<String>,
    /// `Host` rewrite is only honored when the caller allows host rewrite
    /// (spec.md §4.8).
    pub host_rewrite: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorsOrigin {
    Exact,
    Regex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsPolicy {
    pub allow_origin: Vec<(CorsOrigin, String)>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitUnit {
    Second,
    Minute,
    Hour,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalRateLimitPolicy {
    pub requests: u32,
    pub unit: RateLimitUnit,
    pub burst: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDescriptorEntry {
    GenericKey { key: Option<String>, value: String },
    RequestHeader { header_name: String, descriptor_key: String },
    RequestHeaderValueMatch { value: String, headers: Vec<(String, String)> },
    RemoteAddress,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalRateLimitDescriptor {
    pub entries: Vec<RateLimitDescriptorEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub local: Option<LocalRateLimitPolicy>,
    pub global: Vec<GlobalRateLimitDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashPolicyTarget {
    SourceIp,
    Header(String),
    QueryParameter(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestHashPolicy {
    pub terminal: bool,
    pub target: HashPolicyTarget,
    pub key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    pub path: String,
    pub host: Option<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MirrorPolicy {
    pub weight: u32,
}
