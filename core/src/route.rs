//! The `Route` vertex: one match condition plus the weighted clusters and
//! policies it resolves to.

use crate::cluster::Cluster;
use crate::http_route::MatchConditions;
use crate::policy::{
    CorsPolicy, HeadersPolicy, MirrorPolicy, RateLimitPolicy, RequestHashPolicy, RetryPolicy,
    TimeoutPolicy,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectResponse {
    pub status: u16,
    pub body: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub scheme: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub status: Option<u16>,
    pub path: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorClusters {
    pub cluster: Cluster,
    pub policy: MirrorPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub conditions: MatchConditions,
    pub clusters: Vec<Cluster>,
    pub mirror_policy: Vec<MirrorClusters>,
    pub timeout_policy: TimeoutPolicy,
    pub retry_policy: RetryPolicy,
    pub https_upgrade: bool,
    pub websocket: bool,
    pub request_headers_policy: Option<HeadersPolicy>,
    pub response_headers_policy: Option<HeadersPolicy>,
    pub rate_limit_policy: Option<RateLimitPolicy>,
    pub request_hash_policies: Vec<RequestHashPolicy>,
    pub auth_disabled: bool,
    pub auth_context: Vec<(String, String)>,
    pub direct_response: Option<DirectResponse>,
    pub redirect: Option<Redirect>,
    pub prefix_rewrite: Option<String>,
    pub priority: u8,
}

impl Route {
    pub fn new(conditions: MatchConditions) -> Self {
        Self {
            conditions,
            clusters: Vec::new(),
            mirror_policy: Vec::new(),
            timeout_policy: TimeoutPolicy::default(),
            retry_policy: RetryPolicy {
                retry_on: Vec::new(),
                num_retries: 1,
                per_try_timeout: None,
            },
            https_upgrade: false,
            websocket: false,
            request_headers_policy: None,
            response_headers_policy: None,
            rate_limit_policy: None,
            request_hash_policies: Vec::new(),
            auth_disabled: false,
            auth_context: Vec::new(),
            direct_response: None,
            redirect: None,
            prefix_rewrite: None,
            priority: 0,
        }
    }

    pub fn route_key(&self) -> String {
        self.conditions.route_key()
    }
}
