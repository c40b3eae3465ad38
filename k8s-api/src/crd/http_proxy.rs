//! `HTTPProxy`: the proprietary CRD with includes, condition inheritance and
//! a rich route/cluster policy vocabulary.
//!
//! Uses the standard `#[derive(CustomResource, ...)]
//! #[kube(group, version, kind, namespaced)]` shape other CRDs in this
//! workspace follow.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "projectcontour.io",
    version = "v1",
    kind = "HTTPProxy",
    struct = "HttpProxy",
    status = "HttpProxyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HttpProxySpec {
    pub virtualhost: Option<VirtualHost>,
    pub routes: Option<Vec<Route>>,
    pub tcpproxy: Option<TcpProxy>,
    pub includes: Option<Vec<Include>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpProxyStatus {
    pub current_status: Option<String>,
    pub description: Option<String>,
    pub conditions: Option<Vec<crate::Condition>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHost {
    pub fqdn: String,
    pub tls: Option<Tls>,
    pub cors_policy: Option<CorsPolicy>,
    pub rate_limit_policy: Option<RateLimitPolicy>,
    pub authorization: Option<AuthorizationServerRef>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    pub secret_name: Option<String>,
    pub minimum_protocol_version: Option<String>,
    pub maximum_protocol_version: Option<String>,
    pub passthrough: Option<bool>,
    pub client_validation: Option<DownstreamValidation>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamValidation {
    pub ca_secret: Option<String>,
    pub skip_client_cert_validation: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationServerRef {
    pub extension_ref: ExtensionServiceRef,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionServiceRef {
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Include {
    pub name: String,
    pub namespace: Option<String>,
    pub conditions: Option<Vec<MatchCondition>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchCondition {
    pub prefix: Option<String>,
    pub header: Option<HeaderCondition>,
    pub query_parameter: Option<QueryParameterCondition>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderCondition {
    pub name: String,
    pub present: Option<bool>,
    pub notpresent: Option<bool>,
    pub contains: Option<String>,
    pub notcontains: Option<String>,
    pub exact: Option<String>,
    pub notexact: Option<String>,
    pub regex: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameterCondition {
    pub name: String,
    pub exact: Option<String>,
    pub regex: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub conditions: Option<Vec<MatchCondition>>,
    pub services: Option<Vec<ServiceBackend>>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeout_policy: Option<TimeoutPolicy>,
    pub rate_limit_policy: Option<RateLimitPolicy>,
    pub request_headers_policy: Option<HeadersPolicy>,
    pub response_headers_policy: Option<HeadersPolicy>,
    pub permit_insecure: Option<bool>,
    pub path_rewrite_policy: Option<PathRewritePolicy>,
    pub enable_websockets: Option<bool>,
    pub auth_policy: Option<AuthPolicy>,
    pub load_balancer_policy: Option<LoadBalancerPolicy>,
    pub request_hash_policy: Option<Vec<RequestHashPolicy>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBackend {
    pub name: String,
    pub port: u16,
    pub protocol: Option<String>,
    pub weight: Option<u32>,
    pub mirror: Option<bool>,
    pub upstream_validation: Option<UpstreamValidation>,
    pub health_check_policy: Option<HealthCheckPolicy>,
    pub request_headers_policy: Option<HeadersPolicy>,
    pub response_headers_policy: Option<HeadersPolicy>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamValidation {
    pub ca_secret: String,
    pub subject_name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckPolicy {
    pub path: String,
    pub host: Option<String>,
    pub interval_seconds: Option<u32>,
    pub timeout_seconds: Option<u32>,
    pub unhealthy_threshold_count: Option<u32>,
    pub healthy_threshold_count: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub retry_on: Option<Vec<String>>,
    pub num_retries: Option<u32>,
    pub per_try_timeout: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutPolicy {
    pub response: Option<String>,
    pub idle: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeadersPolicy {
    pub set: Option<Vec<HeaderValue>>,
    pub add: Option<Vec<HeaderValue>>,
    pub remove: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderValue {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PathRewritePolicy {
    pub replace_prefix: Option<Vec<ReplacePrefix>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePrefix {
    pub prefix: Option<String>,
    pub replacement: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicy {
    pub disabled: Option<bool>,
    pub context: Option<std::collections::BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum LoadBalancerPolicy {
    WeightedLeastRequest,
    Random,
    RoundRobin,
    Cookie,
    RequestHash,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestHashPolicy {
    pub terminal: Option<bool>,
    pub header_hash_options: Option<HeaderHashOptions>,
    pub query_parameter_hash_options: Option<QueryParameterHashOptions>,
    pub hash_source_ip: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderHashOptions {
    pub header_name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameterHashOptions {
    pub parameter_name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CorsPolicy {
    pub allow_origin: Vec<String>,
    pub allow_methods: Option<Vec<String>>,
    pub allow_headers: Option<Vec<String>>,
    pub expose_headers: Option<Vec<String>>,
    pub allow_credentials: Option<bool>,
    pub max_age: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub local: Option<LocalRateLimitPolicy>,
    pub global: Option<GlobalRateLimitPolicy>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalRateLimitPolicy {
    pub requests: u32,
    pub unit: String,
    pub burst: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRateLimitPolicy {
    pub descriptors: Vec<RateLimitDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDescriptor {
    pub entries: Vec<RateLimitDescriptorEntry>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDescriptorEntry {
    pub generic_key: Option<GenericKeyEntry>,
    pub request_header: Option<RequestHeaderEntry>,
    pub request_header_value_match: Option<RequestHeaderValueMatchEntry>,
    pub remote_address: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenericKeyEntry {
    pub key: Option<String>,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeaderEntry {
    pub header_name: String,
    pub descriptor_key: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeaderValueMatchEntry {
    pub value: String,
    pub headers: Vec<HeaderCondition>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TcpProxy {
    pub include: Option<Include>,
    pub services: Option<Vec<ServiceBackend>>,
}
