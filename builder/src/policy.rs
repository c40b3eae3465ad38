//! The policy compiler: pure, stateless translators from declarative CRD/
//! annotation policy objects into the one internal policy model carried on
//! `Route`/`Cluster`/`VirtualHost` (spec.md §4.8).
//!
//! Grounded on `linkerd-linkerd2/policy-controller/core/src/outbound.rs`'s
//! `RetryPolicy`/`StatusRange::from_str` translation style (parse once into
//! a typed value, reject what doesn't fit) and generalized to the full
//! Contour policy vocabulary.

use crate::duration;
use ingress_dag_core::policy::{
    CorsOrigin, CorsPolicy, GlobalRateLimitDescriptor, HashPolicyTarget, HealthCheckPolicy,
    HeadersPolicy, LoadBalancerPolicy, LocalRateLimitPolicy, RateLimitDescriptorEntry,
    RateLimitPolicy, RateLimitUnit, RequestHashPolicy, RetryPolicy, TimeoutPolicy, DEFAULT_TIMEOUT,
};
use std::time::Duration;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("duplicate header {0:?} in request/response headers policy")]
    DuplicateHeader(String),
    #[error("Host header rewrite is not permitted on this route")]
    HostRewriteNotAllowed,
    #[error("CORS max-age is not a valid non-negative duration")]
    InvalidMaxAge,
    #[error("CORS allowOrigin '*' must not be combined with other origins")]
    WildcardOriginNotAlone,
    #[error("rate limit unit must be one of second, minute, hour")]
    InvalidRateLimitUnit,
    #[error("local rate limit requests must be greater than zero")]
    ZeroRequests,
    #[error("rate limit descriptor entry must set exactly one of genericKey, requestHeader, requestHeaderValueMatch, remoteAddress")]
    AmbiguousDescriptorEntry,
}

/// `retryPolicy`: empty `retry_on` defaults to `"5xx"`; `num_retries` is
/// always coerced to at least 1 (spec.md §4.8).
pub fn retry_policy(retry_on: &[String], num_retries: Option<u32>, per_try_timeout: Option<&str>) -> RetryPolicy {
    let retry_on = if retry_on.is_empty() {
        vec!["5xx".to_string()]
    } else {
        retry_on.to_vec()
    };
    let num_retries = num_retries.unwrap_or(1).max(1);
    let per_try_timeout = per_try_timeout.map(|raw| match duration::parse(raw) {
        Ok(d) => d,
        Err(_) => DEFAULT_TIMEOUT,
    });
    RetryPolicy {
        retry_on,
        num_retries,
        per_try_timeout,
    }
}

/// `timeoutPolicy`: `""`/absent is the Envoy default; `"infinity"`/`"infinite"`
/// and any unparsable value both resolve to the "no timeout" sentinel, per
/// spec.md §9's documented-but-undefined behavior — this is deliberately
/// not normalized away.
pub fn timeout_policy(raw: Option<&str>) -> TimeoutPolicy {
    match raw {
        None => TimeoutPolicy::Default,
        Some("") => TimeoutPolicy::Default,
        Some(s) if s.eq_ignore_ascii_case("infinity") || s.eq_ignore_ascii_case("infinite") => {
            TimeoutPolicy::Infinite
        }
        Some(s) => match duration::parse(s) {
            Ok(d) => TimeoutPolicy::Duration(d),
            Err(_) => TimeoutPolicy::Infinite,
        },
    }
}

pub fn load_balancer_policy(raw: Option<&str>) -> LoadBalancerPolicy {
    match raw {
        Some("WeightedLeastRequest") => LoadBalancerPolicy::WeightedLeastRequest,
        Some("Random") => LoadBalancerPolicy::Random,
        Some("RoundRobin") => LoadBalancerPolicy::RoundRobin,
        Some("Cookie") => LoadBalancerPolicy::Cookie,
        Some("RequestHash") => LoadBalancerPolicy::RequestHash,
        _ => LoadBalancerPolicy::Default,
    }
}

fn envoy_dynamic_variable() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"%(DOWNSTREAM_REMOTE_ADDRESS|DOWNSTREAM_REMOTE_ADDRESS_WITHOUT_PORT|DOWNSTREAM_LOCAL_ADDRESS|DOWNSTREAM_LOCAL_ADDRESS_WITHOUT_PORT|PROTOCOL|REQ\([A-Za-z0-9-]+\))%")
            .expect("static pattern")
    })
}

/// Escapes a literal `%` that isn't part of a whitelisted Envoy dynamic
/// variable, since Envoy header value formatters otherwise treat every `%`
/// as the start of one (spec.md §4.8).
fn escape_percent(value: &str) -> String {
    let re = envoy_dynamic_variable();
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for m in re.find_iter(value) {
        out.push_str(&value[last..m.start()].replace('%', "%%"));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&value[last..].replace('%', "%%"));
    out
}

/// `headersPolicy`: canonicalizes header names, rejects duplicates across
/// `set`+`add`, and only honors a `Host` rewrite when the caller (route vs.
/// cluster context) permits it.
pub fn headers_policy(
    set: &[(String, String)],
    add: &[(String, String)],
    remove: &[String],
    allow_host_rewrite: bool,
) -> Result<HeadersPolicy, PolicyError> {
    let mut seen = ahash::AHashSet::new();
    let mut host_rewrite = None;
    let mut canon_set = Vec::with_capacity(set.len());
    for (name, value) in set {
        let name = canonical_header_name(name);
        if !seen.insert(name.clone()) {
            return Err(PolicyError::DuplicateHeader(name));
        }
        if name.eq_ignore_ascii_case("host") {
            if !allow_host_rewrite {
                return Err(PolicyError::HostRewriteNotAllowed);
            }
            host_rewrite = Some(value.clone());
            continue;
        }
        canon_set.push((name, escape_percent(value)));
    }
    let mut canon_add = Vec::with_capacity(add.len());
    for (name, value) in add {
        let name = canonical_header_name(name);
        if !seen.insert(name.clone()) {
            return Err(PolicyError::DuplicateHeader(name));
        }
        canon_add.push((name, escape_percent(value)));
    }
    Ok(HeadersPolicy {
        set: canon_set,
        add: canon_add,
        remove: remove.iter().map(|n| canonical_header_name(n)).collect(),
        host_rewrite,
    })
}

fn canonical_header_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

fn classify_origin(origin: &str) -> CorsOrigin {
    static EXACT: OnceLock<Regex> = OnceLock::new();
    let exact = EXACT.get_or_init(|| {
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://[a-zA-Z0-9.-]+(:\d+)?$").expect("static pattern")
    });
    if origin == "*" || exact.is_match(origin) {
        CorsOrigin::Exact
    } else {
        CorsOrigin::Regex
    }
}

/// `corsPolicy`: `allow_origin` entries are classified exact vs regex by
/// shape; a bare `*` must not be combined with other origins.
pub fn cors_policy(
    allow_origin: &[String],
    allow_methods: &[String],
    allow_headers: &[String],
    expose_headers: &[String],
    allow_credentials: bool,
    max_age: Option<&str>,
) -> Result<CorsPolicy, PolicyError> {
    if allow_origin.iter().any(|o| o == "*") && allow_origin.len() > 1 {
        return Err(PolicyError::WildcardOriginNotAlone);
    }
    let max_age = match max_age {
        None | Some("") => None,
        Some(s) => Some(duration::parse(s).map_err(|_| PolicyError::InvalidMaxAge)?),
    };
    Ok(CorsPolicy {
        allow_origin: allow_origin.iter().map(|o| (classify_origin(o), o.clone())).collect(),
        allow_methods: allow_methods.to_vec(),
        allow_headers: allow_headers.to_vec(),
        expose_headers: expose_headers.to_vec(),
        allow_credentials,
        max_age,
    })
}

pub fn rate_limit_unit(raw: &str) -> Result<RateLimitUnit, PolicyError> {
    match raw {
        "second" => Ok(RateLimitUnit::Second),
        "minute" => Ok(RateLimitUnit::Minute),
        "hour" => Ok(RateLimitUnit::Hour),
        _ => Err(PolicyError::InvalidRateLimitUnit),
    }
}

pub fn local_rate_limit_policy(requests: u32, unit: &str, burst: Option<u32>) -> Result<LocalRateLimitPolicy, PolicyError> {
    if requests == 0 {
        return Err(PolicyError::ZeroRequests);
    }
    Ok(LocalRateLimitPolicy {
        requests,
        unit: rate_limit_unit(unit)?,
        burst: burst.unwrap_or(0),
    })
}

/// One global rate-limit descriptor entry must carry exactly one of the
/// four recognized shapes (spec.md §4.8); presented here as four optional
/// inputs mirroring the CRD's "duck-typed" schema, collapsed into the
/// closed `RateLimitDescriptorEntry` sum type.
#[allow(clippy::too_many_arguments)]
pub fn rate_limit_descriptor_entry(
    generic_key: Option<(Option<String>, String)>,
    request_header: Option<(String, String)>,
    request_header_value_match: Option<(String, Vec<(String, String)>)>,
    remote_address: bool,
) -> Result<RateLimitDescriptorEntry, PolicyError> {
    let set_count = [
        generic_key.is_some(),
        request_header.is_some(),
        request_header_value_match.is_some(),
        remote_address,
    ]
    .iter()
    .filter(|b| **b)
    .count();
    if set_count != 1 {
        return Err(PolicyError::AmbiguousDescriptorEntry);
    }
    if let Some((key, value)) = generic_key {
        return Ok(RateLimitDescriptorEntry::GenericKey { key, value });
    }
    if let Some((header_name, descriptor_key)) = request_header {
        return Ok(RateLimitDescriptorEntry::RequestHeader { header_name, descriptor_key });
    }
    if let Some((value, headers)) = request_header_value_match {
        return Ok(RateLimitDescriptorEntry::RequestHeaderValueMatch { value, headers });
    }
    Ok(RateLimitDescriptorEntry::RemoteAddress)
}

pub fn global_rate_limit_descriptor(entries: Vec<RateLimitDescriptorEntry>) -> GlobalRateLimitDescriptor {
    GlobalRateLimitDescriptor { entries }
}

pub fn rate_limit_policy(local: Option<LocalRateLimitPolicy>, global: Vec<GlobalRateLimitDescriptor>) -> RateLimitPolicy {
    RateLimitPolicy { local, global }
}

pub fn request_hash_policy(terminal: bool, target: HashPolicyTarget, key: Option<String>) -> RequestHashPolicy {
    RequestHashPolicy { terminal, target, key }
}

/// `healthCheckPolicy`: defaults mirror Envoy's own active health-check
/// defaults, since the CRD schema leaves them optional.
pub fn health_check_policy(
    path: &str,
    host: Option<&str>,
    interval_seconds: Option<u32>,
    timeout_seconds: Option<u32>,
    unhealthy_threshold: Option<u32>,
    healthy_threshold: Option<u32>,
) -> HealthCheckPolicy {
    HealthCheckPolicy {
        path: path.to_string(),
        host: host.map(str::to_string),
        interval: Duration::from_secs(interval_seconds.unwrap_or(5) as u64),
        timeout: Duration::from_secs(timeout_seconds.unwrap_or(2) as u64),
        unhealthy_threshold: unhealthy_threshold.unwrap_or(3),
        healthy_threshold: healthy_threshold.unwrap_or(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_defaults_retry_on_and_coerces_retries() {
        let p = retry_policy(&[], None, None);
        assert_eq!(p.retry_on, vec!["5xx".to_string()]);
        assert_eq!(p.num_retries, 1);
    }

    #[test]
    fn timeout_policy_infinite_for_sentinel_and_garbage() {
        assert_eq!(timeout_policy(Some("infinity")), TimeoutPolicy::Infinite);
        assert_eq!(timeout_policy(Some("not-a-duration")), TimeoutPolicy::Infinite);
        assert_eq!(timeout_policy(None), TimeoutPolicy::Default);
        assert_eq!(timeout_policy(Some("30s")), TimeoutPolicy::Duration(std::time::Duration::from_secs(30)));
    }

    #[test]
    fn headers_policy_rejects_duplicates() {
        let err = headers_policy(
            &[("X-Foo".to_string(), "a".to_string())],
            &[("x-foo".to_string(), "b".to_string())],
            &[],
            false,
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::DuplicateHeader("x-foo".to_string()));
    }

    #[test]
    fn headers_policy_rejects_host_rewrite_unless_allowed() {
        let err = headers_policy(&[("Host".to_string(), "example.com".to_string())], &[], &[], false).unwrap_err();
        assert_eq!(err, PolicyError::HostRewriteNotAllowed);
        let ok = headers_policy(&[("Host".to_string(), "example.com".to_string())], &[], &[], true).unwrap();
        assert_eq!(ok.host_rewrite, Some("example.com".to_string()));
    }

    #[test]
    fn cors_wildcard_must_be_alone() {
        let err = cors_policy(&["*".to_string(), "https://a.com".to_string()], &[], &[], &[], false, None).unwrap_err();
        assert_eq!(err, PolicyError::WildcardOriginNotAlone);
    }

    #[test]
    fn rate_limit_descriptor_requires_exactly_one_field() {
        assert_eq!(
            rate_limit_descriptor_entry(None, None, None, false).unwrap_err(),
            PolicyError::AmbiguousDescriptorEntry
        );
        assert!(rate_limit_descriptor_entry(None, None, None, true).is_ok());
    }
}
