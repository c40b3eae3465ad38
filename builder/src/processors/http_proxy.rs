//! `HTTPProxyProcessor`: the inclusion resolver (spec.md §4.5/C6). The
//! largest single component in the builder: translates the proprietary
//! HTTPProxy CRD, including its inclusion tree, into Routes/VirtualHosts.
//!
//! Grounded on the condition-inheritance machinery already built in
//! `ingress_dag_core::http_route::MatchConditions::inherit`, and on
//! `linkerd-linkerd2/policy-controller/k8s/index/src/http_route.rs`'s
//! `InboundRouteBinding`-style "translate one CRD document into the internal
//! route model, reporting every rejection as a status condition rather than
//! an error return" discipline, generalized from a flat translation to a
//! recursive one over an inclusion tree.

use crate::config::BuilderConfig;
use crate::object_cache::{LookupError, ObjectCache, PortRef};
use crate::policy;
use ahash::{AHashMap as HashMap, AHashSet};
use ingress_dag_core::cluster::{Cluster, UpstreamProtocol, UpstreamValidation};
use ingress_dag_core::dag::Dag;
use ingress_dag_core::http_route::{
    HeaderMatch, HeaderMatchKind, InheritError, MatchConditions, PathMatch, QueryParamMatch,
};
use ingress_dag_core::listener::Protocol;
use ingress_dag_core::policy::{CorsPolicy, HashPolicyTarget, MirrorPolicy, RateLimitPolicy, RequestHashPolicy};
use ingress_dag_core::route::{MirrorClusters, Route};
use ingress_dag_core::status::ResourceRef;
use ingress_dag_core::virtualhost::{DownstreamValidation, TcpProxy, TlsVersion};
use ingress_dag_k8s_api as k8s;
use ingress_dag_k8s_api::ResourceExt;
use regex::Regex;
use std::num::NonZeroU16;

#[derive(Debug, thiserror::Error)]
enum RouteError {
    #[error("multiple prefix conditions on one include/route")]
    MultiplePrefixConditions,
    #[error("header condition {0:?} sets no match kind")]
    EmptyHeaderCondition(String),
    #[error("query parameter condition {0:?} sets no match kind")]
    EmptyQueryCondition(String),
    #[error("invalid header regex for {0:?}")]
    InvalidHeaderRegex(String),
    #[error("invalid query parameter regex for {0:?}")]
    InvalidQueryRegex(String),
    #[error("request hash policy sets no target")]
    EmptyHashPolicy,
    #[error(transparent)]
    Inherit(#[from] InheritError),
    #[error("service {0}/{1} port {2} is not a valid port")]
    InvalidPort(String, String, u16),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Policy(#[from] crate::policy::PolicyError),
}

fn route_error_condition(e: &RouteError) -> (&'static str, &'static str) {
    match e {
        RouteError::Lookup(le) => ("ResolvedRefs", lookup_error_reason(le)),
        RouteError::MultiplePrefixConditions => ("Valid", "MultiplePrefixConditions"),
        RouteError::EmptyHeaderCondition(_) | RouteError::InvalidHeaderRegex(_) => ("Valid", "InvalidHeaderCondition"),
        RouteError::EmptyQueryCondition(_) | RouteError::InvalidQueryRegex(_) => ("Valid", "InvalidQueryCondition"),
        RouteError::EmptyHashPolicy => ("Valid", "InvalidHashPolicy"),
        RouteError::Inherit(_) => ("Valid", "InclusionError"),
        RouteError::InvalidPort(..) => ("ResolvedRefs", "PortNotMatched"),
        RouteError::Policy(_) => ("Valid", "InvalidPolicy"),
    }
}

fn lookup_error_reason(e: &LookupError) -> &'static str {
    match e {
        LookupError::ServiceNotFound(..) | LookupError::SecretNotFound(..) => "NotFound",
        LookupError::ServicePortNotMatched(..) => "PortNotMatched",
        LookupError::ExternalNameDisabled | LookupError::ExternalNameLoopback => "ExternalNameDisallowed",
        LookupError::SecretInvalid(..) => "SecretInvalid",
        LookupError::DelegationNotPermitted(..) => "RefNotPermitted",
    }
}

fn parse_tls_version(raw: Option<&str>) -> Option<TlsVersion> {
    match raw {
        Some("1.2") => Some(TlsVersion::Tls12),
        Some("1.3") => Some(TlsVersion::Tls13),
        _ => None,
    }
}

/// `tls.secretName` may carry a `namespace/name` delegation form; absent a
/// namespace prefix the secret is assumed to live alongside the proxy.
fn parse_secret_ref(secret_name: &str, proxy_namespace: &str) -> (String, String) {
    match secret_name.split_once('/') {
        Some((ns, name)) => (ns.to_string(), name.to_string()),
        None => (proxy_namespace.to_string(), secret_name.to_string()),
    }
}

fn extension_service_ref(r: &k8s::crd::http_proxy::ExtensionServiceRef, default_namespace: &str) -> String {
    format!("{}/{}", r.namespace.clone().unwrap_or_else(|| default_namespace.to_string()), r.name)
}

struct Note {
    valid: bool,
    type_: &'static str,
    reason: &'static str,
    message: String,
}

fn push_note(
    notes: &mut HashMap<(String, String), Vec<Note>>,
    key: &(String, String),
    valid: bool,
    type_: &'static str,
    reason: &'static str,
    message: impl Into<String>,
) {
    notes.entry(key.clone()).or_default().push(Note {
        valid,
        type_,
        reason,
        message: message.into(),
    });
}

struct CompiledRoute {
    route: Route,
    permit_insecure: bool,
    /// `(namespace, name)` of the proxy document that contributed this
    /// route; used to prune exactly the cyclic subtree's routes rather
    /// than the whole root's (spec.md §4.5).
    origin: (String, String),
}

pub fn run(dag: &mut Dag, cache: &ObjectCache, config: &BuilderConfig) {
    let mut all = cache.list_http_proxies();
    all.sort_by_key(|p| (p.namespace().unwrap_or_default(), p.name_any()));

    let mut notes: HashMap<(String, String), Vec<Note>> = HashMap::default();
    let mut fqdn_index: HashMap<String, (String, String)> = HashMap::default();

    for p in &all {
        let Some(vh) = &p.spec.virtualhost else { continue };
        let key = (p.namespace().unwrap_or_default(), p.name_any());
        if fqdn_index.contains_key(&vh.fqdn) {
            push_note(
                &mut notes,
                &key,
                false,
                "Valid",
                "FqdnConflict",
                format!("fqdn {:?} is already claimed by another HTTPProxy", vh.fqdn),
            );
        } else {
            fqdn_index.insert(vh.fqdn.clone(), key);
        }
    }

    for p in &all {
        let Some(vh_spec) = p.spec.virtualhost.clone() else { continue };
        let key = (p.namespace().unwrap_or_default(), p.name_any());
        if fqdn_index.get(&vh_spec.fqdn) != Some(&key) {
            continue;
        }
        process_root(dag, cache, config, p, &vh_spec, &mut notes);
    }

    for p in &all {
        let key = (p.namespace().unwrap_or_default(), p.name_any());
        let resource = ResourceRef {
            kind: "HTTPProxy".to_string(),
            namespace: key.0.clone(),
            name: key.1.clone(),
            generation: p.metadata.generation.unwrap_or(0),
        };
        let mut accessor = dag.status.accessor(resource);
        for note in notes.remove(&key).unwrap_or_default() {
            if note.valid {
                accessor.add_valid(note.type_, note.reason, note.message);
            } else {
                accessor.add_invalid(note.type_, note.reason, note.message);
            }
        }
        dag.status.commit(accessor);
    }
}

fn process_root(
    dag: &mut Dag,
    cache: &ObjectCache,
    config: &BuilderConfig,
    root: &k8s::HttpProxy,
    vh_spec: &k8s::crd::http_proxy::VirtualHost,
    notes: &mut HashMap<(String, String), Vec<Note>>,
) {
    let root_ns = root.namespace().unwrap_or_default();
    let root_name = root.name_any();
    let key = (root_ns.clone(), root_name.clone());
    let _span = tracing::info_span!("http_proxy", namespace = %root_ns, name = %root_name, fqdn = %vh_spec.fqdn).entered();

    let mut has_tls = false;
    let mut tls_ok = false;
    if let Some(tls) = &vh_spec.tls {
        has_tls = true;
        if let Some(secret_name) = &tls.secret_name {
            let (sns, snm) = parse_secret_ref(secret_name, &root_ns);
            match cache.lookup_tls_secret(&sns, &snm, &root_ns) {
                Ok(_) => match dag.get_single_listener(Protocol::Https) {
                    Ok(l) => {
                        let lname = l.name.clone();
                        let svh = dag.ensure_secure_virtual_host(&lname, &vh_spec.fqdn);
                        svh.secret = Some(format!("{sns}/{snm}"));
                        svh.min_tls_version = parse_tls_version(tls.minimum_protocol_version.as_deref())
                            .unwrap_or(config.default_min_tls_version);
                        svh.max_tls_version = parse_tls_version(tls.maximum_protocol_version.as_deref())
                            .unwrap_or(config.default_max_tls_version);
                        if let Some(cv) = &tls.client_validation {
                            svh.downstream_validation = Some(DownstreamValidation {
                                ca_secret: cv.ca_secret.clone(),
                                skip_client_cert_validation: cv.skip_client_cert_validation.unwrap_or(false),
                                crl_secret: None,
                            });
                        }
                        tls_ok = true;
                    }
                    Err(e) => push_note(notes, &key, false, "Valid", "NoHttpsListener", e.to_string()),
                },
                Err(e) => {
                    let reason = lookup_error_reason(&e);
                    push_note(notes, &key, false, "ResolvedRefs", reason, e.to_string());
                }
            }
        }
    }

    if tls_ok {
        if let Some(auth) = &vh_spec.authorization {
            if let Ok(l) = dag.get_single_listener(Protocol::Https) {
                let lname = l.name.clone();
                dag.ensure_secure_virtual_host(&lname, &vh_spec.fqdn).authorization_service =
                    Some(extension_service_ref(&auth.extension_ref, &root_ns));
            }
        }
        if let Some(cors) = &vh_spec.cors_policy {
            match compile_cors(cors) {
                Ok(c) => {
                    if let Ok(l) = dag.get_single_listener(Protocol::Https) {
                        let lname = l.name.clone();
                        dag.ensure_secure_virtual_host(&lname, &vh_spec.fqdn).cors_policy = Some(c);
                    }
                }
                Err(e) => push_note(notes, &key, false, "Valid", "InvalidPolicy", e.to_string()),
            }
        }
        if let Some(rl) = &vh_spec.rate_limit_policy {
            match compile_rate_limit(rl) {
                Ok(c) => {
                    if let Ok(l) = dag.get_single_listener(Protocol::Https) {
                        let lname = l.name.clone();
                        dag.ensure_secure_virtual_host(&lname, &vh_spec.fqdn).rate_limit_policy = Some(c);
                    }
                }
                Err(e) => push_note(notes, &key, false, "Valid", "InvalidPolicy", e.to_string()),
            }
        }
    }

    let http_listener_name = dag.get_single_listener(Protocol::Http).ok().map(|l| l.name.clone());

    let mut path_stack = vec![key.clone()];
    let mut cyclic_keys: AHashSet<(String, String)> = AHashSet::default();
    let mut routes = visit(dag, cache, config, root, MatchConditions::default(), has_tls, &mut path_stack, notes, &mut cyclic_keys);

    // Only the proxies that actually participate in an inclusion cycle lose
    // their contributed routes; every participant already received its own
    // `CycleError` condition inside `visit`. Non-cyclic siblings (spec.md
    // §4.5: "attempts to place as many valid routes as possible; only
    // validation errors specific to a subtree invalidate that subtree")
    // keep contributing. The A→B→A example at spec.md §8 is the degenerate
    // case where every proxy in the tree is a participant, so it still
    // yields no routes.
    if !cyclic_keys.is_empty() {
        routes.retain(|r| !cyclic_keys.contains(&r.origin));
    }

    for compiled in routes {
        let CompiledRoute { route, permit_insecure, .. } = compiled;
        if permit_insecure || !has_tls {
            if let Some(hname) = &http_listener_name {
                if let Some(vh) = dag.ensure_virtual_host(hname, &vh_spec.fqdn) {
                    vh.add_route(route.clone());
                }
            }
        }
        if tls_ok {
            if let Ok(l) = dag.get_single_listener(Protocol::Https) {
                let lname = l.name.clone();
                dag.ensure_secure_virtual_host(&lname, &vh_spec.fqdn).add_route(route);
            }
        }
    }

    if let Some(tcp) = &root.spec.tcpproxy {
        if tls_ok {
            match compile_tcp_proxy(dag, cache, config, tcp, &root_ns) {
                Ok(clusters) => {
                    if let Ok(l) = dag.get_single_listener(Protocol::Https) {
                        let lname = l.name.clone();
                        dag.ensure_secure_virtual_host(&lname, &vh_spec.fqdn).tcp_proxy = Some(TcpProxy { clusters });
                    }
                }
                Err(e) => {
                    let (type_, reason) = route_error_condition(&e);
                    push_note(notes, &key, false, type_, reason, e.to_string());
                }
            }
        } else {
            push_note(notes, &key, false, "Valid", "NoHttpsListener", "tcpProxy requires a TLS-terminated virtual host");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn visit(
    dag: &mut Dag,
    cache: &ObjectCache,
    config: &BuilderConfig,
    proxy: &k8s::HttpProxy,
    inherited: MatchConditions,
    has_tls: bool,
    path_stack: &mut Vec<(String, String)>,
    notes: &mut HashMap<(String, String), Vec<Note>>,
    cyclic_keys: &mut AHashSet<(String, String)>,
) -> Vec<CompiledRoute> {
    let namespace = proxy.namespace().unwrap_or_default();
    let this_key = (namespace.clone(), proxy.name_any());
    let mut out = Vec::new();

    for route_spec in proxy.spec.routes.iter().flatten() {
        match compile_route(dag, cache, config, route_spec, &inherited, &namespace, has_tls) {
            Ok(mut compiled) => {
                compiled.origin = this_key.clone();
                out.push(compiled);
            }
            Err(e) => {
                let (type_, reason) = route_error_condition(&e);
                push_note(notes, &this_key, false, type_, reason, e.to_string());
            }
        }
    }

    for include in proxy.spec.includes.iter().flatten() {
        let child_ns = include.namespace.clone().unwrap_or_else(|| namespace.clone());
        let child_key = (child_ns.clone(), include.name.clone());

        if let Some(idx) = path_stack.iter().position(|k| k == &child_key) {
            for k in &path_stack[idx..] {
                cyclic_keys.insert(k.clone());
                push_note(notes, k, false, "Valid", "CycleError", "this proxy participates in an inclusion cycle");
            }
            continue;
        }

        let Some(child) = cache.get_http_proxy(&child_ns, &include.name) else {
            push_note(
                notes,
                &this_key,
                false,
                "Valid",
                "InclusionError",
                format!("included HTTPProxy {child_ns}/{} not found", include.name),
            );
            continue;
        };

        let include_conditions = match compile_match_conditions(include.conditions.as_deref().unwrap_or(&[])) {
            Ok(c) => c,
            Err(e) => {
                let (type_, reason) = route_error_condition(&e);
                push_note(notes, &this_key, false, type_, reason, e.to_string());
                continue;
            }
        };
        let merged = match inherited.inherit(&include_conditions) {
            Ok(m) => m,
            Err(e) => {
                push_note(notes, &this_key, false, "Valid", "InclusionError", e.to_string());
                continue;
            }
        };

        path_stack.push(child_key);
        out.extend(visit(dag, cache, config, &child, merged, has_tls, path_stack, notes, cyclic_keys));
        path_stack.pop();
    }

    out
}

fn compile_match_conditions(conditions: &[k8s::crd::http_proxy::MatchCondition]) -> Result<MatchConditions, RouteError> {
    let mut path: Option<PathMatch> = None;
    let mut headers = Vec::new();
    let mut query_params = Vec::new();
    for c in conditions {
        if let Some(prefix) = &c.prefix {
            if path.is_some() {
                return Err(RouteError::MultiplePrefixConditions);
            }
            path = Some(PathMatch::prefix(prefix.clone()));
        }
        if let Some(h) = &c.header {
            headers.push(compile_header_condition(h)?);
        }
        if let Some(q) = &c.query_parameter {
            query_params.push(compile_query_condition(q)?);
        }
    }
    Ok(MatchConditions { path, headers, query_params })
}

fn compile_header_condition(h: &k8s::crd::http_proxy::HeaderCondition) -> Result<HeaderMatch, RouteError> {
    let (kind, value) = if h.present == Some(true) {
        (HeaderMatchKind::Present, String::new())
    } else if h.notpresent == Some(true) {
        (HeaderMatchKind::NotPresent, String::new())
    } else if let Some(v) = &h.exact {
        (HeaderMatchKind::Exact, v.clone())
    } else if let Some(v) = &h.notexact {
        (HeaderMatchKind::NotExact, v.clone())
    } else if let Some(v) = &h.contains {
        (HeaderMatchKind::Contains, v.clone())
    } else if let Some(v) = &h.notcontains {
        (HeaderMatchKind::NotContains, v.clone())
    } else if let Some(v) = &h.regex {
        Regex::new(v).map_err(|_| RouteError::InvalidHeaderRegex(h.name.clone()))?;
        (HeaderMatchKind::Regex, v.clone())
    } else {
        return Err(RouteError::EmptyHeaderCondition(h.name.clone()));
    };
    Ok(HeaderMatch { name: h.name.clone(), kind, value })
}

fn compile_query_condition(q: &k8s::crd::http_proxy::QueryParameterCondition) -> Result<QueryParamMatch, RouteError> {
    if let Some(v) = &q.exact {
        Ok(QueryParamMatch::Exact(q.name.clone(), v.clone()))
    } else if let Some(v) = &q.regex {
        Regex::new(v).map_err(|_| RouteError::InvalidQueryRegex(q.name.clone()))?;
        Ok(QueryParamMatch::Regex(q.name.clone(), v.clone()))
    } else {
        Err(RouteError::EmptyQueryCondition(q.name.clone()))
    }
}

fn compile_headers_policy(
    hp: &k8s::crd::http_proxy::HeadersPolicy,
    allow_host_rewrite: bool,
) -> Result<ingress_dag_core::policy::HeadersPolicy, RouteError> {
    let set: Vec<(String, String)> = hp.set.iter().flatten().map(|h| (h.name.clone(), h.value.clone())).collect();
    let add: Vec<(String, String)> = hp.add.iter().flatten().map(|h| (h.name.clone(), h.value.clone())).collect();
    let remove = hp.remove.clone().unwrap_or_default();
    policy::headers_policy(&set, &add, &remove, allow_host_rewrite).map_err(RouteError::Policy)
}

fn compile_cors(cors: &k8s::crd::http_proxy::CorsPolicy) -> Result<CorsPolicy, RouteError> {
    policy::cors_policy(
        &cors.allow_origin,
        cors.allow_methods.as_deref().unwrap_or(&[]),
        cors.allow_headers.as_deref().unwrap_or(&[]),
        cors.expose_headers.as_deref().unwrap_or(&[]),
        cors.allow_credentials.unwrap_or(false),
        cors.max_age.as_deref(),
    )
    .map_err(RouteError::Policy)
}

fn compile_rate_limit(rl: &k8s::crd::http_proxy::RateLimitPolicy) -> Result<RateLimitPolicy, RouteError> {
    let local = rl
        .local
        .as_ref()
        .map(|l| policy::local_rate_limit_policy(l.requests, &l.unit, l.burst))
        .transpose()
        .map_err(RouteError::Policy)?;

    let mut global = Vec::new();
    for descriptor in rl.global.iter().flat_map(|g| g.descriptors.iter()) {
        let mut entries = Vec::new();
        for e in &descriptor.entries {
            let generic_key = e.generic_key.as_ref().map(|g| (g.key.clone(), g.value.clone()));
            let request_header = e.request_header.as_ref().map(|h| (h.header_name.clone(), h.descriptor_key.clone()));
            let request_header_value_match = match &e.request_header_value_match {
                Some(m) => {
                    let headers: Vec<(String, String)> = m
                        .headers
                        .iter()
                        .map(|h| compile_header_condition(h).map(|hm| (hm.name, hm.value)))
                        .collect::<Result<_, _>>()?;
                    Some((m.value.clone(), headers))
                }
                None => None,
            };
            let remote_address = e.remote_address.is_some();
            entries.push(
                policy::rate_limit_descriptor_entry(generic_key, request_header, request_header_value_match, remote_address)
                    .map_err(RouteError::Policy)?,
            );
        }
        global.push(policy::global_rate_limit_descriptor(entries));
    }
    Ok(policy::rate_limit_policy(local, global))
}

fn compile_hash_policy(h: &k8s::crd::http_proxy::RequestHashPolicy) -> Result<RequestHashPolicy, RouteError> {
    let terminal = h.terminal.unwrap_or(false);
    if h.hash_source_ip == Some(true) {
        return Ok(policy::request_hash_policy(terminal, HashPolicyTarget::SourceIp, None));
    }
    if let Some(hh) = &h.header_hash_options {
        return Ok(policy::request_hash_policy(terminal, HashPolicyTarget::Header(hh.header_name.clone()), None));
    }
    if let Some(qh) = &h.query_parameter_hash_options {
        return Ok(policy::request_hash_policy(
            terminal,
            HashPolicyTarget::QueryParameter(qh.parameter_name.clone()),
            None,
        ));
    }
    Err(RouteError::EmptyHashPolicy)
}

fn compile_route(
    dag: &mut Dag,
    cache: &ObjectCache,
    config: &BuilderConfig,
    route_spec: &k8s::crd::http_proxy::Route,
    inherited: &MatchConditions,
    namespace: &str,
    has_tls: bool,
) -> Result<CompiledRoute, RouteError> {
    let own_conditions = compile_match_conditions(route_spec.conditions.as_deref().unwrap_or(&[]))?;
    let conditions = inherited.inherit(&own_conditions)?;
    let mut route = Route::new(conditions);

    let backend_count = route_spec.services.iter().flatten().filter(|s| s.mirror != Some(true)).count();
    for svc in route_spec.services.iter().flatten() {
        let port = NonZeroU16::new(svc.port).ok_or_else(|| RouteError::InvalidPort(namespace.to_string(), svc.name.clone(), svc.port))?;
        let mut resolved = cache
            .lookup_service(namespace, &svc.name, PortRef::Number(port.get()), config.enable_external_name_service)
            .map_err(RouteError::Lookup)?;
        resolved.weighted = backend_count > 1;
        let key = resolved.key.clone();
        dag.ensure_service(key.clone(), |_| resolved.clone());

        let mut cluster = Cluster::new(key, svc.weight.unwrap_or(1).max(1));
        cluster.protocol = match svc.protocol.as_deref() {
            Some("tls") => UpstreamProtocol::Tls,
            Some("h2") => UpstreamProtocol::H2,
            Some("h2c") => UpstreamProtocol::H2c,
            _ => UpstreamProtocol::None,
        };
        if let Some(uv) = &svc.upstream_validation {
            cluster.upstream_validation = Some(UpstreamValidation {
                ca_secret: Some(uv.ca_secret.clone()),
                subject_name: Some(uv.subject_name.clone()),
            });
        }
        if let Some(hc) = &svc.health_check_policy {
            cluster.health_check = Some(policy::health_check_policy(
                &hc.path,
                hc.host.as_deref(),
                hc.interval_seconds,
                hc.timeout_seconds,
                hc.unhealthy_threshold_count,
                hc.healthy_threshold_count,
            ));
        }
        if let Some(hp) = &svc.request_headers_policy {
            cluster.request_headers_policy = Some(compile_headers_policy(hp, true)?);
        }
        if let Some(hp) = &svc.response_headers_policy {
            cluster.response_headers_policy = Some(compile_headers_policy(hp, false)?);
        }

        if svc.mirror == Some(true) {
            route.mirror_policy.push(MirrorClusters {
                cluster,
                policy: MirrorPolicy { weight: svc.weight.unwrap_or(100) },
            });
        } else {
            route.clusters.push(cluster);
        }
    }

    if let Some(rp) = &route_spec.retry_policy {
        route.retry_policy = policy::retry_policy(rp.retry_on.as_deref().unwrap_or(&[]), rp.num_retries, rp.per_try_timeout.as_deref());
    }
    route.timeout_policy = route_spec
        .timeout_policy
        .as_ref()
        .map(|tp| policy::timeout_policy(tp.response.as_deref()))
        .unwrap_or_default();
    if let Some(hp) = &route_spec.request_headers_policy {
        route.request_headers_policy = Some(compile_headers_policy(hp, false)?);
    }
    if let Some(hp) = &route_spec.response_headers_policy {
        route.response_headers_policy = Some(compile_headers_policy(hp, false)?);
    }
    if let Some(rl) = &route_spec.rate_limit_policy {
        route.rate_limit_policy = Some(compile_rate_limit(rl)?);
    }
    if let Some(lb) = &route_spec.load_balancer_policy {
        use ingress_dag_core::policy::LoadBalancerPolicy as Lbp;
        use k8s::crd::http_proxy::LoadBalancerPolicy as CrdLbp;
        let compiled = match lb {
            CrdLbp::WeightedLeastRequest => Lbp::WeightedLeastRequest,
            CrdLbp::Random => Lbp::Random,
            CrdLbp::RoundRobin => Lbp::RoundRobin,
            CrdLbp::Cookie => Lbp::Cookie,
            CrdLbp::RequestHash => Lbp::RequestHash,
        };
        for c in &mut route.clusters {
            c.load_balancer_policy = compiled;
        }
    }
    for hash in route_spec.request_hash_policy.iter().flatten() {
        route.request_hash_policies.push(compile_hash_policy(hash)?);
    }
    if let Some(auth) = &route_spec.auth_policy {
        route.auth_disabled = auth.disabled.unwrap_or(false);
        if let Some(ctx) = &auth.context {
            route.auth_context = ctx.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
    }
    if let Some(prw) = &route_spec.path_rewrite_policy {
        if let Some(rp) = prw.replace_prefix.as_ref().and_then(|v| v.first()) {
            route.prefix_rewrite = Some(rp.replacement.clone());
        }
    }
    route.websocket = route_spec.enable_websockets.unwrap_or(false);

    let permit_insecure = route_spec.permit_insecure.unwrap_or(false);
    route.https_upgrade = has_tls && !permit_insecure;

    Ok(CompiledRoute { route, permit_insecure, origin: (String::new(), String::new()) })
}

fn compile_tcp_proxy(
    dag: &mut Dag,
    cache: &ObjectCache,
    config: &BuilderConfig,
    tcp: &k8s::crd::http_proxy::TcpProxy,
    namespace: &str,
) -> Result<Vec<Cluster>, RouteError> {
    let mut clusters = Vec::new();
    for svc in tcp.services.iter().flatten() {
        let port = NonZeroU16::new(svc.port).ok_or_else(|| RouteError::InvalidPort(namespace.to_string(), svc.name.clone(), svc.port))?;
        let resolved = cache
            .lookup_service(namespace, &svc.name, PortRef::Number(port.get()), config.enable_external_name_service)
            .map_err(RouteError::Lookup)?;
        let key = resolved.key.clone();
        dag.ensure_service(key.clone(), |_| resolved.clone());
        let mut cluster = Cluster::new(key, svc.weight.unwrap_or(1).max(1));
        cluster.protocol = match svc.protocol.as_deref() {
            Some("tls") => UpstreamProtocol::Tls,
            _ => UpstreamProtocol::None,
        };
        clusters.push(cluster);
    }
    // `tcp.include` (delegating a TCPProxy to another document) has no
    // equivalent in this builder: TCPProxy only ever attaches services
    // directly to the root that owns the SecureVirtualHost.
    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_cache::Object;
    use ingress_dag_k8s_api::ObjectMeta;

    fn service(namespace: &str, name: &str, port: i32) -> k8s::Service {
        k8s::Service {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(k8s::ServiceSpec {
                ports: Some(vec![k8s::ServicePort { port, name: Some("http".to_string()), ..Default::default() }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn proxy(namespace: &str, name: &str, spec: k8s::HttpProxySpec) -> k8s::HttpProxy {
        k8s::HttpProxy {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    fn route_to(name: &str, port: i32) -> k8s::crd::http_proxy::Route {
        k8s::crd::http_proxy::Route {
            conditions: None,
            services: Some(vec![k8s::crd::http_proxy::ServiceBackend {
                name: name.to_string(),
                port: port as u16,
                protocol: None,
                weight: None,
                mirror: None,
                upstream_validation: None,
                health_check_policy: None,
                request_headers_policy: None,
                response_headers_policy: None,
            }]),
            retry_policy: None,
            timeout_policy: None,
            rate_limit_policy: None,
            request_headers_policy: None,
            response_headers_policy: None,
            permit_insecure: None,
            path_rewrite_policy: None,
            enable_websockets: None,
            auth_policy: None,
            load_balancer_policy: None,
            request_hash_policy: None,
        }
    }

    #[test]
    fn wildcard_vhost_gets_authority_header_match() {
        let mut dag = Dag::new();
        super::super::listener::run(&mut dag, &BuilderConfig::default());
        let cache = ObjectCache::new();
        cache.insert(Object::Service(service("default", "svc", 80)));
        cache.insert(Object::HttpProxy(proxy(
            "default",
            "wild",
            k8s::HttpProxySpec {
                virtualhost: Some(k8s::crd::http_proxy::VirtualHost {
                    fqdn: "*.example.com".to_string(),
                    tls: None,
                    cors_policy: None,
                    rate_limit_policy: None,
                    authorization: None,
                }),
                routes: Some(vec![route_to("svc", 80)]),
                tcpproxy: None,
                includes: None,
            },
        )));

        run(&mut dag, &cache, &BuilderConfig::default());

        let vh = dag.get_virtual_hosts().find(|v| v.name == "*.example.com").expect("vhost created");
        let route = vh.routes().next().expect("route created");
        assert!(route.conditions.headers.iter().any(|h| h.name == ":authority"));
    }

    #[test]
    fn inclusion_with_prefix_inheritance() {
        let mut dag = Dag::new();
        super::super::listener::run(&mut dag, &BuilderConfig::default());
        let cache = ObjectCache::new();
        cache.insert(Object::Service(service("default", "svc", 9000)));
        cache.insert(Object::HttpProxy(proxy(
            "default",
            "b",
            k8s::HttpProxySpec {
                virtualhost: None,
                routes: Some(vec![{
                    let mut r = route_to("svc", 9000);
                    r.conditions = Some(vec![k8s::crd::http_proxy::MatchCondition {
                        prefix: Some("/v1".to_string()),
                        header: None,
                        query_parameter: None,
                    }]);
                    r
                }]),
                tcpproxy: None,
                includes: None,
            },
        )));
        cache.insert(Object::HttpProxy(proxy(
            "default",
            "a",
            k8s::HttpProxySpec {
                virtualhost: Some(k8s::crd::http_proxy::VirtualHost {
                    fqdn: "x.y".to_string(),
                    tls: None,
                    cors_policy: None,
                    rate_limit_policy: None,
                    authorization: None,
                }),
                routes: None,
                tcpproxy: None,
                includes: Some(vec![k8s::crd::http_proxy::Include {
                    name: "b".to_string(),
                    namespace: None,
                    conditions: Some(vec![k8s::crd::http_proxy::MatchCondition {
                        prefix: Some("/api".to_string()),
                        header: Some(k8s::crd::http_proxy::HeaderCondition {
                            name: "x-user".to_string(),
                            present: None,
                            notpresent: None,
                            contains: Some("abc".to_string()),
                            notcontains: None,
                            exact: None,
                            notexact: None,
                            regex: None,
                        }),
                        query_parameter: None,
                    }]),
                }]),
            },
        )));

        run(&mut dag, &cache, &BuilderConfig::default());

        let vh = dag.get_virtual_hosts().find(|v| v.name == "x.y").expect("vhost created");
        let route = vh.routes().next().expect("route created");
        match &route.conditions.path {
            Some(PathMatch::Prefix { value, .. }) => assert_eq!(value, "/api/v1"),
            other => panic!("unexpected path {other:?}"),
        }
        assert!(route.conditions.headers.iter().any(|h| h.name == "x-user" && h.kind == HeaderMatchKind::Contains));
        assert_eq!(route.clusters[0].upstream.port.get(), 9000);
    }

    #[test]
    fn mutual_inclusion_cycle_invalidates_both() {
        let mut dag = Dag::new();
        super::super::listener::run(&mut dag, &BuilderConfig::default());
        let cache = ObjectCache::new();
        cache.insert(Object::HttpProxy(proxy(
            "default",
            "a",
            k8s::HttpProxySpec {
                virtualhost: Some(k8s::crd::http_proxy::VirtualHost {
                    fqdn: "cyclic.example.com".to_string(),
                    tls: None,
                    cors_policy: None,
                    rate_limit_policy: None,
                    authorization: None,
                }),
                routes: None,
                tcpproxy: None,
                includes: Some(vec![k8s::crd::http_proxy::Include { name: "b".to_string(), namespace: None, conditions: None }]),
            },
        )));
        cache.insert(Object::HttpProxy(proxy(
            "default",
            "b",
            k8s::HttpProxySpec {
                virtualhost: None,
                routes: None,
                tcpproxy: None,
                includes: Some(vec![k8s::crd::http_proxy::Include { name: "a".to_string(), namespace: None, conditions: None }]),
            },
        )));

        run(&mut dag, &cache, &BuilderConfig::default());

        assert_eq!(dag.get_virtual_hosts().count(), 0);
        let a_status = dag
            .status
            .get(&ResourceRef { kind: "HTTPProxy".to_string(), namespace: "default".to_string(), name: "a".to_string(), generation: 1 })
            .unwrap();
        assert!(a_status.conditions.iter().any(|c| c.reason == "CycleError"));
        let b_status = dag
            .status
            .get(&ResourceRef { kind: "HTTPProxy".to_string(), namespace: "default".to_string(), name: "b".to_string(), generation: 1 })
            .unwrap();
        assert!(b_status.conditions.iter().any(|c| c.reason == "CycleError"));
    }

    #[test]
    fn cyclic_sibling_does_not_invalidate_valid_sibling_routes() {
        // Root `a` includes valid `b` (one route) and cyclic `c` (c -> a).
        // Only the a/c subtree should lose its routes; b's route survives.
        let mut dag = Dag::new();
        super::super::listener::run(&mut dag, &BuilderConfig::default());
        let cache = ObjectCache::new();
        cache.insert(Object::Service(service("default", "svc", 9000)));
        cache.insert(Object::HttpProxy(proxy(
            "default",
            "a",
            k8s::HttpProxySpec {
                virtualhost: Some(k8s::crd::http_proxy::VirtualHost {
                    fqdn: "x.y".to_string(),
                    tls: None,
                    cors_policy: None,
                    rate_limit_policy: None,
                    authorization: None,
                }),
                routes: None,
                tcpproxy: None,
                includes: Some(vec![
                    k8s::crd::http_proxy::Include { name: "b".to_string(), namespace: None, conditions: None },
                    k8s::crd::http_proxy::Include { name: "c".to_string(), namespace: None, conditions: None },
                ]),
            },
        )));
        cache.insert(Object::HttpProxy(proxy(
            "default",
            "b",
            k8s::HttpProxySpec {
                virtualhost: None,
                routes: Some(vec![route_to("svc", 9000)]),
                tcpproxy: None,
                includes: None,
            },
        )));
        cache.insert(Object::HttpProxy(proxy(
            "default",
            "c",
            k8s::HttpProxySpec {
                virtualhost: None,
                routes: None,
                tcpproxy: None,
                includes: Some(vec![k8s::crd::http_proxy::Include { name: "a".to_string(), namespace: None, conditions: None }]),
            },
        )));

        run(&mut dag, &cache, &BuilderConfig::default());

        let vh = dag.get_virtual_hosts().find(|v| v.name == "x.y").expect("vhost created from non-cyclic sibling b");
        assert_eq!(vh.routes().count(), 1);
        assert_eq!(vh.routes().next().unwrap().clusters[0].upstream.port.get(), 9000);

        let a_status = dag
            .status
            .get(&ResourceRef { kind: "HTTPProxy".to_string(), namespace: "default".to_string(), name: "a".to_string(), generation: 1 })
            .unwrap();
        assert!(a_status.conditions.iter().any(|c| c.reason == "CycleError"));
        let c_status = dag
            .status
            .get(&ResourceRef { kind: "HTTPProxy".to_string(), namespace: "default".to_string(), name: "c".to_string(), generation: 1 })
            .unwrap();
        assert!(c_status.conditions.iter().any(|c| c.reason == "CycleError"));
    }
}
