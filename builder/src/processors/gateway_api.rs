//! `GatewayAPIProcessor`: binds HTTPRoute/TLSRoute objects to the single
//! configured Gateway's listeners (spec.md §4.6/C4).
//!
//! Each Gateway listener gets its own named DAG `Listener` (distinct from
//! the two protocol-keyed listeners the static config seeds) so that two
//! listeners on the same protocol but different ports/sectionNames stay
//! independently addressable, matching the `sectionName` routing scenario
//! (spec.md §8 scenario 5). `GetSingleListener` is deliberately not used
//! here; see DESIGN.md.
//!
//! Grounded on `linkerd-linkerd2/policy-controller/k8s/index/src/outbound/index.rs`'s
//! Gateway-API route-to-parent binding, generalized with the namespace/kind
//! filtering, `ReferenceGrant` checks, and hostname intersection spec.md
//! calls for; match/filter compilation reuses `http_proxy.rs`'s conventions.

use crate::config::BuilderConfig;
use crate::object_cache::ObjectCache;
use crate::policy;
use ahash::AHashSet as HashSet;
use ingress_dag_core::cluster::Cluster;
use ingress_dag_core::dag::Dag;
use ingress_dag_core::http_route::{hostname_intersect, HeaderMatch, HeaderMatchKind, MatchConditions, PathMatch, QueryParamMatch};
use ingress_dag_core::listener::{Listener, Protocol};
use ingress_dag_core::route::{MirrorClusters, Redirect, Route};
use ingress_dag_core::status::{ConditionsAccessor, ResourceRef};
use ingress_dag_core::virtualhost::TcpProxy;
use ingress_dag_k8s_api as k8s;
use ingress_dag_k8s_api::ResourceExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GwProtocol {
    Http,
    Https,
    Tls,
}

struct BoundListener {
    name: String,
    protocol: GwProtocol,
    hostname: Option<String>,
    allowed_routes: Option<k8s::AllowedRoutes>,
}

pub fn run(dag: &mut Dag, cache: &ObjectCache, config: &BuilderConfig) {
    let Some((gw_namespace, gw_name)) = &config.gateway else {
        return;
    };
    let Some(gateway) = cache
        .list_gateways()
        .into_iter()
        .find(|g| g.namespace().as_deref() == Some(gw_namespace.as_str()) && g.name_any() == *gw_name)
    else {
        return;
    };

    let _span = tracing::info_span!("gateway", namespace = %gw_namespace, name = %gw_name).entered();

    let resource = ResourceRef {
        kind: "Gateway".to_string(),
        namespace: gw_namespace.clone(),
        name: gw_name.clone(),
        generation: gateway.metadata.generation.unwrap_or(0),
    };
    let mut status = dag.status.accessor(resource);

    let listeners = validate_and_seed_listeners(dag, cache, &gateway, &mut status);

    for route in cache.list_http_routes() {
        process_http_route(dag, cache, config, &gateway, &listeners, &route);
    }
    for route in cache.list_tls_routes() {
        process_tls_route(dag, cache, config, &gateway, &listeners, &route);
    }

    dag.status.commit(status);
}

fn validate_and_seed_listeners(
    dag: &mut Dag,
    cache: &ObjectCache,
    gateway: &k8s::Gateway,
    status: &mut ConditionsAccessor,
) -> Vec<BoundListener> {
    let gw_namespace = gateway.namespace().unwrap_or_default();
    let mut seen_names: HashSet<String> = HashSet::default();
    let mut out = Vec::new();

    for l in &gateway.spec.listeners {
        if !seen_names.insert(l.name.clone()) {
            status.add_invalid("Ready", "DuplicateListenerName", format!("listener {:?} name is not unique", l.name));
            continue;
        }

        let protocol = match l.protocol.as_str() {
            "HTTP" => GwProtocol::Http,
            "HTTPS" => GwProtocol::Https,
            "TLS" => GwProtocol::Tls,
            other => {
                status.add_invalid("Ready", "UnsupportedProtocol", format!("listener {:?} has unsupported protocol {other:?}", l.name));
                continue;
            }
        };

        let dag_protocol = match protocol {
            GwProtocol::Http => {
                if l.tls.is_some() {
                    status.add_invalid("Ready", "Invalid", format!("listener {:?}: protocol HTTP must not set tls", l.name));
                    continue;
                }
                Protocol::Http
            }
            GwProtocol::Https => {
                let Some(tls) = &l.tls else {
                    status.add_invalid("Ready", "Invalid", format!("listener {:?}: protocol HTTPS requires tls", l.name));
                    continue;
                };
                let terminate = tls.mode.as_ref().map(|m| matches!(m, k8s::TlsModeType::Terminate)).unwrap_or(true);
                let refs = tls.certificate_refs.clone().unwrap_or_default();
                if !terminate || refs.len() != 1 {
                    status.add_invalid(
                        "Ready",
                        "Invalid",
                        format!("listener {:?}: HTTPS requires Terminate mode and exactly one certificateRef", l.name),
                    );
                    continue;
                }
                let cert = &refs[0];
                let secret_namespace = cert.namespace.clone().unwrap_or_else(|| gw_namespace.clone());
                if secret_namespace != gw_namespace
                    && !cache.reference_grant_permits(
                        "gateway.networking.k8s.io",
                        "Gateway",
                        &gw_namespace,
                        "",
                        "Secret",
                        &secret_namespace,
                        Some(&cert.name),
                    )
                {
                    status.add_invalid(
                        "Ready",
                        "RefNotPermitted",
                        format!("listener {:?}: cross-namespace secret ref to {secret_namespace}/{} not permitted", l.name, cert.name),
                    );
                    continue;
                }
                if cache.lookup_tls_secret(&secret_namespace, &cert.name, &gw_namespace).is_err() {
                    status.add_invalid(
                        "Ready",
                        "InvalidCertificateRef",
                        format!("listener {:?}: secret {secret_namespace}/{} missing or invalid", l.name, cert.name),
                    );
                    continue;
                }
                Protocol::Https
            }
            GwProtocol::Tls => {
                let passthrough = l
                    .tls
                    .as_ref()
                    .and_then(|tls| tls.mode.as_ref())
                    .map(|m| matches!(m, k8s::TlsModeType::Passthrough))
                    .unwrap_or(false);
                let has_certs = l
                    .tls
                    .as_ref()
                    .and_then(|tls| tls.certificate_refs.as_ref())
                    .map(|refs| !refs.is_empty())
                    .unwrap_or(false);
                if !passthrough || has_certs {
                    status.add_invalid(
                        "Ready",
                        "Invalid",
                        format!("listener {:?}: protocol TLS requires Passthrough mode and no certificateRefs", l.name),
                    );
                    continue;
                }
                Protocol::Https
            }
        };

        dag.add_listener(Listener::new(l.name.clone(), "0.0.0.0", l.port as u16, dag_protocol));
        status.add_valid("Ready", "Valid", format!("listener {:?} accepted", l.name));
        out.push(BoundListener {
            name: l.name.clone(),
            protocol,
            hostname: l.hostname.clone(),
            allowed_routes: l.allowed_routes.clone(),
        });
    }
    out
}

fn allowed_kind(listener: &BoundListener, route_kind: &str) -> bool {
    match listener.allowed_routes.as_ref().and_then(|ar| ar.kinds.as_ref()) {
        Some(kinds) if !kinds.is_empty() => kinds.iter().any(|k| k.kind == route_kind),
        _ => match listener.protocol {
            GwProtocol::Http | GwProtocol::Https => route_kind == "HTTPRoute",
            GwProtocol::Tls => route_kind == "TLSRoute",
        },
    }
}

fn allowed_namespace(listener: &BoundListener, cache: &ObjectCache, gw_namespace: &str, route_namespace: &str) -> bool {
    let Some(allowed) = &listener.allowed_routes else {
        return true;
    };
    let Some(namespaces) = &allowed.namespaces else {
        return true;
    };
    match &namespaces.from {
        None | Some(k8s::FromNamespaces::All) => true,
        Some(k8s::FromNamespaces::Same) => route_namespace == gw_namespace,
        Some(k8s::FromNamespaces::Selector) => match &namespaces.selector {
            Some(selector) => namespace_matches_selector(cache, route_namespace, selector),
            None => false,
        },
    }
}

fn namespace_matches_selector(cache: &ObjectCache, namespace: &str, selector: &k8s::LabelSelector) -> bool {
    let labels = cache.namespace_labels(namespace).unwrap_or_default();
    let labels_ok = selector.match_labels.iter().flatten().all(|(k, v)| labels.get(k) == Some(v));
    let expr_ok = selector.match_expressions.iter().flatten().all(|req| {
        let present = labels.contains_key(&req.key);
        let values = req.values.clone().unwrap_or_default();
        match req.operator.as_str() {
            "Exists" => present,
            "DoesNotExist" => !present,
            "In" => labels.get(&req.key).map(|v| values.contains(v)).unwrap_or(false),
            "NotIn" => !labels.get(&req.key).map(|v| values.contains(v)).unwrap_or(false),
            _ => true,
        }
    });
    labels_ok && expr_ok
}

fn bound_listeners<'a>(
    gateway: &k8s::Gateway,
    listeners: &'a [BoundListener],
    cache: &ObjectCache,
    route_namespace: &str,
    route_kind: &str,
    section_name: Option<&str>,
) -> Vec<&'a BoundListener> {
    let gw_namespace = gateway.namespace().unwrap_or_default();
    listeners
        .iter()
        .filter(|l| {
            if let Some(section_name) = section_name {
                if l.name != section_name {
                    return false;
                }
            }
            allowed_kind(l, route_kind) && allowed_namespace(l, cache, &gw_namespace, route_namespace)
        })
        .collect()
}

fn parent_targets_gateway(parent: &k8s::ParentReference, gw_namespace: &str, gw_name: &str, route_namespace: &str) -> bool {
    let group_ok = parent.group.as_deref().map(|g| g.is_empty() || g == "gateway.networking.k8s.io").unwrap_or(true);
    let kind_ok = parent.kind.as_deref().unwrap_or("Gateway") == "Gateway";
    let namespace = parent.namespace.clone().unwrap_or_else(|| route_namespace.to_string());
    group_ok && kind_ok && namespace == gw_namespace && parent.name == gw_name
}

fn compile_match(m: &k8s::HttpRouteMatch) -> MatchConditions {
    let path = m.path.as_ref().map(|p| match p {
        k8s::HttpPathMatch::Exact { value } => PathMatch::Exact(value.clone()),
        k8s::HttpPathMatch::PathPrefix { value } => PathMatch::prefix(value.clone()),
        k8s::HttpPathMatch::RegularExpression { value } => PathMatch::regex(value).unwrap_or_else(|_| PathMatch::Exact(value.clone())),
    });
    let headers = m
        .headers
        .iter()
        .flatten()
        .map(|h| match h {
            k8s::HttpHeaderMatch::Exact { name, value } => {
                HeaderMatch { name: name.clone(), kind: HeaderMatchKind::Exact, value: value.clone() }
            }
            k8s::HttpHeaderMatch::RegularExpression { name, value } => {
                HeaderMatch { name: name.clone(), kind: HeaderMatchKind::Regex, value: value.clone() }
            }
        })
        .collect();
    let query_params = m
        .query_params
        .iter()
        .flatten()
        .map(|q| match q {
            k8s::HttpQueryParamMatch::Exact { name, value } => QueryParamMatch::Exact(name.clone(), value.clone()),
            k8s::HttpQueryParamMatch::RegularExpression { name, value } => QueryParamMatch::Regex(name.clone(), value.clone()),
        })
        .collect();
    MatchConditions { path, headers, query_params }
}

fn default_match() -> MatchConditions {
    MatchConditions {
        path: Some(PathMatch::prefix("/")),
        headers: Vec::new(),
        query_params: Vec::new(),
    }
}

fn apply_filters(route: &mut Route, cache: &ObjectCache, config: &BuilderConfig, route_namespace: &str, filters: &[k8s::HttpRouteFilter], status: &mut ConditionsAccessor) {
    for filter in filters {
        match filter {
            k8s::HttpRouteFilter::RequestHeaderModifier { request_header_modifier } => {
                let set: Vec<(String, String)> = request_header_modifier.set.iter().flatten().map(|h| (h.name.clone(), h.value.clone())).collect();
                let add: Vec<(String, String)> = request_header_modifier.add.iter().flatten().map(|h| (h.name.clone(), h.value.clone())).collect();
                let remove = request_header_modifier.remove.clone().unwrap_or_default();
                match policy::headers_policy(&set, &add, &remove, false) {
                    Ok(p) => route.request_headers_policy = Some(p),
                    Err(e) => status.add_invalid("Valid", "InvalidFilter", e.to_string()),
                }
            }
            k8s::HttpRouteFilter::RequestRedirect { request_redirect } => {
                route.redirect = Some(Redirect {
                    scheme: request_redirect.scheme.clone(),
                    hostname: request_redirect.hostname.clone(),
                    port: request_redirect.port.map(|p| p as u16),
                    status: request_redirect.status_code.map(|s| s as u16),
                    path: None,
                    prefix: None,
                });
            }
            k8s::HttpRouteFilter::RequestMirror { request_mirror } => {
                match resolve_backend(cache, config, route_namespace, "HTTPRoute", &request_mirror.backend_ref) {
                    Ok(service) => {
                        let key = service.key.clone();
                        route.mirror_policy.push(MirrorClusters {
                            cluster: Cluster::new(key, 1),
                            policy: ingress_dag_core::policy::MirrorPolicy { weight: 100 },
                        });
                    }
                    Err(e) => status.add_invalid("ResolvedRefs", e.reason(), e.to_string()),
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum BackendError {
    #[error("cross-namespace reference to {0}/{1} is not permitted")]
    RefNotPermitted(String, String),
    #[error("backend ref has no port")]
    NoPort,
    #[error(transparent)]
    Lookup(#[from] crate::object_cache::LookupError),
}

impl BackendError {
    fn reason(&self) -> &'static str {
        match self {
            Self::RefNotPermitted(..) => "RefNotPermitted",
            Self::NoPort => "PortNotMatched",
            Self::Lookup(e) => match e {
                crate::object_cache::LookupError::ServiceNotFound(..) => "NotFound",
                crate::object_cache::LookupError::ServicePortNotMatched(..) => "PortNotMatched",
                crate::object_cache::LookupError::ExternalNameDisabled | crate::object_cache::LookupError::ExternalNameLoopback => "ExternalNameDisallowed",
                crate::object_cache::LookupError::SecretNotFound(..) | crate::object_cache::LookupError::SecretInvalid(..) => "SecretInvalid",
                crate::object_cache::LookupError::DelegationNotPermitted(..) => "RefNotPermitted",
            },
        }
    }
}

fn resolve_backend(
    cache: &ObjectCache,
    config: &BuilderConfig,
    route_namespace: &str,
    from_kind: &str,
    backend_ref: &k8s::BackendObjectReference,
) -> Result<ingress_dag_core::service::Service, BackendError> {
    let namespace = backend_ref.namespace.clone().unwrap_or_else(|| route_namespace.to_string());
    if namespace != route_namespace
        && !cache.reference_grant_permits("gateway.networking.k8s.io", from_kind, route_namespace, "", "Service", &namespace, Some(&backend_ref.name))
    {
        return Err(BackendError::RefNotPermitted(namespace, backend_ref.name.clone()));
    }
    let port = backend_ref.port.ok_or(BackendError::NoPort)?;
    Ok(cache.lookup_service(&namespace, &backend_ref.name, crate::object_cache::PortRef::Number(port), config.enable_external_name_service)?)
}

fn process_http_route(dag: &mut Dag, cache: &ObjectCache, config: &BuilderConfig, gateway: &k8s::Gateway, listeners: &[BoundListener], route: &k8s::HttpRoute) {
    let namespace = route.namespace().unwrap_or_default();
    let name = route.name_any();
    let _span = tracing::info_span!("http_route", %namespace, %name).entered();

    let resource = ResourceRef {
        kind: "HTTPRoute".to_string(),
        namespace: namespace.clone(),
        name: name.clone(),
        generation: route.metadata.generation.unwrap_or(0),
    };
    let mut status = dag.status.accessor(resource);

    let gw_namespace = gateway.namespace().unwrap_or_default();
    let gw_name = gateway.name_any();
    let route_hostnames: Vec<String> = route.spec.hostnames.clone().unwrap_or_default();

    let mut bound_any = false;
    for parent in &route.spec.inner.parent_refs.clone().unwrap_or_default() {
        if !parent_targets_gateway(parent, &gw_namespace, &gw_name, &namespace) {
            continue;
        }
        let section = parent.section_name.as_deref();
        let bound = bound_listeners(gateway, listeners, cache, &namespace, "HTTPRoute", section);
        if bound.is_empty() {
            status.add_invalid("Accepted", "NotAllowedByListeners", "no listener accepts this route");
            continue;
        }

        for listener in bound {
            let hostnames = if route_hostnames.is_empty() {
                vec![listener.hostname.clone().unwrap_or_else(|| "*".to_string())]
            } else {
                route_hostnames.iter().filter_map(|h| hostname_intersect(listener.hostname.as_deref(), h)).collect()
            };
            if hostnames.is_empty() {
                status.add_invalid("Accepted", "NoMatchingListenerHostname", format!("no hostname overlap with listener {:?}", listener.name));
                continue;
            }

            for (rule_idx, rule) in route.spec.rules.iter().flatten().enumerate() {
                let matches = rule.matches.clone().unwrap_or_default();
                let conditions: Vec<MatchConditions> = if matches.is_empty() {
                    vec![default_match()]
                } else {
                    matches.iter().map(compile_match).collect()
                };

                for condition in conditions {
                    let mut built = Route::new(condition);
                    built.priority = rule_idx.min(u8::MAX as usize) as u8;
                    apply_filters(&mut built, cache, config, &namespace, &rule.filters.clone().unwrap_or_default(), &mut status);

                    for backend in rule.backend_refs.iter().flatten() {
                        match resolve_backend(cache, config, &namespace, "HTTPRoute", &backend.backend_ref.inner) {
                            Ok(service) => {
                                let key = service.key.clone();
                                dag.ensure_service(key.clone(), |_| service.clone());
                                let weight = backend.backend_ref.weight.unwrap_or(1).max(0) as u32;
                                built.clusters.push(Cluster::new(key, weight));
                            }
                            Err(e) => status.add_invalid("ResolvedRefs", e.reason(), e.to_string()),
                        }
                    }

                    for hostname in &hostnames {
                        match listener.protocol {
                            GwProtocol::Http => {
                                if let Some(vh) = dag.ensure_virtual_host(&listener.name, hostname) {
                                    vh.add_route(built.clone());
                                    bound_any = true;
                                }
                            }
                            GwProtocol::Https => {
                                let svh = dag.ensure_secure_virtual_host(&listener.name, hostname);
                                svh.add_route(built.clone());
                                bound_any = true;
                            }
                            GwProtocol::Tls => {}
                        }
                    }
                }
            }
        }
    }

    if bound_any {
        status.add_valid("Accepted", "Accepted", "route accepted");
    }
    dag.status.commit(status);
}

fn process_tls_route(dag: &mut Dag, cache: &ObjectCache, config: &BuilderConfig, gateway: &k8s::Gateway, listeners: &[BoundListener], route: &k8s::TlsRoute) {
    let namespace = route.namespace().unwrap_or_default();
    let name = route.name_any();
    let _span = tracing::info_span!("tls_route", %namespace, %name).entered();

    let resource = ResourceRef {
        kind: "TLSRoute".to_string(),
        namespace: namespace.clone(),
        name: name.clone(),
        generation: route.metadata.generation.unwrap_or(0),
    };
    let mut status = dag.status.accessor(resource);

    let gw_namespace = gateway.namespace().unwrap_or_default();
    let gw_name = gateway.name_any();
    let route_hostnames: Vec<String> = route.spec.hostnames.clone().unwrap_or_default();
    let mut bound_any = false;

    for parent in &route.spec.inner.parent_refs.clone().unwrap_or_default() {
        if !parent_targets_gateway(parent, &gw_namespace, &gw_name, &namespace) {
            continue;
        }
        let section = parent.section_name.as_deref();
        let bound = bound_listeners(gateway, listeners, cache, &namespace, "TLSRoute", section);
        if bound.is_empty() {
            status.add_invalid("Accepted", "NotAllowedByListeners", "no listener accepts this route");
            continue;
        }

        for listener in bound {
            let hostnames = if route_hostnames.is_empty() {
                vec![listener.hostname.clone().unwrap_or_else(|| "*".to_string())]
            } else {
                route_hostnames.iter().filter_map(|h| hostname_intersect(listener.hostname.as_deref(), h)).collect()
            };
            if hostnames.is_empty() {
                status.add_invalid("Accepted", "NoMatchingListenerHostname", format!("no hostname overlap with listener {:?}", listener.name));
                continue;
            }

            let mut clusters = Vec::new();
            for rule in &route.spec.rules {
                for backend in &rule.backend_refs {
                    match resolve_backend(cache, config, &namespace, "TLSRoute", &backend.inner) {
                        Ok(service) => {
                            let key = service.key.clone();
                            dag.ensure_service(key.clone(), |_| service.clone());
                            let weight = backend.weight.unwrap_or(1).max(0) as u32;
                            clusters.push(Cluster::new(key, weight));
                        }
                        Err(e) => status.add_invalid("ResolvedRefs", e.reason(), e.to_string()),
                    }
                }
            }
            if clusters.is_empty() {
                continue;
            }

            for hostname in &hostnames {
                let svh = dag.ensure_secure_virtual_host(&listener.name, hostname);
                svh.tcp_proxy = Some(TcpProxy { clusters: clusters.clone() });
                bound_any = true;
            }
        }
    }

    if bound_any {
        status.add_valid("Accepted", "Accepted", "route accepted");
    }
    dag.status.commit(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_cache::Object;
    use ingress_dag_k8s_api::ObjectMeta;

    fn gateway_with_two_http_listeners() -> k8s::Gateway {
        k8s::Gateway {
            metadata: ObjectMeta {
                namespace: Some("gw-ns".to_string()),
                name: Some("gw".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: k8s::GatewaySpec {
                gateway_class_name: "example".to_string(),
                listeners: vec![
                    k8s::GatewayListener {
                        name: "http-1".to_string(),
                        hostname: None,
                        port: 80,
                        protocol: "HTTP".to_string(),
                        tls: None,
                        allowed_routes: None,
                    },
                    k8s::GatewayListener {
                        name: "http-2".to_string(),
                        hostname: None,
                        port: 81,
                        protocol: "HTTP".to_string(),
                        tls: None,
                        allowed_routes: None,
                    },
                ],
                addresses: None,
            },
            status: None,
        }
    }

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

    fn http_route_with_section(section: &str) -> k8s::HttpRoute {
        k8s::HttpRoute {
            metadata: ObjectMeta {
                namespace: Some("gw-ns".to_string()),
                name: Some("route".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: k8s::HttpRouteSpec {
                inner: k8s::CommonRouteSpec {
                    parent_refs: Some(vec![k8s::ParentReference {
                        group: None,
                        kind: None,
                        namespace: Some("gw-ns".to_string()),
                        name: "gw".to_string(),
                        section_name: Some(section.to_string()),
                        port: None,
                    }]),
                },
                hostnames: Some(vec!["a.com".to_string()]),
                rules: Some(vec![k8s::HttpRouteRule {
                    matches: None,
                    filters: None,
                    backend_refs: Some(vec![k8s::HttpBackendRef {
                        backend_ref: k8s::BackendRef {
                            weight: None,
                            inner: k8s::BackendObjectReference {
                                group: None,
                                kind: None,
                                name: "svc".to_string(),
                                namespace: None,
                                port: Some(80),
                            },
                        },
                        filters: None,
                    }]),
                }]),
            },
            status: None,
        }
    }

    #[test]
    fn section_name_binds_only_the_named_listener() {
        let mut dag = Dag::new();
        let cache = ObjectCache::new();
        cache.insert(Object::Service(service("gw-ns", "svc", 80)));
        cache.insert(Object::Gateway(gateway_with_two_http_listeners()));
        cache.insert(Object::HttpRoute(http_route_with_section("http-2")));

        let config = BuilderConfig {
            gateway: Some(("gw-ns".to_string(), "gw".to_string())),
            ..BuilderConfig::default()
        };
        run(&mut dag, &cache, &config);

        let http_2 = dag.find_listener("http-2").expect("http-2 listener seeded");
        assert_eq!(http_2.virtual_hosts().len(), 1);
        let http_1 = dag.find_listener("http-1").expect("http-1 listener seeded");
        assert!(http_1.virtual_hosts().is_empty());
    }

    #[test]
    fn https_listener_with_cross_namespace_secret_and_no_grant_is_rejected() {
        let mut dag = Dag::new();
        let cache = ObjectCache::new();
        let gateway = k8s::Gateway {
            metadata: ObjectMeta {
                namespace: Some("gw-ns".to_string()),
                name: Some("gw".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: k8s::GatewaySpec {
                gateway_class_name: "example".to_string(),
                listeners: vec![k8s::GatewayListener {
                    name: "https".to_string(),
                    hostname: None,
                    port: 443,
                    protocol: "HTTPS".to_string(),
                    tls: Some(k8s::GatewayTlsConfig {
                        mode: Some(k8s::TlsModeType::Terminate),
                        certificate_refs: Some(vec![k8s::SecretObjectReference {
                            group: None,
                            kind: None,
                            name: "cert".to_string(),
                            namespace: Some("ns-b".to_string()),
                        }]),
                        options: None,
                    }),
                    allowed_routes: None,
                }],
                addresses: None,
            },
            status: None,
        };
        cache.insert(Object::Gateway(gateway));

        let config = BuilderConfig {
            gateway: Some(("gw-ns".to_string(), "gw".to_string())),
            ..BuilderConfig::default()
        };
        run(&mut dag, &cache, &config);

        assert!(dag.find_listener("https").is_none());
    }

    #[test]
    fn hostname_intersect_matches_wildcard_label() {
        assert_eq!(hostname_intersect(Some("*.example.com"), "foo.example.com"), Some("foo.example.com".to_string()));
        assert_eq!(hostname_intersect(Some("*.example.com"), "a.b.example.com"), None);
        assert_eq!(hostname_intersect(None, "foo.com"), Some("foo.com".to_string()));
    }
}
