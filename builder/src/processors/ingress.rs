//! `IngressProcessor`: translates stock `networking.k8s.io/v1` Ingress
//! objects into Routes/VirtualHosts (spec.md §4.4/C5).

use crate::config::BuilderConfig;
use crate::object_cache::{LookupError, ObjectCache, PortRef};
use crate::{annotations, policy};
use ahash::AHashSet as HashSet;
use ingress_dag_core::cluster::{Cluster, UpstreamProtocol};
use ingress_dag_core::dag::Dag;
use ingress_dag_core::http_route::{wildcard_authority_match, MatchConditions, PathMatch};
use ingress_dag_core::listener::Protocol;
use ingress_dag_core::route::Route;
use ingress_dag_core::status::ResourceRef;
use ingress_dag_core::virtualhost::TlsVersion;
use ingress_dag_k8s_api as k8s;
use ingress_dag_k8s_api::ResourceExt;

pub fn run(dag: &mut Dag, cache: &ObjectCache, config: &BuilderConfig) {
    for ingress in cache.list_ingresses() {
        process_ingress(dag, cache, config, &ingress);
    }
}

fn parse_tls_version(raw: Option<&str>) -> Option<TlsVersion> {
    match raw {
        Some("1.2") => Some(TlsVersion::Tls12),
        Some("1.3") => Some(TlsVersion::Tls13),
        _ => None,
    }
}

/// Ingress TLS `secretName` may carry a `namespace/name` delegation form;
/// absent a namespace prefix the secret is assumed to live alongside the
/// Ingress (spec.md §4.4 step 1).
fn parse_secret_ref(secret_name: &str, ingress_namespace: &str) -> (String, String) {
    match secret_name.split_once('/') {
        Some((ns, name)) => (ns.to_string(), name.to_string()),
        None => (ingress_namespace.to_string(), secret_name.to_string()),
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

fn process_ingress(dag: &mut Dag, cache: &ObjectCache, config: &BuilderConfig, ingress: &k8s::Ingress) {
    let namespace = ingress.namespace().unwrap_or_default();
    let name = ingress.name_any();
    let generation = ingress.metadata.generation.unwrap_or(0);
    let _span = tracing::info_span!("ingress", %namespace, %name).entered();

    let resource = ResourceRef {
        kind: "Ingress".to_string(),
        namespace: namespace.clone(),
        name: name.clone(),
        generation,
    };
    let mut status = dag.status.accessor(resource);

    let annotations = ingress.metadata.annotations.clone().unwrap_or_default();
    let tls_required = annotations::get_bool(&annotations, "tls-required", false);
    let http_allowed = annotations::get_bool(&annotations, "http-allowed", true);
    let min_version = parse_tls_version(annotations::get(&annotations, "tls-minimum-protocol-version"));
    let max_version = parse_tls_version(annotations::get(&annotations, "tls-maximum-protocol-version"));

    let Some(spec) = ingress.spec.clone() else {
        status.add_invalid("Valid", "EmptySpec", "ingress has no spec");
        dag.status.commit(status);
        return;
    };

    // Step 1: TLS blocks -> SecureVirtualHosts.
    let mut tls_hosts: HashSet<String> = HashSet::default();
    for tls in spec.tls.iter().flatten() {
        let Some(secret_name) = &tls.secret_name else {
            continue;
        };
        let (secret_ns, secret_nm) = parse_secret_ref(secret_name, &namespace);
        for host in tls.hosts.iter().flatten() {
            let secret = match cache.lookup_tls_secret(&secret_ns, &secret_nm, &namespace) {
                Ok(s) => s,
                Err(e) => {
                    status.add_invalid("ResolvedRefs", lookup_error_reason(&e), e.to_string());
                    continue;
                }
            };
            if let (Some(min), Some(max)) = (min_version, max_version) {
                if min as u8 > max as u8 {
                    status.add_invalid("Valid", "InvalidTLSVersionRange", "tls-minimum-protocol-version > tls-maximum-protocol-version");
                    continue;
                }
            }
            let https_listener_name = match dag.get_single_listener(Protocol::Https) {
                Ok(l) => l.name.clone(),
                Err(e) => {
                    status.add_invalid("Valid", "NoHttpsListener", e.to_string());
                    continue;
                }
            };
            let svh = dag.ensure_secure_virtual_host(&https_listener_name, host);
            svh.secret = Some(format!("{secret_ns}/{secret_nm}"));
            svh.min_tls_version = min_version.unwrap_or(config.default_min_tls_version);
            svh.max_tls_version = max_version.unwrap_or(config.default_max_tls_version);
            let _ = secret;
            tls_hosts.insert(host.clone());
        }
    }

    // Step 2: synthetic default-backend rule, prepended so explicit rules
    // can override it.
    let mut rules: Vec<k8s::api::networking::v1::IngressRule> = Vec::new();
    if let Some(default_backend) = spec.default_backend.clone() {
        rules.push(k8s::api::networking::v1::IngressRule {
            host: None,
            http: Some(k8s::api::networking::v1::HTTPIngressRuleValue {
                paths: vec![k8s::api::networking::v1::HTTPIngressPath {
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                    backend: default_backend,
                }],
            }),
        });
    }
    rules.extend(spec.rules.into_iter().flatten());

    let retry_on: Vec<String> = annotations::get(&annotations, "retry-on")
        .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
        .unwrap_or_default();
    let num_retries = annotations::get_u32(&annotations, "num-retries");
    let per_try_timeout = annotations::get(&annotations, "per-try-timeout");
    let timeout_raw = annotations::get(&annotations, "request-timeout").or_else(|| annotations::get(&annotations, "response-timeout"));
    let websocket_paths: Vec<&str> = annotations::get(&annotations, "websocket-routes")
        .map(|s| s.split(',').map(str::trim).collect())
        .unwrap_or_default();

    for rule in &rules {
        let host = rule.host.clone().unwrap_or_else(|| "*".to_string());
        let Some(http) = &rule.http else { continue };
        for path in &http.paths {
            let Some(backend_service) = &path.backend.service else {
                continue;
            };
            let port = match &backend_service.port {
                Some(p) if p.number.is_some() => PortRef::Number(p.number.unwrap() as u16),
                Some(p) if p.name.is_some() => PortRef::Name(p.name.as_deref().unwrap()),
                _ => {
                    status.add_invalid("ResolvedRefs", "PortNotMatched", "backend service port unset");
                    continue;
                }
            };

            let service = match cache.lookup_service(&namespace, &backend_service.name, port, config.enable_external_name_service) {
                Ok(s) => s,
                Err(e) => {
                    status.add_invalid("ResolvedRefs", lookup_error_reason(&e), e.to_string());
                    continue;
                }
            };
            let key = service.key.clone();
            dag.ensure_service(key.clone(), |_| service.clone());

            let path_str = path.path.clone().unwrap_or_else(|| "/".to_string());
            let path_match = match path.path_type.as_str() {
                "Exact" => PathMatch::Exact(trim_trailing_slash(&path_str)),
                "ImplementationSpecific" if path_str.contains(['^', '+', '*', '[', ']', '%']) => {
                    match PathMatch::regex(&path_str) {
                        Ok(m) => m,
                        Err(e) => {
                            status.add_invalid("Valid", "InvalidPathRegex", e.to_string());
                            continue;
                        }
                    }
                }
                _ => PathMatch::prefix(trim_trailing_slash(&path_str)),
            };

            let mut conditions = MatchConditions {
                path: Some(path_match),
                headers: Vec::new(),
                query_params: Vec::new(),
            };
            if let Some(m) = wildcard_authority_match(&host) {
                conditions.headers.push(m);
            }

            let mut route = Route::new(conditions);
            let mut cluster = Cluster::new(key.clone(), 1);
            cluster.protocol = upstream_protocol(&annotations, &backend_service.name, port);
            route.clusters.push(cluster);
            route.retry_policy = policy::retry_policy(&retry_on, num_retries, per_try_timeout.as_deref());
            route.timeout_policy = policy::timeout_policy(timeout_raw.as_deref());
            route.https_upgrade = tls_required;
            route.websocket = websocket_paths.contains(&path_str.as_str());

            if !tls_required || http_allowed {
                if let Ok(listener) = dag.get_single_listener(Protocol::Http) {
                    let listener_name = listener.name.clone();
                    if let Some(vh) = dag.ensure_virtual_host(&listener_name, &host) {
                        vh.add_route(route.clone());
                    }
                }
            }
            if host != "*" && tls_hosts.contains(&host) {
                if let Ok(listener) = dag.get_single_listener(Protocol::Https) {
                    let listener_name = listener.name.clone();
                    let svh = dag.ensure_secure_virtual_host(&listener_name, &host);
                    svh.add_route(route);
                }
            }
        }
    }

    dag.status.commit(status);
}

fn trim_trailing_slash(path: &str) -> String {
    if path == "/" {
        path.to_string()
    } else {
        path.trim_end_matches('/').to_string()
    }
}

fn upstream_protocol(annotations: &std::collections::BTreeMap<String, String>, service_name: &str, port: PortRef<'_>) -> UpstreamProtocol {
    let suffixes: Vec<String> = match port {
        PortRef::Number(n) => vec![n.to_string()],
        PortRef::Name(name) => vec![name.to_string()],
    };
    for suffix in &suffixes {
        if annotations::get(annotations, &format!("upstream-protocol.tls.{suffix}")).is_some() {
            return UpstreamProtocol::Tls;
        }
        if annotations::get(annotations, &format!("upstream-protocol.h2.{suffix}")).is_some() {
            return UpstreamProtocol::H2;
        }
        if annotations::get(annotations, &format!("upstream-protocol.h2c.{suffix}")).is_some() {
            return UpstreamProtocol::H2c;
        }
    }
    let _ = service_name;
    UpstreamProtocol::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_cache::Object;
    use ingress_dag_k8s_api::ObjectMeta;

    fn ingress_with_prefix_route(host: &str, service: &str, port: i32) -> k8s::Ingress {
        k8s::Ingress {
            metadata: ObjectMeta {
                namespace: Some("default".to_string()),
                name: Some("web".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: Some(k8s::IngressSpec {
                rules: Some(vec![k8s::api::networking::v1::IngressRule {
                    host: Some(host.to_string()),
                    http: Some(k8s::api::networking::v1::HTTPIngressRuleValue {
                        paths: vec![k8s::api::networking::v1::HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: k8s::api::networking::v1::IngressBackend {
                                service: Some(k8s::api::networking::v1::IngressServiceBackend {
                                    name: service.to_string(),
                                    port: Some(k8s::api::networking::v1::ServiceBackendPort {
                                        number: Some(port),
                                        name: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
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
                ports: Some(vec![k8s::ServicePort {
                    port,
                    name: Some("http".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn prefix_path_creates_route_and_cluster() {
        let mut dag = Dag::new();
        super::super::listener::run(&mut dag, &BuilderConfig::default());
        let cache = ObjectCache::new();
        cache.insert(Object::Service(service("default", "kuard", 8080)));
        cache.insert(Object::Ingress(ingress_with_prefix_route("foo.com", "kuard", 8080)));

        run(&mut dag, &cache, &BuilderConfig::default());

        let vh = dag
            .get_virtual_hosts()
            .find(|v| v.name == "foo.com")
            .expect("vhost created");
        let route = vh.routes().next().expect("route created");
        assert_eq!(route.clusters.len(), 1);
        assert_eq!(route.clusters[0].upstream.port.get(), 8080);
    }
}
