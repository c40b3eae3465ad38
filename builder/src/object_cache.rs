//! The typed object cache: ingests add/update/delete events from the
//! informer layer (spec.md §4.1/C1) and answers the lookups a build needs.
//!
//! Grounded on `linkerd-linkerd2/policy-controller/k8s/index/src/lookup.rs`'s
//! `Arc<RwLock<HashMap>>` storage discipline and on the redesign note in
//! spec.md §9 preferring a closed sum type (`Object`) over a runtime type
//! switch for the informer-facing `Insert`/`Remove` entry points.

use crate::secret;
use ahash::AHashMap as HashMap;
use ingress_dag_core::secret::{Secret, SecretValidationError};
use ingress_dag_core::service::{CircuitBreakerLimits, Service, ServiceKey};
use ingress_dag_k8s_api as k8s;
use ingress_dag_k8s_api::ResourceExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::num::NonZeroU16;

/// The closed set of Kubernetes kinds the informer adapter feeds into the
/// cache (spec.md §6's inbound interface).
#[derive(Clone, Debug)]
pub enum Object {
    Service(k8s::Service),
    Endpoints(k8s::Endpoints),
    Secret(k8s::Secret),
    Namespace(k8s::Namespace),
    Ingress(k8s::Ingress),
    HttpProxy(k8s::HttpProxy),
    TlsCertificateDelegation(k8s::TlsCertificateDelegation),
    ExtensionService(k8s::ExtensionService),
    Gateway(k8s::Gateway),
    GatewayClass(k8s::GatewayClass),
    HttpRoute(k8s::HttpRoute),
    TlsRoute(k8s::TlsRoute),
    ReferenceGrant(k8s::ReferenceGrant),
}

fn namespaced_key(meta: &k8s::ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

#[derive(Default)]
struct Inner {
    services: HashMap<(String, String), k8s::Service>,
    endpoints: HashMap<(String, String), k8s::Endpoints>,
    secrets: HashMap<(String, String), k8s::Secret>,
    namespaces: HashMap<String, BTreeMap<String, String>>,
    ingresses: HashMap<(String, String), k8s::Ingress>,
    http_proxies: HashMap<(String, String), k8s::HttpProxy>,
    delegations: HashMap<(String, String), k8s::TlsCertificateDelegation>,
    extension_services: HashMap<(String, String), k8s::ExtensionService>,
    gateways: HashMap<(String, String), k8s::Gateway>,
    gateway_classes: HashMap<String, k8s::GatewayClass>,
    http_routes: HashMap<(String, String), k8s::HttpRoute>,
    tls_routes: HashMap<(String, String), k8s::TlsRoute>,
    reference_grants: HashMap<(String, String), k8s::ReferenceGrant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortRef<'a> {
    Number(u16),
    Name(&'a str),
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("service {0}/{1} not found")]
    ServiceNotFound(String, String),
    #[error("no port on service {0}/{1} matches {2:?}")]
    ServicePortNotMatched(String, String, String),
    #[error("externalName services are disabled")]
    ExternalNameDisabled,
    #[error("externalName \"localhost\" is not permitted")]
    ExternalNameLoopback,
    #[error("secret {0}/{1} not found")]
    SecretNotFound(String, String),
    #[error("secret {0}/{1} is invalid: {2}")]
    SecretInvalid(String, String, SecretValidationError),
    #[error("cross-namespace reference from {0} to secret {1}/{2} is not permitted")]
    DelegationNotPermitted(String, String, String),
}

/// Holds the latest known state of every watched cluster object. Mutated
/// only by `insert`/`remove`, called by the informer adapter strictly
/// outside of a build (spec.md §3.2/§5); builds read through the lookup
/// methods, which take a consistent read-lock snapshot per call.
#[derive(Default)]
pub struct ObjectCache {
    inner: RwLock<Inner>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `obj` into the kind-specific map, keyed by
    /// `(namespace, name)`. Returns whether the object is relevant: a
    /// `Secret` whose `type` this builder never consumes (service-account
    /// tokens, dockercfg, …) is dropped and reported irrelevant so the
    /// cache doesn't grow unboundedly with objects no processor will ever
    /// read (spec.md §4.1).
    pub fn insert(&self, obj: Object) -> bool {
        let mut inner = self.inner.write();
        match obj {
            Object::Service(svc) => {
                inner.services.insert(namespaced_key(&svc.metadata), svc);
                true
            }
            Object::Endpoints(ep) => {
                inner.endpoints.insert(namespaced_key(&ep.metadata), ep);
                true
            }
            Object::Secret(s) => {
                if !is_interesting_secret_type(&s) {
                    return false;
                }
                inner.secrets.insert(namespaced_key(&s.metadata), s);
                true
            }
            Object::Namespace(ns) => {
                let labels = ns.metadata.labels.clone().unwrap_or_default().into_iter().collect();
                inner.namespaces.insert(ns.name_any(), labels);
                true
            }
            Object::Ingress(ing) => {
                inner.ingresses.insert(namespaced_key(&ing.metadata), ing);
                true
            }
            Object::HttpProxy(hp) => {
                inner.http_proxies.insert(namespaced_key(&hp.metadata), hp);
                true
            }
            Object::TlsCertificateDelegation(d) => {
                inner.delegations.insert(namespaced_key(&d.metadata), d);
                true
            }
            Object::ExtensionService(e) => {
                inner.extension_services.insert(namespaced_key(&e.metadata), e);
                true
            }
            Object::Gateway(g) => {
                inner.gateways.insert(namespaced_key(&g.metadata), g);
                true
            }
            Object::GatewayClass(gc) => {
                inner.gateway_classes.insert(gc.name_any(), gc);
                true
            }
            Object::HttpRoute(r) => {
                inner.http_routes.insert(namespaced_key(&r.metadata), r);
                true
            }
            Object::TlsRoute(r) => {
                inner.tls_routes.insert(namespaced_key(&r.metadata), r);
                true
            }
            Object::ReferenceGrant(rg) => {
                inner.reference_grants.insert(namespaced_key(&rg.metadata), rg);
                true
            }
        }
    }

    /// Mirrors `insert`: drops the object from the kind-specific map. The
    /// informer adapter is responsible for unwrapping client-go-style
    /// tombstones before calling this (spec.md §6 frames it as an external
    /// collaborator's concern, not the cache's).
    pub fn remove(&self, obj: Object) -> bool {
        let mut inner = self.inner.write();
        match obj {
            Object::Service(svc) => inner.services.remove(&namespaced_key(&svc.metadata)).is_some(),
            Object::Endpoints(ep) => inner.endpoints.remove(&namespaced_key(&ep.metadata)).is_some(),
            Object::Secret(s) => inner.secrets.remove(&namespaced_key(&s.metadata)).is_some(),
            Object::Namespace(ns) => inner.namespaces.remove(&ns.name_any()).is_some(),
            Object::Ingress(ing) => inner.ingresses.remove(&namespaced_key(&ing.metadata)).is_some(),
            Object::HttpProxy(hp) => inner.http_proxies.remove(&namespaced_key(&hp.metadata)).is_some(),
            Object::TlsCertificateDelegation(d) => {
                inner.delegations.remove(&namespaced_key(&d.metadata)).is_some()
            }
            Object::ExtensionService(e) => {
                inner.extension_services.remove(&namespaced_key(&e.metadata)).is_some()
            }
            Object::Gateway(g) => inner.gateways.remove(&namespaced_key(&g.metadata)).is_some(),
            Object::GatewayClass(gc) => inner.gateway_classes.remove(&gc.name_any()).is_some(),
            Object::HttpRoute(r) => inner.http_routes.remove(&namespaced_key(&r.metadata)).is_some(),
            Object::TlsRoute(r) => inner.tls_routes.remove(&namespaced_key(&r.metadata)).is_some(),
            Object::ReferenceGrant(rg) => {
                inner.reference_grants.remove(&namespaced_key(&rg.metadata)).is_some()
            }
        }
    }

    pub fn get_ingress(&self, namespace: &str, name: &str) -> Option<k8s::Ingress> {
        self.inner.read().ingresses.get(&(namespace.to_string(), name.to_string())).cloned()
    }

    pub fn list_ingresses(&self) -> Vec<k8s::Ingress> {
        self.inner.read().ingresses.values().cloned().collect()
    }

    pub fn list_http_proxies(&self) -> Vec<k8s::HttpProxy> {
        self.inner.read().http_proxies.values().cloned().collect()
    }

    pub fn get_http_proxy(&self, namespace: &str, name: &str) -> Option<k8s::HttpProxy> {
        self.inner.read().http_proxies.get(&(namespace.to_string(), name.to_string())).cloned()
    }

    pub fn list_gateways(&self) -> Vec<k8s::Gateway> {
        self.inner.read().gateways.values().cloned().collect()
    }

    pub fn list_http_routes(&self) -> Vec<k8s::HttpRoute> {
        self.inner.read().http_routes.values().cloned().collect()
    }

    pub fn list_tls_routes(&self) -> Vec<k8s::TlsRoute> {
        self.inner.read().tls_routes.values().cloned().collect()
    }

    pub fn namespace_exists(&self, name: &str) -> bool {
        self.inner.read().namespaces.contains_key(name)
    }

    /// Labels of a known namespace, for the Gateway API `Selector` namespace
    /// filter (spec.md §4.6 step 2).
    pub fn namespace_labels(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.inner.read().namespaces.get(name).cloned()
    }

    /// `LookupService(ref, port)`: resolves by numeric port or port name
    /// (spec.md §4.1).
    pub fn lookup_service(
        &self,
        namespace: &str,
        name: &str,
        port: PortRef<'_>,
        enable_external_name: bool,
    ) -> Result<Service, LookupError> {
        let inner = self.inner.read();
        let svc = inner
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| LookupError::ServiceNotFound(namespace.to_string(), name.to_string()))?;

        let spec = svc.spec.clone().unwrap_or_default();
        let external_name = spec.external_name.clone();
        if spec.type_.as_deref() == Some("ExternalName") {
            if external_name.as_deref() == Some("localhost") {
                return Err(LookupError::ExternalNameLoopback);
            }
            if !enable_external_name {
                return Err(LookupError::ExternalNameDisabled);
            }
        }

        let matched = spec
            .ports
            .iter()
            .flatten()
            .find(|p| match port {
                PortRef::Number(n) => p.port == n as i32,
                PortRef::Name(want) => p.name.as_deref() == Some(want),
            })
            .ok_or_else(|| {
                LookupError::ServicePortNotMatched(namespace.to_string(), name.to_string(), format!("{port:?}"))
            })?;

        let port_number = NonZeroU16::new(matched.port as u16).ok_or_else(|| {
            LookupError::ServicePortNotMatched(namespace.to_string(), name.to_string(), format!("{port:?}"))
        })?;

        Ok(Service {
            key: ServiceKey {
                namespace: namespace.to_string(),
                name: name.to_string(),
                port: port_number,
            },
            port_name: matched.name.clone(),
            weighted: false,
            protocol: matched.protocol.clone(),
            external_name,
            limits: CircuitBreakerLimits::default(),
        })
    }

    /// `LookupTLSSecret(ref, consumerNamespace)` (spec.md §4.1).
    pub fn lookup_tls_secret(&self, namespace: &str, name: &str, consumer_namespace: &str) -> Result<Secret, LookupError> {
        self.lookup_validated_secret(namespace, name, consumer_namespace, secret::validate_tls_secret)
    }

    /// `LookupCASecret(ref, consumerNamespace)` (spec.md §4.1).
    pub fn lookup_ca_secret(&self, namespace: &str, name: &str, consumer_namespace: &str) -> Result<Secret, LookupError> {
        self.lookup_validated_secret(namespace, name, consumer_namespace, secret::validate_ca_secret)
    }

    fn lookup_validated_secret(
        &self,
        namespace: &str,
        name: &str,
        consumer_namespace: &str,
        validate: impl Fn(&k8s::Secret) -> Result<Secret, SecretValidationError>,
    ) -> Result<Secret, LookupError> {
        let raw = {
            let inner = self.inner.read();
            inner
                .secrets
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| LookupError::SecretNotFound(namespace.to_string(), name.to_string()))?
        };
        let validated = validate(&raw)
            .map_err(|e| LookupError::SecretInvalid(namespace.to_string(), name.to_string(), e))?;

        if consumer_namespace != namespace && !self.delegation_permitted(namespace, name, consumer_namespace) {
            return Err(LookupError::DelegationNotPermitted(
                consumer_namespace.to_string(),
                namespace.to_string(),
                name.to_string(),
            ));
        }
        Ok(validated)
    }

    /// `DelegationPermitted(secretRef, consumerNamespace)`: a wildcard
    /// `target_namespaces` entry of `"*"` admits any consumer (spec.md §4.1).
    pub fn delegation_permitted(&self, secret_namespace: &str, secret_name: &str, consumer_namespace: &str) -> bool {
        let inner = self.inner.read();
        inner
            .delegations
            .values()
            .filter(|d| d.metadata.namespace.as_deref() == Some(secret_namespace))
            .flat_map(|d| d.spec.delegations.iter())
            .any(|del| {
                del.secret_name == secret_name
                    && del
                        .target_namespaces
                        .iter()
                        .any(|ns| ns == "*" || ns == consumer_namespace)
            })
    }

    /// Implements the `ReferenceGrant` permission check Gateway API routes
    /// use for cross-namespace backend/secret references (spec.md §4.6
    /// step 3): a grant in the referent's namespace must list a matching
    /// `from` and `to` entry.
    pub fn reference_grant_permits(
        &self,
        from_group: &str,
        from_kind: &str,
        from_namespace: &str,
        to_group: &str,
        to_kind: &str,
        to_namespace: &str,
        to_name: Option<&str>,
    ) -> bool {
        let inner = self.inner.read();
        inner
            .reference_grants
            .values()
            .filter(|rg| rg.metadata.namespace.as_deref() == Some(to_namespace))
            .any(|rg| {
                let from_ok = rg.spec.from.iter().any(|f| {
                    f.group == from_group && f.kind == from_kind && f.namespace == from_namespace
                });
                let to_ok = rg.spec.to.iter().any(|t| {
                    t.group == to_group
                        && t.kind == to_kind
                        && t.name.as_deref().map(|n| Some(n) == to_name).unwrap_or(true)
                });
                from_ok && to_ok
            })
    }
}

fn is_interesting_secret_type(secret: &k8s::Secret) -> bool {
    match secret.type_.as_deref() {
        Some("kubernetes.io/tls") => true,
        Some("Opaque") | None => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_dag_k8s_api::ObjectMeta;

    fn service(namespace: &str, name: &str, port: i32, port_name: Option<&str>) -> k8s::Service {
        k8s::Service {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(k8s::ServiceSpec {
                ports: Some(vec![k8s::ServicePort {
                    port,
                    name: port_name.map(str::to_string),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn lookup_service_matches_by_number() {
        let cache = ObjectCache::new();
        cache.insert(Object::Service(service("default", "kuard", 8080, Some("http"))));
        let svc = cache
            .lookup_service("default", "kuard", PortRef::Number(8080), false)
            .unwrap();
        assert_eq!(svc.port().get(), 8080);
    }

    #[test]
    fn lookup_service_missing_port_errors() {
        let cache = ObjectCache::new();
        cache.insert(Object::Service(service("default", "kuard", 8080, None)));
        let err = cache.lookup_service("default", "kuard", PortRef::Number(9999), false).unwrap_err();
        assert!(matches!(err, LookupError::ServicePortNotMatched(..)));
    }

    #[test]
    fn uninteresting_secret_types_are_dropped() {
        let cache = ObjectCache::new();
        let secret = k8s::Secret {
            metadata: ObjectMeta {
                namespace: Some("default".to_string()),
                name: Some("sa-token".to_string()),
                ..Default::default()
            },
            type_: Some("kubernetes.io/service-account-token".to_string()),
            ..Default::default()
        };
        assert!(!cache.insert(Object::Secret(secret)));
    }

    #[test]
    fn delegation_wildcard_admits_any_namespace() {
        let cache = ObjectCache::new();
        let delegation = k8s::TlsCertificateDelegation {
            metadata: ObjectMeta {
                namespace: Some("certs-ns".to_string()),
                name: Some("deleg".to_string()),
                ..Default::default()
            },
            spec: ingress_dag_k8s_api::TlsCertificateDelegationSpec {
                delegations: vec![ingress_dag_k8s_api::crd::tls_certificate_delegation::CertificateDelegation {
                    secret_name: "wildcard-cert".to_string(),
                    target_namespaces: vec!["*".to_string()],
                }],
            },
        };
        cache.insert(Object::TlsCertificateDelegation(delegation));
        assert!(cache.delegation_permitted("certs-ns", "wildcard-cert", "any-ns"));
        assert!(!cache.delegation_permitted("certs-ns", "other-cert", "any-ns"));
    }
}
