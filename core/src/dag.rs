//! The DAG itself: an ordered list of root vertices (listeners, plus any
//! orphan `SecureVirtualHost`s) and the `Ensure*` idempotent-insertion
//! operations processors use to build it up.
//!
//! Grounded on `linkerd-linkerd2/policy-controller/k8s/index/src/index.rs`'s
//! `Index`/`NamespaceIndex`/`PolicyIndex` composition (one owning container,
//! several `update_*`/`get_or_default` helpers that are idempotent under
//! re-application) and on `k8s/index/src/outbound/index.rs`'s
//! `service_routes_or_default`, which is the direct model for `ensure_service`.

use crate::cluster::Cluster;
use crate::listener::{Listener, ListenerLookupError, Protocol};
use crate::route::Route;
use crate::secret::{Secret, SecretKey};
use crate::service::{Service, ServiceKey};
use crate::status::StatusCache;
use crate::virtualhost::SecureVirtualHost;
use ahash::AHashMap as HashMap;

/// The full build output: the listener/vhost/route/cluster graph plus the
/// status report for everything the build touched (spec.md §1, §4.3).
#[derive(Debug, Default)]
pub struct Dag {
    listeners: Vec<Listener>,
    /// SecureVirtualHosts attached via `ensure_secure_virtual_host` before
    /// their owning Listener exists become roots in their own right
    /// (spec.md §3.1).
    orphan_secure_virtual_hosts: Vec<SecureVirtualHost>,
    services: HashMap<ServiceKey, Service>,
    secrets: HashMap<SecretKey, Secret>,
    pub status: StatusCache,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);

        // Any orphan secure vhost addressed to the newly-added listener's
        // name is reparented onto it.
        let name = self.listeners.last().expect("just pushed").name.clone();
        let mut remaining = Vec::with_capacity(self.orphan_secure_virtual_hosts.len());
        for svh in self.orphan_secure_virtual_hosts.drain(..) {
            if svh.listener_name == name {
                self.listeners
                    .last_mut()
                    .expect("just pushed")
                    .secure_virtual_hosts_mut()
                    .push(svh);
            } else {
                remaining.push(svh);
            }
        }
        self.orphan_secure_virtual_hosts = remaining;
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    /// Returns the unique listener with the given protocol, or fails if zero
    /// or more than one exist (spec.md §3.1).
    pub fn get_single_listener(&mut self, protocol: Protocol) -> Result<&mut Listener, ListenerLookupError> {
        let mut matches = self
            .listeners
            .iter()
            .enumerate()
            .filter(|(_, l)| l.protocol == protocol)
            .map(|(i, _)| i);
        let idx = match (matches.next(), matches.next()) {
            (Some(i), None) => i,
            (None, _) => return Err(ListenerLookupError::NotFound(protocol)),
            (Some(_), Some(_)) => return Err(ListenerLookupError::Ambiguous(protocol)),
        };
        Ok(&mut self.listeners[idx])
    }

    pub fn find_listener(&mut self, name: &str) -> Option<&mut Listener> {
        self.listeners.iter_mut().find(|l| l.name == name)
    }

    /// Ensures a `VirtualHost` named `name` exists on the listener `listener_name`.
    /// Returns `None` if no such listener exists.
    pub fn ensure_virtual_host(
        &mut self,
        listener_name: &str,
        name: &str,
    ) -> Option<&mut crate::virtualhost::VirtualHost> {
        let listener = self.find_listener(listener_name)?;
        Some(listener.ensure_virtual_host(name))
    }

    /// Ensures a `SecureVirtualHost` named `name`, attached to the listener
    /// `listener_name`. If that listener does not exist yet, the vhost
    /// becomes an orphan root until a matching listener is added (spec.md
    /// §3.1).
    pub fn ensure_secure_virtual_host(
        &mut self,
        listener_name: &str,
        name: &str,
    ) -> &mut SecureVirtualHost {
        if self.find_listener(listener_name).is_some() {
            return self
                .find_listener(listener_name)
                .expect("checked above")
                .ensure_secure_virtual_host(name);
        }
        if let Some(idx) = self
            .orphan_secure_virtual_hosts
            .iter()
            .position(|v| v.name == name && v.listener_name == listener_name)
        {
            return &mut self.orphan_secure_virtual_hosts[idx];
        }
        self.orphan_secure_virtual_hosts
            .push(SecureVirtualHost::new(name, listener_name));
        self.orphan_secure_virtual_hosts.last_mut().expect("just pushed")
    }

    /// Maintains exactly one `Service` instance per `(namespace,name,port)`
    /// key for the duration of the build (spec.md §3.1, §3.3).
    pub fn ensure_service(&mut self, key: ServiceKey, make: impl FnOnce(&ServiceKey) -> Service) -> &Service {
        self.services.entry(key.clone()).or_insert_with(|| make(&key))
    }

    pub fn get_service(&self, key: &ServiceKey) -> Option<&Service> {
        self.services.get(key)
    }

    pub fn ensure_secret(&mut self, key: SecretKey, secret: Secret) {
        self.secrets.entry(key).or_insert(secret);
    }

    pub fn get_secret(&self, key: &SecretKey) -> Option<&Secret> {
        self.secrets.get(key)
    }

    /// All services known to the DAG (spec.md §4.2 accessors).
    pub fn get_services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn get_virtual_hosts(&self) -> impl Iterator<Item = &crate::virtualhost::VirtualHost> {
        self.listeners.iter().flat_map(|l| l.virtual_hosts().iter())
    }

    pub fn get_secure_virtual_hosts(&self) -> impl Iterator<Item = &SecureVirtualHost> {
        self.listeners
            .iter()
            .flat_map(|l| l.secure_virtual_hosts().iter())
            .chain(self.orphan_secure_virtual_hosts.iter())
    }

    /// Flattens every route's clusters plus their mirror clusters, excluding
    /// `ExternalName` services which are represented by `Cluster` rather
    /// than a routable `ServiceCluster` (spec.md §4.2).
    pub fn get_service_clusters(&self) -> Vec<&Cluster> {
        let mut out = Vec::new();
        let mut push_route = |route: &Route| {
            for c in &route.clusters {
                if self
                    .get_service(&c.upstream)
                    .map(|s| !s.is_external_name())
                    .unwrap_or(true)
                {
                    out.push(c);
                }
            }
            for m in &route.mirror_policy {
                out.push(&m.cluster);
            }
        };
        for vh in self.get_virtual_hosts() {
            for r in vh.routes() {
                push_route(r);
            }
        }
        for svh in self.get_secure_virtual_hosts() {
            for r in svh.routes() {
                push_route(r);
            }
            if let Some(tcp) = &svh.tcp_proxy {
                out.extend(tcp.clusters.iter());
            }
        }
        out
    }

    /// Reserved for extension-service-backed clusters (authorization
    /// services, external rate-limit services). No processor in this build
    /// populates extension clusters directly on the DAG: they are resolved
    /// inline as `authorization_service`/rate-limit cluster references
    /// (see DESIGN.md for the Open Question this simplifies).
    pub fn get_extension_clusters(&self) -> Vec<&Cluster> {
        Vec::new()
    }

    /// Visits every root vertex: listeners, then any remaining orphan
    /// secure virtual hosts.
    pub fn visit_roots(&self, mut f: impl FnMut(DagRoot<'_>)) {
        for l in &self.listeners {
            f(DagRoot::Listener(l));
        }
        for s in &self.orphan_secure_virtual_hosts {
            f(DagRoot::OrphanSecureVirtualHost(s));
        }
    }
}

pub enum DagRoot<'a> {
    Listener(&'a Listener),
    OrphanSecureVirtualHost(&'a SecureVirtualHost),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;
    use crate::http_route::MatchConditions;
    use std::num::NonZeroU16;

    #[test]
    fn ensure_virtual_host_is_idempotent() {
        let mut dag = Dag::new();
        dag.add_listener(Listener::new("http", "0.0.0.0", 80, Protocol::Http));
        dag.ensure_virtual_host("http", "foo.com").unwrap();
        let first_len = dag.find_listener("http").unwrap().virtual_hosts().len();
        dag.ensure_virtual_host("http", "foo.com").unwrap();
        let second_len = dag.find_listener("http").unwrap().virtual_hosts().len();
        assert_eq!(first_len, second_len);
        assert_eq!(first_len, 1);
    }

    #[test]
    fn ensure_service_is_idempotent_per_key() {
        let mut dag = Dag::new();
        let key = ServiceKey {
            namespace: "default".into(),
            name: "kuard".into(),
            port: NonZeroU16::new(8080).unwrap(),
        };
        let mut calls = 0;
        {
            dag.ensure_service(key.clone(), |k| {
                calls += 1;
                Service {
                    key: k.clone(),
                    port_name: None,
                    weighted: false,
                    protocol: None,
                    external_name: None,
                    limits: Default::default(),
                }
            });
        }
        dag.ensure_service(key.clone(), |k| {
            calls += 1;
            Service {
                key: k.clone(),
                port_name: None,
                weighted: false,
                protocol: None,
                external_name: None,
                limits: Default::default(),
            }
        });
        assert_eq!(calls, 1);
        assert_eq!(dag.get_services().count(), 1);
    }

    #[test]
    fn orphan_secure_vhost_reparents_when_listener_added() {
        let mut dag = Dag::new();
        dag.ensure_secure_virtual_host("https", "foo.com");
        assert_eq!(dag.get_secure_virtual_hosts().count(), 1);
        dag.add_listener(Listener::new("https", "0.0.0.0", 443, Protocol::Https));
        assert_eq!(dag.get_secure_virtual_hosts().count(), 1);
        assert_eq!(dag.find_listener("https").unwrap().secure_virtual_hosts().len(), 1);
    }

    #[test]
    fn empty_cache_yields_configured_listeners_only() {
        let mut dag = Dag::new();
        dag.add_listener(Listener::new("http", "0.0.0.0", 80, Protocol::Http));
        dag.add_listener(Listener::new("https", "0.0.0.0", 443, Protocol::Https));
        assert_eq!(dag.listeners().len(), 2);
        assert_eq!(dag.get_virtual_hosts().count(), 0);
        assert_eq!(dag.get_secure_virtual_hosts().count(), 0);
    }

    #[test]
    fn service_clusters_exclude_external_name() {
        let mut dag = Dag::new();
        dag.add_listener(Listener::new("http", "0.0.0.0", 80, Protocol::Http));
        let key = ServiceKey {
            namespace: "default".into(),
            name: "ext".into(),
            port: NonZeroU16::new(80).unwrap(),
        };
        dag.ensure_service(key.clone(), |k| Service {
            key: k.clone(),
            port_name: None,
            weighted: false,
            protocol: None,
            external_name: Some("example.com".into()),
            limits: Default::default(),
        });
        let vhost = dag.ensure_virtual_host("http", "foo.com").unwrap();
        let mut route = Route::new(MatchConditions::default());
        route.clusters.push(Cluster::new(key, 1));
        vhost.add_route(route);
        assert_eq!(dag.get_service_clusters().len(), 0);
    }
}
