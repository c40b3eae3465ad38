//! Builds an `ingress_dag_core::Dag` from the contents of an `ObjectCache`
//! (spec.md §4.3/C4): the processor chain, the object cache it reads
//! through, and the pure helpers (policy compiler, annotation/duration
//! parsing, secret validation) the processors share.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod config;
pub mod duration;
pub mod object_cache;
pub mod policy;
pub mod processors;
pub mod secret;

pub use config::{BuilderConfig, ListenerConfig};
pub use object_cache::{LookupError, Object, ObjectCache, PortRef};

use ingress_dag_core::dag::Dag;

/// Runs one build: seeds a fresh `Dag` with the configured listeners, then
/// runs the Ingress, HTTPProxy, and Gateway API processors in that fixed
/// order against a shared `ObjectCache` snapshot (spec.md §4.3, §5).
/// Processors never fail the build; every error becomes a condition on the
/// offending resource (spec.md §7) and the next resource is still
/// processed.
pub struct Builder {
    config: BuilderConfig,
}

impl Builder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn build(&self, cache: &ObjectCache) -> Dag {
        let mut dag = Dag::new();
        processors::listener::run(&mut dag, &self.config);
        processors::ingress::run(&mut dag, cache, &self.config);
        processors::http_proxy::run(&mut dag, cache, &self.config);
        processors::gateway_api::run(&mut dag, cache, &self.config);
        dag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_with_empty_cache_seeds_only_listeners() {
        let builder = Builder::new(BuilderConfig::default());
        let cache = ObjectCache::new();
        let dag = builder.build(&cache);
        assert_eq!(dag.listeners().len(), 2);
        assert_eq!(dag.get_virtual_hosts().count(), 0);
    }
}
