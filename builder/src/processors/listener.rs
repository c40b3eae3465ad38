//! `ListenerProcessor`: seeds the DAG with the configuration-fixed L4
//! listeners before any other processor runs (spec.md §4.3/C4). Listener
//! names are never hard-coded elsewhere; every other processor reaches a
//! listener via `Dag::get_single_listener` (spec.md §6).

use crate::config::BuilderConfig;
use ingress_dag_core::dag::Dag;
use ingress_dag_core::listener::Listener;

pub fn run(dag: &mut Dag, config: &BuilderConfig) {
    for l in &config.listeners {
        tracing::debug!(name = l.name, port = l.port, "configuring listener");
        dag.add_listener(Listener::new(l.name, l.address, l.port, l.protocol));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_configured_listeners_only() {
        let mut dag = Dag::new();
        run(&mut dag, &BuilderConfig::default());
        assert_eq!(dag.listeners().len(), 2);
    }
}
