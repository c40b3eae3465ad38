//! The ambient binary: CLI argument parsing, logging setup, and a one-shot
//! build wired to logging-only `Observer`/status-sink implementations. The
//! informer adapter and a real Kubernetes status writer remain external
//! collaborators that this binary does not implement; it runs a single
//! build against an empty cache and then waits for a shutdown signal,
//! giving operators a local smoke test of the builder and its logging.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

use clap::Parser;
use ingress_dag_builder::{Builder, BuilderConfig, ObjectCache};
use ingress_dag_core::dag::Dag;
use ingress_dag_core::status::StatusUpdate;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Parser)]
#[clap(name = "ingress-dag-controller", about = "Builds an ingress DAG from cluster state")]
struct Args {
    #[clap(long, env = "INGRESS_DAG_LOG", default_value = "ingress_dag=info,warn")]
    log_level: String,

    #[clap(long, value_enum, default_value = "plain")]
    log_format: LogFormat,

    /// Permits `ExternalName` services to be resolved into clusters.
    #[clap(long, env = "INGRESS_DAG_ENABLE_EXTERNAL_NAME")]
    enable_external_name_service: bool,

    /// `namespace/name` of the fallback certificate secret for SNI fallback.
    #[clap(long, env = "INGRESS_DAG_FALLBACK_CERTIFICATE")]
    fallback_certificate: Option<String>,

    /// `namespace/name` of the single Gateway API `Gateway` to program.
    /// Leaving this unset disables the Gateway API processor entirely.
    #[clap(long, env = "INGRESS_DAG_GATEWAY")]
    gateway: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<BuilderConfig> {
        let fallback_certificate = self.fallback_certificate.as_deref().map(parse_namespaced_name).transpose()?;
        let gateway = self.gateway.as_deref().map(parse_namespaced_name).transpose()?;
        Ok(BuilderConfig {
            enable_external_name_service: self.enable_external_name_service,
            fallback_certificate,
            gateway,
            ..BuilderConfig::default()
        })
    }
}

fn parse_namespaced_name(s: &str) -> anyhow::Result<(String, String)> {
    s.split_once('/')
        .map(|(ns, name)| (ns.to_string(), name.to_string()))
        .ok_or_else(|| anyhow::anyhow!("{s:?} is not of the form namespace/name"))
}

/// Notified with the completed DAG after every build.
trait Observer {
    fn on_change(&self, dag: &Dag);
}

/// Logs what a real controller would apply, instead of calling out to any
/// serving layer.
struct LoggingObserver;

impl Observer for LoggingObserver {
    fn on_change(&self, dag: &Dag) {
        tracing::info!(
            listeners = dag.listeners().len(),
            virtual_hosts = dag.get_virtual_hosts().count(),
            secure_virtual_hosts = dag.get_secure_virtual_hosts().count(),
            services = dag.get_services().count(),
            "dag rebuilt",
        );
    }
}

/// Logs what a real status writer would persist, instead of calling the API
/// server.
trait StatusSink {
    fn write(&self, updates: &[&StatusUpdate]);
}

struct LoggingStatusSink;

impl StatusSink for LoggingStatusSink {
    fn write(&self, updates: &[&StatusUpdate]) {
        for update in updates {
            tracing::info!(
                kind = %update.resource.kind,
                namespace = %update.resource.namespace,
                name = %update.resource.name,
                generation = update.resource.generation,
                conditions = update.conditions.len(),
                "status update",
            );
            for condition in &update.conditions {
                tracing::debug!(
                    type_ = %condition.type_,
                    status = ?condition.status,
                    reason = %condition.reason,
                    message = %condition.message,
                    "condition",
                );
            }
        }
    }
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("ingress_dag=info,warn"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match args.log_format {
        LogFormat::Plain => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = args.into_config()?;
    let builder = Builder::new(config);
    let cache = ObjectCache::new();

    let dag = builder.build(&cache);

    let observer = LoggingObserver;
    observer.on_change(&dag);

    let status_sink = LoggingStatusSink;
    status_sink.write(&dag.status.get_updates());

    tracing::info!("build complete, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
