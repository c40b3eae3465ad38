//! Build-time configuration: listener definitions, feature flags and the
//! TLS version floor a [`Builder`](crate::builder::Builder) run is
//! parameterized by.
//!
//! Grounded on `linkerd-linkerd2/policy-controller/k8s/index/src/cluster_info.rs`'s
//! `ClusterInfo` — a plain struct constructed once by the CLI layer and
//! threaded through the processors that need it, rather than a global.

use ingress_dag_core::listener::Protocol;
use ingress_dag_core::virtualhost::TlsVersion;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    pub name: &'static str,
    pub address: &'static str,
    pub port: u16,
    pub protocol: Protocol,
}

pub const DEFAULT_LISTENERS: &[ListenerConfig] = &[
    ListenerConfig {
        name: "http",
        address: "0.0.0.0",
        port: 8080,
        protocol: Protocol::Http,
    },
    ListenerConfig {
        name: "https",
        address: "0.0.0.0",
        port: 8443,
        protocol: Protocol::Https,
    },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuilderConfig {
    pub listeners: Vec<ListenerConfig>,
    /// `ExternalName` services are only resolvable when this is set
    /// (spec.md §4.1 invariant).
    pub enable_external_name_service: bool,
    /// The fallback certificate secret referenced by HTTPProxy virtual hosts
    /// that set `tls.passthrough == false` and opt into SNI fallback; `None`
    /// disables the feature.
    pub fallback_certificate: Option<(String, String)>,
    /// The single Gateway API `Gateway` this builder programs, identified by
    /// `(namespace, name)`. `None` disables `GatewayAPIProcessor` entirely.
    pub gateway: Option<(String, String)>,
    /// TLS version floor applied to a `SecureVirtualHost` when its owning
    /// Ingress/HTTPProxy sets no `tls-minimum-protocol-version` annotation
    /// or `minimumProtocolVersion` field.
    pub default_min_tls_version: TlsVersion,
    /// TLS version ceiling applied under the same fallback rule as
    /// [`default_min_tls_version`].
    pub default_max_tls_version: TlsVersion,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            listeners: DEFAULT_LISTENERS.to_vec(),
            enable_external_name_service: false,
            fallback_certificate: None,
            gateway: None,
            default_min_tls_version: TlsVersion::default(),
            default_max_tls_version: TlsVersion::default(),
        }
    }
}
