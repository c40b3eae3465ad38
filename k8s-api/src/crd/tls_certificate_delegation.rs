//! `TLSCertificateDelegation`: grants cross-namespace permission for an
//! HTTPProxy/Ingress in another namespace to reference a TLS secret.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "projectcontour.io",
    version = "v1",
    kind = "TLSCertificateDelegation",
    struct = "TlsCertificateDelegation",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertificateDelegationSpec {
    pub delegations: Vec<CertificateDelegation>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDelegation {
    pub secret_name: String,
    /// `"*"` admits any consumer namespace.
    pub target_namespaces: Vec<String>,
}
