//! `ExtensionService`: an out-of-process gRPC extension (external
//! authorization, external rate-limiting) referenced from an HTTPProxy
//! virtual host's `authorizationService`/global rate-limit descriptors.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "projectcontour.io",
    version = "v1alpha1",
    kind = "ExtensionService",
    struct = "ExtensionService",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionServiceSpec {
    pub services: Vec<ExtensionServiceTarget>,
    pub protocol: Option<String>,
    pub timeout_policy: Option<ExtensionTimeoutPolicy>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionServiceTarget {
    pub name: String,
    pub port: u16,
    pub weight: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionTimeoutPolicy {
    pub response: Option<String>,
    pub idle: Option<String>,
}
