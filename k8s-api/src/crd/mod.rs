//! The proprietary CRDs this builder consumes, defined via `kube::CustomResource`,
//! one file per kind, grouped by this re-export module.

pub mod extension_service;
pub mod http_proxy;
pub mod tls_certificate_delegation;

pub use extension_service::{ExtensionService, ExtensionServiceSpec};
pub use http_proxy::{HttpProxy, HttpProxySpec};
pub use tls_certificate_delegation::{TlsCertificateDelegation, TlsCertificateDelegationSpec};
