//! Kubernetes object types consumed by the builder: the stock `core`/
//! `networking` kinds, the Gateway API kinds, and the proprietary CRDs
//! (`HTTPProxy`, `TLSCertificateDelegation`, `ExtensionService`).
//!
//! Grounded on `linkerd-linkerd2/policy-controller/k8s/api/src/lib.rs`'s
//! single re-export module, generalized from the Linkerd policy CRD set to
//! the gateway-controller CRD set this builder consumes.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod crd;

pub use crd::{ExtensionService, ExtensionServiceSpec, HttpProxy, HttpProxySpec, TlsCertificateDelegation, TlsCertificateDelegationSpec};

pub use k8s_gateway_api::{
    AllowedRoutes, BackendObjectReference, BackendRef, CommonRouteSpec, FromNamespaces, Gateway,
    GatewayClass, GatewayClassSpec, GatewaySpec, GatewayStatus, GatewayTlsConfig, HttpBackendRef,
    HttpHeader, HttpHeaderMatch, HttpPathMatch, HttpPathModifier, HttpQueryParamMatch,
    HttpRequestHeaderFilter, HttpRequestMirrorFilter, HttpRequestRedirectFilter, HttpRoute,
    HttpRouteFilter, HttpRouteMatch, HttpRouteRule, HttpRouteSpec, Listener as GatewayListener,
    ParentReference, ReferenceGrant, ReferenceGrantFrom, ReferenceGrantSpec, ReferenceGrantTo,
    RouteGroupKind, RouteNamespaces, RouteParentStatus, RouteStatus, SecretObjectReference,
    TlsModeType, TlsRoute, TlsRouteRule, TlsRouteSpec,
};

pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Endpoints, Namespace, Secret, Service, ServicePort, ServiceSpec},
        networking::v1::{Ingress, IngressSpec, IngressTLS},
    },
    apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector, LabelSelectorRequirement},
    ByteString,
};

pub use kube::api::{ObjectMeta, ResourceExt};
