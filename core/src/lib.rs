//! Ingress DAG core
//!
//! Defines the typed graph produced by a DAG build: listeners, virtual
//! hosts, routes and clusters, along with the match/policy value types and
//! the status-cache model that accumulates per-resource conditions during a
//! build. This crate has no Kubernetes client dependency; it is a pure data
//! model shared by the builder and by anything that consumes a finished DAG.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cluster;
pub mod dag;
pub mod http_route;
pub mod listener;
pub mod policy;
pub mod route;
pub mod secret;
pub mod service;
pub mod status;
pub mod virtualhost;

pub use cluster::Cluster;
pub use dag::Dag;
pub use listener::{Listener, Protocol};
pub use route::Route;
pub use secret::Secret;
pub use service::Service;
pub use status::StatusCache;
pub use virtualhost::{SecureVirtualHost, VirtualHost};
