//! The `Listener` vertex: the root of the DAG, seeded once per build by the
//! `ListenerProcessor`. A single, small, ordered collection, since listeners
//! are configuration-fixed rather than discovered.

use crate::virtualhost::{SecureVirtualHost, VirtualHost};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub protocol: Protocol,
    virtual_hosts: Vec<VirtualHost>,
    secure_virtual_hosts: Vec<SecureVirtualHost>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListenerLookupError {
    #[error("no listener with protocol {0:?} is configured")]
    NotFound(Protocol),
    #[error("multiple listeners with protocol {0:?} are configured")]
    Ambiguous(Protocol),
}

impl Listener {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            protocol,
            virtual_hosts: Vec::new(),
            secure_virtual_hosts: Vec::new(),
        }
    }

    pub fn virtual_hosts(&self) -> &[VirtualHost] {
        &self.virtual_hosts
    }

    pub fn virtual_hosts_mut(&mut self) -> &mut Vec<VirtualHost> {
        &mut self.virtual_hosts
    }

    pub fn secure_virtual_hosts(&self) -> &[SecureVirtualHost] {
        &self.secure_virtual_hosts
    }

    pub fn secure_virtual_hosts_mut(&mut self) -> &mut Vec<SecureVirtualHost> {
        &mut self.secure_virtual_hosts
    }

    /// Inserts (or returns the existing) `VirtualHost` with the given name.
    /// Idempotent: calling this `k` times with the same `name` returns the
    /// same logical entry.
    pub fn ensure_virtual_host(&mut self, name: &str) -> &mut VirtualHost {
        if let Some(idx) = self.virtual_hosts.iter().position(|v| v.name == name) {
            return &mut self.virtual_hosts[idx];
        }
        self.virtual_hosts
            .push(VirtualHost::new(name, self.name.clone()));
        self.virtual_hosts.last_mut().expect("just pushed")
    }

    pub fn ensure_secure_virtual_host(&mut self, name: &str) -> &mut SecureVirtualHost {
        if let Some(idx) = self.secure_virtual_hosts.iter().position(|v| v.name == name) {
            return &mut self.secure_virtual_hosts[idx];
        }
        self.secure_virtual_hosts
            .push(SecureVirtualHost::new(name, self.name.clone()));
        self.secure_virtual_hosts.last_mut().expect("just pushed")
    }
}
