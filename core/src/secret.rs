//! Validated TLS/CA secrets.
//!
//! Grounded on the teacher's pattern of wrapping a raw Kubernetes object
//! behind a narrow accessor type (cf. `k8s/index/src/meshtls_authentication.rs`'s
//! `Spec::try_from_resource`), generalized to PEM cert/key/CA validation
//! per spec.md §4.9 (the secret/certificate validator component).

use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretKey {
    pub namespace: String,
    pub name: String,
}

/// A validated TLS server secret: `tls.crt` + `tls.key`, optionally with a CA
/// bundle for downstream client-cert validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Secret {
    pub key: SecretKey,
    cert: Vec<u8>,
    private_key: Vec<u8>,
    data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    pub fn new(
        key: SecretKey,
        cert: Vec<u8>,
        private_key: Vec<u8>,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            key,
            cert,
            private_key,
            data,
        }
    }

    pub fn cert(&self) -> &[u8] {
        &self.cert
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    pub fn data(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.data
    }
}

/// The two-valued `isValidSecret` contract preserved through the type system
/// (spec.md §9 open question): `NotApplicable` means "not for us, don't
/// warn"; every other variant means "malformed, do warn".
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecretValidationError {
    #[error("secret type is not kubernetes.io/tls or contour CA bundle")]
    NotApplicable,
    #[error("secret is missing tls.crt")]
    MissingCert,
    #[error("secret is missing tls.key")]
    MissingKey,
    #[error("secret certificate is not valid PEM")]
    InvalidCert,
    #[error("secret private key does not match certificate")]
    KeyMismatch,
    #[error("CA bundle ca.crt is zero-length")]
    EmptyCaBundle,
    #[error("CA bundle is not valid PEM")]
    InvalidCaBundle,
}
