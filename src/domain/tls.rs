//! TLS context domain types
//!
//! Contexts arrive already resolved (secrets named, files located); this crate only decides
//! where they are attached.

use serde::{Deserialize, Serialize};

/// TLS protocol version bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsVersion {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "v1.0")]
    V1_0,
    #[serde(rename = "v1.1")]
    V1_1,
    #[serde(rename = "v1.2")]
    V1_2,
    #[serde(rename = "v1.3")]
    V1_3,
}

impl TlsVersion {
    /// Value of `envoy.extensions.transport_sockets.tls.v3.TlsParameters.TlsProtocol`
    pub fn wire_value(self) -> i32 {
        match self {
            TlsVersion::Auto => 0,
            TlsVersion::V1_0 => 1,
            TlsVersion::V1_1 => 2,
            TlsVersion::V1_2 => 3,
            TlsVersion::V1_3 => 4,
        }
    }
}

/// Resolved TLS context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsContext {
    pub name: String,
    /// Hostnames served with this context; used as route domains
    #[serde(default)]
    pub hosts: Vec<String>,
    /// SDS secret holding the certificate chain and key
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub cert_chain_file: Option<String>,
    #[serde(default)]
    pub private_key_file: Option<String>,
    /// SDS secret holding the client CA bundle
    #[serde(default)]
    pub ca_secret: Option<String>,
    #[serde(default)]
    pub ca_cert_file: Option<String>,
    #[serde(default)]
    pub cert_required: Option<bool>,
    #[serde(default)]
    pub alpn_protocols: Vec<String>,
    #[serde(default)]
    pub min_tls_version: Option<TlsVersion>,
    #[serde(default)]
    pub max_tls_version: Option<TlsVersion>,
    #[serde(default)]
    pub cipher_suites: Vec<String>,
    #[serde(default)]
    pub ecdh_curves: Vec<String>,
}

impl TlsContext {
    /// Context backed by an SDS secret of the same name
    pub fn with_secret(name: impl Into<String>, hosts: Vec<String>) -> Self {
        let name = name.into();
        Self {
            secret: Some(name.clone()),
            name,
            hosts,
            cert_chain_file: None,
            private_key_file: None,
            ca_secret: None,
            ca_cert_file: None,
            cert_required: None,
            alpn_protocols: Vec::new(),
            min_tls_version: None,
            max_tls_version: None,
            cipher_suites: Vec::new(),
            ecdh_curves: Vec::new(),
        }
    }

    /// Whether any protocol parameter is constrained
    pub fn has_tls_parameters(&self) -> bool {
        self.min_tls_version.is_some()
            || self.max_tls_version.is_some()
            || !self.cipher_suites.is_empty()
            || !self.ecdh_curves.is_empty()
    }
}
