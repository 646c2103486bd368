//! Listener domain types
//!
//! A listener declaration names a bind point and the protocol stack spoken on it. Several
//! declarations may share one (bind address, port) pair; the assembler folds them into a
//! single physical listener.

use serde::{Deserialize, Serialize};

/// One layer of a listener's protocol stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolLayer {
    /// HTTP routing via the connection manager
    Http,
    /// TLS termination (adds the TLS inspector)
    Tls,
    /// PROXY protocol framing (adds the proxy-protocol listener filter)
    Proxy,
    /// Raw TCP proxying
    Tcp,
}

/// Which requests a listener is expected to see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityModel {
    /// Every request is secure
    Secure,
    /// Every request is insecure
    Insecure,
    /// Security is decided per request from `X-Forwarded-Proto`
    #[default]
    Xfp,
}

impl SecurityModel {
    /// Whether secure requests can arrive on this listener
    pub fn admits_secure(self) -> bool {
        self != SecurityModel::Insecure
    }

    /// Whether insecure requests can arrive on this listener
    pub fn admits_insecure(self) -> bool {
        self != SecurityModel::Secure
    }
}

impl std::fmt::Display for SecurityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SecurityModel::Secure => "SECURE",
            SecurityModel::Insecure => "INSECURE",
            SecurityModel::Xfp => "XFP",
        };
        f.write_str(label)
    }
}

/// Listener declaration as authored by the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerDecl {
    pub name: String,
    /// Falls back to the configured default bind address when absent
    #[serde(default)]
    pub bind_address: Option<String>,
    pub port: u32,
    #[serde(default = "default_protocol_stack")]
    pub protocol_stack: Vec<ProtocolLayer>,
    #[serde(default)]
    pub security_model: SecurityModel,
    /// Synthesized to carry the insecure side of a Host on an additional port
    #[serde(default)]
    pub insecure_only: bool,
    /// Optional host glob restricting which Hosts attach to this listener
    #[serde(default)]
    pub hostname: Option<String>,
}

fn default_protocol_stack() -> Vec<ProtocolLayer> {
    vec![ProtocolLayer::Http]
}

impl ListenerDecl {
    /// Create an HTTP declaration on `port` with default settings
    pub fn http(name: impl Into<String>, port: u32, security_model: SecurityModel) -> Self {
        Self {
            name: name.into(),
            bind_address: None,
            port,
            protocol_stack: default_protocol_stack(),
            security_model,
            insecure_only: false,
            hostname: None,
        }
    }

    pub fn speaks(&self, layer: ProtocolLayer) -> bool {
        self.protocol_stack.contains(&layer)
    }

    /// PROXY protocol is enabled iff it is part of the stack
    pub fn proxy_protocol(&self) -> bool {
        self.speaks(ProtocolLayer::Proxy)
    }
}
