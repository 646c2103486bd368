//! Host domain types

use serde::{Deserialize, Serialize};

/// What a virtual host does with a request on one side (secure or insecure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostAction {
    /// Route the request as the routing rule says
    Route,
    /// Redirect the request to HTTPS
    Redirect,
    /// Drop the route
    Reject,
}

impl std::fmt::Display for HostAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HostAction::Route => "Route",
            HostAction::Redirect => "Redirect",
            HostAction::Reject => "Reject",
        };
        f.write_str(label)
    }
}

/// Host declaration.
///
/// An absent action (`null` in the model) means the host has no such side at all, which is
/// different from `Reject`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostDecl {
    pub name: String,
    #[serde(default = "wildcard_hostname")]
    pub hostname: String,
    /// Name of a TLS context defined in the model
    #[serde(default)]
    pub tls_context: Option<String>,
    #[serde(default = "default_secure_action")]
    pub secure_action: Option<HostAction>,
    #[serde(default = "default_insecure_action")]
    pub insecure_action: Option<HostAction>,
    /// Extra cleartext port served for this host
    #[serde(default)]
    pub insecure_additional_port: Option<u32>,
}

fn wildcard_hostname() -> String {
    "*".to_string()
}

fn default_secure_action() -> Option<HostAction> {
    Some(HostAction::Route)
}

fn default_insecure_action() -> Option<HostAction> {
    Some(HostAction::Redirect)
}

impl HostDecl {
    /// Host with default actions: route secure requests, redirect insecure ones
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            tls_context: None,
            secure_action: default_secure_action(),
            insecure_action: default_insecure_action(),
            insecure_additional_port: None,
        }
    }

    /// Effective hostname (empty is treated as `*`)
    pub fn vhost_name(&self) -> &str {
        if self.hostname.is_empty() {
            "*"
        } else {
            &self.hostname
        }
    }

    /// A listener that only sees secure traffic gains nothing from this host
    pub fn rejects_secure(&self) -> bool {
        matches!(self.secure_action, None | Some(HostAction::Reject))
    }
}
