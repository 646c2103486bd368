//! TCP mapping group domain types

use serde::{Deserialize, Serialize};

/// One weighted upstream of a TCP mapping group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpMapping {
    pub cluster: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    100
}

/// TCP mappings that share a bind endpoint and SNI host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpMappingGroup {
    pub name: String,
    #[serde(default)]
    pub bind_address: Option<String>,
    pub port: u32,
    /// SNI host discriminating this group's chain; `*` or absent means none
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub tls_context: Option<String>,
    pub mappings: Vec<TcpMapping>,
}

impl TcpMappingGroup {
    /// SNI host to match on, if any
    pub fn sni_host(&self) -> Option<&str> {
        self.host.as_deref().filter(|host| !host.is_empty() && *host != "*")
    }
}
