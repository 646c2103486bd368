//! Domain layer
//!
//! The ingress model: everything the compiler reads. These are plain serde types with no
//! knowledge of the proxy's wire format; the `xds` layer turns them into Envoy resources.
//!
//! ## Module Organization
//!
//! - `listener`: listener declarations, protocol stacks and security models
//! - `host`: hosts and their secure/insecure actions
//! - `route`: routing rules and their match predicates
//! - `tcp`: TCP mapping groups
//! - `tls`: resolved TLS contexts
//! - `observability`: tracing and access-log service declarations

pub mod host;
pub mod listener;
pub mod observability;
pub mod route;
pub mod tcp;
pub mod tls;

pub use host::{HostAction, HostDecl};
pub use listener::{ListenerDecl, ProtocolLayer, SecurityModel};
pub use observability::{
    AdditionalLogHeader, LogService, LogServiceDriver, SamplingSettings, TracingSettings,
};
pub use route::{
    HeaderMatch, PathMatch, RouteMatchSpec, RouteTarget, RoutingRule, WeightedTarget,
    ACME_CHALLENGE_PREFIX, FALLBACK_PRECEDENCE, ROOT_REGEX,
};
pub use tcp::{TcpMapping, TcpMappingGroup};
pub use tls::{TlsContext, TlsVersion};

use crate::config::ModuleSettings;
use crate::xds::filters::http::HttpFilterEntry;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fully materialized ingress intent for one compilation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressModel {
    pub listeners: Vec<ListenerDecl>,
    pub hosts: Vec<HostDecl>,
    pub routes: Vec<RoutingRule>,
    pub tcp_mapping_groups: Vec<TcpMappingGroup>,
    pub tls_contexts: Vec<TlsContext>,
    pub http_filters: Vec<HttpFilterEntry>,
    pub log_services: Vec<LogService>,
    pub tracing: Option<TracingSettings>,
    pub module: ModuleSettings,
}

impl IngressModel {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a model file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");

        let model = if is_json { Self::from_json_str(&source) } else { Self::from_yaml_str(&source) };
        model.map_err(|e| Error::serialization(format!("{}: {}", path.display(), e)))
    }

    /// Look up a TLS context referenced by `referrer`
    pub fn tls_context(&self, name: &str, referrer: &str) -> Result<&TlsContext> {
        self.tls_contexts.iter().find(|ctx| ctx.name == name).ok_or_else(|| {
            Error::UnknownTlsContext { context: name.to_string(), referrer: referrer.to_string() }
        })
    }

    /// Routing rules in matching order: highest precedence first, declaration order on ties
    pub fn ordered_routes(&self) -> Vec<&RoutingRule> {
        let mut rules: Vec<&RoutingRule> = self.routes.iter().collect();
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.precedence));
        rules
    }
}
