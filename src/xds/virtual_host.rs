//! Virtual host entity
//!
//! A virtual host is one (hostname, security side, TLS context) routing scope under a listener.
//! It owns the routes the matcher assigns to it and knows how to describe its own filter
//! chain match and route-config domains. It makes no decisions of its own.

use crate::domain::{HostAction, TlsContext};
use envoy_types::pb::envoy::config::listener::v3::FilterChainMatch;
use envoy_types::pb::envoy::config::route::v3::Route;
use std::fmt;

/// Catch-all hostname
pub const CATCH_ALL: &str = "*";

/// Identity of a virtual host within one listener
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualHostKey {
    pub hostname: String,
    pub secure: bool,
    /// Name of the attached TLS context, if any
    pub context: Option<String>,
}

impl fmt::Display for VirtualHostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.hostname,
            if self.secure { "secure" } else { "insecure" },
            self.context.as_deref().unwrap_or("<cleartext>")
        )
    }
}

/// Registration request for a virtual host
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualHostSpec {
    pub name: String,
    pub hostname: String,
    pub tls_context: Option<TlsContext>,
    pub secure: bool,
    pub secure_action: Option<HostAction>,
    pub insecure_action: Option<HostAction>,
}

impl VirtualHostSpec {
    pub fn key(&self) -> VirtualHostKey {
        VirtualHostKey {
            hostname: self.hostname.clone(),
            secure: self.secure,
            context: self.tls_context.as_ref().map(|ctx| ctx.name.clone()),
        }
    }

    /// Attribute summary used in conflict errors
    pub fn describe(&self) -> String {
        describe(
            &self.hostname,
            self.tls_context.as_ref(),
            self.secure,
            self.secure_action,
            self.insecure_action,
        )
    }
}

/// A registered virtual host and its assigned routes
#[derive(Debug, Clone)]
pub struct VirtualHost {
    name: String,
    hostname: String,
    tls_context: Option<TlsContext>,
    secure: bool,
    secure_action: Option<HostAction>,
    insecure_action: Option<HostAction>,
    routes: Vec<Route>,
}

impl VirtualHost {
    pub fn from_spec(spec: VirtualHostSpec) -> Self {
        Self {
            name: spec.name,
            hostname: spec.hostname,
            tls_context: spec.tls_context,
            secure: spec.secure,
            secure_action: spec.secure_action,
            insecure_action: spec.insecure_action,
            routes: Vec::new(),
        }
    }

    pub fn key(&self) -> VirtualHostKey {
        VirtualHostKey {
            hostname: self.hostname.clone(),
            secure: self.secure,
            context: self.tls_context.as_ref().map(|ctx| ctx.name.clone()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn tls_context(&self) -> Option<&TlsContext> {
        self.tls_context.as_ref()
    }

    pub fn secure_action(&self) -> Option<HostAction> {
        self.secure_action
    }

    pub fn insecure_action(&self) -> Option<HostAction> {
        self.insecure_action
    }

    /// Whether a second registration describes this same virtual host
    pub fn same_definition(&self, spec: &VirtualHostSpec) -> bool {
        self.hostname == spec.hostname
            && self.tls_context == spec.tls_context
            && self.secure == spec.secure
            && self.secure_action == spec.secure_action
            && self.insecure_action == spec.insecure_action
    }

    pub fn describe(&self) -> String {
        describe(
            &self.hostname,
            self.tls_context.as_ref(),
            self.secure,
            self.secure_action,
            self.insecure_action,
        )
    }

    pub fn is_catch_all(&self) -> bool {
        self.hostname == CATCH_ALL
    }

    /// Take over the catch-all role
    pub fn coerce_catch_all(&mut self) {
        self.hostname = CATCH_ALL.to_string();
        self.name = CATCH_ALL.to_string();
    }

    /// Route-config domains: `*` for the catch-all, else the context's hosts, else the hostname
    pub fn domains(&self) -> Vec<String> {
        if self.is_catch_all() {
            return vec![CATCH_ALL.to_string()];
        }

        match &self.tls_context {
            Some(ctx) if !ctx.hosts.is_empty() => ctx.hosts.clone(),
            _ => vec![self.hostname.clone()],
        }
    }

    pub fn filter_chain_match(&self) -> FilterChainMatch {
        let mut chain_match = FilterChainMatch::default();
        if self.tls_context.is_some() {
            chain_match.transport_protocol = "tls".to_string();
        }
        if !self.is_catch_all() {
            chain_match.server_names = vec![self.hostname.clone()];
        }
        chain_match
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

fn describe(
    hostname: &str,
    ctx: Option<&TlsContext>,
    secure: bool,
    secure_action: Option<HostAction>,
    insecure_action: Option<HostAction>,
) -> String {
    fn action(a: Option<HostAction>) -> String {
        a.map(|a| a.to_string()).unwrap_or_else(|| "None".to_string())
    }

    format!(
        "hostname={} context={} secure={} secure_action={} insecure_action={}",
        hostname,
        ctx.map(|c| c.name.as_str()).unwrap_or("<none>"),
        secure,
        action(secure_action),
        action(insecure_action)
    )
}
