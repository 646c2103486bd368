//! Listener assembly using envoy-types
//!
//! Listener declarations are folded into one [`Listener`] per (bind address, port). Each
//! listener owns its virtual hosts, keyed by [`VirtualHostKey`], and is turned into an Envoy
//! `Listener` once the matcher has populated every virtual host's routes.

use crate::config::ModuleSettings;
use crate::domain::{HostAction, HostDecl, ListenerDecl, ProtocolLayer, SecurityModel, TlsContext};
use crate::xds::diagnostics::Diagnostics;
use crate::xds::filters::any_from_message;
use crate::xds::hostglob;
use crate::xds::http_config::{to_network_filter, BaseHttpConfig};
use crate::xds::tls::to_transport_socket;
use crate::xds::virtual_host::{VirtualHost, VirtualHostKey, VirtualHostSpec, CATCH_ALL};
use crate::{Error, Result};
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, socket_address::PortSpecifier, socket_address::Protocol,
    Address, SocketAddress, TrafficDirection,
};
use envoy_types::pb::envoy::config::listener::v3::{
    listener_filter::ConfigType as ListenerFilterConfigType, FilterChain, FilterChainMatch,
    Listener as EnvoyListener, ListenerFilter,
};
use envoy_types::pb::envoy::extensions::filters::listener::proxy_protocol::v3::ProxyProtocol;
use envoy_types::pb::envoy::extensions::filters::listener::tls_inspector::v3::TlsInspector;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Port the forced ACME challenge listener binds to
pub const ACME_PORT: u32 = 8080;

pub const PROXY_PROTOCOL_FILTER_NAME: &str = "envoy.filters.listener.proxy_protocol";
pub const TLS_INSPECTOR_FILTER_NAME: &str = "envoy.filters.listener.tls_inspector";
const PROXY_PROTOCOL_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.proxy_protocol.v3.ProxyProtocol";
const TLS_INSPECTOR_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector";

const WILDCARD_BIND: &str = "0.0.0.0";

/// Identity of a physical listener. Ordered by port first so output is sorted by port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerKey {
    pub port: u32,
    pub bind_address: String,
}

impl ListenerKey {
    pub fn new(bind_address: impl Into<String>, port: u32) -> Self {
        Self { port, bind_address: bind_address.into() }
    }

    /// `ingress-listener[-<bind>]-<port>`; the bind segment is left out for `0.0.0.0`
    pub fn listener_name(&self) -> String {
        if self.bind_address == WILDCARD_BIND {
            format!("ingress-listener-{}", self.port)
        } else {
            format!("ingress-listener-{}-{}", self.bind_address, self.port)
        }
    }

    pub fn socket_address(&self) -> Address {
        Address {
            address: Some(AddressType::SocketAddress(SocketAddress {
                protocol: Protocol::Tcp as i32,
                address: self.bind_address.clone(),
                port_specifier: Some(PortSpecifier::PortValue(self.port)),
                ..Default::default()
            })),
        }
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bind_address, self.port)
    }
}

/// A physical listener under assembly
#[derive(Debug, Clone)]
pub struct Listener {
    name: String,
    key: ListenerKey,
    proxy_protocol: bool,
    security_model: SecurityModel,
    protocol_stack: Vec<ProtocolLayer>,
    insecure_only: bool,
    hostname: Option<String>,
    synthesized: bool,
    declarations: Vec<String>,
    vhosts: Vec<VirtualHost>,
    vhost_index: BTreeMap<VirtualHostKey, usize>,
}

impl Listener {
    fn new(key: ListenerKey, proxy_protocol: bool) -> Self {
        Self {
            name: key.listener_name(),
            key,
            proxy_protocol,
            security_model: SecurityModel::default(),
            protocol_stack: Vec::new(),
            insecure_only: false,
            hostname: None,
            synthesized: false,
            declarations: Vec::new(),
            vhosts: Vec::new(),
            vhost_index: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &ListenerKey {
        &self.key
    }

    pub fn proxy_protocol(&self) -> bool {
        self.proxy_protocol
    }

    pub fn security_model(&self) -> SecurityModel {
        self.security_model
    }

    pub fn speaks(&self, layer: ProtocolLayer) -> bool {
        self.protocol_stack.contains(&layer)
    }

    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    /// Names of the declarations folded into this listener
    pub fn declarations(&self) -> &[String] {
        &self.declarations
    }

    pub fn vhosts(&self) -> &[VirtualHost] {
        &self.vhosts
    }

    pub fn vhosts_mut(&mut self) -> &mut [VirtualHost] {
        &mut self.vhosts
    }

    pub fn vhost(&self, key: &VirtualHostKey) -> Option<&VirtualHost> {
        self.vhost_index.get(key).map(|idx| &self.vhosts[*idx])
    }

    /// Fold a declaration into this listener.
    ///
    /// The first declaration fixes the security model, insecure-only flag and hostname filter;
    /// protocol stacks are unioned.
    pub fn absorb_declaration(&mut self, decl: &ListenerDecl) -> Result<()> {
        if decl.port != self.key.port {
            return Err(Error::PortMismatch {
                listener: self.name.clone(),
                listener_port: self.key.port,
                declaration: decl.name.clone(),
                requested_port: decl.port,
            });
        }

        if self.declarations.is_empty() {
            self.security_model = decl.security_model;
            self.insecure_only = decl.insecure_only;
            self.hostname = decl.hostname.clone().filter(|h| !h.is_empty());
        } else if decl.security_model != self.security_model {
            debug!(
                listener = %self.name,
                declaration = %decl.name,
                kept = %self.security_model,
                ignored = %decl.security_model,
                "declaration security model differs from the listener's; keeping the first"
            );
        }

        for layer in &decl.protocol_stack {
            if !self.protocol_stack.contains(layer) {
                self.protocol_stack.push(*layer);
            }
        }
        self.declarations.push(decl.name.clone());
        Ok(())
    }

    /// Register a virtual host; identical re-registration is a no-op.
    pub fn register_vhost(&mut self, spec: VirtualHostSpec) -> Result<()> {
        let key = spec.key();

        if let Some(existing) = self.vhost(&key) {
            if existing.same_definition(&spec) {
                return Ok(());
            }
            return Err(Error::VirtualHostConflict {
                listener: self.name.clone(),
                key: key.to_string(),
                existing: existing.describe(),
                requested: spec.describe(),
            });
        }

        info!(listener = %self.name, vhost = %key, "creating virtual host");
        self.vhost_index.insert(key, self.vhosts.len());
        self.vhosts.push(VirtualHost::from_spec(spec));
        Ok(())
    }

    /// Decide whether `host` gets a virtual host here, and on which side.
    ///
    /// `tls_context` is the host's resolved context; it is attached only to a secure-side
    /// virtual host on a listener that terminates TLS.
    pub fn admit_host(&mut self, host: &HostDecl, tls_context: Option<&TlsContext>) -> Result<()> {
        if self.synthesized {
            return Ok(());
        }

        if self.insecure_only && host.insecure_additional_port != Some(self.key.port) {
            info!(listener = %self.name, host = %host.name, "drop host: insecure-only port mismatch");
            return Ok(());
        }

        if let Some(pattern) = &self.hostname {
            if !hostglob::overlap(pattern, host.vhost_name()) {
                info!(
                    listener = %self.name,
                    host = %host.name,
                    pattern = %pattern,
                    "drop host: hostname does not match the listener"
                );
                return Ok(());
            }
        }

        if !(self.security_model == SecurityModel::Secure && host.rejects_secure()) {
            debug!(listener = %self.name, host = %host.name, "take host on the secure side");
            let tls_context = tls_context.filter(|_| self.speaks(ProtocolLayer::Tls)).cloned();
            return self.register_vhost(VirtualHostSpec {
                name: host.vhost_name().to_string(),
                hostname: host.vhost_name().to_string(),
                tls_context,
                secure: true,
                secure_action: host.secure_action,
                insecure_action: host.insecure_action,
            });
        }

        if !(self.security_model == SecurityModel::Insecure
            && host.insecure_action == Some(HostAction::Reject))
        {
            debug!(listener = %self.name, host = %host.name, "take host on the insecure side");
            return self.register_vhost(VirtualHostSpec {
                name: host.vhost_name().to_string(),
                hostname: host.vhost_name().to_string(),
                tls_context: None,
                secure: false,
                secure_action: None,
                insecure_action: host.insecure_action,
            });
        }

        info!(listener = %self.name, host = %host.name, "drop host: every request would be rejected");
        Ok(())
    }

    /// Make sure exactly one virtual host is the catch-all.
    ///
    /// An HTTP listener with no virtual hosts gets a synthesized catch-all with no actions;
    /// otherwise the first registered virtual host is coerced when none is `*`.
    pub fn ensure_catch_all(&mut self) {
        if !self.speaks(ProtocolLayer::Http) || self.vhosts.iter().any(VirtualHost::is_catch_all) {
            return;
        }

        match self.vhosts.first_mut() {
            Some(first) => {
                info!(listener = %self.name, vhost = %first.name(), "coercing first virtual host to catch-all");
                first.coerce_catch_all();
            }
            None => {
                info!(listener = %self.name, "synthesizing empty catch-all virtual host");
                self.vhosts.push(VirtualHost::from_spec(VirtualHostSpec {
                    name: CATCH_ALL.to_string(),
                    hostname: CATCH_ALL.to_string(),
                    tls_context: None,
                    secure: false,
                    secure_action: None,
                    insecure_action: None,
                }));
            }
        }

        self.vhost_index =
            self.vhosts.iter().enumerate().map(|(idx, vhost)| (vhost.key(), idx)).collect();
    }

    /// Listener filters, always proxy-protocol first and TLS inspector second
    pub fn listener_filters(&self) -> Vec<ListenerFilter> {
        let mut filters = Vec::new();
        if self.proxy_protocol {
            filters.push(proxy_protocol_filter());
        }
        if self.speaks(ProtocolLayer::Tls) {
            filters.push(tls_inspector_filter());
        }
        filters
    }

    /// Build the Envoy listener. `tcp_chains` are placed ahead of the HTTP chains.
    pub fn to_envoy(
        &self,
        base: &BaseHttpConfig,
        tcp_chains: Vec<FilterChain>,
        diagnostics: &mut Diagnostics,
    ) -> Result<EnvoyListener> {
        let mut filter_chains = tcp_chains;
        let is_http = self.speaks(ProtocolLayer::Http);

        if is_http {
            let mut seen: Vec<FilterChainMatch> = Vec::with_capacity(self.vhosts.len());

            for vhost in &self.vhosts {
                let chain_match = vhost.filter_chain_match();
                if seen.contains(&chain_match) {
                    diagnostics.report(
                        self.name.clone(),
                        format!(
                            "virtual host {} repeats filter chain match {:?}; keeping the first",
                            vhost.key(),
                            chain_match
                        ),
                    );
                    continue;
                }
                seen.push(chain_match.clone());

                let hcm = base.connection_manager_for(
                    format!("{}-{}", self.name, vhost.name()),
                    vhost.domains(),
                    vhost.routes().to_vec(),
                );
                let transport_socket = vhost.tls_context().map(to_transport_socket).transpose()?;

                filter_chains.push(FilterChain {
                    filter_chain_match: Some(chain_match),
                    filters: vec![to_network_filter(&hcm)],
                    transport_socket,
                    ..Default::default()
                });
            }
        }

        let traffic_direction = if is_http && base.is_outbound() {
            TrafficDirection::Outbound
        } else {
            TrafficDirection::Unspecified
        };

        Ok(EnvoyListener {
            name: self.name.clone(),
            address: Some(self.key.socket_address()),
            filter_chains,
            listener_filters: self.listener_filters(),
            traffic_direction: traffic_direction as i32,
            ..Default::default()
        })
    }
}

pub fn proxy_protocol_filter() -> ListenerFilter {
    ListenerFilter {
        name: PROXY_PROTOCOL_FILTER_NAME.to_string(),
        config_type: Some(ListenerFilterConfigType::TypedConfig(any_from_message(
            PROXY_PROTOCOL_TYPE_URL,
            &ProxyProtocol::default(),
        ))),
        ..Default::default()
    }
}

pub fn tls_inspector_filter() -> ListenerFilter {
    ListenerFilter {
        name: TLS_INSPECTOR_FILTER_NAME.to_string(),
        config_type: Some(ListenerFilterConfigType::TypedConfig(any_from_message(
            TLS_INSPECTOR_TYPE_URL,
            &TlsInspector::default(),
        ))),
        ..Default::default()
    }
}

/// Registry of listeners owned by one compilation
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: BTreeMap<ListenerKey, Listener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing listener for (bind, port), or a new one.
    ///
    /// Fails if the existing listener's proxy-protocol flag differs from `proxy_protocol`.
    pub fn get_or_create(
        &mut self,
        bind_address: &str,
        port: u32,
        proxy_protocol: bool,
    ) -> Result<&mut Listener> {
        let key = ListenerKey::new(bind_address, port);

        if let Some(existing) = self.listeners.get(&key) {
            if existing.proxy_protocol != proxy_protocol {
                return Err(Error::ProxyProtocolConflict {
                    listener: existing.name.clone(),
                    existing: existing.proxy_protocol,
                    requested: proxy_protocol,
                });
            }
        }

        Ok(self.listeners.entry(key).or_insert_with_key(|key| {
            info!(listener = %key.listener_name(), proxy_protocol, "creating listener");
            Listener::new(key.clone(), proxy_protocol)
        }))
    }

    pub fn register_vhost(&mut self, key: &ListenerKey, spec: VirtualHostSpec) -> Result<()> {
        self.listeners
            .get_mut(key)
            .ok_or_else(|| Error::internal(format!("no listener registered for {}", key)))?
            .register_vhost(spec)
    }

    /// Force a listener on the ACME port in edge mode so challenge routes have a home
    pub fn ensure_acme_listener(&mut self, settings: &ModuleSettings, bind_address: &str) -> Result<()> {
        if !settings.edge_mode || settings.intercept_agent {
            return Ok(());
        }
        if self.listeners.keys().any(|key| key.port == ACME_PORT) {
            return Ok(());
        }

        info!(port = ACME_PORT, "forcing ACME challenge listener");
        let listener = self.get_or_create(bind_address, ACME_PORT, false)?;
        listener.absorb_declaration(&ListenerDecl::http(
            "acme-challenge",
            ACME_PORT,
            SecurityModel::Insecure,
        ))?;
        listener.synthesized = true;
        listener.register_vhost(VirtualHostSpec {
            name: CATCH_ALL.to_string(),
            hostname: CATCH_ALL.to_string(),
            tls_context: None,
            secure: false,
            secure_action: None,
            insecure_action: Some(HostAction::Reject),
        })
    }

    /// Apply the catch-all rule to every listener
    pub fn finalize_all(&mut self) {
        for listener in self.listeners.values_mut() {
            listener.ensure_catch_all();
        }
    }

    pub fn get(&self, key: &ListenerKey) -> Option<&Listener> {
        self.listeners.get(key)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Listeners in key order
    pub fn listeners(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.values()
    }

    pub fn listeners_mut(&mut self) -> impl Iterator<Item = &mut Listener> {
        self.listeners.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secure_spec(hostname: &str) -> VirtualHostSpec {
        VirtualHostSpec {
            name: hostname.into(),
            hostname: hostname.into(),
            tls_context: None,
            secure: true,
            secure_action: Some(HostAction::Route),
            insecure_action: Some(HostAction::Redirect),
        }
    }

    fn listener_with(decl: ListenerDecl) -> Listener {
        let mut registry = ListenerRegistry::new();
        let listener = registry
            .get_or_create(WILDCARD_BIND, decl.port, decl.proxy_protocol())
            .expect("create listener");
        listener.absorb_declaration(&decl).expect("absorb declaration");
        listener.clone()
    }

    #[test]
    fn listener_names_omit_wildcard_bind() {
        assert_eq!(ListenerKey::new("0.0.0.0", 8080).listener_name(), "ingress-listener-8080");
        assert_eq!(
            ListenerKey::new("127.0.0.1", 8443).listener_name(),
            "ingress-listener-127.0.0.1-8443"
        );
    }

    #[test]
    fn keys_sort_by_port_first() {
        let mut keys = vec![
            ListenerKey::new("10.0.0.1", 8443),
            ListenerKey::new("0.0.0.0", 8443),
            ListenerKey::new("10.0.0.1", 80),
        ];
        keys.sort();
        assert_eq!(keys[0].port, 80);
        assert_eq!(keys[1].bind_address, "0.0.0.0");
    }

    #[test]
    fn proxy_protocol_conflict_is_fatal() {
        let mut registry = ListenerRegistry::new();
        registry.get_or_create("0.0.0.0", 8080, true).expect("create");
        assert!(registry.get_or_create("0.0.0.0", 8080, true).is_ok());

        let err = registry.get_or_create("0.0.0.0", 8080, false).expect_err("conflict");
        assert!(matches!(err, Error::ProxyProtocolConflict { existing: true, requested: false, .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn port_mismatch_is_fatal() {
        let mut registry = ListenerRegistry::new();
        let listener = registry.get_or_create("0.0.0.0", 8080, false).expect("create");
        let err = listener
            .absorb_declaration(&ListenerDecl::http("other", 9090, SecurityModel::Xfp))
            .expect_err("wrong port");
        assert!(matches!(err, Error::PortMismatch { requested_port: 9090, .. }));
    }

    #[test]
    fn first_declaration_wins_and_stacks_union() {
        let mut registry = ListenerRegistry::new();
        let listener = registry.get_or_create("0.0.0.0", 8443, false).expect("create");
        listener
            .absorb_declaration(&ListenerDecl::http("https", 8443, SecurityModel::Secure))
            .expect("absorb");
        let mut tls = ListenerDecl::http("tls", 8443, SecurityModel::Xfp);
        tls.protocol_stack = vec![ProtocolLayer::Tls, ProtocolLayer::Http];
        listener.absorb_declaration(&tls).expect("absorb");

        assert_eq!(listener.security_model(), SecurityModel::Secure);
        assert!(listener.speaks(ProtocolLayer::Tls) && listener.speaks(ProtocolLayer::Http));
        assert_eq!(listener.declarations(), ["https", "tls"]);
    }

    #[test]
    fn vhost_registration_dedupes_and_detects_conflicts() {
        let mut listener = listener_with(ListenerDecl::http("http", 8080, SecurityModel::Xfp));
        listener.register_vhost(secure_spec("example.com")).expect("register");
        listener.register_vhost(secure_spec("example.com")).expect("identical registration");
        assert_eq!(listener.vhosts().len(), 1);

        let mut conflicting = secure_spec("example.com");
        conflicting.insecure_action = Some(HostAction::Reject);
        let err = listener.register_vhost(conflicting).expect_err("conflict");
        match err {
            Error::VirtualHostConflict { key, existing, requested, .. } => {
                assert_eq!(key, "example.com-secure-<cleartext>");
                assert!(existing.contains("insecure_action=Redirect"));
                assert!(requested.contains("insecure_action=Reject"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn secure_listener_skips_hosts_that_reject_secure() {
        let mut listener = listener_with(ListenerDecl::http("https", 8443, SecurityModel::Secure));
        let mut host = HostDecl::new("h", "example.com");
        host.secure_action = Some(HostAction::Reject);
        listener.admit_host(&host, None).expect("admit");
        // the insecure side is still taken
        assert_eq!(listener.vhosts().len(), 1);
        assert_eq!(listener.vhosts()[0].secure_action(), None);

        let mut listener = listener_with(ListenerDecl::http("http", 8080, SecurityModel::Insecure));
        let mut host = HostDecl::new("h", "example.com");
        host.insecure_action = Some(HostAction::Reject);
        listener.admit_host(&host, None).expect("admit");
        assert_eq!(listener.vhosts().len(), 1, "secure side taken on an insecure listener");
    }

    #[test]
    fn tls_context_attaches_only_when_listener_terminates_tls() {
        let ctx = TlsContext::with_secret("ex-tls", vec!["example.com".into()]);
        let host = HostDecl::new("h", "example.com");

        let mut plain = listener_with(ListenerDecl::http("http", 8080, SecurityModel::Xfp));
        plain.admit_host(&host, Some(&ctx)).expect("admit");
        assert!(plain.vhosts()[0].tls_context().is_none());

        let mut decl = ListenerDecl::http("https", 8443, SecurityModel::Xfp);
        decl.protocol_stack = vec![ProtocolLayer::Tls, ProtocolLayer::Http];
        let mut tls = listener_with(decl);
        tls.admit_host(&host, Some(&ctx)).expect("admit");
        assert_eq!(tls.vhosts()[0].tls_context().map(|c| c.name.as_str()), Some("ex-tls"));
    }

    #[test]
    fn insecure_only_listener_requires_matching_additional_port() {
        let mut decl = ListenerDecl::http("extra", 8081, SecurityModel::Insecure);
        decl.insecure_only = true;
        let mut listener = listener_with(decl);

        listener.admit_host(&HostDecl::new("a", "a.example.com"), None).expect("admit");
        assert!(listener.vhosts().is_empty());

        let mut host = HostDecl::new("b", "b.example.com");
        host.insecure_additional_port = Some(8081);
        listener.admit_host(&host, None).expect("admit");
        assert_eq!(listener.vhosts().len(), 1);
    }

    #[test]
    fn hostname_glob_filters_hosts() {
        let mut decl = ListenerDecl::http("scoped", 8080, SecurityModel::Xfp);
        decl.hostname = Some("*.example.com".into());
        let mut listener = listener_with(decl);
        listener.admit_host(&HostDecl::new("a", "api.example.com"), None).expect("admit");
        listener.admit_host(&HostDecl::new("b", "example.org"), None).expect("admit");
        listener.admit_host(&HostDecl::new("c", "*.api.example.com"), None).expect("admit");
        listener.admit_host(&HostDecl::new("d", "*.example.org"), None).expect("admit");
        let hostnames: Vec<_> = listener.vhosts().iter().map(|v| v.hostname()).collect();
        assert_eq!(hostnames, vec!["api.example.com", "*.api.example.com"]);
    }

    #[test]
    fn catch_all_is_coerced_or_synthesized() {
        let mut listener = listener_with(ListenerDecl::http("http", 8080, SecurityModel::Xfp));
        listener.register_vhost(secure_spec("a.example.com")).expect("register");
        listener.register_vhost(secure_spec("b.example.com")).expect("register");
        listener.ensure_catch_all();
        let hostnames: Vec<_> = listener.vhosts().iter().map(|v| v.hostname()).collect();
        assert_eq!(hostnames, vec!["*", "b.example.com"]);
        assert!(listener.vhost(&listener.vhosts()[0].key()).is_some());

        let mut empty = listener_with(ListenerDecl::http("http", 8081, SecurityModel::Xfp));
        empty.ensure_catch_all();
        assert_eq!(empty.vhosts().len(), 1);
        assert!(empty.vhosts()[0].is_catch_all());
        assert_eq!(empty.vhosts()[0].insecure_action(), None);

        let mut tcp_decl = ListenerDecl::http("tcp", 9000, SecurityModel::Xfp);
        tcp_decl.protocol_stack = vec![ProtocolLayer::Tcp];
        let mut tcp = listener_with(tcp_decl);
        tcp.ensure_catch_all();
        assert!(tcp.vhosts().is_empty());
    }

    #[test]
    fn acme_listener_only_in_edge_mode() {
        let mut registry = ListenerRegistry::new();
        registry.ensure_acme_listener(&ModuleSettings::default(), "0.0.0.0").expect("acme");
        assert!(registry.is_empty());

        let edge = ModuleSettings { edge_mode: true, ..Default::default() };
        registry.ensure_acme_listener(&edge, "0.0.0.0").expect("acme");
        let listener = registry.get(&ListenerKey::new("0.0.0.0", ACME_PORT)).expect("acme listener");
        assert!(listener.is_synthesized());
        assert_eq!(listener.security_model(), SecurityModel::Insecure);
        assert_eq!(listener.vhosts()[0].insecure_action(), Some(HostAction::Reject));

        let agent = ModuleSettings { edge_mode: true, intercept_agent: true, ..Default::default() };
        let mut registry = ListenerRegistry::new();
        registry.ensure_acme_listener(&agent, "0.0.0.0").expect("acme");
        assert!(registry.is_empty());
    }

    #[test]
    fn listener_filters_have_fixed_order() {
        let mut decl = ListenerDecl::http("edge", 8443, SecurityModel::Secure);
        decl.protocol_stack = vec![ProtocolLayer::Tls, ProtocolLayer::Proxy, ProtocolLayer::Http];
        let listener = listener_with(decl);
        let names: Vec<_> = listener.listener_filters().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec![PROXY_PROTOCOL_FILTER_NAME, TLS_INSPECTOR_FILTER_NAME]);
    }
}
