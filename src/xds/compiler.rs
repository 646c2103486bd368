//! # Listener Compilation
//!
//! End-to-end pipeline from an [`IngressModel`] to Envoy listeners:
//!
//! 1. sanitize module and tracing settings, build the shared HTTP connection-manager base
//! 2. create one listener per bind endpoint from the declarations, plus the ACME listener in
//!    edge mode
//! 3. admit every host onto every HTTP listener and close each listener with one catch-all
//! 4. match the ordered routing rules against every virtual host
//! 5. assemble TCP chains and merge them into declared listeners or standalone ones
//!
//! The output is sorted by port then bind address, so equal models compile to identical bytes.

use crate::config::Config;
use crate::domain::{IngressModel, ProtocolLayer};
use crate::xds::diagnostics::Diagnostics;
use crate::xds::filters::http::HttpFilterAdapter;
use crate::xds::http_config::{BaseHttpConfig, HTTP_CONNECTION_MANAGER_TYPE_URL};
use crate::xds::listener::{ListenerKey, ListenerRegistry};
use crate::xds::matcher::assign_routes;
use crate::xds::route::RouteVariants;
use crate::xds::tcp::{assemble_tcp_chains, standalone_listener, TCP_PROXY_FILTER_NAME};
use crate::{Error, Result};
use envoy_types::pb::envoy::config::core::v3::{
    address, socket_address::PortSpecifier, TrafficDirection,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType as FilterConfigType, FilterChain, Listener as EnvoyListener,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::RouteSpecifier, HttpConnectionManager,
};
use envoy_types::pb::envoy::extensions::filters::network::tcp_proxy::v3::{
    tcp_proxy::ClusterSpecifier, TcpProxy,
};
use envoy_types::pb::google::protobuf::Any;
use prost::Message;
use serde::Serialize;
use tracing::{debug, info};

/// Type URL of a listener resource in an xDS response
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";

/// Result of one compilation
#[derive(Debug, Clone, Default)]
pub struct CompiledListeners {
    /// Listeners ordered by port, then bind address
    pub listeners: Vec<EnvoyListener>,
    pub diagnostics: Diagnostics,
}

/// Compile `model` into Envoy listeners.
///
/// Structural inconsistencies in the model fail the whole compilation; recoverable mistakes
/// are returned as diagnostics next to the listeners.
pub fn compile(
    model: &IngressModel,
    config: &Config,
    adapter: &dyn HttpFilterAdapter,
) -> Result<CompiledListeners> {
    let span = crate::compile_span!(
        listeners = model.listeners.len(),
        hosts = model.hosts.len(),
        routes = model.routes.len()
    );
    let _guard = span.enter();

    let mut diagnostics = Diagnostics::new();

    let mut settings = model.module.clone();
    settings.sanitize(&mut diagnostics);
    let mut tracing_settings = model.tracing.clone();
    if let Some(tracing_settings) = tracing_settings.as_mut() {
        tracing_settings.sanitize(&mut diagnostics);
    }

    let base = BaseHttpConfig::build(
        &settings,
        tracing_settings.as_ref(),
        &model.log_services,
        &model.http_filters,
        adapter,
        &mut diagnostics,
    )?;

    let mut registry = ListenerRegistry::new();
    for decl in &model.listeners {
        let bind_address = config.resolve_bind_address(decl.bind_address.as_deref());
        registry
            .get_or_create(&bind_address, decl.port, decl.proxy_protocol())?
            .absorb_declaration(decl)?;
    }
    registry.ensure_acme_listener(&settings, &config.bind_address)?;

    let hosts = model
        .hosts
        .iter()
        .map(|host| {
            let ctx = host
                .tls_context
                .as_deref()
                .map(|name| model.tls_context(name, &format!("host {}", host.name)))
                .transpose()?;
            Ok((host, ctx))
        })
        .collect::<Result<Vec<_>>>()?;

    for listener in registry.listeners_mut() {
        if !listener.speaks(ProtocolLayer::Http) {
            continue;
        }
        for (host, ctx) in &hosts {
            listener.admit_host(host, *ctx)?;
        }
    }
    registry.finalize_all();

    let rules: Vec<RouteVariants<'_>> =
        model.ordered_routes().into_iter().map(RouteVariants::new).collect();
    assign_routes(&mut registry, &rules, settings.edge_mode);

    let mut tcp_endpoints = assemble_tcp_chains(model, config)?;
    let mut compiled: Vec<(ListenerKey, EnvoyListener)> = Vec::with_capacity(registry.len());

    for listener in registry.listeners() {
        let tcp_chains = match tcp_endpoints.remove(listener.key()) {
            Some(endpoint) if listener.speaks(ProtocolLayer::Tcp) => endpoint.chains,
            Some(endpoint) => {
                for group in &endpoint.groups {
                    diagnostics.report(
                        group.as_str(),
                        format!(
                            "TCP mapping group {} targets listener {}, which does not speak TCP; skipping it",
                            group,
                            listener.name()
                        ),
                    );
                }
                Vec::new()
            }
            None => Vec::new(),
        };

        let envoy_listener = listener.to_envoy(&base, tcp_chains, &mut diagnostics)?;
        debug!(
            listener = %envoy_listener.name,
            declarations = ?listener.declarations(),
            synthesized = listener.is_synthesized(),
            filter_chains = envoy_listener.filter_chains.len(),
            "Listener compiled"
        );
        compiled.push((listener.key().clone(), envoy_listener));
    }

    for (key, endpoint) in tcp_endpoints {
        debug!(endpoint = %key, groups = ?endpoint.groups, "Standalone TCP listener compiled");
        let envoy_listener = standalone_listener(&key, endpoint);
        compiled.push((key, envoy_listener));
    }

    compiled.sort_by(|a, b| a.0.cmp(&b.0));

    info!(
        listeners = compiled.len(),
        diagnostics = diagnostics.len(),
        "Compilation finished"
    );

    Ok(CompiledListeners {
        listeners: compiled.into_iter().map(|(_, listener)| listener).collect(),
        diagnostics,
    })
}

impl CompiledListeners {
    pub fn listener(&self, name: &str) -> Option<&EnvoyListener> {
        self.listeners.iter().find(|listener| listener.name == name)
    }

    /// Listeners packed as xDS resources
    pub fn resources(&self) -> Vec<Any> {
        self.listeners
            .iter()
            .map(|listener| Any {
                type_url: LISTENER_TYPE_URL.to_string(),
                value: listener.encode_to_vec(),
            })
            .collect()
    }

    /// Every listener as a length-delimited protobuf record, concatenated
    pub fn encode_length_delimited(&self) -> Vec<u8> {
        self.listeners.iter().flat_map(|listener| listener.encode_length_delimited_to_vec()).collect()
    }

    /// Human-readable outline of the compiled listeners
    pub fn summary(&self) -> Result<CompileSummary> {
        let listeners =
            self.listeners.iter().map(ListenerSummary::from_listener).collect::<Result<Vec<_>>>()?;
        Ok(CompileSummary { listeners, diagnostics: self.diagnostics.clone() })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileSummary {
    pub listeners: Vec<ListenerSummary>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerSummary {
    pub name: String,
    pub address: String,
    pub port: u32,
    pub traffic_direction: String,
    pub listener_filters: Vec<String>,
    pub filter_chains: Vec<ChainSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_protocol: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub server_names: Vec<String>,
    pub tls: bool,
    #[serde(flatten)]
    pub kind: ChainKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainKind {
    Http { virtual_host: String, domains: Vec<String>, routes: usize },
    Tcp { stat_prefix: String, clusters: Vec<String> },
    Other { filter: String },
}

impl ListenerSummary {
    fn from_listener(listener: &EnvoyListener) -> Result<Self> {
        let (address, port) = match listener.address.as_ref().and_then(|a| a.address.as_ref()) {
            Some(address::Address::SocketAddress(socket)) => {
                let port = match socket.port_specifier {
                    Some(PortSpecifier::PortValue(port)) => port,
                    _ => 0,
                };
                (socket.address.clone(), port)
            }
            _ => (String::new(), 0),
        };

        let traffic_direction = TrafficDirection::try_from(listener.traffic_direction)
            .map(|direction| direction.as_str_name())
            .unwrap_or("UNSPECIFIED");

        Ok(Self {
            name: listener.name.clone(),
            address,
            port,
            traffic_direction: traffic_direction.to_string(),
            listener_filters: listener.listener_filters.iter().map(|f| f.name.clone()).collect(),
            filter_chains: listener
                .filter_chains
                .iter()
                .map(ChainSummary::from_chain)
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

impl ChainSummary {
    fn from_chain(chain: &FilterChain) -> Result<Self> {
        let chain_match = chain.filter_chain_match.clone().unwrap_or_default();
        let transport_protocol =
            Some(chain_match.transport_protocol).filter(|protocol| !protocol.is_empty());

        let kind = match chain.filters.first() {
            Some(filter) => match &filter.config_type {
                Some(FilterConfigType::TypedConfig(any))
                    if any.type_url == HTTP_CONNECTION_MANAGER_TYPE_URL =>
                {
                    http_kind(&HttpConnectionManager::decode(any.value.as_slice()).map_err(
                        |e| Error::serialization(format!("decode connection manager: {}", e)),
                    )?)
                }
                Some(FilterConfigType::TypedConfig(any)) if filter.name == TCP_PROXY_FILTER_NAME => {
                    tcp_kind(&TcpProxy::decode(any.value.as_slice()).map_err(|e| {
                        Error::serialization(format!("decode tcp proxy: {}", e))
                    })?)
                }
                _ => ChainKind::Other { filter: filter.name.clone() },
            },
            None => ChainKind::Other { filter: String::new() },
        };

        Ok(Self {
            transport_protocol,
            server_names: chain_match.server_names,
            tls: chain.transport_socket.is_some(),
            kind,
        })
    }
}

fn http_kind(hcm: &HttpConnectionManager) -> ChainKind {
    let vhost = match &hcm.route_specifier {
        Some(RouteSpecifier::RouteConfig(route_config)) => route_config.virtual_hosts.first(),
        _ => None,
    };
    match vhost {
        Some(vhost) => ChainKind::Http {
            virtual_host: vhost.name.clone(),
            domains: vhost.domains.clone(),
            routes: vhost.routes.len(),
        },
        None => ChainKind::Http { virtual_host: String::new(), domains: Vec::new(), routes: 0 },
    }
}

fn tcp_kind(proxy: &TcpProxy) -> ChainKind {
    let clusters = match &proxy.cluster_specifier {
        Some(ClusterSpecifier::Cluster(cluster)) => vec![cluster.clone()],
        Some(ClusterSpecifier::WeightedClusters(weighted)) => weighted
            .clusters
            .iter()
            .map(|c| format!("{}:{}", c.name, c.weight))
            .collect(),
        None => Vec::new(),
    };
    ChainKind::Tcp { stat_prefix: proxy.stat_prefix.clone(), clusters }
}
