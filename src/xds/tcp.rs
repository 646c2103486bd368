//! TCP listener assembly
//!
//! TCP mapping groups are grouped by bind endpoint. Each group becomes one filter chain holding
//! a weighted-cluster TCP proxy; groups with a TLS context get a transport socket and, when they
//! name a host, an SNI match. Chains with an SNI match are placed ahead of those without.

use crate::config::Config;
use crate::domain::{IngressModel, TcpMappingGroup};
use crate::xds::filters::any_from_message;
use crate::xds::listener::{tls_inspector_filter, ListenerKey};
use crate::xds::tls::to_transport_socket;
use crate::{Error, Result};
use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType as FilterConfigType, Filter, FilterChain, FilterChainMatch,
    Listener as EnvoyListener,
};
use envoy_types::pb::envoy::extensions::filters::network::tcp_proxy::v3::{
    tcp_proxy::{weighted_cluster::ClusterWeight, ClusterSpecifier, WeightedCluster},
    TcpProxy,
};
use std::collections::BTreeMap;
use tracing::debug;

pub const TCP_PROXY_FILTER_NAME: &str = "envoy.filters.network.tcp_proxy";
const TCP_PROXY_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy";

/// Filter chains contributed to one bind endpoint
#[derive(Debug, Clone, Default)]
pub struct TcpEndpoint {
    /// Names of the contributing mapping groups, in declaration order
    pub groups: Vec<String>,
    pub chains: Vec<FilterChain>,
}

impl TcpEndpoint {
    pub fn has_sni(&self) -> bool {
        self.chains.iter().any(|chain| {
            chain.filter_chain_match.as_ref().is_some_and(|m| !m.server_names.is_empty())
        })
    }
}

/// Build the filter chains of every TCP mapping group, keyed by bind endpoint
pub fn assemble_tcp_chains(
    model: &IngressModel,
    config: &Config,
) -> Result<BTreeMap<ListenerKey, TcpEndpoint>> {
    let mut endpoints: BTreeMap<ListenerKey, TcpEndpoint> = BTreeMap::new();

    for group in &model.tcp_mapping_groups {
        let key = ListenerKey::new(config.resolve_bind_address(group.bind_address.as_deref()), group.port);
        let chain = group_chain(model, group)?;
        debug!(group = %group.name, endpoint = %key, "TCP mapping group chain built");

        let endpoint = endpoints.entry(key).or_default();
        endpoint.groups.push(group.name.clone());
        endpoint.chains.push(chain);
    }

    for (key, endpoint) in endpoints.iter_mut() {
        endpoint.chains.sort_by_key(|chain| {
            chain.filter_chain_match.as_ref().map_or(true, |m| m.server_names.is_empty())
        });

        let mut seen: Vec<&FilterChainMatch> = Vec::with_capacity(endpoint.chains.len());
        for chain in &endpoint.chains {
            let chain_match = chain.filter_chain_match.as_ref();
            let Some(chain_match) = chain_match else { continue };
            if seen.contains(&chain_match) {
                return Err(Error::FilterChainConflict {
                    listener: key.listener_name(),
                    chain_match: describe_match(chain_match),
                });
            }
            seen.push(chain_match);
        }
    }

    Ok(endpoints)
}

fn group_chain(model: &IngressModel, group: &TcpMappingGroup) -> Result<FilterChain> {
    let tcp_proxy = TcpProxy {
        stat_prefix: format!("ingress_tcp_{}", group.port),
        cluster_specifier: Some(ClusterSpecifier::WeightedClusters(WeightedCluster {
            clusters: group
                .mappings
                .iter()
                .map(|mapping| ClusterWeight {
                    name: mapping.cluster.clone(),
                    weight: mapping.weight,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        })),
        ..Default::default()
    };

    let mut chain = FilterChain {
        filters: vec![Filter {
            name: TCP_PROXY_FILTER_NAME.to_string(),
            config_type: Some(FilterConfigType::TypedConfig(any_from_message(
                TCP_PROXY_TYPE_URL,
                &tcp_proxy,
            ))),
        }],
        filter_chain_match: Some(FilterChainMatch::default()),
        ..Default::default()
    };

    if let Some(context_name) = &group.tls_context {
        let ctx = model.tls_context(context_name, &format!("TCP mapping group {}", group.name))?;
        chain.transport_socket = Some(to_transport_socket(ctx)?);

        if let Some(host) = group.sni_host() {
            chain.filter_chain_match =
                Some(FilterChainMatch { server_names: vec![host.to_string()], ..Default::default() });
        }
    }

    Ok(chain)
}

fn describe_match(chain_match: &FilterChainMatch) -> String {
    if chain_match.server_names.is_empty() {
        "<any>".to_string()
    } else {
        format!("server_names={:?}", chain_match.server_names)
    }
}

/// Listener for a TCP endpoint no HTTP listener declaration claims
pub fn standalone_listener(key: &ListenerKey, endpoint: TcpEndpoint) -> EnvoyListener {
    let listener_filters = if endpoint.has_sni() { vec![tls_inspector_filter()] } else { Vec::new() };

    EnvoyListener {
        name: key.listener_name(),
        address: Some(key.socket_address()),
        filter_chains: endpoint.chains,
        listener_filters,
        ..Default::default()
    }
}
