//! Shared builders and decoders for the compilation scenarios.

#![allow(dead_code)]

use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType, FilterChain, Listener,
};
use envoy_types::pb::envoy::config::route::v3::{
    header_matcher::HeaderMatchSpecifier, route::Action, Route, VirtualHost,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::RouteSpecifier, HttpConnectionManager,
};
use envoy_types::pb::envoy::extensions::filters::network::tcp_proxy::v3::TcpProxy;
use envoy_types::pb::envoy::r#type::matcher::v3::{string_matcher::MatchPattern, StringMatcher};
use ingress_compiler::domain::{
    HostAction, HostDecl, ListenerDecl, ProtocolLayer, RoutingRule, SecurityModel, TcpMapping,
    TcpMappingGroup,
};
use ingress_compiler::xds::http_config::HTTP_CONNECTION_MANAGER_TYPE_URL;
use ingress_compiler::{compile, CompiledListeners, Config, DefaultHttpFilterAdapter, IngressModel};
use prost::Message;

pub fn compile_ok(model: &IngressModel) -> CompiledListeners {
    compile(model, &Config::default(), &DefaultHttpFilterAdapter).expect("model should compile")
}

pub fn listener_decl(
    name: &str,
    port: u32,
    model: SecurityModel,
    stack: &[ProtocolLayer],
) -> ListenerDecl {
    ListenerDecl { protocol_stack: stack.to_vec(), ..ListenerDecl::http(name, port, model) }
}

pub fn host(
    name: &str,
    hostname: &str,
    secure: Option<HostAction>,
    insecure: Option<HostAction>,
) -> HostDecl {
    HostDecl { secure_action: secure, insecure_action: insecure, ..HostDecl::new(name, hostname) }
}

pub fn rule(name: &str, prefix: &str, cluster: &str, hosts: &[&str]) -> RoutingRule {
    RoutingRule {
        host_constraints: hosts.iter().map(|h| h.to_string()).collect(),
        ..RoutingRule::to_cluster(name, prefix, cluster)
    }
}

pub fn tcp_group(name: &str, port: u32, host: Option<&str>, tls: Option<&str>) -> TcpMappingGroup {
    TcpMappingGroup {
        name: name.into(),
        bind_address: None,
        port,
        host: host.map(str::to_string),
        tls_context: tls.map(str::to_string),
        mappings: vec![
            TcpMapping { cluster: format!("{}-primary", name), weight: 80 },
            TcpMapping { cluster: format!("{}-canary", name), weight: 20 },
        ],
    }
}

pub fn listener<'a>(compiled: &'a CompiledListeners, name: &str) -> &'a Listener {
    compiled.listener(name).unwrap_or_else(|| panic!("listener {} not compiled", name))
}

/// Connection managers of the HTTP chains of `listener`, in chain order
pub fn connection_managers(listener: &Listener) -> Vec<HttpConnectionManager> {
    listener
        .filter_chains
        .iter()
        .filter_map(|chain| match &chain.filters.first()?.config_type {
            Some(ConfigType::TypedConfig(any)) if any.type_url == HTTP_CONNECTION_MANAGER_TYPE_URL => {
                Some(HttpConnectionManager::decode(any.value.as_slice()).expect("decode hcm"))
            }
            _ => None,
        })
        .collect()
}

pub fn tcp_proxy(chain: &FilterChain) -> Option<TcpProxy> {
    match &chain.filters.first()?.config_type {
        Some(ConfigType::TypedConfig(any)) if any.type_url.ends_with("tcp_proxy.v3.TcpProxy") => {
            Some(TcpProxy::decode(any.value.as_slice()).expect("decode tcp proxy"))
        }
        _ => None,
    }
}

pub fn virtual_hosts(listener: &Listener) -> Vec<VirtualHost> {
    connection_managers(listener)
        .into_iter()
        .filter_map(|hcm| match hcm.route_specifier {
            Some(RouteSpecifier::RouteConfig(config)) => config.virtual_hosts.into_iter().next(),
            _ => None,
        })
        .collect()
}

pub fn virtual_host(listener: &Listener, name: &str) -> VirtualHost {
    virtual_hosts(listener)
        .into_iter()
        .find(|vhost| vhost.name == name)
        .unwrap_or_else(|| panic!("virtual host {} not found on {}", name, listener.name))
}

pub fn is_https_redirect(route: &Route) -> bool {
    matches!(route.action, Some(Action::Redirect(_)))
}

pub fn cluster_of(route: &Route) -> Option<String> {
    use envoy_types::pb::envoy::config::route::v3::route_action::ClusterSpecifier;
    match &route.action {
        Some(Action::Route(action)) => match &action.cluster_specifier {
            Some(ClusterSpecifier::Cluster(cluster)) => Some(cluster.clone()),
            _ => None,
        },
        _ => None,
    }
}

pub fn requires_https(route: &Route) -> bool {
    route.r#match.as_ref().is_some_and(|m| {
        m.headers.iter().any(|header| {
            header.name == "x-forwarded-proto"
                && matches!(
                    &header.header_match_specifier,
                    Some(HeaderMatchSpecifier::StringMatch(StringMatcher {
                        match_pattern: Some(MatchPattern::Exact(value)),
                        ..
                    })) if value == "https"
                )
        })
    })
}
