//! HTTP filter chain construction
//!
//! The connection manager's filter list is assembled from the model's filter entries, one at
//! a time, through an [`HttpFilterAdapter`]. An adapter may decline an entry, in which case
//! nothing is contributed for it. The router filter always ends the chain.

use crate::xds::filters::{any_from_message, invalid_config, TypedConfig};
use crate::Result;
use envoy_types::pb::envoy::extensions::filters::http::buffer::v3::Buffer as BufferProto;
use envoy_types::pb::envoy::extensions::filters::http::cors::v3::Cors as CorsProto;
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router as RouterProto;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::http_filter::ConfigType as HttpFilterConfigType;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::HttpFilter;
use envoy_types::pb::google::protobuf::{Any as EnvoyAny, UInt32Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Envoy's canonical router filter name
pub const ROUTER_FILTER_NAME: &str = "envoy.filters.http.router";
const ROUTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
const CORS_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.cors.v3.Cors";
const BUFFER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.buffer.v3.Buffer";

/// HTTP filter entry of the ingress model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpFilterEntry {
    /// Override for the filter name used in Envoy configuration
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_optional: bool,
    /// Disabled entries are left out of the chain entirely
    #[serde(default)]
    pub disabled: bool,
    pub filter: HttpFilterKind,
}

/// Supported HTTP filter types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpFilterKind {
    Router,
    /// CORS filter; policies are attached per route
    Cors,
    Buffer(BufferConfig),
    /// Arbitrary filter expressed as a typed config payload
    Custom {
        #[serde(flatten)]
        config: TypedConfig,
    },
}

/// Request buffering limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub max_request_bytes: u32,
}

impl HttpFilterKind {
    fn is_router(&self) -> bool {
        matches!(self, Self::Router)
    }

    fn default_name(&self) -> &'static str {
        match self {
            Self::Router => ROUTER_FILTER_NAME,
            Self::Cors => "envoy.filters.http.cors",
            Self::Buffer(_) => "envoy.filters.http.buffer",
            Self::Custom { .. } => "custom.http.filter",
        }
    }

    fn to_any(&self) -> Result<EnvoyAny> {
        match self {
            Self::Router => Ok(any_from_message(ROUTER_TYPE_URL, &RouterProto::default())),
            Self::Cors => Ok(any_from_message(CORS_TYPE_URL, &CorsProto::default())),
            Self::Buffer(cfg) => {
                if cfg.max_request_bytes == 0 {
                    return Err(invalid_config("Buffer max_request_bytes must be greater than 0"));
                }
                let proto = BufferProto {
                    max_request_bytes: Some(UInt32Value { value: cfg.max_request_bytes }),
                    ..Default::default()
                };
                Ok(any_from_message(BUFFER_TYPE_URL, &proto))
            }
            Self::Custom { config } => {
                if config.type_url.trim().is_empty() {
                    return Err(invalid_config("Custom HTTP filter requires a type_url"));
                }
                Ok(config.to_any())
            }
        }
    }
}

impl HttpFilterEntry {
    pub fn new(filter: HttpFilterKind) -> Self {
        Self { name: None, is_optional: false, disabled: false, filter }
    }

    /// Name used in Envoy configuration
    pub fn filter_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.filter.default_name().to_string())
    }
}

/// Per-filter adapter: produces the wire block for one entry, or `None` to omit it
pub trait HttpFilterAdapter {
    fn adapt(&self, entry: &HttpFilterEntry) -> Result<Option<HttpFilter>>;
}

/// Adapter for the filter kinds known to this crate
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHttpFilterAdapter;

impl HttpFilterAdapter for DefaultHttpFilterAdapter {
    fn adapt(&self, entry: &HttpFilterEntry) -> Result<Option<HttpFilter>> {
        if entry.disabled {
            return Ok(None);
        }

        Ok(Some(HttpFilter {
            name: entry.filter_name(),
            is_optional: entry.is_optional,
            disabled: false,
            config_type: Some(HttpFilterConfigType::TypedConfig(entry.filter.to_any()?)),
        }))
    }
}

/// Build the connection manager's filter list, keeping the router last
pub fn build_http_filters(
    adapter: &dyn HttpFilterAdapter,
    entries: &[HttpFilterEntry],
) -> Result<Vec<HttpFilter>> {
    let mut filters = Vec::with_capacity(entries.len().max(1));
    let mut router_filter: Option<HttpFilter> = None;

    for entry in entries {
        let Some(filter) = adapter.adapt(entry)? else {
            debug!(filter = %entry.filter_name(), "HTTP filter omitted by adapter");
            continue;
        };

        if entry.filter.is_router() || filter.name == ROUTER_FILTER_NAME {
            if router_filter.is_some() {
                return Err(invalid_config("Multiple router filters specified"));
            }
            router_filter = Some(filter);
        } else {
            filters.push(filter);
        }
    }

    filters.push(router_filter.unwrap_or_else(default_router_filter));

    Ok(filters)
}

fn default_router_filter() -> HttpFilter {
    HttpFilter {
        name: ROUTER_FILTER_NAME.to_string(),
        is_optional: false,
        disabled: false,
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
            ROUTER_TYPE_URL,
            &RouterProto::default(),
        ))),
    }
}
