//! Shared HTTP connection manager configuration
//!
//! The base configuration is assembled once per compilation and stamped onto every HTTP filter
//! chain; only the inline route configuration and the path-normalization flags are applied per
//! virtual host. Each optional knob is gated by the presence of its module setting and applied
//! in a fixed order.

use crate::config::ModuleSettings;
use crate::domain::{LogService, TracingSettings};
use crate::xds::access_log::build_access_logs;
use crate::xds::diagnostics::Diagnostics;
use crate::xds::filters::http::{build_http_filters, HttpFilterAdapter, HttpFilterEntry};
use crate::xds::filters::{any_from_message, string_struct, struct_any};
use crate::xds::route::millis_to_duration;
use crate::Result;
use envoy_types::pb::envoy::config::core::v3::{
    http1_protocol_options::{
        header_key_format::{HeaderFormat, ProperCaseWords},
        HeaderKeyFormat,
    },
    Http1ProtocolOptions, HttpProtocolOptions, TypedExtensionConfig,
};
use envoy_types::pb::envoy::config::listener::v3::{filter::ConfigType as FilterConfigType, Filter};
use envoy_types::pb::envoy::config::route::v3::{
    Route, RouteConfiguration, VirtualHost as EnvoyVirtualHost,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{
        CodecType, PathWithEscapedSlashesAction, RouteSpecifier, SetCurrentClientCertDetails,
        Tracing,
    },
    HttpConnectionManager,
};
use envoy_types::pb::envoy::r#type::tracing::v3::{custom_tag, CustomTag};
use envoy_types::pb::envoy::r#type::v3::Percent;
use envoy_types::pb::google::protobuf::{value::Kind, BoolValue, Struct, UInt32Value, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub const HTTP_CONNECTION_MANAGER_NAME: &str = "envoy.filters.network.http_connection_manager";
pub const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
const STAT_PREFIX: &str = "ingress_http";
const CUSTOM_HEADER_FORMATTER: &str = "custom";

/// How HTTP/1 header names are cased on the way out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderCasePolicy {
    /// Capitalize every word
    ProperCase,
    /// Lowercase name to operator-supplied casing
    Overrides(BTreeMap<String, String>),
}

impl HeaderCasePolicy {
    fn to_key_format(&self) -> HeaderKeyFormat {
        let header_format = match self {
            HeaderCasePolicy::ProperCase => HeaderFormat::ProperCaseWords(ProperCaseWords {}),
            HeaderCasePolicy::Overrides(rules) => {
                let rules = string_struct(rules.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                let config = Struct {
                    fields: [("rules".to_string(), Value { kind: Some(Kind::StructValue(rules)) })]
                        .into_iter()
                        .collect(),
                };
                HeaderFormat::StatefulFormatter(TypedExtensionConfig {
                    name: CUSTOM_HEADER_FORMATTER.to_string(),
                    typed_config: Some(struct_any(&config)),
                })
            }
        };
        HeaderKeyFormat { header_format: Some(header_format) }
    }
}

/// Resolve the header-case policy, reporting malformed override lists.
///
/// `proper_case` wins over an override list. An explicitly empty list is reported and
/// otherwise treated as unset.
pub fn header_case_policy(
    settings: &ModuleSettings,
    diagnostics: &mut Diagnostics,
) -> Option<HeaderCasePolicy> {
    if matches!(&settings.header_case_overrides, Some(JsonValue::Array(entries)) if entries.is_empty()) {
        diagnostics.report(
            "header_case_overrides",
            "Module config 'header_case_overrides' is an empty list; no header case overrides applied",
        );
    }

    let raw = settings.header_case_overrides.as_ref().filter(|raw| is_set(raw));

    if let Some(raw) = raw {
        if settings.proper_case {
            diagnostics.report(
                "header_case_overrides",
                "Only one of 'proper_case' or 'header_case_overrides' fields may be set on the \
                 module. Honoring proper_case and ignoring header_case_overrides.",
            );
        } else if let JsonValue::Array(entries) = raw {
            let mut rules = BTreeMap::new();
            for entry in entries {
                match entry {
                    JsonValue::String(header) => {
                        rules.insert(header.to_ascii_lowercase(), header.clone());
                    }
                    other => diagnostics.report(
                        "header_case_overrides",
                        format!("Skipping non-string header in 'header_case_overrides': {}", other),
                    ),
                }
            }

            if rules.is_empty() {
                diagnostics.report(
                    "header_case_overrides",
                    format!(
                        "Could not parse any valid string headers in 'header_case_overrides': {}",
                        raw
                    ),
                );
            } else {
                return Some(HeaderCasePolicy::Overrides(rules));
            }
        } else {
            diagnostics.report(
                "header_case_overrides",
                format!("Module config 'header_case_overrides' must be an array, got {}", raw),
            );
        }
    }

    settings.proper_case.then_some(HeaderCasePolicy::ProperCase)
}

// Empty values (null, [], "", false, 0, {}) are treated as unset
fn is_set(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}

/// Per-virtual-host path handling flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PathHandling {
    strip_matching_host_port: bool,
    merge_slashes: bool,
    reject_escaped_slashes: bool,
}

/// Base connection manager shared by every HTTP filter chain of a compilation
#[derive(Debug, Clone)]
pub struct BaseHttpConfig {
    template: HttpConnectionManager,
    path: PathHandling,
    outbound: bool,
}

impl BaseHttpConfig {
    pub fn build(
        settings: &ModuleSettings,
        tracing: Option<&TracingSettings>,
        log_services: &[LogService],
        http_filters: &[HttpFilterEntry],
        adapter: &dyn HttpFilterAdapter,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let mut hcm = HttpConnectionManager {
            stat_prefix: STAT_PREFIX.to_string(),
            codec_type: CodecType::Auto as i32,
            access_log: build_access_logs(log_services, tracing, settings, diagnostics),
            http_filters: build_http_filters(adapter, http_filters)?,
            normalize_path: Some(BoolValue { value: true }),
            ..Default::default()
        };

        if let Some(value) = settings.use_remote_address {
            hcm.use_remote_address = Some(BoolValue { value });
        }
        if let Some(hops) = settings.xff_num_trusted_hops {
            hcm.xff_num_trusted_hops = hops;
        }
        if let Some(server_name) = &settings.server_name {
            hcm.server_name = server_name.clone();
        }

        let idle_timeout = settings.idle_timeout_ms().map(millis_to_duration);
        if idle_timeout.is_some() || settings.headers_with_underscores_action.is_some() {
            hcm.common_http_protocol_options = Some(HttpProtocolOptions {
                idle_timeout,
                headers_with_underscores_action: settings
                    .headers_with_underscores_action
                    .map(|action| action as i32)
                    .unwrap_or_default(),
                ..Default::default()
            });
        }

        if let Some(kb) = settings.request_headers_kb() {
            hcm.max_request_headers_kb = Some(UInt32Value { value: kb });
        }

        let header_case = header_case_policy(settings, diagnostics);
        if settings.enable_http10.is_some() || header_case.is_some() {
            hcm.http_protocol_options = Some(Http1ProtocolOptions {
                accept_http_10: settings.enable_http10.unwrap_or(false),
                header_key_format: header_case.as_ref().map(HeaderCasePolicy::to_key_format),
                ..Default::default()
            });
        }

        if let Some(preserve) = settings.preserve_external_request_id {
            hcm.preserve_external_request_id = preserve;
        }
        if let Some(details) = settings.forward_client_cert_details {
            hcm.forward_client_cert_details = details as i32;
        }
        if let Some(details) = settings.set_current_client_cert_details {
            hcm.set_current_client_cert_details = Some(SetCurrentClientCertDetails {
                subject: Some(BoolValue { value: details.subject }),
                cert: details.cert,
                chain: details.chain,
                dns: details.dns,
                uri: details.uri,
                ..Default::default()
            });
        }

        if let Some(tracing) = tracing {
            hcm.generate_request_id = Some(BoolValue { value: true });
            hcm.tracing = Some(tracing_block(tracing));
        }

        Ok(Self {
            template: hcm,
            path: PathHandling {
                strip_matching_host_port: settings.strip_matching_host_port,
                merge_slashes: settings.merge_slashes,
                reject_escaped_slashes: settings.reject_requests_with_escaped_slashes,
            },
            outbound: tracing.is_some(),
        })
    }

    /// Listeners carrying this config are marked OUTBOUND when tracing is configured
    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn template(&self) -> &HttpConnectionManager {
        &self.template
    }

    /// Connection manager for one virtual host
    pub fn connection_manager_for(
        &self,
        vhost_name: String,
        domains: Vec<String>,
        routes: Vec<Route>,
    ) -> HttpConnectionManager {
        let mut hcm = self.template.clone();
        hcm.route_specifier = Some(RouteSpecifier::RouteConfig(RouteConfiguration {
            virtual_hosts: vec![EnvoyVirtualHost {
                name: vhost_name,
                domains,
                routes,
                ..Default::default()
            }],
            ..Default::default()
        }));

        if self.path.strip_matching_host_port {
            hcm.strip_matching_host_port = true;
        }
        if self.path.merge_slashes {
            hcm.merge_slashes = true;
        }
        if self.path.reject_escaped_slashes {
            hcm.path_with_escaped_slashes_action = PathWithEscapedSlashesAction::RejectRequest as i32;
        }
        hcm
    }
}

fn tracing_block(tracing: &TracingSettings) -> Tracing {
    let percent = |value: Option<f64>| value.map(|value| Percent { value });

    Tracing {
        custom_tags: tracing
            .tag_headers
            .iter()
            .map(|header| CustomTag {
                tag: header.clone(),
                r#type: Some(custom_tag::Type::RequestHeader(custom_tag::Header {
                    name: header.clone(),
                    ..Default::default()
                })),
            })
            .collect(),
        client_sampling: percent(tracing.sampling.client),
        random_sampling: percent(tracing.sampling.random),
        overall_sampling: percent(tracing.sampling.overall),
        ..Default::default()
    }
}

/// Wrap a connection manager as a network filter
pub fn to_network_filter(hcm: &HttpConnectionManager) -> Filter {
    Filter {
        name: HTTP_CONNECTION_MANAGER_NAME.to_string(),
        config_type: Some(FilterConfigType::TypedConfig(any_from_message(
            HTTP_CONNECTION_MANAGER_TYPE_URL,
            hcm,
        ))),
    }
}
