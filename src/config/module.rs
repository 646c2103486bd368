//! # Module Settings
//!
//! Typed replacement for the module-level settings dictionary. Every optional HTTP knob is an
//! explicit `Option` field so that the set of settings is exhaustively enumerable and the
//! order in which they are applied is fixed by the assembler, not by dictionary iteration.

use crate::xds::diagnostics::Diagnostics;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default file access-log sink
pub const DEFAULT_LOG_PATH: &str = "/dev/fd/1";

/// Module-level settings consumed by the listener compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ModuleSettings {
    /// Edge/managed mode: enables the forced ACME listener and the fallback-mapping override
    pub edge_mode: bool,
    /// Running as a secondary intercept agent (suppresses the forced ACME listener)
    pub intercept_agent: bool,

    pub use_remote_address: Option<bool>,
    pub xff_num_trusted_hops: Option<u32>,
    #[validate(length(min = 1, message = "server_name cannot be empty"))]
    pub server_name: Option<String>,
    /// Zero is treated as unset
    pub listener_idle_timeout_ms: Option<u64>,
    pub headers_with_underscores_action: Option<HeadersWithUnderscoresAction>,
    /// Zero is treated as unset
    #[validate(range(max = 8192, message = "max_request_headers_kb must be at most 8192"))]
    pub max_request_headers_kb: Option<u32>,
    pub enable_http10: Option<bool>,
    pub preserve_external_request_id: Option<bool>,
    pub forward_client_cert_details: Option<ForwardClientCertDetails>,
    pub set_current_client_cert_details: Option<ClientCertDetails>,

    /// Capitalize every word of HTTP/1 header names
    pub proper_case: bool,
    /// Raw operator list of header names whose casing must be preserved. Kept untyped so that
    /// malformed values can be reported instead of failing deserialization.
    pub header_case_overrides: Option<serde_json::Value>,

    pub strip_matching_host_port: bool,
    pub merge_slashes: bool,
    pub reject_requests_with_escaped_slashes: bool,

    pub envoy_log_type: AccessLogType,
    /// Operator override of the access-log template: a string in text mode, an object in JSON mode
    pub envoy_log_format: Option<serde_json::Value>,
    #[validate(length(min = 1, message = "envoy_log_path cannot be empty"))]
    pub envoy_log_path: String,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            edge_mode: false,
            intercept_agent: false,
            use_remote_address: None,
            xff_num_trusted_hops: None,
            server_name: None,
            listener_idle_timeout_ms: None,
            headers_with_underscores_action: None,
            max_request_headers_kb: None,
            enable_http10: None,
            preserve_external_request_id: None,
            forward_client_cert_details: None,
            set_current_client_cert_details: None,
            proper_case: false,
            header_case_overrides: None,
            strip_matching_host_port: false,
            merge_slashes: false,
            reject_requests_with_escaped_slashes: false,
            envoy_log_type: AccessLogType::Text,
            envoy_log_format: None,
            envoy_log_path: DEFAULT_LOG_PATH.to_string(),
        }
    }
}

impl ModuleSettings {
    /// Report every out-of-range setting and reset it to its default.
    ///
    /// Runs before assembly so that the assembler only ever sees acceptable values.
    pub fn sanitize(&mut self, diagnostics: &mut Diagnostics) {
        let Err(errors) = self.validate() else {
            return;
        };

        let mut fields: Vec<String> =
            errors.field_errors().into_keys().map(|field| field.to_string()).collect();
        fields.sort();

        for field in fields {
            let rejected = self.reset_field(&field);
            diagnostics.report(
                field.as_str(),
                format!("rejected value {} for module setting '{}'; using default", rejected, field),
            );
        }
    }

    fn reset_field(&mut self, field: &str) -> String {
        match field {
            "server_name" => format!("{:?}", self.server_name.take()),
            "max_request_headers_kb" => format!("{:?}", self.max_request_headers_kb.take()),
            "envoy_log_path" => {
                format!("{:?}", std::mem::replace(&mut self.envoy_log_path, DEFAULT_LOG_PATH.into()))
            }
            _ => String::from("<unknown>"),
        }
    }

    /// Idle timeout, if set to a non-zero value
    pub fn idle_timeout_ms(&self) -> Option<u64> {
        self.listener_idle_timeout_ms.filter(|ms| *ms > 0)
    }

    /// Request header limit, if set to a non-zero value
    pub fn request_headers_kb(&self) -> Option<u32> {
        self.max_request_headers_kb.filter(|kb| *kb > 0)
    }
}

/// Access-log rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLogType {
    #[default]
    Text,
    Json,
}

/// Handling of request headers whose names contain underscores.
///
/// Discriminants match `envoy.config.core.v3.HttpProtocolOptions.HeadersWithUnderscoresAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeadersWithUnderscoresAction {
    Allow = 0,
    RejectRequest = 1,
    DropHeader = 2,
}

/// Handling of the `x-forwarded-client-cert` header.
///
/// Discriminants match `HttpConnectionManager.ForwardClientCertDetails`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForwardClientCertDetails {
    Sanitize = 0,
    ForwardOnly = 1,
    AppendForward = 2,
    SanitizeSet = 3,
    AlwaysForwardOnly = 4,
}

/// Client certificate fields to include in `x-forwarded-client-cert`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCertDetails {
    pub subject: bool,
    pub cert: bool,
    pub chain: bool,
    pub dns: bool,
    pub uri: bool,
}
