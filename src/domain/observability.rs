//! Tracing and access-log service declarations

use crate::xds::diagnostics::Diagnostics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Tracer driver that correlates access logs through its own request headers
pub const DATADOG_DRIVER: &str = "envoy.tracers.datadog";

/// Tracing declaration. The driver itself is configured in the proxy bootstrap; listeners only
/// carry request-id generation, custom tags and sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracingSettings {
    pub driver: String,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    /// Request headers recorded as span tags
    #[serde(default)]
    pub tag_headers: Vec<String>,
    #[serde(default)]
    pub sampling: SamplingSettings,
}

/// Sampling percentages, each in `0..=100`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SamplingSettings {
    #[validate(range(min = 0.0, max = 100.0))]
    pub client: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub random: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub overall: Option<f64>,
}

impl TracingSettings {
    pub fn is_datadog(&self) -> bool {
        self.driver == DATADOG_DRIVER
    }

    /// Drop out of range sampling rates, reporting each one.
    pub fn sanitize(&mut self, diagnostics: &mut Diagnostics) {
        let Err(errors) = self.sampling.validate() else {
            return;
        };

        let mut fields: Vec<String> =
            errors.field_errors().into_keys().map(|field| field.to_string()).collect();
        fields.sort();

        for field in fields {
            let rejected = match field.as_str() {
                "client" => self.sampling.client.take(),
                "random" => self.sampling.random.take(),
                "overall" => self.sampling.overall.take(),
                _ => None,
            };
            diagnostics.report(
                format!("tracing.sampling.{}", field),
                format!("sampling rate {:?} is outside 0..=100; ignoring it", rejected),
            );
        }
    }
}

/// Transport of a remote access-log service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogServiceDriver {
    Http,
    Tcp,
}

/// Header captured by an HTTP log service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalLogHeader {
    pub header_name: String,
    #[serde(default = "enabled")]
    pub during_request: bool,
    #[serde(default = "enabled")]
    pub during_response: bool,
    #[serde(default = "enabled")]
    pub during_trailer: bool,
}

fn enabled() -> bool {
    true
}

/// Remote gRPC access-log service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogService {
    pub name: String,
    pub driver: LogServiceDriver,
    /// Cluster hosting the log collector
    pub cluster: String,
    #[serde(default)]
    pub log_name: Option<String>,
    #[serde(default)]
    pub additional_headers: Vec<AdditionalLogHeader>,
}

impl LogService {
    pub fn log_name(&self) -> &str {
        self.log_name.as_deref().unwrap_or(&self.name)
    }
}
