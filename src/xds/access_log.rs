//! Access log configuration for HTTP connection managers
//!
//! Every HTTP filter chain carries the same access-log list: one gRPC logger per declared log
//! service, followed by the file logger. The file logger writes either a text line or a JSON
//! object, depending on the module's `envoy_log_type`.

use crate::config::{AccessLogType, ModuleSettings};
use crate::domain::{AdditionalLogHeader, LogService, LogServiceDriver, TracingSettings};
use crate::xds::diagnostics::Diagnostics;
use crate::xds::filters::{
    any_from_message, encode_message_field, encode_struct, proto_struct, string_struct,
};
use envoy_types::pb::envoy::config::{
    accesslog::v3::{access_log::ConfigType as AccessLogConfigType, AccessLog},
    core::v3::{
        grpc_service, substitution_format_string::Format, ApiVersion, GrpcService,
        SubstitutionFormatString,
    },
};
use envoy_types::pb::envoy::extensions::access_loggers::file::v3::{
    file_access_log::AccessLogFormat, FileAccessLog,
};
use envoy_types::pb::envoy::extensions::access_loggers::grpc::v3::{
    CommonGrpcAccessLogConfig, HttpGrpcAccessLogConfig, TcpGrpcAccessLogConfig,
};
use envoy_types::pb::google::protobuf::{Any, Struct};
use prost::Message;
use tracing::debug;

pub const FILE_ACCESS_LOG_NAME: &str = "envoy.access_loggers.file";
pub const HTTP_GRPC_ACCESS_LOG_NAME: &str = "envoy.access_loggers.http_grpc";
pub const TCP_GRPC_ACCESS_LOG_NAME: &str = "envoy.access_loggers.tcp_grpc";

const FILE_ACCESS_LOG_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.access_loggers.file.v3.FileAccessLog";
const HTTP_GRPC_ACCESS_LOG_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.access_loggers.grpc.v3.HttpGrpcAccessLogConfig";
const TCP_GRPC_ACCESS_LOG_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.access_loggers.grpc.v3.TcpGrpcAccessLogConfig";

// `FileAccessLog.log_format` and `SubstitutionFormatString.json_format`
const FILE_LOG_FORMAT_TAG: u32 = 5;
const JSON_FORMAT_TAG: u32 = 2;

/// Text access-log line used when the operator supplies none
pub const DEFAULT_TEXT_FORMAT: &str = concat!(
    "ACCESS [%START_TIME%] \"%REQ(:METHOD)% %REQ(X-ENVOY-ORIGINAL-PATH?:PATH)% %PROTOCOL%\" ",
    "%RESPONSE_CODE% %RESPONSE_FLAGS% %BYTES_RECEIVED% %BYTES_SENT% %DURATION% ",
    "%RESP(X-ENVOY-UPSTREAM-SERVICE-TIME)% \"%REQ(X-FORWARDED-FOR)%\" \"%REQ(USER-AGENT)%\" ",
    "\"%REQ(X-REQUEST-ID)%\" \"%REQ(:AUTHORITY)%\" \"%UPSTREAM_HOST%\""
);

const DEFAULT_JSON_FIELDS: &[(&str, &str)] = &[
    ("start_time", "%START_TIME%"),
    ("method", "%REQ(:METHOD)%"),
    ("path", "%REQ(X-ENVOY-ORIGINAL-PATH?:PATH)%"),
    ("protocol", "%PROTOCOL%"),
    ("response_code", "%RESPONSE_CODE%"),
    ("response_flags", "%RESPONSE_FLAGS%"),
    ("bytes_received", "%BYTES_RECEIVED%"),
    ("bytes_sent", "%BYTES_SENT%"),
    ("duration", "%DURATION%"),
    ("upstream_service_time", "%RESP(X-ENVOY-UPSTREAM-SERVICE-TIME)%"),
    ("x_forwarded_for", "%REQ(X-FORWARDED-FOR)%"),
    ("user_agent", "%REQ(USER-AGENT)%"),
    ("request_id", "%REQ(X-REQUEST-ID)%"),
    ("authority", "%REQ(:AUTHORITY)%"),
    ("upstream_host", "%UPSTREAM_HOST%"),
    ("upstream_cluster", "%UPSTREAM_CLUSTER%"),
    ("upstream_local_address", "%UPSTREAM_LOCAL_ADDRESS%"),
    ("downstream_local_address", "%DOWNSTREAM_LOCAL_ADDRESS%"),
    ("downstream_remote_address", "%DOWNSTREAM_REMOTE_ADDRESS%"),
    ("requested_server_name", "%REQUESTED_SERVER_NAME%"),
    ("istio_policy_status", "%DYNAMIC_METADATA(istio.mixer:status)%"),
    ("upstream_transport_failure_reason", "%UPSTREAM_TRANSPORT_FAILURE_REASON%"),
];

const DATADOG_JSON_FIELDS: &[(&str, &str)] =
    &[("dd.trace_id", "%REQ(X-DATADOG-TRACE-ID)%"), ("dd.span_id", "%REQ(X-DATADOG-PARENT-ID)%")];

/// Default JSON field set, extended with trace correlation ids for the datadog tracer
pub fn default_json_fields(tracing: Option<&TracingSettings>) -> Vec<(&'static str, &'static str)> {
    let mut fields = DEFAULT_JSON_FIELDS.to_vec();
    if tracing.is_some_and(TracingSettings::is_datadog) {
        fields.extend_from_slice(DATADOG_JSON_FIELDS);
    }
    fields
}

/// Build the access-log list shared by every HTTP filter chain
pub fn build_access_logs(
    services: &[LogService],
    tracing: Option<&TracingSettings>,
    settings: &ModuleSettings,
    diagnostics: &mut Diagnostics,
) -> Vec<AccessLog> {
    let mut logs: Vec<AccessLog> = services.iter().map(grpc_access_log).collect();
    logs.push(file_access_log(tracing, settings, diagnostics));
    logs
}

fn grpc_access_log(service: &LogService) -> AccessLog {
    let common_config = CommonGrpcAccessLogConfig {
        log_name: service.log_name().to_string(),
        grpc_service: Some(GrpcService {
            target_specifier: Some(grpc_service::TargetSpecifier::EnvoyGrpc(
                grpc_service::EnvoyGrpc {
                    cluster_name: service.cluster.clone(),
                    ..Default::default()
                },
            )),
            ..Default::default()
        }),
        transport_api_version: ApiVersion::V3 as i32,
        ..Default::default()
    };

    let (name, typed_config) = match service.driver {
        LogServiceDriver::Http => {
            let headers = &service.additional_headers;
            let collect = |pick: fn(&AdditionalLogHeader) -> bool| -> Vec<String> {
                headers.iter().filter(|h| pick(h)).map(|h| h.header_name.clone()).collect()
            };
            let config = HttpGrpcAccessLogConfig {
                common_config: Some(common_config),
                additional_request_headers_to_log: collect(|h| h.during_request),
                additional_response_headers_to_log: collect(|h| h.during_response),
                additional_response_trailers_to_log: collect(|h| h.during_trailer),
            };
            (HTTP_GRPC_ACCESS_LOG_NAME, any_from_message(HTTP_GRPC_ACCESS_LOG_TYPE_URL, &config))
        }
        // TCP loggers carry no additional headers
        LogServiceDriver::Tcp => {
            let config = TcpGrpcAccessLogConfig { common_config: Some(common_config) };
            (TCP_GRPC_ACCESS_LOG_NAME, any_from_message(TCP_GRPC_ACCESS_LOG_TYPE_URL, &config))
        }
    };

    AccessLog {
        name: name.to_string(),
        filter: None,
        config_type: Some(AccessLogConfigType::TypedConfig(typed_config)),
    }
}

fn file_access_log(
    tracing: Option<&TracingSettings>,
    settings: &ModuleSettings,
    diagnostics: &mut Diagnostics,
) -> AccessLog {
    let typed_config = match settings.envoy_log_type {
        AccessLogType::Json => {
            json_file_log(&settings.envoy_log_path, &json_format(tracing, settings, diagnostics))
        }
        AccessLogType::Text => {
            let file_log = FileAccessLog {
                path: settings.envoy_log_path.clone(),
                access_log_format: Some(AccessLogFormat::LogFormat(SubstitutionFormatString {
                    format: Some(Format::TextFormat(text_format(settings, diagnostics))),
                    ..Default::default()
                })),
            };
            any_from_message(FILE_ACCESS_LOG_TYPE_URL, &file_log)
        }
    };

    AccessLog {
        name: FILE_ACCESS_LOG_NAME.to_string(),
        filter: None,
        config_type: Some(AccessLogConfigType::TypedConfig(typed_config)),
    }
}

/// File logger with a JSON format; the format's keys are written in order
fn json_file_log(path: &str, fields: &Struct) -> Any {
    let mut log_format = Vec::new();
    encode_message_field(JSON_FORMAT_TAG, &encode_struct(fields), &mut log_format);

    let mut value = FileAccessLog { path: path.to_string(), access_log_format: None }.encode_to_vec();
    encode_message_field(FILE_LOG_FORMAT_TAG, &log_format, &mut value);
    Any { type_url: FILE_ACCESS_LOG_TYPE_URL.to_string(), value }
}

fn json_format(
    tracing: Option<&TracingSettings>,
    settings: &ModuleSettings,
    diagnostics: &mut Diagnostics,
) -> Struct {
    match &settings.envoy_log_format {
        Some(serde_json::Value::Object(fields)) => proto_struct(fields),
        Some(other) => {
            diagnostics.report(
                "envoy_log_format",
                format!("JSON access logs need an object format, got {}; using the default", other),
            );
            string_struct(default_json_fields(tracing))
        }
        None => string_struct(default_json_fields(tracing)),
    }
}

fn text_format(settings: &ModuleSettings, diagnostics: &mut Diagnostics) -> String {
    let line = match &settings.envoy_log_format {
        Some(serde_json::Value::String(line)) if !line.is_empty() => line.clone(),
        Some(serde_json::Value::String(_)) | None => DEFAULT_TEXT_FORMAT.to_string(),
        Some(other) => {
            diagnostics.report(
                "envoy_log_format",
                format!("text access logs need a string format, got {}; using the default", other),
            );
            DEFAULT_TEXT_FORMAT.to_string()
        }
    };
    debug!(format = %line, "using text access-log format");
    line + "\n"
}
