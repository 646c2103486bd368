//! TLS context to downstream transport socket conversion

use crate::domain::TlsContext;
use crate::xds::filters::any_from_message;
use crate::{Error, Result};
use envoy_types::pb::envoy::config::core::v3::{
    config_source::ConfigSourceSpecifier, data_source::Specifier,
    transport_socket::ConfigType as TransportSocketConfigType, AggregatedConfigSource, ApiVersion,
    ConfigSource, DataSource, TransportSocket,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    common_tls_context::ValidationContextType, CertificateValidationContext, CommonTlsContext,
    DownstreamTlsContext, SdsSecretConfig, TlsCertificate, TlsParameters,
};
use envoy_types::pb::google::protobuf::BoolValue;

pub const TLS_TRANSPORT_SOCKET_NAME: &str = "envoy.transport_sockets.tls";
pub const DOWNSTREAM_TLS_CONTEXT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext";

/// Build the downstream TLS transport socket for `ctx`.
///
/// Fails only when the context names no certificate at all.
pub fn to_transport_socket(ctx: &TlsContext) -> Result<TransportSocket> {
    let downstream = downstream_tls_context(ctx)?;

    Ok(TransportSocket {
        name: TLS_TRANSPORT_SOCKET_NAME.to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(any_from_message(
            DOWNSTREAM_TLS_CONTEXT_TYPE_URL,
            &downstream,
        ))),
    })
}

/// Build the `DownstreamTlsContext` message for `ctx`
pub fn downstream_tls_context(ctx: &TlsContext) -> Result<DownstreamTlsContext> {
    let mut common = CommonTlsContext {
        alpn_protocols: ctx.alpn_protocols.clone(),
        ..Default::default()
    };

    match (&ctx.secret, &ctx.cert_chain_file, &ctx.private_key_file) {
        (Some(secret), _, _) => {
            common.tls_certificate_sds_secret_configs = vec![sds_secret(secret)];
        }
        (None, Some(cert_chain), Some(private_key)) => {
            common.tls_certificates = vec![TlsCertificate {
                certificate_chain: Some(data_source_from_path(cert_chain)),
                private_key: Some(data_source_from_path(private_key)),
                ..Default::default()
            }];
        }
        _ => {
            return Err(Error::config(format!(
                "TLS context '{}' needs either a secret or both cert_chain_file and private_key_file",
                ctx.name
            )))
        }
    }

    common.validation_context_type = match (&ctx.ca_secret, &ctx.ca_cert_file) {
        (Some(ca_secret), _) => {
            Some(ValidationContextType::ValidationContextSdsSecretConfig(sds_secret(ca_secret)))
        }
        (None, Some(ca_file)) => {
            Some(ValidationContextType::ValidationContext(CertificateValidationContext {
                trusted_ca: Some(data_source_from_path(ca_file)),
                ..Default::default()
            }))
        }
        (None, None) => None,
    };

    if ctx.has_tls_parameters() {
        common.tls_params = Some(TlsParameters {
            tls_minimum_protocol_version: ctx.min_tls_version.map(|v| v.wire_value()).unwrap_or(0),
            tls_maximum_protocol_version: ctx.max_tls_version.map(|v| v.wire_value()).unwrap_or(0),
            cipher_suites: ctx.cipher_suites.clone(),
            ecdh_curves: ctx.ecdh_curves.clone(),
            ..Default::default()
        });
    }

    Ok(DownstreamTlsContext {
        common_tls_context: Some(common),
        require_client_certificate: ctx.cert_required.map(|value| BoolValue { value }),
        ..Default::default()
    })
}

fn sds_secret(name: &str) -> SdsSecretConfig {
    SdsSecretConfig {
        name: name.to_string(),
        sds_config: Some(ConfigSource {
            config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource::default())),
            resource_api_version: ApiVersion::V3 as i32,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn data_source_from_path(path: &str) -> DataSource {
    DataSource { specifier: Some(Specifier::Filename(path.to_string())), ..Default::default() }
}
