//! # Error Handling
//!
//! Fatal, structural compilation errors. Each variant carries enough context to locate the
//! offending ingress declaration. Recoverable operator mistakes are not errors; they are
//! collected as [`crate::xds::diagnostics::Diagnostics`] and compilation proceeds.

/// Custom result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the listener compiler
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A listener already exists with a different proxy-protocol setting
    #[error(
        "Listener {listener}: proxy protocol conflict (existing: {existing}, requested: {requested})"
    )]
    ProxyProtocolConflict { listener: String, existing: bool, requested: bool },

    /// A virtual host was registered twice under one key with different attributes
    #[error(
        "Listener {listener}: conflicting definition of virtual host {key} (existing: {existing}, requested: {requested})"
    )]
    VirtualHostConflict { listener: String, key: String, existing: String, requested: String },

    /// A listener was asked to host a declaration bound to another port
    #[error(
        "Listener {listener} on port {listener_port} cannot host declaration '{declaration}' for port {requested_port}"
    )]
    PortMismatch { listener: String, listener_port: u32, declaration: String, requested_port: u32 },

    /// Two filter chains on one listener would match the same connections
    #[error("Listener {listener}: filter chain match {chain_match} is declared more than once")]
    FilterChainConflict { listener: String, chain_match: String },

    /// A declaration references a TLS context the model does not define
    #[error("Unknown TLS context '{context}' referenced by {referrer}")]
    UnknownTlsContext { context: String, referrer: String },

    /// Model (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error reflects an inconsistent ingress model rather than bad input syntax
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::ProxyProtocolConflict { .. }
                | Self::VirtualHostConflict { .. }
                | Self::PortMismatch { .. }
                | Self::FilterChainConflict { .. }
        )
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
