//! # Envoy Listener Compilation
//!
//! Turns the ingress model into Envoy wire objects.
//!
//! ## Module Organization
//!
//! - `listener`: listener registry, host admission and listener emission
//! - `virtual_host`: virtual host identity, catch-all handling and chain matches
//! - `route`: secure, insecure and redirect variants of a routing rule
//! - `matcher`: assignment of routing rules to virtual hosts
//! - `http_config` / `access_log`: shared HTTP connection-manager settings
//! - `tcp`: TCP proxy filter chains
//! - `tls`: downstream TLS transport sockets
//! - `hostglob`: host glob matching
//! - `diagnostics`: recoverable configuration problems
//! - `compiler`: the end-to-end pipeline

pub mod access_log;
pub mod compiler;
pub mod diagnostics;
pub mod filters;
pub mod hostglob;
pub mod http_config;
pub mod listener;
pub mod matcher;
pub mod route;
pub mod tcp;
pub mod tls;
pub mod virtual_host;

pub use compiler::{compile, CompileSummary, CompiledListeners, LISTENER_TYPE_URL};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use listener::{Listener, ListenerKey, ListenerRegistry};
pub use virtual_host::{VirtualHost, VirtualHostKey};
