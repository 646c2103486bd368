//! # Ingress Compiler
//!
//! Compiles declarative ingress intent (listeners, hosts, TLS contexts, routing rules and TCP
//! mapping groups) into the Envoy listener configuration served to a fleet of proxies.
//!
//! ## Architecture
//!
//! ```text
//! IngressModel → ListenerRegistry → host admission → route matching → Envoy Listeners
//!      ↓                                                                    ↓
//! ModuleSettings (sanitized)                                   Diagnostics + xDS resources
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ingress_compiler::{compile, Config, DefaultHttpFilterAdapter, IngressModel, Result};
//!
//! fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let model = IngressModel::from_file("ingress.yaml")?;
//!     let compiled = compile(&model, &config, &DefaultHttpFilterAdapter)?;
//!     println!("{} listeners", compiled.listeners.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod xds;

// Re-export commonly used types and traits
pub use config::{Config, ModuleSettings};
pub use domain::IngressModel;
pub use errors::{Error, Result};
pub use xds::filters::http::{DefaultHttpFilterAdapter, HttpFilterAdapter};
pub use xds::{compile, CompiledListeners, Diagnostics};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
