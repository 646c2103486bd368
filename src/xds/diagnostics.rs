//! Recoverable configuration problems.
//!
//! Operator mistakes that have a safe default (a malformed header-case list, an out of range
//! module setting, a TCP group with nowhere to go) are collected here instead of aborting the
//! compilation. Every entry is also emitted as a `warn` event at the moment it is reported.

use serde::Serialize;
use tracing::warn;

/// A single rejected setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Name of the setting or declaration that was rejected
    pub setting: String,
    pub message: String,
}

/// Ordered collection of diagnostics produced by one compilation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic for `setting`.
    pub fn report(&mut self, setting: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic { setting: setting.into(), message: message.into() };
        warn!(setting = %diagnostic.setting, "{}", diagnostic.message);
        self.entries.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Whether any diagnostic names `setting`
    pub fn mentions(&self, setting: &str) -> bool {
        self.entries.iter().any(|d| d.setting == setting)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
