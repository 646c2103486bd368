//! Routing rule domain types
//!
//! Routing rules are immutable inputs. The matcher derives per-virtual-host copies from them
//! and never writes back.

use serde::{Deserialize, Serialize};

/// Precedence reserved for the operator-installed default mapping
pub const FALLBACK_PRECEDENCE: i32 = -1_000_000;

/// Path prefix of ACME HTTP-01 challenges
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Regex used by the fallback mapping to match only `/`
pub const ROOT_REGEX: &str = "^/$";

/// Path matching strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

/// Request header predicate.
///
/// Exactly one of `value`, `regex` or `present` is expected; `value` wins if several are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMatch {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub present: Option<bool>,
}

impl HeaderMatch {
    /// Exact value match
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: Some(value.into()), regex: None, present: None }
    }
}

/// Request predicate of a routing rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatchSpec {
    /// Written as a single-key map, e.g. `path: { prefix: / }`
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub path: PathMatch,
    #[serde(default)]
    pub headers: Vec<HeaderMatch>,
}

impl RouteMatchSpec {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self { path: PathMatch::Prefix(prefix.into()), headers: Vec::new() }
    }

    /// Whether a matcher for `name` is already present (header names are case-insensitive)
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }
}

/// Weighted upstream reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTarget {
    pub name: String,
    pub weight: u32,
}

/// What a matched request is sent to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Cluster {
        name: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        prefix_rewrite: Option<String>,
    },
    WeightedClusters {
        clusters: Vec<WeightedTarget>,
    },
    /// Redirect to another host (distinct from the HTTPS upgrade redirect)
    HostRedirect {
        host: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        response_code: Option<u32>,
    },
}

/// A routing rule (mapping)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    #[serde(rename = "match")]
    pub route_match: RouteMatchSpec,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub target: RouteTarget,
    /// Host globs this rule is limited to; empty means any host
    #[serde(default)]
    pub host_constraints: Vec<String>,
    #[serde(default)]
    pub precedence: i32,
}

impl RoutingRule {
    /// Rule sending `prefix` to `cluster` on any host
    pub fn to_cluster(
        name: impl Into<String>,
        prefix: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            route_match: RouteMatchSpec::prefix(prefix),
            target: RouteTarget::Cluster { name: cluster.into(), timeout_ms: None, prefix_rewrite: None },
            host_constraints: Vec::new(),
            precedence: 0,
        }
    }

    /// Host constraint set, `["*"]` when unconstrained
    pub fn route_hosts(&self) -> Vec<&str> {
        if self.host_constraints.is_empty() {
            vec!["*"]
        } else {
            self.host_constraints.iter().map(String::as_str).collect()
        }
    }

    /// Unconstrained, or explicitly constrained to `*`
    pub fn allows_any_host(&self) -> bool {
        self.route_hosts().contains(&"*")
    }

    /// Matches the literal ACME challenge prefix
    pub fn is_acme_challenge(&self) -> bool {
        matches!(&self.route_match.path, PathMatch::Prefix(prefix) if prefix == ACME_CHALLENGE_PREFIX)
    }

    /// The operator-installed default mapping: sentinel precedence and a root-only regex
    pub fn is_fallback(&self) -> bool {
        self.precedence == FALLBACK_PRECEDENCE
            && matches!(&self.route_match.path, PathMatch::Regex(regex) if regex == ROOT_REGEX)
    }
}
