//! Routing rule to Envoy route conversion
//!
//! Each routing rule is rendered in up to three variants, computed lazily and cached because
//! the matcher asks for the same variant once per virtual host:
//!
//! - **insecure**: the rule as written
//! - **secure**: the rule plus an `x-forwarded-proto: https` header guard
//! - **redirect**: the rule's match with its action replaced by an HTTPS redirect

use crate::domain::{HeaderMatch, PathMatch, RouteMatchSpec, RouteTarget, RoutingRule};
use envoy_types::pb::envoy::config::route::v3::{
    header_matcher::HeaderMatchSpecifier,
    redirect_action::{PathRewriteSpecifier, RedirectResponseCode, SchemeRewriteSpecifier},
    route::Action,
    route_action::ClusterSpecifier,
    route_match::PathSpecifier,
    weighted_cluster::ClusterWeight,
    HeaderMatcher, RedirectAction, Route, RouteAction, RouteMatch, WeightedCluster,
};
use envoy_types::pb::envoy::r#type::matcher::v3::{
    string_matcher::MatchPattern, RegexMatcher, StringMatcher,
};
use envoy_types::pb::google::protobuf::{Duration, UInt32Value};
use std::cell::OnceCell;

/// Header carrying the original request scheme
pub const XFP_HEADER: &str = "x-forwarded-proto";

/// Which rendering of a rule a virtual host receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteVariant {
    Secure,
    Insecure,
    Redirect,
}

impl RouteVariant {
    /// The variant that routes instead of redirecting
    pub fn unredirected(self) -> Self {
        match self {
            RouteVariant::Redirect => RouteVariant::Insecure,
            other => other,
        }
    }
}

impl std::fmt::Display for RouteVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RouteVariant::Secure => "secure",
            RouteVariant::Insecure => "insecure",
            RouteVariant::Redirect => "redirect",
        };
        f.write_str(label)
    }
}

/// Lazily rendered variants of one routing rule
#[derive(Debug)]
pub struct RouteVariants<'a> {
    rule: &'a RoutingRule,
    insecure: OnceCell<Route>,
    secure: OnceCell<Route>,
    redirect: OnceCell<Route>,
}

impl<'a> RouteVariants<'a> {
    pub fn new(rule: &'a RoutingRule) -> Self {
        Self { rule, insecure: OnceCell::new(), secure: OnceCell::new(), redirect: OnceCell::new() }
    }

    pub fn rule(&self) -> &'a RoutingRule {
        self.rule
    }

    /// Rendered route for `variant`; each variant is a separate copy
    pub fn get(&self, variant: RouteVariant) -> &Route {
        match variant {
            RouteVariant::Insecure => self.insecure.get_or_init(|| to_envoy_route(self.rule)),
            RouteVariant::Secure => self.secure.get_or_init(|| {
                let mut route = self.get(RouteVariant::Insecure).clone();
                if !self.rule.route_match.has_header(XFP_HEADER) {
                    if let Some(route_match) = route.r#match.as_mut() {
                        route_match.headers.push(exact_header(XFP_HEADER, "https"));
                    }
                }
                route
            }),
            RouteVariant::Redirect => self.redirect.get_or_init(|| {
                let mut route = self.get(RouteVariant::Insecure).clone();
                route.action = Some(Action::Redirect(RedirectAction {
                    scheme_rewrite_specifier: Some(SchemeRewriteSpecifier::HttpsRedirect(true)),
                    ..Default::default()
                }));
                route
            }),
        }
    }
}

/// Render a routing rule as written
pub fn to_envoy_route(rule: &RoutingRule) -> Route {
    Route {
        name: rule.name.clone(),
        r#match: Some(to_envoy_route_match(&rule.route_match)),
        action: Some(to_envoy_action(&rule.target)),
        ..Default::default()
    }
}

fn to_envoy_route_match(spec: &RouteMatchSpec) -> RouteMatch {
    let path_specifier = match &spec.path {
        PathMatch::Exact(path) => PathSpecifier::Path(path.clone()),
        PathMatch::Prefix(prefix) => PathSpecifier::Prefix(prefix.clone()),
        PathMatch::Regex(regex) => {
            PathSpecifier::SafeRegex(RegexMatcher { regex: regex.clone(), ..Default::default() })
        }
    };

    RouteMatch {
        path_specifier: Some(path_specifier),
        headers: spec.headers.iter().map(to_header_matcher).collect(),
        ..Default::default()
    }
}

fn to_header_matcher(header: &HeaderMatch) -> HeaderMatcher {
    let pattern = match (&header.value, &header.regex) {
        (Some(value), _) => Some(MatchPattern::Exact(value.clone())),
        (None, Some(regex)) => {
            Some(MatchPattern::SafeRegex(RegexMatcher { regex: regex.clone(), ..Default::default() }))
        }
        (None, None) => None,
    };

    let specifier = match pattern {
        Some(pattern) => HeaderMatchSpecifier::StringMatch(StringMatcher {
            match_pattern: Some(pattern),
            ignore_case: false,
        }),
        None => HeaderMatchSpecifier::PresentMatch(header.present.unwrap_or(true)),
    };

    HeaderMatcher {
        name: header.name.clone(),
        header_match_specifier: Some(specifier),
        ..Default::default()
    }
}

fn exact_header(name: &str, value: &str) -> HeaderMatcher {
    to_header_matcher(&HeaderMatch::exact(name, value))
}

fn to_envoy_action(target: &RouteTarget) -> Action {
    match target {
        RouteTarget::Cluster { name, timeout_ms, prefix_rewrite } => {
            #[allow(deprecated)]
            let route_action = RouteAction {
                cluster_specifier: Some(ClusterSpecifier::Cluster(name.clone())),
                timeout: timeout_ms.map(millis_to_duration),
                prefix_rewrite: prefix_rewrite.clone().unwrap_or_default(),
                ..Default::default()
            };
            Action::Route(route_action)
        }
        RouteTarget::WeightedClusters { clusters } => {
            let weighted = WeightedCluster {
                clusters: clusters
                    .iter()
                    .map(|target| ClusterWeight {
                        name: target.name.clone(),
                        weight: Some(UInt32Value { value: target.weight }),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            };
            #[allow(deprecated)]
            let route_action = RouteAction {
                cluster_specifier: Some(ClusterSpecifier::WeightedClusters(weighted)),
                ..Default::default()
            };
            Action::Route(route_action)
        }
        RouteTarget::HostRedirect { host, path, response_code } => {
            Action::Redirect(RedirectAction {
                host_redirect: host.clone(),
                path_rewrite_specifier: path.clone().map(PathRewriteSpecifier::PathRedirect),
                response_code: redirect_code(*response_code) as i32,
                ..Default::default()
            })
        }
    }
}

fn redirect_code(status: Option<u32>) -> RedirectResponseCode {
    match status {
        Some(302) => RedirectResponseCode::Found,
        Some(303) => RedirectResponseCode::SeeOther,
        Some(307) => RedirectResponseCode::TemporaryRedirect,
        Some(308) => RedirectResponseCode::PermanentRedirect,
        _ => RedirectResponseCode::MovedPermanently,
    }
}

pub(crate) fn millis_to_duration(ms: u64) -> Duration {
    Duration { seconds: (ms / 1000) as i64, nanos: ((ms % 1000) * 1_000_000) as i32 }
}
