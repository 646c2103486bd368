//! Route-to-virtual-host matching
//!
//! Every routing rule is offered to every virtual host of every listener. For each host the
//! listener's security model and the host's actions produce up to two candidates (a secure one
//! and an insecure one); each candidate's action is then resolved through a fixed list of
//! overrides:
//!
//! 1. ACME challenge paths are always routed, un-redirected
//! 2. rules constrained to other hostnames are rejected
//! 3. in edge mode, the fallback mapping is always routed, un-redirected
//!
//! Rejected candidates contribute nothing. Everything else is appended to the host's route
//! list in rule order, since the proxy evaluates routes top to bottom.

use crate::domain::{HostAction, SecurityModel};
use crate::xds::hostglob;
use crate::xds::listener::ListenerRegistry;
use crate::xds::route::{RouteVariant, RouteVariants};
use crate::xds::virtual_host::{VirtualHost, CATCH_ALL};
use tracing::debug;

/// A (variant, action) pair proposed for one virtual host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub variant: RouteVariant,
    pub action: HostAction,
}

/// Why an action was forced, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Override {
    AcmeChallenge,
    HostMismatch,
    FallbackMapping,
}

/// Candidates a virtual host offers under `model`
pub fn candidates(model: SecurityModel, vhost: &VirtualHost) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(2);

    if let Some(action) = vhost.secure_action() {
        if model.admits_secure() {
            candidates.push(Candidate { variant: RouteVariant::Secure, action });
        }
    }

    if model.admits_insecure() {
        match vhost.insecure_action() {
            Some(HostAction::Redirect) => candidates
                .push(Candidate { variant: RouteVariant::Redirect, action: HostAction::Redirect }),
            Some(action) => {
                candidates.push(Candidate { variant: RouteVariant::Insecure, action })
            }
            None => {}
        }
    }

    candidates
}

/// Apply the override chain; the first override that fires wins
fn resolve(
    rv: &RouteVariants<'_>,
    vhost_hostname: &str,
    candidate: Candidate,
    edge_mode: bool,
) -> (Candidate, Option<Override>) {
    let rule = rv.rule();
    let route = Candidate { variant: candidate.variant.unredirected(), action: HostAction::Route };

    if rule.is_acme_challenge() {
        return (route, Some(Override::AcmeChallenge));
    }

    if !rule.allows_any_host()
        && vhost_hostname != CATCH_ALL
        && !hostglob::overlaps_any(rule.route_hosts(), vhost_hostname)
    {
        return (Candidate { action: HostAction::Reject, ..candidate }, Some(Override::HostMismatch));
    }

    if edge_mode && rule.is_fallback() {
        return (route, Some(Override::FallbackMapping));
    }

    (candidate, None)
}

/// Populate every virtual host's route list from `rules`, which must already be in
/// precedence order.
pub fn assign_routes(registry: &mut ListenerRegistry, rules: &[RouteVariants<'_>], edge_mode: bool) {
    for rv in rules {
        for listener in registry.listeners_mut() {
            let model = listener.security_model();
            let listener_name = listener.name().to_string();

            for vhost in listener.vhosts_mut() {
                for candidate in candidates(model, vhost) {
                    let (resolved, forced) = resolve(rv, vhost.hostname(), candidate, edge_mode);

                    if resolved.action == HostAction::Reject {
                        debug!(
                            route = %rv.rule().name,
                            listener = %listener_name,
                            vhost = %vhost.hostname(),
                            variant = %candidate.variant,
                            forced = ?forced,
                            "drop route"
                        );
                        continue;
                    }

                    debug!(
                        route = %rv.rule().name,
                        listener = %listener_name,
                        vhost = %vhost.hostname(),
                        variant = %resolved.variant,
                        action = %resolved.action,
                        forced = ?forced,
                        "accept route"
                    );
                    vhost.add_route(rv.get(resolved.variant).clone());
                }
            }
        }
    }
}
