//! End-to-end compilation scenarios
//!
//! These tests drive `compile` with complete ingress models and inspect the Envoy listeners
//! it produces, decoding the nested connection managers and TCP proxies where needed.

mod common;

use common::*;
use envoy_types::pb::envoy::config::core::v3::TrafficDirection;
use ingress_compiler::config::{AccessLogType, ModuleSettings};
use ingress_compiler::domain::{
    HostAction, PathMatch, ProtocolLayer, RouteMatchSpec, RouteTarget, RoutingRule,
    SecurityModel, TlsContext, TracingSettings, ACME_CHALLENGE_PREFIX, FALLBACK_PRECEDENCE,
    ROOT_REGEX,
};
use ingress_compiler::xds::listener::{PROXY_PROTOCOL_FILTER_NAME, TLS_INSPECTOR_FILTER_NAME};
use ingress_compiler::{compile, Config, DefaultHttpFilterAdapter, Error, IngressModel};
use proptest::prelude::*;
use std::io::Write;

use HostAction::{Redirect, Reject, Route};
use ProtocolLayer::{Http, Proxy, Tcp, Tls};

fn fallback_rule() -> RoutingRule {
    RoutingRule {
        name: "fallback".into(),
        route_match: RouteMatchSpec { path: PathMatch::Regex(ROOT_REGEX.into()), headers: vec![] },
        target: RouteTarget::Cluster { name: "fallback".into(), timeout_ms: None, prefix_rewrite: None },
        host_constraints: vec![],
        precedence: FALLBACK_PRECEDENCE,
    }
}

fn scenario_a() -> IngressModel {
    IngressModel {
        listeners: vec![
            listener_decl("http", 8080, SecurityModel::Insecure, &[Http]),
            listener_decl("https", 8443, SecurityModel::Secure, &[Http, Tls]),
        ],
        hosts: vec![ingress_compiler::domain::HostDecl {
            tls_context: Some("example-tls".into()),
            ..host("example", "example.com", Some(Route), Some(Redirect))
        }],
        tls_contexts: vec![TlsContext::with_secret("example-tls", vec!["example.com".into()])],
        routes: vec![rule("root", "/", "web", &["example.com"])],
        ..Default::default()
    }
}

#[test]
fn secure_listener_routes_and_insecure_listener_redirects() {
    let compiled = compile_ok(&scenario_a());
    assert!(compiled.diagnostics.is_empty());
    assert_eq!(compiled.listeners.len(), 2);

    let cleartext = listener(&compiled, "ingress-listener-8080");
    let vhost = virtual_host(cleartext, "ingress-listener-8080-*");
    assert_eq!(vhost.routes.len(), 1);
    assert!(is_https_redirect(&vhost.routes[0]));
    assert!(cluster_of(&vhost.routes[0]).is_none());

    let secure = listener(&compiled, "ingress-listener-8443");
    let vhost = virtual_host(secure, "ingress-listener-8443-*");
    assert_eq!(vhost.routes.len(), 1);
    assert_eq!(cluster_of(&vhost.routes[0]).as_deref(), Some("web"));
    assert!(requires_https(&vhost.routes[0]));

    let chain = &secure.filter_chains[0];
    assert!(chain.transport_socket.is_some());
    assert_eq!(
        chain.filter_chain_match.as_ref().map(|m| m.transport_protocol.as_str()),
        Some("tls")
    );
    let filters: Vec<_> = secure.listener_filters.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(filters, vec![TLS_INSPECTOR_FILTER_NAME]);
    assert!(cleartext.listener_filters.is_empty());
}

#[test]
fn glob_host_receives_rules_for_names_it_covers() {
    let model = IngressModel {
        listeners: vec![listener_decl("http", 8080, SecurityModel::Insecure, &[Http])],
        hosts: vec![
            host("default", "*", None, Some(Route)),
            host("wildcard", "*.example.com", None, Some(Route)),
        ],
        routes: vec![
            rule("api", "/api", "api", &["api.example.com"]),
            rule("shop", "/shop", "shop", &["shop.example.org"]),
            rule("regional", "/eu", "eu", &["*.eu.example.com"]),
        ],
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    let http = listener(&compiled, "ingress-listener-8080");

    let wildcard = virtual_host(http, "ingress-listener-8080-*.example.com");
    let clusters: Vec<_> = wildcard.routes.iter().filter_map(cluster_of).collect();
    assert_eq!(clusters, vec!["api", "eu"]);

    let catch_all = virtual_host(http, "ingress-listener-8080-*");
    assert_eq!(catch_all.routes.len(), 3);
}

#[test]
fn acme_challenge_survives_reject_and_host_mismatch() {
    let model = IngressModel {
        listeners: vec![listener_decl("http", 8080, SecurityModel::Insecure, &[Http])],
        hosts: vec![
            host("default", "*", Some(Route), Some(Route)),
            host("example", "example.com", Some(Route), Some(Reject)),
        ],
        routes: vec![
            rule("acme", ACME_CHALLENGE_PREFIX, "acme", &["other.com"]),
            rule("other", "/", "other", &["other.com"]),
        ],
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    let http = listener(&compiled, "ingress-listener-8080");

    let example = virtual_host(http, "ingress-listener-8080-example.com");
    let clusters: Vec<_> = example.routes.iter().filter_map(cluster_of).collect();
    assert_eq!(clusters, vec!["acme"]);

    let catch_all = virtual_host(http, "ingress-listener-8080-*");
    let clusters: Vec<_> = catch_all.routes.iter().filter_map(cluster_of).collect();
    assert_eq!(clusters, vec!["acme", "other"]);
}

#[test]
fn every_http_listener_has_exactly_one_catch_all() {
    let model = IngressModel {
        listeners: vec![
            listener_decl("hosts", 8080, SecurityModel::Xfp, &[Http]),
            listener_decl("empty", 9090, SecurityModel::Xfp, &[Http]),
        ],
        hosts: vec![
            host("a", "a.example.com", Some(Route), Some(Redirect)),
            host("b", "b.example.com", Some(Route), Some(Redirect)),
        ],
        ..Default::default()
    };
    let compiled = compile_ok(&model);

    for envoy_listener in &compiled.listeners {
        let catch_alls = virtual_hosts(envoy_listener)
            .iter()
            .filter(|vhost| vhost.domains == vec!["*".to_string()])
            .count();
        assert_eq!(catch_alls, 1, "listener {}", envoy_listener.name);
    }

    let hosts = listener(&compiled, "ingress-listener-8080");
    let names: Vec<_> = virtual_hosts(hosts).into_iter().map(|vhost| vhost.name).collect();
    assert_eq!(names, vec!["ingress-listener-8080-*", "ingress-listener-8080-b.example.com"]);

    let sni: Vec<_> = hosts
        .filter_chains
        .iter()
        .map(|chain| chain.filter_chain_match.clone().unwrap_or_default().server_names)
        .collect();
    assert_eq!(sni, vec![Vec::<String>::new(), vec!["b.example.com".to_string()]]);
}

#[test]
fn proxy_protocol_disagreement_is_fatal() {
    let model = IngressModel {
        listeners: vec![
            listener_decl("plain", 8080, SecurityModel::Xfp, &[Http]),
            listener_decl("proxied", 8080, SecurityModel::Xfp, &[Proxy, Http]),
        ],
        ..Default::default()
    };
    let err = compile(&model, &Config::default(), &DefaultHttpFilterAdapter)
        .expect_err("proxy protocol conflict");
    assert!(matches!(
        err,
        Error::ProxyProtocolConflict { existing: false, requested: true, ref listener }
            if listener == "ingress-listener-8080"
    ));
}

#[test]
fn listener_filters_keep_proxy_protocol_first() {
    let model = IngressModel {
        listeners: vec![listener_decl("edge", 443, SecurityModel::Xfp, &[Tls, Proxy, Http])],
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    let names: Vec<_> = compiled.listeners[0].listener_filters.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec![PROXY_PROTOCOL_FILTER_NAME, TLS_INSPECTOR_FILTER_NAME]);
}

#[test]
fn identical_hosts_collapse_and_conflicting_hosts_fail() {
    let listeners = vec![listener_decl("http", 8080, SecurityModel::Xfp, &[Http])];

    let duplicate = IngressModel {
        listeners: listeners.clone(),
        hosts: vec![
            host("first", "*", Some(Route), Some(Redirect)),
            host("second", "*", Some(Route), Some(Redirect)),
        ],
        ..Default::default()
    };
    let compiled = compile_ok(&duplicate);
    assert_eq!(virtual_hosts(&compiled.listeners[0]).len(), 1);

    let conflicting = IngressModel {
        listeners,
        hosts: vec![
            host("first", "*", Some(Route), Some(Redirect)),
            host("second", "*", Some(Route), Some(Route)),
        ],
        ..Default::default()
    };
    let err = compile(&conflicting, &Config::default(), &DefaultHttpFilterAdapter)
        .expect_err("virtual host conflict");
    assert!(matches!(err, Error::VirtualHostConflict { .. }));
    assert!(err.is_structural());
}

#[test]
fn standalone_tcp_listener_gets_weighted_proxy() {
    let model = IngressModel {
        tcp_mapping_groups: vec![tcp_group("postgres", 5432, None, None)],
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    let tcp = listener(&compiled, "ingress-listener-5432");
    assert_eq!(tcp.filter_chains.len(), 1);
    assert!(tcp.listener_filters.is_empty());

    let proxy = tcp_proxy(&tcp.filter_chains[0]).expect("tcp proxy chain");
    assert_eq!(proxy.stat_prefix, "ingress_tcp_5432");

    let summary = compiled.summary().expect("summary");
    let json = serde_json::to_value(&summary).expect("serialize summary");
    assert_eq!(json["listeners"][0]["filter_chains"][0]["type"], "tcp");
    assert_eq!(
        json["listeners"][0]["filter_chains"][0]["clusters"],
        serde_json::json!(["postgres-primary:80", "postgres-canary:20"])
    );
}

#[test]
fn tcp_chains_precede_http_chains_on_shared_listener() {
    let model = IngressModel {
        listeners: vec![listener_decl("mixed", 443, SecurityModel::Xfp, &[Http, Tls, Tcp])],
        hosts: vec![ingress_compiler::domain::HostDecl {
            tls_context: Some("web-tls".into()),
            ..host("web", "example.com", Some(Route), Some(Redirect))
        }],
        tls_contexts: vec![
            TlsContext::with_secret("web-tls", vec!["example.com".into()]),
            TlsContext::with_secret("db-tls", vec!["db.example.com".into()]),
        ],
        tcp_mapping_groups: vec![tcp_group("db", 443, Some("db.example.com"), Some("db-tls"))],
        routes: vec![rule("root", "/", "web", &[])],
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    assert_eq!(compiled.listeners.len(), 1);

    let mixed = &compiled.listeners[0];
    assert_eq!(mixed.filter_chains.len(), 2);
    assert!(tcp_proxy(&mixed.filter_chains[0]).is_some());
    assert_eq!(
        mixed.filter_chains[0].filter_chain_match.clone().unwrap_or_default().server_names,
        vec!["db.example.com".to_string()]
    );
    assert_eq!(connection_managers(mixed).len(), 1);
}

#[test]
fn undiscriminated_tcp_groups_on_one_port_conflict() {
    let model = IngressModel {
        tcp_mapping_groups: vec![tcp_group("a", 6000, None, None), tcp_group("b", 6000, None, None)],
        ..Default::default()
    };
    let err = compile(&model, &Config::default(), &DefaultHttpFilterAdapter)
        .expect_err("chain conflict");
    assert!(matches!(err, Error::FilterChainConflict { ref listener, .. } if listener == "ingress-listener-6000"));
}

#[test]
fn edge_mode_forces_acme_listener() {
    let model = IngressModel {
        listeners: vec![listener_decl("https", 8443, SecurityModel::Secure, &[Http, Tls])],
        routes: vec![
            rule("acme", ACME_CHALLENGE_PREFIX, "acme-svc", &[]),
            rule("api", "/api", "api", &[]),
            fallback_rule(),
        ],
        module: ModuleSettings { edge_mode: true, ..Default::default() },
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    let names: Vec<_> = compiled.listeners.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["ingress-listener-8080", "ingress-listener-8443"]);

    let acme = virtual_host(listener(&compiled, "ingress-listener-8080"), "ingress-listener-8080-*");
    let clusters: Vec<_> = acme.routes.iter().filter_map(cluster_of).collect();
    assert_eq!(clusters, vec!["acme-svc", "fallback"]);

    let intercept = IngressModel {
        module: ModuleSettings { edge_mode: true, intercept_agent: true, ..Default::default() },
        ..model
    };
    assert_eq!(compile_ok(&intercept).listeners.len(), 1);
}

#[test]
fn fallback_mapping_is_never_redirected_in_edge_mode() {
    let model = IngressModel {
        listeners: vec![listener_decl("http", 8080, SecurityModel::Xfp, &[Http])],
        hosts: vec![host("any", "*", Some(Route), Some(Redirect))],
        routes: vec![rule("root", "/", "web", &[]), fallback_rule()],
        module: ModuleSettings { edge_mode: true, ..Default::default() },
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    let vhost = virtual_host(&compiled.listeners[0], "ingress-listener-8080-*");
    assert_eq!(vhost.routes.len(), 4);

    // root: secure copy then redirect
    assert!(requires_https(&vhost.routes[0]));
    assert!(is_https_redirect(&vhost.routes[1]));
    // fallback: secure copy then a plain route
    assert!(requires_https(&vhost.routes[2]));
    assert_eq!(cluster_of(&vhost.routes[3]).as_deref(), Some("fallback"));
    assert!(!requires_https(&vhost.routes[3]));
}

#[test]
fn header_case_mistakes_are_diagnostics() {
    let model = IngressModel {
        listeners: vec![listener_decl("http", 8080, SecurityModel::Xfp, &[Http])],
        module: ModuleSettings {
            proper_case: true,
            header_case_overrides: Some(serde_json::json!(["X-Custom-Header"])),
            max_request_headers_kb: Some(10_000),
            ..Default::default()
        },
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    assert!(compiled.diagnostics.mentions("header_case_overrides"));
    assert!(compiled.diagnostics.mentions("max_request_headers_kb"));

    let hcm = &connection_managers(&compiled.listeners[0])[0];
    assert!(hcm.max_request_headers_kb.is_none());
    let key_format = hcm
        .http_protocol_options
        .as_ref()
        .and_then(|options| options.header_key_format.as_ref());
    assert!(key_format.is_some());
}

#[test]
fn tracing_marks_http_listeners_outbound() {
    let model = IngressModel {
        listeners: vec![listener_decl("http", 8080, SecurityModel::Xfp, &[Http])],
        tcp_mapping_groups: vec![tcp_group("db", 5432, None, None)],
        tracing: Some(TracingSettings {
            driver: "envoy.tracers.zipkin".into(),
            config: Default::default(),
            tag_headers: vec!["x-request-id".into()],
            sampling: Default::default(),
        }),
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    assert_eq!(
        listener(&compiled, "ingress-listener-8080").traffic_direction,
        TrafficDirection::Outbound as i32
    );
    assert_eq!(
        listener(&compiled, "ingress-listener-5432").traffic_direction,
        TrafficDirection::Unspecified as i32
    );
    let hcm = &connection_managers(listener(&compiled, "ingress-listener-8080"))[0];
    assert_eq!(hcm.generate_request_id.as_ref().map(|v| v.value), Some(true));
}

#[test]
fn declared_bind_address_is_part_of_the_name() {
    let model = IngressModel {
        listeners: vec![ingress_compiler::domain::ListenerDecl {
            bind_address: Some("127.0.0.1".into()),
            ..listener_decl("local", 8080, SecurityModel::Xfp, &[Http])
        }],
        ..Default::default()
    };
    let compiled = compile_ok(&model);
    assert_eq!(compiled.listeners[0].name, "ingress-listener-127.0.0.1-8080");
}

fn rich_model() -> IngressModel {
    let mut model = scenario_a();
    model.listeners.push(listener_decl("internal", 9000, SecurityModel::Xfp, &[Http, Proxy]));
    model.hosts.push(host("api", "api.example.com", Some(Route), Some(Redirect)));
    model.routes.push(rule("api", "/api", "api", &["api.example.com"]));
    model.routes.push(RoutingRule { precedence: 10, ..rule("health", "/health", "health", &[]) });
    model.tcp_mapping_groups.push(tcp_group("redis", 6379, None, None));
    model
}

#[test]
fn compiling_twice_is_byte_identical() {
    let model = rich_model();
    let first = compile_ok(&model).encode_length_delimited();
    let second = compile_ok(&model).encode_length_delimited();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn listener_declaration_order_does_not_matter() {
    let model = rich_model();
    let mut reversed = model.clone();
    reversed.listeners.reverse();
    assert_eq!(
        compile_ok(&model).encode_length_delimited(),
        compile_ok(&reversed).encode_length_delimited()
    );
}

#[test]
fn json_access_logs_compile_consistently() {
    let mut model = rich_model();
    model.module.envoy_log_type = AccessLogType::Json;
    let first = compile_ok(&model);
    assert!(first.diagnostics.is_empty());
    let expected = first.encode_length_delimited();
    for _ in 0..20 {
        assert_eq!(compile_ok(&model).encode_length_delimited(), expected);
    }

    model.module.envoy_log_format = Some(serde_json::json!({
        "status": "%RESPONSE_CODE%",
        "route": {"cluster": "%UPSTREAM_CLUSTER%", "host": "%UPSTREAM_HOST%"},
        "request_id": "%REQ(X-REQUEST-ID)%",
    }));
    model.module.header_case_overrides =
        Some(serde_json::json!(["X-Request-ID", "X-Tenant", "X-Forwarded-Proto", "ETag"]));
    let expected = compile_ok(&model).encode_length_delimited();
    for _ in 0..20 {
        assert_eq!(compile_ok(&model).encode_length_delimited(), expected);
    }

    model.module.envoy_log_format = Some(serde_json::json!("%START_TIME%"));
    let compiled = compile_ok(&model);
    assert!(compiled.diagnostics.mentions("envoy_log_format"));
}

#[test]
fn yaml_model_file_compiles_to_summary() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().expect("temp file");
    write!(
        file,
        r#"
listeners:
  - name: http
    port: 8080
    security_model: INSECURE
  - name: https
    port: 8443
    protocol_stack: [HTTP, TLS]
    security_model: SECURE
hosts:
  - name: example
    hostname: example.com
    tls_context: example-tls
tls_contexts:
  - name: example-tls
    hosts: [example.com]
    secret: example-cert
routes:
  - name: root
    match: {{ path: {{ prefix: / }} }}
    target: {{ cluster: {{ name: web }} }}
"#
    )
    .expect("write model");

    let model = IngressModel::from_file(file.path()).expect("load model");
    let compiled = compile_ok(&model);
    let summary = serde_json::to_value(compiled.summary().expect("summary")).expect("serialize");

    assert_eq!(summary["listeners"][0]["name"], "ingress-listener-8080");
    assert_eq!(summary["listeners"][1]["name"], "ingress-listener-8443");
    assert_eq!(summary["listeners"][1]["filter_chains"][0]["tls"], true);
    assert_eq!(summary["listeners"][1]["filter_chains"][0]["type"], "http");
    assert_eq!(summary["diagnostics"], serde_json::json!([]));
}

fn security_model() -> impl Strategy<Value = SecurityModel> {
    prop_oneof![
        Just(SecurityModel::Secure),
        Just(SecurityModel::Insecure),
        Just(SecurityModel::Xfp)
    ]
}

fn action() -> impl Strategy<Value = Option<HostAction>> {
    prop_oneof![Just(None), Just(Some(Route)), Just(Some(Redirect)), Just(Some(Reject))]
}

prop_compose! {
    fn arbitrary_model()(
        listeners in prop::collection::vec((prop::sample::select(vec![8080u32, 8443, 9000]), security_model()), 0..4),
        hosts in prop::collection::vec((prop::sample::select(vec!["*", "a.example.com", "b.example.com"]), action(), action()), 0..4),
        routes in prop::collection::vec((prop::sample::select(vec!["/", "/api", ACME_CHALLENGE_PREFIX]), prop::sample::select(vec!["", "a.example.com", "other.com"]), -2i32..3), 0..5),
        edge_mode in any::<bool>(),
    ) -> IngressModel {
        IngressModel {
            listeners: listeners
                .into_iter()
                .enumerate()
                .map(|(idx, (port, model))| listener_decl(&format!("l{}", idx), port, model, &[Http]))
                .collect(),
            hosts: hosts
                .into_iter()
                .enumerate()
                .map(|(idx, (hostname, secure, insecure))| host(&format!("h{}", idx), hostname, secure, insecure))
                .collect(),
            routes: routes
                .into_iter()
                .enumerate()
                .map(|(idx, (prefix, constraint, precedence))| {
                    let hosts: Vec<&str> = if constraint.is_empty() { vec![] } else { vec![constraint] };
                    RoutingRule { precedence, ..rule(&format!("r{}", idx), prefix, "svc", &hosts) }
                })
                .collect(),
            module: ModuleSettings { edge_mode, ..Default::default() },
            ..Default::default()
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn compilation_is_deterministic(model in arbitrary_model()) {
        let run = || {
            compile(&model, &Config::default(), &DefaultHttpFilterAdapter)
                .map(|compiled| compiled.encode_length_delimited())
                .map_err(|err| err.to_string())
        };
        prop_assert_eq!(run(), run());
    }

    #[test]
    fn compiled_http_listeners_have_one_catch_all(model in arbitrary_model()) {
        if let Ok(compiled) = compile(&model, &Config::default(), &DefaultHttpFilterAdapter) {
            for envoy_listener in &compiled.listeners {
                let catch_alls = virtual_hosts(envoy_listener)
                    .iter()
                    .filter(|vhost| vhost.domains == vec!["*".to_string()])
                    .count();
                prop_assert_eq!(catch_alls, 1);
            }
        }
    }
}
