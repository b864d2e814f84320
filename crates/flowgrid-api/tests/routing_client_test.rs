#![allow(clippy::unwrap_used)]
// Contract tests for `RoutingClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowgrid_api::{Applied, Dpid, Ensure, RetryPolicy, RoutingClient};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(5))
}

async fn setup() -> (MockServer, RoutingClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = RoutingClient::with_client(reqwest::Client::new(), base_url, fast_retry());
    (server, client)
}

// ── GET semantics ───────────────────────────────────────────────────

#[tokio::test]
async fn get_json_or_returns_default_after_retry_exhaustion() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/topology/switches"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let value: Vec<serde_json::Value> = client
        .get_json_or("/v1.0/topology/switches", Vec::new())
        .await;
    assert!(value.is_empty());
}

#[tokio::test]
async fn get_json_retries_through_transient_failures() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let value: serde_json::Value = client.get_json("/ping").await.unwrap();
    assert_eq!(value["ok"], json!(true));
}

// ── POST semantics ──────────────────────────────────────────────────

#[tokio::test]
async fn post_conflict_is_reported_as_already_applied() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/router/0000000000000001"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client
        .post_json(
            "/router/0000000000000001",
            &json!({"address": "10.0.1.254/24", "port": 1}),
        )
        .await
        .unwrap();
    assert_eq!(outcome, Applied::AlreadyApplied);
}

#[tokio::test]
async fn post_bad_request_is_reported_as_already_applied() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/router/0000000000000001"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client
        .post_json("/router/0000000000000001", &json!({"x": 1}))
        .await
        .unwrap();
    assert_eq!(outcome, Applied::AlreadyApplied);
}

#[tokio::test]
async fn post_server_error_is_retried_then_escalated() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/router/0000000000000002"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let result = client
        .post_json("/router/0000000000000002", &json!({"x": 1}))
        .await;
    assert!(result.is_err());
}

// ── Topology / port descriptors ─────────────────────────────────────

#[tokio::test]
async fn topology_switches_parses_hex_dpids_and_skips_garbage() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/topology/switches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "dpid": "0000000000000001", "ports": [] },
            { "dpid": "00000000000000ff", "ports": [] },
            { "dpid": "not-a-dpid", "ports": [] }
        ])))
        .mount(&server)
        .await;

    let dpids = client.topology_switches().await.unwrap();
    assert_eq!(dpids, vec![Dpid(1), Dpid(255)]);
}

#[tokio::test]
async fn port_descriptors_are_keyed_by_decimal_dpid() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/stats/portdesc/17"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "17": [
                { "name": "router1-link", "port_no": 1, "hw_addr": "aa:bb:cc:dd:ee:01" },
                { "name": "vxlan0", "port_no": 2, "hw_addr": "aa:bb:cc:dd:ee:02" },
                { "name": "vxlan-br", "port_no": "LOCAL", "hw_addr": "aa:bb:cc:dd:ee:03" }
            ]
        })))
        .mount(&server)
        .await;

    let ports = client.port_descriptors(Dpid(17)).await.unwrap();
    assert_eq!(ports.len(), 3);
    assert_eq!(ports[0].name, "router1-link");
    assert_eq!(ports[0].port_no.as_ref().unwrap().as_number(), Some(1));
    assert!(ports[2].port_no.as_ref().unwrap().is_local());
}

#[tokio::test]
async fn missing_dpid_key_yields_empty_port_list() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/stats/portdesc/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let ports = client.port_descriptors(Dpid(9)).await.unwrap();
    assert!(ports.is_empty());
}

// ── Idempotent provisioning ─────────────────────────────────────────

#[tokio::test]
async fn ensure_interface_posts_once_then_detects_existing() {
    let (server, client) = setup().await;
    let dpid = Dpid(1);

    // First GET: empty config. After the POST, the service reports the
    // interface, so the second ensure must not POST again.
    Mock::given(method("GET"))
        .and(path("/router/0000000000000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/router/0000000000000001"))
        .and(body_json(json!({"address": "10.0.1.254/24", "port": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/router/0000000000000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "address": "10.0.1.254/24", "port": 1 }
        ])))
        .mount(&server)
        .await;

    let first = client
        .ensure_interface(dpid, 1, "10.0.1.254/24")
        .await
        .unwrap();
    assert_eq!(first, Ensure::Applied);

    let second = client
        .ensure_interface(dpid, 1, "10.0.1.254/24")
        .await
        .unwrap();
    assert_eq!(second, Ensure::AlreadyPresent);
}

#[tokio::test]
async fn ensure_route_matches_alternate_field_names() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/router/0000000000000003"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "routes": [
                { "dst": "10.0.2.0/24", "nexthop": "10.30.30.12" }
            ]
        })))
        .mount(&server)
        .await;

    // The route exists under historical field names; no POST expected.
    let outcome = client
        .ensure_route(Dpid(3), "10.0.2.0/24", "10.30.30.12")
        .await
        .unwrap();
    assert_eq!(outcome, Ensure::AlreadyPresent);
}

#[tokio::test]
async fn ensure_route_posts_when_absent() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/router/0000000000000004"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/router/0000000000000004"))
        .and(body_json(json!({
            "destination": "10.0.1.0/24",
            "gateway": "10.30.30.11"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client
        .ensure_route(Dpid(4), "10.0.1.0/24", "10.30.30.11")
        .await
        .unwrap();
    assert_eq!(outcome, Ensure::Applied);
}

#[tokio::test]
async fn ensure_interface_unreachable_config_read_falls_back_to_post() {
    let (server, client) = setup().await;

    // GET always fails; the ensure call must still attempt the POST
    // (default config == empty config).
    Mock::given(method("GET"))
        .and(path("/router/0000000000000005"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/router/0000000000000005"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client
        .ensure_interface(Dpid(5), 2, "10.30.30.11/24")
        .await
        .unwrap();
    assert_eq!(outcome, Ensure::AlreadyPresent);
}
