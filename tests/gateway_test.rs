// ============================================================================
// Gateway Integration Tests
// ============================================================================
//
// Real gateway on a random port in front of in-process echo backends:
// - prefix fan-out with path, query and headers preserved
// - request id propagation
// - 404 for unknown prefixes, 502 for unreachable or slow backends,
//   500 for an unparseable backend URL
// - CORS preflight
// - optional bearer guard backed by a live auth service
//
// ============================================================================

use std::time::Duration;

use serde_json::{json, Value};
use serial_test::serial;

mod test_utils;
use test_utils::{
    gateway_config, spawn_auth, spawn_echo_backend, spawn_gateway, spawn_slow_backend,
    unreachable_url,
};

#[tokio::test]
async fn test_fan_out_preserves_path_query_and_headers() {
    let member = spawn_echo_backend("member").await;
    let gateway = spawn_gateway(gateway_config(&[("member", &member)])).await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/members/42?include=memberships", gateway))
        .header("Authorization", "Bearer abc")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-backend"], "member");
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!request_id.is_empty());

    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["method"], "GET");
    assert_eq!(echoed["path"], "/api/v1/members/42");
    assert_eq!(echoed["query"], "include=memberships");
    assert_eq!(echoed["headers"]["authorization"], "Bearer abc");
    assert_eq!(echoed["headers"]["x-request-id"], request_id.as_str());

    let host = member.trim_start_matches("http://");
    assert_eq!(echoed["headers"]["host"], host);
}

#[tokio::test]
async fn test_client_request_id_is_propagated() {
    let class = spawn_echo_backend("class").await;
    let gateway = spawn_gateway(gateway_config(&[("class", &class)])).await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/schedules/", gateway))
        .header("X-Request-ID", "req-7f3a")
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-7f3a");
    let echoed: Value = response.json().await.unwrap();
    // trailing slash survives
    assert_eq!(echoed["path"], "/api/v1/schedules/");
    assert_eq!(echoed["headers"]["x-request-id"], "req-7f3a");
}

#[tokio::test]
async fn test_body_and_method_are_forwarded() {
    let payment = spawn_echo_backend("payment").await;
    let gateway = spawn_gateway(gateway_config(&[("payment", &payment)])).await;

    let response = reqwest::Client::new()
        .put(format!("{}/api/v1/payment-types/3", gateway))
        .json(&json!({"name": "card"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["backend"], "payment");
    assert_eq!(echoed["method"], "PUT");
    assert_eq!(echoed["path"], "/api/v1/payment-types/3");
    let body: Value = serde_json::from_str(echoed["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["name"], "card");
}

#[tokio::test]
async fn test_each_prefix_reaches_its_backend() {
    let member = spawn_echo_backend("member").await;
    let staff = spawn_echo_backend("staff").await;
    let class = spawn_echo_backend("class").await;
    let facility = spawn_echo_backend("facility").await;
    let payment = spawn_echo_backend("payment").await;
    let gateway = spawn_gateway(gateway_config(&[
        ("member", &member),
        ("staff", &staff),
        ("class", &class),
        ("facility", &facility),
        ("payment", &payment),
    ]))
    .await;

    let client = reqwest::Client::new();
    for (path, backend) in [
        ("/api/v1/memberships", "member"),
        ("/api/v1/trainers/1", "staff"),
        ("/api/v1/bookings", "class"),
        ("/api/v1/equipment/9", "facility"),
        ("/api/v1/transactions", "payment"),
    ] {
        let response = client.get(format!("{}{}", gateway, path)).send().await.unwrap();
        assert_eq!(response.headers()["x-backend"], backend, "{}", path);
    }
}

#[tokio::test]
async fn test_unknown_prefix_is_404() {
    let gateway = spawn_gateway(gateway_config(&[])).await;

    let response = reqwest::get(format!("{}/api/v1/lockers", gateway)).await.unwrap();
    assert_eq!(response.status(), 404);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_unreachable_backend_is_502() {
    let dead = unreachable_url().await;
    let gateway = spawn_gateway(gateway_config(&[("payment", &dead)])).await;

    let response = reqwest::get(format!("{}/api/v1/payments", gateway)).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_backend_timeout_is_502() {
    let slow = spawn_slow_backend(Duration::from_secs(5)).await;
    let mut config = gateway_config(&[("facility", &slow)]);
    config.services.get_mut("facility").unwrap().timeout = Duration::from_millis(200);
    let gateway = spawn_gateway(config).await;

    let response = reqwest::get(format!("{}/api/v1/facilities", gateway)).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("did not respond"));
}

#[tokio::test]
async fn test_write_timeout_below_route_timeout_is_502_with_detail() {
    let slow = spawn_slow_backend(Duration::from_secs(3)).await;
    let mut config = gateway_config(&[("facility", &slow)]);
    config.server.write_timeout = Duration::from_millis(300);
    let gateway = spawn_gateway(config).await;

    let response = reqwest::get(format!("{}/api/v1/facilities", gateway)).await.unwrap();
    assert_eq!(response.status(), 502);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "facility service unavailable");
    assert!(body["detail"].as_str().unwrap().contains("did not respond"));
}

#[tokio::test]
async fn test_equal_write_and_route_timeouts_still_give_502() {
    let slow = spawn_slow_backend(Duration::from_secs(3)).await;
    let mut config = gateway_config(&[("payment", &slow)]);
    config.server.write_timeout = Duration::from_millis(300);
    config.services.get_mut("payment").unwrap().timeout = Duration::from_millis(300);
    let gateway = spawn_gateway(config).await;

    let response = reqwest::get(format!("{}/api/v1/payments", gateway)).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("did not respond"));
}

#[tokio::test]
async fn test_unparseable_backend_url_is_500() {
    let gateway = spawn_gateway(gateway_config(&[("staff", "not a url")])).await;

    let response = reqwest::get(format!("{}/api/v1/staff", gateway)).await.unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_preflight_is_answered_locally() {
    // class points nowhere: a preflight must never reach it
    let dead = unreachable_url().await;
    let gateway = spawn_gateway(gateway_config(&[("class", &dead)])).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/api/v1/classes", gateway))
        .header("Origin", "http://x")
        .send()
        .await
        .unwrap();

    assert!(response.status() == 200 || response.status() == 204);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert!(response.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .contains("GET, POST, PUT, PATCH, DELETE, OPTIONS"));
}

#[tokio::test]
async fn test_health() {
    let gateway = spawn_gateway(gateway_config(&[])).await;

    let response = reqwest::get(format!("{}/health", gateway)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "api-gateway");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_bearer_guard_consults_auth_service() {
    let auth = spawn_auth(3).await;
    let member = spawn_echo_backend("member").await;
    let mut config = gateway_config(&[("member", &member), ("auth", &auth.address)]);
    config.auth_guard.enabled = true;
    let gateway = spawn_gateway(config).await;
    let client = reqwest::Client::new();

    // public auth routes pass through the guard to the auth service
    let response = client
        .post(format!("{}/api/v1/auth/register", gateway))
        .json(&json!({"username": "admin", "password": "pw", "email": "admin@x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let login: Value = client
        .post(format!("{}/api/v1/auth/login", gateway))
        .json(&json!({"username": "admin", "password": "pw"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["token"].as_str().unwrap();

    let response = client
        .get(format!("{}/api/v1/members", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");

    let response = client
        .get(format!("{}/api/v1/members", gateway))
        .bearer_auth("forged.token.value")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(format!("{}/api/v1/members", gateway))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-backend"], "member");
}

#[tokio::test]
async fn test_bearer_guard_with_auth_down_is_502() {
    let dead = unreachable_url().await;
    let member = spawn_echo_backend("member").await;
    let mut config = gateway_config(&[("member", &member), ("auth", &dead)]);
    config.auth_guard.enabled = true;
    let gateway = spawn_gateway(config).await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/members", gateway))
        .bearer_auth("anything")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
}

#[test]
#[serial]
fn test_load_from_configured_path_with_env_overrides() {
    let path = std::env::temp_dir().join(format!("gateway-{}.yaml", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        "server:\n  port: 9100\nservices:\n  member: {url: \"http://member:8001\", timeout: 2s}\n",
    )
    .unwrap();

    std::env::set_var("GATEWAY_CONFIG", &path);
    std::env::set_var("MEMBER_SERVICE_URL", "http://10.1.1.1:8001");
    let loaded = fitcenter_server::config::GatewayConfig::load();
    std::env::remove_var("GATEWAY_CONFIG");
    std::env::remove_var("MEMBER_SERVICE_URL");
    std::fs::remove_file(&path).ok();

    let config = loaded.unwrap();
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.services["member"].url, "http://10.1.1.1:8001");
    assert_eq!(config.services["member"].timeout, Duration::from_secs(2));
}

#[test]
#[serial]
fn test_missing_configured_path_is_an_error() {
    std::env::set_var("GATEWAY_CONFIG", "/nonexistent/gateway.yaml");
    let loaded = fitcenter_server::config::GatewayConfig::load();
    std::env::remove_var("GATEWAY_CONFIG");
    assert!(loaded.is_err());
}
