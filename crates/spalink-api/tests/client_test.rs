#![allow(clippy::unwrap_used)]

// Integration tests for `SpaClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spalink_api::models::LightPatch;
use spalink_api::{Credentials, Error, SpaClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SpaClient) {
    let server = MockServer::start().await;
    let url = format!("{}/", server.uri()).parse().unwrap();
    let creds = Credentials {
        email: "owner@example.com".into(),
        password: SecretString::from("hunter2".to_string()),
    };
    let client = SpaClient::new(url, creds, &TransportConfig::default()).unwrap();
    (server, client)
}

/// Mount the login endpoint every authenticated test needs.
async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "tok-123",
            "expiresIn": 3600,
        })))
        .mount(server)
        .await;
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_login_then_list_spas() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/accounts/me"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "acct-1",
            "email": "owner@example.com",
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/accounts/acct-1/spas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "id": "spa-100", "brand": "Jacuzzi", "model": "J-335" },
            ]
        })))
        .mount(&server)
        .await;

    let account = client.account().await.unwrap();
    let spas = client.list_spas(&account.id).await.unwrap();

    assert_eq!(spas.len(), 1);
    assert_eq!(spas[0].id, "spa-100");
    assert_eq!(spas[0].model.as_deref(), Some("J-335"));
}

#[tokio::test]
async fn test_status_tolerates_missing_fields() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/spas/spa-100/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "heater": "ON",
            "water": { "temperature": 37.5 },
        })))
        .mount(&server)
        .await;

    let status = client.status("spa-100").await.unwrap();
    assert_eq!(status.heater.as_deref(), Some("ON"));
    assert_eq!(status.water.unwrap().temperature, Some(37.5));
    assert!(status.set_temperature.is_none());
}

#[tokio::test]
async fn test_lights_color_readback() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/spas/spa-100/lights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lights": [
                {
                    "zone": 1,
                    "zoneType": "INTERIOR",
                    "mode": "FULL_DYNAMIC_RGB",
                    "intensity": 0,
                    "color": { "red": 85, "green": 12, "blue": 0, "white": 0 },
                },
            ]
        })))
        .mount(&server)
        .await;

    let lights = client.lights("spa-100").await.unwrap().lights;
    assert_eq!(lights.len(), 1);
    assert_eq!(lights[0].zone, 1);
    assert_eq!(lights[0].mode.as_deref(), Some("FULL_DYNAMIC_RGB"));
    assert_eq!(lights[0].color.unwrap().red, 85);
}

#[tokio::test]
async fn test_set_light_sends_patch_body() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/spas/spa-100/lights/2"))
        .and(body_partial_json(json!({ "mode": "WHITE", "intensity": 50 })))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let patch = LightPatch {
        mode: Some("WHITE".into()),
        intensity: Some(50),
        ..LightPatch::default()
    };
    client.set_light("spa-100", 2, &patch).await.unwrap();
}

// ── Error classification ────────────────────────────────────────────

#[tokio::test]
async fn test_bad_request_is_rejection() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/spas/spa-100/lights/1"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "message": "unsupported mode for this zone" })),
        )
        .mount(&server)
        .await;

    let patch = LightPatch {
        mode: Some("PARTY".into()),
        intensity: Some(100),
        ..LightPatch::default()
    };
    let err = client.set_light("spa-100", 1, &patch).await.unwrap_err();

    assert!(err.is_rejection());
    assert!(!err.is_transient());
    match err {
        Error::Rejected { message, status } => {
            assert_eq!(status, 400);
            assert_eq!(message, "unsupported mode for this zone");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limited_reads_retry_after() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/spas/spa-100/status"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
        .mount(&server)
        .await;

    let err = client.status("spa-100").await.unwrap_err();
    match err {
        Error::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 17),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/spas/spa-100/pumps"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client.pumps("spa-100").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_bad_credentials_fail_login() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.login().await.unwrap_err();
    assert!(err.is_auth_expired());
}
