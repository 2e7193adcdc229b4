use myinvois_domain::{ClientConfig, Credentials, RetrySleep};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";

/// Config pointing both hosts at `server`, with near-zero retry sleeps
pub fn config_for(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::new(Credentials::new(CLIENT_ID, CLIENT_SECRET))
        .with_base_url(server.uri())
        .with_retry(3, RetrySleep::Fixed { ms: 1 });
    config.identity_url = Some(server.uri());
    config
}

pub fn token_body(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "InvoicingAPI"
    })
}

/// Identity endpoint answering every request with `access_token`
pub async fn mount_token(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token)))
        .mount(server)
        .await;
}

/// Requests the server received for `request_path`
pub async fn requests_to(server: &MockServer, request_path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == request_path)
        .collect()
}
