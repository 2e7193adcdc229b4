//! Client-credentials exchange against the identity endpoint

use async_trait::async_trait;
use myinvois_common::observability::{redact_form, LoggingSettings};
use myinvois_core::IdentityProvider;
use myinvois_domain::constants::{ON_BEHALF_OF_HEADER, TOKEN_PATH};
use myinvois_domain::{ClientConfig, Credentials, MyInvoisError, Result, Tin, TokenResponse};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::form_urlencoded;

use crate::api::errors::INVALID_JSON_MESSAGE;
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Identity endpoint adapter
///
/// A single attempt per call; transient identity failures surface to the
/// request executor, whose retry loop will ask again.
pub struct HttpIdentityProvider {
    http: HttpClient,
    token_url: String,
    logging: LoggingSettings,
}

impl HttpIdentityProvider {
    pub fn new(http: HttpClient, config: &ClientConfig) -> Self {
        Self {
            http,
            token_url: format!("{}{TOKEN_PATH}", config.resolved_identity_url()),
            logging: config.logging.clone(),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

fn form_body(credentials: &Credentials, scope: &str) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "client_credentials")
        .append_pair("client_id", &credentials.client_id)
        .append_pair("client_secret", &credentials.client_secret)
        .append_pair("scope", scope)
        .finish()
}

/// `error_description`, then `error`, then the raw body
fn identity_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("error_description")
                .or_else(|| v.get("error"))
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "Identity endpoint rejected the request".to_string()
            } else {
                body.chars().take(256).collect()
            }
        })
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self, credentials), fields(client_id = %credentials.client_id, intermediary = on_behalf_of.is_some()))]
    async fn request_token(
        &self,
        credentials: &Credentials,
        scope: &str,
        on_behalf_of: Option<&Tin>,
    ) -> Result<TokenResponse> {
        let body = form_body(credentials, scope);

        let mut request = self
            .http
            .request(Method::POST, &self.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json");
        if let Some(tin) = on_behalf_of {
            request = request.header(ON_BEHALF_OF_HEADER, tin.as_str());
        }

        if self.logging.enabled {
            info!(
                channel = %self.logging.channel,
                url = %self.token_url,
                on_behalf_of = ?on_behalf_of.map(Tin::as_str),
                body = %redact_form(&body),
                "MyInvois identity request"
            );
        }

        let response = self.http.send(request.body(body)).await?;
        let status = response.status();
        let text = response.text().await.map_err(|err| MyInvoisError::from(InfraError::from(err)))?;

        if self.logging.enabled {
            info!(
                channel = %self.logging.channel,
                url = %self.token_url,
                status = status.as_u16(),
                "MyInvois identity response"
            );
        }

        if !status.is_success() {
            return Err(MyInvoisError::authentication(
                Some(status.as_u16()),
                identity_error_message(&text),
            ));
        }

        let token: TokenResponse = serde_json::from_str(&text).map_err(|err| {
            debug!(error = %err, "identity response could not be decoded");
            MyInvoisError::api(Some(status.as_u16()), INVALID_JSON_MESSAGE)
        })?;
        debug!(expires_in = token.expires_in, "token issued");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_body_is_url_encoded() {
        let body = form_body(&Credentials::new("my id", "p&ss=word"), "InvoicingAPI");
        assert_eq!(
            body,
            "grant_type=client_credentials&client_id=my+id&client_secret=p%26ss%3Dword&scope=InvoicingAPI"
        );
        assert!(!redact_form(&body).contains("p%26ss"));
    }

    #[test]
    fn error_message_prefers_description() {
        assert_eq!(
            identity_error_message(r#"{"error":"invalid_client","error_description":"Bad secret"}"#),
            "Bad secret"
        );
        assert_eq!(identity_error_message(r#"{"error":"invalid_client"}"#), "invalid_client");
        assert_eq!(identity_error_message(""), "Identity endpoint rejected the request");
    }

    #[test]
    fn token_url_uses_identity_host() {
        let mut config = ClientConfig::new(Credentials::new("id", "secret"))
            .with_base_url("https://api.example.test/");
        let provider = HttpIdentityProvider::new(HttpClient::new().unwrap(), &config);
        assert_eq!(provider.token_url(), "https://api.example.test/connect/token");

        config.identity_url = Some("https://id.example.test".into());
        let provider = HttpIdentityProvider::new(HttpClient::new().unwrap(), &config);
        assert_eq!(provider.token_url(), "https://id.example.test/connect/token");
    }
}
