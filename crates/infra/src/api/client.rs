//! MyInvois API client
//!
//! Wires an [`AuthSession`] (token lifecycle) to a [`RequestExecutor`]
//! (authenticated calls with retry) and exposes the API's document,
//! taxpayer and notification operations. Inputs are validated locally so
//! malformed requests never reach the network.

use std::sync::Arc;

use myinvois_common::cache::SharedStore;
use myinvois_common::time::SharedClock;
use myinvois_core::{AccessTokenProvider, AuthSession, SessionSettings};
use myinvois_domain::constants::{
    DOCUMENTS_PATH, DOCUMENT_STATE_PATH, DOCUMENT_TYPES_PATH, NOTIFICATIONS_PATH,
    SUBMISSIONS_PATH, TAXPAYER_VALIDATE_PATH,
};
use myinvois_domain::{
    validate_paging, AuthMode, AuthToken, ClientConfig, DocumentQuery, DocumentStateUpdate,
    DocumentSubmission, MyInvoisError, NotificationQuery, Result, TaxpayerIdType, Tin,
};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::executor::{BlockingRequestExecutor, RequestExecutor, RequestOptions};
use crate::auth::{build_store, HttpIdentityProvider, StoreTokenCache};
use crate::http::HttpClient;

/// Reject ids that would change the request path
fn path_segment<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MyInvoisError::validation_field(field, format!("{field} is required")));
    }
    if value.contains(['/', '?', '#']) {
        return Err(MyInvoisError::validation_field(
            field,
            format!("{field} contains invalid characters"),
        ));
    }
    Ok(value)
}

/// Client for the MyInvois e-invoicing API
pub struct MyInvoisClient {
    config: ClientConfig,
    session: Arc<AuthSession>,
    executor: RequestExecutor,
}

impl MyInvoisClient {
    /// Build a client with the configured cache backend and system clock
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` fails validation
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> MyInvoisClientBuilder {
        MyInvoisClientBuilder { config, clock: None, store: None }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Blocking executor sharing this client's session and cache
    pub fn blocking_executor(&self) -> Result<BlockingRequestExecutor> {
        BlockingRequestExecutor::new(self.executor.clone())
    }

    /// Fetch a fresh token for the current identity
    pub async fn authenticate(&self) -> Result<AuthToken> {
        self.session.authenticate().await
    }

    /// Act for taxpayer `tin` (intermediary mode only)
    ///
    /// Tokens held for the previous taxpayer are discarded.
    pub async fn on_behalf_of(&self, tin: &str) -> Result<&Self> {
        self.session.on_behalf_of(tin).await?;
        Ok(self)
    }

    /// Cached token check, no network call
    pub async fn has_valid_token(&self) -> Result<bool> {
        self.session.has_valid_token().await
    }

    /// Current access token, authenticating if needed
    pub async fn access_token(&self) -> Result<String> {
        self.session.get_access_token().await
    }

    /// Submit between 1 and 100 signed documents
    #[instrument(skip(self, submission), fields(documents = submission.documents.len()))]
    pub async fn submit_documents(&self, submission: &DocumentSubmission) -> Result<Value> {
        submission.validate()?;
        let body = serde_json::to_value(submission)
            .map_err(|err| MyInvoisError::internal(format!("Failed to encode submission: {err}")))?;

        let response =
            self.executor.execute(Method::POST, SUBMISSIONS_PATH, RequestOptions::json(body)).await?;
        info!(submission_uid = ?response.get("submissionUid"), "Documents submitted");
        Ok(response)
    }

    /// Status of a submission and its documents, one page at a time
    pub async fn get_submission(
        &self,
        submission_uid: &str,
        page_no: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Value> {
        let uid = path_segment("submissionUid", submission_uid)?;
        validate_paging(page_no, page_size)?;

        let mut query = Vec::new();
        if let Some(page_no) = page_no {
            query.push(("pageNo", page_no.to_string()));
        }
        if let Some(page_size) = page_size {
            query.push(("pageSize", page_size.to_string()));
        }
        self.executor
            .execute(Method::GET, &format!("{SUBMISSIONS_PATH}/{uid}"), RequestOptions::query(query))
            .await
    }

    /// Full document including its original payload
    pub async fn get_document(&self, uuid: &str) -> Result<Value> {
        let uuid = path_segment("uuid", uuid)?;
        self.executor
            .execute(Method::GET, &format!("{DOCUMENTS_PATH}/{uuid}/raw"), RequestOptions::new())
            .await
    }

    /// Document metadata with validation results
    pub async fn get_document_details(&self, uuid: &str) -> Result<Value> {
        let uuid = path_segment("uuid", uuid)?;
        self.executor
            .execute(Method::GET, &format!("{DOCUMENTS_PATH}/{uuid}/details"), RequestOptions::new())
            .await
    }

    /// Search documents; a submission or issue date window is required
    pub async fn search_documents(&self, query: &DocumentQuery) -> Result<Value> {
        query.validate_for_search()?;
        self.executor
            .execute(
                Method::GET,
                &format!("{DOCUMENTS_PATH}/search"),
                RequestOptions::query(query.to_query()),
            )
            .await
    }

    /// Documents received or issued in the last 31 days
    pub async fn get_recent_documents(&self, query: &DocumentQuery) -> Result<Value> {
        query.validate()?;
        self.executor
            .execute(
                Method::GET,
                &format!("{DOCUMENTS_PATH}/recent"),
                RequestOptions::query(query.to_query()),
            )
            .await
    }

    /// Cancel (issuer) or reject (buyer) a document
    #[instrument(skip(self, update), fields(status = %update.status))]
    pub async fn update_document_state(&self, uuid: &str, update: &DocumentStateUpdate) -> Result<Value> {
        let uuid = path_segment("uuid", uuid)?;
        update.validate()?;

        let body = json!({ "status": update.status, "reason": update.reason });
        self.executor
            .execute(
                Method::PUT,
                &format!("{DOCUMENT_STATE_PATH}/{uuid}/state"),
                RequestOptions::json(body),
            )
            .await
    }

    pub async fn cancel_document(&self, uuid: &str, reason: &str) -> Result<Value> {
        self.update_document_state(uuid, &DocumentStateUpdate::cancel(reason)).await
    }

    pub async fn reject_document(&self, uuid: &str, reason: &str) -> Result<Value> {
        self.update_document_state(uuid, &DocumentStateUpdate::reject(reason)).await
    }

    /// Whether `tin` is registered and matches the given identification
    ///
    /// A 404 from the API means "not valid" and is returned as `false`.
    pub async fn validate_taxpayer(
        &self,
        tin: &str,
        id_type: TaxpayerIdType,
        id_value: &str,
    ) -> Result<bool> {
        let tin = Tin::parse(tin)?;
        let id_value = path_segment("idValue", id_value)?;

        let query = vec![("idType", id_type.as_param().to_string()), ("idValue", id_value.to_string())];
        let result = self
            .executor
            .execute(
                Method::GET,
                &format!("{TAXPAYER_VALIDATE_PATH}/{}", tin.as_str()),
                RequestOptions::query(query),
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(MyInvoisError::Api { status: Some(404), .. }) => {
                debug!(tin = %tin, "taxpayer not found");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get_document_types(&self) -> Result<Value> {
        self.executor.execute(Method::GET, DOCUMENT_TYPES_PATH, RequestOptions::new()).await
    }

    /// Notifications for the authenticated taxpayer
    pub async fn get_notifications(&self, query: &NotificationQuery) -> Result<Value> {
        query.validate()?;
        self.executor
            .execute(Method::GET, NOTIFICATIONS_PATH, RequestOptions::query(query.to_query()))
            .await
    }
}

/// Builder for [`MyInvoisClient`] with test seams for time and storage
pub struct MyInvoisClientBuilder {
    config: ClientConfig,
    clock: Option<SharedClock>,
    store: Option<SharedStore>,
}

impl MyInvoisClientBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Cache backend to use instead of the one named in `cache.store`
    ///
    /// Ignored when `cache.enabled` is false.
    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<MyInvoisClient> {
        let config = self.config;
        config.validate()?;

        let http = HttpClient::from_settings(&config.http, &config.user_agent)?;
        let provider = Arc::new(HttpIdentityProvider::new(http.clone(), &config));
        let mut session =
            AuthSession::new(config.credentials.clone(), SessionSettings::from(&config), provider);

        let store = if config.cache.enabled {
            self.store.or_else(|| build_store(&config.cache))
        } else {
            None
        };
        if let Some(store) = store {
            let cache = StoreTokenCache::new(store).with_max_ttl(config.cache.ttl());
            debug!(backend = cache.backend_name(), "token cache enabled");
            session = session.with_cache(Arc::new(cache));
        }
        if let Some(clock) = self.clock {
            session = session.with_clock(clock);
        }

        let session = Arc::new(session);
        let auth: Arc<dyn AccessTokenProvider> = session.clone();
        let executor = RequestExecutor::new(http, auth, &config)?;

        if config.mode == AuthMode::Intermediary {
            debug!("intermediary mode: call on_behalf_of before making requests");
        }
        Ok(MyInvoisClient { config, session, executor })
    }
}

#[cfg(test)]
mod tests {
    use myinvois_domain::{Credentials, ErrorKind};

    use super::*;

    fn client() -> MyInvoisClient {
        let config = ClientConfig::new(Credentials::new("client", "secret"))
            .with_base_url("http://127.0.0.1:9");
        MyInvoisClient::new(config).unwrap()
    }

    #[test]
    fn path_segments_are_checked() {
        assert_eq!(path_segment("uuid", " ABC123 ").unwrap(), "ABC123");
        for bad in ["", "  ", "a/b", "a?b", "a#b"] {
            let err = path_segment("uuid", bad).unwrap_err();
            assert!(err.field_errors().unwrap().contains_key("uuid"), "{bad:?}");
        }
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let config = ClientConfig::new(Credentials::new("", "secret"));
        let err = MyInvoisClient::new(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    // Each of these would fail with a network error if validation let them through
    #[tokio::test]
    async fn invalid_input_never_reaches_the_network() {
        let client = client();

        let err = client.validate_taxpayer("D1234567890", TaxpayerIdType::Brn, "123").await.unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("tin"));

        let err = client.cancel_document("ABC", "   ").await.unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("reason"));

        let err = client.search_documents(&DocumentQuery::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = client.submit_documents(&DocumentSubmission::new(Vec::new())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = client.get_submission("SUB1", Some(0), None).await.unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("pageNo"));

        let err = client.get_document("../x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(!client.has_valid_token().await.unwrap());
    }

    #[tokio::test]
    async fn on_behalf_of_requires_intermediary_mode() {
        let client = client();
        let err = client.on_behalf_of("C1234567890").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
