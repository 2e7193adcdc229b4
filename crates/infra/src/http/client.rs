use std::time::Duration;

use myinvois_domain::{HttpSettings, MyInvoisError};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;

use crate::errors::InfraError;

/// HTTP client with timeouts applied to every request.
///
/// Retries are not handled here; callers decide which failures are worth
/// another attempt.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Default timeouts, no user agent
    pub fn new() -> Result<Self, MyInvoisError> {
        Self::builder().build()
    }

    /// Timeouts from the `http` config section
    pub fn from_settings(settings: &HttpSettings, user_agent: &str) -> Result<Self, MyInvoisError> {
        Self::builder()
            .timeout(settings.timeout())
            .connect_timeout(settings.connect_timeout())
            .user_agent(user_agent)
            .build()
    }

    pub fn request(&self, method: Method, url: impl reqwest::IntoUrl) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a request once; any response, whatever its status, is `Ok`.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, MyInvoisError> {
        let request = builder.build().map_err(|err| MyInvoisError::from(InfraError::from(err)))?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                debug!(%method, %url, status = %response.status(), "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, %url, error = %err, "HTTP request failed");
                Err(InfraError::from(err).into())
            }
        }
    }
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: Option<String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        let settings = HttpSettings::default();
        Self {
            timeout: settings.timeout(),
            connect_timeout: settings.connect_timeout(),
            user_agent: None,
        }
    }
}

impl HttpClientBuilder {
    /// Total time allowed for a request, body included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<HttpClient, MyInvoisError> {
        let builder = ReqwestClient::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .no_proxy();
        let builder = match self.user_agent {
            Some(agent) => builder.user_agent(agent),
            None => builder,
        };

        let client = builder
            .build()
            .map_err(|err| MyInvoisError::config(format!("Failed to build HTTP client: {err}")))?;

        Ok(HttpClient { client })
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use myinvois_domain::ErrorKind;
    use reqwest::StatusCode;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn returns_error_statuses_as_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().expect("http client");
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn sends_configured_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "myinvois-test/1.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::from_settings(&HttpSettings::default(), "myinvois-test/1.0")
            .expect("http client");
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn times_out_slow_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client =
            HttpClient::builder().timeout(Duration::from_millis(50)).build().expect("http client");
        let err = client.send(client.request(Method::GET, server.uri())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn connection_failure_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED

        let client = HttpClient::new().expect("http client");
        let err = client
            .send(client.request(Method::GET, format!("http://{addr}")))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
