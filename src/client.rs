//! Mock server control clients.
//!
//! [`MockClient`] is the control protocol the fixtures need: register a stub
//! and reset scenario state. [`WireMockClient`] speaks it over HTTP to a
//! WireMock-compatible admin API.

use crate::error::RegistrationError;
use crate::stub::StubDefinition;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Control operations issued to a stateful mock server.
#[async_trait]
pub trait MockClient: Send + Sync {
    /// Add one stub to the server's stub table.
    async fn register_stub(&self, stub: &StubDefinition) -> Result<(), RegistrationError>;

    /// Return every scenario to its initial state.
    async fn reset_scenarios(&self) -> Result<(), RegistrationError>;
}

/// HTTP client for a WireMock-compatible admin API.
#[derive(Debug, Clone)]
pub struct WireMockClient {
    base_url: String,
    http: reqwest::Client,
}

impl WireMockClient {
    /// Create a client for the server at `base_url` (`http://host:port`).
    pub fn new(base_url: &str) -> Result<Self, RegistrationError> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RegistrationError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| RegistrationError::Transport {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            base_url: base_url.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}/__admin/{}", self.base_url, path)
    }

    async fn post(
        &self,
        operation: &str,
        path: &str,
        body: Option<&StubDefinition>,
    ) -> Result<(), RegistrationError> {
        let url = self.admin_url(path);
        let request = self.http.post(&url);
        let request = match body {
            Some(stub) => request.json(stub),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|source| RegistrationError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrationError::Rejected {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(operation, url = %url, status = status.as_u16(), "Mock server accepted command");
        Ok(())
    }
}

#[async_trait]
impl MockClient for WireMockClient {
    async fn register_stub(&self, stub: &StubDefinition) -> Result<(), RegistrationError> {
        self.post("register stub", "mappings", Some(stub)).await
    }

    async fn reset_scenarios(&self) -> Result<(), RegistrationError> {
        self.post("reset scenarios", "scenarios/reset", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{HttpMethod, RequestPattern, ResponseDefinition, UrlPattern};
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stub() -> StubDefinition {
        StubDefinition {
            name: None,
            scenario_name: "ws".to_string(),
            required_scenario_state: "Started".to_string(),
            new_scenario_state: "State.1".to_string(),
            priority: 1,
            request: RequestPattern {
                method: HttpMethod::Get,
                url: UrlPattern::Path("/w1".to_string()),
                headers: BTreeMap::new(),
                query_parameters: BTreeMap::new(),
            },
            response: ResponseDefinition {
                status: 200,
                headers: BTreeMap::new(),
                json_body: None,
            },
        }
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(matches!(
            WireMockClient::new("localhost:8080"),
            Err(RegistrationError::InvalidUrl(_))
        ));
        let client = WireMockClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_register_posts_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/__admin/mappings"))
            .and(body_partial_json(serde_json::json!({
                "scenarioName": "ws",
                "requiredScenarioState": "Started",
                "newScenarioState": "State.1"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = WireMockClient::new(&server.uri()).unwrap();
        client.register_stub(&stub()).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_scenarios() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/__admin/scenarios/reset"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = WireMockClient::new(&server.uri()).unwrap();
        client.reset_scenarios().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_stub_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/__admin/mappings"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad mapping"))
            .mount(&server)
            .await;

        let client = WireMockClient::new(&server.uri()).unwrap();
        match client.register_stub(&stub()).await {
            Err(RegistrationError::Rejected { status, body, .. }) => {
                assert_eq!(status, 422);
                assert_eq!(body, "bad mapping");
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = WireMockClient::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            client.reset_scenarios().await,
            Err(RegistrationError::Transport { .. })
        ));
    }
}
