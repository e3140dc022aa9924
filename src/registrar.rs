//! Stub registration.
//!
//! Turns one lifecycle step into one conditional stub: the request must carry
//! the scenario's bearer token and arrive while the scenario is in the
//! expected state; the response body is rendered from the response object.

use crate::client::MockClient;
use crate::config::{FixtureConfig, ScenarioParams};
use crate::error::Result;
use crate::resource::Renderable;
use crate::stub::{
    HttpMethod, RequestPattern, ResponseDefinition, StubDefinition, UrlPattern, ValueMatcher,
};
use crate::template::TemplateEngine;
use std::collections::BTreeMap;
use tracing::debug;

/// Everything one stub needs besides its method.
pub struct StubCall<'r> {
    pub scenario: &'r str,
    pub url: UrlPattern,
    pub current: &'r str,
    pub next: &'r str,
    pub status: u16,
    pub priority: u32,
    pub response: Option<&'r dyn Renderable>,
}

/// Registers stubs with a mock server on behalf of one scenario build.
pub struct StubRegistrar<'a> {
    client: &'a dyn MockClient,
    engine: &'a TemplateEngine,
    authorization: String,
    content_type: String,
}

impl<'a> StubRegistrar<'a> {
    pub fn new(
        client: &'a dyn MockClient,
        engine: &'a TemplateEngine,
        params: &ScenarioParams,
        config: &FixtureConfig,
    ) -> Self {
        Self {
            client,
            engine,
            authorization: format!("Bearer {}", params.auth_token),
            content_type: config.content_type.clone(),
        }
    }

    pub fn engine(&self) -> &TemplateEngine {
        self.engine
    }

    pub async fn put(&self, call: StubCall<'_>) -> Result<StubDefinition> {
        self.register(HttpMethod::Put, call, BTreeMap::new(), true).await
    }

    pub async fn post(&self, call: StubCall<'_>) -> Result<StubDefinition> {
        self.register(HttpMethod::Post, call, BTreeMap::new(), true).await
    }

    pub async fn get(&self, call: StubCall<'_>) -> Result<StubDefinition> {
        self.register(HttpMethod::Get, call, BTreeMap::new(), true).await
    }

    /// Collection read with extra query constraints (`limit`, `labels`).
    pub async fn get_list(
        &self,
        call: StubCall<'_>,
        query: BTreeMap<String, ValueMatcher>,
    ) -> Result<StubDefinition> {
        self.register(HttpMethod::Get, call, query, true).await
    }

    /// Read of a resource that no longer exists; never carries a body.
    pub async fn get_not_found(&self, call: StubCall<'_>) -> Result<StubDefinition> {
        self.register(HttpMethod::Get, call, BTreeMap::new(), false).await
    }

    /// Deletion acknowledgement; never carries a body.
    pub async fn delete(&self, call: StubCall<'_>) -> Result<StubDefinition> {
        self.register(HttpMethod::Delete, call, BTreeMap::new(), false).await
    }

    async fn register(
        &self,
        method: HttpMethod,
        call: StubCall<'_>,
        query_parameters: BTreeMap<String, ValueMatcher>,
        with_body: bool,
    ) -> Result<StubDefinition> {
        let json_body = match call.response {
            Some(data) if with_body => self.engine.render(data)?,
            _ => None,
        };

        let mut response_headers = BTreeMap::new();
        if json_body.is_some() {
            response_headers.insert("Content-Type".to_string(), self.content_type.clone());
        }

        let mut headers = BTreeMap::new();
        headers.insert(
            "Authorization".to_string(),
            ValueMatcher::EqualTo(self.authorization.clone()),
        );

        let stub = StubDefinition {
            name: Some(format!("{}:{}->{}", call.scenario, call.current, call.next)),
            scenario_name: call.scenario.to_string(),
            required_scenario_state: call.current.to_string(),
            new_scenario_state: call.next.to_string(),
            priority: call.priority,
            request: RequestPattern {
                method,
                url: call.url,
                headers,
                query_parameters,
            },
            response: ResponseDefinition {
                status: call.status,
                headers: response_headers,
                json_body,
            },
        };

        self.client.register_stub(&stub).await?;
        debug!(
            scenario = %stub.scenario_name,
            method = %method,
            url = %stub.request.url,
            current = %stub.required_scenario_state,
            next = %stub.new_scenario_state,
            status = stub.response.status,
            "Registered stub"
        );
        Ok(stub)
    }
}
