//! In-process stateful mock server.
//!
//! Holds registered stubs and per-scenario state, and resolves requests the
//! way the external server does: a stub matches when method, URL, headers,
//! query parameters and the scenario's current state all match. Among
//! matches the lowest priority wins, the most recently registered on ties.
//! A match moves the scenario to the stub's new state.

use crate::chain::STARTED;
use crate::client::MockClient;
use crate::error::RegistrationError;
use crate::stub::{HttpMethod, StubDefinition, UrlPattern, ValueMatcher};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Response produced for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
    /// Name of the stub that produced this response, if any matched
    pub stub: Option<String>,
}

impl ServedResponse {
    fn not_found() -> Self {
        Self {
            status: 404,
            headers: BTreeMap::new(),
            body: Some(serde_json::json!({
                "error": "not_found",
                "message": "No matching stub found"
            })),
            stub: None,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        self.stub.is_none()
    }
}

#[derive(Debug, Default)]
struct StubTable {
    stubs: Vec<StubDefinition>,
    states: HashMap<String, String>,
}

/// Stateful mock server living in the test process.
#[derive(Debug, Default)]
pub struct InMemoryMockServer {
    table: RwLock<StubTable>,
}

impl InMemoryMockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered stubs in registration order.
    pub async fn stubs(&self) -> Vec<StubDefinition> {
        self.table.read().await.stubs.clone()
    }

    /// Registered stubs of one scenario in registration order.
    pub async fn scenario_stubs(&self, scenario: &str) -> Vec<StubDefinition> {
        self.table
            .read()
            .await
            .stubs
            .iter()
            .filter(|s| s.scenario_name == scenario)
            .cloned()
            .collect()
    }

    /// Current state of a scenario (`Started` if never moved).
    pub async fn scenario_state(&self, scenario: &str) -> String {
        self.table
            .read()
            .await
            .states
            .get(scenario)
            .cloned()
            .unwrap_or_else(|| STARTED.to_string())
    }

    /// Serve one request. `target` is the path plus optional query string.
    pub async fn handle(
        &self,
        method: HttpMethod,
        target: &str,
        headers: &HashMap<String, String>,
    ) -> ServedResponse {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        let query_params = parse_query_string(query);

        let mut table = self.table.write().await;
        let StubTable { stubs, states } = &mut *table;

        let mut candidates: Vec<(usize, &StubDefinition)> = stubs
            .iter()
            .enumerate()
            .filter(|(_, stub)| {
                let state = states
                    .get(&stub.scenario_name)
                    .map(String::as_str)
                    .unwrap_or(STARTED);
                stub.required_scenario_state == state
                    && matches_request(stub, method, path, &query_params, headers)
            })
            .collect();
        // Lowest priority first, newest first on ties
        candidates.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then(b.0.cmp(&a.0)));

        let Some((_, stub)) = candidates.first() else {
            warn!(method = %method, path = %path, "No matching stub found");
            return ServedResponse::not_found();
        };

        debug!(
            scenario = %stub.scenario_name,
            from = %stub.required_scenario_state,
            to = %stub.new_scenario_state,
            "Request matched stub"
        );
        let served = ServedResponse {
            status: stub.response.status,
            headers: stub.response.headers.clone(),
            body: stub.response.json_body.clone(),
            stub: stub.name.clone().or_else(|| Some(stub.scenario_name.clone())),
        };
        states.insert(stub.scenario_name.clone(), stub.new_scenario_state.clone());
        served
    }
}

#[async_trait]
impl MockClient for InMemoryMockServer {
    async fn register_stub(&self, stub: &StubDefinition) -> Result<(), RegistrationError> {
        stub.validate().map_err(|e| RegistrationError::Rejected {
            operation: "register stub".to_string(),
            status: 422,
            body: e.to_string(),
        })?;
        self.table.write().await.stubs.push(stub.clone());
        Ok(())
    }

    async fn reset_scenarios(&self) -> Result<(), RegistrationError> {
        self.table.write().await.states.clear();
        Ok(())
    }
}

fn matches_request(
    stub: &StubDefinition,
    method: HttpMethod,
    path: &str,
    query_params: &HashMap<String, String>,
    headers: &HashMap<String, String>,
) -> bool {
    let request = &stub.request;
    if request.method != method {
        return false;
    }

    let UrlPattern::Path(expected) = &request.url;
    if path != expected {
        return false;
    }

    for (name, matcher) in &request.headers {
        // Case-insensitive header lookup
        let value = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str());
        if !matches_value(value, matcher) {
            return false;
        }
    }

    request
        .query_parameters
        .iter()
        .all(|(name, matcher)| matches_value(query_params.get(name).map(String::as_str), matcher))
}

fn matches_value(value: Option<&str>, matcher: &ValueMatcher) -> bool {
    match matcher {
        ValueMatcher::EqualTo(expected) => value == Some(expected.as_str()),
    }
}

/// Parse a query string into key-value pairs.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.insert(urlencoding_decode(key), urlencoding_decode(value));
        } else {
            params.insert(urlencoding_decode(part), String::new());
        }
    }

    params
}

/// Simple URL decoding.
fn urlencoding_decode(s: &str) -> String {
    let mut bytes = Vec::with_capacity(s.len());
    let mut iter = s.bytes();

    while let Some(b) = iter.next() {
        match b {
            b'%' => {
                let hex: Vec<u8> = iter.by_ref().take(2).collect();
                let decoded = std::str::from_utf8(&hex)
                    .ok()
                    .filter(|h| h.len() == 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match decoded {
                    Some(byte) => bytes.push(byte),
                    None => {
                        bytes.push(b'%');
                        bytes.extend_from_slice(&hex);
                    }
                }
            }
            b'+' => bytes.push(b' '),
            other => bytes.push(other),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}
