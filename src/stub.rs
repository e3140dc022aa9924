//! Stub definitions in the mock server's mapping format.
//!
//! A [`StubDefinition`] serializes directly to the JSON accepted by a
//! WireMock-compatible `/__admin/mappings` endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One conditional stub: request match, scenario gate and canned response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubDefinition {
    /// Human readable name (`scenario:current->next`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Scenario this stub belongs to
    pub scenario_name: String,

    /// State the scenario must be in for the stub to match
    pub required_scenario_state: String,

    /// State the scenario moves to once the stub matched
    pub new_scenario_state: String,

    /// Priority (lower = matched first)
    pub priority: u32,

    /// Request matcher
    pub request: RequestPattern,

    /// Response to return
    pub response: ResponseDefinition,
}

impl StubDefinition {
    /// Validate the stub definition before it is submitted.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scenario_name.is_empty() {
            anyhow::bail!("Stub scenario name cannot be empty");
        }
        if self.required_scenario_state.is_empty() || self.new_scenario_state.is_empty() {
            anyhow::bail!("Stub scenario states cannot be empty");
        }
        self.request.validate()?;
        self.response.validate()?;
        Ok(())
    }
}

/// HTTP methods a stub can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request matching configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPattern {
    /// HTTP method to match
    pub method: HttpMethod,

    /// Path matching
    #[serde(flatten)]
    pub url: UrlPattern,

    /// Header matching
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub headers: BTreeMap<String, ValueMatcher>,

    /// Query parameter matching
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub query_parameters: BTreeMap<String, ValueMatcher>,
}

impl RequestPattern {
    /// Validate the request matcher.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.url.validate()?;
        for name in self.headers.keys().chain(self.query_parameters.keys()) {
            if name.trim().is_empty() {
                anyhow::bail!("Matcher name cannot be empty");
            }
        }
        Ok(())
    }
}

/// Path matching configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlPattern {
    /// Exact path match, query string ignored
    #[serde(rename = "urlPath")]
    Path(String),
}

impl UrlPattern {
    pub fn as_str(&self) -> &str {
        match self {
            UrlPattern::Path(p) => p,
        }
    }

    /// Validate the path matcher.
    pub fn validate(&self) -> anyhow::Result<()> {
        let UrlPattern::Path(path) = self;
        if !path.starts_with('/') {
            anyhow::bail!("Path must start with '/': {}", path);
        }
        Ok(())
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header or query parameter matcher, written as a single-key map
/// (`{"equalTo": "..."}`) in both JSON and YAML.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueMatcher {
    /// Exact value match
    EqualTo(String),
}

/// Response definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDefinition {
    /// HTTP status code
    pub status: u16,

    /// Response headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Rendered JSON body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_body: Option<serde_json::Value>,
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status < 100 || self.status > 599 {
            anyhow::bail!("Invalid status code: {}", self.status);
        }
        Ok(())
    }
}
