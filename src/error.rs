//! Error types for fixture generation.
//!
//! Every composer returns the first error it hits and abandons the rest of
//! the chain. Nothing here is retried.

use thiserror::Error;

/// Top-level error returned by composers and the configurator.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Rendering a response body failed.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{template}' references missing field '{path}'")]
    MissingField { template: String, path: String },

    #[error("template '{template}' rendered invalid JSON: {source}")]
    InvalidJson {
        template: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("template '{0}' is not registered")]
    UnknownTemplate(String),

    #[error("template '{template}' failed to compile: {source}")]
    Compile {
        template: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("template '{template}' failed to render: {source}")]
    Render {
        template: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("response object could not be serialized: {0}")]
    Context(#[source] serde_json::Error),
}

/// The mock server rejected a command or could not be reached.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("mock server unreachable at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("mock server rejected {operation} with status {status}: {body}")]
    Rejected {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("invalid mock server url '{0}'")]
    InvalidUrl(String),
}

/// A response object or scenario parameter is incomplete.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} is missing required field '{field}'")]
    MissingField { kind: String, field: String },

    #[error("scenario parameter '{0}' is required")]
    MissingParameter(String),

    #[error("{kind} '{field}' has invalid value: {reason}")]
    InvalidValue {
        kind: String,
        field: String,
        reason: String,
    },

    #[error("{kind} depends on {dependency}, which is not part of the plan")]
    MissingDependency { kind: String, dependency: String },
}

/// A state transition would break the single-path scenario invariant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("scenario '{scenario}' already has a {method} {url} stub in state '{state}'")]
    AmbiguousStub {
        scenario: String,
        method: String,
        url: String,
        state: String,
    },

    #[error("scenario '{scenario}' state '{state}' is never entered by an earlier transition")]
    Unreachable { scenario: String, state: String },

    #[error("scenario '{scenario}' state '{state}' already leads to '{existing}'")]
    Divergent {
        scenario: String,
        state: String,
        existing: String,
    },

    #[error("scenario '{scenario}' expected {expected} but got {actual}")]
    Unplanned {
        scenario: String,
        expected: String,
        actual: String,
    },
}

pub type Result<T, E = FixtureError> = std::result::Result<T, E>;

impl ValidationError {
    pub(crate) fn missing(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            kind: kind.into(),
            field: field.into(),
        }
    }
}
