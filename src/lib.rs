//! Lifecycle Fixtures
//!
//! Programs a stateful, WireMock-compatible mock server so that a client of a
//! cloud control-plane API sees a resource go through its whole lifecycle:
//! created, read, updated, read, deleted, gone. Every call against the same
//! URL is answered according to how far the scenario has progressed.
//!
//! # Features
//!
//! - **Scenario Chains**: Each step is a stub gated on the scenario's state
//! - **Templated Bodies**: Handlebars templates per resource kind, strict mode
//! - **Usage Scenarios**: Whole foundations created in dependency order
//! - **Power Operations**: Instance stop/start/restart between update and delete
//! - **SKU Lookups**: Read-only list and get chains
//! - **Offline Replay**: An in-memory server with the same matching rules
//!
//! # Example Parameters
//!
//! ```yaml
//! mock_url: http://localhost:8080
//! auth_token: test-token
//! tenant: t1
//! region: eu-central-1
//! resources:
//!   workspace:
//!     name: w1
//!     labels:
//!       env: test
//!     updated_labels:
//!       env: prod
//! ```

pub mod chain;
pub mod client;
pub mod composer;
pub mod config;
pub mod error;
pub mod memory;
pub mod paths;
pub mod registrar;
pub mod resource;
pub mod scenario;
pub mod spec;
pub mod stub;
pub mod template;

pub use client::{MockClient, WireMockClient};
pub use composer::{
    build_lifecycle, build_sku_lookup, build_usage, configure_lifecycle_scenario,
    configure_sku_scenario, configure_usage_scenario, UsagePlan,
};
pub use config::{FixtureConfig, ScenarioParams};
pub use error::{FixtureError, Result};
pub use memory::InMemoryMockServer;
pub use resource::ResourceKind;
pub use template::TemplateEngine;
