//! Configuration for fixture generation.
//!
//! Two documents drive a build: [`FixtureConfig`] holds the constants shared by
//! every scenario (state names, providers, priorities, clock), and
//! [`ScenarioParams`] names the mock server, the tenant and the resources to
//! walk through their lifecycle.

use crate::error::ValidationError;
use crate::resource::{ProviderFamily, ResourceKind, ResourceSpec};
use crate::spec::{
    BlockStorageSpec, ImageSpec, InstanceSpec, InternetGatewaySpec, NetworkSpec, NicSpec,
    PublicIpSpec, RoleAssignmentSpec, RoleSpec, RouteTableSpec, SecurityGroupSpec, SkuSpec,
    SubnetSpec, WorkspaceSpec,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Constants shared by every scenario build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixtureConfig {
    /// API version segment in paths and `metadata.apiVersion`
    pub api_version: String,

    /// Status state names
    pub states: StateNames,

    /// Provider names per family
    pub providers: Providers,

    /// Stub priorities
    pub priorities: Priorities,

    /// Content type of rendered bodies
    pub content_type: String,

    /// Timestamp source
    pub clock: ClockSettings,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            api_version: "v1".to_string(),
            states: StateNames::default(),
            providers: Providers::default(),
            priorities: Priorities::default(),
            content_type: "application/json".to_string(),
            clock: ClockSettings::default(),
        }
    }
}

impl FixtureConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version.is_empty() {
            anyhow::bail!("api_version cannot be empty");
        }
        if self.content_type.is_empty() {
            anyhow::bail!("content_type cannot be empty");
        }
        self.states.validate()?;
        self.providers.validate()?;
        Ok(())
    }
}

/// Values of `status.state` at each lifecycle step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateNames {
    pub creating: String,
    pub active: String,
    pub updating: String,
    pub deleting: String,
}

impl Default for StateNames {
    fn default() -> Self {
        Self {
            creating: "creating".to_string(),
            active: "active".to_string(),
            updating: "updating".to_string(),
            deleting: "deleting".to_string(),
        }
    }
}

impl StateNames {
    fn validate(&self) -> anyhow::Result<()> {
        let names = [&self.creating, &self.active, &self.updating, &self.deleting];
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                anyhow::bail!("State names cannot be empty");
            }
            if names[..i].contains(name) {
                anyhow::bail!("Duplicate state name: {}", name);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Providers {
    pub authorization: String,
    pub workspace: String,
    pub compute: String,
    pub storage: String,
    pub network: String,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            authorization: "seca.authorization".to_string(),
            workspace: "seca.workspace".to_string(),
            compute: "seca.compute".to_string(),
            storage: "seca.storage".to_string(),
            network: "seca.network".to_string(),
        }
    }
}

impl Providers {
    pub fn name(&self, family: ProviderFamily) -> &str {
        match family {
            ProviderFamily::Authorization => &self.authorization,
            ProviderFamily::Workspace => &self.workspace,
            ProviderFamily::Compute => &self.compute,
            ProviderFamily::Storage => &self.storage,
            ProviderFamily::Network => &self.network,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        for name in [
            &self.authorization,
            &self.workspace,
            &self.compute,
            &self.storage,
            &self.network,
        ] {
            if name.is_empty() {
                anyhow::bail!("Provider names cannot be empty");
            }
        }
        Ok(())
    }
}

/// Stub priorities (lower = matched first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Priorities {
    /// Single-resource endpoints
    pub resource: u32,
    /// Collection endpoints
    pub list: u32,
    /// Action endpoints (`stop`, `start`, `restart`)
    pub action: u32,
}

impl Default for Priorities {
    fn default() -> Self {
        Self {
            resource: 1,
            list: 2,
            action: 1,
        }
    }
}

/// Deterministic clock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockSettings {
    /// Timestamp of the first registered stub
    pub epoch: DateTime<Utc>,
    /// Seconds added per registered stub
    pub step_seconds: u32,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            epoch: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
            step_seconds: 60,
        }
    }
}

/// Parameters for one scenario build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioParams {
    /// Base URL of the mock server (`http://localhost:8080`)
    pub mock_url: String,

    /// Bearer token every stub requires
    pub auth_token: String,

    pub tenant: String,

    pub region: String,

    /// Resources to walk through their lifecycle
    #[serde(default)]
    pub resources: ResourceSet,

    /// SKUs served by the lookup scenario
    #[serde(default)]
    pub skus: Vec<SkuParams>,

    /// Collection query constraints
    #[serde(default)]
    pub list: ListSelector,
}

impl ScenarioParams {
    /// Load parameters from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let params: Self = serde_yaml::from_str(&content)?;
        params.validate()?;
        Ok(params)
    }

    /// Validate the top-level fields and every resource that is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("mock_url", &self.mock_url),
            ("auth_token", &self.auth_token),
            ("tenant", &self.tenant),
            ("region", &self.region),
        ] {
            if value.is_empty() {
                return Err(ValidationError::MissingParameter(name.to_string()));
            }
        }
        self.resources.validate()?;
        for sku in &self.skus {
            if sku.name.is_empty() {
                return Err(ValidationError::missing("sku", "metadata.name"));
            }
            sku.spec.validate()?;
        }
        self.list.validate()?;
        Ok(())
    }

    /// Workspace that workspace-scoped resources live in.
    pub fn workspace_name(&self) -> Option<&str> {
        self.resources.workspace.as_ref().map(|w| w.name.as_str())
    }

    /// Network that network-scoped resources live in.
    pub fn network_name(&self) -> Option<&str> {
        self.resources.network.as_ref().map(|n| n.name.as_str())
    }
}

/// Per-kind resource parameters; absent kinds are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceSet {
    pub role: Option<ResourceParams<RoleSpec>>,
    pub role_assignment: Option<ResourceParams<RoleAssignmentSpec>>,
    pub workspace: Option<ResourceParams<WorkspaceSpec>>,
    pub image: Option<ResourceParams<ImageSpec>>,
    pub block_storage: Option<ResourceParams<BlockStorageSpec>>,
    pub network: Option<ResourceParams<NetworkSpec>>,
    pub internet_gateway: Option<ResourceParams<InternetGatewaySpec>>,
    pub route_table: Option<ResourceParams<RouteTableSpec>>,
    pub subnet: Option<ResourceParams<SubnetSpec>>,
    pub security_group: Option<ResourceParams<SecurityGroupSpec>>,
    pub public_ip: Option<ResourceParams<PublicIpSpec>>,
    pub nic: Option<ResourceParams<NicSpec>>,
    pub instance: Option<ResourceParams<InstanceSpec>>,
}

impl ResourceSet {
    /// Kinds that have parameters, in dependency order.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::DEPENDENCY_ORDER
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Role => self.role.is_some(),
            ResourceKind::RoleAssignment => self.role_assignment.is_some(),
            ResourceKind::Workspace => self.workspace.is_some(),
            ResourceKind::Image => self.image.is_some(),
            ResourceKind::BlockStorage => self.block_storage.is_some(),
            ResourceKind::Network => self.network.is_some(),
            ResourceKind::InternetGateway => self.internet_gateway.is_some(),
            ResourceKind::RouteTable => self.route_table.is_some(),
            ResourceKind::Subnet => self.subnet.is_some(),
            ResourceKind::SecurityGroup => self.security_group.is_some(),
            ResourceKind::PublicIp => self.public_ip.is_some(),
            ResourceKind::Nic => self.nic.is_some(),
            ResourceKind::Instance => self.instance.is_some(),
            ResourceKind::Sku => false,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        fn check<S: ResourceSpec>(params: &Option<ResourceParams<S>>) -> Result<(), ValidationError> {
            match params {
                Some(params) => params.validate(),
                None => Ok(()),
            }
        }
        check(&self.role)?;
        check(&self.role_assignment)?;
        check(&self.workspace)?;
        check(&self.image)?;
        check(&self.block_storage)?;
        check(&self.network)?;
        check(&self.internet_gateway)?;
        check(&self.route_table)?;
        check(&self.subnet)?;
        check(&self.security_group)?;
        check(&self.public_ip)?;
        check(&self.nic)?;
        check(&self.instance)
    }
}

/// One resource: its name plus the values before and after the update step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceParams<S> {
    pub name: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Labels after the update step (unchanged when absent)
    #[serde(default)]
    pub updated_labels: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub initial: S,

    /// Spec after the update step (unchanged when absent)
    #[serde(default)]
    pub updated: Option<S>,
}

impl<S: ResourceSpec> ResourceParams<S> {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::missing(S::KIND.as_str(), "metadata.name"));
        }
        self.initial.validate()?;
        if let Some(updated) = &self.updated {
            updated.validate()?;
        }
        Ok(())
    }

    pub fn updated_spec(&self) -> S {
        self.updated.clone().unwrap_or_else(|| self.initial.clone())
    }

    pub fn final_labels(&self) -> BTreeMap<String, String> {
        self.updated_labels
            .clone()
            .unwrap_or_else(|| self.labels.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkuParams {
    pub name: String,

    #[serde(default = "default_sku_family")]
    pub family: ProviderFamily,

    pub spec: SkuSpec,
}

fn default_sku_family() -> ProviderFamily {
    ProviderFamily::Compute
}

/// Query constraints applied to collection stubs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListSelector {
    /// Page size (`limit` query parameter)
    pub limit: Option<u32>,
    /// Label filter (`labels` query parameter, `k=v` joined by commas)
    pub labels: BTreeMap<String, String>,
}

impl ListSelector {
    /// Label keys must be non-empty. Keys and values must not contain the
    /// `=` or `,` separators of the `labels` query value.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (key, value) in &self.labels {
            let reason = if key.is_empty() {
                Some("label key cannot be empty".to_string())
            } else if key.contains(['=', ',']) || value.contains(['=', ',']) {
                Some(format!("label '{}={}' contains '=' or ','", key, value))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ValidationError::InvalidValue {
                    kind: "list".to_string(),
                    field: "labels".to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// The `labels` query value, if any labels are set.
    pub fn label_query(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}
