//! Typed response objects.
//!
//! Every control-plane resource is served as the same envelope (labels,
//! annotations, extensions, metadata, spec, status). The envelope is generic
//! over a per-kind spec; the configurator mutates it in place between stubs.

use crate::config::FixtureConfig;
use crate::error::{TemplateError, ValidationError};
use crate::paths::Locator;
use crate::stub::HttpMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Resource kinds the fixtures know how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Role,
    RoleAssignment,
    Workspace,
    Image,
    BlockStorage,
    Network,
    InternetGateway,
    RouteTable,
    Subnet,
    SecurityGroup,
    PublicIp,
    Nic,
    Instance,
    Sku,
}

/// Provider family a kind is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    Authorization,
    Workspace,
    Compute,
    Storage,
    Network,
}

/// Where a kind lives in the resource hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `tenants/{t}/...`
    Tenant,
    /// `tenants/{t}/workspaces/{w}/...`
    Workspace,
    /// `tenants/{t}/workspaces/{w}/networks/{n}/...`
    Network,
}

impl ResourceKind {
    /// Canonical creation order for composite scenarios.
    pub const DEPENDENCY_ORDER: [ResourceKind; 13] = [
        ResourceKind::Role,
        ResourceKind::RoleAssignment,
        ResourceKind::Workspace,
        ResourceKind::Image,
        ResourceKind::BlockStorage,
        ResourceKind::Network,
        ResourceKind::InternetGateway,
        ResourceKind::RouteTable,
        ResourceKind::Subnet,
        ResourceKind::SecurityGroup,
        ResourceKind::PublicIp,
        ResourceKind::Nic,
        ResourceKind::Instance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Role => "role",
            ResourceKind::RoleAssignment => "role-assignment",
            ResourceKind::Workspace => "workspace",
            ResourceKind::Image => "image",
            ResourceKind::BlockStorage => "block-storage",
            ResourceKind::Network => "network",
            ResourceKind::InternetGateway => "internet-gateway",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::PublicIp => "public-ip",
            ResourceKind::Nic => "nic",
            ResourceKind::Instance => "instance",
            ResourceKind::Sku => "sku",
        }
    }

    /// Collection segment in resource paths.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Role => "roles",
            ResourceKind::RoleAssignment => "role-assignments",
            ResourceKind::Workspace => "workspaces",
            ResourceKind::Image => "images",
            ResourceKind::BlockStorage => "block-storages",
            ResourceKind::Network => "networks",
            ResourceKind::InternetGateway => "internet-gateways",
            ResourceKind::RouteTable => "route-tables",
            ResourceKind::Subnet => "subnets",
            ResourceKind::SecurityGroup => "security-groups",
            ResourceKind::PublicIp => "public-ips",
            ResourceKind::Nic => "nics",
            ResourceKind::Instance => "instances",
            ResourceKind::Sku => "skus",
        }
    }

    /// Name used in explicit state labels (`CreateRouteTable`).
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Role => "Role",
            ResourceKind::RoleAssignment => "RoleAssignment",
            ResourceKind::Workspace => "Workspace",
            ResourceKind::Image => "Image",
            ResourceKind::BlockStorage => "BlockStorage",
            ResourceKind::Network => "Network",
            ResourceKind::InternetGateway => "InternetGateway",
            ResourceKind::RouteTable => "RouteTable",
            ResourceKind::Subnet => "Subnet",
            ResourceKind::SecurityGroup => "SecurityGroup",
            ResourceKind::PublicIp => "PublicIp",
            ResourceKind::Nic => "Nic",
            ResourceKind::Instance => "Instance",
            ResourceKind::Sku => "Sku",
        }
    }

    pub fn family(&self) -> ProviderFamily {
        match self {
            ResourceKind::Role | ResourceKind::RoleAssignment => ProviderFamily::Authorization,
            ResourceKind::Workspace => ProviderFamily::Workspace,
            ResourceKind::Instance | ResourceKind::Sku => ProviderFamily::Compute,
            ResourceKind::Image | ResourceKind::BlockStorage => ProviderFamily::Storage,
            ResourceKind::Network
            | ResourceKind::InternetGateway
            | ResourceKind::RouteTable
            | ResourceKind::Subnet
            | ResourceKind::SecurityGroup
            | ResourceKind::PublicIp
            | ResourceKind::Nic => ProviderFamily::Network,
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            ResourceKind::Role
            | ResourceKind::RoleAssignment
            | ResourceKind::Workspace
            | ResourceKind::Image
            | ResourceKind::Sku => Scope::Tenant,
            ResourceKind::RouteTable | ResourceKind::Subnet => Scope::Network,
            _ => Scope::Workspace,
        }
    }

    /// Kinds that must exist before this one can be created.
    pub fn dependencies(&self) -> &'static [ResourceKind] {
        match self {
            ResourceKind::RoleAssignment => &[ResourceKind::Role],
            ResourceKind::BlockStorage
            | ResourceKind::Network
            | ResourceKind::InternetGateway
            | ResourceKind::SecurityGroup
            | ResourceKind::PublicIp => &[ResourceKind::Workspace],
            ResourceKind::RouteTable | ResourceKind::Subnet => &[ResourceKind::Network],
            ResourceKind::Nic => &[ResourceKind::Subnet],
            ResourceKind::Instance => &[ResourceKind::BlockStorage],
            _ => &[],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::DEPENDENCY_ORDER
            .iter()
            .chain(std::iter::once(&ResourceKind::Sku))
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| ValidationError::InvalidValue {
                kind: "resource".to_string(),
                field: "kind".to_string(),
                reason: format!("unknown resource kind '{}'", s),
            })
    }
}

/// Resource metadata as served on the wire.
///
/// Optional fields serialize as `null` so templates can reference them in
/// strict mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    pub provider: String,
    pub resource: String,
    pub verb: String,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub resource_version: u64,
    pub api_version: String,
    pub kind: String,
    pub tenant: String,
    pub workspace: Option<String>,
    pub region: Option<String>,
    pub network: Option<String>,
}

/// One entry in the status condition history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub state: String,
    pub last_transition_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub state: String,
    pub conditions: Vec<Condition>,
}

/// Per-kind spec payload.
pub trait ResourceSpec: Serialize + Clone + fmt::Debug + Send + Sync {
    const KIND: ResourceKind;

    /// Reject specs missing fields the API requires.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Something the template engine can render.
///
/// Implementations expose their data as a JSON context; templates address it
/// by dotted path (`metadata.resourceVersion`, `spec.cidr.ipv4`).
pub trait Renderable {
    /// Name of the registered template for this value.
    fn template_name(&self) -> &str;

    /// Data the template is rendered against.
    fn to_context(&self) -> Result<Value, TemplateError>;

    /// Look a field up by dotted path.
    fn field_at(&self, path: &str) -> Option<Value> {
        let context = self.to_context().ok()?;
        lookup(&context, path).cloned()
    }
}

/// Resolve a dotted path (`a.b.0.c`) inside a JSON value.
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Mutations the configurator applies between lifecycle steps.
pub trait LifecycleObject {
    /// Record the HTTP verb that produced this snapshot.
    fn set_verb(&mut self, verb: HttpMethod);

    /// Mark the object as freshly created at `at`.
    fn mark_created(&mut self, at: DateTime<Utc>);

    /// Record a modification at `at`.
    fn touch(&mut self, at: DateTime<Utc>);

    fn bump_version(&mut self);

    fn set_state(&mut self, state: &str, at: DateTime<Utc>);

    fn resource_version(&self) -> u64;
}

/// A response object the configurator can both mutate and render.
pub trait ResponseObject: LifecycleObject + Renderable + Send + Sync {
    fn as_renderable(&self) -> &dyn Renderable;
}

impl<T: LifecycleObject + Renderable + Send + Sync> ResponseObject for T {
    fn as_renderable(&self) -> &dyn Renderable {
        self
    }
}

/// A full response object for one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceResponse<S> {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub extensions: BTreeMap<String, String>,
    pub metadata: Metadata,
    pub spec: S,
    pub status: Status,
}

impl<S: ResourceSpec> ResourceResponse<S> {
    pub fn kind(&self) -> ResourceKind {
        S::KIND
    }
}

impl<S: ResourceSpec> Renderable for ResourceResponse<S> {
    fn template_name(&self) -> &str {
        S::KIND.as_str()
    }

    fn to_context(&self) -> Result<Value, TemplateError> {
        serde_json::to_value(self).map_err(TemplateError::Context)
    }
}

impl<S: ResourceSpec> LifecycleObject for ResourceResponse<S> {
    fn set_verb(&mut self, verb: HttpMethod) {
        self.metadata.verb = verb.as_str().to_string();
    }

    fn mark_created(&mut self, at: DateTime<Utc>) {
        self.metadata.created_at = at;
        self.metadata.last_modified_at = at;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.metadata.last_modified_at = at;
    }

    fn bump_version(&mut self) {
        self.metadata.resource_version += 1;
    }

    fn set_state(&mut self, state: &str, at: DateTime<Utc>) {
        if self.status.state != state {
            self.status.conditions.push(Condition {
                state: state.to_string(),
                last_transition_at: at,
            });
        }
        self.status.state = state.to_string();
    }

    fn resource_version(&self) -> u64 {
        self.metadata.resource_version
    }
}

/// Metadata for a list response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    pub provider: String,
    pub resource: String,
    pub verb: String,
}

/// A collection body: items are already-rendered resource bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResponse {
    pub items: Vec<Value>,
    pub metadata: ListMetadata,
}

impl Renderable for ListResponse {
    fn template_name(&self) -> &str {
        "list"
    }

    fn to_context(&self) -> Result<Value, TemplateError> {
        serde_json::to_value(self).map_err(TemplateError::Context)
    }
}

/// Assembles a [`ResourceResponse`] for a located resource.
pub struct ResponseBuilder<'a, S> {
    locator: &'a Locator,
    config: &'a FixtureConfig,
    name: String,
    region: Option<String>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    spec: Option<S>,
}

impl<'a, S: ResourceSpec> ResponseBuilder<'a, S> {
    pub fn new(locator: &'a Locator, config: &'a FixtureConfig, name: impl Into<String>) -> Self {
        Self {
            locator,
            config,
            name: name.into(),
            region: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            spec: None,
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn spec(mut self, spec: S) -> Self {
        self.spec = Some(spec);
        self
    }

    pub fn build(self) -> Result<ResourceResponse<S>, ValidationError> {
        let kind = S::KIND.as_str();
        if self.name.is_empty() {
            return Err(ValidationError::missing(kind, "metadata.name"));
        }
        let spec = self
            .spec
            .ok_or_else(|| ValidationError::missing(kind, "spec"))?;
        spec.validate()?;

        let epoch = self.config.clock.epoch;
        Ok(ResourceResponse {
            labels: self.labels,
            annotations: self.annotations,
            extensions: BTreeMap::new(),
            metadata: Metadata {
                name: self.name.clone(),
                provider: self.locator.provider().to_string(),
                resource: self.locator.resource(&self.name),
                verb: String::new(),
                created_at: epoch,
                last_modified_at: epoch,
                resource_version: 0,
                api_version: self.config.api_version.clone(),
                kind: kind.to_string(),
                tenant: self.locator.tenant().to_string(),
                workspace: self.locator.workspace().map(str::to_string),
                region: self.region,
                network: self.locator.network().map(str::to_string),
            },
            spec,
            status: Status {
                state: String::new(),
                conditions: Vec::new(),
            },
        })
    }
}
