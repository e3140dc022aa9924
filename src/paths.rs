//! Resource paths and request URLs.

use crate::config::FixtureConfig;
use crate::error::ValidationError;
use crate::resource::{ProviderFamily, ResourceKind, Scope};
use crate::stub::UrlPattern;

/// Locates resources of one kind for one tenant (and workspace/network when
/// the kind is nested).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    kind: ResourceKind,
    provider: String,
    api_version: String,
    tenant: String,
    workspace: Option<String>,
    network: Option<String>,
}

impl Locator {
    pub fn new(
        config: &FixtureConfig,
        kind: ResourceKind,
        tenant: &str,
        workspace: Option<&str>,
        network: Option<&str>,
    ) -> Result<Self, ValidationError> {
        if tenant.is_empty() {
            return Err(ValidationError::MissingParameter("tenant".to_string()));
        }
        let require = |value: Option<&str>, name: &str| {
            value
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ValidationError::MissingParameter(name.to_string()))
        };
        let (workspace, network) = match kind.scope() {
            Scope::Tenant => (None, None),
            Scope::Workspace => (Some(require(workspace, "workspace")?), None),
            Scope::Network => (
                Some(require(workspace, "workspace")?),
                Some(require(network, "network")?),
            ),
        };

        Ok(Self {
            kind,
            provider: config.providers.name(kind.family()).to_string(),
            api_version: config.api_version.clone(),
            tenant: tenant.to_string(),
            workspace,
            network,
        })
    }

    /// Serve this kind from another provider family (SKUs exist per family).
    pub fn with_provider(mut self, config: &FixtureConfig, family: ProviderFamily) -> Self {
        self.provider = config.providers.name(family).to_string();
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn workspace(&self) -> Option<&str> {
        self.workspace.as_deref()
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    /// `tenants/{t}[/workspaces/{w}[/networks/{n}]]/{plural}`
    pub fn collection(&self) -> String {
        let mut path = format!("tenants/{}", self.tenant);
        if let Some(workspace) = &self.workspace {
            path.push_str(&format!("/workspaces/{}", workspace));
        }
        if let Some(network) = &self.network {
            path.push_str(&format!("/networks/{}", network));
        }
        path.push('/');
        path.push_str(self.kind.plural());
        path
    }

    pub fn resource(&self, name: &str) -> String {
        format!("{}/{}", self.collection(), name)
    }

    pub fn url(&self, name: &str) -> UrlPattern {
        UrlPattern::Path(self.prefixed(&self.resource(name)))
    }

    pub fn collection_url(&self) -> UrlPattern {
        UrlPattern::Path(self.prefixed(&self.collection()))
    }

    /// Action endpoint such as `.../instances/{name}/stop`.
    pub fn action_url(&self, name: &str, action: &str) -> UrlPattern {
        UrlPattern::Path(format!("{}/{}", self.prefixed(&self.resource(name)), action))
    }

    fn prefixed(&self, path: &str) -> String {
        format!("/providers/{}/{}/{}", self.provider, self.api_version, path)
    }
}
