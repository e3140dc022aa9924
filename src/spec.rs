//! Per-kind spec payloads.
//!
//! Field names follow the control-plane wire format (camelCase). Each spec
//! checks only the fields the API refuses to accept without.

use crate::error::ValidationError;
use crate::resource::{ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn require(kind: ResourceKind, field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::missing(kind.as_str(), field))
    } else {
        Ok(())
    }
}

fn require_some<T>(kind: ResourceKind, field: &str, values: &[T]) -> Result<(), ValidationError> {
    if values.is_empty() {
        Err(ValidationError::missing(kind.as_str(), field))
    } else {
        Ok(())
    }
}

fn one_of(kind: ResourceKind, field: &str, value: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            kind: kind.as_str().to_string(),
            field: field.to_string(),
            reason: format!("'{}' is not one of {}", value, allowed.join(", ")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub provider: String,
    pub resources: Vec<String>,
    pub verb: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    pub permissions: Vec<Permission>,
}

impl ResourceSpec for RoleSpec {
    const KIND: ResourceKind = ResourceKind::Role;

    fn validate(&self) -> Result<(), ValidationError> {
        require_some(Self::KIND, "spec.permissions", &self.permissions)?;
        for permission in &self.permissions {
            require(Self::KIND, "spec.permissions.provider", &permission.provider)?;
            require_some(Self::KIND, "spec.permissions.verb", &permission.verb)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentScope {
    #[serde(default)]
    pub tenants: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub workspaces: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentSpec {
    pub subs: Vec<String>,
    pub roles: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<RoleAssignmentScope>,
}

impl ResourceSpec for RoleAssignmentSpec {
    const KIND: ResourceKind = ResourceKind::RoleAssignment;

    fn validate(&self) -> Result<(), ValidationError> {
        require_some(Self::KIND, "spec.subs", &self.subs)?;
        require_some(Self::KIND, "spec.roles", &self.roles)
    }
}

/// Workspaces carry no spec fields; updates change labels only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSpec {}

impl ResourceSpec for WorkspaceSpec {
    const KIND: ResourceKind = ResourceKind::Workspace;

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    pub cpu_architecture: String,
    #[serde(default)]
    pub boot: String,
    #[serde(default)]
    pub initializer: String,
}

impl ResourceSpec for ImageSpec {
    const KIND: ResourceKind = ResourceKind::Image;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "spec.cpuArchitecture", &self.cpu_architecture)?;
        one_of(
            Self::KIND,
            "spec.cpuArchitecture",
            &self.cpu_architecture,
            &["amd64", "arm64"],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStorageSpec {
    pub sku_ref: String,
    #[serde(rename = "sizeGB")]
    pub size_gb: u64,
    #[serde(default)]
    pub source_image_ref: Option<String>,
}

impl ResourceSpec for BlockStorageSpec {
    const KIND: ResourceKind = ResourceKind::BlockStorage;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "spec.skuRef", &self.sku_ref)?;
        if self.size_gb == 0 {
            return Err(ValidationError::missing(Self::KIND.as_str(), "spec.sizeGB"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cidr {
    #[serde(default)]
    pub ipv4: Option<String>,
    #[serde(default)]
    pub ipv6: Option<String>,
}

impl Cidr {
    fn validate(&self, kind: ResourceKind) -> Result<(), ValidationError> {
        if self.ipv4.is_none() && self.ipv6.is_none() {
            return Err(ValidationError::missing(kind.as_str(), "spec.cidr"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    pub cidr: Cidr,
    pub sku_ref: String,
    pub route_table_ref: String,
}

impl ResourceSpec for NetworkSpec {
    const KIND: ResourceKind = ResourceKind::Network;

    fn validate(&self) -> Result<(), ValidationError> {
        self.cidr.validate(Self::KIND)?;
        require(Self::KIND, "spec.skuRef", &self.sku_ref)?;
        require(Self::KIND, "spec.routeTableRef", &self.route_table_ref)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternetGatewaySpec {
    #[serde(default)]
    pub egress_only: bool,
}

impl ResourceSpec for InternetGatewaySpec {
    const KIND: ResourceKind = ResourceKind::InternetGateway;

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub destination_cidr_block: String,
    pub target_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableSpec {
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl ResourceSpec for RouteTableSpec {
    const KIND: ResourceKind = ResourceKind::RouteTable;

    fn validate(&self) -> Result<(), ValidationError> {
        for route in &self.routes {
            require(Self::KIND, "spec.routes.destinationCidrBlock", &route.destination_cidr_block)?;
            require(Self::KIND, "spec.routes.targetRef", &route.target_ref)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    pub cidr: Cidr,
    pub zone: String,
}

impl ResourceSpec for SubnetSpec {
    const KIND: ResourceKind = ResourceKind::Subnet;

    fn validate(&self) -> Result<(), ValidationError> {
        self.cidr.validate(Self::KIND)?;
        require(Self::KIND, "spec.zone", &self.zone)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRange {
    pub from: u16,
    pub to: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRule {
    pub direction: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub ports: Option<PortRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupSpec {
    #[serde(default)]
    pub rules: Vec<SecurityGroupRule>,
}

impl ResourceSpec for SecurityGroupSpec {
    const KIND: ResourceKind = ResourceKind::SecurityGroup;

    fn validate(&self) -> Result<(), ValidationError> {
        for rule in &self.rules {
            one_of(Self::KIND, "spec.rules.direction", &rule.direction, &["ingress", "egress"])?;
            if let Some(ports) = &rule.ports {
                if ports.from > ports.to {
                    return Err(ValidationError::InvalidValue {
                        kind: Self::KIND.as_str().to_string(),
                        field: "spec.rules.ports".to_string(),
                        reason: format!("range {}-{} is reversed", ports.from, ports.to),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpSpec {
    pub version: String,
    #[serde(default)]
    pub address: Option<String>,
}

impl ResourceSpec for PublicIpSpec {
    const KIND: ResourceKind = ResourceKind::PublicIp;

    fn validate(&self) -> Result<(), ValidationError> {
        one_of(Self::KIND, "spec.version", &self.version, &["IPv4", "IPv6"])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NicSpec {
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub public_ip_refs: Vec<String>,
    pub subnet_ref: String,
}

impl ResourceSpec for NicSpec {
    const KIND: ResourceKind = ResourceKind::Nic;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "spec.subnetRef", &self.subnet_ref)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeReference {
    pub device_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub sku_ref: String,
    pub zone: String,
    pub boot_volume: VolumeReference,
    #[serde(default)]
    pub ssh_keys: Vec<String>,
}

impl ResourceSpec for InstanceSpec {
    const KIND: ResourceKind = ResourceKind::Instance;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "spec.skuRef", &self.sku_ref)?;
        require(Self::KIND, "spec.zone", &self.zone)?;
        require(Self::KIND, "spec.bootVolume.deviceRef", &self.boot_volume.device_ref)
    }
}

/// Read-only SKU description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuSpec {
    pub tier: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl ResourceSpec for SkuSpec {
    const KIND: ResourceKind = ResourceKind::Sku;

    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "spec.tier", &self.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_requires_refs_and_cidr() {
        let spec = NetworkSpec {
            cidr: Cidr::default(),
            sku_ref: "S1".to_string(),
            route_table_ref: "R1".to_string(),
        };
        assert_eq!(
            spec.validate().unwrap_err(),
            ValidationError::missing("network", "spec.cidr")
        );

        let spec = NetworkSpec {
            cidr: Cidr {
                ipv4: Some("10.0.0.0/16".to_string()),
                ipv6: None,
            },
            sku_ref: "S1".to_string(),
            route_table_ref: String::new(),
        };
        assert_eq!(
            spec.validate().unwrap_err(),
            ValidationError::missing("network", "spec.routeTableRef")
        );
    }

    #[test]
    fn test_block_storage_size_must_be_positive() {
        let spec = BlockStorageSpec {
            sku_ref: "RD500".to_string(),
            size_gb: 0,
            source_image_ref: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_security_group_rules() {
        let spec = SecurityGroupSpec {
            rules: vec![SecurityGroupRule {
                direction: "sideways".to_string(),
                protocol: None,
                ports: None,
            }],
        };
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));

        let spec = SecurityGroupSpec {
            rules: vec![SecurityGroupRule {
                direction: "ingress".to_string(),
                protocol: Some("tcp".to_string()),
                ports: Some(PortRange { from: 443, to: 22 }),
            }],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_role_requires_permissions() {
        assert!(RoleSpec::default().validate().is_err());
        let spec = RoleSpec {
            permissions: vec![Permission {
                provider: "seca.compute".to_string(),
                resources: vec!["instances/*".to_string()],
                verb: vec!["get".to_string()],
            }],
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_specs_parse_from_yaml() {
        let yaml = r#"
skuRef: D2XS
zone: a
bootVolume:
  deviceRef: block-storages/boot
"#;
        let spec: InstanceSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.boot_volume.device_ref, "block-storages/boot");
        assert!(spec.ssh_keys.is_empty());

        let spec: BlockStorageSpec = serde_yaml::from_str("skuRef: RD500\nsizeGB: 50\n").unwrap();
        assert_eq!(spec.size_gb, 50);
    }
}
