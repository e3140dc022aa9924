//! Lifecycle composers.
//!
//! A composer turns scenario parameters into a complete programmed scenario:
//! it builds the response objects, lays out the step list, plans it on a
//! [`ScenarioConfigurator`], walks the objects through it and returns the
//! registered stubs.
//!
//! A step list that would break the chain is rejected before the mock server
//! is touched. Otherwise every build starts by resetting all scenarios.

use crate::client::{MockClient, WireMockClient};
use crate::config::{FixtureConfig, ListSelector, ResourceParams, ScenarioParams};
use crate::error::{Result, ValidationError};
use crate::paths::Locator;
use crate::registrar::StubRegistrar;
use crate::resource::{
    LifecycleObject, ProviderFamily, Renderable, ResourceKind, ResourceResponse, ResourceSpec,
    ResponseBuilder, ResponseObject,
};
use crate::scenario::{PlannedStep, ScenarioConfigurator, Step};
use crate::stub::{HttpMethod, StubDefinition, UrlPattern};
use crate::template::TemplateEngine;
use std::collections::BTreeMap;
use tracing::info;

/// Instance power operations, in the order they are exercised.
pub const POWER_ACTIONS: [&str; 3] = ["stop", "start", "restart"];

/// Program the single-resource lifecycle of `kind` on the mock server at
/// `params.mock_url`.
pub async fn configure_lifecycle_scenario(
    kind: ResourceKind,
    scenario: &str,
    params: &ScenarioParams,
    config: &FixtureConfig,
) -> Result<WireMockClient> {
    params.validate()?;
    let client = WireMockClient::new(&params.mock_url)?;
    let engine = TemplateEngine::new()?;
    build_lifecycle(&client, &engine, kind, scenario, params, config).await?;
    Ok(client)
}

/// Program a composite usage scenario covering every resource in `params`.
pub async fn configure_usage_scenario(
    id: &str,
    params: &ScenarioParams,
    config: &FixtureConfig,
) -> Result<WireMockClient> {
    params.validate()?;
    let plan = UsagePlan::from_params(params)?;
    let client = WireMockClient::new(&params.mock_url)?;
    let engine = TemplateEngine::new()?;
    build_usage(&client, &engine, id, &plan, params, config).await?;
    Ok(client)
}

/// Program the read-only SKU lookup scenario.
pub async fn configure_sku_scenario(
    scenario: &str,
    params: &ScenarioParams,
    config: &FixtureConfig,
) -> Result<WireMockClient> {
    params.validate()?;
    let client = WireMockClient::new(&params.mock_url)?;
    let engine = TemplateEngine::new()?;
    build_sku_lookup(&client, &engine, scenario, params, config).await?;
    Ok(client)
}

/// `Create → Get → Update → Get → [stop → start → restart] → Delete → Get(404)`
/// for one resource. Power operations apply to instances only.
pub async fn build_lifecycle(
    client: &dyn MockClient,
    engine: &TemplateEngine,
    kind: ResourceKind,
    scenario: &str,
    params: &ScenarioParams,
    config: &FixtureConfig,
) -> Result<Vec<StubDefinition>> {
    if kind == ResourceKind::Sku {
        return build_sku_lookup(client, engine, scenario, params, config).await;
    }

    let mut subjects = vec![prepare(kind, params, config)?];
    let subject = &subjects[0];
    let name = subject.name.clone();
    let url = subject.locator.url(&subject.name);

    let mut moves = vec![
        Move::new(Operation::Create, 0, url.clone()),
        Move::new(Operation::Get, 0, url.clone()),
        Move::new(Operation::Update, 0, url.clone()),
        Move::new(Operation::Get, 0, url.clone()),
    ];
    if kind == ResourceKind::Instance {
        for action in POWER_ACTIONS {
            let action_url = subject.locator.action_url(&subject.name, action);
            moves.push(Move::new(Operation::Action, 0, action_url));
        }
    }
    moves.push(Move::new(Operation::Delete, 0, url.clone()));
    moves.push(Move::new(Operation::GetNotFound, 0, url).restart());

    let registrar = StubRegistrar::new(client, engine, params, config);
    let mut configurator = ScenarioConfigurator::new(scenario, registrar, config);
    configurator.plan(&planned(&moves))?;
    client.reset_scenarios().await?;
    run(&mut configurator, &mut subjects, moves, &params.list).await?;

    info!(
        scenario = %scenario,
        kind = %kind,
        name = %name,
        stubs = configurator.stubs().len(),
        "Configured lifecycle scenario"
    );
    Ok(configurator.into_stubs())
}

/// Create and read every planned resource in dependency order, optionally
/// list workspaces, then delete everything in reverse order.
pub async fn build_usage(
    client: &dyn MockClient,
    engine: &TemplateEngine,
    id: &str,
    plan: &UsagePlan,
    params: &ScenarioParams,
    config: &FixtureConfig,
) -> Result<Vec<StubDefinition>> {
    let mut subjects = plan
        .kinds()
        .iter()
        .map(|kind| prepare(*kind, params, config))
        .collect::<Result<Vec<_>>>()?;

    let mut moves = Vec::with_capacity(subjects.len() * 3 + 1);
    for (index, subject) in subjects.iter().enumerate() {
        let url = subject.locator.url(&subject.name);
        let label = subject.kind.label();
        let create = Move::new(Operation::Create, index, url.clone());
        moves.push(create.named(format!("Create{}", label)));
        moves.push(Move::new(Operation::Get, index, url).named(format!("Get{}", label)));
    }

    let selector = &params.list;
    let listed = selector.limit.is_some() || !selector.labels.is_empty();
    if listed {
        if let Some(index) = subjects.iter().position(|s| s.kind == ResourceKind::Workspace) {
            let url = subjects[index].locator.collection_url();
            moves.push(Move::new(Operation::List, index, url).named("ListWorkspaces"));
        }
    }

    let last = subjects.len().saturating_sub(1);
    for (position, (index, subject)) in subjects.iter().enumerate().rev().enumerate() {
        let url = subject.locator.url(&subject.name);
        let step = Move::new(Operation::Delete, index, url)
            .named(format!("Delete{}", subject.kind.label()));
        moves.push(if position == last { step.restart() } else { step });
    }

    let registrar = StubRegistrar::new(client, engine, params, config);
    let mut configurator = ScenarioConfigurator::new(id, registrar, config);
    configurator.plan(&planned(&moves))?;
    client.reset_scenarios().await?;
    run(&mut configurator, &mut subjects, moves, selector).await?;

    info!(
        scenario = %id,
        resources = subjects.len(),
        stubs = configurator.stubs().len(),
        "Configured usage scenario"
    );
    Ok(configurator.into_stubs())
}

/// List the SKUs of each provider family, then read each SKU, closing the
/// loop on the last read.
pub async fn build_sku_lookup(
    client: &dyn MockClient,
    engine: &TemplateEngine,
    scenario: &str,
    params: &ScenarioParams,
    config: &FixtureConfig,
) -> Result<Vec<StubDefinition>> {
    if params.skus.is_empty() {
        return Err(ValidationError::MissingParameter("skus".to_string()).into());
    }

    let mut families: Vec<(ProviderFamily, Locator, Vec<ResourceResponse<_>>)> = Vec::new();
    for sku in &params.skus {
        let index = match families.iter().position(|(family, _, _)| *family == sku.family) {
            Some(index) => index,
            None => {
                let locator = Locator::new(config, ResourceKind::Sku, &params.tenant, None, None)?
                    .with_provider(config, sku.family);
                families.push((sku.family, locator, Vec::new()));
                families.len() - 1
            }
        };
        let (_, locator, items) = &mut families[index];
        let mut response = ResponseBuilder::new(locator, config, sku.name.as_str())
            .region(params.region.as_str())
            .spec(sku.spec.clone())
            .build()?;
        response.set_verb(HttpMethod::Get);
        response.set_state(&config.states.active, config.clock.epoch);
        items.push(response);
    }

    // (family, item) per step; no item means the family's list
    let total = params.skus.len();
    let mut steps = Vec::with_capacity(total + families.len());
    let mut plan = Vec::with_capacity(total + families.len());
    for (family, (_, locator, items)) in families.iter().enumerate() {
        steps.push((family, None));
        plan.push(PlannedStep::new(HttpMethod::Get, locator.collection_url(), Step::auto()));
        for (item, sku) in items.iter().enumerate() {
            steps.push((family, Some(item)));
            let step = if plan.len() + 1 == total + families.len() {
                Step::auto().restart()
            } else {
                Step::auto()
            };
            plan.push(PlannedStep::new(
                HttpMethod::Get,
                locator.url(&sku.metadata.name),
                step,
            ));
        }
    }

    let registrar = StubRegistrar::new(client, engine, params, config);
    let mut configurator = ScenarioConfigurator::new(scenario, registrar, config);
    configurator.plan(&plan)?;
    client.reset_scenarios().await?;

    for ((family, item), planned) in steps.into_iter().zip(plan) {
        let (_, locator, items) = &families[family];
        match item {
            None => {
                let listed: Vec<&dyn Renderable> =
                    items.iter().map(|i| i as &dyn Renderable).collect();
                configurator
                    .configure_get_list(locator, &listed, &params.list, planned.step)
                    .await?;
            }
            Some(item) => {
                configurator
                    .configure_get_static(planned.url, &items[item], planned.step)
                    .await?;
            }
        }
    }

    info!(
        scenario = %scenario,
        skus = total,
        stubs = configurator.stubs().len(),
        "Configured SKU lookup scenario"
    );
    Ok(configurator.into_stubs())
}

/// What a composed step does to its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Get,
    Update,
    Action,
    Delete,
    GetNotFound,
    List,
}

impl Operation {
    fn method(self) -> HttpMethod {
        match self {
            Operation::Create | Operation::Update => HttpMethod::Put,
            Operation::Action => HttpMethod::Post,
            Operation::Delete => HttpMethod::Delete,
            Operation::Get | Operation::GetNotFound | Operation::List => HttpMethod::Get,
        }
    }
}

/// One composed step over `subjects[subject]`.
#[derive(Debug, Clone)]
struct Move {
    operation: Operation,
    subject: usize,
    url: UrlPattern,
    step: Step,
}

impl Move {
    fn new(operation: Operation, subject: usize, url: UrlPattern) -> Self {
        Self {
            operation,
            subject,
            url,
            step: Step::auto(),
        }
    }

    fn named(mut self, label: impl Into<String>) -> Self {
        self.step = Step::named(label);
        self
    }

    fn restart(mut self) -> Self {
        self.step = self.step.restart();
        self
    }
}

fn planned(moves: &[Move]) -> Vec<PlannedStep> {
    moves
        .iter()
        .map(|m| PlannedStep::new(m.operation.method(), m.url.clone(), m.step.clone()))
        .collect()
}

/// Register `moves` in order; the first failure aborts the rest.
async fn run(
    configurator: &mut ScenarioConfigurator<'_>,
    subjects: &mut [Subject],
    moves: Vec<Move>,
    selector: &ListSelector,
) -> Result<()> {
    for Move {
        operation,
        subject,
        url,
        step,
    } in moves
    {
        let subject = &mut subjects[subject];
        match operation {
            Operation::Create => {
                configurator
                    .configure_create(url, &mut *subject.object, step)
                    .await?
            }
            Operation::Get => configurator.configure_get(url, &mut *subject.object, step).await?,
            Operation::Update => {
                subject.object.apply_update();
                configurator
                    .configure_update(url, &mut *subject.object, step)
                    .await?
            }
            Operation::Action => configurator.configure_action(url, step).await?,
            Operation::Delete => {
                configurator
                    .configure_delete(url, &mut *subject.object, step)
                    .await?
            }
            Operation::GetNotFound => configurator.configure_get_not_found(url, step).await?,
            Operation::List => {
                let items = [subject.object.as_renderable()];
                configurator
                    .configure_get_list(&subject.locator, &items, selector, step)
                    .await?
            }
        }
    }
    Ok(())
}

/// An ordered, dependency-complete set of kinds for a usage scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePlan {
    kinds: Vec<ResourceKind>,
}

impl UsagePlan {
    /// Order `kinds` for creation and check every dependency is included.
    pub fn new(
        kinds: impl IntoIterator<Item = ResourceKind>,
    ) -> std::result::Result<Self, ValidationError> {
        let mut kinds: Vec<ResourceKind> = kinds.into_iter().collect();
        if let Some(sku) = kinds.iter().find(|k| **k == ResourceKind::Sku) {
            return Err(ValidationError::InvalidValue {
                kind: "usage".to_string(),
                field: "resources".to_string(),
                reason: format!("'{}' is read-only and cannot be part of a usage plan", sku),
            });
        }
        kinds.sort();
        kinds.dedup();
        if kinds.is_empty() {
            return Err(ValidationError::MissingParameter("resources".to_string()));
        }

        for kind in &kinds {
            for dependency in kind.dependencies() {
                if !kinds.contains(dependency) {
                    return Err(ValidationError::MissingDependency {
                        kind: kind.as_str().to_string(),
                        dependency: dependency.as_str().to_string(),
                    });
                }
            }
        }
        Ok(Self { kinds })
    }

    /// Every kind, role through instance.
    pub fn foundation() -> Self {
        Self {
            kinds: ResourceKind::DEPENDENCY_ORDER.to_vec(),
        }
    }

    /// The kinds `params` carries resources for.
    pub fn from_params(params: &ScenarioParams) -> std::result::Result<Self, ValidationError> {
        Self::new(params.resources.kinds())
    }

    /// Kinds in creation order.
    pub fn kinds(&self) -> &[ResourceKind] {
        &self.kinds
    }

    pub fn is_foundation(&self) -> bool {
        self.kinds == ResourceKind::DEPENDENCY_ORDER
    }
}

/// A response object plus the values its update step applies.
trait Tracked: ResponseObject {
    fn apply_update(&mut self);
}

struct TrackedResponse<S> {
    response: ResourceResponse<S>,
    updated_spec: S,
    updated_labels: BTreeMap<String, String>,
}

impl<S: ResourceSpec> LifecycleObject for TrackedResponse<S> {
    fn set_verb(&mut self, verb: HttpMethod) {
        self.response.set_verb(verb)
    }

    fn mark_created(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.response.mark_created(at)
    }

    fn touch(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.response.touch(at)
    }

    fn bump_version(&mut self) {
        self.response.bump_version()
    }

    fn set_state(&mut self, state: &str, at: chrono::DateTime<chrono::Utc>) {
        self.response.set_state(state, at)
    }

    fn resource_version(&self) -> u64 {
        self.response.resource_version()
    }
}

impl<S: ResourceSpec> Renderable for TrackedResponse<S> {
    fn template_name(&self) -> &str {
        self.response.template_name()
    }

    fn to_context(&self) -> std::result::Result<serde_json::Value, crate::error::TemplateError> {
        self.response.to_context()
    }
}

impl<S: ResourceSpec> Tracked for TrackedResponse<S> {
    fn apply_update(&mut self) {
        self.response.spec = self.updated_spec.clone();
        self.response.labels = self.updated_labels.clone();
    }
}

/// One resource ready to be walked through a scenario.
struct Subject {
    kind: ResourceKind,
    name: String,
    locator: Locator,
    object: Box<dyn Tracked>,
}

fn track<S: ResourceSpec + 'static>(
    resource: &Option<ResourceParams<S>>,
    params: &ScenarioParams,
    config: &FixtureConfig,
) -> Result<Subject> {
    let kind = S::KIND;
    let resource = resource
        .as_ref()
        .ok_or_else(|| ValidationError::MissingParameter(format!("resources.{}", kind)))?;
    resource.validate()?;

    let locator = Locator::new(
        config,
        kind,
        &params.tenant,
        params.workspace_name(),
        params.network_name(),
    )?;
    let response = ResponseBuilder::new(&locator, config, resource.name.as_str())
        .region(params.region.as_str())
        .labels(resource.labels.clone())
        .spec(resource.initial.clone())
        .build()?;

    Ok(Subject {
        kind,
        name: resource.name.clone(),
        locator,
        object: Box::new(TrackedResponse {
            response,
            updated_spec: resource.updated_spec(),
            updated_labels: resource.final_labels(),
        }),
    })
}

fn prepare(kind: ResourceKind, params: &ScenarioParams, config: &FixtureConfig) -> Result<Subject> {
    let resources = &params.resources;
    match kind {
        ResourceKind::Role => track(&resources.role, params, config),
        ResourceKind::RoleAssignment => track(&resources.role_assignment, params, config),
        ResourceKind::Workspace => track(&resources.workspace, params, config),
        ResourceKind::Image => track(&resources.image, params, config),
        ResourceKind::BlockStorage => track(&resources.block_storage, params, config),
        ResourceKind::Network => track(&resources.network, params, config),
        ResourceKind::InternetGateway => track(&resources.internet_gateway, params, config),
        ResourceKind::RouteTable => track(&resources.route_table, params, config),
        ResourceKind::Subnet => track(&resources.subnet, params, config),
        ResourceKind::SecurityGroup => track(&resources.security_group, params, config),
        ResourceKind::PublicIp => track(&resources.public_ip, params, config),
        ResourceKind::Nic => track(&resources.nic, params, config),
        ResourceKind::Instance => track(&resources.instance, params, config),
        ResourceKind::Sku => Err(ValidationError::InvalidValue {
            kind: "sku".to_string(),
            field: "kind".to_string(),
            reason: "SKUs are read-only; use the SKU lookup scenario".to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::STARTED;
    use crate::error::{FixtureError, RegistrationError};
    use crate::memory::InMemoryMockServer;
    use crate::resource::lookup;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stores stubs in memory until the `fail_on`-th registration, which the
    /// server rejects with a 500.
    struct FlakyServer {
        inner: InMemoryMockServer,
        fail_on: usize,
        calls: AtomicUsize,
        resets: AtomicUsize,
    }

    impl FlakyServer {
        fn new(fail_on: usize) -> Self {
            Self {
                inner: InMemoryMockServer::new(),
                fail_on,
                calls: AtomicUsize::new(0),
                resets: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MockClient for FlakyServer {
        async fn register_stub(&self, stub: &StubDefinition) -> Result<(), RegistrationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(RegistrationError::Rejected {
                    operation: "register stub".to_string(),
                    status: 500,
                    body: "internal error".to_string(),
                });
            }
            self.inner.register_stub(stub).await
        }

        async fn reset_scenarios(&self) -> Result<(), RegistrationError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            self.inner.reset_scenarios().await
        }
    }

    const FOUNDATION: &str = r#"
mock_url: http://localhost:8080
auth_token: tok
tenant: t1
region: eu-central-1
resources:
  role:
    name: admin
    initial:
      permissions:
        - provider: seca.compute
          resources: ["instances"]
          verb: ["get", "put"]
  role_assignment:
    name: admin-binding
    initial:
      subs: ["alice"]
      roles: ["admin"]
  workspace:
    name: w1
    labels:
      env: test
    updated_labels:
      env: prod
  image:
    name: ubuntu
    initial:
      cpuArchitecture: amd64
  block_storage:
    name: disk1
    initial:
      skuRef: RD500
      sizeGB: 50
    updated:
      skuRef: RD500
      sizeGB: 100
  network:
    name: n1
    initial:
      cidr:
        ipv4: 10.0.0.0/16
      skuRef: S1
      routeTableRef: R1
  internet_gateway:
    name: igw1
  route_table:
    name: rt1
    initial:
      routes:
        - destinationCidrBlock: 0.0.0.0/0
          targetRef: igw1
  subnet:
    name: sn1
    initial:
      cidr:
        ipv4: 10.0.1.0/24
      zone: a
  security_group:
    name: sg1
    initial:
      rules:
        - direction: ingress
          protocol: tcp
          ports:
            from: 22
            to: 22
  public_ip:
    name: ip1
    initial:
      version: IPv4
  nic:
    name: nic1
    initial:
      subnetRef: sn1
  instance:
    name: vm1
    initial:
      skuRef: D2XS
      zone: a
      bootVolume:
        deviceRef: disk1
skus:
  - name: D2XS
    spec:
      tier: D2XS
      attributes:
        vCPU: 2
  - name: RD500
    family: storage
    spec:
      tier: RD500
list:
  limit: 10
  labels:
    env: test
"#;

    fn params() -> ScenarioParams {
        let params: ScenarioParams = serde_yaml::from_str(FOUNDATION).unwrap();
        params.validate().unwrap();
        params
    }

    fn headers() -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer tok".to_string());
        headers
    }

    fn path(stub: &StubDefinition) -> String {
        stub.request.url.as_str().to_string()
    }

    async fn lifecycle(server: &InMemoryMockServer, kind: ResourceKind) -> Vec<StubDefinition> {
        let engine = TemplateEngine::new().unwrap();
        let config = FixtureConfig::default();
        build_lifecycle(server, &engine, kind, "lifecycle", &params(), &config)
            .await
            .unwrap()
    }

    // Single path out of Started and back, one triple per stub
    fn assert_single_loop(stubs: &[StubDefinition]) {
        assert_eq!(stubs.first().unwrap().required_scenario_state, STARTED);
        assert_eq!(stubs.last().unwrap().new_scenario_state, STARTED);
        for pair in stubs.windows(2) {
            assert_eq!(pair[0].new_scenario_state, pair[1].required_scenario_state);
        }
        let triples: HashSet<_> = stubs
            .iter()
            .map(|s| (s.request.method, path(s), s.required_scenario_state.clone()))
            .collect();
        assert_eq!(triples.len(), stubs.len());
    }

    #[tokio::test]
    async fn test_workspace_lifecycle() {
        let server = InMemoryMockServer::new();
        let stubs = lifecycle(&server, ResourceKind::Workspace).await;

        let shape: Vec<_> = stubs
            .iter()
            .map(|s| (s.request.method, s.response.status))
            .collect();
        assert_eq!(
            shape,
            vec![
                (HttpMethod::Put, 201),
                (HttpMethod::Get, 200),
                (HttpMethod::Put, 200),
                (HttpMethod::Get, 200),
                (HttpMethod::Delete, 202),
                (HttpMethod::Get, 404),
            ]
        );
        assert_eq!(
            path(&stubs[0]),
            "/providers/seca.workspace/v1/tenants/t1/workspaces/w1"
        );

        let state = |i: usize| {
            stubs[i].response.json_body.as_ref().unwrap()["status"]["state"]
                .as_str()
                .unwrap()
                .to_string()
        };
        assert_eq!(state(0), "creating");
        assert_eq!(state(1), "active");
        assert_eq!(state(2), "updating");
        assert_eq!(state(3), "active");

        let body = stubs[0].response.json_body.as_ref().unwrap();
        assert_eq!(body["labels"]["env"], "test");
        assert_eq!(body["metadata"]["tenant"], "t1");
        assert_eq!(body["metadata"]["region"], "eu-central-1");
        let updated = stubs[2].response.json_body.as_ref().unwrap();
        assert_eq!(updated["labels"]["env"], "prod");

        assert_eq!(stubs[4].response.json_body, None);
        assert_eq!(stubs[5].response.json_body, None);
        assert_single_loop(&stubs);
    }

    #[tokio::test]
    async fn test_network_resource_version_follows_writes() {
        let server = InMemoryMockServer::new();
        let stubs = lifecycle(&server, ResourceKind::Network).await;

        let version = |i: usize| {
            stubs[i].response.json_body.as_ref().unwrap()["metadata"]["resourceVersion"].clone()
        };
        assert_eq!(version(0), 1);
        assert_eq!(version(1), 1);
        assert_eq!(version(2), 2);
        assert_eq!(version(3), 2);

        let body = stubs[2].response.json_body.as_ref().unwrap();
        assert_eq!(body["spec"]["skuRef"], "S1");
        assert_eq!(body["spec"]["routeTableRef"], "R1");
        assert_eq!(body["metadata"]["workspace"], "w1");
        assert_eq!(
            body["metadata"]["resource"],
            "tenants/t1/workspaces/w1/networks/n1"
        );
    }

    #[tokio::test]
    async fn test_instance_power_cycle() {
        let server = InMemoryMockServer::new();
        let stubs = lifecycle(&server, ResourceKind::Instance).await;
        assert_eq!(stubs.len(), 9);

        let after_update = stubs[3].response.json_body.as_ref().unwrap();
        assert_eq!(after_update["status"]["state"], "active");
        for (stub, action) in stubs[4..7].iter().zip(POWER_ACTIONS) {
            assert_eq!(stub.request.method, HttpMethod::Post);
            assert!(path(stub).ends_with(&format!("/instances/vm1/{}", action)));
            assert_eq!(stub.response.status, 202);
            assert_eq!(stub.response.json_body, None);
        }
        assert_eq!(stubs[7].request.method, HttpMethod::Delete);
        assert_single_loop(&stubs);
    }

    #[tokio::test]
    async fn test_every_kind_forms_a_single_loop() {
        for kind in ResourceKind::DEPENDENCY_ORDER {
            let server = InMemoryMockServer::new();
            let stubs = lifecycle(&server, kind).await;
            assert_single_loop(&stubs);
            assert_eq!(server.stubs().await, stubs, "{}", kind);
        }
    }

    #[tokio::test]
    async fn test_builds_are_idempotent() {
        let first = lifecycle(&InMemoryMockServer::new(), ResourceKind::Instance).await;
        let second = lifecycle(&InMemoryMockServer::new(), ResourceKind::Instance).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rendered_fields_match_response_object() {
        let config = FixtureConfig::default();
        let engine = TemplateEngine::new().unwrap();
        let params = params();
        let mut subject = prepare(ResourceKind::Network, &params, &config).unwrap();
        subject.object.set_state("active", config.clock.epoch);

        let body = engine.render(subject.object.as_renderable()).unwrap().unwrap();
        for field in [
            "metadata.name",
            "metadata.resource",
            "metadata.resourceVersion",
            "spec.skuRef",
            "spec.cidr",
            "status.state",
            "labels",
        ] {
            assert_eq!(
                lookup(&body, field).cloned(),
                subject.object.field_at(field),
                "{}",
                field
            );
        }
    }

    #[tokio::test]
    async fn test_replay_follows_the_scenario() {
        let server = InMemoryMockServer::new();
        let stubs = lifecycle(&server, ResourceKind::Workspace).await;
        let url = path(&stubs[0]);
        let headers = headers();

        // Reading before creating falls through
        let early = server.handle(HttpMethod::Get, &url, &headers).await;
        assert!(early.is_unmatched());

        let calls = [
            (HttpMethod::Put, 201),
            (HttpMethod::Get, 200),
            (HttpMethod::Put, 200),
            (HttpMethod::Get, 200),
            (HttpMethod::Delete, 202),
            (HttpMethod::Get, 404),
        ];
        for (method, status) in calls {
            let served = server.handle(method, &url, &headers).await;
            assert_eq!(served.status, status);
            assert!(!served.is_unmatched());
        }
        assert_eq!(server.scenario_state("lifecycle").await, STARTED);

        // Loop closed: the create succeeds again
        let again = server.handle(HttpMethod::Put, &url, &headers).await;
        assert_eq!(again.status, 201);
    }

    #[tokio::test]
    async fn test_missing_token_does_not_match() {
        let server = InMemoryMockServer::new();
        let stubs = lifecycle(&server, ResourceKind::Workspace).await;

        let served = server
            .handle(HttpMethod::Put, &path(&stubs[0]), &HashMap::new())
            .await;
        assert!(served.is_unmatched());
    }

    #[tokio::test]
    async fn test_missing_resource_params() {
        let server = InMemoryMockServer::new();
        let engine = TemplateEngine::new().unwrap();
        let mut params = params();
        params.resources.instance = None;

        let err = build_lifecycle(
            &server,
            &engine,
            ResourceKind::Instance,
            "vm",
            &params,
            &FixtureConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            FixtureError::Validation(ValidationError::MissingParameter(_))
        ));
        assert!(server.stubs().await.is_empty());
    }

    #[tokio::test]
    async fn test_build_stops_at_first_rejected_registration() {
        let server = FlakyServer::new(3);
        let engine = TemplateEngine::new().unwrap();
        let config = FixtureConfig::default();

        let err = build_lifecycle(
            &server,
            &engine,
            ResourceKind::Workspace,
            "ws",
            &params(),
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            FixtureError::Registration(RegistrationError::Rejected { status: 500, .. })
        ));

        assert_eq!(server.calls.load(Ordering::SeqCst), 3);
        assert_eq!(server.resets.load(Ordering::SeqCst), 1);
        let stored = server.inner.stubs().await;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].new_scenario_state, "State.2");
    }

    #[tokio::test]
    async fn test_rejected_sku_list_stops_the_lookup() {
        let server = FlakyServer::new(1);
        let engine = TemplateEngine::new().unwrap();

        let err = build_sku_lookup(&server, &engine, "skus", &params(), &FixtureConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FixtureError::Registration(_)));
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);
        assert!(server.inner.stubs().await.is_empty());
    }

    #[test]
    fn test_usage_plan_orders_and_checks_dependencies() {
        let plan = UsagePlan::new([
            ResourceKind::Network,
            ResourceKind::Workspace,
            ResourceKind::Network,
        ])
        .unwrap();
        assert_eq!(plan.kinds(), &[ResourceKind::Workspace, ResourceKind::Network]);

        let err = UsagePlan::new([ResourceKind::Workspace, ResourceKind::Nic]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingDependency {
                kind: "nic".to_string(),
                dependency: "subnet".to_string(),
            }
        );

        assert!(UsagePlan::new([ResourceKind::Sku]).is_err());
        assert!(UsagePlan::new(Vec::<ResourceKind>::new()).is_err());
        assert!(UsagePlan::foundation().is_foundation());
        assert!(UsagePlan::from_params(&params()).unwrap().is_foundation());
    }

    #[tokio::test]
    async fn test_foundation_usage() {
        let server = InMemoryMockServer::new();
        let engine = TemplateEngine::new().unwrap();
        let config = FixtureConfig::default();
        let params = params();
        let stubs = build_usage(
            &server,
            &engine,
            "foundation",
            &UsagePlan::foundation(),
            &params,
            &config,
        )
        .await
        .unwrap();

        // 13 create/get pairs, one list, 13 deletes
        assert_eq!(stubs.len(), 13 * 2 + 1 + 13);
        assert_eq!(stubs[0].new_scenario_state, "CreateRole");
        assert_eq!(stubs[1].new_scenario_state, "GetRole");
        assert_eq!(stubs[26].new_scenario_state, "ListWorkspaces");
        assert_eq!(
            stubs[26].request.url,
            UrlPattern::Path("/providers/seca.workspace/v1/tenants/t1/workspaces".to_string())
        );
        assert_eq!(stubs[27].new_scenario_state, "DeleteInstance");
        assert_eq!(stubs.last().unwrap().new_scenario_state, STARTED);
        assert!(path(stubs.last().unwrap()).ends_with("/roles/admin"));

        let deletes: Vec<_> = stubs[27..].iter().map(path).collect();
        let mut creates: Vec<_> = stubs[..26].iter().step_by(2).map(path).collect();
        creates.reverse();
        assert_eq!(deletes, creates);
        assert_single_loop(&stubs);
    }

    #[tokio::test]
    async fn test_sku_lookup() {
        let server = InMemoryMockServer::new();
        let stubs = lifecycle(&server, ResourceKind::Sku).await;

        // compute list, D2XS, storage list, RD500
        assert_eq!(stubs.len(), 4);
        assert!(path(&stubs[0]).starts_with("/providers/seca.compute/"));
        assert!(path(&stubs[2]).starts_with("/providers/seca.storage/"));
        assert!(stubs.iter().all(|s| s.request.method == HttpMethod::Get));

        let list = stubs[0].response.json_body.as_ref().unwrap();
        assert_eq!(list["items"].as_array().unwrap().len(), 1);
        assert_eq!(list["items"][0]["spec"]["attributes"]["vCPU"], 2);
        assert_eq!(stubs[1].response.json_body.as_ref().unwrap()["status"]["state"], "active");
        assert_single_loop(&stubs);

        let target = format!("{}?limit=10&labels=env%3Dtest", path(&stubs[0]));
        let served = server.handle(HttpMethod::Get, &target, &headers()).await;
        assert_eq!(served.status, 200);
    }

    #[tokio::test]
    async fn test_sku_lookup_requires_skus() {
        let server = InMemoryMockServer::new();
        let engine = TemplateEngine::new().unwrap();
        let mut params = params();
        params.skus.clear();

        let err = build_sku_lookup(&server, &engine, "skus", &params, &FixtureConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FixtureError::Validation(ValidationError::MissingParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_mock_url() {
        let mut params = params();
        params.mock_url = "localhost:8080".to_string();

        let err = configure_lifecycle_scenario(
            ResourceKind::Workspace,
            "ws",
            &params,
            &FixtureConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FixtureError::Registration(_)));
    }
}
