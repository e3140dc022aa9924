//! Scenario configurator.
//!
//! Owns one scenario's state cursor. Each `configure_*` call reshapes the
//! response object for the step, picks the next state, registers one stub
//! gated on the current state and moves the cursor forward.
//!
//! A composer may [`plan`](ScenarioConfigurator::plan) the whole step list
//! first. The plan is checked as a chain before anything reaches the mock
//! server, and every later registration must follow it.

use crate::chain::{StateChain, Transition, STARTED};
use crate::config::{ClockSettings, FixtureConfig, ListSelector};
use crate::error::{ChainError, Result};
use crate::paths::Locator;
use crate::registrar::{StubCall, StubRegistrar};
use crate::resource::{ListMetadata, ListResponse, Renderable, ResponseObject};
use crate::stub::{HttpMethod, StubDefinition, UrlPattern, ValueMatcher};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};

/// How a step names the state it leads to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    label: Option<String>,
    restart: bool,
}

impl Step {
    /// Next state is `State.<n>`.
    pub fn auto() -> Self {
        Self::default()
    }

    /// Next state is `label`.
    pub fn named(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            restart: false,
        }
    }

    /// Return the scenario to `Started` after this step.
    pub fn restart(mut self) -> Self {
        self.restart = true;
        self
    }
}

/// A step as seen by the chain: what is called, and where it leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub method: HttpMethod,
    pub url: UrlPattern,
    pub step: Step,
}

impl PlannedStep {
    pub fn new(method: HttpMethod, url: UrlPattern, step: Step) -> Self {
        Self { method, url, step }
    }
}

/// Timestamp source advancing a fixed step per registered stub.
#[derive(Debug, Clone)]
pub struct FixtureClock {
    epoch: DateTime<Utc>,
    step: Duration,
    ticks: i32,
}

impl FixtureClock {
    pub fn new(settings: &ClockSettings) -> Self {
        Self {
            epoch: settings.epoch,
            step: Duration::seconds(i64::from(settings.step_seconds)),
            ticks: 0,
        }
    }

    pub fn tick(&mut self) -> DateTime<Utc> {
        let now = self.epoch + self.step * self.ticks;
        self.ticks += 1;
        now
    }
}

pub struct ScenarioConfigurator<'a> {
    name: String,
    registrar: StubRegistrar<'a>,
    config: &'a FixtureConfig,
    chain: StateChain,
    cursor: String,
    index: u32,
    clock: FixtureClock,
    stubs: Vec<StubDefinition>,
    /// Transitions still to be registered, when a plan was set
    planned: Option<VecDeque<Transition>>,
}

impl<'a> ScenarioConfigurator<'a> {
    pub fn new(name: &str, registrar: StubRegistrar<'a>, config: &'a FixtureConfig) -> Self {
        Self {
            name: name.to_string(),
            registrar,
            config,
            chain: StateChain::new(name),
            cursor: STARTED.to_string(),
            index: 0,
            clock: FixtureClock::new(&config.clock),
            stubs: Vec::new(),
            planned: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// State the next registered stub will require.
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn chain(&self) -> &StateChain {
        &self.chain
    }

    /// Stubs registered so far, in order.
    pub fn stubs(&self) -> &[StubDefinition] {
        &self.stubs
    }

    pub fn into_stubs(self) -> Vec<StubDefinition> {
        self.stubs
    }

    /// Check `steps` as a chain continuing from the cursor and require the
    /// following registrations to match them in order.
    ///
    /// Nothing is registered and the configurator is unchanged on error.
    pub fn plan(&mut self, steps: &[PlannedStep]) -> Result<()> {
        let mut chain = self.chain.clone();
        let mut cursor = self.cursor.clone();
        let mut index = self.index;
        let mut transitions = VecDeque::with_capacity(steps.len());

        for planned in steps {
            let next = next_state(&mut index, &planned.step);
            let transition = Transition {
                method: planned.method,
                url: planned.url.clone(),
                current: cursor,
                next: next.clone(),
            };
            chain.push(transition.clone())?;
            transitions.push_back(transition);
            if planned.step.restart {
                index = 0;
            }
            cursor = next;
        }

        self.planned = Some(transitions);
        Ok(())
    }

    /// Planned transitions not registered yet.
    pub fn remaining(&self) -> usize {
        self.planned.as_ref().map(VecDeque::len).unwrap_or(0)
    }

    /// `PUT` creating the resource: 201, state `creating`, version + 1.
    pub async fn configure_create<T>(
        &mut self,
        url: UrlPattern,
        resource: &mut T,
        step: Step,
    ) -> Result<()>
    where
        T: ResponseObject + ?Sized,
    {
        let at = self.clock.tick();
        resource.mark_created(at);
        resource.set_verb(HttpMethod::Put);
        resource.bump_version();
        resource.set_state(&self.config.states.creating, at);

        let priority = self.config.priorities.resource;
        let body = Some(resource.as_renderable());
        self.register(HttpMethod::Put, url, 201, priority, body, step, BTreeMap::new())
            .await
    }

    /// `PUT` updating the resource: 200, state `updating`, version + 1.
    ///
    /// Apply the new spec or labels to `resource` before calling.
    pub async fn configure_update<T>(
        &mut self,
        url: UrlPattern,
        resource: &mut T,
        step: Step,
    ) -> Result<()>
    where
        T: ResponseObject + ?Sized,
    {
        let at = self.clock.tick();
        resource.touch(at);
        resource.set_verb(HttpMethod::Put);
        resource.bump_version();
        resource.set_state(&self.config.states.updating, at);

        let priority = self.config.priorities.resource;
        let body = Some(resource.as_renderable());
        self.register(HttpMethod::Put, url, 200, priority, body, step, BTreeMap::new())
            .await
    }

    /// `GET` once the resource settled: 200, state `active`.
    pub async fn configure_get<T>(
        &mut self,
        url: UrlPattern,
        resource: &mut T,
        step: Step,
    ) -> Result<()>
    where
        T: ResponseObject + ?Sized,
    {
        let at = self.clock.tick();
        resource.set_verb(HttpMethod::Get);
        resource.set_state(&self.config.states.active, at);

        let priority = self.config.priorities.resource;
        let body = Some(resource.as_renderable());
        self.register(HttpMethod::Get, url, 200, priority, body, step, BTreeMap::new())
            .await
    }

    /// `DELETE`: 202 without a body; the object is left in state `deleting`.
    pub async fn configure_delete<T>(
        &mut self,
        url: UrlPattern,
        resource: &mut T,
        step: Step,
    ) -> Result<()>
    where
        T: ResponseObject + ?Sized,
    {
        let at = self.clock.tick();
        resource.set_verb(HttpMethod::Delete);
        resource.set_state(&self.config.states.deleting, at);

        let priority = self.config.priorities.resource;
        self.register(HttpMethod::Delete, url, 202, priority, None, step, BTreeMap::new())
            .await
    }

    /// `GET` after deletion: 404 without a body.
    pub async fn configure_get_not_found(&mut self, url: UrlPattern, step: Step) -> Result<()> {
        self.clock.tick();
        let priority = self.config.priorities.resource;
        self.register(HttpMethod::Get, url, 404, priority, None, step, BTreeMap::new())
            .await
    }

    /// `POST` to an action endpoint: 202 without a body. The resource is
    /// left untouched.
    pub async fn configure_action(&mut self, url: UrlPattern, step: Step) -> Result<()> {
        self.clock.tick();
        let priority = self.config.priorities.action;
        self.register(HttpMethod::Post, url, 202, priority, None, step, BTreeMap::new())
            .await
    }

    /// `GET` of a read-only resource, rendered as is.
    pub async fn configure_get_static(
        &mut self,
        url: UrlPattern,
        resource: &dyn Renderable,
        step: Step,
    ) -> Result<()> {
        self.clock.tick();
        let priority = self.config.priorities.resource;
        self.register(HttpMethod::Get, url, 200, priority, Some(resource), step, BTreeMap::new())
            .await
    }

    /// `GET` of a collection: 200 with every item rendered by its own
    /// template, gated on the selector's `limit` and `labels` values.
    pub async fn configure_get_list(
        &mut self,
        locator: &Locator,
        items: &[&dyn Renderable],
        selector: &ListSelector,
        step: Step,
    ) -> Result<()> {
        self.clock.tick();
        let mut rendered = Vec::with_capacity(items.len());
        for item in items {
            if let Some(body) = self.registrar.engine().render(*item)? {
                rendered.push(body);
            }
        }
        let list = ListResponse {
            items: rendered,
            metadata: ListMetadata {
                provider: locator.provider().to_string(),
                resource: locator.collection(),
                verb: HttpMethod::Get.as_str().to_string(),
            },
        };

        let mut query = BTreeMap::new();
        if let Some(limit) = selector.limit {
            query.insert("limit".to_string(), ValueMatcher::EqualTo(limit.to_string()));
        }
        if let Some(labels) = selector.label_query() {
            query.insert("labels".to_string(), ValueMatcher::EqualTo(labels));
        }

        let priority = self.config.priorities.list;
        self.register(
            HttpMethod::Get,
            locator.collection_url(),
            200,
            priority,
            Some(&list),
            step,
            query,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn register(
        &mut self,
        method: HttpMethod,
        url: UrlPattern,
        status: u16,
        priority: u32,
        response: Option<&dyn Renderable>,
        step: Step,
        query: BTreeMap<String, ValueMatcher>,
    ) -> Result<()> {
        let next = next_state(&mut self.index, &step);
        let transition = Transition {
            method,
            url: url.clone(),
            current: self.cursor.clone(),
            next: next.clone(),
        };
        self.chain.check(&transition)?;
        if let Some(planned) = &self.planned {
            if planned.front() != Some(&transition) {
                return Err(ChainError::Unplanned {
                    scenario: self.name.clone(),
                    expected: planned
                        .front()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "end of plan".to_string()),
                    actual: transition.to_string(),
                }
                .into());
            }
        }

        let call = StubCall {
            scenario: &self.name,
            url,
            current: &self.cursor,
            next: &next,
            status,
            priority,
            response,
        };
        let stub = match method {
            HttpMethod::Put => self.registrar.put(call).await?,
            HttpMethod::Post => self.registrar.post(call).await?,
            HttpMethod::Delete => self.registrar.delete(call).await?,
            HttpMethod::Get if !query.is_empty() => self.registrar.get_list(call, query).await?,
            HttpMethod::Get if status == 404 => self.registrar.get_not_found(call).await?,
            HttpMethod::Get => self.registrar.get(call).await?,
        };

        self.chain.push(transition)?;
        if let Some(planned) = self.planned.as_mut() {
            planned.pop_front();
        }
        self.stubs.push(stub);
        if step.restart {
            self.index = 0;
        }
        self.cursor = next;
        Ok(())
    }
}

/// State a step leads to; unlabelled steps take the next `State.<n>`.
fn next_state(index: &mut u32, step: &Step) -> String {
    if step.restart {
        return STARTED.to_string();
    }
    match &step.label {
        Some(label) => label.clone(),
        None => {
            *index += 1;
            format!("State.{}", index)
        }
    }
}
