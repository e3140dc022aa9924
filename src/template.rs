//! Template engine for response bodies.
//!
//! Uses Handlebars in strict mode. Templates emit values through the `json`
//! helper, which serializes the referenced field as JSON: strings come out
//! quoted, numbers and booleans bare, objects and arrays intact. The rendered
//! text is parsed back before it is handed out.

use crate::error::TemplateError;
use crate::resource::{Renderable, ResourceKind};
use handlebars::{Handlebars, RenderErrorReason};
use serde_json::Value;
use std::collections::BTreeSet;

const ENVELOPE_PARTIAL: &str = include_str!("../templates/envelope.hbs");
const STATUS_PARTIAL: &str = include_str!("../templates/status.hbs");

/// Built-in body templates, keyed by template name.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("role", include_str!("../templates/role.json.hbs")),
    ("role-assignment", include_str!("../templates/role-assignment.json.hbs")),
    ("workspace", include_str!("../templates/workspace.json.hbs")),
    ("image", include_str!("../templates/image.json.hbs")),
    ("block-storage", include_str!("../templates/block-storage.json.hbs")),
    ("network", include_str!("../templates/network.json.hbs")),
    ("internet-gateway", include_str!("../templates/internet-gateway.json.hbs")),
    ("route-table", include_str!("../templates/route-table.json.hbs")),
    ("subnet", include_str!("../templates/subnet.json.hbs")),
    ("security-group", include_str!("../templates/security-group.json.hbs")),
    ("public-ip", include_str!("../templates/public-ip.json.hbs")),
    ("nic", include_str!("../templates/nic.json.hbs")),
    ("instance", include_str!("../templates/instance.json.hbs")),
    ("sku", include_str!("../templates/sku.json.hbs")),
    ("list", include_str!("../templates/list.json.hbs")),
];

/// Template engine for rendering response bodies.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    /// Names registered with an empty template: status-only responses
    status_only: BTreeSet<String>,
}

impl TemplateEngine {
    /// Create an engine with the built-in resource templates registered.
    pub fn new() -> Result<Self, TemplateError> {
        let mut engine = Self::empty()?;
        for (name, template) in BUILTIN_TEMPLATES {
            engine.register(name, template)?;
        }
        Ok(engine)
    }

    /// Create an engine with only the shared partials registered.
    pub fn empty() -> Result<Self, TemplateError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_helper("json", Box::new(json_helper));

        // Output is JSON, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        for (name, partial) in [("envelope", ENVELOPE_PARTIAL), ("status", STATUS_PARTIAL)] {
            handlebars
                .register_partial(name, partial)
                .map_err(|e| compile_error(name, e))?;
        }

        Ok(Self {
            handlebars,
            status_only: BTreeSet::new(),
        })
    }

    /// Register (or replace) a named template. An empty template means the
    /// stub carries no body.
    pub fn register(&mut self, name: &str, template: &str) -> Result<(), TemplateError> {
        if template.trim().is_empty() {
            self.handlebars.unregister_template(name);
            self.status_only.insert(name.to_string());
            return Ok(());
        }
        self.status_only.remove(name);
        self.handlebars
            .register_template_string(name, template)
            .map_err(|e| compile_error(name, e))
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.status_only.contains(name) || self.handlebars.has_template(name)
    }

    /// Whether every resource kind has a template.
    pub fn covers_all_kinds(&self) -> bool {
        ResourceKind::DEPENDENCY_ORDER
            .iter()
            .chain(std::iter::once(&ResourceKind::Sku))
            .all(|kind| self.has_template(kind.as_str()))
    }

    /// Render `data` with its registered template.
    ///
    /// Returns `None` when the template is empty.
    pub fn render(&self, data: &dyn Renderable) -> Result<Option<Value>, TemplateError> {
        let name = data.template_name();
        if self.status_only.contains(name) {
            return Ok(None);
        }
        if !self.handlebars.has_template(name) {
            return Err(TemplateError::UnknownTemplate(name.to_string()));
        }
        let context = data.to_context()?;
        let rendered = self
            .handlebars
            .render(name, &context)
            .map_err(|e| render_error(name, e))?;
        parse_rendered(name, &rendered).map(Some)
    }

    /// Render an ad hoc template string against `data`.
    pub fn render_template(
        &self,
        template: &str,
        data: &dyn Renderable,
    ) -> Result<Option<Value>, TemplateError> {
        if template.trim().is_empty() {
            return Ok(None);
        }
        let name = data.template_name();
        let context = data.to_context()?;
        let rendered = self
            .handlebars
            .render_template(template, &context)
            .map_err(|e| render_error(name, e))?;
        parse_rendered(name, &rendered).map(Some)
    }
}

fn parse_rendered(name: &str, rendered: &str) -> Result<Value, TemplateError> {
    serde_json::from_str(rendered).map_err(|source| TemplateError::InvalidJson {
        template: name.to_string(),
        source,
    })
}

fn compile_error(name: &str, source: handlebars::TemplateError) -> TemplateError {
    TemplateError::Compile {
        template: name.to_string(),
        source: Box::new(source),
    }
}

fn render_error(name: &str, source: handlebars::RenderError) -> TemplateError {
    if let RenderErrorReason::MissingVariable(path) = source.reason() {
        return TemplateError::MissingField {
            template: name.to_string(),
            path: path.clone().unwrap_or_default(),
        };
    }
    TemplateError::Render {
        template: name.to_string(),
        source: Box::new(source),
    }
}

// Custom Handlebars helpers

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h
        .param(0)
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("json", 0))?;
    if param.is_value_missing() {
        return Err(RenderErrorReason::MissingVariable(param.relative_path().cloned()).into());
    }
    let json = serde_json::to_string(param.value())
        .map_err(|e| RenderErrorReason::Other(e.to_string()))?;
    out.write(&json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Sample {
        name: String,
        count: u64,
        nested: Nested,
    }

    #[derive(Serialize)]
    struct Nested {
        enabled: bool,
        tags: Vec<String>,
    }

    impl Renderable for Sample {
        fn template_name(&self) -> &str {
            "sample"
        }

        fn to_context(&self) -> Result<Value, TemplateError> {
            serde_json::to_value(self).map_err(TemplateError::Context)
        }
    }

    fn sample() -> Sample {
        Sample {
            name: "w\"1".to_string(),
            count: 2,
            nested: Nested {
                enabled: true,
                tags: vec!["a".to_string()],
            },
        }
    }

    #[test]
    fn test_strings_quoted_numbers_bare() {
        let engine = TemplateEngine::empty().unwrap();

        let result = engine
            .render_template(
                r#"{"name": {{json name}}, "count": {{json count}}, "on": {{json nested.enabled}}}"#,
                &sample(),
            )
            .unwrap()
            .unwrap();

        assert_eq!(result, json!({"name": "w\"1", "count": 2, "on": true}));
    }

    #[test]
    fn test_arrays_render_intact() {
        let engine = TemplateEngine::empty().unwrap();

        let result = engine
            .render_template(r#"{"tags": {{json nested.tags}}}"#, &sample())
            .unwrap()
            .unwrap();

        assert_eq!(result["tags"], json!(["a"]));
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let engine = TemplateEngine::empty().unwrap();

        let err = engine
            .render_template(r#"{"x": {{json nested.missing}}}"#, &sample())
            .unwrap_err();

        assert!(matches!(err, TemplateError::MissingField { ref path, .. } if path.contains("missing")));
    }

    #[test]
    fn test_invalid_json_output_is_an_error() {
        let engine = TemplateEngine::empty().unwrap();

        let err = engine
            .render_template(r#"{"name": {{json name}}"#, &sample())
            .unwrap_err();

        assert!(matches!(err, TemplateError::InvalidJson { .. }));
    }

    #[test]
    fn test_empty_template_means_no_body() {
        let mut engine = TemplateEngine::empty().unwrap();
        assert!(engine.render_template("  ", &sample()).unwrap().is_none());

        engine.register("sample", "").unwrap();
        assert!(engine.has_template("sample"));
        assert!(engine.render(&sample()).unwrap().is_none());
    }

    #[test]
    fn test_unknown_template() {
        let engine = TemplateEngine::empty().unwrap();
        assert!(matches!(
            engine.render(&sample()),
            Err(TemplateError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_registered_template_replaces_status_only() {
        let mut engine = TemplateEngine::empty().unwrap();
        engine.register("sample", "").unwrap();
        engine.register("sample", r#"{"count": {{json count}}}"#).unwrap();

        let body = engine.render(&sample()).unwrap().unwrap();
        assert_eq!(body["count"], 2);
    }

    #[test]
    fn test_builtin_templates_cover_every_kind() {
        let engine = TemplateEngine::new().unwrap();
        assert!(engine.covers_all_kinds());
        assert!(engine.has_template("list"));
    }
}
