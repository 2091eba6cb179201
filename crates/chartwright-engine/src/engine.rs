//! Template engine: render orchestration for strings and whole charts

use chartwright_core::{Chart, MergePolicy, ReleaseInfo, ResolvedChart, TemplateContext, ValueNode, Values};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::assembler::{self, RenderedDocument};
use crate::ast::ParsedTemplate;
use crate::error::{Result, TemplateError, TemplateErrorKind};
use crate::parser;
use crate::registry::TemplateRegistry;
use crate::renderer::Renderer;

/// Default bound on nested `include`/`template`/`tpl`
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 64;

/// Result of rendering a chart
#[derive(Debug, Clone, Default)]
pub struct RenderedChart {
    /// Rendered files in render order, blank ones included
    pub documents: Vec<RenderedDocument>,

    /// Rendered `NOTES.txt` of the top-level chart
    pub notes: Option<String>,
}

impl RenderedChart {
    /// Multi-document YAML for install/upgrade
    pub fn assemble(&self) -> String {
        assembler::assemble(&self.documents)
    }

    /// Rendered text of one file
    pub fn get(&self, id: &str) -> Option<&str> {
        self.documents
            .iter()
            .find(|doc| doc.id == id)
            .map(|doc| doc.text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderedDocument> {
        self.documents.iter()
    }
}

/// Template engine builder
pub struct EngineBuilder {
    merge_policy: MergePolicy,
    parallel: bool,
    max_include_depth: usize,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            merge_policy: MergePolicy::Strict,
            parallel: false,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    /// How shape conflicts between value layers are handled
    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Render template files on the rayon pool
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        Engine {
            merge_policy: self.merge_policy,
            parallel: self.parallel,
            max_include_depth: self.max_include_depth,
        }
    }
}

/// The template engine
#[derive(Debug, Clone)]
pub struct Engine {
    merge_policy: MergePolicy,
    parallel: bool,
    max_include_depth: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// One file ready to render, with everything it reads frozen
struct RenderUnit {
    id: String,
    template: ParsedTemplate,
    root: Arc<ValueNode>,
    registry: Arc<TemplateRegistry>,
    notes: bool,
}

impl Engine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    /// Create a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Render a template against an arbitrary data tree (`.` is `data`)
    pub fn render_with_data(&self, name: &str, template: &str, data: &ValueNode) -> Result<String> {
        let parsed = parser::parse(name, template)?;
        let mut registry = TemplateRegistry::new();
        registry.register_template(&parsed)?;

        let text = Renderer::new(Arc::new(registry), self.max_include_depth).render(&parsed, data)?;
        Ok(text)
    }

    /// Render a single template for preview, with a document header
    pub fn render_string(
        &self,
        template: &str,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<String> {
        let text = self.render_with_data(template_name, template, &context.to_node())?;
        Ok(assembler::preview(template_name, &text))
    }

    /// Render every template of a chart and its enabled subcharts
    ///
    /// Values are merged and every file is parsed before anything renders.
    /// The first failure fails the whole pass.
    pub fn render_chart(
        &self,
        chart: &Chart,
        release: &ReleaseInfo,
        overrides: &Values,
    ) -> Result<RenderedChart> {
        release.validate()?;
        let resolved = chart.resolve(overrides, self.merge_policy)?;

        let mut units = Vec::new();
        self.collect_units(&resolved, release, None, true, &mut units)?;

        tracing::debug!(
            chart = %chart.name(),
            files = units.len(),
            parallel = self.parallel,
            "rendering chart"
        );

        let texts = if self.parallel {
            self.render_parallel(&units)?
        } else {
            units
                .iter()
                .map(|unit| self.render_unit(unit, None))
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut rendered = RenderedChart::default();
        for (unit, text) in units.into_iter().zip(texts) {
            if unit.notes {
                rendered.notes = Some(text);
            } else {
                rendered.documents.push(RenderedDocument::new(unit.id, text));
            }
        }
        Ok(rendered)
    }

    fn collect_units(
        &self,
        resolved: &ResolvedChart<'_>,
        release: &ReleaseInfo,
        parent: Option<Arc<TemplateRegistry>>,
        top_level: bool,
        units: &mut Vec<RenderUnit>,
    ) -> Result<()> {
        let chart = resolved.chart;
        let context = TemplateContext::new(
            resolved.values.clone(),
            release.clone(),
            chart.metadata.clone(),
        );
        let root = Arc::new(context.to_node());

        let mut registry = match parent {
            Some(parent) => TemplateRegistry::with_parent(parent),
            None => TemplateRegistry::new(),
        };

        let mut parsed = Vec::with_capacity(chart.templates.len());
        for file in &chart.templates {
            let id = format!("{}/{}", resolved.path, file.path);
            let template = parser::parse(&id, &file.source)?;
            registry.register_template(&template)?;
            parsed.push((file, id, template));
        }
        tracing::debug!(
            chart = %resolved.path,
            templates = parsed.len(),
            named = registry.len(),
            "template registry populated"
        );

        let registry = Arc::new(registry);
        for (file, id, template) in parsed {
            if file.is_partial() {
                continue;
            }
            if file.is_notes() && !top_level {
                tracing::debug!(file = %id, "ignoring subchart notes");
                continue;
            }
            units.push(RenderUnit {
                id,
                template,
                root: Arc::clone(&root),
                registry: Arc::clone(&registry),
                notes: file.is_notes(),
            });
        }

        for sub in &resolved.subcharts {
            self.collect_units(sub, release, Some(Arc::clone(&registry)), false, units)?;
        }
        Ok(())
    }

    fn render_unit(
        &self,
        unit: &RenderUnit,
        cancel: Option<&AtomicBool>,
    ) -> std::result::Result<String, TemplateError> {
        tracing::debug!(file = %unit.id, "rendering template");
        let mut renderer = Renderer::new(Arc::clone(&unit.registry), self.max_include_depth);
        if let Some(cancel) = cancel {
            renderer = renderer.with_cancel(cancel);
        }
        let result = renderer.render(&unit.template, &unit.root);
        match &result {
            Ok(text) => tracing::debug!(file = %unit.id, bytes = text.len(), "rendered template"),
            Err(err) if err.kind != TemplateErrorKind::Cancelled => {
                tracing::debug!(file = %unit.id, error = %err, "template failed")
            }
            Err(_) => {}
        }
        result
    }

    /// Render all units on the rayon pool
    ///
    /// A failing file raises the shared flag so siblings stop early. The
    /// reported error is the first real failure in file order.
    fn render_parallel(&self, units: &[RenderUnit]) -> Result<Vec<String>> {
        let cancel = AtomicBool::new(false);
        let results: Vec<_> = units
            .par_iter()
            .map(|unit| {
                let result = self.render_unit(unit, Some(&cancel));
                if result.is_err() {
                    cancel.store(true, Ordering::Relaxed);
                }
                result
            })
            .collect();

        let mut texts = Vec::with_capacity(results.len());
        let mut cancelled = None;
        for result in results {
            match result {
                Ok(text) => texts.push(text),
                Err(err) if err.kind == TemplateErrorKind::Cancelled => {
                    cancelled.get_or_insert(err);
                }
                Err(err) => return Err(err.into()),
            }
        }
        match cancelled {
            Some(err) => Err(err.into()),
            None => Ok(texts),
        }
    }
}
