//! Control-flow renderer
//!
//! Walks a parsed template depth-first and writes the output for one file.
//! Expression evaluation lives in [`crate::eval`].

use chartwright_core::ValueNode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ast::{Fragment, Location, Node, ParsedTemplate, Pipeline, RangeVars};
use crate::error::{TemplateError, TemplateErrorKind};
use crate::registry::TemplateRegistry;
use crate::scope::{Scope, Slot};
use crate::suggestions::suggest_template_name;

pub type RenderResult<T> = std::result::Result<T, TemplateError>;

/// The file being rendered, for error locations
pub(crate) struct Frame<'f> {
    pub file: &'f str,
    pub source: &'f str,
    /// Nesting of `include`, `template` and `tpl`
    pub depth: usize,
}

impl Frame<'_> {
    pub fn error(
        &self,
        kind: TemplateErrorKind,
        message: impl Into<String>,
        location: Location,
    ) -> TemplateError {
        TemplateError::new(kind, message, self.file, self.source, Some(location))
    }
}

pub struct Renderer<'c> {
    pub(crate) registry: Arc<TemplateRegistry>,
    pub(crate) max_depth: usize,
    pub(crate) cancel: Option<&'c AtomicBool>,
}

impl<'c> Renderer<'c> {
    pub fn new(registry: Arc<TemplateRegistry>, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
            cancel: None,
        }
    }

    /// Stop at the next node once `cancel` is set
    pub fn with_cancel(mut self, cancel: &'c AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Render a parsed file against `root`
    pub fn render(&self, template: &ParsedTemplate, root: &ValueNode) -> RenderResult<String> {
        let frame = Frame {
            file: &template.name,
            source: &template.source,
            depth: 0,
        };
        let mut out = String::new();
        self.render_nodes(&template.nodes, &Scope::new(root), &frame, &mut out)?;
        Ok(out)
    }

    pub(crate) fn render_nodes<'a>(
        &self,
        nodes: &[Node],
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> RenderResult<()> {
        // Declarations extend this scope for the rest of the block
        let mut scope = scope.clone();

        for node in nodes {
            self.check_cancelled(frame)?;

            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(pipeline) => {
                    let value = self.eval_pipeline(pipeline, &scope, frame)?;
                    if pipeline.decl.is_some() {
                        scope = self.declare(pipeline, value, &scope, frame)?;
                    } else {
                        out.push_str(&value.to_text());
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => self.render_if(branches, otherwise.as_deref(), &scope, frame, out)?,
                Node::Range {
                    vars,
                    pipeline,
                    body,
                    otherwise,
                } => self.render_range(vars, pipeline, body, otherwise.as_deref(), &scope, frame, out)?,
                Node::With {
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let value = self.eval_pipeline(pipeline, &scope, frame)?;
                    if value.is_truthy() {
                        let inner = self.declare(pipeline, value.clone(), &scope, frame)?;
                        self.render_nodes(body, &inner.narrow(value), frame, out)?;
                    } else if let Some(otherwise) = otherwise {
                        self.render_nodes(otherwise, &scope, frame, out)?;
                    }
                }
                Node::Template {
                    name,
                    arg,
                    location,
                } => {
                    let fragment = self.resolve(name, *location, frame)?;
                    let dot = match arg {
                        Some(pipeline) => self.eval_pipeline(pipeline, &scope, frame)?,
                        None => Slot::owned(ValueNode::Null),
                    };
                    self.render_fragment(&fragment, dot, &scope, frame, *location, out)?;
                }
            }
        }
        Ok(())
    }

    fn render_if<'a>(
        &self,
        branches: &[(Pipeline, Vec<Node>)],
        otherwise: Option<&[Node]>,
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> RenderResult<()> {
        // Variables declared in a condition stay visible in later branches
        let mut scope = scope.clone();
        for (condition, body) in branches {
            let value = self.eval_pipeline(condition, &scope, frame)?;
            let truthy = value.is_truthy();
            scope = self.declare(condition, value, &scope, frame)?;
            if truthy {
                return self.render_nodes(body, &scope, frame, out);
            }
        }
        self.render_else(otherwise, &scope, frame, out)
    }

    #[allow(clippy::too_many_arguments)]
    fn render_range<'a>(
        &self,
        vars: &RangeVars,
        pipeline: &Pipeline,
        body: &[Node],
        otherwise: Option<&[Node]>,
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> RenderResult<()> {
        let collection = self.eval_pipeline(pipeline, scope, frame)?;

        // Integer ranges are counted, never collected
        if let ValueNode::Int(n) = &*collection {
            if *n <= 0 {
                return self.render_else(otherwise, scope, frame, out);
            }
            for i in 0..*n {
                let entry = (ValueNode::Int(i), Slot::owned(ValueNode::Int(i)));
                self.render_iteration(vars, body, entry, scope, frame, out)?;
            }
            return Ok(());
        }

        let Some(items) = elements(&collection) else {
            return Err(frame.error(
                TemplateErrorKind::TypeCoercion,
                format!(
                    "range can't iterate over {} `{}`",
                    collection.kind_name(),
                    collection.to_text()
                ),
                pipeline.location,
            ));
        };

        if items.is_empty() {
            return self.render_else(otherwise, scope, frame, out);
        }
        for entry in items {
            self.render_iteration(vars, body, entry, scope, frame, out)?;
        }
        Ok(())
    }

    /// One pass of a `range` body with `.` and the loop variables set
    fn render_iteration<'a>(
        &self,
        vars: &RangeVars,
        body: &[Node],
        (key, item): (ValueNode, Slot<'a>),
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> RenderResult<()> {
        self.check_cancelled(frame)?;
        let mut iteration = scope.narrow(item.clone());
        if let Some(name) = &vars.key {
            iteration = iteration.bind(name, Slot::owned(key));
        }
        if let Some(name) = &vars.value {
            iteration = iteration.bind(name, item);
        }
        self.render_nodes(body, &iteration, frame, out)
    }

    fn render_else<'a>(
        &self,
        otherwise: Option<&[Node]>,
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        out: &mut String,
    ) -> RenderResult<()> {
        match otherwise {
            Some(body) => self.render_nodes(body, scope, frame, out),
            None => Ok(()),
        }
    }

    /// Apply a pipeline's `:=` or `=`, if it has one
    ///
    /// `:=` adds a binding. `=` overwrites the nearest existing one.
    fn declare<'a>(
        &self,
        pipeline: &Pipeline,
        value: Slot<'a>,
        scope: &Scope<'a>,
        frame: &Frame<'_>,
    ) -> RenderResult<Scope<'a>> {
        let Some(decl) = &pipeline.decl else {
            return Ok(scope.clone());
        };
        if !decl.assign {
            return Ok(scope.bind(&decl.name, value));
        }
        if scope.assign(&decl.name, value) {
            Ok(scope.clone())
        } else {
            Err(frame.error(
                TemplateErrorKind::UndefinedVariable,
                format!("undefined variable `${}`", decl.name),
                pipeline.location,
            ))
        }
    }

    pub(crate) fn resolve(
        &self,
        name: &str,
        location: Location,
        frame: &Frame<'_>,
    ) -> RenderResult<Arc<Fragment>> {
        self.registry.resolve(name).ok_or_else(|| {
            frame
                .error(
                    TemplateErrorKind::UnresolvedTemplateName,
                    format!("no template named `{}`", name),
                    location,
                )
                .with_suggestion(suggest_template_name(name, self.registry.names()))
        })
    }

    /// Fail once nesting would exceed the configured depth
    pub(crate) fn enter(&self, what: &str, location: Location, frame: &Frame<'_>) -> RenderResult<usize> {
        let depth = frame.depth + 1;
        if depth > self.max_depth {
            return Err(frame.error(
                TemplateErrorKind::IncludeDepth,
                format!(
                    "{} exceeded the maximum nesting depth of {}",
                    what, self.max_depth
                ),
                location,
            ));
        }
        Ok(depth)
    }

    pub(crate) fn render_fragment<'a>(
        &self,
        fragment: &Fragment,
        dot: Slot<'a>,
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        location: Location,
        out: &mut String,
    ) -> RenderResult<()> {
        let depth = self.enter(&format!("template `{}`", fragment.name), location, frame)?;
        let inner = Frame {
            file: &fragment.file,
            source: &fragment.source,
            depth,
        };
        self.render_nodes(&fragment.body, &scope.enter_fragment(dot), &inner, out)
    }

    fn check_cancelled(&self, frame: &Frame<'_>) -> RenderResult<()> {
        if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(TemplateError::new(
                TemplateErrorKind::Cancelled,
                "rendering cancelled after another file failed",
                frame.file,
                frame.source,
                None,
            ));
        }
        Ok(())
    }
}

/// Iteration order of a `range` collection, or `None` if it can't be ranged
///
/// Keys are indexes for sequences, keys for mappings.
fn elements<'a>(collection: &Slot<'a>) -> Option<Vec<(ValueNode, Slot<'a>)>> {
    let items = match collection {
        Slot::Borrowed(value) => borrowed_elements(*value)?,
        Slot::Shared(rc) => borrowed_elements(rc)?
            .into_iter()
            .map(|(key, item)| (key, Slot::owned(item.into_owned())))
            .collect(),
    };
    Some(items)
}

fn borrowed_elements<'v>(value: &'v ValueNode) -> Option<Vec<(ValueNode, Slot<'v>)>> {
    Some(match value {
        ValueNode::Null => Vec::new(),
        ValueNode::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (ValueNode::Int(i as i64), Slot::Borrowed(item)))
            .collect(),
        ValueNode::Mapping(map) => map
            .iter()
            .map(|(k, item)| (ValueNode::String(k.clone()), Slot::Borrowed(item)))
            .collect(),
        _ => return None,
    })
}
