//! Expression evaluator
//!
//! Path lookups borrow from the render root wherever possible; only values
//! produced by literals and functions are allocated.

use chartwright_core::ValueNode;
use chartwright_core::value::NIL;
use std::sync::Arc;

use crate::ast::{Expr, Location, PathBase, Pipeline};
use crate::error::TemplateErrorKind;
use crate::functions::{self, Builtin};
use crate::parser;
use crate::registry::TemplateRegistry;
use crate::renderer::{Frame, RenderResult, Renderer};
use crate::scope::{Scope, Slot};

impl Renderer<'_> {
    pub(crate) fn eval_pipeline<'a>(
        &self,
        pipeline: &Pipeline,
        scope: &Scope<'a>,
        frame: &Frame<'_>,
    ) -> RenderResult<Slot<'a>> {
        self.eval(&pipeline.expr, scope, frame, pipeline.location)
    }

    fn eval<'a>(
        &self,
        expr: &Expr,
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        location: Location,
    ) -> RenderResult<Slot<'a>> {
        match expr {
            Expr::Literal(value) => Ok(Slot::owned(value.clone())),
            Expr::Path { base, fields } => {
                let start = match base {
                    PathBase::Dot => scope.dot().clone(),
                    PathBase::Root => Slot::Borrowed(scope.root()),
                    PathBase::Var(name) => scope.lookup(name).ok_or_else(|| {
                        frame.error(
                            TemplateErrorKind::UndefinedVariable,
                            format!("undefined variable `${}`", name),
                            location,
                        )
                    })?,
                    PathBase::Expr(inner) => self.eval(inner, scope, frame, location)?,
                };
                walk(start, fields).map_err(|message| {
                    frame.error(TemplateErrorKind::PathOnScalar, message, location)
                })
            }
            Expr::Call { func, args } => self.call(*func, args, scope, frame, location),
        }
    }

    fn call<'a>(
        &self,
        func: Builtin,
        args: &[Expr],
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        location: Location,
    ) -> RenderResult<Slot<'a>> {
        match func {
            // `and` and `or` stop at the deciding operand and return it
            Builtin::And | Builtin::Or => {
                let mut last = Slot::owned(ValueNode::Null);
                for arg in args {
                    last = self.eval(arg, scope, frame, location)?;
                    if last.is_truthy() == (func == Builtin::Or) {
                        break;
                    }
                }
                Ok(last)
            }
            Builtin::Include => {
                let (name, dot) = self.name_and_dot(args, scope, frame, location)?;
                let fragment = self.resolve(&name, location, frame)?;
                let mut out = String::new();
                self.render_fragment(&fragment, dot, scope, frame, location, &mut out)?;
                Ok(Slot::owned(out.into()))
            }
            Builtin::Tpl => {
                let (text, dot) = self.name_and_dot(args, scope, frame, location)?;
                self.tpl(&text, dot, scope, frame, location).map(|out| Slot::owned(out.into()))
            }
            _ => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg, scope, frame, location))
                    .collect::<RenderResult<Vec<_>>>()?;
                let refs: Vec<&ValueNode> = values.iter().map(|v| &**v).collect();
                functions::call(func, &refs)
                    .map(Slot::owned)
                    .map_err(|e| frame.error(e.kind, e.message, location))
            }
        }
    }

    /// First argument as text, second as the new `.`
    fn name_and_dot<'a>(
        &self,
        args: &[Expr],
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        location: Location,
    ) -> RenderResult<(String, Slot<'a>)> {
        let text = match args.first() {
            Some(arg) => self.eval(arg, scope, frame, location)?.to_text(),
            None => String::new(),
        };
        let dot = match args.get(1) {
            Some(arg) => self.eval(arg, scope, frame, location)?,
            None => Slot::owned(ValueNode::Null),
        };
        Ok((text, dot))
    }

    /// Parse and render a template string at run time
    ///
    /// Fragments it defines are visible only to itself.
    fn tpl<'a>(
        &self,
        text: &str,
        dot: Slot<'a>,
        scope: &Scope<'a>,
        frame: &Frame<'_>,
        location: Location,
    ) -> RenderResult<String> {
        let depth = self.enter("tpl", location, frame)?;
        let template = parser::parse(frame.file, text)?;

        let mut registry = TemplateRegistry::with_parent(Arc::clone(&self.registry));
        registry.register_template(&template)?;
        let renderer = Renderer {
            registry: Arc::new(registry),
            max_depth: self.max_depth,
            cancel: self.cancel,
        };

        let inner = Frame {
            file: frame.file,
            source: &template.source,
            depth,
        };
        let mut out = String::new();
        renderer.render_nodes(&template.nodes, &scope.enter_fragment(dot), &inner, &mut out)?;
        Ok(out)
    }
}

/// Follow `fields` from `start`
///
/// Missing keys and out-of-range indexes give nil. Stepping into a scalar is
/// an error.
fn walk<'a>(start: Slot<'a>, fields: &[String]) -> Result<Slot<'a>, String> {
    if fields.is_empty() {
        return Ok(start);
    }
    match start {
        Slot::Borrowed(value) => walk_ref(value, fields).map(Slot::Borrowed),
        Slot::Shared(rc) => walk_ref(&rc, fields).map(|value| Slot::owned(value.clone())),
    }
}

fn walk_ref<'v>(start: &'v ValueNode, fields: &[String]) -> Result<&'v ValueNode, String> {
    let mut current = start;
    for field in fields {
        current = match current {
            ValueNode::Mapping(map) => map.get(field).unwrap_or(&NIL),
            ValueNode::Null => &NIL,
            ValueNode::Sequence(items) => match field.parse::<usize>() {
                Ok(index) => items.get(index).unwrap_or(&NIL),
                Err(_) => {
                    return Err(format!(
                        "cannot access field `{}` on a sequence; use a numeric index",
                        field
                    ));
                }
            },
            scalar => {
                return Err(format!(
                    "cannot access field `{}` on {} value `{}`",
                    field,
                    scalar.kind_name(),
                    scalar.to_text()
                ));
            }
        };
    }
    Ok(current)
}
