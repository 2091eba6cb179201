//! Template parser
//!
//! Turns template source into a [`ParsedTemplate`] in three passes:
//!
//! 1. pest tokenizes text and `{{ ... }}` actions (`template.pest`)
//! 2. trim markers (`{{-` / `-}}`) strip whitespace from the neighbouring
//!    text, so trimming never reaches the evaluator
//! 3. the flat directive list is folded into a tree; `define` bodies are
//!    split out as fragments
//!
//! Function names are resolved and arity-checked here, so unknown functions
//! fail when a chart is loaded, not halfway through a render.

use chartwright_core::ValueNode;
use pest::Parser;
use pest::error::{InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest_derive::Parser;
use std::sync::Arc;

use crate::ast::{
    Declaration, Expr, Fragment, Location, Node, ParsedTemplate, PathBase, Pipeline, RangeVars,
};
use crate::error::{TemplateError, TemplateErrorKind};
use crate::functions::Builtin;
use crate::suggestions::suggest_unknown_function;

#[derive(Parser)]
#[grammar = "template.pest"]
struct TemplateParser;

type ParseResult<T> = std::result::Result<T, TemplateError>;

/// Characters removed by trim markers
const TRIM_CHARS: [char; 4] = [' ', '\t', '\r', '\n'];

/// Parse a template file
pub fn parse(name: &str, source: &str) -> ParseResult<ParsedTemplate> {
    let builder = Builder {
        name: name.to_string(),
        source: Arc::from(source),
    };

    let mut items = builder.tokenize()?;
    apply_trim_markers(&mut items);

    let mut tree = TreeBuilder {
        builder: &builder,
        items: items.into_iter(),
        defines: Vec::new(),
    };
    let nodes = tree.top_level()?;
    let defines = tree.defines;

    tracing::trace!(template = %name, nodes = nodes.len(), defines = defines.len(), "parsed template");

    Ok(ParsedTemplate {
        name: builder.name,
        source: builder.source,
        nodes,
        defines,
    })
}

/// One `{{ ... }}` action or run of text, before nesting
#[derive(Debug)]
enum Directive {
    Text(String),
    Comment,
    Output(Pipeline),
    If(Pipeline),
    ElseIf(Pipeline),
    Else,
    End,
    Range(RangeVars, Pipeline),
    With(Pipeline),
    Define(String),
    Template(String, Option<Pipeline>),
    Block(String, Pipeline),
}

#[derive(Debug)]
struct Item {
    directive: Directive,
    trim_left: bool,
    trim_right: bool,
    location: Location,
}

fn apply_trim_markers(items: &mut [Item]) {
    for i in 0..items.len() {
        if items[i].trim_left && i > 0 {
            if let Directive::Text(text) = &mut items[i - 1].directive {
                let kept = text.trim_end_matches(TRIM_CHARS).len();
                text.truncate(kept);
            }
        }
        if items[i].trim_right && i + 1 < items.len() {
            if let Directive::Text(text) = &mut items[i + 1].directive {
                *text = text.trim_start_matches(TRIM_CHARS).to_string();
            }
        }
    }
}

fn location_of(pair: &Pair<'_, Rule>) -> Location {
    let span = pair.as_span();
    let (line, column) = span.start_pos().line_col();
    Location {
        line,
        column,
        offset: span.start(),
        len: span.end() - span.start(),
    }
}

fn field_names(chain: &str) -> Vec<String> {
    chain.split('.').skip(1).map(str::to_string).collect()
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_if
            | Rule::kw_else
            | Rule::kw_end
            | Rule::kw_range
            | Rule::kw_with
            | Rule::kw_define
            | Rule::kw_template
            | Rule::kw_block
    )
}

fn rule_name(rule: &Rule) -> String {
    match rule {
        Rule::action_open => "`{{`",
        Rule::action_close => "`}}`",
        Rule::raw_text => "text",
        Rule::EOI => "end of template",
        Rule::pipeline | Rule::command | Rule::function_call | Rule::operand => "an expression",
        Rule::identifier => "a function name",
        Rule::string | Rule::raw_string => "a string",
        Rule::variable => "a variable",
        Rule::decl_op => "`:=`",
        other => return format!("{:?}", other),
    }
    .to_string()
}

struct Builder {
    name: String,
    source: Arc<str>,
}

impl Builder {
    fn error(
        &self,
        kind: TemplateErrorKind,
        message: impl Into<String>,
        location: Location,
    ) -> TemplateError {
        TemplateError::new(kind, message, &self.name, &self.source, Some(location))
    }

    fn syntax(&self, message: impl Into<String>, location: Location) -> TemplateError {
        self.error(TemplateErrorKind::Syntax, message, location)
    }

    fn pest_error(&self, err: pest::error::Error<Rule>) -> TemplateError {
        let err = err.renamed_rules(rule_name);
        let (line, column) = match err.line_col {
            LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
        };
        let (offset, len) = match err.location {
            InputLocation::Pos(pos) => (pos, 0),
            InputLocation::Span((start, end)) => (start, end - start),
        };

        let location = Location {
            line,
            column,
            offset,
            len,
        };
        let at_open = self
            .source
            .get(offset..)
            .is_some_and(|rest| rest.starts_with("{{"));
        let inside_open = self.source.get(..offset).is_some_and(|before| {
            before
                .rfind("{{")
                .is_some_and(|open| before.rfind("}}").is_none_or(|close| close < open))
        });
        let help = (at_open || inside_open)
            .then(|| "check that this action is closed with `}}` and holds a valid pipeline".to_string());

        self.syntax(format!("syntax error: {}", err.variant.message()), location)
            .with_suggestion(help)
    }

    fn tokenize(&self) -> ParseResult<Vec<Item>> {
        let mut pairs =
            TemplateParser::parse(Rule::template, &self.source).map_err(|e| self.pest_error(e))?;

        let mut items = Vec::new();
        let Some(template) = pairs.next() else {
            return Ok(items);
        };

        for pair in template.into_inner() {
            match pair.as_rule() {
                Rule::raw_text => items.push(Item {
                    location: location_of(&pair),
                    directive: Directive::Text(pair.as_str().to_string()),
                    trim_left: false,
                    trim_right: false,
                }),
                Rule::action => items.push(self.action(pair)?),
                _ => {}
            }
        }

        Ok(items)
    }

    fn action(&self, pair: Pair<'_, Rule>) -> ParseResult<Item> {
        let location = location_of(&pair);
        let mut trim_left = false;
        let mut trim_right = false;
        let mut directive = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::action_open => trim_left = inner.as_str().ends_with('-'),
                Rule::action_close => trim_right = inner.as_str().starts_with('-'),
                _ => directive = Some(self.directive(inner, location)?),
            }
        }

        let directive = directive.ok_or_else(|| self.syntax("empty action", location))?;
        Ok(Item {
            directive,
            trim_left,
            trim_right,
            location,
        })
    }

    fn directive(&self, pair: Pair<'_, Rule>, location: Location) -> ParseResult<Directive> {
        let rule = pair.as_rule();
        match rule {
            Rule::comment => return Ok(Directive::Comment),
            Rule::pipeline => return Ok(Directive::Output(self.pipeline(pair)?)),
            _ => {}
        }

        let mut parts = pair.into_inner().filter(|p| !is_keyword(p.as_rule()));
        let mut next = || {
            parts
                .next()
                .ok_or_else(|| self.syntax("incomplete action", location))
        };

        Ok(match rule {
            Rule::if_action => Directive::If(self.pipeline(next()?)?),
            Rule::else_if_action => Directive::ElseIf(self.pipeline(next()?)?),
            Rule::else_action => Directive::Else,
            Rule::end_action => Directive::End,
            Rule::with_action => Directive::With(self.pipeline(next()?)?),
            Rule::range_action => {
                let first = next()?;
                if first.as_rule() == Rule::range_vars {
                    let vars = self.range_vars(first);
                    Directive::Range(vars, self.pipeline(next()?)?)
                } else {
                    Directive::Range(RangeVars::default(), self.pipeline(first)?)
                }
            }
            Rule::define_action => Directive::Define(self.string_literal(next()?)?),
            Rule::template_action => {
                let name = self.string_literal(next()?)?;
                let arg = next().ok().map(|p| self.pipeline(p)).transpose()?;
                Directive::Template(name, arg)
            }
            Rule::block_action => {
                let name = self.string_literal(next()?)?;
                Directive::Block(name, self.pipeline(next()?)?)
            }
            other => {
                return Err(self.syntax(format!("unexpected {}", rule_name(&other)), location));
            }
        })
    }

    fn range_vars(&self, pair: Pair<'_, Rule>) -> RangeVars {
        let names: Vec<String> = pair
            .into_inner()
            .filter(|p| p.as_rule() == Rule::variable)
            .map(|p| p.as_str().trim_start_matches('$').to_string())
            .collect();

        match names.as_slice() {
            [value] => RangeVars {
                key: None,
                value: Some(value.clone()),
            },
            [key, value, ..] => RangeVars {
                key: Some(key.clone()),
                value: Some(value.clone()),
            },
            [] => RangeVars::default(),
        }
    }

    fn pipeline(&self, pair: Pair<'_, Rule>) -> ParseResult<Pipeline> {
        let location = location_of(&pair);
        let mut decl = None;
        let mut expr: Option<Expr> = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::declaration => decl = Some(self.declaration(inner, location)?),
                Rule::command => expr = Some(self.command(inner, expr, location)?),
                _ => {}
            }
        }

        let expr = expr.ok_or_else(|| self.syntax("missing value in pipeline", location))?;
        Ok(Pipeline {
            decl,
            expr,
            location,
        })
    }

    fn declaration(&self, pair: Pair<'_, Rule>, location: Location) -> ParseResult<Declaration> {
        let mut name = None;
        let mut assign = false;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::variable => name = Some(inner.as_str().trim_start_matches('$').to_string()),
                Rule::decl_op => assign = inner.as_str() == "=",
                _ => {}
            }
        }

        match name {
            Some(name) if !name.is_empty() => Ok(Declaration { name, assign }),
            _ => Err(self.syntax("cannot assign to `$`", location)),
        }
    }

    /// One pipeline stage; `piped` is the result of the previous stage
    fn command(
        &self,
        pair: Pair<'_, Rule>,
        piped: Option<Expr>,
        location: Location,
    ) -> ParseResult<Expr> {
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| self.syntax("empty command", location))?;

        match inner.as_rule() {
            Rule::function_call => {
                let mut parts = inner.into_inner();
                let name = parts
                    .next()
                    .ok_or_else(|| self.syntax("missing function name", location))?;
                let mut args = parts
                    .map(|operand| self.operand(operand))
                    .collect::<ParseResult<Vec<_>>>()?;
                args.extend(piped);
                self.call(name.as_str(), args, location_of(&name))
            }
            _ if piped.is_some() => Err(self.syntax(
                format!(
                    "cannot pipe into `{}`: only functions accept a piped value",
                    inner.as_str()
                ),
                location_of(&inner),
            )),
            _ => self.operand(inner),
        }
    }

    fn call(&self, name: &str, args: Vec<Expr>, location: Location) -> ParseResult<Expr> {
        let func = Builtin::lookup(name).ok_or_else(|| {
            self.error(
                TemplateErrorKind::UnknownFunction,
                format!("unknown function `{}`", name),
                location,
            )
            .with_suggestion(suggest_unknown_function(name))
        })?;

        if !func.accepts(args.len()) {
            return Err(self.error(
                TemplateErrorKind::Arity,
                format!(
                    "`{}` expects {}, got {}",
                    name,
                    func.describe_arity(),
                    args.len()
                ),
                location,
            ));
        }

        Ok(Expr::Call { func, args })
    }

    fn operand(&self, pair: Pair<'_, Rule>) -> ParseResult<Expr> {
        let location = location_of(&pair);
        let mut parts = pair.into_inner();
        let term = parts
            .next()
            .ok_or_else(|| self.syntax("empty operand", location))?;

        let expr = match term.as_rule() {
            Rule::paren => {
                let inner = term
                    .into_inner()
                    .next()
                    .ok_or_else(|| self.syntax("empty parentheses", location))?;
                let pipeline = self.pipeline(inner)?;
                if pipeline.decl.is_some() {
                    return Err(self.syntax("declarations are not allowed inside parentheses", location));
                }
                pipeline.expr
            }
            Rule::string | Rule::raw_string => {
                Expr::Literal(ValueNode::String(self.string_literal(term)?))
            }
            Rule::integer => Expr::Literal(ValueNode::Int(self.integer(term.as_str(), location)?)),
            Rule::float => {
                let value = term
                    .as_str()
                    .parse::<f64>()
                    .map_err(|_| self.syntax(format!("invalid number `{}`", term.as_str()), location))?;
                Expr::Literal(ValueNode::Float(value))
            }
            Rule::boolean => Expr::Literal(ValueNode::Bool(term.as_str() == "true")),
            Rule::nil => Expr::Literal(ValueNode::Null),
            Rule::variable => {
                let base = match term.as_str().trim_start_matches('$') {
                    "" => PathBase::Root,
                    name => PathBase::Var(name.to_string()),
                };
                Expr::Path {
                    base,
                    fields: Vec::new(),
                }
            }
            Rule::field_path => Expr::Path {
                base: PathBase::Dot,
                fields: field_names(term.as_str()),
            },
            Rule::dot => Expr::dot(),
            Rule::niladic => self.call(term.as_str(), Vec::new(), location_of(&term))?,
            other => {
                return Err(self.syntax(format!("unexpected {}", rule_name(&other)), location));
            }
        };

        let Some(chain) = parts.next() else {
            return Ok(expr);
        };
        let more = field_names(chain.as_str());

        Ok(match expr {
            Expr::Path { base, mut fields } => {
                fields.extend(more);
                Expr::Path { base, fields }
            }
            other => Expr::Path {
                base: PathBase::Expr(Box::new(other)),
                fields: more,
            },
        })
    }

    fn integer(&self, text: &str, location: Location) -> ParseResult<i64> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let magnitude = match digits.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => digits.parse::<i64>(),
        }
        .map_err(|_| self.syntax(format!("integer `{}` is out of range", text), location))?;

        Ok(if negative { -magnitude } else { magnitude })
    }

    fn string_literal(&self, pair: Pair<'_, Rule>) -> ParseResult<String> {
        let location = location_of(&pair);
        let raw = pair.as_str();
        let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();

        if pair.as_rule() == Rule::raw_string {
            return Ok(inner.to_string());
        }

        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escaped = match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('a') => '\u{07}',
                Some('b') => '\u{08}',
                Some('f') => '\u{0c}',
                Some('v') => '\u{0b}',
                Some('\\') => '\\',
                Some('"') => '"',
                Some('\'') => '\'',
                Some(kind @ ('x' | 'u' | 'U')) => {
                    let width = match kind {
                        'x' => 2,
                        'u' => 4,
                        _ => 8,
                    };
                    let hex: String = chars.by_ref().take(width).collect();
                    u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| {
                            self.syntax(format!("invalid escape `\\{}{}`", kind, hex), location)
                        })?
                }
                Some(other) => {
                    return Err(self.syntax(format!("unknown escape sequence `\\{}`", other), location));
                }
                None => return Err(self.syntax("unterminated escape sequence", location)),
            };
            out.push(escaped);
        }

        Ok(out)
    }
}

/// How a nested list of directives ended
enum Terminator {
    End,
    Else,
    ElseIf(Pipeline),
    Eof,
}

struct TreeBuilder<'b> {
    builder: &'b Builder,
    items: std::vec::IntoIter<Item>,
    defines: Vec<Arc<Fragment>>,
}

impl TreeBuilder<'_> {
    fn top_level(&mut self) -> ParseResult<Vec<Node>> {
        let (nodes, terminator, location) = self.list(true)?;
        let stray = match terminator {
            Terminator::Eof => return Ok(nodes),
            Terminator::End => "{{end}}",
            Terminator::Else => "{{else}}",
            Terminator::ElseIf(_) => "{{else if}}",
        };
        Err(self
            .builder
            .syntax(format!("unexpected {} without a matching block", stray), location))
    }

    /// Collect nodes until a terminator; returns it with its location
    fn list(&mut self, top_level: bool) -> ParseResult<(Vec<Node>, Terminator, Location)> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let location = item.location;
            match item.directive {
                Directive::Text(text) => {
                    if !text.is_empty() {
                        nodes.push(Node::Text(text));
                    }
                }
                Directive::Comment => {}
                Directive::Output(pipeline) => nodes.push(Node::Output(pipeline)),
                Directive::If(pipeline) => nodes.push(self.if_chain(pipeline, location)?),
                Directive::Range(vars, pipeline) => {
                    let (body, otherwise) = self.body_with_else("range", location)?;
                    nodes.push(Node::Range {
                        vars,
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                Directive::With(pipeline) => {
                    let (body, otherwise) = self.body_with_else("with", location)?;
                    nodes.push(Node::With {
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                Directive::Define(name) => {
                    if !top_level {
                        return Err(self
                            .builder
                            .syntax(format!("`define \"{}\"` must be at the top level", name), location));
                    }
                    let body = self.body("define", location)?;
                    self.add_define(name, body, location);
                }
                Directive::Block(name, pipeline) => {
                    let body = self.body("block", location)?;
                    self.add_define(name.clone(), body, location);
                    nodes.push(Node::Template {
                        name,
                        arg: Some(pipeline),
                        location,
                    });
                }
                Directive::Template(name, arg) => nodes.push(Node::Template {
                    name,
                    arg,
                    location,
                }),
                Directive::Else => return Ok((nodes, Terminator::Else, location)),
                Directive::ElseIf(pipeline) => {
                    return Ok((nodes, Terminator::ElseIf(pipeline), location));
                }
                Directive::End => return Ok((nodes, Terminator::End, location)),
            }
        }

        Ok((nodes, Terminator::Eof, Location::default()))
    }

    fn add_define(&mut self, name: String, body: Vec<Node>, location: Location) {
        self.defines.push(Arc::new(Fragment {
            name,
            file: self.builder.name.clone(),
            source: Arc::clone(&self.builder.source),
            body,
            location,
        }));
    }

    fn unclosed(&self, keyword: &str, opened: Location) -> TemplateError {
        self.builder.syntax(
            format!(
                "unclosed `{}` opened at line {}: missing {{{{end}}}}",
                keyword, opened.line
            ),
            opened,
        )
    }

    /// A body that only ends with `end`
    fn body(&mut self, keyword: &str, opened: Location) -> ParseResult<Vec<Node>> {
        let (nodes, terminator, location) = self.list(false)?;
        match terminator {
            Terminator::End => Ok(nodes),
            Terminator::Eof => Err(self.unclosed(keyword, opened)),
            Terminator::Else | Terminator::ElseIf(_) => Err(self
                .builder
                .syntax(format!("`else` is not allowed in `{}`", keyword), location)),
        }
    }

    /// A body with an optional `else` branch (`range`, `with`)
    fn body_with_else(
        &mut self,
        keyword: &str,
        opened: Location,
    ) -> ParseResult<(Vec<Node>, Option<Vec<Node>>)> {
        let (body, terminator, location) = self.list(false)?;
        match terminator {
            Terminator::End => Ok((body, None)),
            Terminator::Else => Ok((body, Some(self.body(keyword, opened)?))),
            Terminator::ElseIf(_) => Err(self
                .builder
                .syntax(format!("`else if` is not allowed in `{}`", keyword), location)),
            Terminator::Eof => Err(self.unclosed(keyword, opened)),
        }
    }

    fn if_chain(&mut self, first: Pipeline, opened: Location) -> ParseResult<Node> {
        let mut branches = Vec::new();
        let mut condition = first;

        loop {
            let (body, terminator, _) = self.list(false)?;
            branches.push((condition, body));
            match terminator {
                Terminator::ElseIf(next) => condition = next,
                Terminator::Else => {
                    let otherwise = self.body("if", opened)?;
                    return Ok(Node::If {
                        branches,
                        otherwise: Some(otherwise),
                    });
                }
                Terminator::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    });
                }
                Terminator::Eof => return Err(self.unclosed("if", opened)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> ParsedTemplate {
        parse("test.yaml", source).unwrap()
    }

    fn parse_err(source: &str) -> TemplateError {
        parse("test.yaml", source).unwrap_err()
    }

    fn path(fields: &[&str]) -> Expr {
        Expr::Path {
            base: PathBase::Dot,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn output_expr(node: &Node) -> &Expr {
        match node {
            Node::Output(p) => &p.expr,
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_text_and_output() {
        let t = parse_ok("name: {{ .Values.name }}\n");
        assert_eq!(t.nodes.len(), 3);
        assert_eq!(t.nodes[0], Node::Text("name: ".into()));
        assert_eq!(output_expr(&t.nodes[1]), &path(&["Values", "name"]));
        assert_eq!(t.nodes[2], Node::Text("\n".into()));
    }

    #[test]
    fn test_trim_markers() {
        let t = parse_ok("a  \n {{- .x -}} \n\t b");
        assert_eq!(t.nodes[0], Node::Text("a".into()));
        assert_eq!(t.nodes[2], Node::Text("b".into()));

        // `{{-3}}` is a negative number, not a trim marker
        let t = parse_ok("a {{-3}}");
        assert_eq!(t.nodes[0], Node::Text("a ".into()));
        assert_eq!(output_expr(&t.nodes[1]), &Expr::Literal(ValueNode::Int(-3)));
    }

    #[test]
    fn test_pipeline_desugars_to_last_argument() {
        let t = parse_ok(r#"{{ .x | default "y" | quote }}"#);
        let expected = Expr::Call {
            func: Builtin::Quote,
            args: vec![Expr::Call {
                func: Builtin::Default,
                args: vec![Expr::Literal("y".into()), path(&["x"])],
            }],
        };
        assert_eq!(output_expr(&t.nodes[0]), &expected);
    }

    #[test]
    fn test_variables_and_root() {
        let t = parse_ok("{{ $.Release.Name }}{{ $x.a }}{{ $ }}");
        assert_eq!(
            output_expr(&t.nodes[0]),
            &Expr::Path {
                base: PathBase::Root,
                fields: vec!["Release".into(), "Name".into()]
            }
        );
        assert_eq!(
            output_expr(&t.nodes[1]),
            &Expr::Path {
                base: PathBase::Var("x".into()),
                fields: vec!["a".into()]
            }
        );
        assert_eq!(
            output_expr(&t.nodes[2]),
            &Expr::Path {
                base: PathBase::Root,
                fields: vec![]
            }
        );
    }

    #[test]
    fn test_parenthesized_field_access() {
        let t = parse_ok(r#"{{ (dict "a" 1).a }}"#);
        match output_expr(&t.nodes[0]) {
            Expr::Path {
                base: PathBase::Expr(inner),
                fields,
            } => {
                assert!(matches!(**inner, Expr::Call { func: Builtin::Dict, .. }));
                assert_eq!(fields, &vec!["a".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_literals() {
        let t = parse_ok(r#"{{ list "a\tb" `raw\n` 0x1F 2.5 true nil -4 }}"#);
        match output_expr(&t.nodes[0]) {
            Expr::Call { args, .. } => assert_eq!(
                args,
                &vec![
                    Expr::Literal("a\tb".into()),
                    Expr::Literal("raw\\n".into()),
                    Expr::Literal(ValueNode::Int(31)),
                    Expr::Literal(ValueNode::Float(2.5)),
                    Expr::Literal(ValueNode::Bool(true)),
                    Expr::Literal(ValueNode::Null),
                    Expr::Literal(ValueNode::Int(-4)),
                ]
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let t = parse_ok("{{ if .a }}A{{ else if .b }}B{{ else }}C{{ end }}");
        match &t.nodes[0] {
            Node::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[1].1, vec![Node::Text("B".into())]);
                assert_eq!(otherwise.as_deref(), Some(&[Node::Text("C".into())][..]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_range_variables() {
        let t = parse_ok("{{ range $i, $v := .items }}{{ $v }}{{ else }}none{{ end }}");
        match &t.nodes[0] {
            Node::Range {
                vars, otherwise, ..
            } => {
                assert_eq!(vars.key.as_deref(), Some("i"));
                assert_eq!(vars.value.as_deref(), Some("v"));
                assert!(otherwise.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }

        let t = parse_ok("{{ range $v := .items }}{{ end }}");
        match &t.nodes[0] {
            Node::Range { vars, .. } => {
                assert_eq!(vars.key, None);
                assert_eq!(vars.value.as_deref(), Some("v"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_declaration() {
        let t = parse_ok("{{ $name := .Values.name }}{{ $name = upper $name }}");
        match &t.nodes[0] {
            Node::Output(p) => {
                assert_eq!(p.decl.as_ref().map(|d| (d.name.as_str(), d.assign)), Some(("name", false)));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &t.nodes[1] {
            Node::Output(p) => assert_eq!(p.decl.as_ref().map(|d| d.assign), Some(true)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_define_is_split_out() {
        let t = parse_ok("{{- define \"app.name\" -}}\nweb\n{{- end -}}\nkind: x\n");
        assert_eq!(t.nodes, vec![Node::Text("kind: x\n".into())]);
        assert_eq!(t.defines.len(), 1);
        assert_eq!(t.defines[0].name, "app.name");
        assert_eq!(t.defines[0].body, vec![Node::Text("web".into())]);
        assert_eq!(t.defines[0].file, "test.yaml");
    }

    #[test]
    fn test_block_defines_and_invokes() {
        let t = parse_ok(r#"{{ block "banner" . }}hi{{ end }}"#);
        assert_eq!(t.defines[0].name, "banner");
        assert!(matches!(&t.nodes[0], Node::Template { name, arg: Some(_), .. } if name == "banner"));
    }

    #[test]
    fn test_comments_are_dropped() {
        let t = parse_ok("a\n{{- /* note */ -}}\nb");
        assert_eq!(t.nodes, vec![Node::Text("a".into()), Node::Text("b".into())]);
    }

    #[test]
    fn test_unknown_function_is_parse_error() {
        let err = parse_err("x\n{{ .name | qoute }}");
        assert_eq!(err.kind, TemplateErrorKind::UnknownFunction);
        assert_eq!(err.location.map(|l| l.line), Some(2));
        assert!(err.suggestion.unwrap_or_default().contains("`quote`"));
    }

    #[test]
    fn test_arity_is_parse_error() {
        let err = parse_err("{{ required .x }}");
        assert_eq!(err.kind, TemplateErrorKind::Arity);
        assert!(err.message.contains("2 arguments"));

        // The piped value counts as the last argument
        assert!(parse("t", r#"{{ .x | required "msg" }}"#).is_ok());
    }

    #[test]
    fn test_cannot_pipe_into_value() {
        let err = parse_err("{{ .a | .b }}");
        assert_eq!(err.kind, TemplateErrorKind::Syntax);
    }

    #[test]
    fn test_unclosed_and_stray_blocks() {
        let err = parse_err("{{ if .a }}\nopen");
        assert_eq!(err.kind, TemplateErrorKind::Syntax);
        assert!(err.message.contains("unclosed `if`"));

        let err = parse_err("text{{ end }}");
        assert!(err.message.contains("unexpected {{end}}"));

        let err = parse_err("{{ with .a }}{{ else if .b }}{{ end }}");
        assert!(err.message.contains("`else if` is not allowed in `with`"));
    }

    #[test]
    fn test_nested_define_rejected() {
        let err = parse_err(r#"{{ if .a }}{{ define "x" }}{{ end }}{{ end }}"#);
        assert!(err.message.contains("top level"));
    }

    #[test]
    fn test_malformed_action_reports_position() {
        let err = parse_err("line one\n  {{ .x ");
        assert_eq!(err.kind, TemplateErrorKind::Syntax);
        assert_eq!(err.location.map(|l| l.line), Some(2));
        assert!(err.suggestion.is_some());
    }
}
