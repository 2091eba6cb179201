//! Template syntax tree
//!
//! Produced by [`crate::parser`]. Pipelines are already desugared into nested
//! calls and every function name is resolved to a [`Builtin`], so a tree that
//! exists is one that can be evaluated.

use chartwright_core::ValueNode;
use std::sync::Arc;

use crate::functions::Builtin;

/// Position of a directive in its source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Byte offset of the directive
    pub offset: usize,
    /// Byte length of the directive
    pub len: usize,
}

/// Where a path lookup starts
#[derive(Debug, Clone, PartialEq)]
pub enum PathBase {
    /// `.` - the current scope
    Dot,
    /// `$` - the root of the render
    Root,
    /// `$name` - a bound variable
    Var(String),
    /// `(pipeline)` - a computed value
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `.a.b`, `$.a`, `$x.a`, `(expr).a`
    Path { base: PathBase, fields: Vec<String> },
    Literal(ValueNode),
    /// A resolved, arity-checked function call
    Call { func: Builtin, args: Vec<Expr> },
}

impl Expr {
    /// `.`
    pub fn dot() -> Self {
        Expr::Path {
            base: PathBase::Dot,
            fields: Vec::new(),
        }
    }
}

/// `$name :=` or `$name =` at the head of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    /// `=` rebinds an existing variable, `:=` declares a new one
    pub assign: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub decl: Option<Declaration>,
    pub expr: Expr,
    pub location: Location,
}

/// Loop variables of `range $k, $v := ...` (or `range $v := ...`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeVars {
    pub key: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, trim markers already applied
    Text(String),
    /// `{{ pipeline }}` - printed unless it is a declaration
    Output(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Range {
        vars: RangeVars,
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    With {
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    /// `{{ template "name" pipeline }}`, also emitted for `block`
    Template {
        name: String,
        arg: Option<Pipeline>,
        location: Location,
    },
}

/// A named fragment declared with `define` or `block`
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub name: String,
    /// File the fragment was declared in
    pub file: String,
    pub source: Arc<str>,
    pub body: Vec<Node>,
    pub location: Location,
}

/// A parsed template file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTemplate {
    pub name: String,
    pub source: Arc<str>,
    /// Top-level nodes; `define` bodies are not part of them
    pub nodes: Vec<Node>,
    pub defines: Vec<Arc<Fragment>>,
}
