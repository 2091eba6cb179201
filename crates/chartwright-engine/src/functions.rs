//! Built-in template functions
//!
//! Function names are resolved once, at parse time, into the closed
//! [`Builtin`] enum. Each variant carries a fixed arity, so an unknown name
//! or a wrong argument count never survives parsing.
//!
//! Argument order follows the pipeline convention: the piped value is always
//! the last argument (`.x | default "y"` is `default "y" .x`).

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chartwright_core::value::format_float;
use chartwright_core::{Mapping, ValueNode};
use phf::phf_map;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

use crate::error::TemplateErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Comparison and logic
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    // Values
    Default,
    Required,
    Empty,
    Coalesce,
    Ternary,
    Fail,
    // Strings
    Upper,
    Lower,
    Trim,
    Title,
    Quote,
    Squote,
    Join,
    Indent,
    Reindent,
    Trunc,
    TrimPrefix,
    TrimSuffix,
    Replace,
    Contains,
    HasPrefix,
    HasSuffix,
    Kebabcase,
    Snakecase,
    Printf,
    Print,
    // Encoding
    ToYaml,
    ToJson,
    B64Enc,
    B64Dec,
    Sha256Sum,
    // Conversion
    ToString,
    Int,
    Float64,
    // Collections
    List,
    Dict,
    Get,
    HasKey,
    Keys,
    Len,
    Index,
    // Evaluated by the renderer
    Include,
    Tpl,
}

/// Every accepted spelling, aliases included
pub static BUILTINS: phf::Map<&'static str, Builtin> = phf_map! {
    "eq" => Builtin::Eq,
    "ne" => Builtin::Ne,
    "lt" => Builtin::Lt,
    "le" => Builtin::Le,
    "gt" => Builtin::Gt,
    "ge" => Builtin::Ge,
    "and" => Builtin::And,
    "or" => Builtin::Or,
    "not" => Builtin::Not,

    "default" => Builtin::Default,
    "required" => Builtin::Required,
    "empty" => Builtin::Empty,
    "coalesce" => Builtin::Coalesce,
    "ternary" => Builtin::Ternary,
    "fail" => Builtin::Fail,

    "upper" => Builtin::Upper,
    "lower" => Builtin::Lower,
    "trim" => Builtin::Trim,
    "title" => Builtin::Title,
    "quote" => Builtin::Quote,
    "squote" => Builtin::Squote,
    "join" => Builtin::Join,
    "indent" => Builtin::Indent,
    "reindent" => Builtin::Reindent,
    "nindent" => Builtin::Reindent,
    "trunc" => Builtin::Trunc,
    "trimPrefix" => Builtin::TrimPrefix,
    "trimSuffix" => Builtin::TrimSuffix,
    "replace" => Builtin::Replace,
    "contains" => Builtin::Contains,
    "hasPrefix" => Builtin::HasPrefix,
    "hasSuffix" => Builtin::HasSuffix,
    "kebabcase" => Builtin::Kebabcase,
    "snakecase" => Builtin::Snakecase,
    "printf" => Builtin::Printf,
    "print" => Builtin::Print,

    "toYaml" => Builtin::ToYaml,
    "toYAML" => Builtin::ToYaml,
    "toJson" => Builtin::ToJson,
    "toJSON" => Builtin::ToJson,
    "b64enc" => Builtin::B64Enc,
    "base64Encode" => Builtin::B64Enc,
    "b64dec" => Builtin::B64Dec,
    "base64Decode" => Builtin::B64Dec,
    "sha256sum" => Builtin::Sha256Sum,

    "toString" => Builtin::ToString,
    "int" => Builtin::Int,
    "float64" => Builtin::Float64,

    "list" => Builtin::List,
    "dict" => Builtin::Dict,
    "get" => Builtin::Get,
    "hasKey" => Builtin::HasKey,
    "keys" => Builtin::Keys,
    "len" => Builtin::Len,
    "index" => Builtin::Index,

    "include" => Builtin::Include,
    "tpl" => Builtin::Tpl,
};

impl Builtin {
    /// Resolve a function name
    pub fn lookup(name: &str) -> Option<Self> {
        BUILTINS.get(name).copied()
    }

    /// Canonical spelling, used in messages
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Default => "default",
            Self::Required => "required",
            Self::Empty => "empty",
            Self::Coalesce => "coalesce",
            Self::Ternary => "ternary",
            Self::Fail => "fail",
            Self::Upper => "upper",
            Self::Lower => "lower",
            Self::Trim => "trim",
            Self::Title => "title",
            Self::Quote => "quote",
            Self::Squote => "squote",
            Self::Join => "join",
            Self::Indent => "indent",
            Self::Reindent => "nindent",
            Self::Trunc => "trunc",
            Self::TrimPrefix => "trimPrefix",
            Self::TrimSuffix => "trimSuffix",
            Self::Replace => "replace",
            Self::Contains => "contains",
            Self::HasPrefix => "hasPrefix",
            Self::HasSuffix => "hasSuffix",
            Self::Kebabcase => "kebabcase",
            Self::Snakecase => "snakecase",
            Self::Printf => "printf",
            Self::Print => "print",
            Self::ToYaml => "toYaml",
            Self::ToJson => "toJson",
            Self::B64Enc => "b64enc",
            Self::B64Dec => "b64dec",
            Self::Sha256Sum => "sha256sum",
            Self::ToString => "toString",
            Self::Int => "int",
            Self::Float64 => "float64",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Get => "get",
            Self::HasKey => "hasKey",
            Self::Keys => "keys",
            Self::Len => "len",
            Self::Index => "index",
            Self::Include => "include",
            Self::Tpl => "tpl",
        }
    }

    /// Accepted argument count: `(min, max)`, `None` meaning variadic
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::List | Self::Dict | Self::Print => (0, None),
            Self::Not
            | Self::Empty
            | Self::Fail
            | Self::Upper
            | Self::Lower
            | Self::Trim
            | Self::Title
            | Self::Kebabcase
            | Self::Snakecase
            | Self::ToYaml
            | Self::ToJson
            | Self::B64Enc
            | Self::B64Dec
            | Self::Sha256Sum
            | Self::ToString
            | Self::Int
            | Self::Float64
            | Self::Len => (1, Some(1)),
            Self::And
            | Self::Or
            | Self::Coalesce
            | Self::Quote
            | Self::Squote
            | Self::Printf
            | Self::Keys
            | Self::Index => (1, None),
            Self::Eq => (2, None),
            Self::Ne
            | Self::Lt
            | Self::Le
            | Self::Gt
            | Self::Ge
            | Self::Default
            | Self::Required
            | Self::Join
            | Self::Indent
            | Self::Reindent
            | Self::Trunc
            | Self::TrimPrefix
            | Self::TrimSuffix
            | Self::Contains
            | Self::HasPrefix
            | Self::HasSuffix
            | Self::Get
            | Self::HasKey
            | Self::Include
            | Self::Tpl => (2, Some(2)),
            Self::Ternary | Self::Replace => (3, Some(3)),
        }
    }

    /// Check an argument count against the arity
    pub fn accepts(self, count: usize) -> bool {
        let (min, max) = self.arity();
        count >= min && max.is_none_or(|max| count <= max)
    }

    /// Human readable arity, e.g. "2 arguments" or "at least 1 argument"
    pub fn describe_arity(self) -> String {
        let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
        match self.arity() {
            (min, Some(max)) if min == max => format!("{} {}", min, plural(min)),
            (min, Some(max)) => format!("{} to {} arguments", min, max),
            (min, None) => format!("at least {} {}", min, plural(min)),
        }
    }
}

/// A failed function call, located by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionError {
    pub kind: TemplateErrorKind,
    pub message: String,
}

impl FunctionError {
    pub fn new(kind: TemplateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn invalid(func: Builtin, message: impl std::fmt::Display) -> Self {
        Self::new(
            TemplateErrorKind::InvalidArgument,
            format!("{}: {}", func.name(), message),
        )
    }

    fn coercion(message: impl Into<String>) -> Self {
        Self::new(TemplateErrorKind::TypeCoercion, message)
    }
}

type CallResult = Result<ValueNode, FunctionError>;

/// Call an eager built-in
///
/// `and`, `or`, `include` and `tpl` need the renderer and are rejected here.
pub fn call(func: Builtin, args: &[&ValueNode]) -> CallResult {
    if !func.accepts(args.len()) {
        return Err(FunctionError::new(
            TemplateErrorKind::Arity,
            format!(
                "{} expects {}, got {}",
                func.name(),
                func.describe_arity(),
                args.len()
            ),
        ));
    }

    let text = |i: usize| args[i].to_text();

    match func {
        Builtin::Eq => Ok(args[1..].iter().any(|b| values_equal(args[0], b)).into()),
        Builtin::Ne => Ok((!values_equal(args[0], args[1])).into()),
        Builtin::Lt => compare(args[0], args[1]).map(|o| (o == Ordering::Less).into()),
        Builtin::Le => compare(args[0], args[1]).map(|o| (o != Ordering::Greater).into()),
        Builtin::Gt => compare(args[0], args[1]).map(|o| (o == Ordering::Greater).into()),
        Builtin::Ge => compare(args[0], args[1]).map(|o| (o != Ordering::Less).into()),
        Builtin::Not => Ok((!args[0].is_truthy()).into()),

        Builtin::Default => {
            let value = args[1];
            let chosen = if value.is_nil() || value.as_str() == Some("") {
                args[0]
            } else {
                value
            };
            Ok(chosen.clone())
        }
        Builtin::Required => {
            if args[1].is_nil() {
                Err(FunctionError::new(
                    TemplateErrorKind::RequiredValueMissing,
                    text(0),
                ))
            } else {
                Ok(args[1].clone())
            }
        }
        Builtin::Empty => Ok((!args[0].is_truthy()).into()),
        Builtin::Coalesce => Ok(args
            .iter()
            .find(|v| v.is_truthy())
            .map(|v| (*v).clone())
            .unwrap_or_default()),
        Builtin::Ternary => {
            let chosen = if args[2].is_truthy() { args[0] } else { args[1] };
            Ok(chosen.clone())
        }
        Builtin::Fail => Err(FunctionError::new(TemplateErrorKind::Fail, text(0))),

        Builtin::Upper => Ok(text(0).to_uppercase().into()),
        Builtin::Lower => Ok(text(0).to_lowercase().into()),
        Builtin::Trim => Ok(text(0).trim().into()),
        Builtin::Title => Ok(title(&text(0)).into()),
        Builtin::Quote => Ok(quote_all(args, double_quote).into()),
        Builtin::Squote => Ok(quote_all(args, single_quote).into()),
        Builtin::Join => join(args[0], args[1]),
        Builtin::Indent => Ok(indent(int_arg(func, args[0])?, &text(1)).into()),
        Builtin::Reindent => Ok(format!("\n{}", indent(int_arg(func, args[0])?, &text(1))).into()),
        Builtin::Trunc => Ok(trunc(int_arg(func, args[0])?, &text(1)).into()),
        Builtin::TrimPrefix => {
            let s = text(1);
            Ok(s.strip_prefix(text(0).as_str()).unwrap_or(&s).into())
        }
        Builtin::TrimSuffix => {
            let s = text(1);
            Ok(s.strip_suffix(text(0).as_str()).unwrap_or(&s).into())
        }
        Builtin::Replace => Ok(text(2).replace(&text(0), &text(1)).into()),
        Builtin::Contains => Ok(text(1).contains(&text(0)).into()),
        Builtin::HasPrefix => Ok(text(1).starts_with(&text(0)).into()),
        Builtin::HasSuffix => Ok(text(1).ends_with(&text(0)).into()),
        Builtin::Snakecase => Ok(snakecase(&text(0)).into()),
        Builtin::Kebabcase => Ok(snakecase(&text(0)).replace('_', "-").into()),
        Builtin::Printf => Ok(sprintf(&text(0), &args[1..]).into()),
        Builtin::Print => Ok(sprint(args).into()),

        Builtin::ToYaml => args[0]
            .to_yaml()
            .map(ValueNode::from)
            .map_err(|e| FunctionError::invalid(func, e)),
        Builtin::ToJson => args[0]
            .to_json()
            .map(ValueNode::from)
            .map_err(|e| FunctionError::invalid(func, e)),
        Builtin::B64Enc => Ok(STANDARD.encode(text(0)).into()),
        Builtin::B64Dec => {
            let bytes = STANDARD
                .decode(text(0).trim())
                .map_err(|e| FunctionError::invalid(func, e))?;
            String::from_utf8(bytes)
                .map(ValueNode::from)
                .map_err(|e| FunctionError::invalid(func, e))
        }
        Builtin::Sha256Sum => Ok(format!("{:x}", Sha256::digest(text(0).as_bytes())).into()),

        Builtin::ToString => Ok(text(0).into()),
        Builtin::Int => to_int(args[0]).map(ValueNode::Int),
        Builtin::Float64 => to_float(args[0]).map(ValueNode::Float),

        Builtin::List => Ok(ValueNode::Sequence(args.iter().map(|v| (*v).clone()).collect())),
        Builtin::Dict => dict(args),
        Builtin::Get => match args[0] {
            ValueNode::Mapping(map) => Ok(map.get(&text(1)).cloned().unwrap_or_default()),
            ValueNode::Null => Ok(ValueNode::Null),
            other => Err(FunctionError::invalid(
                func,
                format!("expected a mapping, got {}", other.kind_name()),
            )),
        },
        Builtin::HasKey => match args[0] {
            ValueNode::Mapping(map) => Ok(map.contains_key(&text(1)).into()),
            ValueNode::Null => Ok(false.into()),
            other => Err(FunctionError::invalid(
                func,
                format!("expected a mapping, got {}", other.kind_name()),
            )),
        },
        Builtin::Keys => keys(args),
        Builtin::Len => match args[0] {
            ValueNode::Null => Ok(ValueNode::Int(0)),
            ValueNode::String(s) => Ok(ValueNode::Int(s.chars().count() as i64)),
            ValueNode::Sequence(items) => Ok(ValueNode::Int(items.len() as i64)),
            ValueNode::Mapping(map) => Ok(ValueNode::Int(map.len() as i64)),
            other => Err(FunctionError::invalid(
                func,
                format!("{} has no length", other.kind_name()),
            )),
        },
        Builtin::Index => index(args[0], &args[1..]),

        Builtin::And | Builtin::Or | Builtin::Include | Builtin::Tpl => Err(FunctionError::new(
            TemplateErrorKind::InvalidArgument,
            format!("{} cannot be called without a renderer", func.name()),
        )),
    }
}

/// Equality used by `eq` and `ne`; numbers compare by value across int and float
pub fn values_equal(a: &ValueNode, b: &ValueNode) -> bool {
    match (a, b) {
        (ValueNode::Int(x), ValueNode::Int(y)) => x == y,
        (x, y) if x.is_numeric() && y.is_numeric() => x.to_f64() == y.to_f64(),
        (x, y) => x == y,
    }
}

/// Numeric ordering; numeric strings are coerced, anything else fails
pub fn compare(a: &ValueNode, b: &ValueNode) -> Result<Ordering, FunctionError> {
    if let (ValueNode::Int(x), ValueNode::Int(y)) = (a, b) {
        return Ok(x.cmp(y));
    }

    let incomparable = || {
        FunctionError::coercion(format!(
            "cannot compare {} `{}` with {} `{}`: operands must be numeric",
            a.kind_name(),
            a.to_text(),
            b.kind_name(),
            b.to_text()
        ))
    };

    let (Some(x), Some(y)) = (a.to_f64(), b.to_f64()) else {
        return Err(incomparable());
    };
    x.partial_cmp(&y).ok_or_else(incomparable)
}

fn int_arg(func: Builtin, value: &ValueNode) -> Result<i64, FunctionError> {
    match value {
        ValueNode::Int(n) => Ok(*n),
        ValueNode::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        ValueNode::String(s) => s
            .trim()
            .parse()
            .map_err(|_| FunctionError::invalid(func, format!("expected an integer, got `{}`", s))),
        other => Err(FunctionError::invalid(
            func,
            format!("expected an integer, got {}", other.kind_name()),
        )),
    }
}

fn to_int(value: &ValueNode) -> Result<i64, FunctionError> {
    match value {
        ValueNode::Null => Ok(0),
        ValueNode::Bool(b) => Ok(i64::from(*b)),
        ValueNode::Int(n) => Ok(*n),
        ValueNode::Float(f) => Ok(f.trunc() as i64),
        ValueNode::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
                .ok_or_else(|| FunctionError::coercion(format!("cannot convert `{}` to int", s)))
        }
        other => Err(FunctionError::coercion(format!(
            "cannot convert {} to int",
            other.kind_name()
        ))),
    }
}

fn to_float(value: &ValueNode) -> Result<f64, FunctionError> {
    match value {
        ValueNode::Null => Ok(0.0),
        ValueNode::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => other.to_f64().ok_or_else(|| {
            FunctionError::coercion(format!(
                "cannot convert {} `{}` to float64",
                other.kind_name(),
                other.to_text()
            ))
        }),
    }
}

fn double_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn quote_all(args: &[&ValueNode], quote: fn(&str) -> String) -> String {
    args.iter()
        .map(|v| quote(&v.to_text()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn join(separator: &ValueNode, items: &ValueNode) -> CallResult {
    let separator = separator.to_text();
    Ok(match items {
        ValueNode::Sequence(items) => items
            .iter()
            .map(ValueNode::to_text)
            .collect::<Vec<_>>()
            .join(&separator)
            .into(),
        other => other.to_text().into(),
    })
}

/// Prefix every line with `width` spaces
pub fn indent(width: i64, text: &str) -> String {
    let pad = " ".repeat(width.max(0) as usize);
    format!("{}{}", pad, text.replace('\n', &format!("\n{}", pad)))
}

fn trunc(length: i64, text: &str) -> String {
    let count = text.chars().count() as i64;
    if length >= 0 {
        text.chars().take(length as usize).collect()
    } else if count + length > 0 {
        text.chars().skip((count + length) as usize).collect()
    } else {
        text.to_string()
    }
}

fn title(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start && c.is_alphabetic() {
            result.extend(c.to_uppercase());
        } else {
            result.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    result
}

fn snakecase(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 4);
    let mut prev_lower_or_digit = false;

    for c in text.chars() {
        if c.is_uppercase() {
            if prev_lower_or_digit {
                result.push('_');
            }
            result.extend(c.to_lowercase());
            prev_lower_or_digit = false;
        } else if c == '-' || c == ' ' || c == '_' {
            if !result.ends_with('_') && !result.is_empty() {
                result.push('_');
            }
            prev_lower_or_digit = false;
        } else {
            result.push(c);
            prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
        }
    }

    result
}

fn dict(args: &[&ValueNode]) -> CallResult {
    if args.len() % 2 != 0 {
        return Err(FunctionError::invalid(
            Builtin::Dict,
            "expects an even number of arguments (key value pairs)",
        ));
    }
    let map: Mapping = args
        .chunks(2)
        .map(|pair| (pair[0].to_text(), pair[1].clone()))
        .collect();
    Ok(ValueNode::Mapping(map))
}

fn keys(args: &[&ValueNode]) -> CallResult {
    let mut result = Vec::new();
    for arg in args {
        match arg {
            ValueNode::Mapping(map) => result.extend(map.keys().cloned().map(ValueNode::String)),
            ValueNode::Null => {}
            other => {
                return Err(FunctionError::invalid(
                    Builtin::Keys,
                    format!("expected a mapping, got {}", other.kind_name()),
                ));
            }
        }
    }
    Ok(ValueNode::Sequence(result))
}

fn index(collection: &ValueNode, keys: &[&ValueNode]) -> CallResult {
    let mut current = collection;
    for key in keys {
        current = match current {
            ValueNode::Null => return Ok(ValueNode::Null),
            ValueNode::Mapping(map) => match map.get(&key.to_text()) {
                Some(value) => value,
                None => return Ok(ValueNode::Null),
            },
            ValueNode::Sequence(items) => {
                let position = match key {
                    ValueNode::Int(n) => usize::try_from(*n).ok(),
                    ValueNode::String(s) => s.parse().ok(),
                    _ => None,
                };
                match position.and_then(|i| items.get(i)) {
                    Some(value) => value,
                    None => return Ok(ValueNode::Null),
                }
            }
            scalar => {
                return Err(FunctionError::new(
                    TemplateErrorKind::PathOnScalar,
                    format!(
                        "index: cannot index {} `{}` with `{}`",
                        scalar.kind_name(),
                        scalar.to_text(),
                        key.to_text()
                    ),
                ));
            }
        };
    }
    Ok(current.clone())
}

/// `fmt.Sprint`: spaces are added between operands when neither is a string
fn sprint(args: &[&ValueNode]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !matches!(arg, ValueNode::String(_)) && !matches!(args[i - 1], ValueNode::String(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_text());
    }
    out
}

/// A subset of `fmt.Sprintf`: `%s %v %d %q %f %t %x %%` with width, `-`/`0` flags and precision
fn sprintf(format: &str, args: &[&ValueNode]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                _ => break,
            }
            chars.next();
        }

        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse::<usize>().unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(arg) = next_arg.next() else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };

        let formatted = format_verb(verb, arg, precision);
        let width: usize = width.parse().unwrap_or(0);
        let len = formatted.chars().count();
        if len >= width {
            out.push_str(&formatted);
        } else if left_align {
            out.push_str(&formatted);
            out.push_str(&" ".repeat(width - len));
        } else if zero_pad && arg.is_numeric() {
            let (sign, digits) = match formatted.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", formatted.as_str()),
            };
            out.push_str(sign);
            out.push_str(&"0".repeat(width - len));
            out.push_str(digits);
        } else {
            out.push_str(&" ".repeat(width - len));
            out.push_str(&formatted);
        }
    }

    out
}

fn format_verb(verb: char, arg: &ValueNode, precision: Option<usize>) -> String {
    let bad = || format!("%!{}({}={})", verb, arg.kind_name(), arg.to_text());
    match verb {
        's' | 'v' => {
            let text = arg.to_text();
            match precision {
                Some(p) if verb == 's' => text.chars().take(p).collect(),
                _ => text,
            }
        }
        'd' => match arg {
            ValueNode::Int(n) => n.to_string(),
            ValueNode::Float(f) if f.fract() == 0.0 => format_float(*f),
            _ => bad(),
        },
        'f' => match arg {
            ValueNode::Int(_) | ValueNode::Float(_) => {
                let value = arg.to_f64().unwrap_or_default();
                format!("{:.*}", precision.unwrap_or(6), value)
            }
            _ => bad(),
        },
        'q' => double_quote(&arg.to_text()),
        't' => match arg {
            ValueNode::Bool(b) => b.to_string(),
            _ => bad(),
        },
        'x' => match arg {
            ValueNode::Int(n) => format!("{:x}", n),
            ValueNode::String(s) => s.bytes().map(|b| format!("{:02x}", b)).collect(),
            _ => bad(),
        },
        other => format!("%!{}({}={})", other, arg.kind_name(), arg.to_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> ValueNode {
        ValueNode::from(v)
    }

    fn call_ok(func: Builtin, args: &[ValueNode]) -> ValueNode {
        let refs: Vec<&ValueNode> = args.iter().collect();
        call(func, &refs).unwrap()
    }

    fn call_err(func: Builtin, args: &[ValueNode]) -> FunctionError {
        let refs: Vec<&ValueNode> = args.iter().collect();
        call(func, &refs).unwrap_err()
    }

    #[test]
    fn test_lookup_aliases() {
        assert_eq!(Builtin::lookup("nindent"), Some(Builtin::Reindent));
        assert_eq!(Builtin::lookup("reindent"), Some(Builtin::Reindent));
        assert_eq!(Builtin::lookup("toYAML"), Some(Builtin::ToYaml));
        assert_eq!(Builtin::lookup("base64Encode"), Some(Builtin::B64Enc));
        assert_eq!(Builtin::lookup("toyaml"), None);
    }

    #[test]
    fn test_arity() {
        assert!(Builtin::Default.accepts(2));
        assert!(!Builtin::Default.accepts(1));
        assert!(Builtin::List.accepts(0));
        assert!(Builtin::Eq.accepts(4));
        assert_eq!(Builtin::Required.describe_arity(), "2 arguments");
        assert_eq!(Builtin::Printf.describe_arity(), "at least 1 argument");
    }

    #[test]
    fn test_default_and_required_asymmetry() {
        assert_eq!(call_ok(Builtin::Default, &[s("x"), s("")]), s("x"));
        assert_eq!(call_ok(Builtin::Default, &[s("x"), ValueNode::Null]), s("x"));
        assert_eq!(call_ok(Builtin::Default, &[s("x"), ValueNode::Int(0)]), ValueNode::Int(0));

        assert_eq!(call_ok(Builtin::Required, &[s("msg"), s("")]), s(""));
        let err = call_err(Builtin::Required, &[s("msg"), ValueNode::Null]);
        assert_eq!(err.kind, TemplateErrorKind::RequiredValueMissing);
        assert_eq!(err.message, "msg");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call_ok(Builtin::Eq, &[ValueNode::Int(1), ValueNode::Float(1.0)]), true.into());
        assert_eq!(call_ok(Builtin::Eq, &[s("a"), s("b"), s("a")]), true.into());
        assert_eq!(call_ok(Builtin::Ne, &[s("a"), s("b")]), true.into());
        assert_eq!(call_ok(Builtin::Lt, &[ValueNode::Int(2), ValueNode::Int(10)]), true.into());
        assert_eq!(call_ok(Builtin::Ge, &[s("10"), ValueNode::Float(9.5)]), true.into());

        let err = call_err(Builtin::Gt, &[s("abc"), ValueNode::Int(1)]);
        assert_eq!(err.kind, TemplateErrorKind::TypeCoercion);
    }

    #[test]
    fn test_quote() {
        assert_eq!(call_ok(Builtin::Quote, &[s("say \"hi\"")]), s("\"say \\\"hi\\\"\""));
        assert_eq!(call_ok(Builtin::Quote, &[ValueNode::Int(80)]), s("\"80\""));
        assert_eq!(call_ok(Builtin::Quote, &[ValueNode::Null]), s("\"\""));
        assert_eq!(call_ok(Builtin::Squote, &[s("it's")]), s("'it''s'"));
    }

    #[test]
    fn test_indent_and_reindent() {
        assert_eq!(call_ok(Builtin::Indent, &[ValueNode::Int(2), s("a: 1\nb: 2")]), s("  a: 1\n  b: 2"));
        assert_eq!(call_ok(Builtin::Reindent, &[ValueNode::Int(4), s("a: 1")]), s("\n    a: 1"));
    }

    #[test]
    fn test_join() {
        let seq = ValueNode::Sequence(vec![s("a"), ValueNode::Int(1), ValueNode::Bool(true)]);
        assert_eq!(call_ok(Builtin::Join, &[s(","), seq]), s("a,1,true"));
        assert_eq!(call_ok(Builtin::Join, &[s(","), ValueNode::Null]), s(""));
    }

    #[test]
    fn test_base64_round_trip() {
        let encoded = call_ok(Builtin::B64Enc, &[s("admin:secret")]);
        assert_eq!(encoded, s("YWRtaW46c2VjcmV0"));
        assert_eq!(call_ok(Builtin::B64Dec, &[encoded]), s("admin:secret"));
        assert_eq!(call_err(Builtin::B64Dec, &[s("%%%")]).kind, TemplateErrorKind::InvalidArgument);
    }

    #[test]
    fn test_to_yaml() {
        let mut map = Mapping::new();
        map.insert("cpu".into(), s("100m"));
        map.insert("memory".into(), s("128Mi"));
        assert_eq!(call_ok(Builtin::ToYaml, &[ValueNode::Mapping(map)]), s("cpu: 100m\nmemory: 128Mi"));
    }

    #[test]
    fn test_printf() {
        let out = call_ok(
            Builtin::Printf,
            &[s("%s-%d %q %.2f %5s|%-3d|%03d %%"), s("web"), ValueNode::Int(3), s("x"), ValueNode::Float(1.5), s("ab"), ValueNode::Int(7), ValueNode::Int(5)],
        );
        assert_eq!(out, s("web-3 \"x\" 1.50    ab|7  |005 %"));
        assert_eq!(call_ok(Builtin::Printf, &[s("%s %s"), s("a")]), s("a %!s(MISSING)"));
        assert_eq!(call_ok(Builtin::Printf, &[s("%d"), s("a")]), s("%!d(string=a)"));
    }

    #[test]
    fn test_print() {
        assert_eq!(call_ok(Builtin::Print, &[ValueNode::Int(1), ValueNode::Int(2), s("x"), ValueNode::Int(3)]), s("1 2x3"));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(call_ok(Builtin::Trunc, &[ValueNode::Int(3), s("abcdef")]), s("abc"));
        assert_eq!(call_ok(Builtin::Trunc, &[ValueNode::Int(-2), s("abcdef")]), s("ef"));
        assert_eq!(call_ok(Builtin::TrimPrefix, &[s("v"), s("v1.2")]), s("1.2"));
        assert_eq!(call_ok(Builtin::TrimSuffix, &[s("-"), s("a-")]), s("a"));
        assert_eq!(call_ok(Builtin::Replace, &[s(" "), s("-"), s("a b c")]), s("a-b-c"));
        assert_eq!(call_ok(Builtin::Contains, &[s("cat"), s("concatenate")]), true.into());
        assert_eq!(call_ok(Builtin::Title, &[s("hello big-world")]), s("Hello Big-World"));
        assert_eq!(call_ok(Builtin::Snakecase, &[s("myAppName")]), s("my_app_name"));
        assert_eq!(call_ok(Builtin::Kebabcase, &[s("MyApp name")]), s("my-app-name"));
        assert_eq!(call_ok(Builtin::Upper, &[ValueNode::Null]), s(""));
    }

    #[test]
    fn test_sha256sum() {
        assert_eq!(
            call_ok(Builtin::Sha256Sum, &[s("hello")]),
            s("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call_ok(Builtin::Int, &[s("42")]), ValueNode::Int(42));
        assert_eq!(call_ok(Builtin::Int, &[ValueNode::Float(3.9)]), ValueNode::Int(3));
        assert_eq!(call_ok(Builtin::Float64, &[s("1.5")]), ValueNode::Float(1.5));
        assert_eq!(call_ok(Builtin::ToString, &[ValueNode::Int(8)]), s("8"));
        assert_eq!(call_err(Builtin::Int, &[s("abc")]).kind, TemplateErrorKind::TypeCoercion);
    }

    #[test]
    fn test_collections() {
        let map = call_ok(Builtin::Dict, &[s("b"), ValueNode::Int(1), s("a"), ValueNode::Int(2)]);
        assert_eq!(call_ok(Builtin::Keys, &[map.clone()]), ValueNode::Sequence(vec![s("b"), s("a")]));
        assert_eq!(call_ok(Builtin::Get, &[map.clone(), s("a")]), ValueNode::Int(2));
        assert_eq!(call_ok(Builtin::HasKey, &[map.clone(), s("z")]), false.into());
        assert_eq!(call_ok(Builtin::Len, &[map.clone()]), ValueNode::Int(2));
        assert_eq!(call_err(Builtin::Dict, &[s("odd")]).kind, TemplateErrorKind::InvalidArgument);

        let list = call_ok(Builtin::List, &[s("x"), s("y")]);
        assert_eq!(call_ok(Builtin::Index, &[list.clone(), ValueNode::Int(1)]), s("y"));
        assert_eq!(call_ok(Builtin::Index, &[list, ValueNode::Int(5)]), ValueNode::Null);
        assert_eq!(
            call_err(Builtin::Index, &[s("scalar"), ValueNode::Int(0)]).kind,
            TemplateErrorKind::PathOnScalar
        );
    }

    #[test]
    fn test_coalesce_ternary_empty() {
        assert_eq!(call_ok(Builtin::Coalesce, &[ValueNode::Null, s(""), s("x")]), s("x"));
        assert_eq!(call_ok(Builtin::Ternary, &[s("yes"), s("no"), ValueNode::Bool(true)]), s("yes"));
        assert_eq!(call_ok(Builtin::Empty, &[ValueNode::Sequence(vec![])]), true.into());
    }

    #[test]
    fn test_fail() {
        let err = call_err(Builtin::Fail, &[s("unsupported")]);
        assert_eq!(err.kind, TemplateErrorKind::Fail);
        assert_eq!(err.message, "unsupported");
    }
}
