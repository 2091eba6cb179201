//! Engine error types with source-located diagnostics

use chartwright_core::CoreError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::ast::Location;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    #[diagnostic(code(chartwright::core))]
    Core(#[from] CoreError),
}

impl EngineError {
    /// The template error, if this is one
    pub fn as_template(&self) -> Option<&TemplateError> {
        match self {
            Self::Template(err) => Some(err),
            _ => None,
        }
    }
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    /// Malformed template text
    Syntax,
    /// A function name that is not a built-in
    UnknownFunction,
    /// Wrong number of arguments for a built-in
    Arity,
    /// `$name` used without a binding in scope
    UndefinedVariable,
    /// Field access through a scalar
    PathOnScalar,
    /// Comparison or conversion of non-numeric operands
    TypeCoercion,
    /// `required` received nil
    RequiredValueMissing,
    /// Two fragments with the same name in one chart
    DuplicateTemplateName,
    /// `include`/`template` of an unknown fragment
    UnresolvedTemplateName,
    /// A built-in rejected its argument
    InvalidArgument,
    /// `fail` was called
    Fail,
    /// Nested inclusion went deeper than the configured limit
    IncludeDepth,
    /// Rendering stopped because another file failed
    Cancelled,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::UnknownFunction => "unknown_function",
            Self::Arity => "arity",
            Self::UndefinedVariable => "undefined_variable",
            Self::PathOnScalar => "path_on_scalar",
            Self::TypeCoercion => "type_coercion",
            Self::RequiredValueMissing => "required_value_missing",
            Self::DuplicateTemplateName => "duplicate_template_name",
            Self::UnresolvedTemplateName => "unresolved_template_name",
            Self::InvalidArgument => "invalid_argument",
            Self::Fail => "fail",
            Self::IncludeDepth => "include_depth",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Template-specific error with source information
///
/// For `required` and `fail` the message is exactly the text the template
/// author supplied.
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(chartwright::template::render))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// Identifier of the failing file
    pub file: String,

    /// Directive location, when known
    pub location: Option<Location>,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    pub fn new(
        kind: TemplateErrorKind,
        message: impl Into<String>,
        file: &str,
        source: &str,
        location: Option<Location>,
    ) -> Self {
        let span = location.map(|loc| SourceSpan::from((loc.offset, loc.len)));
        Self {
            message: message.into(),
            kind,
            file: file.to_string(),
            location,
            src: NamedSource::new(file, source.to_string()),
            span,
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }

    /// `file:line:column`, or just the file when the location is unknown
    pub fn position(&self) -> String {
        match self.location {
            Some(loc) => format!("{}:{}:{}", self.file, loc.line, loc.column),
            None => self.file.clone(),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_error_position() {
        let loc = Location {
            line: 3,
            column: 7,
            offset: 20,
            len: 5,
        };
        let err = TemplateError::new(
            TemplateErrorKind::PathOnScalar,
            "cannot access `x`",
            "app/templates/cm.yaml",
            "source",
            Some(loc),
        );
        assert_eq!(err.position(), "app/templates/cm.yaml:3:7");
        assert_eq!(err.span, Some(SourceSpan::from((20, 5))));
        assert_eq!(err.to_string(), "cannot access `x`");
    }

    #[test]
    fn test_engine_error_exposes_template_error() {
        let err: EngineError = TemplateError::new(
            TemplateErrorKind::Fail,
            "boom",
            "f.yaml",
            "",
            None,
        )
        .into();
        assert_eq!(err.as_template().map(|e| e.kind()), Some(TemplateErrorKind::Fail));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_kind_codes_are_distinct() {
        let kinds = [
            TemplateErrorKind::Syntax,
            TemplateErrorKind::UnknownFunction,
            TemplateErrorKind::Arity,
            TemplateErrorKind::UndefinedVariable,
            TemplateErrorKind::PathOnScalar,
            TemplateErrorKind::TypeCoercion,
            TemplateErrorKind::RequiredValueMissing,
            TemplateErrorKind::DuplicateTemplateName,
            TemplateErrorKind::UnresolvedTemplateName,
            TemplateErrorKind::InvalidArgument,
            TemplateErrorKind::Fail,
            TemplateErrorKind::IncludeDepth,
            TemplateErrorKind::Cancelled,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.to_code_string()).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}
