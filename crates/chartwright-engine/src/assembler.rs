//! Output assembler: rendered files to YAML documents

use std::fmt::Write as _;

/// One rendered template file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// File identifier, e.g. `app/templates/deployment.yaml`
    pub id: String,
    pub text: String,
}

impl RenderedDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Whitespace-only output, dropped from the assembled stream
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Join documents into one multi-document YAML stream
///
/// Blank documents are skipped so a template whose condition is false
/// leaves no stray separator behind.
pub fn assemble<'d>(documents: impl IntoIterator<Item = &'d RenderedDocument>) -> String {
    let mut out = String::new();
    for doc in documents.into_iter().filter(|d| !d.is_blank()) {
        let _ = writeln!(out, "---\n# Source: {}\n{}", doc.id, tidy(&doc.text));
    }
    out
}

/// A single document with its header, for previews
pub fn preview(id: &str, text: &str) -> String {
    format!("---\n# Source: {}\n{}", id, text)
}

/// Drop leading blank lines and trailing whitespace, keeping indentation
fn tidy(text: &str) -> &str {
    let text = text.trim_end();
    let first = text.len() - text.trim_start().len();
    let line_start = text[..first].rfind('\n').map_or(0, |i| i + 1);
    &text[line_start..]
}
