//! Named template registry
//!
//! One registry per chart. A subchart's registry points at its parent's, so
//! lookups resolve local definitions first and fall back up the tree.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::ast::{Fragment, ParsedTemplate};
use crate::error::{TemplateError, TemplateErrorKind};
use crate::parser;

#[derive(Debug, Default)]
pub struct TemplateRegistry {
    fragments: IndexMap<String, Arc<Fragment>>,
    parent: Option<Arc<TemplateRegistry>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose misses fall back to `parent`
    pub fn with_parent(parent: Arc<TemplateRegistry>) -> Self {
        Self {
            fragments: IndexMap::new(),
            parent: Some(parent),
        }
    }

    /// Parse `source` and register every fragment it defines
    ///
    /// `name` identifies the file in error messages; the registry itself keys
    /// only on the declared fragment names.
    pub fn register(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        let template = parser::parse(name, source)?;
        self.register_template(&template)
    }

    /// Register the fragments of an already parsed file
    pub fn register_template(&mut self, template: &ParsedTemplate) -> Result<(), TemplateError> {
        for fragment in &template.defines {
            self.register_fragment(Arc::clone(fragment))?;
        }
        Ok(())
    }

    pub fn register_fragment(&mut self, fragment: Arc<Fragment>) -> Result<(), TemplateError> {
        if let Some(existing) = self.fragments.get(&fragment.name) {
            return Err(TemplateError::new(
                TemplateErrorKind::DuplicateTemplateName,
                format!(
                    "template `{}` is already defined in {} (line {})",
                    fragment.name, existing.file, existing.location.line
                ),
                &fragment.file,
                &fragment.source,
                Some(fragment.location),
            ));
        }

        tracing::trace!(name = %fragment.name, file = %fragment.file, "registered named template");
        self.fragments.insert(fragment.name.clone(), fragment);
        Ok(())
    }

    /// Local definition first, then the parent chain
    pub fn resolve(&self, name: &str) -> Option<Arc<Fragment>> {
        match self.fragments.get(name) {
            Some(fragment) => Some(Arc::clone(fragment)),
            None => self.parent.as_ref().and_then(|parent| parent.resolve(name)),
        }
    }

    /// Every resolvable name, local ones first
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fragments.keys().map(String::as_str).collect();
        if let Some(parent) = &self.parent {
            names.extend(parent.names());
        }
        names
    }

    /// Number of local definitions
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = TemplateRegistry::new();
        registry
            .register(
                "_helpers.tpl",
                r#"{{ define "app.name" }}web{{ end }}{{ define "app.labels" }}x{{ end }}"#,
            )
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("app.name").is_some());
        assert!(registry.resolve("missing").is_none());
        assert_eq!(registry.names(), vec!["app.name", "app.labels"]);
    }

    #[test]
    fn test_duplicate_in_one_chart() {
        let mut registry = TemplateRegistry::new();
        registry
            .register("a.tpl", r#"{{ define "dup" }}a{{ end }}"#)
            .unwrap();
        let err = registry
            .register("b.tpl", "\n{{ define \"dup\" }}b{{ end }}")
            .unwrap_err();

        assert_eq!(err.kind, TemplateErrorKind::DuplicateTemplateName);
        assert_eq!(err.file, "b.tpl");
        assert!(err.message.contains("a.tpl"));
    }

    #[test]
    fn test_child_shadows_parent() {
        let mut parent = TemplateRegistry::new();
        parent
            .register("p.tpl", r#"{{ define "name" }}parent{{ end }}{{ define "only.parent" }}p{{ end }}"#)
            .unwrap();

        let mut child = TemplateRegistry::with_parent(Arc::new(parent));
        child
            .register("c.tpl", r#"{{ define "name" }}child{{ end }}"#)
            .unwrap();

        assert_eq!(child.resolve("name").unwrap().file, "c.tpl");
        assert_eq!(child.resolve("only.parent").unwrap().file, "p.tpl");
        assert_eq!(child.len(), 1);
    }
}
