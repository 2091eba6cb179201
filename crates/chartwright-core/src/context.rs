//! Template context - the root data tree templates are evaluated against

use crate::chart::ChartMetadata;
use crate::release::ReleaseInfo;
use crate::value::{Mapping, ValueNode};
use crate::values::Values;

/// Complete context for rendering one chart's templates
#[derive(Debug, Clone)]
pub struct TemplateContext {
    /// Merged values (`.Values`)
    pub values: Values,

    /// Release information (`.Release`)
    pub release: ReleaseInfo,

    /// Chart metadata (`.Chart`)
    pub chart: ChartMetadata,
}

impl TemplateContext {
    pub fn new(values: Values, release: ReleaseInfo, chart: ChartMetadata) -> Self {
        Self {
            values,
            release,
            chart,
        }
    }

    /// Build the root tree: `{Values, Release, Chart}`
    pub fn to_node(&self) -> ValueNode {
        let mut root = Mapping::new();
        root.insert("Values".into(), self.values.inner().clone());
        root.insert("Release".into(), self.release.to_node());
        root.insert("Chart".into(), self.chart.to_node());
        ValueNode::Mapping(root)
    }
}
