//! Chartwright Core - Core types for the chart template engine
//!
//! This crate provides the foundational types used throughout Chartwright:
//! - `ValueNode`: The value tree produced from `values.yaml` and overrides
//! - `Values`: Configuration layers with deep merge and global propagation
//! - `ReleaseInfo`: Release metadata exposed to templates
//! - `Chart`: The in-memory chart (metadata, defaults, templates, subcharts)
//! - `TemplateContext`: The root tree every render starts from

pub mod chart;
pub mod context;
pub mod error;
pub mod release;
pub mod value;
pub mod values;

pub use chart::{Chart, ChartMetadata, Dependency, ResolvedChart, TemplateFile};
pub use context::TemplateContext;
pub use error::{CoreError, Result};
pub use release::ReleaseInfo;
pub use value::{Mapping, ValueNode};
pub use values::{MergePolicy, Values, parse_set_values};
