//! Values handling with deep merge support

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::value::{Mapping, ValueNode};

/// Reserved top-level key whose content is shared by a chart and all its subcharts
pub const GLOBAL_KEY: &str = "global";

/// How a merge treats a mapping meeting a non-mapping at the same key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Fail with `CoreError::TypeMismatch`
    #[default]
    Strict,
    /// The higher-precedence layer replaces the lower one
    OverrideWins,
}

/// Values container with deep merge capability
///
/// The inner node is always a mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Values(ValueNode);

impl Default for Values {
    fn default() -> Self {
        Self::new()
    }
}

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(ValueNode::mapping())
    }

    /// Wrap an existing mapping
    pub fn from_mapping(map: Mapping) -> Self {
        Self(ValueNode::Mapping(map))
    }

    /// Wrap a node, which must be a mapping (nil is read as empty)
    pub fn from_node(node: ValueNode) -> Result<Self> {
        match node {
            ValueNode::Mapping(_) => Ok(Self(node)),
            ValueNode::Null => Ok(Self::new()),
            other => Err(CoreError::InvalidValues {
                message: format!("top level must be a mapping, found {}", other.kind_name()),
            }),
        }
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from YAML string
    ///
    /// An empty document yields empty values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let node: ValueNode = serde_yaml::from_str(yaml)?;
        Self::from_node(node)
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Mappings: recursive merge
    /// - Scalars and sequences: overlay replaces base (sequences are not appended)
    /// - Explicit null in the overlay: removes the key
    /// - Mapping against non-mapping: depends on `policy`
    pub fn merge(&mut self, overlay: &Values, policy: MergePolicy) -> Result<()> {
        let mut path = Vec::new();
        deep_merge(self.mapping_mut(), overlay.mapping(), policy, &mut path)
    }

    /// Merge layers ordered from lowest to highest precedence into a new tree
    pub fn merge_layers<'a, I>(layers: I, policy: MergePolicy) -> Result<Values>
    where
        I: IntoIterator<Item = &'a Values>,
    {
        let mut result = Values::new();
        for (index, layer) in layers.into_iter().enumerate() {
            tracing::trace!(layer = index, keys = layer.mapping().len(), "merging values layer");
            result.merge(layer, policy)?;
        }
        Ok(result)
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: ValueNode) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::InvalidValues {
                message: format!("invalid key path '{}'", path),
            });
        }
        set_nested(self.mapping_mut(), &parts, value);
        Ok(())
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&ValueNode> {
        self.0.get_path(path)
    }

    /// The `global` subtree, if any
    pub fn global(&self) -> Option<&ValueNode> {
        self.mapping().get(GLOBAL_KEY)
    }

    /// Replace the `global` subtree
    pub fn set_global(&mut self, global: ValueNode) {
        self.mapping_mut().insert(GLOBAL_KEY.to_string(), global);
    }

    /// A copy of these values without the `global` key
    pub fn without_global(&self) -> Values {
        let mut map = self.mapping().clone();
        map.shift_remove(GLOBAL_KEY);
        Values::from_mapping(map)
    }

    /// The `global` subtree wrapped as a standalone layer (`{global: ...}`)
    pub fn global_layer(&self) -> Values {
        let mut layer = Values::new();
        if let Some(global @ ValueNode::Mapping(_)) = self.global() {
            layer.set_global(global.clone());
        }
        layer
    }

    /// Values a parent hands to the subchart scoped under `name`
    ///
    /// Only a mapping under that key is passed down; anything else is ignored.
    pub fn scope_for_subchart(&self, name: &str) -> Values {
        match self.mapping().get(name) {
            Some(ValueNode::Mapping(map)) => {
                let mut scoped = map.clone();
                scoped.shift_remove(GLOBAL_KEY);
                Values::from_mapping(scoped)
            }
            _ => Values::new(),
        }
    }

    /// Get the inner node
    pub fn inner(&self) -> &ValueNode {
        &self.0
    }

    /// Convert to the inner node
    pub fn into_inner(self) -> ValueNode {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        self.mapping().is_empty()
    }

    fn mapping(&self) -> &Mapping {
        match &self.0 {
            ValueNode::Mapping(map) => map,
            _ => unreachable!("Values always wraps a mapping"),
        }
    }

    fn mapping_mut(&mut self) -> &mut Mapping {
        if !self.0.is_mapping() {
            self.0 = ValueNode::mapping();
        }
        match &mut self.0 {
            ValueNode::Mapping(map) => map,
            _ => unreachable!("Values always wraps a mapping"),
        }
    }
}

impl<'de> Deserialize<'de> for Values {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let node = ValueNode::deserialize(deserializer)?;
        Values::from_node(node).map_err(serde::de::Error::custom)
    }
}

/// Deep merge two mappings in place
fn deep_merge(
    base: &mut Mapping,
    overlay: &Mapping,
    policy: MergePolicy,
    path: &mut Vec<String>,
) -> Result<()> {
    for (key, overlay_value) in overlay {
        if overlay_value.is_nil() {
            base.shift_remove(key);
            continue;
        }

        let Some(base_value) = base.get_mut(key) else {
            base.insert(key.clone(), overlay_value.clone());
            continue;
        };

        match (base_value, overlay_value) {
            (ValueNode::Mapping(base_map), ValueNode::Mapping(overlay_map)) => {
                path.push(key.clone());
                deep_merge(base_map, overlay_map, policy, path)?;
                path.pop();
            }
            (base_value, overlay_value)
                if policy == MergePolicy::Strict
                    && !base_value.is_nil()
                    && base_value.is_mapping() != overlay_value.is_mapping() =>
            {
                path.push(key.clone());
                return Err(CoreError::TypeMismatch {
                    path: path.join("."),
                    base: base_value.kind_name(),
                    overlay: overlay_value.kind_name(),
                });
            }
            (base_value, overlay_value) => {
                *base_value = overlay_value.clone();
            }
        }
    }
    Ok(())
}

/// Set a nested value by path, creating intermediate mappings
fn set_nested(map: &mut Mapping, path: &[&str], new_value: ValueNode) {
    let (key, remaining) = match path.split_first() {
        Some(split) => split,
        None => return,
    };

    if remaining.is_empty() {
        map.insert(key.to_string(), new_value);
        return;
    }

    let entry = map
        .entry(key.to_string())
        .or_insert_with(ValueNode::mapping);
    if !entry.is_mapping() {
        *entry = ValueNode::mapping();
    }
    if let ValueNode::Mapping(child) = entry {
        set_nested(child, remaining, new_value);
    }
}

/// Parse --set arguments (key=value format)
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::InvalidValues {
            message: format!("Invalid --set format: '{}'. Expected key=value", arg),
        })?;

        let node = if val == "true" {
            ValueNode::Bool(true)
        } else if val == "false" {
            ValueNode::Bool(false)
        } else if val == "null" {
            ValueNode::Null
        } else if let Ok(num) = val.parse::<i64>() {
            ValueNode::Int(num)
        } else if let Ok(num) = val.parse::<f64>() {
            ValueNode::Float(num)
        } else if val.starts_with('[') || val.starts_with('{') {
            serde_yaml::from_str(val).unwrap_or_else(|_| ValueNode::from(val))
        } else {
            ValueNode::from(val)
        };

        values.set(key, node)?;
    }

    Ok(values)
}
