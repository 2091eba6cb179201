//! The value tree shared by every layer of a render
//!
//! `ValueNode` is what `values.yaml`, `--set` overrides and template
//! expressions all evaluate to. Mappings keep insertion order so that
//! iterating a mapping is deterministic.

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use std::fmt;

/// Ordered string-keyed mapping
pub type Mapping = IndexMap<String, ValueNode>;

/// The nil sentinel handed out for missing lookups
pub static NIL: ValueNode = ValueNode::Null;

/// A node of the value tree
///
/// `Null` doubles as the nil sentinel: a missing key and an explicit
/// `~`/`null` in YAML behave the same way everywhere.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum ValueNode {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ValueNode>),
    Mapping(Mapping),
}

impl ValueNode {
    /// Create an empty mapping
    pub fn mapping() -> Self {
        Self::Mapping(Mapping::new())
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Vec<ValueNode>> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    /// Truthiness used by `if`, `with`, `and`, `or` and `not`
    ///
    /// Nil, `false`, the empty string, empty collections and numeric zero
    /// are falsy. Everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Sequence(items) => !items.is_empty(),
            Self::Mapping(map) => !map.is_empty(),
        }
    }

    /// Look up a single key on a mapping
    pub fn get(&self, key: &str) -> Option<&ValueNode> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Look up a dotted path through nested mappings
    pub fn get_path(&self, path: &str) -> Option<&ValueNode> {
        path.split('.')
            .filter(|part| !part.is_empty())
            .try_fold(self, |node, part| node.get(part))
    }

    /// Numeric view of the value, coercing numeric strings
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text form used when a value is spliced into template output
    ///
    /// Nil renders as the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Serialize the value back to YAML without the trailing newline
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(yaml.trim_end_matches('\n').to_string())
    }

    /// Serialize the value to compact JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format a float the way Go's `%v` does for whole numbers
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{}", f as i128)
    } else {
        format!("{}", f)
    }
}

impl fmt::Display for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::String(s) => f.write_str(s),
            Self::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Self::Mapping(map) => {
                f.write_str("map[")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}:{}", key, value)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for ValueNode {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ValueNode {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for ValueNode {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ValueNode {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for ValueNode {
    fn from(n: u32) -> Self {
        Self::Int(n.into())
    }
}

impl From<f64> for ValueNode {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Vec<ValueNode>> for ValueNode {
    fn from(items: Vec<ValueNode>) -> Self {
        Self::Sequence(items)
    }
}

impl From<Mapping> for ValueNode {
    fn from(map: Mapping) -> Self {
        Self::Mapping(map)
    }
}

impl<T: Into<ValueNode>> From<Option<T>> for ValueNode {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl<'de> Deserialize<'de> for ValueNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueNodeVisitor)
    }
}

struct ValueNodeVisitor;

impl<'de> Visitor<'de> for ValueNodeVisitor {
    type Value = ValueNode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any YAML value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ValueNode, E> {
        Ok(ValueNode::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ValueNode, E> {
        Ok(ValueNode::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ValueNode, E> {
        Ok(i64::try_from(v)
            .map(ValueNode::Int)
            .unwrap_or(ValueNode::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ValueNode, E> {
        Ok(ValueNode::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ValueNode, E> {
        Ok(ValueNode::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<ValueNode, E> {
        Ok(ValueNode::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<ValueNode, E> {
        Ok(ValueNode::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<ValueNode, E> {
        Ok(ValueNode::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<ValueNode, D::Error> {
        ValueNode::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ValueNode, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ValueNode::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ValueNode, A::Error> {
        let mut map = Mapping::with_capacity(access.size_hint().unwrap_or(0));
        // YAML allows non-string keys (`1: a`, `true: b`); they are keyed by their text
        while let Some((key, value)) = access.next_entry::<ValueNode, ValueNode>()? {
            map.insert(key.to_text(), value);
        }
        Ok(ValueNode::Mapping(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> ValueNode {
        serde_yaml::from_str(src).unwrap()
    }

    #[test]
    fn test_deserialize_preserves_key_order() {
        let node = yaml("zeta: 1\nalpha: 2\nmid: 3\n");
        let keys: Vec<&str> = node.as_mapping().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_deserialize_scalars() {
        let node = yaml("a: ~\nb: true\nc: 3\nd: 1.5\ne: text\n1: numeric-key\n");
        assert_eq!(node.get("a"), Some(&ValueNode::Null));
        assert_eq!(node.get("b"), Some(&ValueNode::Bool(true)));
        assert_eq!(node.get("c"), Some(&ValueNode::Int(3)));
        assert_eq!(node.get("d"), Some(&ValueNode::Float(1.5)));
        assert_eq!(node.get("e"), Some(&ValueNode::from("text")));
        assert_eq!(node.get("1"), Some(&ValueNode::from("numeric-key")));
    }

    #[test]
    fn test_truthiness() {
        assert!(!ValueNode::Null.is_truthy());
        assert!(!ValueNode::Bool(false).is_truthy());
        assert!(!ValueNode::Int(0).is_truthy());
        assert!(!ValueNode::Float(0.0).is_truthy());
        assert!(!ValueNode::from("").is_truthy());
        assert!(!ValueNode::Sequence(vec![]).is_truthy());
        assert!(!ValueNode::mapping().is_truthy());

        assert!(ValueNode::Bool(true).is_truthy());
        assert!(ValueNode::Int(-1).is_truthy());
        assert!(ValueNode::from("false").is_truthy());
        assert!(ValueNode::Sequence(vec![ValueNode::Null]).is_truthy());
    }

    #[test]
    fn test_text_rendering() {
        assert_eq!(ValueNode::Null.to_text(), "");
        assert_eq!(ValueNode::Float(3.0).to_text(), "3");
        assert_eq!(ValueNode::Float(2.5).to_text(), "2.5");
        assert_eq!(yaml("[a, 1, true]").to_text(), "[a 1 true]");
        assert_eq!(yaml("{b: 1, a: x}").to_text(), "map[b:1 a:x]");
    }

    #[test]
    fn test_to_yaml_trims_trailing_newline() {
        let node = yaml("name: demo\nports:\n- 80\n- 443\n");
        assert_eq!(node.to_yaml().unwrap(), "name: demo\nports:\n- 80\n- 443");
    }

    #[test]
    fn test_get_path() {
        let node = yaml("image:\n  repository: nginx\n");
        assert_eq!(node.get_path("image.repository"), Some(&ValueNode::from("nginx")));
        assert!(node.get_path("image.tag").is_none());
        assert!(node.get_path("image.repository.deeper").is_none());
    }
}
