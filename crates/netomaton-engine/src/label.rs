//! Node identifiers.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix marking a serialized string key.
const KEY_ESCAPE: char = '~';

/// Opaque identifier of a node.
///
/// Labels are either integer indices (the form produced from adjacency
/// matrices and positional initial conditions) or arbitrary string keys.
/// Ordering puts every index before every key, indices in numeric order, so
/// that iteration over a `BTreeMap<NodeLabel, _>` matches ascending label sort.
///
/// Labels serialize as strings so they can be used as JSON object keys; a
/// canonical decimal string parses back into an index. A key that would read
/// back as an index, or that starts with `~`, is written with a leading `~`
/// so that every label survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeLabel {
    Index(u64),
    Key(String),
}

impl NodeLabel {
    /// The integer index, if this label is one.
    pub fn index(&self) -> Option<u64> {
        match self {
            NodeLabel::Index(i) => Some(*i),
            NodeLabel::Key(_) => None,
        }
    }

    /// Parse a label from its string form.
    pub fn parse(s: &str) -> Self {
        match s.parse::<u64>() {
            Ok(i) if i.to_string() == s => NodeLabel::Index(i),
            _ => NodeLabel::Key(s.to_string()),
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeLabel::Index(i) => write!(f, "{i}"),
            NodeLabel::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<u64> for NodeLabel {
    fn from(i: u64) -> Self {
        NodeLabel::Index(i)
    }
}

impl From<usize> for NodeLabel {
    fn from(i: usize) -> Self {
        NodeLabel::Index(i as u64)
    }
}

impl From<u32> for NodeLabel {
    fn from(i: u32) -> Self {
        NodeLabel::Index(u64::from(i))
    }
}

impl From<&str> for NodeLabel {
    fn from(s: &str) -> Self {
        NodeLabel::Key(s.to_string())
    }
}

impl From<String> for NodeLabel {
    fn from(s: String) -> Self {
        NodeLabel::Key(s)
    }
}

impl Serialize for NodeLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeLabel::Index(i) => serializer.collect_str(i),
            NodeLabel::Key(k)
                if k.starts_with(KEY_ESCAPE) || NodeLabel::parse(k).index().is_some() =>
            {
                serializer.collect_str(&format_args!("{KEY_ESCAPE}{k}"))
            }
            NodeLabel::Key(k) => serializer.serialize_str(k),
        }
    }
}

struct NodeLabelVisitor;

impl Visitor<'_> for NodeLabelVisitor {
    type Value = NodeLabel;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a string node label")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<NodeLabel, E> {
        Ok(NodeLabel::Index(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<NodeLabel, E> {
        u64::try_from(v)
            .map(NodeLabel::Index)
            .map_err(|_| E::custom(format!("negative node index {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<NodeLabel, E> {
        Ok(match v.strip_prefix(KEY_ESCAPE) {
            Some(key) => NodeLabel::Key(key.to_string()),
            None => NodeLabel::parse(v),
        })
    }
}

impl<'de> Deserialize<'de> for NodeLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeLabelVisitor)
    }
}
