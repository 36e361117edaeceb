//! Stored Value Types
//!
//! Every key maps to one [`Value`], a tagged variant over the five
//! container kinds. Handlers match on it exhaustively; operating on the
//! wrong kind produces the fixed WRONGTYPE error reply, never a panic.
//!
//! Only string values are produced by the built-in command set; the
//! container variants exist for the `TYPE` command, the snapshot
//! iterator consumed by persistence, and the handlers layered on top of
//! this crate.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// A value held in the keyspace.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A binary-safe string.
    Str(Bytes),

    /// A double-ended list of byte strings.
    List(VecDeque<Bytes>),

    /// A field → value mapping.
    Hash(HashMap<Bytes, Bytes>),

    /// An unordered set of unique members.
    Set(HashSet<Bytes>),

    /// A member → score mapping ordered by member.
    SortedSet(BTreeMap<Bytes, f64>),
}

impl Value {
    /// Creates a string value.
    pub fn str(data: impl Into<Bytes>) -> Self {
        Value::Str(data.into())
    }

    /// The type name reported by the `TYPE` command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
        }
    }

    /// The string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&Bytes> {
        match self {
            Value::Str(data) => Some(data),
            _ => None,
        }
    }

    /// Returns true if this is a string value.
    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::str("v").type_name(), "string");
        assert_eq!(Value::List(VecDeque::new()).type_name(), "list");
        assert_eq!(Value::Hash(HashMap::new()).type_name(), "hash");
        assert_eq!(Value::Set(HashSet::new()).type_name(), "set");
        assert_eq!(Value::SortedSet(BTreeMap::new()).type_name(), "zset");
    }

    #[test]
    fn test_string_accessor() {
        let value = Value::str("hello");
        assert_eq!(value.as_str(), Some(&Bytes::from("hello")));
        assert!(value.is_str());

        let list = Value::List(VecDeque::new());
        assert_eq!(list.as_str(), None);
        assert!(!list.is_str());
    }
}
