//! Query Key Module
//!
//! Structured keys addressing derived query results. Prefix matching is the
//! only grouping mechanism, so "all variants of X" is always a key prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

// == Key Segment ==
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Num(i64),
    Str(String),
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        KeySegment::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        KeySegment::Str(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        KeySegment::Str(value.clone())
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        KeySegment::Num(value)
    }
}

impl From<u32> for KeySegment {
    fn from(value: u32) -> Self {
        KeySegment::Num(value.into())
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Num(n) => write!(f, "{}", n),
            KeySegment::Str(s) => write!(f, "{:?}", s),
        }
    }
}

// == Query Key ==
/// Ordered tuple of string/number segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }

    /// Returns a new key extended by one segment.
    pub fn with(&self, segment: impl Into<KeySegment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every segment of `self` equals the matching segment of `other`.
    ///
    /// A key is a prefix of itself. The empty key is a prefix of every key.
    pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
        other.0.len() >= self.0.len() && other.0.iter().zip(&self.0).all(|(a, b)| a == b)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", segment)?;
        }
        write!(f, "]")
    }
}

/// Builds a `QueryKey` from segments convertible into `KeySegment`.
///
/// ```
/// use order_cache::query_key;
///
/// let key = query_key!["orders", "r1", "list"];
/// assert_eq!(key.len(), 3);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($segment:expr),* $(,)?) => {
        $crate::query::QueryKey::new(vec![$($crate::query::KeySegment::from($segment)),*])
    };
}
