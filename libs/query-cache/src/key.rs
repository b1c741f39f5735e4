use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// One component of a [`QueryKey`].
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(untagged)]
pub enum KeySegment {
    Tag(String),
    Params(BTreeMap<String, String>),
}

/// Parameter record builder. Absent values are skipped, so a record built
/// from `search = None` equals an empty record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParams(BTreeMap<String, String>);

impl KeyParams {
    pub fn new() -> Self { Self::default() }

    pub fn with<V: ToString>(mut self, name: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.0.insert(name.to_string(), value.to_string());
        }
        self
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Structural identifier of a cacheable unit of data.
///
/// The first segment is the namespace. Keys compare, order and hash by
/// value; parameter records compare independently of insertion order.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self(vec![KeySegment::Tag(namespace.into())])
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.0.push(KeySegment::Tag(tag.into()));
        self
    }

    pub fn params(mut self, params: KeyParams) -> Self {
        self.0.push(KeySegment::Params(params.0));
        self
    }

    pub fn namespace(&self) -> &str {
        match self.0.first() {
            Some(KeySegment::Tag(tag)) => tag,
            _ => "",
        }
    }

    pub fn segments(&self) -> &[KeySegment] { &self.0 }

    /// Hierarchical match: `prefix` equals the leading segments of `self`.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match segment {
                KeySegment::Tag(tag) => f.write_str(tag)?,
                KeySegment::Params(params) => {
                    f.write_str("{")?;
                    for (j, (name, value)) in params.iter().enumerate() {
                        if j > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "{}={}", name, value)?;
                    }
                    f.write_str("}")?;
                }
            }
        }
        Ok(())
    }
}
