//! Relation paths: the addressing key of a node within an expression tree.

use std::fmt;

use smol_str::SmolStr;

/// Ordered chain of relation keys (alias or relation name) from the root to a node.
///
/// Paths are written with `.` between segments (`pets.owner`), the form used by
/// path-scoped modifiers. Parsing also accepts `:` so that join aliases such as
/// `pets:owner` address the same node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationPath(Vec<SmolStr>);

impl RelationPath {
    /// The empty path, addressing the root of a tree.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a `.` or `:` separated path. Whitespace around segments is ignored.
    pub fn parse(input: &str) -> Self {
        Self(
            input
                .split(['.', ':'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(SmolStr::new)
                .collect(),
        )
    }

    /// Build a path from segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// A new path with `key` appended.
    pub fn child(&self, key: impl Into<SmolStr>) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.into());
        Self(segments)
    }

    /// The path of the parent node, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// The path segments.
    pub fn segments(&self) -> &[SmolStr] {
        &self.0
    }

    /// The last segment.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(SmolStr::as_str)
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` is a (non-strict) prefix of this path.
    pub fn starts_with(&self, prefix: &RelationPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Join the segments with `separator`.
    pub fn join(&self, separator: &str) -> String {
        self.0.join(separator)
    }
}

impl fmt::Display for RelationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join("."))
    }
}

impl From<&str> for RelationPath {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

impl From<String> for RelationPath {
    fn from(input: String) -> Self {
        Self::parse(&input)
    }
}
