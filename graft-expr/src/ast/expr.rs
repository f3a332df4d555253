//! The relation expression tree.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::{RelationPath, Span};
use crate::error::{ExprError, ExprResult};

/// Recursion marker of a node (`.^` / `.^N`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Recursion {
    /// The node does not repeat.
    #[default]
    None,
    /// `.^`: repeat until the data runs out (or an algorithm imposes a bound).
    Unbounded,
    /// `.^N`: the relation appears exactly `N` levels deep, counting the node itself.
    Bounded(u32),
}

impl Recursion {
    /// A bounded recursion of `depth` levels. Depths of one or less do not repeat.
    pub fn bounded(depth: u32) -> Self {
        if depth > 1 {
            Self::Bounded(depth)
        } else {
            Self::None
        }
    }

    /// Whether the node repeats below itself.
    pub fn is_recursive(&self) -> bool {
        match self {
            Self::None => false,
            Self::Unbounded => true,
            Self::Bounded(n) => *n > 1,
        }
    }

    /// Whether the recursion has no bound.
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Self::Unbounded)
    }

    /// The recursion of the repeated child one level down, if there is one.
    pub fn descend(self) -> Option<Self> {
        match self {
            Self::None => None,
            Self::Unbounded => Some(Self::Unbounded),
            Self::Bounded(n) if n > 1 => Some(Self::bounded(n - 1)),
            Self::Bounded(_) => None,
        }
    }

    /// The deeper of two recursions.
    pub fn max(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unbounded, _) | (_, Self::Unbounded) => Self::Unbounded,
            (Self::Bounded(a), Self::Bounded(b)) => Self::Bounded(a.max(b)),
            (Self::Bounded(n), Self::None) | (Self::None, Self::Bounded(n)) => Self::Bounded(n),
            (Self::None, Self::None) => Self::None,
        }
    }
}

impl fmt::Display for Recursion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Unbounded => f.write_str("^"),
            Self::Bounded(n) => write!(f, "^{}", n),
        }
    }
}

/// A node of a relation expression.
///
/// The root node has no relation; every other node names a relation of its
/// parent's model. Children are keyed by alias (when given) or relation name and
/// keep the order in which they were written.
#[derive(Debug, Clone, Default)]
pub struct RelationExpr {
    /// Relation name, `None` only for the root.
    pub relation: Option<SmolStr>,
    /// Output name of the relation, replacing the relation name.
    pub alias: Option<SmolStr>,
    /// Named filters, in the order written.
    pub filters: Vec<SmolStr>,
    /// Recursion marker.
    pub recursion: Recursion,
    /// Child nodes keyed by [`RelationExpr::key`].
    pub children: IndexMap<SmolStr, RelationExpr>,
    /// Location of the relation reference in the source text.
    pub span: Span,
}

impl RelationExpr {
    /// An empty root node.
    pub fn root() -> Self {
        Self::default()
    }

    /// A node for `relation`.
    pub fn new(relation: impl Into<SmolStr>) -> Self {
        Self {
            relation: Some(relation.into()),
            ..Self::default()
        }
    }

    /// Set the alias.
    pub fn with_alias(mut self, alias: impl Into<SmolStr>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add a named filter.
    pub fn with_filter(mut self, filter: impl Into<SmolStr>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Set the recursion marker.
    pub fn with_recursion(mut self, recursion: Recursion) -> Self {
        self.recursion = recursion;
        self
    }

    /// Add a child node, replacing any child with the same key.
    pub fn with_child(mut self, child: RelationExpr) -> Self {
        self.insert_child(child);
        self
    }

    /// The key of this node within its parent: the alias, else the relation name.
    pub fn key(&self) -> &str {
        self.alias
            .as_deref()
            .or(self.relation.as_deref())
            .unwrap_or_default()
    }

    /// Whether this is a root node.
    pub fn is_root(&self) -> bool {
        self.relation.is_none()
    }

    /// Whether the node has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Insert a child, returning the child it replaced.
    pub fn insert_child(&mut self, child: RelationExpr) -> Option<RelationExpr> {
        let key = SmolStr::new(child.key());
        self.children.insert(key, child)
    }

    /// The child for a path segment.
    ///
    /// A segment matches a child key first; failing that, it matches the one
    /// child whose relation name equals the segment.
    pub fn child(&self, segment: &str) -> Option<&RelationExpr> {
        self.child_index(segment)
            .and_then(|index| self.children.get_index(index))
            .map(|(_, child)| child)
    }

    fn child_index(&self, segment: &str) -> Option<usize> {
        if let Some(index) = self.children.get_index_of(segment) {
            return Some(index);
        }
        let mut matches = self
            .children
            .values()
            .enumerate()
            .filter(|(_, child)| child.relation.as_deref() == Some(segment));
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Some(index),
            _ => None,
        }
    }

    /// Find an explicit node by path.
    pub fn find(&self, path: &RelationPath) -> Option<&RelationExpr> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Find an explicit node by path, mutably.
    pub fn find_mut(&mut self, path: &RelationPath) -> Option<&mut RelationExpr> {
        let mut node = self;
        for segment in path.segments() {
            let index = node.child_index(segment)?;
            node = node.children.get_index_mut(index)?.1;
        }
        Some(node)
    }

    /// Locate the node a path addresses, walking into recursive expansions.
    ///
    /// Returns the node whose structure applies at `path` together with the
    /// recursion in effect there. A recursive node accepts its own key as the
    /// next segment for as long as its bound allows.
    pub fn locate(&self, path: &RelationPath) -> Option<(&RelationExpr, Recursion)> {
        let mut node = self;
        let mut recursion = self.recursion;
        for segment in path.segments() {
            if let Some(child) = node.child(segment) {
                node = child;
                recursion = child.recursion;
            } else if !node.is_root() && node.key() == segment.as_str() {
                recursion = recursion.descend()?;
            } else {
                return None;
            }
        }
        Some((node, recursion))
    }

    /// Whether `path` addresses a node of this tree, including recursive levels.
    pub fn resolves(&self, path: &RelationPath) -> bool {
        self.locate(path).is_some()
    }

    /// Rewrite `path` in terms of node keys.
    ///
    /// Segments may name a child by key or by relation name; the result uses
    /// keys only, so two spellings of the same node compare equal.
    pub fn canonical_path(&self, path: &RelationPath) -> Option<RelationPath> {
        let mut node = self;
        let mut recursion = self.recursion;
        let mut canonical = RelationPath::root();
        for segment in path.segments() {
            if let Some(child) = node.child(segment) {
                node = child;
                recursion = child.recursion;
            } else if !node.is_root() && node.key() == segment.as_str() {
                recursion = recursion.descend()?;
            } else {
                return None;
            }
            canonical = canonical.child(node.key());
        }
        Some(canonical)
    }

    /// The repeated child of a recursive node, one level down.
    pub fn recursive_child(&self) -> Option<RelationExpr> {
        self.recursion.descend().map(|recursion| RelationExpr {
            recursion,
            ..self.clone()
        })
    }

    /// Merge `other` into this tree.
    ///
    /// Children are unioned by key, filters are unioned in first-seen order and
    /// recursion takes the deeper bound. A key that names different relations in
    /// the two trees is an [`ExprError::AliasConflict`].
    pub fn merge(&mut self, other: RelationExpr) -> ExprResult<()> {
        if self.relation != other.relation {
            return Err(ExprError::AliasConflict {
                path: self.key().to_string(),
                key: self.key().to_string(),
                existing: self.relation.clone().unwrap_or_default().to_string(),
                incoming: other.relation.unwrap_or_default().to_string(),
            });
        }
        self.merge_at(&RelationPath::root(), other)
    }

    /// Consuming form of [`RelationExpr::merge`].
    pub fn merged(mut self, other: RelationExpr) -> ExprResult<Self> {
        self.merge(other)?;
        Ok(self)
    }

    fn merge_at(&mut self, path: &RelationPath, other: RelationExpr) -> ExprResult<()> {
        for filter in other.filters {
            if !self.filters.contains(&filter) {
                self.filters.push(filter);
            }
        }
        self.recursion = self.recursion.max(other.recursion);
        if self.alias.is_none() {
            self.alias = other.alias;
        }

        for (key, child) in other.children {
            let child_path = path.child(key.clone());
            match self.children.get_mut(&key) {
                Some(existing) if existing.relation != child.relation => {
                    return Err(ExprError::AliasConflict {
                        path: child_path.to_string(),
                        key: key.to_string(),
                        existing: existing.relation.clone().unwrap_or_default().to_string(),
                        incoming: child.relation.unwrap_or_default().to_string(),
                    });
                }
                Some(existing) => existing.merge_at(&child_path, child)?,
                None => {
                    self.children.insert(key, child);
                }
            }
        }
        Ok(())
    }

    /// Materialize recursion into explicit nested children.
    ///
    /// Unbounded recursion is expanded `max_depth` levels deep; without a
    /// `max_depth` it is an [`ExprError::UnboundedRecursion`].
    pub fn expanded(&self, max_depth: Option<u32>) -> ExprResult<RelationExpr> {
        let expression = self.to_string();
        self.expand_at(&RelationPath::root(), max_depth, &expression)
    }

    fn expand_at(
        &self,
        path: &RelationPath,
        max_depth: Option<u32>,
        expression: &str,
    ) -> ExprResult<RelationExpr> {
        let recursion = match self.recursion {
            Recursion::Unbounded => match max_depth {
                Some(depth) => Recursion::bounded(depth),
                None => {
                    return Err(ExprError::UnboundedRecursion {
                        expression: expression.to_string(),
                        path: path.to_string(),
                    });
                }
            },
            other => other,
        };

        let mut node = RelationExpr {
            relation: self.relation.clone(),
            alias: self.alias.clone(),
            filters: self.filters.clone(),
            recursion: Recursion::None,
            children: IndexMap::with_capacity(self.children.len()),
            span: self.span,
        };
        for (key, child) in &self.children {
            let child = child.expand_at(&path.child(key.clone()), max_depth, expression)?;
            node.children.insert(key.clone(), child);
        }

        if let Some(next) = recursion.descend() {
            let key = SmolStr::new(self.key());
            let child_path = path.child(key.clone());
            let repeated = RelationExpr {
                recursion: next,
                ..self.clone()
            }
            .expand_at(&child_path, max_depth, expression)?;
            match node.children.get_mut(&key) {
                Some(existing) if existing.relation != repeated.relation => {
                    return Err(ExprError::AliasConflict {
                        path: child_path.to_string(),
                        key: key.to_string(),
                        existing: existing.relation.clone().unwrap_or_default().to_string(),
                        incoming: repeated.relation.unwrap_or_default().to_string(),
                    });
                }
                Some(existing) => existing.merge_at(&child_path, repeated)?,
                None => {
                    node.children.insert(key, repeated);
                }
            }
        }
        Ok(node)
    }

    /// All explicit relation paths, parents before children.
    pub fn paths(&self) -> Vec<RelationPath> {
        let mut paths = Vec::new();
        self.collect_paths(&RelationPath::root(), &mut paths);
        paths
    }

    fn collect_paths(&self, path: &RelationPath, out: &mut Vec<RelationPath>) {
        for (key, child) in &self.children {
            let child_path = path.child(key.clone());
            out.push(child_path.clone());
            child.collect_paths(&child_path, out);
        }
    }

    /// Depth of the explicit tree below this node.
    pub fn depth(&self) -> usize {
        self.children
            .values()
            .map(|child| 1 + child.depth())
            .max()
            .unwrap_or(0)
    }

    fn write_reference(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.relation.as_deref().unwrap_or_default())?;
        if !self.filters.is_empty() {
            write!(f, "({})", self.filters.join(", "))?;
        }
        if let Some(alias) = &self.alias {
            write!(f, " as {}", alias)?;
        }

        let recursive = self.recursion.is_recursive();
        match (self.children.len(), recursive) {
            (0, false) => Ok(()),
            (0, true) => write!(f, ".{}", self.recursion),
            (1, false) => {
                f.write_str(".")?;
                self.children[0].write_reference(f)
            }
            _ => {
                f.write_str(".")?;
                self.write_children(f, recursive)
            }
        }
    }

    // A merged node can be both recursive and have explicit children; the
    // marker is then written as the last list element.
    fn write_children(&self, f: &mut fmt::Formatter<'_>, recursive: bool) -> fmt::Result {
        f.write_str("[")?;
        for (i, child) in self.children.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            child.write_reference(f)?;
        }
        if recursive {
            write!(f, ", {}", self.recursion)?;
        }
        f.write_str("]")
    }
}

impl PartialEq for RelationExpr {
    fn eq(&self, other: &Self) -> bool {
        self.relation == other.relation
            && self.alias == other.alias
            && self.filters == other.filters
            && self.recursion == other.recursion
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(a, b)| a == b)
    }
}

impl Eq for RelationExpr {}

impl fmt::Display for RelationExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_root() {
            return self.write_reference(f);
        }
        if self.children.len() == 1 {
            self.children[0].write_reference(f)
        } else {
            self.write_children(f, false)
        }
    }
}

impl FromStr for RelationExpr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_expression(s)
    }
}
