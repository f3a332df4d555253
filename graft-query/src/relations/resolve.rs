//! Binding expression nodes to relation metadata.

use std::fmt;
use std::sync::Arc;

use graft_expr::{Recursion, RelationExpr, RelationPath};
use smol_str::SmolStr;

use super::modifiers::EagerModifiers;
use super::spec::{ModelSpec, RelationMetadata, RelationSpec};
use crate::error::{QueryError, QueryResult};
use crate::traits::QueryMutator;

/// An expression node bound to its relation, models and query mutators.
#[derive(Clone)]
pub struct EagerNode {
    /// Field name on the owner records.
    pub key: SmolStr,
    /// Path of keys from the root.
    pub path: RelationPath,
    /// The relation fetched.
    pub relation: RelationSpec,
    /// Model owning the relation.
    pub owner: Arc<ModelSpec>,
    /// Related model.
    pub model: Arc<ModelSpec>,
    /// Mutators for the relation query: named filters in expression order,
    /// then path modifiers in registration order.
    pub mutators: Vec<QueryMutator>,
    /// Resolved children.
    pub children: Vec<Arc<EagerNode>>,
    /// Next recursive level, resolved only once data reaches it.
    pub repeat: Option<RelationExpr>,
}

impl EagerNode {
    /// Whether the relation holds a list.
    pub fn is_many(&self) -> bool {
        self.relation.is_many()
    }

    /// Whether another level follows once this one has data.
    pub fn is_recursive(&self) -> bool {
        self.repeat.is_some()
    }

    /// Columns of the related model that children use as owner keys.
    pub fn child_owner_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        let repeated = self.repeat.as_ref().map(|_| &self.relation);
        let relations = self.children.iter().map(|child| &child.relation).chain(repeated);
        for relation in relations {
            for column in &relation.owner_columns {
                if !columns.contains(&column.as_str()) {
                    columns.push(column.as_str());
                }
            }
        }
        columns
    }
}

impl fmt::Debug for EagerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerNode")
            .field("key", &self.key)
            .field("path", &self.path.to_string())
            .field("relation", &self.relation.name)
            .field("owner", &self.owner.name)
            .field("model", &self.model.name)
            .field("mutators", &self.mutators.len())
            .field("children", &self.children)
            .field("repeat", &self.repeat.as_ref().map(|e| e.recursion))
            .finish()
    }
}

/// Resolves expression nodes against metadata.
///
/// Holds the canonical modifier paths so that recursive levels resolved during
/// a fetch receive the same modifiers as levels resolved up front.
pub struct Resolver<'a> {
    metadata: &'a dyn RelationMetadata,
    modifiers: &'a EagerModifiers,
    paths: Vec<(RelationPath, QueryMutator)>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver for `tree`, checking every modifier path against it.
    pub fn new(
        metadata: &'a dyn RelationMetadata,
        modifiers: &'a EagerModifiers,
        tree: &RelationExpr,
    ) -> QueryResult<Self> {
        let paths = modifiers.resolve_paths(tree)?;
        Ok(Self {
            metadata,
            modifiers,
            paths,
        })
    }

    /// Resolve the children of the root node.
    pub fn resolve_root(&self, model: &Arc<ModelSpec>, tree: &RelationExpr) -> QueryResult<Vec<Arc<EagerNode>>> {
        tree.children
            .values()
            .map(|child| self.resolve(model, child, &RelationPath::root()).map(Arc::new))
            .collect()
    }

    /// Resolve the next recursive level below `node`.
    pub fn repeat(&self, node: &EagerNode) -> QueryResult<Option<Arc<EagerNode>>> {
        match &node.repeat {
            Some(expr) => Ok(Some(Arc::new(self.resolve(&node.model, expr, &node.path)?))),
            None => Ok(None),
        }
    }

    fn resolve(&self, owner: &Arc<ModelSpec>, expr: &RelationExpr, parent: &RelationPath) -> QueryResult<EagerNode> {
        let key = SmolStr::new(expr.key());
        let path = parent.child(key.clone());
        let name = expr.relation.as_deref().unwrap_or_default();

        let relation = owner
            .get_relation(name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_relation(&owner.name, name, path.to_string()))?;
        let model = self
            .metadata
            .model(&relation.related_model)
            .ok_or_else(|| QueryError::unknown_model(&relation.related_model).with_path(path.to_string()))?;

        let mut mutators = Vec::with_capacity(expr.filters.len());
        for filter in &expr.filters {
            let mutator = self
                .modifiers
                .filter(filter)
                .or_else(|| model.named_filters.get(filter))
                .cloned()
                .ok_or_else(|| QueryError::unknown_filter(filter.as_str(), path.to_string()))?;
            mutators.push(mutator);
        }
        mutators.extend(
            self.paths
                .iter()
                .filter(|(p, _)| *p == path)
                .map(|(_, mutator)| mutator.clone()),
        );

        // A recursive node with an explicit child of its own key folds the
        // next level into that child.
        let mut children = expr.children.clone();
        let mut repeat = expr.recursive_child();
        if let Some(next) = &repeat {
            if let Some(existing) = children.get_mut(&key) {
                existing.merge(next.clone())?;
                repeat = None;
            }
        }

        let children = children
            .values()
            .map(|child| self.resolve(&model, child, &path).map(Arc::new))
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(EagerNode {
            key,
            path,
            relation,
            owner: owner.clone(),
            model,
            mutators,
            children,
            repeat,
        })
    }
}

/// Replace unbounded recursion in `tree` with a bound of `depth` levels.
pub fn bound_recursion(tree: &mut RelationExpr, depth: u32) {
    if tree.recursion.is_unbounded() {
        tree.recursion = Recursion::bounded(depth);
    }
    for child in tree.children.values_mut() {
        bound_recursion(child, depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::relations::modifiers::FilterMap;
    use crate::relations::spec::{Catalog, JoinTableSpec};
    use crate::traits::mutator;
    use graft_expr::parse_expression;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_model(
                ModelSpec::new("Person", "people")
                    .columns(["id", "parentId"])
                    .relation(RelationSpec::many_to_one("parent", "Person").join_on(["parentId"], ["id"]))
                    .relation(RelationSpec::one_to_many("pets", "Pet").join_on(["id"], ["ownerId"]))
                    .relation(RelationSpec::many_to_many(
                        "movies",
                        "Movie",
                        JoinTableSpec::new("people_movies", "personId", "movieId"),
                    ).join_on(["id"], ["id"])),
            )
            .with_model(
                ModelSpec::new("Pet", "pets")
                    .columns(["id", "ownerId", "species"])
                    .named_filter("dogs", mutator(|q| {
                        q.where_eq("species", "dog");
                    })),
            )
            .with_model(ModelSpec::new("Movie", "movies").columns(["id", "name"]))
    }

    fn resolve(expression: &str, modifiers: &EagerModifiers) -> QueryResult<Vec<Arc<EagerNode>>> {
        let catalog = catalog();
        let tree = parse_expression(expression)?;
        let model = catalog.model("Person").unwrap();
        let resolver = Resolver::new(&catalog, modifiers, &tree)?;
        resolver.resolve_root(&model, &tree)
    }

    #[test]
    fn test_resolve_tree() {
        let nodes = resolve("[pets(dogs) as dogs, parent.movies]", &EagerModifiers::new()).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].key, "dogs");
        assert_eq!(nodes[0].relation.name, "pets");
        assert_eq!(nodes[0].model.name, "Pet");
        assert_eq!(nodes[0].mutators.len(), 1);
        assert!(nodes[0].is_many());

        let parent = &nodes[1];
        assert_eq!(parent.child_owner_columns(), vec!["id"]);
        assert_eq!(parent.children[0].path, RelationPath::parse("parent.movies"));
        assert_eq!(parent.children[0].owner.name, "Person");
    }

    #[test]
    fn test_unknown_relation() {
        let err = resolve("parent.owner", &EagerModifiers::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownRelation);
        assert_eq!(err.context.expression.as_deref(), Some("owner"));
        assert_eq!(err.context.path.as_deref(), Some("parent.owner"));
    }

    #[test]
    fn test_unknown_filter() {
        let err = resolve("pets(cats)", &EagerModifiers::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownFilter);
        assert_eq!(err.context.expression.as_deref(), Some("cats"));
    }

    #[test]
    fn test_supplied_filters_take_precedence() {
        let mut modifiers = EagerModifiers::new();
        modifiers.add_filters(FilterMap::new().with("cats", mutator(|q| {
            q.where_eq("species", "cat");
        })));
        let nodes = resolve("pets(cats, dogs)", &modifiers).unwrap();
        assert_eq!(nodes[0].mutators.len(), 2);
    }

    #[test]
    fn test_recursive_levels_resolve_lazily() {
        let mut modifiers = EagerModifiers::new();
        modifiers.add_path_mutator("parent.parent", mutator(|q| {
            q.limit(1);
        }));
        let catalog = catalog();
        let tree = parse_expression("parent.^3").unwrap();
        let model = catalog.model("Person").unwrap();
        let resolver = Resolver::new(&catalog, &modifiers, &tree).unwrap();

        let nodes = resolver.resolve_root(&model, &tree).unwrap();
        let first = &nodes[0];
        assert!(first.is_recursive());
        assert!(first.mutators.is_empty());
        assert_eq!(first.child_owner_columns(), vec!["parentId"]);

        let second = resolver.repeat(first).unwrap().unwrap();
        assert_eq!(second.path, RelationPath::parse("parent.parent"));
        assert_eq!(second.mutators.len(), 1);

        let third = resolver.repeat(&second).unwrap().unwrap();
        assert!(!third.is_recursive());
        assert!(resolver.repeat(&third).unwrap().is_none());
    }

    #[test]
    fn test_bound_recursion() {
        let mut tree = parse_expression("[parent.^, pets]").unwrap();
        bound_recursion(&mut tree, 2);
        assert_eq!(tree.to_string(), "[parent.^2, pets]");
    }
}
