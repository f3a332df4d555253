//! Fetch planning.
//!
//! A [`FetchPlan`] lists one [`FetchStep`] per relation to fetch, each pointing
//! at the step that produces its owners. Steps are ordered the way the
//! algorithm visits them: breadth-first for where-in, depth-first otherwise.
//! Recursive relations grow the plan while it runs, one level at a time.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use graft_expr::RelationPath;

use super::resolve::EagerNode;
use crate::config::EagerAlgorithm;

/// One relation fetch.
#[derive(Debug, Clone)]
pub struct FetchStep {
    /// Position in the plan.
    pub index: usize,
    /// Key path of the relation.
    pub path: RelationPath,
    /// Step producing the owner records, `None` for the roots.
    pub parent: Option<usize>,
    /// Depth below the roots, starting at 0.
    pub level: usize,
    /// The resolved relation.
    pub node: Arc<EagerNode>,
}

impl FetchStep {
    /// Field name on the owner records.
    pub fn key(&self) -> &str {
        &self.node.key
    }

    /// Whether the relation holds a list.
    pub fn is_many(&self) -> bool {
        self.node.is_many()
    }

    /// Whether a further level is planned once this step returns data.
    pub fn is_recursive(&self) -> bool {
        self.node.is_recursive()
    }

    /// Key columns read from the owner records.
    pub fn owner_columns(&self) -> &[String] {
        &self.node.relation.owner_columns
    }
}

impl fmt::Display for FetchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}.{} -> {}",
            self.index, self.path, self.node.owner.name, self.node.relation.name, self.node.model.name
        )?;
        if let Some(jt) = &self.node.relation.join_table {
            write!(f, " through {}", jt.table)?;
        }
        f.write_str(")")?;
        if let Some(parent) = self.parent {
            write!(f, " after {}", parent)?;
        }
        if self.is_recursive() {
            f.write_str(" recursive")?;
        }
        Ok(())
    }
}

/// Ordered relation fetches for one eager load.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    /// Algorithm the plan is ordered for.
    pub algorithm: EagerAlgorithm,
    /// Planned steps.
    pub steps: Vec<FetchStep>,
}

impl FetchPlan {
    /// Plan the fetch of `nodes` below the roots.
    pub fn build(algorithm: EagerAlgorithm, nodes: &[Arc<EagerNode>]) -> Self {
        let mut plan = Self {
            algorithm,
            steps: Vec::new(),
        };
        match algorithm {
            EagerAlgorithm::WhereIn => {
                let mut queue: VecDeque<(Arc<EagerNode>, Option<usize>, usize)> =
                    nodes.iter().map(|node| (node.clone(), None, 0)).collect();
                while let Some((node, parent, level)) = queue.pop_front() {
                    let index = plan.push(node.clone(), parent, level);
                    queue.extend(node.children.iter().map(|child| (child.clone(), Some(index), level + 1)));
                }
            }
            EagerAlgorithm::Naive | EagerAlgorithm::Join => {
                for node in nodes {
                    plan.push_subtree(node.clone(), None, 0);
                }
            }
        }
        plan
    }

    fn push(&mut self, node: Arc<EagerNode>, parent: Option<usize>, level: usize) -> usize {
        let index = self.steps.len();
        self.steps.push(FetchStep {
            index,
            path: node.path.clone(),
            parent,
            level,
            node,
        });
        index
    }

    /// Append `node` and its descendants depth-first, returning the index of `node`.
    pub fn push_subtree(&mut self, node: Arc<EagerNode>, parent: Option<usize>, level: usize) -> usize {
        let index = self.push(node.clone(), parent, level);
        for child in &node.children {
            self.push_subtree(child.clone(), Some(index), level + 1);
        }
        index
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether nothing is fetched beyond the roots.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps fetched directly for the roots.
    pub fn root_steps(&self) -> impl Iterator<Item = &FetchStep> {
        self.steps.iter().filter(|step| step.parent.is_none())
    }

    /// Steps whose owners are produced by `parent`.
    pub fn children_of(&self, parent: Option<usize>) -> impl Iterator<Item = &FetchStep> {
        self.steps.iter().filter(move |step| step.parent == parent)
    }

    /// Key columns the roots must carry.
    pub fn root_key_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for step in self.root_steps() {
            for column in step.owner_columns() {
                if !columns.contains(&column.as_str()) {
                    columns.push(column.as_str());
                }
            }
        }
        columns
    }

    /// Describe each step on its own line.
    pub fn explain(&self) -> String {
        let mut out = format!("{} plan, {} steps", self.algorithm, self.steps.len());
        for step in &self.steps {
            out.push('\n');
            out.push_str(&"  ".repeat(step.level + 1));
            out.push_str(&step.to_string());
        }
        out
    }
}

impl fmt::Display for FetchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::modifiers::EagerModifiers;
    use crate::relations::resolve::Resolver;
    use crate::relations::spec::{Catalog, ModelSpec, RelationMetadata, RelationSpec};
    use graft_expr::parse_expression;
    use pretty_assertions::assert_eq;

    fn plan(algorithm: EagerAlgorithm, expression: &str) -> FetchPlan {
        let catalog = Catalog::new().with_model(
            ModelSpec::new("Node", "nodes")
                .columns(["id", "parentId"])
                .relation(RelationSpec::many_to_one("parent", "Node").join_on(["parentId"], ["id"]))
                .relation(RelationSpec::one_to_many("children", "Node").join_on(["id"], ["parentId"])),
        );
        let tree = parse_expression(expression).unwrap();
        let modifiers = EagerModifiers::new();
        let resolver = Resolver::new(&catalog, &modifiers, &tree).unwrap();
        let nodes = resolver.resolve_root(&catalog.model("Node").unwrap(), &tree).unwrap();
        FetchPlan::build(algorithm, &nodes)
    }

    fn paths(plan: &FetchPlan) -> Vec<String> {
        plan.steps.iter().map(|s| s.path.to_string()).collect()
    }

    #[test]
    fn test_breadth_first_for_where_in() {
        let plan = plan(EagerAlgorithm::WhereIn, "[parent.parent, children.children]");
        assert_eq!(
            paths(&plan),
            vec!["parent", "children", "parent.parent", "children.children"]
        );
        assert_eq!(plan.steps[2].parent, Some(0));
        assert_eq!(plan.steps[3].parent, Some(1));
        assert_eq!(plan.steps[3].level, 1);
        assert_eq!(plan.root_key_columns(), vec!["parentId", "id"]);
    }

    #[test]
    fn test_depth_first_for_naive() {
        let plan = plan(EagerAlgorithm::Naive, "[parent.parent, children.children]");
        assert_eq!(
            paths(&plan),
            vec!["parent", "parent.parent", "children", "children.children"]
        );
        assert_eq!(plan.children_of(Some(2)).count(), 1);
    }

    #[test]
    fn test_explain() {
        let plan = plan(EagerAlgorithm::WhereIn, "children.^");
        assert_eq!(
            plan.explain(),
            "where_in plan, 1 steps\n  0: children (Node.children -> Node) recursive"
        );
    }
}
