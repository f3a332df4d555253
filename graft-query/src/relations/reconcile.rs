//! Grafting fetched relations onto their owners.
//!
//! The naive and where-in algorithms fetch each relation separately and attach
//! the results by owner key, deepest level first. The join algorithm receives
//! one flat row per combination of related records and splits those rows back
//! into a tree, deduplicating by primary key.

use std::cmp::Reverse;

use indexmap::IndexMap;
use tracing::trace;

use super::fetch::LoadedSet;
use super::keys::RowKey;
use super::plan::{FetchPlan, FetchStep};
use super::record::{Field, Record};
use crate::filter::FilterValue;
use crate::traits::Row;

static NULL: FilterValue = FilterValue::Null;

/// Attach the records of `step` to the owners in `parents`.
///
/// Every owner receives the field, empty when nothing matched or the owner's
/// key is null. Records shared by several owners are copied to each.
pub(crate) fn attach(parents: &mut LoadedSet, step: &FetchStep, children: LoadedSet) {
    let mut groups: IndexMap<RowKey, Vec<Record>> = IndexMap::new();
    for (record, owner) in children.records.into_iter().zip(children.owners) {
        if let Some(owner) = owner {
            groups.entry(owner).or_default().push(record);
        }
    }
    trace!(path = %step.path, owners = groups.len(), "attaching relation");

    let key = step.key();
    let columns = step.owner_columns();
    for record in &mut parents.records {
        let related = parents
            .keys
            .key(record, columns)
            .and_then(|owner| groups.get(&owner))
            .cloned()
            .unwrap_or_default();
        let field = if step.is_many() {
            Field::Many(related)
        } else {
            Field::One(related.into_iter().next().map(Box::new))
        };
        record.set(key, field);
    }
}

/// Attach every fetched step to its owners, deepest first, and strip
/// loader-added fields. `sets` is indexed like the plan's steps.
pub(crate) fn assemble(plan: &FetchPlan, mut sets: Vec<Option<LoadedSet>>, roots: &mut LoadedSet, strip_injected: bool) {
    let mut order: Vec<usize> = (0..plan.len()).collect();
    order.sort_by_key(|&index| Reverse(plan.steps[index].level));

    for index in order {
        let Some(mut set) = sets.get_mut(index).and_then(Option::take) else {
            continue;
        };
        set.strip(strip_injected);

        let step = &plan.steps[index];
        let parent = match step.parent {
            None => &mut *roots,
            Some(parent) => match sets.get_mut(parent).and_then(Option::as_mut) {
                Some(parent) => parent,
                None => continue,
            },
        };
        attach(parent, step, set);
    }
    roots.strip(strip_injected);
}

/// How to read one relation (or the roots) out of a joined row.
#[derive(Debug, Clone, Default)]
pub(crate) struct JoinNode {
    /// Field name on the owner; empty for the roots.
    pub key: String,
    /// Whether the relation holds a list.
    pub is_many: bool,
    /// Output field and the row column it is read from.
    pub columns: Vec<(String, String)>,
    /// Row columns holding the primary key.
    pub id_columns: Vec<String>,
    /// Row columns read from a join table; they never make a record present.
    pub extra_columns: Vec<String>,
    /// Fields removed after assembly.
    pub strip: Vec<String>,
    /// Relations below this one.
    pub children: Vec<JoinNode>,
}

impl JoinNode {
    /// The identity of the record this node reads from `row`, `None` when the
    /// row holds no such record.
    fn identify(&self, row: &Row) -> Option<RowKey> {
        let value = |column: &String| row.get(column).unwrap_or(&NULL);
        if !self.id_columns.is_empty() {
            return RowKey::new(self.id_columns.iter().map(value));
        }
        let present: Vec<&FilterValue> = self
            .columns
            .iter()
            .filter(|(_, column)| !self.extra_columns.contains(column))
            .map(|(_, column)| value(column))
            .filter(|v| !v.is_null())
            .collect();
        if present.is_empty() {
            return None;
        }
        RowKey::new(present)
    }

    fn read(&self, row: &Row) -> Record {
        let mut record = Record::new();
        for (field, column) in &self.columns {
            record.set_value(field, row.get(column).cloned().unwrap_or(FilterValue::Null));
        }
        record
    }
}

#[derive(Debug)]
struct Assembled {
    record: Record,
    relations: Vec<IndexMap<RowKey, Assembled>>,
}

impl Assembled {
    fn new(node: &JoinNode, row: &Row) -> Self {
        Self {
            record: node.read(row),
            relations: node.children.iter().map(|_| IndexMap::new()).collect(),
        }
    }

    fn absorb(&mut self, node: &JoinNode, row: &Row) {
        for (child, slot) in node.children.iter().zip(&mut self.relations) {
            if let Some(id) = child.identify(row) {
                slot.entry(id)
                    .or_insert_with(|| Assembled::new(child, row))
                    .absorb(child, row);
            }
        }
    }

    fn finish(self, node: &JoinNode, strip: bool) -> Record {
        let mut record = self.record;
        for (child, slot) in node.children.iter().zip(self.relations) {
            let mut related = slot.into_values().map(|a| a.finish(child, strip));
            let field = if child.is_many {
                Field::Many(related.collect())
            } else {
                Field::One(related.next().map(Box::new))
            };
            record.set(child.key.as_str(), field);
        }
        if strip {
            for field in &node.strip {
                record.remove(field);
            }
        }
        record
    }
}

/// Split joined rows into root records with their relations, in order of first
/// appearance.
pub(crate) fn split_rows(root: &JoinNode, rows: &[Row], strip_injected: bool) -> Vec<Record> {
    let mut roots: IndexMap<RowKey, Assembled> = IndexMap::new();
    for row in rows {
        let Some(id) = root.identify(row) else {
            continue;
        };
        roots
            .entry(id)
            .or_insert_with(|| Assembled::new(root, row))
            .absorb(root, row);
    }
    trace!(rows = rows.len(), roots = roots.len(), "split joined rows");
    roots
        .into_values()
        .map(|assembled| assembled.finish(root, strip_injected))
        .collect()
}
