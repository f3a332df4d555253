//! The naive algorithm: one query per owner key and relation.
//!
//! Steps are visited depth-first. Sibling steps sharing an owner set are
//! fetched together, each owner key in its own query, with at most
//! `concurrency` queries in flight.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use super::fetch::{LoadContext, LoadedSet, fetch_step};
use super::plan::FetchPlan;
use super::reconcile::assemble;
use crate::error::QueryResult;

/// Load every step of `plan` below `roots`, then attach the results.
pub(crate) async fn load(ctx: &LoadContext<'_>, plan: &mut FetchPlan, roots: &mut LoadedSet) -> QueryResult<()> {
    let mut sets: Vec<Option<LoadedSet>> = Vec::new();
    let mut next = 0;

    while next < plan.len() {
        sets.resize_with(plan.len(), || None);
        if sets[next].is_some() {
            next += 1;
            continue;
        }

        let parent = plan.steps[next].parent;
        let group: Vec<usize> = plan
            .children_of(parent)
            .map(|step| step.index)
            .filter(|&index| sets[index].is_none())
            .collect();
        let owners = match parent {
            None => Some(&*roots),
            Some(parent) => sets[parent].as_ref(),
        };

        let mut requests = Vec::new();
        if let Some(owners) = owners {
            for &index in &group {
                for key in owners.distinct_keys(plan.steps[index].owner_columns()) {
                    requests.push((index, vec![key]));
                }
            }
        }
        debug!(steps = group.len(), queries = requests.len(), "fetching naive group");

        let steps = &plan.steps;
        let fetched: Vec<_> = stream::iter(requests.into_iter().map(|(index, keys)| async move {
            fetch_step(ctx, &steps[index], keys).await.map(|set| (index, set))
        }))
        .buffered(ctx.options.concurrency)
        .try_collect()
        .await?;

        for &index in &group {
            sets[index] = Some(LoadedSet::default());
        }
        for (index, set) in fetched {
            if let Some(loaded) = sets[index].as_mut() {
                loaded.extend(set);
            }
        }

        for &index in &group {
            let has_records = sets[index].as_ref().is_some_and(|set| !set.records.is_empty());
            if has_records {
                if let Some(repeat) = ctx.resolver.repeat(&plan.steps[index].node)? {
                    let level = plan.steps[index].level + 1;
                    plan.push_subtree(repeat, Some(index), level);
                }
            }
        }
    }

    sets.resize_with(plan.len(), || None);
    assemble(plan, sets, roots, ctx.options.strip_injected_columns);
    Ok(())
}
