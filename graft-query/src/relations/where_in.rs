//! The where-in algorithm: one `IN` query per relation and level.
//!
//! Levels are fetched in order. Within a level every step is independent, so
//! their queries run concurrently, bounded by the `concurrency` option. The
//! first failing query fails the load.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use super::fetch::{LoadContext, LoadedSet, fetch_step};
use super::plan::FetchPlan;
use super::reconcile::assemble;
use crate::error::QueryResult;

/// Load every step of `plan` below `roots`, then attach the results.
pub(crate) async fn load(ctx: &LoadContext<'_>, plan: &mut FetchPlan, roots: &mut LoadedSet) -> QueryResult<()> {
    let mut sets: Vec<Option<LoadedSet>> = Vec::new();
    let mut level = 0;

    loop {
        let requests: Vec<_> = plan
            .steps
            .iter()
            .filter(|step| step.level == level)
            .map(|step| {
                let owners = match step.parent {
                    None => Some(&*roots),
                    Some(parent) => sets.get(parent).and_then(Option::as_ref),
                };
                let keys = owners
                    .map(|owners| owners.distinct_keys(step.owner_columns()))
                    .unwrap_or_default();
                (step.index, keys)
            })
            .collect();
        if requests.is_empty() {
            break;
        }
        debug!(level, steps = requests.len(), "fetching where-in level");

        let steps = &plan.steps;
        let fetched: Vec<_> = stream::iter(requests.into_iter().map(|(index, keys)| async move {
            fetch_step(ctx, &steps[index], keys).await.map(|set| (index, set))
        }))
        .buffered(ctx.options.concurrency)
        .try_collect()
        .await?;

        for (index, set) in fetched {
            if !set.records.is_empty() {
                if let Some(next) = ctx.resolver.repeat(&plan.steps[index].node)? {
                    plan.push_subtree(next, Some(index), level + 1);
                }
            }
            sets.resize_with(plan.len(), || None);
            sets[index] = Some(set);
        }
        level += 1;
    }

    assemble(plan, sets, roots, ctx.options.strip_injected_columns);
    Ok(())
}
