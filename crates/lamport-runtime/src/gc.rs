//! Checkpoint-time reachability collection
//!
//! TigerStyle: Iterative traversal, explicit visit bound.
//!
//! Runs after the scheduler reports quiescence at the checkpoint horizon.
//! Walks persisted port bindings breadth-first from the root actor. Every
//! flagged candidate that was not reached is deleted, along with anything
//! reachable only through it. Candidates that are still resident are
//! deferred to the next checkpoint.

use crate::actor::ActorRecord;
use crate::scheduler::Scheduler;
use lamport_core::{ActorId, Error, Result, GC_VISITED_COUNT_MAX};
use lamport_storage::StateStore;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info};

/// Outcome of one collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Actors reached from the root
    pub visited: usize,
    /// Actors whose records were deleted
    pub collected: Vec<ActorId>,
    /// Unreachable candidates kept because they are resident
    pub deferred: Vec<ActorId>,
}

async fn load_record(store: &dyn StateStore, id: &ActorId) -> Result<Option<ActorRecord>> {
    match store.get(id).await? {
        Some(bytes) => ActorRecord::decode(id, &bytes).map(Some),
        None => Ok(None),
    }
}

/// Actors reachable from `root` through persisted port bindings
pub(crate) async fn reachable_from(store: &dyn StateStore, root: ActorId) -> Result<BTreeSet<ActorId>> {
    let mut visited = BTreeSet::new();
    let mut frontier = VecDeque::from([root]);

    while let Some(id) = frontier.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        if visited.len() > GC_VISITED_COUNT_MAX {
            return Err(Error::internal(format!(
                "reachability walk exceeded {} actors",
                GC_VISITED_COUNT_MAX
            )));
        }
        if let Some(record) = load_record(store, &id).await? {
            frontier.extend(record.port_destinations().filter(|d| !visited.contains(d)));
        }
    }

    Ok(visited)
}

/// Delete unreachable candidates and everything reachable only through them
pub(crate) async fn collect(
    store: &dyn StateStore,
    scheduler: &Scheduler,
    root: ActorId,
    candidates: BTreeSet<ActorId>,
) -> Result<GcReport> {
    let mut report = GcReport::default();
    if candidates.is_empty() {
        return Ok(report);
    }

    let live = reachable_from(store, root).await?;
    report.visited = live.len();

    let mut seen = BTreeSet::new();
    let mut pending: VecDeque<ActorId> = candidates.into_iter().collect();
    while let Some(id) = pending.pop_front() {
        if live.contains(&id) || !seen.insert(id) {
            continue;
        }
        if seen.len() > GC_VISITED_COUNT_MAX {
            return Err(Error::internal(format!(
                "collection exceeded {} actors",
                GC_VISITED_COUNT_MAX
            )));
        }
        if scheduler.is_registered(&id) {
            report.deferred.push(id);
            continue;
        }

        let Some(record) = load_record(store, &id).await? else {
            continue;
        };
        pending.extend(record.port_destinations());
        store.delete(&id).await?;
        debug!(actor_id = %id.short(), "Collected unreachable actor");
        report.collected.push(id);
    }

    info!(
        visited = report.visited,
        collected = report.collected.len(),
        deferred = report.deferred.len(),
        "Garbage collection finished"
    );
    Ok(report)
}
