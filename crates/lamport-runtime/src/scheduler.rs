//! Global tick-aware scheduler
//!
//! TigerStyle: Synchronous state transitions, bounded resolution loop.
//!
//! The scheduler tracks every resident actor by its tick count and decides
//! when a suspended actor may proceed. A wait with threshold `t` resolves once
//! no other registered actor is below `t`, so no message with a smaller
//! `from_ticks` can still be produced. When nothing is running and no wait is
//! satisfiable, the slowest actors are advanced to the smallest outstanding
//! threshold so the system cannot stall.
//!
//! All state lives behind one `std::sync::Mutex` that is never held across an
//! await point.

use crate::actor::Actor;
use lamport_core::ActorId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};
use tracing::trace;

/// Where an actor currently lives, from the router's point of view
pub enum Instance {
    /// Registered and able to accept messages
    Resident(Arc<Actor>),
    /// Being loaded from storage; resolves when the load lock is released
    Loading(watch::Receiver<bool>),
    /// Neither resident nor loading
    Absent,
}

struct Wait {
    threshold: u64,
    actor_id: Option<ActorId>,
    resolve: oneshot::Sender<()>,
}

#[derive(Default)]
struct SchedulerState {
    instances: BTreeMap<ActorId, (Arc<Actor>, u64)>,
    ticks_index: BTreeSet<(u64, ActorId)>,
    running: BTreeSet<ActorId>,
    /// Sorted by threshold, FIFO among equal thresholds
    waits: Vec<Wait>,
    loading: BTreeMap<ActorId, watch::Receiver<bool>>,
}

impl SchedulerState {
    fn reindex(&mut self, actor: &Arc<Actor>, ticks: u64) {
        let id = actor.id();
        if let Some((_, old_ticks)) = self.instances.get(&id) {
            self.ticks_index.remove(&(*old_ticks, id));
        }
        self.instances.insert(id, (Arc::clone(actor), ticks));
        self.ticks_index.insert((ticks, id));
        debug_assert_eq!(self.instances.len(), self.ticks_index.len());
    }

    fn remove_waits_for(&mut self, id: &ActorId) {
        self.waits.retain(|w| w.actor_id.as_ref() != Some(id));
    }

    fn least_number_of_ticks(&self, exclude: Option<&ActorId>) -> u64 {
        for (ticks, id) in &self.ticks_index {
            if Some(id) != exclude {
                return *ticks;
            }
        }
        // Only the excluded actor (or nobody) is registered
        exclude
            .and_then(|id| self.instances.get(id))
            .map(|(_, ticks)| *ticks)
            .unwrap_or(0)
    }

    fn check_waits(&mut self) {
        if !self.loading.is_empty() {
            return;
        }

        if self.instances.is_empty() {
            for wait in self.waits.drain(..) {
                let _ = wait.resolve.send(());
            }
            return;
        }

        // Each pass either resolves the first wait or advances every actor
        // to its threshold, after which the first wait is satisfiable.
        loop {
            self.waits.retain(|w| !w.resolve.is_closed());

            while let Some(first) = self.waits.first() {
                let least = self.least_number_of_ticks(first.actor_id.as_ref());
                if first.threshold > least {
                    break;
                }
                let wait = self.waits.remove(0);
                if let Some(id) = wait.actor_id {
                    if self.instances.contains_key(&id) {
                        self.running.insert(id);
                    }
                }
                trace!(threshold = wait.threshold, "Wait resolved");
                let _ = wait.resolve.send(());
            }

            if !self.running.is_empty() {
                return;
            }
            let Some(oldest) = self.waits.first().map(|w| w.threshold) else {
                return;
            };

            let behind: Vec<(u64, ActorId)> = self
                .ticks_index
                .range(..(oldest, ActorId::from_bytes([0; 32])))
                .copied()
                .collect();
            debug_assert!(behind.iter().all(|(ticks, _)| *ticks < oldest));
            for (_, id) in behind {
                if let Some((actor, _)) = self.instances.get(&id) {
                    let actor = Arc::clone(actor);
                    actor.advance_ticks_to(oldest);
                    self.reindex(&actor, oldest);
                }
            }
            trace!(ticks = oldest, "Advanced stalled actors");
        }
    }
}

/// Clock-aware run coordinator shared by every actor of a hypervisor
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Mutex<SchedulerState>>,
}

impl Scheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        // A panic while holding the lock already aborted an invariant check
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register or reindex an actor at its current ticks and mark it running
    pub fn update(&self, actor: &Arc<Actor>) {
        let mut state = self.state();
        let id = actor.id();
        state.remove_waits_for(&id);
        state.reindex(actor, actor.ticks());
        state.running.insert(id);
        state.check_waits();
    }

    /// Remove an actor that has unloaded
    pub fn done(&self, id: &ActorId) {
        let mut state = self.state();
        state.running.remove(id);
        state.remove_waits_for(id);
        if let Some((_, ticks)) = state.instances.remove(id) {
            state.ticks_index.remove(&(ticks, *id));
        }
        state.check_waits();
    }

    /// Suspend until no other actor can produce a message below `threshold`
    ///
    /// `actor_id` is `None` for waits that do not belong to an actor, such as
    /// a checkpoint. A new wait for an actor replaces its previous one.
    pub fn wait(&self, threshold: u64, actor_id: Option<ActorId>) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state();
        if let Some(id) = &actor_id {
            state.running.remove(id);
            state.remove_waits_for(id);
        }
        let at = state.waits.partition_point(|w| w.threshold <= threshold);
        state.waits.insert(
            at,
            Wait {
                threshold,
                actor_id,
                resolve: tx,
            },
        );
        state.check_waits();
        rx
    }

    /// Withdraw an actor's wait and mark it running again
    pub fn resume(&self, id: &ActorId) {
        let mut state = self.state();
        state.remove_waits_for(id);
        if state.instances.contains_key(id) {
            state.running.insert(*id);
        }
    }

    /// Smallest tick count among registered actors other than `exclude`
    pub fn least_number_of_ticks(&self, exclude: Option<&ActorId>) -> u64 {
        self.state().least_number_of_ticks(exclude)
    }

    /// Look up an actor for routing
    pub fn get_instance(&self, id: &ActorId) -> Instance {
        let state = self.state();
        if let Some((actor, _)) = state.instances.get(id) {
            return Instance::Resident(Arc::clone(actor));
        }
        match state.loading.get(id) {
            Some(rx) => Instance::Loading(rx.clone()),
            None => Instance::Absent,
        }
    }

    /// Mark an absent actor as loading
    ///
    /// Returns `None` if the actor is resident or another load holds the
    /// lock. Wait resolution pauses until the guard drops.
    pub fn lock(&self, id: ActorId) -> Option<LoadLock> {
        let mut state = self.state();
        if state.instances.contains_key(&id) || state.loading.contains_key(&id) {
            return None;
        }
        let (tx, rx) = watch::channel(false);
        state.loading.insert(id, rx);
        Some(LoadLock {
            scheduler: self.clone(),
            id,
            loaded: tx,
        })
    }

    /// Number of registered actors
    pub fn instance_count(&self) -> usize {
        self.state().instances.len()
    }

    /// Number of running actors
    pub fn running_count(&self) -> usize {
        self.state().running.len()
    }

    /// Number of outstanding waits
    pub fn wait_count(&self) -> usize {
        self.state().waits.len()
    }

    /// Whether the actor is registered
    pub fn is_registered(&self, id: &ActorId) -> bool {
        self.state().instances.contains_key(id)
    }
}

/// Guard held while an actor is loaded from storage
pub struct LoadLock {
    scheduler: Scheduler,
    id: ActorId,
    loaded: watch::Sender<bool>,
}

impl Drop for LoadLock {
    fn drop(&mut self) {
        {
            let mut state = self.scheduler.state();
            state.loading.remove(&self.id);
            state.check_waits();
        }
        self.loaded.send_replace(true);
    }
}
