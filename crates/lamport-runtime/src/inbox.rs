//! Per-actor inbox with causal delivery
//!
//! TigerStyle: Ordered queue, explicit suspension points, no silent drops.
//!
//! Messages are kept in arbiter order. The head is only handed to the actor
//! once the scheduler shows that every other resident actor has moved past
//! the head's `from_ticks`, so nothing that sorts before it can still arrive.
//! While waiting, the inbox races the scheduler's wait against a signal raised
//! when an older message becomes the head.

use crate::message::Message;
use crate::scheduler::Scheduler;
use lamport_core::{ActorId, Error, Result, Tag, WAIT_TAGS_COUNT_MAX};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::trace;

/// Insert keeping arbiter order; equal keys keep arrival order
fn insert_ordered(queue: &mut VecDeque<Message>, message: Message) -> usize {
    let at = queue.partition_point(|m| m.arbiter_cmp(&message).is_le());
    queue.insert(at, message);
    at
}

/// Clock every other actor must reach before `message` may be delivered
///
/// An actor still sitting at `from_ticks` could send a message with a smaller
/// sender id, so actor messages wait one tick past their own. External
/// messages sort first among equal ticks and need no margin.
fn delivery_threshold(message: &Message) -> u64 {
    match message.from_id() {
        Some(_) => message.from_ticks().saturating_add(1),
        None => message.from_ticks(),
    }
}

struct TagWait {
    tags: BTreeSet<Tag>,
    queue: VecDeque<Message>,
}

impl TagWait {
    /// Claim a message if its tag is still awaited
    fn try_claim(&mut self, message: Message) -> std::result::Result<usize, Message> {
        match message.tag() {
            Some(tag) if self.tags.remove(&tag) => Ok(insert_ordered(&mut self.queue, message)),
            _ => Err(message),
        }
    }
}

#[derive(Default)]
struct InboxState {
    queue: VecDeque<Message>,
    tag_wait: Option<TagWait>,
    head_waiter: Option<oneshot::Sender<()>>,
}

impl InboxState {
    fn active_queue(&mut self) -> &mut VecDeque<Message> {
        match &mut self.tag_wait {
            Some(wait) => &mut wait.queue,
            None => &mut self.queue,
        }
    }
}

/// Causally ordered message queue owned by one actor
pub struct Inbox {
    actor_id: ActorId,
    scheduler: Scheduler,
    state: Mutex<InboxState>,
}

impl Inbox {
    /// Create an empty inbox
    pub fn new(actor_id: ActorId, scheduler: Scheduler) -> Self {
        Self {
            actor_id,
            scheduler,
            state: Mutex::new(InboxState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a message in arbiter order
    ///
    /// If it becomes the head of the queue the actor is waiting on, the actor
    /// is woken and marked running before this returns.
    pub fn queue(&self, message: Message) {
        let mut state = self.state();
        let (position, in_active) = match state.tag_wait.as_mut() {
            Some(wait) => match wait.try_claim(message) {
                Ok(at) => (at, true),
                Err(message) => (insert_ordered(&mut state.queue, message), false),
            },
            None => (insert_ordered(&mut state.queue, message), true),
        };

        if in_active && position == 0 {
            if let Some(waiter) = state.head_waiter.take() {
                trace!(actor_id = %self.actor_id.short(), "Older message woke inbox");
                self.scheduler.resume(&self.actor_id);
                let _ = waiter.send(());
            }
        }
    }

    /// Number of messages in the main queue
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    /// Whether the main queue is empty
    pub fn is_empty(&self) -> bool {
        self.state().queue.is_empty()
    }

    /// Whether a tag wait is in progress
    pub fn is_waiting_on_tags(&self) -> bool {
        self.state().tag_wait.is_some()
    }

    /// Drain the main queue in order
    pub fn drain(&self) -> Vec<Message> {
        self.state().queue.drain(..).collect()
    }

    /// Wait for the next causally safe message, giving up at `ticks + timeout`
    ///
    /// Returns `None` when the limit is reached without a deliverable
    /// message, or immediately when the queue is empty and `timeout` is 0.
    pub async fn get_next_message(&self, ticks: u64, timeout: u64) -> Option<Message> {
        let limit = ticks.saturating_add(timeout);

        loop {
            let (wait_rx, head_rx) = {
                let mut state = self.state();
                let head_safe_at = state.active_queue().front().map(delivery_threshold);
                if head_safe_at.is_none() && timeout == 0 {
                    return None;
                }

                let threshold = head_safe_at.map_or(limit, |t| t.min(limit));
                let least = self.scheduler.least_number_of_ticks(Some(&self.actor_id));
                if least >= threshold {
                    state.head_waiter = None;
                    self.scheduler.resume(&self.actor_id);
                    return match head_safe_at {
                        Some(safe_at) if least >= safe_at => state.active_queue().pop_front(),
                        _ => None,
                    };
                }

                let (tx, rx) = oneshot::channel();
                state.head_waiter = Some(tx);
                let wait_rx = self.scheduler.wait(threshold, Some(self.actor_id));
                trace!(actor_id = %self.actor_id.short(), threshold, "Inbox waiting");
                (wait_rx, rx)
            };

            tokio::select! {
                _ = wait_rx => {}
                _ = head_rx => {}
            }
        }
    }

    /// Next message for the run loop, or `None` once the queue is drained
    pub async fn next_message(&self, ticks: u64) -> Option<Message> {
        let drained = self.state().queue.is_empty();
        if drained {
            return None;
        }
        self.get_next_message(ticks, u64::MAX).await
    }

    /// Wait for the first message carrying any of `tags`
    ///
    /// One message is consumed per tag. Messages claimed for a tag but not
    /// delivered are merged back into the main queue.
    pub async fn wait_on_tag(&self, tags: &[Tag], ticks: u64, timeout: u64) -> Result<Option<Message>> {
        if tags.len() > WAIT_TAGS_COUNT_MAX {
            return Err(Error::TooManyTags {
                count: tags.len(),
                limit: WAIT_TAGS_COUNT_MAX,
            });
        }

        {
            let mut state = self.state();
            if state.tag_wait.is_some() {
                return Err(Error::AlreadyWaitingOnTags {
                    actor_id: self.actor_id.to_hex(),
                });
            }

            let mut wait = TagWait {
                tags: tags.iter().copied().collect(),
                queue: VecDeque::new(),
            };
            let pending = std::mem::take(&mut state.queue);
            for message in pending {
                if let Err(message) = wait.try_claim(message) {
                    state.queue.push_back(message);
                }
            }
            state.tag_wait = Some(wait);
        }

        // Restores the main queue even if this future is dropped mid-wait
        let _restore = TagWaitGuard { inbox: self };
        Ok(self.get_next_message(ticks, timeout).await)
    }
}

/// Ends a tag wait: claimed but undelivered messages go back in order
struct TagWaitGuard<'a> {
    inbox: &'a Inbox,
}

impl Drop for TagWaitGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.inbox.state();
            state.head_waiter = None;
            if let Some(wait) = state.tag_wait.take() {
                for leftover in wait.queue {
                    insert_ordered(&mut state.queue, leftover);
                }
            }
            debug_assert!(state.tag_wait.is_none());
        }
        self.inbox.scheduler.resume(&self.inbox.actor_id);
    }
}
