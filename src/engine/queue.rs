//! Bounded admission buffer between discovery and the worker pool.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use crate::model::EngagementTask;

/// FIFO of pending engagement tasks with a hard capacity.
///
/// Pushing never blocks and never evicts: a full queue simply refuses the
/// task. Popping is atomic, so no two workers can claim the same task.
///
/// The queue also remembers which items it has handed out. A popped item
/// stays known until its worker calls [`settle`](Self::settle), so discovery
/// cannot admit it a second time while it plays. Items settled as retired
/// stay known for the life of the queue.
pub struct SessionQueue {
    capacity: usize,
    slots: Mutex<Slots>,
    ready: Notify,
}

#[derive(Default)]
struct Slots {
    pending: VecDeque<EngagementTask>,
    in_flight: HashSet<String>,
    /// Ended without a history record; never admitted again.
    retired: HashSet<String>,
}

impl SessionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(Slots {
                pending: VecDeque::with_capacity(capacity),
                ..Default::default()
            }),
            ready: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending tasks. Claimed tasks do not count against capacity.
    pub fn len(&self) -> usize {
        self.slots.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Free slots left.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Tasks popped and not yet settled.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().in_flight.len()
    }

    /// Append `task` unless the queue is full. Returns whether it was queued.
    pub fn try_push(&self, task: EngagementTask) -> bool {
        {
            let mut slots = self.slots.lock();
            if slots.pending.len() >= self.capacity {
                return false;
            }
            slots.pending.push_back(task);
        }
        self.ready.notify_one();
        true
    }

    /// Take the oldest pending task and mark its item in flight.
    pub fn pop(&self) -> Option<EngagementTask> {
        let mut slots = self.slots.lock();
        let task = slots.pending.pop_front()?;
        slots.in_flight.insert(task.item.id.clone());
        Some(task)
    }

    /// Close out a popped item. `retire` keeps it known so it is never
    /// admitted again; otherwise history is expected to cover it.
    pub fn settle(&self, item_id: &str, retire: bool) {
        let mut slots = self.slots.lock();
        slots.in_flight.remove(item_id);
        if retire {
            slots.retired.insert(item_id.to_string());
        }
    }

    /// Whether `item_id` is waiting, being played, or was retired.
    pub fn contains(&self, item_id: &str) -> bool {
        let slots = self.slots.lock();
        slots.in_flight.contains(item_id)
            || slots.retired.contains(item_id)
            || slots.pending.iter().any(|t| t.item.id == item_id)
    }

    /// Resolves after the next push (or immediately if a push happened
    /// since the last wake-up).
    pub fn notified(&self) -> Notified<'_> {
        self.ready.notified()
    }

    /// Remove and return everything still pending.
    pub fn drain(&self) -> Vec<EngagementTask> {
        self.slots.lock().pending.drain(..).collect()
    }
}
