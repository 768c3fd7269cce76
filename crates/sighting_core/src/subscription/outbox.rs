//! Bounded, coalescing buffer of pending subscription events
//!
//! A subscription never blocks the store on a slow consumer. Instead, when
//! the buffer reaches capacity, pending events are folded per sighting into
//! their net effect:
//!
//! | pending sequence for one id | kept            |
//! |-----------------------------|-----------------|
//! | `Entered .. Entered`        | last `Entered`  |
//! | `Entered .. Left`           | nothing         |
//! | `Left .. Left`              | `Left`          |
//! | `Left .. Entered`           | `Left`, last `Entered` |
//!
//! Order is preserved per id; ids are ordered by their most recent pending
//! event. The buffer can only outgrow its capacity when more distinct ids have
//! pending changes than the capacity allows.
//!
//! A pass that leaves `len` events behind moves the next trigger to
//! `max(capacity, 2 * len)`, so a buffer of distinct ids is rescanned only
//! each time it doubles and pushes stay amortised O(1). Popping lowers the
//! trigger to twice the remaining length, but never below `capacity`.

use super::events::ProximityEvent;
use crate::types::SightingId;
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
pub(crate) struct Outbox {
    queue: VecDeque<ProximityEvent>,
    capacity: usize,
    /// Length at which the next push coalesces first
    fold_at: usize,
    passes: u64,
}

struct NetChange {
    starts_with_left: bool,
    last: ProximityEvent,
    last_position: usize,
}

impl Outbox {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::new(),
            capacity,
            fold_at: capacity,
            passes: 0,
        }
    }

    /// Appends an event, coalescing first when full. Returns how many pending
    /// events the coalescing pass folded away.
    pub(crate) fn push(&mut self, event: ProximityEvent) -> usize {
        let folded = if self.queue.len() >= self.fold_at {
            self.coalesce()
        } else {
            0
        };
        self.queue.push_back(event);
        folded
    }

    pub(crate) fn pop(&mut self) -> Option<ProximityEvent> {
        let event = self.queue.pop_front()?;
        self.fold_at = self
            .fold_at
            .min(self.queue.len().saturating_mul(2))
            .max(self.capacity);
        Some(event)
    }

    pub(crate) fn drain(&mut self) -> Vec<ProximityEvent> {
        self.fold_at = self.capacity;
        self.queue.drain(..).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.fold_at = self.capacity;
        self.queue.clear();
    }

    /// Coalescing passes run so far
    pub(crate) fn passes(&self) -> u64 {
        self.passes
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    fn coalesce(&mut self) -> usize {
        self.passes += 1;
        let before = self.queue.len();
        let mut net: HashMap<SightingId, NetChange> = HashMap::new();

        for (position, event) in self.queue.drain(..).enumerate() {
            let id = event.id();
            match net.get_mut(&id) {
                Some(change) => {
                    change.last = event;
                    change.last_position = position;
                }
                None => {
                    net.insert(
                        id,
                        NetChange {
                            starts_with_left: !event.is_entered(),
                            last: event,
                            last_position: position,
                        },
                    );
                }
            }
        }

        let mut changes: Vec<NetChange> = net.into_values().collect();
        changes.sort_by_key(|change| change.last_position);

        for change in changes {
            match (change.starts_with_left, change.last.is_entered()) {
                (false, true) | (true, false) => self.queue.push_back(change.last),
                (false, false) => {}
                (true, true) => {
                    self.queue.push_back(ProximityEvent::Left { id: change.last.id() });
                    self.queue.push_back(change.last);
                }
            }
        }

        self.fold_at = self.capacity.max(self.queue.len().saturating_mul(2));
        before - self.queue.len()
    }
}
