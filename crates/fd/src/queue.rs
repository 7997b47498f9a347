//! The distributor's message queue.
//!
//! Entries live in an arena addressed by generation-checked [`QueueId`]s, so
//! a handle kept by a worker can never alias an entry that replaced the one
//! it was issued for. A separate order vector sorts live entries by
//! `msg_number`, ties broken by insertion order.
//!
//! `msg_number` is the creation time shifted by the priority and pulled
//! forward by the number of failed attempts:
//!
//! ```text
//! msg_number = creation_time + (priority - '0') * PRIORITY_STEP - min(retries, MAX_AGEING) * AGEING_STEP
//! ```
//!
//! Hosts with `NO_AGEING_JOBS` get no ageing term.

use std::cmp::Ordering;

use amg::{JobMessage, MessageName};
use rustc_hash::FxHashMap;

/// Seconds one priority level is worth.
pub const PRIORITY_STEP: f64 = 300.0;

/// Seconds every failed attempt moves a message forward.
pub const AGEING_STEP: f64 = 60.0;

/// Attempts after which ageing stops accumulating.
pub const MAX_AGEING: u32 = 20;

/// Queue element flags.
pub mod queue_flag {
    /// Sent again by operator request.
    pub const RESEND: u8 = 1 << 0;
    /// Picked up by a worker as a burst continuation.
    pub const QUEUED_FOR_BURST: u8 = 1 << 1;
    /// Came from a retrieve directory.
    pub const FETCH: u8 = 1 << 2;
}

/// Ordering key of a message.
#[must_use]
pub fn msg_number(message: &JobMessage, retries: u32, ageing: bool) -> f64 {
    let priority = f64::from(message.priority.saturating_sub(b'0'));
    let penalty = if ageing {
        f64::from(retries.min(MAX_AGEING)) * AGEING_STEP
    } else {
        0.0
    };
    message.name.creation_time as f64 + priority * PRIORITY_STEP - penalty
}

/// Handle to a queue entry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct QueueId {
    index: u32,
    generation: u32,
}

/// Where the partially sent file of a failed attempt stopped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resume {
    /// Pool name of the file.
    pub file_name: String,
    /// Bytes that reached the remote.
    pub offset: u64,
}

/// One queued message.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    /// The message as the scanner announced it, counts kept current.
    pub message: JobMessage,
    /// Destination host alias.
    pub host_alias: String,
    /// Ordering key.
    pub msg_number: f64,
    /// Failed attempts so far.
    pub retries: u32,
    /// Consecutive permanent failures.
    pub permanent_failures: u32,
    /// [`queue_flag`] bits.
    pub special_flag: u8,
    /// Worker running the message, 0 when waiting.
    pub worker: u32,
    /// Unix time before which the message is not retried.
    pub retry_at: i64,
    /// Resume point from the last failed attempt.
    pub resume: Option<Resume>,
}

impl QueueEntry {
    /// Fresh entry for `message`.
    #[must_use]
    pub fn new(message: JobMessage, host_alias: &str, ageing: bool) -> Self {
        Self {
            msg_number: msg_number(&message, 0, ageing),
            message,
            host_alias: host_alias.to_string(),
            retries: 0,
            permanent_failures: 0,
            special_flag: 0,
            worker: 0,
            retry_at: 0,
            resume: None,
        }
    }

    /// Batch name.
    #[must_use]
    pub const fn name(&self) -> &MessageName {
        &self.message.name
    }

    /// Whether a worker holds the entry.
    #[must_use]
    pub const fn in_progress(&self) -> bool {
        self.worker != 0
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<QueueEntry>,
}

/// Ordered message queue.
#[derive(Debug, Default)]
pub struct Queue {
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: Vec<(f64, u64, QueueId)>,
    names: FxHashMap<MessageName, QueueId>,
    sequence: u64,
}

fn by_key(a: &(f64, u64, QueueId), b: &(f64, u64, QueueId)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

impl Queue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued messages, running ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts `entry` at its `msg_number` position.
    pub fn push(&mut self, entry: QueueEntry) -> QueueId {
        let key = entry.msg_number;
        let name = entry.message.name;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                QueueId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                QueueId { index, generation: 0 }
            }
        };
        self.insert_order(key, id);
        self.names.insert(name, id);
        id
    }

    fn insert_order(&mut self, key: f64, id: QueueId) {
        self.sequence += 1;
        let item = (key, self.sequence, id);
        let at = self
            .order
            .partition_point(|probe| by_key(probe, &item) == Ordering::Less);
        self.order.insert(at, item);
    }

    /// Entry behind `id`, unless it was removed.
    #[must_use]
    pub fn get(&self, id: QueueId) -> Option<&QueueEntry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    /// Mutable entry behind `id`. Changing `msg_number` here does not move
    /// the entry; use [`reorder`](Self::reorder).
    pub fn get_mut(&mut self, id: QueueId) -> Option<&mut QueueEntry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Removes the entry behind `id`.
    pub fn remove(&mut self, id: QueueId) -> Option<QueueEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.order.retain(|(_, _, queued)| *queued != id);
        self.names.remove(&entry.message.name);
        Some(entry)
    }

    /// Moves the entry to its current `msg_number` position, behind every
    /// entry already holding the same key.
    pub fn reorder(&mut self, id: QueueId) {
        let Some(key) = self.get(id).map(|entry| entry.msg_number) else {
            return;
        };
        self.order.retain(|(_, _, queued)| *queued != id);
        self.insert_order(key, id);
    }

    /// Ids in queue order.
    #[must_use]
    pub fn ids(&self) -> Vec<QueueId> {
        self.order.iter().map(|(_, _, id)| *id).collect()
    }

    /// Entries in queue order.
    pub fn iter(&self) -> impl Iterator<Item = (QueueId, &QueueEntry)> {
        self.order
            .iter()
            .filter_map(|(_, _, id)| self.get(*id).map(|entry| (*id, entry)))
    }

    /// First waiting entry `admit` accepts. Entries it rejects keep their
    /// place.
    pub fn next_admissible(&self, mut admit: impl FnMut(&QueueEntry) -> bool) -> Option<QueueId> {
        self.iter()
            .find(|(_, entry)| !entry.in_progress() && admit(entry))
            .map(|(id, _)| id)
    }

    /// Entry holding batch `name`.
    #[must_use]
    pub fn find(&self, name: &MessageName) -> Option<QueueId> {
        self.names.get(name).copied()
    }

    /// Waiting entries for `host_alias`.
    #[must_use]
    pub fn count_for_host(&self, host_alias: &str) -> usize {
        self.iter()
            .filter(|(_, entry)| entry.host_alias == host_alias)
            .count()
    }
}

/// High and low water marks on the queue length.
///
/// Crossing the high mark asks the scanner to pause; the pause is lifted
/// once the queue drains below the low mark.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Backpressure {
    high: usize,
    low: usize,
    engaged: bool,
}

impl Backpressure {
    /// Marks for a soft limit of `max_queue_length`; the low mark sits at
    /// three quarters of it. A limit of 0 disables backpressure.
    #[must_use]
    pub const fn new(max_queue_length: usize) -> Self {
        Self {
            high: max_queue_length,
            low: max_queue_length - max_queue_length / 4,
            engaged: false,
        }
    }

    /// Whether the pause is currently requested.
    #[must_use]
    pub const fn engaged(&self) -> bool {
        self.engaged
    }

    /// Feeds the current length; returns the new state when it changed.
    pub fn observe(&mut self, len: usize) -> Option<bool> {
        if self.high == 0 {
            return None;
        }
        if !self.engaged && len >= self.high {
            self.engaged = true;
            return Some(true);
        }
        if self.engaged && len < self.low {
            self.engaged = false;
            return Some(false);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn message(creation_time: i64, priority: u8, unique: u32) -> JobMessage {
        JobMessage {
            name: MessageName {
                job_id: 7,
                counter: 0,
                creation_time,
                unique_number: unique,
                split_job_counter: 0,
            },
            dev: 0,
            dir_id: 1,
            file_size: 10,
            files: 1,
            priority,
            flag: 0,
        }
    }

    fn push(queue: &mut Queue, creation_time: i64, priority: u8, unique: u32) -> QueueId {
        queue.push(QueueEntry::new(message(creation_time, priority, unique), "h", true))
    }

    #[test]
    fn priority_beats_a_few_minutes_of_age() {
        let mut queue = Queue::new();
        let low = push(&mut queue, 1000, b'9', 1);
        let high = push(&mut queue, 1100, b'0', 2);
        assert_eq!(queue.ids(), vec![high, low]);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut queue = Queue::new();
        let first = push(&mut queue, 1000, b'5', 1);
        let second = push(&mut queue, 1000, b'5', 2);
        assert_eq!(queue.ids(), vec![first, second]);
    }

    #[test]
    fn retries_age_a_message_forward() {
        let mut queue = Queue::new();
        let fresh = push(&mut queue, 1000, b'5', 1);
        let failing = push(&mut queue, 1100, b'5', 2);
        let entry = queue.get_mut(failing).unwrap();
        entry.retries = 2;
        entry.msg_number = msg_number(&entry.message, entry.retries, true);
        queue.reorder(failing);
        assert_eq!(queue.ids(), vec![failing, fresh]);
    }

    #[test]
    fn no_ageing_ignores_retries() {
        let message = message(1000, b'5', 1);
        assert_eq!(msg_number(&message, 5, false), msg_number(&message, 0, false));
        assert!(msg_number(&message, 5, true) < msg_number(&message, 0, true));
    }

    #[test]
    fn stale_ids_do_not_reach_new_entries() {
        let mut queue = Queue::new();
        let old = push(&mut queue, 1000, b'5', 1);
        assert!(queue.remove(old).is_some());
        let new = push(&mut queue, 1000, b'5', 2);
        assert!(queue.get(old).is_none());
        assert!(queue.remove(old).is_none());
        assert_eq!(queue.get(new).unwrap().name().unique_number, 2);
    }

    #[test]
    fn skipped_heads_stay_in_front() {
        let mut queue = Queue::new();
        let head = push(&mut queue, 1000, b'5', 1);
        let next = push(&mut queue, 1001, b'5', 2);
        let picked = queue.next_admissible(|entry| entry.name().unique_number != 1);
        assert_eq!(picked, Some(next));
        assert_eq!(queue.ids()[0], head);
    }

    #[test]
    fn running_entries_are_not_admitted_twice() {
        let mut queue = Queue::new();
        let id = push(&mut queue, 1000, b'5', 1);
        queue.get_mut(id).unwrap().worker = 3;
        assert_eq!(queue.next_admissible(|_| true), None);
        assert_eq!(queue.find(&message(1000, b'5', 1).name), Some(id));
    }

    #[test]
    fn backpressure_has_hysteresis() {
        let mut marks = Backpressure::new(8);
        assert_eq!(marks.observe(7), None);
        assert_eq!(marks.observe(8), Some(true));
        assert_eq!(marks.observe(7), None);
        assert_eq!(marks.observe(6), None);
        assert_eq!(marks.observe(5), Some(false));
        assert!(!marks.engaged());
        assert_eq!(Backpressure::new(0).observe(1_000_000), None);
    }

    proptest! {
        #[test]
        fn order_is_sorted_by_msg_number(
            items in prop::collection::vec((0_i64..10_000, 0_u8..10, 0_u32..5), 1..64)
        ) {
            let mut queue = Queue::new();
            for (position, (time, priority, retries)) in items.iter().enumerate() {
                let mut entry = QueueEntry::new(message(*time, b'0' + priority, position as u32), "h", true);
                entry.retries = *retries;
                entry.msg_number = msg_number(&entry.message, *retries, true);
                queue.push(entry);
            }
            let keys: Vec<f64> = queue.iter().map(|(_, entry)| entry.msg_number).collect();
            prop_assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
            prop_assert_eq!(queue.len(), items.len());
        }
    }
}
