//! FIFO of accidents waiting for a driver at one station.
//!
//! The queue only knows about its own station. Uniqueness across stations is
//! enforced one level up, by the registry that owns every station's queue.

use std::collections::{HashSet, VecDeque};

use crate::error::CoreError;
use crate::types::DbId;

#[derive(Debug, Default, Clone)]
pub struct StationQueue {
    entries: VecDeque<DbId>,
    members: HashSet<DbId>,
}

impl StationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an accident to the tail.
    pub fn enqueue(&mut self, accident_id: DbId) -> Result<(), CoreError> {
        if !self.members.insert(accident_id) {
            return Err(CoreError::DuplicateEntry { accident_id });
        }
        self.entries.push_back(accident_id);
        Ok(())
    }

    /// Remove and return the earliest-queued accident.
    pub fn dequeue_next(&mut self) -> Option<DbId> {
        let accident_id = self.entries.pop_front()?;
        self.members.remove(&accident_id);
        Some(accident_id)
    }

    /// Put a dequeued accident back at the head, ahead of everything that
    /// was queued after it. Used when a match could not be committed.
    pub fn requeue_front(&mut self, accident_id: DbId) -> Result<(), CoreError> {
        if !self.members.insert(accident_id) {
            return Err(CoreError::DuplicateEntry { accident_id });
        }
        self.entries.push_front(accident_id);
        Ok(())
    }

    /// Remove a specific accident. Returns `false` if it was not queued.
    pub fn remove(&mut self, accident_id: DbId) -> bool {
        if !self.members.remove(&accident_id) {
            return false;
        }
        self.entries.retain(|&id| id != accident_id);
        true
    }

    pub fn peek(&self) -> Option<DbId> {
        self.entries.front().copied()
    }

    pub fn contains(&self, accident_id: DbId) -> bool {
        self.members.contains(&accident_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued ids, head first.
    pub fn snapshot(&self) -> Vec<DbId> {
        self.entries.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn dequeues_in_arrival_order() {
        let mut queue = StationQueue::new();
        queue.enqueue(3).unwrap();
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();

        assert_eq!(queue.dequeue_next(), Some(3));
        assert_eq!(queue.dequeue_next(), Some(1));
        assert_eq!(queue.dequeue_next(), Some(2));
        assert_eq!(queue.dequeue_next(), None);
    }

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let mut queue = StationQueue::new();
        queue.enqueue(8).unwrap();

        assert_matches!(
            queue.enqueue(8),
            Err(CoreError::DuplicateEntry { accident_id: 8 })
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn empty_queue_returns_none() {
        let mut queue = StationQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue_next(), None);
        assert_eq!(queue.peek(), None);
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let mut queue = StationQueue::new();
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();

        assert!(!queue.remove(5));
        assert!(queue.remove(1));
        assert!(!queue.remove(1));
        assert_eq!(queue.snapshot(), vec![2]);
    }

    #[test]
    fn requeue_front_restores_head_position() {
        let mut queue = StationQueue::new();
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();

        let head = queue.dequeue_next().unwrap();
        queue.requeue_front(head).unwrap();

        assert_eq!(queue.snapshot(), vec![1, 2]);
        assert!(queue.contains(1));
    }

    #[test]
    fn removed_id_can_be_enqueued_again() {
        let mut queue = StationQueue::new();
        queue.enqueue(4).unwrap();
        queue.remove(4);
        assert!(queue.enqueue(4).is_ok());
    }
}
