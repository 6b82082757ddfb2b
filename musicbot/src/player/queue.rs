//! Bounded request queue layered over the player's native priorities
//!
//! Ranks are contiguous `0..len`, rank 0 plays next. The native priority
//! a rank maps to is the transport's concern; this structure only tracks
//! membership and order.

use musicbot_common::{Error, Result};

/// Hard ceiling on user-queued tracks.
pub const MAX_QUEUE_SIZE: usize = 8;

/// Ordered set of player-native track ids, index = rank.
#[derive(Debug, Default)]
pub struct PlayQueue {
    ids: Vec<i64>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track at the tail. Returns the assigned rank. A full
    /// queue or an already-queued id leaves the queue unchanged.
    pub fn insert(&mut self, id: i64) -> Result<usize> {
        if self.ids.len() >= MAX_QUEUE_SIZE {
            return Err(Error::InvalidInput("queue is full".to_string()));
        }
        if self.ids.contains(&id) {
            return Err(Error::InvalidInput("track is already queued".to_string()));
        }
        self.ids.push(id);
        Ok(self.ids.len() - 1)
    }

    /// Drop `id` if present, closing the rank gap. Returns whether the
    /// queue changed.
    pub fn remove(&mut self, id: i64) -> bool {
        match self.ids.iter().position(|&x| x == id) {
            Some(i) => {
                self.ids.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.ids.iter().copied().enumerate()
    }

    /// Retain only ids still present in the live playlist.
    pub fn prune(&mut self, live: impl Fn(i64) -> bool) -> bool {
        let before = self.ids.len();
        self.ids.retain(|&id| live(id));
        self.ids.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_contiguous_ranks() {
        let mut q = PlayQueue::new();
        for i in 0..MAX_QUEUE_SIZE as i64 {
            assert_eq!(q.insert(100 + i).unwrap(), i as usize);
        }
        let ranks: Vec<usize> = q.iter().map(|(rank, _)| rank).collect();
        assert_eq!(ranks, (0..MAX_QUEUE_SIZE).collect::<Vec<_>>());
    }

    #[test]
    fn test_ninth_insert_rejected_without_mutation() {
        let mut q = PlayQueue::new();
        for i in 0..MAX_QUEUE_SIZE as i64 {
            q.insert(i).unwrap();
        }
        assert!(q.insert(99).is_err());
        assert_eq!(q.len(), MAX_QUEUE_SIZE);
        assert!(!q.contains(99));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut q = PlayQueue::new();
        q.insert(7).unwrap();
        assert!(q.insert(7).is_err());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_remove_closes_rank_gap() {
        let mut q = PlayQueue::new();
        q.insert(1).unwrap();
        q.insert(2).unwrap();
        q.insert(3).unwrap();
        assert!(q.remove(2));
        let ids: Vec<i64> = q.iter().map(|(_, id)| id).collect();
        assert_eq!(ids, vec![1, 3]);
        let ranks: Vec<usize> = q.iter().map(|(rank, _)| rank).collect();
        assert_eq!(ranks, vec![0, 1]);
    }

    #[test]
    fn test_prune_drops_dead_ids() {
        let mut q = PlayQueue::new();
        q.insert(1).unwrap();
        q.insert(2).unwrap();
        q.insert(3).unwrap();
        assert!(q.prune(|id| id != 2));
        assert_eq!(q.len(), 2);
        assert!(!q.prune(|_| true));
    }
}
