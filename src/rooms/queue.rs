//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::Instant;

use crate::ws::protocol::PlayerBrief;

/// Player waiting in a matchmaking queue
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub user_id: i64,
    pub display_name: String,
    pub queued_at: Instant,
}

impl QueuedPlayer {
    pub fn new(user_id: i64, display_name: String) -> Self {
        Self {
            user_id,
            display_name,
            queued_at: Instant::now(),
        }
    }

    pub fn brief(&self) -> PlayerBrief {
        PlayerBrief {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
        }
    }
}

/// A FIFO matchmaking queue. Draining is attempted on every enqueue rather
/// than on a timer.
pub struct MatchmakingQueue {
    queue: VecDeque<QueuedPlayer>,
    /// Minimum entrants before a drain succeeds
    min_players: usize,
    /// Maximum entrants taken per drain
    max_players: usize,
}

impl MatchmakingQueue {
    pub fn new(min_players: usize, max_players: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            min_players,
            max_players,
        }
    }

    /// The 1v1 queue pairs exactly two entrants
    pub fn single() -> Self {
        Self::new(2, 2)
    }

    /// The tournament queue holds entrants until at least 3 are waiting,
    /// then drains up to 8 into one bracket
    pub fn tournament() -> Self {
        Self::new(3, 8)
    }

    /// Add a player (re-queueing moves them to the back).
    /// Returns the 1-based queue position.
    pub fn enqueue(&mut self, player: QueuedPlayer) -> usize {
        self.queue.retain(|p| p.user_id != player.user_id);
        self.queue.push_back(player);
        self.queue.len()
    }

    /// Remove a player from the queue
    pub fn dequeue(&mut self, user_id: i64) -> Option<QueuedPlayer> {
        let pos = self.queue.iter().position(|p| p.user_id == user_id)?;
        self.queue.remove(pos)
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.queue.iter().any(|p| p.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take one batch of entrants if enough are waiting
    pub fn try_drain(&mut self) -> Option<Vec<QueuedPlayer>> {
        if self.queue.len() < self.min_players {
            return None;
        }
        let count = self.queue.len().min(self.max_players);
        Some(self.queue.drain(..count).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: i64) -> QueuedPlayer {
        QueuedPlayer::new(id, format!("Player {}", id))
    }

    #[test]
    fn single_queue_drains_exact_pairs() {
        let mut queue = MatchmakingQueue::single();
        assert_eq!(queue.enqueue(player(1)), 1);
        assert!(queue.try_drain().is_none());

        queue.enqueue(player(2));
        queue.enqueue(player(3));
        let batch = queue.try_drain().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].user_id, 1);
        assert_eq!(batch[1].user_id, 2);

        // The third entrant keeps waiting
        assert_eq!(queue.len(), 1);
        assert!(queue.try_drain().is_none());
    }

    #[test]
    fn tournament_queue_waits_for_three_and_caps_at_eight() {
        let mut queue = MatchmakingQueue::tournament();
        queue.enqueue(player(1));
        queue.enqueue(player(2));
        assert!(queue.try_drain().is_none());

        queue.enqueue(player(3));
        assert_eq!(queue.try_drain().unwrap().len(), 3);

        for id in 1..=10 {
            queue.enqueue(player(id));
        }
        let batch = queue.try_drain().unwrap();
        assert_eq!(batch.len(), 8);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn requeue_moves_to_the_back() {
        let mut queue = MatchmakingQueue::tournament();
        queue.enqueue(player(1));
        queue.enqueue(player(2));
        queue.enqueue(player(1));
        assert_eq!(queue.len(), 2);
        let batch: Vec<i64> = {
            queue.enqueue(player(3));
            queue.try_drain().unwrap().iter().map(|p| p.user_id).collect()
        };
        assert_eq!(batch, vec![2, 1, 3]);
    }

    #[test]
    fn dequeue_removes_only_the_target() {
        let mut queue = MatchmakingQueue::single();
        queue.enqueue(player(1));
        queue.enqueue(player(2));
        assert!(queue.dequeue(1).is_some());
        assert!(queue.dequeue(1).is_none());
        assert!(queue.contains(2));
        assert_eq!(queue.len(), 1);
    }
}
