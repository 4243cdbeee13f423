//! Per-connected-user transport fan-out
//!
//! Every component pushes events to clients through this registry. Sends are
//! fire-and-forget: a closed or absent connection is dropped and logged, and
//! stale state self-corrects on the next snapshot.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::protocol::ServerMsg;

/// Addressable duplex endpoint per connected user
pub struct Fanout {
    connections: DashMap<i64, mpsc::UnboundedSender<ServerMsg>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection, returning the sender (the caller's cleanup
    /// token) and the receiver the socket writer drains. A reconnect
    /// replaces the previous transport handle.
    pub fn register(
        &self,
        user_id: i64,
    ) -> (
        mpsc::UnboundedSender<ServerMsg>,
        mpsc::UnboundedReceiver<ServerMsg>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(user_id, tx.clone());
        (tx, rx)
    }

    /// Drop a connection, but only while the given handle is still the
    /// current one. A stale socket's cleanup must not knock a reconnected
    /// user offline. Returns whether the registration was removed.
    pub fn unregister(&self, user_id: i64, handle: &mpsc::UnboundedSender<ServerMsg>) -> bool {
        self.connections
            .remove_if(&user_id, |_, tx| tx.same_channel(handle))
            .is_some()
    }

    pub fn is_connected(&self, user_id: i64) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    /// Best-effort push to one user
    pub fn send_to(&self, user_id: i64, msg: ServerMsg) {
        match self.connections.get(&user_id) {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!(user_id, "Dropped message for closed connection");
                }
            }
            None => {
                debug!(user_id, "Dropped message for absent connection");
            }
        }
    }

    /// Best-effort push to many users
    pub fn send_many(&self, user_ids: &[i64], msg: &ServerMsg) {
        for &user_id in user_ids {
            self.send_to(user_id, msg.clone());
        }
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_to_absent_user_is_a_noop() {
        let fanout = Fanout::new();
        fanout.send_to(1, ServerMsg::Pong { t: 0 });
        assert!(!fanout.is_connected(1));
    }

    #[tokio::test]
    async fn register_replaces_previous_handle() {
        let fanout = Fanout::new();
        let (_, mut first) = fanout.register(1);
        let (_, mut second) = fanout.register(1);

        fanout.send_to(1, ServerMsg::Pong { t: 7 });
        assert!(first.try_recv().is_err());
        assert!(matches!(
            second.try_recv(),
            Ok(ServerMsg::Pong { t: 7 })
        ));
    }

    #[tokio::test]
    async fn stale_socket_cleanup_keeps_reconnected_handle() {
        let fanout = Fanout::new();
        let (old_tx, _old_rx) = fanout.register(1);
        let (new_tx, mut new_rx) = fanout.register(1);

        // The old socket winds down after the reconnect already rebound the
        // transport handle; its cleanup must leave the new handle alone
        assert!(!fanout.unregister(1, &old_tx));
        assert!(fanout.is_connected(1));

        fanout.send_to(1, ServerMsg::Pong { t: 9 });
        assert!(matches!(new_rx.try_recv(), Ok(ServerMsg::Pong { t: 9 })));

        // The current socket's own cleanup still removes the registration
        assert!(fanout.unregister(1, &new_tx));
        assert!(!fanout.is_connected(1));
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_does_not_panic() {
        let fanout = Fanout::new();
        let (_, rx) = fanout.register(2);
        drop(rx);
        fanout.send_to(2, ServerMsg::Pong { t: 1 });
    }
}
