//! Connection Registry (C3): a process-local concurrent map from
//! `device_id` to its live connection handle, supporting last-writer-wins
//! registration and per-user enumeration for fan-out.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

/// A live connection's outbound half. Cloning is cheap (one `mpsc` sender
/// per connection, shared by the registry and the connection's own state).
#[derive(Clone)]
pub struct ConnectionHandle {
    pub user_id: i64,
    pub device_id: i64,
    sender: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(user_id: i64, device_id: i64, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            user_id,
            device_id,
            sender,
        }
    }

    /// Queue a binary frame for delivery. Returns `false` if the
    /// connection's write side has already gone away.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.sender.send(Message::Binary(bytes)).is_ok()
    }

    /// Close the underlying connection by dropping its writer channel;
    /// the connection's write task observes the closed channel and exits.
    pub fn close(&self) {
        let _ = self.sender.send(Message::Close(None));
    }
}

/// Process-local registry mapping `device_id -> ConnectionHandle`.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<i64, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` under `device_id`. Last-writer-wins: a prior
    /// handle for the same device is displaced and closed.
    pub fn set(&self, device_id: i64, handle: ConnectionHandle) {
        let displaced = {
            let mut guard = self.inner.write().expect("registry lock poisoned");
            guard.insert(device_id, handle)
        };
        if let Some(old) = displaced {
            old.close();
        }
    }

    #[must_use]
    pub fn get(&self, device_id: i64) -> Option<ConnectionHandle> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .get(&device_id)
            .cloned()
    }

    pub fn delete(&self, device_id: i64) {
        self.inner.write().expect("registry lock poisoned").remove(&device_id);
    }

    /// Snapshot every handle whose `user_id` matches, for user-wide
    /// fan-out. Linear in online device count; adequate for the intended
    /// fan-out sizes (tens of devices per user).
    #[must_use]
    pub fn for_user(&self, user_id: i64) -> Vec<ConnectionHandle> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(user_id: i64, device_id: i64) -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(user_id, device_id, tx), rx)
    }

    #[test]
    fn set_then_get_then_delete() {
        let registry = ConnectionRegistry::new();
        let (h1, _rx1) = handle(1, 10);
        registry.set(10, h1);
        assert!(registry.get(10).is_some());
        registry.delete(10);
        assert!(registry.get(10).is_none());
    }

    #[test]
    fn set_displaces_and_closes_prior_handle() {
        let registry = ConnectionRegistry::new();
        let (h1, mut rx1) = handle(1, 10);
        let (h2, _rx2) = handle(1, 10);
        registry.set(10, h1);
        registry.set(10, h2);

        let msg = rx1.try_recv().expect("displaced handle should be closed");
        assert!(matches!(msg, Message::Close(None)));
        assert!(registry.get(10).is_some());
    }

    #[test]
    fn for_user_filters_by_owning_user() {
        let registry = ConnectionRegistry::new();
        let (h1, _rx1) = handle(1, 10);
        let (h2, _rx2) = handle(1, 11);
        let (h3, _rx3) = handle(2, 12);
        registry.set(10, h1);
        registry.set(11, h2);
        registry.set(12, h3);

        let devices: Vec<i64> = registry.for_user(1).iter().map(|h| h.device_id).collect();
        assert_eq!(devices.len(), 2);
        assert!(devices.contains(&10));
        assert!(devices.contains(&11));
    }
}
