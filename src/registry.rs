// Copyright 2026 the sshchain authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The process-wide set of live proxied connections.
//!
//! Every byte-carrying socket a proxied pair owns is registered here for the
//! duration of its life, so shutdown can force every copy loop to unwind.
//! A registered connection is represented by a cancellation token; closing an
//! entry cancels its token, which the owning copy loop observes and reacts to
//! by dropping (and thereby closing) its sockets. Closing an entry twice is a
//! no-op, and the registry may close an entry whose owner has already
//! finished on its own.
//!
//! The registry is not a global: it is created once at startup and threaded
//! through the supervisor, which keeps it testable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

/// Membership receipt for one registered connection.
///
/// The owning task holds the guard while its socket lives and awaits
/// [`closed`](ConnectionGuard::closed) to learn about forced shutdown.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: Uuid,
    token: CancellationToken,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a live connection until it is closed.
    pub fn register(&self) -> ConnectionGuard {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        self.connections
            .lock()
            .expect("connection registry lock poisoned")
            .insert(id, token.clone());
        ConnectionGuard { id, token }
    }

    /// Close one connection and remove it from the set. Safe to call again
    /// for an entry that is already gone.
    pub fn close(&self, guard: &ConnectionGuard) {
        let token = self
            .connections
            .lock()
            .expect("connection registry lock poisoned")
            .remove(&guard.id);
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Close every registered connection. The registry is empty afterwards.
    pub fn close_all(&self) {
        let drained: Vec<CancellationToken> = {
            let mut connections = self
                .connections
                .lock()
                .expect("connection registry lock poisoned");
            connections.drain().map(|(_, token)| token).collect()
        };
        for token in drained {
            token.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .expect("connection registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConnectionGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Resolves once the registry has closed this connection.
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }

    /// Whether the registry has already closed this connection.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_close_removes_entry() {
        let registry = ConnectionRegistry::new();
        let guard = registry.register();
        assert_eq!(registry.len(), 1);
        assert!(!guard.is_closed());

        registry.close(&guard);
        assert!(registry.is_empty());
        assert!(guard.is_closed());
    }

    #[test]
    fn double_close_is_a_noop() {
        let registry = ConnectionRegistry::new();
        let guard = registry.register();
        registry.close(&guard);
        registry.close(&guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_all_empties_registry_and_cancels_every_guard() {
        let registry = ConnectionRegistry::new();
        let guards: Vec<_> = (0..4).map(|_| registry.register()).collect();
        assert_eq!(registry.len(), 4);

        registry.close_all();
        assert!(registry.is_empty());
        for guard in &guards {
            assert!(guard.is_closed());
        }
    }

    #[tokio::test]
    async fn closed_future_resolves_on_close() {
        let registry = ConnectionRegistry::new();
        let guard = registry.register();
        let registry_clone = registry.clone();

        let waiter = tokio::spawn(async move {
            guard.closed().await;
            guard
        });
        // Give the waiter a chance to park on the token.
        tokio::task::yield_now().await;
        registry_clone.close_all();

        let guard = waiter.await.expect("waiter panicked");
        assert!(guard.is_closed());
    }

    #[test]
    fn guards_have_distinct_ids() {
        let registry = ConnectionRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert_ne!(a.id(), b.id());
    }
}
