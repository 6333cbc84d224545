//! # Connectivity and Authentication Contracts
//!
//! The two notification sources the orchestrator subscribes to. Like the
//! gateway, these are external collaborators: the hosting application
//! bridges its platform callbacks (reachability changes, login/logout)
//! into these contracts.
//!
//! ## Subscription Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  watch channels as change streams                       │
//! │                                                                         │
//! │  Platform callback ──► set_online(true) ──► watch::Sender<bool>        │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │  Orchestrator task ◄── subscribe() ◄── watch::Receiver<bool>           │
//! │                                                                         │
//! │  • current value always readable (is_online / is_authenticated)        │
//! │  • rapid flapping coalesces to the latest value - exactly what the     │
//! │    settle-delay triggers want                                          │
//! │  • receivers are cancellable: drop them and the subscription ends      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::watch;

// =============================================================================
// Contracts
// =============================================================================

/// Network reachability: current value plus a change stream.
pub trait NetworkObserver: Send + Sync {
    /// Whether the device currently has connectivity.
    fn is_online(&self) -> bool;

    /// Subscribes to reachability changes. The receiver yields the latest
    /// value after each change (an offline→online edge is a restoration).
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Authentication state: current value plus a login-event stream.
pub trait AuthProvider: Send + Sync {
    /// Whether a user is currently authenticated.
    fn is_authenticated(&self) -> bool;

    /// Subscribes to authentication changes. A false→true edge is a login
    /// event.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

// =============================================================================
// Watch-Backed Implementations
// =============================================================================

/// Reference [`NetworkObserver`] backed by a watch channel.
///
/// The hosting application holds one of these and calls
/// [`NetworkState::set_online`] from its platform reachability callback.
#[derive(Debug)]
pub struct NetworkState {
    tx: watch::Sender<bool>,
}

impl NetworkState {
    /// Creates a state holder with the given initial reachability.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        NetworkState { tx }
    }

    /// Pushes a reachability change to all subscribers.
    pub fn set_online(&self, online: bool) {
        // send_replace never fails even with zero subscribers.
        self.tx.send_replace(online);
    }
}

impl NetworkObserver for NetworkState {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Reference [`AuthProvider`] backed by a watch channel.
#[derive(Debug)]
pub struct AuthState {
    tx: watch::Sender<bool>,
}

impl AuthState {
    /// Creates a state holder with the given initial authentication state.
    pub fn new(authenticated: bool) -> Self {
        let (tx, _) = watch::channel(authenticated);
        AuthState { tx }
    }

    /// Pushes an authentication change to all subscribers.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.tx.send_replace(authenticated);
    }
}

impl AuthProvider for AuthState {
    fn is_authenticated(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn network_state_pushes_changes() {
        let network = NetworkState::new(false);
        assert!(!network.is_online());

        let mut rx = network.subscribe();
        network.set_online(true);

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(network.is_online());
    }

    #[tokio::test]
    async fn auth_state_pushes_changes() {
        let auth = AuthState::new(false);
        let mut rx = auth.subscribe();

        auth.set_authenticated(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn set_without_subscribers_is_fine() {
        let network = NetworkState::new(true);
        network.set_online(false);
        assert!(!network.is_online());
    }
}
