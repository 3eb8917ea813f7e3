//! Disconnect notifier.
//!
//! The venue drops the socket without warning, so the client lets the caller
//! register one handler that is told about every unexpected disconnect. The
//! notifier is Unregistered until a handler is supplied (builder or setter);
//! setting it again replaces the previous handler.
//!
//! The handler runs as a task on the current tokio runtime rather than on the
//! transport task, and a panicking handler is logged, never propagated.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use gx_core::ws::ConnectionState;
use tracing::{debug, error, warn};

/// Connection-inactive handler. Receives a fixed diagnostic message.
pub type OnInactiveCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub struct DisconnectNotifier {
    handler: RwLock<Option<OnInactiveCallback>>,
    message: &'static str,
}

impl DisconnectNotifier {
    pub fn new(message: &'static str) -> Self {
        Self { handler: RwLock::new(None), message }
    }

    pub fn with_handler(message: &'static str, handler: OnInactiveCallback) -> Self {
        Self { handler: RwLock::new(Some(handler)), message }
    }

    /// Register `handler`, replacing any previous one.
    pub fn set_handler(&self, handler: OnInactiveCallback) {
        if self.handler.write().unwrap().replace(handler).is_some() {
            debug!("[notifier] connection-inactive handler replaced");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.handler.read().unwrap().is_some()
    }

    pub fn handle_state(&self, state: ConnectionState) {
        match state {
            ConnectionState::Active => self.on_active(),
            ConnectionState::Inactive => {
                self.on_inactive();
            }
        }
    }

    pub fn on_active(&self) {
        debug!("[notifier] connection active");
    }

    /// Dispatch the handler for an unexpected disconnect.
    ///
    /// Returns `false` when no handler is registered and the event was
    /// ignored.
    pub fn on_inactive(&self) -> bool {
        let Some(handler) = self.handler.read().unwrap().clone() else {
            debug!("[notifier] connection inactive, no handler registered");
            return false;
        };
        warn!("[notifier] connection inactive, notifying handler");

        let message = self.message;
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move { invoke(&handler, message) });
            }
            Err(_) => invoke(&handler, message),
        }
        true
    }
}

fn invoke(handler: &OnInactiveCallback, message: &str) {
    if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
        error!("[notifier] connection-inactive handler panicked");
    }
}
