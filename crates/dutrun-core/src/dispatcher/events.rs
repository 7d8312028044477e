//! Callback table and frame dispatch.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, error};

use super::queues::TestHandle;
use crate::protocol::{
    CONSUMED_BY_DEFAULT, Frame, KEY_END, RESERVED_PREFIX, RESTRICTED_CALLBACKS,
};

/// An event handler: `(key, value, timestamp)`.
///
/// The signature itself enforces the handler contract at registration
/// time; a returned error is logged and contained, never propagated
/// across the dispatch boundary.
pub type Handler = Box<dyn FnMut(&str, &str, f64) -> anyhow::Result<()> + Send>;

/// Errors surfaced at registration time, not mid-run.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegisterError {
    #[error("event keys starting with {RESERVED_PREFIX:?} are reserved: {0:?}")]
    ReservedKey(String),

    #[error("callback for {0:?} is predefined and cannot be overridden")]
    RestrictedKey(String),
}

/// Routes decoded frames to registered handlers.
///
/// Construction pre-installs no-op handlers for the consumed-by-default
/// control keys and a default `end` handler that completes the run with
/// `value == "success"`.
pub struct EventDispatcher {
    callbacks: HashMap<String, Handler>,
}

impl EventDispatcher {
    pub fn new(handle: TestHandle) -> Self {
        let mut dispatcher = Self {
            callbacks: HashMap::new(),
        };
        for &key in CONSUMED_BY_DEFAULT {
            dispatcher
                .register_callback(key, Box::new(|_, _, _| Ok(())), true)
                .expect("forced registration cannot fail");
        }
        dispatcher
            .register_callback(
                KEY_END,
                Box::new(move |_key, value, _ts| {
                    handle.notify_complete(Some(value == "success"));
                    Ok(())
                }),
                true,
            )
            .expect("forced registration cannot fail");
        dispatcher
    }

    /// Register a handler for `key`; re-registration overwrites.
    ///
    /// Without `force`, reserved-prefix keys and the restricted set are
    /// rejected. `force` is reserved for internal setup.
    pub fn register_callback(
        &mut self,
        key: &str,
        handler: Handler,
        force: bool,
    ) -> Result<(), RegisterError> {
        if !force {
            if RESTRICTED_CALLBACKS.contains(&key) {
                return Err(RegisterError::RestrictedKey(key.to_string()));
            }
            if key.starts_with(RESERVED_PREFIX) {
                return Err(RegisterError::ReservedKey(key.to_string()));
            }
        }
        self.callbacks.insert(key.to_string(), handler);
        Ok(())
    }

    /// Whether a handler is registered for `key`.
    pub fn is_registered(&self, key: &str) -> bool {
        self.callbacks.contains_key(key)
    }

    /// Dispatch one frame to its handler.
    ///
    /// An unregistered key is expected noise on a shared channel: the
    /// frame is silently dropped and `false` returned. A handler error is
    /// logged as a dispatcher-local failure; the run continues.
    pub fn dispatch(&mut self, frame: &Frame) -> bool {
        let Some(handler) = self.callbacks.get_mut(&frame.key) else {
            debug!(key = %frame.key, "no callback registered, frame dropped");
            return false;
        };
        if let Err(e) = handler(&frame.key, &frame.value, frame.timestamp) {
            error!(key = %frame.key, error = %e, "callback failed");
        }
        true
    }
}
