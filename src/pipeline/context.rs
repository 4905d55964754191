// src/pipeline/context.rs
//! Per-request context
//!
//! A `RequestContext` is created for each inbound request or close and
//! handed down the chain. It carries:
//!
//! - **Side channel**: typed values set by one stage and read by another
//!   stage further down, without the two calling each other
//! - **Cancellation**: a token tripped when the caller gives up
//! - **Diagnostics**: non-fatal delegate failures recorded along the way
//!
//! Values set on a context are visible only to contexts derived from it.
//! Nothing here is process-wide.

use crate::delegate::Verb;
use crate::model::Mechanism;
use crate::observability;
use crate::utils::errors::ForwarderError;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Key of a side-channel value
pub trait ContextKey: 'static {
    type Value: Send + Sync + 'static;

    /// Logical name of the slot
    const NAME: &'static str;
}

/// The caller's mechanism preferences as seen at chain entry
#[derive(Debug, Clone, Copy)]
pub struct MechanismPreferences;

impl ContextKey for MechanismPreferences {
    type Value = Vec<Mechanism>;
    const NAME: &'static str = "mechanism_preferences";
}

type Slot = Arc<dyn Any + Send + Sync>;

/// Request-scoped context threaded through every stage
#[derive(Clone, Default)]
pub struct RequestContext {
    values: Arc<HashMap<&'static str, Slot>>,
    cancellation: CancellationToken,
    diagnostics: Diagnostics,
}

impl RequestContext {
    /// Fresh context for one inbound call
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh context cancelled together with `token`
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancellation: token,
            ..Self::default()
        }
    }

    /// Derive a context carrying `value` under `K`
    ///
    /// The receiver is left untouched; cancellation and diagnostics are
    /// shared with the derived context.
    pub fn with_value<K: ContextKey>(&self, value: K::Value) -> Self {
        let mut values: HashMap<&'static str, Slot> = self.values.as_ref().clone();
        values.insert(K::NAME, Arc::new(value));

        Self {
            values: Arc::new(values),
            cancellation: self.cancellation.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    /// Read the value stored under `K`, if any
    pub fn value<K: ContextKey>(&self) -> Option<&K::Value> {
        self.values
            .get(K::NAME)
            .and_then(|slot| slot.downcast_ref::<K::Value>())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().copied().collect();
        keys.sort_unstable();

        f.debug_struct("RequestContext")
            .field("values", &keys)
            .field("cancelled", &self.is_cancelled())
            .field("diagnostics", &self.diagnostics.len())
            .finish()
    }
}

/// Non-fatal failures observed while handling one request
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    failures: Arc<Mutex<Vec<ForwarderError>>>,
}

impl Diagnostics {
    /// Record a failure and count it in metrics
    pub fn record(&self, err: ForwarderError) {
        observability::record_delegate_failure(&err);
        self.failures.lock().push(err);
    }

    pub fn len(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }

    /// `(verb, kind)` of every recorded failure, oldest first
    pub fn summary(&self) -> Vec<(Option<Verb>, &'static str)> {
        self.failures
            .lock()
            .iter()
            .map(|err| (err.verb(), err.kind()))
            .collect()
    }

    /// Drain the recorded failures
    pub fn take(&self) -> Vec<ForwarderError> {
        std::mem::take(&mut *self.failures.lock())
    }
}
