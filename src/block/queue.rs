use crate::graph::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// A handle for posting external writes while a pass may be running.
///
/// Writes are applied in posting order once the current pass has settled,
/// each one in a pass of its own. Effect functions can capture a clone of
/// this handle to feed values back into their block.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    writes: Arc<Mutex<VecDeque<(String, Value)>>>,
}

impl InputQueue {
    pub fn push(&self, field: impl Into<String>, value: Value) {
        self.lock().push_back((field.into(), value));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(super) fn pop(&self) -> Option<(String, Value)> {
        self.lock().pop_front()
    }

    pub(super) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(String, Value)>> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
