//! Per-thread runtime state the object model needs: the state machine,
//! native↔managed frame accounting, the pending-exception channel, and
//! scoped pinning of references across allocation points.

use crate::object::Object;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ThreadState {
    Runnable,
    Native,
    Suspended,
    Waiting,
}

/// A managed exception waiting to be raised by the executor: the throwable's
/// descriptor plus a formatted detail message.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingException {
    pub descriptor: String,
    pub message: String,
}

pub struct Thread {
    id: u32,
    state: ThreadState,
    native_to_managed_depth: usize,
    exception: Option<PendingException>,
    pinned: Vec<Object>,
}

impl Thread {
    pub fn new() -> Thread {
        Thread {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            // Threads attach from native code.
            state: ThreadState::Native,
            native_to_managed_depth: 0,
            exception: None,
            pinned: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn set_state(&mut self, new_state: ThreadState) -> ThreadState {
        std::mem::replace(&mut self.state, new_state)
    }

    /// Run `f` with the thread temporarily in `state`, restoring the old
    /// state on every exit path.
    pub fn with_state<R>(
        &mut self,
        state: ThreadState,
        f: impl FnOnce(&mut Thread) -> R,
    ) -> R {
        let old = self.set_state(state);
        let result = f(self);
        self.state = old;
        result
    }

    pub fn push_native_to_managed(&mut self) {
        self.native_to_managed_depth += 1;
    }

    pub fn pop_native_to_managed(&mut self) {
        assert!(self.native_to_managed_depth > 0);
        self.native_to_managed_depth -= 1;
    }

    pub fn native_to_managed_depth(&self) -> usize {
        self.native_to_managed_depth
    }

    pub fn throw_new_exception(&mut self, descriptor: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(descriptor, message = %message, "throwing");
        self.exception = Some(PendingException {
            descriptor: descriptor.to_string(),
            message,
        });
    }

    pub fn pending_exception(&self) -> Option<&PendingException> {
        self.exception.as_ref()
    }

    pub fn take_exception(&mut self) -> Option<PendingException> {
        self.exception.take()
    }

    /// Keep `obj` visible to the collector for the duration of `f`.
    pub fn with_pinned<R>(&mut self, obj: Object, f: impl FnOnce(&mut Thread) -> R) -> R {
        self.pinned.push(obj);
        let result = f(self);
        self.pinned.pop();
        result
    }

    /// References currently pinned by in-flight allocation sequences.
    pub fn pinned_roots(&self) -> &[Object] {
        &self.pinned
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}
