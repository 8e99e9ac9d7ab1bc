//! The allocation interface the object model consumes, plus a direct
//! system-allocator implementation used by tests and bring-up.
//!
//! The real garbage-collected heap lives outside this core; everything here
//! goes through the narrow [`Heap`] trait.

use crate::object::{Object, CLASS_OFFSET, HEADER_SIZE};
use crate::thread::Thread;
use dvm_types::ClassId;
use parking_lot::Mutex;
use std::alloc::{alloc_zeroed, dealloc, Layout};

pub trait Heap: Send + Sync {
    /// Allocate `size` zeroed bytes with the header's class word set.
    /// Returns `None` when the heap is exhausted; callers turn that into a
    /// pending `OutOfMemoryError`.
    fn alloc(&self, class: ClassId, size: usize) -> Option<Object>;

    /// Record `obj` for finalization before it becomes unreachable.
    fn add_finalizer_reference(&self, thread: &mut Thread, obj: Object);
}

/// Non-moving heap over the system allocator. Blocks live until the heap is
/// dropped; an optional byte limit makes exhaustion testable.
pub struct SystemHeap {
    blocks: Mutex<Vec<(usize, Layout)>>,
    finalizable: Mutex<Vec<Object>>,
    limit: usize,
    used: Mutex<usize>,
}

impl SystemHeap {
    pub fn new() -> SystemHeap {
        Self::with_limit(usize::MAX)
    }

    pub fn with_limit(limit: usize) -> SystemHeap {
        SystemHeap {
            blocks: Mutex::new(Vec::new()),
            finalizable: Mutex::new(Vec::new()),
            limit,
            used: Mutex::new(0),
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        *self.used.lock()
    }

    pub fn num_finalizable(&self) -> usize {
        self.finalizable.lock().len()
    }
}

impl Default for SystemHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap for SystemHeap {
    fn alloc(&self, class: ClassId, size: usize) -> Option<Object> {
        debug_assert!(size >= HEADER_SIZE);
        let layout = Layout::from_size_align(size, 8).ok()?;

        {
            let mut used = self.used.lock();
            if used.checked_add(size)? > self.limit {
                return None;
            }
            *used += size;
        }

        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return None;
        }
        unsafe {
            (ptr.add(CLASS_OFFSET) as *mut u32).write(class.raw());
        }
        self.blocks.lock().push((ptr as usize, layout));
        Some(unsafe { Object::from_raw(ptr) })
    }

    fn add_finalizer_reference(&self, _thread: &mut Thread, obj: Object) {
        self.finalizable.lock().push(obj);
    }
}

impl Drop for SystemHeap {
    fn drop(&mut self) {
        for &(addr, layout) in self.blocks.lock().iter() {
            unsafe { dealloc(addr as *mut u8, layout) };
        }
    }
}
