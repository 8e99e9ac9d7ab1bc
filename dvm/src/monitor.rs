//! The monitor interface the object model delegates to, plus a thin-lock
//! stand-in good enough for tests and single-process bring-up.

use crate::object::Object;
use crate::thread::Thread;

pub trait MonitorSubsystem: Send + Sync {
    fn enter(&self, thread: &mut Thread, obj: Object);

    /// Returns false when the calling thread does not own the monitor.
    fn exit(&self, thread: &mut Thread, obj: Object) -> bool;

    fn wait(&self, thread: &mut Thread, obj: Object, ms: i64, ns: i32);

    fn notify(&self, thread: &mut Thread, obj: Object);

    fn notify_all(&self, thread: &mut Thread, obj: Object);

    /// Extract the owner id from a lock word.
    fn thin_lock_id_of(&self, lock_word: u32) -> u32;
}

/// Thin locks only: owner id in the high 16 bits of the lock word, recursion
/// count in the low 16. Contention spins; `wait` degrades to a timed sleep;
/// inflation to a fat monitor belongs to the real subsystem.
pub struct ThinLockMonitor;

impl ThinLockMonitor {
    fn owner(word: u32) -> u32 {
        word >> 16
    }

    fn pack(thread_id: u32, count: u32) -> u32 {
        debug_assert!(count <= 0xFFFF);
        ((thread_id & 0xFFFF) << 16) | count
    }
}

impl MonitorSubsystem for ThinLockMonitor {
    fn enter(&self, thread: &mut Thread, obj: Object) {
        let tid = thread.id() & 0xFFFF;
        loop {
            let word = obj.lock_word();
            let new = if word == 0 {
                Self::pack(tid, 1)
            } else if Self::owner(word) == tid {
                word + 1
            } else {
                std::thread::yield_now();
                continue;
            };
            if obj.compare_exchange_lock_word(word, new).is_ok() {
                return;
            }
        }
    }

    fn exit(&self, thread: &mut Thread, obj: Object) -> bool {
        let tid = thread.id() & 0xFFFF;
        loop {
            let word = obj.lock_word();
            if Self::owner(word) != tid {
                return false;
            }
            let count = word & 0xFFFF;
            let new = if count > 1 { word - 1 } else { 0 };
            if obj.compare_exchange_lock_word(word, new).is_ok() {
                return true;
            }
        }
    }

    fn wait(&self, thread: &mut Thread, obj: Object, ms: i64, ns: i32) {
        let word = obj.lock_word();
        let tid = thread.id() & 0xFFFF;
        debug_assert_eq!(Self::owner(word), tid);

        // Release entirely, sleep out the timeout, then restore the
        // recursion count.
        while obj.compare_exchange_lock_word(word, 0).is_err() {
            std::thread::yield_now();
        }
        if ms == 0 && ns == 0 {
            std::thread::yield_now();
        } else {
            let duration = std::time::Duration::from_millis(ms.max(0) as u64)
                + std::time::Duration::from_nanos(ns.max(0) as u64);
            std::thread::sleep(duration);
        }
        loop {
            if obj.compare_exchange_lock_word(0, word).is_ok() {
                return;
            }
            std::thread::yield_now();
        }
    }

    fn notify(&self, thread: &mut Thread, obj: Object) {
        debug_assert_eq!(Self::owner(obj.lock_word()), thread.id() & 0xFFFF);
    }

    fn notify_all(&self, thread: &mut Thread, obj: Object) {
        debug_assert_eq!(Self::owner(obj.lock_word()), thread.id() & 0xFFFF);
    }

    fn thin_lock_id_of(&self, lock_word: u32) -> u32 {
        Self::owner(lock_word)
    }
}
