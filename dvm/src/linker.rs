//! Interfaces to the class-loading machinery and the intern table. Both
//! subsystems live outside this core; the object model only calls through
//! these traits.

use crate::object::Object;
use crate::thread::Thread;
use crate::Runtime;
use dvm_types::{CacheId, ClassId, FileId, LoaderId};

pub trait ClassLinker: Send + Sync {
    /// Find (loading if necessary) the class for `descriptor` in the
    /// namespace of `loader`. On failure the loader's error is pending on
    /// `thread` and `None` is returned.
    fn find_class(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        descriptor: &str,
        loader: LoaderId,
    ) -> Option<ClassId>;

    fn find_system_class(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        descriptor: &str,
    ) -> Option<ClassId> {
        self.find_class(rt, thread, descriptor, LoaderId::BOOT)
    }

    fn find_primitive_class(&self, rt: &Runtime, descriptor_char: char) -> Option<ClassId>;

    /// Resolve the type at `type_idx` of the file behind `cache`, loading
    /// through `loader`, and publish it into the cache. Retriable on
    /// failure.
    fn resolve_type(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        type_idx: u32,
        cache: CacheId,
        loader: LoaderId,
    ) -> Option<ClassId>;

    fn find_descriptor_file(&self, rt: &Runtime, cache: CacheId) -> FileId {
        rt.file_cache(cache).file()
    }
}

pub trait InternTable: Send + Sync {
    /// Weakly intern a string object, returning the canonical instance.
    fn intern_weak(&self, rt: &Runtime, s: Object) -> Object;
}
