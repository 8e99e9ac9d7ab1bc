//! Per-descriptor-file resolution caches.
//!
//! Every slot is write-once: null (the sentinel word) until resolution
//! publishes a value, never replaced afterwards. Redundant resolution is
//! benign; the first single-word store wins.

use crate::object::Object;
use crate::Runtime;
use crate::TrampolineKind;
use dvm_types::{CacheId, ClassId, FieldId, FileId, MethodId, NO_INDEX};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

fn id_array(len: u32) -> Box<[AtomicU32]> {
    (0..len).map(|_| AtomicU32::new(NO_INDEX)).collect()
}

/// Store `value` unless the slot already left the sentinel; entries are
/// never replaced.
fn publish_id(slot: &AtomicU32, value: u32) {
    let _ = slot.compare_exchange(NO_INDEX, value, Ordering::Release, Ordering::Relaxed);
}

/// The per-method pair of slots: the code entry point and the resolved
/// method. Freshly initialized slots vector unresolved calls into the
/// resolution trampoline.
pub struct CodeAndDirectMethods {
    entries: Box<[CodeAndDirectEntry]>,
}

struct CodeAndDirectEntry {
    code: AtomicUsize,
    method: AtomicU32,
}

impl CodeAndDirectMethods {
    fn new(num_methods: u32) -> CodeAndDirectMethods {
        CodeAndDirectMethods {
            entries: (0..num_methods)
                .map(|_| CodeAndDirectEntry {
                    code: AtomicUsize::new(0),
                    method: AtomicU32::new(NO_INDEX),
                })
                .collect(),
        }
    }

    pub fn resolved_code(&self, method_idx: u32) -> usize {
        self.entries[method_idx as usize].code.load(Ordering::Acquire)
    }

    pub fn resolved_method(&self, method_idx: u32) -> Option<MethodId> {
        MethodId::from_raw(self.entries[method_idx as usize].method.load(Ordering::Acquire))
    }

    pub fn set_resolved_direct_method_trampoline(&self, method_idx: u32, trampoline: usize) {
        let entry = &self.entries[method_idx as usize];
        entry.code.store(trampoline, Ordering::Release);
        entry.method.store(NO_INDEX, Ordering::Release);
    }

    /// Write-once publication of a resolved direct call: the method must be
    /// direct and must already have code installed.
    pub fn set_resolved_direct_method(&self, rt: &Runtime, method_idx: u32, method: MethodId) {
        let resolved = rt.method(method);
        assert!(resolved.is_direct(), "{} is not direct", resolved.pretty(rt));
        assert_ne!(resolved.code(), 0, "{} has no code", resolved.pretty(rt));
        let entry = &self.entries[method_idx as usize];
        entry.code.store(resolved.code(), Ordering::Release);
        entry.method.store(method.raw(), Ordering::Release);
    }
}

pub struct FileCache {
    id: CacheId,
    location: String,
    file: FileId,
    /// Resolved string objects, by string id; 0 until resolved.
    strings: Box<[AtomicUsize]>,
    resolved_types: Box<[AtomicU32]>,
    resolved_methods: Box<[AtomicU32]>,
    resolved_fields: Box<[AtomicU32]>,
    /// Classes whose `<clinit>` has completed, by type id, so static
    /// accesses may skip the initialization check.
    static_storage: Box<[AtomicU32]>,
    code_and_direct_methods: CodeAndDirectMethods,
}

impl FileCache {
    /// Wire up all the resolution arrays for one descriptor file. Once the
    /// runtime has started, every code slot is pre-seeded with the shared
    /// resolution trampoline so the first call through an unresolved direct
    /// method vectors into the linker.
    pub fn new(
        rt: &Runtime,
        location: &str,
        file: FileId,
        num_strings: u32,
        num_types: u32,
        num_methods: u32,
        num_fields: u32,
    ) -> FileCache {
        let cache = FileCache {
            id: CacheId(NO_INDEX),
            location: location.to_string(),
            file,
            strings: (0..num_strings).map(|_| AtomicUsize::new(0)).collect(),
            resolved_types: id_array(num_types),
            resolved_methods: id_array(num_methods),
            resolved_fields: id_array(num_fields),
            static_storage: id_array(num_types),
            code_and_direct_methods: CodeAndDirectMethods::new(num_methods),
        };

        if rt.is_started() {
            let trampoline = rt.resolution_stub(TrampolineKind::UnknownMethod);
            for method_idx in 0..num_methods {
                cache
                    .code_and_direct_methods
                    .set_resolved_direct_method_trampoline(method_idx, trampoline);
            }
        }
        cache
    }

    pub(crate) fn set_id(&mut self, id: CacheId) {
        self.id = id;
    }

    pub fn id(&self) -> CacheId {
        self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn num_strings(&self) -> u32 {
        self.strings.len() as u32
    }

    pub fn num_resolved_types(&self) -> u32 {
        self.resolved_types.len() as u32
    }

    pub fn num_resolved_methods(&self) -> u32 {
        self.resolved_methods.len() as u32
    }

    pub fn num_resolved_fields(&self) -> u32 {
        self.resolved_fields.len() as u32
    }

    pub fn get_resolved_string(&self, string_idx: u32) -> Option<Object> {
        let word = self.strings[string_idx as usize].load(Ordering::Acquire);
        if word == 0 {
            None
        } else {
            Some(Object::from_word(word))
        }
    }

    pub fn set_resolved_string(&self, string_idx: u32, resolved: Object) {
        debug_assert!(!resolved.is_null());
        let _ = self.strings[string_idx as usize].compare_exchange(
            0,
            resolved.as_word(),
            Ordering::Release,
            Ordering::Relaxed,
        );
    }

    pub fn get_resolved_type(&self, type_idx: u32) -> Option<ClassId> {
        ClassId::from_raw(self.resolved_types[type_idx as usize].load(Ordering::Acquire))
    }

    pub fn set_resolved_type(&self, type_idx: u32, resolved: ClassId) {
        publish_id(&self.resolved_types[type_idx as usize], resolved.raw());
    }

    pub fn get_resolved_method(&self, method_idx: u32) -> Option<MethodId> {
        MethodId::from_raw(self.resolved_methods[method_idx as usize].load(Ordering::Acquire))
    }

    pub fn set_resolved_method(&self, method_idx: u32, resolved: MethodId) {
        publish_id(&self.resolved_methods[method_idx as usize], resolved.raw());
    }

    pub fn get_resolved_field(&self, field_idx: u32) -> Option<FieldId> {
        FieldId::from_raw(self.resolved_fields[field_idx as usize].load(Ordering::Acquire))
    }

    pub fn set_resolved_field(&self, field_idx: u32, resolved: FieldId) {
        publish_id(&self.resolved_fields[field_idx as usize], resolved.raw());
    }

    /// The class for `type_idx` once its static initializer has completed.
    pub fn get_initialized_static_storage(&self, type_idx: u32) -> Option<ClassId> {
        ClassId::from_raw(self.static_storage[type_idx as usize].load(Ordering::Acquire))
    }

    pub fn set_initialized_static_storage(&self, type_idx: u32, initialized: ClassId) {
        publish_id(&self.static_storage[type_idx as usize], initialized.raw());
    }

    pub fn code_and_direct_methods(&self) -> &CodeAndDirectMethods {
        &self.code_and_direct_methods
    }
}
