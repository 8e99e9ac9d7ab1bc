//! Declared-field metadata and the typed accessor family.

use crate::object::Object;
use crate::thread::Thread;
use crate::Runtime;
use dvm_types::{AccessFlags, ClassId, FieldId, Primitive, NO_INDEX};
use parking_lot::Mutex;
use paste::paste;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct Field {
    id: FieldId,
    declaring_class: ClassId,
    name: Arc<String>,
    /// Type id in the declaring class's descriptor file.
    type_idx: u32,
    access_flags: AccessFlags,
    /// Byte offset into the instance (or static area); assigned during
    /// class linking.
    offset: AtomicU32,
    /// Lazily resolved field type; benign-race single-word cache.
    resolved_type: AtomicU32,
    reflect_guard: Mutex<()>,
}

impl Field {
    pub fn new(
        declaring_class: ClassId,
        name: &str,
        type_idx: u32,
        access_flags: AccessFlags,
    ) -> Field {
        Field {
            id: FieldId(NO_INDEX),
            declaring_class,
            name: Arc::new(name.to_string()),
            type_idx,
            access_flags,
            offset: AtomicU32::new(NO_INDEX),
            resolved_type: AtomicU32::new(NO_INDEX),
            reflect_guard: Mutex::new(()),
        }
    }

    pub(crate) fn set_id(&mut self, id: FieldId) {
        self.id = id;
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn declaring_class(&self) -> ClassId {
        self.declaring_class
    }

    pub fn name(&self) -> &Arc<String> {
        &self.name
    }

    pub fn type_idx(&self) -> u32 {
        self.type_idx
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    pub fn is_volatile(&self) -> bool {
        self.access_flags.contains(AccessFlags::VOLATILE)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(AccessFlags::FINAL)
    }

    pub fn offset(&self) -> u32 {
        let offset = self.offset.load(Ordering::Relaxed);
        debug_assert_ne!(offset, NO_INDEX);
        offset
    }

    pub fn set_offset(&self, rt: &Runtime, num_bytes: u32) {
        let declaring = rt.class(self.declaring_class);
        debug_assert!(declaring.is_loaded() || declaring.is_erroneous());
        let kind = self.get_primitive_type(rt);
        if kind == Primitive::Double || kind == Primitive::Long {
            debug_assert_eq!(num_bytes % 8, 0);
        }
        self.offset.store(num_bytes, Ordering::Relaxed);
    }

    /// Read the type from the descriptor-file cache without resolving.
    /// Only meaningful while the declaring class is still linking; the
    /// primitive types are in the cache early.
    pub fn get_type_during_linking(&self, rt: &Runtime) -> Option<ClassId> {
        let cache = rt.class(self.declaring_class).cache_id()?;
        rt.file_cache(cache).get_resolved_type(self.type_idx)
    }

    pub fn is_primitive_type(&self, rt: &Runtime) -> bool {
        match self.get_type_during_linking(rt) {
            None => true,
            Some(t) => rt.class(t).is_primitive(),
        }
    }

    pub fn get_primitive_type(&self, rt: &Runtime) -> Primitive {
        match self.get_type_during_linking(rt) {
            None => Primitive::Not,
            Some(t) => rt.class(t).primitive_type(),
        }
    }

    pub fn primitive_size(&self, rt: &Runtime) -> usize {
        self.get_primitive_type(rt).field_size()
    }

    pub fn get_type_descriptor(&self, rt: &Runtime) -> Arc<String> {
        let declaring = rt.class(self.declaring_class);
        let cache = rt.file_cache(
            declaring
                .cache_id()
                .expect("field type lookup on a class with no descriptor file"),
        );
        let file = rt.descriptor_file(cache.file());
        file.type_descriptor(self.type_idx).clone()
    }

    /// Resolve the field type on demand and memoize it.
    pub fn get_type(&self, rt: &Runtime, thread: &mut Thread) -> Option<ClassId> {
        if let Some(resolved) = ClassId::from_raw(self.resolved_type.load(Ordering::Acquire)) {
            return Some(resolved);
        }
        let declaring = rt.class(self.declaring_class);
        let cache = declaring
            .cache_id()
            .expect("field type resolution on a class with no descriptor file");
        let resolved =
            rt.class_linker()
                .resolve_type(rt, thread, self.type_idx, cache, declaring.loader())?;
        self.resolved_type.store(resolved.raw(), Ordering::Release);
        Some(resolved)
    }

    /// At-most-one resolver wins; a failed resolve leaves the state empty
    /// and retriable.
    pub fn init_reflective_state(&self, rt: &Runtime, thread: &mut Thread) {
        let _guard = self.reflect_guard.lock();
        if ClassId::from_raw(self.resolved_type.load(Ordering::Acquire)).is_none() {
            // Resolves the type as a side effect. May leave an exception.
            let _ = self.get_type(rt, thread);
        }
    }

    pub fn resolved_type(&self) -> Option<ClassId> {
        ClassId::from_raw(self.resolved_type.load(Ordering::Acquire))
    }

    pub fn pretty(&self, rt: &Runtime) -> String {
        format!(
            "{} {}.{}",
            crate::descriptor::pretty_descriptor(&self.get_type_descriptor(rt)),
            crate::descriptor::pretty_descriptor(rt.class(self.declaring_class).descriptor()),
            self.name
        )
    }

    /// Enforce the static/instance discipline: static access takes a null
    /// target and substitutes the declaring class's static area, instance
    /// access takes the instance.
    fn resolve_target(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
    ) -> Option<Object> {
        if object.is_some() == self.is_static() {
            thread.throw_new_exception(
                "Ljava/lang/IllegalArgumentException;",
                format!(
                    "expected {} receiver for {}",
                    if self.is_static() { "no" } else { "an instance" },
                    self.pretty(rt)
                ),
            );
            return None;
        }
        if self.is_static() {
            let statics = rt.class(self.declaring_class).statics_object();
            debug_assert!(!statics.is_null());
            Some(statics)
        } else {
            object
        }
    }

    pub fn get32(&self, rt: &Runtime, thread: &mut Thread, object: Option<Object>) -> Option<u32> {
        let target = self.resolve_target(rt, thread, object)?;
        Some(target.get_field32(self.offset() as usize, self.is_volatile()))
    }

    pub fn set32(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
        new_value: u32,
    ) -> bool {
        match self.resolve_target(rt, thread, object) {
            Some(target) => {
                target.set_field32(self.offset() as usize, new_value, self.is_volatile());
                true
            }
            None => false,
        }
    }

    pub fn get64(&self, rt: &Runtime, thread: &mut Thread, object: Option<Object>) -> Option<u64> {
        let target = self.resolve_target(rt, thread, object)?;
        Some(target.get_field64(self.offset() as usize, self.is_volatile()))
    }

    pub fn set64(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
        new_value: u64,
    ) -> bool {
        match self.resolve_target(rt, thread, object) {
            Some(target) => {
                target.set_field64(self.offset() as usize, new_value, self.is_volatile());
                true
            }
            None => false,
        }
    }

    pub fn get_obj(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
    ) -> Option<Object> {
        let target = self.resolve_target(rt, thread, object)?;
        Some(target.get_field_ref(self.offset() as usize, self.is_volatile()))
    }

    pub fn set_obj(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
        new_value: Object,
    ) -> bool {
        match self.resolve_target(rt, thread, object) {
            Some(target) => {
                target.set_field_ref(self.offset() as usize, new_value, self.is_volatile());
                true
            }
            None => false,
        }
    }

    pub fn get_boolean(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
    ) -> Option<bool> {
        debug_assert_eq!(self.get_primitive_type(rt), Primitive::Bool);
        self.get32(rt, thread, object).map(|v| v != 0)
    }

    pub fn set_boolean(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
        z: bool,
    ) -> bool {
        debug_assert_eq!(self.get_primitive_type(rt), Primitive::Bool);
        self.set32(rt, thread, object, z as u32)
    }

    pub fn get_long(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
    ) -> Option<i64> {
        debug_assert_eq!(self.get_primitive_type(rt), Primitive::Long);
        self.get64(rt, thread, object).map(|v| v as i64)
    }

    pub fn set_long(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
        j: i64,
    ) -> bool {
        debug_assert_eq!(self.get_primitive_type(rt), Primitive::Long);
        self.set64(rt, thread, object, j as u64)
    }

    pub fn get_float(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
    ) -> Option<f32> {
        debug_assert_eq!(self.get_primitive_type(rt), Primitive::Float);
        self.get32(rt, thread, object).map(f32::from_bits)
    }

    pub fn set_float(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
        f: f32,
    ) -> bool {
        debug_assert_eq!(self.get_primitive_type(rt), Primitive::Float);
        self.set32(rt, thread, object, f.to_bits())
    }

    pub fn get_double(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
    ) -> Option<f64> {
        debug_assert_eq!(self.get_primitive_type(rt), Primitive::Double);
        self.get64(rt, thread, object).map(f64::from_bits)
    }

    pub fn set_double(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
        d: f64,
    ) -> bool {
        debug_assert_eq!(self.get_primitive_type(rt), Primitive::Double);
        self.set64(rt, thread, object, d.to_bits())
    }

    pub fn get_object(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
    ) -> Option<Object> {
        assert_eq!(self.get_primitive_type(rt), Primitive::Not);
        self.get_obj(rt, thread, object)
    }

    pub fn set_object(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        object: Option<Object>,
        l: Object,
    ) -> bool {
        assert_eq!(self.get_primitive_type(rt), Primitive::Not);
        self.set_obj(rt, thread, object, l)
    }
}

macro_rules! narrow_accessors {
    ($name:ident, $prim:ident, $ty:ty) => {
        paste! {
            impl Field {
                pub fn [<get_ $name>](
                    &self,
                    rt: &Runtime,
                    thread: &mut Thread,
                    object: Option<Object>,
                ) -> Option<$ty> {
                    debug_assert_eq!(self.get_primitive_type(rt), Primitive::$prim);
                    self.get32(rt, thread, object).map(|v| v as $ty)
                }

                pub fn [<set_ $name>](
                    &self,
                    rt: &Runtime,
                    thread: &mut Thread,
                    object: Option<Object>,
                    new_value: $ty,
                ) -> bool {
                    debug_assert_eq!(self.get_primitive_type(rt), Primitive::$prim);
                    self.set32(rt, thread, object, new_value as u32)
                }
            }
        }
    };
}

narrow_accessors!(byte, Byte, i8);
narrow_accessors!(char, Char, u16);
narrow_accessors!(short, Short, i16);
narrow_accessors!(int, Int, i32);
