//! The class record: lifecycle status, layout words, reference-offset
//! bitmaps, assignability and package rules, and the method/field lookup
//! families.

use crate::object::{Object, HEADER_SIZE};
use crate::thread::Thread;
use crate::Runtime;
use discrim::FromDiscriminant;
use dvm_types::{AccessFlags, CacheId, ClassId, FieldId, LoaderId, MethodId, Primitive, NO_INDEX};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Bitmap sentinel: too many reference fields to encode, the collector must
/// walk the field lists instead.
pub const WALK_SUPER: u32 = u32::MAX;

/// Lifecycle states. Transitions are monotone except for the terminal drop
/// to `Error`.
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Debug, FromDiscriminant)]
#[repr(u8)]
pub enum ClassStatus {
    Error = 0,
    NotReady = 1,
    Idx = 2,
    Loaded = 3,
    Resolved = 4,
    Verifying = 5,
    Verified = 6,
    Initializing = 7,
    Initialized = 8,
}

impl ClassStatus {
    fn from_word(word: u32) -> ClassStatus {
        ClassStatus::from_discriminant(word as u8).unwrap_or(ClassStatus::Error)
    }
}

impl fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClassStatus::Error => "Error",
            ClassStatus::NotReady => "NotReady",
            ClassStatus::Idx => "Idx",
            ClassStatus::Loaded => "Loaded",
            ClassStatus::Resolved => "Resolved",
            ClassStatus::Verifying => "Verifying",
            ClassStatus::Verified => "Verified",
            ClassStatus::Initializing => "Initializing",
            ClassStatus::Initialized => "Initialized",
        };
        f.write_str(name)
    }
}

/// One flattened implemented interface with its slot-to-implementation map.
pub struct InterfaceEntry {
    pub interface: ClassId,
    /// Interface-method slot → concrete method.
    pub method_array: Box<[MethodId]>,
}

pub struct Class {
    id: ClassId,
    descriptor: Arc<String>,
    access_flags: AccessFlags,
    loader: LoaderId,
    primitive: Primitive,
    component_type: Option<ClassId>,
    cache: OnceCell<CacheId>,
    status: AtomicU32,
    super_class: AtomicU32,
    /// Instance size in bytes, assigned during linking.
    object_size: AtomicU32,
    /// Static storage size in bytes.
    class_size: AtomicU32,
    /// The statics block: a heap object of this class holding the static
    /// area past its header.
    statics: AtomicUsize,
    direct_methods: OnceCell<Box<[MethodId]>>,
    virtual_methods: OnceCell<Box<[MethodId]>>,
    vtable: OnceCell<Box<[MethodId]>>,
    direct_interfaces: OnceCell<Box<[ClassId]>>,
    iftable: OnceCell<Box<[InterfaceEntry]>>,
    instance_fields: OnceCell<Box<[FieldId]>>,
    static_fields: OnceCell<Box<[FieldId]>>,
    num_reference_instance_fields: AtomicU32,
    num_reference_static_fields: AtomicU32,
    reference_instance_offsets: AtomicU32,
    reference_static_offsets: AtomicU32,
}

impl Class {
    pub fn new(descriptor: &str, loader: LoaderId, access_flags: AccessFlags) -> Class {
        Class {
            id: ClassId(NO_INDEX),
            descriptor: Arc::new(descriptor.to_string()),
            access_flags,
            loader,
            primitive: Primitive::Not,
            component_type: None,
            cache: OnceCell::new(),
            status: AtomicU32::new(ClassStatus::NotReady as u32),
            super_class: AtomicU32::new(NO_INDEX),
            object_size: AtomicU32::new(0),
            class_size: AtomicU32::new(0),
            statics: AtomicUsize::new(0),
            direct_methods: OnceCell::new(),
            virtual_methods: OnceCell::new(),
            vtable: OnceCell::new(),
            direct_interfaces: OnceCell::new(),
            iftable: OnceCell::new(),
            instance_fields: OnceCell::new(),
            static_fields: OnceCell::new(),
            num_reference_instance_fields: AtomicU32::new(0),
            num_reference_static_fields: AtomicU32::new(0),
            reference_instance_offsets: AtomicU32::new(0),
            reference_static_offsets: AtomicU32::new(0),
        }
    }

    pub fn new_primitive(primitive: Primitive) -> Class {
        let mut class = Class::new(
            &primitive.descriptor_char().to_string(),
            LoaderId::BOOT,
            AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ABSTRACT,
        );
        class.primitive = primitive;
        class
    }

    pub fn new_array(descriptor: &str, loader: LoaderId, component_type: ClassId) -> Class {
        let mut class = Class::new(
            descriptor,
            loader,
            AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ABSTRACT,
        );
        class.component_type = Some(component_type);
        class
    }

    pub(crate) fn set_id(&mut self, id: ClassId) {
        self.id = id;
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    pub fn primitive_type(&self) -> Primitive {
        self.primitive
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive != Primitive::Not
    }

    pub fn is_array(&self) -> bool {
        self.component_type.is_some()
    }

    pub fn component_type(&self) -> Option<ClassId> {
        self.component_type
    }

    pub fn component_size(&self, rt: &Runtime) -> usize {
        match self.component_type {
            Some(component) => {
                let component = rt.class(component);
                if component.is_primitive() {
                    component.primitive_type().component_size()
                } else {
                    std::mem::size_of::<usize>()
                }
            }
            None => 0,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(AccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(AccessFlags::ABSTRACT)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(AccessFlags::FINAL)
    }

    pub fn is_finalizable(&self) -> bool {
        self.access_flags.contains(AccessFlags::FINALIZABLE)
    }

    pub fn is_instantiable(&self) -> bool {
        !self.is_primitive() && !self.is_interface() && !self.is_abstract()
    }

    pub fn is_class_class(&self, rt: &Runtime) -> bool {
        rt.well_known.try_class_class() == Some(self.id)
    }

    pub fn cache_id(&self) -> Option<CacheId> {
        self.cache.get().copied()
    }

    pub fn set_cache(&self, cache: CacheId) {
        assert!(self.cache.set(cache).is_ok(), "cache already set");
    }

    // Status machine.

    pub fn status(&self) -> ClassStatus {
        ClassStatus::from_word(self.status.load(Ordering::Acquire))
    }

    /// Transitions must be monotone once the runtime has started, with
    /// `Error` as the only terminal escape.
    pub fn set_status(&self, rt: &Runtime, new_status: ClassStatus) {
        let old_status = self.status();
        assert!(
            new_status > old_status || new_status == ClassStatus::Error || !rt.is_started(),
            "{}: illegal status transition {} -> {}",
            self.descriptor,
            old_status,
            new_status
        );
        self.status.store(new_status as u32, Ordering::Release);
    }

    pub fn is_erroneous(&self) -> bool {
        self.status() == ClassStatus::Error
    }

    pub fn is_loaded(&self) -> bool {
        self.status() >= ClassStatus::Loaded
    }

    pub fn is_resolved(&self) -> bool {
        self.status() >= ClassStatus::Resolved
    }

    pub fn is_verified(&self) -> bool {
        self.status() >= ClassStatus::Verified
    }

    pub fn is_initializing(&self) -> bool {
        self.status() >= ClassStatus::Initializing
    }

    pub fn is_initialized(&self) -> bool {
        self.status() == ClassStatus::Initialized
    }

    pub fn super_class_id(&self) -> Option<ClassId> {
        ClassId::from_raw(self.super_class.load(Ordering::Acquire))
    }

    pub fn set_super_class(&self, super_class: ClassId) {
        self.super_class.store(super_class.raw(), Ordering::Release);
    }

    pub fn object_size(&self) -> u32 {
        self.object_size.load(Ordering::Relaxed)
    }

    pub fn set_object_size(&self, new_size: u32) {
        debug_assert!(new_size as usize >= HEADER_SIZE);
        self.object_size.store(new_size, Ordering::Relaxed);
    }

    pub fn class_size(&self) -> u32 {
        self.class_size.load(Ordering::Relaxed)
    }

    pub fn set_class_size(&self, new_size: u32) {
        debug_assert!(new_size >= self.class_size());
        self.class_size.store(new_size, Ordering::Relaxed);
    }

    /// Allocate an instance of this class.
    pub fn alloc_object(&self, rt: &Runtime, thread: &mut Thread) -> Option<Object> {
        debug_assert!(!self.is_array());
        debug_assert!(self.is_instantiable());
        debug_assert!(!rt.is_started() || self.is_initializing());
        debug_assert!(self.object_size() as usize >= HEADER_SIZE);

        match rt.heap().alloc(self.id, self.object_size() as usize) {
            Some(obj) => Some(obj),
            None => {
                thread.throw_new_exception(
                    "Ljava/lang/OutOfMemoryError;",
                    format!("failed to allocate {} bytes", self.object_size()),
                );
                None
            }
        }
    }

    /// Allocate the statics block: a heap object of this class whose body
    /// past the header is the static area.
    pub fn alloc_static_storage(&self, rt: &Runtime, thread: &mut Thread) -> Option<Object> {
        let size = HEADER_SIZE + self.class_size() as usize;
        match rt.heap().alloc(self.id, size) {
            Some(obj) => {
                self.statics.store(obj.as_word(), Ordering::Release);
                Some(obj)
            }
            None => {
                thread.throw_new_exception(
                    "Ljava/lang/OutOfMemoryError;",
                    format!("failed to allocate {size} bytes of static storage"),
                );
                None
            }
        }
    }

    pub fn statics_object(&self) -> Object {
        Object::from_word(self.statics.load(Ordering::Acquire))
    }

    // Member tables; each is published once during linking.

    pub fn set_direct_methods(&self, methods: Box<[MethodId]>) {
        assert!(self.direct_methods.set(methods).is_ok());
    }

    pub fn direct_methods(&self) -> &[MethodId] {
        self.direct_methods.get().map(|m| &m[..]).unwrap_or(&[])
    }

    pub fn set_virtual_methods(&self, methods: Box<[MethodId]>) {
        assert!(self.virtual_methods.set(methods).is_ok());
    }

    pub fn virtual_methods(&self) -> &[MethodId] {
        self.virtual_methods.get().map(|m| &m[..]).unwrap_or(&[])
    }

    pub fn set_vtable(&self, vtable: Box<[MethodId]>) {
        assert!(self.vtable.set(vtable).is_ok());
    }

    pub fn vtable(&self) -> Option<&[MethodId]> {
        self.vtable.get().map(|v| &v[..])
    }

    pub fn set_direct_interfaces(&self, interfaces: Box<[ClassId]>) {
        assert!(self.direct_interfaces.set(interfaces).is_ok());
    }

    pub fn direct_interfaces(&self) -> Option<&[ClassId]> {
        self.direct_interfaces.get().map(|i| &i[..])
    }

    pub fn set_iftable(&self, iftable: Box<[InterfaceEntry]>) {
        assert!(self.iftable.set(iftable).is_ok());
    }

    pub fn iftable(&self) -> &[InterfaceEntry] {
        self.iftable.get().map(|t| &t[..]).unwrap_or(&[])
    }

    pub fn set_instance_fields(&self, fields: Box<[FieldId]>) {
        assert!(self.instance_fields.set(fields).is_ok());
    }

    pub fn instance_fields(&self) -> &[FieldId] {
        self.instance_fields.get().map(|f| &f[..]).unwrap_or(&[])
    }

    pub fn set_static_fields(&self, fields: Box<[FieldId]>) {
        assert!(self.static_fields.set(fields).is_ok());
    }

    pub fn static_fields(&self) -> &[FieldId] {
        self.static_fields.get().map(|f| &f[..]).unwrap_or(&[])
    }

    pub fn num_reference_instance_fields(&self) -> u32 {
        self.num_reference_instance_fields.load(Ordering::Relaxed)
    }

    pub fn set_num_reference_instance_fields(&self, count: u32) {
        self.num_reference_instance_fields
            .store(count, Ordering::Relaxed);
    }

    pub fn num_reference_static_fields(&self) -> u32 {
        self.num_reference_static_fields.load(Ordering::Relaxed)
    }

    pub fn set_num_reference_static_fields(&self, count: u32) {
        self.num_reference_static_fields
            .store(count, Ordering::Relaxed);
    }

    // Reference-offset bitmaps: bit i marks word i of the object (resp.
    // static area) as a managed reference.

    pub fn reference_instance_offsets(&self) -> u32 {
        self.reference_instance_offsets.load(Ordering::Relaxed)
    }

    pub fn set_reference_instance_offsets(&self, rt: &Runtime, new_reference_offsets: u32) {
        if new_reference_offsets != WALK_SUPER {
            // The bit count must agree with the reference fields of this
            // class and every superclass.
            let mut count = 0;
            let mut cur = Some(self.id);
            while let Some(id) = cur {
                let klass = rt.class(id);
                count += klass.num_reference_instance_fields();
                cur = klass.super_class_id();
            }
            assert_eq!(new_reference_offsets.count_ones(), count);
        }
        self.reference_instance_offsets
            .store(new_reference_offsets, Ordering::Relaxed);
    }

    pub fn reference_static_offsets(&self) -> u32 {
        self.reference_static_offsets.load(Ordering::Relaxed)
    }

    pub fn set_reference_static_offsets(&self, new_reference_offsets: u32) {
        if new_reference_offsets != WALK_SUPER {
            assert_eq!(
                new_reference_offsets.count_ones(),
                self.num_reference_static_fields()
            );
        }
        self.reference_static_offsets
            .store(new_reference_offsets, Ordering::Relaxed);
    }

    // Assignability and the package rule.

    /// All interfaces implemented directly or transitively are flattened
    /// into the iftable, so one linear scan decides.
    pub fn implements(&self, rt: &Runtime, klass: ClassId) -> bool {
        debug_assert!(rt.class(klass).is_interface());
        self.iftable().iter().any(|entry| entry.interface == klass)
    }

    fn is_array_assignable_from_array(&self, rt: &Runtime, src: &Class) -> bool {
        debug_assert!(self.is_array());
        debug_assert!(src.is_array());
        match (self.component_type, src.component_type) {
            (Some(this_component), Some(src_component)) => rt
                .class(this_component)
                .is_assignable_from(rt, src_component),
            _ => false,
        }
    }

    fn is_assignable_from_array(&self, rt: &Runtime, src: &Class) -> bool {
        debug_assert!(!self.is_interface());
        debug_assert!(src.is_array());
        if !self.is_array() {
            // If this is not also an array, it must be the root class; an
            // array's superclass is the root.
            let root = src.super_class_id();
            debug_assert!(root
                .map(|r| rt.class(r).super_class_id().is_none())
                .unwrap_or(false));
            return Some(self.id) == root;
        }
        self.is_array_assignable_from_array(rt, src)
    }

    pub fn is_assignable_from(&self, rt: &Runtime, src: ClassId) -> bool {
        if self.id == src {
            return true;
        }
        let src = rt.class(src);
        if self.is_interface() {
            return src.implements(rt, self.id);
        }
        if src.is_array() {
            return self.is_assignable_from_array(rt, &src);
        }
        self.is_super_of(rt, &src)
    }

    /// Strict class-hierarchy walk; interfaces and arrays are handled by the
    /// callers above.
    pub fn is_sub_class(&self, rt: &Runtime, klass: ClassId) -> bool {
        debug_assert!(!self.is_interface());
        debug_assert!(!self.is_array());
        let mut current = Some(self.id);
        while let Some(id) = current {
            if id == klass {
                return true;
            }
            current = rt.class(id).super_class_id();
        }
        false
    }

    fn is_super_of(&self, rt: &Runtime, src: &Class) -> bool {
        let mut current = Some(src.id);
        while let Some(id) = current {
            if id == self.id {
                return true;
            }
            current = rt.class(id).super_class_id();
        }
        false
    }

    /// Two descriptors share a package when neither has a `/` at or past
    /// their first mismatch.
    pub fn descriptors_in_same_package(descriptor1: &str, descriptor2: &str) -> bool {
        let b1 = descriptor1.as_bytes();
        let b2 = descriptor2.as_bytes();
        let mut i = 0;
        while i < b1.len() && i < b2.len() && b1[i] == b2[i] {
            i += 1;
        }
        !(descriptor1[i..].contains('/') || descriptor2[i..].contains('/'))
    }

    pub fn is_in_same_package(&self, rt: &Runtime, that: ClassId) -> bool {
        if self.id == that {
            return true;
        }
        let that = rt.class(that);
        if self.loader != that.loader {
            return false;
        }
        // Arrays are in the same package as their element classes.
        let descriptor1 = self.descriptor.trim_start_matches('[');
        let descriptor2 = that.descriptor.trim_start_matches('[');
        Self::descriptors_in_same_package(descriptor1, descriptor2)
    }

    // Method lookup.

    pub fn find_declared_virtual_method(
        &self,
        rt: &Runtime,
        name: &str,
        signature: &str,
    ) -> Option<MethodId> {
        self.virtual_methods()
            .iter()
            .copied()
            .find(|&m| {
                let method = rt.method(m);
                &**method.name() == name && &**method.signature() == signature
            })
    }

    pub fn find_virtual_method(
        &self,
        rt: &Runtime,
        name: &str,
        signature: &str,
    ) -> Option<MethodId> {
        let mut current = Some(self.id);
        while let Some(id) = current {
            let klass = rt.class(id);
            if let Some(method) = klass.find_declared_virtual_method(rt, name, signature) {
                return Some(method);
            }
            current = klass.super_class_id();
        }
        None
    }

    pub fn find_declared_direct_method(
        &self,
        rt: &Runtime,
        name: &str,
        signature: &str,
    ) -> Option<MethodId> {
        self.direct_methods()
            .iter()
            .copied()
            .find(|&m| {
                let method = rt.method(m);
                &**method.name() == name && &**method.signature() == signature
            })
    }

    pub fn find_direct_method(
        &self,
        rt: &Runtime,
        name: &str,
        signature: &str,
    ) -> Option<MethodId> {
        let mut current = Some(self.id);
        while let Some(id) = current {
            let klass = rt.class(id);
            if let Some(method) = klass.find_declared_direct_method(rt, name, signature) {
                return Some(method);
            }
            current = klass.super_class_id();
        }
        None
    }

    /// Check this class's virtuals before the flattened interfaces.
    pub fn find_interface_method(
        &self,
        rt: &Runtime,
        name: &str,
        signature: &str,
    ) -> Option<MethodId> {
        if let Some(method) = self.find_virtual_method(rt, name, signature) {
            return Some(method);
        }
        for entry in self.iftable() {
            if let Some(method) = rt
                .class(entry.interface)
                .find_virtual_method(rt, name, signature)
            {
                return Some(method);
            }
        }
        None
    }

    /// Map an interface method to this class's implementation through the
    /// iftable. A missing entry is an incompatible class change.
    pub fn find_virtual_method_for_interface(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        method: &crate::method::Method,
        can_throw: bool,
    ) -> Option<MethodId> {
        let declaring = rt.class(method.declaring_class());
        debug_assert!(declaring.is_interface());

        for entry in self.iftable() {
            if entry.interface == declaring.id() {
                return Some(entry.method_array[method.method_index() as usize]);
            }
        }
        if can_throw {
            thread.throw_new_exception(
                "Ljava/lang/IncompatibleClassChangeError;",
                format!(
                    "class {} does not implement interface {}",
                    crate::descriptor::pretty_descriptor(&self.descriptor),
                    crate::descriptor::pretty_descriptor(declaring.descriptor()),
                ),
            );
        }
        None
    }

    // Field lookup.

    pub fn find_declared_instance_field(
        &self,
        rt: &Runtime,
        name: &str,
        type_descriptor: &str,
    ) -> Option<FieldId> {
        // Interfaces are not relevant; they cannot declare instance fields.
        self.instance_fields().iter().copied().find(|&f| {
            let field = rt.field(f);
            &**field.name() == name && &*field.get_type_descriptor(rt) == type_descriptor
        })
    }

    pub fn find_instance_field(
        &self,
        rt: &Runtime,
        name: &str,
        type_descriptor: &str,
    ) -> Option<FieldId> {
        let mut current = Some(self.id);
        while let Some(id) = current {
            let klass = rt.class(id);
            if let Some(field) = klass.find_declared_instance_field(rt, name, type_descriptor) {
                return Some(field);
            }
            current = klass.super_class_id();
        }
        None
    }

    pub fn find_declared_static_field(
        &self,
        rt: &Runtime,
        name: &str,
        type_descriptor: &str,
    ) -> Option<FieldId> {
        self.static_fields().iter().copied().find(|&f| {
            let field = rt.field(f);
            &**field.name() == name && &*field.get_type_descriptor(rt) == type_descriptor
        })
    }

    /// Walk superclasses, checking each level's interfaces for constants.
    pub fn find_static_field(
        &self,
        rt: &Runtime,
        name: &str,
        type_descriptor: &str,
    ) -> Option<FieldId> {
        let mut current = Some(self.id);
        while let Some(id) = current {
            let klass = rt.class(id);
            if let Some(field) = klass.find_declared_static_field(rt, name, type_descriptor) {
                return Some(field);
            }
            for entry in klass.iftable() {
                if let Some(field) = rt
                    .class(entry.interface)
                    .find_declared_static_field(rt, name, type_descriptor)
                {
                    return Some(field);
                }
            }
            current = klass.super_class_id();
        }
        None
    }

    /// Human-readable diagnostic dump.
    pub fn dump(&self, rt: &Runtime) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "----- {} '{}' loader={} status={} -----",
            if self.is_interface() { "interface" } else { "class" },
            self.descriptor,
            self.loader.0,
            self.status()
        );
        let _ = writeln!(out, "  objectSize={}", self.object_size());
        let _ = writeln!(out, "  access={:#06x}", self.access_flags.bits() & 0xFFFF);
        if let Some(super_id) = self.super_class_id() {
            let _ = writeln!(
                out,
                "  super='{}'",
                crate::descriptor::pretty_descriptor(rt.class(super_id).descriptor())
            );
        }
        if let Some(component) = self.component_type {
            let _ = writeln!(
                out,
                "  componentType={}",
                crate::descriptor::pretty_descriptor(rt.class(component).descriptor())
            );
        }
        let iftable = self.iftable();
        if !iftable.is_empty() {
            let _ = writeln!(out, "  interfaces ({}):", iftable.len());
            for (i, entry) in iftable.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "    {:2}: {}",
                    i,
                    crate::descriptor::pretty_descriptor(rt.class(entry.interface).descriptor())
                );
            }
        }
        let _ = writeln!(out, "  vtable ({} entries):", self.virtual_methods().len());
        for (i, &m) in self.virtual_methods().iter().enumerate() {
            let _ = writeln!(out, "    {:2}: {}", i, rt.method(m).pretty(rt));
        }
        let _ = writeln!(
            out,
            "  direct methods ({} entries):",
            self.direct_methods().len()
        );
        for (i, &m) in self.direct_methods().iter().enumerate() {
            let _ = writeln!(out, "    {:2}: {}", i, rt.method(m).pretty(rt));
        }
        if !self.static_fields().is_empty() {
            let _ = writeln!(out, "  static fields ({} entries):", self.static_fields().len());
            for (i, &f) in self.static_fields().iter().enumerate() {
                let _ = writeln!(out, "    {:2}: {}", i, rt.field(f).pretty(rt));
            }
        }
        if !self.instance_fields().is_empty() {
            let _ = writeln!(
                out,
                "  instance fields ({} entries):",
                self.instance_fields().len()
            );
            for (i, &f) in self.instance_fields().iter().enumerate() {
                let _ = writeln!(out, "    {:2}: {}", i, rt.field(f).pretty(rt));
            }
        }
        out
    }
}
