//! The managed object and reflection core of a compact-bytecode class-file
//! runtime: classes, methods, fields, strings and arrays, per-file
//! resolution caches, and the lookup/dispatch plumbing between descriptor
//! files and an executor.
//!
//! The [`Runtime`] is the explicit context everything runs against. It owns
//! the metadata arenas (classes, methods, fields, descriptor files and their
//! caches, addressed by typed ids), the service interfaces (heap, monitors,
//! intern table, class linker), the shared stub addresses, and the
//! well-known bootstrap classes.

use crate::class::Class;
use crate::descfile::DescriptorFile;
use crate::field::Field;
use crate::file_cache::FileCache;
use crate::heap::Heap;
use crate::linker::{ClassLinker, InternTable};
use crate::method::Method;
use crate::monitor::MonitorSubsystem;
use dvm_types::{CacheId, ClassId, FieldId, FileId, MethodId, NO_INDEX};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use paste::paste;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub mod class;
pub mod descfile;
pub mod descriptor;
pub mod field;
pub mod file_cache;
pub mod heap;
pub mod linker;
pub mod method;
pub mod monitor;
pub mod object;
pub mod string;
pub mod thread;
pub mod throwable;

mod tests;

/// Which resolution trampoline an unresolved call site vectors through.
/// The trampoline receives `(method_idx, calling_method)`, resolves through
/// the linker, publishes the `code_and_direct_methods` slot, and returns the
/// entry point.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TrampolineKind {
    UnknownMethod = 0,
    StaticMethod = 1,
}

/// The shared stub blocks. Call sites only ever compare and jump through
/// their addresses; the bytes themselves are generated elsewhere.
struct StubArrays {
    resolution: [Box<[u8]>; 2],
    jni: Box<[u8]>,
}

impl StubArrays {
    fn new() -> StubArrays {
        StubArrays {
            resolution: [
                vec![0u8; 16].into_boxed_slice(),
                vec![0u8; 16].into_boxed_slice(),
            ],
            jni: vec![0u8; 16].into_boxed_slice(),
        }
    }
}

macro_rules! well_known_classes {
    ($($name:ident),* $(,)?) => {
        paste! {
            /// Bootstrap classes the core needs by identity. Installed once
            /// during startup, torn down symmetrically on shutdown.
            pub struct WellKnownClasses {
                $( $name: AtomicU32, )*
            }

            impl WellKnownClasses {
                fn new() -> WellKnownClasses {
                    WellKnownClasses {
                        $( $name: AtomicU32::new(NO_INDEX), )*
                    }
                }

                $(
                    pub fn [<set_ $name>](&self, class: ClassId) {
                        let previous = self.$name.swap(class.raw(), Ordering::Release);
                        assert_eq!(
                            previous,
                            NO_INDEX,
                            concat!(stringify!($name), " class already installed")
                        );
                    }

                    pub fn [<reset_ $name>](&self) {
                        let previous = self.$name.swap(NO_INDEX, Ordering::Release);
                        assert_ne!(
                            previous,
                            NO_INDEX,
                            concat!(stringify!($name), " class was not installed")
                        );
                    }

                    pub fn [<try_ $name>](&self) -> Option<ClassId> {
                        ClassId::from_raw(self.$name.load(Ordering::Acquire))
                    }

                    pub fn $name(&self) -> ClassId {
                        self.[<try_ $name>]()
                            .expect(concat!(stringify!($name), " class not installed"))
                    }
                )*

                pub fn teardown(&self) {
                    $( self.$name.store(NO_INDEX, Ordering::Release); )*
                }
            }
        }
    };
}

well_known_classes!(
    object,
    class_class,
    string,
    char_array,
    stack_trace_element,
    reflect_field,
    reflect_method,
    reflect_constructor,
);

pub struct Runtime {
    started: AtomicBool,
    heap: Box<dyn Heap>,
    monitor: Box<dyn MonitorSubsystem>,
    intern: Box<dyn InternTable>,
    linker: OnceCell<Arc<dyn ClassLinker>>,
    classes: RwLock<Vec<Arc<Class>>>,
    methods: RwLock<Vec<Arc<Method>>>,
    fields: RwLock<Vec<Arc<Field>>>,
    files: RwLock<Vec<Arc<DescriptorFile>>>,
    caches: RwLock<Vec<Arc<FileCache>>>,
    stubs: StubArrays,
    pub well_known: WellKnownClasses,
}

impl Runtime {
    pub fn new(
        heap: Box<dyn Heap>,
        monitor: Box<dyn MonitorSubsystem>,
        intern: Box<dyn InternTable>,
    ) -> Arc<Runtime> {
        Arc::new(Runtime {
            started: AtomicBool::new(false),
            heap,
            monitor,
            intern,
            linker: OnceCell::new(),
            classes: RwLock::new(Vec::new()),
            methods: RwLock::new(Vec::new()),
            fields: RwLock::new(Vec::new()),
            files: RwLock::new(Vec::new()),
            caches: RwLock::new(Vec::new()),
            stubs: StubArrays::new(),
            well_known: WellKnownClasses::new(),
        })
    }

    pub fn set_class_linker(&self, linker: Arc<dyn ClassLinker>) {
        assert!(
            self.linker.set(linker).is_ok(),
            "class linker already installed"
        );
    }

    pub fn class_linker(&self) -> &Arc<dyn ClassLinker> {
        self.linker.get().expect("class linker not installed")
    }

    pub fn heap(&self) -> &dyn Heap {
        &*self.heap
    }

    pub fn monitor(&self) -> &dyn MonitorSubsystem {
        &*self.monitor
    }

    pub fn intern_table(&self) -> &dyn InternTable {
        &*self.intern
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// One-way transition; loading rules tighten once the runtime runs.
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub fn resolution_stub(&self, kind: TrampolineKind) -> usize {
        self.stubs.resolution[kind as usize].as_ptr() as usize
    }

    pub fn jni_stub(&self) -> usize {
        self.stubs.jni.as_ptr() as usize
    }

    pub fn trampoline_type(method: Option<&Method>) -> TrampolineKind {
        match method {
            Some(method) if method.is_static() => TrampolineKind::StaticMethod,
            _ => TrampolineKind::UnknownMethod,
        }
    }

    // Metadata arenas: append-only, addressed by typed ids.

    pub fn register_class(&self, mut class: Class) -> ClassId {
        let mut classes = self.classes.write();
        let id = ClassId(classes.len() as u32);
        class.set_id(id);
        classes.push(Arc::new(class));
        id
    }

    pub fn class(&self, id: ClassId) -> Arc<Class> {
        self.classes.read()[id.raw() as usize].clone()
    }

    pub fn register_method(&self, mut method: Method) -> MethodId {
        let mut methods = self.methods.write();
        let id = MethodId(methods.len() as u32);
        method.set_id(id);
        methods.push(Arc::new(method));
        id
    }

    pub fn method(&self, id: MethodId) -> Arc<Method> {
        self.methods.read()[id.raw() as usize].clone()
    }

    pub fn register_field(&self, mut field: Field) -> FieldId {
        let mut fields = self.fields.write();
        let id = FieldId(fields.len() as u32);
        field.set_id(id);
        fields.push(Arc::new(field));
        id
    }

    pub fn field(&self, id: FieldId) -> Arc<Field> {
        self.fields.read()[id.raw() as usize].clone()
    }

    pub fn register_descriptor_file(&self, file: DescriptorFile) -> FileId {
        let mut files = self.files.write();
        let id = FileId(files.len() as u32);
        files.push(Arc::new(file));
        id
    }

    pub fn descriptor_file(&self, id: FileId) -> Arc<DescriptorFile> {
        self.files.read()[id.raw() as usize].clone()
    }

    pub fn register_file_cache(&self, mut cache: FileCache) -> CacheId {
        let mut caches = self.caches.write();
        let id = CacheId(caches.len() as u32);
        cache.set_id(id);
        caches.push(Arc::new(cache));
        id
    }

    pub fn file_cache(&self, id: CacheId) -> Arc<FileCache> {
        self.caches.read()[id.raw() as usize].clone()
    }
}
