//! Bring-up binary: builds a runtime with an inline bootstrap resolver,
//! links a tiny synthetic descriptor file, and drives allocation and
//! dispatch end to end.

use dvm::class::{Class, ClassStatus};
use dvm::descfile::{ClassDefItem, DescriptorFile, MethodItem, ProtoItem, TypeItem};
use dvm::file_cache::FileCache;
use dvm::heap::SystemHeap;
use dvm::linker::{ClassLinker, InternTable};
use dvm::method::Method;
use dvm::monitor::ThinLockMonitor;
use dvm::object::{JValue, Object, HEADER_SIZE};
use dvm::string::StringRef;
use dvm::thread::{Thread, ThreadState};
use dvm::Runtime;
use dvm_types::{AccessFlags, ClassId, LoaderId, Primitive, NO_INDEX};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct BootLinker {
    classes: RwLock<HashMap<(String, LoaderId), ClassId>>,
    primitives: RwLock<HashMap<char, ClassId>>,
}

impl BootLinker {
    fn new() -> BootLinker {
        BootLinker {
            classes: RwLock::new(HashMap::new()),
            primitives: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, descriptor: &str, loader: LoaderId, class: ClassId) {
        self.classes
            .write()
            .insert((descriptor.to_string(), loader), class);
    }

    fn register_primitive(&self, descriptor_char: char, class: ClassId) {
        self.primitives.write().insert(descriptor_char, class);
    }
}

impl ClassLinker for BootLinker {
    fn find_class(
        &self,
        _rt: &Runtime,
        thread: &mut Thread,
        descriptor: &str,
        loader: LoaderId,
    ) -> Option<ClassId> {
        let found = self
            .classes
            .read()
            .get(&(descriptor.to_string(), loader))
            .copied();
        if found.is_none() {
            thread.throw_new_exception("Ljava/lang/NoClassDefFoundError;", descriptor.to_string());
        }
        found
    }

    fn find_primitive_class(&self, _rt: &Runtime, descriptor_char: char) -> Option<ClassId> {
        self.primitives.read().get(&descriptor_char).copied()
    }

    fn resolve_type(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        type_idx: u32,
        cache: dvm_types::CacheId,
        loader: LoaderId,
    ) -> Option<ClassId> {
        let cache = rt.file_cache(cache);
        if let Some(resolved) = cache.get_resolved_type(type_idx) {
            return Some(resolved);
        }
        let file = rt.descriptor_file(cache.file());
        let descriptor = file.type_descriptor(type_idx).clone();
        let resolved = if descriptor.len() == 1 {
            self.find_primitive_class(rt, descriptor.as_bytes()[0] as char)?
        } else {
            self.find_class(rt, thread, &descriptor, loader)?
        };
        cache.set_resolved_type(type_idx, resolved);
        Some(resolved)
    }
}

struct BootInternTable;

impl InternTable for BootInternTable {
    fn intern_weak(&self, _rt: &Runtime, s: Object) -> Object {
        s
    }
}

fn greet_stub(
    rt: &Runtime,
    method: &Method,
    _receiver: Option<Object>,
    _thread: &mut Thread,
    _args: &[JValue],
    result: &mut JValue,
) {
    tracing::info!(method = %method.pretty(rt), "hello from managed dispatch");
    *result = JValue { i: 42 };
}

fn main() {
    tracing_subscriber::fmt().init();

    let linker = Arc::new(BootLinker::new());
    let rt = Runtime::new(
        Box::new(SystemHeap::new()),
        Box::new(ThinLockMonitor),
        Box::new(BootInternTable),
    );
    rt.set_class_linker(linker.clone());
    let mut thread = Thread::new();

    // A minimal boot descriptor file: the bootstrap classes plus Greeter.
    let strings = vec![
        "Ljava/lang/Object;".to_string(),
        "Ljava/lang/String;".to_string(),
        "[C".to_string(),
        "C".to_string(),
        "LGreeter;".to_string(),
        "I".to_string(),
        "greet".to_string(),
    ];
    let file = DescriptorFile::new(
        "boot.df".to_string(),
        strings,
        vec![
            TypeItem { descriptor_idx: 0 },
            TypeItem { descriptor_idx: 1 },
            TypeItem { descriptor_idx: 2 },
            TypeItem { descriptor_idx: 3 },
            TypeItem { descriptor_idx: 4 },
            TypeItem { descriptor_idx: 5 },
        ],
        vec![ProtoItem {
            shorty_idx: 5,
            return_type_idx: 5,
            param_type_idxs: Box::new([]),
        }],
        vec![MethodItem {
            class_idx: 4,
            proto_idx: 0,
            name_idx: 6,
        }],
        vec![],
        vec![ClassDefItem {
            class_idx: 4,
            access_flags: AccessFlags::PUBLIC.bits(),
            superclass_idx: 0,
            interface_idxs: Box::new([]),
            source_file_idx: NO_INDEX,
        }],
        HashMap::new(),
    )
    .expect("boot descriptor file is well-formed");
    let file_id = rt.register_descriptor_file(file);
    let cache_id = rt.register_file_cache(FileCache::new(&rt, "boot.df", file_id, 7, 6, 1, 0));

    // Bootstrap classes, linked by hand the way the loader would.
    let object = rt.register_class(Class::new(
        "Ljava/lang/Object;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC,
    ));
    rt.class(object).set_object_size(HEADER_SIZE as u32);
    let char_prim = rt.register_class(Class::new_primitive(Primitive::Char));
    let char_array = rt.register_class(Class::new_array("[C", LoaderId::BOOT, char_prim));
    rt.class(char_array).set_super_class(object);
    let string = rt.register_class(Class::new(
        "Ljava/lang/String;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC | AccessFlags::FINAL,
    ));
    rt.class(string).set_super_class(object);
    rt.class(string)
        .set_object_size(dvm::string::STRING_OBJECT_SIZE as u32);

    let greeter = rt.register_class(Class::new("LGreeter;", LoaderId::BOOT, AccessFlags::PUBLIC));
    {
        let greeter_class = rt.class(greeter);
        greeter_class.set_super_class(object);
        greeter_class.set_object_size(HEADER_SIZE as u32);
        greeter_class.set_cache(cache_id);
    }

    let greet = rt.register_method(Method::new(
        greeter,
        "greet",
        "()I",
        "I",
        AccessFlags::PUBLIC | AccessFlags::NATIVE,
        5,
        NO_INDEX,
    ));
    rt.method(greet).set_cache(cache_id);
    rt.method(greet).set_invoke_stub(greet_stub);
    rt.method(greet).set_method_index(0);
    {
        let greeter_class = rt.class(greeter);
        greeter_class.set_virtual_methods(Box::new([greet]));
        greeter_class.set_vtable(Box::new([greet]));
    }

    for (descriptor, id) in [
        ("Ljava/lang/Object;", object),
        ("[C", char_array),
        ("Ljava/lang/String;", string),
        ("LGreeter;", greeter),
    ] {
        linker.register(descriptor, LoaderId::BOOT, id);
        rt.class(id).set_status(&rt, ClassStatus::Initialized);
    }
    linker.register_primitive('C', char_prim);
    rt.class(char_prim).set_status(&rt, ClassStatus::Initialized);

    rt.well_known.set_object(object);
    rt.well_known.set_string(string);
    rt.well_known.set_char_array(char_array);
    rt.start();

    let greeting = StringRef::from_modified_utf8(&rt, &mut thread, b"hello, world")
        .expect("string allocation");
    tracing::info!(
        hash = greeting.get_hash_code(),
        utf8 = %String::from_utf8_lossy(&greeting.to_modified_utf8()),
        "allocated boot string"
    );

    let receiver = rt
        .class(greeter)
        .alloc_object(&rt, &mut thread)
        .expect("greeter allocation");
    let mut result = JValue::zero();
    thread.with_state(ThreadState::Runnable, |thread| {
        rt.method(greet)
            .invoke(&rt, thread, Some(receiver), &[], &mut result);
    });
    tracing::info!(result = unsafe { result.i }, "greet returned");

    println!("{}", rt.class(greeter).dump(&rt));
}
