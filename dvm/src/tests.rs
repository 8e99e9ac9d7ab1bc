#![cfg(test)]

use crate::class::{Class, ClassStatus, InterfaceEntry, WALK_SUPER};
use crate::descfile::{
    CatchHandler, ClassDefItem, CodeItem, DescriptorFile, FieldItem, MethodItem, ProtoItem,
    TryItem, TypeItem,
};
use crate::descriptor;
use crate::field::Field;
use crate::file_cache::FileCache;
use crate::heap::{Heap, SystemHeap};
use crate::linker::{ClassLinker, InternTable};
use crate::method::{MappingEntry, Method};
use crate::monitor::ThinLockMonitor;
use crate::object::{ArrayRef, JValue, Object, ARRAY_DATA_OFFSET, HEADER_SIZE};
use crate::string::{StringRef, STRING_OBJECT_SIZE};
use crate::thread::{Thread, ThreadState};
use crate::throwable;
use crate::{Runtime, TrampolineKind};
use dvm_types::{
    AccessFlags, CacheId, ClassId, FieldId, FileId, LoaderId, MethodId, Primitive, NO_INDEX,
    NO_INDEX_16,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct TestLinker {
    classes: RwLock<HashMap<(String, LoaderId), ClassId>>,
    primitives: RwLock<HashMap<char, ClassId>>,
}

impl TestLinker {
    fn new() -> TestLinker {
        TestLinker {
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

impl ClassLinker for TestLinker {
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
        cache: CacheId,
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

struct TestInternTable {
    strings: Mutex<Vec<Object>>,
}

impl TestInternTable {
    fn new() -> TestInternTable {
        TestInternTable {
            strings: Mutex::new(Vec::new()),
        }
    }
}

impl InternTable for TestInternTable {
    fn intern_weak(&self, _rt: &Runtime, s: Object) -> Object {
        let mut strings = self.strings.lock();
        for &existing in strings.iter() {
            if StringRef(existing).equals(Some(StringRef(s))) {
                return existing;
            }
        }
        strings.push(s);
        s
    }
}

/// Heap wrapper that counts finalizer registrations.
struct CountingHeap {
    inner: SystemHeap,
    finalizers: Arc<AtomicUsize>,
}

impl Heap for CountingHeap {
    fn alloc(&self, class: ClassId, size: usize) -> Option<Object> {
        self.inner.alloc(class, size)
    }

    fn add_finalizer_reference(&self, thread: &mut Thread, obj: Object) {
        self.finalizers.fetch_add(1, Ordering::Relaxed);
        self.inner.add_finalizer_reference(thread, obj);
    }
}

// String ids of the boot descriptor file.
const S_RUN: u32 = 17;
const S_DOIT: u32 = 24;
// Type ids of the boot descriptor file.
const T_OBJECT: u32 = 0;
const T_STRING: u32 = 1;
const T_CHAR: u32 = 3;
const T_INT: u32 = 4;
const T_LONG: u32 = 5;
const T_BOOL: u32 = 7;
const T_A: u32 = 9;
const T_EXCEPTION: u32 = 14;
const T_IO_EXCEPTION: u32 = 15;
const T_RUNNER: u32 = 16;
const T_VOID: u32 = 17;
const T_GHOST: u32 = 18;
// Proto ids.
const P_VOID: u32 = 0;
const P_INT_INT: u32 = 2;
// The code item exercised by the catch-handler tests.
const CODE_OFFSET: u32 = 0x100;

struct Harness {
    rt: Arc<Runtime>,
    linker: Arc<TestLinker>,
    file: FileId,
    cache: CacheId,
    object: ClassId,
    string: ClassId,
    char_array: ClassId,
    int_array: ClassId,
    object_array: ClassId,
    string_array: ClassId,
    array_a: ClassId,
    int_prim: ClassId,
    a: ClassId,
    sub: ClassId,
    runner: ClassId,
    imp: ClassId,
    bare: ClassId,
    b_boot: ClassId,
    b_other: ClassId,
    rb: ClassId,
    error: ClassId,
    exception: ClassId,
    io_exception: ClassId,
    runtime_exception: ClassId,
    run_m: MethodId,
    a_run: MethodId,
    a_doit: MethodId,
    a_boot: MethodId,
    sub_run: MethodId,
    impl_run: MethodId,
    f_name: FieldId,
    f_balance: FieldId,
    f_count: FieldId,
    f_value: FieldId,
    f_static: FieldId,
    f_k: FieldId,
    f_ghost: FieldId,
}

fn boot_file() -> DescriptorFile {
    let strings = [
        "Ljava/lang/Object;",
        "Ljava/lang/String;",
        "[C",
        "C",
        "I",
        "J",
        "D",
        "Z",
        "[I",
        "Lp/q/A;",
        "Lp/q/B;",
        "Lp/q/r/B;",
        "Ljava/lang/Error;",
        "Ljava/lang/RuntimeException;",
        "Ljava/lang/Exception;",
        "Ljava/io/IOException;",
        "LRunner;",
        "run",
        "value",
        "count",
        "balance",
        "name",
        "V",
        "II",
        "doit",
        "K",
        "boot",
        "LGhost;",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect::<Vec<_>>();

    let type_items = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 22, 27]
        .iter()
        .map(|&descriptor_idx| TypeItem { descriptor_idx })
        .collect::<Vec<_>>();

    let proto_items = vec![
        ProtoItem {
            shorty_idx: 22,
            return_type_idx: T_VOID,
            param_type_idxs: Box::new([]),
        },
        ProtoItem {
            shorty_idx: 4,
            return_type_idx: T_INT,
            param_type_idxs: Box::new([]),
        },
        ProtoItem {
            shorty_idx: 23,
            return_type_idx: T_INT,
            param_type_idxs: Box::new([T_INT]),
        },
    ];

    let method_items = vec![
        MethodItem {
            class_idx: T_RUNNER,
            proto_idx: P_VOID,
            name_idx: S_RUN,
        },
        MethodItem {
            class_idx: T_A,
            proto_idx: P_INT_INT,
            name_idx: S_DOIT,
        },
        MethodItem {
            class_idx: T_A,
            proto_idx: P_VOID,
            name_idx: S_RUN,
        },
    ];

    let field_items = vec![
        FieldItem {
            class_idx: T_A,
            type_idx: T_INT,
            name_idx: 19,
        },
        FieldItem {
            class_idx: T_A,
            type_idx: T_STRING,
            name_idx: 21,
        },
        FieldItem {
            class_idx: T_A,
            type_idx: T_LONG,
            name_idx: 20,
        },
        FieldItem {
            class_idx: T_A,
            type_idx: T_BOOL,
            name_idx: 18,
        },
        FieldItem {
            class_idx: T_RUNNER,
            type_idx: T_INT,
            name_idx: 25,
        },
    ];

    let class_defs = vec![
        ClassDefItem {
            class_idx: T_A,
            access_flags: AccessFlags::PUBLIC.bits(),
            superclass_idx: T_OBJECT,
            interface_idxs: Box::new([T_RUNNER]),
            source_file_idx: NO_INDEX,
        },
        ClassDefItem {
            class_idx: T_RUNNER,
            access_flags: (AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT)
                .bits(),
            superclass_idx: T_OBJECT,
            interface_idxs: Box::new([]),
            source_file_idx: NO_INDEX,
        },
    ];

    let mut code_items = HashMap::new();
    code_items.insert(
        CODE_OFFSET,
        CodeItem {
            registers_size: 4,
            ins_size: 2,
            insns_count: 0x80,
            tries: Box::new([TryItem {
                start_addr: 0x00,
                insn_count: 0x30,
                handlers: Box::new([
                    CatchHandler {
                        type_idx: T_EXCEPTION as u16,
                        address: 0x70,
                    },
                    CatchHandler {
                        type_idx: T_IO_EXCEPTION as u16,
                        address: 0x50,
                    },
                    CatchHandler {
                        type_idx: NO_INDEX_16,
                        address: 0x40,
                    },
                ]),
            }]),
        },
    );

    DescriptorFile::new(
        "boot.df".to_string(),
        strings,
        type_items,
        proto_items,
        method_items,
        field_items,
        class_defs,
        code_items,
    )
    .expect("boot descriptor file is well-formed")
}

fn boot() -> Harness {
    boot_with_heap(Box::new(SystemHeap::new()))
}

fn boot_with_heap(heap: Box<dyn Heap>) -> Harness {
    let linker = Arc::new(TestLinker::new());
    let rt = Runtime::new(heap, Box::new(ThinLockMonitor), Box::new(TestInternTable::new()));
    rt.set_class_linker(linker.clone());
    let mut thread = Thread::new();

    let file = rt.register_descriptor_file(boot_file());
    let cache = rt.register_file_cache(FileCache::new(&rt, "boot.df", file, 28, 19, 3, 5));

    // Bootstrap classes, linked by hand the way the loader would.
    let object = rt.register_class(Class::new(
        "Ljava/lang/Object;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC,
    ));
    rt.class(object).set_object_size(HEADER_SIZE as u32);

    let char_prim = rt.register_class(Class::new_primitive(Primitive::Char));
    let int_prim = rt.register_class(Class::new_primitive(Primitive::Int));
    let long_prim = rt.register_class(Class::new_primitive(Primitive::Long));
    let bool_prim = rt.register_class(Class::new_primitive(Primitive::Bool));
    let void_prim = rt.register_class(Class::new_primitive(Primitive::Void));

    let string = rt.register_class(Class::new(
        "Ljava/lang/String;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC | AccessFlags::FINAL,
    ));
    rt.class(string).set_super_class(object);
    rt.class(string).set_object_size(STRING_OBJECT_SIZE as u32);

    let char_array = rt.register_class(Class::new_array("[C", LoaderId::BOOT, char_prim));
    let int_array = rt.register_class(Class::new_array("[I", LoaderId::BOOT, int_prim));
    let object_array = rt.register_class(Class::new_array(
        "[Ljava/lang/Object;",
        LoaderId::BOOT,
        object,
    ));
    let string_array = rt.register_class(Class::new_array(
        "[Ljava/lang/String;",
        LoaderId::BOOT,
        string,
    ));

    let exception = rt.register_class(Class::new(
        "Ljava/lang/Exception;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC,
    ));
    rt.class(exception).set_super_class(object);
    rt.class(exception).set_object_size(HEADER_SIZE as u32);
    let io_exception = rt.register_class(Class::new(
        "Ljava/io/IOException;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC,
    ));
    rt.class(io_exception).set_super_class(exception);
    rt.class(io_exception).set_object_size(HEADER_SIZE as u32);
    let runtime_exception = rt.register_class(Class::new(
        "Ljava/lang/RuntimeException;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC,
    ));
    rt.class(runtime_exception).set_super_class(exception);
    let error = rt.register_class(Class::new(
        "Ljava/lang/Error;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC,
    ));
    rt.class(error).set_super_class(object);

    // Seed the primitive and bootstrap types the way early linking does.
    {
        let cache = rt.file_cache(cache);
        cache.set_resolved_type(T_OBJECT, object);
        cache.set_resolved_type(T_STRING, string);
        cache.set_resolved_type(T_CHAR, char_prim);
        cache.set_resolved_type(T_INT, int_prim);
        cache.set_resolved_type(T_LONG, long_prim);
        cache.set_resolved_type(T_BOOL, bool_prim);
        cache.set_resolved_type(T_IO_EXCEPTION, io_exception);
    }

    // The Runner interface with its constant.
    let runner = rt.register_class(Class::new(
        "LRunner;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT,
    ));
    {
        let runner_class = rt.class(runner);
        runner_class.set_super_class(object);
        runner_class.set_cache(cache);
        runner_class.set_status(&rt, ClassStatus::Loaded);
    }
    let run_m = rt.register_method(Method::new(
        runner,
        "run",
        "()V",
        "V",
        AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
        T_VOID,
        NO_INDEX,
    ));
    rt.method(run_m).set_cache(cache);
    rt.method(run_m).set_method_index(0);
    let f_k = rt.register_field(Field::new(
        runner,
        "K",
        T_INT,
        AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
    ));
    rt.field(f_k).set_offset(&rt, HEADER_SIZE as u32);
    {
        let runner_class = rt.class(runner);
        runner_class.set_virtual_methods(Box::new([run_m]));
        runner_class.set_static_fields(Box::new([f_k]));
        runner_class.set_class_size(8);
    }

    // Lp/q/A; implements Runner, with a full field mix.
    let a = rt.register_class(Class::new("Lp/q/A;", LoaderId::BOOT, AccessFlags::PUBLIC));
    {
        let a_class = rt.class(a);
        a_class.set_super_class(object);
        a_class.set_cache(cache);
        a_class.set_status(&rt, ClassStatus::Loaded);
    }
    let f_name = rt.register_field(Field::new(a, "name", T_STRING, AccessFlags::PUBLIC));
    let f_balance = rt.register_field(Field::new(a, "balance", T_LONG, AccessFlags::PUBLIC));
    let f_count = rt.register_field(Field::new(a, "count", T_INT, AccessFlags::PUBLIC));
    let f_value = rt.register_field(Field::new(
        a,
        "value",
        T_BOOL,
        AccessFlags::PUBLIC | AccessFlags::VOLATILE,
    ));
    let f_static = rt.register_field(Field::new(
        a,
        "total",
        T_INT,
        AccessFlags::PUBLIC | AccessFlags::STATIC,
    ));
    let f_ghost = rt.register_field(Field::new(a, "ghost", T_GHOST, AccessFlags::PUBLIC));
    rt.field(f_name).set_offset(&rt, 8);
    rt.field(f_balance).set_offset(&rt, 16);
    rt.field(f_count).set_offset(&rt, 24);
    rt.field(f_value).set_offset(&rt, 28);
    rt.field(f_static).set_offset(&rt, HEADER_SIZE as u32);

    let a_run = rt.register_method(Method::new(
        a,
        "run",
        "()V",
        "V",
        AccessFlags::PUBLIC,
        T_VOID,
        NO_INDEX,
    ));
    let a_doit = rt.register_method(Method::new(
        a,
        "doit",
        "(I)I",
        "II",
        AccessFlags::PUBLIC,
        T_INT,
        CODE_OFFSET,
    ));
    let a_boot = rt.register_method(Method::new(
        a,
        "boot",
        "()V",
        "V",
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        T_VOID,
        NO_INDEX,
    ));
    for (m, index) in [(a_run, 0), (a_doit, 1), (a_boot, 0)] {
        rt.method(m).set_cache(cache);
        rt.method(m).set_method_index(index);
    }
    {
        let a_class = rt.class(a);
        a_class.set_instance_fields(Box::new([f_name, f_balance, f_count, f_value]));
        a_class.set_static_fields(Box::new([f_static]));
        a_class.set_num_reference_instance_fields(1);
        a_class.set_object_size(32);
        a_class.set_class_size(8);
        a_class.set_virtual_methods(Box::new([a_run, a_doit]));
        a_class.set_direct_methods(Box::new([a_boot]));
        a_class.set_vtable(Box::new([a_run, a_doit]));
        a_class.set_direct_interfaces(Box::new([runner]));
        a_class.set_iftable(Box::new([InterfaceEntry {
            interface: runner,
            method_array: Box::new([a_run]),
        }]));
    }

    // LSub; extends A, overriding run and adding one reference field.
    let sub = rt.register_class(Class::new("LSub;", LoaderId::BOOT, AccessFlags::PUBLIC));
    {
        let sub_class = rt.class(sub);
        sub_class.set_super_class(a);
        sub_class.set_cache(cache);
        sub_class.set_status(&rt, ClassStatus::Loaded);
    }
    let f_next = rt.register_field(Field::new(sub, "next", T_STRING, AccessFlags::PUBLIC));
    rt.field(f_next).set_offset(&rt, 32);
    let sub_run = rt.register_method(Method::new(
        sub,
        "run",
        "()V",
        "V",
        AccessFlags::PUBLIC,
        T_VOID,
        NO_INDEX,
    ));
    rt.method(sub_run).set_cache(cache);
    rt.method(sub_run).set_method_index(0);
    {
        let sub_class = rt.class(sub);
        sub_class.set_instance_fields(Box::new([f_next]));
        sub_class.set_num_reference_instance_fields(1);
        sub_class.set_object_size(40);
        sub_class.set_virtual_methods(Box::new([sub_run]));
        sub_class.set_vtable(Box::new([sub_run, a_doit]));
        sub_class.set_iftable(Box::new([InterfaceEntry {
            interface: runner,
            method_array: Box::new([sub_run]),
        }]));
    }

    // LImpl; implements Runner without any superclass vtable help.
    let imp = rt.register_class(Class::new("LImpl;", LoaderId::BOOT, AccessFlags::PUBLIC));
    let impl_run = rt.register_method(Method::new(
        imp,
        "run",
        "()V",
        "V",
        AccessFlags::PUBLIC,
        T_VOID,
        NO_INDEX,
    ));
    rt.method(impl_run).set_method_index(0);
    {
        let imp_class = rt.class(imp);
        imp_class.set_super_class(object);
        imp_class.set_object_size(HEADER_SIZE as u32);
        imp_class.set_virtual_methods(Box::new([impl_run]));
        imp_class.set_vtable(Box::new([impl_run]));
        imp_class.set_direct_interfaces(Box::new([runner]));
        imp_class.set_iftable(Box::new([InterfaceEntry {
            interface: runner,
            method_array: Box::new([impl_run]),
        }]));
    }

    // LBare; implements nothing.
    let bare = rt.register_class(Class::new("LBare;", LoaderId::BOOT, AccessFlags::PUBLIC));
    rt.class(bare).set_super_class(object);
    rt.class(bare).set_object_size(HEADER_SIZE as u32);

    // Package-rule fixtures.
    let b_boot = rt.register_class(Class::new("Lp/q/B;", LoaderId::BOOT, AccessFlags::PUBLIC));
    let b_other = rt.register_class(Class::new("Lp/q/B;", LoaderId(1), AccessFlags::PUBLIC));
    let rb = rt.register_class(Class::new("Lp/q/r/B;", LoaderId::BOOT, AccessFlags::PUBLIC));
    let array_a = rt.register_class(Class::new_array("[Lp/q/A;", LoaderId::BOOT, a));
    rt.class(array_a).set_super_class(object);
    for &array in &[char_array, int_array, object_array, string_array] {
        rt.class(array).set_super_class(object);
    }

    let ste = rt.register_class(Class::new(
        "Ljava/lang/StackTraceElement;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC | AccessFlags::FINAL,
    ));
    rt.class(ste).set_super_class(object);
    rt.class(ste)
        .set_object_size(throwable::STACK_TRACE_ELEMENT_SIZE as u32);

    for (descriptor, id) in [
        ("Ljava/lang/Object;", object),
        ("Ljava/lang/String;", string),
        ("[C", char_array),
        ("[I", int_array),
        ("[Ljava/lang/Object;", object_array),
        ("[Ljava/lang/String;", string_array),
        ("[Lp/q/A;", array_a),
        ("Lp/q/A;", a),
        ("LSub;", sub),
        ("LRunner;", runner),
        ("LImpl;", imp),
        ("LBare;", bare),
        ("Ljava/lang/Exception;", exception),
        ("Ljava/io/IOException;", io_exception),
        ("Ljava/lang/RuntimeException;", runtime_exception),
        ("Ljava/lang/Error;", error),
        ("Ljava/lang/StackTraceElement;", ste),
    ] {
        linker.register(descriptor, LoaderId::BOOT, id);
        rt.class(id).set_status(&rt, ClassStatus::Initialized);
    }
    for (ch, id) in [
        ('C', char_prim),
        ('I', int_prim),
        ('J', long_prim),
        ('Z', bool_prim),
        ('V', void_prim),
    ] {
        linker.register_primitive(ch, id);
        rt.class(id).set_status(&rt, ClassStatus::Initialized);
    }

    rt.well_known.set_object(object);
    rt.well_known.set_string(string);
    rt.well_known.set_char_array(char_array);
    rt.well_known.set_stack_trace_element(ste);

    rt.class(a)
        .alloc_static_storage(&rt, &mut thread)
        .expect("static storage for Lp/q/A;");

    rt.start();

    Harness {
        rt,
        linker,
        file,
        cache,
        object,
        string,
        char_array,
        int_array,
        object_array,
        string_array,
        array_a,
        int_prim,
        a,
        sub,
        runner,
        imp,
        bare,
        b_boot,
        b_other,
        rb,
        error,
        exception,
        io_exception,
        runtime_exception,
        run_m,
        a_run,
        a_doit,
        a_boot,
        sub_run,
        impl_run,
        f_name,
        f_balance,
        f_count,
        f_value,
        f_static,
        f_k,
        f_ghost,
    }
}

fn assert_pending(thread: &mut Thread, descriptor: &str) -> String {
    let exception = thread.take_exception().expect("expected a pending exception");
    assert_eq!(exception.descriptor, descriptor);
    exception.message
}

// --- descriptors and signatures ---

#[test]
fn descriptor_parsing() {
    assert_eq!(descriptor::descriptor_len("I"), Ok(1));
    assert_eq!(descriptor::descriptor_len("[[Lp/q/A;").unwrap(), 9);
    assert!(descriptor::descriptor_len("Lp/q/A").is_err());
    assert!(descriptor::descriptor_len("Q").is_err());

    let (params, ret) = descriptor::split_signature("(IJLjava/lang/String;[[ID)V").unwrap();
    assert_eq!(params, vec!["I", "J", "Ljava/lang/String;", "[[I", "D"]);
    assert_eq!(ret, "V");
    assert!(descriptor::split_signature("(V)V").is_err());
    assert!(descriptor::split_signature("IJ").is_err());

    assert_eq!(
        descriptor::shorty_for_signature("(IJLjava/lang/String;[[ID)V").unwrap(),
        "VIJLLD"
    );
    assert_eq!(descriptor::pretty_descriptor("Ljava/lang/Object;"), "java.lang.Object");
    assert_eq!(descriptor::pretty_descriptor("[I"), "int[]");
    assert_eq!(descriptor::pretty_descriptor("[[Lp/q/A;"), "p.q.A[][]");
}

#[test]
fn descfile_lookup_tables() {
    let h = boot();
    let file = h.rt.descriptor_file(h.file);
    assert_eq!(file.location(), "boot.df");
    assert_eq!(file.find_string_idx("doit"), Some(S_DOIT));
    assert_eq!(file.find_type_idx("Lp/q/A;"), Some(T_A));
    assert_eq!(file.find_type_idx("Lnope;"), None);
    assert_eq!(file.find_class_def_idx("Lp/q/A;"), Some(0));
    assert_eq!(file.find_class_def_idx("LRunner;"), Some(1));
    assert_eq!(&**file.type_descriptor(T_IO_EXCEPTION), "Ljava/io/IOException;");
    assert_eq!(&**file.shorty(P_INT_INT), "II");

    let (ret, params) = file.create_type_list("(I)I").unwrap();
    assert_eq!(ret, T_INT);
    assert_eq!(params, vec![T_INT]);
    assert_eq!(file.find_proto_idx(ret, &params), Some(P_INT_INT));
    assert_eq!(file.create_type_list("(Lmissing;)V"), None);

    let code = file.code_item(CODE_OFFSET).unwrap();
    assert_eq!(code.handlers_for_pc(0x10).len(), 3);
    assert!(code.handlers_for_pc(0x60).is_empty());
}

#[test]
fn descfile_validation() {
    let bad = DescriptorFile::new(
        "bad.df".to_string(),
        vec!["I".to_string()],
        vec![TypeItem { descriptor_idx: 3 }],
        vec![],
        vec![],
        vec![],
        vec![],
        HashMap::new(),
    );
    assert!(bad.is_err());

    let dup = DescriptorFile::new(
        "dup.df".to_string(),
        vec!["I".to_string()],
        vec![TypeItem { descriptor_idx: 0 }, TypeItem { descriptor_idx: 0 }],
        vec![],
        vec![],
        vec![],
        vec![],
        HashMap::new(),
    );
    assert!(dup.is_err());
}

// --- arrays ---

#[test]
fn array_alloc_and_bounds() {
    let h = boot();
    let mut thread = Thread::new();
    let array = ArrayRef::alloc_for_class(&h.rt, &mut thread, h.int_array, 3).unwrap();
    assert_eq!(array.len(), 3);
    assert_eq!(array.0.size_of(&h.rt), ARRAY_DATA_OFFSET + 3 * 4);

    assert!(array.set_prim(&mut thread, 0, 10i32));
    assert!(array.set_prim(&mut thread, 2, 30i32));
    assert_eq!(array.get_prim::<i32>(&mut thread, 0), Some(10));
    assert_eq!(array.get_prim::<i32>(&mut thread, 2), Some(30));

    assert_eq!(array.get_prim::<i32>(&mut thread, 5), None);
    let message = assert_pending(&mut thread, "Ljava/lang/ArrayIndexOutOfBoundsException;");
    assert_eq!(message, "length=3; index=5");
    assert!(!array.set_prim(&mut thread, -1, 0i32));
    assert_pending(&mut thread, "Ljava/lang/ArrayIndexOutOfBoundsException;");
}

#[test]
fn array_size_overflow_predicate() {
    assert!(!ArrayRef::size_overflows(3, 4));
    assert!(!ArrayRef::size_overflows(1 << 20, 8));
    // count * component_size wraps the word.
    assert!(ArrayRef::size_overflows(usize::MAX / 4, 8));
    assert!(ArrayRef::size_overflows(1 << (usize::BITS - 3), 8));
}

#[test]
fn array_alloc_overflow_throws() {
    let h = boot();
    let mut thread = Thread::new();
    let huge_component = 1usize << (usize::BITS - 2);
    let result = ArrayRef::alloc(&h.rt, &mut thread, h.int_array, 4, huge_component);
    assert!(result.is_none());
    let message = assert_pending(&mut thread, "Ljava/lang/OutOfMemoryError;");
    assert!(message.contains("exceeds the VM limit"), "{message}");
    assert!(message.contains("int[]"), "{message}");
}

#[test]
fn array_alloc_oom_propagates() {
    let h = boot_with_heap(Box::new(SystemHeap::with_limit(16 * 1024)));
    let mut thread = Thread::new();
    let result = ArrayRef::alloc_for_class(&h.rt, &mut thread, h.int_array, 1_000_000);
    assert!(result.is_none());
    assert_pending(&mut thread, "Ljava/lang/OutOfMemoryError;");
}

#[test]
fn array_store_checks() {
    let h = boot();
    let mut thread = Thread::new();
    let array = ArrayRef::alloc_for_class(&h.rt, &mut thread, h.string_array, 2).unwrap();

    let s = StringRef::from_modified_utf8(&h.rt, &mut thread, b"ok").unwrap();
    assert!(array.set_element(&h.rt, &mut thread, 0, s.0));
    assert_eq!(array.get_element(&mut thread, 0), Some(s.0));
    assert!(array.set_element(&h.rt, &mut thread, 1, Object::NULL));

    let a_obj = h.rt.class(h.a).alloc_object(&h.rt, &mut thread).unwrap();
    assert!(!array.set_element(&h.rt, &mut thread, 0, a_obj));
    let message = assert_pending(&mut thread, "Ljava/lang/ArrayStoreException;");
    assert!(message.contains("p.q.A"), "{message}");
    assert!(message.contains("java.lang.String[]"), "{message}");

    // Covariant stores are fine.
    let objects = ArrayRef::alloc_for_class(&h.rt, &mut thread, h.object_array, 1).unwrap();
    assert!(objects.set_element(&h.rt, &mut thread, 0, s.0));
}

// --- objects ---

#[test]
fn object_clone_copies_body() {
    let h = boot();
    let mut thread = Thread::new();
    let a_class = h.rt.class(h.a);
    let obj = a_class.alloc_object(&h.rt, &mut thread).unwrap();

    let count = h.rt.field(h.f_count);
    let balance = h.rt.field(h.f_balance);
    assert!(count.set_int(&h.rt, &mut thread, Some(obj), -7));
    assert!(balance.set_long(&h.rt, &mut thread, Some(obj), 1 << 40));

    obj.monitor_enter(&h.rt, &mut thread);
    let copy = obj.clone_object(&h.rt, &mut thread).unwrap();
    assert!(obj.monitor_exit(&h.rt, &mut thread));

    assert_ne!(copy, obj);
    assert_eq!(copy.class_id(), h.a);
    assert_eq!(count.get_int(&h.rt, &mut thread, Some(copy)), Some(-7));
    assert_eq!(balance.get_long(&h.rt, &mut thread, Some(copy)), Some(1 << 40));
    // The lock word is part of the header and must not be copied.
    assert_eq!(copy.lock_word(), 0);
}

#[test]
fn clone_registers_finalizers() {
    let finalizers = Arc::new(AtomicUsize::new(0));
    let h = boot_with_heap(Box::new(CountingHeap {
        inner: SystemHeap::new(),
        finalizers: finalizers.clone(),
    }));
    let mut thread = Thread::new();

    let fin = h.rt.register_class(Class::new(
        "LFin;",
        LoaderId::BOOT,
        AccessFlags::PUBLIC | AccessFlags::FINALIZABLE,
    ));
    rt_link_minimal(&h.rt, fin, h.object, 16);

    let obj = h.rt.class(fin).alloc_object(&h.rt, &mut thread).unwrap();
    assert_eq!(finalizers.load(Ordering::Relaxed), 0);
    obj.clone_object(&h.rt, &mut thread).unwrap();
    assert_eq!(finalizers.load(Ordering::Relaxed), 1);
}

fn rt_link_minimal(rt: &Runtime, class: ClassId, super_class: ClassId, object_size: u32) {
    let class = rt.class(class);
    class.set_super_class(super_class);
    class.set_object_size(object_size);
    class.set_status(rt, ClassStatus::Initialized);
}

#[test]
fn monitor_thin_lock() {
    let h = boot();
    let mut thread = Thread::new();
    let obj = h.rt.class(h.a).alloc_object(&h.rt, &mut thread).unwrap();

    assert_eq!(obj.thin_lock_id(&h.rt), 0);
    obj.monitor_enter(&h.rt, &mut thread);
    obj.monitor_enter(&h.rt, &mut thread);
    assert_eq!(obj.thin_lock_id(&h.rt), thread.id() & 0xFFFF);
    assert!(obj.monitor_exit(&h.rt, &mut thread));
    assert!(obj.monitor_exit(&h.rt, &mut thread));
    assert_eq!(obj.thin_lock_id(&h.rt), 0);

    let mut other = Thread::new();
    assert!(!obj.monitor_exit(&h.rt, &mut other));
}

#[test]
fn is_string_checks_the_distinguished_class() {
    let h = boot();
    let mut thread = Thread::new();
    let s = StringRef::from_modified_utf8(&h.rt, &mut thread, b"x").unwrap();
    assert!(s.0.is_string(&h.rt));
    let obj = h.rt.class(h.a).alloc_object(&h.rt, &mut thread).unwrap();
    assert!(!obj.is_string(&h.rt));
    assert!(obj.instance_of(&h.rt, h.object));
    assert!(!obj.instance_of(&h.rt, h.string));
}

// --- strings ---

#[test]
fn string_from_modified_utf8_matches_utf16() {
    let h = boot();
    let mut thread = Thread::new();
    // "héllo" in modified UTF-8.
    let from_utf8 =
        StringRef::from_modified_utf8(&h.rt, &mut thread, &[0x68, 0xc3, 0xa9, 0x6c, 0x6c, 0x6f])
            .unwrap();
    let units = [0x68u16, 0xe9, 0x6c, 0x6c, 0x6f];
    let from_utf16 = StringRef::from_utf16(&h.rt, &mut thread, &units, 0).unwrap();

    assert!(from_utf8.equals(Some(from_utf16)));
    assert!(from_utf16.equals(Some(from_utf8)));
    assert!(from_utf8.equals_utf16(&units));
    assert_eq!(from_utf8.get_hash_code(), from_utf16.get_hash_code());
}

#[test]
fn string_hash_is_stable_and_polynomial() {
    let h = boot();
    let mut thread = Thread::new();
    let s = StringRef::from_modified_utf8(&h.rt, &mut thread, b"hello").unwrap();
    let first = s.get_hash_code();
    assert_eq!(first, s.get_hash_code());
    // 31-polynomial over the code units.
    assert_eq!(first, 99162322);

    let empty = StringRef::from_modified_utf8(&h.rt, &mut thread, b"").unwrap();
    assert_eq!(empty.get_hash_code(), 0);

    let precomputed = StringRef::from_utf16(&h.rt, &mut thread, &[0x68], 0x68).unwrap();
    assert_eq!(precomputed.get_hash_code(), 0x68);
}

#[test]
fn string_modified_utf8_round_trips() {
    let h = boot();
    let mut thread = Thread::new();

    for case in [&b"plain"[..], &[0x68u8, 0xc3, 0xa9, 0x6c, 0x6c, 0x6f][..]] {
        let s = StringRef::from_modified_utf8(&h.rt, &mut thread, case).unwrap();
        assert_eq!(s.to_modified_utf8(), case);
        assert!(s.equals_modified_utf8(case));
    }

    // U+0000 uses the overlong two-byte form.
    let nul = StringRef::from_utf16(&h.rt, &mut thread, &[0], 0).unwrap();
    assert_eq!(nul.to_modified_utf8(), vec![0xC0, 0x80]);
    let nul_back = StringRef::from_modified_utf8(&h.rt, &mut thread, &[0xC0, 0x80]).unwrap();
    assert!(nul_back.equals(Some(nul)));

    // Supplementary characters travel as surrogate pairs.
    let deseret = StringRef::from_utf16(&h.rt, &mut thread, &[0xD801, 0xDC00], 0).unwrap();
    let bytes = deseret.to_modified_utf8();
    assert_eq!(bytes.len(), 6);
    let back = StringRef::from_modified_utf8(&h.rt, &mut thread, &bytes).unwrap();
    assert!(back.equals(Some(deseret)));
}

#[test]
fn string_char_at_bounds() {
    let h = boot();
    let mut thread = Thread::new();
    let s = StringRef::from_modified_utf8(&h.rt, &mut thread, b"abc").unwrap();
    assert_eq!(s.char_at(&mut thread, 1), Some(b'b' as u16));
    assert_eq!(s.char_at(&mut thread, 3), None);
    let message = assert_pending(&mut thread, "Ljava/lang/StringIndexOutOfBoundsException;");
    assert_eq!(message, "length=3; index=3");
}

#[test]
fn string_equality_family() {
    let h = boot();
    let mut thread = Thread::new();
    let s = StringRef::from_modified_utf8(&h.rt, &mut thread, b"abc").unwrap();
    assert!(s.equals(Some(s)));
    assert!(!s.equals(None));
    let t = StringRef::from_modified_utf8(&h.rt, &mut thread, b"abd").unwrap();
    assert!(!s.equals(Some(t)));
    let longer = StringRef::from_modified_utf8(&h.rt, &mut thread, b"abcd").unwrap();
    assert!(!s.equals(Some(longer)));
    assert!(!s.equals_utf16(&[0x61]));
    assert!(!s.equals_modified_utf8(b"abd"));
}

#[test]
fn string_interning_is_idempotent() {
    let h = boot();
    let mut thread = Thread::new();
    let s1 = StringRef::from_modified_utf8(&h.rt, &mut thread, b"pool").unwrap();
    let s2 = StringRef::from_modified_utf8(&h.rt, &mut thread, b"pool").unwrap();
    assert_ne!(s1.0, s2.0);
    let canonical = s1.intern(&h.rt);
    assert_eq!(s2.intern(&h.rt), canonical);
}

// --- fields ---

#[test]
fn field_typed_accessors() {
    let h = boot();
    let mut thread = Thread::new();
    let obj = h.rt.class(h.a).alloc_object(&h.rt, &mut thread).unwrap();

    let count = h.rt.field(h.f_count);
    assert!(count.set_int(&h.rt, &mut thread, Some(obj), 123));
    assert_eq!(count.get_int(&h.rt, &mut thread, Some(obj)), Some(123));

    let balance = h.rt.field(h.f_balance);
    assert!(balance.set_long(&h.rt, &mut thread, Some(obj), -1));
    assert_eq!(balance.get_long(&h.rt, &mut thread, Some(obj)), Some(-1));

    let value = h.rt.field(h.f_value);
    assert!(value.is_volatile());
    assert!(value.set_boolean(&h.rt, &mut thread, Some(obj), true));
    assert_eq!(value.get_boolean(&h.rt, &mut thread, Some(obj)), Some(true));

    let name = h.rt.field(h.f_name);
    let s = StringRef::from_modified_utf8(&h.rt, &mut thread, b"abc").unwrap();
    assert!(name.set_object(&h.rt, &mut thread, Some(obj), s.0));
    assert_eq!(name.get_object(&h.rt, &mut thread, Some(obj)), Some(s.0));
}

#[test]
fn field_static_discipline() {
    let h = boot();
    let mut thread = Thread::new();
    let obj = h.rt.class(h.a).alloc_object(&h.rt, &mut thread).unwrap();
    let total = h.rt.field(h.f_static);

    // Static access requires a null target.
    assert_eq!(total.get_int(&h.rt, &mut thread, Some(obj)), None);
    assert_pending(&mut thread, "Ljava/lang/IllegalArgumentException;");

    assert!(total.set_int(&h.rt, &mut thread, None, 77));
    assert_eq!(total.get_int(&h.rt, &mut thread, None), Some(77));

    // And instance access requires an instance.
    let count = h.rt.field(h.f_count);
    assert_eq!(count.get_int(&h.rt, &mut thread, None), None);
    assert_pending(&mut thread, "Ljava/lang/IllegalArgumentException;");
}

#[test]
fn field_type_resolution_memoizes() {
    let h = boot();
    let mut thread = Thread::new();
    let name = h.rt.field(h.f_name);
    assert_eq!(name.get_type_during_linking(&h.rt), Some(h.string));
    assert!(!name.is_primitive_type(&h.rt));
    assert_eq!(&*name.get_type_descriptor(&h.rt), "Ljava/lang/String;");

    let count = h.rt.field(h.f_count);
    assert_eq!(count.get_primitive_type(&h.rt), Primitive::Int);
    assert_eq!(count.primitive_size(&h.rt), 4);

    assert_eq!(name.resolved_type(), None);
    name.init_reflective_state(&h.rt, &mut thread);
    assert_eq!(name.resolved_type(), Some(h.string));
    assert_eq!(name.get_type(&h.rt, &mut thread), Some(h.string));
}

#[test]
fn field_type_resolution_is_retriable() {
    let h = boot();
    let mut thread = Thread::new();
    let ghost = h.rt.field(h.f_ghost);

    assert_eq!(ghost.get_type(&h.rt, &mut thread), None);
    assert_pending(&mut thread, "Ljava/lang/NoClassDefFoundError;");
    assert_eq!(ghost.resolved_type(), None);

    // Once the class appears, the same field resolves.
    let ghost_class = h
        .rt
        .register_class(Class::new("LGhost;", LoaderId::BOOT, AccessFlags::PUBLIC));
    rt_link_minimal(&h.rt, ghost_class, h.object, HEADER_SIZE as u32);
    h.linker.register("LGhost;", LoaderId::BOOT, ghost_class);

    ghost.init_reflective_state(&h.rt, &mut thread);
    assert_eq!(ghost.resolved_type(), Some(ghost_class));
}

#[test]
#[should_panic]
fn field_wide_offsets_must_be_aligned() {
    let h = boot();
    h.rt.field(h.f_balance).set_offset(&h.rt, 12);
}

// --- methods ---

#[test]
fn method_shorty_helpers() {
    let h = boot();
    let mix = h.rt.register_method(Method::new(
        h.a,
        "mix",
        "(IJLjava/lang/String;D)V",
        "VIJLD",
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        T_VOID,
        NO_INDEX,
    ));
    let mix = h.rt.method(mix);

    assert_eq!(Method::num_arg_registers("VIJLD"), 6);
    assert_eq!(mix.num_args(), 4);
    assert_eq!(mix.num_reference_args(), 1);
    assert_eq!(mix.num_long_or_double_args(), 2);
    assert!(mix.is_param_a_reference(2));
    assert!(!mix.is_param_a_reference(0));
    assert!(mix.is_param_a_long_or_double(1));
    assert!(mix.is_param_a_long_or_double(3));
    assert_eq!(mix.param_size(0), 4);
    assert_eq!(mix.param_size(1), 8);
    assert_eq!(mix.param_size(2), std::mem::size_of::<usize>());
    assert_eq!(mix.return_size(), 0);

    let doit = h.rt.method(h.a_doit);
    assert_eq!(doit.num_args(), 2);
    assert!(doit.is_param_a_reference(0)); // the receiver
    assert!(!doit.is_param_a_reference(1));
    assert_eq!(doit.param_size(0), std::mem::size_of::<usize>());
    assert_eq!(doit.return_size(), 4);
    assert!(!doit.is_class_initializer());
    assert!(h.rt.method(h.a_boot).is_direct());
    assert!(!doit.is_direct());
}

#[test]
fn overridden_method_through_super_vtable() {
    let h = boot();
    let sub_run = h.rt.method(h.sub_run);
    assert_eq!(sub_run.find_overridden_method(&h.rt), Some(h.a_run));
    // Statics never override.
    assert_eq!(h.rt.method(h.a_boot).find_overridden_method(&h.rt), None);
}

#[test]
fn overridden_method_through_interfaces() {
    let h = boot();
    let impl_run = h.rt.method(h.impl_run);
    assert_eq!(impl_run.find_overridden_method(&h.rt), Some(h.run_m));
}

#[test]
fn pc_mapping_round_trips() {
    let h = boot();
    let doit = h.rt.method(h.a_doit);
    doit.set_code(0x4000);
    doit.set_mapping_table(Box::new([
        MappingEntry {
            native_offset: 0,
            bytecode_offset: 0,
        },
        MappingEntry {
            native_offset: 8,
            bytecode_offset: 0x10,
        },
        MappingEntry {
            native_offset: 20,
            bytecode_offset: 0x2a,
        },
    ]));

    for (native, bytecode) in [(0u32, 0u32), (8, 0x10), (20, 0x2a)] {
        assert_eq!(doit.to_bytecode_pc(0x4000 + native as usize), bytecode);
        assert_eq!(doit.to_native_pc(bytecode), 0x4000 + native as usize);
    }
    // Between entries the largest mapped offset below wins.
    assert_eq!(doit.to_bytecode_pc(0x4000 + 12), 0x10);

    // Methods without a table are native-only; bytecode pc 0 maps to 0.
    let native = h.rt.register_method(Method::new(
        h.a,
        "nat",
        "()V",
        "V",
        AccessFlags::PUBLIC | AccessFlags::NATIVE,
        T_VOID,
        NO_INDEX,
    ));
    let native = h.rt.method(native);
    assert_eq!(native.to_bytecode_pc(0x9999), NO_INDEX);
    assert_eq!(native.to_native_pc(0), 0);
}

#[test]
#[should_panic]
fn pc_mapping_missing_entry_is_fatal() {
    let h = boot();
    let doit = h.rt.method(h.a_doit);
    doit.set_code(0x4000);
    doit.set_mapping_table(Box::new([MappingEntry {
        native_offset: 0,
        bytecode_offset: 0,
    }]));
    doit.to_native_pc(0x99);
}

#[test]
fn catch_handler_search() {
    let h = boot();
    let doit = h.rt.method(h.a_doit);

    // A typed match beats the catch-all; the unresolved Exception entry is
    // skipped.
    assert_eq!(doit.find_catch_block(&h.rt, h.io_exception, 0x10), 0x50);
    // Everything else lands in the catch-all.
    assert_eq!(doit.find_catch_block(&h.rt, h.error, 0x10), 0x40);
    // No try covers this pc: propagate.
    assert_eq!(doit.find_catch_block(&h.rt, h.error, 0x60), NO_INDEX);
}

fn answer_stub(
    _rt: &Runtime,
    _method: &Method,
    _receiver: Option<Object>,
    thread: &mut Thread,
    _args: &[JValue],
    result: &mut JValue,
) {
    assert_eq!(thread.native_to_managed_depth(), 1);
    *result = JValue { i: 42 };
}

#[test]
fn invoke_through_stub_balances_records() {
    let h = boot();
    let mut thread = Thread::new();
    let nat = h.rt.register_method(Method::new(
        h.a,
        "answer",
        "()I",
        "I",
        AccessFlags::PUBLIC | AccessFlags::NATIVE,
        T_INT,
        NO_INDEX,
    ));
    let nat = h.rt.method(nat);
    nat.set_invoke_stub(answer_stub);

    let receiver = h.rt.class(h.a).alloc_object(&h.rt, &mut thread).unwrap();
    let mut result = JValue::zero();
    assert_eq!(thread.native_to_managed_depth(), 0);
    thread.with_state(ThreadState::Runnable, |thread| {
        nat.invoke(&h.rt, thread, Some(receiver), &[], &mut result);
    });
    assert_eq!(unsafe { result.i }, 42);
    assert_eq!(thread.native_to_managed_depth(), 0);
}

#[test]
fn invoke_without_code_zeroes_the_result() {
    let h = boot();
    let mut thread = Thread::new();
    let run = h.rt.method(h.a_run);
    let receiver = h.rt.class(h.a).alloc_object(&h.rt, &mut thread).unwrap();
    let mut result = JValue { j: -1 };
    thread.with_state(ThreadState::Runnable, |thread| {
        run.invoke(&h.rt, thread, Some(receiver), &[], &mut result);
    });
    assert_eq!(unsafe { result.j }, 0);
    assert_eq!(thread.native_to_managed_depth(), 0);
}

#[test]
#[should_panic]
fn invoke_requires_a_runnable_thread() {
    let h = boot();
    let mut thread = Thread::new();
    let mut result = JValue::zero();
    h.rt.method(h.a_run)
        .invoke(&h.rt, &mut thread, None, &[], &mut result);
}

#[test]
fn native_registration_round_trips() {
    let h = boot();
    let nat = h.rt.register_method(Method::new(
        h.a,
        "nat",
        "()V",
        "V",
        AccessFlags::PUBLIC | AccessFlags::NATIVE,
        T_VOID,
        NO_INDEX,
    ));
    let nat = h.rt.method(nat);

    assert!(!nat.is_registered(&h.rt));
    nat.register_native(0xdead0);
    assert!(nat.is_registered(&h.rt));
    nat.unregister_native(&h.rt);
    assert!(!nat.is_registered(&h.rt));
    assert_eq!(nat.native_method(), h.rt.jni_stub());
}

#[test]
fn method_reflective_state_installs_both_halves() {
    let h = boot();
    let mut thread = Thread::new();
    let doit = h.rt.method(h.a_doit);

    assert!(doit.reflection().is_none());
    doit.init_reflective_state(&h.rt, &mut thread);
    let reflection = doit.reflection().expect("reflective state installed");
    assert_eq!(&*reflection.parameter_types, &[h.int_prim][..]);
    assert_eq!(reflection.return_type, h.int_prim);
    assert!(thread.pending_exception().is_none());
}

#[test]
fn method_reflective_state_retries_after_failure() {
    let h = boot();
    let mut thread = Thread::new();
    let load = h.rt.register_method(Method::new(
        h.a,
        "load",
        "(LGhost2;)V",
        "VL",
        AccessFlags::PUBLIC,
        T_VOID,
        NO_INDEX,
    ));
    let load = h.rt.method(load);

    load.init_reflective_state(&h.rt, &mut thread);
    assert!(load.reflection().is_none());
    assert_pending(&mut thread, "Ljava/lang/NoClassDefFoundError;");

    let ghost = h
        .rt
        .register_class(Class::new("LGhost2;", LoaderId::BOOT, AccessFlags::PUBLIC));
    rt_link_minimal(&h.rt, ghost, h.object, HEADER_SIZE as u32);
    h.linker.register("LGhost2;", LoaderId::BOOT, ghost);

    load.init_reflective_state(&h.rt, &mut thread);
    let reflection = load.reflection().expect("second attempt succeeds");
    assert_eq!(&*reflection.parameter_types, &[ghost][..]);
}

#[test]
fn method_return_type_uses_the_cache() {
    let h = boot();
    let mut thread = Thread::new();
    let doit = h.rt.method(h.a_doit);
    assert_eq!(&*doit.get_return_type_descriptor(&h.rt), "I");
    assert_eq!(doit.get_return_type(&h.rt, &mut thread), Some(h.int_prim));
}

#[test]
fn method_index_recomputation() {
    let h = boot();
    assert_eq!(h.rt.method(h.run_m).file_method_index(&h.rt), 0);
    assert_eq!(h.rt.method(h.a_doit).file_method_index(&h.rt), 1);
    assert_eq!(h.rt.method(h.a_run).file_method_index(&h.rt), 2);
}

// --- classes ---

#[test]
fn class_status_is_monotone_after_start() {
    let h = boot();
    let a = h.rt.class(h.a);
    assert_eq!(a.status(), ClassStatus::Initialized);
    assert!(a.is_initialized() && a.is_resolved() && a.is_loaded());
    // The terminal escape is always allowed.
    a.set_status(&h.rt, ClassStatus::Error);
    assert!(a.is_erroneous());
    assert_eq!(format!("{}", ClassStatus::Initializing), "Initializing");
}

#[test]
#[should_panic(expected = "illegal status transition")]
fn class_status_regression_panics() {
    let h = boot();
    h.rt.class(h.a).set_status(&h.rt, ClassStatus::Loaded);
}

#[test]
fn assignability_rules() {
    let h = boot();
    let rt = &h.rt;

    // Reflexivity.
    for id in [h.object, h.a, h.sub, h.int_array, h.runner] {
        assert!(rt.class(id).is_assignable_from(rt, id));
    }
    // Hierarchy and transitivity.
    assert!(rt.class(h.a).is_assignable_from(rt, h.sub));
    assert!(rt.class(h.object).is_assignable_from(rt, h.a));
    assert!(rt.class(h.object).is_assignable_from(rt, h.sub));
    assert!(!rt.class(h.sub).is_assignable_from(rt, h.a));
    // Interfaces go through the iftable.
    assert!(rt.class(h.runner).is_assignable_from(rt, h.a));
    assert!(rt.class(h.runner).is_assignable_from(rt, h.imp));
    assert!(!rt.class(h.runner).is_assignable_from(rt, h.bare));
    // Arrays.
    assert!(rt.class(h.object).is_assignable_from(rt, h.int_array));
    assert!(rt.class(h.object_array).is_assignable_from(rt, h.string_array));
    assert!(!rt.class(h.string_array).is_assignable_from(rt, h.object_array));
    assert!(!rt.class(h.int_array).is_assignable_from(rt, h.char_array));
    assert!(!rt.class(h.object_array).is_assignable_from(rt, h.int_array));
    assert!(!rt.class(h.a).is_assignable_from(rt, h.int_array));
    // Strict subclass walk.
    assert!(rt.class(h.sub).is_sub_class(rt, h.a));
    assert!(!rt.class(h.a).is_sub_class(rt, h.sub));
}

#[test]
fn package_rules() {
    let h = boot();
    let rt = &h.rt;

    assert!(rt.class(h.a).is_in_same_package(rt, h.b_boot));
    assert!(rt.class(h.b_boot).is_in_same_package(rt, h.a));
    assert!(!rt.class(h.a).is_in_same_package(rt, h.rb));
    assert!(!rt.class(h.rb).is_in_same_package(rt, h.a));
    // Same descriptor, different loader.
    assert!(!rt.class(h.a).is_in_same_package(rt, h.b_other));
    // Arrays compare by element class.
    assert!(rt.class(h.array_a).is_in_same_package(rt, h.b_boot));
    // Default-package classes.
    assert!(Class::descriptors_in_same_package("LMain;", "LOther;"));
    assert!(!Class::descriptors_in_same_package("LMain;", "Lp/Other;"));
}

#[test]
fn interface_dispatch_through_iftable() {
    let h = boot();
    let mut thread = Thread::new();
    let run_m = h.rt.method(h.run_m);

    assert_eq!(
        h.rt.class(h.a)
            .find_virtual_method_for_interface(&h.rt, &mut thread, &run_m, true),
        Some(h.a_run)
    );
    assert_eq!(
        h.rt.class(h.sub)
            .find_virtual_method_for_interface(&h.rt, &mut thread, &run_m, true),
        Some(h.sub_run)
    );

    // A class that never declared the interface.
    assert_eq!(
        h.rt.class(h.bare)
            .find_virtual_method_for_interface(&h.rt, &mut thread, &run_m, true),
        None
    );
    let message = assert_pending(&mut thread, "Ljava/lang/IncompatibleClassChangeError;");
    assert!(message.contains("Bare"), "{message}");
    assert!(message.contains("Runner"), "{message}");

    // Without can_throw the miss stays silent.
    assert_eq!(
        h.rt.class(h.bare)
            .find_virtual_method_for_interface(&h.rt, &mut thread, &run_m, false),
        None
    );
    assert!(thread.pending_exception().is_none());
}

#[test]
fn method_lookup_families() {
    let h = boot();
    let rt = &h.rt;

    assert_eq!(
        rt.class(h.a).find_declared_virtual_method(rt, "run", "()V"),
        Some(h.a_run)
    );
    assert_eq!(
        rt.class(h.sub).find_declared_virtual_method(rt, "doit", "(I)I"),
        None
    );
    assert_eq!(
        rt.class(h.sub).find_virtual_method(rt, "doit", "(I)I"),
        Some(h.a_doit)
    );
    assert_eq!(
        rt.class(h.sub).find_direct_method(rt, "boot", "()V"),
        Some(h.a_boot)
    );
    assert_eq!(rt.class(h.a).find_declared_direct_method(rt, "run", "()V"), None);
    assert_eq!(
        rt.class(h.runner).find_interface_method(rt, "run", "()V"),
        Some(h.run_m)
    );
    assert_eq!(
        rt.class(h.a).find_interface_method(rt, "run", "()V"),
        Some(h.a_run)
    );
}

#[test]
fn field_lookup_families() {
    let h = boot();
    let rt = &h.rt;

    assert_eq!(
        rt.class(h.a)
            .find_declared_instance_field(rt, "count", "I"),
        Some(h.f_count)
    );
    assert_eq!(
        rt.class(h.sub).find_instance_field(rt, "count", "I"),
        Some(h.f_count)
    );
    assert_eq!(
        rt.class(h.sub)
            .find_instance_field(rt, "name", "Ljava/lang/String;"),
        Some(h.f_name)
    );
    assert_eq!(rt.class(h.sub).find_declared_instance_field(rt, "count", "I"), None);

    assert_eq!(
        rt.class(h.a).find_declared_static_field(rt, "total", "I"),
        Some(h.f_static)
    );
    // Interface constants are reachable through every implementor level.
    assert_eq!(
        rt.class(h.sub).find_static_field(rt, "K", "I"),
        Some(h.f_k)
    );
    assert_eq!(rt.class(h.sub).find_static_field(rt, "missing", "I"), None);
}

#[test]
fn reference_bitmaps_validate_popcounts() {
    let h = boot();
    let a = h.rt.class(h.a);
    // One reference field at word 1.
    a.set_reference_instance_offsets(&h.rt, 0b10);
    assert_eq!(a.reference_instance_offsets(), 0b10);
    a.set_reference_static_offsets(0);

    // Sub adds one more reference word on top of A's.
    let sub = h.rt.class(h.sub);
    sub.set_reference_instance_offsets(&h.rt, 0b110);
    assert_eq!(sub.reference_instance_offsets(), 0b110);

    // The sentinel always passes.
    sub.set_reference_instance_offsets(&h.rt, WALK_SUPER);
    assert_eq!(sub.reference_instance_offsets(), WALK_SUPER);
}

#[test]
#[should_panic]
fn reference_bitmap_mismatch_panics() {
    let h = boot();
    h.rt.class(h.a).set_reference_instance_offsets(&h.rt, 0b1110);
}

#[test]
#[should_panic]
fn alloc_object_rejects_interfaces() {
    let h = boot();
    let mut thread = Thread::new();
    h.rt.class(h.runner).alloc_object(&h.rt, &mut thread);
}

#[test]
fn class_dump_is_readable() {
    let h = boot();
    let dump = h.rt.class(h.a).dump(&h.rt);
    assert!(dump.contains("Lp/q/A;"), "{dump}");
    assert!(dump.contains("java.lang.Object"), "{dump}");
    assert!(dump.contains("doit"), "{dump}");
    assert!(dump.contains("Runner"), "{dump}");
}

// --- file caches ---

#[test]
fn cache_entries_are_write_once() {
    let h = boot();
    let mut thread = Thread::new();
    let cache = h.rt.file_cache(h.cache);

    // Types: the boot seed wins over later stores.
    cache.set_resolved_type(T_INT, h.object);
    assert_eq!(cache.get_resolved_type(T_INT), Some(h.int_prim));

    assert_eq!(cache.get_resolved_method(0), None);
    cache.set_resolved_method(0, h.run_m);
    cache.set_resolved_method(0, h.a_doit);
    assert_eq!(cache.get_resolved_method(0), Some(h.run_m));

    cache.set_resolved_field(0, h.f_count);
    cache.set_resolved_field(0, h.f_name);
    assert_eq!(cache.get_resolved_field(0), Some(h.f_count));

    let s1 = StringRef::from_modified_utf8(&h.rt, &mut thread, b"one").unwrap();
    let s2 = StringRef::from_modified_utf8(&h.rt, &mut thread, b"two").unwrap();
    cache.set_resolved_string(5, s1.0);
    cache.set_resolved_string(5, s2.0);
    assert_eq!(cache.get_resolved_string(5), Some(s1.0));

    assert_eq!(cache.get_initialized_static_storage(T_A), None);
    cache.set_initialized_static_storage(T_A, h.a);
    assert_eq!(cache.get_initialized_static_storage(T_A), Some(h.a));
}

#[test]
fn fresh_caches_are_seeded_with_the_trampoline() {
    let h = boot();
    // The runtime is started, so a new cache vectors every direct-call slot
    // into the resolution trampoline.
    let file = h.rt.register_descriptor_file(
        DescriptorFile::new(
            "late.df".to_string(),
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            HashMap::new(),
        )
        .unwrap(),
    );
    let cache = FileCache::new(&h.rt, "late.df", file, 0, 0, 3, 0);
    let trampoline = h.rt.resolution_stub(TrampolineKind::UnknownMethod);

    let cadm = cache.code_and_direct_methods();
    for method_idx in 0..3 {
        assert_eq!(cadm.resolved_code(method_idx), trampoline);
        assert_eq!(cadm.resolved_method(method_idx), None);
    }

    // Publishing a resolved direct method replaces both slots.
    let boot_m = h.rt.method(h.a_boot);
    boot_m.set_code(0x7700);
    cadm.set_resolved_direct_method(&h.rt, 1, h.a_boot);
    assert_eq!(cadm.resolved_code(1), 0x7700);
    assert_eq!(cadm.resolved_method(1), Some(h.a_boot));
    assert_eq!(cadm.resolved_code(0), trampoline);
}

#[test]
#[should_panic]
fn resolved_direct_method_must_be_direct() {
    let h = boot();
    let cache = h.rt.file_cache(h.cache);
    h.rt.method(h.a_run).set_code(0x7700);
    cache
        .code_and_direct_methods()
        .set_resolved_direct_method(&h.rt, 2, h.a_run);
}

// --- throwables and stack traces ---

#[test]
fn checked_exception_classification() {
    let h = boot();
    let mut thread = Thread::new();
    assert!(throwable::is_checked_exception(&h.rt, &mut thread, h.io_exception));
    assert!(throwable::is_checked_exception(&h.rt, &mut thread, h.exception));
    assert!(!throwable::is_checked_exception(&h.rt, &mut thread, h.error));
    assert!(!throwable::is_checked_exception(
        &h.rt,
        &mut thread,
        h.runtime_exception
    ));
}

#[test]
fn stack_trace_materialization() {
    let h = boot();
    let mut thread = Thread::new();

    let class_name = StringRef::from_modified_utf8(&h.rt, &mut thread, b"p.q.A").unwrap();
    let method_name = StringRef::from_modified_utf8(&h.rt, &mut thread, b"doit").unwrap();
    let file_name = StringRef::from_modified_utf8(&h.rt, &mut thread, b"A.java").unwrap();
    let element = throwable::alloc_stack_trace_element(
        &h.rt,
        &mut thread,
        class_name.0,
        method_name.0,
        file_name.0,
        17,
    )
    .unwrap();

    assert_eq!(
        element.get_field_ref(throwable::DECLARING_CLASS_OFFSET, false),
        class_name.0
    );
    assert_eq!(
        element.get_field_ref(throwable::METHOD_NAME_OFFSET, false),
        method_name.0
    );
    assert_eq!(
        element.get_field_ref(throwable::FILE_NAME_OFFSET, false),
        file_name.0
    );
    assert_eq!(
        element.get_field32(throwable::LINE_NUMBER_OFFSET, false) as i32,
        17
    );

    let dump = throwable::dump_stack(&h.rt, &[h.a_doit, h.a_run, h.a_boot]);
    assert_eq!(dump.lines().count(), 2);
    assert!(dump.contains("  at p.q.A.doit(I)I"), "{dump}");
    assert!(dump.contains("  at p.q.A.run()V"), "{dump}");
}

// --- threads ---

#[test]
fn scoped_state_and_pinning() {
    let h = boot();
    let mut thread = Thread::new();
    assert_eq!(thread.state(), ThreadState::Native);
    thread.with_state(ThreadState::Runnable, |thread| {
        assert_eq!(thread.state(), ThreadState::Runnable);
    });
    assert_eq!(thread.state(), ThreadState::Native);

    let s = StringRef::from_modified_utf8(&h.rt, &mut thread, b"root").unwrap();
    assert!(thread.pinned_roots().is_empty());
    thread.with_pinned(s.0, |thread| {
        assert_eq!(thread.pinned_roots(), &[s.0][..]);
    });
    assert!(thread.pinned_roots().is_empty());
}

#[test]
fn object_size_of_arrays_and_instances() {
    let h = boot();
    let mut thread = Thread::new();
    let obj = h.rt.class(h.a).alloc_object(&h.rt, &mut thread).unwrap();
    assert_eq!(obj.size_of(&h.rt), 32);

    let chars = ArrayRef::alloc_for_class(&h.rt, &mut thread, h.char_array, 5).unwrap();
    assert_eq!(chars.0.size_of(&h.rt), ARRAY_DATA_OFFSET + 5 * 2);
    assert_eq!(chars.0.class_of(&h.rt).component_size(&h.rt), 2);
}
