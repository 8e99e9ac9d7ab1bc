//! Declared-method metadata: signature decoding, dispatch helpers, the
//! PC↔bytecode mapping, catch-handler search, invocation, and native-method
//! slots.

use crate::descriptor;
use crate::object::{JValue, Object};
use crate::thread::{Thread, ThreadState};
use crate::Runtime;
use dvm_types::{AccessFlags, CacheId, ClassId, MethodId, NO_INDEX};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// ABI of an invocation stub: `(runtime, method, receiver, thread, args,
/// out_result)`.
pub type InvokeStub = fn(&Runtime, &Method, Option<Object>, &mut Thread, &[JValue], &mut JValue);

/// Reflective view of a signature: both halves are published together or
/// not at all.
pub struct MethodReflection {
    pub parameter_types: Box<[ClassId]>,
    pub return_type: ClassId,
}

/// One `(native_offset, bytecode_offset)` pair of the mapping table.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MappingEntry {
    pub native_offset: u32,
    pub bytecode_offset: u32,
}

pub struct Method {
    id: MethodId,
    declaring_class: ClassId,
    name: Arc<String>,
    signature: Arc<String>,
    shorty: Arc<String>,
    access_flags: AccessFlags,
    return_type_idx: u32,
    /// Offset of the code item in the declaring descriptor file.
    code_item_offset: u32,
    /// Vtable slot for virtual methods.
    method_index: AtomicU32,
    /// Entry point of generated code; 0 when none.
    code: AtomicUsize,
    invoke_stub: OnceCell<InvokeStub>,
    /// Native entry; 0 until the loader seeds the shared JNI stub.
    native_method: AtomicUsize,
    mapping_table: OnceCell<Box<[MappingEntry]>>,
    /// Back-reference to the declaring file's resolution cache.
    cache: OnceCell<CacheId>,
    reflect: OnceCell<MethodReflection>,
}

impl Method {
    pub fn new(
        declaring_class: ClassId,
        name: &str,
        signature: &str,
        shorty: &str,
        access_flags: AccessFlags,
        return_type_idx: u32,
        code_item_offset: u32,
    ) -> Method {
        Method {
            id: MethodId(NO_INDEX),
            declaring_class,
            name: Arc::new(name.to_string()),
            signature: Arc::new(signature.to_string()),
            shorty: Arc::new(shorty.to_string()),
            access_flags,
            return_type_idx,
            code_item_offset,
            method_index: AtomicU32::new(0),
            code: AtomicUsize::new(0),
            invoke_stub: OnceCell::new(),
            native_method: AtomicUsize::new(0),
            mapping_table: OnceCell::new(),
            cache: OnceCell::new(),
            reflect: OnceCell::new(),
        }
    }

    pub(crate) fn set_id(&mut self, id: MethodId) {
        self.id = id;
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn declaring_class(&self) -> ClassId {
        self.declaring_class
    }

    pub fn name(&self) -> &Arc<String> {
        &self.name
    }

    pub fn signature(&self) -> &Arc<String> {
        &self.signature
    }

    pub fn shorty(&self) -> &Arc<String> {
        &self.shorty
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn return_type_idx(&self) -> u32 {
        self.return_type_idx
    }

    pub fn code_item_offset(&self) -> u32 {
        self.code_item_offset
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags.contains(AccessFlags::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(AccessFlags::ABSTRACT)
    }

    pub fn is_constructor(&self) -> bool {
        self.access_flags.contains(AccessFlags::CONSTRUCTOR)
    }

    /// Direct methods are dispatched without the vtable.
    pub fn is_direct(&self) -> bool {
        self.access_flags
            .intersects(AccessFlags::STATIC | AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR)
    }

    pub fn is_class_initializer(&self) -> bool {
        self.is_static() && &**self.name == "<clinit>"
    }

    pub fn has_same_name_and_signature(&self, other: &Method) -> bool {
        self.name == other.name && self.signature == other.signature
    }

    pub fn method_index(&self) -> u32 {
        self.method_index.load(Ordering::Relaxed)
    }

    pub fn set_method_index(&self, index: u32) {
        self.method_index.store(index, Ordering::Relaxed);
    }

    pub fn code(&self) -> usize {
        self.code.load(Ordering::Acquire)
    }

    pub fn set_code(&self, entry_point: usize) {
        self.code.store(entry_point, Ordering::Release);
    }

    pub fn invoke_stub(&self) -> Option<InvokeStub> {
        self.invoke_stub.get().copied()
    }

    pub fn set_invoke_stub(&self, stub: InvokeStub) {
        assert!(self.invoke_stub.set(stub).is_ok(), "invoke stub already set");
    }

    pub fn cache_id(&self) -> Option<CacheId> {
        self.cache.get().copied()
    }

    pub fn set_cache(&self, cache: CacheId) {
        assert!(self.cache.set(cache).is_ok(), "cache already set");
    }

    pub fn set_mapping_table(&self, table: Box<[MappingEntry]>) {
        assert!(
            self.mapping_table.set(table).is_ok(),
            "mapping table already set"
        );
    }

    pub fn pretty(&self, rt: &Runtime) -> String {
        format!(
            "{}.{}{}",
            descriptor::pretty_descriptor(rt.class(self.declaring_class).descriptor()),
            self.name,
            self.signature
        )
    }

    // Argument shape helpers over the shorty, index 0 being the return kind
    // and the implicit receiver counting for instance methods.

    pub fn num_arg_registers(shorty: &str) -> usize {
        debug_assert!(!shorty.is_empty());
        shorty
            .bytes()
            .skip(1)
            .map(|ch| if ch == b'D' || ch == b'J' { 2 } else { 1 })
            .sum()
    }

    pub fn num_args(&self) -> usize {
        (if self.is_static() { 0 } else { 1 }) + self.shorty.len() - 1
    }

    /// Reference arguments including the implicit receiver.
    pub fn num_reference_args(&self) -> usize {
        let implicit = if self.is_static() { 0 } else { 1 };
        implicit
            + self
                .shorty
                .bytes()
                .skip(1)
                .filter(|&ch| ch == b'L' || ch == b'[')
                .count()
    }

    pub fn num_long_or_double_args(&self) -> usize {
        self.shorty
            .bytes()
            .skip(1)
            .filter(|&ch| ch == b'D' || ch == b'J')
            .count()
    }

    pub fn is_param_a_reference(&self, param: usize) -> bool {
        debug_assert!(param < self.num_args());
        let mut param = param;
        if self.is_static() {
            // Skip the return kind at the start of the shorty.
            param += 1;
        } else if param == 0 {
            // The receiver.
            return true;
        }
        self.shorty.as_bytes()[param] == b'L'
    }

    pub fn is_param_a_long_or_double(&self, param: usize) -> bool {
        debug_assert!(param < self.num_args());
        let mut param = param;
        if self.is_static() {
            param += 1;
        } else if param == 0 {
            return false;
        }
        let ch = self.shorty.as_bytes()[param];
        ch == b'J' || ch == b'D'
    }

    pub fn param_size(&self, param: usize) -> usize {
        debug_assert!(param < self.num_args());
        let mut param = param;
        if self.is_static() {
            param += 1;
        } else if param == 0 {
            return std::mem::size_of::<usize>();
        }
        shorty_char_to_size(self.shorty.as_bytes()[param])
    }

    pub fn return_size(&self) -> usize {
        shorty_char_to_size(self.shorty.as_bytes()[0])
    }

    /// The method this one overrides: the super vtable slot when in range,
    /// otherwise a matching virtual on one of the declaring class's direct
    /// interfaces.
    pub fn find_overridden_method(&self, rt: &Runtime) -> Option<MethodId> {
        if self.is_static() {
            return None;
        }
        let declaring = rt.class(self.declaring_class);
        let super_class = rt.class(declaring.super_class_id()?);
        let method_index = self.method_index() as usize;

        let mut result = None;
        if let Some(vtable) = super_class.vtable() {
            if method_index < vtable.len() {
                result = Some(vtable[method_index]);
            }
        }
        if result.is_none() {
            for &interface in declaring.direct_interfaces().unwrap_or(&[]) {
                result = rt
                    .class(interface)
                    .find_interface_method(rt, &self.name, &self.signature);
                if result.is_some() {
                    break;
                }
            }
        }
        debug_assert!(result
            .map(|m| self.has_same_name_and_signature(&rt.method(m)))
            .unwrap_or(true));
        result
    }

    /// Map a native pc back to a bytecode offset: the entry with the largest
    /// `native_offset <= pc - code`, or the exact match. `NO_INDEX` when the
    /// method carries no mapping table (native methods).
    pub fn to_bytecode_pc(&self, native_pc: usize) -> u32 {
        let table = match self.mapping_table.get() {
            None => {
                debug_assert!(self.is_native());
                return NO_INDEX;
            }
            Some(table) => table,
        };
        let sought = (native_pc - self.code()) as u32;
        let mut best: Option<MappingEntry> = None;
        for entry in table.iter() {
            if entry.native_offset == sought {
                return entry.bytecode_offset;
            }
            if entry.native_offset < sought
                && best.map(|b| entry.native_offset > b.native_offset).unwrap_or(true)
            {
                best = Some(*entry);
            }
        }
        best.map(|b| b.bytecode_offset).unwrap_or(0)
    }

    /// Map a bytecode offset to a native pc. A missing mapping table is only
    /// legal for pc 0; a missing entry is fatal.
    pub fn to_native_pc(&self, bytecode_pc: u32) -> usize {
        let table = match self.mapping_table.get() {
            None => {
                debug_assert_eq!(bytecode_pc, 0);
                return 0;
            }
            Some(table) => table,
        };
        for entry in table.iter() {
            if entry.bytecode_offset == bytecode_pc {
                return self.code() + entry.native_offset as usize;
            }
        }
        panic!(
            "looking up a bytecode pc ({:#x}) not contained in {}{}",
            bytecode_pc, self.name, self.signature
        );
    }

    /// Find the handler address covering `bytecode_pc` for a thrown
    /// `exception_type`, or `NO_INDEX` to propagate outward.
    pub fn find_catch_block(&self, rt: &Runtime, exception_type: ClassId, bytecode_pc: u32) -> u32 {
        let declaring = rt.class(self.declaring_class);
        let cache_id = declaring
            .cache_id()
            .expect("catch search on a class with no descriptor file");
        let cache = rt.file_cache(cache_id);
        let file = rt.descriptor_file(cache.file());
        let code_item = file
            .code_item(self.code_item_offset)
            .expect("catch search on a method with no code item");

        for handler in code_item.handlers_for_pc(bytecode_pc) {
            if handler.is_catch_all() {
                return handler.address;
            }
            match cache.get_resolved_type(handler.type_idx as u32) {
                None => {
                    // The verifier should have resolved all exception
                    // classes early.
                    tracing::warn!(
                        exception = %file.type_descriptor(handler.type_idx as u32),
                        "unresolved exception class when finding catch block"
                    );
                }
                Some(handler_type) => {
                    if rt.class(handler_type).is_assignable_from(rt, exception_type) {
                        return handler.address;
                    }
                }
            }
        }
        NO_INDEX
    }

    /// Call through the invocation stub, balancing a native-to-managed
    /// frame record around the call. Before the runtime has started,
    /// methods without code quietly produce a zero result.
    pub fn invoke(
        &self,
        rt: &Runtime,
        thread: &mut Thread,
        receiver: Option<Object>,
        args: &[JValue],
        result: &mut JValue,
    ) {
        assert_eq!(thread.state(), ThreadState::Runnable);
        thread.push_native_to_managed();

        // Generated code is only produced for one target so far; everywhere
        // else only native methods have an entry point worth calling.
        let have_executable_code = if cfg!(target_arch = "arm") {
            self.code() != 0
        } else {
            self.is_native()
        };

        match self.invoke_stub() {
            Some(stub) if have_executable_code => {
                stub(rt, self, receiver, thread, args, result);
            }
            _ => {
                if rt.is_started() {
                    tracing::warn!(
                        method = %self.pretty(rt),
                        "not invoking method with no associated code"
                    );
                }
                *result = JValue::zero();
            }
        }

        thread.pop_native_to_managed();
    }

    pub fn is_registered(&self, rt: &Runtime) -> bool {
        let native_method = self.native_method.load(Ordering::Acquire);
        native_method != 0 && native_method != rt.jni_stub()
    }

    pub fn register_native(&self, native_method: usize) {
        assert!(self.is_native(), "cannot register non-native {}", self.name);
        assert_ne!(native_method, 0);
        self.native_method.store(native_method, Ordering::Release);
    }

    /// Restore the shared JNI stub so the next call re-resolves via dlsym.
    pub fn unregister_native(&self, rt: &Runtime) {
        assert!(self.is_native(), "cannot unregister non-native {}", self.name);
        self.native_method.store(rt.jni_stub(), Ordering::Release);
    }

    pub fn native_method(&self) -> usize {
        self.native_method.load(Ordering::Acquire)
    }

    /// Resolve parameter and return classes from the signature; both are
    /// installed together, and any failure leaves the state empty so a
    /// later call retries cleanly.
    pub fn init_reflective_state(&self, rt: &Runtime, thread: &mut Thread) {
        let _ = self.reflect.get_or_try_init(|| -> Result<MethodReflection, ()> {
            let declaring = rt.class(self.declaring_class);
            let loader = declaring.loader();
            let (params, ret) = descriptor::split_signature(&self.signature).map_err(|_| ())?;
            debug_assert_eq!(params.len(), self.shorty.len() - 1);

            let mut parameter_types = Vec::with_capacity(params.len());
            for param in params {
                parameter_types.push(class_for_descriptor(rt, thread, loader, param).ok_or(())?);
            }
            let return_type = class_for_descriptor(rt, thread, loader, ret).ok_or(())?;
            Ok(MethodReflection {
                parameter_types: parameter_types.into_boxed_slice(),
                return_type,
            })
        });
    }

    pub fn reflection(&self) -> Option<&MethodReflection> {
        self.reflect.get()
    }

    pub fn get_return_type_descriptor(&self, rt: &Runtime) -> Arc<String> {
        let declaring = rt.class(self.declaring_class);
        let cache = rt.file_cache(
            declaring
                .cache_id()
                .expect("return type lookup on a class with no descriptor file"),
        );
        rt.descriptor_file(cache.file())
            .type_descriptor(self.return_type_idx)
            .clone()
    }

    pub fn get_return_type(&self, rt: &Runtime, thread: &mut Thread) -> Option<ClassId> {
        let declaring = rt.class(self.declaring_class);
        debug_assert!(declaring.is_resolved() || declaring.is_erroneous());
        if let Some(reflection) = self.reflect.get() {
            return Some(reflection.return_type);
        }
        // Short-cut through the cache before full linkage.
        let cache_id = declaring
            .cache_id()
            .expect("return type resolution on a class with no descriptor file");
        if let Some(resolved) = rt.file_cache(cache_id).get_resolved_type(self.return_type_idx) {
            return Some(resolved);
        }
        rt.class_linker().resolve_type(
            rt,
            thread,
            self.return_type_idx,
            cache_id,
            declaring.loader(),
        )
    }

    /// Recompute this method's index in its descriptor file from name and
    /// signature. Any lookup miss means the file and the runtime disagree,
    /// which is fatal.
    pub fn file_method_index(&self, rt: &Runtime) -> u32 {
        let declaring = rt.class(self.declaring_class);
        let cache = rt.file_cache(
            declaring
                .cache_id()
                .expect("method index lookup on a class with no descriptor file"),
        );
        let file = rt.descriptor_file(cache.file());

        let class_def_idx = file
            .find_class_def_idx(declaring.descriptor())
            .expect("class not defined in its own descriptor file");
        let class_idx = file.class_def(class_def_idx).class_idx;
        let name_idx = file
            .find_string_idx(&self.name)
            .expect("failed to find the method name");
        let (return_type_idx, param_type_idxs) = file
            .create_type_list(&self.signature)
            .expect("failed to parse the method signature");
        let proto_idx = file
            .find_proto_idx(return_type_idx, &param_type_idxs)
            .expect("failed to find the method prototype");
        file.find_method_idx(class_idx, name_idx, proto_idx)
            .expect("failed to find the method")
    }
}

fn shorty_char_to_size(ch: u8) -> usize {
    match ch {
        b'V' => 0,
        b'[' | b'L' => std::mem::size_of::<usize>(),
        b'D' | b'J' => 8,
        _ => 4,
    }
}

/// Resolve one signature descriptor through the loader: primitives go to the
/// primitive table, objects and arrays through a full find.
fn class_for_descriptor(
    rt: &Runtime,
    thread: &mut Thread,
    loader: dvm_types::LoaderId,
    descriptor: &str,
) -> Option<ClassId> {
    let linker = rt.class_linker();
    if descriptor.len() == 1 {
        linker.find_primitive_class(rt, descriptor.as_bytes()[0] as char)
    } else {
        linker.find_class(rt, thread, descriptor, loader)
    }
}
