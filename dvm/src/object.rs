//! The managed object model: header layout, offset-based field access, and
//! arrays.
//!
//! Every heap value is an untyped byte block. The first 8 bytes are the
//! header: the class id word, then the 32-bit lock word. Behavior is driven
//! by the header's class, not by Rust types; [`ArrayRef`] and
//! [`StringRef`](crate::string::StringRef) are copyable views over the same
//! block. All raw reads and writes live in this module and assert alignment
//! in debug builds.

use crate::class::Class;
use crate::thread::Thread;
use crate::Runtime;
use dvm_types::ClassId;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub const CLASS_OFFSET: usize = 0;
pub const LOCK_WORD_OFFSET: usize = 4;
pub const HEADER_SIZE: usize = 8;

pub const ARRAY_LENGTH_OFFSET: usize = HEADER_SIZE;
/// Array data starts one full word after the length so every component size
/// stays naturally aligned.
pub const ARRAY_DATA_OFFSET: usize = 16;

/// A reference to a managed heap value. Copyable and nullable; the runtime
/// null is [`Object::NULL`], while `Option` is used at API boundaries where
/// "failed with a pending exception" must be distinguishable from a plain
/// null value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Object {
    ptr: *mut u8,
}

// Heap blocks are shared across mutator and GC threads; all racing accesses
// go through the atomic accessors below.
unsafe impl Send for Object {}
unsafe impl Sync for Object {}

/// Union result/argument slot for invocation, one per register pair.
#[repr(C)]
#[derive(Copy, Clone)]
pub union JValue {
    pub z: bool,
    pub b: i8,
    pub c: u16,
    pub s: i16,
    pub i: i32,
    pub j: i64,
    pub f: f32,
    pub d: f64,
    pub l: Object,
}

impl JValue {
    pub fn zero() -> JValue {
        JValue { j: 0 }
    }
}

impl Default for JValue {
    fn default() -> Self {
        JValue::zero()
    }
}

impl Object {
    pub const NULL: Object = Object {
        ptr: std::ptr::null_mut(),
    };

    /// # Safety
    ///
    /// `ptr` must be null or point to a live heap block with a valid header.
    pub unsafe fn from_raw(ptr: *mut u8) -> Object {
        Object { ptr }
    }

    pub fn raw(self) -> *mut u8 {
        self.ptr
    }

    pub fn is_null(self) -> bool {
        self.ptr.is_null()
    }

    /// Reference encoded as a word for cache slots; 0 is null.
    pub fn as_word(self) -> usize {
        self.ptr as usize
    }

    pub fn from_word(word: usize) -> Object {
        Object {
            ptr: word as *mut u8,
        }
    }

    pub fn class_id(self) -> ClassId {
        ClassId(self.get_field32(CLASS_OFFSET, false))
    }

    pub fn class_of(self, rt: &Runtime) -> Arc<Class> {
        rt.class(self.class_id())
    }

    pub fn lock_word(self) -> u32 {
        self.get_field32(LOCK_WORD_OFFSET, true)
    }

    pub fn compare_exchange_lock_word(self, current: u32, new: u32) -> Result<u32, u32> {
        debug_assert!(!self.is_null());
        unsafe { &*(self.ptr.add(LOCK_WORD_OFFSET) as *const AtomicU32) }.compare_exchange(
            current,
            new,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
    }

    pub fn get_field32(self, offset: usize, volatile: bool) -> u32 {
        debug_assert!(!self.is_null());
        debug_assert_eq!(offset % 4, 0);
        unsafe {
            let ptr = self.ptr.add(offset);
            if volatile {
                (*(ptr as *const AtomicU32)).load(Ordering::SeqCst)
            } else {
                (ptr as *const u32).read()
            }
        }
    }

    pub fn set_field32(self, offset: usize, new_value: u32, volatile: bool) {
        debug_assert!(!self.is_null());
        debug_assert_eq!(offset % 4, 0);
        unsafe {
            let ptr = self.ptr.add(offset);
            if volatile {
                (*(ptr as *const AtomicU32)).store(new_value, Ordering::SeqCst);
            } else {
                (ptr as *mut u32).write(new_value);
            }
        }
    }

    pub fn get_field64(self, offset: usize, volatile: bool) -> u64 {
        debug_assert!(!self.is_null());
        debug_assert_eq!(offset % 8, 0);
        unsafe {
            let ptr = self.ptr.add(offset);
            if volatile {
                (*(ptr as *const AtomicU64)).load(Ordering::SeqCst)
            } else {
                (ptr as *const u64).read()
            }
        }
    }

    pub fn set_field64(self, offset: usize, new_value: u64, volatile: bool) {
        debug_assert!(!self.is_null());
        debug_assert_eq!(offset % 8, 0);
        unsafe {
            let ptr = self.ptr.add(offset);
            if volatile {
                (*(ptr as *const AtomicU64)).store(new_value, Ordering::SeqCst);
            } else {
                (ptr as *mut u64).write(new_value);
            }
        }
    }

    pub fn get_field_ref(self, offset: usize, volatile: bool) -> Object {
        debug_assert!(!self.is_null());
        debug_assert_eq!(offset % std::mem::size_of::<usize>(), 0);
        let word = unsafe {
            let ptr = self.ptr.add(offset);
            if volatile {
                (*(ptr as *const AtomicUsize)).load(Ordering::SeqCst)
            } else {
                (ptr as *const usize).read()
            }
        };
        Object::from_word(word)
    }

    pub fn set_field_ref(self, offset: usize, new_value: Object, volatile: bool) {
        debug_assert!(!self.is_null());
        debug_assert_eq!(offset % std::mem::size_of::<usize>(), 0);
        unsafe {
            let ptr = self.ptr.add(offset);
            if volatile {
                (*(ptr as *const AtomicUsize)).store(new_value.as_word(), Ordering::SeqCst);
            } else {
                (ptr as *mut usize).write(new_value.as_word());
            }
        }
    }

    /// Total size in bytes, using the array formula when the class is an
    /// array class.
    pub fn size_of(self, rt: &Runtime) -> usize {
        let klass = self.class_of(rt);
        if klass.is_array() {
            let array = ArrayRef(self);
            ARRAY_DATA_OFFSET + array.len() as usize * klass.component_size(rt)
        } else {
            klass.object_size() as usize
        }
    }

    /// Allocate a new object of the same class and size and copy everything
    /// past the header. Registers the copy for finalization when the class
    /// is finalizable.
    pub fn clone_object(self, rt: &Runtime, thread: &mut Thread) -> Option<Object> {
        let klass = self.class_of(rt);
        debug_assert!(!klass.is_class_class(rt));

        // size_of gets the right size even for arrays; Class::alloc_object
        // would not.
        let num_bytes = self.size_of(rt);
        let copy = match rt.heap().alloc(klass.id(), num_bytes) {
            Some(copy) => copy,
            None => {
                thread.throw_new_exception(
                    "Ljava/lang/OutOfMemoryError;",
                    format!("failed to allocate {num_bytes} bytes"),
                );
                return None;
            }
        };

        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.add(HEADER_SIZE),
                copy.ptr.add(HEADER_SIZE),
                num_bytes - HEADER_SIZE,
            );
        }

        if klass.is_finalizable() {
            rt.heap().add_finalizer_reference(thread, copy);
        }

        Some(copy)
    }

    pub fn thin_lock_id(self, rt: &Runtime) -> u32 {
        rt.monitor().thin_lock_id_of(self.lock_word())
    }

    pub fn monitor_enter(self, rt: &Runtime, thread: &mut Thread) {
        rt.monitor().enter(thread, self);
    }

    pub fn monitor_exit(self, rt: &Runtime, thread: &mut Thread) -> bool {
        rt.monitor().exit(thread, self)
    }

    pub fn notify(self, rt: &Runtime, thread: &mut Thread) {
        rt.monitor().notify(thread, self);
    }

    pub fn notify_all(self, rt: &Runtime, thread: &mut Thread) {
        rt.monitor().notify_all(thread, self);
    }

    pub fn wait(self, rt: &Runtime, thread: &mut Thread, ms: i64, ns: i32) {
        rt.monitor().wait(thread, self, ms, ns);
    }

    pub fn is_string(self, rt: &Runtime) -> bool {
        rt.well_known.try_string() == Some(self.class_id())
    }

    pub fn is_array(self, rt: &Runtime) -> bool {
        self.class_of(rt).is_array()
    }

    pub fn instance_of(self, rt: &Runtime, klass: ClassId) -> bool {
        rt.class(klass).is_assignable_from(rt, self.class_id())
    }
}

/// Typed view over an array object.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ArrayRef(pub Object);

impl ArrayRef {
    /// True when `header + count * component_size` cannot be represented.
    /// `component_size` must be a power of two.
    pub fn size_overflows(count: usize, component_size: usize) -> bool {
        debug_assert!(component_size.is_power_of_two());
        let data_size = count.wrapping_mul(component_size);
        let component_shift = usize::BITS - 1 - component_size.leading_zeros();
        let size = ARRAY_DATA_OFFSET.wrapping_add(data_size);
        (data_size >> component_shift) != count || size < data_size
    }

    pub fn alloc(
        rt: &Runtime,
        thread: &mut Thread,
        array_class: ClassId,
        component_count: i32,
        component_size: usize,
    ) -> Option<ArrayRef> {
        let klass = rt.class(array_class);
        debug_assert!(klass.is_array());
        debug_assert!(component_count >= 0);

        let count = component_count as usize;
        if Self::size_overflows(count, component_size) {
            thread.throw_new_exception(
                "Ljava/lang/OutOfMemoryError;",
                format!(
                    "{} of length {} exceeds the VM limit",
                    crate::descriptor::pretty_descriptor(klass.descriptor()),
                    component_count
                ),
            );
            return None;
        }
        let size = ARRAY_DATA_OFFSET + count * component_size;

        let obj = match rt.heap().alloc(array_class, size) {
            Some(obj) => obj,
            None => {
                thread.throw_new_exception(
                    "Ljava/lang/OutOfMemoryError;",
                    format!("failed to allocate {size} bytes"),
                );
                return None;
            }
        };
        let array = ArrayRef(obj);
        array.set_len(component_count);
        Some(array)
    }

    /// Allocation form that takes the component size from the array class.
    pub fn alloc_for_class(
        rt: &Runtime,
        thread: &mut Thread,
        array_class: ClassId,
        component_count: i32,
    ) -> Option<ArrayRef> {
        let component_size = rt.class(array_class).component_size(rt);
        Self::alloc(rt, thread, array_class, component_count, component_size)
    }

    pub fn len(self) -> i32 {
        self.0.get_field32(ARRAY_LENGTH_OFFSET, false) as i32
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    fn set_len(self, length: i32) {
        self.0.set_field32(ARRAY_LENGTH_OFFSET, length as u32, false);
    }

    fn check_bounds(self, thread: &mut Thread, index: i32) -> bool {
        if index < 0 || index >= self.len() {
            thread.throw_new_exception(
                "Ljava/lang/ArrayIndexOutOfBoundsException;",
                format!("length={}; index={}", self.len(), index),
            );
            return false;
        }
        true
    }

    /// # Safety
    ///
    /// The component type of the array must have the size of `T`.
    pub unsafe fn data_ptr<T>(self) -> *mut T {
        debug_assert!(!self.0.is_null());
        self.0.raw().add(ARRAY_DATA_OFFSET) as *mut T
    }

    pub fn get_prim_unchecked<T: Copy>(self, index: i32) -> T {
        debug_assert!(index >= 0 && index < self.len());
        unsafe { self.data_ptr::<T>().add(index as usize).read() }
    }

    pub fn set_prim_unchecked<T: Copy>(self, index: i32, value: T) {
        debug_assert!(index >= 0 && index < self.len());
        unsafe { self.data_ptr::<T>().add(index as usize).write(value) }
    }

    pub fn get_prim<T: Copy>(self, thread: &mut Thread, index: i32) -> Option<T> {
        if !self.check_bounds(thread, index) {
            return None;
        }
        Some(self.get_prim_unchecked(index))
    }

    pub fn set_prim<T: Copy>(self, thread: &mut Thread, index: i32, value: T) -> bool {
        if !self.check_bounds(thread, index) {
            return false;
        }
        self.set_prim_unchecked(index, value);
        true
    }

    /// Read a reference element. `None` means the index was out of bounds
    /// and an exception is pending; the contained reference may be null.
    pub fn get_element(self, thread: &mut Thread, index: i32) -> Option<Object> {
        if !self.check_bounds(thread, index) {
            return None;
        }
        Some(self.get_element_unchecked(index))
    }

    pub fn get_element_unchecked(self, index: i32) -> Object {
        debug_assert!(index >= 0 && index < self.len());
        let word = unsafe { self.data_ptr::<usize>().add(index as usize).read() };
        Object::from_word(word)
    }

    /// Store a reference element, enforcing bounds and the component
    /// assignability rule.
    pub fn set_element(
        self,
        rt: &Runtime,
        thread: &mut Thread,
        index: i32,
        value: Object,
    ) -> bool {
        if !self.check_bounds(thread, index) {
            return false;
        }
        if !value.is_null() {
            let klass = self.0.class_of(rt);
            let component = match klass.component_type() {
                Some(component) => component,
                None => return false,
            };
            if !rt.class(component).is_assignable_from(rt, value.class_id()) {
                thread.throw_new_exception(
                    "Ljava/lang/ArrayStoreException;",
                    format!(
                        "can't store an element of type {} into an array of type {}",
                        crate::descriptor::pretty_descriptor(
                            value.class_of(rt).descriptor()
                        ),
                        crate::descriptor::pretty_descriptor(klass.descriptor()),
                    ),
                );
                return false;
            }
        }
        self.set_element_unchecked(index, value);
        true
    }

    pub fn set_element_unchecked(self, index: i32, value: Object) {
        debug_assert!(index >= 0 && index < self.len());
        unsafe {
            self.data_ptr::<usize>()
                .add(index as usize)
                .write(value.as_word())
        }
    }
}
