//! Managed strings: an immutable run of UTF-16 code units backed by a shared
//! char array, with a lazily computed hash and modified-UTF-8 conversions.

use crate::object::{ArrayRef, Object, HEADER_SIZE};
use crate::thread::Thread;
use crate::Runtime;
use cesu8str::{from_java_cesu8, to_java_cesu8};

/// Typed view over a string object.
///
/// Layout past the header: char-array reference, 32-bit offset into that
/// array, 32-bit count, 32-bit hash (0 while unknown).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StringRef(pub Object);

pub const VALUE_OFFSET: usize = HEADER_SIZE;
pub const OFFSET_OFFSET: usize = 16;
pub const COUNT_OFFSET: usize = 20;
pub const HASH_CODE_OFFSET: usize = 24;
/// Allocation size of a string object, padded to the 8-byte grain.
pub const STRING_OBJECT_SIZE: usize = 32;

impl StringRef {
    fn char_array(self) -> ArrayRef {
        ArrayRef(self.0.get_field_ref(VALUE_OFFSET, false))
    }

    pub fn length(self) -> i32 {
        let count = self.0.get_field32(COUNT_OFFSET, false) as i32;
        debug_assert!(count >= 0 && count <= self.char_array().len());
        count
    }

    pub fn offset(self) -> i32 {
        self.0.get_field32(OFFSET_OFFSET, false) as i32
    }

    fn char_at_unchecked(self, index: i32) -> u16 {
        self.char_array()
            .get_prim_unchecked::<u16>(self.offset() + index)
    }

    /// Allocate a string wrapping a fresh char array of `utf16_length` units.
    pub fn alloc(rt: &Runtime, thread: &mut Thread, utf16_length: i32) -> Option<StringRef> {
        let char_array_class = rt.well_known.char_array();
        let array = ArrayRef::alloc(rt, thread, char_array_class, utf16_length, 2)?;
        // Hold the array across the second allocation so a moving collector
        // keeps it visible.
        thread.with_pinned(array.0, |thread| Self::alloc_with_array(rt, thread, array))
    }

    pub fn alloc_with_array(
        rt: &Runtime,
        thread: &mut Thread,
        array: ArrayRef,
    ) -> Option<StringRef> {
        let string_class = rt.class(rt.well_known.string());
        let obj = thread.with_pinned(array.0, |thread| string_class.alloc_object(rt, thread))?;
        obj.set_field_ref(VALUE_OFFSET, array.0, false);
        obj.set_field32(COUNT_OFFSET, array.len() as u32, false);
        Some(StringRef(obj))
    }

    pub fn from_utf16(
        rt: &Runtime,
        thread: &mut Thread,
        utf16_data: &[u16],
        hash_code: i32,
    ) -> Option<StringRef> {
        let string = Self::alloc(rt, thread, utf16_data.len() as i32)?;
        let array = string.char_array();
        for (i, &unit) in utf16_data.iter().enumerate() {
            array.set_prim_unchecked(i as i32, unit);
        }
        if hash_code != 0 {
            debug_assert_eq!(hash_code, Self::compute_utf16_hash(utf16_data));
            string.0.set_field32(HASH_CODE_OFFSET, hash_code as u32, false);
        } else {
            string.compute_hash_code();
        }
        Some(string)
    }

    /// Decode modified UTF-8 (overlong two-byte U+0000, supplementary chars
    /// as surrogate pairs) into a fresh string.
    pub fn from_modified_utf8(rt: &Runtime, thread: &mut Thread, utf8: &[u8]) -> Option<StringRef> {
        let decoded = match from_java_cesu8(utf8) {
            Ok(decoded) => decoded,
            Err(_) => {
                thread.throw_new_exception(
                    "Ljava/lang/InternalError;",
                    "malformed modified UTF-8 sequence".to_string(),
                );
                return None;
            }
        };
        let units: Vec<u16> = decoded.encode_utf16().collect();
        Self::from_utf16(rt, thread, &units, 0)
    }

    pub fn to_modified_utf8(self) -> Vec<u8> {
        let units = self.utf16_units();
        let s = String::from_utf16_lossy(&units);
        to_java_cesu8(&s).into_owned()
    }

    pub fn utf16_units(self) -> Vec<u16> {
        (0..self.length())
            .map(|i| self.char_at_unchecked(i))
            .collect()
    }

    pub fn char_at(self, thread: &mut Thread, index: i32) -> Option<u16> {
        if index < 0 || index >= self.length() {
            thread.throw_new_exception(
                "Ljava/lang/StringIndexOutOfBoundsException;",
                format!("length={}; index={}", self.length(), index),
            );
            return None;
        }
        Some(self.char_at_unchecked(index))
    }

    pub fn equals(self, that: Option<StringRef>) -> bool {
        let that = match that {
            // Null isn't equal to anything.
            None => return false,
            Some(that) => that,
        };
        if self.0 == that.0 {
            return true;
        }
        if self.length() != that.length() {
            return false;
        }
        // Don't short-circuit on the hash; equal hashes are why we are here.
        (0..self.length()).all(|i| self.char_at_unchecked(i) == that.char_at_unchecked(i))
    }

    pub fn equals_utf16(self, that_chars: &[u16]) -> bool {
        if self.length() as usize != that_chars.len() {
            return false;
        }
        that_chars
            .iter()
            .enumerate()
            .all(|(i, &c)| self.char_at_unchecked(i as i32) == c)
    }

    pub fn equals_modified_utf8(self, modified_utf8: &[u8]) -> bool {
        let decoded = match from_java_cesu8(modified_utf8) {
            Ok(decoded) => decoded,
            Err(_) => return false,
        };
        let units: Vec<u16> = decoded.encode_utf16().collect();
        self.equals_utf16(&units)
    }

    /// The agreed 31-polynomial hash over the code units; 0 only for the
    /// empty string, which doubles as the "uncomputed" sentinel.
    pub fn compute_utf16_hash(units: &[u16]) -> i32 {
        let mut hash: i32 = 0;
        for &unit in units {
            hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
        }
        hash
    }

    fn compute_hash_code(self) {
        let hash = Self::compute_utf16_hash(&self.utf16_units());
        self.0.set_field32(HASH_CODE_OFFSET, hash as u32, false);
    }

    pub fn get_hash_code(self) -> i32 {
        let result = self.0.get_field32(HASH_CODE_OFFSET, false) as i32;
        if result != 0 {
            return result;
        }
        self.compute_hash_code();
        let result = self.0.get_field32(HASH_CODE_OFFSET, false) as i32;
        debug_assert!(result != 0 || Self::compute_utf16_hash(&self.utf16_units()) == 0);
        result
    }

    pub fn intern(self, rt: &Runtime) -> Object {
        rt.intern_table().intern_weak(rt, self.0)
    }
}
