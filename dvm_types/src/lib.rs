//! Shared plain types for the dvm runtime: the primitive taxonomy, typed
//! indices for arena entities and descriptor-file tables, and access flags.

use bitflags::bitflags;

/// Null sentinel for 32-bit table indices and id words.
pub const NO_INDEX: u32 = u32::MAX;

/// Null sentinel for 16-bit table indices (catch-all handler marker).
pub const NO_INDEX_16: u16 = u16::MAX;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Decode an id from a raw cache word, treating [`NO_INDEX`] as
            /// "not present".
            #[inline]
            pub const fn from_raw(raw: u32) -> Option<Self> {
                if raw == NO_INDEX {
                    None
                } else {
                    Some(Self(raw))
                }
            }
        }
    };
}

id_type!(ClassId);
id_type!(MethodId);
id_type!(FieldId);
id_type!(FileId);
id_type!(CacheId);

/// Opaque class-loader identity. Loaders themselves live outside this core;
/// the id is only a namespace key.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LoaderId(pub u32);

impl LoaderId {
    pub const BOOT: LoaderId = LoaderId(0);
}

/// Primitive kind taxonomy. `Not` means "reference, not a primitive".
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Primitive {
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    Not,
}

impl Primitive {
    pub fn from_descriptor_char(c: char) -> Option<Primitive> {
        Some(match c {
            'Z' => Primitive::Bool,
            'B' => Primitive::Byte,
            'C' => Primitive::Char,
            'S' => Primitive::Short,
            'I' => Primitive::Int,
            'J' => Primitive::Long,
            'F' => Primitive::Float,
            'D' => Primitive::Double,
            'V' => Primitive::Void,
            _ => return None,
        })
    }

    pub fn descriptor_char(self) -> char {
        match self {
            Primitive::Bool => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
            Primitive::Void => 'V',
            Primitive::Not => 'L',
        }
    }

    /// Declared storage width in bytes.
    pub fn field_size(self) -> usize {
        match self {
            Primitive::Bool | Primitive::Byte => 1,
            Primitive::Char | Primitive::Short => 2,
            Primitive::Int | Primitive::Float => 4,
            Primitive::Long | Primitive::Double => 8,
            Primitive::Void => 0,
            Primitive::Not => core::mem::size_of::<usize>(),
        }
    }

    /// Array component width; identical to the field size.
    pub fn component_size(self) -> usize {
        self.field_size()
    }

    /// Argument-register width: wide kinds occupy two registers.
    pub fn register_width(self) -> usize {
        match self {
            Primitive::Long | Primitive::Double => 2,
            Primitive::Void => 0,
            _ => 1,
        }
    }

    pub fn is_wide(self) -> bool {
        matches!(self, Primitive::Long | Primitive::Double)
    }
}

bitflags! {

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const SUPER = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x0001_0000;
        const DECLARED_SYNCHRONIZED = 0x0002_0000;
        // Runtime-internal class flag, never present in the file tables.
        const FINALIZABLE = 0x8000_0000;
    }

}
