//! In-memory descriptor-file tables.
//!
//! A descriptor file is the compact bytecode container: string, type, proto,
//! method and field tables plus class definitions and code items. The byte
//! parser and verifier live outside this crate; they (or tests) populate
//! these tables and the core only ever reads them.

use crate::descriptor;
use dvm_types::{NO_INDEX, NO_INDEX_16};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FileError {
    #[error("{table} index {index} out of range in {location}")]
    IndexOutOfRange {
        table: &'static str,
        index: u32,
        location: String,
    },
    #[error("duplicate type descriptor \"{0}\"")]
    DuplicateDescriptor(String),
}

/// One row of the type table: a descriptor-string reference.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeItem {
    pub descriptor_idx: u32,
}

/// One row of the proto table: shorty, return type and parameter types.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtoItem {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub param_type_idxs: Box<[u32]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodItem {
    pub class_idx: u32,
    pub proto_idx: u32,
    pub name_idx: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldItem {
    pub class_idx: u32,
    pub type_idx: u32,
    pub name_idx: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDefItem {
    pub class_idx: u32,
    pub access_flags: u32,
    /// `NO_INDEX` for the root class.
    pub superclass_idx: u32,
    pub interface_idxs: Box<[u32]>,
    /// `NO_INDEX` when the source file is unknown.
    pub source_file_idx: u32,
}

/// A catch handler: `type_idx == NO_INDEX_16` marks the catch-all entry.
#[derive(Clone, Debug, PartialEq)]
pub struct CatchHandler {
    pub type_idx: u16,
    pub address: u32,
}

impl CatchHandler {
    pub fn is_catch_all(&self) -> bool {
        self.type_idx == NO_INDEX_16
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u32,
    pub handlers: Box<[CatchHandler]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub insns_count: u32,
    pub tries: Box<[TryItem]>,
}

impl CodeItem {
    /// Handlers guarding `pc`, in declaration order (catch-all last by
    /// convention of the populating parser). Empty when no try covers `pc`.
    pub fn handlers_for_pc(&self, pc: u32) -> &[CatchHandler] {
        self.tries
            .iter()
            .find(|t| t.start_addr <= pc && pc < t.start_addr + t.insn_count)
            .map(|t| &t.handlers[..])
            .unwrap_or(&[])
    }
}

pub struct DescriptorFile {
    location: String,
    strings: Box<[Arc<String>]>,
    type_items: Box<[TypeItem]>,
    proto_items: Box<[ProtoItem]>,
    method_items: Box<[MethodItem]>,
    field_items: Box<[FieldItem]>,
    class_defs: Box<[ClassDefItem]>,
    code_items: HashMap<u32, CodeItem>,
    string_lookup: HashMap<String, u32>,
    type_lookup: HashMap<String, u32>,
}

impl DescriptorFile {
    pub fn new(
        location: String,
        strings: Vec<String>,
        type_items: Vec<TypeItem>,
        proto_items: Vec<ProtoItem>,
        method_items: Vec<MethodItem>,
        field_items: Vec<FieldItem>,
        class_defs: Vec<ClassDefItem>,
        code_items: HashMap<u32, CodeItem>,
    ) -> Result<Self, FileError> {
        let num_strings = strings.len() as u32;
        let num_types = type_items.len() as u32;
        let num_protos = proto_items.len() as u32;

        let check = |table: &'static str, index: u32, len: u32| {
            if index >= len {
                Err(FileError::IndexOutOfRange {
                    table,
                    index,
                    location: location.clone(),
                })
            } else {
                Ok(())
            }
        };

        let mut string_lookup = HashMap::new();
        for (i, s) in strings.iter().enumerate() {
            string_lookup.insert(s.clone(), i as u32);
        }

        let mut type_lookup = HashMap::new();
        for (i, item) in type_items.iter().enumerate() {
            check("string", item.descriptor_idx, num_strings)?;
            let descriptor = strings[item.descriptor_idx as usize].clone();
            if type_lookup.insert(descriptor.clone(), i as u32).is_some() {
                return Err(FileError::DuplicateDescriptor(descriptor));
            }
        }

        for item in &proto_items {
            check("string", item.shorty_idx, num_strings)?;
            check("type", item.return_type_idx, num_types)?;
            for &p in item.param_type_idxs.iter() {
                check("type", p, num_types)?;
            }
        }
        for item in &method_items {
            check("type", item.class_idx, num_types)?;
            check("proto", item.proto_idx, num_protos)?;
            check("string", item.name_idx, num_strings)?;
        }
        for item in &field_items {
            check("type", item.class_idx, num_types)?;
            check("type", item.type_idx, num_types)?;
            check("string", item.name_idx, num_strings)?;
        }
        for def in &class_defs {
            check("type", def.class_idx, num_types)?;
            if def.superclass_idx != NO_INDEX {
                check("type", def.superclass_idx, num_types)?;
            }
            for &i in def.interface_idxs.iter() {
                check("type", i, num_types)?;
            }
        }

        Ok(Self {
            location,
            strings: strings.into_iter().map(Arc::new).collect(),
            type_items: type_items.into_boxed_slice(),
            proto_items: proto_items.into_boxed_slice(),
            method_items: method_items.into_boxed_slice(),
            field_items: field_items.into_boxed_slice(),
            class_defs: class_defs.into_boxed_slice(),
            code_items,
            string_lookup,
            type_lookup,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn num_strings(&self) -> u32 {
        self.strings.len() as u32
    }

    pub fn num_types(&self) -> u32 {
        self.type_items.len() as u32
    }

    pub fn num_protos(&self) -> u32 {
        self.proto_items.len() as u32
    }

    pub fn num_methods(&self) -> u32 {
        self.method_items.len() as u32
    }

    pub fn num_fields(&self) -> u32 {
        self.field_items.len() as u32
    }

    pub fn num_class_defs(&self) -> u32 {
        self.class_defs.len() as u32
    }

    pub fn string(&self, idx: u32) -> &Arc<String> {
        &self.strings[idx as usize]
    }

    pub fn type_item(&self, type_idx: u32) -> &TypeItem {
        &self.type_items[type_idx as usize]
    }

    /// The descriptor string for a type id.
    pub fn type_descriptor(&self, type_idx: u32) -> &Arc<String> {
        self.string(self.type_item(type_idx).descriptor_idx)
    }

    pub fn proto_item(&self, proto_idx: u32) -> &ProtoItem {
        &self.proto_items[proto_idx as usize]
    }

    pub fn shorty(&self, proto_idx: u32) -> &Arc<String> {
        self.string(self.proto_item(proto_idx).shorty_idx)
    }

    pub fn method_item(&self, method_idx: u32) -> &MethodItem {
        &self.method_items[method_idx as usize]
    }

    pub fn field_item(&self, field_idx: u32) -> &FieldItem {
        &self.field_items[field_idx as usize]
    }

    pub fn class_def(&self, class_def_idx: u32) -> &ClassDefItem {
        &self.class_defs[class_def_idx as usize]
    }

    pub fn code_item(&self, offset: u32) -> Option<&CodeItem> {
        self.code_items.get(&offset)
    }

    pub fn find_string_idx(&self, s: &str) -> Option<u32> {
        self.string_lookup.get(s).copied()
    }

    pub fn find_type_idx(&self, descriptor: &str) -> Option<u32> {
        self.type_lookup.get(descriptor).copied()
    }

    pub fn find_class_def_idx(&self, descriptor: &str) -> Option<u32> {
        let type_idx = self.find_type_idx(descriptor)?;
        self.class_defs
            .iter()
            .position(|def| def.class_idx == type_idx)
            .map(|i| i as u32)
    }

    /// Resolve a method signature against the type table, yielding the
    /// return-type id and parameter-type ids. `None` when the signature is
    /// malformed or mentions a type this file does not declare.
    pub fn create_type_list(&self, signature: &str) -> Option<(u32, Vec<u32>)> {
        let (params, ret) = descriptor::split_signature(signature).ok()?;
        let return_type_idx = self.find_type_idx(ret)?;
        let mut param_type_idxs = Vec::with_capacity(params.len());
        for param in params {
            param_type_idxs.push(self.find_type_idx(param)?);
        }
        Some((return_type_idx, param_type_idxs))
    }

    pub fn find_proto_idx(&self, return_type_idx: u32, param_type_idxs: &[u32]) -> Option<u32> {
        self.proto_items
            .iter()
            .position(|p| {
                p.return_type_idx == return_type_idx && &*p.param_type_idxs == param_type_idxs
            })
            .map(|i| i as u32)
    }

    pub fn find_method_idx(&self, class_idx: u32, name_idx: u32, proto_idx: u32) -> Option<u32> {
        self.method_items
            .iter()
            .position(|m| {
                m.class_idx == class_idx && m.name_idx == name_idx && m.proto_idx == proto_idx
            })
            .map(|i| i as u32)
    }
}
