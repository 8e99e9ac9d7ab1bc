//! Throwable helpers: checked-exception classification, backtrace
//! rendering, and stack-trace element materialization.

use crate::object::{Object, HEADER_SIZE};
use crate::thread::Thread;
use crate::Runtime;
use dvm_types::{ClassId, MethodId};

/// A throwable is checked unless it is an `Error` or a `RuntimeException`.
pub fn is_checked_exception(rt: &Runtime, thread: &mut Thread, exception_type: ClassId) -> bool {
    let linker = rt.class_linker();
    if let Some(error) = linker.find_system_class(rt, thread, "Ljava/lang/Error;") {
        if rt.class(error).is_assignable_from(rt, exception_type) {
            return false;
        }
    }
    if let Some(runtime_exception) =
        linker.find_system_class(rt, thread, "Ljava/lang/RuntimeException;")
    {
        return !rt.class(runtime_exception).is_assignable_from(rt, exception_type);
    }
    true
}

/// Render a materialized method trace as `  at …` lines. The final entry of
/// the internal trace is bookkeeping, not a frame.
pub fn dump_stack(rt: &Runtime, method_trace: &[MethodId]) -> String {
    let depth = method_trace.len().saturating_sub(1);
    let mut result = String::new();
    for &method in &method_trace[..depth] {
        result.push_str("  at ");
        result.push_str(&rt.method(method).pretty(rt));
        result.push('\n');
    }
    result
}

// Stack-trace element layout past the header: three references and the line
// number.
pub const DECLARING_CLASS_OFFSET: usize = HEADER_SIZE;
pub const METHOD_NAME_OFFSET: usize = 16;
pub const FILE_NAME_OFFSET: usize = 24;
pub const LINE_NUMBER_OFFSET: usize = 32;
pub const STACK_TRACE_ELEMENT_SIZE: usize = 40;

pub fn alloc_stack_trace_element(
    rt: &Runtime,
    thread: &mut Thread,
    declaring_class: Object,
    method_name: Object,
    file_name: Object,
    line_number: i32,
) -> Option<Object> {
    let klass = rt.class(rt.well_known.stack_trace_element());
    let element = klass.alloc_object(rt, thread)?;
    element.set_field_ref(DECLARING_CLASS_OFFSET, declaring_class, false);
    element.set_field_ref(METHOD_NAME_OFFSET, method_name, false);
    element.set_field_ref(FILE_NAME_OFFSET, file_name, false);
    element.set_field32(LINE_NUMBER_OFFSET, line_number as u32, false);
    Some(element)
}
