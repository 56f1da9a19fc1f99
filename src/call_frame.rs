//! Call frames: pushed on `CALL`/`CALLDISCARD`, popped on `RETURNVOID`/`RETURNVAL`.

use crate::module::LocalArrayTable;

/// One function invocation's locals, local arrays, and the site to resume at on return.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub function_module: usize,
    pub function_index: usize,
    pub return_module: usize,
    pub return_ip: usize,
    /// Base index into the evaluation stack where this frame's locals begin (params already in
    /// place below that point are aliased, not copied).
    pub locals_base: usize,
    pub locals: Vec<i32>,
    pub arrays: Vec<i32>,
    pub arrays_table: LocalArrayTable,
    pub discard_return_value: bool,
}
