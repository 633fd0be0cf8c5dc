//! Reference implementation of the rewrite described by a [`CoalesceTable`].

use crate::debug_utils::GenericFunction;
use crate::function::{Function, MemInfo};
use crate::output::CoalesceTable;

/// Applies the coalescing decisions in `table` to `func`.
///
/// Every array variable living in an eliminated block which has a record in
/// that block's entry is moved to the record's destination block and index
/// function. Everything else, including the `alloc` statements of eliminated
/// blocks, is left unchanged so the result can be compared against the input
/// by the interpreter.
#[must_use]
pub fn apply_coalescing(func: &impl Function, table: &CoalesceTable) -> GenericFunction {
    let mut out = GenericFunction::from_function(func);
    for var in func.vars() {
        let Some(info) = func.var_mem(var) else {
            continue;
        };
        let Some(record) = table.get(info.mem).and_then(|entry| entry.var(var)) else {
            continue;
        };
        trace!("{var}: {} -> {} {}", info.mem, record.dst(), record.ixfun());
        out.set_var_mem(
            var,
            MemInfo {
                mem: record.dst(),
                ixfun: record.ixfun().clone(),
            },
        );
    }
    out
}
