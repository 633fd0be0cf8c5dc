//! Checker which verifies that the coalescing decisions produced by the
//! analysis preserve the meaning of the input function.

use anyhow::{Context as _, Result, ensure};

use super::{DisplayFunction, Value, apply_coalescing, display_iter, interpret};
use crate::function::Function;
use crate::output::CoalesceTable;

/// Runs `func` on `args` before and after applying `table` and checks that
/// both produce the same results.
///
/// If the original function fails to execute on `args` (for example because
/// it reads out of bounds) there is nothing to compare and the check passes.
pub fn check_coalescing(func: &impl Function, table: &CoalesceTable, args: &[Value]) -> Result<()> {
    let Ok(expected) = interpret(func, args) else {
        trace!("Skipping check: the input function fails on these arguments");
        return Ok(());
    };
    let rewritten = apply_coalescing(func, table);
    let actual = interpret(&rewritten, args).with_context(|| {
        alloc::format!(
            "coalesced function fails on ({}):\n{}",
            display_iter(args, ","),
            DisplayFunction(&rewritten)
        )
    })?;
    ensure!(
        expected == actual,
        "coalescing changed the results on ({}): expected ({}), found ({})\n{}",
        display_iter(args, ","),
        display_iter(&expected, ","),
        display_iter(&actual, ","),
        DisplayFunction(&rewritten)
    );
    Ok(())
}
