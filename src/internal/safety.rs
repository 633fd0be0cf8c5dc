//! Safety conditions checked before a source block may be merged.
//!
//! 1. The source is last used at the merging statement. This is checked when
//!    a candidate is registered, see `candidates`.
//! 2. The destination is allocated before the source array is created.
//! 3. The destination (and anything aliasing it) is not used while the source
//!    is live, other than by the variables being coalesced.
//! 4. The source array is freshly created. Shape-only aliasing producers
//!    defer the check to their own source. This is handled by the transfer
//!    rules.
//! 5. The index function in the destination can be expressed with the
//!    variables in scope where the source array is created.

use alloc::collections::{BTreeMap, BTreeSet};

use super::env::{BottomUpEnv, TopDownEnv};
use super::free_vars::FreeVars;
use crate::function::{Function, Mem, Stmt, Var};
use crate::ixfun::{IxFun, PrimExp};
use crate::output::CoalesceEntry;

/// Condition 2: `dst` must already be allocated.
pub fn dst_allocated(td: &TopDownEnv, dst: Mem) -> bool {
    td.allocs.contains(&dst)
}

/// Condition 5: makes `ixfun` well-formed at the current program point.
pub fn translate_ixfun(
    td: &TopDownEnv,
    bu: &BottomUpEnv,
    ixfun: &IxFun,
) -> Option<(BTreeMap<Var, PrimExp>, IxFun)> {
    ixfun.substitute_free_vars(&|var| td.in_scope(var), &bu.scalars)
}

/// Returns whether an entry conflicts with a set of touched blocks.
fn interferes(entry: &CoalesceEntry, touched: &BTreeSet<Mem>) -> bool {
    touched.contains(&entry.dst) || entry.aliases.iter().any(|mem| touched.contains(mem))
}

/// Blocks touched by `stmt` from the point of view of `entry`, after alias
/// expansion.
///
/// Variables that are part of the entry's chain are not counted: they are
/// exactly the arrays being moved into the destination.
pub fn touched_by(
    func: &impl Function,
    free_vars: &FreeVars,
    td: &TopDownEnv,
    stmt: Stmt,
    entry: &CoalesceEntry,
) -> BTreeSet<Mem> {
    let mut touched = BTreeSet::new();
    free_vars.for_each_stmt_mem_filtered(
        func,
        stmt,
        |var| !entry.vars.contains_key(&var),
        |mem| {
            touched.insert(mem);
        },
    );
    td.expand_aliases(&mut touched);
    touched
}

/// Condition 3: fails every active entry whose destination is touched by
/// `stmt`.
pub fn filter_interference(
    func: &impl Function,
    free_vars: &FreeVars,
    td: &TopDownEnv,
    bu: &mut BottomUpEnv,
    stmt: Stmt,
) {
    bu.tables.fail_where(|_, entry| {
        let touched = touched_by(func, free_vars, td, stmt, entry);
        interferes(entry, &touched)
    });
}

/// Like [`filter_interference`] but ignores the given blocks, which are
/// known to be part of the coalescing chain of a loop.
pub fn loop_interferes(
    func: &impl Function,
    free_vars: &FreeVars,
    td: &TopDownEnv,
    stmt: Stmt,
    entry: &CoalesceEntry,
    chain: &BTreeSet<Mem>,
) -> bool {
    let mut touched = touched_by(func, free_vars, td, stmt, entry);
    touched.retain(|mem| !chain.contains(mem));
    interferes(entry, &touched)
}
