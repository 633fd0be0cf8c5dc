//! Fixed point over the inhibit table.
//!
//! Each pass analyzes the whole function with the inhibitions found by the
//! previous passes. A pass may reject pairs that earlier passes accepted
//! optimistically, in which case those pairs are excluded from the start in
//! the next pass. The inhibit table only grows and is bounded by the number of
//! pairs of blocks, so this terminates.

use alloc::vec::Vec;

use super::env::{BottomUpEnv, TopDownEnv};
use super::free_vars::FreeVars;
use super::tables::{EntryTable, Tables, append_inhibit, new_inhibitions};
use super::transfer::Analysis;
use crate::function::{Function, Mem};
use crate::last_use::LastUses;
use crate::output::InhibitTable;
use crate::{CoalesceError, CoalescingLevel, Stats};

/// Final state of the fixed point.
pub struct FixedPoint {
    pub success: EntryTable,
    pub inhibit: InhibitTable,
    pub iterations: usize,
}

/// Runs passes until no new inhibitions are found.
pub fn run<F: Function, L: LastUses>(
    func: &F,
    last_uses: &L,
    free_vars: &FreeVars,
    level: CoalescingLevel,
    stats: &mut Stats,
) -> Result<FixedPoint, CoalesceError> {
    let max_iterations = func.num_mems().saturating_mul(func.num_mems()) + 1;
    let mut inherited = InhibitTable::new();
    let mut iterations = 0;
    loop {
        iterations += 1;
        if iterations > max_iterations {
            return Err(CoalesceError::InternalInvariant(
                "fixed point did not converge",
            ));
        }
        trace!("Coalescing pass {iterations}");

        let mut tables = pass(func, last_uses, free_vars, level, stats, &inherited)?;
        let fresh = new_inhibitions(&tables.inhibit, &inherited);
        if fresh.is_empty() {
            append_inhibit(&mut tables.inhibit, &inherited);
            return Ok(FixedPoint {
                success: tables.success,
                inhibit: tables.inhibit,
                iterations,
            });
        }
        trace!("{} blocks with new inhibitions", fresh.len());
        append_inhibit(&mut inherited, &fresh);
    }
}

/// One pass over the function.
fn pass<F: Function, L: LastUses>(
    func: &F,
    last_uses: &L,
    free_vars: &FreeVars,
    level: CoalescingLevel,
    stats: &mut Stats,
    inherited: &InhibitTable,
) -> Result<Tables, CoalesceError> {
    let mut td = TopDownEnv::new(func, inherited.clone());
    let mut bu = BottomUpEnv::default();
    Analysis {
        func,
        last_uses,
        free_vars,
        level,
        stats: &mut *stats,
    }
    .body(&mut td, &mut bu, func.entry_body());

    let mut tables = bu.tables;

    // Arrays in parameter blocks are never created by the function, so
    // their candidates can't be resolved.
    tables.fail_where(|mem, _| func.is_param_mem(mem));
    if !tables.active.is_empty() {
        trace!(
            "Unresolved entries: {:?}",
            tables.active.keys().collect::<Vec<_>>()
        );
        return Err(CoalesceError::InternalInvariant(
            "active table not empty after a full pass",
        ));
    }
    tables.success.retain(|mem, _| !func.is_param_mem(*mem));

    let removed = filter_deps(&mut tables);
    stat!(stats, dependency_failures, removed);
    Ok(tables)
}

/// Removes successful entries whose optimistic dependencies didn't succeed,
/// until every remaining dependency is satisfied. Returns the number of
/// removed entries.
pub fn filter_deps(tables: &mut Tables) -> usize {
    let mut removed = 0;
    loop {
        let broken: Vec<Mem> = tables
            .success
            .iter()
            .filter(|(_, entry)| {
                entry.deps.iter().any(|(var, mem)| {
                    !tables
                        .success
                        .get(mem)
                        .is_some_and(|dep| dep.vars.contains_key(var))
                })
            })
            .map(|(&mem, _)| mem)
            .collect();
        if broken.is_empty() {
            return removed;
        }
        for mem in broken {
            if let Some(entry) = tables.success.remove(&mem) {
                trace!("Dependency of {mem} into {} failed", entry.dst);
                tables.inhibit_pair(mem, entry.dst);
                removed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::{BTreeMap, BTreeSet};
    use alloc::vec;

    use super::*;
    use crate::function::Var;
    use crate::ixfun::{IxFun, PrimExp};
    use crate::output::CoalesceEntry;

    fn entry(dst: usize, vars: &[usize], deps: &[(usize, usize)]) -> CoalesceEntry {
        let ixfun = IxFun::iota(vec![PrimExp::Const(8)]);
        let record = |_| crate::output::CoalescedVar {
            kind: crate::output::CoalescedKind::InPlace,
            dst: Mem::new(dst),
            ixfun: ixfun.clone(),
            subst: BTreeMap::new(),
        };
        CoalesceEntry {
            dst: Mem::new(dst),
            ixfun: ixfun.clone(),
            aliases: BTreeSet::new(),
            vars: vars.iter().map(|&v| (Var::new(v), record(v))).collect(),
            deps: deps
                .iter()
                .map(|&(v, m)| (Var::new(v), Mem::new(m)))
                .collect(),
        }
    }

    #[test]
    fn broken_dependencies_cascade() {
        let mut tables = Tables::default();
        // mem1 depends on %1 in mem2, which depends on %2 in mem3, which is
        // missing. mem4 depends on mem1 too.
        tables.success.insert(Mem::new(1), entry(0, &[0], &[(1, 2)]));
        tables.success.insert(Mem::new(2), entry(0, &[1], &[(2, 3)]));
        tables.success.insert(Mem::new(4), entry(0, &[4], &[(0, 1)]));
        tables.success.insert(Mem::new(5), entry(0, &[5], &[]));
        assert_eq!(filter_deps(&mut tables), 3);
        assert_eq!(tables.success.keys().copied().collect::<Vec<_>>(), [Mem::new(5)]);
        assert_eq!(tables.inhibit.len(), 3);
    }

    #[test]
    fn mutual_dependencies_are_kept() {
        let mut tables = Tables::default();
        tables.success.insert(Mem::new(1), entry(0, &[1], &[(2, 2)]));
        tables.success.insert(Mem::new(2), entry(0, &[2], &[(1, 1)]));
        assert_eq!(filter_deps(&mut tables), 0);
        assert_eq!(tables.success.len(), 2);
    }
}
