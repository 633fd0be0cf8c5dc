//! Coalescing tables and the primitives that update them.
//!
//! Entries move from the active table to either the success table (through
//! [`Tables::mark_success`]) or the inhibit table (through
//! [`Tables::mark_failed`]). An entry is never removed from the active table
//! any other way: this is what guarantees that the fixed point terminates,
//! since every failure grows the inhibit table.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::function::{Mem, Var};
use crate::ixfun::PrimExp;
use crate::output::{CoalesceEntry, InhibitTable};

/// Known values of scalar variables, as expressions over other variables.
pub type ScalarTable = BTreeMap<Var, PrimExp>;

/// Candidate entries keyed by source block.
pub type EntryTable = BTreeMap<Mem, CoalesceEntry>;

/// Returns whether merging `src` into `dst` was already rejected.
pub fn is_inhibited(inhibit: &InhibitTable, src: Mem, dst: Mem) -> bool {
    inhibit.get(&src).is_some_and(|dsts| dsts.contains(&dst))
}

/// Adds all pairs of `other` to `inhibit`.
pub fn append_inhibit(inhibit: &mut InhibitTable, other: &InhibitTable) {
    for (&src, dsts) in other {
        inhibit.entry(src).or_default().extend(dsts.iter().copied());
    }
}

/// Returns the pairs of `inhibit` that are not in `known`.
pub fn new_inhibitions(inhibit: &InhibitTable, known: &InhibitTable) -> InhibitTable {
    let mut out = InhibitTable::new();
    for (&src, dsts) in inhibit {
        let fresh: BTreeSet<Mem> = dsts
            .iter()
            .copied()
            .filter(|&dst| !is_inhibited(known, src, dst))
            .collect();
        if !fresh.is_empty() {
            out.insert(src, fresh);
        }
    }
    out
}

/// Merges entry `b` into `a` if both describe the same placement.
fn merge_entry(a: &mut CoalesceEntry, b: CoalesceEntry) -> Result<(), CoalesceEntry> {
    if a.dst != b.dst || a.ixfun != b.ixfun {
        return Err(b);
    }
    a.aliases.extend(b.aliases);
    a.vars.extend(b.vars);
    a.deps.extend(b.deps);
    Ok(())
}

/// The active, success and inhibit tables of one traversal.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub active: EntryTable,
    pub success: EntryTable,
    pub inhibit: InhibitTable,
}

impl Tables {
    /// Records that `src` can't be merged into `dst`.
    pub fn inhibit_pair(&mut self, src: Mem, dst: Mem) {
        self.inhibit.entry(src).or_default().insert(dst);
    }

    /// Removes an active entry and records its failure.
    ///
    /// Does nothing if `mem` is not active.
    pub fn mark_failed(&mut self, mem: Mem) {
        if let Some(entry) = self.active.remove(&mem) {
            trace!("Coalescing {mem} into {} failed", entry.dst);
            self.inhibit_pair(mem, entry.dst);
        }
    }

    /// Fails every active entry for which `pred` returns true.
    pub fn fail_where(&mut self, mut pred: impl FnMut(Mem, &CoalesceEntry) -> bool) {
        let failed: Vec<Mem> = self
            .active
            .iter()
            .filter(|&(&mem, entry)| pred(mem, entry))
            .map(|(&mem, _)| mem)
            .collect();
        for mem in failed {
            self.mark_failed(mem);
        }
    }

    /// Fails every active entry.
    pub fn fail_all(&mut self) {
        self.fail_where(|_, _| true);
    }

    /// Adds an entry to the success table.
    ///
    /// If the block already has a successful entry with the same placement,
    /// the two are merged. Conflicting placements reject both entries.
    /// Returns whether the entry was accepted.
    pub fn mark_success(&mut self, mem: Mem, entry: CoalesceEntry) -> bool {
        trace!("Coalescing {mem} into {} succeeded", entry.dst);
        let Some(existing) = self.success.get_mut(&mem) else {
            self.success.insert(mem, entry);
            return true;
        };
        match merge_entry(existing, entry) {
            Ok(()) => true,
            Err(entry) => {
                trace!("Conflicting placements for {mem}");
                let existing_dst = existing.dst;
                self.success.remove(&mem);
                self.inhibit_pair(mem, existing_dst);
                self.inhibit_pair(mem, entry.dst);
                false
            }
        }
    }

    /// Moves an active entry to the success table.
    pub fn promote(&mut self, mem: Mem) -> bool {
        match self.active.remove(&mem) {
            Some(entry) => self.mark_success(mem, entry),
            None => false,
        }
    }

    /// Merges the success and inhibit tables of `other` into `self`.
    ///
    /// Active entries of `other` are ignored: the caller is responsible for
    /// deciding what happens to them.
    pub fn union_resolved(&mut self, other: Tables) {
        append_inhibit(&mut self.inhibit, &other.inhibit);
        for (mem, entry) in other.success {
            self.mark_success(mem, entry);
        }
    }

    /// Returns the entry currently associated with `mem`, looking at the
    /// active table first.
    pub fn lookup(&self, mem: Mem) -> Option<&CoalesceEntry> {
        self.active.get(&mem).or_else(|| self.success.get(&mem))
    }

    /// Returns whether `mem` has an active or successful entry.
    pub fn contains(&self, mem: Mem) -> bool {
        self.active.contains_key(&mem) || self.success.contains_key(&mem)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::ixfun::IxFun;

    fn entry(dst: usize, size: i64) -> CoalesceEntry {
        CoalesceEntry {
            dst: Mem::new(dst),
            ixfun: IxFun::iota(vec![PrimExp::Const(size)]),
            aliases: BTreeSet::new(),
            vars: BTreeMap::new(),
            deps: BTreeMap::new(),
        }
    }

    #[test]
    fn failure_is_recorded() {
        let mut tables = Tables::default();
        tables.active.insert(Mem::new(1), entry(0, 4));
        tables.active.insert(Mem::new(2), entry(0, 4));
        tables.fail_where(|mem, _| mem == Mem::new(2));
        assert!(tables.active.contains_key(&Mem::new(1)));
        assert!(is_inhibited(&tables.inhibit, Mem::new(2), Mem::new(0)));
        assert!(!is_inhibited(&tables.inhibit, Mem::new(1), Mem::new(0)));
    }

    #[test]
    fn conflicting_success_rejects_both() {
        let mut tables = Tables::default();
        assert!(tables.mark_success(Mem::new(1), entry(0, 4)));
        assert!(tables.mark_success(Mem::new(1), entry(0, 4)));
        assert!(!tables.mark_success(Mem::new(1), entry(3, 4)));
        assert!(tables.success.is_empty());
        assert!(is_inhibited(&tables.inhibit, Mem::new(1), Mem::new(0)));
        assert!(is_inhibited(&tables.inhibit, Mem::new(1), Mem::new(3)));
    }

    #[test]
    fn only_new_pairs_are_reported() {
        let mut known = InhibitTable::new();
        known.entry(Mem::new(1)).or_default().insert(Mem::new(0));
        let mut found = known.clone();
        found.entry(Mem::new(1)).or_default().insert(Mem::new(2));
        let fresh = new_inhibitions(&found, &known);
        assert_eq!(fresh.len(), 1);
        assert!(is_inhibited(&fresh, Mem::new(1), Mem::new(2)));
        assert!(new_inhibitions(&known, &known).is_empty());
    }
}
