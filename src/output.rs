//! Results of the coalescing analysis.
//!
//! The main result is the [`CoalesceTable`]: for each memory block that can be
//! eliminated, the block its arrays should be placed in instead, and for each
//! variable living in the eliminated block, the index function it should use
//! in the destination block.
//!
//! A rewrite pass consuming the table replaces the memory annotation of every
//! variable `v` in block `m` for which `table.get(m)` has a record for `v` with
//! that record's destination and index function. See
//! [`apply_coalescing`](crate::debug_utils::apply_coalescing) for a reference
//! implementation.

use alloc::collections::{BTreeMap, BTreeSet};
use core::fmt;

use crate::debug_utils::display_iter;
use crate::function::{Mem, Var};
use crate::ixfun::{IxFun, PrimExp};
use crate::{Coalescer, Stats};

/// Pairs of blocks for which coalescing was attempted and rejected, keyed by
/// source block.
pub type InhibitTable = BTreeMap<Mem, BTreeSet<Mem>>;

/// Which kind of statement introduced a coalescing opportunity.
///
/// This is informational only: all kinds are subject to the same safety
/// checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoalescedKind {
    /// The variable is rebound in place, e.g. as the source of an in-place
    /// update or as a branch or loop result.
    InPlace,

    /// The variable is the source of a copy.
    Copy,

    /// The variable is an operand of a concatenation.
    Concat,

    /// The variable is coalesced into a block which is itself coalesced
    /// further.
    Transitive,
}

impl fmt::Display for CoalescedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoalescedKind::InPlace => "in-place",
            CoalescedKind::Copy => "copy",
            CoalescedKind::Concat => "concat",
            CoalescedKind::Transitive => "transitive",
        };
        f.write_str(name)
    }
}

/// Where a variable is placed after coalescing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoalescedVar {
    pub(crate) kind: CoalescedKind,
    pub(crate) dst: Mem,
    pub(crate) ixfun: IxFun,
    pub(crate) subst: BTreeMap<Var, PrimExp>,
}

impl CoalescedVar {
    /// How the coalescing opportunity was found.
    #[must_use]
    pub fn kind(&self) -> CoalescedKind {
        self.kind
    }

    /// Destination memory block.
    #[must_use]
    pub fn dst(&self) -> Mem {
        self.dst
    }

    /// Index function of the variable in the destination block.
    #[must_use]
    pub fn ixfun(&self) -> &IxFun {
        &self.ixfun
    }

    /// Substitution which was applied to make the index function refer only
    /// to variables in scope where the variable is defined.
    #[must_use]
    pub fn subst(&self) -> &BTreeMap<Var, PrimExp> {
        &self.subst
    }
}

/// A coalescing entry: a source block and everything needed to place its
/// arrays in a destination block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoalesceEntry {
    /// Destination block.
    pub(crate) dst: Mem,

    /// Maps the base region of the source block into the destination block.
    pub(crate) ixfun: IxFun,

    /// Blocks known to alias the destination.
    pub(crate) aliases: BTreeSet<Mem>,

    /// Variables of the source block and where they go.
    pub(crate) vars: BTreeMap<Var, CoalescedVar>,

    /// Optimistic dependencies: the entry is only valid if each listed
    /// variable is coalesced as part of the entry for the listed block.
    pub(crate) deps: BTreeMap<Var, Mem>,
}

impl CoalesceEntry {
    /// Destination memory block.
    #[must_use]
    pub fn dst(&self) -> Mem {
        self.dst
    }

    /// Index function mapping the base region of the source block into the
    /// destination block.
    #[must_use]
    pub fn ixfun(&self) -> &IxFun {
        &self.ixfun
    }

    /// Blocks which alias the destination block.
    #[must_use]
    pub fn aliases(&self) -> &BTreeSet<Mem> {
        &self.aliases
    }

    /// Records for each variable living in the source block.
    pub fn vars(&self) -> impl ExactSizeIterator<Item = (Var, &CoalescedVar)> + '_ {
        self.vars.iter().map(|(&var, record)| (var, record))
    }

    /// Returns the record for `var`, if it is part of this entry.
    #[must_use]
    pub fn var(&self, var: Var) -> Option<&CoalescedVar> {
        self.vars.get(&var)
    }

    /// Optimistic dependencies that were satisfied for this entry to be
    /// accepted.
    #[must_use]
    pub fn deps(&self) -> &BTreeMap<Var, Mem> {
        &self.deps
    }
}

/// The final coalescing decisions for a function, keyed by source block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoalesceTable {
    pub(crate) entries: BTreeMap<Mem, CoalesceEntry>,
}

impl CoalesceTable {
    /// Returns the entry for a source block.
    #[must_use]
    pub fn get(&self, mem: Mem) -> Option<&CoalesceEntry> {
        self.entries.get(&mem)
    }

    /// Iterates over all entries, ordered by source block.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (Mem, &CoalesceEntry)> + '_ {
        self.entries.iter().map(|(&mem, entry)| (mem, entry))
    }

    /// Number of eliminated blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no block is eliminated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the new location of a variable, if it is coalesced.
    #[must_use]
    pub fn target(&self, var: Var) -> Option<&CoalescedVar> {
        self.entries.values().find_map(|entry| entry.vars.get(&var))
    }
}

impl fmt::Display for CoalesceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.dst, self.ixfun)?;
        if !self.aliases.is_empty() {
            write!(f, " aliases [{}]", display_iter(&self.aliases, ","))?;
        }
        for (var, record) in &self.vars {
            write!(f, "\n    {var}: {} {}", record.kind, record.ixfun)?;
            for (v, e) in &record.subst {
                write!(f, " [{v} = {e}]")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for CoalesceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (mem, entry) in &self.entries {
            writeln!(f, "{mem} -> {entry}")?;
        }
        Ok(())
    }
}

/// Result of running the coalescing analysis on a function.
pub struct Output<'a> {
    pub(crate) coalescer: &'a Coalescer,
}

impl Output<'_> {
    /// The blocks to eliminate and where their arrays go.
    #[must_use]
    pub fn table(&self) -> &CoalesceTable {
        &self.coalescer.table
    }

    /// All pairs of blocks which were rejected, including those inherited
    /// from earlier iterations of the fixed point.
    #[must_use]
    pub fn inhibited(&self) -> &InhibitTable {
        &self.coalescer.inhibit
    }

    /// Number of passes over the function which were needed to reach the
    /// fixed point.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.coalescer.iterations
    }

    /// Statistics collected during the analysis.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.coalescer.stats
    }
}

impl fmt::Display for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; success")?;
        write!(f, "{}", self.table())?;
        writeln!(f, "; inhibit")?;
        for (mem, dsts) in self.inhibited() {
            writeln!(f, "{mem} -/> {}", display_iter(dsts, ","))?;
        }
        writeln!(f, "; iterations: {}", self.iterations())
    }
}
