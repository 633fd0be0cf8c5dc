//! Recognition of coalescing opportunities.
//!
//! Three kinds of statements move the contents of one array into another
//! location and are therefore candidates for coalescing:
//!
//! - `y = copy b`: `b` can be placed where `y` is.
//! - `y = update xs[slice] = b`: `b` can be placed in the updated slice.
//! - `y = concat b0, .., bn`: each `bi` can be placed at its offset in `y`.
//!
//! If `y`'s own block is already being coalesced into some other block then
//! the candidate is composed through it, so that `b` goes directly into the
//! final destination.

use alloc::collections::{BTreeMap, BTreeSet};

use super::env::{BottomUpEnv, TopDownEnv};
use super::tables::is_inhibited;
use super::transfer::Analysis;
use crate::function::{DimIndex, Exp, Function, Mem, Stmt, SubExp, Var};
use crate::ixfun::{IxFun, PrimExp, invert_permutation};
use crate::last_use::LastUses;
use crate::output::{CoalesceEntry, CoalescedKind, CoalescedVar};

impl<F: Function, L: LastUses> Analysis<'_, F, L> {
    /// Registers the candidates introduced by `stmt`.
    pub(super) fn register_candidates(
        &mut self,
        td: &TopDownEnv,
        bu: &mut BottomUpEnv,
        stmt: Stmt,
    ) {
        let func = self.func;
        let Some(&y) = func.stmt_pattern(stmt).first() else {
            return;
        };
        match func.stmt_exp(stmt) {
            Exp::Copy(b) => {
                if let Some(info) = func.var_mem(y) {
                    let target = info.ixfun.clone();
                    self.try_candidate(td, bu, stmt, y, *b, CoalescedKind::Copy, target);
                }
            }
            Exp::Update {
                array,
                slice,
                value: SubExp::Var(b),
            } => {
                if func.var_mem(*b).is_none() {
                    return;
                }
                if let Some(target) = func.var_mem(*array).and_then(|info| info.ixfun.slice(slice))
                {
                    self.try_candidate(td, bu, stmt, y, *b, CoalescedKind::InPlace, target);
                }
            }
            Exp::Concat(args) => {
                let Some(info) = func.var_mem(y) else {
                    return;
                };
                let mut offset = PrimExp::Const(0);
                for &b in args {
                    let Some(&len) = func.var_type(b).shape().and_then(|shape| shape.first())
                    else {
                        return;
                    };
                    let part = info.ixfun.offset_index(offset.clone()).and_then(|ix| {
                        ix.slice(&[DimIndex::Range {
                            start: SubExp::Const(0),
                            len,
                            stride: SubExp::Const(1),
                        }])
                    });
                    if let Some(target) = part {
                        self.try_candidate(td, bu, stmt, y, b, CoalescedKind::Concat, target);
                    }
                    offset = PrimExp::add(offset, len.to_prim_exp());
                }
            }
            _ => {}
        }
    }

    /// Tries to register a candidate placing `b` at `target`, an index
    /// function in the block of `y`.
    fn try_candidate(
        &mut self,
        td: &TopDownEnv,
        bu: &mut BottomUpEnv,
        stmt: Stmt,
        y: Var,
        b: Var,
        kind: CoalescedKind,
        target: IxFun,
    ) {
        let func = self.func;
        let (Some(y_info), Some(b_info)) = (func.var_mem(y), func.var_mem(b)) else {
            return;
        };
        let (m_y, m_b) = (y_info.mem, b_info.mem);
        if m_b == m_y || func.is_param_mem(m_b) || bu.tables.contains(m_b) {
            return;
        }

        // The source must fill its whole block so that the block can be
        // described by a single index function in the destination.
        let Some(perm) = b_info.ixfun.direct_permutation() else {
            trace!("Not coalescing {b}: {} is not a direct layout", b_info.ixfun);
            return;
        };
        let Some(region) = target.permute(&invert_permutation(&perm)) else {
            return;
        };

        let (dst, ixfun, aliases, deps, kind) = match bu.tables.lookup(m_y) {
            Some(outer) => {
                let Some(ixfun) = outer.ixfun.rebase(&region) else {
                    return;
                };
                let mut aliases = outer.aliases.clone();
                aliases.insert(m_y);
                let deps = BTreeMap::from([(y, m_y)]);
                (outer.dst, ixfun, aliases, deps, CoalescedKind::Transitive)
            }
            None => (m_y, region, td.dst_aliases(m_y), BTreeMap::new(), kind),
        };
        if dst == m_b || is_inhibited(&td.inhibit, m_b, dst) {
            return;
        }
        let Some(var_ixfun) = ixfun.rebase(&b_info.ixfun) else {
            return;
        };

        // Condition 1: the source must die here.
        if !self.last_uses.is_last_use(stmt, b) {
            trace!("Not coalescing {b}: not last used at {stmt}");
            stat!(self.stats, not_last_use);
            bu.tables.inhibit_pair(m_b, dst);
            return;
        }

        trace!("New candidate: {m_b} into {dst} for {b} ({kind})");
        stat!(self.stats, candidates);
        let record = CoalescedVar {
            kind,
            dst,
            ixfun: var_ixfun,
            subst: BTreeMap::new(),
        };
        bu.tables.active.insert(
            m_b,
            CoalesceEntry {
                dst,
                ixfun,
                aliases,
                vars: BTreeMap::from([(b, record)]),
                deps,
            },
        );
    }
}

/// Record for a variable placed exactly like the base region of `model`'s
/// source block, or `None` if `ixfun` doesn't fit that region.
pub(super) fn in_place_record(model: &CoalesceEntry, ixfun: &IxFun) -> Option<CoalescedVar> {
    Some(CoalescedVar {
        kind: CoalescedKind::InPlace,
        dst: model.dst,
        ixfun: model.ixfun.rebase(ixfun)?,
        subst: BTreeMap::new(),
    })
}

/// Builds an entry for another block that follows `model` into the same
/// destination, holding the single variable `var`.
///
/// The base region of the new block must have the same shape as the one of
/// `model`'s block.
pub(super) fn follow_entry(
    model: &CoalesceEntry,
    var: Var,
    record: CoalescedVar,
    deps: BTreeMap<Var, Mem>,
    extra_alias: Option<Mem>,
) -> CoalesceEntry {
    let mut aliases: BTreeSet<Mem> = model.aliases.clone();
    aliases.extend(extra_alias);
    CoalesceEntry {
        dst: model.dst,
        ixfun: model.ixfun.clone(),
        aliases,
        vars: BTreeMap::from([(var, record)]),
        deps,
    }
}
