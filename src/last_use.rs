//! Last-use information consumed by the coalescing analysis.
//!
//! The analysis only merges a source array into a destination at a statement
//! where the source is no longer needed afterwards. This information is
//! provided through the [`LastUses`] trait so that a client can supply the
//! results of its own liveness analysis. [`LastUseTable`] computes it directly
//! from a [`Function`].

use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::entity::SecondaryMap;
use crate::function::{Body, Exp, Function, Mem, Param, Stmt, Var};
use crate::internal::free_vars::FreeVars;

/// Oracle giving the variables whose lifetime ends at each statement.
pub trait LastUses {
    /// Variables read by `stmt` (or by its nested bodies) which are never read
    /// after `stmt` completes.
    ///
    /// A variable bound outside of the body containing `stmt` is never last
    /// used inside that body: its last use is the enclosing compound
    /// statement (or a later statement of an outer body).
    ///
    /// An array is only dead once its memory block is: if another array in
    /// the same block, such as an alias, is read later, neither is last used
    /// here. Arrays bound by `stmt` itself don't count.
    fn last_uses(&self, stmt: Stmt) -> &[Var];

    /// Returns whether `var` is last used at `stmt`.
    #[inline]
    fn is_last_use(&self, stmt: Stmt, var: Var) -> bool {
        self.last_uses(stmt).contains(&var)
    }
}

/// Last uses computed by a backward scan of each body.
///
/// Body results are live out of their body, so the variables they mention are
/// never last used within it. Inside a nested body, blocks holding arrays of
/// the enclosing bodies which may still be read are never considered dead.
#[derive(Debug, Clone, Default)]
pub struct LastUseTable {
    last_uses: SecondaryMap<Stmt, Vec<Var>>,
}

impl LastUseTable {
    /// Computes the last uses of every variable in `func`.
    #[must_use]
    pub fn compute(func: &impl Function) -> Self {
        let mut free_vars = FreeVars::new();
        free_vars.compute(func);
        let mut table = Self {
            last_uses: SecondaryMap::with_capacity(func.num_stmts()),
        };
        let params: SmallVec<[Var; 8]> = func
            .params()
            .iter()
            .filter_map(|param| match *param {
                Param::Var(var) => Some(var),
                Param::Mem(_) => None,
            })
            .collect();
        table.compute_body(
            func,
            &free_vars,
            func.entry_body(),
            &params,
            &HashSet::default(),
        );
        table
    }

    fn compute_body(
        &mut self,
        func: &impl Function,
        free_vars: &FreeVars,
        body: Body,
        bound_outside: &[Var],
        outer_mems: &HashSet<Mem, FxBuildHasher>,
    ) {
        let mut local: HashSet<Var, FxBuildHasher> = bound_outside.iter().copied().collect();
        for &stmt in func.body_stmts(body) {
            local.extend(func.stmt_pattern(stmt).iter().copied());
        }

        let mut live = LiveSet::default();
        for var in func.body_results(body).iter().filter_map(|se| se.var()) {
            live.insert(func, var);
        }

        let mut uses: SmallVec<[Var; 8]> = SmallVec::new();
        for &stmt in func.body_stmts(body).iter().rev() {
            for &var in func.stmt_pattern(stmt) {
                live.remove(func, var);
            }

            uses.clear();
            free_vars.for_each_stmt_use(func, stmt, |var| {
                if local.contains(&var) && !uses.contains(&var) {
                    uses.push(var);
                }
            });
            // An array dies only once nothing else reads its block.
            let mut last: Vec<Var> = uses
                .iter()
                .copied()
                .filter(|&var| {
                    !live.vars.contains(&var)
                        && func.var_mem(var).is_none_or(|info| {
                            !outer_mems.contains(&info.mem) && !live.in_block(info.mem)
                        })
                })
                .collect();
            last.sort_unstable();
            self.last_uses[stmt] = last;

            let exp = func.stmt_exp(stmt);
            for nested in exp.nested_bodies() {
                // Arrays of the enclosing bodies stay readable throughout.
                let mut inner_mems = outer_mems.clone();
                inner_mems.extend(live.mems.keys().copied());
                inner_mems.extend(
                    free_vars
                        .body_free_vars(nested)
                        .iter()
                        .filter_map(|&var| func.var_mem(var))
                        .map(|info| info.mem),
                );
                let bound: SmallVec<[Var; 8]> = match exp {
                    Exp::Loop { params, index, .. } => params
                        .iter()
                        .map(|param| param.var)
                        .chain([*index])
                        .collect(),
                    _ => SmallVec::new(),
                };
                self.compute_body(func, free_vars, nested, &bound, &inner_mems);
            }

            for &var in &uses {
                live.insert(func, var);
            }
        }
    }
}

/// Variables live at a program point, with the number of live arrays in each
/// memory block.
#[derive(Default)]
struct LiveSet {
    vars: HashSet<Var, FxBuildHasher>,
    mems: HashMap<Mem, usize, FxBuildHasher>,
}

impl LiveSet {
    fn insert(&mut self, func: &impl Function, var: Var) {
        if self.vars.insert(var) {
            if let Some(info) = func.var_mem(var) {
                *self.mems.entry(info.mem).or_default() += 1;
            }
        }
    }

    fn remove(&mut self, func: &impl Function, var: Var) {
        if !self.vars.remove(&var) {
            return;
        }
        let Some(info) = func.var_mem(var) else {
            return;
        };
        if let Some(count) = self.mems.get_mut(&info.mem) {
            *count -= 1;
            if *count == 0 {
                self.mems.remove(&info.mem);
            }
        }
    }

    fn in_block(&self, mem: Mem) -> bool {
        self.mems.contains_key(&mem)
    }
}

impl LastUses for LastUseTable {
    #[inline]
    fn last_uses(&self, stmt: Stmt) -> &[Var] {
        &self.last_uses[stmt]
    }
}

#[cfg(all(test, feature = "parse"))]
mod tests {
    use super::*;
    use crate::debug_utils::GenericFunction;

    #[test]
    fn straight_line() {
        let func = GenericFunction::parse(
            "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    mem1 = alloc %0
    %2: [%0]i64 @ mem1 = map add %1 1
    %3: i64 = index %2[0]
    %4: i64 = add %3 %0
    return %4, %0
}
",
        )
        .unwrap();
        let table = LastUseTable::compute(&func);
        let stmts = func.body_stmts(func.entry_body());
        assert!(table.last_uses(stmts[0]).is_empty());
        assert_eq!(table.last_uses(stmts[1]), &[Var::new(1)]);
        assert_eq!(table.last_uses(stmts[2]), &[Var::new(2)]);
        // %0 is returned, so only %3 dies here.
        assert_eq!(table.last_uses(stmts[3]), &[Var::new(3)]);
    }

    #[test]
    fn outer_vars_die_at_compound_statement() {
        let func = GenericFunction::parse(
            "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    mem1 = alloc %0
    %2: [%0]i64 @ mem1 = loop (%3: [%0]i64 @ mem1 = %1) for %4 < %0 {
        %5: i64 = index %1[%4]
        %6: [%0]i64 @ mem1 = update %3[%4] = %5
        yield %6
    }
    return %2
}
",
        )
        .unwrap();
        let table = LastUseTable::compute(&func);
        let stmts = func.body_stmts(func.entry_body());
        assert_eq!(table.last_uses(stmts[1]), &[Var::new(0), Var::new(1)]);

        let Exp::Loop { body, .. } = func.stmt_exp(stmts[1]) else {
            unreachable!();
        };
        let inner = func.body_stmts(*body);
        // %1 and %0 are read in every iteration and are not attributed here.
        assert!(table.last_uses(inner[0]).is_empty());
        assert_eq!(table.last_uses(inner[1]), &[Var::new(3), Var::new(4), Var::new(5)]);
    }

    #[test]
    fn aliases_keep_the_block_alive() {
        let func = GenericFunction::parse(
            "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0, %2: bool) {
    mem1 = alloc %0
    mem2 = alloc %0
    %3: [%0]i64 @ mem1 = map add %1 1
    %4: [%0]i64 @ mem1 = %3
    %5: [%0]i64 @ mem2 = copy %4
    %6: i64 = if %2 {
        %7: [%0]i64 @ mem1 = %3
        %8: i64 = index %7[0]
        yield %8
    } else {
        yield 0
    }
    return %5, %6
}
",
        )
        .unwrap();
        let table = LastUseTable::compute(&func);
        let stmts = func.body_stmts(func.entry_body());
        // %3 is still read through the branch, so %4 can't die at the copy.
        assert!(table.last_uses(stmts[4]).is_empty());
        assert_eq!(table.last_uses(stmts[5]), &[Var::new(2), Var::new(3)]);

        let Exp::If { then_body, .. } = func.stmt_exp(stmts[5]) else {
            unreachable!();
        };
        // %3 is visible from the branch, so mem1 stays readable there.
        let inner = func.body_stmts(*then_body);
        assert!(table.last_uses(inner[1]).is_empty());
    }
}
