//! Environments threaded through the traversal.
//!
//! The [`TopDownEnv`] holds facts about the program point being analyzed
//! which flow from enclosing statements into nested bodies: the variables in
//! scope, the blocks allocated so far and the aliasing introduced by loops.
//! It is restored when leaving a body.
//!
//! The [`BottomUpEnv`] holds the coalescing tables and the scalar table, which
//! accumulate as statements are processed in reverse order and flow out of
//! nested bodies into the enclosing statement.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use hashbrown::HashSet;
use rustc_hash::FxBuildHasher;

use super::tables::{ScalarTable, Tables};
use crate::function::{Exp, Function, Mem, Param, Stmt, Var};
use crate::output::InhibitTable;

pub struct TopDownEnv {
    /// Blocks allocated before the current statement, including memory
    /// parameters.
    pub allocs: HashSet<Mem, FxBuildHasher>,

    /// Variables bound before the current statement.
    pub scope: HashSet<Var, FxBuildHasher>,

    /// Inhibitions inherited from previous iterations of the fixed point.
    pub inhibit: InhibitTable,

    /// Pairs of blocks that must be treated as aliases of each other inside
    /// the loop bodies currently being analyzed.
    mem_aliases: Vec<(Mem, Mem)>,

    /// Blocks associated with each loop pattern block of the enclosing loops.
    loop_tab: Vec<(Mem, BTreeSet<Mem>)>,
}

impl TopDownEnv {
    /// Creates the environment at the start of a function.
    pub fn new(func: &impl Function, inhibit: InhibitTable) -> Self {
        let mut env = Self {
            allocs: HashSet::default(),
            scope: HashSet::default(),
            inhibit,
            mem_aliases: Vec::new(),
            loop_tab: Vec::new(),
        };
        for param in func.params() {
            match *param {
                Param::Mem(mem) => {
                    env.allocs.insert(mem);
                }
                Param::Var(var) => {
                    env.scope.insert(var);
                }
            }
        }
        env
    }

    /// Adds the effect of a statement to the environment.
    pub fn bind(&mut self, func: &impl Function, stmt: Stmt) {
        self.scope.extend(func.stmt_pattern(stmt).iter().copied());
        if let Exp::Alloc { mem, .. } = func.stmt_exp(stmt) {
            self.allocs.insert(*mem);
        }
    }

    /// Reverts [`TopDownEnv::bind`].
    pub fn unbind(&mut self, func: &impl Function, stmt: Stmt) {
        for var in func.stmt_pattern(stmt) {
            self.scope.remove(var);
        }
        if let Exp::Alloc { mem, .. } = func.stmt_exp(stmt) {
            self.allocs.remove(mem);
        }
    }

    /// Returns whether `var` is in scope.
    pub fn in_scope(&self, var: Var) -> bool {
        self.scope.contains(&var)
    }

    /// Returns the depth of the alias and loop stacks, to be passed to
    /// [`TopDownEnv::restore`] when leaving a loop body.
    pub fn checkpoint(&self) -> (usize, usize) {
        (self.mem_aliases.len(), self.loop_tab.len())
    }

    /// Drops the facts added since `checkpoint`.
    pub fn restore(&mut self, checkpoint: (usize, usize)) {
        self.mem_aliases.truncate(checkpoint.0);
        self.loop_tab.truncate(checkpoint.1);
    }

    /// Records that `a` and `b` alias each other.
    pub fn add_alias(&mut self, a: Mem, b: Mem) {
        if a != b {
            self.mem_aliases.push((a, b));
        }
    }

    /// Records the blocks involved in a loop with pattern block `mem`.
    pub fn add_loop(&mut self, mem: Mem, blocks: BTreeSet<Mem>) {
        self.loop_tab.push((mem, blocks));
    }

    /// Adds to `mems` every block that aliases one of its members.
    pub fn expand_aliases(&self, mems: &mut BTreeSet<Mem>) {
        if self.mem_aliases.is_empty() {
            return;
        }
        loop {
            let mut changed = false;
            for &(a, b) in &self.mem_aliases {
                if mems.contains(&a) {
                    changed |= mems.insert(b);
                }
                if mems.contains(&b) {
                    changed |= mems.insert(a);
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Blocks to consider as aliases of a new destination block: its alias
    /// closure plus the blocks of every enclosing loop it takes part in.
    pub fn dst_aliases(&self, dst: Mem) -> BTreeSet<Mem> {
        let mut aliases = BTreeSet::new();
        aliases.insert(dst);
        self.expand_aliases(&mut aliases);
        for (_, blocks) in &self.loop_tab {
            if blocks.contains(&dst) {
                aliases.extend(blocks.iter().copied());
            }
        }
        aliases.remove(&dst);
        aliases
    }
}

#[derive(Debug, Clone, Default)]
pub struct BottomUpEnv {
    pub scalars: ScalarTable,
    pub tables: Tables,
}
