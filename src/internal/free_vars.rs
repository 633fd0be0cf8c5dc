//! Per-body summary of free variables and internally touched memory blocks.
//!
//! A compound statement (`if` or `loop`) reads every variable that its nested
//! bodies use without binding, and writes every memory block that an array
//! bound inside those bodies lives in. Both sets are computed once per body so
//! that the transfer rules and the last-use table can treat a compound
//! statement like any other.

use alloc::vec::Vec;

use hashbrown::HashSet;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::entity::SecondaryMap;
use crate::function::{Body, Exp, Function, Mem, Stmt, SubExp, Var};

#[derive(Default, Clone, Debug)]
struct BodySummary {
    /// Variables used in the body but bound outside of it, sorted.
    free_vars: Vec<Var>,

    /// Memory blocks of arrays bound inside the body (including loop
    /// parameters) and blocks allocated inside it, sorted.
    inner_mems: Vec<Mem>,
}

pub struct FreeVars {
    bodies: SecondaryMap<Body, BodySummary>,
}

impl FreeVars {
    pub fn new() -> Self {
        Self {
            bodies: SecondaryMap::new(),
        }
    }

    /// Computes the summary of every body reachable from the entry body.
    pub fn compute(&mut self, func: &impl Function) {
        self.bodies.clear();
        self.bodies.resize(func.num_bodies());
        self.compute_body(func, func.entry_body(), &[]);
    }

    fn compute_body(&mut self, func: &impl Function, body: Body, bound_outside: &[Var]) {
        let mut bound: HashSet<Var, FxBuildHasher> = bound_outside.iter().copied().collect();
        let mut used: HashSet<Var, FxBuildHasher> = HashSet::default();
        let mut inner_mems: HashSet<Mem, FxBuildHasher> = HashSet::default();

        for &var in bound_outside {
            if let Some(info) = func.var_mem(var) {
                inner_mems.insert(info.mem);
            }
        }

        for &stmt in func.body_stmts(body) {
            let exp = func.stmt_exp(stmt);
            exp.for_each_use(|var| {
                used.insert(var);
            });
            match exp {
                Exp::Alloc { mem, .. } => {
                    inner_mems.insert(*mem);
                }
                Exp::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    for nested in [*then_body, *else_body] {
                        self.compute_body(func, nested, &[]);
                        let summary = &self.bodies[nested];
                        used.extend(summary.free_vars.iter().copied());
                        inner_mems.extend(summary.inner_mems.iter().copied());
                    }
                }
                Exp::Loop {
                    params,
                    index,
                    body: nested,
                    ..
                } => {
                    let mut loop_bound: SmallVec<[Var; 8]> =
                        params.iter().map(|param| param.var).collect();
                    loop_bound.push(*index);
                    self.compute_body(func, *nested, &loop_bound);
                    let summary = &self.bodies[*nested];
                    used.extend(summary.free_vars.iter().copied());
                    inner_mems.extend(summary.inner_mems.iter().copied());
                }
                _ => {}
            }
            for &var in func.stmt_pattern(stmt) {
                bound.insert(var);
                if let Some(info) = func.var_mem(var) {
                    inner_mems.insert(info.mem);
                }
            }
        }
        for result in func.body_results(body) {
            if let SubExp::Var(var) = *result {
                used.insert(var);
            }
        }

        let mut free_vars: Vec<Var> = used.into_iter().filter(|v| !bound.contains(v)).collect();
        free_vars.sort_unstable();
        let mut inner_mems: Vec<Mem> = inner_mems.into_iter().collect();
        inner_mems.sort_unstable();
        self.bodies[body] = BodySummary {
            free_vars,
            inner_mems,
        };
    }

    /// Variables used inside `body` but bound outside of it.
    pub fn body_free_vars(&self, body: Body) -> &[Var] {
        &self.bodies[body].free_vars
    }

    /// Memory blocks written or allocated inside `body`.
    pub fn body_inner_mems(&self, body: Body) -> &[Mem] {
        &self.bodies[body].inner_mems
    }

    /// Calls `f` on every variable read by `stmt`, including variables read
    /// by its nested bodies. A variable may be reported more than once.
    pub fn for_each_stmt_use(&self, func: &impl Function, stmt: Stmt, mut f: impl FnMut(Var)) {
        let exp = func.stmt_exp(stmt);
        exp.for_each_use(&mut f);
        for body in exp.nested_bodies() {
            self.body_free_vars(body).iter().copied().for_each(&mut f);
        }
    }

    /// Calls `f` on every memory block the execution of `stmt` may read or
    /// write, before alias expansion. A block may be reported more than once.
    pub fn for_each_stmt_mem(&self, func: &impl Function, stmt: Stmt, mut f: impl FnMut(Mem)) {
        self.for_each_stmt_mem_filtered(func, stmt, |_| true, &mut f);
    }

    /// Like [`FreeVars::for_each_stmt_mem`] but skips the blocks of variables
    /// for which `keep` returns false.
    pub fn for_each_stmt_mem_filtered(
        &self,
        func: &impl Function,
        stmt: Stmt,
        keep: impl Fn(Var) -> bool,
        mut f: impl FnMut(Mem),
    ) {
        let mut var_mem = |var: Var| {
            if keep(var) {
                if let Some(info) = func.var_mem(var) {
                    f(info.mem);
                }
            }
        };
        self.for_each_stmt_use(func, stmt, &mut var_mem);
        func.stmt_pattern(stmt).iter().copied().for_each(&mut var_mem);
        let exp = func.stmt_exp(stmt);
        if let Exp::Alloc { mem, .. } = exp {
            f(*mem);
        }
        for body in exp.nested_bodies() {
            self.body_inner_mems(body).iter().copied().for_each(&mut f);
        }
    }
}
