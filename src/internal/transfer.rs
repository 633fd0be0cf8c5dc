//! Transfer rules: how each statement updates the coalescing tables.
//!
//! A body is processed from its last statement to its first. A candidate is
//! registered at the statement which consumes the source array (a copy, an
//! in-place update or a concatenation) and stays active while walking back
//! through the lifetime of the source. It is resolved at the statement which
//! creates the source array: promoted to the success table if the array is
//! created fresh and every safety condition holds, or failed otherwise.
//!
//! Compound statements forward active entries into their bodies. An `if`
//! requires both branches to agree on the outcome. A loop requires the
//! pattern, the loop parameter, the initial value and the body result to all
//! end up in the destination at the same position.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use smallvec::SmallVec;

use super::candidates::{follow_entry, in_place_record};
use super::env::{BottomUpEnv, TopDownEnv};
use super::free_vars::FreeVars;
use super::safety;
use super::tables::{Tables, is_inhibited};
use crate::function::{ArrayProducer, Body, Exp, Function, LoopParam, Mem, Stmt, Type, Var};
use crate::ixfun::{IxFun, PrimExp};
use crate::last_use::LastUses;
use crate::output::{CoalesceEntry, CoalescedVar};
use crate::{CoalescingLevel, Stats};

/// State of one pass over a function.
pub struct Analysis<'a, F, L> {
    pub func: &'a F,
    pub last_uses: &'a L,
    pub free_vars: &'a FreeVars,
    pub level: CoalescingLevel,
    pub stats: &'a mut Stats,
}

/// How a candidate for an `if` pattern variable is forwarded into a branch.
#[derive(Clone)]
enum BranchPlan {
    /// The branch result already lives in the pattern's block.
    Same(Var, CoalescedVar),

    /// The branch result lives in another block, which gets its own entry.
    Moved(Var, Mem, CoalesceEntry),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum BranchStatus {
    Success,
    Pending,
    Failed,
}

/// Blocks involved in coalescing one loop-carried array.
struct LoopPlan {
    /// Pattern variable and its block.
    x: Var,
    m_x: Mem,

    /// Loop parameter and its block, which carries the array through the
    /// iterations.
    a: Var,
    k: Mem,

    /// Body result.
    r: Var,
    m_r: Mem,

    /// Initial value.
    a0: Var,
    m_a0: Mem,

    /// Record shared by all four variables, which have the same layout.
    record: CoalescedVar,
}

impl LoopPlan {
    fn chain(&self) -> BTreeSet<Mem> {
        BTreeSet::from([self.m_x, self.k, self.m_r, self.m_a0])
    }
}

impl<F: Function, L: LastUses> Analysis<'_, F, L> {
    /// Processes all statements of `body` in reverse order.
    pub fn body(&mut self, td: &mut TopDownEnv, bu: &mut BottomUpEnv, body: Body) {
        let func = self.func;
        let stmts = func.body_stmts(body);
        for &stmt in stmts {
            td.bind(func, stmt);
        }
        for &stmt in stmts.iter().rev() {
            td.unbind(func, stmt);
            self.stmt(td, bu, stmt);
        }
    }

    fn stmt(&mut self, td: &mut TopDownEnv, bu: &mut BottomUpEnv, stmt: Stmt) {
        let func = self.func;
        stat!(self.stats, stmts_visited);
        match func.stmt_exp(stmt) {
            Exp::If { .. } | Exp::Loop { .. } if self.level == CoalescingLevel::Straight => {
                self.opaque_compound(td, bu, stmt);
            }
            Exp::If {
                then_body,
                else_body,
                ..
            } => self.if_stmt(td, bu, stmt, [*then_body, *else_body]),
            Exp::Loop {
                params,
                index,
                body,
                ..
            } => self.loop_stmt(td, bu, stmt, params, *index, *body),
            _ => self.simple_stmt(td, bu, stmt),
        }
    }

    /// Fails an active entry, logging the reason.
    fn fail(&mut self, bu: &mut BottomUpEnv, mem: Mem, why: &str) {
        trace!("Failing {mem}: {why}");
        stat!(self.stats, failures);
        bu.tables.mark_failed(mem);
    }

    /// Non-compound statements.
    fn simple_stmt(&mut self, td: &mut TopDownEnv, bu: &mut BottomUpEnv, stmt: Stmt) {
        let func = self.func;
        safety::filter_interference(func, self.free_vars, td, bu, stmt);

        for &var in func.stmt_pattern(stmt) {
            let Some(info) = func.var_mem(var) else {
                continue;
            };
            if bu.tables.active.contains_key(&info.mem) {
                self.resolve_pattern_var(td, bu, stmt, var, info.mem);
            }
        }

        self.register_candidates(td, bu, stmt);
        Self::record_scalar(func, bu, stmt);
    }

    /// Handles the definition of `var`, which lives in the source block of an
    /// active entry.
    fn resolve_pattern_var(
        &mut self,
        td: &TopDownEnv,
        bu: &mut BottomUpEnv,
        stmt: Stmt,
        var: Var,
        mem: Mem,
    ) {
        let func = self.func;
        let Some(entry) = bu.tables.active.get(&mem) else {
            return;
        };
        let Some(record) = entry.vars.get(&var) else {
            return self.fail(bu, mem, "array defined in the source block is not coalesced");
        };
        let dst = entry.dst;
        let Some((subst, ixfun)) = safety::translate_ixfun(td, bu, &record.ixfun) else {
            return self.fail(bu, mem, "index function not expressible here");
        };

        match func.stmt_exp(stmt).array_producer() {
            Some(ArrayProducer::Fresh) => {
                if !safety::dst_allocated(td, dst) {
                    return self.fail(bu, mem, "destination allocated after the source");
                }
                if let Some(entry) = bu.tables.active.get_mut(&mem) {
                    update_record(entry, var, subst, ixfun);
                }
                if bu.tables.promote(mem) {
                    stat!(self.stats, promoted);
                }
            }
            Some(ArrayProducer::Alias(src)) => {
                let Some(src_info) = func.var_mem(src).filter(|info| info.mem == mem) else {
                    return self.fail(bu, mem, "alias of an array in another block");
                };
                let Some(entry) = bu.tables.active.get_mut(&mem) else {
                    return;
                };
                let Some(src_record) = in_place_record(entry, &src_info.ixfun) else {
                    return self.fail(bu, mem, "alias source doesn't fit the block");
                };
                let conflict = entry
                    .vars
                    .get(&src)
                    .is_some_and(|existing| existing.ixfun != src_record.ixfun);
                if conflict {
                    return self.fail(bu, mem, "alias source placed inconsistently");
                }
                trace!("Deferring {mem} to alias source {src}");
                update_record(entry, var, subst, ixfun);
                entry.vars.entry(src).or_insert(src_record);
            }
            _ => self.fail(bu, mem, "array is not freshly created"),
        }
    }

    /// Records the value of a scalar binding.
    fn record_scalar(func: &F, bu: &mut BottomUpEnv, stmt: Stmt) {
        let &[var] = func.stmt_pattern(stmt) else {
            return;
        };
        if *func.var_type(var) != Type::I64 {
            return;
        }
        let value = match *func.stmt_exp(stmt) {
            Exp::BinOp(op, a, b) => PrimExp::bin(op, a.to_prim_exp(), b.to_prim_exp()),
            Exp::SubExp(se) => se.to_prim_exp(),
            _ => return,
        };
        bu.scalars.insert(var, value);
    }

    /// Checks conditions 2 and 5 for a pattern variable of a compound
    /// statement whose block is active. Fails the entry and returns false if
    /// they don't hold.
    fn check_compound_pattern(
        &mut self,
        td: &TopDownEnv,
        bu: &mut BottomUpEnv,
        var: Var,
        mem: Mem,
    ) -> bool {
        let Some(entry) = bu.tables.active.get(&mem) else {
            return false;
        };
        let Some(record) = entry.vars.get(&var) else {
            self.fail(bu, mem, "compound result in the source block is not coalesced");
            return false;
        };
        if !safety::dst_allocated(td, entry.dst) {
            self.fail(bu, mem, "destination allocated after the compound statement");
            return false;
        }
        let Some((subst, ixfun)) = safety::translate_ixfun(td, bu, &record.ixfun) else {
            self.fail(bu, mem, "index function not expressible at the compound statement");
            return false;
        };
        if let Some(entry) = bu.tables.active.get_mut(&mem) {
            update_record(entry, var, subst, ixfun);
        }
        true
    }

    /// Returns whether a block may receive a new entry for `dst`.
    fn available(&self, td: &TopDownEnv, bu: &BottomUpEnv, mem: Mem, dst: Mem) -> bool {
        mem != dst
            && !self.func.is_param_mem(mem)
            && !bu.tables.contains(mem)
            && !is_inhibited(&td.inhibit, mem, dst)
    }

    /// Compound statements when only straight-line code is coalesced: every
    /// entry reaching the statement fails, and nested bodies are analyzed on
    /// their own.
    fn opaque_compound(&mut self, td: &mut TopDownEnv, bu: &mut BottomUpEnv, stmt: Stmt) {
        let func = self.func;
        for mem in bu.tables.active.keys().copied().collect::<SmallVec<[Mem; 8]>>() {
            self.fail(bu, mem, "compound statements are not coalesced through");
        }
        let exp = func.stmt_exp(stmt);
        let loop_vars: SmallVec<[Var; 8]> = match exp {
            Exp::Loop { params, index, .. } => params
                .iter()
                .map(|param| param.var)
                .chain([*index])
                .collect(),
            _ => SmallVec::new(),
        };
        td.scope.extend(loop_vars.iter().copied());
        for body in exp.nested_bodies() {
            let mut inner = BottomUpEnv {
                scalars: bu.scalars.clone(),
                tables: Tables::default(),
            };
            self.body(td, &mut inner, body);
            inner.tables.fail_all();
            bu.tables.union_resolved(inner.tables);
        }
        for var in &loop_vars {
            td.scope.remove(var);
        }
    }

    fn if_stmt(&mut self, td: &mut TopDownEnv, bu: &mut BottomUpEnv, stmt: Stmt, bodies: [Body; 2]) {
        let func = self.func;
        let pattern = func.stmt_pattern(stmt);

        // Conditions 2 and 5 for the pattern.
        for &x in pattern {
            if let Some(info) = func.var_mem(x) {
                if bu.tables.active.contains_key(&info.mem) {
                    self.check_compound_pattern(td, bu, x, info.mem);
                }
            }
        }

        // Decide how each candidate is forwarded into the branches. A block
        // claimed by two candidates, or which already has an entry, rejects
        // every candidate involved.
        let mut plans: Vec<(Mem, [BranchPlan; 2])> = Vec::new();
        let mut claimed: [BTreeMap<Mem, Mem>; 2] = Default::default();
        let mut rejected: BTreeSet<Mem> = BTreeSet::new();
        for (i, &x) in pattern.iter().enumerate() {
            let Some(x_info) = func.var_mem(x) else {
                continue;
            };
            let m_b = x_info.mem;
            let Some(entry) = bu.tables.active.get(&m_b) else {
                continue;
            };
            if plans.iter().any(|(mem, _)| *mem == m_b) {
                rejected.insert(m_b);
                continue;
            }
            let mut branch_plans: [Option<BranchPlan>; 2] = [None, None];
            for (j, &body) in bodies.iter().enumerate() {
                let Some(r) = func.body_results(body).get(i).and_then(|se| se.var()) else {
                    break;
                };
                let Some(r_info) = func.var_mem(r).filter(|info| info.ixfun == x_info.ixfun)
                else {
                    break;
                };
                let Some(record) = in_place_record(entry, &r_info.ixfun) else {
                    break;
                };
                let m_r = r_info.mem;
                if m_r == m_b {
                    branch_plans[j] = Some(BranchPlan::Same(r, record));
                    continue;
                }
                if let Some(&other) = claimed[j].get(&m_r) {
                    rejected.insert(other);
                    break;
                }
                if !self.available(td, bu, m_r, entry.dst) {
                    break;
                }
                claimed[j].insert(m_r, m_b);
                let deps = BTreeMap::from([(x, m_b)]);
                let moved = follow_entry(entry, r, record, deps, None);
                branch_plans[j] = Some(BranchPlan::Moved(r, m_r, moved));
            }
            match branch_plans {
                [Some(a), Some(b)] => plans.push((m_b, [a, b])),
                _ => {
                    rejected.insert(m_b);
                }
            }
        }
        plans.retain(|(mem, _)| !rejected.contains(mem));
        for mem in rejected {
            self.fail(bu, mem, "branch results can't follow the pattern");
        }

        // Analyze both branches with the forwarded entries.
        let mut branches: SmallVec<[BottomUpEnv; 2]> = SmallVec::new();
        for (j, &body) in bodies.iter().enumerate() {
            let mut active = bu.tables.active.clone();
            for (m_b, plan) in &plans {
                match &plan[j] {
                    BranchPlan::Same(r, record) => {
                        if let Some(entry) = active.get_mut(m_b) {
                            entry.vars.insert(*r, record.clone());
                        }
                    }
                    BranchPlan::Moved(_, m_r, moved) => {
                        active.remove(m_b);
                        active.insert(*m_r, moved.clone());
                    }
                }
            }
            let mut env = BottomUpEnv {
                scalars: bu.scalars.clone(),
                tables: Tables {
                    active,
                    ..Tables::default()
                },
            };
            self.body(td, &mut env, body);
            branches.push(env);
        }

        // Reconcile the outcome of each candidate in both branches.
        let mut pending: BTreeSet<Mem> = BTreeSet::new();
        for (m_b, plan) in plans {
            let status = [
                branch_status(&branches[0], m_b, &plan[0]),
                branch_status(&branches[1], m_b, &plan[1]),
            ];
            trace!("Branch outcome for {m_b}: {status:?}");
            match status {
                [BranchStatus::Success, BranchStatus::Success] => {
                    let Some(mut entry) = bu.tables.active.remove(&m_b) else {
                        continue;
                    };
                    for p in &plan {
                        match *p {
                            BranchPlan::Same(r, _) => entry.deps.insert(r, m_b),
                            BranchPlan::Moved(r, m_r, _) => entry.deps.insert(r, m_r),
                        };
                    }
                    if bu.tables.mark_success(m_b, entry) {
                        stat!(self.stats, promoted);
                    }
                }
                [BranchStatus::Pending, BranchStatus::Pending] => {
                    if let Some(entry) = bu.tables.active.get_mut(&m_b) {
                        for p in &plan {
                            if let BranchPlan::Same(r, record) = p {
                                entry.vars.insert(*r, record.clone());
                            }
                        }
                    }
                    for env in &mut branches {
                        env.tables.active.remove(&m_b);
                    }
                    pending.insert(m_b);
                }
                _ => {
                    self.fail(bu, m_b, "branches disagree");
                    for (env, p) in branches.iter_mut().zip(&plan) {
                        let key = match p {
                            BranchPlan::Same(..) => m_b,
                            BranchPlan::Moved(_, m_r, _) => *m_r,
                        };
                        if let Some(entry) = env.tables.success.remove(&key) {
                            env.tables.inhibit_pair(key, entry.dst);
                        }
                        env.tables.mark_failed(key);
                    }
                }
            }
        }

        // Other entries survive only if they are still active in both
        // branches.
        let outer: SmallVec<[Mem; 8]> = bu
            .tables
            .active
            .keys()
            .copied()
            .filter(|mem| !pending.contains(mem))
            .collect();
        for mem in outer {
            let mut in_both = true;
            for env in &mut branches {
                in_both &= env.tables.active.remove(&mem).is_some();
            }
            if !in_both {
                self.fail(bu, mem, "not active in both branches");
            }
        }
        for mut env in branches {
            env.tables.fail_all();
            bu.tables.union_resolved(env.tables);
            bu.scalars.append(&mut env.scalars);
        }

        safety::filter_interference(func, self.free_vars, td, bu, stmt);
    }

    fn loop_stmt(
        &mut self,
        td: &mut TopDownEnv,
        bu: &mut BottomUpEnv,
        stmt: Stmt,
        params: &[LoopParam],
        index: Var,
        body: Body,
    ) {
        let func = self.func;
        let pattern = func.stmt_pattern(stmt);

        let mut plans: Vec<LoopPlan> = Vec::new();
        let mut claimed: BTreeSet<Mem> = BTreeSet::new();
        for (i, &x) in pattern.iter().enumerate() {
            let Some(m_x) = func.var_mem(x).map(|info| info.mem) else {
                continue;
            };
            if !bu.tables.active.contains_key(&m_x) || !self.check_compound_pattern(td, bu, x, m_x)
            {
                continue;
            }
            match self.plan_loop_var(td, bu, stmt, i, x, m_x, params, body, &claimed) {
                Some(plan) => {
                    claimed.extend(plan.chain());
                    plans.push(plan);
                }
                None => self.fail(bu, m_x, "loop-carried array can't follow the pattern"),
            }
        }

        // Forward the entries into the body.
        let mut active = bu.tables.active.clone();
        for plan in &plans {
            let Some(entry) = bu.tables.active.get(&plan.m_x) else {
                continue;
            };
            let mut k_entry = if plan.k == plan.m_x {
                let mut entry = entry.clone();
                entry.vars.insert(plan.a, plan.record.clone());
                entry
            } else {
                active.remove(&plan.m_x);
                let deps = BTreeMap::from([(plan.x, plan.m_x)]);
                follow_entry(entry, plan.a, plan.record.clone(), deps, None)
            };
            if plan.m_r == plan.k {
                k_entry.vars.insert(plan.r, plan.record.clone());
            } else {
                let deps = BTreeMap::from([(plan.x, plan.m_x)]);
                let r_entry = follow_entry(entry, plan.r, plan.record.clone(), deps, Some(plan.k));
                active.insert(plan.m_r, r_entry);
            }
            active.insert(plan.k, k_entry);
        }

        let checkpoint = td.checkpoint();
        for plan in &plans {
            td.add_alias(plan.m_r, plan.k);
            td.add_loop(plan.m_x, plan.chain());
        }
        let loop_vars: SmallVec<[Var; 8]> = params
            .iter()
            .map(|param| param.var)
            .chain([index])
            .collect();
        td.scope.extend(loop_vars.iter().copied());

        let mut env = BottomUpEnv {
            scalars: bu.scalars.clone(),
            tables: Tables {
                active,
                ..Tables::default()
            },
        };
        self.body(td, &mut env, body);

        for var in &loop_vars {
            td.scope.remove(var);
        }
        td.restore(checkpoint);

        // Resolve each planned candidate.
        let mut handled: BTreeSet<Mem> = BTreeSet::new();
        for plan in plans {
            handled.extend(plan.chain());
            self.resolve_loop_plan(bu, &mut env, plan);
        }

        // Entries from outside the loop survive only if the body left them
        // alone.
        let outer: SmallVec<[Mem; 8]> = bu
            .tables
            .active
            .keys()
            .copied()
            .filter(|mem| !handled.contains(mem))
            .collect();
        for mem in outer {
            if env.tables.active.remove(&mem).is_none() {
                self.fail(bu, mem, "not active after the loop body");
            }
        }
        env.tables.fail_all();
        bu.tables.union_resolved(env.tables);

        safety::filter_interference(func, self.free_vars, td, bu, stmt);
    }

    /// Checks whether the loop-carried array at position `i` can follow the
    /// pattern variable `x` into its destination.
    fn plan_loop_var(
        &self,
        td: &TopDownEnv,
        bu: &BottomUpEnv,
        stmt: Stmt,
        i: usize,
        x: Var,
        m_x: Mem,
        params: &[LoopParam],
        body: Body,
        claimed: &BTreeSet<Mem>,
    ) -> Option<LoopPlan> {
        let func = self.func;
        let entry = bu.tables.active.get(&m_x)?;
        let param = params.get(i)?;
        let a = param.var;
        let a0 = param.init.var()?;
        let r = func.body_results(body).get(i)?.var()?;

        let ix_x = &func.var_mem(x)?.ixfun;
        let a_info = func.var_mem(a)?;
        let a0_info = func.var_mem(a0)?;
        let r_info = func.var_mem(r)?;
        if a_info.ixfun != *ix_x || a0_info.ixfun != *ix_x || r_info.ixfun != *ix_x {
            return None;
        }
        // The pattern's record was already translated to the loop's scope.
        let record = entry.vars.get(&x)?.clone();

        let plan = LoopPlan {
            x,
            m_x,
            a,
            k: a_info.mem,
            r,
            m_r: r_info.mem,
            a0,
            m_a0: a0_info.mem,
            record,
        };
        if !self.last_uses.is_last_use(stmt, a0) && plan.m_a0 != m_x {
            return None;
        }
        if plan.m_r != plan.k && (plan.m_r == m_x || plan.m_r == plan.m_a0) {
            return None;
        }
        let chain = plan.chain();
        if chain.contains(&entry.dst) || chain.iter().any(|mem| claimed.contains(mem)) {
            return None;
        }
        for mem in [plan.k, plan.m_r, plan.m_a0] {
            if mem != m_x && !self.available(td, bu, mem, entry.dst) {
                return None;
            }
        }
        if safety::loop_interferes(func, self.free_vars, td, stmt, entry, &chain) {
            return None;
        }
        Some(plan)
    }

    /// Decides the fate of a loop candidate after its body was analyzed.
    fn resolve_loop_plan(&mut self, bu: &mut BottomUpEnv, env: &mut BottomUpEnv, plan: LoopPlan) {
        let r_ok = if plan.m_r == plan.k {
            env.tables
                .active
                .get(&plan.k)
                .is_some_and(|entry| entry.vars.contains_key(&plan.r))
        } else {
            env.tables
                .success
                .get(&plan.m_r)
                .is_some_and(|entry| entry.vars.contains_key(&plan.r))
        };
        let k_entry = if r_ok {
            env.tables.active.remove(&plan.k)
        } else {
            None
        };
        let Some(mut k_entry) = k_entry else {
            self.fail(bu, plan.m_x, "loop body doesn't preserve the placement");
            env.tables.mark_failed(plan.k);
            if let Some(entry) = env.tables.success.remove(&plan.m_r) {
                env.tables.inhibit_pair(plan.m_r, entry.dst);
            }
            return;
        };

        let mut deps = BTreeMap::new();
        for (var, mem) in [(plan.a, plan.k), (plan.r, plan.m_r), (plan.a0, plan.m_a0)] {
            if mem != plan.m_x {
                deps.insert(var, mem);
            }
        }

        let mut promote = |bu: &mut BottomUpEnv, mem: Mem, entry: CoalesceEntry| {
            if bu.tables.mark_success(mem, entry) {
                stat!(self.stats, promoted);
            }
        };
        if plan.k == plan.m_x {
            // The body updated the pattern's own entry.
            bu.tables.active.remove(&plan.m_x);
            k_entry.deps.extend(deps);
            if plan.m_a0 == plan.k {
                k_entry.vars.insert(plan.a0, plan.record);
                bu.tables.active.insert(plan.k, k_entry);
            } else {
                let init_deps = BTreeMap::from([(plan.x, plan.m_x)]);
                let a0_entry = follow_entry(&k_entry, plan.a0, plan.record, init_deps, None);
                promote(bu, plan.k, k_entry);
                bu.tables.active.insert(plan.m_a0, a0_entry);
            }
            return;
        }

        let Some(mut entry) = bu.tables.active.remove(&plan.m_x) else {
            return;
        };
        entry.deps.extend(deps);
        if plan.m_a0 == plan.k {
            k_entry.vars.insert(plan.a0, plan.record);
            bu.tables.active.insert(plan.k, k_entry);
            promote(bu, plan.m_x, entry);
        } else if plan.m_a0 == plan.m_x {
            entry.vars.insert(plan.a0, plan.record);
            bu.tables.active.insert(plan.m_x, entry);
            promote(bu, plan.k, k_entry);
        } else {
            let init_deps = BTreeMap::from([(plan.x, plan.m_x)]);
            let a0_entry = follow_entry(&entry, plan.a0, plan.record, init_deps, None);
            promote(bu, plan.k, k_entry);
            promote(bu, plan.m_x, entry);
            bu.tables.active.insert(plan.m_a0, a0_entry);
        }
    }
}

/// Outcome of a forwarded candidate at the end of a branch.
fn branch_status(env: &BottomUpEnv, m_b: Mem, plan: &BranchPlan) -> BranchStatus {
    let has = |table: &BTreeMap<Mem, CoalesceEntry>, mem: Mem, var: Var| {
        table
            .get(&mem)
            .is_some_and(|entry| entry.vars.contains_key(&var))
    };
    match *plan {
        BranchPlan::Same(r, _) if has(&env.tables.success, m_b, r) => BranchStatus::Success,
        BranchPlan::Same(r, _) if has(&env.tables.active, m_b, r) => BranchStatus::Pending,
        BranchPlan::Moved(r, m_r, _) if has(&env.tables.success, m_r, r) => BranchStatus::Success,
        _ => BranchStatus::Failed,
    }
}

/// Stores the translated index function of a variable in its record.
fn update_record(
    entry: &mut CoalesceEntry,
    var: Var,
    subst: BTreeMap<Var, PrimExp>,
    ixfun: IxFun,
) {
    if let Some(record) = entry.vars.get_mut(&var) {
        record.ixfun = ixfun;
        record.subst.extend(subst);
    }
}
