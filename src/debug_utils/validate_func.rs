//! Input function validation.

use alloc::format;
use alloc::vec::Vec;
use core::fmt;

use anyhow::{Context as _, Result, bail, ensure};
use cranelift_entity::{EntityRef as _, EntitySet, SecondaryMap};

use crate::function::{
    Body, DimIndex, Exp, Function, MAX_BODIES, MAX_MEMS, MAX_STMTS, MAX_VARS, Mem, Param, Stmt,
    SubExp, Type, Var,
};
use crate::ixfun::is_permutation;

/// Checks `func` to ensure it satisfies all of the pre-conditions required by
/// the coalescing analysis.
///
/// This checks that every entity reference is in range, that every variable
/// is bound exactly once and only used where it is in scope, that operands
/// have the types their expressions expect and that memory annotations are
/// consistent: arrays are annotated and scalars are not, aliases and views
/// live in the block of their source with the derived index function, and the
/// result of an in-place update shares the location of the updated array.
pub fn validate_function(func: &impl Function) -> Result<()> {
    let mut ctx = Context {
        func,
        defined_vars: EntitySet::new(),
        defined_mems: EntitySet::new(),
        seen_stmts: EntitySet::new(),
        seen_bodies: EntitySet::new(),
        var_in_scope: SecondaryMap::new(),
        mem_in_scope: SecondaryMap::new(),
        var_scope: Vec::new(),
        mem_scope: Vec::new(),
    };
    ctx.check_function()
}

/// An entity reference.
///
/// This is used to report entity references with an invalid index.
#[derive(Debug, Clone, Copy)]
enum Entity {
    Var(Var),
    Mem(Mem),
    Stmt(Stmt),
    Body(Body),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Entity::Var(x) => x.fmt(f),
            Entity::Mem(x) => x.fmt(f),
            Entity::Stmt(x) => x.fmt(f),
            Entity::Body(x) => x.fmt(f),
        }
    }
}

/// State used for validation.
struct Context<'a, F> {
    func: &'a F,
    defined_vars: EntitySet<Var>,
    defined_mems: EntitySet<Mem>,
    seen_stmts: EntitySet<Stmt>,
    seen_bodies: EntitySet<Body>,
    var_in_scope: SecondaryMap<Var, bool>,
    mem_in_scope: SecondaryMap<Mem, bool>,
    var_scope: Vec<Var>,
    mem_scope: Vec<Mem>,
}

static I64: Type = Type::I64;

/// Returns whether a value of type `b` can be used where `a` is expected.
///
/// Shapes are only compared by rank since the same extent may be named by
/// different variables in different scopes.
fn compatible(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Array(a), Type::Array(b)) => a.len() == b.len(),
        _ => a == b,
    }
}

impl<'a, F: Function> Context<'a, F> {
    /// Check that an entity refers to a valid object.
    fn check_entity(&self, entity: Entity) -> Result<()> {
        let (index, len) = match entity {
            Entity::Var(x) => (x.index(), self.func.num_vars()),
            Entity::Mem(x) => (x.index(), self.func.num_mems()),
            Entity::Stmt(x) => (x.index(), self.func.num_stmts()),
            Entity::Body(x) => (x.index(), self.func.num_bodies()),
        };
        ensure!(index < len, "{entity}: Invalid entity reference");
        Ok(())
    }

    /// Check the limits on the number of entities.
    fn check_limits(&self) -> Result<()> {
        ensure!(
            self.func.num_vars() <= MAX_VARS,
            "Too many variables: {} (max: {MAX_VARS})",
            self.func.num_vars(),
        );
        ensure!(
            self.func.num_mems() <= MAX_MEMS,
            "Too many memory blocks: {} (max: {MAX_MEMS})",
            self.func.num_mems(),
        );
        ensure!(
            self.func.num_stmts() <= MAX_STMTS,
            "Too many statements: {} (max: {MAX_STMTS})",
            self.func.num_stmts(),
        );
        ensure!(
            self.func.num_bodies() <= MAX_BODIES,
            "Too many bodies: {} (max: {MAX_BODIES})",
            self.func.num_bodies(),
        );
        Ok(())
    }

    /// Binds a memory block in the current scope.
    fn define_mem(&mut self, mem: Mem) -> Result<()> {
        self.check_entity(Entity::Mem(mem))?;
        ensure!(self.defined_mems.insert(mem), "{mem} defined multiple times");
        self.mem_in_scope[mem] = true;
        self.mem_scope.push(mem);
        Ok(())
    }

    /// Binds a variable in the current scope after checking its type and
    /// memory annotation.
    fn define_var(&mut self, var: Var) -> Result<()> {
        self.check_entity(Entity::Var(var))?;
        ensure!(self.defined_vars.insert(var), "{var} defined multiple times");
        self.check_decl(var)?;
        self.var_in_scope[var] = true;
        self.var_scope.push(var);
        Ok(())
    }

    /// Checks the type and memory annotation of a variable against the
    /// current scope.
    fn check_decl(&self, var: Var) -> Result<()> {
        let ty = self.func.var_type(var);
        let info = self.func.var_mem(var);
        let Some(shape) = ty.shape() else {
            ensure!(info.is_none(), "{var}: Scalar with a memory annotation");
            return Ok(());
        };
        for &dim in shape {
            self.check_int(dim)
                .with_context(|| format!("{var}: Invalid shape"))?;
        }
        let Some(info) = info else {
            bail!("{var}: Array without a memory annotation");
        };
        self.check_entity(Entity::Mem(info.mem))?;
        ensure!(
            self.mem_in_scope[info.mem],
            "{var}: {} is not in scope",
            info.mem
        );
        ensure!(
            info.ixfun.rank() == shape.len(),
            "{var}: Index function rank {} doesn't match type {ty}",
            info.ixfun.rank()
        );
        let mut result = Ok(());
        info.ixfun.for_each_free_var(|v| {
            if result.is_ok() {
                result = self
                    .check_int(SubExp::Var(v))
                    .with_context(|| format!("{var}: Invalid index function {}", info.ixfun));
            }
        });
        result
    }

    /// Returns the type of an operand, checking that it is in scope.
    fn operand_type(&self, se: SubExp) -> Result<&'a Type> {
        match se {
            SubExp::Const(_) => Ok(&I64),
            SubExp::Var(var) => {
                self.check_entity(Entity::Var(var))?;
                ensure!(self.var_in_scope[var], "{var} used outside of its scope");
                Ok(self.func.var_type(var))
            }
        }
    }

    fn check_int(&self, se: SubExp) -> Result<()> {
        let ty = self.operand_type(se)?;
        ensure!(*ty == Type::I64, "{se}: Expected i64, found {ty}");
        Ok(())
    }

    /// Returns the rank of an array operand.
    fn check_array(&self, var: Var) -> Result<usize> {
        let ty = self.operand_type(SubExp::Var(var))?;
        let Some(shape) = ty.shape() else {
            bail!("{var}: Expected an array, found {ty}");
        };
        Ok(shape.len())
    }

    /// Checks a slice of an array of the given rank and returns the number of
    /// dimensions it keeps.
    fn check_slice(&self, slice: &[DimIndex], rank: usize) -> Result<usize> {
        ensure!(
            slice.len() == rank,
            "Slice with {} dimensions of an array of rank {rank}",
            slice.len()
        );
        let mut result = Ok(());
        for idx in slice {
            idx.for_each_operand(|se| {
                if result.is_ok() {
                    result = self.check_int(se);
                }
            });
        }
        result?;
        Ok(slice
            .iter()
            .filter(|idx| matches!(idx, DimIndex::Range { .. }))
            .count())
    }

    /// Enters a new scope, returning a marker to pass to `leave_scope`.
    fn enter_scope(&self) -> (usize, usize) {
        (self.var_scope.len(), self.mem_scope.len())
    }

    fn leave_scope(&mut self, (vars, mems): (usize, usize)) {
        for var in self.var_scope.drain(vars..) {
            self.var_in_scope[var] = false;
        }
        for mem in self.mem_scope.drain(mems..) {
            self.mem_in_scope[mem] = false;
        }
    }

    fn check_function(&mut self) -> Result<()> {
        self.check_limits()?;
        let func = self.func;
        for &param in func.params() {
            match param {
                Param::Mem(mem) => self.define_mem(mem)?,
                Param::Var(var) => self.define_var(var)?,
            }
        }
        self.check_body(func.entry_body())?;
        for i in 0..func.num_stmts() {
            let stmt = Stmt::new(i);
            ensure!(self.seen_stmts.contains(stmt), "{stmt} is not in any body");
        }
        Ok(())
    }

    /// Checks a body in its own scope and returns the types of its results.
    fn check_body(&mut self, body: Body) -> Result<Vec<&'a Type>> {
        self.check_entity(Entity::Body(body))?;
        ensure!(
            self.seen_bodies.insert(body),
            "{body} appears multiple times"
        );
        let func = self.func;
        let scope = self.enter_scope();
        for &stmt in func.body_stmts(body) {
            self.check_entity(Entity::Stmt(stmt))?;
            ensure!(
                self.seen_stmts.insert(stmt),
                "{stmt} appears multiple times"
            );
            self.check_stmt(stmt).with_context(|| format!("in {stmt}"))?;
        }
        let results = func
            .body_results(body)
            .iter()
            .map(|&se| self.operand_type(se))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("in results of {body}"))?;
        self.leave_scope(scope);
        Ok(results)
    }

    /// Checks that the results of a nested body fit the expected types.
    fn check_results(&self, body: Body, results: &[&Type], expected: &[Var]) -> Result<()> {
        ensure!(
            results.len() == expected.len(),
            "{body} has {} results, expected {}",
            results.len(),
            expected.len()
        );
        for (&ty, &var) in results.iter().zip(expected) {
            let expected_ty = self.func.var_type(var);
            ensure!(
                compatible(expected_ty, ty),
                "{body}: Result of type {ty} bound to {var} of type {expected_ty}"
            );
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: Stmt) -> Result<()> {
        let func = self.func;
        let pattern = func.stmt_pattern(stmt);
        let exp = func.stmt_exp(stmt);
        for &var in pattern {
            self.check_entity(Entity::Var(var))?;
        }

        match exp {
            Exp::Alloc { mem, size } => {
                ensure!(pattern.is_empty(), "alloc binds no variables");
                self.check_int(*size)?;
                return self.define_mem(*mem);
            }
            Exp::If { .. } | Exp::Loop { .. } => {}
            _ => ensure!(pattern.len() == 1, "Expected a single-variable pattern"),
        }

        match exp {
            Exp::Alloc { .. } => unreachable!(),
            Exp::SubExp(se) => {
                let ty = self.operand_type(*se)?;
                let expected = func.var_type(pattern[0]);
                ensure!(
                    compatible(expected, ty),
                    "{se} of type {ty} bound to {expected}"
                );
            }
            Exp::BinOp(_, a, b) => {
                self.check_int(*a)?;
                self.check_int(*b)?;
                self.expect_type(pattern[0], &Type::I64)?;
            }
            Exp::Cmp(_, a, b) => {
                self.check_int(*a)?;
                self.check_int(*b)?;
                self.expect_type(pattern[0], &Type::Bool)?;
            }
            Exp::Index { array, slice } => {
                let rank = self.check_array(*array)?;
                let kept = self.check_slice(slice, rank)?;
                if kept == 0 {
                    self.expect_type(pattern[0], &Type::I64)?;
                } else {
                    self.expect_rank(pattern[0], kept)?;
                }
            }
            Exp::Update {
                array,
                slice,
                value,
            } => {
                let rank = self.check_array(*array)?;
                let kept = self.check_slice(slice, rank)?;
                let value_ty = self.operand_type(*value)?;
                match value_ty.shape() {
                    Some(shape) => ensure!(
                        shape.len() == kept && kept != 0,
                        "Update of a {kept}-dimensional slice with {value} of type {value_ty}"
                    ),
                    None => ensure!(
                        kept == 0 && *value_ty == Type::I64,
                        "Update of a {kept}-dimensional slice with {value} of type {value_ty}"
                    ),
                }
                self.expect_rank(pattern[0], rank)?;
            }
            Exp::Copy(array) => {
                let rank = self.check_array(*array)?;
                self.expect_rank(pattern[0], rank)?;
            }
            Exp::Concat(arrays) => {
                ensure!(!arrays.is_empty(), "concat needs at least one operand");
                let rank = self.check_array(arrays[0])?;
                ensure!(rank != 0, "concat of rank 0 arrays");
                for &array in &arrays[1..] {
                    ensure!(
                        self.check_array(array)? == rank,
                        "concat operands have different ranks"
                    );
                }
                self.expect_rank(pattern[0], rank)?;
            }
            Exp::Iota(n) => {
                self.check_int(*n)?;
                self.expect_rank(pattern[0], 1)?;
            }
            Exp::Replicate { shape, value } => {
                for &dim in shape {
                    self.check_int(dim)?;
                }
                self.check_int(*value)?;
                ensure!(!shape.is_empty(), "replicate needs at least one dimension");
                self.expect_rank(pattern[0], shape.len())?;
            }
            Exp::Map { op: _, lhs, rhs } => {
                let mut rank = None;
                for se in [*lhs, *rhs] {
                    let ty = self.operand_type(se)?;
                    match ty.shape() {
                        Some(shape) => {
                            ensure!(
                                rank.is_none_or(|r| r == shape.len()),
                                "map operands have different ranks"
                            );
                            rank = Some(shape.len());
                        }
                        None => ensure!(*ty == Type::I64, "{se}: Expected i64, found {ty}"),
                    }
                }
                let Some(rank) = rank else {
                    bail!("map needs at least one array operand");
                };
                self.expect_rank(pattern[0], rank)?;
            }
            Exp::Reshape { array, shape } => {
                self.check_array(*array)?;
                for &dim in shape {
                    self.check_int(dim)?;
                }
                self.expect_rank(pattern[0], shape.len())?;
            }
            Exp::Rearrange { array, perm } => {
                let rank = self.check_array(*array)?;
                ensure!(
                    is_permutation(perm, rank),
                    "Invalid permutation of an array of rank {rank}"
                );
                self.expect_rank(pattern[0], rank)?;
            }
            Exp::If {
                cond,
                then_body,
                else_body,
            } => {
                let ty = self.operand_type(*cond)?;
                ensure!(*ty == Type::Bool, "{cond}: Condition must be bool, found {ty}");
                for body in [*then_body, *else_body] {
                    let results = self.check_body(body)?;
                    self.check_results(body, &results, pattern)?;
                }
            }
            Exp::Loop {
                params,
                index,
                bound,
                body,
            } => {
                self.check_int(*bound)?;
                ensure!(
                    params.len() == pattern.len(),
                    "Loop with {} parameters bound to {} variables",
                    params.len(),
                    pattern.len()
                );
                let params_vars: Vec<Var> = params.iter().map(|param| param.var).collect();
                for (param, &var) in params.iter().zip(pattern) {
                    let init = self.operand_type(param.init)?;
                    let param_ty = func.var_type(param.var);
                    ensure!(
                        compatible(param_ty, init),
                        "Loop parameter {} of type {param_ty} initialized with {init}",
                        param.var
                    );
                    ensure!(
                        compatible(func.var_type(var), param_ty),
                        "Loop parameter {} of type {param_ty} bound to {var}",
                        param.var
                    );
                }

                // Loop parameters and the index are only visible in the body.
                let scope = self.enter_scope();
                for &var in &params_vars {
                    self.define_var(var)
                        .with_context(|| format!("in loop parameter {var}"))?;
                }
                self.define_var(*index)?;
                self.expect_type(*index, &Type::I64)?;
                let results = self.check_body(*body)?;
                self.check_results(*body, &results, &params_vars)?;
                self.leave_scope(scope);
            }
        }

        // Pattern variables are only visible after the statement.
        self.check_layout(pattern, exp)?;
        for &var in pattern {
            self.define_var(var)?;
        }
        Ok(())
    }

    fn expect_type(&self, var: Var, expected: &Type) -> Result<()> {
        let ty = self.func.var_type(var);
        ensure!(ty == expected, "{var} has type {ty}, expected {expected}");
        Ok(())
    }

    fn expect_rank(&self, var: Var, rank: usize) -> Result<()> {
        let ty = self.func.var_type(var);
        ensure!(
            ty.shape().is_some_and(|shape| shape.len() == rank),
            "{var} has type {ty}, expected an array of rank {rank}"
        );
        Ok(())
    }

    /// Checks that aliases and views live where their source does.
    fn check_layout(&self, pattern: &[Var], exp: &Exp) -> Result<()> {
        let func = self.func;
        let source = match exp {
            Exp::SubExp(SubExp::Var(array))
            | Exp::Update { array, .. }
            | Exp::Reshape { array, .. }
            | Exp::Rearrange { array, .. } => *array,
            Exp::Index { array, .. } if func.var_type(pattern[0]).is_array() => *array,
            _ => return Ok(()),
        };
        let var = pattern[0];
        let (Some(info), Some(src)) = (func.var_mem(var), func.var_mem(source)) else {
            return Ok(());
        };
        ensure!(
            info.mem == src.mem,
            "{var} must live in {} like {source}, found {}",
            src.mem,
            info.mem
        );
        let Some(derived) = exp.default_ixfun(func.var_type(var), |v| func.var_mem(v)) else {
            bail!("{var}: Can't derive an index function from {source}");
        };
        ensure!(
            derived == info.ixfun,
            "{var} must have index function {derived}, found {}",
            info.ixfun
        );
        Ok(())
    }
}
