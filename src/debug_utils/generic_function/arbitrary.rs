use alloc::vec;
use alloc::vec::Vec;
use core::ops::RangeInclusive;

use arbitrary::{Result, Unstructured};

use super::GenericFunction;
use crate::function::{
    BinOp, Body, CmpOp, DimIndex, Exp, Function, LoopParam, Mem, MemInfo, Param, Stmt, SubExp,
    Type, Var,
};
use crate::ixfun::{IxFun, PrimExp};

/// Configuration options for [`GenericFunction::arbitrary_with_config`].
///
/// These are ranges from which a value is arbitrarily chosen when generating a
/// function.
///
/// It's generally fine to just use `Default::default` for this.
#[derive(Debug, Clone)]
pub struct ArbitraryFunctionConfig {
    /// Number of scalar parameters.
    pub scalar_params: RangeInclusive<usize>,

    /// Number of array parameters. Each one lives in its own memory block
    /// parameter.
    pub array_params: RangeInclusive<usize>,

    /// Number of statements per body.
    ///
    /// Some bodies may exceed this limit since extra statements are added to
    /// produce the results a body must yield.
    pub stmts_per_body: RangeInclusive<usize>,

    /// Maximum nesting depth of `if` and loop statements.
    pub max_depth: usize,

    /// Extent of each array dimension.
    pub extent: RangeInclusive<i64>,

    /// Number of iterations of each loop.
    pub loop_iterations: RangeInclusive<i64>,

    /// Number of elements in every allocated memory block.
    pub alloc_size: i64,

    /// Number of values returned by the function.
    pub results: RangeInclusive<usize>,
}

impl Default for ArbitraryFunctionConfig {
    fn default() -> Self {
        Self {
            scalar_params: 0..=2,
            array_params: 0..=2,
            stmts_per_body: 1..=10,
            max_depth: 2,
            extent: 1..=4,
            loop_iterations: 0..=3,
            alloc_size: 64,
            results: 1..=3,
        }
    }
}

impl GenericFunction {
    /// Constructs a randomly-generated `GenericFunction`.
    ///
    /// The generated function is guaranteed to pass validation and to execute
    /// without error in the interpreter when given arguments from
    /// [`make_inputs`]. Arrays are never used after being updated in place.
    ///
    /// [`make_inputs`]: crate::debug_utils::make_inputs
    pub fn arbitrary_with_config(
        u: &mut Unstructured<'_>,
        config: ArbitraryFunctionConfig,
    ) -> Result<Self> {
        let mut builder = FunctionBuilder {
            u,
            func: GenericFunction::empty("f".into()),
            config,
            next_root: 0,
        };
        builder.gen_function()?;
        Ok(builder.func)
    }
}

impl<'a> arbitrary::Arbitrary<'a> for GenericFunction {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
        Self::arbitrary_with_config(u, ArbitraryFunctionConfig::default())
    }
}

/// An array variable which is available in a scope.
#[derive(Debug, Clone)]
struct ArrayVar {
    var: Var,
    shape: Vec<i64>,
    mem: Mem,

    /// Whether the array has the row-major layout of its whole region.
    direct: bool,

    /// Arrays sharing elements have the same root.
    root: usize,

    /// Whether the array was created in the body being generated, in which
    /// case it may be consumed by an in-place update or a loop.
    owned: bool,
}

/// Everything that may be used by the statement being generated.
#[derive(Debug, Clone, Default)]
struct Scope {
    ints: Vec<Var>,
    bools: Vec<Var>,
    arrays: Vec<ArrayVar>,

    /// Blocks allocated in this body which don't hold anything yet.
    spare: Vec<Mem>,
}

impl Scope {
    /// Scope at the start of a nested body.
    fn nested(&self) -> Self {
        let mut scope = self.clone();
        for array in &mut scope.arrays {
            array.owned = false;
        }
        // A loop body would write the same block in every iteration.
        scope.spare.clear();
        scope
    }

    /// Removes an array along with everything aliasing it.
    fn consume(&mut self, root: usize) {
        self.arrays.retain(|array| array.root != root);
    }

    /// Stops using `var` itself. Its aliases stay available.
    fn retire(&mut self, var: Var) {
        self.arrays.retain(|array| array.var != var);
    }
}

/// Type of an array with constant extents.
fn array_type(shape: &[i64]) -> Type {
    Type::Array(shape.iter().map(|&dim| SubExp::Const(dim)).collect())
}

/// Row-major layout of an array with constant extents.
fn direct_layout(mem: Mem, shape: &[i64]) -> MemInfo {
    MemInfo {
        mem,
        ixfun: IxFun::iota(shape.iter().map(|&dim| PrimExp::Const(dim)).collect()),
    }
}

/// Slice which keeps all of the given dimension.
fn full_range(extent: i64) -> DimIndex {
    DimIndex::Range {
        start: SubExp::Const(0),
        len: SubExp::Const(extent),
        stride: SubExp::Const(1),
    }
}

struct FunctionBuilder<'a, 'b> {
    /// Source of randomness.
    u: &'a mut Unstructured<'b>,

    /// Function that is being built.
    func: GenericFunction,

    /// Configuration options
    config: ArbitraryFunctionConfig,

    /// Next alias group identifier.
    next_root: usize,
}

impl FunctionBuilder<'_, '_> {
    fn new_root(&mut self) -> usize {
        self.next_root += 1;
        self.next_root
    }

    fn gen_shape(&mut self) -> Result<Vec<i64>> {
        let rank = self.u.int_in_range(1..=2)?;
        (0..rank)
            .map(|_| self.u.int_in_range(self.config.extent.clone()))
            .collect()
    }

    fn int_operand(&mut self, scope: &Scope) -> Result<SubExp> {
        if !scope.ints.is_empty() && self.u.arbitrary()? {
            Ok(SubExp::Var(*self.u.choose(&scope.ints)?))
        } else {
            Ok(SubExp::Const(self.u.int_in_range(-3..=5)?))
        }
    }

    fn choose_array(&mut self, arrays: &[ArrayVar]) -> Result<Option<ArrayVar>> {
        if arrays.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.u.choose(arrays)?.clone()))
    }

    /// Like [`FunctionBuilder::choose_array`] but favors the most recently
    /// created arrays, which are the ones that can still be moved.
    fn choose_recent(&mut self, arrays: &[ArrayVar]) -> Result<Option<ArrayVar>> {
        if arrays.len() > 2 && self.u.ratio(2u8, 3u8)? {
            return self.choose_array(&arrays[arrays.len() - 2..]);
        }
        self.choose_array(arrays)
    }

    /// Allocates a new block. Every new array gets its own block so that a
    /// block never holds two unrelated live arrays.
    fn push_alloc(&mut self, stmts: &mut Vec<Stmt>) -> Mem {
        let mem = self.func.push_mem();
        let size = SubExp::Const(self.config.alloc_size);
        stmts.push(self.func.push_stmt(vec![], Exp::Alloc { mem, size }));
        mem
    }

    /// Returns a block for a new array, preferring one allocated earlier.
    fn take_block(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<Mem> {
        if !scope.spare.is_empty() && self.u.ratio(3u8, 4u8)? {
            let i = self.u.choose_index(scope.spare.len())?;
            return Ok(scope.spare.swap_remove(i));
        }
        Ok(self.push_alloc(stmts))
    }

    /// Emits a statement producing a fresh array in `mem`.
    fn array_in(
        &mut self,
        scope: &mut Scope,
        stmts: &mut Vec<Stmt>,
        mem: Mem,
        shape: Vec<i64>,
        exp: Exp,
    ) -> ArrayVar {
        let var = self
            .func
            .push_var(array_type(&shape), Some(direct_layout(mem, &shape)));
        stmts.push(self.func.push_stmt(vec![var], exp));
        let root = self.new_root();
        let array = ArrayVar {
            var,
            shape,
            mem,
            direct: true,
            root,
            owned: true,
        };
        scope.arrays.push(array.clone());
        array
    }

    /// Emits a statement producing a fresh array.
    fn fresh_array(
        &mut self,
        scope: &mut Scope,
        stmts: &mut Vec<Stmt>,
        shape: Vec<i64>,
        exp: Exp,
    ) -> Result<Var> {
        let mem = self.take_block(scope, stmts)?;
        Ok(self.array_in(scope, stmts, mem, shape, exp).var)
    }

    /// Emits a statement producing a view or alias of `src`. Returns `false`
    /// without emitting anything if the layout can't be derived.
    fn alias_array(
        &mut self,
        scope: &mut Scope,
        stmts: &mut Vec<Stmt>,
        src: &ArrayVar,
        shape: Vec<i64>,
        exp: Exp,
    ) -> bool {
        let ty = array_type(&shape);
        let Some(ixfun) = exp.default_ixfun(&ty, |v| self.func.var_mem(v)) else {
            return false;
        };
        let direct = ixfun.is_direct();
        let var = self.func.push_var(ty, Some(MemInfo { mem: src.mem, ixfun }));
        stmts.push(self.func.push_stmt(vec![var], exp));
        scope.arrays.push(ArrayVar {
            var,
            shape,
            mem: src.mem,
            direct,
            root: src.root,
            owned: src.owned,
        });
        true
    }

    fn gen_function(&mut self) -> Result<()> {
        let mut scope = Scope::default();
        let num_arrays = self.u.int_in_range(self.config.array_params.clone())?;
        let num_scalars = self.u.int_in_range(self.config.scalar_params.clone())?;
        let mut param_mems = vec![];
        for _ in 0..num_arrays {
            let mem = self.func.push_mem();
            self.func.params.push(Param::Mem(mem));
            param_mems.push(mem);
        }
        for _ in 0..num_scalars {
            let var = self.func.push_var(Type::I64, None);
            self.func.params.push(Param::Var(var));
            scope.ints.push(var);
        }
        for mem in param_mems {
            let shape = self.gen_shape()?;
            let var = self
                .func
                .push_var(array_type(&shape), Some(direct_layout(mem, &shape)));
            self.func.params.push(Param::Var(var));
            let root = self.new_root();

            // Parameters may not be consumed.
            scope.arrays.push(ArrayVar {
                var,
                shape,
                mem,
                direct: true,
                root,
                owned: false,
            });
        }

        let mut stmts = vec![];
        let num_stmts = self.u.int_in_range(self.config.stmts_per_body.clone())?;
        for _ in 0..num_stmts {
            self.gen_stmt(&mut scope, &mut stmts, 0)?;
        }
        let num_results = self.u.int_in_range(self.config.results.clone())?;
        let mut results = vec![];
        for _ in 0..num_results {
            let result = match self.choose_array(&scope.arrays)? {
                Some(array) if self.u.arbitrary()? => SubExp::Var(array.var),
                _ => self.int_operand(&scope)?,
            };
            results.push(result);
        }
        self.func.finish(stmts, results);
        Ok(())
    }

    /// Generates a body in `scope` which yields values of the given kinds: an
    /// integer for `None` or an array of the given shape.
    fn gen_body(
        &mut self,
        mut scope: Scope,
        depth: usize,
        kinds: &[Option<Vec<i64>>],
    ) -> Result<Body> {
        let mut stmts = vec![];
        let num_stmts = self.u.int_in_range(self.config.stmts_per_body.clone())?;
        for _ in 0..num_stmts {
            self.gen_stmt(&mut scope, &mut stmts, depth)?;
        }
        let mut results = vec![];
        let mut yielded = vec![];
        for kind in kinds {
            let result = match kind {
                None => self.int_operand(&scope)?,
                Some(shape) => {
                    // Only arrays created in this body may be moved out of
                    // it, and each one only once.
                    let candidates: Vec<ArrayVar> = scope
                        .arrays
                        .iter()
                        .filter(|a| a.owned && a.shape == *shape && !yielded.contains(&a.root))
                        .cloned()
                        .collect();
                    let array = match self.choose_array(&candidates)? {
                        Some(array) if self.u.ratio(3u8, 4u8)? => array.var,
                        _ => {
                            let value = self.int_operand(&scope)?;
                            let exp = Exp::Replicate {
                                shape: shape.iter().map(|&dim| SubExp::Const(dim)).collect(),
                                value,
                            };
                            self.fresh_array(&mut scope, &mut stmts, shape.clone(), exp)?
                        }
                    };
                    if let Some(a) = scope.arrays.iter().find(|a| a.var == array) {
                        yielded.push(a.root);
                    }
                    SubExp::Var(array)
                }
            };
            results.push(result);
        }
        Ok(self.func.push_body(stmts, results))
    }

    fn gen_stmt(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>, depth: usize) -> Result<()> {
        let nested = depth < self.config.max_depth;
        let choice = self.u.choose_index(if nested { 18 } else { 16 })?;
        let generated = match choice {
            0 => self.gen_copy(scope, stmts)?,
            1 => self.gen_update(scope, stmts)?,
            2 => self.gen_concat(scope, stmts)?,
            3 => self.gen_map(scope, stmts)?,
            4 => {
                let n = self.u.int_in_range(self.config.extent.clone())?;
                self.fresh_array(scope, stmts, vec![n], Exp::Iota(SubExp::Const(n)))?;
                true
            }
            5 => {
                let shape = self.gen_shape()?;
                let value = self.int_operand(scope)?;
                let exp = Exp::Replicate {
                    shape: shape.iter().map(|&dim| SubExp::Const(dim)).collect(),
                    value,
                };
                self.fresh_array(scope, stmts, shape, exp)?;
                true
            }
            6 => self.gen_read(scope, stmts)?,
            7 => self.gen_view(scope, stmts)?,
            8 => self.gen_reshape(scope, stmts)?,
            9 => self.gen_rearrange(scope, stmts)?,
            10 => match self.choose_array(&scope.arrays)? {
                Some(src) => {
                    let shape = src.shape.clone();
                    let exp = Exp::SubExp(SubExp::Var(src.var));
                    self.alias_array(scope, stmts, &src, shape, exp)
                }
                None => false,
            },
            11 => {
                self.gen_cmp(scope, stmts)?;
                true
            }
            12 => {
                let mem = self.push_alloc(stmts);
                scope.spare.push(mem);
                true
            }
            13 | 14 => self.gen_chain(scope, stmts)?,
            15 => false,
            16 => {
                self.gen_if(scope, stmts, depth)?;
                true
            }
            17 => {
                self.gen_loop(scope, stmts, depth)?;
                true
            }
            _ => unreachable!(),
        };
        if !generated {
            let op = *self.u.choose(&BinOp::ALL)?;
            let a = self.int_operand(scope)?;
            let b = self.int_operand(scope)?;
            let var = self.func.push_var(Type::I64, None);
            stmts.push(self.func.push_stmt(vec![var], Exp::BinOp(op, a, b)));
            scope.ints.push(var);
        }
        Ok(())
    }

    fn gen_cmp(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<Var> {
        let op = *self.u.choose(&CmpOp::ALL)?;
        let a = self.int_operand(scope)?;
        let b = self.int_operand(scope)?;
        let var = self.func.push_var(Type::Bool, None);
        stmts.push(self.func.push_stmt(vec![var], Exp::Cmp(op, a, b)));
        scope.bools.push(var);
        Ok(var)
    }

    fn gen_copy(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let Some(src) = self.choose_recent(&scope.arrays)? else {
            return Ok(false);
        };
        self.fresh_array(scope, stmts, src.shape.clone(), Exp::Copy(src.var))?;
        self.maybe_retire(scope, src.var)?;
        Ok(true)
    }

    /// Sometimes stops using an array which was just moved somewhere else,
    /// so that the move is its last use.
    fn maybe_retire(&mut self, scope: &mut Scope, var: Var) -> Result<()> {
        if self.u.arbitrary()? {
            scope.retire(var);
        }
        Ok(())
    }

    /// Builds a one-dimensional array and moves it into a block allocated
    /// before it, through a copy, a row update or a concatenation. The array
    /// may be moved through an alias.
    fn gen_chain(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let n = self.u.int_in_range(self.config.extent.clone())?;
        let kind = self.u.choose_index(3)?;
        let dst = self.push_alloc(stmts);
        let target = if kind == 1 {
            let rows = self.u.int_in_range(1..=3)?;
            let exp = Exp::Replicate {
                shape: vec![SubExp::Const(rows), SubExp::Const(n)],
                value: self.int_operand(scope)?,
            };
            Some(self.array_in(scope, stmts, dst, vec![rows, n], exp))
        } else {
            None
        };

        let exp = if self.u.arbitrary()? {
            Exp::Iota(SubExp::Const(n))
        } else {
            Exp::Replicate {
                shape: vec![SubExp::Const(n)],
                value: self.int_operand(scope)?,
            }
        };
        let mem = self.take_block(scope, stmts)?;
        let mut src = self.array_in(scope, stmts, mem, vec![n], exp);
        if self.u.ratio(1u8, 3u8)? {
            let exp = Exp::SubExp(SubExp::Var(src.var));
            if self.alias_array(scope, stmts, &src, vec![n], exp) {
                if let Some(alias) = scope.arrays.last() {
                    src = alias.clone();
                }
            }
        }

        match target {
            Some(x) => {
                let row = self.u.int_in_range(0..=x.shape[0] - 1)?;
                let var = self
                    .func
                    .push_var(array_type(&x.shape), Some(direct_layout(dst, &x.shape)));
                let exp = Exp::Update {
                    array: x.var,
                    slice: vec![DimIndex::Fix(SubExp::Const(row)), full_range(n)],
                    value: SubExp::Var(src.var),
                };
                stmts.push(self.func.push_stmt(vec![var], exp));
                scope.consume(x.root);
                let root = self.new_root();
                scope.arrays.push(ArrayVar { var, root, ..x });
            }
            None if kind == 0 => {
                self.array_in(scope, stmts, dst, vec![n], Exp::Copy(src.var));
            }
            None => {
                let others: Vec<ArrayVar> = scope
                    .arrays
                    .iter()
                    .filter(|a| a.shape.len() == 1 && a.var != src.var)
                    .cloned()
                    .collect();
                let mut args = vec![src.var];
                let mut len = n;
                if let Some(other) = self.choose_recent(&others)? {
                    if n + other.shape[0] <= self.config.alloc_size {
                        len += other.shape[0];
                        if self.u.arbitrary()? {
                            args.push(other.var);
                        } else {
                            args.insert(0, other.var);
                        }
                    }
                }
                self.array_in(scope, stmts, dst, vec![len], Exp::Concat(args));
            }
        }
        self.maybe_retire(scope, src.var)?;
        Ok(true)
    }

    fn gen_update(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let owned: Vec<ArrayVar> = scope.arrays.iter().filter(|a| a.owned).cloned().collect();
        let Some(x) = self.choose_array(&owned)? else {
            return Ok(false);
        };
        let mut slice = vec![];
        for &extent in &x.shape {
            slice.push(DimIndex::Fix(SubExp::Const(self.u.int_in_range(0..=extent - 1)?)));
        }
        let mut value = self.int_operand(scope)?;

        // Write a whole row of a matrix from another array.
        if let [_, cols] = x.shape[..] {
            let rows: Vec<ArrayVar> = scope
                .arrays
                .iter()
                .filter(|a| a.shape == [cols] && a.root != x.root)
                .cloned()
                .collect();
            if let Some(row) = self.choose_recent(&rows)? {
                slice[1] = full_range(cols);
                value = SubExp::Var(row.var);
            }
        }

        let Some(info) = self.func.var_mem(x.var).cloned() else {
            return Ok(false);
        };
        let var = self.func.push_var(array_type(&x.shape), Some(info));
        let exp = Exp::Update {
            array: x.var,
            slice,
            value,
        };
        stmts.push(self.func.push_stmt(vec![var], exp));
        scope.consume(x.root);
        if let SubExp::Var(row) = value {
            self.maybe_retire(scope, row)?;
        }
        let root = self.new_root();
        scope.arrays.push(ArrayVar {
            var,
            root,
            ..x
        });
        Ok(true)
    }

    fn gen_concat(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let Some(first) = self.choose_recent(&scope.arrays)? else {
            return Ok(false);
        };
        let compatible: Vec<ArrayVar> = scope
            .arrays
            .iter()
            .filter(|a| a.shape[1..] == first.shape[1..])
            .cloned()
            .collect();
        let mut args = vec![first.var];
        let mut shape = first.shape.clone();
        for _ in 0..self.u.int_in_range(1..=2)? {
            let Some(next) = self.choose_array(&compatible)? else {
                break;
            };
            args.push(next.var);
            shape[0] += next.shape[0];
        }
        if shape.iter().product::<i64>() > self.config.alloc_size {
            return Ok(false);
        }
        self.fresh_array(scope, stmts, shape, Exp::Concat(args))?;
        Ok(true)
    }

    fn gen_map(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let Some(lhs_array) = self.choose_array(&scope.arrays)? else {
            return Ok(false);
        };
        let same_shape: Vec<ArrayVar> = scope
            .arrays
            .iter()
            .filter(|a| a.shape == lhs_array.shape)
            .cloned()
            .collect();
        let other = match self.choose_array(&same_shape)? {
            Some(rhs) if self.u.arbitrary()? => SubExp::Var(rhs.var),
            _ => self.int_operand(scope)?,
        };
        let (lhs, rhs) = if self.u.arbitrary()? {
            (SubExp::Var(lhs_array.var), other)
        } else {
            (other, SubExp::Var(lhs_array.var))
        };
        let op = *self.u.choose(&BinOp::ALL)?;
        let shape = lhs_array.shape;
        self.fresh_array(scope, stmts, shape, Exp::Map { op, lhs, rhs })?;
        Ok(true)
    }

    /// Reads a single element of an array.
    fn gen_read(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let Some(src) = self.choose_array(&scope.arrays)? else {
            return Ok(false);
        };
        let mut slice = vec![];
        for &extent in &src.shape {
            slice.push(DimIndex::Fix(SubExp::Const(self.u.int_in_range(0..=extent - 1)?)));
        }
        let var = self.func.push_var(Type::I64, None);
        let exp = Exp::Index {
            array: src.var,
            slice,
        };
        stmts.push(self.func.push_stmt(vec![var], exp));
        scope.ints.push(var);
        Ok(true)
    }

    /// Takes a sub-array view: a range of a vector or a row of a matrix.
    fn gen_view(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let Some(src) = self.choose_array(&scope.arrays)? else {
            return Ok(false);
        };
        let (slice, shape) = match src.shape[..] {
            [n] => {
                let start = self.u.int_in_range(0..=n - 1)?;
                let len = self.u.int_in_range(1..=n - start)?;
                let slice = vec![DimIndex::Range {
                    start: SubExp::Const(start),
                    len: SubExp::Const(len),
                    stride: SubExp::Const(1),
                }];
                (slice, vec![len])
            }
            [rows, cols] => {
                let row = self.u.int_in_range(0..=rows - 1)?;
                let slice = vec![DimIndex::Fix(SubExp::Const(row)), full_range(cols)];
                (slice, vec![cols])
            }
            _ => return Ok(false),
        };
        let exp = Exp::Index {
            array: src.var,
            slice,
        };
        Ok(self.alias_array(scope, stmts, &src, shape, exp))
    }

    fn gen_reshape(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let direct: Vec<ArrayVar> = scope.arrays.iter().filter(|a| a.direct).cloned().collect();
        let Some(src) = self.choose_array(&direct)? else {
            return Ok(false);
        };
        let shape = match src.shape[..] {
            [n] => vec![1, n],
            [rows, cols] => vec![rows * cols],
            _ => return Ok(false),
        };
        let exp = Exp::Reshape {
            array: src.var,
            shape: shape.iter().map(|&dim| SubExp::Const(dim)).collect(),
        };
        Ok(self.alias_array(scope, stmts, &src, shape, exp))
    }

    fn gen_rearrange(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>) -> Result<bool> {
        let matrices: Vec<ArrayVar> = scope
            .arrays
            .iter()
            .filter(|a| a.shape.len() == 2)
            .cloned()
            .collect();
        let Some(src) = self.choose_array(&matrices)? else {
            return Ok(false);
        };
        let shape = vec![src.shape[1], src.shape[0]];
        let exp = Exp::Rearrange {
            array: src.var,
            perm: vec![1, 0],
        };
        Ok(self.alias_array(scope, stmts, &src, shape, exp))
    }

    /// Picks the kinds of values bound by an `if` or loop pattern.
    fn gen_kinds(&mut self) -> Result<Vec<Option<Vec<i64>>>> {
        let count = self.u.int_in_range(1..=2)?;
        (0..count)
            .map(|_| {
                if self.u.ratio(2u8, 3u8)? {
                    Ok(Some(self.gen_shape()?))
                } else {
                    Ok(None)
                }
            })
            .collect()
    }

    /// Declares the variables of an `if` or loop pattern in the given
    /// blocks.
    fn declare_pattern(
        &mut self,
        kinds: &[Option<Vec<i64>>],
        mems: &[Option<Mem>],
    ) -> Vec<Var> {
        kinds
            .iter()
            .zip(mems)
            .map(|(kind, mem)| match (kind, mem) {
                (Some(shape), &Some(mem)) => self
                    .func
                    .push_var(array_type(shape), Some(direct_layout(mem, shape))),
                _ => self.func.push_var(Type::I64, None),
            })
            .collect()
    }

    /// Makes the variables bound by an `if` or loop pattern available.
    fn bind_pattern(
        &mut self,
        scope: &mut Scope,
        vars: &[Var],
        kinds: &[Option<Vec<i64>>],
        mems: &[Option<Mem>],
    ) {
        for ((&var, kind), mem) in vars.iter().zip(kinds).zip(mems) {
            match (kind, mem) {
                (Some(shape), &Some(mem)) => {
                    let root = self.new_root();
                    scope.arrays.push(ArrayVar {
                        var,
                        shape: shape.clone(),
                        mem,
                        direct: true,
                        root,
                        owned: true,
                    });
                }
                _ => scope.ints.push(var),
            }
        }
    }

    fn gen_if(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>, depth: usize) -> Result<()> {
        let cond = if scope.bools.is_empty() || self.u.ratio(1u8, 4u8)? {
            self.gen_cmp(scope, stmts)?
        } else {
            *self.u.choose(&scope.bools)?
        };
        let kinds = self.gen_kinds()?;
        let mems: Vec<Option<Mem>> = kinds
            .iter()
            .map(|kind| kind.as_ref().map(|_| self.push_alloc(stmts)))
            .collect();
        let pattern = self.declare_pattern(&kinds, &mems);
        let then_body = self.gen_body(scope.nested(), depth + 1, &kinds)?;
        let else_body = self.gen_body(scope.nested(), depth + 1, &kinds)?;
        let exp = Exp::If {
            cond: SubExp::Var(cond),
            then_body,
            else_body,
        };
        stmts.push(self.func.push_stmt(pattern.clone(), exp));
        self.bind_pattern(scope, &pattern, &kinds, &mems);
        Ok(())
    }

    fn gen_loop(&mut self, scope: &mut Scope, stmts: &mut Vec<Stmt>, depth: usize) -> Result<()> {
        let kinds = self.gen_kinds()?;

        // Initial values, and the blocks of the loop parameters and of the
        // pattern.
        let mut inits = vec![];
        let mut param_mems = vec![];
        let mut pattern_mems = vec![];
        let mut consumed = vec![];
        for kind in &kinds {
            let Some(shape) = kind else {
                inits.push(self.int_operand(scope)?);
                param_mems.push(None);
                pattern_mems.push(None);
                continue;
            };
            let candidates: Vec<ArrayVar> = scope
                .arrays
                .iter()
                .filter(|a| a.owned && a.shape == *shape && !consumed.contains(&a.root))
                .cloned()
                .collect();
            let init = match self.choose_array(&candidates)? {
                Some(init) => init,
                None => {
                    let value = self.int_operand(scope)?;
                    let exp = Exp::Replicate {
                        shape: shape.iter().map(|&dim| SubExp::Const(dim)).collect(),
                        value,
                    };
                    let var = self.fresh_array(scope, stmts, shape.clone(), exp)?;
                    let Some(init) = scope.arrays.iter().find(|a| a.var == var).cloned() else {
                        unreachable!()
                    };
                    init
                }
            };
            consumed.push(init.root);
            inits.push(SubExp::Var(init.var));
            // Reusing the block of the initial value or of the parameter
            // makes the loop update its array in place.
            let param_mem = if init.direct && self.u.arbitrary()? {
                init.mem
            } else {
                self.push_alloc(stmts)
            };
            let pattern_mem = if self.u.arbitrary()? {
                param_mem
            } else {
                self.push_alloc(stmts)
            };
            param_mems.push(Some(param_mem));
            pattern_mems.push(Some(pattern_mem));
        }

        let pattern = self.declare_pattern(&kinds, &pattern_mems);
        let params_vars = self.declare_pattern(&kinds, &param_mems);
        let index = self.func.push_var(Type::I64, None);

        let mut body_scope = scope.nested();
        for &root in &consumed {
            body_scope.consume(root);
        }
        self.bind_pattern(&mut body_scope, &params_vars, &kinds, &param_mems);
        body_scope.ints.push(index);
        let body = self.gen_body(body_scope, depth + 1, &kinds)?;

        let bound = SubExp::Const(self.u.int_in_range(self.config.loop_iterations.clone())?);
        let params = params_vars
            .iter()
            .zip(inits)
            .map(|(&var, init)| LoopParam { var, init })
            .collect();
        let exp = Exp::Loop {
            params,
            index,
            bound,
            body,
        };
        stmts.push(self.func.push_stmt(pattern.clone(), exp));
        for root in consumed {
            scope.consume(root);
        }
        self.bind_pattern(scope, &pattern, &kinds, &pattern_mems);
        Ok(())
    }
}
