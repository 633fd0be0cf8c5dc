//! Reference interpreter for functions with explicit memory.
//!
//! Every memory block is a buffer of elements and every array variable is a
//! view into a buffer through its evaluated index function. Expressions which
//! produce fresh arrays write their elements through the view of the pattern
//! variable, so a function whose memory annotations place two live arrays on
//! the same elements computes a different result. This makes the interpreter
//! suitable for checking that a coalescing rewrite preserves the meaning of a
//! function.

use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use anyhow::{Context as _, Result, bail, ensure};
use cranelift_entity::SecondaryMap;
use smallvec::SmallVec;

use super::display_iter;
use crate::function::{Body, DimIndex, Exp, Function, Mem, Param, Stmt, SubExp, Type, Var};
use crate::ixfun::{IxFun, PrimExp};

/// Maximum number of statements executed before giving up.
const MAX_STEPS: usize = 1 << 16;

/// Maximum number of elements in a single buffer or array.
const MAX_ELEMS: i64 = 1 << 12;

/// A value passed to or returned from an interpreted function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// A 64-bit integer.
    Int(i64),

    /// A boolean.
    Bool(bool),

    /// An array with its elements in row-major order.
    Array {
        /// Extent of each dimension.
        shape: Vec<i64>,

        /// Elements in row-major order.
        elems: Vec<i64>,
    },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array { shape, elems } => {
                for dim in shape {
                    write!(f, "[{dim}]")?;
                }
                write!(f, "{{{}}}", display_iter(elems, ","))
            }
        }
    }
}

/// An index function with every symbolic expression evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    base: SmallVec<[i64; 4]>,
    offset: SmallVec<[i64; 4]>,
    dims: SmallVec<[(usize, i64); 4]>,
}

impl Layout {
    fn eval(ixfun: &IxFun, env: &impl Fn(Var) -> Option<i64>) -> Result<Self> {
        let eval = |e: &PrimExp| {
            e.eval(env)
                .with_context(|| format!("can't evaluate {e} in {ixfun}"))
        };
        Ok(Self {
            base: ixfun.base().iter().map(eval).collect::<Result<_>>()?,
            offset: ixfun.offset().iter().map(eval).collect::<Result<_>>()?,
            dims: ixfun
                .dims()
                .iter()
                .map(|dim| Ok((dim.base_dim, eval(&dim.stride)?)))
                .collect::<Result<_>>()?,
        })
    }

    /// Position in the buffer of the element at `index`.
    fn position(&self, index: &[i64]) -> i64 {
        let mut coords = self.offset.clone();
        for (&(base_dim, stride), &i) in self.dims.iter().zip(index) {
            coords[base_dim] = coords[base_dim].wrapping_add(i.wrapping_mul(stride));
        }
        coords
            .iter()
            .zip(&self.base)
            .fold(0i64, |pos, (&c, &size)| pos.wrapping_mul(size).wrapping_add(c))
    }
}

/// The location of an array: a buffer and a layout within it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct View {
    buf: usize,
    shape: SmallVec<[i64; 4]>,
    layout: Layout,
}

#[derive(Debug, Clone)]
enum Val {
    Int(i64),
    Bool(bool),
    Array(View),
}

struct Buffer {
    data: Vec<Option<i64>>,

    /// Buffers for memory parameters have no declared size and grow on
    /// demand.
    growable: bool,
}

/// Calls `f` on every index of an array of the given shape in row-major
/// order.
fn for_each_index(shape: &[i64], mut f: impl FnMut(&[i64]) -> Result<()>) -> Result<()> {
    if shape.iter().any(|&dim| dim == 0) {
        return Ok(());
    }
    let mut index: SmallVec<[i64; 4]> = shape.iter().map(|_| 0).collect();
    loop {
        f(&index)?;
        let mut dim = shape.len();
        loop {
            if dim == 0 {
                return Ok(());
            }
            dim -= 1;
            index[dim] += 1;
            if index[dim] < shape[dim] {
                break;
            }
            index[dim] = 0;
        }
    }
}

fn num_elems(shape: &[i64]) -> Result<i64> {
    let mut count: i64 = 1;
    for &dim in shape {
        ensure!(dim >= 0, "negative array extent {dim}");
        count = count.saturating_mul(dim);
    }
    ensure!(count <= MAX_ELEMS, "array with {count} elements is too large");
    Ok(count)
}

struct Interpreter<'a, F> {
    func: &'a F,
    vars: SecondaryMap<Var, Option<Val>>,
    mems: SecondaryMap<Mem, Option<usize>>,
    buffers: Vec<Buffer>,
    steps: usize,
}

/// Executes `func` on the given arguments, one per variable parameter.
///
/// Fails if the function reads uninitialized or out-of-bounds memory, if an
/// operation is applied to arrays of mismatched shapes or if execution takes
/// too long.
pub fn interpret(func: &impl Function, args: &[Value]) -> Result<Vec<Value>> {
    let mut interp = Interpreter {
        func,
        vars: SecondaryMap::new(),
        mems: SecondaryMap::new(),
        buffers: vec![],
        steps: 0,
    };
    interp.bind_params(args)?;
    let results = interp.body(func.entry_body())?;
    results.iter().map(|val| interp.export(val)).collect()
}

impl<F: Function> Interpreter<'_, F> {
    fn scalar(&self, var: Var) -> Option<i64> {
        match self.vars[var] {
            Some(Val::Int(i)) => Some(i),
            _ => None,
        }
    }

    fn operand(&self, se: SubExp) -> Result<Val> {
        match se {
            SubExp::Const(c) => Ok(Val::Int(c)),
            SubExp::Var(var) => match &self.vars[var] {
                Some(val) => Ok(val.clone()),
                None => bail!("{var} is unbound"),
            },
        }
    }

    fn int(&self, se: SubExp) -> Result<i64> {
        match self.operand(se)? {
            Val::Int(i) => Ok(i),
            _ => bail!("{se} is not an integer"),
        }
    }

    fn array(&self, var: Var) -> Result<View> {
        match self.operand(SubExp::Var(var))? {
            Val::Array(view) => Ok(view),
            _ => bail!("{var} is not an array"),
        }
    }

    fn eval_shape(&self, ty: &Type) -> Result<SmallVec<[i64; 4]>> {
        let Some(shape) = ty.shape() else {
            bail!("{ty} is not an array type");
        };
        let shape = shape
            .iter()
            .map(|&dim| self.int(dim))
            .collect::<Result<SmallVec<[i64; 4]>>>()?;
        num_elems(&shape)?;
        Ok(shape)
    }

    /// The location declared for an array variable, evaluated in the current
    /// environment.
    fn location(&self, var: Var) -> Result<View> {
        let Some(info) = self.func.var_mem(var) else {
            bail!("{var} has no memory annotation");
        };
        let Some(buf) = self.mems[info.mem] else {
            bail!("{} is not allocated", info.mem);
        };
        let shape = self.eval_shape(self.func.var_type(var))?;
        let layout = Layout::eval(&info.ixfun, &|v| self.scalar(v))
            .with_context(|| format!("in the location of {var}"))?;
        ensure!(
            layout.dims.len() == shape.len(),
            "{var}: index function rank doesn't match its type"
        );
        Ok(View { buf, shape, layout })
    }

    fn checked_position(&self, view: &View, index: &[i64]) -> Result<usize> {
        let pos = view.layout.position(index);
        let buf = &self.buffers[view.buf];
        ensure!(pos >= 0, "negative position {pos}");
        ensure!(
            buf.growable || (pos as usize) < buf.data.len(),
            "position {pos} out of bounds of a buffer of {} elements",
            buf.data.len()
        );
        ensure!(pos < MAX_ELEMS, "position {pos} is too large");
        Ok(pos as usize)
    }

    fn read_elem(&self, view: &View, index: &[i64]) -> Result<i64> {
        let pos = self.checked_position(view, index)?;
        match self.buffers[view.buf].data.get(pos) {
            Some(&Some(x)) => Ok(x),
            _ => bail!("read of uninitialized memory at position {pos}"),
        }
    }

    fn write_elem(&mut self, view: &View, index: &[i64], x: i64) -> Result<()> {
        let pos = self.checked_position(view, index)?;
        let data = &mut self.buffers[view.buf].data;
        if pos >= data.len() {
            data.resize(pos + 1, None);
        }
        data[pos] = Some(x);
        Ok(())
    }

    /// Reads every element of an array in row-major order.
    fn read(&self, view: &View) -> Result<Vec<i64>> {
        let mut elems = vec![];
        for_each_index(&view.shape, |index| {
            elems.push(self.read_elem(view, index)?);
            Ok(())
        })?;
        Ok(elems)
    }

    /// Writes `elems`, in row-major order, through a view.
    fn write(&mut self, view: &View, elems: &[i64]) -> Result<()> {
        ensure!(
            elems.len() as i64 == num_elems(&view.shape)?,
            "writing {} elements to an array of shape {:?}",
            elems.len(),
            view.shape
        );
        let mut iter = elems.iter();
        for_each_index(&view.shape.clone(), |index| {
            let Some(&x) = iter.next() else {
                unreachable!()
            };
            self.write_elem(view, index, x)
        })
    }

    /// Moves the contents of `src` to `dst` unless they are the same
    /// location.
    fn move_array(&mut self, src: &View, dst: &View) -> Result<()> {
        ensure!(
            src.shape == dst.shape,
            "moving an array of shape {:?} to one of shape {:?}",
            src.shape,
            dst.shape
        );
        if src != dst {
            let elems = self.read(src)?;
            self.write(dst, &elems)?;
        }
        Ok(())
    }

    fn new_buffer(&mut self, size: usize, growable: bool) -> usize {
        self.buffers.push(Buffer {
            data: vec![None; size],
            growable,
        });
        self.buffers.len() - 1
    }

    fn bind_params(&mut self, args: &[Value]) -> Result<()> {
        let func = self.func;
        let vars: Vec<Var> = func
            .params()
            .iter()
            .filter_map(|param| match *param {
                Param::Var(var) => Some(var),
                Param::Mem(_) => None,
            })
            .collect();
        ensure!(
            vars.len() == args.len(),
            "expected {} arguments, got {}",
            vars.len(),
            args.len()
        );
        for &param in func.params() {
            if let Param::Mem(mem) = param {
                self.mems[mem] = Some(self.new_buffer(0, true));
            }
        }

        // Scalars first since array shapes and layouts may refer to them.
        for (&var, arg) in vars.iter().zip(args) {
            let val = match (func.var_type(var), arg) {
                (Type::I64, &Value::Int(i)) => Val::Int(i),
                (Type::Bool, &Value::Bool(b)) => Val::Bool(b),
                (Type::Array(_), Value::Array { .. }) => continue,
                (ty, arg) => bail!("argument {arg} doesn't match {var} of type {ty}"),
            };
            self.vars[var] = Some(val);
        }
        for (&var, arg) in vars.iter().zip(args) {
            if let Value::Array { shape, elems } = arg {
                let view = self.location(var)?;
                ensure!(
                    view.shape.as_slice() == shape.as_slice(),
                    "argument of shape {shape:?} doesn't match {var} of shape {:?}",
                    view.shape
                );
                self.write(&view, elems)?;
                self.vars[var] = Some(Val::Array(view));
            }
        }
        Ok(())
    }

    /// Converts an internal value to an external one.
    fn export(&self, val: &Val) -> Result<Value> {
        Ok(match val {
            Val::Int(i) => Value::Int(*i),
            Val::Bool(b) => Value::Bool(*b),
            Val::Array(view) => Value::Array {
                shape: view.shape.to_vec(),
                elems: self.read(view)?,
            },
        })
    }

    fn body(&mut self, body: Body) -> Result<Vec<Val>> {
        let func = self.func;
        for &stmt in func.body_stmts(body) {
            self.steps += 1;
            ensure!(self.steps <= MAX_STEPS, "step limit exceeded");
            self.stmt(stmt).with_context(|| format!("in {stmt}"))?;
        }
        func.body_results(body)
            .iter()
            .map(|&se| self.operand(se))
            .collect()
    }

    /// Binds a pattern variable to its declared location, checking that it
    /// has the expected shape.
    fn bind_location(&mut self, var: Var, shape: &[i64]) -> Result<View> {
        let view = self.location(var)?;
        ensure!(
            view.shape.as_slice() == shape,
            "{var} has shape {:?}, expected {shape:?}",
            view.shape
        );
        self.vars[var] = Some(Val::Array(view.clone()));
        Ok(view)
    }

    /// Binds a pattern variable to a freshly computed array.
    fn bind_fresh(&mut self, var: Var, shape: &[i64], elems: &[i64]) -> Result<()> {
        let view = self.bind_location(var, shape)?;
        self.write(&view, elems)
    }

    /// Binds a variable to a value moved out of a nested body.
    fn bind_moved(&mut self, var: Var, val: Val) -> Result<()> {
        match val {
            Val::Array(src) => {
                let dst = self.bind_location(var, &src.shape)?;
                self.move_array(&src, &dst)
            }
            scalar => {
                self.vars[var] = Some(scalar);
                Ok(())
            }
        }
    }

    /// Applies a slice to an array view, returning the shape of the result
    /// and a function mapping result indices to source indices.
    fn slice_indices(
        &self,
        view: &View,
        slice: &[DimIndex],
    ) -> Result<(SmallVec<[i64; 4]>, SmallVec<[(i64, i64, bool); 4]>)> {
        ensure!(slice.len() == view.shape.len(), "slice rank mismatch");
        let mut shape = SmallVec::new();
        let mut map = SmallVec::new();
        for (idx, &extent) in slice.iter().zip(&view.shape) {
            match *idx {
                DimIndex::Fix(i) => {
                    let i = self.int(i)?;
                    ensure!(i >= 0 && i < extent, "index {i} out of bounds of {extent}");
                    map.push((i, 0, false));
                }
                DimIndex::Range { start, len, stride } => {
                    let (start, len, stride) = (self.int(start)?, self.int(len)?, self.int(stride)?);
                    ensure!(len >= 0, "negative slice length {len}");
                    if len > 0 {
                        let last = start.wrapping_add((len - 1).wrapping_mul(stride));
                        ensure!(
                            (0..extent).contains(&start) && (0..extent).contains(&last),
                            "slice {start}:{len}:{stride} out of bounds of {extent}"
                        );
                    }
                    shape.push(len);
                    map.push((start, stride, true));
                }
            }
        }
        Ok((shape, map))
    }

    fn stmt(&mut self, stmt: Stmt) -> Result<()> {
        let func = self.func;
        let pattern = func.stmt_pattern(stmt);
        match func.stmt_exp(stmt) {
            &Exp::Alloc { mem, size } => {
                let size = self.int(size)?;
                num_elems(&[size])?;
                self.mems[mem] = Some(self.new_buffer(size as usize, false));
            }
            &Exp::SubExp(se) => match self.operand(se)? {
                Val::Array(view) => {
                    self.bind_location(pattern[0], &view.shape)?;
                }
                val => self.vars[pattern[0]] = Some(val),
            },
            &Exp::BinOp(op, a, b) => {
                let val = op.eval(self.int(a)?, self.int(b)?);
                self.vars[pattern[0]] = Some(Val::Int(val));
            }
            &Exp::Cmp(op, a, b) => {
                let val = op.eval(self.int(a)?, self.int(b)?);
                self.vars[pattern[0]] = Some(Val::Bool(val));
            }
            Exp::Index { array, slice } => {
                let view = self.array(*array)?;
                let (shape, map) = self.slice_indices(&view, slice)?;
                if shape.is_empty() {
                    let index: SmallVec<[i64; 4]> = map.iter().map(|&(i, _, _)| i).collect();
                    let val = self.read_elem(&view, &index)?;
                    self.vars[pattern[0]] = Some(Val::Int(val));
                } else {
                    self.bind_location(pattern[0], &shape)?;
                }
            }
            Exp::Update {
                array,
                slice,
                value,
            } => {
                let src = self.array(*array)?;
                let (shape, map) = self.slice_indices(&src, slice)?;
                let dst = self.bind_location(pattern[0], &src.shape)?;
                let value = match self.operand(*value)? {
                    Val::Array(view) => {
                        ensure!(view.shape == shape, "update value shape mismatch");
                        self.read(&view)?
                    }
                    Val::Int(i) => {
                        ensure!(shape.is_empty(), "update of a slice with a scalar");
                        vec![i]
                    }
                    Val::Bool(_) => bail!("update with a bool"),
                };
                self.move_array(&src, &dst)?;
                let mut elems = value.into_iter();
                for_each_index(&shape, |index| {
                    let mut ranges = index.iter();
                    let full: SmallVec<[i64; 4]> = map
                        .iter()
                        .map(|&(start, stride, is_range)| {
                            if is_range {
                                start + stride * ranges.next().copied().unwrap_or(0)
                            } else {
                                start
                            }
                        })
                        .collect();
                    let Some(x) = elems.next() else {
                        unreachable!()
                    };
                    self.write_elem(&dst, &full, x)
                })?;
            }
            Exp::Copy(array) => {
                let src = self.array(*array)?;
                let elems = self.read(&src)?;
                self.bind_fresh(pattern[0], &src.shape, &elems)?;
            }
            Exp::Concat(arrays) => {
                let mut shape: Option<SmallVec<[i64; 4]>> = None;
                let mut elems = vec![];
                for &array in arrays {
                    let view = self.array(array)?;
                    ensure!(!view.shape.is_empty(), "concat of scalars");
                    match &mut shape {
                        None => shape = Some(view.shape.clone()),
                        Some(shape) => {
                            ensure!(
                                shape[1..] == view.shape[1..],
                                "concat of arrays with different inner shapes"
                            );
                            shape[0] += view.shape[0];
                        }
                    }
                    elems.extend(self.read(&view)?);
                }
                let Some(shape) = shape else {
                    bail!("concat of no arrays");
                };
                self.bind_fresh(pattern[0], &shape, &elems)?;
            }
            &Exp::Iota(n) => {
                let n = self.int(n)?;
                num_elems(&[n])?;
                let elems: Vec<i64> = (0..n).collect();
                self.bind_fresh(pattern[0], &[n], &elems)?;
            }
            Exp::Replicate { shape, value } => {
                let shape = shape
                    .iter()
                    .map(|&dim| self.int(dim))
                    .collect::<Result<SmallVec<[i64; 4]>>>()?;
                let count = num_elems(&shape)?;
                let elems = vec![self.int(*value)?; count as usize];
                self.bind_fresh(pattern[0], &shape, &elems)?;
            }
            &Exp::Map { op, lhs, rhs } => {
                let operand = |se| -> Result<(Option<SmallVec<[i64; 4]>>, Vec<i64>)> {
                    match self.operand(se)? {
                        Val::Int(i) => Ok((None, vec![i])),
                        Val::Array(view) => Ok((Some(view.shape.clone()), self.read(&view)?)),
                        Val::Bool(_) => bail!("map over a bool"),
                    }
                };
                let (lhs_shape, lhs) = operand(lhs)?;
                let (rhs_shape, rhs) = operand(rhs)?;
                let shape = match (lhs_shape, rhs_shape) {
                    (Some(a), Some(b)) => {
                        ensure!(a == b, "map over arrays of different shapes");
                        a
                    }
                    (Some(a), None) | (None, Some(a)) => a,
                    (None, None) => bail!("map over scalars"),
                };
                let count = num_elems(&shape)? as usize;
                let elems: Vec<i64> = (0..count)
                    .map(|i| {
                        let a = lhs[if lhs.len() == 1 { 0 } else { i }];
                        let b = rhs[if rhs.len() == 1 { 0 } else { i }];
                        op.eval(a, b)
                    })
                    .collect();
                self.bind_fresh(pattern[0], &shape, &elems)?;
            }
            Exp::Reshape { array, shape } => {
                let src = self.array(*array)?;
                let shape = shape
                    .iter()
                    .map(|&dim| self.int(dim))
                    .collect::<Result<SmallVec<[i64; 4]>>>()?;
                ensure!(
                    num_elems(&shape)? == num_elems(&src.shape)?,
                    "reshape changes the number of elements"
                );
                self.bind_location(pattern[0], &shape)?;
            }
            Exp::Rearrange { array, perm } => {
                let src = self.array(*array)?;
                ensure!(perm.len() == src.shape.len(), "permutation rank mismatch");
                let shape: SmallVec<[i64; 4]> = perm.iter().map(|&p| src.shape[p]).collect();
                self.bind_location(pattern[0], &shape)?;
            }
            &Exp::If {
                cond,
                then_body,
                else_body,
            } => {
                let body = match self.operand(cond)? {
                    Val::Bool(true) => then_body,
                    Val::Bool(false) => else_body,
                    _ => bail!("{cond} is not a bool"),
                };
                let results = self.body(body)?;
                ensure!(results.len() == pattern.len(), "branch result count mismatch");
                for (&var, val) in pattern.iter().zip(results) {
                    self.bind_moved(var, val)?;
                }
            }
            Exp::Loop {
                params,
                index,
                bound,
                body,
            } => {
                for param in params {
                    let init = self.operand(param.init)?;
                    self.bind_moved(param.var, init)?;
                }
                let bound = self.int(*bound)?;
                for i in 0..bound {
                    self.vars[*index] = Some(Val::Int(i));
                    let results = self.body(*body)?;
                    ensure!(results.len() == params.len(), "loop result count mismatch");

                    // All arrays are read before any parameter is written
                    // since parameters may swap locations.
                    let mut pending = vec![];
                    for (param, val) in params.iter().zip(results) {
                        match val {
                            Val::Array(view) => {
                                pending.push((param.var, self.read(&view)?, view.shape));
                            }
                            scalar => self.vars[param.var] = Some(scalar),
                        }
                    }
                    for (var, elems, shape) in pending {
                        self.bind_fresh(var, &shape, &elems)?;
                    }
                }
                for (param, &var) in params.iter().zip(pattern) {
                    let val = self.operand(SubExp::Var(param.var))?;
                    self.bind_moved(var, val)?;
                }
            }
        }
        Ok(())
    }
}

/// Builds arguments for the variable parameters of `func`, taking integers
/// from `next`.
///
/// Array extents are taken from the scalar parameters their types refer to,
/// so those must come first.
pub fn make_inputs(func: &impl Function, mut next: impl FnMut() -> i64) -> Result<Vec<Value>> {
    let mut scalars: SecondaryMap<Var, Option<i64>> = SecondaryMap::new();
    let mut args = vec![];
    for &param in func.params() {
        let Param::Var(var) = param else {
            continue;
        };
        let arg = match func.var_type(var) {
            Type::I64 => {
                let i = next();
                scalars[var] = Some(i);
                Value::Int(i)
            }
            Type::Bool => Value::Bool(next() % 2 != 0),
            Type::Array(shape) => {
                let shape = shape
                    .iter()
                    .map(|&dim| match dim {
                        SubExp::Const(c) => Ok(c),
                        SubExp::Var(v) => scalars[v]
                            .with_context(|| format!("{v} is not a scalar parameter")),
                    })
                    .collect::<Result<Vec<i64>>>()?;
                let count = num_elems(&shape)?;
                let elems = (0..count).map(|_| next()).collect();
                Value::Array { shape, elems }
            }
        };
        args.push(arg);
    }
    Ok(args)
}

#[cfg(all(test, feature = "parse"))]
mod tests {
    use super::*;
    use crate::debug_utils::GenericFunction;

    #[test]
    fn copy_and_update() {
        let func = GenericFunction::parse(
            "
            fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
                mem1 = alloc %0
                %2: [%0]i64 @ mem1 = copy %1
                %3: [%0]i64 @ mem1 = update %2[0] = 7
                %4: i64 = index %1[1]
                return %3, %4
            }
            ",
        )
        .unwrap();
        let args = [
            Value::Int(3),
            Value::Array {
                shape: vec![3],
                elems: vec![1, 2, 3],
            },
        ];
        let results = interpret(&func, &args).unwrap();
        assert_eq!(
            results,
            [
                Value::Array {
                    shape: vec![3],
                    elems: vec![7, 2, 3]
                },
                Value::Int(2)
            ]
        );
    }

    #[test]
    fn loop_swaps_parameters() {
        let func = GenericFunction::parse(
            "
            fn f(%0: i64) {
                mem0 = alloc 2
                mem1 = alloc 2
                %1: [2]i64 @ mem0 = iota 2
                %2: [2]i64 @ mem1 = replicate [2] 5
                %3: [2]i64 @ mem0, %4: [2]i64 @ mem1 = loop (%5: [2]i64 @ mem0 = %1, %6: [2]i64 @ mem1 = %2) for %7 < %0 {
                    yield %6, %5
                }
                return %3, %4
            }
            ",
        )
        .unwrap();
        let results = interpret(&func, &[Value::Int(3)]).unwrap();
        assert_eq!(
            results,
            [
                Value::Array {
                    shape: vec![2],
                    elems: vec![5, 5]
                },
                Value::Array {
                    shape: vec![2],
                    elems: vec![0, 1]
                },
            ]
        );
    }

    #[test]
    fn overlapping_arrays_are_observable() {
        // %1 overwrites %0 since both live at the start of mem0.
        let func = GenericFunction::parse(
            "
            fn f() {
                mem0 = alloc 4
                %0: [2]i64 @ mem0 = iota 2
                %1: [2]i64 @ mem0 = replicate [2] 9
                return %0
            }
            ",
        )
        .unwrap();
        let results = interpret(&func, &[]).unwrap();
        assert_eq!(
            results,
            [Value::Array {
                shape: vec![2],
                elems: vec![9, 9]
            }]
        );
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let func = GenericFunction::parse(
            "
            fn f() {
                mem0 = alloc 1
                %0: [2]i64 @ mem0 = iota 2
                return %0
            }
            ",
        )
        .unwrap();
        assert!(interpret(&func, &[]).is_err());
    }
}
