//! The [`Function`] trait which describes the input function.
//!
//! # Bodies and statements
//!
//! The analysis operates on a tree-shaped IR: a function has a list of
//! parameters and an entry [`Body`]. A body is an ordered list of [`Stmt`]s
//! followed by a list of results. Each statement binds the [`Var`]s of its
//! pattern to the result of an [`Exp`]. Control flow is structured: an
//! [`Exp::If`] has a body for each branch and an [`Exp::Loop`] has a single
//! body which is executed repeatedly. There are no other forms of control
//! flow.
//!
//! Every variable is bound exactly once, either as a function parameter, by a
//! statement pattern, or as a loop parameter or loop index. A variable is in
//! scope from its binding to the end of the enclosing body.
//!
//! # Memory
//!
//! Arrays are not values: they are views into a memory block ([`Mem`]). Every
//! array-typed variable carries a [`MemInfo`] which names the block it lives in
//! and the [`IxFun`] mapping its logical indices to positions within that
//! block. Memory blocks are introduced either as function parameters or by
//! [`Exp::Alloc`] statements.
//!
//! Expressions either create a fresh array (e.g. [`Exp::Copy`] or
//! [`Exp::Iota`]) which is written into the location given by the pattern's
//! memory annotation, or produce a new view of an existing array (e.g.
//! [`Exp::Reshape`]) which must share the block of its source. When a branch
//! or loop result lives in a different location than the corresponding pattern
//! variable, its elements are moved into the pattern's location.
//!
//! [`IxFun`]: crate::ixfun::IxFun

use alloc::vec::Vec;
use core::fmt;

use cranelift_entity::Keys;
use smallvec::{SmallVec, smallvec};

use crate::ixfun::{IxFun, PrimExp};

/// Maximum number of variables in a function.
pub const MAX_VARS: usize = (u32::MAX - 1) as usize;

/// Maximum number of memory blocks in a function.
pub const MAX_MEMS: usize = (u32::MAX - 1) as usize;

/// Maximum number of statements in a function.
pub const MAX_STMTS: usize = (u32::MAX - 1) as usize;

/// Maximum number of bodies in a function.
pub const MAX_BODIES: usize = (u32::MAX - 1) as usize;

entity_def! {
    /// A variable bound in the input function.
    ///
    /// Variables hold either a scalar or a view of an array in a memory block.
    pub entity Var(u32, "%");

    /// A memory block which arrays can be stored in.
    pub entity Mem(u32, "mem");

    /// A statement in the input function.
    pub entity Stmt(u32, "stmt");

    /// A list of statements followed by a list of results.
    pub entity Body(u32, "body");
}

/// An operand: either a constant or a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubExp {
    /// An integer constant.
    Const(i64),

    /// The value of a variable.
    Var(Var),
}

impl SubExp {
    /// Returns the variable referenced by this operand, if any.
    #[inline]
    #[must_use]
    pub fn var(self) -> Option<Var> {
        match self {
            SubExp::Const(_) => None,
            SubExp::Var(var) => Some(var),
        }
    }

    /// Converts the operand to a symbolic expression.
    #[inline]
    #[must_use]
    pub fn to_prim_exp(self) -> PrimExp {
        match self {
            SubExp::Const(c) => PrimExp::Const(c),
            SubExp::Var(var) => PrimExp::Var(var),
        }
    }
}

impl fmt::Display for SubExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubExp::Const(c) => write!(f, "{c}"),
            SubExp::Var(var) => write!(f, "{var}"),
        }
    }
}

/// Binary integer operator.
///
/// All operators wrap on overflow. Division and remainder by zero produce 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Min,
    Max,
}

impl BinOp {
    /// All binary operators, in a fixed order.
    pub const ALL: [BinOp; 7] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Rem,
        BinOp::Min,
        BinOp::Max,
    ];

    /// Name of the operator in the text format.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::Min => "min",
            BinOp::Max => "max",
        }
    }

    /// Looks up an operator by its name in the text format.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Evaluates the operator on concrete values.
    #[must_use]
    pub fn eval(self, a: i64, b: i64) -> i64 {
        match self {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div => a.checked_div(b).unwrap_or(0),
            BinOp::Rem => a.checked_rem(b).unwrap_or(0),
            BinOp::Min => a.min(b),
            BinOp::Max => a.max(b),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer comparison producing a `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmpOp {
    Eq,
    Lt,
    Le,
}

impl CmpOp {
    /// All comparison operators, in a fixed order.
    pub const ALL: [CmpOp; 3] = [CmpOp::Eq, CmpOp::Lt, CmpOp::Le];

    /// Name of the operator in the text format.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
        }
    }

    /// Looks up an operator by its name in the text format.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Evaluates the comparison on concrete values.
    #[must_use]
    pub fn eval(self, a: i64, b: i64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One dimension of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DimIndex {
    /// Selects a single index, removing the dimension.
    Fix(SubExp),

    /// Selects `len` indices starting at `start`, `stride` apart.
    Range {
        /// First selected index.
        start: SubExp,
        /// Number of selected indices.
        len: SubExp,
        /// Distance between consecutive selected indices.
        stride: SubExp,
    },
}

impl DimIndex {
    /// Calls `f` on every operand of this index.
    pub fn for_each_operand(&self, mut f: impl FnMut(SubExp)) {
        match *self {
            DimIndex::Fix(i) => f(i),
            DimIndex::Range { start, len, stride } => {
                f(start);
                f(len);
                f(stride);
            }
        }
    }
}

impl fmt::Display for DimIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimIndex::Fix(i) => write!(f, "{i}"),
            DimIndex::Range { start, len, stride } => write!(f, "{start}:{len}:{stride}"),
        }
    }
}

/// Type of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    /// 64-bit signed integer.
    I64,

    /// Boolean.
    Bool,

    /// Array of `i64` with the given shape.
    Array(Vec<SubExp>),
}

impl Type {
    /// Returns the shape if this is an array type.
    #[inline]
    #[must_use]
    pub fn shape(&self) -> Option<&[SubExp]> {
        match self {
            Type::Array(shape) => Some(shape),
            _ => None,
        }
    }

    /// Returns whether this is an array type.
    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    /// Row-major layout of an array of this type occupying a whole block
    /// region, or `None` for scalars.
    #[must_use]
    pub fn direct_ixfun(&self) -> Option<IxFun> {
        let shape = self.shape()?;
        Some(IxFun::iota(shape.iter().map(|dim| dim.to_prim_exp()).collect()))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I64 => write!(f, "i64"),
            Type::Bool => write!(f, "bool"),
            Type::Array(shape) => {
                for dim in shape {
                    write!(f, "[{dim}]")?;
                }
                write!(f, "i64")
            }
        }
    }
}

/// Location of an array: the block it lives in and its index function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemInfo {
    /// Memory block holding the array elements.
    pub mem: Mem,

    /// Mapping from the array's logical indices to positions in `mem`.
    pub ixfun: IxFun,
}

/// A function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Param {
    /// A memory block provided by the caller.
    Mem(Mem),

    /// A scalar or array variable.
    Var(Var),
}

/// A loop-carried variable along with its initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoopParam {
    /// Variable bound inside the loop body.
    pub var: Var,

    /// Value of `var` in the first iteration.
    pub init: SubExp,
}

/// How an array-typed pattern variable obtains its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayProducer {
    /// The expression writes a fresh array into the pattern's location.
    Fresh,

    /// The result is a shape-only view of the given array, or the array itself
    /// after an in-place update. It shares the source's memory block.
    Alias(Var),

    /// The result is a sub-array view of the given array.
    View(Var),

    /// The result is moved out of a nested body.
    Compound,
}

/// The right-hand side of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Exp {
    /// Allocates a new memory block of `size` elements. The pattern is empty.
    Alloc {
        /// The new block.
        mem: Mem,
        /// Number of elements.
        size: SubExp,
    },

    /// Binds an operand. With an array variable this is an alias.
    SubExp(SubExp),

    /// Scalar integer arithmetic.
    BinOp(BinOp, SubExp, SubExp),

    /// Scalar integer comparison.
    Cmp(CmpOp, SubExp, SubExp),

    /// Indexes an array. If every dimension is fixed this reads a scalar,
    /// otherwise it produces a view of the array.
    Index {
        /// Array being indexed.
        array: Var,
        /// One entry per dimension of `array`.
        slice: Vec<DimIndex>,
    },

    /// In-place update of `array[slice]` with `value`. The result lives in
    /// the same location as `array`, which is consumed.
    Update {
        /// Array being updated.
        array: Var,
        /// Part of `array` which is overwritten.
        slice: Vec<DimIndex>,
        /// New contents: a scalar, or an array with the shape of the slice.
        value: SubExp,
    },

    /// Copies an array into a fresh location.
    Copy(Var),

    /// Concatenates arrays along their outermost dimension.
    Concat(Vec<Var>),

    /// The array `[0, 1, .., n-1]`.
    Iota(SubExp),

    /// An array of the given shape with every element set to `value`.
    Replicate {
        /// Extent of each dimension of the result.
        shape: Vec<SubExp>,
        /// Scalar element.
        value: SubExp,
    },

    /// Applies `op` elementwise. At least one operand is an array, scalar
    /// operands are broadcast.
    Map {
        /// Operation applied to each pair of elements.
        op: BinOp,
        /// Left operand.
        lhs: SubExp,
        /// Right operand.
        rhs: SubExp,
    },

    /// Changes the shape of a directly laid-out array.
    Reshape {
        /// Array being reshaped.
        array: Var,
        /// New extent of each dimension.
        shape: Vec<SubExp>,
    },

    /// Permutes the dimensions of an array.
    Rearrange {
        /// Array whose dimensions are permuted.
        array: Var,
        /// Dimension `i` of the result is dimension `perm[i]` of `array`.
        perm: Vec<usize>,
    },

    /// Evaluates one of two bodies depending on `cond`. The pattern receives
    /// the results of the executed body.
    If {
        /// Boolean condition.
        cond: SubExp,
        /// Body executed when `cond` is true.
        then_body: Body,
        /// Body executed when `cond` is false.
        else_body: Body,
    },

    /// Executes `body` `bound` times with `index` counting from 0. The body
    /// results become the loop parameters of the next iteration, and the
    /// pattern receives the final values of the loop parameters.
    Loop {
        /// Loop-carried values with their initial values.
        params: Vec<LoopParam>,
        /// Iteration counter, bound in `body`.
        index: Var,
        /// Number of iterations.
        bound: SubExp,
        /// Loop body, yielding one value per parameter.
        body: Body,
    },
}

impl Exp {
    /// Calls `f` on every operand directly used by this expression.
    ///
    /// Variables used inside nested bodies are not included.
    pub fn for_each_operand(&self, mut f: impl FnMut(SubExp)) {
        match self {
            Exp::Alloc { mem: _, size } => f(*size),
            Exp::SubExp(se) => f(*se),
            Exp::BinOp(_, a, b) | Exp::Cmp(_, a, b) => {
                f(*a);
                f(*b);
            }
            Exp::Index { array, slice } => {
                f(SubExp::Var(*array));
                slice.iter().for_each(|idx| idx.for_each_operand(&mut f));
            }
            Exp::Update {
                array,
                slice,
                value,
            } => {
                f(SubExp::Var(*array));
                slice.iter().for_each(|idx| idx.for_each_operand(&mut f));
                f(*value);
            }
            Exp::Copy(array) => f(SubExp::Var(*array)),
            Exp::Concat(arrays) => arrays.iter().for_each(|&array| f(SubExp::Var(array))),
            Exp::Iota(n) => f(*n),
            Exp::Replicate { shape, value } => {
                shape.iter().copied().for_each(&mut f);
                f(*value);
            }
            Exp::Map { op: _, lhs, rhs } => {
                f(*lhs);
                f(*rhs);
            }
            Exp::Reshape { array, shape } => {
                f(SubExp::Var(*array));
                shape.iter().copied().for_each(&mut f);
            }
            Exp::Rearrange { array, perm: _ } => f(SubExp::Var(*array)),
            Exp::If { cond, .. } => f(*cond),
            Exp::Loop { params, bound, .. } => {
                params.iter().for_each(|param| f(param.init));
                f(*bound);
            }
        }
    }

    /// Calls `f` on every variable directly used by this expression.
    pub fn for_each_use(&self, mut f: impl FnMut(Var)) {
        self.for_each_operand(|se| {
            if let SubExp::Var(var) = se {
                f(var);
            }
        });
    }

    /// Returns the bodies nested directly inside this expression.
    #[must_use]
    pub fn nested_bodies(&self) -> SmallVec<[Body; 2]> {
        match *self {
            Exp::If {
                then_body,
                else_body,
                ..
            } => smallvec![then_body, else_body],
            Exp::Loop { body, .. } => smallvec![body],
            _ => smallvec![],
        }
    }

    /// Classifies how an array-typed pattern variable of this expression
    /// obtains its contents.
    ///
    /// Returns `None` for expressions which only produce scalars.
    #[must_use]
    pub fn array_producer(&self) -> Option<ArrayProducer> {
        let producer = match *self {
            Exp::Copy(_)
            | Exp::Concat(_)
            | Exp::Iota(_)
            | Exp::Replicate { .. }
            | Exp::Map { .. } => ArrayProducer::Fresh,
            Exp::SubExp(SubExp::Var(var))
            | Exp::Reshape { array: var, .. }
            | Exp::Rearrange { array: var, .. }
            | Exp::Update { array: var, .. } => ArrayProducer::Alias(var),
            Exp::Index { array, .. } => ArrayProducer::View(array),
            Exp::If { .. } | Exp::Loop { .. } => ArrayProducer::Compound,
            Exp::Alloc { .. } | Exp::SubExp(SubExp::Const(_)) | Exp::BinOp(..) | Exp::Cmp(..) => {
                return None;
            }
        };
        Some(producer)
    }

    /// Index function of an array bound to this expression when none is
    /// given explicitly.
    ///
    /// Aliases and views derive their layout from their source, everything
    /// else uses the direct layout of `ty`. Returns `None` if `ty` is not an
    /// array type or the layout can't be derived.
    pub fn default_ixfun<'a>(
        &self,
        ty: &Type,
        var_mem: impl Fn(Var) -> Option<&'a MemInfo>,
    ) -> Option<IxFun> {
        if !ty.is_array() {
            return None;
        }
        let src = |var| var_mem(var).map(|info| &info.ixfun);
        match self {
            Exp::SubExp(SubExp::Var(array)) | Exp::Update { array, .. } => src(*array).cloned(),
            Exp::Reshape { array, shape } => {
                src(*array)?.reshape(shape.iter().map(|dim| dim.to_prim_exp()).collect())
            }
            Exp::Rearrange { array, perm } => src(*array)?.permute(perm),
            Exp::Index { array, slice } => src(*array)?.slice(slice),
            _ => ty.direct_ixfun(),
        }
    }
}

/// A trait defined by the client to provide read-only access to the function
/// being analyzed.
///
/// See the [module-level documentation] for more details.
///
/// [module-level documentation]: self
pub trait Function {
    /// Name of the function, only used for display purposes.
    fn name(&self) -> &str;

    /// How many variables are there?
    fn num_vars(&self) -> usize;

    /// Iterator over all the [`Var`]s in this function.
    #[inline]
    fn vars(&self) -> Keys<Var> {
        Keys::with_len(self.num_vars())
    }

    /// How many memory blocks are there?
    fn num_mems(&self) -> usize;

    /// Iterator over all the [`Mem`]s in this function.
    #[inline]
    fn mems(&self) -> Keys<Mem> {
        Keys::with_len(self.num_mems())
    }

    /// How many statements are there, across all bodies?
    fn num_stmts(&self) -> usize;

    /// How many bodies are there, including the entry body?
    fn num_bodies(&self) -> usize;

    /// Parameters of the function, in order.
    fn params(&self) -> &[Param];

    /// Returns whether `mem` is a memory parameter of the function.
    #[inline]
    fn is_param_mem(&self, mem: Mem) -> bool {
        self.params().contains(&Param::Mem(mem))
    }

    /// The top-level body of the function.
    fn entry_body(&self) -> Body;

    /// Statements of a body, in execution order.
    fn body_stmts(&self, body: Body) -> &[Stmt];

    /// Results of a body.
    ///
    /// For the entry body these are the return values of the function.
    fn body_results(&self, body: Body) -> &[SubExp];

    /// Variables bound by a statement.
    fn stmt_pattern(&self, stmt: Stmt) -> &[Var];

    /// Expression evaluated by a statement.
    fn stmt_exp(&self, stmt: Stmt) -> &Exp;

    /// Type of a variable.
    fn var_type(&self, var: Var) -> &Type;

    /// Memory annotation of a variable. This is `Some` exactly for
    /// array-typed variables.
    fn var_mem(&self, var: Var) -> Option<&MemInfo>;
}
