//! Symbolic index functions.
//!
//! An [`IxFun`] describes how the elements of an array are laid out in a
//! memory block. It is a monomial linear memory access descriptor (LMAD):
//!
//! - The *base* is the shape of a row-major region of the block. Positions in
//!   the block are obtained by linearizing coordinates of this region.
//! - The *offset* gives, for each base dimension, the coordinate at which the
//!   array starts.
//! - Each logical dimension of the array walks along exactly one base
//!   dimension with a given stride, for a given number of elements.
//!
//! All components are [`PrimExp`]s: symbolic integer expressions over the
//! variables of the function. The smart constructors on `PrimExp` fold
//! constants so that layouts built in different ways compare equal as often
//! as possible, but equality remains purely structural.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use smallvec::SmallVec;

use crate::debug_utils::display_iter;
use crate::function::{BinOp, DimIndex, Var};

/// A symbolic integer expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimExp {
    /// An integer constant.
    Const(i64),

    /// The value of a scalar variable.
    Var(Var),

    /// A binary operation.
    Bin(BinOp, Box<PrimExp>, Box<PrimExp>),
}

impl PrimExp {
    /// Builds `op(a, b)`, folding constants and identities.
    #[must_use]
    pub fn bin(op: BinOp, a: PrimExp, b: PrimExp) -> PrimExp {
        match (op, a, b) {
            (op, PrimExp::Const(a), PrimExp::Const(b)) => PrimExp::Const(op.eval(a, b)),
            (BinOp::Add, PrimExp::Const(0), x)
            | (BinOp::Add | BinOp::Sub, x, PrimExp::Const(0))
            | (BinOp::Mul, PrimExp::Const(1), x)
            | (BinOp::Mul | BinOp::Div, x, PrimExp::Const(1)) => x,
            (BinOp::Mul, PrimExp::Const(0), _) | (BinOp::Mul, _, PrimExp::Const(0)) => {
                PrimExp::Const(0)
            }
            // Keep constants on the right of commutative operators.
            (op @ (BinOp::Add | BinOp::Mul | BinOp::Min | BinOp::Max), c @ PrimExp::Const(_), x) => {
                PrimExp::Bin(op, Box::new(x), Box::new(c))
            }
            (op, a, b) => PrimExp::Bin(op, Box::new(a), Box::new(b)),
        }
    }

    /// Builds `a + b`.
    #[must_use]
    pub fn add(a: PrimExp, b: PrimExp) -> PrimExp {
        Self::bin(BinOp::Add, a, b)
    }

    /// Builds `a - b`.
    #[must_use]
    pub fn sub(a: PrimExp, b: PrimExp) -> PrimExp {
        Self::bin(BinOp::Sub, a, b)
    }

    /// Builds `a * b`.
    #[must_use]
    pub fn mul(a: PrimExp, b: PrimExp) -> PrimExp {
        Self::bin(BinOp::Mul, a, b)
    }

    /// Calls `f` on every variable in the expression.
    pub fn for_each_var(&self, f: &mut impl FnMut(Var)) {
        match self {
            PrimExp::Const(_) => {}
            PrimExp::Var(var) => f(*var),
            PrimExp::Bin(_, a, b) => {
                a.for_each_var(f);
                b.for_each_var(f);
            }
        }
    }

    /// Replaces variables for which `f` returns an expression.
    #[must_use]
    pub fn substitute(&self, f: &impl Fn(Var) -> Option<PrimExp>) -> PrimExp {
        match self {
            PrimExp::Const(c) => PrimExp::Const(*c),
            PrimExp::Var(var) => f(*var).unwrap_or(PrimExp::Var(*var)),
            PrimExp::Bin(op, a, b) => Self::bin(*op, a.substitute(f), b.substitute(f)),
        }
    }

    /// Evaluates the expression, returning `None` if a variable has no value.
    pub fn eval(&self, env: &impl Fn(Var) -> Option<i64>) -> Option<i64> {
        match self {
            PrimExp::Const(c) => Some(*c),
            PrimExp::Var(var) => env(*var),
            PrimExp::Bin(op, a, b) => Some(op.eval(a.eval(env)?, b.eval(env)?)),
        }
    }
}

impl From<i64> for PrimExp {
    fn from(c: i64) -> Self {
        PrimExp::Const(c)
    }
}

impl fmt::Display for PrimExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimExp::Const(c) => write!(f, "{c}"),
            PrimExp::Var(var) => write!(f, "{var}"),
            PrimExp::Bin(op @ (BinOp::Min | BinOp::Max), a, b) => write!(f, "{op}({a}, {b})"),
            PrimExp::Bin(op, a, b) => {
                let sym = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Rem => "%",
                    BinOp::Min | BinOp::Max => unreachable!(),
                };
                write!(f, "({a} {sym} {b})")
            }
        }
    }
}

/// One logical dimension of an [`IxFun`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LmadDim {
    /// Index of the base dimension this dimension walks along.
    pub base_dim: usize,

    /// Distance between consecutive elements, in base coordinates.
    pub stride: PrimExp,

    /// Number of elements.
    pub size: PrimExp,
}

/// A symbolic index function. See the [module-level documentation] for the
/// representation.
///
/// [module-level documentation]: self
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IxFun {
    base: Vec<PrimExp>,
    offset: Vec<PrimExp>,
    dims: Vec<LmadDim>,
}

impl IxFun {
    /// Creates an index function from its components.
    ///
    /// Returns `None` if `offset` doesn't have one entry per base dimension or
    /// if a dimension refers to a non-existent base dimension.
    #[must_use]
    pub fn new(base: Vec<PrimExp>, offset: Vec<PrimExp>, dims: Vec<LmadDim>) -> Option<Self> {
        if offset.len() != base.len() || dims.iter().any(|dim| dim.base_dim >= base.len()) {
            return None;
        }
        Some(Self { base, offset, dims })
    }

    /// The row-major layout of an array of the given shape occupying a whole
    /// region.
    #[must_use]
    pub fn iota(shape: Vec<PrimExp>) -> Self {
        let offset = shape.iter().map(|_| PrimExp::Const(0)).collect();
        let dims = shape
            .iter()
            .enumerate()
            .map(|(base_dim, size)| LmadDim {
                base_dim,
                stride: PrimExp::Const(1),
                size: size.clone(),
            })
            .collect();
        Self {
            base: shape,
            offset,
            dims,
        }
    }

    /// Shape of the underlying row-major region.
    #[inline]
    #[must_use]
    pub fn base(&self) -> &[PrimExp] {
        &self.base
    }

    /// Starting coordinate in each base dimension.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> &[PrimExp] {
        &self.offset
    }

    /// Logical dimensions.
    #[inline]
    #[must_use]
    pub fn dims(&self) -> &[LmadDim] {
        &self.dims
    }

    /// Number of logical dimensions.
    #[inline]
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Logical shape of the array.
    pub fn shape(&self) -> impl ExactSizeIterator<Item = &PrimExp> + '_ {
        self.dims.iter().map(|dim| &dim.size)
    }

    /// If this is a row-major layout of the whole region with its dimensions
    /// permuted, returns the base dimension of each logical dimension.
    #[must_use]
    pub fn direct_permutation(&self) -> Option<SmallVec<[usize; 4]>> {
        if self.dims.len() != self.base.len() || self.offset.iter().any(|o| *o != PrimExp::Const(0))
        {
            return None;
        }
        let mut seen: SmallVec<[bool; 4]> = self.base.iter().map(|_| false).collect();
        let mut perm = SmallVec::new();
        for dim in &self.dims {
            if seen[dim.base_dim]
                || dim.stride != PrimExp::Const(1)
                || dim.size != self.base[dim.base_dim]
            {
                return None;
            }
            seen[dim.base_dim] = true;
            perm.push(dim.base_dim);
        }
        Some(perm)
    }

    /// Returns whether this is the row-major layout of the whole region.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.direct_permutation()
            .is_some_and(|perm| perm.iter().enumerate().all(|(i, &p)| i == p))
    }

    /// Restricts the index function to a sub-array.
    ///
    /// Fixed indices remove a dimension, ranges restrict it. If the slice has
    /// fewer entries than the rank, the trailing dimensions are kept whole.
    /// Returns `None` if the slice has more entries than the rank.
    #[must_use]
    pub fn slice(&self, slice: &[DimIndex]) -> Option<Self> {
        if slice.len() > self.rank() {
            return None;
        }
        let mut out = Self {
            base: self.base.clone(),
            offset: self.offset.clone(),
            dims: Vec::with_capacity(self.rank()),
        };
        for (dim, idx) in self.dims.iter().zip(slice) {
            let shift = |start: PrimExp, offset: &mut PrimExp| {
                let moved = PrimExp::mul(start, dim.stride.clone());
                *offset = PrimExp::add(offset.clone(), moved);
            };
            match *idx {
                DimIndex::Fix(i) => shift(i.to_prim_exp(), &mut out.offset[dim.base_dim]),
                DimIndex::Range { start, len, stride } => {
                    shift(start.to_prim_exp(), &mut out.offset[dim.base_dim]);
                    out.dims.push(LmadDim {
                        base_dim: dim.base_dim,
                        stride: PrimExp::mul(dim.stride.clone(), stride.to_prim_exp()),
                        size: len.to_prim_exp(),
                    });
                }
            }
        }
        out.dims.extend_from_slice(&self.dims[slice.len()..]);
        Some(out)
    }

    /// Shifts the outermost dimension by `offset` elements, shrinking it
    /// accordingly.
    ///
    /// Returns `None` for a rank-0 index function.
    #[must_use]
    pub fn offset_index(&self, offset: PrimExp) -> Option<Self> {
        let first = self.dims.first()?;
        let mut out = self.clone();
        let base_dim = first.base_dim;
        out.offset[base_dim] = PrimExp::add(
            out.offset[base_dim].clone(),
            PrimExp::mul(offset.clone(), first.stride.clone()),
        );
        out.dims[0].size = PrimExp::sub(first.size.clone(), offset);
        Some(out)
    }

    /// Reorders the logical dimensions: dimension `i` of the result is
    /// dimension `perm[i]` of `self`.
    ///
    /// Returns `None` if `perm` is not a permutation of the dimensions.
    #[must_use]
    pub fn permute(&self, perm: &[usize]) -> Option<Self> {
        if !is_permutation(perm, self.rank()) {
            return None;
        }
        Some(Self {
            base: self.base.clone(),
            offset: self.offset.clone(),
            dims: perm.iter().map(|&p| self.dims[p].clone()).collect(),
        })
    }

    /// Changes the shape of a direct index function.
    ///
    /// Returns `None` if the layout is not direct, since the elements would
    /// then not be contiguous.
    #[must_use]
    pub fn reshape(&self, shape: Vec<PrimExp>) -> Option<Self> {
        self.is_direct().then(|| Self::iota(shape))
    }

    /// Composes `self` (the outer index function) with `inner`.
    ///
    /// `inner` describes an array in terms of a region whose coordinates are
    /// the logical indices of `self`. The result describes the same array in
    /// terms of the base region of `self`.
    ///
    /// Returns `None` unless the rank of `self` is the number of base
    /// dimensions of `inner` and the shapes agree.
    #[must_use]
    pub fn rebase(&self, inner: &IxFun) -> Option<IxFun> {
        if self.rank() != inner.base.len() || !self.shape().eq(inner.base.iter()) {
            return None;
        }
        let mut offset = self.offset.clone();
        for (outer_dim, inner_offset) in self.dims.iter().zip(&inner.offset) {
            let moved = PrimExp::mul(inner_offset.clone(), outer_dim.stride.clone());
            offset[outer_dim.base_dim] = PrimExp::add(offset[outer_dim.base_dim].clone(), moved);
        }
        let dims = inner
            .dims
            .iter()
            .map(|dim| {
                let outer_dim = &self.dims[dim.base_dim];
                LmadDim {
                    base_dim: outer_dim.base_dim,
                    stride: PrimExp::mul(dim.stride.clone(), outer_dim.stride.clone()),
                    size: dim.size.clone(),
                }
            })
            .collect();
        Some(IxFun {
            base: self.base.clone(),
            offset,
            dims,
        })
    }

    /// Evaluates the position in the block of the element at `index`.
    ///
    /// Returns `None` if a variable has no value in `env` or if `index`
    /// doesn't have one entry per dimension.
    pub fn eval_offset(&self, index: &[i64], env: &impl Fn(Var) -> Option<i64>) -> Option<i64> {
        if index.len() != self.rank() {
            return None;
        }
        let mut coords = self
            .offset
            .iter()
            .map(|e| e.eval(env))
            .collect::<Option<SmallVec<[i64; 4]>>>()?;
        for (dim, &i) in self.dims.iter().zip(index) {
            let moved = i.wrapping_mul(dim.stride.eval(env)?);
            coords[dim.base_dim] = coords[dim.base_dim].wrapping_add(moved);
        }
        let mut pos: i64 = 0;
        for (coord, size) in coords.iter().zip(&self.base) {
            pos = pos.wrapping_mul(size.eval(env)?).wrapping_add(*coord);
        }
        Some(pos)
    }

    /// Calls `f` on every variable referenced by the index function.
    pub fn for_each_free_var(&self, mut f: impl FnMut(Var)) {
        for e in self.base.iter().chain(&self.offset) {
            e.for_each_var(&mut f);
        }
        for dim in &self.dims {
            dim.stride.for_each_var(&mut f);
            dim.size.for_each_var(&mut f);
        }
    }

    /// Replaces variables for which `f` returns an expression.
    #[must_use]
    pub fn substitute(&self, f: &impl Fn(Var) -> Option<PrimExp>) -> Self {
        Self {
            base: self.base.iter().map(|e| e.substitute(f)).collect(),
            offset: self.offset.iter().map(|e| e.substitute(f)).collect(),
            dims: self
                .dims
                .iter()
                .map(|dim| LmadDim {
                    base_dim: dim.base_dim,
                    stride: dim.stride.substitute(f),
                    size: dim.size.substitute(f),
                })
                .collect(),
        }
    }

    /// Makes the index function well-formed in a scope.
    ///
    /// Every free variable must either satisfy `in_scope` or be defined in
    /// `scalars` by an expression which, after recursively substituting
    /// other entries of `scalars`, only refers to in-scope variables.
    ///
    /// Returns the substitution that was applied along with the rewritten
    /// index function, or `None` if some free variable can't be resolved.
    #[must_use]
    pub fn substitute_free_vars(
        &self,
        in_scope: &impl Fn(Var) -> bool,
        scalars: &BTreeMap<Var, PrimExp>,
    ) -> Option<(BTreeMap<Var, PrimExp>, IxFun)> {
        let mut free = SmallVec::<[Var; 8]>::new();
        self.for_each_free_var(|var| {
            if !in_scope(var) && !free.contains(&var) {
                free.push(var);
            }
        });
        if free.is_empty() {
            return Some((BTreeMap::new(), self.clone()));
        }

        let mut subst = BTreeMap::new();
        let mut visiting = SmallVec::<[Var; 8]>::new();
        for var in free {
            let expanded = expand_scalar(var, in_scope, scalars, &mut subst, &mut visiting)?;
            subst.insert(var, expanded);
        }
        let ixfun = self.substitute(&|var| subst.get(&var).cloned());
        subst.retain(|var, _| {
            let mut used = false;
            self.for_each_free_var(|v| used |= v == *var);
            used
        });
        Some((subst, ixfun))
    }
}

/// Fully expands an out-of-scope scalar in terms of in-scope variables.
fn expand_scalar(
    var: Var,
    in_scope: &impl Fn(Var) -> bool,
    scalars: &BTreeMap<Var, PrimExp>,
    memo: &mut BTreeMap<Var, PrimExp>,
    visiting: &mut SmallVec<[Var; 8]>,
) -> Option<PrimExp> {
    if let Some(e) = memo.get(&var) {
        return Some(e.clone());
    }
    if visiting.contains(&var) {
        return None;
    }
    let def = scalars.get(&var)?;
    visiting.push(var);
    let mut deps = SmallVec::<[Var; 4]>::new();
    def.for_each_var(&mut |v| {
        if !in_scope(v) && !deps.contains(&v) {
            deps.push(v);
        }
    });
    for dep in deps {
        let e = expand_scalar(dep, in_scope, scalars, memo, visiting)?;
        memo.insert(dep, e);
    }
    visiting.pop();
    let expanded = def.substitute(&|v| memo.get(&v).cloned());
    memo.insert(var, expanded.clone());
    Some(expanded)
}

/// Returns whether `perm` is a permutation of `0..rank`.
pub(crate) fn is_permutation(perm: &[usize], rank: usize) -> bool {
    if perm.len() != rank {
        return false;
    }
    let mut seen: SmallVec<[bool; 4]> = (0..rank).map(|_| false).collect();
    for &p in perm {
        if p >= rank || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}

/// Inverse of a permutation.
pub(crate) fn invert_permutation(perm: &[usize]) -> SmallVec<[usize; 4]> {
    let mut inverse: SmallVec<[usize; 4]> = perm.iter().map(|_| 0).collect();
    for (i, &p) in perm.iter().enumerate() {
        inverse[p] = i;
    }
    inverse
}

impl fmt::Display for LmadDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.base_dim, self.stride, self.size)
    }
}

impl fmt::Display for IxFun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lmad(base [{}]; offset [{}]; dims [{}])",
            display_iter(&self.base, ","),
            display_iter(&self.offset, ","),
            display_iter(&self.dims, ",")
        )
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::function::SubExp;

    fn var(i: usize) -> PrimExp {
        PrimExp::Var(Var::new(i))
    }

    #[test]
    fn smart_constructors_fold() {
        assert_eq!(PrimExp::add(2.into(), 3.into()), PrimExp::Const(5));
        assert_eq!(PrimExp::add(var(0), 0.into()), var(0));
        assert_eq!(PrimExp::mul(1.into(), var(0)), var(0));
        assert_eq!(PrimExp::mul(var(0), 0.into()), PrimExp::Const(0));
        assert_eq!(PrimExp::add(1.into(), var(0)), PrimExp::add(var(0), 1.into()));
    }

    #[test]
    fn iota_is_direct() {
        let ix = IxFun::iota(vec![var(0), var(1)]);
        assert!(ix.is_direct());
        assert_eq!(ix.rank(), 2);
        let t = ix.permute(&[1, 0]).unwrap();
        assert!(!t.is_direct());
        assert_eq!(t.direct_permutation().unwrap().as_slice(), &[1, 0]);
        assert!(t.reshape(vec![var(2)]).is_none());
    }

    #[test]
    fn slice_row_of_matrix() {
        let ix = IxFun::iota(vec![var(0), var(1)]);
        let row = ix.slice(&[DimIndex::Fix(SubExp::Var(Var::new(2)))]).unwrap();
        assert_eq!(row.rank(), 1);
        assert_eq!(row.offset(), &[var(2), PrimExp::Const(0)]);
        assert_eq!(row.dims()[0].base_dim, 1);
        assert_eq!(row.dims()[0].size, var(1));
        assert!(ix.slice(&[DimIndex::Fix(SubExp::Const(0)); 3]).is_none());
    }

    #[test]
    fn offset_then_restrict() {
        let ix = IxFun::iota(vec![PrimExp::Const(10)]);
        let part = ix
            .offset_index(4.into())
            .unwrap()
            .slice(&[DimIndex::Range {
                start: SubExp::Const(0),
                len: SubExp::Const(3),
                stride: SubExp::Const(1),
            }])
            .unwrap();
        assert_eq!(part.offset(), &[PrimExp::Const(4)]);
        assert_eq!(part.dims()[0].size, PrimExp::Const(3));
    }

    #[test]
    fn rebase_composes_offsets_and_strides() {
        // Outer: row 2 of a 5x6 matrix.
        let outer = IxFun::iota(vec![5.into(), 6.into()])
            .slice(&[DimIndex::Fix(SubExp::Const(2))])
            .unwrap();
        // Inner: elements 1, 3, 5 of a 6-element vector.
        let inner = IxFun::iota(vec![6.into()])
            .slice(&[DimIndex::Range {
                start: SubExp::Const(1),
                len: SubExp::Const(3),
                stride: SubExp::Const(2),
            }])
            .unwrap();
        let composed = outer.rebase(&inner).unwrap();
        assert_eq!(composed.base(), &[PrimExp::Const(5), PrimExp::Const(6)]);
        assert_eq!(composed.offset(), &[PrimExp::Const(2), PrimExp::Const(1)]);
        assert_eq!(
            composed.dims(),
            &[LmadDim {
                base_dim: 1,
                stride: PrimExp::Const(2),
                size: PrimExp::Const(3),
            }]
        );

        // Rank mismatch is not an error, just not composable.
        let matrix = IxFun::iota(vec![6.into(), 1.into()]);
        assert!(outer.rebase(&matrix).is_none());
    }

    #[test]
    fn substitution_through_scalar_table() {
        let (n, i, j, k) = (Var::new(0), Var::new(1), Var::new(2), Var::new(3));
        let ix = IxFun::iota(vec![PrimExp::Var(n), PrimExp::Var(n)])
            .slice(&[DimIndex::Fix(SubExp::Var(k))])
            .unwrap();
        let mut scalars = BTreeMap::new();
        scalars.insert(k, PrimExp::add(PrimExp::Var(j), 1.into()));
        scalars.insert(j, PrimExp::mul(PrimExp::Var(i), 2.into()));

        let in_scope = |v: Var| v == n || v == i;
        let (subst, out) = ix.substitute_free_vars(&in_scope, &scalars).unwrap();
        let expected = PrimExp::add(PrimExp::mul(PrimExp::Var(i), 2.into()), 1.into());
        assert_eq!(subst.get(&k), Some(&expected));
        assert!(!subst.contains_key(&j));
        assert_eq!(out.offset()[0], expected);

        let only_n = |v: Var| v == n;
        assert!(ix.substitute_free_vars(&only_n, &scalars).is_none());
    }

    #[test]
    fn eval_offset_linearizes_base() {
        let ix = IxFun::iota(vec![4.into(), 5.into()]).permute(&[1, 0]).unwrap();
        let env = |_: Var| None::<i64>;
        assert_eq!(ix.eval_offset(&[2, 3], &env), Some(3 * 5 + 2));
        assert_eq!(ix.eval_offset(&[2], &env), None);

        let n = Var::new(0);
        let row = IxFun::iota(vec![PrimExp::Var(n), PrimExp::Var(n)])
            .slice(&[DimIndex::Fix(SubExp::Const(1))])
            .unwrap();
        let env = |v: Var| (v == n).then_some(3);
        assert_eq!(row.eval_offset(&[2], &env), Some(5));
    }
}
