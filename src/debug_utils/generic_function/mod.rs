//! Generic implementation of a [`Function`] which can be used for testing the
//! coalescing analysis.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::entity::PrimaryMap;
use crate::function::{Body, Exp, Function, Mem, MemInfo, Param, Stmt, SubExp, Type, Var};

#[cfg(feature = "arbitrary")]
mod arbitrary;
#[cfg(feature = "arbitrary")]
pub use arbitrary::ArbitraryFunctionConfig;

use super::DisplayFunction;
#[cfg(feature = "parse")]
mod parse;

#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct VarData {
    ty: Type,
    mem: Option<MemInfo>,
}

#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct StmtData {
    pattern: Vec<Var>,
    exp: Exp,
}

#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct BodyData {
    stmts: Vec<Stmt>,
    results: Vec<SubExp>,
}

/// A generic implementation of [`Function`] which can be constructed from an
/// existing `Function` or parsed from a text representation.
///
/// This is primarily useful for development and debugging of the analysis
/// since it enables working with user-readable and editable forms of its
/// input.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenericFunction {
    name: String,
    params: Vec<Param>,
    vars: PrimaryMap<Var, VarData>,
    num_mems: usize,
    stmts: PrimaryMap<Stmt, StmtData>,
    bodies: PrimaryMap<Body, BodyData>,
    entry: Body,
}

impl fmt::Debug for GenericFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DisplayFunction(self).fmt(f)
    }
}

impl fmt::Display for GenericFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DisplayFunction(self).fmt(f)
    }
}

impl GenericFunction {
    /// Constructs a `GenericFunction` from an existing object which implements
    /// the [`Function`] trait.
    pub fn from_function(func: &impl Function) -> Self {
        let mut vars = PrimaryMap::new();
        let mut stmts = PrimaryMap::new();
        let mut bodies = PrimaryMap::new();
        for var in func.vars() {
            vars.push(VarData {
                ty: func.var_type(var).clone(),
                mem: func.var_mem(var).cloned(),
            });
        }
        for i in 0..func.num_stmts() {
            let stmt = Stmt::new(i);
            stmts.push(StmtData {
                pattern: func.stmt_pattern(stmt).into(),
                exp: func.stmt_exp(stmt).clone(),
            });
        }
        for i in 0..func.num_bodies() {
            let body = Body::new(i);
            bodies.push(BodyData {
                stmts: func.body_stmts(body).into(),
                results: func.body_results(body).into(),
            });
        }
        Self {
            name: func.name().into(),
            params: func.params().into(),
            vars,
            num_mems: func.num_mems(),
            stmts,
            bodies,
            entry: func.entry_body(),
        }
    }

    /// Replaces the memory annotation of an array variable.
    pub(crate) fn set_var_mem(&mut self, var: Var, mem: MemInfo) {
        self.vars[var].mem = Some(mem);
    }
}

/// Incremental construction, used by the parser and the random generator.
#[cfg(any(feature = "parse", feature = "arbitrary"))]
impl GenericFunction {
    /// Creates a function with no parameters or statements. The entry body is
    /// set by [`GenericFunction::finish`].
    fn empty(name: String) -> Self {
        Self {
            name,
            params: Vec::new(),
            vars: PrimaryMap::new(),
            num_mems: 0,
            stmts: PrimaryMap::new(),
            bodies: PrimaryMap::new(),
            entry: Body::new(0),
        }
    }

    fn push_var(&mut self, ty: Type, mem: Option<MemInfo>) -> Var {
        self.vars.push(VarData { ty, mem })
    }

    fn push_mem(&mut self) -> Mem {
        self.num_mems += 1;
        Mem::new(self.num_mems - 1)
    }

    fn push_stmt(&mut self, pattern: Vec<Var>, exp: Exp) -> Stmt {
        self.stmts.push(StmtData { pattern, exp })
    }

    fn push_body(&mut self, stmts: Vec<Stmt>, results: Vec<SubExp>) -> Body {
        self.bodies.push(BodyData { stmts, results })
    }

    fn finish(&mut self, stmts: Vec<Stmt>, results: Vec<SubExp>) {
        self.entry = self.push_body(stmts, results);
    }
}

impl Function for GenericFunction {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn num_vars(&self) -> usize {
        self.vars.len()
    }

    #[inline]
    fn num_mems(&self) -> usize {
        self.num_mems
    }

    #[inline]
    fn num_stmts(&self) -> usize {
        self.stmts.len()
    }

    #[inline]
    fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    fn params(&self) -> &[Param] {
        &self.params
    }

    #[inline]
    fn entry_body(&self) -> Body {
        self.entry
    }

    #[inline]
    fn body_stmts(&self, body: Body) -> &[Stmt] {
        &self.bodies[body].stmts
    }

    #[inline]
    fn body_results(&self, body: Body) -> &[SubExp] {
        &self.bodies[body].results
    }

    #[inline]
    fn stmt_pattern(&self, stmt: Stmt) -> &[Var] {
        &self.stmts[stmt].pattern
    }

    #[inline]
    fn stmt_exp(&self, stmt: Stmt) -> &Exp {
        &self.stmts[stmt].exp
    }

    #[inline]
    fn var_type(&self, var: Var) -> &Type {
        &self.vars[var].ty
    }

    #[inline]
    fn var_mem(&self, var: Var) -> Option<&MemInfo> {
        self.vars[var].mem.as_ref()
    }
}
