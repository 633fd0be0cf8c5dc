use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::str::FromStr;

use anyhow::Result;
use pest::error::{Error, ErrorVariant};
use pest::iterators::Pair;
use pest::{Parser, Span};
use pest_derive::Parser;

use super::GenericFunction;
use crate::entity::EntityRef;
use crate::function::{
    BinOp, Body, CmpOp, DimIndex, Exp, LoopParam, Mem, MemInfo, Param, Stmt, SubExp, Type, Var,
};
use crate::ixfun::{IxFun, LmadDim, PrimExp};

#[derive(Parser)]
#[grammar = "debug_utils/generic_function/grammar.pest"]
pub struct FunctionParser;

/// Helper function to extract N sub-pairs when the layout of a rule is fixed.
fn extract<const N: usize>(pair: Pair<'_, Rule>, expected_rules: [Rule; N]) -> [Pair<'_, Rule>; N] {
    let mut out = [(); N].map(|()| pair.clone());
    let mut i = 0;
    for pair in pair.into_inner() {
        assert_eq!(pair.as_rule(), expected_rules[i]);
        out[i] = pair;
        i += 1;
    }
    assert_eq!(i, N);
    out
}

/// Helper function to emit a custom error at the given span.
fn custom_error(span: Span<'_>, msg: &str) -> Error<Rule> {
    Error::new_from_span(
        ErrorVariant::<Rule>::CustomError {
            message: msg.into(),
        },
        span,
    )
}

fn parse_number<T: FromStr>(pair: Pair<'_, Rule>) -> Result<T> {
    Ok(pair.as_str().parse().map_err(|_| {
        // This can only fail due to integer overflow, the rule only allows
        // digits.
        custom_error(pair.as_span(), "integer overflow")
    })?)
}

fn parse_entity<T: EntityRef>(pair: Pair<'_, Rule>) -> Result<T> {
    let [number] = extract(pair, [Rule::number]);
    let index = parse_number(number)?;
    Ok(T::new(index))
}

fn parse_expected_entity<T: EntityRef>(pair: Pair<'_, Rule>, expected: T) -> Result<T> {
    let span = pair.as_span();
    let entity = parse_entity::<T>(pair)?;
    if entity != expected {
        Err(custom_error(
            span,
            "must be declared in order and with no gaps",
        ))?;
    }
    Ok(entity)
}

fn parse_subexp(pair: Pair<'_, Rule>) -> Result<SubExp> {
    let Some(inner) = pair.into_inner().next() else {
        unreachable!()
    };
    match inner.as_rule() {
        Rule::var => Ok(SubExp::Var(parse_entity(inner)?)),
        Rule::integer => Ok(SubExp::Const(parse_number(inner)?)),
        _ => unreachable!(),
    }
}

/// Parses the sub-pairs of `pair` with `f`.
fn parse_list<T>(pair: Pair<'_, Rule>, f: fn(Pair<'_, Rule>) -> Result<T>) -> Result<Vec<T>> {
    pair.into_inner().map(f).collect()
}

fn parse_type(pair: Pair<'_, Rule>) -> Result<Type> {
    let span = pair.as_span();
    let [shape, scalar] = extract(pair, [Rule::shape, Rule::scalar_type]);
    let shape = parse_list(shape, parse_subexp)?;
    match (scalar.as_str(), shape.is_empty()) {
        ("i64", true) => Ok(Type::I64),
        ("bool", true) => Ok(Type::Bool),
        ("i64", false) => Ok(Type::Array(shape)),
        _ => Err(custom_error(span, "array elements must be i64"))?,
    }
}

fn parse_prim_exp(pair: Pair<'_, Rule>) -> Result<PrimExp> {
    let Some(inner) = pair.into_inner().next() else {
        unreachable!()
    };
    match inner.as_rule() {
        Rule::var => Ok(PrimExp::Var(parse_entity(inner)?)),
        Rule::integer => Ok(PrimExp::Const(parse_number(inner)?)),
        Rule::prim_bin => {
            let [a, op, b] = extract(inner, [Rule::prim_exp, Rule::prim_op, Rule::prim_exp]);
            let op = match op.as_str() {
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "%" => BinOp::Rem,
                _ => unreachable!(),
            };
            Ok(PrimExp::Bin(
                op,
                Box::new(parse_prim_exp(a)?),
                Box::new(parse_prim_exp(b)?),
            ))
        }
        Rule::prim_call => {
            let [op, a, b] = extract(inner, [Rule::minmax, Rule::prim_exp, Rule::prim_exp]);
            let op = match op.as_str() {
                "min" => BinOp::Min,
                "max" => BinOp::Max,
                _ => unreachable!(),
            };
            Ok(PrimExp::Bin(
                op,
                Box::new(parse_prim_exp(a)?),
                Box::new(parse_prim_exp(b)?),
            ))
        }
        _ => unreachable!(),
    }
}

fn parse_lmad_dim(pair: Pair<'_, Rule>) -> Result<LmadDim> {
    let [base_dim, stride, size] = extract(pair, [Rule::number, Rule::prim_exp, Rule::prim_exp]);
    Ok(LmadDim {
        base_dim: parse_number(base_dim)?,
        stride: parse_prim_exp(stride)?,
        size: parse_prim_exp(size)?,
    })
}

fn parse_ixfun(pair: Pair<'_, Rule>) -> Result<IxFun> {
    let span = pair.as_span();
    let [base, offset, dims] = extract(pair, [Rule::prim_list, Rule::prim_list, Rule::lmad_dims]);
    let ixfun = IxFun::new(
        parse_list(base, parse_prim_exp)?,
        parse_list(offset, parse_prim_exp)?,
        parse_list(dims, parse_lmad_dim)?,
    );
    match ixfun {
        Some(ixfun) => Ok(ixfun),
        None => Err(custom_error(span, "malformed index function"))?,
    }
}

fn parse_dim_index(pair: Pair<'_, Rule>) -> Result<DimIndex> {
    let Some(inner) = pair.into_inner().next() else {
        unreachable!()
    };
    match inner.as_rule() {
        Rule::subexp => Ok(DimIndex::Fix(parse_subexp(inner)?)),
        Rule::dim_range => {
            let [start, len, stride] = extract(inner, [Rule::subexp, Rule::subexp, Rule::subexp]);
            Ok(DimIndex::Range {
                start: parse_subexp(start)?,
                len: parse_subexp(len)?,
                stride: parse_subexp(stride)?,
            })
        }
        _ => unreachable!(),
    }
}

/// A declared variable whose memory annotation is only known once the
/// expression binding it has been parsed.
struct PendingDecl {
    var: Var,
    mem: Option<(Mem, Option<IxFun>)>,
}

struct FunctionBuilder {
    func: GenericFunction,
}

impl FunctionBuilder {
    fn declare_mem(&mut self, pair: Pair<'_, Rule>) -> Result<Mem> {
        let expected = Mem::new(self.func.num_mems);
        parse_expected_entity(pair, expected)?;
        Ok(self.func.push_mem())
    }

    fn declare_var(&mut self, pair: Pair<'_, Rule>) -> Result<PendingDecl> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();
        let (Some(var), Some(ty)) = (inner.next(), inner.next()) else {
            unreachable!()
        };
        parse_expected_entity(var, self.func.vars.next_key())?;
        let ty = parse_type(ty)?;
        let mem = match inner.next() {
            Some(mem_info) => {
                let mut inner = mem_info.into_inner();
                let Some(mem) = inner.next() else {
                    unreachable!()
                };
                let mem_span = mem.as_span();
                let mem: Mem = parse_entity(mem)?;
                if mem.index() >= self.func.num_mems {
                    Err(custom_error(mem_span, "undeclared memory block"))?;
                }
                let ixfun = inner.next().map(parse_ixfun).transpose()?;
                Some((mem, ixfun))
            }
            None => None,
        };
        match (ty.is_array(), mem.is_some()) {
            (true, false) => Err(custom_error(span, "array without memory annotation"))?,
            (false, true) => Err(custom_error(span, "scalar with memory annotation"))?,
            _ => {}
        }
        let var = self.func.push_var(ty, None);
        Ok(PendingDecl { var, mem })
    }

    /// Fills in the memory annotation of a declared variable, deriving the
    /// index function from `exp` if it was omitted.
    fn finish_decl(&mut self, decl: PendingDecl, exp: Option<&Exp>, span: Span<'_>) -> Result<()> {
        let Some((mem, ixfun)) = decl.mem else {
            return Ok(());
        };
        let ixfun = match ixfun {
            Some(ixfun) => Some(ixfun),
            None => {
                let ty = &self.func.vars[decl.var].ty;
                let vars = &self.func.vars;
                match exp {
                    Some(exp) => exp.default_ixfun(ty, |v| {
                        vars.get(v).and_then(|data| data.mem.as_ref())
                    }),
                    None => ty.direct_ixfun(),
                }
            }
        };
        let Some(ixfun) = ixfun else {
            Err(custom_error(span, "can't derive an index function"))?
        };
        self.func.set_var_mem(decl.var, MemInfo { mem, ixfun });
        Ok(())
    }

    fn parse_params(&mut self, pair: Pair<'_, Rule>) -> Result<()> {
        for pair in pair.into_inner() {
            match pair.as_rule() {
                Rule::mem_param => {
                    let [mem] = extract(pair, [Rule::mem]);
                    let mem = self.declare_mem(mem)?;
                    self.func.params.push(Param::Mem(mem));
                }
                Rule::var_decl => {
                    let span = pair.as_span();
                    let decl = self.declare_var(pair)?;
                    let var = decl.var;
                    self.finish_decl(decl, None, span)?;
                    self.func.params.push(Param::Var(var));
                }
                _ => unreachable!(),
            }
        }
        Ok(())
    }

    /// Parses the statements and results of a body, returning them in order.
    fn parse_body_contents(&mut self, pair: Pair<'_, Rule>) -> Result<(Vec<Stmt>, Vec<SubExp>)> {
        let mut stmts = vec![];
        let mut results = vec![];
        for pair in pair.into_inner() {
            match pair.as_rule() {
                Rule::stmt => stmts.push(self.parse_stmt(pair)?),
                Rule::subexp_list => results = parse_list(pair, parse_subexp)?,
                _ => unreachable!(),
            }
        }
        Ok((stmts, results))
    }

    fn parse_body(&mut self, pair: Pair<'_, Rule>) -> Result<Body> {
        let (stmts, results) = self.parse_body_contents(pair)?;
        Ok(self.func.push_body(stmts, results))
    }

    fn parse_stmt(&mut self, pair: Pair<'_, Rule>) -> Result<Stmt> {
        let Some(pair) = pair.into_inner().next() else {
            unreachable!()
        };
        match pair.as_rule() {
            Rule::alloc_stmt => {
                let [mem, size] = extract(pair, [Rule::mem, Rule::subexp]);
                let mem = self.declare_mem(mem)?;
                let size = parse_subexp(size)?;
                Ok(self.func.push_stmt(vec![], Exp::Alloc { mem, size }))
            }
            Rule::bind_stmt => {
                let [pattern, exp] = extract(pair, [Rule::pattern, Rule::exp]);
                let mut decls = vec![];
                for decl in pattern.into_inner() {
                    let span = decl.as_span();
                    decls.push((self.declare_var(decl)?, span));
                }
                let exp = self.parse_exp(exp)?;
                let compound = matches!(exp, Exp::If { .. } | Exp::Loop { .. });
                let mut vars = vec![];
                for (decl, span) in decls {
                    vars.push(decl.var);
                    let derive_from = if compound { None } else { Some(&exp) };
                    self.finish_decl(decl, derive_from, span)?;
                }
                Ok(self.func.push_stmt(vars, exp))
            }
            _ => unreachable!(),
        }
    }

    fn parse_exp(&mut self, pair: Pair<'_, Rule>) -> Result<Exp> {
        let Some(pair) = pair.into_inner().next() else {
            unreachable!()
        };
        let exp = match pair.as_rule() {
            Rule::exp_subexp => {
                let [se] = extract(pair, [Rule::subexp]);
                Exp::SubExp(parse_subexp(se)?)
            }
            Rule::exp_binop => {
                let [op, a, b] = extract(pair, [Rule::binop_name, Rule::subexp, Rule::subexp]);
                let Some(op) = BinOp::from_name(op.as_str()) else {
                    unreachable!()
                };
                Exp::BinOp(op, parse_subexp(a)?, parse_subexp(b)?)
            }
            Rule::exp_cmp => {
                let [op, a, b] = extract(pair, [Rule::cmp_name, Rule::subexp, Rule::subexp]);
                let Some(op) = CmpOp::from_name(op.as_str()) else {
                    unreachable!()
                };
                Exp::Cmp(op, parse_subexp(a)?, parse_subexp(b)?)
            }
            Rule::exp_index => {
                let [array, slice] = extract(pair, [Rule::var, Rule::slice]);
                Exp::Index {
                    array: parse_entity(array)?,
                    slice: parse_list(slice, parse_dim_index)?,
                }
            }
            Rule::exp_update => {
                let [array, slice, value] =
                    extract(pair, [Rule::var, Rule::slice, Rule::subexp]);
                Exp::Update {
                    array: parse_entity(array)?,
                    slice: parse_list(slice, parse_dim_index)?,
                    value: parse_subexp(value)?,
                }
            }
            Rule::exp_copy => {
                let [array] = extract(pair, [Rule::var]);
                Exp::Copy(parse_entity(array)?)
            }
            Rule::exp_concat => {
                let [list] = extract(pair, [Rule::var_list]);
                Exp::Concat(parse_list(list, parse_entity)?)
            }
            Rule::exp_iota => {
                let [n] = extract(pair, [Rule::subexp]);
                Exp::Iota(parse_subexp(n)?)
            }
            Rule::exp_replicate => {
                let [shape, value] = extract(pair, [Rule::shape, Rule::subexp]);
                Exp::Replicate {
                    shape: parse_list(shape, parse_subexp)?,
                    value: parse_subexp(value)?,
                }
            }
            Rule::exp_map => {
                let [op, lhs, rhs] = extract(pair, [Rule::binop_name, Rule::subexp, Rule::subexp]);
                let Some(op) = BinOp::from_name(op.as_str()) else {
                    unreachable!()
                };
                Exp::Map {
                    op,
                    lhs: parse_subexp(lhs)?,
                    rhs: parse_subexp(rhs)?,
                }
            }
            Rule::exp_reshape => {
                let [array, shape] = extract(pair, [Rule::var, Rule::shape]);
                Exp::Reshape {
                    array: parse_entity(array)?,
                    shape: parse_list(shape, parse_subexp)?,
                }
            }
            Rule::exp_rearrange => {
                let [array, perm] = extract(pair, [Rule::var, Rule::perm]);
                Exp::Rearrange {
                    array: parse_entity(array)?,
                    perm: parse_list(perm, parse_number)?,
                }
            }
            Rule::exp_if => {
                let [cond, then_body, else_body] =
                    extract(pair, [Rule::subexp, Rule::body, Rule::body]);
                Exp::If {
                    cond: parse_subexp(cond)?,
                    then_body: self.parse_body(then_body)?,
                    else_body: self.parse_body(else_body)?,
                }
            }
            Rule::exp_loop => {
                let [loop_params, index, bound, body] = extract(
                    pair,
                    [Rule::loop_params, Rule::var, Rule::subexp, Rule::body],
                );
                let mut params = vec![];
                for param in loop_params.into_inner() {
                    let [decl, init] = extract(param, [Rule::var_decl, Rule::subexp]);
                    let span = decl.as_span();
                    let decl = self.declare_var(decl)?;
                    let var = decl.var;
                    self.finish_decl(decl, None, span)?;
                    params.push(LoopParam {
                        var,
                        init: parse_subexp(init)?,
                    });
                }
                parse_expected_entity(index, self.func.vars.next_key())?;
                let index = self.func.push_var(Type::I64, None);
                Exp::Loop {
                    params,
                    index,
                    bound: parse_subexp(bound)?,
                    body: self.parse_body(body)?,
                }
            }
            _ => unreachable!(),
        };
        Ok(exp)
    }
}

impl GenericFunction {
    /// Parses a textual representation of a [`Function`] into a
    /// [`GenericFunction`].
    ///
    /// The text format is the same as the one generated by
    /// [`DisplayFunction`]. Variables and memory blocks must be numbered in
    /// the order in which they are declared.
    ///
    /// [`DisplayFunction`]: crate::debug_utils::DisplayFunction
    /// [`Function`]: crate::function::Function
    pub fn parse(input: &str) -> Result<Self> {
        let mut parse_result = FunctionParser::parse(Rule::function, input)?;
        let Some(function) = parse_result.next() else {
            unreachable!()
        };
        let [name, params, entry_body, _eoi] = extract(
            function,
            [Rule::ident, Rule::params, Rule::entry_body, Rule::EOI],
        );

        let mut builder = FunctionBuilder {
            func: GenericFunction::empty(name.as_str().into()),
        };
        builder.parse_params(params)?;
        let (stmts, results) = builder.parse_body_contents(entry_body)?;
        builder.func.finish(stmts, results);
        Ok(builder.func)
    }
}
