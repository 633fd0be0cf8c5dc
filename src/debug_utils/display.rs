//! Support for displaying human-readable representations of types implementing
//! [`Function`].

use core::cell::Cell;
use core::fmt;

use crate::function::{Body, Exp, Function, Param, Stmt, Var};

/// Helper type to display a comma-separated list of displayable values.
pub(crate) struct DisplayIter<T> {
    iter: Cell<Option<T>>,
    separator: &'static str,
}
impl<T: IntoIterator> fmt::Display for DisplayIter<T>
where
    T::Item: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(iter) = self.iter.take() else {
            return Ok(());
        };
        for (i, val) in iter.into_iter().enumerate() {
            if i == 0 {
                write!(f, "{val}")?;
            } else {
                write!(f, "{} {val}", self.separator)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn display_iter<I: IntoIterator<Item = impl fmt::Display>>(
    iter: I,
    separator: &'static str,
) -> DisplayIter<I> {
    DisplayIter {
        iter: Cell::new(Some(iter)),
        separator,
    }
}

/// Wrapper around a type implementing [`Function`] that provides a [`Display`]
/// implementation which dumps the function in a format that is both
/// human-readable and machine-parseable.
///
/// The returned string can be re-parsed into a function by using
/// [`GenericFunction::parse`] (requires the `parse` cargo feature).
///
/// [`GenericFunction::parse`]: crate::debug_utils::GenericFunction::parse
/// [`Display`]: core::fmt::Display
pub struct DisplayFunction<'a, F: Function>(pub &'a F);

impl<F: Function> fmt::Debug for DisplayFunction<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<F: Function> DisplayFunction<'_, F> {
    /// Writes a variable declaration. The index function is omitted when it
    /// matches the one the parser would derive from `exp`.
    fn write_decl(&self, f: &mut fmt::Formatter<'_>, var: Var, exp: Option<&Exp>) -> fmt::Result {
        let func = self.0;
        let ty = func.var_type(var);
        write!(f, "{var}: {ty}")?;
        if let Some(info) = func.var_mem(var) {
            write!(f, " @ {}", info.mem)?;
            let default = match exp {
                Some(exp) => exp.default_ixfun(ty, |v| func.var_mem(v)),
                None => ty.direct_ixfun(),
            };
            if default.as_ref() != Some(&info.ixfun) {
                write!(f, " -> {}", info.ixfun)?;
            }
        }
        Ok(())
    }

    fn write_body(
        &self,
        f: &mut fmt::Formatter<'_>,
        body: Body,
        indent: usize,
        terminator: &str,
    ) -> fmt::Result {
        for &stmt in self.0.body_stmts(body) {
            self.write_stmt(f, stmt, indent)?;
        }
        write!(f, "{:indent$}{terminator}", "")?;
        if !self.0.body_results(body).is_empty() {
            write!(f, " {}", display_iter(self.0.body_results(body), ","))?;
        }
        writeln!(f)
    }

    fn write_stmt(&self, f: &mut fmt::Formatter<'_>, stmt: Stmt, indent: usize) -> fmt::Result {
        let func = self.0;
        let exp = func.stmt_exp(stmt);
        write!(f, "{:indent$}", "")?;
        if let Exp::Alloc { mem, size } = exp {
            return writeln!(f, "{mem} = alloc {size}");
        }

        let derive_from = match exp {
            Exp::If { .. } | Exp::Loop { .. } => None,
            _ => Some(exp),
        };
        for (i, &var) in func.stmt_pattern(stmt).iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            self.write_decl(f, var, derive_from)?;
        }
        write!(f, " = ")?;

        match exp {
            Exp::Alloc { .. } => unreachable!(),
            Exp::SubExp(se) => write!(f, "{se}")?,
            Exp::BinOp(op, a, b) => write!(f, "{op} {a} {b}")?,
            Exp::Cmp(op, a, b) => write!(f, "{op} {a} {b}")?,
            Exp::Index { array, slice: s } => {
                write!(f, "index {array}[{}]", display_iter(s.iter().copied(), ","))?
            }
            Exp::Update {
                array,
                slice: s,
                value,
            } => write!(
                f,
                "update {array}[{}] = {value}",
                display_iter(s.iter().copied(), ",")
            )?,
            Exp::Copy(array) => write!(f, "copy {array}")?,
            Exp::Concat(arrays) => write!(f, "concat {}", display_iter(arrays, ","))?,
            Exp::Iota(n) => write!(f, "iota {n}")?,
            Exp::Replicate { shape, value } => {
                write!(f, "replicate ")?;
                for dim in shape {
                    write!(f, "[{dim}]")?;
                }
                write!(f, " {value}")?;
            }
            Exp::Map { op, lhs, rhs } => write!(f, "map {op} {lhs} {rhs}")?,
            Exp::Reshape { array, shape } => {
                write!(f, "reshape {array} ")?;
                for dim in shape {
                    write!(f, "[{dim}]")?;
                }
            }
            Exp::Rearrange { array, perm } => {
                write!(f, "rearrange {array} ({})", display_iter(perm, ","))?;
            }
            Exp::If {
                cond,
                then_body,
                else_body,
            } => {
                writeln!(f, "if {cond} {{")?;
                self.write_body(f, *then_body, indent + 4, "yield")?;
                writeln!(f, "{:indent$}}} else {{", "")?;
                self.write_body(f, *else_body, indent + 4, "yield")?;
                write!(f, "{:indent$}}}", "")?;
            }
            Exp::Loop {
                params,
                index,
                bound,
                body,
            } => {
                write!(f, "loop (")?;
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    self.write_decl(f, param.var, None)?;
                    write!(f, " = {}", param.init)?;
                }
                writeln!(f, ") for {index} < {bound} {{")?;
                self.write_body(f, *body, indent + 4, "yield")?;
                write!(f, "{:indent$}}}", "")?;
            }
        }
        writeln!(f)
    }
}

impl<F: Function> fmt::Display for DisplayFunction<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.0.name())?;
        for (i, param) in self.0.params().iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            match *param {
                Param::Mem(mem) => write!(f, "{mem}: mem")?,
                Param::Var(var) => self.write_decl(f, var, None)?,
            }
        }
        writeln!(f, ") {{")?;
        self.write_body(f, self.0.entry_body(), 4, "return")?;
        writeln!(f, "}}")
    }
}

#[cfg(all(test, feature = "parse"))]
mod tests {
    use alloc::string::ToString;

    use crate::debug_utils::GenericFunction;

    #[test]
    fn slices_survive_printing() {
        let func = GenericFunction::parse(
            "
            fn f(mem0: mem, %0: i64, %1: [2][%0]i64 @ mem0) {
                %2: i64 = mul %0 2
                mem1 = alloc %2
                %3: [2][%0]i64 @ mem1 = copy %1
                %4: [%0]i64 @ mem0 = index %1[1, 0:%0:1]
                %5: [2][%0]i64 @ mem1 = update %3[0, 0:%0:1] = %4
                %6: i64 = index %5[1, 0]
                return %5, %6
            }
            ",
        )
        .unwrap();
        let text = func.to_string();
        assert!(text.contains("index %1[1,0:%0:1]"), "{text}");
        assert!(text.contains("update %3[0,0:%0:1] = %4"), "{text}");
        assert!(text.contains("index %5[1,0]"), "{text}");

        let reparsed = GenericFunction::parse(&text).unwrap();
        assert_eq!(reparsed.to_string(), text);
    }
}
