//! A memory-block coalescing analysis for array IRs with explicit memory.
//!
//! This crate is compatible with `#![no_std]` and only requires `alloc`.
//!
//! # Overview
//!
//! In an IR where every array lives in an explicitly allocated memory block,
//! operations such as copies, in-place updates and concatenations move data
//! from one block into another. If the source array can instead be computed
//! directly in its final position in the destination block then both the
//! move and the source block can be eliminated.
//!
//! The analysis finds these opportunities and checks that applying them does
//! not change the meaning of the program: the source must die at the move,
//! the destination must already exist when the source is created, nothing
//! else may touch the destination while the source is live, the source must
//! be freshly created and its new index function must be expressible where it
//! is created.
//!
//! # Usage
//!
//! You will need an implementation of [`Function`] which describes the code
//! to analyze, see the [`function`] module documentation for more details, and
//! an implementation of [`LastUses`] which says where each variable dies. A
//! [`LastUseTable`] can be computed from any [`Function`].
//!
//! The analysis is invoked by creating an instance of [`Coalescer`] and then
//! calling [`Coalescer::run`]. The resulting [`Output`] holds a
//! [`CoalesceTable`] describing the new location of every coalesced array.
//!
//! # Validation
//!
//! When developing a new client, it is highly recommended to use the
//! validation functions in [`debug_utils`] to ensure that the inputs are
//! correct. The analysis may return nonsensical results on invalid inputs.
//!
//! [`LastUseTable`]: last_use::LastUseTable
//! [`LastUses`]: last_use::LastUses
//! [`CoalesceTable`]: output::CoalesceTable

#![no_std]
#![warn(rust_2018_idioms, missing_docs)]
#![allow(
    clippy::too_many_arguments,
    clippy::collapsible_if,
    clippy::collapsible_else_if,
    clippy::cast_possible_truncation,
    clippy::too_many_lines,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::doc_markdown
)]
#![warn(
    clippy::explicit_iter_loop,
    clippy::range_plus_one,
    clippy::map_unwrap_or,
    clippy::cloned_instead_of_copied,
    clippy::semicolon_if_nothing_returned,
    clippy::must_use_candidate,
    clippy::uninlined_format_args,
    clippy::ignored_unit_patterns
)]

extern crate alloc;
#[cfg(feature = "clap")]
extern crate std;
#[cfg(feature = "clap")]
use alloc::{borrow::ToOwned, string::String};

use core::fmt;

use function::Function;
use internal::free_vars::FreeVars;
use last_use::LastUses;
use output::{CoalesceTable, InhibitTable, Output};

// Even when trace logging is disabled, the trace macro has a significant
// performance cost so we disable it in release builds.
macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(feature = "trace-log") {
            ::log::trace!($($tt)*);
        }
    };
}
#[allow(unused_macros)]
macro_rules! trace_enabled {
    () => {
        cfg!(feature = "trace-log") && ::log::log_enabled!(::log::Level::Trace)
    };
}

// Macro for collecting statistics.
macro_rules! stat {
    ($stats:expr, $field:ident) => {
        $stats.$field += 1
    };
    ($stats:expr, $field:ident, $count:expr) => {
        $stats.$field += $count
    };
}

#[macro_use]
pub mod entity;

pub mod debug_utils;
pub mod function;
pub mod ixfun;
pub mod last_use;
pub mod output;

mod internal;

/// Structure holding the results of the last analysis, along with memory
/// allocations that can be reused across multiple functions.
pub struct Coalescer {
    free_vars: FreeVars,
    table: CoalesceTable,
    inhibit: InhibitTable,
    iterations: usize,
    stats: Stats,
}

impl Default for Coalescer {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Coalescer {
    /// Creates a new `Coalescer` instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            free_vars: FreeVars::new(),
            table: CoalesceTable::default(),
            inhibit: InhibitTable::new(),
            iterations: 0,
            stats: Stats::default(),
        }
    }

    /// Runs the coalescing analysis on the given function.
    pub fn run<F, L>(
        &mut self,
        func: &F,
        last_uses: &L,
        options: &Options,
    ) -> Result<Output<'_>, CoalesceError>
    where
        F: Function,
        L: LastUses,
    {
        trace!("Input function:\n{}", debug_utils::DisplayFunction(func));

        // Reset results and gather initial information.
        self.stats = Stats::default();
        self.table = CoalesceTable::default();
        self.inhibit = InhibitTable::new();
        self.iterations = 0;
        stat!(self.stats, vars, func.num_vars());
        stat!(self.stats, mems, func.num_mems());
        stat!(self.stats, stmts, func.num_stmts());

        if options.level != CoalescingLevel::Off {
            self.free_vars.compute(func);
            let result = internal::driver::run(
                func,
                last_uses,
                &self.free_vars,
                options.level,
                &mut self.stats,
            )?;
            self.iterations = result.iterations;
            self.inhibit = result.inhibit;
            self.table = CoalesceTable {
                entries: result.success,
            };
        }

        stat!(self.stats, iterations, self.iterations);
        stat!(self.stats, coalesced_blocks, self.table.len());
        for (_, entry) in self.table.iter() {
            stat!(self.stats, coalesced_vars, entry.vars().len());
        }

        let output = Output { coalescer: self };
        trace!("Output:\n{output}");
        trace!("{}", self.stats);
        Ok(output)
    }
}

/// Controls which statements coalescing may see through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum CoalescingLevel {
    /// Don't coalesce anything.
    Off,

    /// Only coalesce within straight-line code. Candidates reaching an `if`
    /// or a loop fail, but the bodies of those statements are still analyzed
    /// on their own.
    Straight,

    /// Coalesce through branches and loops.
    #[default]
    Full,
}

/// Configuration options for the coalescing analysis.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct Options {
    /// Which statements coalescing may see through.
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub level: CoalescingLevel,
}

#[cfg(feature = "clap")]
impl fmt::Display for CoalescingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoalescingLevel::Off => "off",
            CoalescingLevel::Straight => "straight",
            CoalescingLevel::Full => "full",
        };
        f.write_str(name)
    }
}

#[cfg(feature = "arbitrary")]
impl<'a> arbitrary::Arbitrary<'a> for CoalescingLevel {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        u.choose(&[Self::Off, Self::Straight, Self::Full]).copied()
    }
}

#[cfg(feature = "arbitrary")]
impl<'a> arbitrary::Arbitrary<'a> for Options {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self {
            level: u.arbitrary()?,
        })
    }
}

/// Error returned by the analysis.
///
/// Rejected coalescing opportunities are never errors: they are simply left
/// out of the result. An error indicates a bug in the analysis or an input
/// function which doesn't pass validation.
#[derive(Debug)]
#[non_exhaustive]
pub enum CoalesceError {
    /// An internal invariant of the analysis was violated.
    InternalInvariant(&'static str),
}

impl fmt::Display for CoalesceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoalesceError::InternalInvariant(msg) => {
                write!(f, "internal invariant violated: {msg}")
            }
        }
    }
}

/// Statistics collected by the analysis.
///
/// This is an opaque type since the set of statistics may vary between
/// versions.
///
/// The only supported operations on this type are:
/// * Default initialization
/// * Printing with `Debug` or `Display`
#[derive(Debug, Default, Clone)]
pub struct Stats {
    // Stats from input function.
    vars: usize,
    mems: usize,
    stmts: usize,

    // Stats from the traversal, summed over all passes.
    stmts_visited: usize,
    candidates: usize,
    not_last_use: usize,
    failures: usize,
    promoted: usize,
    dependency_failures: usize,

    // Stats from the result.
    iterations: usize,
    coalesced_blocks: usize,
    coalesced_vars: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:#?}")
    }
}
