//! Utility functions and types for debugging the coalescing analysis.
//!
//! These are not needed for normal compilation, but are useful during
//! development of both the analysis itself and users of the analysis.

mod checker;
mod display;
mod generic_function;
mod interpreter;
mod rewrite;
mod validate_func;

pub use checker::*;
pub use display::*;
pub use generic_function::*;
pub use interpreter::*;
pub use rewrite::*;
pub use validate_func::*;
