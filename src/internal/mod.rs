//! Internal implementation details of the analysis that are not part of the
//! public API.

pub(crate) mod candidates;
pub(crate) mod driver;
pub(crate) mod env;
pub(crate) mod free_vars;
pub(crate) mod safety;
pub(crate) mod tables;
pub(crate) mod transfer;
