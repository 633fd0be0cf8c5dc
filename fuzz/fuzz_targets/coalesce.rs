//! Checks that the analysis succeeds on arbitrary functions and that applying
//! its result doesn't change what the function computes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use memcoal::Coalescer;
use memcoal::debug_utils;
use memcoal::last_use::LastUseTable;
use memcoal_fuzz::TestCase;

fuzz_target!(|t: TestCase| {
    // Ensure the logger is initialized.
    let _ = pretty_env_logger::try_init();

    let last_uses = LastUseTable::compute(&t.func);
    let mut coalescer = Coalescer::new();
    let output = coalescer.run(&t.func, &last_uses, &t.options).unwrap();

    let rewritten = debug_utils::apply_coalescing(&t.func, output.table());
    debug_utils::validate_function(&rewritten).unwrap();
    debug_utils::check_coalescing(&t.func, output.table(), &t.inputs()).unwrap();
});
