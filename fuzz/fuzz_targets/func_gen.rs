//! Checks that `GenericFunction::arbitrary` produces functions that pass
//! validation and can be interpreted.

#![no_main]

use libfuzzer_sys::fuzz_target;
use memcoal::debug_utils;
use memcoal_fuzz::TestCase;

fuzz_target!(|t: TestCase| {
    // Ensure the logger is initialized.
    let _ = pretty_env_logger::try_init();

    debug_utils::validate_function(&t.func).unwrap();

    // Generated functions may still fail at runtime, for example by indexing
    // out of bounds, but they must never cause the interpreter to panic.
    let _ = debug_utils::interpret(&t.func, &t.inputs());
});
