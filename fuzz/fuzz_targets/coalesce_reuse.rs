//! Checks that re-using a `Coalescer` across functions gives the same result
//! as using a fresh one.

#![no_main]

use libfuzzer_sys::fuzz_target;
use memcoal::Coalescer;
use memcoal::last_use::LastUseTable;
use memcoal_fuzz::TestCase;

fuzz_target!(|t: (TestCase, TestCase)| {
    // Ensure the logger is initialized.
    let _ = pretty_env_logger::try_init();

    let (first, second) = t;
    let mut reused = Coalescer::new();
    let last_uses = LastUseTable::compute(&first.func);
    reused.run(&first.func, &last_uses, &first.options).unwrap();

    let last_uses = LastUseTable::compute(&second.func);
    let expected = Coalescer::new()
        .run(&second.func, &last_uses, &second.options)
        .unwrap()
        .to_string();
    let actual = reused
        .run(&second.func, &last_uses, &second.options)
        .unwrap()
        .to_string();
    assert_eq!(expected, actual);
});
