//! Behavior of the driver: iteration, coalescing levels and reuse.

mod common;

use common::{analyze, analyze_with, check_sound, parse};
use memcoal::last_use::LastUseTable;
use memcoal::{Coalescer, CoalescingLevel, Options};

const LOOP: &str = "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = mul %0 2
    mem1 = alloc %2
    %3: [2][%0]i64 @ mem1 = replicate [2][%0] 0
    mem2 = alloc %0
    %4: [%0]i64 @ mem2 = iota %0
    mem3 = alloc %0
    %5: [%0]i64 @ mem3 = loop (%6: [%0]i64 @ mem3 = %4) for %7 < %0 {
        %8: i64 = index %6[%7]
        %9: i64 = add %8 %7
        %10: [%0]i64 @ mem3 = update %6[%7] = %9
        yield %10
    }
    %11: [2][%0]i64 @ mem1 = update %3[0, 0:%0:1] = %5
    return %11
}
";

const NESTED_COPY: &str = "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0, %2: bool) {
    mem1 = alloc %0
    %3: [%0]i64 @ mem1 = if %2 {
        mem2 = alloc %0
        mem3 = alloc %0
        %4: [%0]i64 @ mem2 = map add %1 1
        %5: [%0]i64 @ mem3 = copy %4
        yield %5
    } else {
        yield %1
    }
    return %3
}
";

#[test]
fn off_level_does_nothing() {
    let a = analyze_with(LOOP, CoalescingLevel::Off);
    assert!(a.table.is_empty());
    assert!(a.inhibit.is_empty());
    assert_eq!(a.iterations, 0);
}

#[test]
fn straight_level_stops_at_compound_statements() {
    let a = analyze_with(LOOP, CoalescingLevel::Straight);
    check_sound(&a);
    assert!(a.table.is_empty());
    assert!(a.inhibited(3, 1));
}

#[test]
fn straight_level_still_analyzes_nested_bodies() {
    let a = analyze_with(NESTED_COPY, CoalescingLevel::Straight);
    check_sound(&a);
    assert_eq!(a.eliminated(), [2]);
    assert_eq!(a.dst(2), Some(3));

    let full = analyze(NESTED_COPY);
    assert_eq!(full.eliminated(), [2]);
}

// The `then` arm succeeds on its own, but the `else` arm produces a view, so
// the whole candidate and the `then` arm's entry are rejected.
#[test]
fn disagreeing_branches_revoke_both_arms() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0, %2: bool) {
    mem1 = alloc %0
    mem2 = alloc %0
    %3: [%0]i64 @ mem2 = if %2 {
        mem3 = alloc %0
        %4: [%0]i64 @ mem3 = iota %0
        yield %4
    } else {
        mem4 = alloc %0
        %5: [%0]i64 @ mem4 = iota %0
        %6: [%0]i64 @ mem4 = index %5[0:%0:1]
        yield %6
    }
    %7: [%0]i64 @ mem1 = copy %3
    return %7
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(2, 1));
    assert!(a.inhibited(3, 1));
    assert!(a.inhibited(4, 1));
    assert_eq!(a.iterations, 2);
}

#[test]
fn iterations_are_bounded() {
    for src in [LOOP, NESTED_COPY] {
        let a = analyze(src);
        let mems = memcoal::function::Function::num_mems(&a.func);
        assert!(a.iterations >= 1);
        assert!(a.iterations <= mems * mems + 1);
    }
}

#[test]
fn running_twice_gives_the_same_result() {
    let func = parse(LOOP);
    let last_uses = LastUseTable::compute(&func);
    let mut coalescer = Coalescer::new();
    let first = coalescer
        .run(&func, &last_uses, &Options::default())
        .unwrap()
        .to_string();
    let second = coalescer
        .run(&func, &last_uses, &Options::default())
        .unwrap()
        .to_string();
    assert_eq!(first, second);
    assert_eq!(first, analyze(LOOP).dump);
}

#[test]
fn reused_coalescer_matches_fresh_one() {
    let nested = parse(NESTED_COPY);
    let looped = parse(LOOP);
    let mut reused = Coalescer::new();
    reused
        .run(&nested, &LastUseTable::compute(&nested), &Options::default())
        .unwrap();
    let last_uses = LastUseTable::compute(&looped);
    let expected = Coalescer::new()
        .run(&looped, &last_uses, &Options::default())
        .unwrap()
        .to_string();
    let actual = reused
        .run(&looped, &last_uses, &Options::default())
        .unwrap()
        .to_string();
    assert_eq!(expected, actual);
}

#[test]
fn output_lists_tables() {
    let a = analyze(LOOP);
    assert!(a.dump.starts_with("; success\nmem2 -> mem1 "));
    assert!(a.dump.contains("mem3 -> mem1 "));
    assert!(a.dump.contains("; inhibit\n"));
    assert!(a.dump.ends_with("; iterations: 1\n"));
}
