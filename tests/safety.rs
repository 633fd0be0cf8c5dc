//! Each safety condition, violated on its own, prevents coalescing.

mod common;

use common::analyze;

#[test]
fn source_used_after_copy() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    mem1 = alloc %0
    mem2 = alloc %0
    %2: [%0]i64 @ mem1 = map add %1 1
    %3: [%0]i64 @ mem2 = copy %2
    %4: i64 = index %2[0]
    return %3, %4
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(1, 2));
}

// `%5` dies at the update, but `%4` shares its block and is read afterwards.
#[test]
fn alias_read_after_merge() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = mul %0 2
    mem1 = alloc %2
    %3: [2][%0]i64 @ mem1 = replicate [2][%0] 0
    mem2 = alloc %0
    %4: [%0]i64 @ mem2 = iota %0
    %5: [%0]i64 @ mem2 = %4
    %6: [2][%0]i64 @ mem1 = update %3[0, 0:%0:1] = %5
    %7: [2][%0]i64 @ mem1 = update %6[0, 0] = 99
    %8: i64 = index %4[0]
    return %7, %8
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(2, 1));
}

// Same as above, with the alias only read inside a later branch.
#[test]
fn alias_read_in_later_branch() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0, %2: bool) {
    mem1 = alloc %0
    mem2 = alloc %0
    %3: [%0]i64 @ mem2 = map add %1 1
    %4: [%0]i64 @ mem2 = %3
    %5: [%0]i64 @ mem1 = copy %4
    %6: [%0]i64 @ mem1 = update %5[0] = 7
    %7: i64 = if %2 {
        %8: i64 = index %3[0]
        yield %8
    } else {
        yield 0
    }
    return %6, %7
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(2, 1));
}

#[test]
fn destination_allocated_after_source() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    mem1 = alloc %0
    %2: [%0]i64 @ mem1 = map add %1 1
    mem2 = alloc %0
    %3: [%0]i64 @ mem2 = copy %2
    return %3
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(1, 2));
}

// `xs` is read to compute `zs` while `ys` is live, so `ys` can't be built in
// place inside `xs`.
#[test]
fn destination_read_while_source_live() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = sub %0 1
    %3: i64 = mul %0 %0
    mem1 = alloc %3
    %4: [%0][%0]i64 @ mem1 = replicate [%0][%0] 0
    mem2 = alloc %0
    %5: [%0]i64 @ mem2 = map add %1 1
    %6: [%0]i64 @ mem1 = index %4[%2, 0:%0:1]
    mem3 = alloc %0
    %7: [%0]i64 @ mem3 = map add %6 1
    %8: [%0][%0]i64 @ mem1 = update %4[%2, 0:%0:1] = %5
    %9: i64 = index %7[%2]
    return %8, %9
}
",
    );
    assert_eq!(a.dst(2), None);
    assert!(a.inhibited(2, 1));
    assert_eq!(a.iterations, 2);
}

// Same as above, but the read happens before `ys` is created.
#[test]
fn destination_read_before_source_created() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = sub %0 1
    %3: i64 = mul %0 %0
    mem1 = alloc %3
    %4: [%0][%0]i64 @ mem1 = replicate [%0][%0] 0
    %5: [%0]i64 @ mem1 = index %4[%2, 0:%0:1]
    mem2 = alloc %0
    %6: [%0]i64 @ mem2 = map add %5 1
    mem3 = alloc %0
    %7: [%0]i64 @ mem3 = map add %1 1
    %8: [%0][%0]i64 @ mem1 = update %4[%2, 0:%0:1] = %7
    %9: i64 = index %6[%2]
    return %8, %9
}
",
    );
    assert_eq!(a.eliminated(), [3]);
    assert_eq!(a.dst(3), Some(1));
}

// The source of the copy is a view, which doesn't create a new array.
#[test]
fn source_not_freshly_created() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    mem1 = alloc %0
    mem2 = alloc %0
    %2: [%0]i64 @ mem1 = map add %1 1
    %3: [%0]i64 @ mem1 = index %2[0:%0:1]
    %4: [%0]i64 @ mem2 = copy %3
    return %4
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(1, 2));
}

#[test]
fn parameter_blocks_are_never_eliminated() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    mem1 = alloc %0
    %2: [%0]i64 @ mem1 = copy %1
    return %2
}
",
    );
    assert!(a.table.is_empty());
}

// The slice index depends on a value read from memory after the source is
// created, so there is no way to express where the source should go.
#[test]
fn index_function_not_expressible() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = mul %0 %0
    mem1 = alloc %2
    %3: [%0][%0]i64 @ mem1 = replicate [%0][%0] 0
    mem2 = alloc %0
    %4: [%0]i64 @ mem2 = iota %0
    %5: i64 = index %1[0]
    %6: i64 = rem %5 %0
    %7: [%0][%0]i64 @ mem1 = update %3[%6, 0:%0:1] = %4
    return %7
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(2, 1));
}

// The loop body reads the destination in every iteration.
#[test]
fn loop_body_reads_destination() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = mul %0 2
    mem1 = alloc %2
    %3: [2][%0]i64 @ mem1 = replicate [2][%0] 0
    mem2 = alloc %0
    %4: [%0]i64 @ mem2 = iota %0
    mem3 = alloc %0
    %5: [%0]i64 @ mem3 = loop (%6: [%0]i64 @ mem3 = %4) for %7 < %0 {
        %8: i64 = index %6[%7]
        %9: i64 = index %3[1, %7]
        %10: i64 = add %8 %9
        %11: [%0]i64 @ mem3 = update %6[%7] = %10
        yield %11
    }
    %12: [2][%0]i64 @ mem1 = update %3[0, 0:%0:1] = %5
    return %12
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(3, 1));
}

// One arm returns an array from a parameter block, which can't be moved.
#[test]
fn branch_with_parameter_result() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0, %2: bool) {
    %3: i64 = mul %0 2
    mem1 = alloc %3
    %4: [2][%0]i64 @ mem1 = replicate [2][%0] 0
    mem2 = alloc %0
    %5: [%0]i64 @ mem2 = if %2 {
        mem3 = alloc %0
        %6: [%0]i64 @ mem3 = iota %0
        yield %6
    } else {
        yield %1
    }
    %7: [2][%0]i64 @ mem1 = update %4[1, 0:%0:1] = %5
    return %7
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(2, 1));
}

// Both pattern variables would need the same branch result block.
#[test]
fn branch_block_shared_by_two_results() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0, %2: bool) {
    mem1 = alloc %0
    mem2 = alloc %0
    mem3 = alloc %0
    mem4 = alloc %0
    %3: [%0]i64 @ mem3, %4: [%0]i64 @ mem4 = if %2 {
        mem5 = alloc %0
        %5: [%0]i64 @ mem5 = iota %0
        mem6 = alloc %0
        %6: [%0]i64 @ mem6 = map add %1 1
        yield %5, %6
    } else {
        mem7 = alloc %0
        %7: [%0]i64 @ mem7 = iota %0
        yield %7, %7
    }
    %8: [%0]i64 @ mem1 = copy %3
    %9: [%0]i64 @ mem2 = copy %4
    return %8, %9
}
",
    );
    assert!(a.table.is_empty());
    assert!(a.inhibited(3, 1));
    assert!(a.inhibited(4, 2));
}
