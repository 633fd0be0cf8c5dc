//! End-to-end coalescing of the basic kinds of opportunities.

mod common;

use common::analyze;
use memcoal::function::Var;
use memcoal::output::CoalescedKind;

#[test]
fn copy_is_eliminated() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    mem1 = alloc %0
    mem2 = alloc %0
    %2: [%0]i64 @ mem1 = map add %1 1
    %3: [%0]i64 @ mem2 = copy %2
    return %3
}
",
    );
    assert_eq!(a.eliminated(), [1]);
    assert_eq!(a.dst(1), Some(2));
    let record = a.table.target(Var::new(2)).unwrap();
    assert_eq!(record.kind(), CoalescedKind::Copy);
    assert!(record.ixfun().is_direct());
    assert!(a.inhibit.is_empty());
    assert_eq!(a.iterations, 1);
}

#[test]
fn update_places_source_in_slice() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = mul %0 2
    mem1 = alloc %2
    %3: [2][%0]i64 @ mem1 = replicate [2][%0] 0
    mem2 = alloc %0
    %4: [%0]i64 @ mem2 = map mul %1 3
    %5: [2][%0]i64 @ mem1 = update %3[1, 0:%0:1] = %4
    return %5
}
",
    );
    assert_eq!(a.eliminated(), [2]);
    let record = a.table.target(Var::new(4)).unwrap();
    assert_eq!(record.kind(), CoalescedKind::InPlace);
    assert_eq!(record.ixfun().to_string(), "lmad(base [2, %0]; offset [1, 0]; dims [1:1:%0])");
}

#[test]
fn concat_operands_are_placed_side_by_side() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = mul %0 2
    mem1 = alloc %2
    mem2 = alloc %0
    %3: [%0]i64 @ mem2 = map add %1 1
    mem3 = alloc %0
    %4: [%0]i64 @ mem3 = iota %0
    %5: [%2]i64 @ mem1 = concat %3, %4
    return %5
}
",
    );
    assert_eq!(a.eliminated(), [2, 3]);
    assert_eq!(a.dst(2), Some(1));
    assert_eq!(a.dst(3), Some(1));
    let first = a.table.target(Var::new(3)).unwrap();
    let second = a.table.target(Var::new(4)).unwrap();
    assert_eq!(first.kind(), CoalescedKind::Concat);
    assert_eq!(first.ixfun().to_string(), "lmad(base [%2]; offset [0]; dims [0:1:%0])");
    assert_eq!(second.ixfun().to_string(), "lmad(base [%2]; offset [%0]; dims [0:1:%0])");
}

#[test]
fn chained_copies_go_to_the_final_block() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    mem1 = alloc %0
    mem2 = alloc %0
    mem3 = alloc %0
    %2: [%0]i64 @ mem1 = map add %1 1
    %3: [%0]i64 @ mem2 = copy %2
    %4: [%0]i64 @ mem3 = copy %3
    return %4
}
",
    );
    assert_eq!(a.eliminated(), [1, 2]);
    assert_eq!(a.dst(1), Some(3));
    assert_eq!(a.dst(2), Some(3));
    assert_eq!(
        a.table.target(Var::new(2)).unwrap().kind(),
        CoalescedKind::Transitive
    );
}

#[test]
fn rearranged_source_is_placed_through_its_alias() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0][%0]i64 @ mem0) {
    %2: i64 = mul %0 %0
    mem1 = alloc %2
    mem2 = alloc %2
    %3: [%0][%0]i64 @ mem1 = map add %1 1
    %4: [%0][%0]i64 @ mem1 = rearrange %3 (1, 0)
    %5: [%0][%0]i64 @ mem2 = copy %4
    return %5
}
",
    );
    assert_eq!(a.eliminated(), [1]);
    assert!(a.is_coalesced(3));
    assert!(a.is_coalesced(4));
    // %3 is written transposed so that %4 ends up in row-major order.
    assert!(!a.table.target(Var::new(3)).unwrap().ixfun().is_direct());
    assert!(a.table.target(Var::new(4)).unwrap().ixfun().is_direct());
}

// A loop whose carried array is updated in place and whose result ends up in
// a row of a larger array.
#[test]
fn loop_carried_array_and_initializer() {
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
        %9: i64 = add %8 %7
        %10: [%0]i64 @ mem3 = update %6[%7] = %9
        yield %10
    }
    %11: [2][%0]i64 @ mem1 = update %3[0, 0:%0:1] = %5
    return %11
}
",
    );
    assert_eq!(a.eliminated(), [2, 3]);
    assert_eq!(a.dst(2), Some(1));
    assert_eq!(a.dst(3), Some(1));
    for var in [4, 5, 6, 10] {
        assert!(a.is_coalesced(var), "%{var} not coalesced");
    }
}

// Both arms build the result differently and each arm's block follows the
// pattern into the destination.
#[test]
fn branch_results_follow_the_pattern() {
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
        mem4 = alloc %0
        %7: [%0]i64 @ mem4 = map mul %1 2
        yield %7
    }
    %8: [2][%0]i64 @ mem1 = update %4[1, 0:%0:1] = %5
    return %8
}
",
    );
    assert_eq!(a.eliminated(), [2, 3, 4]);
    for mem in [2, 3, 4] {
        assert_eq!(a.dst(mem), Some(1));
    }
    let ixfun = a.table.target(Var::new(5)).unwrap().ixfun();
    assert_eq!(a.table.target(Var::new(6)).unwrap().ixfun(), ixfun);
    assert_eq!(a.table.target(Var::new(7)).unwrap().ixfun(), ixfun);
}

// The slice index is only known after the source is created, but it can be
// recomputed from variables that are in scope there.
#[test]
fn index_function_is_translated() {
    let a = analyze(
        "
fn f(mem0: mem, %0: i64, %1: [%0]i64 @ mem0) {
    %2: i64 = mul %0 %0
    mem1 = alloc %2
    %3: [%0][%0]i64 @ mem1 = replicate [%0][%0] 0
    mem2 = alloc %0
    %4: [%0]i64 @ mem2 = iota %0
    %5: i64 = add %0 1
    %6: i64 = rem %5 %0
    %7: [%0][%0]i64 @ mem1 = update %3[%6, 0:%0:1] = %4
    return %7
}
",
    );
    assert_eq!(a.eliminated(), [2]);
    let record = a.table.target(Var::new(4)).unwrap();
    assert_eq!(record.subst().keys().copied().collect::<Vec<_>>(), [Var::new(6)]);
    let mut free = vec![];
    record.ixfun().for_each_free_var(|var| free.push(var));
    assert!(free.iter().all(|&var| var == Var::new(0)));
}
