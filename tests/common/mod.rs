//! Helpers shared by the integration tests.

#![allow(dead_code)]

use memcoal::debug_utils::{self, GenericFunction};
use memcoal::function::{Mem, Var};
use memcoal::last_use::LastUseTable;
use memcoal::output::{CoalesceTable, InhibitTable};
use memcoal::{Coalescer, CoalescingLevel, Options};

/// Results of analyzing one fixture.
pub struct Analyzed {
    pub func: GenericFunction,
    pub table: CoalesceTable,
    pub inhibit: InhibitTable,
    pub iterations: usize,
    pub dump: String,
}

impl Analyzed {
    /// Destination block of `mem`, if it is eliminated.
    pub fn dst(&self, mem: usize) -> Option<usize> {
        self.table.get(Mem::new(mem)).map(|entry| entry.dst().index())
    }

    /// Returns whether `var` was given a new location.
    pub fn is_coalesced(&self, var: usize) -> bool {
        self.table.target(Var::new(var)).is_some()
    }

    /// Returns whether merging `src` into `dst` was rejected.
    pub fn inhibited(&self, src: usize, dst: usize) -> bool {
        self.inhibit
            .get(&Mem::new(src))
            .is_some_and(|dsts| dsts.contains(&Mem::new(dst)))
    }

    /// Sorted list of eliminated blocks.
    pub fn eliminated(&self) -> Vec<usize> {
        self.table.iter().map(|(mem, _)| mem.index()).collect()
    }
}

pub fn parse(src: &str) -> GenericFunction {
    let func = GenericFunction::parse(src).unwrap();
    debug_utils::validate_function(&func).unwrap();
    func
}

pub fn analyze_with(src: &str, level: CoalescingLevel) -> Analyzed {
    let _ = pretty_env_logger::try_init();
    let func = parse(src);
    let last_uses = LastUseTable::compute(&func);
    let mut coalescer = Coalescer::new();
    let output = coalescer.run(&func, &last_uses, &Options { level }).unwrap();
    let table = output.table().clone();
    let inhibit = output.inhibited().clone();
    let iterations = output.iterations();
    let dump = output.to_string();
    Analyzed {
        func,
        table,
        inhibit,
        iterations,
        dump,
    }
}

/// Analyzes `src` and checks that the result preserves its meaning.
pub fn analyze(src: &str) -> Analyzed {
    let analyzed = analyze_with(src, CoalescingLevel::Full);
    check_sound(&analyzed);
    analyzed
}

/// Interprets the function before and after rewriting on a few inputs.
pub fn check_sound(analyzed: &Analyzed) {
    let rewritten = debug_utils::apply_coalescing(&analyzed.func, &analyzed.table);
    debug_utils::validate_function(&rewritten).unwrap();
    for seed in 0..4 {
        let mut n = seed;
        let args = debug_utils::make_inputs(&analyzed.func, || {
            n = n % 4 + 1;
            n
        })
        .unwrap();
        debug_utils::check_coalescing(&analyzed.func, &analyzed.table, &args).unwrap();
    }
}
