//! Analysis of randomly generated functions from a fixed set of seeds.

use arbitrary::Unstructured;
use memcoal::debug_utils::{self, ArbitraryFunctionConfig, GenericFunction};
use memcoal::last_use::LastUseTable;
use memcoal::{Coalescer, Options};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

const RUNS: u64 = 300;

#[test]
fn generated_functions_keep_their_meaning() {
    let _ = pretty_env_logger::try_init();
    let mut coalescer = Coalescer::new();
    let mut coalesced = 0;
    for seed in 0..RUNS {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut bytes = vec![0; 4096];
        rng.fill_bytes(&mut bytes);
        let mut u = Unstructured::new(&bytes);
        let func =
            GenericFunction::arbitrary_with_config(&mut u, ArbitraryFunctionConfig::default())
                .unwrap();
        debug_utils::validate_function(&func).unwrap();

        let last_uses = LastUseTable::compute(&func);
        let output = coalescer
            .run(&func, &last_uses, &Options::default())
            .unwrap();
        if !output.table().is_empty() {
            coalesced += 1;
        }

        let rewritten = debug_utils::apply_coalescing(&func, output.table());
        if let Err(e) = debug_utils::validate_function(&rewritten) {
            panic!("seed {seed}: invalid rewrite: {e}\n{func}\n{output}");
        }
        for _ in 0..4 {
            let args = debug_utils::make_inputs(&func, || rng.random_range(1..=4)).unwrap();
            if let Err(e) = debug_utils::check_coalescing(&func, output.table(), &args) {
                panic!("seed {seed}: {e}\n{func}\n{output}");
            }
        }
    }
    assert!(
        coalesced * 10 >= RUNS,
        "only {coalesced} of {RUNS} functions were coalesced"
    );
}
