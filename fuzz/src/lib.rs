use std::fmt;

use arbitrary::{Arbitrary, Result, Unstructured};
use memcoal::Options;
use memcoal::debug_utils::{self, GenericFunction, Value};

/// Common implementation of a test case used by all fuzz targets.
pub struct TestCase {
    pub func: GenericFunction,
    pub options: Options,

    /// Raw material for the scalar inputs of the function. Array extents are
    /// derived from these so they are kept small.
    pub seeds: Vec<u8>,
}

impl TestCase {
    /// Builds a set of arguments for the function from the seeds, cycling
    /// through them as needed.
    pub fn inputs(&self) -> Vec<Value> {
        let mut seeds = self.seeds.iter().copied().cycle();
        debug_utils::make_inputs(&self.func, || {
            seeds.next().map_or(1, |seed| i64::from(seed % 5))
        })
        .unwrap()
    }
}

impl Arbitrary<'_> for TestCase {
    fn arbitrary(u: &mut Unstructured<'_>) -> Result<Self> {
        // Ensure the logger is initialized.
        let _ = pretty_env_logger::try_init();

        let options = u.arbitrary()?;
        log::trace!("Using options: {options:?}");
        let seeds = u.arbitrary()?;
        let func = GenericFunction::arbitrary_with_config(u, Default::default())?;
        Ok(TestCase {
            func,
            options,
            seeds,
        })
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Options: {:?}", self.options)?;
        writeln!(f, "Seeds: {:?}", self.seeds)?;
        writeln!(f, "{}", self.func)
    }
}
