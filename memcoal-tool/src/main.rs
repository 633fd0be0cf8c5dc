use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arbitrary::Unstructured;
use clap::Parser;
use memcoal::debug_utils::{self, ArbitraryFunctionConfig, GenericFunction};
use memcoal::last_use::LastUseTable;
use memcoal::{Coalescer, Options};
use rand::{Rng, RngCore};

#[derive(Parser)]
/// Tool for testing memcoal.
enum Args {
    /// Run the coalescing analysis on a given function.
    Analyze {
        /// Print the input function and the rewritten function.
        #[clap(short = 'v')]
        verbose: bool,

        /// Check that the result preserves the meaning of the function by
        /// interpreting it on random inputs before and after rewriting.
        #[clap(long)]
        check: bool,

        /// Number of random inputs to check with.
        #[clap(long, default_value_t = 8)]
        check_runs: usize,

        /// File containing the function to analyze.
        function: PathBuf,

        /// Coalescing options.
        #[clap(flatten)]
        options: Options,
    },

    /// Generate a random function.
    GenFunction {
        /// Maximum number of scalar parameters.
        #[clap(long, default_value_t = 2)]
        scalar_params: usize,

        /// Maximum number of array parameters.
        #[clap(long, default_value_t = 2)]
        array_params: usize,

        /// Maximum number of statements per body.
        ///
        /// Some bodies may exceed this limit since extra statements are added
        /// to produce the results a body must yield.
        #[clap(long, default_value_t = 10)]
        stmts_per_body: usize,

        /// Maximum nesting depth of `if` and loop statements.
        #[clap(long, default_value_t = 2)]
        max_depth: usize,

        /// Maximum number of loop iterations.
        #[clap(long, default_value_t = 3)]
        loop_iterations: i64,
    },

    /// Parses the given function and re-dumps it with proper formatting.
    ///
    /// Note that this will strip all comments.
    FmtFunction {
        /// File containing the function definition.
        function: PathBuf,
    },
}

fn load_function(path: &Path) -> Result<GenericFunction> {
    let function = fs::read(path).context("could not read function input file")?;
    let function = String::from_utf8(function).context("function input is not UTF-8")?;
    let function =
        GenericFunction::parse(&function).context("could not parse function input file")?;
    debug_utils::validate_function(&function).context("function validation failed")?;
    Ok(function)
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    match args {
        Args::Analyze {
            verbose,
            check,
            check_runs,
            ref function,
            ref options,
        } => {
            let function = load_function(function)?;

            if verbose {
                println!(
                    "================ Input function ================\n{}",
                    debug_utils::DisplayFunction(&function)
                );
            }

            let last_uses = LastUseTable::compute(&function);
            let mut coalescer = Coalescer::new();
            let output = coalescer
                .run(&function, &last_uses, options)
                .map_err(|e| anyhow::anyhow!("{e}"))?;

            println!("================ Output ================\n{output}");
            println!("{}", output.stats());

            if verbose {
                println!(
                    "================ Rewritten function ================\n{}",
                    debug_utils::apply_coalescing(&function, output.table())
                );
            }

            if check {
                let mut rng = rand::rng();
                for _ in 0..check_runs {
                    let args = debug_utils::make_inputs(&function, || rng.random_range(1..=4))
                        .context("could not build inputs")?;
                    debug_utils::check_coalescing(&function, output.table(), &args)
                        .context("coalescing result failed checker")?;
                }
            }
        }
        Args::GenFunction {
            scalar_params,
            array_params,
            stmts_per_body,
            max_depth,
            loop_iterations,
        } => {
            let config = ArbitraryFunctionConfig {
                scalar_params: 0..=scalar_params,
                array_params: 0..=array_params,
                stmts_per_body: 1..=stmts_per_body,
                max_depth,
                loop_iterations: 0..=loop_iterations,
                ..ArbitraryFunctionConfig::default()
            };
            let mut bytes = [0; 4096];
            rand::rng().fill_bytes(&mut bytes);
            let function =
                GenericFunction::arbitrary_with_config(&mut Unstructured::new(&bytes), config)
                    .context("failed to generate arbitrary function")?;

            println!("{}", debug_utils::DisplayFunction(&function));
        }
        Args::FmtFunction { ref function } => {
            let function = load_function(function)?;

            println!("{}", debug_utils::DisplayFunction(&function));
        }
    }
    Ok(())
}
