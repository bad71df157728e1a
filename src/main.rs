use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use storbench::cli::RangeMode;
use storbench::commands::{self, RunOptions};
use storbench::{config, logging};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Test scenarios to run: comma separated names from the scenarios directory, or paths to scenario files
    #[arg(short = 't', long = "test", value_delimiter = ',')]
    tests: Vec<String>,

    /// List available test scenarios
    #[arg(short = 'l', long)]
    list: bool,

    /// Record random ranges during full downloads (same as --ranges generate)
    #[arg(short = 'g', long = "generate-ranges")]
    generate_ranges: bool,

    /// Random ranges: auto (as the scenario says), generate, replay, off
    #[arg(long = "ranges", value_enum, default_value = "auto")]
    ranges: RangeMode,

    /// Path to the config file (default: ./storbench.toml when present)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Download rate limit in bytes per second (e.g., 1048576 for 1MB/s)
    #[arg(short = 'r', long)]
    rate_limit: Option<u32>,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.verbose)?;

    let mut config = config::load(args.config.as_deref())?;
    if args.rate_limit.is_some() {
        config.rate_limit = args.rate_limit;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if args.list {
            return commands::list_scenarios(&config).await;
        }
        if args.tests.is_empty() {
            println!("You need to specify at least one test scenario. See usage with -h or --help option.");
            return Ok(());
        }

        let range_mode = if args.generate_ranges {
            RangeMode::Generate
        } else {
            args.ranges
        };
        let options = RunOptions {
            range_mode,
            show_progress: !args.no_progress,
        };
        commands::run_scenarios(&config, &args.tests, options).await
    })
}
