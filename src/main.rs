use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

use cli::features::cmd_features;
use cli::generate::cmd_generate;
use cli::lower::cmd_lower;
use cli::sample::cmd_sample;

#[derive(Parser)]
#[command(
    name = "hwnas",
    version,
    about = "Hardware-aware CNN search: synthesize, lower, render HLS"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize one architecture and write its HLS design
    Generate {
        /// JSON config file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Random seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// File stem for the design (default: design_seed<N>)
        #[arg(long)]
        stem: Option<String>,
    },
    /// Synthesize a batch from consecutive seeds, with a manifest
    Sample {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// First seed; candidate i uses seed + i
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Number of candidates
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Lower a hand-written architecture JSON to an HLS design
    Lower {
        /// Architecture JSON file
        input: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output .cpp file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the instruction stream instead of C++
        #[arg(long)]
        listing: bool,
    },
    /// Print the cost-predictor feature vector of an architecture JSON
    Features {
        /// Architecture JSON file
        input: PathBuf,
        /// Print named fields as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Generate {
            config,
            seed,
            output,
            stem,
        } => cmd_generate(config, seed, output, stem),
        Command::Sample {
            config,
            seed,
            count,
            output,
        } => cmd_sample(config, seed, count, output),
        Command::Lower {
            input,
            config,
            output,
            listing,
        } => cmd_lower(input, config, output, listing),
        Command::Features { input, json } => cmd_features(input, json),
    }
}
