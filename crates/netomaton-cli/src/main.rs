//! Netomaton CLI - run network automata from the command line.
//!
//! Ships a handful of classic models (Collatz, logistic map, elementary
//! cellular automata) and runs JSON run descriptions with a built-in rule.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod rules;

use commands::{collatz, config as config_cmd, eca, logistic, run};
use config::Config;
use rules::BuiltinRule;

/// Netomaton CLI - evolve network automata.
#[derive(Parser, Debug)]
#[command(
    name = "ntm",
    author,
    version,
    about = "Netomaton: evolve network automata and record their trajectories",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Save the trajectory under <OUTPUT>/.netomaton/
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Seed for perturbations, connectivity rules and shuffled visitation
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Node visitation strategy: sequential, shuffled or parallel
    #[arg(long, global = true)]
    execution: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Iterate the Collatz map on a single node until it reaches 1.
    Collatz {
        /// Starting value.
        #[arg(long, default_value_t = 27)]
        start: u64,
    },

    /// Iterate the logistic map on a single self-connected node.
    Logistic {
        /// Growth rate r.
        #[arg(long, default_value_t = 3.8)]
        rate: f64,

        /// Number of recorded states, the initial one included.
        #[arg(long, default_value_t = 20)]
        steps: u64,

        /// Initial value x0.
        #[arg(long, default_value_t = 0.5)]
        initial: f64,
    },

    /// Run an elementary cellular automaton on a ring and print the grid.
    Eca {
        /// Wolfram rule number.
        #[arg(long, default_value_t = 30)]
        rule: u8,

        /// Number of cells.
        #[arg(long, default_value_t = 31)]
        width: usize,

        /// Number of recorded rows, the initial one included.
        #[arg(long, default_value_t = 16)]
        steps: u64,

        /// Use the second-order reversible variant of the rule.
        #[arg(long)]
        reversible: bool,
    },

    /// Evolve a JSON run description with a built-in rule.
    Run {
        /// Path to the run description.
        description: PathBuf,

        /// identity, majority, logistic, collatz or eca:<n>.
        #[arg(long, default_value = "identity")]
        rule: BuiltinRule,
    },

    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Configuration commands.
#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration.
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    // RUST_LOG wins over the verbosity flags
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(execution) = cli.execution {
        config.execution = Some(execution);
    }
    let output = cli.output.or_else(|| config.output_dir.clone());
    let output = output.as_deref();

    match cli.command {
        Commands::Collatz { start } => collatz::execute(&config, output, start),
        Commands::Logistic {
            rate,
            steps,
            initial,
        } => logistic::execute(&config, output, rate, steps, initial),
        Commands::Eca {
            rule,
            width,
            steps,
            reversible,
        } => eca::execute(&config, output, rule, width, steps, reversible),
        Commands::Run { description, rule } => run::execute(&config, output, &description, rule),
        Commands::Config(ConfigCommands::Show) => config_cmd::show(&config),
    }
}
