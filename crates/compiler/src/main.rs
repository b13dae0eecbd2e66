//! Hybrid MPI/OpenMP parallelizer CLI
//!
//! Command-line interface for transforming C/C++ translation units
//! into MPI/OpenMP-instrumented equivalents and for running the
//! analysis passes standalone.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use hybridc::{ConfigFile, TransformConfig};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "hybridc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hybrid MPI/OpenMP parallelizer for C/C++ translation units", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform a translation unit and write the parallelized output
    Transform {
        /// Input C/C++ source file
        input: PathBuf,

        /// Output path (defaults to enhanced_hybrid_mpi_openmp_output.cpp)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable OpenMP loop parallelization (MPI grouping still runs)
        #[arg(long = "no-loops")]
        no_loops: bool,

        /// Emit an OpenMP-only rendition of the input (no MPI scaffolding)
        #[arg(long = "openmp-only", conflicts_with = "no_loops")]
        openmp_only: bool,

        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Suppress the analysis report
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run the analysis passes and print the report without emitting
    Analyze {
        /// Input C/C++ source file
        input: PathBuf,

        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Transform {
            input,
            output,
            no_loops,
            openmp_only,
            config,
            quiet,
        } => {
            let mut config = load_config(config.as_deref());
            if let Some(output) = output {
                config.output_path = output;
            }
            if no_loops {
                config.parallelize_loops = false;
            }
            config.openmp_only = openmp_only;
            config.quiet = quiet;
            run_transform(&input, &config);
        }
        Commands::Analyze {
            input,
            config,
            json,
        } => {
            let config = load_config(config.as_deref());
            run_analyze(&input, &config, json);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "hybridc", &mut io::stdout());
        }
    }
}

/// Build the effective configuration: defaults overlaid with the
/// optional TOML file.
fn load_config(path: Option<&Path>) -> TransformConfig {
    let mut config = TransformConfig::default();
    if let Some(path) = path {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error reading config {}: {}", path.display(), e);
                process::exit(1);
            }
        };
        match ConfigFile::from_toml(&content) {
            Ok(file) => config.merge_file(file),
            Err(e) => {
                eprintln!("Error parsing config {}: {}", path.display(), e);
                process::exit(1);
            }
        }
    }
    config
}

fn run_transform(input: &Path, config: &TransformConfig) {
    match hybridc::transform_file(input, config) {
        Ok(output) => {
            if !config.quiet {
                print!("{}", hybridc::report::render(&output.analysis));
            }
            println!(
                "Parallelized {} -> {}",
                input.display(),
                config.output_path.display()
            );
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_analyze(input: &Path, config: &TransformConfig, json: bool) {
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };
    match hybridc::analyze_source(&source, config) {
        Ok(analysis) => {
            if json {
                println!("{}", hybridc::report::render_json(&analysis));
            } else {
                print!("{}", hybridc::report::render(&analysis));
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
