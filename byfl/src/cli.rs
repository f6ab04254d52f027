//! Command-line surface, following `samply/src/cli.rs`'s `Opt` /
//! `Action` subcommand layout: one top-level `Parser` struct holding a
//! `Subcommand` enum, with shared option groups pulled in via
//! `#[command(flatten)]`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use byfl_pass::PassConfig;

#[derive(Debug, Parser)]
#[command(
    name = "byfl",
    version,
    about = "Runs a synthetic instrumented workload or dumps a byfl binary output file back to text"
)]
pub struct Opt {
    #[command(subcommand)]
    pub action: Action,
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// Instrument and run a small synthetic workload, writing its counters
    /// to a binary output file.
    Run(RunArgs),

    /// Parse a binary output file and print its tables as text.
    Dump(DumpArgs),
}

/// Which canned synthetic workload to instrument and run.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WorkloadKind {
    /// A tight scalar int load/store loop, one basic block, RETURN terminator.
    ScalarLoop,
    /// A loop of float vector arithmetic.
    VectorMath,
    /// A function that calls `memcpy` on a large buffer.
    Memcpy,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Which synthetic workload to instrument and run.
    #[arg(long, value_enum, default_value = "scalar-loop")]
    pub workload: WorkloadKind,

    /// Path to write the binary output file to.
    #[arg(long, short, default_value = "byfl.byfl")]
    pub output: PathBuf,

    #[command(flatten)]
    pub pass_config: PassConfig,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Path to the binary output file to parse.
    pub file: PathBuf,

    /// Block on EOF and keep tailing the file instead of stopping, for
    /// inspecting a still-running writer.
    #[arg(long)]
    pub live: bool,
}
