mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "steady", about = "Motion registration for two-photon imaging movies")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register one or more sessions described by TOML config files
    Register(commands::register::RegisterArgs),
    /// Print or save the default registration config
    Config(commands::config::ConfigArgs),
    /// Show the block grid a config produces
    Blocks(commands::blocks::BlocksArgs),
    /// Show binary movie or session record details
    Info(commands::info::InfoArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Register(args) => commands::register::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Blocks(args) => commands::blocks::run(args),
        Commands::Info(args) => commands::info::run(args),
    }
}
