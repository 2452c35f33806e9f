use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;
mod output;

use commands::{bake, dt, dump, header, info, patch, transform, upgrade};

#[derive(Parser)]
#[command(
    name = "subtool",
    about = "Manipulation toolkit for MWA sub-observation voltage files",
    version,
    long_about = "Read, inspect, rewrite and transform MWAX subfiles: voltage data blocks, \
                  delay tables, packet maps and margin samples."
)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the derived geometry of a subfile
    Info(info::InfoArgs),

    /// Show the header fields of a subfile
    Show(info::ShowArgs),

    /// Print one header field
    Get(header::GetArgs),

    /// Set a header field in place
    Set(header::SetArgs),

    /// Remove a header field in place
    Unset(header::UnsetArgs),

    /// Show, convert or compare delay tables
    Dt(dt::DtArgs),

    /// Dump a section, block or source line
    Dump(dump::DumpArgs),

    /// Rewrite a subfile with a new delay table applied
    Repoint(transform::RepointArgs),

    /// Rewrite a subfile with source streams reassigned
    Replace(transform::ReplaceArgs),

    /// Rewrite a subfile with per-sample transforms applied
    Resample(transform::ResampleArgs),

    /// Apply fractional delays into the sample streams in place
    Bake(bake::BakeArgs),

    /// Splice a section from an external file in place
    Patch(patch::PatchArgs),

    /// Upgrade a v1 subfile to v2 in place
    Upgrade(upgrade::UpgradeArgs),
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Info(args) => info::run_info(args),
        Commands::Show(args) => info::run_show(args),
        Commands::Get(args) => header::run_get(args),
        Commands::Set(args) => header::run_set(args),
        Commands::Unset(args) => header::run_unset(args),
        Commands::Dt(args) => dt::run(args),
        Commands::Dump(args) => dump::run(args),
        Commands::Repoint(args) => transform::run_repoint(args),
        Commands::Replace(args) => transform::run_replace(args),
        Commands::Resample(args) => transform::run_resample(args),
        Commands::Bake(args) => bake::run(args),
        Commands::Patch(args) => patch::run(args),
        Commands::Upgrade(args) => upgrade::run(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
