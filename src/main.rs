use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dlsync::{run, DlSyncError, ErrorKind, Operation, RunOptions};

#[derive(Parser)]
#[command(name = "dlsync")]
#[command(author, version, about = "Dependency-aware deployment of database object scripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory of the script tree
    #[arg(short, long, env = "SCRIPT_ROOT", global = true, default_value = ".")]
    script_root: PathBuf,

    /// Parameter profile (parameter-<profile>.properties)
    #[arg(short, long, env = "profile", global = true)]
    profile: Option<String>,

    /// Ledger file recording deployed scripts
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// File the executed SQL is written to
    #[arg(long, global = true)]
    plan: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy changed scripts in dependency order
    Deploy {
        /// Record hashes without executing anything
        #[arg(long)]
        only_hashes: bool,
    },
    /// Roll back migrations removed from the scripts
    Rollback,
    /// Verify deployed objects against the scripts
    Verify,
    /// Export database objects as script files
    CreateScript {
        /// Schemas to export (all schemas of the database by default)
        #[arg(long, value_delimiter = ',')]
        schemas: Option<Vec<String>>,
    },
    /// Record lineage between objects
    CreateLineage,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_target(false))
        .init();
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<DlSyncError>() {
        Some(DlSyncError::VerificationFailed { .. }) => 5,
        Some(err) => match err.kind() {
            ErrorKind::Io => 2,
            ErrorKind::Execution => 3,
            ErrorKind::Configuration => 4,
            ErrorKind::Validation | ErrorKind::CyclicDependency => 5,
        },
        None => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let operation = match cli.command {
        Commands::Deploy { only_hashes } => Operation::Deploy { only_hashes },
        Commands::Rollback => Operation::Rollback,
        Commands::Verify => Operation::Verify,
        Commands::CreateScript { schemas } => Operation::CreateScript { schemas },
        Commands::CreateLineage => Operation::CreateLineage,
    };
    let options = RunOptions {
        script_root: cli.script_root,
        profile: cli.profile,
        ledger_path: cli.ledger,
        plan_path: cli.plan,
        operation,
    };

    match run(options).map_err(anyhow::Error::from) {
        Ok(count) => {
            tracing::info!("Done, {} changes", count);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}
