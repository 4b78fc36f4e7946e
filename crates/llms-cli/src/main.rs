mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, hook::HookSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "llms",
    about = "Generate character-limited LLMS documents and commit them after every commit",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .llms/ or .git/)
    #[arg(long, global = true, env = "LLMS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize llms in the current project
    Init {
        /// Also install the post-commit hook
        #[arg(long)]
        hook: bool,
    },

    /// Generate, detect changes and commit them (what the post-commit hook runs)
    Sync,

    /// Generate derived documents without staging or committing
    Generate,

    /// Show derived documents and their workflow state
    Status,

    /// List discovered source documents with their priority
    Sources,

    /// Manage the post-commit hook
    Hook {
        #[command(subcommand)]
        subcommand: HookSubcommand,
    },

    /// Inspect and validate .llms/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    // Sync runs from the hook; INFO keeps its summary visible after `git commit`.
    let default_level = match &cli.command {
        Commands::Sync | Commands::Generate => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { hook } => cmd::init::run(&root, hook),
        Commands::Sync => cmd::sync::run(&root, cli.json),
        Commands::Generate => cmd::generate::run(&root, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Sources => cmd::sources::run(&root, cli.json),
        Commands::Hook { subcommand } => cmd::hook::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
