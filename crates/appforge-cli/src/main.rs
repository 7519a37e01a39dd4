mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{recipe::RecipeSubcommand, tenant::TenantSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "appforge",
    about = "Provision tenants and deploy their recipes to the managed cloud platform",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .appforge/)
    #[arg(long, global = true, env = "APPFORGE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize appforge in the current project
    Init {
        /// Control plane URL; selects the http gateway (default: in-memory gateway)
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Manage tenants
    Tenant {
        #[command(subcommand)]
        subcommand: TenantSubcommand,
    },

    /// Inspect and configure recipes
    Recipe {
        #[command(subcommand)]
        subcommand: RecipeSubcommand,
    },

    /// Deploy every pending recipe of a tenant and wait for the worker
    Deploy {
        tenant: String,
        /// Override the region from APPFORGE_REGION / config
        #[arg(long)]
        region: Option<String>,
    },

    /// Repair recipes and gates left behind by an interrupted process
    Recover,

    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "8470")]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Deploy { .. } => tracing::Level::INFO,
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
        Commands::Init { endpoint } => cmd::init::run(&root, endpoint.as_deref()),
        Commands::Tenant { subcommand } => cmd::tenant::run(&root, subcommand, cli.json),
        Commands::Recipe { subcommand } => cmd::recipe::run(&root, subcommand, cli.json),
        Commands::Deploy { tenant, region } => {
            cmd::deploy::run(&root, &tenant, region.as_deref(), cli.json)
        }
        Commands::Recover => cmd::recover::run(&root, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
