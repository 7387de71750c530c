//! Keel CLI - apply and remove feature sets on a Kubernetes cluster

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod commands;
mod display;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "keel")]
#[command(author = "Keel Contributors")]
#[command(version)]
#[command(about = "Apply and remove feature sets on a Kubernetes cluster", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every feature of a feature set, in declaration order
    Apply {
        /// Installer spec file
        #[arg(short, long)]
        config: PathBuf,

        /// Feature set file
        #[arg(short, long)]
        features: PathBuf,

        /// Set template values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,
    },

    /// Clean up every feature of a feature set, last declared first
    Delete {
        /// Installer spec file
        #[arg(short, long)]
        config: PathBuf,

        /// Feature set file
        #[arg(short, long)]
        features: PathBuf,

        /// Set template values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,
    },

    /// Render manifests locally
    Render {
        /// Installer spec file
        #[arg(short, long)]
        config: PathBuf,

        /// Manifest files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Set template values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Cluster domain to render with
        #[arg(long)]
        domain: Option<String>,

        /// Output directory (if not set, outputs to stdout)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

/// Initialize tracing on stderr so stdout only carries command output
fn init_tracing(debug: bool) {
    let default = if debug { "keel=debug,keel_kube=debug,keel_engine=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Apply {
            config,
            features,
            set,
        } => commands::apply::run(&config, &features, &set).await,

        Commands::Delete {
            config,
            features,
            set,
        } => commands::delete::run(&config, &features, &set).await,

        Commands::Render {
            config,
            paths,
            set,
            domain,
            output_dir,
        } => commands::render::run(
            &config,
            &paths,
            &set,
            domain.as_deref(),
            output_dir.as_deref(),
        ),
    };

    let code = match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            code
        }
    };
    std::process::exit(code);
}
