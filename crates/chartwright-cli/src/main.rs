//! Chartwright CLI - render Go-templated charts locally

use clap::{Parser, Subcommand};
use miette::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "chartwright")]
#[command(author = "Chartwright Contributors")]
#[command(version)]
#[command(about = "Render Go-templated Kubernetes charts", long_about = None)]
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
    /// Render chart templates locally
    Template {
        /// Release name (for template context)
        name: String,

        /// Chart path
        chart: PathBuf,

        /// Values file(s) to merge
        #[arg(short = 'f', long = "values")]
        values: Vec<PathBuf>,

        /// Set values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Target namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Show only templates whose path contains this text
        #[arg(short = 's', long)]
        show_only: Option<String>,

        /// Render template files in parallel
        #[arg(long)]
        parallel: bool,

        /// Show the user-supplied values before the manifests
        #[arg(long)]
        show_values: bool,
    },
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Commands::Template {
            name,
            chart,
            values,
            set,
            namespace,
            show_only,
            parallel,
            show_values,
        } => commands::template::run(&commands::template::TemplateArgs {
            name: &name,
            chart_path: &chart,
            values_files: &values,
            set_values: &set,
            namespace: &namespace,
            show_only: show_only.as_deref(),
            parallel,
            show_values,
        }),
    }
}
