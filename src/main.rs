//! # SPARC Search CLI (`sparc`)
//!
//! Builds facet queries, runs them against the dataset index, normalizes
//! raw index documents, and serves the portal's JSON HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! sparc --config ./config/sparc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sparc normalize <file>` | Normalize a saved search response or single hit |
//! | `sparc query` | Print the request body for a facet selection |
//! | `sparc search` | Run a facet search against the index |
//! | `sparc facets <term>` | List the values of a facet term |
//! | `sparc serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Rat hearts, second page
//! sparc search --term species --facet "Rattus norvegicus" \
//!     --term organ --facet heart --start 10
//!
//! # What the index would receive
//! sparc query --text vagus --term organ --facet stomach
//!
//! # Verbose index traffic
//! RUST_LOG=sparc_search=debug sparc serve
//! ```
//!
//! Diagnostics go to stderr; stdout carries only JSON.

mod config;
mod scicrunch;
mod search;
mod server;

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// SPARC Search: facet queries and dataset normalization for the SPARC
/// data portal.
#[derive(Parser)]
#[command(
    name = "sparc",
    about = "SPARC Search: facet queries and dataset normalization for the SPARC data portal",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sparc.toml`. `normalize` and `query` fall back
    /// to built-in defaults when the file does not exist.
    #[arg(long, global = true, default_value = "./config/sparc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Facet selection shared by `query` and `search`.
///
/// `--term` and `--facet` are paired by position.
#[derive(Args)]
struct SelectionArgs {
    /// Free-text query, AND-ed with the facet filters.
    #[arg(long)]
    text: Option<String>,

    /// Facet term (e.g. `species`, `organ`, `datasets`). Repeatable.
    #[arg(long = "term")]
    terms: Vec<String>,

    /// Facet value for the term at the same position. Repeatable.
    #[arg(long = "facet")]
    facets: Vec<String>,

    /// Page size. Defaults to `[query].default_size`.
    #[arg(long)]
    size: Option<u64>,

    /// Offset of the first result.
    #[arg(long)]
    start: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a saved search response or a single hit.
    ///
    /// The file holds either a full index response (with `hits`) or one
    /// document. Does not contact the index.
    Normalize {
        /// JSON file to read.
        file: PathBuf,
    },

    /// Print the index request body for a facet selection.
    Query {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Run a facet search and print normalized results.
    Search {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// List the values of a facet term with document counts.
    Facets {
        /// Facet term, e.g. `species`.
        term: String,
    },

    /// Start the HTTP server.
    Serve {
        /// Bind address, overriding `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

impl SelectionArgs {
    fn into_selection(self) -> sparc_search_core::query::FacetSelection {
        search::selection_from_args(self.text, self.terms, self.facets, self.size, self.start)
    }
}

/// Load the config, or fall back to defaults when the file is absent.
fn load_or_minimal(path: &Path) -> anyhow::Result<config::Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(config::Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Normalize { file } => {
            let cfg = load_or_minimal(&cli.config)?;
            search::run_normalize(&cfg, &file)?;
        }
        Commands::Query { selection } => {
            let cfg = load_or_minimal(&cli.config)?;
            search::run_query(&cfg, &selection.into_selection())?;
        }
        Commands::Search { selection } => {
            let cfg = config::load_config(&cli.config)?;
            search::run_search(&cfg, &selection.into_selection()).await?;
        }
        Commands::Facets { term } => {
            let cfg = config::load_config(&cli.config)?;
            search::run_facets(&cfg, &term).await?;
        }
        Commands::Serve { bind } => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg, bind.as_deref()).await?;
        }
    }

    Ok(())
}
