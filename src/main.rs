use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{debug, info};
use std::path::PathBuf;

use goas_rust::{run, Config, DEFAULT_OUTPUT_DIR};

/// Generate OpenAPI 3.x documents from annotations in Go sources
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate openapi.json
    Init {
        /// Directories to parse, comma separated
        #[arg(short, long, default_value = "./")]
        dir: String,

        /// Output directory for the generated document
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output: String,

        /// Directories to exclude, comma separated
        #[arg(long = "exclude-dir")]
        exclude_dir: Option<String>,

        /// OpenAPI version written to the document (overrides @openapi)
        #[arg(long = "oas")]
        openapi_version: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env = Env::default().filter_or("RUST_LOG", if cli.verbose { "debug" } else { "info" });
    env_logger::init_from_env(env);

    debug!("Starting goas...");

    match cli.command {
        Commands::Init {
            dir,
            output,
            exclude_dir,
            openapi_version,
        } => {
            let config = Config {
                dirs: split_paths(&dir),
                exclude_dirs: exclude_dir.as_deref().map(split_paths).unwrap_or_default(),
                output: PathBuf::from(&output),
                openapi_version,
            };
            debug!("Directories to parse: {:?}", config.dirs);
            if !config.exclude_dirs.is_empty() {
                debug!("Directories to exclude: {:?}", config.exclude_dirs);
            }

            let path = run(&config)
                .with_context(|| format!("Failed to generate OpenAPI document from {}", dir))?;
            info!("OpenAPI documentation written to {}", path.display());
        }
    }

    Ok(())
}

fn split_paths(list: &str) -> Vec<PathBuf> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}
