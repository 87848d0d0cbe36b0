//! DCmis Administration CLI

mod type_tree;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dcmis_core::{Repository, RepositoryConfig};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dcmis-admin")]
#[command(author = "DCmis Contributors")]
#[command(version = "0.1.0")]
#[command(about = "DCmis repository configuration tool")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default repository configuration
    Init {
        path: PathBuf,
        /// Repository id to put in the new config
        #[arg(long)]
        id: Option<String>,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration, including its type definitions
    Check { config: PathBuf },

    /// Print the type hierarchy
    Types {
        /// Configuration to load; base types only when absent
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Subtree root
        #[arg(short, long)]
        type_id: Option<String>,
        /// Levels to print, -1 for all
        #[arg(short, long, default_value_t = -1, allow_hyphen_values = true)]
        depth: i32,
    },

    /// Open a repository and print its description as JSON
    Info {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RepositoryConfig> {
    match path {
        Some(path) => RepositoryConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RepositoryConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::Init { path, id, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let mut config = RepositoryConfig::default();
            if let Some(id) = id {
                config.repository_id = id;
            }
            config.validate()?;
            config
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }

        Commands::Check { config } => {
            let loaded = load_config(Some(&config))?;
            let repo = Repository::open(loaded)
                .with_context(|| format!("Invalid repository configuration {}", config.display()))?;
            info!("Configuration {} is valid", config.display());
            println!(
                "OK: repository {} with {} types",
                repo.config().repository_id,
                repo.types().len()
            );
        }

        Commands::Types {
            config,
            type_id,
            depth,
        } => {
            let registry = load_config(config.as_deref())?
                .type_registry()
                .context("Failed to build type registry")?;
            let lines = type_tree::render(&registry, type_id.as_deref(), depth)?;
            for line in lines {
                println!("{}", line);
            }
        }

        Commands::Info { config } => {
            let repo = Repository::open(load_config(config.as_deref())?)?;
            let info = repo.get_repository_info().await;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repo.json");
        let mut config = RepositoryConfig::default();
        config.repository_id = "archive".to_string();
        config.save(&path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.repository_id, "archive");
        assert_eq!(load_config(None).unwrap().repository_id, "default");
    }

    #[test]
    fn test_load_config_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));
    }

    #[test]
    fn test_cli_parses_negative_depth() {
        let cli = Cli::try_parse_from(["dcmis-admin", "types", "--depth", "-1"]).unwrap();
        assert!(matches!(cli.command, Commands::Types { depth: -1, .. }));
    }
}
