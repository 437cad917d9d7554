use clap::{Parser, Subcommand};
use foldvault::config::{default_config_path, FolderConfig, LoggingConfig};
use foldvault::persistence::Category;
use std::path::PathBuf;

pub mod attest;
pub mod finalize;
pub mod fold;
pub mod params;
pub mod status;
pub mod verify;
pub mod version;

#[derive(Parser)]
#[command(name = "foldvault")]
#[command(author = "Foldvault Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local accumulator of folded membership proofs", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.local/share/foldvault/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage proving parameters
    Params {
        #[command(subcommand)]
        action: ParamsCommand,
    },

    /// Issue an attestation with the loaded parameters (demo / testing)
    Attest {
        /// Category the attestation is for (talk, speaker, attendee)
        #[arg(long)]
        category: Category,

        /// Event text being attested
        #[arg(long)]
        message: String,

        /// Where to write the CBOR-encoded attestation
        #[arg(long)]
        output: PathBuf,
    },

    /// Fold attestations into a category's proof, in the order given
    Fold {
        #[arg(long)]
        category: Category,

        /// Attestation files produced by `attest`
        #[arg(long = "attestation", required = true, num_args = 1..)]
        attestations: Vec<PathBuf>,
    },

    /// Irreversibly finalize a category's proof
    Finalize {
        #[arg(long)]
        category: Category,
    },

    /// Verify stored proofs (all categories with a proof if none given)
    Verify {
        #[arg(long)]
        category: Option<Category>,
    },

    /// Show fold counts and finalization state
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum ParamsCommand {
    /// Generate a fresh parameter blob for the reference engine
    Generate {
        #[arg(long)]
        output: PathBuf,

        /// Blob size in bytes
        #[arg(long, default_value_t = params::DEFAULT_GENERATED_SIZE)]
        size: usize,
    },

    /// Split a parameter blob into chunks and store it
    Import {
        #[arg(long)]
        file: PathBuf,
    },

    /// Check that stored parameters are complete and loadable
    Check,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Version = cli.command {
        version::execute();
        return Ok(());
    }

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = FolderConfig::load_or_create(&config_path)?;
    init_logging(&config.logging)?;
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    match cli.command {
        Commands::Params { action } => match action {
            ParamsCommand::Generate { output, size } => params::generate(&output, size),
            ParamsCommand::Import { file } => params::import(&config, &file).await,
            ParamsCommand::Check => params::check(&config).await,
        },
        Commands::Attest {
            category,
            message,
            output,
        } => attest::execute(&config, category, &message, &output).await,
        Commands::Fold {
            category,
            attestations,
        } => fold::execute(&config, category, &attestations).await,
        Commands::Finalize { category } => finalize::execute(&config, category).await,
        Commands::Verify { category } => verify::execute(&config, category).await,
        Commands::Status { json } => status::execute(&config, json).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to stderr
/// unless a log file is configured.
fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Mutex;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| format!("Invalid log level '{}': {}", logging.level, e))?;

    let (stderr_layer, file_layer) = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false);
            (None, Some(layer))
        }
        None => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact();
            (Some(layer), None)
        }
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_params_generate() {
        let cli = Cli::parse_from(["foldvault", "params", "generate", "--output", "/tmp/p.bin"]);

        match cli.command {
            Commands::Params {
                action: ParamsCommand::Generate { output, size },
            } => {
                assert_eq!(output, PathBuf::from("/tmp/p.bin"));
                assert_eq!(size, params::DEFAULT_GENERATED_SIZE);
            }
            _ => panic!("Expected Params Generate command"),
        }
    }

    #[test]
    fn test_cli_parse_params_import_with_config() {
        let cli = Cli::parse_from([
            "foldvault",
            "params",
            "import",
            "--file",
            "/tmp/p.bin",
            "--config",
            "/etc/foldvault/config.toml",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/foldvault/config.toml")));
        match cli.command {
            Commands::Params {
                action: ParamsCommand::Import { file },
            } => assert_eq!(file, PathBuf::from("/tmp/p.bin")),
            _ => panic!("Expected Params Import command"),
        }
    }

    #[test]
    fn test_cli_parse_fold_multiple_attestations() {
        let cli = Cli::parse_from([
            "foldvault",
            "fold",
            "--category",
            "attendee",
            "--attestation",
            "a.cbor",
            "b.cbor",
        ]);

        match cli.command {
            Commands::Fold {
                category,
                attestations,
            } => {
                assert_eq!(category, Category::Attendee);
                assert_eq!(
                    attestations,
                    vec![PathBuf::from("a.cbor"), PathBuf::from("b.cbor")]
                );
            }
            _ => panic!("Expected Fold command"),
        }
    }

    #[test]
    fn test_cli_parse_fold_requires_attestation() {
        let result = Cli::try_parse_from(["foldvault", "fold", "--category", "talk"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_category() {
        let result = Cli::try_parse_from(["foldvault", "finalize", "--category", "keynote"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_verify_all() {
        let cli = Cli::parse_from(["foldvault", "verify"]);
        match cli.command {
            Commands::Verify { category } => assert_eq!(category, None),
            _ => panic!("Expected Verify command"),
        }
    }

    #[test]
    fn test_cli_parse_status_json() {
        let cli = Cli::parse_from(["foldvault", "status", "--json"]);
        match cli.command {
            Commands::Status { json } => assert!(json),
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["foldvault", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }
}
