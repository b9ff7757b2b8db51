use clap::{Args, Parser, Subcommand};
use ollama_save::archive::{
    format_bytes, ExportOptions, Exporter, ImportOptions, Importer, DEFAULT_OUTPUT,
};
use ollama_save::config::Config;
use ollama_save::error::Result;
use ollama_save::models::{ModelSpecifier, StoreLayout};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ollama-save")]
#[command(about = "Save Ollama models to a portable archive and load them back", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ~/.config/ollama-save/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ollama models directory; a leading ~ is expanded
    #[arg(long, env = "OLLAMA_MODELS", global = true)]
    models_dir: Option<String>,

    /// Registry host manifests are stored under
    #[arg(long, global = true)]
    registry_host: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Save model(s) to a tar.gz archive
    Save {
        /// Models to save, as <name> or <name>:<tag>
        #[arg(required = true, value_name = "MODEL")]
        models: Vec<String>,

        /// Path to the resulting archive
        #[arg(short = 'o', long = "outpath", default_value = DEFAULT_OUTPUT)]
        outpath: PathBuf,

        /// Store each shared blob once instead of once per model
        #[arg(long)]
        dedup: bool,

        /// Check blob contents against their digests while packing
        #[arg(long)]
        verify: bool,

        /// Skip the free space check on the output filesystem
        #[arg(long)]
        no_space_check: bool,
    },
    /// Load models from an archive into the models directory
    Load {
        /// Archive created by `save`
        archive: PathBuf,

        /// Check blob contents against their digests while unpacking
        #[arg(long)]
        verify: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins when set; otherwise the level follows `-v`
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.global.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let layout = store_layout(&config, &cli.global)?;
    tracing::debug!("Using models directory {}", layout.root().display());

    match cli.command {
        Commands::Save {
            models,
            outpath,
            dedup,
            verify,
            no_space_check,
        } => {
            let specs = ModelSpecifier::parse_all(&models)?;
            let mut options = ExportOptions::from(&config.archive);
            options.dedup_blobs |= dedup;
            options.verify_digests |= verify;
            options.check_disk_space &= !no_space_check;

            tracing::info!("Saving {} model(s) to {}", specs.len(), outpath.display());
            let report = Exporter::new(layout, options).export(&specs, &outpath)?;

            println!(
                "✓ Saved {} model(s) to {} ({} manifests, {} blobs, {})",
                report.models,
                outpath.display(),
                report.manifests,
                report.blobs,
                format_bytes(report.bytes)
            );
            if report.duplicates_skipped > 0 {
                println!("  {} shared blob(s) stored once", report.duplicates_skipped);
            }
        }
        Commands::Load { archive, verify } => {
            let mut options = ImportOptions::from(&config.archive);
            options.verify_digests |= verify;

            tracing::info!("Loading {}", archive.display());
            let report = Importer::new(layout.clone(), options).import(&archive)?;

            println!(
                "✓ Loaded {} manifests and {} blobs ({}) into {}",
                report.manifests,
                report.blobs,
                format_bytes(report.bytes),
                layout.root().display()
            );
        }
    }

    Ok(())
}

/// Config values overridden by command-line flags
fn store_layout(config: &Config, args: &GlobalArgs) -> Result<StoreLayout> {
    let mut store = config.store.clone();
    if let Some(dir) = &args.models_dir {
        store.models_dir.clone_from(dir);
    }
    if let Some(host) = &args.registry_host {
        store.registry_host.clone_from(host);
    }
    store.layout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_save_defaults() {
        let cli = Cli::try_parse_from(["ollama-save", "save", "llama3", "phi3:mini"]).unwrap();
        match cli.command {
            Commands::Save {
                models, outpath, ..
            } => {
                assert_eq!(models, vec!["llama3", "phi3:mini"]);
                assert_eq!(outpath, PathBuf::from("result.tar.gz"));
            }
            Commands::Load { .. } => panic!("expected save"),
        }
    }

    #[test]
    fn test_save_requires_model() {
        assert!(Cli::try_parse_from(["ollama-save", "save"]).is_err());
    }

    #[test]
    fn test_load_takes_one_archive() {
        let cli = Cli::try_parse_from(["ollama-save", "load", "models.tar.gz"]).unwrap();
        assert!(matches!(cli.command, Commands::Load { ref archive, verify: false } if archive == &PathBuf::from("models.tar.gz")));
        assert!(Cli::try_parse_from(["ollama-save", "load"]).is_err());
        assert!(Cli::try_parse_from(["ollama-save", "load", "a", "b"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "ollama-save",
            "--models-dir",
            "/srv/models",
            "--registry-host",
            "mirror.local",
            "load",
            "x.tar.gz",
        ])
        .unwrap();

        let layout = store_layout(&Config::default(), &cli.global).unwrap();
        assert_eq!(layout.root(), std::path::Path::new("/srv/models"));
        assert_eq!(layout.manifest_base_path(), "manifests/mirror.local/library/");
    }
}
