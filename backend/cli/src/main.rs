mod config;
mod config_cmd;
mod scan_cmd;
mod terminal_output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgGroup, Args, Parser, Subcommand};
use nutrilens_config::ScannerConfig;
use nutrilens_logging::init_logger;
use tracing::info;

use scan_cmd::ScanSource;

#[derive(Parser)]
#[command(name = "nutrilens")]
#[command(about = "NutriLens: photograph a medication label and get it explained")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.nutrilens/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire an image and analyze it
    Scan(ScanArgs),
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("source").required(true).args(["file", "camera", "server_capture"])))]
struct ScanArgs {
    /// Analyze an image file
    #[arg(long)]
    file: Option<PathBuf>,
    /// Capture a frame from the local camera
    #[arg(long)]
    camera: bool,
    /// Let the analysis service capture the image
    #[arg(long)]
    server_capture: bool,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl ScanArgs {
    fn source(&self) -> ScanSource {
        match &self.file {
            Some(path) => ScanSource::File(path.clone()),
            None if self.camera => ScanSource::Camera,
            None => ScanSource::ServerCapture,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective config, secrets masked
    Show,
    /// Write a config file with every default
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            terminal_output::note_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = config::resolve_path(cli.config.as_deref());
    match cli.command {
        Commands::Config {
            action: ConfigAction::Init { force },
        } => {
            // The existing file may be the broken one being replaced.
            init_logger("warn", None, false);
            config_cmd::init(&path, force).await
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            let config = load_with_logging(&path).await?;
            config_cmd::show(&config, &path)
        }
        Commands::Scan(args) => {
            let config = load_with_logging(&path).await?;
            config::ensure_valid(&config)?;
            scan_cmd::run(&config, args.source(), args.json).await
        }
    }
}

async fn load_with_logging(path: &Path) -> Result<ScannerConfig> {
    let config = config::load(path).await?;
    init_logger(config.log_level(), config.log_dir(), config.log_json());
    info!(config = %path.display(), "NutriLens starting");
    Ok(config)
}
