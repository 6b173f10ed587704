//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use meeplesync_core::pipeline::{ProgressReporter, SyncConfig, SyncResult, run_sync};
use meeplesync_licenses::{CompileConfig, compile_licenses};
use meeplesync_shared::{AppConfig, config_file_path, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Meeplesync — enrich board-game CSV dumps through the XML API.
#[derive(Parser)]
#[command(
    name = "meeplesync",
    version,
    about = "Enrich a board-game ranks CSV with XML API data and export merged tables.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich a ranks CSV dump and write the merged game tables.
    Sync {
        /// Path to the ranks dump CSV.
        input: PathBuf,

        /// Path for the primary game table CSV.
        #[arg(short, long, default_value = "output.csv")]
        output: PathBuf,

        /// Path for the base/expansion edge CSV.
        #[arg(long, default_value = "expansion_output.csv")]
        expansions_output: PathBuf,

        /// Records per API lookup (overrides config).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Maximum retry attempts per batch (overrides config; default
        /// retries until the request succeeds).
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Compile the third-party license report from a package manifest.
    Licenses {
        /// Path to the manifest JSON (overrides config).
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Path for the Markdown report (overrides config).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory holding installed packages (overrides config).
        #[arg(long)]
        packages_dir: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "meeplesync=info",
        1 => "meeplesync=debug",
        _ => "meeplesync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sync {
            input,
            output,
            expansions_output,
            batch_size,
            max_retries,
        } => cmd_sync(input, output, expansions_output, batch_size, max_retries).await,
        Command::Licenses {
            manifest,
            output,
            packages_dir,
        } => cmd_licenses(manifest, output, packages_dir).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(
    input: PathBuf,
    output: PathBuf,
    expansions_output: PathBuf,
    batch_size: Option<usize>,
    max_retries: Option<u32>,
) -> Result<()> {
    if !input.is_file() {
        return Err(eyre!("input file '{}' not found", input.display()));
    }

    let config = load_config()?;

    let mut api = config.api.clone();
    if let Some(size) = batch_size {
        if size == 0 {
            return Err(eyre!("batch size must be at least 1"));
        }
        api.batch_size = size;
    }

    let mut retry = config.retry.clone();
    if let Some(attempts) = max_retries {
        retry.max_attempts = Some(attempts);
    }

    let sync_config = SyncConfig {
        input,
        output,
        expansions_output,
        api,
        retry,
        format: config.output.clone(),
    };

    info!(
        input = %sync_config.input.display(),
        batch_size = sync_config.api.batch_size,
        "starting sync"
    );

    let reporter = CliProgress::new();
    let result = run_sync(&sync_config, &reporter).await?;

    println!();
    println!("  Sync complete!");
    println!("  Games:      {}", result.games_written);
    println!("  Expansions: {}", result.edges_written);
    println!("  Batches:    {}", result.batches);
    println!("  Output:     {}", sync_config.output.display());
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_licenses(
    manifest: Option<PathBuf>,
    output: Option<PathBuf>,
    packages_dir: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;

    let compile_config = CompileConfig {
        manifest: manifest.unwrap_or_else(|| PathBuf::from(&config.licenses.manifest)),
        output: output.unwrap_or_else(|| PathBuf::from(&config.licenses.output)),
        packages_dir: packages_dir.unwrap_or_else(|| PathBuf::from(&config.licenses.packages_dir)),
        url_prefix: config.licenses.url_prefix.clone(),
    };

    if !compile_config.manifest.is_file() {
        return Err(eyre!(
            "manifest '{}' not found",
            compile_config.manifest.display()
        ));
    }

    info!(manifest = %compile_config.manifest.display(), "compiling license report");

    let result = compile_licenses(&compile_config).await?;

    println!();
    println!("  License report written to {}", compile_config.output.display());
    println!("  Packages: {}", result.packages);
    println!("  Local:    {}", result.resolved_local);
    println!("  Remote:   {}", result.resolved_remote);
    if !result.failures.is_empty() {
        println!("  Unresolved:");
        for key in &result.failures {
            println!("    - {key}");
        }
    }
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", config_file_path()?.display());
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_done(&self, current: usize, total: usize) {
        self.spinner.set_message(format!("Fetching batch [{current}/{total}]"));
    }

    fn game_written(&self, id: &str, name: &str) {
        self.spinner.set_message(format!("Writing {id} {name}"));
    }

    fn done(&self, _result: &SyncResult) {
        self.spinner.finish_and_clear();
    }
}
