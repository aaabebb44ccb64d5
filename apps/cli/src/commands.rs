//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assetguard_core::{
    ContextStore, Pipeline, PipelineRun, ProactivePolicy, ProgressReporter, ReactivePolicy, assessment_pipeline,
    proactive_pipeline, proactive_trigger, reactive_pipeline, reactive_trigger, write_audit_log,
};
use assetguard_risk::load_reference_data;
use assetguard_shared::{
    AppConfig, RunStatus, RunSummary, WeatherEvent, init_config, load_config,
    load_config_from,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::services;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// AssetGuard: turn inspections and forecasts into maintenance work.
#[derive(Parser)]
#[command(
    name = "assetguard",
    version,
    about = "Run reactive (image) and proactive (weather) maintenance pipelines against a CMMS.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.assetguard/assetguard.toml.
    #[arg(long, global = true, env = "ASSETGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the run summary as JSON.
    #[arg(long, global = true)]
    pub json: bool,

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
    /// Inspect an image and raise a maintenance work order for its defects.
    Reactive {
        /// Image file to inspect.
        image: PathBuf,

        /// CMMS asset code the image belongs to.
        #[arg(short, long)]
        asset: Option<String>,
    },

    /// Assess a forecast weather event and raise a pre-event inspection.
    Proactive {
        /// JSON file describing the weather event.
        event: PathBuf,

        /// Number of similar historical events to consider.
        #[arg(short, long)]
        neighbors: Option<usize>,
    },

    /// Show similar past events and asset risk for a weather event, without touching the CMMS.
    Similar {
        /// JSON file describing the weather event.
        event: PathBuf,

        /// Number of similar historical events to consider.
        #[arg(short)]
        k: Option<usize>,
    },

    /// Configuration management.
    Config {
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
        0 => "assetguard=info",
        1 => "assetguard=debug",
        _ => "assetguard=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let output = Output { json: cli.json };
    match cli.command {
        Command::Reactive { image, asset } => {
            let config = resolve_config(cli.config.as_deref())?;
            cmd_reactive(&config, &image, asset.as_deref(), output).await
        }
        Command::Proactive { event, neighbors } => {
            let config = resolve_config(cli.config.as_deref())?;
            cmd_proactive(&config, &event, neighbors, output).await
        }
        Command::Similar { event, k } => {
            let config = resolve_config(cli.config.as_deref())?;
            cmd_similar(&config, &event, k, output).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_deref()),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn read_event(path: &Path) -> Result<WeatherEvent> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read weather event '{}'", path.display()))?;
    serde_json::from_str(&text)
        .wrap_err_with(|| format!("'{}' is not a valid weather event", path.display()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_reactive(config: &AppConfig, image: &Path, asset: Option<&str>, output: Output) -> Result<()> {
    if !image.is_file() {
        return Err(eyre!("image '{}' does not exist", image.display()));
    }

    let services = services::reactive_services(config)?;
    let pipeline = reactive_pipeline(services, ReactivePolicy::from_config(config));
    info!(image = %image.display(), asset, "inspecting image");

    execute(&pipeline, reactive_trigger(image, asset)?, config, output).await
}

async fn cmd_proactive(
    config: &AppConfig,
    event: &Path,
    neighbors: Option<usize>,
    output: Output,
) -> Result<()> {
    let weather = read_event(event)?;
    let reference = Arc::new(load_reference_data(&config.dataset)?);
    let work_orders = services::work_order_service(config)?;

    let mut policy = ProactivePolicy::from_config(config);
    if let Some(k) = neighbors {
        policy.neighbors = k;
    }
    info!(event = %weather.headline(), neighbors = policy.neighbors, "assessing weather event");

    let pipeline = proactive_pipeline(reference, work_orders, policy);
    execute(&pipeline, proactive_trigger(&weather)?, config, output).await
}

async fn cmd_similar(config: &AppConfig, event: &Path, k: Option<usize>, output: Output) -> Result<()> {
    let weather = read_event(event)?;
    let reference = Arc::new(load_reference_data(&config.dataset)?);
    let neighbors = k.unwrap_or(config.proactive.neighbors);

    let pipeline = assessment_pipeline(reference, neighbors);
    execute(&pipeline, proactive_trigger(&weather)?, config, output).await
}

/// Run a pipeline, persist its audit record, print the summary, and turn a
/// failed run into an error exit.
async fn execute(
    pipeline: &Pipeline,
    trigger: ContextStore,
    config: &AppConfig,
    output: Output,
) -> Result<()> {
    let reporter = CliProgress::new();
    let run = pipeline.run(trigger, &reporter).await;

    if let Some(dir) = config.audit.dir.as_deref() {
        let path = write_audit_log(Path::new(dir), &run)?;
        info!(path = %path.display(), "audit log written");
    }

    output.print(&run.summary())?;
    if run.status() == RunStatus::Failed {
        run.into_result()?;
    }
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => {
            let content = toml::to_string_pretty(&AppConfig::default())?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn print(self, summary: &RunSummary) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(summary)?);
            return Ok(());
        }

        println!();
        println!("  Run:         {}", summary.run_id);
        println!("  Pipeline:    {}", summary.kind);
        println!("  Status:      {}", summary.status);
        if let Some(id) = &summary.work_order_id {
            println!("  Work order:  {id}");
        }
        println!("  Activities:  {}", summary.activity_count);
        if !summary.tier_distribution.is_empty() {
            let tiers: Vec<String> = summary
                .tier_distribution
                .iter()
                .map(|(tier, count)| format!("{tier}={count}"))
                .collect();
            println!("  Risk tiers:  {}", tiers.join(" "));
        }
        println!();
        for line in summary.report.lines() {
            println!("  {line}");
        }
        println!();
        Ok(())
    }
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _run: &PipelineRun) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_reactive_with_asset() {
        let cli = Cli::try_parse_from(["assetguard", "--json", "reactive", "pole.jpg", "--asset", "POLE-17"])
            .expect("parse");
        assert!(cli.json);
        match cli.command {
            Command::Reactive { image, asset } => {
                assert_eq!(image, PathBuf::from("pole.jpg"));
                assert_eq!(asset.as_deref(), Some("POLE-17"));
            }
            _ => panic!("expected reactive"),
        }
    }

    #[test]
    fn parses_similar_with_k() {
        let cli = Cli::try_parse_from(["assetguard", "similar", "storm.json", "-k", "3"]).expect("parse");
        assert!(matches!(cli.command, Command::Similar { k: Some(3), .. }));
    }

    #[test]
    fn reads_weather_event_files() {
        let path = std::env::temp_dir().join(format!("ag-event-{}.json", uuid::Uuid::now_v7()));
        std::fs::write(
            &path,
            r#"{"temperature_c": 12.0, "wind_speed_kmh": 95.0, "precipitation_mm": 30.0,
                "humidity_percent": 88.0, "duration_hours": 10.0, "event_type": "Storm"}"#,
        )
        .expect("write");
        let event = read_event(&path).expect("event");
        assert_eq!(event.wind_speed_kmh, 95.0);
        assert_eq!(event.headline(), "Storm");
        let _ = std::fs::remove_file(&path);
    }
}
