//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use galleyscout_artifacts::{format_rating, render_table};
use galleyscout_browser::ChromiumClient;
use galleyscout_core::pipeline::{ProgressReporter, RunConfig, RunOutcome, RunReport};
use galleyscout_crawler::PageOutcome;
use galleyscout_shared::{AppConfig, BrowserSettings, EnrichedResult, init_config, load_config};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// GalleyScout — find well-reviewed upcoming books.
#[derive(Parser)]
#[command(
    name = "galleyscout",
    version,
    about = "Scan a galley catalog, cross-reference each title on a review site, and export the best-rated ones.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Defaults to `run` with configured values.
    #[command(subcommand)]
    pub command: Option<Command>,
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
    /// Scan the catalog, resolve every title, and export the matches.
    Run(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-run overrides of the config file.
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// First catalog page (inclusive).
    #[arg(long)]
    pub first_page: Option<u32>,

    /// Last catalog page (inclusive).
    #[arg(long)]
    pub last_page: Option<u32>,

    /// Minimum rating for a title to be exported.
    #[arg(long)]
    pub min_rating: Option<f64>,

    /// TSV output path.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Pause between cross-reference lookups, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Run the browser without a window.
    #[arg(long)]
    pub headless: bool,

    /// Browser profile directory holding the login session.
    #[arg(long)]
    pub session_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Overlay the flags that were given onto `config`.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(first) = self.first_page {
            config.catalog.first_page = first;
        }
        if let Some(last) = self.last_page {
            config.catalog.last_page = last;
        }
        if let Some(min) = self.min_rating {
            config.filter.min_rating = min;
        }
        if let Some(out) = &self.out {
            config.output.tsv_path = out.to_string_lossy().into_owned();
        }
        if let Some(ms) = self.delay_ms {
            config.resolver.per_candidate_delay_ms = ms;
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(dir) = &self.session_dir {
            config.browser.session_dir = dir.to_string_lossy().into_owned();
        }
    }
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
        0 => "galleyscout=info",
        1 => "galleyscout=debug",
        _ => "galleyscout=trace",
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
        None => cmd_run(&RunArgs::default()).await,
        Some(Command::Run(args)) => cmd_run(&args).await,
        Some(Command::Config { action }) => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(args: &RunArgs) -> Result<()> {
    if args.min_rating.is_some_and(|r| !r.is_finite()) {
        return Err(eyre!("--min-rating must be a finite number"));
    }

    let mut config = load_config()?;
    args.apply(&mut config);

    let run_config = RunConfig::from(&config);
    let settings = BrowserSettings::from(&config);

    info!(
        first_page = run_config.catalog.first_page,
        last_page = run_config.catalog.last_page,
        min_rating = run_config.filter.min_rating,
        out = %run_config.tsv_path.display(),
        "starting scan"
    );

    let client = ChromiumClient::launch(&settings).await?;
    let reporter = CliProgress::new();

    let outcome = galleyscout_core::run(&client, &run_config, &reporter).await;
    reporter.spinner.finish_and_clear();

    if let Err(e) = client.close().await {
        warn!(error = %e, "browser did not shut down cleanly");
    }

    let report = outcome?;
    print_report(&report, run_config.filter.min_rating);
    Ok(())
}

fn print_report(report: &RunReport, min_rating: f64) {
    println!();
    match &report.outcome {
        RunOutcome::NoCandidates => {
            println!("  No books were processed.");
        }
        RunOutcome::NoMatches => {
            println!(
                "  No books met the {}+ rating criteria ({} checked).",
                format_rating(min_rating),
                report.candidates
            );
        }
        RunOutcome::Matches(results) => {
            println!(
                "  Found {} matches ({}+ rating):",
                results.len(),
                format_rating(min_rating)
            );
            print!("{}", render_table(results));
            if let Some(path) = &report.tsv_path {
                println!();
                println!("  TSV saved to: {}", path.display());
            }
            if let Some(error) = &report.export_error {
                println!();
                println!("  TSV export failed: {error}");
            }
        }
    }
    println!(
        "  Pages: {}  Books: {}  Resolved: {}  Duplicates: {}  Unresolved: {}  Time: {:.1}s",
        report.pages_scanned,
        report.candidates,
        report.resolved,
        report.duplicates,
        report.unresolved,
        report.elapsed.as_secs_f64()
    );
    println!();
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
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_scanned(&self, page: &PageOutcome, current: usize, total: usize) {
        let status = match &page.error {
            Some(_) => "failed".to_string(),
            None => format!("{} new", page.candidates.len()),
        };
        self.spinner
            .set_message(format!("Catalog page [{current}/{total}] {status}"));
    }

    fn candidate_resolved(&self, result: &EnrichedResult, current: usize) {
        self.spinner.set_message(format!(
            "Verified [{current}] {} ({} / {})",
            result.title(),
            format_rating(result.rating()),
            result.resolution.label()
        ));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_has_no_subcommand() {
        let cli = Cli::try_parse_from(["galleyscout"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn run_flags_override_config() {
        let cli = Cli::try_parse_from([
            "galleyscout",
            "-vv",
            "run",
            "--first-page",
            "2",
            "--last-page",
            "3",
            "--min-rating",
            "4.25",
            "--out",
            "picks.tsv",
            "--delay-ms",
            "0",
            "--headless",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };

        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.catalog.first_page, 2);
        assert_eq!(config.catalog.last_page, 3);
        assert_eq!(config.filter.min_rating, 4.25);
        assert_eq!(config.output.tsv_path, "picks.tsv");
        assert_eq!(config.resolver.per_candidate_delay_ms, 0);
        assert!(config.browser.headless);
        assert_eq!(config.browser.session_dir, AppConfig::default().browser.session_dir);
    }

    #[test]
    fn absent_flags_leave_config_untouched() {
        let mut config = AppConfig::default();
        RunArgs::default().apply(&mut config);
        assert_eq!(config.catalog.first_page, 1);
        assert_eq!(config.catalog.last_page, 5);
        assert_eq!(config.filter.min_rating, 4.0);
        assert!(!config.browser.headless);
    }
}
