use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use flow_runner::driver::web::{BrowserType, WebLauncher, WebLauncherConfig};
use flow_runner::report::{self, RunReport};
use flow_runner::runner::{ConsoleEventListener, EventEmitter, FlowRunner};
use flow_runner::utils::config::{self, GlobalConfig};
use flow_runner::{parser, StartupError};

#[derive(Parser)]
#[command(name = "flow-runner")]
#[command(version)]
#[command(about = "Run declarative browser flows from YAML or JSON", long_about = None)]
struct Cli {
    /// Path to the flow file (.yaml, .yml or .json)
    flow: PathBuf,

    /// Environment name from the global config
    #[arg(short, long)]
    env: Option<String>,

    /// Run the browser without a window
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    headless: bool,

    /// Delay in milliseconds applied to every browser operation
    #[arg(long, default_value_t = 0)]
    slowmo: u64,

    /// Write a report after the run
    #[arg(long, value_enum)]
    report: Option<ReportFormat>,

    /// Print diagnostics for a failed step
    #[arg(short, long)]
    verbose: bool,

    /// Global config file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium", value_parser = parse_browser)]
    browser: BrowserType,

    /// Directory for failure screenshots
    #[arg(long, default_value = flow_runner::runner::DEFAULT_SCREENSHOT_DIR)]
    screenshots_dir: PathBuf,

    /// Directory for reports
    #[arg(long, default_value = report::DEFAULT_REPORT_DIR)]
    reports_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
}

fn parse_browser(name: &str) -> Result<BrowserType, String> {
    BrowserType::parse(name).ok_or_else(|| format!("unsupported browser: {}", name))
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logger(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if let Some(startup) = e.downcast_ref::<StartupError>() {
                eprintln!("{} {}", "ERROR:".red().bold(), startup);
            } else {
                eprintln!("{} {:#}", "FATAL:".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every step passed
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let global = GlobalConfig::load(&cli.config)?;
    let flow = parser::load_flow(&cli.flow)?;

    let env = config::resolve_env_name(global.as_ref(), cli.env.as_deref());
    let run_config = config::resolve(global.as_ref(), Some(env.as_str()), flow.config.as_ref());
    log::debug!("Resolved config for '{}': {:?}", env, run_config);

    let launcher = WebLauncher::new(WebLauncherConfig {
        browser_type: cli.browser,
        headless: cli.headless,
        slow_mo_ms: cli.slowmo,
        ..Default::default()
    });

    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::new(cli.verbose).listen(receiver));

    let runner = FlowRunner::new(Box::new(launcher), emitter)
        .with_screenshot_dir(&cli.screenshots_dir)
        .with_headless(cli.headless);
    let result = runner.run(&flow, &cli.flow, &run_config, &env).await;

    // Closing the channel lets the listener drain and exit
    drop(runner);
    if let Err(e) = listener.await {
        log::warn!("Progress listener stopped: {}", e);
    }
    let outcome = result?;

    if let Some(ReportFormat::Json) = cli.report {
        let report = RunReport::from_outcome(&outcome, &cli.flow.display().to_string());
        save_report(&report, &cli.reports_dir);
    }

    Ok(outcome.success)
}

/// A report that cannot be written never changes the run's outcome
fn save_report(report: &RunReport, dir: &Path) {
    match report::write_report(report, dir) {
        Ok(path) => println!("{} Report saved to: {}", "📄".green(), path.display()),
        Err(e) => eprintln!("{} Failed to save report: {:#}", "⚠".yellow(), e),
    }
}
