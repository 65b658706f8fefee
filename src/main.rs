//! Command-line entry point.
//!
//! One operation mode per invocation: run a new experiment from a
//! configuration file, resume a persisted one, or render a report from a
//! completed state file. Argument errors exit with clap's own code 2; every
//! engine error maps to its documented exit code.

use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser};
use tracing::{error, info};

use taguchi_tuner::config::ExperimentConfig;
use taguchi_tuner::error::{EngineError, Result};
use taguchi_tuner::report;
use taguchi_tuner::run::{CancelFlag, ExperimentOrchestrator, ProcessRunner};
use taguchi_tuner::state::ExperimentState;
use taguchi_tuner::{logging, oa};

#[derive(Debug, Parser)]
#[command(
    name = "taguchi-tuner",
    version,
    about = "Robust parameter optimization via Taguchi orthogonal-array experiments",
    group = ArgGroup::new("mode").required(true)
)]
struct Cli {
    /// Run a new experiment from a YAML configuration file.
    #[arg(long, value_name = "PATH", group = "mode")]
    config: Option<PathBuf>,

    /// Resume an interrupted experiment from a state file.
    #[arg(long, value_name = "STATEFILE", group = "mode")]
    recover: Option<PathBuf>,

    /// Render an HTML report from a state file.
    #[arg(long = "report-html", value_name = "STATEFILE", group = "mode")]
    report_html: Option<PathBuf>,

    /// Render a Markdown report from a state file.
    #[arg(long = "report-md", value_name = "STATEFILE", group = "mode")]
    report_md: Option<PathBuf>,

    /// Override the configured output directory.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Lower the log filter to debug.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init_logging(cli.verbose, cli.output_dir.as_deref()) {
        eprintln!("warning: logging setup failed: {e}");
    }

    let code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<()> {
    if let Some(path) = &cli.config {
        return run_experiment(path, &cli, None).await;
    }
    if let Some(path) = &cli.recover {
        return run_experiment(path, &cli, Some(())).await;
    }
    if let Some(path) = &cli.report_html {
        return render_report(path, cli.output_dir.as_deref(), ReportFormat::Html);
    }
    if let Some(path) = &cli.report_md {
        return render_report(path, cli.output_dir.as_deref(), ReportFormat::Markdown);
    }
    unreachable!("clap enforces exactly one mode");
}

async fn run_experiment(path: &Path, cli: &Cli, recover: Option<()>) -> Result<()> {
    let (mut config, resume_state) = match recover {
        None => (ExperimentConfig::load(path)?, None),
        Some(()) => {
            let state = ExperimentState::load(path)?;
            (state.config.clone(), Some(state))
        }
    };
    if let Some(dir) = &cli.output_dir {
        config.output_directory = dir.display().to_string();
    }
    config.verbose |= cli.verbose;

    let runner = ProcessRunner::new(&config.target_executable_path, config.show_target_output)?;
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; finishing the current repetition");
                cancel.cancel();
            }
        });
    }

    let orchestrator = ExperimentOrchestrator::new(config, runner, cancel)?;
    let state = match resume_state {
        None => orchestrator.run_new().await?,
        Some(mut state) => {
            if let Some(dir) = &cli.output_dir {
                state.config.output_directory = dir.display().to_string();
            }
            orchestrator.resume(state).await?
        }
    };

    print_summary(&state);
    Ok(())
}

fn print_summary(state: &ExperimentState) {
    println!(
        "Experiment complete: {} on {} runs",
        state.design.designation,
        state.design.runs()
    );
    for report in &state.reports {
        let optimal: Vec<String> = report
            .optimal_configuration
            .0
            .iter()
            .map(|(name, sel)| format!("{name}={}", sel.value))
            .collect();
        println!(
            "  {}: optimal [{}], predicted {:.4}",
            report.metric_name,
            optimal.join(", "),
            report.prediction.predicted_value
        );
    }
    println!(
        "State files are in '{}'; render a report with --report-html or --report-md",
        state.config.output_directory
    );
}

enum ReportFormat {
    Html,
    Markdown,
}

fn render_report(state_path: &Path, output_dir: Option<&Path>, format: ReportFormat) -> Result<()> {
    let mut state = ExperimentState::load(state_path)?;
    if state.reports.is_empty() {
        return Err(EngineError::Report(format!(
            "{} holds no analysis reports yet (experiment at run {}/{})",
            state_path.display(),
            state.next_run_index,
            state.design.runs()
        )));
    }
    // Sanity: the persisted design should still be a known catalogued array.
    if oa::by_designation(&state.design.designation).is_none() {
        info!(
            designation = %state.design.designation,
            "state uses a designation outside the current catalog"
        );
    }

    let dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&state.config.output_directory));
    std::fs::create_dir_all(&dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let path = match format {
        ReportFormat::Html => {
            let path = dir.join(format!("report-{stamp}.html"));
            report::html::write(&state, &path)?;
            path
        }
        ReportFormat::Markdown => {
            let path = dir.join(format!("report-{stamp}.md"));
            report::markdown::write(&state, &path)?;
            path
        }
    };
    // Record the rendered artifact in a fresh checkpoint; earlier state
    // files stay untouched.
    state.report_paths.push(path.display().to_string());
    state.save(&dir)?;
    println!("Report written to {}", path.display());
    Ok(())
}
