//! Experiment execution.
//!
//! Walks the OA rows in ascending order, repetitions in ascending order
//! within each row, layering cyclic noise levels over the fixed and control
//! arguments. State is checkpointed after every completed row; the cursor
//! advances only when the row's repetitions and the checkpoint write have
//! both succeeded, so a resume replays at most one row.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use tracing::{info, warn};

use super::runner::{ArgList, MetricMap, TargetRunner};
use crate::analysis;
use crate::config::{ExperimentConfig, Factor};
use crate::error::{EngineError, Result};
use crate::oa::design::{ParameterSettings, create_design, settings_for_run};
use crate::state::ExperimentState;

/// Cooperative cancellation handle, checked between repetitions.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives one experiment from design to analyzed state.
pub struct ExperimentOrchestrator<R> {
    config: ExperimentConfig,
    control_factors: Vec<Factor>,
    noise_factors: Vec<Factor>,
    interactions: Vec<(String, String)>,
    runner: R,
    cancel: CancelFlag,
    state_dir: PathBuf,
}

impl<R: TargetRunner> ExperimentOrchestrator<R> {
    pub fn new(config: ExperimentConfig, runner: R, cancel: CancelFlag) -> Result<Self> {
        config.validate()?;
        let control_factors = config.resolved_control_factors()?;
        let noise_factors = config.resolved_noise_factors()?;
        let interactions = config.canonical_interactions();
        let state_dir = PathBuf::from(&config.output_directory);
        Ok(ExperimentOrchestrator {
            config,
            control_factors,
            noise_factors,
            interactions,
            runner,
            cancel,
            state_dir,
        })
    }

    /// Design a fresh experiment and run every row.
    pub async fn run_new(&self) -> Result<ExperimentState> {
        let design = create_design(&self.control_factors, &self.interactions)?;
        info!(
            designation = %design.designation,
            runs = design.runs(),
            repetitions = self.config.repetitions,
            "experiment designed"
        );
        let state = ExperimentState::new(self.config.clone(), design);
        self.execute(state).await
    }

    /// Continue a persisted experiment from its recorded cursor.
    pub async fn resume(&self, state: ExperimentState) -> Result<ExperimentState> {
        state.check_resume_compatibility()?;
        info!(
            next_run = state.next_run_index,
            runs = state.design.runs(),
            "resuming experiment"
        );
        self.execute(state).await
    }

    async fn execute(&self, mut state: ExperimentState) -> Result<ExperimentState> {
        let runs = state.design.runs();
        while state.next_run_index < runs {
            let run = state.next_run_index;
            let settings = settings_for_run(&state.design, &self.control_factors, run)?;
            info!(run, total = runs, combination = %settings.canonical_key(), "executing row");

            let mut repetitions: Vec<MetricMap> = Vec::with_capacity(self.config.repetitions);
            for rep in 0..self.config.repetitions {
                if self.cancel.is_cancelled() {
                    // The in-flight row is dropped; it replays on resume.
                    let path = state.save(&self.state_dir)?;
                    warn!(run, "cancellation requested; state persisted");
                    return Err(EngineError::Cancelled(path));
                }
                let (args, env) = self.invocation(&settings, rep);
                let metrics = match self
                    .runner
                    .run_target(&args, &env, self.config.verbose)
                    .await
                {
                    Ok(metrics) => {
                        if metrics.is_empty() {
                            warn!(run, rep, "target reported no metrics");
                        }
                        metrics
                    }
                    Err(e) => {
                        warn!(run, rep, error = %e, "target failed; recording empty metrics");
                        MetricMap::new()
                    }
                };
                repetitions.push(metrics);
            }

            debug_assert_eq!(state.raw_metrics.len(), run);
            state.raw_metrics.push(repetitions);
            state.next_run_index = run + 1;
            state.save(&self.state_dir)?;
        }

        state.reports.clear();
        for metric in &self.config.metrics_to_analyze {
            let report = analysis::analyze_metric(
                metric,
                &state.design,
                &self.control_factors,
                &self.interactions,
                &state.raw_metrics,
                self.config.pooling_threshold_percentage,
            )?;
            state.reports.push(report);
        }
        state.save(&self.state_dir)?;
        info!(metrics = state.reports.len(), "experiment complete");
        Ok(state)
    }

    /// Merge fixed arguments, control-factor settings, and the repetition's
    /// noise levels. Later writers override the same slot without moving it.
    fn invocation(
        &self,
        settings: &ParameterSettings,
        rep: usize,
    ) -> (ArgList, BTreeMap<String, String>) {
        let mut args: IndexMap<String, Option<String>> =
            self.config.fixed_command_line_arguments.clone();
        let mut env = self.config.fixed_environment_variables.clone();

        for factor in &self.control_factors {
            let Some(selection) = settings.0.get(&factor.name) else {
                continue;
            };
            if let Some(cli) = &factor.cli_arg {
                args.insert(cli.clone(), Some(selection.value.clone()));
            }
            if let Some(var) = &factor.env_var {
                env.insert(var.clone(), selection.value.clone());
            }
        }
        for factor in &self.noise_factors {
            if factor.values.is_empty() {
                continue;
            }
            let value = &factor.values[rep % factor.values.len()];
            if let Some(cli) = &factor.cli_arg {
                args.insert(cli.clone(), Some(value.clone()));
            }
            if let Some(var) = &factor.env_var {
                env.insert(var.clone(), value.clone());
            }
        }
        (args.into_iter().collect(), env)
    }
}
