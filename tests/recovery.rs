//! Orchestrator scenarios: checkpointed recovery, cooperative cancellation,
//! and target failures, driven by scripted runners.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use taguchi_tuner::config::{ExperimentConfig, FactorSpec, MetricMethod, MetricSpec};
use taguchi_tuner::error::{EngineError, Result};
use taguchi_tuner::run::runner::{ArgList, MetricMap};
use taguchi_tuner::run::{CancelFlag, ExperimentOrchestrator, TargetRunner};
use taguchi_tuner::state::ExperimentState;

/// Emits a deterministic score from the argument values, optionally failing
/// on selected invocations and optionally raising a cancel flag after a
/// number of calls.
struct ScriptedRunner {
    calls: AtomicUsize,
    fail_on_calls: Vec<usize>,
    cancel_after: Option<(usize, CancelFlag)>,
}

impl ScriptedRunner {
    fn deterministic() -> Self {
        ScriptedRunner {
            calls: AtomicUsize::new(0),
            fail_on_calls: Vec::new(),
            cancel_after: None,
        }
    }
}

impl TargetRunner for ScriptedRunner {
    async fn run_target(
        &self,
        args: &ArgList,
        _env: &BTreeMap<String, String>,
        _verbose: bool,
    ) -> Result<MetricMap> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((after, flag)) = &self.cancel_after
            && call + 1 >= *after
        {
            flag.cancel();
        }
        if self.fail_on_calls.contains(&call) {
            return Err(EngineError::Runner("scripted failure".into()));
        }
        // Position-weighted sum of the numeric argument values keeps every
        // parameter combination distinguishable.
        let score: f64 = args
            .iter()
            .enumerate()
            .filter_map(|(i, (_, value))| {
                let v: f64 = value.as_ref()?.parse().ok()?;
                Some((i + 1) as f64 * v)
            })
            .sum();
        Ok(MetricMap::from([("score".to_string(), score)]))
    }
}

fn four_factor_config(output_dir: &Path, repetitions: usize) -> ExperimentConfig {
    let factor = |name: &str| FactorSpec {
        name: name.into(),
        cli_arg: Some(format!("--{name}")),
        env_var: None,
        levels: Some(vec!["1".into(), "2".into()]),
        float_range: None,
        int_range: None,
    };
    ExperimentConfig {
        repetitions,
        output_directory: output_dir.display().to_string(),
        target_executable_path: "/bin/true".into(),
        verbose: false,
        show_target_output: false,
        pooling_threshold_percentage: 5.0,
        metrics_to_analyze: vec![MetricSpec {
            name: "score".into(),
            method: MetricMethod::LargerIsBetter,
            target: None,
        }],
        fixed_command_line_arguments: indexmap::IndexMap::new(),
        fixed_environment_variables: BTreeMap::new(),
        control_factors: vec![factor("a"), factor("b"), factor("c"), factor("d")],
        noise_factors: vec![],
        interactions: vec![],
    }
}

#[tokio::test]
async fn full_run_completes_and_analyzes() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_factor_config(dir.path(), 2);
    let orchestrator =
        ExperimentOrchestrator::new(config, ScriptedRunner::deterministic(), CancelFlag::new())
            .unwrap();
    let state = orchestrator.run_new().await.unwrap();

    assert_eq!(state.design.designation, "L8");
    assert_eq!(state.next_run_index, 8);
    assert_eq!(state.raw_metrics.len(), 8);
    assert!(state.raw_metrics.iter().all(|reps| reps.len() == 2));
    assert_eq!(state.reports.len(), 1);
    assert!(state.reports[0].prediction.predicted_value.is_finite());
}

#[tokio::test]
async fn cancelled_run_resumes_to_an_identical_store() {
    // Reference: an uninterrupted run.
    let reference_dir = tempfile::tempdir().unwrap();
    let reference = ExperimentOrchestrator::new(
        four_factor_config(reference_dir.path(), 2),
        ScriptedRunner::deterministic(),
        CancelFlag::new(),
    )
    .unwrap()
    .run_new()
    .await
    .unwrap();

    // Interrupted: the cancel flag rises during row 2's last repetition, so
    // the orchestrator stops before row 3.
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();
    let runner = ScriptedRunner {
        calls: AtomicUsize::new(0),
        fail_on_calls: Vec::new(),
        cancel_after: Some((6, cancel.clone())),
    };
    let orchestrator =
        ExperimentOrchestrator::new(four_factor_config(dir.path(), 2), runner, cancel).unwrap();
    let err = orchestrator.run_new().await.unwrap_err();
    let EngineError::Cancelled(state_path) = err else {
        panic!("expected cancellation, got {err}");
    };

    let interrupted = ExperimentState::load(&state_path).unwrap();
    assert_eq!(interrupted.next_run_index, 3);
    assert_eq!(interrupted.raw_metrics.len(), 3);
    assert!(interrupted.reports.is_empty());

    // Resume with a fresh runner; the remaining five rows execute.
    let resumed = ExperimentOrchestrator::new(
        four_factor_config(dir.path(), 2),
        ScriptedRunner::deterministic(),
        CancelFlag::new(),
    )
    .unwrap()
    .resume(interrupted)
    .await
    .unwrap();

    assert_eq!(resumed.next_run_index, 8);
    assert_eq!(resumed.raw_metrics, reference.raw_metrics);
    assert_eq!(resumed.reports.len(), 1);
}

#[tokio::test]
async fn failed_target_rows_become_missing_data() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner {
        calls: AtomicUsize::new(0),
        // Repetitions = 1, so call index equals the row index.
        fail_on_calls: vec![2],
        cancel_after: None,
    };
    let orchestrator =
        ExperimentOrchestrator::new(four_factor_config(dir.path(), 1), runner, CancelFlag::new())
            .unwrap();
    let state = orchestrator.run_new().await.unwrap();

    assert_eq!(state.next_run_index, 8);
    assert!(state.raw_metrics[2][0].is_empty());
    let report = &state.reports[0];
    assert!(report.sn_per_run[2].is_nan());
    assert!(report.sn_per_run.iter().filter(|v| v.is_finite()).count() == 7);
    assert!(report.warnings.iter().any(|w| w.contains("run 2")));
    assert!(report.prediction.predicted_value.is_finite());
}

#[tokio::test]
async fn checkpoints_accumulate_per_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_factor_config(dir.path(), 1);
    let orchestrator =
        ExperimentOrchestrator::new(config, ScriptedRunner::deterministic(), CancelFlag::new())
            .unwrap();
    orchestrator.run_new().await.unwrap();

    let checkpoints = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.starts_with("state-") && name.ends_with(".yaml")
        })
        .count();
    // One checkpoint per row plus the final analyzed state.
    assert_eq!(checkpoints, 9);
}

#[tokio::test]
async fn resume_refuses_a_structurally_incompatible_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_factor_config(dir.path(), 1);
    let orchestrator = ExperimentOrchestrator::new(
        config.clone(),
        ScriptedRunner::deterministic(),
        CancelFlag::new(),
    )
    .unwrap();
    let mut state = orchestrator.run_new().await.unwrap();

    // Grow a factor beyond its assigned column's level count.
    state.config.control_factors[0].levels = Some(vec!["1".into(), "2".into(), "3".into()]);
    let incompatible = ExperimentOrchestrator::new(
        state.config.clone(),
        ScriptedRunner::deterministic(),
        CancelFlag::new(),
    )
    .unwrap();
    let err = incompatible.resume(state).await.unwrap_err();
    assert!(matches!(err, EngineError::State(_)));
}
