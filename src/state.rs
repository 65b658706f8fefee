//! Persisted experiment state.
//!
//! The canonical artifact of a run: configuration snapshot, frozen design,
//! collected raw metrics, progress cursor, and the per-metric reports once
//! analysis has run. Checkpoints go to uniquely named YAML files so no
//! earlier checkpoint is ever clobbered.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::{MetricReport, RawMetricsStore};
use crate::config::ExperimentConfig;
use crate::error::{EngineError, Result};
use crate::oa::design::OrthogonalArrayDesign;

/// Engine version stamped into every state file.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything needed to resume or re-analyze an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentState {
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// SHA-256 of the canonical configuration at experiment start.
    pub original_config_hash: String,
    pub config: ExperimentConfig,
    pub design: OrthogonalArrayDesign,
    /// 0-based index of the next OA row to execute; equals the run count
    /// once execution has finished.
    pub next_run_index: usize,
    pub raw_metrics: RawMetricsStore,
    #[serde(default)]
    pub reports: Vec<MetricReport>,
    #[serde(default)]
    pub report_paths: Vec<String>,
}

impl ExperimentState {
    /// Fresh state for a newly designed experiment.
    pub fn new(config: ExperimentConfig, design: OrthogonalArrayDesign) -> Self {
        let now = Utc::now();
        let original_config_hash = config.canonical_hash();
        ExperimentState {
            engine_version: ENGINE_VERSION.to_string(),
            created_at: now,
            updated_at: now,
            original_config_hash,
            config,
            design,
            next_run_index: 0,
            raw_metrics: Vec::new(),
            reports: Vec::new(),
            report_paths: Vec::new(),
        }
    }

    /// Whether every OA row has been executed.
    pub fn is_complete(&self) -> bool {
        self.next_run_index >= self.design.runs()
    }

    /// Persist to a new timestamped file in `dir`, atomically: the YAML is
    /// written to a temporary sibling and renamed into place.
    pub fn save(&mut self, dir: &Path) -> Result<PathBuf> {
        self.updated_at = Utc::now();
        std::fs::create_dir_all(dir).map_err(|source| EngineError::Persistence {
            path: dir.to_path_buf(),
            source,
        })?;
        let stamp = self.updated_at.format("%Y%m%d-%H%M%S%.3f");
        let mut path = dir.join(format!("state-{stamp}-run{:02}.yaml", self.next_run_index));
        let mut counter = 1u32;
        while path.exists() {
            path = dir.join(format!(
                "state-{stamp}-run{:02}-{counter}.yaml",
                self.next_run_index
            ));
            counter += 1;
        }
        let yaml = serde_yaml::to_string(self)?;

        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml).map_err(|source| EngineError::Persistence {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| EngineError::Persistence {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "state checkpoint written");
        Ok(path)
    }

    /// Load a state file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EngineError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let state: ExperimentState = serde_yaml::from_str(&text)
            .map_err(|e| EngineError::State(format!("cannot parse {}: {e}", path.display())))?;
        Ok(state)
    }

    /// Validate this state for resumption.
    ///
    /// A drifted configuration hash is the operator's explicit choice and
    /// only warns; a design that no longer fits the configuration refuses.
    pub fn check_resume_compatibility(&self) -> Result<()> {
        let current_hash = self.config.canonical_hash();
        if current_hash != self.original_config_hash {
            warn!(
                recorded = %self.original_config_hash,
                current = %current_hash,
                "configuration hash differs from the one recorded at experiment start"
            );
        }

        let runs = self.design.runs();
        if self.next_run_index > runs {
            return Err(EngineError::State(format!(
                "next run index {} exceeds the design's {} rows",
                self.next_run_index, runs
            )));
        }
        let factors = self.config.resolved_control_factors()?;
        for factor in &factors {
            let column = self.design.factor_column(&factor.name).ok_or_else(|| {
                EngineError::State(format!(
                    "design has no column for factor '{}'",
                    factor.name
                ))
            })?;
            let column_levels = self.design.column_level_count(column) as usize;
            if column_levels != factor.level_count() {
                return Err(EngineError::State(format!(
                    "factor '{}' now has {} levels but its design column carries {}",
                    factor.name,
                    factor.level_count(),
                    column_levels
                )));
            }
        }
        for run in 0..self.next_run_index {
            let reps = self.raw_metrics.get(run).map_or(0, Vec::len);
            if reps != self.config.repetitions {
                return Err(EngineError::State(format!(
                    "completed run {run} recorded {reps} repetition(s), expected {}",
                    self.config.repetitions
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::{FactorSpec, MetricMethod, MetricSpec};
    use crate::oa::design::create_design;

    fn test_config() -> ExperimentConfig {
        ExperimentConfig {
            repetitions: 1,
            output_directory: "out".into(),
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
            control_factors: vec![
                FactorSpec {
                    name: "A".into(),
                    cli_arg: Some("--a".into()),
                    env_var: None,
                    levels: Some(vec!["1".into(), "2".into()]),
                    float_range: None,
                    int_range: None,
                },
                FactorSpec {
                    name: "B".into(),
                    cli_arg: Some("--b".into()),
                    env_var: None,
                    levels: Some(vec!["1".into(), "2".into()]),
                    float_range: None,
                    int_range: None,
                },
            ],
            noise_factors: vec![],
            interactions: vec![],
        }
    }

    fn test_state() -> ExperimentState {
        let config = test_config();
        let factors = config.resolved_control_factors().unwrap();
        let design = create_design(&factors, &[]).unwrap();
        ExperimentState::new(config, design)
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state();
        state
            .raw_metrics
            .push(vec![BTreeMap::from([("score".to_string(), 42.0)])]);
        state.next_run_index = 1;
        let path = state.save(dir.path()).unwrap();
        let loaded = ExperimentState::load(&path).unwrap();
        assert_eq!(
            serde_yaml::to_string(&state).unwrap(),
            serde_yaml::to_string(&loaded).unwrap()
        );
    }

    #[test]
    fn checkpoints_never_clobber_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state();
        let first = state.save(dir.path()).unwrap();
        state.next_run_index = 1;
        let second = state.save(dir.path()).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn loading_a_missing_file_is_a_file_not_found() {
        let err = ExperimentState::load(Path::new("/nonexistent/state.yaml")).unwrap_err();
        assert!(matches!(err, EngineError::FileNotFound(_)));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn incompatible_repetition_count_refuses_resume() {
        let mut state = test_state();
        state
            .raw_metrics
            .push(vec![BTreeMap::from([("score".to_string(), 1.0)])]);
        state.next_run_index = 1;
        assert!(state.check_resume_compatibility().is_ok());
        state.config.repetitions = 2;
        assert!(matches!(
            state.check_resume_compatibility(),
            Err(EngineError::State(_))
        ));
    }

    #[test]
    fn structural_design_mismatch_refuses_resume() {
        let mut state = test_state();
        // Grow factor A to three levels; its assigned 2-level column no
        // longer fits.
        state.config.control_factors[0].levels =
            Some(vec!["1".into(), "2".into(), "3".into()]);
        assert!(matches!(
            state.check_resume_compatibility(),
            Err(EngineError::State(_))
        ));
    }
}
