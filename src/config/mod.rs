//! Experiment configuration.
//!
//! The YAML schema the operator writes, its validation rules, the expansion
//! of numeric ranges into discrete factor levels, and the canonical SHA-256
//! hash used to detect configuration drift on recovery.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analysis::sn::SnType;
use crate::error::{EngineError, Result};

/// Number of levels a `floatRange`/`intRange` expands to for control factors.
const CONTROL_RANGE_LEVELS: usize = 3;
/// Number of levels a range expands to for noise factors.
const NOISE_RANGE_LEVELS: usize = 2;

/// Optimization direction for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricMethod {
    LargerIsBetter,
    SmallerIsBetter,
    Nominal,
}

/// A metric the target emits and the engine analyzes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub name: String,
    pub method: MetricMethod,
    /// Target value, required for [`MetricMethod::Nominal`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

impl MetricSpec {
    /// The S/N variant for this metric.
    pub fn sn_type(&self) -> Result<SnType> {
        match self.method {
            MetricMethod::LargerIsBetter => Ok(SnType::LargerIsBetter),
            MetricMethod::SmallerIsBetter => Ok(SnType::SmallerIsBetter),
            MetricMethod::Nominal => {
                let target = self.target.ok_or_else(|| {
                    EngineError::Config(format!(
                        "metric '{}' uses Nominal but declares no target",
                        self.name
                    ))
                })?;
                Ok(SnType::Nominal { target })
            }
        }
    }
}

/// A tunable parameter as written in the configuration.
///
/// Exactly one of `levels`, `floatRange`, `intRange` supplies the level
/// values; at least one of `cliArg`/`envVar` names the slot the value is
/// injected through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_arg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub float_range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_range: Option<[i64; 2]>,
}

/// A factor with its levels fully materialized.
///
/// OA symbol `i` (1-based) selects `values[i - 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_arg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
    pub values: Vec<String>,
}

impl Factor {
    /// Number of discrete levels.
    pub fn level_count(&self) -> usize {
        self.values.len()
    }

    /// The value string bound to a 1-based OA symbol.
    pub fn value_for_symbol(&self, symbol: u8) -> Option<&str> {
        self.values.get(symbol as usize - 1).map(String::as_str)
    }
}

/// A requested two-factor interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSpec {
    pub first_factor_name: String,
    pub second_factor_name: String,
}

fn default_repetitions() -> usize {
    1
}

fn default_output_directory() -> String {
    "taguchi-output".to_string()
}

fn default_pooling_threshold() -> f64 {
    5.0
}

/// Top-level experiment configuration, immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    pub target_executable_path: String,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub show_target_output: bool,
    #[serde(default = "default_pooling_threshold")]
    pub pooling_threshold_percentage: f64,
    pub metrics_to_analyze: Vec<MetricSpec>,
    /// Ordered; `None` values are emitted as bare flags.
    #[serde(default)]
    pub fixed_command_line_arguments: IndexMap<String, Option<String>>,
    #[serde(default)]
    pub fixed_environment_variables: BTreeMap<String, String>,
    pub control_factors: Vec<FactorSpec>,
    #[serde(default)]
    pub noise_factors: Vec<FactorSpec>,
    #[serde(default)]
    pub interactions: Vec<InteractionSpec>,
}

impl ExperimentConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EngineError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: ExperimentConfig = serde_yaml::from_str(&text).map_err(|e| {
            EngineError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every structural rule the schema imposes.
    pub fn validate(&self) -> Result<()> {
        if self.repetitions < 1 {
            return Err(EngineError::Config("repetitions must be >= 1".into()));
        }
        if self.target_executable_path.trim().is_empty() {
            return Err(EngineError::Config(
                "targetExecutablePath is required".into(),
            ));
        }
        if self.metrics_to_analyze.is_empty() {
            return Err(EngineError::Config(
                "metricsToAnalyze must list at least one metric".into(),
            ));
        }
        let mut metric_names = HashSet::new();
        for metric in &self.metrics_to_analyze {
            if !metric_names.insert(metric.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate metric name '{}'",
                    metric.name
                )));
            }
            metric.sn_type()?;
        }
        if self.control_factors.is_empty() {
            return Err(EngineError::Config(
                "controlFactors must list at least one factor".into(),
            ));
        }

        let mut factor_names = HashSet::new();
        for spec in self.control_factors.iter().chain(&self.noise_factors) {
            if !factor_names.insert(spec.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate factor name '{}'",
                    spec.name
                )));
            }
            validate_factor_spec(spec)?;
        }

        let control_names: HashSet<&str> = self
            .control_factors
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        let mut seen_pairs = HashSet::new();
        for inter in &self.interactions {
            if inter.first_factor_name == inter.second_factor_name {
                return Err(EngineError::Config(format!(
                    "interaction pairs factor '{}' with itself",
                    inter.first_factor_name
                )));
            }
            for name in [&inter.first_factor_name, &inter.second_factor_name] {
                if !control_names.contains(name.as_str()) {
                    return Err(EngineError::Config(format!(
                        "interaction references unknown control factor '{name}'"
                    )));
                }
            }
            let mut pair = [
                inter.first_factor_name.as_str(),
                inter.second_factor_name.as_str(),
            ];
            pair.sort_unstable();
            if !seen_pairs.insert(pair) {
                return Err(EngineError::Config(format!(
                    "interaction {}*{} is listed twice",
                    pair[0], pair[1]
                )));
            }
        }

        // Control factors enter the OA and need at least two levels; a noise
        // factor degenerating to a single level is legal (it just stops
        // varying across repetitions).
        for spec in &self.control_factors {
            if resolve_levels(spec, CONTROL_RANGE_LEVELS)?.len() < 2 {
                return Err(EngineError::Config(format!(
                    "control factor '{}' must provide at least two levels",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    /// Control factors with ranges expanded to discrete levels.
    pub fn resolved_control_factors(&self) -> Result<Vec<Factor>> {
        self.control_factors
            .iter()
            .map(|s| resolve_factor(s, CONTROL_RANGE_LEVELS))
            .collect()
    }

    /// Noise factors with ranges expanded to discrete levels.
    pub fn resolved_noise_factors(&self) -> Result<Vec<Factor>> {
        self.noise_factors
            .iter()
            .map(|s| resolve_factor(s, NOISE_RANGE_LEVELS))
            .collect()
    }

    /// Interactions with operands in canonical (lexicographic) order.
    pub fn canonical_interactions(&self) -> Vec<(String, String)> {
        self.interactions
            .iter()
            .map(|i| {
                let (a, b) = (&i.first_factor_name, &i.second_factor_name);
                if a <= b {
                    (a.clone(), b.clone())
                } else {
                    (b.clone(), a.clone())
                }
            })
            .collect()
    }

    /// SHA-256 over a canonical serialization: JSON with sorted object keys
    /// and level vectors in declaration order, so semantically equal
    /// configurations hash identically.
    pub fn canonical_hash(&self) -> String {
        // serde_json maps sort keys when preserve_order is off.
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let canonical = value.to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        digest.iter().fold(String::with_capacity(64), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        })
    }
}

fn validate_factor_spec(spec: &FactorSpec) -> Result<()> {
    if spec.cli_arg.is_none() && spec.env_var.is_none() {
        return Err(EngineError::Config(format!(
            "factor '{}' needs a cliArg or an envVar",
            spec.name
        )));
    }
    let sources = [
        spec.levels.is_some(),
        spec.float_range.is_some(),
        spec.int_range.is_some(),
    ]
    .iter()
    .filter(|b| **b)
    .count();
    if sources != 1 {
        return Err(EngineError::Config(format!(
            "factor '{}' must declare exactly one of levels, floatRange, intRange",
            spec.name
        )));
    }
    if let Some(levels) = &spec.levels
        && levels.len() < 2
    {
        return Err(EngineError::Config(format!(
            "factor '{}' lists fewer than two levels",
            spec.name
        )));
    }
    if let Some([min, max]) = spec.float_range
        && min >= max
    {
        return Err(EngineError::Config(format!(
            "factor '{}' has an empty floatRange [{min}, {max}]",
            spec.name
        )));
    }
    if let Some([min, max]) = spec.int_range
        && min > max
    {
        return Err(EngineError::Config(format!(
            "factor '{}' has an empty intRange [{min}, {max}]",
            spec.name
        )));
    }
    Ok(())
}

fn resolve_factor(spec: &FactorSpec, range_levels: usize) -> Result<Factor> {
    Ok(Factor {
        name: spec.name.clone(),
        cli_arg: spec.cli_arg.clone(),
        env_var: spec.env_var.clone(),
        values: resolve_levels(spec, range_levels)?,
    })
}

fn resolve_levels(spec: &FactorSpec, range_levels: usize) -> Result<Vec<String>> {
    if let Some(levels) = &spec.levels {
        return Ok(levels.clone());
    }
    if let Some([min, max]) = spec.float_range {
        let n = range_levels.max(2);
        let step = (max - min) / (n - 1) as f64;
        return Ok((0..n)
            .map(|i| format_level(min + step * i as f64))
            .collect());
    }
    if let Some([min, max]) = spec.int_range {
        let span = (max - min + 1) as usize;
        let n = range_levels.min(span).max(1);
        let mut values: Vec<i64> = if n == 1 {
            vec![min]
        } else {
            (0..n)
                .map(|i| {
                    let frac = i as f64 / (n - 1) as f64;
                    min + ((max - min) as f64 * frac).round() as i64
                })
                .collect()
        };
        values.dedup();
        return Ok(values.into_iter().map(|v| v.to_string()).collect());
    }
    Err(EngineError::Config(format!(
        "factor '{}' declares no level source",
        spec.name
    )))
}

/// Render an expanded numeric level without float noise.
fn format_level(v: f64) -> String {
    let s = format!("{v:.9}");
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(name: &str) -> FactorSpec {
        FactorSpec {
            name: name.into(),
            cli_arg: Some(format!("--{name}")),
            env_var: None,
            levels: Some(vec!["1".into(), "2".into()]),
            float_range: None,
            int_range: None,
        }
    }

    fn minimal_config() -> ExperimentConfig {
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
            fixed_command_line_arguments: IndexMap::new(),
            fixed_environment_variables: BTreeMap::new(),
            control_factors: vec![factor("alpha"), factor("beta")],
            noise_factors: vec![],
            interactions: vec![],
        }
    }

    #[test]
    fn duplicate_factor_names_are_rejected() {
        let mut config = minimal_config();
        config.noise_factors.push(factor("alpha"));
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn nominal_metric_requires_target() {
        let mut config = minimal_config();
        config.metrics_to_analyze[0].method = MetricMethod::Nominal;
        assert!(config.validate().is_err());
        config.metrics_to_analyze[0].target = Some(3.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn interaction_on_unknown_factor_is_rejected() {
        let mut config = minimal_config();
        config.interactions.push(InteractionSpec {
            first_factor_name: "alpha".into(),
            second_factor_name: "gamma".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn self_interaction_is_rejected() {
        let mut config = minimal_config();
        config.interactions.push(InteractionSpec {
            first_factor_name: "alpha".into(),
            second_factor_name: "alpha".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn float_range_expands_to_three_control_levels() {
        let spec = FactorSpec {
            levels: None,
            float_range: Some([0.0, 1.0]),
            ..factor("lr")
        };
        let resolved = resolve_factor(&spec, CONTROL_RANGE_LEVELS).unwrap();
        assert_eq!(resolved.values, vec!["0", "0.5", "1"]);
    }

    #[test]
    fn short_int_range_reduces_level_count() {
        let spec = FactorSpec {
            levels: None,
            int_range: Some([4, 5]),
            ..factor("threads")
        };
        let resolved = resolve_factor(&spec, CONTROL_RANGE_LEVELS).unwrap();
        assert_eq!(resolved.values, vec!["4", "5"]);
    }

    #[test]
    fn int_range_expands_with_rounding() {
        let spec = FactorSpec {
            levels: None,
            int_range: Some([0, 10]),
            ..factor("batch")
        };
        let resolved = resolve_factor(&spec, CONTROL_RANGE_LEVELS).unwrap();
        assert_eq!(resolved.values, vec!["0", "5", "10"]);
    }

    #[test]
    fn canonical_hash_is_stable_and_sensitive() {
        let config = minimal_config();
        let h1 = config.canonical_hash();
        let h2 = config.clone().canonical_hash();
        assert_eq!(h1, h2);
        let mut changed = config;
        changed.repetitions = 2;
        assert_ne!(h1, changed.canonical_hash());
    }

    #[test]
    fn canonical_interactions_sort_operands() {
        let mut config = minimal_config();
        config.interactions.push(InteractionSpec {
            first_factor_name: "beta".into(),
            second_factor_name: "alpha".into(),
        });
        assert_eq!(
            config.canonical_interactions(),
            vec![("alpha".to_string(), "beta".to_string())]
        );
    }
}
