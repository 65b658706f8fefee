//! Prediction of the optimal configuration's performance.
//!
//! Taguchi's additive model: grand mean plus the deviations of every
//! significant source at its optimal level, with a t-based confidence
//! interval scaled by the effective sample size, then inverted back to the
//! original metric scale.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::debug;

use super::anova::AnovaTable;
use super::effects::{FactorEffects, InteractionEffects, OptimalConfiguration};
use super::nan_mean;
use super::sn::SnType;
use crate::config::Factor;
use crate::oa::design::OrthogonalArrayDesign;

/// Confidence level of the reported interval.
const CONFIDENCE: f64 = 0.95;

/// A closed interval with `lower <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

/// Predicted performance at the optimal configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub metric_name: String,
    /// Additive-model estimate on the S/N scale; NaN when no S/N exists.
    pub predicted_sn: f64,
    /// 95% interval on the S/N scale, when an error term exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn_interval: Option<Interval>,
    /// Point estimate on the original metric scale.
    pub predicted_value: f64,
    /// 95% interval on the original scale; bounds re-sorted after a
    /// smaller-is-better inversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_interval: Option<Interval>,
    /// Effective sample size `runs / DF_model`.
    pub n_eff: f64,
    /// How the estimate was obtained, including any fallback taken.
    pub notes: Vec<String>,
}

/// Everything the predictor needs from the analysis so far.
pub struct PredictionInput<'a> {
    pub metric_name: &'a str,
    pub sn_type: SnType,
    pub design: &'a OrthogonalArrayDesign,
    pub factors: &'a [Factor],
    pub optimal: &'a OptimalConfiguration,
    pub main_effects: &'a [FactorEffects],
    pub interaction_effects: &'a [InteractionEffects],
    /// The pooled table when one exists, the initial table otherwise.
    pub anova: Option<&'a AnovaTable>,
    pub sn_per_run: &'a [f64],
    pub raw_mean_per_run: &'a [f64],
}

/// Predict the optimal configuration's S/N and metric value.
pub fn predict(input: &PredictionInput<'_>) -> PredictionResult {
    let mut notes = Vec::new();
    if matches!(input.sn_type, SnType::Nominal { .. }) {
        notes.push(
            "nominal-is-best S/N is -10*log10(mean squared deviation from target)".into(),
        );
    }
    let runs = input.design.runs();

    let valid_sn: Vec<f64> = input
        .sn_per_run
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();

    if valid_sn.is_empty() {
        notes.push("no finite S/N ratios; falling back to raw averages".into());
        return fallback(input, f64::NAN, notes);
    }

    let grand_mean = valid_sn.iter().sum::<f64>() / valid_sn.len() as f64;

    // Accumulate deviations of significant sources at their optimal levels.
    let mut predicted_sn = grand_mean;
    let mut model_df = 1usize;
    if let Some(table) = input.anova {
        for source in table.significant_sources() {
            if let Some(effects) = input
                .main_effects
                .iter()
                .find(|fe| fe.factor_name == source.name)
            {
                let Some(level) = input.optimal.symbol_of(&source.name) else {
                    continue;
                };
                let level_sn = effects.sn_at(level);
                if level_sn.is_finite() {
                    predicted_sn += level_sn - grand_mean;
                    model_df += source.degrees_of_freedom;
                }
            } else if let Some(inter) = input
                .interaction_effects
                .iter()
                .find(|ie| ie.key == source.name)
            {
                let (Some(la), Some(lb)) = (
                    input.optimal.symbol_of(&inter.first_factor),
                    input.optimal.symbol_of(&inter.second_factor),
                ) else {
                    continue;
                };
                let cell_sn = inter.sn_at(la, lb);
                if cell_sn.is_finite() {
                    predicted_sn += cell_sn - grand_mean;
                    model_df += source.degrees_of_freedom;
                } else {
                    notes.push(format!(
                        "optimal pair for {} was never run; its deviation is omitted",
                        inter.key
                    ));
                }
            }
        }
    }

    let n_eff = runs as f64 / model_df as f64;
    debug!(predicted_sn, n_eff, model_df, "additive prediction");

    // The interval needs a usable error term.
    let error = input
        .anova
        .filter(|t| t.error_df > 0 && t.error_ms.is_finite() && t.error_ms >= 0.0);
    let Some(table) = error else {
        notes.push(
            "no valid error term for a confidence interval; falling back to raw averages".into(),
        );
        return fallback(input, predicted_sn, notes);
    };

    let margin = match t_quantile(1.0 - (1.0 - CONFIDENCE) / 2.0, table.error_df as f64) {
        Some(t) => t * (table.error_ms / n_eff).sqrt(),
        None => {
            notes.push("t quantile unavailable; falling back to raw averages".into());
            return fallback(input, predicted_sn, notes);
        }
    };
    if margin == 0.0 {
        notes.push("error variance is zero; the interval has zero width".into());
    }

    let sn_interval = Interval {
        lower: predicted_sn - margin,
        upper: predicted_sn + margin,
    };

    let predicted_value = input.sn_type.inverse_sn(predicted_sn);
    let value_interval = match input.sn_type {
        SnType::LargerIsBetter => Interval {
            lower: input.sn_type.inverse_sn(sn_interval.lower),
            upper: input.sn_type.inverse_sn(sn_interval.upper),
        },
        SnType::SmallerIsBetter => {
            // The inversion is decreasing; re-sort so lower <= upper. The
            // lower bound is now the optimistic side.
            notes.push(
                "smaller-is-better inversion reverses bound order; lower is the optimistic side"
                    .into(),
            );
            Interval {
                lower: input.sn_type.inverse_sn(sn_interval.upper),
                upper: input.sn_type.inverse_sn(sn_interval.lower),
            }
        }
        SnType::Nominal { target } => {
            // Spread estimate from the pessimistic end of the S/N interval.
            let sigma = (10f64.powf(-sn_interval.lower / 10.0)).sqrt();
            notes.push(
                "the value interval is the target plus/minus the deviation implied by the \
                 pessimistic S/N bound"
                    .into(),
            );
            Interval {
                lower: target - sigma,
                upper: target + sigma,
            }
        }
    };

    PredictionResult {
        metric_name: input.metric_name.to_string(),
        predicted_sn,
        sn_interval: Some(sn_interval),
        predicted_value,
        value_interval: Some(value_interval),
        n_eff,
        notes,
    }
}

/// Two-sided t quantile.
fn t_quantile(p: f64, df: f64) -> Option<f64> {
    if !(0.0..1.0).contains(&p) || df <= 0.0 {
        return None;
    }
    StudentsT::new(0.0, 1.0, df)
        .ok()
        .map(|dist| dist.inverse_cdf(p))
}

/// Estimate the optimal configuration's value from raw data: the mean over
/// runs exactly matching the optimal settings, or the grand raw mean.
fn fallback(input: &PredictionInput<'_>, predicted_sn: f64, mut notes: Vec<String>) -> PredictionResult {
    let matching: Vec<f64> = (0..input.design.runs())
        .filter(|&run| {
            input.factors.iter().all(|factor| {
                match (
                    input.design.factor_column(&factor.name),
                    input.optimal.symbol_of(&factor.name),
                ) {
                    (Some(column), Some(symbol)) => input.design.symbol(run, column) == symbol,
                    _ => false,
                }
            })
        })
        .map(|run| input.raw_mean_per_run[run])
        .filter(|v| v.is_finite())
        .collect();

    let predicted_value = if matching.is_empty() {
        notes.push("no run matches the optimal configuration; using the grand raw mean".into());
        nan_mean(input.raw_mean_per_run)
    } else {
        notes.push(format!(
            "estimated from {} run(s) exactly matching the optimal configuration",
            matching.len()
        ));
        matching.iter().sum::<f64>() / matching.len() as f64
    };

    PredictionResult {
        metric_name: input.metric_name.to_string(),
        predicted_sn,
        sn_interval: None,
        predicted_value,
        value_interval: None,
        n_eff: f64::NAN,
        notes,
    }
}
