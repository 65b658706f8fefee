//! ANOVA on orthogonal-array columns.
//!
//! Sum-of-squares decomposition of the per-run S/N vector over the assigned
//! columns, F tests against the residual, percent contributions, pooling of
//! weak sources, and 2-level effect estimates. Numerical trouble surfaces as
//! warnings on the table; the decomposition itself always completes.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use tracing::debug;

use crate::config::Factor;
use crate::oa::design::{OrthogonalArrayDesign, interaction_key};

/// Mean squares below this are treated as a zero error variance.
const MS_ERROR_FLOOR: f64 = 1e-12;
/// Negative residual SS within this magnitude is rounding, clamped to zero.
const NEGATIVE_SS_TOLERANCE: f64 = 1e-9;
/// Below this the total SS counts as zero and contributions are reported as 0.
const TOTAL_SS_FLOOR: f64 = 1e-12;
/// Significance level for F tests.
const ALPHA: f64 = 0.05;

/// One modeled source of variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnovaSource {
    /// Factor name or canonical interaction key.
    pub name: String,
    pub sum_of_squares: f64,
    pub degrees_of_freedom: usize,
    pub mean_square: f64,
    /// NaN when the design is saturated or the error variance vanishes.
    pub f_ratio: f64,
    pub p_value: f64,
    pub contribution_percent: f64,
    pub significant: bool,
    /// True in a pooled table for sources absorbed into the error term.
    pub pooled: bool,
}

/// A complete ANOVA table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnovaTable {
    pub sources: Vec<AnovaSource>,
    /// `Error` initially, `Error (Pooled)` after pooling.
    pub error_label: String,
    pub error_ss: f64,
    /// Negative when more degrees of freedom are modeled than exist.
    pub error_df: i64,
    pub error_ms: f64,
    pub total_ss: f64,
    pub total_df: usize,
    pub warnings: Vec<String>,
}

impl AnovaTable {
    /// Sources that pass the F test (and are not pooled away).
    pub fn significant_sources(&self) -> impl Iterator<Item = &AnovaSource> {
        self.sources.iter().filter(|s| s.significant && !s.pooled)
    }
}

/// Effect estimate for a 2-level column: mean(S/N at 2) − mean(S/N at 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectEstimate {
    pub name: String,
    pub effect: f64,
}

/// Right-tailed p-value of an F statistic.
fn f_p_value(f: f64, df1: f64, df2: f64) -> f64 {
    if !f.is_finite() || df1 <= 0.0 || df2 <= 0.0 {
        return f64::NAN;
    }
    match FisherSnedecor::new(df1, df2) {
        Ok(dist) => 1.0 - dist.cdf(f.max(0.0)),
        Err(_) => f64::NAN,
    }
}

/// Sum of squares of one OA column against the correction factor, counting
/// only rows with a finite S/N.
fn column_sum_of_squares(
    design: &OrthogonalArrayDesign,
    column: usize,
    sn: &[f64],
    correction_factor: f64,
) -> f64 {
    let levels = design.column_level_count(column);
    let mut ss = 0.0;
    for level in 1..=levels {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (run, &value) in sn.iter().enumerate() {
            if value.is_finite() && design.symbol(run, column) == level {
                sum += value;
                count += 1;
            }
        }
        if count > 0 {
            ss += sum * sum / count as f64;
        }
    }
    ss - correction_factor
}

/// Build the initial (unpooled) ANOVA table.
pub fn compute_initial(
    design: &OrthogonalArrayDesign,
    factors: &[Factor],
    interactions: &[(String, String)],
    sn: &[f64],
) -> AnovaTable {
    let mut warnings = Vec::new();
    let valid: Vec<f64> = sn.iter().copied().filter(|v| v.is_finite()).collect();
    let n_valid = valid.len();
    if n_valid == 0 {
        return AnovaTable {
            sources: Vec::new(),
            error_label: "Error".into(),
            error_ss: f64::NAN,
            error_df: 0,
            error_ms: f64::NAN,
            total_ss: f64::NAN,
            total_df: 0,
            warnings: vec!["no finite S/N values; ANOVA skipped".into()],
        };
    }

    let sum: f64 = valid.iter().sum();
    let mean = sum / n_valid as f64;
    let correction_factor = sum * sum / n_valid as f64;
    let total_ss: f64 = valid.iter().map(|v| (v - mean).powi(2)).sum();
    let total_df = n_valid - 1;

    // Raw SS/DF per source.
    let mut raw: Vec<(String, f64, usize)> = Vec::new();
    for factor in factors {
        let Some(column) = design.factor_column(&factor.name) else {
            continue;
        };
        let ss = column_sum_of_squares(design, column, sn, correction_factor);
        raw.push((factor.name.clone(), ss, factor.level_count() - 1));
    }
    for (a, b) in interactions {
        let columns = design.interaction_columns(a, b);
        let key = interaction_key(a, b);
        if columns.is_empty() {
            warnings.push(format!("interaction {key} has no assigned column; skipped"));
            continue;
        }
        let ss: f64 = columns
            .iter()
            .map(|&c| column_sum_of_squares(design, c, sn, correction_factor))
            .sum();
        let df_a = level_count(factors, a).saturating_sub(1);
        let df_b = level_count(factors, b).saturating_sub(1);
        raw.push((key, ss, df_a * df_b));
    }

    let modeled_ss: f64 = raw.iter().map(|(_, ss, _)| ss).sum();
    let modeled_df: usize = raw.iter().map(|(_, _, df)| df).sum();
    let mut error_ss = total_ss - modeled_ss;
    let error_df = total_df as i64 - modeled_df as i64;

    let mut unreliable = false;
    if error_ss < 0.0 {
        if error_ss.abs() < NEGATIVE_SS_TOLERANCE {
            error_ss = 0.0;
        } else {
            unreliable = true;
            warnings.push(format!(
                "residual sum of squares is negative ({error_ss:.6e}); statistics are unreliable"
            ));
        }
    }

    let error_ms = if error_df > 0 {
        error_ss / error_df as f64
    } else {
        f64::NAN
    };

    if error_df <= 0 {
        warnings.push("saturated design: no degrees of freedom remain for error".into());
    } else if error_ms < MS_ERROR_FLOOR {
        warnings.push("error variance is zero or near zero; F tests are unreliable".into());
    }
    let zero_total = total_ss < TOTAL_SS_FLOOR;
    if zero_total {
        warnings.push("total sum of squares is zero; every contribution is zero".into());
    }

    let mut nan_p_seen = false;
    let sources: Vec<AnovaSource> = raw
        .into_iter()
        .map(|(name, ss, df)| {
            let ms = if df > 0 { ss / df as f64 } else { f64::NAN };
            let (f_ratio, p_value) = if unreliable || error_df <= 0 || error_ms < MS_ERROR_FLOOR {
                (f64::NAN, f64::NAN)
            } else {
                let f = ms / error_ms;
                let p = f_p_value(f, df as f64, error_df as f64);
                if p.is_nan() {
                    nan_p_seen = true;
                }
                (f, p)
            };
            let contribution_percent = if unreliable {
                f64::NAN
            } else if zero_total {
                0.0
            } else {
                100.0 * ss / total_ss
            };
            AnovaSource {
                name,
                sum_of_squares: ss,
                degrees_of_freedom: df,
                mean_square: ms,
                f_ratio,
                p_value,
                contribution_percent,
                significant: p_value < ALPHA,
                pooled: false,
            }
        })
        .collect();
    if nan_p_seen {
        warnings.push("p-value undefined for an extreme F statistic".into());
    }

    AnovaTable {
        sources,
        error_label: "Error".into(),
        error_ss: if unreliable { f64::NAN } else { error_ss },
        error_df,
        error_ms,
        total_ss,
        total_df,
        warnings,
    }
}

fn level_count(factors: &[Factor], name: &str) -> usize {
    factors
        .iter()
        .find(|f| f.name == name)
        .map_or(0, Factor::level_count)
}

/// Pool weak sources into the error term and re-test the rest.
///
/// When nothing is significant, the single weakest source is pooled (by F,
/// or by contribution when the design is saturated). Otherwise every
/// non-significant source whose contribution falls below
/// `threshold_percent` is pooled. Returns `None` when no source qualifies.
pub fn pooled_table(initial: &AnovaTable, threshold_percent: f64) -> Option<AnovaTable> {
    if initial.sources.is_empty() || !initial.total_ss.is_finite() {
        return None;
    }

    let any_significant = initial.sources.iter().any(|s| s.significant);
    let pooled_names: Vec<String> = if any_significant {
        initial
            .sources
            .iter()
            .filter(|s| {
                !s.significant
                    && s.contribution_percent.is_finite()
                    && s.contribution_percent < threshold_percent
            })
            .map(|s| s.name.clone())
            .collect()
    } else {
        // Saturated or uniformly weak: sacrifice the single weakest source
        // to manufacture an error term.
        let weakest = initial.sources.iter().min_by(|a, b| {
            let key = |s: &AnovaSource| {
                if s.f_ratio.is_finite() {
                    (0u8, s.f_ratio)
                } else if s.contribution_percent.is_finite() {
                    (1u8, s.contribution_percent)
                } else {
                    (2u8, s.sum_of_squares)
                }
            };
            let (ka, va) = key(a);
            let (kb, vb) = key(b);
            ka.cmp(&kb)
                .then(va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal))
        });
        weakest.map(|s| vec![s.name.clone()]).unwrap_or_default()
    };

    if pooled_names.is_empty() || pooled_names.len() == initial.sources.len() {
        return None;
    }
    debug!(?pooled_names, "pooling sources into error");

    let pooled_ss: f64 = initial
        .sources
        .iter()
        .filter(|s| pooled_names.contains(&s.name))
        .map(|s| s.sum_of_squares.max(0.0))
        .sum();
    let pooled_df: usize = initial
        .sources
        .iter()
        .filter(|s| pooled_names.contains(&s.name))
        .map(|s| s.degrees_of_freedom)
        .sum();

    let error_ss = initial.error_ss.max(0.0) + pooled_ss;
    let error_df = initial.error_df + pooled_df as i64;
    let error_ms = if error_df > 0 {
        error_ss / error_df as f64
    } else {
        f64::NAN
    };

    let mut warnings = Vec::new();
    if error_df <= 0 {
        warnings.push("pooled design still has no error degrees of freedom".into());
    } else if error_ms < MS_ERROR_FLOOR {
        warnings.push("pooled error variance is zero or near zero".into());
    }
    let zero_total = initial.total_ss < TOTAL_SS_FLOOR;

    let sources: Vec<AnovaSource> = initial
        .sources
        .iter()
        .map(|s| {
            let pooled = pooled_names.contains(&s.name);
            let (f_ratio, p_value) = if pooled || error_df <= 0 || error_ms < MS_ERROR_FLOOR {
                (f64::NAN, f64::NAN)
            } else {
                let f = s.mean_square / error_ms;
                (f, f_p_value(f, s.degrees_of_freedom as f64, error_df as f64))
            };
            let contribution_percent = if zero_total {
                0.0
            } else {
                100.0 * s.sum_of_squares / initial.total_ss
            };
            AnovaSource {
                name: s.name.clone(),
                sum_of_squares: s.sum_of_squares,
                degrees_of_freedom: s.degrees_of_freedom,
                mean_square: s.mean_square,
                f_ratio,
                p_value,
                contribution_percent,
                significant: p_value < ALPHA,
                pooled,
            }
        })
        .collect();

    Some(AnovaTable {
        sources,
        error_label: "Error (Pooled)".into(),
        error_ss,
        error_df,
        error_ms,
        total_ss: initial.total_ss,
        total_df: initial.total_df,
        warnings,
    })
}

/// Two-level effect estimates, largest magnitude first.
///
/// Only 2-level factor columns and 2×2 interaction columns qualify.
pub fn effect_estimates(
    design: &OrthogonalArrayDesign,
    factors: &[Factor],
    interactions: &[(String, String)],
    sn: &[f64],
) -> Vec<EffectEstimate> {
    let mut estimates = Vec::new();

    let column_effect = |column: usize| {
        let mut sums = [0.0f64; 2];
        let mut counts = [0usize; 2];
        for (run, &value) in sn.iter().enumerate() {
            if !value.is_finite() {
                continue;
            }
            let idx = usize::from(design.symbol(run, column)) - 1;
            sums[idx] += value;
            counts[idx] += 1;
        }
        if counts[0] == 0 || counts[1] == 0 {
            f64::NAN
        } else {
            sums[1] / counts[1] as f64 - sums[0] / counts[0] as f64
        }
    };

    for factor in factors {
        if factor.level_count() != 2 {
            continue;
        }
        if let Some(column) = design.factor_column(&factor.name) {
            estimates.push(EffectEstimate {
                name: factor.name.clone(),
                effect: column_effect(column),
            });
        }
    }
    for (a, b) in interactions {
        if level_count(factors, a) != 2 || level_count(factors, b) != 2 {
            continue;
        }
        let columns = design.interaction_columns(a, b);
        if let Some(&column) = columns.first() {
            estimates.push(EffectEstimate {
                name: interaction_key(a, b),
                effect: column_effect(column),
            });
        }
    }

    estimates.sort_by(|x, y| {
        y.effect
            .abs()
            .partial_cmp(&x.effect.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    estimates
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::oa::design::create_design;

    fn two_level_factor(name: &str) -> Factor {
        Factor {
            name: name.into(),
            cli_arg: Some(format!("--{name}")),
            env_var: None,
            values: vec!["1".into(), "2".into()],
        }
    }

    fn l4_design() -> (Vec<Factor>, OrthogonalArrayDesign) {
        let factors = vec![
            two_level_factor("A"),
            two_level_factor("B"),
            two_level_factor("C"),
        ];
        let design = create_design(&factors, &[]).unwrap();
        (factors, design)
    }

    #[test]
    fn decomposition_sums_to_the_total() {
        let (factors, design) = l4_design();
        let sn = vec![20.0, 26.0, 29.5, 32.0];
        let table = compute_initial(&design, &factors, &[], &sn);
        let modeled: f64 = table.sources.iter().map(|s| s.sum_of_squares).sum();
        assert_relative_eq!(
            modeled + table.error_ss,
            table.total_ss,
            epsilon = 1e-6 * table.total_ss.abs().max(1.0)
        );
    }

    #[test]
    fn saturated_design_yields_nan_tests_and_a_warning() {
        let (factors, design) = l4_design();
        let sn = vec![20.0, 26.0, 29.5, 32.0];
        let table = compute_initial(&design, &factors, &[], &sn);
        assert_eq!(table.error_df, 0);
        assert!(table.sources.iter().all(|s| s.f_ratio.is_nan()));
        assert!(table.sources.iter().all(|s| s.p_value.is_nan()));
        assert!(
            table
                .warnings
                .iter()
                .any(|w| w.contains("saturated design"))
        );
    }

    #[test]
    fn pooling_a_saturated_table_frees_error_degrees_of_freedom() {
        let (factors, design) = l4_design();
        let sn = vec![20.0, 26.0, 29.5, 32.0];
        let initial = compute_initial(&design, &factors, &[], &sn);
        let pooled = pooled_table(&initial, 5.0).expect("one source should pool");
        assert_eq!(pooled.error_label, "Error (Pooled)");
        assert!(pooled.error_df >= 1);
        assert!(pooled.error_df > initial.error_df);
        assert!(pooled.error_ss >= initial.error_ss);
        assert_eq!(pooled.sources.iter().filter(|s| s.pooled).count(), 1);
        // The weakest source (smallest contribution) is the one pooled.
        let weakest = initial
            .sources
            .iter()
            .min_by(|a, b| {
                a.contribution_percent
                    .partial_cmp(&b.contribution_percent)
                    .unwrap()
            })
            .unwrap();
        assert!(pooled.sources.iter().any(|s| s.pooled && s.name == weakest.name));
    }

    #[test]
    fn uniform_sn_reports_zero_contributions() {
        let (factors, design) = l4_design();
        let sn = vec![-13.97; 4];
        let table = compute_initial(&design, &factors, &[], &sn);
        assert!(table.total_ss < 1e-12);
        assert!(
            table
                .sources
                .iter()
                .all(|s| s.contribution_percent == 0.0)
        );
        assert!(
            table
                .warnings
                .iter()
                .any(|w| w.contains("total sum of squares is zero"))
        );
    }

    #[test]
    fn nan_rows_are_excluded_from_the_decomposition() {
        let (factors, design) = l4_design();
        let sn = vec![20.0, f64::NAN, 29.5, 32.0];
        let table = compute_initial(&design, &factors, &[], &sn);
        assert_eq!(table.total_df, 2);
        assert!(table.total_ss.is_finite());
    }

    #[test]
    fn effect_estimates_are_sorted_by_magnitude() {
        let (factors, design) = l4_design();
        let sn = vec![10.0, 11.0, 30.0, 31.0];
        let estimates = effect_estimates(&design, &factors, &[], &sn);
        assert_eq!(estimates.len(), 3);
        for pair in estimates.windows(2) {
            assert!(pair[0].effect.abs() >= pair[1].effect.abs());
        }
        // Column of factor A separates {10, 11} from {30, 31}: effect 20.
        let a = estimates.iter().find(|e| e.name == "A").unwrap();
        assert_relative_eq!(a.effect.abs(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn significant_source_survives_pooling_of_weak_ones() {
        // Four factors land on L8: a dominant one plus three weak ones.
        let factors = vec![
            two_level_factor("A"),
            two_level_factor("B"),
            two_level_factor("C"),
            two_level_factor("D"),
        ];
        let design = create_design(&factors, &[]).unwrap();
        assert_eq!(design.designation, "L8");
        let col_a = design.factor_column("A").unwrap();
        // A=2 rows get a large shift; other rows mild noise.
        let noise = [0.04, -0.01, 0.03, -0.05, 0.02, 0.01, -0.04, -0.03];
        let sn: Vec<f64> = (0..8)
            .map(|r| {
                let base = if design.symbol(r, col_a) == 2 { 10.0 } else { 0.0 };
                base + noise[r]
            })
            .collect();
        let initial = compute_initial(&design, &factors, &[], &sn);
        let a = initial.sources.iter().find(|s| s.name == "A").unwrap();
        assert!(a.significant, "dominant factor should be significant");
        let pooled = pooled_table(&initial, 5.0).expect("weak sources should pool");
        let a_pooled = pooled.sources.iter().find(|s| s.name == "A").unwrap();
        assert!(!a_pooled.pooled);
        assert!(a_pooled.significant);
        // B, C and D are all insignificant with sub-threshold contributions.
        assert_eq!(pooled.sources.iter().filter(|s| s.pooled).count(), 3);
    }
}
