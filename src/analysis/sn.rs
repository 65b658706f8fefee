//! Signal-to-noise ratios.
//!
//! The three Taguchi S/N variants as one tagged type with a single dispatch
//! function. Higher is always more desirable, whatever the variant.

use serde::{Deserialize, Serialize};

/// Saturation bound in dB; keeps degenerate inputs away from ±∞.
pub const SN_CAP_DB: f64 = 200.0;

/// Values this close to zero are clamped before the reciprocal-square sum.
const ZERO_CLAMP: f64 = 1e-9;

/// Optimization mode of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum SnType {
    LargerIsBetter,
    SmallerIsBetter,
    Nominal { target: f64 },
}

impl SnType {
    /// S/N ratio of a sample, in dB. NaN entries are skipped; an all-NaN
    /// sample yields NaN.
    ///
    /// - Larger-is-better: `−10·log10(mean(1/yᵢ²))`, near-zero values
    ///   clamped to ±1e-9.
    /// - Smaller-is-better: `−10·log10(mean(yᵢ²))`.
    /// - Nominal-is-best: `−10·log10(mean((yᵢ−τ)²))`.
    ///
    /// A zero mean squared deviation saturates at +200 dB instead of +∞.
    pub fn sn_ratio(&self, values: &[f64]) -> f64 {
        let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if valid.is_empty() {
            return f64::NAN;
        }
        let n = valid.len() as f64;
        let msd = match self {
            SnType::LargerIsBetter => {
                valid
                    .iter()
                    .map(|&y| {
                        let y = clamp_away_from_zero(y);
                        1.0 / (y * y)
                    })
                    .sum::<f64>()
                    / n
            }
            SnType::SmallerIsBetter => valid.iter().map(|&y| y * y).sum::<f64>() / n,
            SnType::Nominal { target } => {
                valid.iter().map(|&y| (y - target).powi(2)).sum::<f64>() / n
            }
        };
        let sn = -10.0 * msd.log10();
        if sn.is_nan() {
            return f64::NAN;
        }
        sn.clamp(-SN_CAP_DB, SN_CAP_DB)
    }

    /// Map an S/N ratio back to the original metric scale.
    ///
    /// For nominal-is-best the point estimate is the target itself; the
    /// spread estimate lives with the prediction, not here.
    pub fn inverse_sn(&self, sn: f64) -> f64 {
        match self {
            SnType::LargerIsBetter => 10f64.powf(sn / 20.0),
            SnType::SmallerIsBetter => 10f64.powf(-sn / 20.0),
            SnType::Nominal { target } => *target,
        }
    }

    /// Short human-readable name, used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            SnType::LargerIsBetter => "larger-is-better",
            SnType::SmallerIsBetter => "smaller-is-better",
            SnType::Nominal { .. } => "nominal-is-best",
        }
    }
}

fn clamp_away_from_zero(y: f64) -> f64 {
    if y.abs() < ZERO_CLAMP {
        ZERO_CLAMP.copysign(y)
    } else {
        y
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn larger_is_better_matches_hand_computation() {
        let sn = SnType::LargerIsBetter.sn_ratio(&[10.0]);
        // mean(1/y^2) = 0.01 -> -10*log10 = 20 dB
        assert_relative_eq!(sn, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn smaller_is_better_matches_hand_computation() {
        let sn = SnType::SmallerIsBetter.sn_ratio(&[5.0]);
        // mean(y^2) = 25 -> -10*log10(25)
        assert_relative_eq!(sn, -10.0 * 25f64.log10(), epsilon = 1e-9);
    }

    #[test]
    fn nominal_hits_the_cap_on_exact_target() {
        let sn = SnType::Nominal { target: 3.0 }.sn_ratio(&[3.0, 3.0]);
        assert_relative_eq!(sn, SN_CAP_DB);
    }

    #[test]
    fn smaller_is_better_saturates_on_zeros() {
        let sn = SnType::SmallerIsBetter.sn_ratio(&[0.0, 0.0]);
        assert_relative_eq!(sn, SN_CAP_DB);
    }

    #[test]
    fn larger_is_better_clamps_near_zero_values() {
        let sn = SnType::LargerIsBetter.sn_ratio(&[0.0]);
        // clamped to 1e-9 -> msd = 1e18 -> -180 dB
        assert_relative_eq!(sn, -180.0, epsilon = 1e-6);
    }

    #[test]
    fn nan_entries_are_skipped_and_all_nan_returns_nan() {
        let sn = SnType::LargerIsBetter.sn_ratio(&[f64::NAN, 10.0]);
        assert_relative_eq!(sn, 20.0, epsilon = 1e-9);
        assert!(
            SnType::LargerIsBetter
                .sn_ratio(&[f64::NAN, f64::NAN])
                .is_nan()
        );
        assert!(SnType::SmallerIsBetter.sn_ratio(&[]).is_nan());
    }

    #[test]
    fn adding_a_better_value_increases_the_ratio() {
        let base = [10.0, 12.0, 11.0];

        let ltb = SnType::LargerIsBetter;
        let better = [10.0, 12.0, 11.0, 20.0];
        assert!(ltb.sn_ratio(&better) > ltb.sn_ratio(&base));

        let stb = SnType::SmallerIsBetter;
        let smaller = [10.0, 12.0, 11.0, 1.0];
        assert!(stb.sn_ratio(&smaller) > stb.sn_ratio(&base));

        let nominal = SnType::Nominal { target: 11.0 };
        let closer = [10.0, 12.0, 11.0, 11.0];
        assert!(nominal.sn_ratio(&closer) > nominal.sn_ratio(&base));
    }

    #[test]
    fn inverse_round_trips_the_monotone_variants() {
        let ltb = SnType::LargerIsBetter;
        assert_relative_eq!(ltb.inverse_sn(ltb.sn_ratio(&[50.0])), 50.0, epsilon = 1e-9);
        let stb = SnType::SmallerIsBetter;
        assert_relative_eq!(stb.inverse_sn(stb.sn_ratio(&[0.25])), 0.25, epsilon = 1e-9);
        let nominal = SnType::Nominal { target: 7.5 };
        assert_relative_eq!(nominal.inverse_sn(12.0), 7.5);
    }
}
