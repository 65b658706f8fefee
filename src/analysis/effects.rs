//! Main and interaction effect tables, and the optimal-configuration search.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::nan_mean;
use crate::config::Factor;
use crate::oa::design::{LevelSelection, OrthogonalArrayDesign, interaction_key};

/// Per-level averages for one factor: S/N scale and raw scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorEffects {
    pub factor_name: String,
    pub sn_by_level: BTreeMap<u8, f64>,
    pub raw_by_level: BTreeMap<u8, f64>,
}

impl FactorEffects {
    /// Mean S/N at a level; NaN when the level never occurs.
    pub fn sn_at(&self, level: u8) -> f64 {
        self.sn_by_level.get(&level).copied().unwrap_or(f64::NAN)
    }

    /// The level with the highest mean S/N, ties broken toward the lowest
    /// symbol; level 1 when every mean is NaN.
    pub fn best_level(&self) -> u8 {
        let mut best = 1u8;
        let mut best_sn = f64::NAN;
        for (&level, &sn) in &self.sn_by_level {
            if sn.is_nan() {
                continue;
            }
            if best_sn.is_nan() || sn > best_sn {
                best = level;
                best_sn = sn;
            }
        }
        best
    }
}

/// One observed cell of an interaction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionCell {
    pub level_a: u8,
    pub level_b: u8,
    pub sn: f64,
}

/// Mean S/N per observed level pair of an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEffects {
    /// Canonical `A*B` key.
    pub key: String,
    pub first_factor: String,
    pub second_factor: String,
    pub cells: Vec<InteractionCell>,
}

impl InteractionEffects {
    /// Mean S/N for a level pair; NaN when no run realized it.
    pub fn sn_at(&self, level_a: u8, level_b: u8) -> f64 {
        self.cells
            .iter()
            .find(|c| c.level_a == level_a && c.level_b == level_b)
            .map_or(f64::NAN, |c| c.sn)
    }

    /// The non-NaN cell with the highest S/N, ties toward the lowest pair.
    pub fn best_cell(&self) -> Option<&InteractionCell> {
        self.cells
            .iter()
            .filter(|c| !c.sn.is_nan())
            .fold(None, |best: Option<&InteractionCell>, c| match best {
                Some(b) if c.sn <= b.sn => Some(b),
                _ => Some(c),
            })
    }
}

/// The predicted-best level for every factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OptimalConfiguration(pub BTreeMap<String, LevelSelection>);

impl OptimalConfiguration {
    pub fn symbol_of(&self, factor: &str) -> Option<u8> {
        self.0.get(factor).map(|s| s.symbol)
    }
}

/// Average the per-run S/N ratios (and raw means) by factor level.
pub fn main_effects(
    design: &OrthogonalArrayDesign,
    factors: &[Factor],
    sn_per_run: &[f64],
    raw_mean_per_run: &[f64],
) -> Vec<FactorEffects> {
    factors
        .iter()
        .filter_map(|factor| {
            let column = design.factor_column(&factor.name)?;
            let mut sn_by_level = BTreeMap::new();
            let mut raw_by_level = BTreeMap::new();
            for level in 1..=factor.level_count() as u8 {
                let rows: Vec<usize> = (0..design.runs())
                    .filter(|&r| design.symbol(r, column) == level)
                    .collect();
                let sn_values: Vec<f64> = rows.iter().map(|&r| sn_per_run[r]).collect();
                let raw_values: Vec<f64> = rows.iter().map(|&r| raw_mean_per_run[r]).collect();
                sn_by_level.insert(level, nan_mean(&sn_values));
                raw_by_level.insert(level, nan_mean(&raw_values));
            }
            Some(FactorEffects {
                factor_name: factor.name.clone(),
                sn_by_level,
                raw_by_level,
            })
        })
        .collect()
}

/// Average the per-run S/N ratios by observed level pair for each requested
/// interaction.
pub fn interaction_effects(
    design: &OrthogonalArrayDesign,
    factors: &[Factor],
    interactions: &[(String, String)],
    sn_per_run: &[f64],
) -> Vec<InteractionEffects> {
    interactions
        .iter()
        .filter_map(|(a, b)| {
            let col_a = design.factor_column(a)?;
            let col_b = design.factor_column(b)?;
            let levels_a = factors.iter().find(|f| &f.name == a)?.level_count() as u8;
            let levels_b = factors.iter().find(|f| &f.name == b)?.level_count() as u8;
            let mut cells = Vec::new();
            for la in 1..=levels_a {
                for lb in 1..=levels_b {
                    let values: Vec<f64> = (0..design.runs())
                        .filter(|&r| {
                            design.symbol(r, col_a) == la && design.symbol(r, col_b) == lb
                        })
                        .map(|r| sn_per_run[r])
                        .collect();
                    if values.is_empty() {
                        continue;
                    }
                    cells.push(InteractionCell {
                        level_a: la,
                        level_b: lb,
                        sn: nan_mean(&values),
                    });
                }
            }
            Some(InteractionEffects {
                key: interaction_key(a, b),
                first_factor: a.clone(),
                second_factor: b.clone(),
                cells,
            })
        })
        .collect()
}

/// Improvement threshold for adopting an interaction's preferred pair.
const ADJUSTMENT_EPSILON: f64 = 1e-6;

/// Choose the best level per factor, then let interactions pull pairs away
/// from the per-factor optimum when the combined gain is positive.
///
/// Runs at most `2·|factors|` passes and stops early after a pass that
/// changes nothing.
pub fn optimal_configuration(
    factors: &[Factor],
    main: &[FactorEffects],
    interactions: &[InteractionEffects],
) -> OptimalConfiguration {
    let mut current: BTreeMap<String, u8> = main
        .iter()
        .map(|fe| (fe.factor_name.clone(), fe.best_level()))
        .collect();

    let max_passes = 2 * factors.len().max(1);
    for pass in 0..max_passes {
        let mut changed = false;
        for inter in interactions {
            let Some(best) = inter.best_cell() else {
                continue;
            };
            let (Some(&cur_a), Some(&cur_b)) = (
                current.get(&inter.first_factor),
                current.get(&inter.second_factor),
            ) else {
                continue;
            };
            if (best.level_a, best.level_b) == (cur_a, cur_b) {
                continue;
            }
            let main_a = main.iter().find(|fe| fe.factor_name == inter.first_factor);
            let main_b = main.iter().find(|fe| fe.factor_name == inter.second_factor);
            let (Some(main_a), Some(main_b)) = (main_a, main_b) else {
                continue;
            };
            let delta_inter = best.sn - inter.sn_at(cur_a, cur_b);
            let delta_main = (main_a.sn_at(best.level_a) - main_a.sn_at(cur_a))
                + (main_b.sn_at(best.level_b) - main_b.sn_at(cur_b));
            if delta_inter + delta_main > ADJUSTMENT_EPSILON {
                debug!(
                    interaction = %inter.key,
                    pass,
                    gain = delta_inter + delta_main,
                    "adopting interaction-preferred level pair"
                );
                current.insert(inter.first_factor.clone(), best.level_a);
                current.insert(inter.second_factor.clone(), best.level_b);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let selections = current
        .into_iter()
        .filter_map(|(name, symbol)| {
            let factor = factors.iter().find(|f| f.name == name)?;
            let value = factor.value_for_symbol(symbol)?.to_string();
            Some((name, LevelSelection { symbol, value }))
        })
        .collect();
    OptimalConfiguration(selections)
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

    #[test]
    fn main_effects_average_matching_rows() {
        let factors = vec![
            two_level_factor("A"),
            two_level_factor("B"),
            two_level_factor("C"),
        ];
        let design = create_design(&factors, &[]).unwrap();
        // L4 rows in catalog order; give each row a distinct S/N.
        let sn = vec![1.0, 2.0, 3.0, 4.0];
        let raw = vec![10.0, 20.0, 30.0, 40.0];
        let effects = main_effects(&design, &factors, &sn, &raw);
        let a = effects.iter().find(|e| e.factor_name == "A").unwrap();
        let col = design.factor_column("A").unwrap();
        let expected_l1 = nan_mean(
            &(0..4)
                .filter(|&r| design.symbol(r, col) == 1)
                .map(|r| sn[r])
                .collect::<Vec<_>>(),
        );
        assert_relative_eq!(a.sn_at(1), expected_l1);
        assert_eq!(a.sn_by_level.len(), 2);
        assert_eq!(a.raw_by_level.len(), 2);
    }

    #[test]
    fn best_level_breaks_ties_toward_the_lowest_symbol() {
        let effects = FactorEffects {
            factor_name: "A".into(),
            sn_by_level: BTreeMap::from([(1, 5.0), (2, 5.0)]),
            raw_by_level: BTreeMap::new(),
        };
        assert_eq!(effects.best_level(), 1);
    }

    #[test]
    fn all_nan_levels_default_to_level_one() {
        let effects = FactorEffects {
            factor_name: "A".into(),
            sn_by_level: BTreeMap::from([(1, f64::NAN), (2, f64::NAN)]),
            raw_by_level: BTreeMap::new(),
        };
        assert_eq!(effects.best_level(), 1);
    }

    #[test]
    fn interaction_pull_overrides_main_effects_when_gain_is_positive() {
        let factors = vec![two_level_factor("A"), two_level_factor("B")];
        let main = vec![
            FactorEffects {
                factor_name: "A".into(),
                sn_by_level: BTreeMap::from([(1, 10.0), (2, 9.9)]),
                raw_by_level: BTreeMap::new(),
            },
            FactorEffects {
                factor_name: "B".into(),
                sn_by_level: BTreeMap::from([(1, 10.0), (2, 9.9)]),
                raw_by_level: BTreeMap::new(),
            },
        ];
        // Mains alone pick (1, 1); the interaction strongly prefers (2, 2).
        let inter = InteractionEffects {
            key: "A*B".into(),
            first_factor: "A".into(),
            second_factor: "B".into(),
            cells: vec![
                InteractionCell { level_a: 1, level_b: 1, sn: 5.0 },
                InteractionCell { level_a: 1, level_b: 2, sn: 6.0 },
                InteractionCell { level_a: 2, level_b: 1, sn: 6.0 },
                InteractionCell { level_a: 2, level_b: 2, sn: 9.0 },
            ],
        };
        let optimal = optimal_configuration(&factors, &main, &[inter]);
        assert_eq!(optimal.symbol_of("A"), Some(2));
        assert_eq!(optimal.symbol_of("B"), Some(2));
    }

    #[test]
    fn search_is_stable_without_interactions() {
        let factors = vec![two_level_factor("A")];
        let main = vec![FactorEffects {
            factor_name: "A".into(),
            sn_by_level: BTreeMap::from([(1, 1.0), (2, 3.0)]),
            raw_by_level: BTreeMap::new(),
        }];
        let optimal = optimal_configuration(&factors, &main, &[]);
        assert_eq!(optimal.symbol_of("A"), Some(2));
        assert_eq!(optimal.0["A"].value, "2");
    }
}
