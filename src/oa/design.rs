//! Experiment design construction.
//!
//! Recommends an orthogonal array for a factor/interaction set, assigns
//! factors and interactions to columns (via the linear graph where one
//! exists, symbolically otherwise), and materializes per-run parameter
//! settings.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LinearGraph, OrthogonalArray, catalog};
use crate::config::Factor;
use crate::error::{EngineError, Result};

/// Suffix for the second component column of a 3×3 interaction.
pub const COMP2_SUFFIX: &str = "_comp2";

/// Canonical key for an interaction: operands in lexicographic order,
/// joined by `*`.
pub fn interaction_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}*{b}")
    } else {
        format!("{b}*{a}")
    }
}

/// The frozen design of an experiment: which array, and which column each
/// factor and interaction occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrthogonalArrayDesign {
    pub designation: String,
    pub matrix: Vec<Vec<u8>>,
    /// Keys are factor names or canonical interaction keys (`A*B`, with
    /// `A*B_comp2` for the second component of a 3×3 interaction).
    pub column_assignments: BTreeMap<String, usize>,
}

impl OrthogonalArrayDesign {
    pub fn runs(&self) -> usize {
        self.matrix.len()
    }

    /// OA symbol at a run/column position.
    pub fn symbol(&self, run: usize, column: usize) -> u8 {
        self.matrix[run][column]
    }

    pub fn factor_column(&self, name: &str) -> Option<usize> {
        self.column_assignments.get(name).copied()
    }

    /// The component column(s) assigned to an interaction, first component
    /// first.
    pub fn interaction_columns(&self, a: &str, b: &str) -> Vec<usize> {
        let key = interaction_key(a, b);
        let mut cols = Vec::new();
        if let Some(&c) = self.column_assignments.get(&key) {
            cols.push(c);
        }
        if let Some(&c) = self.column_assignments.get(&format!("{key}{COMP2_SUFFIX}")) {
            cols.push(c);
        }
        cols
    }

    /// Level count of a column, from the matrix itself.
    pub fn column_level_count(&self, column: usize) -> u8 {
        self.matrix.iter().map(|row| row[column]).max().unwrap_or(0)
    }
}

/// One factor's chosen level for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSelection {
    pub symbol: u8,
    pub value: String,
}

/// The parameter values one OA row prescribes, keyed by factor name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ParameterSettings(pub BTreeMap<String, LevelSelection>);

impl ParameterSettings {
    /// Canonical identity of this combination: sorted `name=value`
    /// concatenation.
    pub fn canonical_key(&self) -> String {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(name, sel)| format!("{name}={}", sel.value))
            .collect();
        parts.join(";")
    }
}

/// Degrees of freedom a factor set and its interactions consume.
fn degrees_of_freedom(factors: &[Factor], interactions: &[(String, String)]) -> usize {
    let dof_main: usize = factors.iter().map(|f| f.level_count() - 1).sum();
    let dof_inter: usize = interactions
        .iter()
        .map(|(a, b)| {
            let ka = level_count_of(factors, a);
            let kb = level_count_of(factors, b);
            ka.saturating_sub(1) * kb.saturating_sub(1)
        })
        .sum();
    dof_main + dof_inter
}

fn level_count_of(factors: &[Factor], name: &str) -> usize {
    factors
        .iter()
        .find(|f| f.name == name)
        .map_or(0, Factor::level_count)
}

/// Pick the smallest catalogued array that can carry the factor set.
///
/// Candidates must offer `runs − 1 ≥` the total degrees of freedom and, for
/// every level count in the factor set, at least as many columns of that
/// level as there are factors needing one. Ties break on presence of a
/// linear graph (when interactions are requested), then on fewest surplus
/// columns.
pub fn recommend(
    factors: &[Factor],
    interactions: &[(String, String)],
) -> Result<&'static OrthogonalArray> {
    let dof_total = degrees_of_freedom(factors, interactions);
    let mut level_demand: BTreeMap<u8, usize> = BTreeMap::new();
    for factor in factors {
        *level_demand.entry(factor.level_count() as u8).or_default() += 1;
    }

    let candidate = catalog()
        .iter()
        .filter(|oa| oa.info.runs >= dof_total + 1)
        .filter(|oa| {
            level_demand.iter().all(|(&level, &needed)| {
                let available = oa
                    .info
                    .level_counts
                    .iter()
                    .filter(|&&c| c == level)
                    .count();
                available >= needed
            })
        })
        .min_by_key(|oa| {
            let graph_missing = !interactions.is_empty() && oa.linear_graph.is_none();
            let surplus = oa.info.max_factors.saturating_sub(factors.len());
            (oa.info.runs, graph_missing, surplus)
        });

    candidate.ok_or_else(|| {
        EngineError::Design(format!(
            "no catalogued orthogonal array accommodates {} factor(s) needing {} degrees of freedom",
            factors.len(),
            dof_total
        ))
    })
}

/// Build the full design: recommend an array, then assign columns.
pub fn create_design(
    factors: &[Factor],
    interactions: &[(String, String)],
) -> Result<OrthogonalArrayDesign> {
    let oa = recommend(factors, interactions)?;
    let column_assignments = assign_columns(oa, factors, interactions)?;
    debug!(
        designation = oa.designation,
        assignments = ?column_assignments,
        "design created"
    );
    Ok(OrthogonalArrayDesign {
        designation: oa.designation.to_string(),
        matrix: oa.matrix.clone(),
        column_assignments,
    })
}

struct Assigner<'a> {
    oa: &'a OrthogonalArray,
    used: HashSet<usize>,
    assignments: BTreeMap<String, usize>,
}

impl<'a> Assigner<'a> {
    fn new(oa: &'a OrthogonalArray) -> Self {
        Assigner {
            oa,
            used: HashSet::new(),
            assignments: BTreeMap::new(),
        }
    }

    fn take(&mut self, name: &str, column: usize) {
        self.used.insert(column);
        self.assignments.insert(name.to_string(), column);
    }

    fn is_free(&self, column: usize) -> bool {
        !self.used.contains(&column)
    }

    fn level_of(&self, column: usize) -> u8 {
        self.oa.info.level_counts[column]
    }

    /// First free column with the given level count, preferring columns
    /// outside `avoid`.
    fn find_free(&self, level: u8, avoid: &HashSet<usize>) -> Option<usize> {
        let matching = |c: &usize| self.is_free(*c) && self.level_of(*c) == level;
        (0..self.oa.info.max_factors)
            .find(|c| matching(c) && !avoid.contains(c))
            .or_else(|| (0..self.oa.info.max_factors).find(matching))
    }
}

/// Assign every factor and interaction to columns of the chosen array.
fn assign_columns(
    oa: &OrthogonalArray,
    factors: &[Factor],
    interactions: &[(String, String)],
) -> Result<BTreeMap<String, usize>> {
    let mut assigner = Assigner::new(oa);
    let graph = oa.linear_graph.as_ref();

    // Pass 1: pin factors onto the graph's preferred main columns.
    if let Some(g) = graph {
        let mut preferred = g.preferred_main_columns.iter().copied();
        for factor in factors {
            let level = factor.level_count() as u8;
            if let Some(col) = preferred
                .by_ref()
                .find(|&c| assigner.is_free(c) && assigner.level_of(c) == level)
            {
                assigner.take(&factor.name, col);
            }
        }
    }

    // Columns the graph earmarks for the interactions actually requested,
    // given where their operands just landed. Remaining main factors stay
    // off these when any other column fits.
    let mut reserved: HashSet<usize> = HashSet::new();
    if let Some(g) = graph {
        for (a, b) in interactions {
            if let (Some(&ca), Some(&cb)) =
                (assigner.assignments.get(a), assigner.assignments.get(b))
                && let Some(edge) = g.edge(ca, cb)
            {
                reserved.extend(edge.interaction_columns.iter().copied());
            }
        }
    }

    // Pass 2: place whatever is left in any free level-matching column.
    for factor in factors {
        if assigner.assignments.contains_key(&factor.name) {
            continue;
        }
        let level = factor.level_count() as u8;
        let col = assigner.find_free(level, &reserved).ok_or_else(|| {
            EngineError::Design(format!(
                "factor '{}' ({} levels) cannot be placed on {}",
                factor.name,
                level,
                oa.designation
            ))
        })?;
        assigner.take(&factor.name, col);
    }

    // Pass 3: interactions.
    for (a, b) in interactions {
        assign_interaction(&mut assigner, graph, factors, a, b, oa)?;
    }

    Ok(assigner.assignments)
}

fn assign_interaction(
    assigner: &mut Assigner<'_>,
    graph: Option<&LinearGraph>,
    factors: &[Factor],
    a: &str,
    b: &str,
    oa: &OrthogonalArray,
) -> Result<()> {
    let key = interaction_key(a, b);
    let col_a = *assigner.assignments.get(a).ok_or_else(|| {
        EngineError::Design(format!("interaction {key} references unplaced factor '{a}'"))
    })?;
    let col_b = *assigner.assignments.get(b).ok_or_else(|| {
        EngineError::Design(format!("interaction {key} references unplaced factor '{b}'"))
    })?;
    let levels_a = level_count_of(factors, a);
    let levels_b = level_count_of(factors, b);
    let components_needed = if levels_a == 3 && levels_b == 3 { 2 } else { 1 };

    // Prefer the catalogued edge between the two occupied columns.
    if let Some(edge) = graph.and_then(|g| g.edge(col_a, col_b)) {
        let free: Vec<usize> = edge
            .interaction_columns
            .iter()
            .copied()
            .filter(|&c| assigner.is_free(c))
            .take(components_needed)
            .collect();
        if free.len() == components_needed {
            assigner.take(&key, free[0]);
            if components_needed == 2 {
                assigner.take(&format!("{key}{COMP2_SUFFIX}"), free[1]);
            }
            return Ok(());
        }
        return Err(EngineError::Design(format!(
            "interaction {key}: linear-graph column(s) for ({}, {}) are already occupied on {}",
            col_a + 1,
            col_b + 1,
            oa.designation
        )));
    }

    // No catalogued edge: derive the component column(s) symbolically.
    match (levels_a, levels_b) {
        (2, 2) => {
            let pattern = two_level_interaction(&oa.matrix, col_a, col_b);
            let col = find_matching_column(assigner, &oa.matrix, &pattern).ok_or_else(|| {
                EngineError::Design(format!(
                    "interaction {key}: no free column of {} matches the 2x2 component",
                    oa.designation
                ))
            })?;
            assigner.take(&key, col);
            Ok(())
        }
        (3, 3) => {
            let comp1 = three_level_component(&oa.matrix, col_a, col_b, 1);
            let comp2 = three_level_component(&oa.matrix, col_a, col_b, 2);
            let c1 = find_matching_column(assigner, &oa.matrix, &comp1).ok_or_else(|| {
                EngineError::Design(format!(
                    "interaction {key}: no free column of {} matches the first 3x3 component",
                    oa.designation
                ))
            })?;
            assigner.take(&key, c1);
            let c2 = find_matching_column(assigner, &oa.matrix, &comp2).ok_or_else(|| {
                EngineError::Design(format!(
                    "interaction {key}: no free column of {} matches the second 3x3 component",
                    oa.designation
                ))
            })?;
            assigner.take(&format!("{key}{COMP2_SUFFIX}"), c2);
            Ok(())
        }
        _ => Err(EngineError::Design(format!(
            "interaction {key} mixes {levels_a}- and {levels_b}-level factors; \
             mixed-level interactions need a catalogued linear-graph edge"
        ))),
    }
}

/// Component pattern of a 2×2 interaction: 1 where the parent cells agree.
pub fn two_level_interaction(matrix: &[Vec<u8>], col_a: usize, col_b: usize) -> Vec<u8> {
    matrix
        .iter()
        .map(|row| if row[col_a] == row[col_b] { 1 } else { 2 })
        .collect()
}

/// Component pattern of a 3×3 interaction.
///
/// Component 1 is `(a−1)+(b−1) mod 3`, component 2 is `(a−1)+2(b−1) mod 3`,
/// both mapped back to 1-based symbols.
pub fn three_level_component(
    matrix: &[Vec<u8>],
    col_a: usize,
    col_b: usize,
    component: u8,
) -> Vec<u8> {
    let weight = if component == 1 { 1 } else { 2 };
    matrix
        .iter()
        .map(|row| {
            let a = u16::from(row[col_a]) - 1;
            let b = u16::from(row[col_b]) - 1;
            ((a + weight * b) % 3) as u8 + 1
        })
        .collect()
}

fn find_matching_column(
    assigner: &Assigner<'_>,
    matrix: &[Vec<u8>],
    pattern: &[u8],
) -> Option<usize> {
    let cols = matrix.first().map_or(0, Vec::len);
    (0..cols).find(|&c| {
        assigner.is_free(c) && matrix.iter().zip(pattern).all(|(row, &p)| row[c] == p)
    })
}

/// Parameter settings for one OA row.
pub fn settings_for_run(
    design: &OrthogonalArrayDesign,
    factors: &[Factor],
    run: usize,
) -> Result<ParameterSettings> {
    let mut settings = ParameterSettings::default();
    for factor in factors {
        let column = design.factor_column(&factor.name).ok_or_else(|| {
            EngineError::Design(format!("factor '{}' has no assigned column", factor.name))
        })?;
        let symbol = design.symbol(run, column);
        let value = factor.value_for_symbol(symbol).ok_or_else(|| {
            EngineError::Design(format!(
                "factor '{}' has no value for symbol {symbol}",
                factor.name
            ))
        })?;
        settings.0.insert(
            factor.name.clone(),
            LevelSelection {
                symbol,
                value: value.to_string(),
            },
        );
    }
    Ok(settings)
}

/// Parameter settings for every row of the design.
pub fn settings_for_all_runs(
    design: &OrthogonalArrayDesign,
    factors: &[Factor],
) -> Result<Vec<ParameterSettings>> {
    (0..design.runs())
        .map(|run| settings_for_run(design, factors, run))
        .collect()
}
