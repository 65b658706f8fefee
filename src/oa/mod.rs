//! Orthogonal-array library.
//!
//! A static catalog of standard arrays (L4 through L36 variants), their
//! level structure, and the linear graphs used to place interactions. The
//! design builder in [`design`] consumes this catalog.

pub mod design;
mod tables;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Structural description of a catalogued array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrthogonalArrayInfo {
    /// Number of rows.
    pub runs: usize,
    /// Number of columns, i.e. the most factors the array can carry.
    pub max_factors: usize,
    /// Level count per column.
    pub level_counts: Vec<u8>,
    /// Orthogonality strength; 2 for every catalogued array.
    pub strength: u8,
}

/// One edge of a linear graph: two main-effect columns and the column(s)
/// that absorb their interaction. A 3×3 interaction lists two columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearGraphEntry {
    pub columns: (usize, usize),
    pub interaction_columns: Vec<usize>,
}

/// Column-assignment aid for an array: preferred main-effect columns plus
/// the catalogued interaction edges. All indices are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearGraph {
    pub preferred_main_columns: Vec<usize>,
    pub interactions: Vec<LinearGraphEntry>,
}

impl LinearGraph {
    /// Find the edge connecting two columns, in either orientation.
    pub fn edge(&self, a: usize, b: usize) -> Option<&LinearGraphEntry> {
        self.interactions
            .iter()
            .find(|e| e.columns == (a, b) || e.columns == (b, a))
    }
}

/// A catalogued orthogonal array.
#[derive(Debug, Clone)]
pub struct OrthogonalArray {
    pub designation: &'static str,
    pub matrix: Vec<Vec<u8>>,
    pub info: OrthogonalArrayInfo,
    pub linear_graph: Option<LinearGraph>,
}

/// Whether every pair of columns carries each ordered level combination
/// equally often (strength 2).
pub fn is_strength_two(matrix: &[Vec<u8>]) -> bool {
    let runs = matrix.len();
    if runs == 0 {
        return false;
    }
    let cols = matrix[0].len();
    let levels: Vec<u8> = (0..cols)
        .map(|c| matrix.iter().map(|row| row[c]).max().unwrap_or(0))
        .collect();
    for c1 in 0..cols {
        for c2 in (c1 + 1)..cols {
            let cells = usize::from(levels[c1]) * usize::from(levels[c2]);
            if cells == 0 || runs % cells != 0 {
                return false;
            }
            let expected = runs / cells;
            let mut counts = vec![0usize; cells];
            for row in matrix {
                let a = usize::from(row[c1]) - 1;
                let b = usize::from(row[c2]) - 1;
                counts[a * usize::from(levels[c2]) + b] += 1;
            }
            if counts.iter().any(|&n| n != expected) {
                return false;
            }
        }
    }
    true
}

fn owned(table: &[&[u8]]) -> Vec<Vec<u8>> {
    table.iter().map(|row| row.to_vec()).collect()
}

fn build(
    designation: &'static str,
    matrix: Vec<Vec<u8>>,
    linear_graph: Option<LinearGraph>,
) -> OrthogonalArray {
    let runs = matrix.len();
    let cols = matrix.first().map_or(0, Vec::len);
    let level_counts: Vec<u8> = (0..cols)
        .map(|c| matrix.iter().map(|row| row[c]).max().unwrap_or(0))
        .collect();
    OrthogonalArray {
        designation,
        matrix,
        info: OrthogonalArrayInfo {
            runs,
            max_factors: cols,
            level_counts,
            strength: 2,
        },
        linear_graph,
    }
}

fn graph(mains: &[usize], edges: &[((usize, usize), &[usize])]) -> LinearGraph {
    LinearGraph {
        preferred_main_columns: mains.to_vec(),
        interactions: edges
            .iter()
            .map(|&(columns, cols)| LinearGraphEntry {
                columns,
                interaction_columns: cols.to_vec(),
            })
            .collect(),
    }
}

/// Linear graph of a power-of-two array: mains on the independent columns,
/// interactions on the XOR of the main column labels.
fn two_level_graph(mains_1based: &[usize]) -> LinearGraph {
    let mut edges = Vec::new();
    for (i, &a) in mains_1based.iter().enumerate() {
        for &b in &mains_1based[i + 1..] {
            edges.push(LinearGraphEntry {
                columns: (a - 1, b - 1),
                interaction_columns: vec![(a ^ b) - 1],
            });
        }
    }
    LinearGraph {
        preferred_main_columns: mains_1based.iter().map(|&c| c - 1).collect(),
        interactions: edges,
    }
}

static CATALOG: OnceLock<Vec<OrthogonalArray>> = OnceLock::new();

/// The full array catalog, smallest designs first.
pub fn catalog() -> &'static [OrthogonalArray] {
    CATALOG.get_or_init(|| {
        vec![
            build("L4", owned(tables::L4_MATRIX), Some(two_level_graph(&[1, 2]))),
            build("L8", owned(tables::L8_MATRIX), Some(two_level_graph(&[1, 2, 4]))),
            build(
                "L9",
                owned(tables::L9_MATRIX),
                Some(graph(&[0, 1], &[((0, 1), &[2, 3])])),
            ),
            build("L12", owned(tables::L12_MATRIX), None),
            build(
                "L16",
                owned(tables::L16_MATRIX),
                Some(two_level_graph(&[1, 2, 4, 8])),
            ),
            build("L16b", owned(tables::L16B_MATRIX), None),
            build(
                "L18",
                owned(tables::L18_MATRIX),
                Some(graph(&[0, 1, 2, 3, 4, 5, 6, 7], &[])),
            ),
            build("L25", owned(tables::L25_MATRIX), None),
            build(
                "L27",
                owned(tables::L27_MATRIX),
                Some(graph(
                    &[0, 1, 4],
                    &[
                        ((0, 1), &[2, 3]),
                        ((0, 4), &[5, 6]),
                        ((1, 4), &[7, 10]),
                    ],
                )),
            ),
            build(
                "L32",
                tables::generate_l32(),
                Some(two_level_graph(&[1, 2, 4, 8, 16])),
            ),
            build("L36", owned(tables::L36_MATRIX), None),
            build("L36b", owned(tables::L36B_MATRIX), None),
        ]
    })
}

/// Look up an array by its designation.
pub fn by_designation(designation: &str) -> Option<&'static OrthogonalArray> {
    catalog().iter().find(|a| a.designation == designation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalogued_array_has_strength_two() {
        for array in catalog() {
            assert!(
                is_strength_two(&array.matrix),
                "{} is not pairwise balanced",
                array.designation
            );
        }
    }

    #[test]
    fn info_matches_matrix_shape() {
        for array in catalog() {
            assert_eq!(array.info.runs, array.matrix.len());
            assert_eq!(array.info.max_factors, array.matrix[0].len());
            assert_eq!(array.info.level_counts.len(), array.info.max_factors);
            assert_eq!(array.info.strength, 2);
        }
    }

    #[test]
    fn linear_graph_columns_are_in_range() {
        for array in catalog() {
            let Some(graph) = &array.linear_graph else {
                continue;
            };
            let cols = array.info.max_factors;
            assert!(graph.preferred_main_columns.iter().all(|&c| c < cols));
            for edge in &graph.interactions {
                assert!(edge.columns.0 < cols && edge.columns.1 < cols);
                assert!(edge.interaction_columns.iter().all(|&c| c < cols));
                assert!(!edge.interaction_columns.is_empty());
            }
        }
    }

    #[test]
    fn expected_designations_are_present() {
        let names: Vec<&str> = catalog().iter().map(|a| a.designation).collect();
        for expected in [
            "L4", "L8", "L9", "L12", "L16", "L16b", "L18", "L25", "L27", "L32", "L36", "L36b",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }
}
