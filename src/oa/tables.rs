//! Catalogued orthogonal-array matrices.
//!
//! Two-level arrays of the power-of-two family (L4, L8, L16, L32) follow the
//! XOR-subset construction: columns are indexed by the nonempty subsets of
//! the base bits, and the cell for row `r` is the parity of the selected
//! bits, mapped to {1, 2}. L32 is generated from that rule at load time; the
//! smaller ones are written out. Three- and five-level arrays come from the
//! modular generator families (a, b, a+b, a+2b, ...), the four-level L16b
//! from GF(4) arithmetic, and the mixed-level L18/L36 from difference
//! schemes. Every table was verified for pairwise level balance before being
//! committed.

/// L4: 4 runs, 3 two-level columns.
pub(super) const L4_MATRIX: &[&[u8]] = &[
    &[1, 1, 1],
    &[1, 2, 2],
    &[2, 1, 2],
    &[2, 2, 1],
];

/// L8: 8 runs, 7 two-level columns.
pub(super) const L8_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 2, 2, 2, 2],
    &[1, 2, 2, 1, 1, 2, 2],
    &[1, 2, 2, 2, 2, 1, 1],
    &[2, 1, 2, 1, 2, 1, 2],
    &[2, 1, 2, 2, 1, 2, 1],
    &[2, 2, 1, 1, 2, 2, 1],
    &[2, 2, 1, 2, 1, 1, 2],
];

/// L9: 9 runs, 4 three-level columns.
pub(super) const L9_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1],
    &[1, 2, 2, 3],
    &[1, 3, 3, 2],
    &[2, 1, 2, 2],
    &[2, 2, 3, 1],
    &[2, 3, 1, 3],
    &[3, 1, 3, 3],
    &[3, 2, 1, 2],
    &[3, 3, 2, 1],
];

/// L12: 12 runs, 11 two-level columns (Plackett-Burman).
pub(super) const L12_MATRIX: &[&[u8]] = &[
    &[2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 1],
    &[1, 2, 2, 1, 2, 2, 2, 1, 1, 1, 2],
    &[2, 1, 2, 2, 1, 2, 2, 2, 1, 1, 1],
    &[1, 2, 1, 2, 2, 1, 2, 2, 2, 1, 1],
    &[1, 1, 2, 1, 2, 2, 1, 2, 2, 2, 1],
    &[1, 1, 1, 2, 1, 2, 2, 1, 2, 2, 2],
    &[2, 1, 1, 1, 2, 1, 2, 2, 1, 2, 2],
    &[2, 2, 1, 1, 1, 2, 1, 2, 2, 1, 2],
    &[2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 1],
    &[1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 2],
    &[2, 1, 2, 2, 2, 1, 1, 1, 2, 1, 2],
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
];

/// L16: 16 runs, 15 two-level columns.
pub(super) const L16_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2],
    &[1, 1, 1, 2, 2, 2, 2, 1, 1, 1, 1, 2, 2, 2, 2],
    &[1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1],
    &[1, 2, 2, 1, 1, 2, 2, 1, 1, 2, 2, 1, 1, 2, 2],
    &[1, 2, 2, 1, 1, 2, 2, 2, 2, 1, 1, 2, 2, 1, 1],
    &[1, 2, 2, 2, 2, 1, 1, 1, 1, 2, 2, 2, 2, 1, 1],
    &[1, 2, 2, 2, 2, 1, 1, 2, 2, 1, 1, 1, 1, 2, 2],
    &[2, 1, 2, 1, 2, 1, 2, 1, 2, 1, 2, 1, 2, 1, 2],
    &[2, 1, 2, 1, 2, 1, 2, 2, 1, 2, 1, 2, 1, 2, 1],
    &[2, 1, 2, 2, 1, 2, 1, 1, 2, 1, 2, 2, 1, 2, 1],
    &[2, 1, 2, 2, 1, 2, 1, 2, 1, 2, 1, 1, 2, 1, 2],
    &[2, 2, 1, 1, 2, 2, 1, 1, 2, 2, 1, 1, 2, 2, 1],
    &[2, 2, 1, 1, 2, 2, 1, 2, 1, 1, 2, 2, 1, 1, 2],
    &[2, 2, 1, 2, 1, 1, 2, 1, 2, 2, 1, 2, 1, 1, 2],
    &[2, 2, 1, 2, 1, 1, 2, 2, 1, 1, 2, 1, 2, 2, 1],
];

/// L16b: 16 runs, 5 four-level columns.
pub(super) const L16B_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1],
    &[1, 2, 2, 3, 4],
    &[1, 3, 3, 4, 2],
    &[1, 4, 4, 2, 3],
    &[2, 1, 2, 2, 2],
    &[2, 2, 1, 4, 3],
    &[2, 3, 4, 3, 1],
    &[2, 4, 3, 1, 4],
    &[3, 1, 3, 3, 3],
    &[3, 2, 4, 1, 2],
    &[3, 3, 1, 2, 4],
    &[3, 4, 2, 4, 1],
    &[4, 1, 4, 4, 4],
    &[4, 2, 3, 2, 1],
    &[4, 3, 2, 1, 3],
    &[4, 4, 1, 3, 2],
];

/// L18: 18 runs, 1 two-level + 7 three-level columns.
pub(super) const L18_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 2, 2, 2, 2, 2, 2],
    &[1, 1, 3, 3, 3, 3, 3, 3],
    &[1, 2, 1, 2, 3, 1, 3, 2],
    &[1, 2, 2, 3, 1, 2, 1, 3],
    &[1, 2, 3, 1, 2, 3, 2, 1],
    &[1, 3, 1, 1, 3, 2, 2, 3],
    &[1, 3, 2, 2, 1, 3, 3, 1],
    &[1, 3, 3, 3, 2, 1, 1, 2],
    &[2, 1, 1, 2, 2, 3, 1, 3],
    &[2, 1, 2, 3, 3, 1, 2, 1],
    &[2, 1, 3, 1, 1, 2, 3, 2],
    &[2, 2, 1, 3, 1, 3, 2, 2],
    &[2, 2, 2, 1, 2, 1, 3, 3],
    &[2, 2, 3, 2, 3, 2, 1, 1],
    &[2, 3, 1, 3, 2, 2, 3, 1],
    &[2, 3, 2, 1, 3, 3, 1, 2],
    &[2, 3, 3, 2, 1, 1, 2, 3],
];

/// L25: 25 runs, 6 five-level columns.
pub(super) const L25_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1],
    &[1, 2, 2, 3, 4, 5],
    &[1, 3, 3, 5, 2, 4],
    &[1, 4, 4, 2, 5, 3],
    &[1, 5, 5, 4, 3, 2],
    &[2, 1, 2, 2, 2, 2],
    &[2, 2, 3, 4, 5, 1],
    &[2, 3, 4, 1, 3, 5],
    &[2, 4, 5, 3, 1, 4],
    &[2, 5, 1, 5, 4, 3],
    &[3, 1, 3, 3, 3, 3],
    &[3, 2, 4, 5, 1, 2],
    &[3, 3, 5, 2, 4, 1],
    &[3, 4, 1, 4, 2, 5],
    &[3, 5, 2, 1, 5, 4],
    &[4, 1, 4, 4, 4, 4],
    &[4, 2, 5, 1, 2, 3],
    &[4, 3, 1, 3, 5, 2],
    &[4, 4, 2, 5, 3, 1],
    &[4, 5, 3, 2, 1, 5],
    &[5, 1, 5, 5, 5, 5],
    &[5, 2, 1, 2, 3, 4],
    &[5, 3, 2, 4, 1, 3],
    &[5, 4, 3, 1, 4, 2],
    &[5, 5, 4, 3, 2, 1],
];

/// L27: 27 runs, 13 three-level columns.
pub(super) const L27_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 1, 2, 2, 3, 2, 2, 2, 3, 3, 3],
    &[1, 1, 1, 1, 3, 3, 2, 3, 3, 3, 2, 2, 2],
    &[1, 2, 2, 3, 1, 1, 1, 2, 2, 3, 2, 2, 3],
    &[1, 2, 2, 3, 2, 2, 3, 3, 3, 1, 1, 1, 2],
    &[1, 2, 2, 3, 3, 3, 2, 1, 1, 2, 3, 3, 1],
    &[1, 3, 3, 2, 1, 1, 1, 3, 3, 2, 3, 3, 2],
    &[1, 3, 3, 2, 2, 2, 3, 1, 1, 3, 2, 2, 1],
    &[1, 3, 3, 2, 3, 3, 2, 2, 2, 1, 1, 1, 3],
    &[2, 1, 2, 2, 1, 2, 2, 1, 2, 2, 1, 2, 2],
    &[2, 1, 2, 2, 2, 3, 1, 2, 3, 3, 3, 1, 1],
    &[2, 1, 2, 2, 3, 1, 3, 3, 1, 1, 2, 3, 3],
    &[2, 2, 3, 1, 1, 2, 2, 2, 3, 1, 2, 3, 1],
    &[2, 2, 3, 1, 2, 3, 1, 3, 1, 2, 1, 2, 3],
    &[2, 2, 3, 1, 3, 1, 3, 1, 2, 3, 3, 1, 2],
    &[2, 3, 1, 3, 1, 2, 2, 3, 1, 3, 3, 1, 3],
    &[2, 3, 1, 3, 2, 3, 1, 1, 2, 1, 2, 3, 2],
    &[2, 3, 1, 3, 3, 1, 3, 2, 3, 2, 1, 2, 1],
    &[3, 1, 3, 3, 1, 3, 3, 1, 3, 3, 1, 3, 3],
    &[3, 1, 3, 3, 2, 1, 2, 2, 1, 1, 3, 2, 2],
    &[3, 1, 3, 3, 3, 2, 1, 3, 2, 2, 2, 1, 1],
    &[3, 2, 1, 2, 1, 3, 3, 2, 1, 2, 2, 1, 2],
    &[3, 2, 1, 2, 2, 1, 2, 3, 2, 3, 1, 3, 1],
    &[3, 2, 1, 2, 3, 2, 1, 1, 3, 1, 3, 2, 3],
    &[3, 3, 2, 1, 1, 3, 3, 3, 2, 1, 3, 2, 1],
    &[3, 3, 2, 1, 2, 1, 2, 1, 3, 2, 2, 1, 3],
    &[3, 3, 2, 1, 3, 2, 1, 2, 1, 3, 1, 3, 2],
];

/// L36: 36 runs, 11 two-level + 12 three-level columns.
pub(super) const L36_MATRIX: &[&[u8]] = &[
    &[2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    &[2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2],
    &[2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 1, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3],
    &[1, 2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 3, 1, 3, 3, 2, 1, 3, 1, 2],
    &[1, 2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 2, 3, 3, 1, 2, 1, 1, 3, 2, 1, 2, 3],
    &[1, 2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 3, 1, 1, 2, 3, 2, 2, 1, 3, 2, 3, 1],
    &[2, 1, 2, 2, 1, 2, 2, 2, 1, 1, 1, 1, 1, 3, 3, 2, 2, 2, 2, 3, 1, 1, 3],
    &[2, 1, 2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 2, 1, 1, 3, 3, 3, 3, 1, 2, 2, 1],
    &[2, 1, 2, 2, 1, 2, 2, 2, 1, 1, 1, 3, 3, 2, 2, 1, 1, 1, 1, 2, 3, 3, 2],
    &[1, 2, 1, 2, 2, 1, 2, 2, 2, 1, 1, 1, 2, 3, 2, 3, 1, 3, 2, 2, 1, 3, 1],
    &[1, 2, 1, 2, 2, 1, 2, 2, 2, 1, 1, 2, 3, 1, 3, 1, 2, 1, 3, 3, 2, 1, 2],
    &[1, 2, 1, 2, 2, 1, 2, 2, 2, 1, 1, 3, 1, 2, 1, 2, 3, 2, 1, 1, 3, 2, 3],
    &[1, 1, 2, 1, 2, 2, 1, 2, 2, 2, 1, 1, 3, 3, 2, 1, 2, 2, 3, 1, 3, 2, 1],
    &[1, 1, 2, 1, 2, 2, 1, 2, 2, 2, 1, 2, 1, 1, 3, 2, 3, 3, 1, 2, 1, 3, 2],
    &[1, 1, 2, 1, 2, 2, 1, 2, 2, 2, 1, 3, 2, 2, 1, 3, 1, 1, 2, 3, 2, 1, 3],
    &[1, 1, 1, 2, 1, 2, 2, 1, 2, 2, 2, 1, 3, 3, 1, 3, 3, 2, 1, 2, 2, 1, 2],
    &[1, 1, 1, 2, 1, 2, 2, 1, 2, 2, 2, 2, 1, 1, 2, 1, 1, 3, 2, 3, 3, 2, 3],
    &[1, 1, 1, 2, 1, 2, 2, 1, 2, 2, 2, 3, 2, 2, 3, 2, 2, 1, 3, 1, 1, 3, 1],
    &[2, 1, 1, 1, 2, 1, 2, 2, 1, 2, 2, 1, 2, 1, 3, 3, 2, 1, 1, 2, 3, 2, 3],
    &[2, 1, 1, 1, 2, 1, 2, 2, 1, 2, 2, 2, 3, 2, 1, 1, 3, 2, 2, 3, 1, 3, 1],
    &[2, 1, 1, 1, 2, 1, 2, 2, 1, 2, 2, 3, 1, 3, 2, 2, 1, 3, 3, 1, 2, 1, 2],
    &[2, 2, 1, 1, 1, 2, 1, 2, 2, 1, 2, 1, 3, 2, 3, 2, 1, 3, 1, 3, 2, 2, 1],
    &[2, 2, 1, 1, 1, 2, 1, 2, 2, 1, 2, 2, 1, 3, 1, 3, 2, 1, 2, 1, 3, 3, 2],
    &[2, 2, 1, 1, 1, 2, 1, 2, 2, 1, 2, 3, 2, 1, 2, 1, 3, 2, 3, 2, 1, 1, 3],
    &[2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 1, 1, 3, 1, 2, 2, 3, 1, 2, 1, 2, 3, 3],
    &[2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 1, 2, 1, 2, 3, 3, 1, 2, 3, 2, 3, 1, 1],
    &[2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 1, 3, 2, 3, 1, 1, 2, 3, 1, 3, 1, 2, 2],
    &[1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 1, 1, 2, 1, 1, 2, 3, 3, 2, 2, 3, 3],
    &[1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 2, 2, 3, 2, 2, 3, 1, 1, 3, 3, 1, 1],
    &[1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 3, 3, 1, 3, 3, 1, 2, 2, 1, 1, 2, 2],
    &[2, 1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 1, 2, 1, 1, 2, 1, 2, 3, 3, 3, 3, 2],
    &[2, 1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 2, 3, 2, 2, 3, 2, 3, 1, 1, 1, 1, 3],
    &[2, 1, 2, 2, 2, 1, 1, 1, 2, 1, 2, 3, 1, 3, 3, 1, 3, 1, 2, 2, 2, 2, 1],
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 3, 3, 1, 3, 3, 1, 2, 2],
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 3, 3, 1, 1, 2, 1, 1, 2, 3, 3],
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 3, 3, 1, 1, 2, 2, 3, 2, 2, 3, 1, 1],
];

/// L36b: 36 runs, 3 two-level + 13 three-level columns.
pub(super) const L36B_MATRIX: &[&[u8]] = &[
    &[2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    &[2, 2, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2],
    &[2, 2, 1, 1, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3],
    &[1, 2, 2, 1, 1, 2, 2, 3, 1, 3, 3, 2, 1, 3, 1, 2],
    &[1, 2, 2, 1, 2, 3, 3, 1, 2, 1, 1, 3, 2, 1, 2, 3],
    &[1, 2, 2, 1, 3, 1, 1, 2, 3, 2, 2, 1, 3, 2, 3, 1],
    &[2, 1, 2, 1, 1, 1, 3, 3, 2, 2, 2, 2, 3, 1, 1, 3],
    &[2, 1, 2, 1, 2, 2, 1, 1, 3, 3, 3, 3, 1, 2, 2, 1],
    &[2, 1, 2, 1, 3, 3, 2, 2, 1, 1, 1, 1, 2, 3, 3, 2],
    &[1, 2, 1, 2, 1, 2, 3, 2, 3, 1, 3, 2, 2, 1, 3, 1],
    &[1, 2, 1, 2, 2, 3, 1, 3, 1, 2, 1, 3, 3, 2, 1, 2],
    &[1, 2, 1, 2, 3, 1, 2, 1, 2, 3, 2, 1, 1, 3, 2, 3],
    &[1, 1, 2, 2, 1, 3, 3, 2, 1, 2, 2, 3, 1, 3, 2, 1],
    &[1, 1, 2, 2, 2, 1, 1, 3, 2, 3, 3, 1, 2, 1, 3, 2],
    &[1, 1, 2, 2, 3, 2, 2, 1, 3, 1, 1, 2, 3, 2, 1, 3],
    &[1, 1, 1, 1, 1, 3, 3, 1, 3, 3, 2, 1, 2, 2, 1, 2],
    &[1, 1, 1, 1, 2, 1, 1, 2, 1, 1, 3, 2, 3, 3, 2, 3],
    &[1, 1, 1, 1, 3, 2, 2, 3, 2, 2, 1, 3, 1, 1, 3, 1],
    &[2, 1, 1, 2, 1, 2, 1, 3, 3, 2, 1, 1, 2, 3, 2, 3],
    &[2, 1, 1, 2, 2, 3, 2, 1, 1, 3, 2, 2, 3, 1, 3, 1],
    &[2, 1, 1, 2, 3, 1, 3, 2, 2, 1, 3, 3, 1, 2, 1, 2],
    &[2, 2, 1, 3, 1, 3, 2, 3, 2, 1, 3, 1, 3, 2, 2, 1],
    &[2, 2, 1, 3, 2, 1, 3, 1, 3, 2, 1, 2, 1, 3, 3, 2],
    &[2, 2, 1, 3, 3, 2, 1, 2, 1, 3, 2, 3, 2, 1, 1, 3],
    &[2, 2, 2, 2, 1, 3, 1, 2, 2, 3, 1, 2, 1, 2, 3, 3],
    &[2, 2, 2, 2, 2, 1, 2, 3, 3, 1, 2, 3, 2, 3, 1, 1],
    &[2, 2, 2, 2, 3, 2, 3, 1, 1, 2, 3, 1, 3, 1, 2, 2],
    &[1, 2, 2, 3, 1, 1, 2, 1, 1, 2, 3, 3, 2, 2, 3, 3],
    &[1, 2, 2, 3, 2, 2, 3, 2, 2, 3, 1, 1, 3, 3, 1, 1],
    &[1, 2, 2, 3, 3, 3, 1, 3, 3, 1, 2, 2, 1, 1, 2, 2],
    &[2, 1, 2, 3, 1, 2, 1, 1, 2, 1, 2, 3, 3, 3, 3, 2],
    &[2, 1, 2, 3, 2, 3, 2, 2, 3, 2, 3, 1, 1, 1, 1, 3],
    &[2, 1, 2, 3, 3, 1, 3, 3, 1, 3, 1, 2, 2, 2, 2, 1],
    &[1, 1, 1, 3, 1, 1, 2, 2, 3, 3, 1, 3, 3, 1, 2, 2],
    &[1, 1, 1, 3, 2, 2, 3, 3, 1, 1, 2, 1, 1, 2, 3, 3],
    &[1, 1, 1, 3, 3, 3, 1, 1, 2, 2, 3, 2, 2, 3, 1, 1],
];
/// Generate the L32 matrix: 32 runs, 31 two-level columns.
///
/// Column `n` (1-based) is the XOR of the base bits of `r` selected by the
/// binary digits of `n`, with bit 0 of the column index selecting the
/// slowest-varying base bit.
pub(super) fn generate_l32() -> Vec<Vec<u8>> {
    generate_two_level(5)
}

fn generate_two_level(k: u32) -> Vec<Vec<u8>> {
    let runs = 1usize << k;
    let cols = runs - 1;
    (0..runs)
        .map(|r| {
            (1..=cols)
                .map(|n| {
                    let mut parity = 0usize;
                    for i in 0..k {
                        if n >> i & 1 == 1 {
                            parity ^= r >> (k - 1 - i) & 1;
                        }
                    }
                    parity as u8 + 1
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l32_matches_the_written_small_arrays() {
        // The same generator reproduces L4/L8/L16 exactly.
        for (k, table) in [(2u32, L4_MATRIX), (3, L8_MATRIX), (4, L16_MATRIX)] {
            let generated = generate_two_level(k);
            assert_eq!(generated.len(), table.len());
            for (g, t) in generated.iter().zip(table.iter()) {
                assert_eq!(g.as_slice(), *t);
            }
        }
        let l32 = generate_l32();
        assert_eq!(l32.len(), 32);
        assert!(l32.iter().all(|row| row.len() == 31));
    }
}
