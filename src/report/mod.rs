//! Report rendering for completed experiments.

pub mod html;
pub mod markdown;

use crate::analysis::anova::AnovaTable;

/// Render a statistic for display; NaN becomes `n/a`.
fn fmt_num(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else if value == value.trunc() && value.abs() < 1e12 {
        format!("{value:.1}")
    } else {
        format!("{value:.4}")
    }
}

/// p-values get more digits, small ones scientific notation.
fn fmt_p(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else if value != 0.0 && value < 1e-4 {
        format!("{value:.2e}")
    } else {
        format!("{value:.4}")
    }
}

/// Rows of an ANOVA table flattened for rendering: name, SS, DF, MS, F, p,
/// contribution, flags.
struct AnovaRow {
    name: String,
    ss: String,
    df: String,
    ms: String,
    f: String,
    p: String,
    contribution: String,
    note: String,
}

fn anova_rows(table: &AnovaTable) -> Vec<AnovaRow> {
    let mut rows: Vec<AnovaRow> = table
        .sources
        .iter()
        .map(|s| AnovaRow {
            name: s.name.clone(),
            ss: fmt_num(s.sum_of_squares),
            df: s.degrees_of_freedom.to_string(),
            ms: fmt_num(s.mean_square),
            f: fmt_num(s.f_ratio),
            p: fmt_p(s.p_value),
            contribution: fmt_num(s.contribution_percent),
            note: if s.pooled {
                "pooled".to_string()
            } else if s.significant {
                "significant".to_string()
            } else {
                String::new()
            },
        })
        .collect();
    rows.push(AnovaRow {
        name: table.error_label.clone(),
        ss: fmt_num(table.error_ss),
        df: table.error_df.to_string(),
        ms: fmt_num(table.error_ms),
        f: String::new(),
        p: String::new(),
        contribution: String::new(),
        note: String::new(),
    });
    rows.push(AnovaRow {
        name: "Total".to_string(),
        ss: fmt_num(table.total_ss),
        df: table.total_df.to_string(),
        ms: String::new(),
        f: String::new(),
        p: String::new(),
        contribution: String::new(),
        note: String::new(),
    });
    rows
}
