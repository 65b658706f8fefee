//! Markdown report rendering.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::state::ExperimentState;

use super::{anova_rows, fmt_num};

/// Escape pipe characters so cell text cannot break the table.
fn escape(cell: &str) -> String {
    cell.replace('|', "\\|")
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |\n", cells.join(" | "))
}

fn table_separator(width: usize) -> String {
    format!("|{}\n", " --- |".repeat(width))
}

/// Render a completed experiment as a Markdown document.
pub fn render(state: &ExperimentState) -> Result<String> {
    let mut out = String::new();
    let factors = state.config.resolved_control_factors()?;

    let _ = writeln!(out, "# Taguchi experiment report\n");
    let _ = writeln!(
        out,
        "- Design: **{}** ({} runs x {} repetition(s))",
        state.design.designation,
        state.design.runs(),
        state.config.repetitions
    );
    let _ = writeln!(out, "- Engine version: {}", state.engine_version);
    let _ = writeln!(out, "- Started: {}", state.created_at.to_rfc3339());
    let _ = writeln!(out, "- Updated: {}\n", state.updated_at.to_rfc3339());

    // Run matrix.
    let _ = writeln!(out, "## Run matrix\n");
    let mut header = vec!["Run".to_string()];
    header.extend(factors.iter().map(|f| escape(&f.name)));
    out.push_str(&table_row(&header));
    out.push_str(&table_separator(header.len()));
    for run in 0..state.design.runs() {
        let mut cells = vec![(run + 1).to_string()];
        for factor in &factors {
            let cell = state
                .design
                .factor_column(&factor.name)
                .and_then(|col| factor.value_for_symbol(state.design.symbol(run, col)))
                .unwrap_or("?");
            cells.push(escape(cell));
        }
        out.push_str(&table_row(&cells));
    }
    out.push('\n');

    for report in &state.reports {
        let _ = writeln!(out, "## Metric: {}\n", escape(&report.metric_name));
        let _ = writeln!(out, "Optimization: {}\n", report.sn_type.label());

        let _ = writeln!(out, "### Optimal configuration\n");
        out.push_str(&table_row(&["Factor".into(), "Level".into(), "Value".into()]));
        out.push_str(&table_separator(3));
        for (name, selection) in &report.optimal_configuration.0 {
            out.push_str(&table_row(&[
                escape(name),
                selection.symbol.to_string(),
                escape(&selection.value),
            ]));
        }
        out.push('\n');

        let prediction = &report.prediction;
        let _ = writeln!(out, "### Prediction\n");
        let _ = writeln!(
            out,
            "- Predicted value: **{}**",
            fmt_num(prediction.predicted_value)
        );
        if let Some(interval) = prediction.value_interval {
            let _ = writeln!(
                out,
                "- 95% interval (original scale): [{}, {}]",
                fmt_num(interval.lower),
                fmt_num(interval.upper)
            );
        }
        let _ = writeln!(
            out,
            "- Predicted S/N: {} dB",
            fmt_num(prediction.predicted_sn)
        );
        if let Some(interval) = prediction.sn_interval {
            let _ = writeln!(
                out,
                "- 95% interval (S/N): [{}, {}] dB",
                fmt_num(interval.lower),
                fmt_num(interval.upper)
            );
        }
        let _ = writeln!(out, "- Effective sample size: {}", fmt_num(prediction.n_eff));
        for note in &prediction.notes {
            let _ = writeln!(out, "- Note: {}", escape(note));
        }
        out.push('\n');

        let _ = writeln!(out, "### Main effects (S/N by level)\n");
        out.push_str(&table_row(&[
            "Factor".into(),
            "Level".into(),
            "Mean S/N (dB)".into(),
            "Mean raw".into(),
        ]));
        out.push_str(&table_separator(4));
        for effects in &report.main_effects {
            for (level, sn) in &effects.sn_by_level {
                let raw = effects
                    .raw_by_level
                    .get(level)
                    .copied()
                    .unwrap_or(f64::NAN);
                out.push_str(&table_row(&[
                    escape(&effects.factor_name),
                    level.to_string(),
                    fmt_num(*sn),
                    fmt_num(raw),
                ]));
            }
        }
        out.push('\n');

        for inter in &report.interaction_effects {
            let _ = writeln!(out, "### Interaction {}\n", escape(&inter.key));
            out.push_str(&table_row(&[
                escape(&inter.first_factor),
                escape(&inter.second_factor),
                "Mean S/N (dB)".into(),
            ]));
            out.push_str(&table_separator(3));
            for cell in &inter.cells {
                out.push_str(&table_row(&[
                    cell.level_a.to_string(),
                    cell.level_b.to_string(),
                    fmt_num(cell.sn),
                ]));
            }
            out.push('\n');
        }

        render_anova(&mut out, "### ANOVA", &report.anova);
        if let Some(pooled) = &report.pooled_anova {
            render_anova(&mut out, "### ANOVA (pooled)", pooled);
        }

        if !report.effect_estimates.is_empty() {
            let _ = writeln!(out, "### Two-level effect estimates\n");
            out.push_str(&table_row(&["Source".into(), "Effect (dB)".into()]));
            out.push_str(&table_separator(2));
            for estimate in &report.effect_estimates {
                out.push_str(&table_row(&[
                    escape(&estimate.name),
                    fmt_num(estimate.effect),
                ]));
            }
            out.push('\n');
        }

        if !report.warnings.is_empty() {
            let _ = writeln!(out, "### Warnings\n");
            for warning in &report.warnings {
                let _ = writeln!(out, "- {}", escape(warning));
            }
            out.push('\n');
        }
    }

    Ok(out)
}

fn render_anova(out: &mut String, title: &str, table: &crate::analysis::anova::AnovaTable) {
    let _ = writeln!(out, "{title}\n");
    out.push_str(&table_row(&[
        "Source".into(),
        "SS".into(),
        "DF".into(),
        "MS".into(),
        "F".into(),
        "p".into(),
        "Contribution %".into(),
        "".into(),
    ]));
    out.push_str(&table_separator(8));
    for row in anova_rows(table) {
        out.push_str(&table_row(&[
            escape(&row.name),
            row.ss,
            row.df,
            row.ms,
            row.f,
            row.p,
            row.contribution,
            row.note,
        ]));
    }
    out.push('\n');
}

/// Render and write the report next to the experiment's other artifacts.
pub fn write(state: &ExperimentState, path: &Path) -> Result<()> {
    let content = render(state)?;
    let file = File::create(path)
        .map_err(|e| EngineError::Report(format!("cannot create {}: {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(content.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|e| EngineError::Report(format!("cannot write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipes_are_escaped() {
        assert_eq!(escape("a|b"), "a\\|b");
    }

    #[test]
    fn separator_matches_width() {
        assert_eq!(table_separator(3), "| --- | --- | --- |\n");
    }
}
