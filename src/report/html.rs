//! HTML report rendering.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::analysis::anova::AnovaTable;
use crate::error::{EngineError, Result};
use crate::state::ExperimentState;

use super::{anova_rows, fmt_num};

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn table_open(html: &mut String, headers: &[&str]) {
    html.push_str("<table>\n<thead><tr>");
    for header in headers {
        let _ = write!(html, "<th>{}</th>", html_escape(header));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
}

fn table_cells(html: &mut String, cells: &[String]) {
    html.push_str("<tr>");
    for cell in cells {
        let _ = write!(html, "<td>{}</td>", html_escape(cell));
    }
    html.push_str("</tr>\n");
}

fn table_close(html: &mut String) {
    html.push_str("</tbody>\n</table>\n");
}

/// Render a completed experiment as a standalone HTML document.
pub fn render(state: &ExperimentState) -> Result<String> {
    let factors = state.config.resolved_control_factors()?;
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Taguchi experiment report</title>\n");
    html.push_str("<style>\n");
    html.push_str("body { font-family: Arial, sans-serif; margin: 20px; }\n");
    html.push_str("table { border-collapse: collapse; margin-bottom: 20px; }\n");
    html.push_str("th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }\n");
    html.push_str("th { background-color: #f2f2f2; font-weight: bold; }\n");
    html.push_str("tr:nth-child(even) { background-color: #f9f9f9; }\n");
    html.push_str(".warning { color: #a15c00; }\n");
    html.push_str(".significant { font-weight: bold; }\n");
    html.push_str("</style>\n</head>\n<body>\n");

    let _ = writeln!(html, "<h1>Taguchi experiment report</h1>");
    let _ = writeln!(
        html,
        "<p>Design <strong>{}</strong>, {} runs x {} repetition(s); engine {}; updated {}</p>",
        html_escape(&state.design.designation),
        state.design.runs(),
        state.config.repetitions,
        html_escape(&state.engine_version),
        state.updated_at.to_rfc3339()
    );

    let _ = writeln!(html, "<h2>Run matrix</h2>");
    let mut headers = vec!["Run"];
    let names: Vec<&str> = factors.iter().map(|f| f.name.as_str()).collect();
    headers.extend(names);
    table_open(&mut html, &headers);
    for run in 0..state.design.runs() {
        let mut cells = vec![(run + 1).to_string()];
        for factor in &factors {
            let cell = state
                .design
                .factor_column(&factor.name)
                .and_then(|col| factor.value_for_symbol(state.design.symbol(run, col)))
                .unwrap_or("?");
            cells.push(cell.to_string());
        }
        table_cells(&mut html, &cells);
    }
    table_close(&mut html);

    for report in &state.reports {
        let _ = writeln!(
            html,
            "<h2>Metric: {} ({})</h2>",
            html_escape(&report.metric_name),
            report.sn_type.label()
        );

        let _ = writeln!(html, "<h3>Optimal configuration</h3>");
        table_open(&mut html, &["Factor", "Level", "Value"]);
        for (name, selection) in &report.optimal_configuration.0 {
            table_cells(
                &mut html,
                &[
                    name.clone(),
                    selection.symbol.to_string(),
                    selection.value.clone(),
                ],
            );
        }
        table_close(&mut html);

        let prediction = &report.prediction;
        let _ = writeln!(html, "<h3>Prediction</h3>");
        html.push_str("<ul>\n");
        let _ = writeln!(
            html,
            "<li>Predicted value: <strong>{}</strong></li>",
            fmt_num(prediction.predicted_value)
        );
        if let Some(interval) = prediction.value_interval {
            let _ = writeln!(
                html,
                "<li>95% interval (original scale): [{}, {}]</li>",
                fmt_num(interval.lower),
                fmt_num(interval.upper)
            );
        }
        let _ = writeln!(
            html,
            "<li>Predicted S/N: {} dB</li>",
            fmt_num(prediction.predicted_sn)
        );
        if let Some(interval) = prediction.sn_interval {
            let _ = writeln!(
                html,
                "<li>95% interval (S/N): [{}, {}] dB</li>",
                fmt_num(interval.lower),
                fmt_num(interval.upper)
            );
        }
        let _ = writeln!(
            html,
            "<li>Effective sample size: {}</li>",
            fmt_num(prediction.n_eff)
        );
        for note in &prediction.notes {
            let _ = writeln!(html, "<li>Note: {}</li>", html_escape(note));
        }
        html.push_str("</ul>\n");

        let _ = writeln!(html, "<h3>Main effects</h3>");
        table_open(&mut html, &["Factor", "Level", "Mean S/N (dB)", "Mean raw"]);
        for effects in &report.main_effects {
            for (level, sn) in &effects.sn_by_level {
                let raw = effects
                    .raw_by_level
                    .get(level)
                    .copied()
                    .unwrap_or(f64::NAN);
                table_cells(
                    &mut html,
                    &[
                        effects.factor_name.clone(),
                        level.to_string(),
                        fmt_num(*sn),
                        fmt_num(raw),
                    ],
                );
            }
        }
        table_close(&mut html);

        for inter in &report.interaction_effects {
            let _ = writeln!(
                html,
                "<h3>Interaction {}</h3>",
                html_escape(&inter.key)
            );
            table_open(
                &mut html,
                &[
                    inter.first_factor.as_str(),
                    inter.second_factor.as_str(),
                    "Mean S/N (dB)",
                ],
            );
            for cell in &inter.cells {
                table_cells(
                    &mut html,
                    &[
                        cell.level_a.to_string(),
                        cell.level_b.to_string(),
                        fmt_num(cell.sn),
                    ],
                );
            }
            table_close(&mut html);
        }

        render_anova(&mut html, "ANOVA", &report.anova);
        if let Some(pooled) = &report.pooled_anova {
            render_anova(&mut html, "ANOVA (pooled)", pooled);
        }

        if !report.effect_estimates.is_empty() {
            let _ = writeln!(html, "<h3>Two-level effect estimates</h3>");
            table_open(&mut html, &["Source", "Effect (dB)"]);
            for estimate in &report.effect_estimates {
                table_cells(
                    &mut html,
                    &[estimate.name.clone(), fmt_num(estimate.effect)],
                );
            }
            table_close(&mut html);
        }

        if !report.warnings.is_empty() {
            let _ = writeln!(html, "<h3>Warnings</h3>\n<ul>");
            for warning in &report.warnings {
                let _ = writeln!(
                    html,
                    "<li class=\"warning\">{}</li>",
                    html_escape(warning)
                );
            }
            html.push_str("</ul>\n");
        }
    }

    html.push_str("</body>\n</html>\n");
    Ok(html)
}

fn render_anova(html: &mut String, title: &str, table: &AnovaTable) {
    let _ = writeln!(html, "<h3>{title}</h3>");
    table_open(
        html,
        &["Source", "SS", "DF", "MS", "F", "p", "Contribution %", ""],
    );
    for row in anova_rows(table) {
        table_cells(
            html,
            &[
                row.name, row.ss, row.df, row.ms, row.f, row.p, row.contribution, row.note,
            ],
        );
    }
    table_close(html);
}

/// Render and write the HTML report.
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
    fn escaping_covers_markup_characters() {
        assert_eq!(html_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
