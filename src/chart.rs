use clap::ValueEnum;
use colored::Colorize;

use crate::fmt::{currency, percent};
use crate::report::ReportOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChartKind {
    None,
    Bar,
    Pie,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub legend: String,
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<(String, f64)>,
}

const LIFE_TIME: &str = "Life Time";
const BAR_WIDTH: usize = 40;

impl ChartData {
    /// Anchor-window total and lifetime total across the listed rows. The
    /// rollup row is never part of `rows`.
    pub fn from_output(output: &ReportOutput, currency_code: &str) -> Option<Self> {
        if output.rows.is_empty() {
            return None;
        }
        let lifetime_alias = output
            .columns
            .iter()
            .find(|c| c.key == "lifetime_total")
            .map(|c| c.alias.clone())?;
        let sum = |alias: &str| output.rows.iter().filter_map(|r| r.f64(alias)).sum::<f64>();
        Some(Self {
            legend: "Lybunt Report".to_string(),
            x_label: "Year".to_string(),
            y_label: format!("Amount ({})", currency_code.to_ascii_uppercase()),
            points: vec![
                (output.anchor_label(), sum(&output.anchor_alias)),
                (LIFE_TIME.to_string(), sum(&lifetime_alias)),
            ],
        })
    }
}

/// Draw the chart as terminal text. `ChartKind::None` draws nothing.
pub fn render_text(kind: ChartKind, data: &ChartData, currency_code: &str) -> String {
    let label_width = data.points.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    let mut out = String::new();
    match kind {
        ChartKind::None => return out,
        ChartKind::Bar => {
            let axes = format!("{} / {}", data.x_label, data.y_label);
            out.push_str(&format!("{}  {}\n", data.legend.bold(), axes.dimmed()));
            let max = data.points.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
            for (label, value) in &data.points {
                let width = if max > 0.0 {
                    ((value / max) * BAR_WIDTH as f64).round() as usize
                } else {
                    0
                };
                out.push_str(&format!(
                    "{label:>label_width$} {} {}\n",
                    "█".repeat(width).green(),
                    currency(*value, currency_code)
                ));
            }
        }
        ChartKind::Pie => {
            out.push_str(&format!("{}\n", data.legend.bold()));
            let whole: f64 = data.points.iter().map(|(_, v)| *v).sum();
            for (label, value) in &data.points {
                out.push_str(&format!(
                    "{label:>label_width$} {:>6} {}\n",
                    percent(*value, whole),
                    currency(*value, currency_code)
                ));
            }
        }
    }
    out
}
