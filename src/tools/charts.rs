//! Chart tool operations.
//!
//! Charts are written as standalone SVG files. Every call writes to a fresh
//! `<tool>_<uuid>.svg` so repeated charts in one plan never overwrite each
//! other.

use crate::dataset::Dataset;
use crate::error::ToolError;
use crate::tools::statistics::frequency_table;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const WIDTH: f64 = 720.0;
const HEIGHT: f64 = 440.0;
const MARGIN: f64 = 60.0;

const PALETTE: [&str; 8] = [
    "#4C72B0", "#DD8452", "#55A868", "#C44E52", "#8172B3", "#937860", "#DA8BC3", "#8C8C8C",
];

/// Where chart files go.
#[derive(Debug, Clone)]
pub struct ChartTarget {
    pub dir: PathBuf,
}

impl ChartTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Collision-free path for one chart.
    pub fn unique_path(&self, tool: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.svg", tool, Uuid::new_v4().simple()))
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\n', " ")
}

fn truncate_label(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn write_svg(path: &Path, body: &str, title: &str) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ToolError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
        w = WIDTH,
        h = HEIGHT
    );
    svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = write!(
        svg,
        r#"<text x="{}" y="28" text-anchor="middle" font-size="16">{}</text>"#,
        WIDTH / 2.0,
        escape(&truncate_label(title, 80))
    );
    svg.push_str(body);
    svg.push_str("</svg>\n");

    std::fs::write(path, svg).map_err(|source| ToolError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!("Wrote chart {}", path.display());
    Ok(())
}

/// Draw grouped vertical bars. `series` maps a group label to one value per
/// category.
fn bar_body(categories: &[String], series: &[(String, Vec<f64>)]) -> String {
    let mut body = String::new();
    let max = series
        .iter()
        .flat_map(|(_, values)| values.iter().copied())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN - 40.0;
    let base_y = MARGIN + plot_h;
    let slot = plot_w / categories.len().max(1) as f64;
    let bar_w = (slot * 0.8) / series.len().max(1) as f64;

    let _ = write!(
        body,
        r##"<line x1="{x}" y1="{y}" x2="{x2}" y2="{y}" stroke="#333"/>"##,
        x = MARGIN,
        x2 = WIDTH - MARGIN,
        y = base_y
    );

    for (ci, category) in categories.iter().enumerate() {
        let slot_x = MARGIN + slot * ci as f64 + slot * 0.1;
        for (si, (_, values)) in series.iter().enumerate() {
            let value = values.get(ci).copied().unwrap_or(0.0);
            let h = value / max * plot_h;
            let _ = write!(
                body,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
                slot_x + bar_w * si as f64,
                base_y - h,
                bar_w,
                h,
                PALETTE[si % PALETTE.len()]
            );
        }
        let _ = write!(
            body,
            r#"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end" transform="rotate(-35 {:.1} {:.1})">{}</text>"#,
            slot_x + slot * 0.4,
            base_y + 16.0,
            slot_x + slot * 0.4,
            base_y + 16.0,
            escape(&truncate_label(category, 24))
        );
    }

    if series.len() > 1 {
        for (si, (label, _)) in series.iter().enumerate() {
            let y = 50.0 + 16.0 * si as f64;
            let _ = write!(
                body,
                r#"<rect x="{:.1}" y="{:.1}" width="10" height="10" fill="{}"/><text x="{:.1}" y="{:.1}" font-size="11">{}</text>"#,
                WIDTH - MARGIN - 140.0,
                y,
                PALETTE[si % PALETTE.len()],
                WIDTH - MARGIN - 125.0,
                y + 9.0,
                escape(&truncate_label(label, 20))
            );
        }
    }

    body
}

fn counts_for(dataset: &Dataset, column: &str) -> Result<BTreeMap<String, usize>, ToolError> {
    let values = dataset
        .column_values(column)
        .ok_or_else(|| ToolError::MissingColumn(column.to_string()))?;
    let non_missing: Vec<&str> = values.into_iter().filter(|v| !v.is_empty()).collect();
    if non_missing.is_empty() {
        return Err(ToolError::InsufficientData(format!(
            "Column '{}' has no values to plot",
            column
        )));
    }
    Ok(frequency_table(&non_missing).0)
}

/// Bar chart of value counts for one column.
pub fn countplot(dataset: &Dataset, x: &str, target: &ChartTarget) -> Result<Value, ToolError> {
    let counts = counts_for(dataset, x)?;
    let categories: Vec<String> = counts.keys().cloned().collect();
    let values: Vec<f64> = counts.values().map(|n| *n as f64).collect();

    let path = target.unique_path("countplot");
    write_svg(&path, &bar_body(&categories, &[(x.to_string(), values)]), x)?;

    Ok(json!({
        "type": "countplot",
        "x": x,
        "counts": counts,
        "file": path.display().to_string(),
    }))
}

/// Counts of `x` split by `hue`, drawn as grouped bars.
pub fn barplot(
    dataset: &Dataset,
    x: &str,
    hue: &str,
    target: &ChartTarget,
) -> Result<Value, ToolError> {
    if dataset.column_index(x).is_none() {
        return Err(ToolError::MissingColumn(x.to_string()));
    }
    let pairs = dataset
        .paired_values(x, hue)
        .ok_or_else(|| ToolError::MissingColumn(hue.to_string()))?;
    if pairs.is_empty() {
        return Err(ToolError::InsufficientData(
            "barplot received no rows with both columns present".to_string(),
        ));
    }

    let mut table: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    let mut categories: Vec<String> = Vec::new();
    for (xv, hv) in &pairs {
        *table
            .entry(hv.to_string())
            .or_default()
            .entry(xv.to_string())
            .or_default() += 1;
        if !categories.iter().any(|c| c == xv) {
            categories.push(xv.to_string());
        }
    }
    categories.sort();

    let series: Vec<(String, Vec<f64>)> = table
        .iter()
        .map(|(group, counts)| {
            let values = categories
                .iter()
                .map(|c| counts.get(c).copied().unwrap_or(0) as f64)
                .collect();
            (group.clone(), values)
        })
        .collect();

    let path = target.unique_path("barplot");
    write_svg(
        &path,
        &bar_body(&categories, &series),
        &format!("{} by {}", x, hue),
    )?;

    Ok(json!({
        "type": "barplot",
        "x": x,
        "hue": hue,
        "counts": table,
        "file": path.display().to_string(),
    }))
}

/// Pie chart of value shares for one column.
pub fn piechart(dataset: &Dataset, column: &str, target: &ChartTarget) -> Result<Value, ToolError> {
    let counts = counts_for(dataset, column)?;
    let total: usize = counts.values().sum();

    let cx = WIDTH / 2.0 - 80.0;
    let cy = HEIGHT / 2.0 + 10.0;
    let r = 150.0;
    let mut body = String::new();
    let mut angle = -std::f64::consts::FRAC_PI_2;

    for (i, (label, n)) in counts.iter().enumerate() {
        let share = *n as f64 / total as f64;
        let color = PALETTE[i % PALETTE.len()];

        if counts.len() == 1 {
            let _ = write!(
                body,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}"/>"#,
                cx, cy, r, color
            );
        } else {
            let end = angle + share * std::f64::consts::TAU;
            let large = if share > 0.5 { 1 } else { 0 };
            let _ = write!(
                body,
                r#"<path d="M {cx:.1} {cy:.1} L {x1:.1} {y1:.1} A {r:.1} {r:.1} 0 {large} 1 {x2:.1} {y2:.1} Z" fill="{color}"/>"#,
                cx = cx,
                cy = cy,
                x1 = cx + r * angle.cos(),
                y1 = cy + r * angle.sin(),
                r = r,
                large = large,
                x2 = cx + r * end.cos(),
                y2 = cy + r * end.sin(),
                color = color
            );
            angle = end;
        }

        let ly = 70.0 + 18.0 * i as f64;
        let _ = write!(
            body,
            r#"<rect x="{:.1}" y="{:.1}" width="10" height="10" fill="{}"/><text x="{:.1}" y="{:.1}" font-size="11">{} ({:.1}%)</text>"#,
            WIDTH - 220.0,
            ly,
            color,
            WIDTH - 205.0,
            ly + 9.0,
            escape(&truncate_label(label, 22)),
            share * 100.0
        );
    }

    let path = target.unique_path("piechart");
    write_svg(&path, &body, column)?;

    Ok(json!({
        "type": "piechart",
        "column": column,
        "counts": counts,
        "file": path.display().to_string(),
    }))
}
