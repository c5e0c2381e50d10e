//! Statistical tool operations.
//!
//! Closed-form computations over a loaded [`Dataset`]: per-column frequency
//! tables, the chi-square test of independence and Cronbach's alpha.

use crate::dataset::Dataset;
use crate::error::ToolError;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Label used for missing cells in frequency tables.
const MISSING_LABEL: &str = "(missing)";

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Counts and percentages of every value in one column.
pub fn frequency_table(values: &[&str]) -> (BTreeMap<String, usize>, BTreeMap<String, f64>) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in values {
        let key = if value.is_empty() { MISSING_LABEL } else { value };
        *counts.entry(key.to_string()).or_default() += 1;
    }

    let total = values.len().max(1) as f64;
    let percentages = counts
        .iter()
        .map(|(k, n)| (k.clone(), round_to(*n as f64 / total * 100.0, 2)))
        .collect();

    (counts, percentages)
}

/// Frequency table for every column in the dataset.
pub fn descriptive_statistics(dataset: &Dataset) -> Result<Value, ToolError> {
    let mut summary = Map::new();

    for column in dataset.columns() {
        let values = dataset
            .column_values(column)
            .ok_or_else(|| ToolError::MissingColumn(column.clone()))?;
        let (counts, percentages) = frequency_table(&values);
        summary.insert(
            column.clone(),
            json!({ "counts": counts, "percentages": percentages }),
        );
    }

    Ok(Value::Object(summary))
}

/// Chi-square test of independence between two categorical columns.
///
/// Rows with a missing value in either column are dropped. Applies Yates'
/// continuity correction when the table has one degree of freedom.
pub fn chi_square_test(dataset: &Dataset, outcome: &str, predictor: &str) -> Result<Value, ToolError> {
    if dataset.column_index(outcome).is_none() {
        return Err(ToolError::MissingColumn(outcome.to_string()));
    }
    let pairs = dataset
        .paired_values(outcome, predictor)
        .ok_or_else(|| ToolError::MissingColumn(predictor.to_string()))?;

    if pairs.is_empty() {
        return Err(ToolError::InsufficientData(
            "No valid data after removing missing values".to_string(),
        ));
    }

    let rows: Vec<&str> = sorted_levels(pairs.iter().map(|(o, _)| *o));
    let cols: Vec<&str> = sorted_levels(pairs.iter().map(|(_, p)| *p));

    if rows.len() < 2 || cols.len() < 2 {
        return Err(ToolError::InsufficientData(
            "Chi-square test requires at least two categories in each variable".to_string(),
        ));
    }

    let mut observed = vec![vec![0f64; cols.len()]; rows.len()];
    for (o, p) in &pairs {
        let r = rows.iter().position(|v| v == o).unwrap_or(0);
        let c = cols.iter().position(|v| v == p).unwrap_or(0);
        observed[r][c] += 1.0;
    }

    let n = pairs.len() as f64;
    let row_totals: Vec<f64> = observed.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<f64> = (0..cols.len())
        .map(|c| observed.iter().map(|r| r[c]).sum())
        .collect();

    let dof = (rows.len() - 1) * (cols.len() - 1);
    let mut statistic = 0.0;
    let mut expected = vec![vec![0f64; cols.len()]; rows.len()];

    for r in 0..rows.len() {
        for c in 0..cols.len() {
            let e = row_totals[r] * col_totals[c] / n;
            expected[r][c] = e;
            let mut diff = (observed[r][c] - e).abs();
            if dof == 1 {
                diff = (diff - 0.5).max(0.0);
            }
            statistic += diff * diff / e;
        }
    }

    let p_value = chi_square_survival(statistic, dof as f64);

    let expected_rounded: Vec<Vec<f64>> = expected
        .iter()
        .map(|r| r.iter().map(|e| round_to(*e, 2)).collect())
        .collect();

    Ok(json!({
        "outcome": outcome,
        "predictor": predictor,
        "chi_square": round_to(statistic, 4),
        "p_value": round_to(p_value, 4),
        "degrees_of_freedom": dof,
        "significant": p_value < 0.05,
        "observations": pairs.len(),
        "outcome_levels": rows,
        "predictor_levels": cols,
        "expected_frequencies": expected_rounded,
    }))
}

fn sorted_levels<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut levels: Vec<&str> = values.collect();
    levels.sort_unstable();
    levels.dedup();
    levels
}

/// Cronbach's alpha over the given item columns.
///
/// Rows with a missing or non-numeric value in any item are dropped.
/// Returns both the raw and the standardised (mean inter-item correlation)
/// coefficient.
pub fn cronbach_alpha(dataset: &Dataset, columns: &[String]) -> Result<Value, ToolError> {
    let k = columns.len();
    if k < 2 {
        return Err(ToolError::InsufficientData(format!(
            "Reliability score requires at least two item columns, got {}",
            k
        )));
    }

    let indices: Vec<usize> = columns
        .iter()
        .map(|c| {
            dataset
                .column_index(c)
                .ok_or_else(|| ToolError::MissingColumn(c.clone()))
        })
        .collect::<Result<_, _>>()?;

    let items: Vec<Vec<f64>> = dataset
        .rows()
        .iter()
        .filter_map(|row| {
            indices
                .iter()
                .map(|&i| row[i].parse::<f64>().ok())
                .collect::<Option<Vec<f64>>>()
        })
        .collect();

    let n = items.len();
    if n < 2 {
        return Err(ToolError::InsufficientData(format!(
            "Reliability score requires at least two complete responses, got {}",
            n
        )));
    }

    let item_columns: Vec<Vec<f64>> = (0..k)
        .map(|j| items.iter().map(|row| row[j]).collect())
        .collect();
    let item_variance_sum: f64 = item_columns.iter().map(|c| sample_variance(c)).sum();
    let totals: Vec<f64> = items.iter().map(|row| row.iter().sum()).collect();
    let total_variance = sample_variance(&totals);

    if total_variance <= f64::EPSILON {
        return Err(ToolError::InsufficientData(
            "Reliability score is undefined when total scores have zero variance".to_string(),
        ));
    }

    let kf = k as f64;
    let raw_alpha = (kf / (kf - 1.0)) * (1.0 - item_variance_sum / total_variance);

    let mut correlations = Vec::new();
    for a in 0..k {
        for b in (a + 1)..k {
            if let Some(r) = pearson(&item_columns[a], &item_columns[b]) {
                correlations.push(r);
            }
        }
    }
    if correlations.is_empty() {
        return Err(ToolError::InsufficientData(
            "Standardized reliability needs at least one pair of items with non-zero variance"
                .to_string(),
        ));
    }
    let mean_corr = correlations.iter().sum::<f64>() / correlations.len() as f64;
    let standardized_alpha = (kf * mean_corr) / (1.0 + (kf - 1.0) * mean_corr);

    if !raw_alpha.is_finite() || !standardized_alpha.is_finite() {
        return Err(ToolError::InsufficientData(
            "Reliability score could not be computed for these items".to_string(),
        ));
    }

    Ok(json!({
        "raw_alpha": round_to(raw_alpha, 4),
        "standardized_alpha": round_to(standardized_alpha, 4),
        "items": k,
        "responses": n,
        "columns": columns,
    }))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    let denom = (va * vb).sqrt();
    (denom > f64::EPSILON).then(|| cov / denom)
}

/// Upper tail probability of the chi-square distribution.
pub fn chi_square_survival(statistic: f64, dof: f64) -> f64 {
    if statistic <= 0.0 {
        return 1.0;
    }
    upper_regularized_gamma(dof / 2.0, statistic / 2.0)
}

fn ln_gamma(x: f64) -> f64 {
    // Lanczos approximation, g = 7.
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = COEF[0];
    for (i, c) in COEF.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// Q(a, x) = Γ(a, x) / Γ(a).
fn upper_regularized_gamma(a: f64, x: f64) -> f64 {
    const EPS: f64 = 1e-14;
    const MAX_ITER: usize = 500;

    if x < a + 1.0 {
        // Series for P(a, x).
        let mut sum = 1.0 / a;
        let mut term = sum;
        let mut ap = a;
        for _ in 0..MAX_ITER {
            ap += 1.0;
            term *= x / ap;
            sum += term;
            if term.abs() < sum.abs() * EPS {
                break;
            }
        }
        let p = sum * (-x + a * x.ln() - ln_gamma(a)).exp();
        (1.0 - p).clamp(0.0, 1.0)
    } else {
        // Lentz continued fraction for Q(a, x).
        let tiny = 1e-300;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..=MAX_ITER {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < tiny {
                d = tiny;
            }
            c = b + an / c;
            if c.abs() < tiny {
                c = tiny;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPS {
                break;
            }
        }
        (h * (-x + a * x.ln() - ln_gamma(a)).exp()).clamp(0.0, 1.0)
    }
}
