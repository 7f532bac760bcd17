//! Column transformers: imputation, standard scaling and one-hot encoding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::PipelineError;
use crate::schema::{ColumnKind, FeatureRow, FeatureValue, Field};

/// How a numeric column fills missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericImpute {
    Median,
    Mean,
}

impl NumericImpute {
    pub fn describe(self) -> &'static str {
        match self {
            NumericImpute::Median => "Median from training data",
            NumericImpute::Mean => "Mean from training data",
        }
    }

    /// Strategy used for each numeric field at fit time.
    pub fn for_field(field: Field) -> Self {
        match field {
            Field::Mileage => NumericImpute::Mean,
            _ => NumericImpute::Median,
        }
    }
}

/// Fitted imputer + scaler for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub strategy: NumericImpute,
    pub fill: f64,
    pub mean: f64,
    pub scale: f64,
}

impl NumericColumn {
    pub fn fit(name: &str, strategy: NumericImpute, values: &[Option<f64>]) -> Self {
        let mut observed: Vec<f64> = values.iter().flatten().copied().collect();
        let fill = match strategy {
            NumericImpute::Median => median(&mut observed),
            NumericImpute::Mean => mean(&observed),
        };

        let imputed: Vec<f64> = values.iter().map(|v| v.unwrap_or(fill)).collect();
        let mean = mean(&imputed);
        let std = population_std(&imputed, mean);

        Self {
            name: name.to_string(),
            strategy,
            fill,
            mean,
            scale: if std > 0.0 { std } else { 1.0 },
        }
    }

    pub fn transform(&self, value: Option<f64>) -> f64 {
        (value.unwrap_or(self.fill) - self.mean) / self.scale
    }
}

/// Fitted most-frequent imputer + drop-first one-hot encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub fill: String,
    /// Sorted categories seen at fit time. The first one is dropped when encoding.
    pub categories: Vec<String>,
}

impl CategoricalColumn {
    pub fn fit(name: &str, values: &[Option<String>]) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for v in values.iter().flatten() {
            *counts.entry(v.as_str()).or_default() += 1;
        }

        // Ties go to the lexicographically smallest label.
        let fill = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(label, _)| label.to_string())
            .unwrap_or_else(|| "missing".to_string());

        let mut categories: Vec<String> = counts.keys().map(|k| k.to_string()).collect();
        if !categories.contains(&fill) {
            categories.push(fill.clone());
        }
        categories.sort();

        Self {
            name: name.to_string(),
            fill,
            categories,
        }
    }

    pub fn width(&self) -> usize {
        self.categories.len().saturating_sub(1)
    }

    /// Appends the encoded value. Unseen categories encode as all zeros.
    pub fn encode(&self, value: Option<&str>, out: &mut Vec<f64>) {
        let value = value.unwrap_or(&self.fill);
        out.extend(
            self.categories
                .iter()
                .skip(1)
                .map(|c| if c == value { 1.0 } else { 0.0 }),
        );
    }
}

/// Column transformer over the full feature schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric: Vec<NumericColumn>,
    pub categorical: Vec<CategoricalColumn>,
}

impl Preprocessor {
    pub fn fit(rows: &[FeatureRow]) -> Result<Self, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyTrainingSet);
        }

        let mut numeric = Vec::new();
        let mut categorical = Vec::new();

        for field in Field::ALL {
            let column = field.column();
            match field.kind() {
                ColumnKind::Numeric => {
                    let values = rows
                        .iter()
                        .map(|r| number_cell(r, column))
                        .collect::<Result<Vec<_>, _>>()?;
                    numeric.push(NumericColumn::fit(
                        column,
                        NumericImpute::for_field(field),
                        &values,
                    ));
                }
                ColumnKind::Categorical => {
                    let values = rows
                        .iter()
                        .map(|r| text_cell(r, column).map(|v| v.map(str::to_string)))
                        .collect::<Result<Vec<_>, _>>()?;
                    categorical.push(CategoricalColumn::fit(column, &values));
                }
            }
        }

        Ok(Self {
            numeric,
            categorical,
        })
    }

    /// Number of model inputs produced per row.
    pub fn width(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.width()).sum::<usize>()
    }

    /// Validates `row` against the fitted columns and encodes it.
    pub fn transform(&self, row: &FeatureRow) -> Result<Vec<f64>, PipelineError> {
        let expected = self.numeric.len() + self.categorical.len();
        if row.len() > expected {
            let unexpected = row
                .iter()
                .map(|(name, _)| name)
                .find(|name| {
                    !self.numeric.iter().any(|c| c.name == *name)
                        && !self.categorical.iter().any(|c| c.name == *name)
                })
                .unwrap_or_default();
            return Err(PipelineError::UnexpectedColumn(unexpected.to_string()));
        }

        let mut out = Vec::with_capacity(self.width());
        for column in &self.numeric {
            out.push(column.transform(number_cell(row, &column.name)?));
        }
        for column in &self.categorical {
            column.encode(text_cell(row, &column.name)?, &mut out);
        }
        Ok(out)
    }

    /// Human-readable fill rule for a field, if the field has a fitted column.
    pub fn fill_rule(&self, field: Field) -> Option<String> {
        let column = field.column();
        if let Some(c) = self.numeric.iter().find(|c| c.name == column) {
            return Some(c.strategy.describe().to_string());
        }
        self.categorical
            .iter()
            .find(|c| c.name == column)
            .map(|_| "Most frequent from training data".to_string())
    }
}

fn number_cell(row: &FeatureRow, column: &str) -> Result<Option<f64>, PipelineError> {
    match row.get(column) {
        None => Err(PipelineError::MissingColumn(column.to_string())),
        Some(FeatureValue::Missing) => Ok(None),
        Some(FeatureValue::Number(n)) if n.is_finite() => Ok(Some(*n)),
        Some(FeatureValue::Number(_)) => Err(PipelineError::NonFinite(column.to_string())),
        Some(FeatureValue::Text(_)) => Err(PipelineError::WrongType {
            column: column.to_string(),
            expected: ColumnKind::Numeric,
        }),
    }
}

fn text_cell<'a>(row: &'a FeatureRow, column: &str) -> Result<Option<&'a str>, PipelineError> {
    match row.get(column) {
        None => Err(PipelineError::MissingColumn(column.to_string())),
        Some(FeatureValue::Missing) => Ok(None),
        Some(FeatureValue::Text(s)) => Ok(Some(s)),
        Some(FeatureValue::Number(_)) => Err(PipelineError::WrongType {
            column: column.to_string(),
            expected: ColumnKind::Categorical,
        }),
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
