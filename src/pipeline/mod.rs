//! The fitted preprocessing + regression pipeline.
//!
//! [`Regressor`] is the seam the prediction service depends on. [`Pipeline`]
//! is the real implementation: a [`Preprocessor`] followed by a
//! [`RandomForest`] fitted on log-scale prices.

pub mod artifact;
pub mod forest;
pub mod preprocess;

pub use artifact::{DEFAULT_MODEL_PATHS, load_first, load_pipeline, save_pipeline};
pub use forest::{ForestParams, RandomForest};
pub use preprocess::Preprocessor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{ColumnKind, FeatureRow, Field};

/// Bumped whenever the serialized layout of [`Pipeline`] changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("unexpected column '{0}'")]
    UnexpectedColumn(String),

    #[error("column '{column}' must be {expected:?}")]
    WrongType { column: String, expected: ColumnKind },

    #[error("column '{0}' is not a finite number")]
    NonFinite(String),

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("model error: {0}")]
    Model(String),
}

/// Anything that maps one named-column row to a log-scale price.
pub trait Regressor: Send + Sync {
    fn predict(&self, row: &FeatureRow) -> Result<f64, PipelineError>;

    /// How the regressor fills `field` when it is missing, for user disclosure.
    fn fill_rule(&self, _field: Field) -> Option<String> {
        None
    }
}

/// Provenance and hold-out quality of a fitted pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub trained_at: DateTime<Utc>,
    pub params: ForestParams,
    pub n_train: usize,
    pub n_test: Option<usize>,
    /// R² on the hold-out split, log scale.
    pub r2: Option<f64>,
    /// Root mean squared error on the hold-out split, log scale.
    pub rmse: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub format_version: u32,
    pub metadata: ArtifactMetadata,
    preprocessor: Preprocessor,
    forest: RandomForest,
}

impl Pipeline {
    /// Fits the preprocessor and the forest on `rows` with log-price `targets`.
    pub fn fit(
        rows: &[FeatureRow],
        targets: &[f64],
        params: &ForestParams,
    ) -> Result<Self, PipelineError> {
        let preprocessor = Preprocessor::fit(rows)?;
        let x = rows
            .iter()
            .map(|r| preprocessor.transform(r))
            .collect::<Result<Vec<_>, _>>()?;
        let forest = RandomForest::fit(&x, targets, params)?;

        Ok(Self {
            format_version: FORMAT_VERSION,
            metadata: ArtifactMetadata {
                trained_at: Utc::now(),
                params: params.clone(),
                n_train: rows.len(),
                n_test: None,
                r2: None,
                rmse: None,
            },
            preprocessor,
            forest,
        })
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Checks that a deserialized pipeline is internally consistent.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.format_version != FORMAT_VERSION {
            return Err(PipelineError::Model(format!(
                "unsupported artifact format {} (expected {FORMAT_VERSION})",
                self.format_version
            )));
        }
        for field in Field::ALL {
            let column = field.column();
            let found = match field.kind() {
                ColumnKind::Numeric => self.preprocessor.numeric.iter().any(|c| c.name == column),
                ColumnKind::Categorical => self
                    .preprocessor
                    .categorical
                    .iter()
                    .any(|c| c.name == column),
            };
            if !found {
                return Err(PipelineError::MissingColumn(column.to_string()));
            }
        }
        if self.preprocessor.width() != self.forest.n_features() {
            return Err(PipelineError::Model(format!(
                "preprocessor emits {} features, forest expects {}",
                self.preprocessor.width(),
                self.forest.n_features()
            )));
        }
        self.forest.validate()
    }
}

impl Regressor for Pipeline {
    fn predict(&self, row: &FeatureRow) -> Result<f64, PipelineError> {
        let features = self.preprocessor.transform(row)?;
        self.forest.predict(&features)
    }

    fn fill_rule(&self, field: Field) -> Option<String> {
        self.preprocessor.fill_rule(field)
    }
}
