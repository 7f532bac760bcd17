//! Prediction service: one normalized row in, one linear-scale price out.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::normalize::{
    FormSubmission, NormalizeError, NormalizedRecord, PredictionRequest, normalize,
};
use crate::pipeline::{PipelineError, Regressor};
use crate::schema::Field;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("invalid input: {0}")]
    Input(#[from] NormalizeError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("model returned a non-finite log price ({0})")]
    NonFiniteOutput(f64),
}

/// A missing field together with the rule the model used to fill it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputedField {
    pub field: Field,
    pub rule: String,
}

impl ImputedField {
    /// "Year → Median from training data"
    pub fn describe(&self) -> String {
        format!("{} → {}", self.field.label(), self.rule)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub price: f64,
    pub log_price: f64,
    pub imputed: Vec<ImputedField>,
}

impl Estimate {
    pub fn missing_fields(&self) -> Vec<Field> {
        self.imputed.iter().map(|i| i.field).collect()
    }
}

/// Wraps the process-wide model. Cheap to clone; every clone shares the model.
#[derive(Clone)]
pub struct PredictionService {
    model: Arc<dyn Regressor>,
}

impl PredictionService {
    pub fn new(model: Arc<dyn Regressor>) -> Self {
        Self { model }
    }

    /// Runs the model on one normalized record and recovers the linear price.
    pub fn predict(&self, record: &NormalizedRecord) -> Result<Estimate, PredictionError> {
        debug!(
            row = ?record.row,
            missing = ?record.missing,
            "Predicting"
        );

        let log_price = self.model.predict(&record.row)?;
        let price = log_price.exp();
        if !log_price.is_finite() || !price.is_finite() {
            return Err(PredictionError::NonFiniteOutput(log_price));
        }

        let imputed = record
            .missing
            .iter()
            .map(|&field| ImputedField {
                field,
                rule: self
                    .model
                    .fill_rule(field)
                    .unwrap_or_else(|| "pipeline default".to_string()),
            })
            .collect();

        debug!(log_price, price, "Prediction complete");
        Ok(Estimate {
            price,
            log_price,
            imputed,
        })
    }

    /// Normalizes `request` and predicts. Failures are logged, never panics.
    pub fn estimate(&self, request: &PredictionRequest) -> Result<Estimate, PredictionError> {
        let record = normalize(request);
        self.predict(&record).inspect_err(|e| {
            error!(error = %e, "Prediction failed");
        })
    }

    /// Validates a raw form submission, then normalizes and predicts.
    pub fn estimate_submission(&self, form: FormSubmission) -> Result<Estimate, PredictionError> {
        match PredictionRequest::try_from(form) {
            Ok(request) => self.estimate(&request),
            Err(e) => {
                error!(error = %e, "Submission rejected");
                Err(e.into())
            }
        }
    }
}
