//! Feature normalization: raw submission → typed request → pipeline row.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{FeatureRow, FeatureValue, Field, Fuel, Owner, Transmission, UnknownLabel};

/// Brand labels whose training token is only the first word of the name.
const BRAND_REMAP: &[(&str, &str)] = &[("Land Rover", "Land"), ("Ashok Leyland", "Ashok")];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("{field} must be a number, got '{value}'")]
    NotANumber { field: Field, value: String },

    #[error("{field} must be a whole number, got '{value}'")]
    NotAnInteger { field: Field, value: String },

    #[error(transparent)]
    UnknownLabel(#[from] UnknownLabel),
}

/// The nine form inputs exactly as posted. Every field may be absent or blank.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormSubmission {
    pub year: Option<String>,
    pub km_driven: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub owner: Option<String>,
    pub mileage: Option<String>,
    pub engine: Option<String>,
    pub max_power: Option<String>,
    pub brand: Option<String>,
}

/// One submission with each field independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub year: Option<i32>,
    pub km_driven: Option<f64>,
    pub fuel: Option<Fuel>,
    pub transmission: Option<Transmission>,
    /// Owner label, e.g. "First Owner". Unrecognized labels normalize to missing.
    pub owner: Option<String>,
    pub mileage: Option<f64>,
    pub engine: Option<f64>,
    pub max_power: Option<f64>,
    pub brand: Option<String>,
}

/// A row ready for the pipeline plus the fields that were left missing.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub row: FeatureRow,
    pub missing: Vec<Field>,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number(field: Field, value: Option<String>) -> Result<Option<f64>, NormalizeError> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(NormalizeError::NotANumber { field, value: raw }),
    }
}

fn parse_year(value: Option<String>) -> Result<Option<i32>, NormalizeError> {
    let Some(n) = parse_number(Field::Year, value.clone())? else {
        return Ok(None);
    };
    if n.fract() != 0.0 || n < i32::MIN as f64 || n > i32::MAX as f64 {
        return Err(NormalizeError::NotAnInteger {
            field: Field::Year,
            value: value.unwrap_or_default().trim().to_string(),
        });
    }
    Ok(Some(n as i32))
}

impl TryFrom<FormSubmission> for PredictionRequest {
    type Error = NormalizeError;

    fn try_from(form: FormSubmission) -> Result<Self, Self::Error> {
        Ok(PredictionRequest {
            year: parse_year(form.year)?,
            km_driven: parse_number(Field::KmDriven, form.km_driven)?,
            fuel: present(form.fuel).map(|s| s.parse()).transpose()?,
            transmission: present(form.transmission).map(|s| s.parse()).transpose()?,
            owner: present(form.owner),
            mileage: parse_number(Field::Mileage, form.mileage)?,
            engine: parse_number(Field::Engine, form.engine)?,
            max_power: parse_number(Field::MaxPower, form.max_power)?,
            brand: present(form.brand),
        })
    }
}

/// Rewrites a form brand to the token the training data used.
pub fn canonical_brand(brand: &str) -> &str {
    BRAND_REMAP
        .iter()
        .find(|&&(from, _)| from == brand)
        .map_or(brand, |&(_, to)| to)
}

/// Maps a request onto the pipeline's named columns.
///
/// Absent values become [`FeatureValue::Missing`] so the pipeline's own
/// imputation applies; nothing is guessed here.
pub fn normalize(request: &PredictionRequest) -> NormalizedRecord {
    let owner = request
        .owner
        .as_deref()
        .and_then(Owner::from_label)
        .map(|o| f64::from(o.ordinal()));

    let mut row = FeatureRow::new();
    for field in Field::ALL {
        let value = match field {
            Field::Year => FeatureValue::from_number(request.year.map(f64::from)),
            Field::KmDriven => FeatureValue::from_number(request.km_driven),
            Field::Owner => FeatureValue::from_number(owner),
            Field::Mileage => FeatureValue::from_number(request.mileage),
            Field::Engine => FeatureValue::from_number(request.engine),
            Field::MaxPower => FeatureValue::from_number(request.max_power),
            Field::Fuel => FeatureValue::from_text(request.fuel.map(|f| f.as_str().to_string())),
            Field::Transmission => {
                FeatureValue::from_text(request.transmission.map(|t| t.as_str().to_string()))
            }
            Field::Brand => FeatureValue::from_text(
                request
                    .brand
                    .as_deref()
                    .map(|b| canonical_brand(b).to_string()),
            ),
        };
        row.insert(field.column(), value);
    }

    let missing = Field::ALL
        .into_iter()
        .filter(|f| row.get(f.column()).is_none_or(FeatureValue::is_missing))
        .collect();

    NormalizedRecord { row, missing }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> PredictionRequest {
        PredictionRequest {
            year: Some(2016),
            km_driven: Some(55000.0),
            fuel: Some(Fuel::Diesel),
            transmission: Some(Transmission::Manual),
            owner: Some("First Owner".to_string()),
            mileage: Some(18.5),
            engine: Some(1197.0),
            max_power: Some(82.0),
            brand: Some("Land Rover".to_string()),
        }
    }

    #[test]
    fn test_full_request_has_no_missing() {
        let record = normalize(&full_request());

        assert!(record.missing.is_empty());
        assert_eq!(record.row.len(), 9);
        assert!(record.row.iter().all(|(_, v)| !v.is_missing()));
        assert_eq!(record.row.get("owner"), Some(&FeatureValue::Number(1.0)));
        assert_eq!(
            record.row.get("brand"),
            Some(&FeatureValue::Text("Land".to_string()))
        );
        assert_eq!(record.row.get("year"), Some(&FeatureValue::Number(2016.0)));
    }

    #[test]
    fn test_empty_request_is_all_missing() {
        let record = normalize(&PredictionRequest::default());

        assert_eq!(record.missing, Field::ALL.to_vec());
        assert!(record.row.iter().all(|(_, v)| v.is_missing()));
    }

    #[test]
    fn test_blank_subset_marks_exactly_those_fields() {
        let mut request = full_request();
        request.km_driven = None;
        request.transmission = None;
        request.brand = None;

        let record = normalize(&request);

        assert_eq!(
            record.missing,
            vec![Field::KmDriven, Field::Transmission, Field::Brand]
        );
        assert_eq!(record.row.get("km_driven"), Some(&FeatureValue::Missing));
        assert_eq!(record.row.get("transmission"), Some(&FeatureValue::Missing));
        assert_eq!(record.row.get("brand"), Some(&FeatureValue::Missing));
    }

    #[test]
    fn test_owner_labels_map_to_ordinals() {
        for (label, rank) in [
            ("First Owner", 1.0),
            ("Second Owner", 2.0),
            ("Third Owner", 3.0),
            ("Fourth & Above Owner", 4.0),
        ] {
            let request = PredictionRequest {
                owner: Some(label.to_string()),
                ..Default::default()
            };
            let record = normalize(&request);
            assert_eq!(record.row.get("owner"), Some(&FeatureValue::Number(rank)));
            assert!(!record.missing.contains(&Field::Owner));
        }
    }

    #[test]
    fn test_unknown_owner_is_missing() {
        let request = PredictionRequest {
            owner: Some("Test Drive Car".to_string()),
            ..Default::default()
        };
        let record = normalize(&request);

        assert_eq!(record.row.get("owner"), Some(&FeatureValue::Missing));
        assert!(record.missing.contains(&Field::Owner));
    }

    #[test]
    fn test_brand_remap() {
        assert_eq!(canonical_brand("Land Rover"), "Land");
        assert_eq!(canonical_brand("Ashok Leyland"), "Ashok");
        assert_eq!(canonical_brand("Maruti"), "Maruti");
        assert_eq!(canonical_brand("Mercedes-Benz"), "Mercedes-Benz");
        assert_eq!(canonical_brand("Land"), "Land");
    }

    #[test]
    fn test_form_blank_fields_become_none() {
        let form = FormSubmission {
            year: Some("   ".to_string()),
            km_driven: Some(String::new()),
            fuel: Some("".to_string()),
            owner: Some(" ".to_string()),
            ..Default::default()
        };
        let request = PredictionRequest::try_from(form).unwrap();

        assert_eq!(request, PredictionRequest::default());
    }

    #[test]
    fn test_form_parses_values() {
        let form = FormSubmission {
            year: Some("2016".to_string()),
            km_driven: Some("55000".to_string()),
            fuel: Some("Diesel".to_string()),
            transmission: Some("Manual".to_string()),
            owner: Some("First Owner".to_string()),
            mileage: Some("18.5".to_string()),
            engine: Some("1197".to_string()),
            max_power: Some("82".to_string()),
            brand: Some("Land Rover".to_string()),
        };
        let request = PredictionRequest::try_from(form).unwrap();

        assert_eq!(request, full_request());
    }

    #[test]
    fn test_form_rejects_garbage_numbers() {
        let form = FormSubmission {
            km_driven: Some("lots".to_string()),
            ..Default::default()
        };
        let err = PredictionRequest::try_from(form).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::NotANumber {
                field: Field::KmDriven,
                value: "lots".to_string()
            }
        );

        let form = FormSubmission {
            mileage: Some("NaN".to_string()),
            ..Default::default()
        };
        assert!(PredictionRequest::try_from(form).is_err());
    }

    #[test]
    fn test_form_rejects_fractional_year() {
        let form = FormSubmission {
            year: Some("2016.5".to_string()),
            ..Default::default()
        };
        let err = PredictionRequest::try_from(form).unwrap_err();
        assert!(matches!(err, NormalizeError::NotAnInteger { .. }));
    }

    #[test]
    fn test_form_rejects_unknown_fuel() {
        let form = FormSubmission {
            fuel: Some("CNG".to_string()),
            ..Default::default()
        };
        let err = PredictionRequest::try_from(form).unwrap_err();
        assert_eq!(err.to_string(), "unknown fuel 'CNG'");
    }
}
