//! Feature schema shared by the normalizer, the pipeline and the trainer.
//!
//! The pipeline artifact is fitted against exactly these nine columns. Any
//! row handed to it must carry every column with the declared [`ColumnKind`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Whether a column is fed to the numeric or the categorical branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// One of the nine user-facing inputs, named after the column it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Year,
    KmDriven,
    Owner,
    Mileage,
    Engine,
    MaxPower,
    Fuel,
    Transmission,
    Brand,
}

impl Field {
    /// All fields in schema order: numeric columns first, then categorical.
    pub const ALL: [Field; 9] = [
        Field::Year,
        Field::KmDriven,
        Field::Owner,
        Field::Mileage,
        Field::Engine,
        Field::MaxPower,
        Field::Fuel,
        Field::Transmission,
        Field::Brand,
    ];

    /// Column name in the pipeline contract.
    pub fn column(self) -> &'static str {
        match self {
            Field::Year => "year",
            Field::KmDriven => "km_driven",
            Field::Owner => "owner",
            Field::Mileage => "mileage",
            Field::Engine => "engine",
            Field::MaxPower => "max_power",
            Field::Fuel => "fuel",
            Field::Transmission => "transmission",
            Field::Brand => "brand",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Field::Fuel | Field::Transmission | Field::Brand => ColumnKind::Categorical,
            _ => ColumnKind::Numeric,
        }
    }

    /// Short human label used in the result disclosure.
    pub fn label(self) -> &'static str {
        match self {
            Field::Year => "Year",
            Field::KmDriven => "Kilometers",
            Field::Owner => "Owner",
            Field::Mileage => "Mileage",
            Field::Engine => "Engine",
            Field::MaxPower => "Max Power",
            Field::Fuel => "Fuel Type",
            Field::Transmission => "Transmission",
            Field::Brand => "Brand",
        }
    }

    pub fn from_column(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.column() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Error returned when a label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Fuel {
    Petrol,
    Diesel,
}

impl Fuel {
    pub const ALL: [Fuel; 2] = [Fuel::Petrol, Fuel::Diesel];

    pub fn as_str(self) -> &'static str {
        match self {
            Fuel::Petrol => "Petrol",
            Fuel::Diesel => "Diesel",
        }
    }
}

impl FromStr for Fuel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fuel::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLabel {
                kind: "fuel",
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for Fuel {
    type Error = UnknownLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Transmission {
    Manual,
    Automatic,
}

impl Transmission {
    pub const ALL: [Transmission; 2] = [Transmission::Manual, Transmission::Automatic];

    pub fn as_str(self) -> &'static str {
        match self {
            Transmission::Manual => "Manual",
            Transmission::Automatic => "Automatic",
        }
    }
}

impl FromStr for Transmission {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Transmission::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLabel {
                kind: "transmission",
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for Transmission {
    type Error = UnknownLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Number of previous owners, as labelled in the listings dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    #[serde(rename = "First Owner")]
    First,
    #[serde(rename = "Second Owner")]
    Second,
    #[serde(rename = "Third Owner")]
    Third,
    #[serde(rename = "Fourth & Above Owner")]
    FourthAndAbove,
}

impl Owner {
    pub const ALL: [Owner; 4] = [
        Owner::First,
        Owner::Second,
        Owner::Third,
        Owner::FourthAndAbove,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Owner::First => "First Owner",
            Owner::Second => "Second Owner",
            Owner::Third => "Third Owner",
            Owner::FourthAndAbove => "Fourth & Above Owner",
        }
    }

    /// Parses a dataset/form label. Unrecognized labels yield `None`.
    pub fn from_label(label: &str) -> Option<Owner> {
        let label = label.trim();
        Owner::ALL.into_iter().find(|o| o.label() == label)
    }

    /// Ordinal rank 1–4.
    pub fn ordinal(self) -> u8 {
        match self {
            Owner::First => 1,
            Owner::Second => 2,
            Owner::Third => 3,
            Owner::FourthAndAbove => 4,
        }
    }
}

/// Brands offered by the form. Any other brand string is still accepted.
pub const KNOWN_BRANDS: [&str; 27] = [
    "Maruti",
    "Hyundai",
    "Honda",
    "Toyota",
    "Skoda",
    "BMW",
    "Audi",
    "Mercedes-Benz",
    "Ford",
    "Volkswagen",
    "Mahindra",
    "Tata",
    "Renault",
    "Chevrolet",
    "Nissan",
    "Kia",
    "Jeep",
    "Land Rover",
    "Ashok Leyland",
    "Datsun",
    "Fiat",
    "Jaguar",
    "Mini",
    "Mitsubishi",
    "Porsche",
    "Volvo",
    "Others",
];

/// A single cell of a feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
    /// Explicit absence; the pipeline imputes it.
    Missing,
}

impl FeatureValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }

    pub fn from_number(value: Option<f64>) -> Self {
        value.map_or(FeatureValue::Missing, FeatureValue::Number)
    }

    pub fn from_text(value: Option<String>) -> Self {
        value.map_or(FeatureValue::Missing, FeatureValue::Text)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(n) => write!(f, "{n}"),
            FeatureValue::Text(s) => write!(f, "{s:?}"),
            FeatureValue::Missing => f.write_str("<missing>"),
        }
    }
}

/// One row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    columns: BTreeMap<String, FeatureValue>,
}

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: FeatureValue) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: FeatureValue) {
        self.columns.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.columns.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<FeatureValue> {
        self.columns.remove(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }
}
