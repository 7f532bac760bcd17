//! Historical car listings: CSV parsing and cleaning for training.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::{debug, info};

use crate::normalize::PredictionRequest;
use crate::schema::{Fuel, Transmission};

const EXCLUDED_FUELS: [&str; 2] = ["CNG", "LPG"];
const EXCLUDED_OWNER: &str = "Test Drive Car";

/// One CSV row as found in the listings file. Unused columns
/// (`seller_type`, `torque`, `seats`) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListing {
    pub name: Option<String>,
    pub year: Option<String>,
    pub selling_price: Option<String>,
    pub km_driven: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub owner: Option<String>,
    pub mileage: Option<String>,
    pub engine: Option<String>,
    pub max_power: Option<String>,
}

/// A cleaned listing: model inputs plus the observed sale price.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub features: PredictionRequest,
    pub selling_price: f64,
}

/// Why a raw row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ExcludedFuel,
    TestDriveCar,
    UnsupportedFuel,
    BadPrice,
}

/// Row counts produced by [`read_listings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub total: usize,
    pub kept: usize,
    pub excluded_fuel: usize,
    pub test_drive_car: usize,
    pub unsupported_fuel: usize,
    pub bad_price: usize,
}

impl CleaningReport {
    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::ExcludedFuel => self.excluded_fuel += 1,
            Rejection::TestDriveCar => self.test_drive_car += 1,
            Rejection::UnsupportedFuel => self.unsupported_fuel += 1,
            Rejection::BadPrice => self.bad_price += 1,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Parses a number that may carry a unit suffix, e.g. "23.4 kmpl" or "1248 CC".
/// Returns `None` for blanks and anything that is not a finite number.
pub fn parse_suffixed(value: Option<&str>, suffixes: &[&str]) -> Option<f64> {
    let mut s = value?.trim();
    for suffix in suffixes {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.trim_end();
            break;
        }
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Brand token: the first word of the full model name.
pub fn brand_token(name: &str) -> Option<&str> {
    name.split_whitespace().next()
}

impl RawListing {
    /// Applies the cleaning rules and converts the row to a [`Listing`].
    pub fn clean(&self) -> Result<Listing, Rejection> {
        let fuel = non_blank(&self.fuel);
        if fuel.is_some_and(|f| EXCLUDED_FUELS.contains(&f)) {
            return Err(Rejection::ExcludedFuel);
        }
        let owner = non_blank(&self.owner);
        if owner == Some(EXCLUDED_OWNER) {
            return Err(Rejection::TestDriveCar);
        }

        let fuel = match fuel {
            Some(f) => Some(f.parse::<Fuel>().map_err(|_| Rejection::UnsupportedFuel)?),
            None => None,
        };

        let selling_price = parse_suffixed(non_blank(&self.selling_price), &[])
            .filter(|p| *p > 0.0)
            .ok_or(Rejection::BadPrice)?;

        let year = parse_suffixed(non_blank(&self.year), &[])
            .filter(|y| y.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(y))
            .map(|y| y as i32);

        Ok(Listing {
            features: PredictionRequest {
                year,
                km_driven: parse_suffixed(non_blank(&self.km_driven), &[]),
                fuel,
                transmission: non_blank(&self.transmission).and_then(|t| t.parse::<Transmission>().ok()),
                owner: owner.map(str::to_string),
                mileage: parse_suffixed(non_blank(&self.mileage), &[" kmpl", " km/kg"]),
                engine: parse_suffixed(non_blank(&self.engine), &[" CC"]),
                max_power: parse_suffixed(non_blank(&self.max_power), &[" bhp"]),
                brand: non_blank(&self.name)
                    .and_then(brand_token)
                    .map(str::to_string),
            },
            selling_price,
        })
    }
}

/// Reads and cleans every listing from a CSV source.
pub fn read_listings<R: Read>(reader: R) -> Result<(Vec<Listing>, CleaningReport)> {
    let mut csv = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let mut listings = Vec::new();
    let mut report = CleaningReport::default();

    for (line, record) in csv.deserialize::<RawListing>().enumerate() {
        let raw = record.with_context(|| format!("malformed CSV record {}", line + 1))?;
        report.total += 1;
        match raw.clean() {
            Ok(listing) => listings.push(listing),
            Err(rejection) => {
                debug!(row = line + 1, ?rejection, "Listing dropped");
                report.record(rejection);
            }
        }
    }
    report.kept = listings.len();

    info!(
        total = report.total,
        kept = report.kept,
        excluded_fuel = report.excluded_fuel,
        test_drive_car = report.test_drive_car,
        unsupported_fuel = report.unsupported_fuel,
        bad_price = report.bad_price,
        "Listings cleaned"
    );

    Ok((listings, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
name,year,selling_price,km_driven,fuel,seller_type,transmission,owner,mileage,engine,max_power,torque,seats
Maruti Swift Dzire VDI,2014,450000,145500,Diesel,Individual,Manual,First Owner,23.4 kmpl,1248 CC,74 bhp,190Nm@ 2000rpm,5
Land Rover Discovery Sport TD4 HSE,2017,4500000,30000,Diesel,Dealer,Automatic,First Owner,12.51 kmpl,2179 CC,147.51 bhp,320Nm@ 2000rpm,7
Maruti Wagon R LXI CNG,2017,330000,40000,CNG,Individual,Manual,First Owner,33.54 km/kg,998 CC,67.04 bhp,90Nm@ 3500rpm,5
Hyundai i20 Asta,2019,900000,5000,Petrol,Dealer,Manual,Test Drive Car,18.6 kmpl,1197 CC,81.86 bhp,114.7Nm@ 4000rpm,5
Tata Indica Vista,2010,130000,120000,Petrol,Individual,Manual,Second Owner,,,,,
Honda City,2012,,70000,Petrol,Individual,Manual,Second Owner,17.8 kmpl,1497 CC,117.3 bhp,145Nm@ 4600rpm,5
";

    #[test]
    fn test_parse_suffixed() {
        assert_eq!(parse_suffixed(Some("23.4 kmpl"), &[" kmpl", " km/kg"]), Some(23.4));
        assert_eq!(parse_suffixed(Some("33.54 km/kg"), &[" kmpl", " km/kg"]), Some(33.54));
        assert_eq!(parse_suffixed(Some("1248 CC"), &[" CC"]), Some(1248.0));
        assert_eq!(parse_suffixed(Some(" bhp"), &[" bhp"]), None);
        assert_eq!(parse_suffixed(Some("abc"), &[]), None);
        assert_eq!(parse_suffixed(None, &[" CC"]), None);
    }

    #[test]
    fn test_brand_token() {
        assert_eq!(brand_token("Land Rover Discovery"), Some("Land"));
        assert_eq!(brand_token("Ashok Leyland Stile"), Some("Ashok"));
        assert_eq!(brand_token("   "), None);
    }

    #[test]
    fn test_read_listings_applies_cleaning_rules() {
        let (listings, report) = read_listings(SAMPLE.as_bytes()).unwrap();

        assert_eq!(report.total, 6);
        assert_eq!(report.kept, 3);
        assert_eq!(report.excluded_fuel, 1);
        assert_eq!(report.test_drive_car, 1);
        assert_eq!(report.bad_price, 1);
        assert_eq!(listings.len(), 3);

        let swift = &listings[0];
        assert_eq!(swift.selling_price, 450000.0);
        assert_eq!(swift.features.year, Some(2014));
        assert_eq!(swift.features.fuel, Some(Fuel::Diesel));
        assert_eq!(swift.features.mileage, Some(23.4));
        assert_eq!(swift.features.engine, Some(1248.0));
        assert_eq!(swift.features.max_power, Some(74.0));
        assert_eq!(swift.features.brand.as_deref(), Some("Maruti"));

        let land = &listings[1];
        assert_eq!(land.features.brand.as_deref(), Some("Land"));
        assert_eq!(land.features.transmission, Some(Transmission::Automatic));
    }

    #[test]
    fn test_blank_specs_become_missing() {
        let (listings, _) = read_listings(SAMPLE.as_bytes()).unwrap();
        let tata = &listings[2];

        assert_eq!(tata.features.mileage, None);
        assert_eq!(tata.features.engine, None);
        assert_eq!(tata.features.max_power, None);
        assert_eq!(tata.features.owner.as_deref(), Some("Second Owner"));
    }

    #[test]
    fn test_out_of_range_year_becomes_missing() {
        let raw = RawListing {
            year: Some("1e12".into()),
            selling_price: Some("100000".into()),
            ..Default::default()
        };
        assert_eq!(raw.clean().unwrap().features.year, None);

        let raw = RawListing {
            year: Some("2014".into()),
            selling_price: Some("100000".into()),
            ..Default::default()
        };
        assert_eq!(raw.clean().unwrap().features.year, Some(2014));
    }

    #[test]
    fn test_unsupported_fuel_is_rejected() {
        let raw = RawListing {
            fuel: Some("Electric".into()),
            selling_price: Some("100".into()),
            ..Default::default()
        };
        assert_eq!(raw.clean(), Err(Rejection::UnsupportedFuel));
    }
}
