//! Server-rendered HTML for the instructions page, the form and its result block.

use std::fmt::Write;

use crate::normalize::FormSubmission;
use crate::predict::{Estimate, PredictionError};
use crate::schema::{Fuel, KNOWN_BRANDS, Owner, Transmission};

const STYLE: &str = r#"
body { font-family: Georgia, serif; margin: 0; background-color: #fafafa; }
.nav-bar { background-color: #2c3e50; padding: 15px 0; }
.nav-container { max-width: 1200px; margin: 0 auto; display: flex; justify-content: space-between; align-items: center; padding: 0 20px; }
.nav-logo { color: white; font-size: 24px; font-weight: bold; text-decoration: none; }
.nav-links { display: flex; gap: 30px; }
.nav-link { color: white; text-decoration: none; padding: 10px 20px; border-radius: 5px; }
.nav-link.active { background-color: #3498db; }
.container { max-width: 1000px; margin: 0 auto; padding: 30px 20px; }
.card { background: white; border-radius: 10px; padding: 30px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
.columns { display: flex; gap: 4%; }
.column { width: 48%; }
.field { margin-bottom: 20px; }
.field label { display: block; margin-bottom: 8px; color: #2c3e50; font-weight: bold; }
.field input, .field select { width: 100%; padding: 12px; border: 2px solid #bdc3c7; border-radius: 5px; font-size: 16px; font-family: Georgia, serif; box-sizing: border-box; }
button { width: 100%; padding: 15px 20px; font-size: 18px; color: white; background-color: #4a9d5b; border: none; border-radius: 5px; cursor: pointer; font-family: Georgia, serif; }
.result { margin-top: 30px; padding: 30px; border-radius: 10px; background: white; border: 3px solid #27ae60; }
.result h2 { text-align: center; color: #27ae60; font-size: 32px; }
.imputed { background-color: #fef9e7; padding: 20px; border-radius: 5px; border: 1px solid #f39c12; margin-top: 20px; color: #7f8c8d; }
.error { margin-top: 20px; padding: 20px; border-radius: 5px; background-color: #fdf2f2; border: 2px solid #e74c3c; text-align: center; color: #7f8c8d; }
.error h3, .warning { color: #e74c3c; font-weight: bold; }
.hint { text-align: center; color: #7f8c8d; }
"#;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Page {
    Home,
    Predict,
}

/// Escapes text for use in HTML element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats a price rounded to a whole number with thousands separators.
pub fn format_price(price: f64) -> String {
    let rounded = price.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn layout(title: &str, page: Page, body: &str) -> String {
    let active = |p: Page| if p == page { " active" } else { "" };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<div class="nav-bar"><div class="nav-container">
<a class="nav-logo" href="/">Car Price Predictor</a>
<div class="nav-links">
<a class="nav-link{home}" href="/">Instructions</a>
<a class="nav-link{predict}" href="/predict">Predict Price</a>
</div>
</div></div>
<div class="container">{body}</div>
</body>
</html>
"#,
        title = escape(title),
        home = active(Page::Home),
        predict = active(Page::Predict),
    )
}

pub fn instructions_page() -> String {
    let body = r#"<div class="card">
<h1 style="text-align:center;color:#2c3e50">Welcome to the Car Price Prediction System</h1>
<h3>How the Prediction System Works</h3>
<p>The estimate comes from a random forest trained on historical used-car listings.
It combines the car's age, usage, specification and brand to predict a sale price.</p>
<h3>Step-by-Step Instructions</h3>
<ol>
<li>Open the 'Predict Price' page using the navigation bar above</li>
<li>Fill in the car details you know</li>
<li>You can skip any field you do not know</li>
<li>Skipped fields are filled by the trained pipeline's imputation</li>
<li>Click 'Predict Price' to submit</li>
<li>The predicted price appears below the form</li>
</ol>
<h3>Missing Data Handling</h3>
<ul>
<li>Year, Kilometers, Owner, Engine, Max Power: median from training data</li>
<li>Mileage: mean from training data</li>
<li>Fuel Type, Transmission, Brand: most frequent value from training data</li>
</ul>
<h3>Important Notes</h3>
<p class="warning">The model is trained on Petrol and Diesel vehicles only.</p>
<p>Predictions are estimates based on historical market data.</p>
<p>The more details you provide, the better the prediction.</p>
<p style="text-align:center"><a class="nav-link active" href="/predict">Start Predicting Prices &rarr;</a></p>
</div>"#;
    layout("Car Price Predictor", Page::Home, body)
}

fn input(out: &mut String, label: &str, name: &str, placeholder: &str, step: &str, value: Option<&str>) {
    let _ = write!(
        out,
        r#"<div class="field"><label for="{name}">{label}</label><input id="{name}" name="{name}" type="number" step="{step}" placeholder="{placeholder}" value="{value}"></div>"#,
        label = escape(label),
        placeholder = escape(placeholder),
        value = escape(value.unwrap_or_default()),
    );
}

fn select(out: &mut String, label: &str, name: &str, options: &[&str], selected: Option<&str>) {
    let _ = write!(
        out,
        r#"<div class="field"><label for="{name}">{label}</label><select id="{name}" name="{name}"><option value="">Select or leave blank for pipeline imputation</option>"#,
        label = escape(label),
    );
    for option in options {
        let marker = if selected == Some(*option) { " selected" } else { "" };
        let option = escape(option);
        let _ = write!(out, r#"<option value="{option}"{marker}>{option}</option>"#);
    }
    out.push_str("</select></div>");
}

/// The form page. `form` re-populates the inputs; `result` renders below the button.
pub fn prediction_page(
    form: &FormSubmission,
    result: Option<&Result<Estimate, PredictionError>>,
) -> String {
    let fuels: Vec<&str> = Fuel::ALL.iter().map(|f| f.as_str()).collect();
    let transmissions: Vec<&str> = Transmission::ALL.iter().map(|t| t.as_str()).collect();
    let owners: Vec<&str> = Owner::ALL.iter().map(|o| o.label()).collect();

    let mut body = String::new();
    body.push_str(
        r#"<div class="card"><h1 style="text-align:center;color:#2c3e50">Car Price Prediction</h1>
<p class="hint">Fill in the details you know. Leave fields blank if you don't have the information.</p>
<form method="post" action="/predict"><div class="columns"><div class="column">"#,
    );
    input(&mut body, "Year of Manufacture", "year", "e.g., 2016", "1", form.year.as_deref());
    input(&mut body, "Kilometers Driven", "km_driven", "e.g., 55000", "any", form.km_driven.as_deref());
    select(&mut body, "Fuel Type", "fuel", &fuels, form.fuel.as_deref());
    select(&mut body, "Transmission", "transmission", &transmissions, form.transmission.as_deref());
    select(&mut body, "Number of Previous Owners", "owner", &owners, form.owner.as_deref());
    body.push_str(r#"</div><div class="column">"#);
    input(&mut body, "Mileage (kmpl)", "mileage", "e.g., 18.5", "any", form.mileage.as_deref());
    input(&mut body, "Engine Displacement (CC)", "engine", "e.g., 1197", "any", form.engine.as_deref());
    input(&mut body, "Max Power (bhp)", "max_power", "e.g., 82", "any", form.max_power.as_deref());
    select(&mut body, "Brand", "brand", &KNOWN_BRANDS, form.brand.as_deref());
    body.push_str(r#"</div></div><button type="submit">Predict Price</button></form>"#);

    match result {
        Some(result) => body.push_str(&result_block(result)),
        None => body.push_str(
            r#"<p class="hint" style="margin-top:30px">Fill in the form above and click 'Predict Price' to get your estimate.</p>"#,
        ),
    }
    body.push_str("</div>");

    layout("Car Price Prediction", Page::Predict, &body)
}

/// Renders a successful estimate (with imputation disclosure) or a failure.
pub fn result_block(result: &Result<Estimate, PredictionError>) -> String {
    let mut out = String::new();
    match result {
        Ok(estimate) => {
            let _ = write!(
                out,
                r#"<div class="result"><h2>Estimated Price: {}</h2>"#,
                format_price(estimate.price)
            );
            if !estimate.imputed.is_empty() {
                out.push_str(
                    r#"<div class="imputed"><h4 style="color:#f39c12">Note: Missing Information Handled by Pipeline</h4>
<p>The following fields were automatically filled using the trained pipeline's imputation strategy:</p><ul>"#,
                );
                for field in &estimate.imputed {
                    let _ = write!(out, "<li>{}</li>", escape(&field.describe()));
                }
                out.push_str("</ul></div>");
            }
            out.push_str(
                r#"<hr style="margin:30px 0"><p class="warning" style="text-align:center">Model trained on Petrol &amp; Diesel vehicles only.</p></div>"#,
            );
        }
        Err(e) => {
            let _ = write!(
                out,
                r#"<div class="error"><h3>Prediction Failed</h3><p>Error: {}</p><p>Please check your input data and try again.</p></div>"#,
                escape(&e.to_string())
            );
        }
    }
    out
}
