//! HTTP surface: instructions page, prediction form, and a JSON endpoint.

pub mod pages;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;

use crate::normalize::{FormSubmission, PredictionRequest};
use crate::predict::PredictionService;

#[derive(Clone)]
pub struct AppState {
    service: PredictionService,
}

pub fn router(service: PredictionService) -> Router {
    Router::new()
        .route("/", get(instructions))
        .route("/predict", get(prediction_form).post(submit))
        .route("/api/predict", post(api_predict))
        .with_state(AppState { service })
}

async fn instructions() -> Html<String> {
    Html(pages::instructions_page())
}

async fn prediction_form() -> Html<String> {
    Html(pages::prediction_page(&FormSubmission::default(), None))
}

async fn submit(State(state): State<AppState>, Form(form): Form<FormSubmission>) -> Html<String> {
    let result = state.service.estimate_submission(form.clone());
    Html(pages::prediction_page(&form, Some(&result)))
}

async fn api_predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Rejected prediction payload");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match state.service.estimate(&request) {
        Ok(estimate) => Json(estimate).into_response(),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
