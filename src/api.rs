// 🌐 HTTP API - Axum routes for the prediction service
// Every tracked endpoint counts the request on entry and records latency on
// exit, success or failure.

use crate::attributes::{FeatureCatalog, FeatureKind};
use crate::error::{ClvError, FaultKind};
use crate::observability::ServiceMetrics;
use crate::prediction::PredictionService;
use axum::{
    extract::{rejection::FormRejection, rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

const INDEX_TEMPLATE: &str = include_str!("../web/index.html");

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub metrics: Arc<ServiceMetrics>,
}

#[derive(Serialize)]
struct PredictionsResponse {
    predictions: Vec<f64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn status_for(err: &ClvError) -> StatusCode {
    match err.fault() {
        FaultKind::Client => StatusCode::BAD_REQUEST,
        FaultKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

// ============================================================================
// HTML
// ============================================================================

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_index(result: Option<&str>) -> String {
    let catalog = FeatureCatalog::new();
    let fields: String = catalog
        .list_all()
        .iter()
        .map(|def| {
            let step = match def.kind {
                FeatureKind::Integer => "1",
                FeatureKind::Float => "any",
            };
            let placeholder = def.examples.first().map(String::as_str).unwrap_or("");
            format!(
                "    <label>{name} <small>{desc}</small>\n      \
                 <input type=\"number\" step=\"{step}\" name=\"{name}\" placeholder=\"{placeholder}\" required>\n    </label>\n",
                name = def.name,
                desc = escape_html(&def.description),
                step = step,
                placeholder = placeholder,
            )
        })
        .collect();

    INDEX_TEMPLATE
        .replace("{{fields}}", &fields)
        .replace("{{result}}", &result.map(escape_html).unwrap_or_default())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET / - Serve the form page
async fn home(State(state): State<AppState>) -> impl IntoResponse {
    let _timer = state.metrics.track("GET", "/");
    Html(render_index(None))
}

/// POST /predict-form - Single prediction rendered into the page
async fn predict_form(
    State(state): State<AppState>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> impl IntoResponse {
    let _timer = state.metrics.track("POST", "/predict-form");

    let outcome = match form {
        Ok(Form(fields)) => state.service.predict_form(&fields).map_err(|e| e.to_string()),
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable form submission");
            Err(rejection.body_text())
        }
    };

    let message = match outcome {
        Ok(value) => format!("Predicted CLV: {:.2}", value),
        Err(e) => format!("Error: {}", e),
    };
    Html(render_index(Some(&message)))
}

/// POST /predict - Batch prediction over a JSON array
///
/// Only missing features are answered with 400; an unreadable body is a 500
/// like every other failure on this path.
async fn predict_api(State(state): State<AppState>, body: Result<Json<Value>, JsonRejection>) -> Response {
    let _timer = state.metrics.track("POST", "/predict");

    let payload = match body {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            error!(error = %rejection, "Unreadable JSON body");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, rejection.body_text());
        }
    };

    match state.service.predict_batch(&payload) {
        Ok(predictions) => (StatusCode::OK, Json(PredictionsResponse { predictions })).into_response(),
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

/// GET /health - Liveness probe
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /metrics - Prometheus exposition
async fn metrics(State(state): State<AppState>) -> Response {
    let _timer = state.metrics.track("GET", "/metrics");

    match state.metrics.render() {
        Ok(text) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/predict-form", post(predict_form))
        .route("/predict", post(predict_api))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::FeatureVector;
    use crate::prediction::Regressor;
    use crate::schema::FeatureContract;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    /// log1p(unique_invoices * 10)
    struct InvoiceModel;

    impl Regressor for InvoiceModel {
        fn predict(&self, rows: &[FeatureVector]) -> crate::error::Result<Vec<f64>> {
            Ok(rows.iter().map(|r| (r[0] * 10.0).ln_1p()).collect())
        }
    }

    struct BrokenModel;

    impl Regressor for BrokenModel {
        fn predict(&self, _rows: &[FeatureVector]) -> crate::error::Result<Vec<f64>> {
            Err(ClvError::Inference("weights not loaded".to_string()))
        }
    }

    fn create_state(model: impl Regressor + 'static) -> AppState {
        AppState {
            service: PredictionService::new(Arc::new(model), FeatureContract::new()),
            metrics: Arc::new(ServiceMetrics::new().unwrap()),
        }
    }

    fn feature_payload() -> Value {
        json!([{
            "unique_invoices": 5,
            "total_quantity": 100,
            "avg_quantity_per_order": 20.0,
            "unit_price_std": 10.5,
            "customer_age_days": 365,
            "days_since_last_purchase": 30,
            "average_days_between_purchase": 45.0,
            "is_onetime_buyer": 0
        }])
    }

    fn json_request(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(create_state(InvoiceModel));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_predict_api_success() {
        let state = create_state(InvoiceModel);
        let app = router(state.clone());

        let response = app.oneshot(json_request(&feature_payload())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        let predictions = body["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 1);
        assert!((predictions[0].as_f64().unwrap() - 50.0).abs() < 1e-9);

        assert_eq!(state.metrics.request_count("POST", "/predict"), 1);
        assert_eq!(state.metrics.latency_samples("/predict"), 1);
    }

    #[tokio::test]
    async fn test_predict_api_missing_features() {
        let state = create_state(InvoiceModel);
        let app = router(state.clone());

        let mut payload = feature_payload();
        payload[0].as_object_mut().unwrap().remove("days_since_last_purchase");

        let response = app.oneshot(json_request(&payload)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "Missing required features: {days_since_last_purchase}");

        // Failures are still counted and timed
        assert_eq!(state.metrics.request_count("POST", "/predict"), 1);
        assert_eq!(state.metrics.latency_samples("/predict"), 1);
    }

    #[tokio::test]
    async fn test_predict_api_internal_fault() {
        let app = router(create_state(BrokenModel));

        let response = app.oneshot(json_request(&feature_payload())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "Inference failed: weights not loaded");
    }

    #[tokio::test]
    async fn test_predict_api_malformed_json() {
        let app = router(create_state(InvoiceModel));

        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("[{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_predict_api_non_numeric_value() {
        let state = create_state(InvoiceModel);
        let app = router(state.clone());

        let mut payload = feature_payload();
        payload[0]["unit_price_std"] = json!("high");

        let response = app.oneshot(json_request(&payload)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("unit_price_std"));
        assert_eq!(state.metrics.latency_samples("/predict"), 1);
    }

    #[tokio::test]
    async fn test_predict_api_object_instead_of_array() {
        let app = router(create_state(InvoiceModel));

        let response = app.oneshot(json_request(&json!({ "a": 1 }))).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_predict_api_empty_batch() {
        let app = router(create_state(InvoiceModel));

        let response = app.oneshot(json_request(&json!([]))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "predictions": [] }));
    }

    #[tokio::test]
    async fn test_home_page() {
        let app = router(create_state(InvoiceModel));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("<html"));
        assert!(html.contains("name=\"average_days_between_purchase\""));
    }

    #[tokio::test]
    async fn test_predict_form_success() {
        let app = router(create_state(InvoiceModel));

        let form = "unique_invoices=5&total_quantity=100&avg_quantity_per_order=20.0&unit_price_std=10.5\
                    &customer_age_days=365&days_since_last_purchase=30&average_days_between_purchase=45.0\
                    &is_onetime_buyer=0";
        let request = Request::builder()
            .method("POST")
            .uri("/predict-form")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Predicted CLV: 50.00"));
    }

    #[tokio::test]
    async fn test_predict_form_error_is_rendered() {
        let app = router(create_state(InvoiceModel));

        let request = Request::builder()
            .method("POST")
            .uri("/predict-form")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("unique_invoices=five"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Error: "));
        assert!(html.contains("unique_invoices"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = create_state(InvoiceModel);

        router(state.clone()).oneshot(json_request(&feature_payload())).await.unwrap();
        let response = router(state.clone())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("app_request_count"));
        assert!(text.contains("endpoint=\"/predict\""));
        assert!(text.contains("app_request_latency_seconds"));
    }
}
