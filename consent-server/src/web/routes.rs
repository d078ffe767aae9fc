//! REST API route handlers.
//!
//! Error bodies are `{"error": "..."}`. Invalid input is a 400 and never
//! reaches the probe; probe failures are a 500 and never become a verdict.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::check::{check_consent, CheckError};
use crate::probe::TargetError;
use crate::web::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CheckBody {
    url: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn check_error_response(err: CheckError) -> Response {
    match err {
        CheckError::Target(TargetError::Missing) => {
            error_response(StatusCode::BAD_REQUEST, "URL is required")
        }
        CheckError::Target(TargetError::Invalid(_)) => {
            error_response(StatusCode::BAD_REQUEST, "Invalid URL format")
        }
        CheckError::Probe(e) if e.is_launch() => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to launch browser: {e}. Please ensure Chrome or Chromium is installed."),
        ),
        CheckError::Probe(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to load website: {e}"),
        ),
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// POST /api/check-consent: probe a URL and return its verdict.
pub async fn api_check_consent(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CheckBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid request body: {}", rejection.body_text()),
            )
        }
    };

    match check_consent(state.probe.as_ref(), &state.rules, body.url.as_deref()).await {
        Ok(assessment) => Json(assessment.verdict).into_response(),
        Err(e) => check_error_response(e),
    }
}

/// GET /api/rules: active tracking match rules.
pub async fn api_rules(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.rules.clone())
}

/// GET /api/health
pub async fn api_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use consent_core::MatchRules;

    use crate::probe::fake::FakeProbe;
    use crate::probe::ProbeError;

    fn test_state(probe: FakeProbe) -> (Arc<AppState>, Arc<FakeProbe>) {
        let probe = Arc::new(probe);
        let state = Arc::new(AppState {
            probe: probe.clone(),
            rules: MatchRules::default(),
        });
        (state, probe)
    }

    async fn post_check(state: Arc<AppState>, body: &str) -> (StatusCode, Value) {
        let app = crate::web::build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/check-consent")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_check_consent_pass() {
        let (state, probe) = test_state(FakeProbe::with_urls(&[
            "https://shop.test/",
            "https://www.googletagmanager.com/gtag/js?id=G-1",
            "https://region1.google-analytics.com/g/collect?v=2&gcs=G100&gcd=13p3p3p3p5",
            "https://region1.google-analytics.com/g/collect?v=2&gcs=G111",
        ]));

        let (status, json) = post_check(state, r#"{"url":"https://shop.test"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "pass");
        assert_eq!(json["gcsValue"], "G100");
        assert_eq!(json["gcdValue"], "13p3p3p3p5");
        assert!(json["message"].is_string());
        assert!(json["details"].is_string());
        assert_eq!(probe.call_count(), 1);
    }

    #[tokio::test]
    async fn test_check_consent_fail() {
        let (state, _) = test_state(FakeProbe::with_urls(&[
            "https://stats.g.doubleclick.net/g/collect?v=2&gcs=G111",
        ]));
        let (status, json) = post_check(state, r#"{"url":"https://shop.test"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "fail");
    }

    #[tokio::test]
    async fn test_check_consent_no_tracking() {
        let (state, _) = test_state(FakeProbe::with_urls(&["https://shop.test/", "https://cdn.test/app.js"]));
        let (status, json) = post_check(state, r#"{"url":"https://shop.test"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "no_tracking");
        assert!(json.get("gcsValue").is_none());
        assert!(json.get("gcdValue").is_none());
        assert!(json["details"].as_str().unwrap().contains("Found 2 total requests"));
    }

    #[tokio::test]
    async fn test_missing_url() {
        let (state, probe) = test_state(FakeProbe::with_urls(&[]));
        let (status, json) = post_check(state.clone(), r#"{}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "URL is required");

        let (status, json) = post_check(state, r#"{"url":""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "URL is required");
        assert_eq!(probe.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let (state, probe) = test_state(FakeProbe::with_urls(&[]));
        let (status, json) = post_check(state, r#"{"url":"shop.test"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid URL format");
        assert_eq!(probe.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (state, _) = test_state(FakeProbe::with_urls(&[]));
        let (status, json) = post_check(state, "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let (state, _) = test_state(FakeProbe::failing(|| {
            ProbeError::Launch("no Chrome or Chromium executable found on PATH".into())
        }));
        let (status, json) = post_check(state, r#"{"url":"https://shop.test"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().starts_with("Failed to launch browser"));
        assert!(json.get("status").is_none());
    }

    #[tokio::test]
    async fn test_navigation_failure() {
        let (state, _) = test_state(FakeProbe::failing(|| {
            ProbeError::Navigation("net::ERR_NAME_NOT_RESOLVED at https://nope.test/".into())
        }));
        let (status, json) = post_check(state, r#"{"url":"https://nope.test"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = json["error"].as_str().unwrap();
        assert!(error.starts_with("Failed to load website"));
        assert!(error.contains("ERR_NAME_NOT_RESOLVED"));
    }

    #[tokio::test]
    async fn test_api_rules_and_health() {
        let (state, _) = test_state(FakeProbe::with_urls(&[]));

        let app = crate::web::build_router(state.clone());
        let response = app
            .oneshot(Request::builder().uri("/api/rules").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("cache-control").unwrap(),
            "no-store"
        );
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json.as_array().unwrap().len(),
            MatchRules::default().rules().len()
        );

        let app = crate::web::build_router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
