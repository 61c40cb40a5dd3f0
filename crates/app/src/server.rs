use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use infra_assist_core::{AssistError, Assistant};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub chunks: usize,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<AssistError> for ApiError {
    fn from(error: AssistError) -> Self {
        let status = if error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(%error, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// `/ask` and `/health`, plus the static UI when `static_dir` exists.
pub fn router(assistant: Arc<Assistant>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .with_state(assistant);

    if let Some(dir) = static_dir.filter(|dir| dir.is_dir()) {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
}

pub async fn serve(router: Router, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn ask(
    State(assistant): State<Arc<Assistant>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: rejection.body_text(),
    })?;

    let question = request.question.unwrap_or_default();
    let answer = assistant.ask(&question).await?;
    Ok(Json(AskResponse { answer }))
}

async fn health(State(assistant): State<Arc<Assistant>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        chunks: assistant.index().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{assistant, CannedModel};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post_ask(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ask")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let (assistant, model, _dir) = assistant(CannedModel::replying("unused")).await;
        let app = router(assistant, None);

        let (status, body) = post_ask(app.clone(), r#"{"question": ""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No question provided"}));

        let (status, body) = post_ask(app, "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No question provided"}));

        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let (assistant, _model, _dir) = assistant(CannedModel::replying("unused")).await;

        let (status, body) = post_ask(router(assistant, None), "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|error| !error.is_empty()));
    }

    #[tokio::test]
    async fn question_gets_a_clean_answer() {
        let (assistant, _model, _dir) = assistant(CannedModel::replying(
            "Thin clients connect users to virtual desktops (Source: dell.com) [doc1].",
        ))
        .await;

        let (status, body) = post_ask(
            router(assistant, None),
            r#"{"question": "What do thin clients do?"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let answer = body["answer"].as_str().unwrap();
        assert!(!answer.is_empty());
        assert!(!answer.contains("(Source:"));
        assert!(!answer.contains("[doc"));
        assert_eq!(answer, "Thin clients connect users to virtual desktops .");
    }

    #[tokio::test]
    async fn model_failure_is_a_server_error() {
        let (assistant, _model, _dir) = assistant(CannedModel::failing()).await;
        let app = router(assistant, None);

        let (status, body) = post_ask(app.clone(), r#"{"question": "anything"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("language model"));

        // the process keeps serving
        let (status, _) = post_ask(app, r#"{"question": ""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_index_size() {
        let (assistant, _model, _dir) = assistant(CannedModel::replying("unused")).await;
        let response = router(assistant, None)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"status": "ok", "chunks": 3}));
    }

    #[tokio::test]
    async fn static_files_are_served_when_present() {
        let (assistant, _model, _dir) = assistant(CannedModel::replying("unused")).await;
        let static_dir = tempfile::tempdir().unwrap();
        std::fs::write(static_dir.path().join("index.html"), "<h1>assistant</h1>").unwrap();

        let response = router(assistant, Some(static_dir.path()))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"<h1>assistant</h1>");
    }
}
