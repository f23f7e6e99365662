//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::job::JobRequest;
use crate::service::RestyleService;
use crate::status::JobStatus;
use crate::version::VersionInfo;

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub version: VersionInfo,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn health_check(State(service): State<Arc<RestyleService>>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "OK",
        version: service.version().clone(),
    })
}

async fn generate(
    State(service): State<Arc<RestyleService>>,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, JobError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected generate body");
        JobError::Validation(rejection.body_text())
    })?;

    match service.submit(request).await {
        Ok(image) => Ok(Json(GenerateResponse {
            success: true,
            image,
        })),
        Err(e) => {
            if e.is_client_error() {
                tracing::debug!(error = %e, "Generate request rejected");
            } else {
                tracing::error!(error = %e, "Generate request failed");
            }
            Err(e)
        }
    }
}

async fn status(
    State(service): State<Arc<RestyleService>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<JobStatus>, JobError> {
    service.status(query.id.as_deref()).map(Json)
}

pub fn routes(service: Arc<RestyleService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/generate", post(generate))
        .route("/status", get(status))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::JobOrchestrator;
    use crate::poller::{PollConfig, ResultPoller};
    use crate::store::MemorySessionStore;
    use crate::testing::{
        FakeNormalizer, FakeObjectStore, FakePredictor, RecordingSleeper, pending, succeeded,
    };
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    async fn response_json(response: Response) -> serde_json::Value {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_service(predictor: FakePredictor) -> Arc<RestyleService> {
        let orchestrator = JobOrchestrator::new(
            Arc::new(predictor),
            Arc::new(FakeNormalizer::default()),
            Arc::new(FakeObjectStore::default()),
            Arc::new(MemorySessionStore::new()),
        )
        .with_poller(ResultPoller::with_sleeper(
            PollConfig::default(),
            Arc::new(RecordingSleeper::default()),
        ));
        Arc::new(RestyleService::new(orchestrator))
    }

    fn generate_request(body: serde_json::Value) -> Request<Body> {
        Request::post("/generate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn status_request(query: &str) -> Request<Body> {
        Request::get(format!("/status{query}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_returns_ok_and_version() {
        let app = routes(create_service(FakePredictor::new("tok1", vec![])));

        let response = app
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "OK");
        assert!(json["version"]["restyle"].is_string());
    }

    #[tokio::test]
    async fn generate_then_status_for_job1() {
        let service = create_service(FakePredictor::new(
            "tok1",
            vec![pending(), succeeded(json!(["http://x/final.png"]))],
        ));
        let app = routes(service);

        let response = app
            .clone()
            .oneshot(generate_request(json!({
                "id": "job1",
                "prompt": "make it sunset",
                "image": "aGVsbG8="
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        insta::assert_json_snapshot!(json, @r#"
        {
          "image": "http://x/final.png",
          "success": true
        }
        "#);

        let response = app.oneshot(status_request("?id=job1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        insta::assert_json_snapshot!(json, @r#"
        {
          "image": "http://x/final.png",
          "received": true
        }
        "#);
    }

    #[tokio::test]
    async fn status_unknown_identifier_is_not_received() {
        let app = routes(create_service(FakePredictor::new("tok1", vec![])));

        let response = app.oneshot(status_request("?id=unknown-xyz")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await, json!({"received": false}));
    }

    #[tokio::test]
    async fn status_without_id_is_bad_request() {
        let service = create_service(FakePredictor::new("tok1", vec![]));

        for query in ["", "?id="] {
            let response = routes(service.clone())
                .oneshot(status_request(query))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = response_json(response).await;
            assert_eq!(json["success"], false);
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn generate_missing_prompt_is_bad_request() {
        let app = routes(create_service(FakePredictor::new("tok1", vec![])));

        let response = app
            .oneshot(generate_request(json!({"id": "job1", "image": "aGVsbG8="})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        insta::assert_json_snapshot!(response_json(response).await, @r#"
        {
          "error": "A prompt is required",
          "success": false
        }
        "#);
    }

    #[tokio::test]
    async fn generate_malformed_body_is_bad_request() {
        let app = routes(create_service(FakePredictor::new("tok1", vec![])));

        let response = app
            .oneshot(
                Request::post("/generate")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn generate_prediction_failure_is_server_error() {
        let service = create_service(FakePredictor::new(
            "tok1",
            vec![json!({"status": "failed", "error": "NSFW content detected"})],
        ));
        let app = routes(service);

        let response = app
            .clone()
            .oneshot(generate_request(json!({
                "id": "job1",
                "prompt": "make it sunset",
                "image": "aGVsbG8="
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        insta::assert_json_snapshot!(response_json(response).await, @r#"
        {
          "error": "Prediction failed: NSFW content detected",
          "success": false
        }
        "#);

        let response = app.oneshot(status_request("?id=job1")).await.unwrap();
        assert_eq!(response_json(response).await, json!({"received": false}));
    }

    #[tokio::test]
    async fn generate_submission_rejection_is_server_error() {
        let app = routes(create_service(FakePredictor::rejecting(
            422,
            r#"{"detail":"bad version"}"#,
        )));

        let response = app
            .oneshot(generate_request(json!({
                "id": "job1",
                "prompt": "make it sunset",
                "image": "aGVsbG8="
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("bad version"));
    }
}
