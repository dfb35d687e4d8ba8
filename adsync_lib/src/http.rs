//! HTTP boundary for dashboards and schedulers: status, manual trigger, and
//! a middleware that piggy-backs due syncs on ordinary requests.

use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::SyncError;
use crate::loader::ReportSource;
use crate::orchestrator::{SyncOrchestrator, TriggerOutcome};

/// Routes under `/sync`.
pub fn router<S: ReportSource>(orchestrator: SyncOrchestrator<S>) -> Router {
    Router::new()
        .route("/sync/status", get(sync_status::<S>))
        .route("/sync/trigger", post(sync_trigger::<S>))
        .with_state(orchestrator)
}

/// Wraps `app` so every request first calls `trigger_if_due`.
pub fn with_opportunistic_sync<S: ReportSource>(
    app: Router,
    orchestrator: SyncOrchestrator<S>,
) -> Router {
    app.layer(axum::middleware::from_fn_with_state(
        orchestrator,
        opportunistic_sync::<S>,
    ))
}

pub async fn opportunistic_sync<S: ReportSource>(
    State(orchestrator): State<SyncOrchestrator<S>>,
    request: Request,
    next: Next,
) -> Response {
    match orchestrator.trigger_if_due() {
        Ok(TriggerOutcome::Started) => tracing::debug!("request started a due sync"),
        Ok(_) => {}
        Err(e) => tracing::warn!("due check failed: {}", e),
    }
    next.run(request).await
}

async fn sync_status<S: ReportSource>(
    State(orchestrator): State<SyncOrchestrator<S>>,
) -> Response {
    match orchestrator.status() {
        Ok(status) => Json(status).into_response(),
        Err(e) => sync_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct TriggerParams {
    force: Option<bool>,
}

async fn sync_trigger<S: ReportSource>(
    State(orchestrator): State<SyncOrchestrator<S>>,
    Query(params): Query<TriggerParams>,
) -> Response {
    match orchestrator.trigger(params.force.unwrap_or(true)) {
        Ok(outcome) => {
            let status = match outcome {
                TriggerOutcome::Started => StatusCode::ACCEPTED,
                TriggerOutcome::AlreadyRunning | TriggerOutcome::NotDue => StatusCode::OK,
            };
            (status, Json(json!({ "result": outcome }))).into_response()
        }
        Err(e) => sync_error_response(e),
    }
}

fn sync_error_response(err: SyncError) -> Response {
    tracing::error!("sync endpoint failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "sync_error",
            "message": err.to_string(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use adreports_api::ReportDefinition;
    use async_trait::async_trait;
    use axum::body::Body;
    use chrono::{NaiveDate, TimeZone, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::clock::FixedClock;
    use crate::db::Db;
    use crate::orchestrator::SyncSettings;
    use crate::records::GoalColumns;
    use crate::status::{SqliteStatusStore, SyncState, SyncStatusStore, SyncStatusUpdate};
    use crate::window::Lookback;

    struct EmptySource;

    #[async_trait]
    impl ReportSource for EmptySource {
        async fn fetch_report(
            &self,
            _definition: &ReportDefinition,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<String, adreports_api::Error> {
            Ok("Date\tCampaignId\n".to_string())
        }
    }

    fn orchestrator() -> (SyncOrchestrator<EmptySource>, Arc<SqliteStatusStore>) {
        let db = Db::open_in_memory().unwrap();
        db.init().unwrap();
        let db = Arc::new(Mutex::new(db));
        let store = Arc::new(SqliteStatusStore::new(Arc::clone(&db)));
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
        ));
        let settings = SyncSettings {
            interval: chrono::Duration::hours(12),
            lookback: Lookback::default(),
            goals: GoalColumns::new(1, None, "LC"),
            datasets: crate::dataset::load_datasets().unwrap(),
        };
        let orchestrator = SyncOrchestrator::new(EmptySource, db, store.clone(), clock, settings);
        (orchestrator, store)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_returns_row() {
        let (orchestrator, _) = orchestrator();
        let response = router(orchestrator)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/sync/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["lastStatus"], "never");
        assert_eq!(body["inProgress"], false);
    }

    #[tokio::test]
    async fn trigger_forces_by_default() {
        let (orchestrator, store) = orchestrator();
        store
            .write(&SyncStatusUpdate::completed(
                Utc.with_ymd_and_hms(2024, 6, 15, 11, 0, 0).unwrap(),
                3,
            ))
            .unwrap();

        let response = router(orchestrator.clone())
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/sync/trigger")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["result"], "started");

        let outcome = orchestrator.join_in_flight().await.unwrap();
        assert!(outcome.success);
        assert_eq!(store.read().unwrap().last_status, SyncState::Completed);
    }

    #[tokio::test]
    async fn unforced_trigger_respects_interval() {
        let (orchestrator, store) = orchestrator();
        store
            .write(&SyncStatusUpdate::completed(
                Utc.with_ymd_and_hms(2024, 6, 15, 11, 0, 0).unwrap(),
                3,
            ))
            .unwrap();

        let response = router(orchestrator)
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/sync/trigger?force=false")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["result"], "not_due");
    }

    #[tokio::test]
    async fn trigger_reports_persisted_run() {
        let (orchestrator, store) = orchestrator();
        assert!(store
            .try_begin(Utc.with_ymd_and_hms(2024, 6, 15, 11, 0, 0).unwrap())
            .unwrap());

        let response = router(orchestrator)
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/sync/trigger")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["result"], "already_running");
    }

    #[tokio::test]
    async fn middleware_starts_due_sync_and_passes_through() {
        let (orchestrator, store) = orchestrator();
        let app = with_opportunistic_sync(
            Router::new().route("/dashboard", get(|| async { "ok" })),
            orchestrator.clone(),
        );

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/dashboard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let outcome = orchestrator.join_in_flight().await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.datasets.len(), 3);
        assert_eq!(store.read().unwrap().last_status, SyncState::Completed);
    }
}
