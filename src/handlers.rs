use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::{Pipeline, RunReport, RunStatus};

/// Last known run state. Coarse on purpose: no per-lead detail leaves the
/// process through the HTTP surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    pub status: RunStatus,
    pub summary: String,
    pub run_id: Option<Uuid>,
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cancel: Option<CancellationToken>,
}

impl RunState {
    fn record(&mut self, report: &RunReport) {
        self.status = report.status;
        self.summary = report.summary.clone();
        self.run_id = Some(report.run_id);
        self.last_run_at = Some(report.finished_at);
        self.cancel = None;
    }

    /// The run task died before producing a report.
    fn record_aborted(&mut self, summary: String) {
        self.status = RunStatus::Failed;
        self.summary = summary;
        self.last_run_at = Some(Utc::now());
        self.cancel = None;
    }
}

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub run: Arc<RwLock<RunState>>,
    /// Parent of every run's token; cancelling it stops the active run.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            run: Arc::new(RwLock::new(RunState::default())),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Starts a background run unless one is already active.
///
/// Both the HTTP trigger and the scheduler go through here. The returned
/// handle finishes once the run state has been updated, including when the
/// run task panics.
pub async fn start_run(state: &Arc<AppState>, trigger: &str) -> Result<JoinHandle<()>, AppError> {
    let cancel = state.shutdown.child_token();
    {
        // Check-and-set under one write lock so two triggers cannot both start
        let mut run = state.run.write().await;
        if run.status == RunStatus::Running {
            tracing::warn!("⚠ Run trigger ({}) rejected: a run is already active", trigger);
            return Err(AppError::Conflict("a pipeline run is already active".to_string()));
        }
        run.status = RunStatus::Running;
        run.summary = "run started".to_string();
        run.cancel = Some(cancel.clone());
    }

    tracing::info!("=== Pipeline run triggered by {} ===", trigger);
    let pipeline = state.pipeline.clone();
    let task_state = state.clone();
    Ok(tokio::spawn(async move {
        let run = tokio::spawn(async move { pipeline.run(&cancel).await });
        match run.await {
            Ok(report) => task_state.run.write().await.record(&report),
            Err(e) => {
                tracing::error!("❌ Pipeline run task aborted: {}", e);
                task_state
                    .run
                    .write()
                    .await
                    .record_aborted(format!("run aborted: {}", e));
            }
        }
    }))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "steel-lead-pipeline",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/pipeline/run
///
/// Starts a run in the background. Returns 409 while another run is active.
pub async fn trigger_run(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    start_run(&state, "http").await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": RunStatus::Running })),
    ))
}

/// POST /api/v1/pipeline/cancel
///
/// Asks the active run to stop at the next stage boundary.
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let run = state.run.read().await;
    match (&run.status, &run.cancel) {
        (RunStatus::Running, Some(cancel)) => {
            cancel.cancel();
            tracing::info!("Cancellation requested for the active run");
            Ok(Json(json!({ "cancelling": true })))
        }
        _ => Err(AppError::Conflict("no active pipeline run".to_string())),
    }
}

/// GET /api/v1/pipeline/status
pub async fn run_status(State(state): State<Arc<AppState>>) -> Json<RunState> {
    Json(state.run.read().await.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::contacts::DirectoryLookup;
    use crate::dispatcher::{Dispatcher, TeamRecipients};
    use crate::enrichment::Enricher;
    use crate::ingest::CandidateSource;
    use crate::models::RawCandidate;
    use crate::notifier::LogNotifier;
    use crate::retry::RetryPolicy;
    use crate::scoring::PriorityWeights;
    use crate::steel::SteelEstimator;
    use crate::validator::ValidatorSettings;

    struct PanickingSource;

    #[async_trait::async_trait]
    impl CandidateSource for PanickingSource {
        fn name(&self) -> String {
            "panicking".to_string()
        }

        async fn fetch(&self) -> Result<Vec<RawCandidate>, AppError> {
            panic!("feed parser bug")
        }
    }

    fn state() -> Arc<AppState> {
        state_with(Vec::new())
    }

    fn state_with(sources: Vec<Arc<dyn CandidateSource>>) -> Arc<AppState> {
        let retry = RetryPolicy::default();
        let pipeline = Pipeline::new(
            sources,
            ValidatorSettings::default(),
            Enricher::new(
                Classifier::default(),
                SteelEstimator::default(),
                Arc::new(DirectoryLookup::empty()),
                retry,
            ),
            PriorityWeights::default(),
            7,
            Dispatcher::new(Arc::new(LogNotifier), TeamRecipients::new(), retry),
            retry,
        );
        Arc::new(AppState::new(pipeline))
    }

    #[tokio::test]
    async fn test_second_trigger_conflicts_while_running() {
        let state = state();
        state.run.write().await.status = RunStatus::Running;

        let err = trigger_run(State(state.clone())).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let Json(run) = run_status(State(state())).await;
        assert_eq!(run.status, RunStatus::Idle);
        assert!(run.run_id.is_none());
    }

    #[tokio::test]
    async fn test_cancel_without_run_conflicts() {
        assert!(cancel_run(State(state())).await.is_err());
    }

    #[tokio::test]
    async fn test_panicking_run_is_recorded_as_failed() {
        let state = state_with(vec![Arc::new(PanickingSource)]);
        let handle = start_run(&state, "test").await.unwrap();
        handle.await.unwrap();

        let run = state.run.read().await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.summary.starts_with("run aborted"));
        assert!(run.cancel.is_none());
        drop(run);

        // The slot is free again
        let next = start_run(&state, "test").await;
        assert!(next.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_active_run_token() {
        let state = state();
        let handle = start_run(&state, "test").await.unwrap();
        state.shutdown.cancel();
        handle.await.unwrap();

        let run = state.run.read().await;
        assert_ne!(run.status, RunStatus::Running);
    }
}
