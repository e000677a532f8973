use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    JobInfo, JobSpec, TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest,
    TaskCompleteResponse, WorkerHeartbeatRequest, WorkerHeartbeatResponse,
    WorkerRegisterRequest, WorkerRegisterResponse,
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(create_job))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .route("/api/v1/tasks/next", post(assign_task))
        .route("/api/v1/tasks/complete", post(complete_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Crea un job con `parallelism` slots de tarea
async fn create_job(
    State(state): State<AppState>,
    Json(spec): Json<JobSpec>,
) -> Result<Json<JobInfo>, (StatusCode, String)> {
    state.create_job(spec).map(Json).map_err(|e| {
        warn!("job rechazado: {}", e);
        (StatusCode::BAD_REQUEST, e)
    })
}

// Devuelve info de un job
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, StatusCode> {
    state.job(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// Registra un worker nuevo
async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Json<WorkerRegisterResponse> {
    let worker_id = state.register_worker(req.hostname, req.max_concurrency);
    Json(WorkerRegisterResponse { worker_id })
}

// Heartbeat de worker
async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Result<Json<WorkerHeartbeatResponse>, StatusCode> {
    if state.heartbeat(&req.worker_id) {
        Ok(Json(WorkerHeartbeatResponse { ok: true }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// Asigna la siguiente tarea en cola (si hay)
async fn assign_task(
    State(state): State<AppState>,
    Json(req): Json<TaskAssignmentRequest>,
) -> Json<TaskAssignmentResponse> {
    Json(TaskAssignmentResponse {
        task: state.assign_next(&req.worker_id),
    })
}

// Worker reporta que terminó una tarea
async fn complete_task(
    State(state): State<AppState>,
    Json(req): Json<TaskCompleteRequest>,
) -> Result<Json<TaskCompleteResponse>, StatusCode> {
    if state.complete_task(&req.task_id, req.attempt, req.success) {
        Ok(Json(TaskCompleteResponse { ok: true }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn post_jobs_crea_slots_y_get_devuelve_el_job() {
        let state = AppState::new();
        let app = build_router(state.clone());

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/jobs",
                json!({
                    "name": "script-job-1",
                    "region": "us-central1",
                    "parallelism": 3,
                    "command": "worker process-chunk",
                    "environment": {"DATASET_NAME": "large_data"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let job: JobInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(job.total_tasks, 3);
        assert_eq!(state.tasks_queue.lock().unwrap().len(), 3);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/jobs/{}", job.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_jobs_con_parallelism_cero_es_400() {
        let state = AppState::new();
        let app = build_router(state.clone());

        let resp = app
            .oneshot(post_json(
                "/api/v1/jobs",
                json!({
                    "name": "x",
                    "region": "us-central1",
                    "parallelism": 0,
                    "command": "true",
                    "environment": {}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_job_inexistente_es_404() {
        let app = build_router(AppState::new());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/jobs/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn heartbeat_de_worker_desconocido_es_404() {
        let app = build_router(AppState::new());
        let resp = app
            .oneshot(post_json(
                "/api/v1/workers/heartbeat",
                json!({"worker_id": "perdido-tras-reinicio"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn complete_con_intento_viejo_es_404() {
        let state = AppState::new();
        let app = build_router(state.clone());
        state
            .create_job(JobSpec {
                name: "j".to_string(),
                region: "us-central1".to_string(),
                parallelism: 1,
                command: "true".to_string(),
                environment: Default::default(),
            })
            .unwrap();
        let w = state.register_worker("host".to_string(), 1);
        let task = state.assign_next(&w).unwrap();

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/tasks/complete",
                json!({"task_id": task.id, "attempt": task.attempt + 1, "success": true}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(post_json(
                "/api/v1/tasks/complete",
                json!({"task_id": task.id, "attempt": task.attempt, "success": true}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
