//! REST API handlers.
//!
//! Each handler is generic over the stored kind, reads/writes via
//! `StateStore`, and returns JSON responses.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use krane_core::{Kind, Release, Resource};
use krane_rollout::tasks::RELEASE_LABEL;
use krane_state::{ObjectStore, StateError};
use tracing::{debug, info};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn state_error(e: StateError) -> Response {
    let status = match e {
        StateError::NotFound { .. } => StatusCode::NOT_FOUND,
        StateError::AlreadyExists { .. } | StateError::Conflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

/// Wake the controller for every release affected by a write to `object`.
fn notify<R: Resource>(state: &ApiState, object: &R) {
    let meta = object.meta();
    match R::KIND {
        Kind::Release => state.trigger.fire(&meta.namespace, &meta.name),
        Kind::Task => {
            if let Some(release) = meta.labels.get(RELEASE_LABEL) {
                state.trigger.fire(&meta.namespace, release);
            }
        }
        Kind::Workload => match state.store.list::<Release>(Some(&meta.namespace)) {
            Ok(releases) => {
                let deployments = releases.iter().filter(|r| {
                    r.spec.deployments.canary == meta.name
                        || r.spec.deployments.baseline == meta.name
                });
                for release in deployments {
                    state.trigger.fire(&meta.namespace, &release.metadata.name);
                }
            }
            Err(e) => debug!(error = %e, "skipping release trigger"),
        },
        Kind::Policy | Kind::RoutingRule => {}
    }
}

/// Force the object's identity to the one named by the path.
fn place<R: Resource>(object: &mut R, ns: &str, name: Option<&str>) {
    let meta = object.meta_mut();
    meta.namespace = ns.to_string();
    if let Some(name) = name {
        meta.name = name.to_string();
    }
}

// ── Collections ────────────────────────────────────────────────

/// GET /api/v1/{kind}
pub async fn list_all<R: Resource>(State(state): State<ApiState>) -> Response {
    match state.store.list::<R>(None) {
        Ok(objects) => ApiResponse::ok(objects).into_response(),
        Err(e) => state_error(e),
    }
}

/// GET /api/v1/namespaces/:ns/{kind}
pub async fn list<R: Resource>(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
) -> Response {
    match state.store.list::<R>(Some(&ns)) {
        Ok(objects) => ApiResponse::ok(objects).into_response(),
        Err(e) => state_error(e),
    }
}

/// POST /api/v1/namespaces/:ns/{kind}
pub async fn create<R: Resource>(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
    Json(mut object): Json<R>,
) -> Response {
    place(&mut object, &ns, None);
    if object.name().is_empty() {
        return error_response("metadata.name is required", StatusCode::BAD_REQUEST);
    }
    match state.store.create(&object) {
        Ok(created) => {
            info!(kind = %R::KIND, key = %created.meta().key(), "object created");
            notify(&state, &created);
            (StatusCode::CREATED, ApiResponse::ok(created)).into_response()
        }
        Err(e) => state_error(e),
    }
}

// ── Objects ────────────────────────────────────────────────────

/// GET /api/v1/namespaces/:ns/{kind}/:name
pub async fn get<R: Resource>(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> Response {
    match state.store.get::<R>(&ns, &name) {
        Ok(object) => ApiResponse::ok(object).into_response(),
        Err(e) => state_error(e),
    }
}

/// PUT /api/v1/namespaces/:ns/{kind}/:name
pub async fn update<R: Resource>(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
    Json(mut object): Json<R>,
) -> Response {
    place(&mut object, &ns, Some(&name));
    match state.store.update(&object) {
        Ok(updated) => {
            notify(&state, &updated);
            ApiResponse::ok(updated).into_response()
        }
        Err(e) => state_error(e),
    }
}

/// PUT /api/v1/namespaces/:ns/{kind}/:name/status
pub async fn update_status<R: Resource>(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
    Json(mut object): Json<R>,
) -> Response {
    place(&mut object, &ns, Some(&name));
    match state.store.update_status(&object) {
        Ok(updated) => {
            notify(&state, &updated);
            ApiResponse::ok(updated).into_response()
        }
        Err(e) => state_error(e),
    }
}

/// DELETE /api/v1/namespaces/:ns/{kind}/:name
pub async fn delete<R: Resource>(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> Response {
    match state.store.delete::<R>(&ns, &name) {
        Ok(()) => {
            info!(kind = %R::KIND, %ns, %name, "object deleted");
            ApiResponse::ok("deleted").into_response()
        }
        Err(e) => state_error(e),
    }
}

/// GET /healthz
pub async fn healthz() -> Response {
    ApiResponse::ok("ok").into_response()
}

#[cfg(test)]
mod tests {
    use krane_core::*;
    use krane_rollout::Trigger;
    use krane_state::StateStore;

    use super::*;

    fn test_state() -> ApiState {
        ApiState {
            store: StateStore::open_in_memory().unwrap(),
            trigger: Trigger::detached(),
        }
    }

    fn test_workload(name: &str) -> Workload {
        Workload::new("default", name, 2)
    }

    #[tokio::test]
    async fn list_empty() {
        let resp = list::<Workload>(State(test_state()), Path("default".into())).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_takes_namespace_from_path() {
        let state = test_state();
        let resp = create::<Workload>(
            State(state.clone()),
            Path("shop".into()),
            Json(test_workload("api")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let stored: Workload = state.store.get("shop", "api").unwrap();
        assert_eq!(stored.metadata.resource_version, 1);
        assert!(state.store.find::<Workload>("default", "api").unwrap().is_none());
    }

    #[tokio::test]
    async fn create_requires_name() {
        let resp = create::<Workload>(
            State(test_state()),
            Path("default".into()),
            Json(test_workload("")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let state = test_state();
        let first = create::<Workload>(
            State(state.clone()),
            Path("default".into()),
            Json(test_workload("api")),
        )
        .await;
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = create::<Workload>(
            State(state),
            Path("default".into()),
            Json(test_workload("api")),
        )
        .await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let resp = get::<Release>(State(test_state()), Path(("default".into(), "nope".into()))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let state = test_state();
        let stored = state.store.create(&test_workload("api")).unwrap();

        let mut fresh = stored.clone();
        fresh.spec.replicas = 3;
        let resp = update::<Workload>(
            State(state.clone()),
            Path(("default".into(), "api".into())),
            Json(fresh),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let mut stale = stored;
        stale.spec.replicas = 5;
        let resp = update::<Workload>(
            State(state),
            Path(("default".into(), "api".into())),
            Json(stale),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn status_update_keeps_spec() {
        let state = test_state();
        let stored = state.store.create(&test_workload("api")).unwrap();

        let mut report = stored.clone();
        report.spec.replicas = 99;
        report.status.available_replicas = 2;
        let resp = update_status::<Workload>(
            State(state.clone()),
            Path(("default".into(), "api".into())),
            Json(report),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let current: Workload = state.store.get("default", "api").unwrap();
        assert_eq!(current.spec.replicas, 2);
        assert_eq!(current.status.available_replicas, 2);
    }

    #[tokio::test]
    async fn delete_missing() {
        let resp = delete::<Task>(State(test_state()), Path(("default".into(), "nope".into()))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthz_ok() {
        assert_eq!(healthz().await.status(), StatusCode::OK);
    }
}
