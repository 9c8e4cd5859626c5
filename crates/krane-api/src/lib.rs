//! krane-api: REST API for Krane.
//!
//! Lets operators submit releases, policies and routing rules, and lets a
//! cluster agent report workload and task status. Every kind is served by
//! the same generic handlers.
//!
//! # API Routes
//!
//! `{kind}` is one of `releases`, `policies`, `routingrules`, `workloads`,
//! `tasks`.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/{kind}` | List across namespaces |
//! | GET | `/api/v1/namespaces/{ns}/{kind}` | List in a namespace |
//! | POST | `/api/v1/namespaces/{ns}/{kind}` | Create (409 if it exists) |
//! | GET | `/api/v1/namespaces/{ns}/{kind}/{name}` | Get |
//! | PUT | `/api/v1/namespaces/{ns}/{kind}/{name}` | Replace spec (409 on stale version) |
//! | PUT | `/api/v1/namespaces/{ns}/{kind}/{name}/status` | Replace status (409 on stale version) |
//! | DELETE | `/api/v1/namespaces/{ns}/{kind}/{name}` | Delete |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use axum::Router;
use axum::routing::{get, put};
use krane_core::{Policy, Release, Resource, RoutingRule, Task, Workload};
use krane_rollout::Trigger;
use krane_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    /// Wakes the release controller after writes that affect a release.
    pub trigger: Trigger,
}

fn kind_routes<R: Resource>() -> Router<ApiState> {
    let plural = R::KIND.plural();
    Router::new()
        .route(&format!("/{plural}"), get(handlers::list_all::<R>))
        .route(
            &format!("/namespaces/{{ns}}/{plural}"),
            get(handlers::list::<R>).post(handlers::create::<R>),
        )
        .route(
            &format!("/namespaces/{{ns}}/{plural}/{{name}}"),
            get(handlers::get::<R>)
                .put(handlers::update::<R>)
                .delete(handlers::delete::<R>),
        )
        .route(
            &format!("/namespaces/{{ns}}/{plural}/{{name}}/status"),
            put(handlers::update_status::<R>),
        )
}

/// Build the complete API router.
pub fn build_router(store: StateStore, trigger: Trigger) -> Router {
    let api_state = ApiState { store, trigger };

    let api_routes = Router::new()
        .merge(kind_routes::<Release>())
        .merge(kind_routes::<Policy>())
        .merge(kind_routes::<RoutingRule>())
        .merge(kind_routes::<Workload>())
        .merge(kind_routes::<Task>())
        .with_state(api_state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
