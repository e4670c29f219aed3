use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot::Sender;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::clock::IstClock;
use crate::db::store::{Store, StoreError};
use crate::ledger::Ledger;
use crate::rotation::{RotationError, Scheduler};

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Clone, Debug)]
pub struct AppState<S>
where
    S: Store + Clone,
{
    pub scheduler: Scheduler<S, IstClock>,
    pub ledger: Ledger<S>,
}

pub fn router<S>(store: S) -> Router
where
    S: Store + Clone + Send + Sync + 'static,
{
    let state = Arc::new(AppState {
        scheduler: Scheduler::new(store.clone(), IstClock),
        ledger: Ledger::new(store),
    });

    Router::new()
        .route("/", get(|| async { Response::new(Body::empty()) }))
        //
        // member-related routes
        .route("/members", get(roster::<S>).post(register_member::<S>))
        .route("/members/{id}/points", post(adjust_points::<S>))
        .route("/members/{id}/cards", post(give_card::<S>))
        //
        // rotation-related routes
        .route("/speakers/today", get(speakers_today::<S>))
        .route("/speakers/reshuffle", post(reshuffle_today::<S>))
        //
        // admin routes
        .route("/admin/reset", post(reset_members::<S>))
        .route("/logs/today", get(logs_today::<S>))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(middleware::from_fn(log_route_errors))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the listener, reports the bound address through `tx`, then serves
/// until shutdown.
#[instrument(skip(store, tx))]
pub async fn serve<S>(store: S, port: u16, tx: Sender<SocketAddr>) -> Result<(), RouteError>
where
    S: Store + Clone + Send + Sync + 'static,
{
    let app = router(store);

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    let bound = listener.local_addr()?;

    // A dropped receiver just means nobody is waiting on readiness.
    let _ = tx.send(bound);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Surfaces handler errors to the trace output; the response itself only
/// carries the JSON message body.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rotation(#[from] RotationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidOperation { .. } => StatusCode::BAD_REQUEST,
        // Selection conflicts are retried inside the scheduler; one leaking
        // here is still reported honestly.
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::PartialFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message) = match &self {
            RouteError::Store(err) => (store_status(err), err.to_string()),

            RouteError::Rotation(RotationError::Store(err)) => (store_status(err), err.to_string()),

            RouteError::Rotation(err @ RotationError::ContentionExhausted { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }

            RouteError::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

#[cfg(test)]
mod test {
    use axum::body::Body;
    use http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::router;
    use crate::db::memory::MemStore;

    async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn register(app: &axum::Router, name: &str) -> String {
        let (status, body) = send(app, post_json("/members", json!({ "name": name }))).await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn points_round_trip_over_http() {
        let app = router(MemStore::new());
        let id = register(&app, "asha").await;

        let (status, body) = send(
            &app,
            post_json(
                &format!("/members/{id}/points"),
                json!({ "delta": 5, "reason": "on time", "actor_id": "admin-1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["points"], 5);

        let (status, body) = send(&app, get_req("/logs/today")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn floor_violations_map_to_bad_request() {
        let app = router(MemStore::new());
        let id = register(&app, "asha").await;

        let (status, _) = send(
            &app,
            post_json(
                &format!("/members/{id}/points"),
                json!({ "delta": -1, "reason": "", "actor_id": "admin-1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_members_map_to_not_found() {
        let app = router(MemStore::new());

        let (status, _) = send(
            &app,
            post_json(
                "/members/no-such-id/points",
                json!({ "delta": 1, "reason": "", "actor_id": "admin-1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn speakers_today_returns_a_pair() {
        let app = router(MemStore::new());
        for name in ["asha", "binu", "devi"] {
            register(&app, name).await;
        }

        let (status, body) = send(&app, get_req("/speakers/today")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, again) = send(&app, get_req("/speakers/today")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again, body);
    }

    #[tokio::test]
    async fn reset_reports_the_member_count() {
        let app = router(MemStore::new());
        register(&app, "asha").await;
        register(&app, "binu").await;

        let (status, body) = send(&app, post_json("/admin/reset", json!({ "scope": "all" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["members_updated"], 2);
    }
}
