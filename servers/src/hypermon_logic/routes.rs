//! HTTP surface of the HyperMon API.
//!
//! `GET /api?action=..` (and `/api.php` for older clients) is the action
//! endpoint. The path-style aliases feed the same dispatcher, so every
//! route answers with the same envelope.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use lib_common::core::{Action, Dispatcher, Envelope};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type Params = HashMap<String, String>;

fn into_response(envelope: Envelope) -> Response {
    let status = StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope.body)).into_response()
}

async fn action_handler(State(dispatcher): State<Arc<Dispatcher>>, Query(params): Query<Params>) -> Response {
    let action = params.get("action").cloned().unwrap_or_default();
    into_response(dispatcher.dispatch(&action, &params).await)
}

async fn run(dispatcher: &Dispatcher, action: Action, params: &Params) -> Response {
    into_response(dispatcher.dispatch(action.as_str(), params).await)
}

async fn keyed_nodes_handler(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    run(&dispatcher, Action::KeyedNodes, &Params::new()).await
}

async fn search_nodes_handler(State(dispatcher): State<Arc<Dispatcher>>, Query(params): Query<Params>) -> Response {
    run(&dispatcher, Action::SearchNodes, &params).await
}

async fn node_info_handler(State(dispatcher): State<Arc<Dispatcher>>, Path(node): Path<String>) -> Response {
    let params = Params::from([("node".to_string(), node)]);
    run(&dispatcher, Action::NodeInfo, &params).await
}

async fn health_handler(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    run(&dispatcher, Action::Health, &Params::new()).await
}

/// Builds the application router.
pub fn router(dispatcher: Arc<Dispatcher>, cors_allow_any: bool) -> Router {
    let mut app = Router::new()
        .route("/api", get(action_handler))
        .route("/api.php", get(action_handler))
        .route("/api/keyed-nodes", get(keyed_nodes_handler))
        .route("/api/search-nodes", get(search_nodes_handler))
        .route("/api/node-info/{node}", get(node_info_handler))
        .route("/health", get(health_handler))
        .with_state(dispatcher);

    if cors_allow_any {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(Any),
        );
    }
    app.layer(TraceLayer::new_for_http())
}
