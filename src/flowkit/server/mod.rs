// SPDX-License-Identifier: MIT

//! Read-only HTTP introspection over a flow state store

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::StoreError;
use crate::flowkit::state::{FlowState, FlowStatePage, FlowStateQuery, FlowStatus, FlowStateStore};

type SharedStore = Arc<dyn FlowStateStore>;
type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/flows", get(list_flows))
        .route("/api/flows/{id}", get(get_flow))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(store)
}

pub async fn serve(
    port: u16,
    store: SharedStore,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(store);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    name: Option<String>,
    status: Option<String>,
    limit: Option<usize>,
    cursor: Option<String>,
}

impl ListParams {
    fn into_query(self) -> Result<FlowStateQuery, (StatusCode, Json<Value>)> {
        let mut query = FlowStateQuery::new();
        if let Some(name) = self.name {
            query = query.name(name);
        }
        if let Some(status) = self.status {
            let status: FlowStatus = status
                .parse()
                .map_err(|e| error_body(StatusCode::BAD_REQUEST, format!("{}", e)))?;
            query = query.status(status);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(cursor) = self.cursor {
            query = query.cursor(cursor);
        }
        Ok(query)
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

fn store_failure(e: StoreError) -> (StatusCode, Json<Value>) {
    log::error!("Flow state store error: {}", e);
    error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

async fn list_flows(
    State(store): State<SharedStore>,
    Query(params): Query<ListParams>,
) -> ApiResult<FlowStatePage> {
    let query = params.into_query()?;
    let page = store.list(Some(&query)).await.map_err(store_failure)?;
    Ok(Json(page))
}

async fn get_flow(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> ApiResult<FlowState> {
    match store.load(&id).await.map_err(store_failure)? {
        Some(state) => Ok(Json(state)),
        None => Err(error_body(
            StatusCode::NOT_FOUND,
            format!("Flow state '{}' not found", id),
        )),
    }
}
