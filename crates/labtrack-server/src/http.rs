//! HTTP endpoint handlers
//!
//! `/data` is one endpoint parameterized by `type` (and `id` for update and
//! delete):
//!
//! | Method | Success | Errors |
//! |---|---|---|
//! | GET    | 200 array of records | 400 bad type |
//! | POST   | 201 created record   | 400, 500 |
//! | PUT    | 200 merged record    | 400, 404, 500 |
//! | DELETE | 204 empty            | 400, 404, 500 |

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use labtrack_core::{RecordKind, RecordStore};

use crate::error::ApiError;
use crate::AppState;

/// Methods served on `/data`, as advertised in `Allow`
pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE";

/// Query string of `/data`
#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
}

impl DataQuery {
    fn kind(&self) -> Result<RecordKind, ApiError> {
        Ok(RecordKind::parse(self.kind.as_deref().unwrap_or_default())?)
    }

    fn id(&self, action: &str) -> Result<&str, ApiError> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::bad_request(format!("ID is required for {action}")))
    }
}

/// Malformed query strings get the same JSON error body as other 400s
fn data_query(query: Result<Query<DataQuery>, QueryRejection>) -> Result<DataQuery, ApiError> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// An empty body is an empty object
fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
}

/// List every record of a collection
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let query = data_query(query)?;
    let kind = query.kind()?;
    let store = state.store.read().await;
    let records: Vec<Value> = store
        .list(kind)
        .iter()
        .cloned()
        .map(Value::Object)
        .collect();
    Ok(Json(Value::Array(records)))
}

/// Create a record
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DataQuery>, QueryRejection>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let query = data_query(query)?;
    let kind = query.kind()?;
    let payload = parse_body(&body)?;

    let mut store = state.store.write().await;
    let record = store.create(kind, payload)?;
    tracing::debug!("Created {} record {:?}", kind, record.get("id"));

    Ok((StatusCode::CREATED, Json(Value::Object(record))))
}

/// Merge a partial payload into a record
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DataQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let query = data_query(query)?;
    let kind = query.kind()?;
    let id = query.id("update")?;
    let payload = parse_body(&body)?;

    let mut store = state.store.write().await;
    let record = store.update(kind, Some(id), payload)?;
    tracing::debug!("Updated {} record {}", kind, id);

    Ok(Json(Value::Object(record)))
}

/// Delete a record
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let query = data_query(query)?;
    let kind = query.kind()?;
    let id = query.id("delete")?;

    let mut store = state.store.write().await;
    store.delete(kind, Some(id))?;
    tracing::debug!("Deleted {} record {}", kind, id);

    Ok(StatusCode::NO_CONTENT)
}

/// Pre-flight; CORS headers are added by the router layers
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Any other method on `/data`
pub async fn method_not_allowed(method: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, ALLOWED_METHODS)],
        Json(serde_json::json!({ "error": format!("Method {} not allowed", method) })),
    )
        .into_response()
}

/// Unknown paths: `OPTIONS` still succeeds for pre-flight
pub async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    ApiError::not_found("Not found").into_response()
}

/// Get service status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let store = state.store.read().await;
    Json(status_body(&store))
}

fn status_body(store: &RecordStore) -> Value {
    let collections: serde_json::Map<String, Value> = store
        .counts()
        .into_iter()
        .map(|(kind, count)| (kind.key().to_string(), Value::from(count)))
        .collect();

    serde_json::json!({
        "collections": collections,
        "storage": store.backend().name(),
    })
}
