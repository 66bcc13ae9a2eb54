use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use komodo_core::{
    DocumentInput, EnumerationQuery, EnumerationResult, Error, IndexRecord, IndexResult, IndexStats, Komodo,
    ParseResult, SearchQuery, SearchResult, SourceDocument,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub type AppState = Arc<Komodo>;

#[derive(Deserialize)]
pub struct CreateIndexRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AddDocumentRequest {
    #[serde(default)]
    pub document: DocumentInput,
    pub parse_result: ParseResult,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub document: SourceDocument,
    pub parse_result: ParseResult,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Library errors rendered as a status code and a JSON body.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::IndexNotFound(_) | Error::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            Error::MissingInput(_) | Error::InvalidInput(_) | Error::ParseUnsuccessful | Error::Collision(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::IndexExists(_) | Error::DocumentExists(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// CORS from `CORS_ALLOW_ORIGIN` (comma-separated), any origin otherwise.
fn cors_layer() -> CorsLayer {
    let any = || CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                any()
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => any(),
    }
}

pub fn build_app(komodo: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(stats))
        .route("/indices", get(list_indices).post(create_index))
        .route("/indices/:index", get(get_index).delete(delete_index))
        .route("/indices/:index/stats", get(index_stats))
        .route("/indices/:index/documents", post(add_document))
        .route("/indices/:index/documents/:guid", get(get_document).delete(remove_document))
        .route("/indices/:index/search", post(search))
        .route("/indices/:index/enumerate", post(enumerate))
        .with_state(komodo)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

async fn stats(State(komodo): State<AppState>) -> ApiResult<Json<IndexStats>> {
    Ok(Json(komodo.stats(None)?))
}

async fn index_stats(State(komodo): State<AppState>, Path(index): Path<String>) -> ApiResult<Json<IndexStats>> {
    Ok(Json(komodo.stats(Some(&index))?))
}

async fn list_indices(State(komodo): State<AppState>) -> ApiResult<Json<Vec<IndexRecord>>> {
    Ok(Json(komodo.list_indices()?))
}

async fn create_index(
    State(komodo): State<AppState>,
    Json(req): Json<CreateIndexRequest>,
) -> ApiResult<(StatusCode, Json<IndexRecord>)> {
    Ok((StatusCode::CREATED, Json(komodo.create_index(&req.name)?)))
}

async fn get_index(State(komodo): State<AppState>, Path(index): Path<String>) -> ApiResult<Json<IndexRecord>> {
    Ok(Json(komodo.get_index(&index)?))
}

async fn delete_index(State(komodo): State<AppState>, Path(index): Path<String>) -> ApiResult<StatusCode> {
    komodo.delete_index(&index)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_document(
    State(komodo): State<AppState>,
    Path(index): Path<String>,
    Json(req): Json<AddDocumentRequest>,
) -> ApiResult<(StatusCode, Json<IndexResult>)> {
    let result = komodo.add(&index, req.document, req.parse_result)?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn get_document(
    State(komodo): State<AppState>,
    Path((index, guid)): Path<(String, Uuid)>,
) -> ApiResult<Json<DocumentResponse>> {
    let document = komodo.get_document(&index, &guid)?;
    let parse_result = komodo.get_parse_result(&index, &guid)?;
    Ok(Json(DocumentResponse { document, parse_result }))
}

async fn remove_document(
    State(komodo): State<AppState>,
    Path((index, guid)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    komodo.remove_document(&index, &guid)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search(
    State(komodo): State<AppState>,
    Path(index): Path<String>,
    Json(query): Json<SearchQuery>,
) -> ApiResult<Json<SearchResult>> {
    Ok(Json(komodo.search(&index, &query)?))
}

async fn enumerate(
    State(komodo): State<AppState>,
    Path(index): Path<String>,
    Json(query): Json<EnumerationQuery>,
) -> ApiResult<Json<EnumerationResult>> {
    Ok(Json(komodo.enumerate(&index, &query)?))
}
