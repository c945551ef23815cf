use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::dataset::{QueryResults, Results};
use crate::error::TributaryError;
use crate::interface::Federation;
use crate::query::{Query, QueryPart};

#[derive(Deserialize)]
pub struct SearchRequest {
    pub text: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct FindRequest {
    pub datasource: String,
    /// `[column, pattern]` pairs.
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct ContentsRequest {
    pub datasource: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct ResultRow {
    pub key: String,
    pub values: Vec<Option<String>>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<ResultRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn status_of(e: &TributaryError) -> StatusCode {
    match e {
        TributaryError::InvalidSearchString(_) | TributaryError::ColumnNotFound(_) => StatusCode::BAD_REQUEST,
        TributaryError::UnknownDatasource(_) => StatusCode::NOT_FOUND,
        TributaryError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Reads the requested columns of every row; unknown columns read as unset.
fn tabulate(results: &dyn QueryResults, columns: &[String]) -> Vec<ResultRow> {
    results
        .iter()
        .map(|row| ResultRow {
            key: row.key().to_string(),
            values: columns.iter().map(|c| row.get(c).ok().flatten()).collect(),
        })
        .collect()
}

type Answer = (StatusCode, Json<QueryResponse>);

/// Runs `work` on the blocking pool and renders its outcome.
async fn answer<F>(federation: Arc<Federation>, operation: &'static str, work: F) -> Answer
where
    F: FnOnce(&Federation) -> crate::error::Result<(Vec<String>, Results)> + Send + 'static,
{
    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || {
        work(&federation).map(|(columns, results)| {
            let rows = tabulate(results.as_ref(), &columns);
            (columns, rows)
        })
    })
    .await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let failure = |status: StatusCode, msg: String| {
        warn!(operation, %msg, code = %status.as_u16(), "request failed");
        let body = QueryResponse { status: "error".into(), elapsed_ms, columns: None, row_count: None, rows: None, error: Some(msg) };
        (status, Json(body))
    };
    match outcome {
        Ok(Ok((columns, rows))) => {
            info!(operation, ms = elapsed_ms, rows = rows.len(), "request complete");
            let body = QueryResponse { status: "ok".into(), elapsed_ms, columns: Some(columns), row_count: Some(rows.len()), rows: Some(rows), error: None };
            (StatusCode::OK, Json(body))
        }
        Ok(Err(e)) => failure(status_of(&e), e.to_string()),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Join error: {e}")),
    }
}

pub fn router(federation: Arc<Federation>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::POST])
        .allow_headers(Any);
    let for_search = Arc::clone(&federation);
    let for_find = Arc::clone(&federation);
    let for_contents = federation;
    Router::new()
        .route("/v1/search", post(move |Json(req): Json<SearchRequest>| {
            let federation = Arc::clone(&for_search);
            async move {
                answer(federation, "search", move |f| {
                    let results = f.search(&req.text)?;
                    let columns = match req.columns {
                        Some(columns) => columns,
                        None => f.search_columns(&req.text)?,
                    };
                    Ok((columns, results))
                })
                .await
            }
        }))
        .route("/v1/find", post(move |Json(req): Json<FindRequest>| {
            let federation = Arc::clone(&for_find);
            async move {
                answer(federation, "find", move |f| {
                    let parts = req.query.into_iter().map(|(c, p)| QueryPart::new(c, p)).collect();
                    let query = Query::new(req.datasource, parts);
                    let results = f.find(&query)?;
                    let columns = match req.columns {
                        Some(columns) => columns,
                        None => f.columns_for(query.datasource())?,
                    };
                    Ok((columns, results))
                })
                .await
            }
        }))
        .route("/v1/contents", post(move |Json(req): Json<ContentsRequest>| {
            let federation = Arc::clone(&for_contents);
            async move {
                answer(federation, "contents", move |f| {
                    let results = f.contents_of(&req.datasource)?;
                    let columns = match req.columns {
                        Some(columns) => columns,
                        None => f.columns_for(&req.datasource)?,
                    };
                    Ok((columns, results))
                })
                .await
            }
        }))
        .layer(cors)
}
