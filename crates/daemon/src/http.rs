//! Query Service HTTP surface (§4.7, §6): a handful of typed `axum` routes sharing one
//! `AppState`, mirroring the "handler struct holding shared dependencies" shape used
//! elsewhere in this core for request dispatch.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use db::{RelationalStore, VectorStore};
use embedding::EmbeddingProvider;
use etl_core::validation::{optional_i64_range, optional_string, require_string_range, ValidationError};
use etl_core::{doc_id_from_vector_id, AttachmentType, ErrorKind, EtlConfig};
use extract::ocr::OcrEngine;
use extract::Extractor;
use fetch::{Fetcher, Unpacker};
use index::Indexer;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

#[derive(Clone)]
pub struct AppState {
  pub relational: Arc<RelationalStore>,
  pub vector: Arc<VectorStore>,
  pub embedder: Arc<dyn EmbeddingProvider>,
  pub indexer: Arc<Indexer>,
  pub fetcher: Fetcher,
  pub unpacker: Unpacker,
  pub ocr_engine: Arc<dyn OcrEngine>,
  pub config: Arc<EtlConfig>,
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/etl/upload-url", post(upload_url))
    .route("/etl/upload", post(upload_multipart))
    .route("/search", post(search))
    .route("/health", get(health))
    .route("/etl/ocr", get(ocr_status))
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
    .with_state(state)
}

/// Runs the Query Service until `SIGINT`/`SIGTERM` (§6 `serve` subcommand).
pub async fn run(addr: &str, state: AppState) -> std::io::Result<()> {
  let app = router(state);
  let listener = tokio::net::TcpListener::bind(addr).await?;
  info!("query service listening on {addr}");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await
}

async fn shutdown_signal() {
  let ctrl_c = async {
    let _ = tokio::signal::ctrl_c().await;
  };

  #[cfg(unix)]
  let terminate = async {
    let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
      .expect("failed to install SIGTERM handler");
    signal.recv().await;
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  info!("shutdown signal received, draining in-flight requests");
}

fn status_for_kind(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::Validation
    | ErrorKind::UnsupportedType
    | ErrorKind::CorruptArchive
    | ErrorKind::ArchiveBomb
    | ErrorKind::UnreadablePdf
    | ErrorKind::EmptyAfterOcr => StatusCode::BAD_REQUEST,
    ErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
    ErrorKind::Network | ErrorKind::Timeout | ErrorKind::HttpStatus | ErrorKind::HttpStatusClient | ErrorKind::OcrFailed => {
      StatusCode::BAD_GATEWAY
    }
    ErrorKind::EmbedUnavailable | ErrorKind::VectorStoreUnavailable | ErrorKind::DbUnavailable => {
      StatusCode::SERVICE_UNAVAILABLE
    }
    ErrorKind::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

fn error_body(kind: ErrorKind, detail: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
  (
    status_for_kind(kind),
    Json(json!({"error": kind.as_str(), "detail": detail.to_string()})),
  )
}

fn validation_body(e: ValidationError) -> (StatusCode, Json<Value>) {
  error_body(ErrorKind::Validation, e)
}

/// Shared by `upload_url` and `upload_multipart`: unpack, extract (first unit only — these
/// endpoints are contractually single-document), index, and shape the §6 response body.
async fn ingest_one(
  state: &AppState,
  bytes: &[u8],
  declared_name: &str,
  lot_id: &str,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
  let units = state
    .unpacker
    .unpack(bytes, declared_name)
    .map_err(|e| error_body(e.kind(), e))?;

  let Some(unit) = units.first() else {
    return Err(error_body(ErrorKind::UnsupportedType, "no extractable PDF found"));
  };
  if units.len() > 1 {
    warn!("upload of {declared_name} yielded {} PDF units; indexing only the first", units.len());
  }

  let file_type = if declared_name.to_lowercase().ends_with(".zip") {
    AttachmentType::Zip
  } else {
    AttachmentType::Pdf
  };

  let extractor = Extractor::new(
    state.ocr_engine.as_ref(),
    state.config.text_threshold_chars,
    state.config.render_scale,
    state.config.ocr_languages.clone(),
  );
  let extracted = extractor.extract(&unit.pdf_bytes).await.map_err(|e| error_body(e.kind(), e))?;

  let outcome = state
    .indexer
    .index(lot_id, &unit.file_name, file_type, &extracted.text, extracted.extraction_mode)
    .await
    .map_err(|e| error_body(e.kind(), e))?;

  let file_size_mb = unit.pdf_bytes.len() as f64 / (1024.0 * 1024.0);
  Ok((
    StatusCode::OK,
    Json(json!({
      "status": "ok",
      "doc_id": outcome.doc_id,
      "file_name": unit.file_name,
      "file_size_mb": file_size_mb,
      "embedding_pending": outcome.embedding_pending,
      "message": format!("{:?}", outcome.action),
    })),
  ))
}

async fn upload_url(State(state): State<AppState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
  let file_url = match require_string_range(body.get("file_url"), "file_url", 1, 2048) {
    Ok(v) => v,
    Err(e) => return validation_body(e),
  };
  let file_name = match require_string_range(body.get("file_name"), "file_name", 1, 255) {
    Ok(v) => v,
    Err(e) => return validation_body(e),
  };
  let lot_id = match require_string_range(body.get("lot_id"), "lot_id", 1, 255) {
    Ok(v) => v,
    Err(e) => return validation_body(e),
  };

  let outcome = match state.fetcher.fetch(&file_url, None).await {
    Ok(o) => o,
    Err(e) => return error_body(e.kind(), e),
  };

  match ingest_one(&state, &outcome.bytes, &file_name, &lot_id).await {
    Ok(ok) => ok,
    Err(err) => err,
  }
}

async fn upload_multipart(State(state): State<AppState>, mut multipart: Multipart) -> (StatusCode, Json<Value>) {
  let mut bytes: Option<Vec<u8>> = None;
  let mut file_name: Option<String> = None;
  let mut lot_id: Option<String> = None;

  loop {
    let field = match multipart.next_field().await {
      Ok(Some(f)) => f,
      Ok(None) => break,
      Err(e) => return validation_body(ValidationError::new("multipart", e.to_string())),
    };

    match field.name().unwrap_or("") {
      "file" => {
        file_name = field.file_name().map(str::to_string);
        bytes = match field.bytes().await {
          Ok(b) => Some(b.to_vec()),
          Err(e) => return validation_body(ValidationError::new("file", e.to_string())),
        };
      }
      "lot_id" => {
        lot_id = field.text().await.ok();
      }
      _ => {}
    }
  }

  let Some(bytes) = bytes else {
    return validation_body(ValidationError::missing("file"));
  };
  let file_name = file_name.unwrap_or_else(|| "upload.pdf".to_string());
  let Some(lot_id) = lot_id else {
    return validation_body(ValidationError::missing("lot_id"));
  };

  match ingest_one(&state, &bytes, &file_name, &lot_id).await {
    Ok(ok) => ok,
    Err(err) => err,
  }
}

async fn search(State(state): State<AppState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
  let query = match require_string_range(body.get("query"), "query", 1, 512) {
    Ok(v) => v,
    Err(e) => return validation_body(e),
  };
  let top_k = match optional_i64_range(body.get("top_k"), "top_k", 1, 50) {
    Ok(v) => v.unwrap_or(5) as usize,
    Err(e) => return validation_body(e),
  };
  let collection = match optional_string(body.get("collection"), "collection") {
    Ok(v) => v.unwrap_or_else(|| state.config.collection_name.clone()),
    Err(e) => return validation_body(e),
  };

  let vector = match state.embedder.embed(&query).await {
    Ok(v) => v,
    Err(e) => return error_body(e.kind(), e),
  };

  let hits = match state.vector.top_k(&collection, &vector, top_k).await {
    Ok(h) => h,
    Err(e) => return error_body(e.kind(), e),
  };

  let mut results = Vec::with_capacity(hits.len());
  for hit in hits {
    let Some(doc_id) = doc_id_from_vector_id(&hit.vector_id) else {
      continue;
    };
    let doc = match state.relational.get_by_doc_id(doc_id).await {
      Ok(Some(d)) => d,
      Ok(None) => continue, // Embedding without Document: tolerated per §4.7, shouldn't happen (I2).
      Err(e) => return error_body(e.kind(), e),
    };
    results.push(json!({
      "doc_id": doc.doc_id,
      "file_name": doc.file_name,
      "score": hit.score,
      "metadata": hit.metadata,
      "content_preview": doc.preview(),
    }));
  }

  (
    StatusCode::OK,
    Json(json!({
      "query": query,
      "results": results,
      "total_found": results.len(),
    })),
  )
}

async fn health(State(state): State<AppState>) -> Json<Value> {
  let db_ok = state.relational.is_reachable().await;
  if !db_ok {
    return Json(json!({"status": "unavailable", "subsystems": {"relational": "unavailable"}}));
  }

  let embed_ok = state.embedder.is_available().await;
  let vector_ok = state.vector.exists(&state.config.collection_name, "health-probe").await.is_ok();

  if embed_ok && vector_ok {
    Json(json!({"status": "ok"}))
  } else {
    Json(json!({
      "status": "degraded",
      "subsystems": {
        "relational": "ok",
        "embedder": if embed_ok { "ok" } else { "unavailable" },
        "vector_store": if vector_ok { "ok" } else { "unavailable" },
      },
    }))
  }
}

async fn ocr_status() -> Json<Value> {
  let ocr_available = tokio::process::Command::new("tesseract")
    .arg("--version")
    .output()
    .await
    .map(|o| o.status.success())
    .unwrap_or(false);

  Json(json!({
    "status": if ocr_available { "ready" } else { "unavailable" },
    "ocr_available": ocr_available,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_mapping_matches_taxonomy() {
    assert_eq!(status_for_kind(ErrorKind::Validation), StatusCode::BAD_REQUEST);
    assert_eq!(status_for_kind(ErrorKind::TooLarge), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(status_for_kind(ErrorKind::DbUnavailable), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status_for_kind(ErrorKind::HttpStatus), StatusCode::BAD_GATEWAY);
    assert_eq!(status_for_kind(ErrorKind::HttpStatusClient), StatusCode::BAD_GATEWAY);
  }
}
