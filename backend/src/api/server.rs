//! HTTP server for the fieldmap API.
//!
//! # API Endpoints
//!
//! | Method | Path           | Description                                   |
//! |--------|----------------|-----------------------------------------------|
//! | GET    | `/health`      | Health check                                  |
//! | GET    | `/api/types`   | Registered transformations, rules, comparisons|
//! | POST   | `/api/preview` | Run a transformation list over sample values  |
//! | POST   | `/api/apply`   | Upload a CSV (+ mapping set) and get records  |
//! | GET    | `/api/logs`    | SSE stream for real-time logs                 |
//!
//! `/api/apply` takes a multipart body: `file` (required), plus optional
//! `mapping` (mapping set JSON) and `schema` (target JSON schema) text parts.
//! Without a mapping part the saved store and the schema are used, as on the
//! command line.

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, ApplyResponse, PreviewRequest, PreviewResponse, TypesResponse};
use crate::config::EngineConfig;
use crate::error::{MappingError, PipelineError, ServerError, ServerResult};
use crate::models::{FieldDescriptor, ValueType};
use crate::transform::pipeline::{transform_bytes_with, TransformOptions};
use crate::transform::{Cancellation, FieldTransformation, MappingSet, ResultContext, TransformationResult};

type SharedConfig = Arc<EngineConfig>;
type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;

/// Build the application router.
pub fn router(config: EngineConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/types", get(types))
        .route("/api/preview", post(preview))
        .route("/api/apply", post(apply))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(Arc::new(config))
}

/// Start the HTTP server on `config.port`
pub async fn start_server(config: EngineConfig) -> ServerResult<()> {
    let port = config.port;
    let app = router(config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 fieldmap server running on http://localhost:{}", port);
    println!("   GET  /api/types   - Registered types");
    println!("   POST /api/preview - Preview a transformation list");
    println!("   POST /api/apply   - Upload CSV and apply a mapping set");
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "fieldmap",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "types": "GET /api/types",
            "preview": "POST /api/preview",
            "apply": "POST /api/apply",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn types() -> Json<TypesResponse> {
    Json(TypesResponse::collect())
}

/// Run the posted transformations over (at most `preview_rows`) sample values.
async fn preview(State(config): State<SharedConfig>, Json(request): Json<PreviewRequest>) -> Json<PreviewResponse> {
    let PreviewRequest {
        transformations,
        mut values,
        target_type,
    } = request;

    let truncated = values.len() > config.preview_rows;
    values.truncate(config.preview_rows);

    let field = FieldDescriptor::new("preview", ValueType::infer(&values));
    let pipeline = FieldTransformation::with_transformations(Arc::new(field), transformations);

    let seeds = values
        .into_iter()
        .map(|value| {
            let value_type = ValueType::of(&value);
            let context = ResultContext::default().with_target_type(target_type);
            TransformationResult::initial(value, value_type, context)
        })
        .collect();
    let results = pipeline.apply_results(seeds, &Cancellation::new()).await;

    Json(PreviewResponse::new(results, truncated))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Parts of an `/api/apply` upload
#[derive(Default)]
struct ApplyUpload {
    file_name: Option<String>,
    bytes: Option<Vec<u8>>,
    mapping: Option<MappingSet>,
    schema: Option<Value>,
}

async fn read_upload(mut multipart: Multipart) -> ServerResult<ApplyUpload> {
    let mut upload = ApplyUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                upload.file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                upload.bytes = Some(bytes.to_vec());
            }
            "mapping" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                let mapping = MappingSet::from_json(&text).map_err(|e| ServerError::BadRequest(e.to_string()))?;
                upload.mapping = Some(mapping);
            }
            "schema" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                let schema = serde_json::from_str(&text)
                    .map_err(|e| ServerError::BadRequest(format!("Invalid schema JSON: {}", e)))?;
                upload.schema = Some(schema);
            }
            other => log_info(format!("Ignoring multipart field '{}'", other)),
        }
    }

    Ok(upload)
}

async fn apply(State(config): State<SharedConfig>, multipart: Multipart) -> ApiResult<ApplyResponse> {
    let upload = read_upload(multipart).await.map_err(reject)?;
    let bytes = upload
        .bytes
        .ok_or_else(|| reject(ServerError::BadRequest("No file provided".into())))?;

    let file_name = upload.file_name.unwrap_or_else(|| "upload.csv".to_string());
    log_info(format!("New upload: {} ({} bytes)", file_name, bytes.len()));

    let table_name = file_name.rsplit_once('.').map_or(file_name.as_str(), |(stem, _)| stem);
    let options = TransformOptions::from_config(&config);

    let report = transform_bytes_with(&bytes, table_name, upload.mapping, upload.schema, options)
        .await
        .map_err(|e| reject(e.into()))?;

    Ok(Json(ApplyResponse::from(report)))
}

fn status_for(error: &ServerError) -> StatusCode {
    match error {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Pipeline(
            PipelineError::EmptyInput
            | PipelineError::Csv(_)
            | PipelineError::Mapping(MappingError::InvalidMappingSet(_) | MappingError::InvalidSchema(_))
            | PipelineError::Mapping(MappingError::MissingFieldMapping { .. })
            | PipelineError::Validation(_),
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: ServerError) -> (StatusCode, Json<Value>) {
    let status = status_for(&error);
    log_error(format!("Request failed: {}", error));
    (status, Json(error_response(&error.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CsvError;
    use serde_json::json;

    fn shared(preview_rows: usize) -> State<SharedConfig> {
        State(Arc::new(EngineConfig {
            preview_rows,
            ..EngineConfig::default()
        }))
    }

    fn request(body: Value) -> Json<PreviewRequest> {
        Json(serde_json::from_value(body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "fieldmap");
    }

    #[tokio::test]
    async fn test_preview_runs_pipeline_per_value() {
        let Json(response) = preview(
            shared(10),
            request(json!({
                "transformations": [
                    { "typeId": "calculate", "formula": "${0} * 2", "decimalPlaces": 0 },
                    { "typeId": "interpolate", "pattern": "INV-${0}" }
                ],
                "values": ["21", "abc"]
            })),
        )
        .await;

        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].current_value, json!("INV-42"));
        assert!(response.results[1].was_failure());
        assert_eq!(response.failures, 1);
        assert!(!response.truncated);
    }

    #[tokio::test]
    async fn test_preview_truncates_to_limit() {
        let Json(response) = preview(
            shared(2),
            request(json!({ "values": ["a", "b", "c"] })),
        )
        .await;

        assert_eq!(response.results.len(), 2);
        assert!(response.truncated);
        assert_eq!(response.results[1].current_value, json!("b"));
    }

    #[tokio::test]
    async fn test_types_endpoint() {
        let Json(body) = types().await;
        assert!(body.rules.iter().any(|d| d.type_id == "copyField"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&ServerError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&PipelineError::EmptyInput.into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&PipelineError::Csv(CsvError::new(1, "Empty CSV file")).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&PipelineError::Io(std::io::Error::other("disk")).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_router_builds() {
        let _ = router(EngineConfig::default());
    }
}
