// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use axum::{Json, Router};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use clap::Args;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use cellgate_engine::{DispatchError, Dispatcher, ModelFamily, SegmentParams};

use crate::engine::EngineArgs;
use crate::logging::init_logger;

#[derive(Debug, Args)]
#[command(about = "Serve the segmentation gateway over HTTP.")]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1", help = "Address to bind.")]
    pub host: String,

    #[arg(short, long, default_value_t = 8000, help = "Port to bind.")]
    pub port: u16,

    #[arg(long, default_value_t = 512, help = "Maximum upload size in MiB.")]
    pub max_upload_mb: usize,

    #[arg(short = 'v', long, help = "Verbose output.")]
    pub verbose: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Shared state of the HTTP handlers
pub struct AppState {
    pub dispatcher: Dispatcher,
}

pub fn serve(args: &ServeArgs) {
    init_logger(args.verbose);

    let dispatcher = args.engine.dispatcher();

    if dispatcher.environments().is_empty() {
        warn!("No environments registered, every segmentation request will fail");
    }

    if !dispatcher.engine_script().is_file() {
        warn!(
            engine = %dispatcher.engine_script().display(),
            "Engine script not found"
        );
    }

    let address = format!("{}:{}", args.host, args.port);
    let state = Arc::new(AppState { dispatcher });

    let app = router(state, upload_limit_bytes(args.max_upload_mb));

    run_server(&address, app).unwrap_or_else(|err| {
        eprintln!("[cellgate::serve] ERROR: {}", err);
        std::process::exit(1);
    });
}

#[tokio::main]
async fn run_server(address: &str, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(%address, "Segmentation gateway listening");
    axum::serve(listener, app).await
}

/// Upload limit in bytes, saturating for very large megabyte counts
fn upload_limit_bytes(megabytes: usize) -> usize {
    megabytes.saturating_mul(1024 * 1024)
}

/// Build the gateway routes
///
/// # Arguments
///
/// * `state` - Shared dispatcher
/// * `max_upload_bytes` - Request body limit applied to uploads
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/getModels", get(get_models))
        .route("/segment", post(segment))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_models(State(state): State<Arc<AppState>>) -> Json<BTreeMap<ModelFamily, Vec<String>>> {
    Json(state.dispatcher.list_models())
}

async fn segment(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SegmentParams>,
    mut multipart: Multipart,
) -> Response {
    let mut upload = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("image") => match field.bytes().await {
                Ok(bytes) => {
                    upload = Some(bytes);
                    break;
                }
                Err(err) => return err.into_response(),
            },
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(err) => return err.into_response(),
        }
    }

    let Some(bytes) = upload else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Missing multipart field: image",
        )
            .into_response();
    };

    // Removed when dropped, whichever way this handler returns
    let file = match write_upload(&bytes) {
        Ok(file) => file,
        Err(err) => {
            error!(%err, "Failed to store upload");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload").into_response();
        }
    };

    info!(
        family = %params.model_type,
        model = %params.model_name,
        bytes = bytes.len(),
        "Received segmentation request"
    );

    match state.dispatcher.run(file.path(), &params).await {
        Ok(text) => text.into_response(),
        Err(err) => {
            match &err {
                DispatchError::Crashed(code) => error!(?code, "Worker crashed"),
                DispatchError::Misconfigured(family) => {
                    error!(%family, "No environment configured for family")
                }
                _ => warn!(%err, "Segmentation failed"),
            }

            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, err.to_string()).into_response()
        }
    }
}

fn write_upload(bytes: &[u8]) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("cellgate-upload-")
        .suffix(".img")
        .tempfile()?;

    file.write_all(bytes)?;
    file.flush()?;

    Ok(file)
}

#[cfg(test)]
mod test {

    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use cellgate_engine::Environments;
    use tower::ServiceExt;

    const BOUNDARY: &str = "cellgate-test-boundary";

    fn app(dispatcher: Dispatcher) -> Router {
        router(Arc::new(AppState { dispatcher }), 1024 * 1024)
    }

    fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"cells.npy\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn segment_request(query: &str, field: &str, bytes: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/segment?{}", query))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, bytes)))
            .unwrap()
    }

    async fn reply(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_upload_limit_saturates() {
        assert_eq!(upload_limit_bytes(0), 0);
        assert_eq!(upload_limit_bytes(500), 500 * 1024 * 1024);
        assert_eq!(upload_limit_bytes(usize::MAX), usize::MAX);
        assert_eq!(upload_limit_bytes(usize::MAX / 1024), usize::MAX);
    }

    #[tokio::test]
    async fn test_get_models_listing() {
        let models = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(models.path().join("Cellpose 3.1").join("ddq_model")).unwrap();

        let dispatcher = Dispatcher::new(Environments::default(), models.path(), "engine.py");
        let request = Request::builder()
            .uri("/getModels")
            .body(Body::empty())
            .unwrap();

        let (status, body) = reply(app(dispatcher), request).await;
        let listing: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["Cellpose3.1"], serde_json::json!(["ddq_model"]));
        assert_eq!(listing["CellposeSAM"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_segment_misconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(Environments::default(), dir.path(), "engine.py");

        let (status, body) = reply(
            app(dispatcher),
            segment_request("model_type=CellposeSAM&model_name=cpsam", "image", b"bytes"),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Server Error: Model misconfigured.");
    }

    #[tokio::test]
    async fn test_segment_missing_custom_model() {
        let dir = tempfile::tempdir().unwrap();
        let environments =
            Environments::default().with_interpreter(ModelFamily::Cellpose3, "/bin/sh");
        let dispatcher = Dispatcher::new(environments, dir.path(), "engine.py");

        let (status, body) = reply(
            app(dispatcher),
            segment_request(
                "model_type=Cellpose3.1&model_name=ghost&use_gpu=True",
                "image",
                b"bytes",
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("Model file missing: "));
    }

    #[tokio::test]
    async fn test_segment_rejects_bad_query() {
        let dir = tempfile::tempdir().unwrap();

        for query in [
            "model_type=Cellpose2&model_name=cyto",
            "model_name=cpsam",
            "model_type=CellposeSAM&model_name=cpsam&resample=maybe",
            "model_type=CellposeSAM&model_name=cpsam&batch_size=-1",
        ] {
            let dispatcher = Dispatcher::new(Environments::default(), dir.path(), "engine.py");
            let (status, _) =
                reply(app(dispatcher), segment_request(query, "image", b"bytes")).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", query);
        }
    }

    #[tokio::test]
    async fn test_segment_requires_image_field() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(Environments::default(), dir.path(), "engine.py");

        let (status, _) = reply(
            app(dispatcher),
            segment_request("model_type=CellposeSAM&model_name=cpsam", "file", b"bytes"),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[cfg(unix)]
    mod engine {

        use super::*;
        use cellgate_core::im::CellImage;
        use std::time::Duration;

        fn npy_image() -> Vec<u8> {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("image.npy");
            cellgate_core::io::write_numpy(&path, vec![0u8, 1, 2, 3], vec![2, 2]).unwrap();
            assert!(CellImage::open(&path).is_ok());
            std::fs::read(&path).unwrap()
        }

        fn dispatcher(dir: &tempfile::TempDir, script: &str, timeout: Duration) -> Dispatcher {
            let engine = dir.path().join("engine.sh");
            std::fs::write(&engine, script).unwrap();

            let environments =
                Environments::default().with_interpreter(ModelFamily::CellposeSam, "/bin/sh");

            Dispatcher::new(environments, dir.path(), engine).with_timeout(timeout)
        }

        #[tokio::test]
        async fn test_segment_success_plain_text() {
            let dir = tempfile::tempdir().unwrap();
            let dispatcher = dispatcher(
                &dir,
                "echo '{\"status\": \"success\", \"data\": \"1,1,3,1,3,3\"}'\n",
                Duration::from_secs(30),
            );

            let response = app(dispatcher)
                .oneshot(segment_request(
                    "model_type=CellposeSAM&model_name=cpsam",
                    "image",
                    &npy_image(),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert!(
                response.headers()[header::CONTENT_TYPE]
                    .to_str()
                    .unwrap()
                    .starts_with("text/plain")
            );

            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], b"1,1,3,1,3,3");
        }

        #[tokio::test]
        async fn test_segment_engine_error_message() {
            let dir = tempfile::tempdir().unwrap();
            let dispatcher = dispatcher(
                &dir,
                "echo '{\"status\": \"error\", \"message\": \"CUDA unavailable\"}'\n",
                Duration::from_secs(30),
            );

            let (status, body) = reply(
                app(dispatcher),
                segment_request("model_type=CellposeSAM&model_name=cpsam", "image", &npy_image()),
            )
            .await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "CUDA unavailable");
        }

        #[tokio::test]
        async fn test_segment_crash() {
            let dir = tempfile::tempdir().unwrap();
            let dispatcher = dispatcher(&dir, "exit 9\n", Duration::from_secs(30));

            let (status, body) = reply(
                app(dispatcher),
                segment_request("model_type=CellposeSAM&model_name=cpsam", "image", &npy_image()),
            )
            .await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "Internal Worker Error");
        }

        #[tokio::test]
        async fn test_segment_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let dispatcher = dispatcher(&dir, "sleep 5\n", Duration::from_millis(200));

            let (status, body) = reply(
                app(dispatcher),
                segment_request("model_type=CellposeSAM&model_name=cpsam", "image", &npy_image()),
            )
            .await;

            assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
            assert_eq!(body, "Processing timed out.");
        }
    }
}
