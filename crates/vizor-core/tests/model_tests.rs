//! Integration tests for the Model facade.
//!
//! Backends are stand-ins registered through the factory table; HTTP
//! collaborators are in-process axum servers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ndarray::Array3;
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vizor_core::{
    BackendFactory, BackendSpec, CacheKey, CacheStore, Configuration, DetectionBackend, Model,
    Predictions, Purpose, RawDetections, Source, VizorError,
};

/// Backend returning fixed raw detections and counting its calls.
struct StubBackend {
    calls: Arc<AtomicUsize>,
}

impl DetectionBackend for StubBackend {
    fn infer(&self, image: &Array3<u8>) -> anyhow::Result<RawDetections> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(image.shape()[2] == 3, "expected RGB input");
        Ok(RawDetections {
            detection_classes: vec![1, 2, 3],
            detection_boxes: vec![
                [0.1, 0.2, 0.3, 0.4],
                [0.5, 0.5, 0.6, 0.6],
                [0.0, 0.0, 1.0, 1.0],
            ],
            detection_scores: vec![0.9, 0.8, 0.7],
            num_detections: 3,
        })
    }
}

fn stub_factory(calls: Arc<AtomicUsize>) -> BackendFactory {
    Arc::new(move |_spec: &BackendSpec| -> anyhow::Result<Arc<dyn DetectionBackend>> {
        Ok(Arc::new(StubBackend {
            calls: calls.clone(),
        }))
    })
}

fn model_with_stub() -> (Model, Arc<AtomicUsize>) {
    let model = Model::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    model
        .registry()
        .register_factory("onnx", stub_factory(calls.clone()));
    (model, calls)
}

fn config(root: &Path, cache: bool) -> Configuration {
    Configuration::builder()
        .cache(cache)
        .cache_path(root.join("cache"))
        .cache_id("tests")
        .model_path(root.join("models"))
        .timeout_secs(5)
        .build()
}

fn png_base64() -> String {
    let image = image::RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    BASE64.encode(out.into_inner())
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_local_inference_normalizes_output() {
    let temp_dir = TempDir::new().unwrap();
    let (model, calls) = model_with_stub();

    let result = model
        .infer(&Source::parse(&png_base64()).unwrap(), &config(temp_dir.path(), false))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let ids: Vec<f64> = result.predictions.iter().map(|d| d.class_id).collect();
    assert_eq!(ids, vec![0.0, 1.0, 2.0]);

    let first = result.predictions[0];
    assert_eq!(first.score, 0.9f32 as f64);
    assert_eq!(first.xmin, 0.2f32 as f64);
    assert_eq!(first.ymin, 0.1f32 as f64);
}

#[tokio::test]
async fn test_cached_hit_skips_backend() {
    let temp_dir = TempDir::new().unwrap();
    let (model, calls) = model_with_stub();
    let config = config(temp_dir.path(), true);

    let cached = json!({"predictions": [[7.0, 0.99, 0.1, 0.1, 0.2, 0.2]]});
    CacheStore::new(&config).put(&CacheKey::new("file.jpg", Purpose::Inference), &cached);

    let result = model
        .infer(&Source::parse("file.jpg").unwrap(), &config)
        .await
        .unwrap();

    assert_eq!(serde_json::to_value(&result).unwrap(), cached);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_call_served_from_cache() {
    let temp_dir = TempDir::new().unwrap();
    let (model, calls) = model_with_stub();
    let config = config(temp_dir.path(), true);
    let source = Source::parse(&png_base64()).unwrap();

    let first = model.infer(&source, &config).await.unwrap();
    let second = model.infer(&source, &config).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disabled_cache_always_runs_backend() {
    let temp_dir = TempDir::new().unwrap();
    let (model, calls) = model_with_stub();
    let config = config(temp_dir.path(), false);
    let source = Source::parse(&png_base64()).unwrap();

    model.infer(&source, &config).await.unwrap();
    model.infer(&source, &config).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!temp_dir.path().join("cache").exists());
}

#[tokio::test]
async fn test_tensor_source_runs_locally() {
    let temp_dir = TempDir::new().unwrap();
    let (model, calls) = model_with_stub();
    let pixels = Array3::<u8>::zeros((4, 4, 3));

    let result = model
        .infer(&Source::from(pixels), &config(temp_dir.path(), false))
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_null_source_is_invalid_argument() {
    let temp_dir = TempDir::new().unwrap();
    let (model, _) = model_with_stub();

    let err = model
        .infer_value(&Value::Null, &config(temp_dir.path(), false))
        .await
        .unwrap_err();
    assert!(matches!(err, VizorError::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_missing_backend_is_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let model = Model::new().unwrap();
    let config = Configuration::builder()
        .backend("no.such.Detector")
        .model_path(temp_dir.path())
        .cache_path(temp_dir.path())
        .build();

    let err = model
        .infer(&Source::parse(&png_base64()).unwrap(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, VizorError::BackendUnavailable { .. }));
}

#[tokio::test]
async fn test_backend_failure_is_inference_error() {
    struct Broken;
    impl DetectionBackend for Broken {
        fn infer(&self, _image: &Array3<u8>) -> anyhow::Result<RawDetections> {
            anyhow::bail!("graph exploded")
        }
    }

    let temp_dir = TempDir::new().unwrap();
    let model = Model::new().unwrap();
    model.registry().register_factory(
        "onnx",
        Arc::new(|_spec: &BackendSpec| -> anyhow::Result<Arc<dyn DetectionBackend>> {
            Ok(Arc::new(Broken))
        }),
    );

    let err = model
        .infer(&Source::parse(&png_base64()).unwrap(), &config(temp_dir.path(), true))
        .await
        .unwrap_err();
    assert!(matches!(err, VizorError::Inference { ref message } if message.contains("graph exploded")));
}

#[tokio::test]
async fn test_remote_error_carries_reason() {
    let app = Router::new().route(
        "/infer",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"reason": "bad source"})),
            )
        }),
    );
    let base = serve(app).await;
    let temp_dir = TempDir::new().unwrap();
    let model = Model::new().unwrap();
    let config = Configuration::builder()
        .endpoint(Some(format!("{}/infer", base)))
        .model_path(temp_dir.path())
        .cache_path(temp_dir.path())
        .build();

    let err = model
        .infer(&Source::parse("https://example.com/a.jpg").unwrap(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, VizorError::RemoteInference { ref reason } if reason == "bad source"));
    assert_eq!(err.to_string(), "bad source");
}

#[tokio::test]
async fn test_remote_unexpected_status_carries_body() {
    let app = Router::new().route(
        "/infer",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "try later") }),
    );
    let base = serve(app).await;
    let temp_dir = TempDir::new().unwrap();
    let config = Configuration::builder()
        .endpoint(Some(format!("{}/infer", base)))
        .model_path(temp_dir.path())
        .cache_path(temp_dir.path())
        .build();

    let err = Model::new()
        .unwrap()
        .infer(&Source::parse("s3://bucket/a.jpg").unwrap(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, VizorError::RemoteInference { ref reason } if reason == "try later"));
}

type Recorded = Arc<Mutex<Option<Value>>>;

/// Endpoint answering one fixed prediction and keeping the request body.
async fn recording_endpoint() -> (String, Recorded) {
    let seen: Recorded = Arc::new(Mutex::new(None));
    let app = Router::new()
        .route(
            "/infer",
            post(|State(seen): State<Recorded>, Json(body): Json<Value>| async move {
                *seen.lock().unwrap() = Some(body);
                Json(json!({"predictions": [[0.0, 0.5, 0.1, 0.2, 0.3, 0.4]]}))
            }),
        )
        .with_state(seen.clone());
    (serve(app).await, seen)
}

#[tokio::test]
async fn test_remote_payload_flattens_configuration() {
    let (base, seen) = recording_endpoint().await;
    let temp_dir = TempDir::new().unwrap();
    let config = Configuration::builder()
        .endpoint(Some(format!("{}/infer", base)))
        .model("custom_model")
        .cache(true)
        .cache_id("shared")
        .model_path(temp_dir.path())
        .cache_path(temp_dir.path())
        .build();
    let pixels = Array3::<u8>::from_elem((2, 2, 3), 255);

    let result: Predictions = Model::new()
        .unwrap()
        .infer(&Source::from(pixels.clone()), &config)
        .await
        .unwrap();
    assert_eq!(result.len(), 1);

    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "custom_model");
    assert_eq!(body["cache"], true);
    assert_eq!(body["cache_id"], "shared");
    assert_eq!(body["source"]["dtype"], "uint8");
    assert_eq!(body["source"]["shape"], json!([2, 2, 3]));
    assert_eq!(
        Source::from_value(&body["source"]).unwrap(),
        Source::from(pixels)
    );
    // remote delegation never touches the local cache
    assert!(!temp_dir.path().join("shared").exists());
}

#[tokio::test]
async fn test_remote_payload_leaves_local_defaults_to_server() {
    let (base, seen) = recording_endpoint().await;
    let config = Configuration::builder()
        .endpoint(Some(format!("{}/infer", base)))
        .backend("onnx")
        .build();

    Model::new()
        .unwrap()
        .infer(&Source::parse("https://example.com/a.jpg").unwrap(), &config)
        .await
        .unwrap();

    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["source"], "https://example.com/a.jpg");
    assert_eq!(body["backend"], "onnx");
    for field in ["model", "model_path", "cache", "cache_path", "cache_id", "timeout_secs"] {
        assert!(body.get(field).is_none(), "{field} should not be sent");
    }
}

#[tokio::test]
async fn test_slow_remote_endpoint_times_out() {
    let app = Router::new().route(
        "/infer",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({"predictions": []}))
        }),
    );
    let base = serve(app).await;
    let temp_dir = TempDir::new().unwrap();
    let config = Configuration::builder()
        .endpoint(Some(format!("{}/infer", base)))
        .model_path(temp_dir.path())
        .cache_path(temp_dir.path())
        .timeout_secs(1)
        .build();

    let started = Instant::now();
    let err = Model::new()
        .unwrap()
        .infer(&Source::parse("https://example.com/a.jpg").unwrap(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, VizorError::Network { ref message } if message.contains("timed out")));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_http_source_fetch_error_surfaces() {
    let app = Router::new().route("/missing.jpg", get(|| async { StatusCode::NOT_FOUND }));
    let base = serve(app).await;
    let temp_dir = TempDir::new().unwrap();
    let (model, calls) = model_with_stub();

    let err = model
        .infer(
            &Source::parse(&format!("{}/missing.jpg", base)).unwrap(),
            &config(temp_dir.path(), true),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, VizorError::SourceFetch { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
