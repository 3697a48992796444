//! Resolution of [`Source`]s to pixel tensors.

use super::s3::{ObjectFetcher, S3Fetcher};
use super::{into_pixels, truncate, Source};
use crate::cache::{CacheKey, CacheStore, Purpose};
use crate::codec::{self, NdArray};
use crate::configuration::Configuration;
use crate::network::{DownloadManager, HttpClient};
use crate::{Result, VizorError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ndarray::Array3;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns any [`Source`] into an `(height, width, 3)` `u8` array.
#[derive(Clone)]
pub struct SourceResolver {
    http: HttpClient,
    objects: Arc<dyn ObjectFetcher>,
}

impl SourceResolver {
    pub fn new(http: HttpClient) -> Self {
        Self::with_fetcher(http, Arc::new(S3Fetcher))
    }

    /// Use a custom object-store fetcher.
    pub fn with_fetcher(http: HttpClient, objects: Arc<dyn ObjectFetcher>) -> Self {
        Self { http, objects }
    }

    /// Resolve `source`, consulting `cache` under the `source` purpose for
    /// anything that is not already a tensor.
    pub async fn resolve(
        &self,
        source: &Source,
        config: &Configuration,
        cache: &CacheStore,
    ) -> Result<Array3<u8>> {
        if let Source::Tensor(pixels) = source {
            return Ok(pixels.clone());
        }

        let key = CacheKey::new(&source.identity(), Purpose::Source);
        let cached = cache
            .load(&key, |value| {
                codec::try_decode(&value).and_then(|array| into_pixels(array, "cache").ok())
            })
            .await;
        if let Some(pixels) = cached {
            debug!("Resolved {} source from cache", source.kind());
            return Ok(pixels);
        }

        let pixels = self.fetch(source, config).await?;
        let encoded = pixels.clone();
        cache
            .store(&key, move || codec::encode(&NdArray::from(encoded.into_dyn())))
            .await;
        Ok(pixels)
    }

    async fn fetch(&self, source: &Source, config: &Configuration) -> Result<Array3<u8>> {
        match source {
            Source::Tensor(pixels) => Ok(pixels.clone()),
            Source::Base64(literal) => {
                info!("Creating image from base64 string...");
                let bytes = decode_base64(literal).map_err(|e| VizorError::SourceDecode {
                    source_ref: truncate(literal),
                    message: format!("invalid base64: {}", e),
                })?;
                decode_image_blocking(bytes, truncate(literal)).await
            }
            Source::ObjectStore { uri, bucket, key } => {
                info!("Downloading image from object store: {}", uri);
                let bytes = self
                    .objects
                    .fetch(bucket, key, config)
                    .await
                    .map_err(|e| VizorError::SourceFetch {
                        source_ref: uri.clone(),
                        message: e.to_string(),
                    })?;
                decode_image_blocking(bytes, uri.clone()).await
            }
            Source::Http(url) => {
                info!("Downloading image from URL: {}", url);
                let bytes = self.fetch_http(url, config).await?;
                decode_image_blocking(bytes, url.clone()).await
            }
            Source::File { literal, path } => {
                info!("Loading image from file: {}", path.display());
                let bytes = read_file(path).await.map_err(|e| VizorError::SourceFetch {
                    source_ref: literal.clone(),
                    message: e.to_string(),
                })?;
                decode_image_blocking(bytes, literal.clone()).await
            }
        }
    }

    /// Stream the body to a scratch file, then read it back.
    async fn fetch_http(&self, url: &str, config: &Configuration) -> Result<Vec<u8>> {
        let fetch_error = |message: String| VizorError::SourceFetch {
            source_ref: url.to_string(),
            message,
        };

        let downloads = DownloadManager::with_client(self.http.clone(), config.timeout());
        let mut scratch = tempfile::NamedTempFile::new().map_err(|e| fetch_error(e.to_string()))?;

        downloads
            .download_to(url, scratch.as_file_mut())
            .await
            .map_err(|e| match e {
                VizorError::Network { message } => fetch_error(message),
                other => fetch_error(other.to_string()),
            })?;

        let mut bytes = Vec::new();
        scratch
            .reopen()
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes)
    }
}

async fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    tokio::fs::read(path).await
}

fn decode_base64(literal: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let payload = match literal.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => literal,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact)
}

async fn decode_image_blocking(bytes: Vec<u8>, source_ref: String) -> Result<Array3<u8>> {
    let fallback_ref = source_ref.clone();
    tokio::task::spawn_blocking(move || decode_image(&bytes, &source_ref))
        .await
        .map_err(|e| VizorError::SourceDecode {
            source_ref: fallback_ref,
            message: format!("decoder task failed: {}", e),
        })?
}

/// Decode image container bytes (JPEG, PNG, ...) into RGB pixels.
pub fn decode_image(bytes: &[u8], source_ref: &str) -> Result<Array3<u8>> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| VizorError::SourceDecode {
            source_ref: source_ref.to_string(),
            message: e.to_string(),
        })?
        .to_rgb8();

    let (width, height) = image.dimensions();
    Array3::from_shape_vec((height as usize, width as usize, 3), image.into_raw()).map_err(|e| {
        VizorError::SourceDecode {
            source_ref: source_ref.to_string(),
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchError;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_fn(4, 2, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 200]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn expected_pixels() -> Array3<u8> {
        Array3::from_shape_fn((2, 4, 3), |(y, x, c)| match c {
            0 => x as u8 * 10,
            1 => y as u8 * 20,
            _ => 200,
        })
    }

    fn config(cache_dir: &Path) -> Configuration {
        Configuration::builder()
            .cache(true)
            .cache_path(cache_dir)
            .cache_id("test")
            .model_path(cache_dir.join("models"))
            .timeout_secs(5)
            .build()
    }

    fn resolver() -> SourceResolver {
        SourceResolver::new(HttpClient::new().unwrap())
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
    async fn test_base64_source() {
        let temp_dir = TempDir::new().unwrap();
        let source = Source::parse(&BASE64.encode(png_bytes())).unwrap();
        let pixels = resolver()
            .resolve(&source, &config(temp_dir.path()), &CacheStore::disabled())
            .await
            .unwrap();
        assert_eq!(pixels, expected_pixels());
    }

    #[tokio::test]
    async fn test_data_url_source() {
        let temp_dir = TempDir::new().unwrap();
        let literal = format!("data:image/png;base64,{}", BASE64.encode(png_bytes()));
        let pixels = resolver()
            .resolve(
                &Source::parse(&literal).unwrap(),
                &config(temp_dir.path()),
                &CacheStore::disabled(),
            )
            .await
            .unwrap();
        assert_eq!(pixels.shape(), &[2, 4, 3]);
    }

    #[tokio::test]
    async fn test_invalid_base64_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = resolver()
            .resolve(
                &Source::Base64("not an image!".into()),
                &config(temp_dir.path()),
                &CacheStore::disabled(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VizorError::SourceDecode { .. }));

        let err = resolver()
            .resolve(
                &Source::Base64(BASE64.encode(b"plain text")),
                &config(temp_dir.path()),
                &CacheStore::disabled(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VizorError::SourceDecode { .. }));
    }

    #[tokio::test]
    async fn test_file_source_and_determinism() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("image.png");
        std::fs::write(&path, png_bytes()).unwrap();
        let source = Source::parse(&path.to_string_lossy()).unwrap();
        let config = config(temp_dir.path());

        let first = resolver()
            .resolve(&source, &config, &CacheStore::disabled())
            .await
            .unwrap();
        let second = resolver()
            .resolve(&source, &config, &CacheStore::disabled())
            .await
            .unwrap();
        assert_eq!(first, expected_pixels());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = Source::parse("file:///definitely/not/here.png").unwrap();
        let err = resolver()
            .resolve(&source, &config(temp_dir.path()), &CacheStore::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, VizorError::SourceFetch { .. }));
    }

    #[tokio::test]
    async fn test_http_source_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/image.png",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    png_bytes()
                }
            }),
        );
        let base = serve(app).await;
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path());
        let cache = CacheStore::new(&config);
        let source = Source::parse(&format!("{}/image.png", base)).unwrap();

        let first = resolver().resolve(&source, &config, &cache).await.unwrap();
        let second = resolver().resolve(&source, &config, &cache).await.unwrap();

        assert_eq!(first, expected_pixels());
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_error_status_names_url_and_status() {
        let app = Router::new().route("/gone.png", get(|| async { StatusCode::NOT_FOUND }));
        let base = serve(app).await;
        let temp_dir = TempDir::new().unwrap();
        let url = format!("{}/gone.png", base);

        let err = resolver()
            .resolve(
                &Source::parse(&url).unwrap(),
                &config(temp_dir.path()),
                &CacheStore::disabled(),
            )
            .await
            .unwrap_err();

        match err {
            VizorError::SourceFetch { source_ref, message } => {
                assert_eq!(source_ref, url);
                assert!(message.contains("404"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct StaticFetcher(std::result::Result<Vec<u8>, &'static str>);

    #[async_trait]
    impl ObjectFetcher for StaticFetcher {
        async fn fetch(
            &self,
            _bucket: &str,
            key: &str,
            _config: &Configuration,
        ) -> std::result::Result<Vec<u8>, FetchError> {
            match &self.0 {
                Ok(bytes) => Ok(bytes.clone()),
                Err(_) => Err(FetchError::NotFound(key.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_object_store_source() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = SourceResolver::with_fetcher(
            HttpClient::new().unwrap(),
            Arc::new(StaticFetcher(Ok(png_bytes()))),
        );
        let pixels = resolver
            .resolve(
                &Source::parse("s3://bucket/image.png").unwrap(),
                &config(temp_dir.path()),
                &CacheStore::disabled(),
            )
            .await
            .unwrap();
        assert_eq!(pixels, expected_pixels());
    }

    #[tokio::test]
    async fn test_object_store_failure_is_fetch_error() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = SourceResolver::with_fetcher(
            HttpClient::new().unwrap(),
            Arc::new(StaticFetcher(Err("missing"))),
        );
        let err = resolver
            .resolve(
                &Source::parse("s3://bucket/image.png").unwrap(),
                &config(temp_dir.path()),
                &CacheStore::disabled(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VizorError::SourceFetch { ref source_ref, .. } if source_ref == "s3://bucket/image.png"));
        assert!(err.to_string().contains("object not found"));
    }

    #[tokio::test]
    async fn test_tensor_passes_through() {
        let temp_dir = TempDir::new().unwrap();
        let pixels = Array3::<u8>::ones((3, 3, 3));
        let resolved = resolver()
            .resolve(
                &Source::from(pixels.clone()),
                &config(temp_dir.path()),
                &CacheStore::disabled(),
            )
            .await
            .unwrap();
        assert_eq!(resolved, pixels);
    }
}
