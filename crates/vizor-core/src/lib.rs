//! Vizor Core - cacheable, backend-agnostic object detection inference.
//!
//! Hands an image reference (base64 bytes, an `http(s)` or `s3` URL, a local
//! path, or an in-memory tensor) to a pluggable detection backend and
//! returns normalized detections. Results can be cached on disk, and a
//! configuration with an HTTP endpoint delegates the whole call to a remote
//! server instead.
//!
//! # Example
//!
//! ```rust,ignore
//! use vizor_core::{Configuration, Model, Source};
//!
//! #[tokio::main]
//! async fn main() -> vizor_core::Result<()> {
//!     let model = Model::new()?;
//!     let config = Configuration::builder().cache(true).build();
//!
//!     let source = Source::parse("https://example.com/street.jpg")?;
//!     let result = model.infer(&source, &config).await?;
//!     println!("Found {} objects", result.len());
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod codec;
pub mod config;
pub mod configuration;
pub mod detection;
pub mod error;
pub mod model;
pub mod network;
pub mod platform;
pub mod source;

// Re-export commonly used types
pub use backend::{
    ArtifactFetcher, BackendFactory, BackendRegistry, BackendSpec, DetectionBackend,
    RawDetections,
};
pub use cache::{CacheKey, CacheStore, Purpose};
pub use codec::{Decoded, NdArray};
pub use configuration::{Configuration, ConfigurationBuilder, Credentials};
pub use detection::{Detection, Predictions};
pub use error::{Result, VizorError};
pub use model::Model;
pub use source::{Source, SourceResolver};
