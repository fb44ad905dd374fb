//! # Read-only registry mirror
//!
//! Serves blobs and manifests from a local model store over the registry HTTP
//! v2 API, so registry clients can pull from a machine that already holds the
//! content.
//!
//! ## Features
//!
//! - Blob downloads with single `Range` support for resumable pulls
//! - Manifest lookup across every namespace root of the store, or a fixed one
//! - Host name and client allow-list filtering ahead of any lookup
//! - Builder producing a plain [`axum::Router`]
//!
//! ## Example
//!
//! ```no_run
//! use registry_mirror::{MirrorBuilder, MirrorConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = MirrorConfig::new("/srv/ollama/models");
//! config.required_host = Some("mirror.local".into());
//!
//! let mirror = MirrorBuilder::new(config).build();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, mirror).await?;
//! # Ok(())
//! # }
//! ```

pub mod access;
mod api;
mod blob;
mod config;
mod error;
mod manifest;
pub mod range;
pub mod route;
pub mod storage;

pub use api::MirrorBuilder;
pub use blob::deliver_blob;
pub use config::{ConfigLayer, ManifestSearch, MirrorConfig, OLLAMA_NAMESPACE};
pub use error::{MirrorError, MirrorResult};
pub use manifest::deliver_manifest;
