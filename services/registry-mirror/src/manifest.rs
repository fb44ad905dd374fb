//! Manifest delivery

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::error::MirrorResult;
use crate::route::ManifestRequest;
use crate::storage::{MirrorStorage, ResolvedFile};

/// Largest manifest read whole to detect its media type. Matches the limit
/// registries place on manifest uploads; anything bigger is streamed as-is.
const MAX_INLINE_MANIFEST: u64 = 4 * 1024 * 1024;

/// Get a manifest
pub(crate) async fn get_manifest(
    storage: &MirrorStorage,
    request: &ManifestRequest,
) -> MirrorResult<Response> {
    let file = storage.manifest(&request.repository, &request.tag).await?;
    deliver_manifest(&file).await
}

/// Send a resolved manifest, labelled with the media type it declares.
pub async fn deliver_manifest(file: &ResolvedFile) -> MirrorResult<Response> {
    if file.size > MAX_INLINE_MANIFEST {
        tracing::debug!(path = %file.path, size = file.size, "Streaming oversized manifest");
        let handle = tokio::fs::File::open(&file.path).await?;
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
                (header::CONTENT_LENGTH, HeaderValue::from(file.size)),
            ],
            Body::from_stream(ReaderStream::new(handle)),
        )
            .into_response());
    }

    let data = tokio::fs::read(&file.path).await?;
    let content_type = detect_manifest_type(&data);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        data,
    )
        .into_response())
}

/// Detect manifest type from content
fn detect_manifest_type(data: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Some(media_type) = json.get("mediaType").and_then(|v| v.as_str()) {
            return media_type.to_string();
        }

        if let Some(schema_version) = json.get("schemaVersion").and_then(|v| v.as_u64()) {
            return match schema_version {
                1 => "application/vnd.docker.distribution.manifest.v1+json".to_string(),
                2 if json.get("manifests").is_some() => {
                    "application/vnd.oci.image.index.v1+json".to_string()
                }
                _ => "application/vnd.oci.image.manifest.v1+json".to_string(),
            };
        }

        return "application/json".to_string();
    }

    "application/octet-stream".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn media_type_from_document() {
        let manifest = br#"{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json","layers":[]}"#;
        assert_eq!(
            detect_manifest_type(manifest),
            "application/vnd.docker.distribution.manifest.v2+json"
        );
    }

    #[test]
    fn media_type_from_schema_version() {
        assert_eq!(
            detect_manifest_type(br#"{"schemaVersion":2,"layers":[]}"#),
            "application/vnd.oci.image.manifest.v1+json"
        );
        assert_eq!(
            detect_manifest_type(br#"{"schemaVersion":2,"manifests":[]}"#),
            "application/vnd.oci.image.index.v1+json"
        );
        assert_eq!(
            detect_manifest_type(br#"{"schemaVersion":1}"#),
            "application/vnd.docker.distribution.manifest.v1+json"
        );
    }

    #[test]
    fn media_type_fallbacks() {
        assert_eq!(detect_manifest_type(br#"{"hello":"world"}"#), "application/json");
        assert_eq!(detect_manifest_type(b"\x00\x01binary"), "application/octet-stream");
    }

    async fn manifest_file(dir: &tempfile::TempDir, contents: &[u8]) -> ResolvedFile {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("big")).unwrap();
        tokio::fs::write(&path, contents).await.unwrap();
        ResolvedFile::locate(path).await.unwrap().unwrap()
    }

    /// A JSON manifest padded with trailing whitespace to exactly `size` bytes.
    fn padded_manifest(size: usize) -> Vec<u8> {
        let mut manifest =
            br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json"}"#
                .to_vec();
        manifest.resize(size, b' ');
        manifest
    }

    #[tokio::test]
    async fn oversized_manifest_is_streamed_untyped() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = padded_manifest(MAX_INLINE_MANIFEST as usize + 1);
        let file = manifest_file(&dir, &manifest).await;

        let response = deliver_manifest(&file).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            (MAX_INLINE_MANIFEST + 1).to_string().as_str()
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], &manifest[..]);
    }

    #[tokio::test]
    async fn manifest_at_limit_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = padded_manifest(MAX_INLINE_MANIFEST as usize);
        let file = manifest_file(&dir, &manifest).await;

        let response = deliver_manifest(&file).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.oci.image.manifest.v1+json"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.len() as u64, MAX_INLINE_MANIFEST);
        assert_eq!(&body[..], &manifest[..]);
    }

    #[tokio::test]
    async fn deliver_declared_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("latest")).unwrap();
        let manifest = br#"{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json"}"#;
        tokio::fs::write(&path, manifest).await.unwrap();
        let file = ResolvedFile::locate(path).await.unwrap().unwrap();

        let response = deliver_manifest(&file).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.docker.distribution.manifest.v2+json"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], &manifest[..]);
    }
}
