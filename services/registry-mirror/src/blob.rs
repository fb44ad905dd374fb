//! Blob delivery, with single-range support for resumable downloads

use std::io::SeekFrom;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt as _;
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};
use tokio_util::io::ReaderStream;

use crate::error::{MirrorError, MirrorResult};
use crate::range::{RangeSpec, parse_range};
use crate::route::BlobRequest;
use crate::storage::{MirrorStorage, ResolvedFile, normalize_digest};

/// Read size used when streaming blob bodies.
const CHUNK_SIZE: usize = 64 * 1024;

/// Get a blob
///
/// `location` is echoed back in the `Location` header, which some clients
/// expect on blob responses.
pub(crate) async fn get_blob(
    storage: &MirrorStorage,
    request: &BlobRequest,
    headers: &HeaderMap,
    location: &str,
) -> MirrorResult<Response> {
    // Existence first: range arithmetic needs the real size.
    let file = storage.blob(&request.digest).await?;

    let range = headers
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap_or_default());

    deliver_blob(&file, &normalize_digest(&request.digest), range, location).await
}

/// Build the response for an existing blob.
///
/// Without a `Range` the whole file is sent with `200 OK`; with a satisfiable
/// range exactly that window is sent with `206 Partial Content`. Bodies are
/// streamed from disk.
#[tracing::instrument(skip(file), fields(path = %file.path, size = file.size))]
pub async fn deliver_blob(
    file: &ResolvedFile,
    filename: &str,
    range: Option<&str>,
    location: &str,
) -> MirrorResult<Response> {
    let range = match range {
        Some(value) => Some(
            parse_range(value, file.size)
                .map_err(|_| MirrorError::RangeNotSatisfiable { size: file.size })?,
        ),
        None => None,
    };

    let (status, length) = match range {
        Some(range) => (StatusCode::PARTIAL_CONTENT, range.len()),
        None => (StatusCode::OK, file.size),
    };

    let body = stream_file(file, range).await?;
    let mut response = (status, body).into_response();

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(range) = range {
        insert_str(headers, header::CONTENT_RANGE, &range.content_range(file.size));
    }
    insert_str(
        headers,
        header::CONTENT_DISPOSITION,
        &format!("attachment; filename={filename}"),
    );
    insert_str(headers, header::LOCATION, location);

    Ok(response)
}

fn insert_str(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::debug!(%name, "Dropping header with unrepresentable value"),
    }
}

/// Open `file` and stream it from the start of `range`, or whole.
///
/// Dropping the body (e.g. on client disconnect) closes the file.
async fn stream_file(file: &ResolvedFile, range: Option<RangeSpec>) -> MirrorResult<Body> {
    let mut handle = tokio::fs::File::open(&file.path).await?;

    let length = match range {
        Some(range) => {
            handle.seek(SeekFrom::Start(range.start())).await?;
            range.len()
        }
        None => file.size,
    };

    let path = file.path.clone();
    let stream = ReaderStream::with_capacity(handle.take(length), CHUNK_SIZE).inspect_err(
        move |error| {
            tracing::warn!(%path, %error, "Blob stream aborted");
        },
    );

    Ok(Body::from_stream(stream))
}
