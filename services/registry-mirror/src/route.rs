//! Parsing of registry wire paths into blob and manifest requests

use std::fmt;

use percent_encoding::percent_decode_str;

use crate::error::{MirrorError, MirrorResult};

/// A repository name as it appears on the wire, e.g. `library/llama3` or
/// `org/team/project`.
///
/// The first segment is the namespace; registries commonly nest repositories
/// below it, so the rest is kept as an ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryName {
    segments: Vec<String>,
}

impl RepositoryName {
    /// Build a repository name from already-decoded segments.
    ///
    /// At least two segments (namespace and repository) are required, and every
    /// segment must be safe to use as a path component.
    pub fn new<I, S>(segments: I) -> MirrorResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.len() < 2 || !segments.iter().all(|s| is_safe_component(s)) {
            return Err(MirrorError::UnknownRoute(segments.join("/")));
        }
        Ok(Self { segments })
    }

    /// The first wire segment.
    pub fn namespace(&self) -> &str {
        &self.segments[0]
    }

    /// The segments after the namespace, joined with `/`.
    pub fn repository(&self) -> String {
        self.segments[1..].join("/")
    }

    /// All segments in wire order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// `GET /v2/{repository}/blobs/{digest}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRequest {
    /// Repository the blob was requested through. Blobs are shared across
    /// repositories on disk, so this only scopes the request.
    pub repository: RepositoryName,

    /// Digest in wire form, `algorithm:hex`.
    pub digest: String,
}

/// `GET /v2/{repository}/manifests/{tag}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRequest {
    /// Repository holding the manifest.
    pub repository: RepositoryName,

    /// Tag, used verbatim as the manifest file name.
    pub tag: String,
}

/// A request against the registry API below `/v2/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRoute {
    /// Blob download
    Blob(BlobRequest),

    /// Manifest download
    Manifest(ManifestRequest),
}

impl RegistryRoute {
    /// Parse a raw (still percent-encoded) request path such as
    /// `/v2/library/llama3/manifests/latest`.
    pub fn parse(path: &str) -> MirrorResult<Self> {
        let unknown = || MirrorError::UnknownRoute(path.to_string());

        let rest = path.strip_prefix("/v2/").ok_or_else(unknown)?;
        let mut segments = rest
            .split('/')
            .map(|segment| {
                percent_decode_str(segment)
                    .decode_utf8()
                    .map(|s| s.into_owned())
                    .map_err(|_| unknown())
            })
            .collect::<MirrorResult<Vec<_>>>()?;

        let reference = segments.pop().ok_or_else(unknown)?;
        let kind = segments.pop().ok_or_else(unknown)?;
        if !is_safe_component(&reference) {
            return Err(unknown());
        }

        let repository = RepositoryName::new(segments).map_err(|_| unknown())?;
        match kind.as_str() {
            "blobs" => Ok(RegistryRoute::Blob(BlobRequest {
                repository,
                digest: reference,
            })),
            "manifests" => Ok(RegistryRoute::Manifest(ManifestRequest {
                repository,
                tag: reference,
            })),
            _ => Err(unknown()),
        }
    }
}

/// True when `segment` can be joined onto a path without escaping it.
fn is_safe_component(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}
