//! Read-only view of the on-disk model store
//!
//! The layout is owned by whatever populated the store:
//!
//! ```text
//! {root}/blobs/{algorithm}-{hex}
//! {root}/manifests/{namespace root}/{repository...}/{tag}
//! ```

use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{ManifestSearch, MirrorConfig};
use crate::error::{MirrorError, MirrorResult};
use crate::route::RepositoryName;

/// Map a wire digest (`sha256:abcd`) to its on-disk file name (`sha256-abcd`).
pub fn normalize_digest(digest: &str) -> String {
    digest.replace(':', "-")
}

/// Path of a blob, without checking that it exists.
pub fn resolve_blob_path(storage_root: &Utf8Path, digest: &str) -> Utf8PathBuf {
    let mut path = storage_root.join("blobs");
    path.push(normalize_digest(digest));
    path
}

/// Path of a manifest inside one namespace root, without checking that it
/// exists.
pub fn resolve_manifest_path(
    storage_root: &Utf8Path,
    namespace_root: &str,
    repository: &RepositoryName,
    tag: &str,
) -> Utf8PathBuf {
    let mut path = storage_root.join("manifests");
    path.push(namespace_root);
    for segment in repository.segments() {
        path.push(segment);
    }
    path.push(tag);
    path
}

/// A file that existed when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Absolute path of the file
    pub path: Utf8PathBuf,

    /// Size in bytes at resolution time
    pub size: u64,
}

impl ResolvedFile {
    /// Check that `path` is a regular file. Missing files and directories
    /// resolve to `None`.
    pub async fn locate(path: Utf8PathBuf) -> io::Result<Option<Self>> {
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(Self {
                path,
                size: metadata.len(),
            })),
            Ok(_) => Ok(None),
            Err(error) if is_missing(&error) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

fn is_missing(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Mirror storage backend
#[derive(Clone, Debug)]
pub struct MirrorStorage {
    root: Utf8PathBuf,
    manifest_search: ManifestSearch,
}

impl MirrorStorage {
    /// Create a new mirror storage
    pub fn new(root: Utf8PathBuf, manifest_search: ManifestSearch) -> Self {
        Self {
            root,
            manifest_search,
        }
    }

    /// Storage root
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Find a blob by wire digest.
    #[tracing::instrument(skip(self))]
    pub async fn blob(&self, digest: &str) -> MirrorResult<ResolvedFile> {
        let path = resolve_blob_path(&self.root, digest);
        ResolvedFile::locate(path)
            .await?
            .ok_or_else(|| MirrorError::BlobNotFound(digest.to_string()))
    }

    /// Find a manifest according to the configured [`ManifestSearch`].
    ///
    /// With [`ManifestSearch::Scan`] the namespace roots are visited in the
    /// order the filesystem lists them and the first root holding
    /// `{repository}/{tag}` wins. That order is not stable across platforms or
    /// filesystems, so a repository/tag present under two roots may resolve
    /// differently on different hosts.
    #[tracing::instrument(skip(self, repository), fields(%repository))]
    pub async fn manifest(
        &self,
        repository: &RepositoryName,
        tag: &str,
    ) -> MirrorResult<ResolvedFile> {
        let not_found = || MirrorError::ManifestNotFound(format!("{repository}:{tag}"));

        let roots = match &self.manifest_search {
            ManifestSearch::Namespace(namespace) => vec![namespace.clone()],
            ManifestSearch::Scan => self.namespace_roots().await?,
        };

        for root in &roots {
            let candidate = resolve_manifest_path(&self.root, root, repository, tag);
            if let Some(file) = ResolvedFile::locate(candidate).await? {
                tracing::debug!(namespace = %root, path = %file.path, "Resolved manifest");
                return Ok(file);
            }
        }

        Err(not_found())
    }

    /// List the namespace roots under `{root}/manifests`, in directory
    /// listing order. Read fresh on every call.
    pub async fn namespace_roots(&self) -> MirrorResult<Vec<String>> {
        let manifests = self.root.join("manifests");
        let mut entries = match tokio::fs::read_dir(&manifests).await {
            Ok(entries) => entries,
            Err(error) if is_missing(&error) => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut roots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // Follow symlinks, so a linked namespace counts as a directory.
            let is_dir = match tokio::fs::metadata(entry.path()).await {
                Ok(metadata) => metadata.is_dir(),
                Err(error) if is_missing(&error) => false,
                Err(error) => return Err(error.into()),
            };
            if !is_dir {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) => roots.push(name),
                Err(name) => tracing::debug!(?name, "Skipping non UTF-8 namespace root"),
            }
        }

        tracing::trace!("Found {} namespace roots", roots.len());
        Ok(roots)
    }
}

impl From<&MirrorConfig> for MirrorStorage {
    fn from(config: &MirrorConfig) -> Self {
        MirrorStorage::new(config.storage_root.clone(), config.manifest_search.clone())
    }
}
