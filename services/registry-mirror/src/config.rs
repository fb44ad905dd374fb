//! Mirror configuration

use std::net::SocketAddr;

use camino::Utf8PathBuf;
use serde::Deserialize;

/// Namespace directory used by a stock Ollama model store.
pub const OLLAMA_NAMESPACE: &str = "registry.ollama.ai";

/// How manifests are located beneath `{storage_root}/manifests`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestSearch {
    /// Scan every namespace root and serve the first match.
    #[default]
    Scan,

    /// Only look inside a single namespace root.
    Namespace(String),
}

/// Immutable configuration shared by every request.
///
/// This is built once at startup (see the `registry-mirror` binary) and handed
/// to [`MirrorBuilder`](crate::MirrorBuilder); nothing downstream reads the
/// process environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MirrorConfig {
    /// Root of the on-disk store, holding `blobs/` and `manifests/`.
    pub storage_root: Utf8PathBuf,

    /// When set, requests must be addressed to this host name.
    #[serde(default)]
    pub required_host: Option<String>,

    /// Only admit known registry clients, by `User-Agent`.
    #[serde(default)]
    pub client_allowlist: bool,

    /// Manifest lookup strategy.
    #[serde(default)]
    pub manifest_search: ManifestSearch,
}

impl MirrorConfig {
    /// Configuration serving `storage_root` with every filter disabled.
    pub fn new(storage_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            required_host: None,
            client_allowlist: false,
            manifest_search: ManifestSearch::default(),
        }
    }
}

/// One source of settings (a config file, or the command line) where every
/// key is optional.
///
/// Layers are stacked with [`ConfigLayer::over`] and turned into the
/// immutable [`MirrorConfig`] once all sources are known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigLayer {
    /// Root of the on-disk store.
    pub storage_root: Option<Utf8PathBuf>,

    /// Address to listen on. Only used by the server binary.
    pub listen: Option<SocketAddr>,

    /// Required host name.
    pub required_host: Option<String>,

    /// Enable the client allow-list. Once any layer enables it, it stays on.
    #[serde(default)]
    pub client_allowlist: bool,

    /// Manifest lookup strategy.
    pub manifest_search: Option<ManifestSearch>,
}

impl ConfigLayer {
    /// Combine two layers, with values set in `self` winning over `lower`.
    pub fn over(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            storage_root: self.storage_root.or(lower.storage_root),
            listen: self.listen.or(lower.listen),
            required_host: self.required_host.or(lower.required_host),
            client_allowlist: self.client_allowlist || lower.client_allowlist,
            manifest_search: self.manifest_search.or(lower.manifest_search),
        }
    }

    /// Build the final configuration. `default_storage_root` is only called
    /// when no layer named a storage root.
    pub fn into_config<E>(
        self,
        default_storage_root: impl FnOnce() -> Result<Utf8PathBuf, E>,
    ) -> Result<MirrorConfig, E> {
        let storage_root = match self.storage_root {
            Some(root) => root,
            None => default_storage_root()?,
        };

        Ok(MirrorConfig {
            storage_root,
            required_host: self.required_host,
            client_allowlist: self.client_allowlist,
            manifest_search: self.manifest_search.unwrap_or_default(),
        })
    }
}
