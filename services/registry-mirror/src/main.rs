//! Command line entry point for the registry mirror.
//!
//! Settings precedence lives in [`ConfigLayer`]; this binary only parses flags
//! and the TOML file into layers. Its own tests need the `cli` feature.

use std::net::SocketAddr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use eyre::{Context, eyre};
use registry_mirror::{ConfigLayer, ManifestSearch, MirrorBuilder, MirrorConfig};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Serve a local model store as a read-only registry.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file. Flags take precedence over its values.
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Root of the model store (holding `blobs/` and `manifests/`).
    #[arg(long, env = "OLLAMA_MODELS")]
    storage_root: Option<Utf8PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Only answer requests addressed to this host name.
    #[arg(long)]
    required_host: Option<String>,

    /// Only answer known registry clients, by User-Agent.
    #[arg(long)]
    client_allowlist: bool,

    /// Serve manifests from this namespace root only, instead of scanning all.
    #[arg(long)]
    manifest_namespace: Option<String>,
}

impl Args {
    /// The settings given on the command line (or through the environment).
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            storage_root: self.storage_root.clone(),
            listen: self.listen,
            required_host: self.required_host.clone(),
            client_allowlist: self.client_allowlist,
            manifest_search: self.manifest_namespace.clone().map(ManifestSearch::Namespace),
        }
    }
}

/// Read the `--config` file. Every key is optional.
fn read_config_file(path: &Utf8Path) -> eyre::Result<ConfigLayer> {
    let contents =
        std::fs::read_to_string(path).wrap_err_with(|| format!("reading config file {path}"))?;
    toml_edit::de::from_str(&contents).wrap_err_with(|| format!("parsing config file {path}"))
}

const DEFAULT_LISTEN: &str = "0.0.0.0:80";

/// `~/.ollama/models`, where Ollama keeps its store by default.
fn default_storage_root() -> eyre::Result<Utf8PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| eyre!("no home directory; pass --storage-root"))?;
    let home = Utf8PathBuf::from_path_buf(home)
        .map_err(|path| eyre!("home directory is not UTF-8: {}", path.display()))?;
    Ok(home.join(".ollama").join("models"))
}

fn resolve(args: Args) -> eyre::Result<(MirrorConfig, SocketAddr)> {
    let file = match &args.config {
        Some(path) => read_config_file(path)?,
        None => ConfigLayer::default(),
    };
    let layer = args.layer().over(file);

    let listen = match layer.listen {
        Some(addr) => addr,
        None => DEFAULT_LISTEN.parse().wrap_err("default listen address")?,
    };

    let config = layer.into_config(default_storage_root)?;
    Ok((config, listen))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, listen) = resolve(args)?;

    tracing::info!(storage_root = %config.storage_root, "Serving model store");
    if let Some(host) = &config.required_host {
        tracing::info!(%host, "Requiring host name");
    }
    if config.client_allowlist {
        tracing::info!("Client allow-list enabled");
    }
    match &config.manifest_search {
        ManifestSearch::Scan => tracing::info!("Scanning all manifest namespaces"),
        ManifestSearch::Namespace(namespace) => {
            tracing::info!(%namespace, "Serving manifests from a single namespace")
        }
    }

    let app = MirrorBuilder::new(config).build();

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .wrap_err_with(|| format!("binding {listen}"))?;
    tracing::info!("Registry mirror listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("serving registry mirror")?;

    Ok(())
}
