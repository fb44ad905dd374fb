//! Basic registry mirror example
//!
//! Run with: cargo run -p registry-mirror --example basic_server -- /path/to/models

use registry_mirror::{MirrorBuilder, MirrorConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let root = std::env::args()
        .nth(1)
        .ok_or("usage: basic_server <storage root>")?;

    // Serve the store with no filtering
    let app = MirrorBuilder::new(MirrorConfig::new(root)).build();

    // Bind to address
    let addr = "127.0.0.1:5000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Registry mirror listening on http://{}", addr);
    tracing::info!("Try: curl http://{}/v2/library/llama3/manifests/latest", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
