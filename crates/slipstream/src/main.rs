//! The `slipstream-server` binary: bind the default port and serve.

use slipstream::{ServerError, SlipstreamServer};
use slipstream_protocol::DEFAULT_PORT;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = SlipstreamServer::builder()
        .bind(&format!("0.0.0.0:{DEFAULT_PORT}"))
        .build()
        .await?;

    if let Ok(addr) = server.local_addr() {
        tracing::info!(%addr, "listening");
    }
    server.run().await
}
