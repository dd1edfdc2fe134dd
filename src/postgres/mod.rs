pub mod sink;
pub mod watermark;

pub use sink::PgRowSink;
pub use watermark::PgWatermarkStore;

use anyhow::{Context, Result};
use tokio_postgres::Client;

use crate::utils::sanitize_url;

/// Open a connection to the warehouse and spawn its connection driver.
pub async fn connect(url: &str) -> Result<Client> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .context("failed to build TLS connector")?;
    let tls = postgres_native_tls::MakeTlsConnector::new(tls);

    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .with_context(|| format!("failed to connect to PostgreSQL at '{}'", sanitize_url(url)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    tracing::debug!("Connected to PostgreSQL at {}", sanitize_url(url));
    Ok(client)
}
