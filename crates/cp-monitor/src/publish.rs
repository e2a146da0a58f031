//! HTTP publish through the broker API.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

#[derive(clap::Args, Debug)]
pub struct PublishArgs {
    /// Topic destination, e.g. /topic/groups/g1/checkpoints
    #[arg(long)]
    pub destination: String,
    /// JSON payload
    #[arg(long)]
    pub payload: String,
    /// Broker API base URL
    #[arg(long, default_value = "http://localhost:8080/api")]
    pub api: String,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    destination: &'a str,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    delivered: usize,
}

/// POST the event and return how many subscriptions it reached.
pub async fn run(args: &PublishArgs) -> Result<usize> {
    let payload: Value =
        serde_json::from_str(&args.payload).context("--payload is not valid JSON")?;
    let url = format!("{}/publish", args.api.trim_end_matches('/'));

    info!(destination = %args.destination, %url, "Publishing");

    let resp = reqwest::Client::new()
        .post(&url)
        .json(&PublishRequest {
            destination: &args.destination,
            payload,
        })
        .send()
        .await
        .context("Failed to send publish request")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Publish failed ({}): {}", status, body);
    }

    let published: PublishResponse = resp
        .json()
        .await
        .context("Failed to parse publish response")?;

    info!(delivered = published.delivered, "Published");
    Ok(published.delivered)
}
