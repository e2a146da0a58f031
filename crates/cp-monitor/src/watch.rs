//! Live watch: subscribe and print one JSON line per event.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use cp_client::{ClientOptions, RealtimeClient};
use cp_common::AppConfig;

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Lab id; subscribes to its checkpoints, groups and help queue
    #[arg(long = "lab")]
    pub labs: Vec<String>,
    /// Group id; subscribes to its checkpoints, status and help queue
    #[arg(long = "group")]
    pub groups: Vec<String>,
    /// Also watch the legacy /topic/group-updates stream
    #[arg(long)]
    pub legacy: bool,
    /// Broker endpoint, overrides CP__REALTIME__URL
    #[arg(long)]
    pub url: Option<String>,
}

/// One output line.
#[derive(Debug, Serialize)]
struct EventLine<'a, T: Serialize> {
    event: &'a str,
    received_at: DateTime<Utc>,
    data: &'a T,
}

fn render<T: Serialize>(event: &str, data: &T) -> serde_json::Result<String> {
    serde_json::to_string(&EventLine {
        event,
        received_at: Utc::now(),
        data,
    })
}

fn emit<T: Serialize>(event: &str, data: &T) {
    match render(event, data) {
        Ok(line) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
                warn!("Failed to write event: {}", e);
            }
        }
        Err(e) => warn!(event, "Failed to render event: {}", e),
    }
}

pub async fn run(config: &AppConfig, args: WatchArgs) -> Result<()> {
    if args.labs.is_empty() && args.groups.is_empty() && !args.legacy {
        anyhow::bail!("Nothing to watch: pass --lab, --group or --legacy");
    }

    let mut options =
        ClientOptions::from_config(&config.realtime).context("Invalid realtime configuration")?;
    if let Some(url) = &args.url {
        options.endpoint = Url::parse(url).with_context(|| format!("Invalid --url {}", url))?;
    }
    info!(endpoint = %options.endpoint, transport = ?options.transport, "Starting monitor");

    let client = RealtimeClient::new(options);

    client.add_status_listener(|state| info!(%state, "Connection state"));
    client.on_checkpoint_update(|update| emit("checkpoint", update));
    client.on_group_status_update(|update| emit("group_status", update));
    client.on_help_queue_update(|update| emit("help_queue", update));
    client.on_generic_update(|value| emit("legacy", value));

    for lab in &args.labs {
        client.subscribe_to_lab(lab);
    }
    for group in &args.groups {
        client.subscribe_to_group(group);
    }
    if args.legacy {
        client.subscribe_legacy();
    }
    info!(topics = client.topics().len(), "Watching; Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;

    info!("Shutting down");
    client.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_event_line() {
        let data = serde_json::json!({ "groupId": "g1" });
        let line = render("legacy", &data).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "legacy");
        assert_eq!(parsed["data"]["groupId"], "g1");
        assert!(parsed["received_at"].is_string());
        assert!(!line.contains('\n'));
    }

    #[tokio::test]
    async fn test_run_requires_a_topic() {
        let args = WatchArgs {
            labs: Vec::new(),
            groups: Vec::new(),
            legacy: false,
            url: None,
        };
        assert!(run(&AppConfig::default(), args).await.is_err());
    }
}
