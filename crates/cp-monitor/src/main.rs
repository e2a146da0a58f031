//! Checkpoint realtime monitor
//!
//! `watch` subscribes to labs and groups and prints every update as one JSON
//! line on stdout. `publish` pushes a test event through the broker's HTTP API.
//! Logs go to stderr.

mod publish;
mod watch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cp_common::logging::{self, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "cp-monitor", version, about = "Watch live lab updates")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print live updates until Ctrl+C
    Watch(watch::WatchArgs),
    /// Publish one event through the broker HTTP API
    Publish(publish::PublishArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load .env
    dotenvy::dotenv().ok();

    let config = cp_common::AppConfig::load().context("Failed to load configuration")?;
    logging::init(&config.log_level, LogFormat::Pretty);

    match args.command {
        Commands::Watch(watch_args) => watch::run(&config, watch_args).await,
        Commands::Publish(publish_args) => {
            let delivered = publish::run(&publish_args).await?;
            println!("{}", serde_json::json!({ "delivered": delivered }));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_args() {
        let args = Args::try_parse_from([
            "cp-monitor",
            "watch",
            "--lab",
            "L1",
            "--group",
            "g1",
            "--group",
            "g2",
            "--legacy",
        ])
        .unwrap();
        let Commands::Watch(watch) = args.command else {
            panic!("expected watch");
        };
        assert_eq!(watch.labs, vec!["L1"]);
        assert_eq!(watch.groups, vec!["g1", "g2"]);
        assert!(watch.legacy);
        assert_eq!(watch.url, None);
    }

    #[test]
    fn test_publish_args() {
        let args = Args::try_parse_from([
            "cp-monitor",
            "publish",
            "--destination",
            "/topic/group-updates",
            "--payload",
            "{}",
        ])
        .unwrap();
        let Commands::Publish(publish) = args.command else {
            panic!("expected publish");
        };
        assert_eq!(publish.api, "http://localhost:8080/api");
        assert!(Args::try_parse_from(["cp-monitor", "publish", "--payload", "{}"]).is_err());
    }
}
