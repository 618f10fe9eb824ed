use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use dashboard::{load_config, Dashboard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "telemetry_dashboard", about = "Headless real-time telemetry dashboard")]
struct Args {
    /// JSON configuration file
    #[arg(long, default_value = "dashboard.json")]
    config: PathBuf,

    /// Streaming server address, overrides the configuration file
    #[arg(long)]
    server: Option<String>,

    /// Plugin directory, overrides the configuration file
    #[arg(long)]
    mods_dir: Option<PathBuf>,

    /// Do not reconnect after the connection drops
    #[arg(long)]
    no_reconnect: bool,

    /// Bind a stream to a cell: CELL=MODULE.STREAM[:WidgetType]
    #[arg(long = "attach", value_name = "BINDING")]
    attach: Vec<String>,
}

/// Splits `CELL=MODULE.STREAM[:WidgetType]`.
fn parse_attach(spec: &str) -> anyhow::Result<(&str, &str, &str)> {
    let Some((cell, target)) = spec.split_once('=') else {
        bail!("expected CELL=MODULE.STREAM[:WidgetType], got '{}'", spec);
    };
    let (stream, widget_type) = target.split_once(':').unwrap_or((target, ""));
    Ok((cell, stream, widget_type))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard=debug,telemetry_dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Telemetry dashboard starting...");

    // --- Configuration ---
    let mut config = load_config(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(server) = args.server {
        config.server.http_url = server.replacen("ws://", "http://", 1).replacen("wss://", "https://", 1);
        config.server.ws_url = server;
    }
    if let Some(mods_dir) = args.mods_dir {
        config.mods_dir = mods_dir;
    }
    if args.no_reconnect {
        config.reconnect.auto_reconnect = false;
    }

    // --- Components ---
    let mut dashboard = Dashboard::new(config)?;
    let plugins = dashboard.load_plugins();
    tracing::info!(plugins, "Widget catalog ready");

    let dispatcher = dashboard.start().await;

    for spec in &args.attach {
        let (cell, stream, widget_type) = parse_attach(spec)?;
        if let Err(e) = dashboard.attach(cell, stream, widget_type) {
            tracing::warn!(binding = %spec, "Attach failed: {}", e);
        }
    }

    // --- Graceful Shutdown ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received. Stopping dashboard...");
    dashboard.shutdown();
    if let Err(e) = dispatcher.await {
        tracing::warn!("Dispatcher task ended abnormally: {}", e);
    }
    tracing::info!("Telemetry dashboard stopped.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attach() {
        assert_eq!(
            parse_attach("widget-1=imu.pitch:SliderControl").unwrap(),
            ("widget-1", "imu.pitch", "SliderControl")
        );
        assert_eq!(parse_attach("a=imu.pitch").unwrap(), ("a", "imu.pitch", ""));
        assert!(parse_attach("imu.pitch").is_err());
    }
}
