//! `sizewatch` - scrape collection and table size metrics
//!
//! Reads a TOML monitor configuration, opens the configured database, runs
//! one collection pass over every configured collector and prints the result
//! in the Prometheus text exposition format. With `--watch` it keeps the
//! handle open and prints a pass every interval until interrupted.

mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use sizewatch_core::SessionSource;
use sizewatch_drivers::DriverRegistry;
use sizewatch_monitor::{CollectorRegistry, MonitorConfig, ResourceHandle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use logging::LoggingConfig;

#[derive(Parser, Debug)]
#[command(name = "sizewatch", version, about = "Collection and table size metrics")]
struct Cli {
    /// Monitor configuration file (TOML)
    #[arg(short, long, env = "SIZEWATCH_CONFIG", default_value = "sizewatch.toml")]
    config: PathBuf,

    /// Override the metric namespace from the configuration file
    #[arg(long)]
    namespace: Option<String>,

    /// Default log filter, e.g. "info" or "warn,sizewatch_monitor=debug"
    #[arg(long, env = "SIZEWATCH_LOG")]
    log_level: Option<String>,

    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log JSON to a file only, keeping stderr quiet
    #[arg(long)]
    json_logs: bool,

    /// Print the metric descriptors instead of sampling
    #[arg(long)]
    describe: bool,

    /// Print a pass every SECONDS until interrupted
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    watch: Option<u64>,
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig {
        let mut config = if self.json_logs {
            LoggingConfig::production()
        } else {
            LoggingConfig::development()
        };
        if let Some(filter) = &self.log_level {
            config = config.with_filter(filter.clone());
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir.clone());
        }
        config
    }

    fn monitor_config(&self) -> Result<MonitorConfig> {
        let mut config = MonitorConfig::load(&self.config)
            .with_context(|| format!("failed to load {}", self.config.display()))?;
        if let Some(namespace) = &self.namespace {
            config = config.with_namespace(namespace.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.logging_config())?;

    let config = cli.monitor_config()?;
    let handle = open_handle(&config).await?;

    let result = run(&cli, &config, Arc::clone(&handle)).await;
    handle.close().await;
    result
}

/// Open the configured database and hand a dedicated copy to the handle,
/// releasing the driver's own source straight away
async fn open_handle(config: &MonitorConfig) -> Result<Arc<ResourceHandle>> {
    let drivers = DriverRegistry::with_defaults();
    let source = drivers
        .open(&config.connection)
        .await
        .with_context(|| format!("failed to open {} connection", config.connection.driver))?;

    let handle = ResourceHandle::dedicated(source.as_ref())
        .await
        .context("failed to create resource handle")?;
    source.close().await?;

    Ok(Arc::new(handle))
}

async fn run(cli: &Cli, config: &MonitorConfig, handle: Arc<ResourceHandle>) -> Result<()> {
    let registry = CollectorRegistry::from_config(config, handle)
        .await
        .context("failed to build collectors")?;

    if cli.describe {
        for descriptor in registry.describe() {
            println!(
                "{} {} [{}] {}",
                descriptor.fq_name(),
                descriptor.kind(),
                descriptor.label_names().join(","),
                descriptor.help()
            );
        }
        return Ok(());
    }

    let Some(seconds) = cli.watch else {
        print!("{}", registry.render_text().await?);
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(seconds));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print!("{}", registry.render_text().await?);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                tracing::info!("interrupted, shutting down");
                return Ok(());
            }
        }
    }
}
