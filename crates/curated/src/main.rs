//! curated - drains queued curation requests on an interval.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use curate_core::metrics::METRICS;
use curate_core::{CurationConfig, Curator, CuratorSetup, QueueDriver, TaskResolver};
use curate_state::{SurrealContentStore, SurrealHandle, SurrealTaskDefinitionStore};
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "curated")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drain queued curation requests", long_about = None)]
struct Args {
    /// Seconds between queue sweeps
    #[arg(short, long, env = "CURATED_INTERVAL", default_value = "60")]
    interval: u64,

    /// Sweep once and exit
    #[arg(long)]
    once: bool,

    /// Configuration file (TOML)
    #[arg(short, long, env = "CURATE_CONFIG")]
    config: Option<PathBuf>,

    /// Handle given to the site object when the repository is created
    #[arg(long, env = "CURATE_SITE_HANDLE", default_value = "123456789/0")]
    site_handle: String,

    /// Local database directory (default: SURREALDB_* environment, else in-memory)
    #[arg(long, env = "CURATE_DB_PATH")]
    db_path: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    curate_core::telemetry::init_tracing(args.json, level);

    let config = CurationConfig::load(args.config.as_deref())
        .context("Failed to load curation configuration")?;
    let queue = config
        .durable_queue()
        .context("curated needs a queue shared with its producers")?;

    let handle = Arc::new(
        SurrealHandle::open(args.db_path.as_deref())
            .await
            .context("Failed to connect to the curation database")?,
    );
    let content = Arc::new(SurrealContentStore::open(&handle, &args.site_handle).await?);
    let definitions = Arc::new(SurrealTaskDefinitionStore::new(handle));
    config.install_definitions(definitions.as_ref()).await?;

    let resolver = TaskResolver::new(definitions);
    let driver = QueueDriver::from_backend(resolver, queue, content).with_setup(setup_from(&config));

    info!(interval = args.interval, "curated started");
    if args.once {
        sweep(&driver).await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&driver).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
    Ok(())
}

fn setup_from(config: &CurationConfig) -> CuratorSetup {
    let config = config.clone();
    Arc::new(move |curator: &mut Curator| config.configure_curator(curator))
}

/// Drain every queue with pending requests. Returns how many requests were
/// processed; failures are logged and left queued for the next sweep.
async fn sweep(driver: &QueueDriver) -> usize {
    let processed = match driver.drain_all().await {
        Ok(summaries) => {
            for summary in summaries.iter().filter(|s| s.failed > 0) {
                error!(
                    queue = %summary.queue,
                    failed = summary.failed,
                    "requests returned to the queue"
                );
            }
            summaries.iter().map(|s| s.entries).sum()
        }
        Err(e) => {
            error!(error = %e, "queue sweep failed");
            0
        }
    };
    METRICS.flush();
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use curate_state::fakes::{MemoryContentStore, MemoryTaskDefinitionStore, MemoryTaskQueue};
    use curate_state::{QueueEntry, TaskDefinition, TaskQueue};

    #[tokio::test]
    async fn sweep_drains_pending_requests() {
        let store = Arc::new(MemoryContentStore::new());
        let community = store.add_community(None, "Music");
        let queue = Arc::new(MemoryTaskQueue::new());
        queue
            .enqueue(
                "nightly",
                QueueEntry::new(None, vec!["noop".into()], community.handle.clone().unwrap()),
            )
            .await
            .unwrap();

        let resolver = TaskResolver::new(Arc::new(MemoryTaskDefinitionStore::with_definitions([
            TaskDefinition::native("noop", "noop"),
        ])));
        let config = CurationConfig::from_toml_str("cache_limit = 10\n").unwrap();
        let driver = QueueDriver::from_backend(resolver, queue.clone(), store)
            .with_setup(setup_from(&config));

        assert_eq!(sweep(&driver).await, 1);
        assert_eq!(queue.pending("nightly"), 0);
        assert_eq!(sweep(&driver).await, 0);
    }

    #[test]
    fn interval_defaults_to_a_minute() {
        let args = Args::try_parse_from(["curated", "--once"]).unwrap();
        assert_eq!(args.interval, 60);
        assert!(args.once);
    }
}
