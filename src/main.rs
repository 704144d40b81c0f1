use anyhow::Context;
use log::{error, info, warn};
use pool_watcher::alerts::{Notifier, WebhookNotifier};
use pool_watcher::collectors::{LogTailer, TailOptions};
use pool_watcher::config::Config;
use pool_watcher::events::WatchMessage;
use pool_watcher::watcher::PoolWatcher;
use std::path::Path;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting pool watcher");

    match run() {
        Ok(()) => {
            info!("Pool watcher shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Pool watcher failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Wire the components together and block until shutdown
fn run() -> anyhow::Result<()> {
    let config = Config::load();
    info!(
        "Configuration: log_path={}, window_size={}, threshold={}%, cooldown={}s, active_pool={}",
        config.log_path.display(),
        config.window_size,
        config.error_rate_threshold,
        config.alert_cooldown_secs,
        config.active_pool
    );

    let notifier = WebhookNotifier::new(config.webhook_url.clone(), config.notify_timeout())
        .context("failed to build webhook client")?;
    if !notifier.is_enabled() {
        warn!("SLACK_WEBHOOK_URL not set, alerts will only be logged");
    }
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);

    let mut watcher =
        PoolWatcher::new(&config, notifier).context("failed to initialize watcher")?;

    let (sender, receiver) = mpsc::sync_channel(config.queue_capacity);

    let mut tailer = LogTailer::new(
        config.log_path.clone(),
        TailOptions::from(&config),
        sender.clone(),
    );
    start_tailer(&mut tailer, &config.log_path)?;

    // SIGINT and SIGTERM
    ctrlc::set_handler(move || {
        info!("Received termination signal, shutting down gracefully...");
        if let Err(e) = sender.send(WatchMessage::Shutdown) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("failed to install signal handler")?;

    info!("Pool watcher is running. Press Ctrl+C to stop.");

    let stats = watcher.run(receiver);

    if let Err(e) = tailer.stop() {
        warn!("Error stopping log tailer: {}", e);
    }

    stats.log_summary();
    Ok(())
}

/// Start the tailer, telling an unopenable log apart from other startup failures
fn start_tailer(tailer: &mut LogTailer, path: &Path) -> anyhow::Result<()> {
    match tailer.start() {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => {
            Err(anyhow::Error::new(e).context(format!("cannot tail {}", path.display())))
        }
        Err(e) => Err(anyhow::Error::new(e).context("failed to start log tailer")),
    }
}
