use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use super::api_client;
use crate::client::{StatusMonitor, status::check_status};
use crate::config::Config;

pub async fn cmd_status(config: &Config, watch: bool) -> anyhow::Result<()> {
    let client = Arc::new(api_client(config)?);

    if !watch {
        let status = check_status(&client).await;
        println!("API {} is {}", config.client.api_url, status);
        if let Ok(health) = client.health().await {
            println!(
                "  {} v{} | database {} | classifier {} | up {}s",
                health.service,
                health.version,
                health.database,
                health.classifier,
                health.uptime_seconds
            );
        }
        return Ok(());
    }

    let every = Duration::from_secs(config.client.status_poll_seconds.max(1));
    let monitor = StatusMonitor::spawn(client, every);
    let mut rx = monitor.subscribe();

    println!(
        "Watching {} every {}s. Press Ctrl+C to stop.",
        config.client.api_url,
        every.as_secs()
    );

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *rx.borrow_and_update();
                println!("[{}] API is {}", chrono::Utc::now().format("%H:%M:%S"), status);
            }
            _ = signal::ctrl_c() => break,
        }
    }

    monitor.stop();
    Ok(())
}
