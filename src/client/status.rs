use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::ApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Unknown,
    Online,
    Offline,
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
        })
    }
}

/// One health check.
pub async fn check_status(client: &ApiClient) -> ApiStatus {
    match client.health().await {
        Ok(_) => ApiStatus::Online,
        Err(e) => {
            tracing::debug!(error = %e, "Health check failed");
            ApiStatus::Offline
        }
    }
}

/// Polls `/api/health` on a fixed interval and publishes the result.
/// Polling stops when the monitor is dropped.
pub struct StatusMonitor {
    rx: watch::Receiver<ApiStatus>,
    handle: JoinHandle<()>,
}

impl StatusMonitor {
    /// The first check runs immediately.
    #[must_use]
    pub fn spawn(client: Arc<ApiClient>, every: Duration) -> Self {
        let (tx, rx) = watch::channel(ApiStatus::Unknown);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let status = check_status(&client).await;

                let changed = tx.send_if_modified(|current| {
                    if *current == status {
                        false
                    } else {
                        *current = status;
                        true
                    }
                });
                if changed {
                    info!(%status, "API status changed");
                }

                if tx.is_closed() {
                    break;
                }
            }
        });

        Self { rx, handle }
    }

    #[must_use]
    pub fn current(&self) -> ApiStatus {
        *self.rx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ApiStatus> {
        self.rx.clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
