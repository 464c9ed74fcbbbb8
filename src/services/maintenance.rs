use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::db::Store;

/// Top of every hour.
pub const PURGE_CRON: &str = "0 0 * * * *";

/// Periodic housekeeping for the database.
pub struct Maintenance {
    store: Store,
    scheduler: Option<JobScheduler>,
}

impl Maintenance {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self {
            store,
            scheduler: None,
        }
    }

    /// Clears reset tokens that can no longer be used.
    pub async fn purge_expired_reset_tokens(store: &Store) -> Result<u64> {
        let start = std::time::Instant::now();
        let purged = store.purge_expired_reset_tokens().await?;
        info!(
            event = "job_finished",
            job_name = "purge_reset_tokens",
            purged,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Expired reset tokens purged"
        );
        Ok(purged)
    }

    pub async fn start(&mut self) -> Result<()> {
        let sched = JobScheduler::new().await?;

        let store = self.store.clone();
        let job = Job::new_async(PURGE_CRON, move |_uuid, _lock| {
            let store = store.clone();
            Box::pin(async move {
                if let Err(e) = Self::purge_expired_reset_tokens(&store).await {
                    error!(event = "job_failed", job_name = "purge_reset_tokens", error = %e, "Reset token purge failed");
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;
        info!("Maintenance scheduler started");

        self.scheduler = Some(sched);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut sched) = self.scheduler.take() {
            sched.shutdown().await?;
            info!("Maintenance scheduler stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_purge_on_empty_database() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        assert_eq!(Maintenance::purge_expired_reset_tokens(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let mut maintenance = Maintenance::new(store);
        maintenance.start().await.unwrap();
        maintenance.stop().await.unwrap();
    }
}
