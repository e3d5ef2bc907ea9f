//! Periodic maintenance jobs
//!
//! Both jobs are idempotent; a skipped or repeated run changes nothing that
//! the next run would not fix.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use auth::AuthService;

use crate::config::AppConfig;
use crate::ledger::InventoryLedger;

/// Delete server-side sessions past their expiry
pub async fn sweep_expired_sessions(auth: &AuthService) -> Result<u64> {
    Ok(auth.cleanup_expired_sessions(Utc::now()).await?)
}

/// Count and log overdue rentals; never changes them
pub async fn scan_overdue(ledger: &InventoryLedger, today: NaiveDate) -> Result<usize> {
    let overdue = ledger.overdue(today).await?;
    for rental in &overdue {
        warn!(
            "Rental {} of item {} is {} day(s) overdue (due {:?})",
            rental.id,
            rental.item_id,
            rental.days_overdue(today),
            rental.rent_due_date
        );
    }
    info!("Overdue scan found {} rentals", overdue.len());
    Ok(overdue.len())
}

/// Register both jobs and start the scheduler
///
/// The returned scheduler must be kept alive for the jobs to keep running.
pub async fn start(
    config: &AppConfig,
    auth: AuthService,
    ledger: InventoryLedger,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let cleanup = Job::new_async(config.session_cleanup_schedule.as_str(), move |_, _| {
        let auth = auth.clone();
        Box::pin(async move {
            if let Err(e) = sweep_expired_sessions(&auth).await {
                error!("Session cleanup failed: {:#}", e);
            }
        })
    })?;

    let overdue = Job::new_async(config.overdue_scan_schedule.as_str(), move |_, _| {
        let ledger = ledger.clone();
        Box::pin(async move {
            if let Err(e) = scan_overdue(&ledger, Utc::now().date_naive()).await {
                error!("Overdue scan failed: {:#}", e);
            }
        })
    })?;

    scheduler.add(cleanup).await?;
    scheduler.add(overdue).await?;
    scheduler.start().await?;

    info!(
        "Started maintenance jobs (session cleanup: {}, overdue scan: {})",
        config.session_cleanup_schedule, config.overdue_scan_schedule
    );
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerPolicy;
    use crate::models::NewItem;
    use crate::repositories::InventoryRepositories;
    use auth::{AuthConfig, AuthRepositories};
    use chrono::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn overdue_scan_does_not_touch_rentals() {
        let ledger = InventoryLedger::new(InventoryRepositories::in_memory(), LedgerPolicy::default());
        let item = ledger
            .create_item(NewItem {
                name: "Lab coat".to_string(),
                description: None,
                category: None,
                price: 3.0,
                stock: 2,
                rentable: true,
                image_filename: None,
            })
            .await
            .unwrap();
        let today = Utc::now().date_naive();
        let rental = ledger
            .rent(item.id, Uuid::new_v4(), 1, Some(today - Duration::days(3)))
            .await
            .unwrap()
            .transaction;

        assert_eq!(scan_overdue(&ledger, today).await.unwrap(), 1);
        assert_eq!(scan_overdue(&ledger, today).await.unwrap(), 1);
        assert_eq!(ledger.transaction(rental.id).await.unwrap(), rental);
    }

    #[tokio::test]
    async fn session_sweep_on_empty_registry_is_a_no_op() {
        let auth = AuthService::new(AuthRepositories::in_memory(), AuthConfig::default());
        assert_eq!(sweep_expired_sessions(&auth).await.unwrap(), 0);
    }
}
