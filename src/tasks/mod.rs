//! Background scheduled tasks for the application.
//!
//! Call `spawn_all` once during startup to launch them.

use crate::config::HuntConfig;
use crate::services::ClassService;

/// Spawn all background tasks.
///
/// The reconcile loop rebuilds each class's cached progress fields from the
/// scans table, repairing drift left by failed post-scan updates or lost
/// concurrent writes. An interval of 0 disables it.
pub fn spawn_all(class_service: ClassService, hunt: &HuntConfig) {
    let interval = hunt.reconcile_interval_secs;
    if interval == 0 {
        log::info!("Progress reconciliation task disabled");
        return;
    }

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
            match class_service.reconcile_all_progress().await {
                Ok(n) if n > 0 => log::info!("Class progress reconciled: {n}"),
                Ok(_) => {}
                Err(e) => log::error!("Failed to reconcile class progress: {e:?}"),
            }
        }
    });
}
