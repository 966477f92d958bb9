//! Expiry sweep
//!
//! Background task that periodically deletes expired one-time passcodes and
//! login sessions. Expired rows are already rejected on read; the sweep only
//! keeps the tables small.

use crate::config::CleanupConfig;
use crate::db::Session;
use crate::otp::OtpService;
use crate::DbPool;
use anyhow::Result;
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Deletes expired passcodes and sessions
pub struct ExpiryCleanup {
    db: DbPool,
    otp: Arc<OtpService>,
}

impl ExpiryCleanup {
    pub fn new(db: DbPool, otp: Arc<OtpService>) -> Self {
        Self { db, otp }
    }

    /// Run a single cleanup cycle
    pub async fn run_cleanup(&self) -> Result<CleanupStats> {
        let stats = CleanupStats {
            otp_codes_removed: self.otp.sweep_expired().await?,
            sessions_removed: Session::delete_expired(&self.db).await?,
        };

        if stats.otp_codes_removed + stats.sessions_removed > 0 {
            tracing::info!(
                otp_codes = stats.otp_codes_removed,
                sessions = stats.sessions_removed,
                "Removed expired credentials"
            );
        } else {
            tracing::debug!("Nothing expired");
        }

        Ok(stats)
    }
}

/// Statistics from a cleanup run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub otp_codes_removed: u64,
    pub sessions_removed: u64,
}

/// Spawn the background cleanup task
pub fn spawn_cleanup_task(db: DbPool, otp: Arc<OtpService>, config: CleanupConfig) {
    if !config.enabled {
        tracing::info!("Expiry cleanup is disabled");
        return;
    }

    let interval_secs = config.interval_seconds.max(1);
    tracing::info!(interval_secs, "Starting expiry cleanup task");

    let cleanup = ExpiryCleanup::new(db, otp);

    tokio::spawn(async move {
        // Give startup a moment before the first sweep
        tokio::time::sleep(Duration::from_secs(30)).await;

        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = cleanup.run_cleanup().await {
                tracing::error!(error = %e, "Cleanup cycle failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{format_timestamp, test_pool, OtpCode, OtpPurpose, Role, User};
    use crate::notifications::UnconfiguredNotifier;

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let pool = test_pool().await;
        User::create(&pool, "ada@example.com", "Ada", "hash", Role::User)
            .await
            .unwrap();

        let past = format_timestamp(chrono::Utc::now() - chrono::Duration::minutes(5));
        let future = format_timestamp(chrono::Utc::now() + chrono::Duration::minutes(5));
        {
            let mut conn = pool.acquire().await.unwrap();
            OtpCode::replace_for_email(&mut conn, "old@example.com", "111111", OtpPurpose::Login, &past)
                .await
                .unwrap();
            OtpCode::replace_for_email(&mut conn, "new@example.com", "222222", OtpPurpose::Login, &future)
                .await
                .unwrap();
        }
        Session::create(&pool, "ada@example.com", "stale", &past)
            .await
            .unwrap();
        Session::create(&pool, "ada@example.com", "fresh", &future)
            .await
            .unwrap();

        let otp = Arc::new(OtpService::new(pool.clone(), Arc::new(UnconfiguredNotifier), 10));
        let cleanup = ExpiryCleanup::new(pool.clone(), otp);

        let stats = cleanup.run_cleanup().await.unwrap();
        assert_eq!(
            stats,
            CleanupStats {
                otp_codes_removed: 1,
                sessions_removed: 1,
            }
        );

        // Idempotent
        assert_eq!(cleanup.run_cleanup().await.unwrap(), CleanupStats::default());
        assert_eq!(OtpCode::count_for_email(&pool, "new@example.com").await.unwrap(), 1);
    }
}
