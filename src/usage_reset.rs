//! # Monthly Usage Reset
//!
//! Background task that closes out tenants whose token counter still belongs
//! to a previous month: the month is archived into `usage_histories` and the
//! counter restarts at zero for the current period.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::UsageResetConfig;
use crate::error::RepositoryError;
use crate::models::tenant::{Model as TenantModel, usage_period_for};
use crate::repositories::{ContentGenerationRepository, TenantRepository, UsageHistoryRepository};

/// Compare-and-swap attempts per tenant before deferring to the next tick.
const RESET_ATTEMPTS: usize = 3;

/// Outcome of one reset pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResetStats {
    pub tenants_reset: u64,
    pub tenants_skipped: u64,
    pub tenants_failed: u64,
}

pub struct UsageResetTask {
    db: DatabaseConnection,
    config: UsageResetConfig,
}

impl UsageResetTask {
    pub fn new(db: DatabaseConnection, config: UsageResetConfig) -> Self {
        Self { db, config }
    }

    /// Run one pass immediately, then one per tick until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting usage reset task");
        let tick_interval = Duration::from_secs(self.config.tick_seconds.max(1));
        let mut next_wait = Duration::ZERO;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Usage reset shutdown requested");
                    break;
                }
                _ = sleep(next_wait) => {
                    let started = Instant::now();
                    if let Err(err) = self.tick(Utc::now()).await {
                        error!(error = %err, "Usage reset tick failed");
                    }
                    histogram!("usage_reset_tick_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                    next_wait = tick_interval;
                }
            }
        }

        info!("Usage reset task stopped");
    }

    /// Reset every tenant whose usage period is not the month of `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<ResetStats, RepositoryError> {
        let period = usage_period_for(now);
        let stale = TenantRepository::new(&self.db)
            .with_stale_usage_period(&period)
            .await?;

        let mut stats = ResetStats::default();
        for tenant in stale {
            match self.close_out(&tenant, &period).await {
                Ok(true) => stats.tenants_reset += 1,
                Ok(false) => stats.tenants_skipped += 1,
                Err(err) => {
                    stats.tenants_failed += 1;
                    error!(tenant_id = %tenant.id, error = %err, "Failed to reset tenant usage");
                }
            }
        }

        if stats.tenants_reset > 0 {
            counter!("usage_resets_total").increment(stats.tenants_reset);
            info!(?stats, period = %period, "Monthly usage reset completed");
        } else {
            debug!(?stats, "No tenant usage to reset");
        }
        Ok(stats)
    }

    async fn close_out(&self, tenant: &TenantModel, period: &str) -> Result<bool, RepositoryError> {
        let previous = tenant.usage_period.as_str();
        let pages_generated = match month_bounds(previous) {
            Some((from, to)) => ContentGenerationRepository::new(&self.db)
                .count_completed_between(tenant.id, from, to)
                .await?,
            None => {
                warn!(tenant_id = %tenant.id, usage_period = %previous, "Unparseable usage period");
                0
            }
        };

        let pages_generated = i32::try_from(pages_generated).unwrap_or(i32::MAX);

        let tenants = TenantRepository::new(&self.db);
        let mut used = tenant.tokens_used_current;
        for _ in 0..RESET_ATTEMPTS {
            let txn = self.db.begin().await?;
            let reset = TenantRepository::reset_usage_period(&txn, tenant.id, previous, used, period)
                .await?;
            if reset {
                UsageHistoryRepository::upsert(&txn, tenant.id, previous, used, pages_generated)
                    .await?;
                txn.commit().await?;
                return Ok(true);
            }
            txn.rollback().await?;

            // Either another pass already reset it or tokens were charged
            // since the snapshot was read.
            match tenants.find_by_id(tenant.id).await? {
                Some(current) if current.usage_period == previous => {
                    used = current.tokens_used_current;
                }
                _ => return Ok(false),
            }
        }

        warn!(tenant_id = %tenant.id, "Token usage kept changing during reset, deferring");
        Ok(false)
    }
}

/// `[first instant of month, first instant of next month)` for `YYYY-MM`.
pub fn month_bounds(period: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d").ok()?;
    let next = if start.month() == 12 {
        NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)?
    };
    Some((
        Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0)?),
        Utc.from_utc_datetime(&next.and_hms_opt(0, 0, 0)?),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::models::tenant::ActiveModel as TenantActiveModel;
    use crate::repositories::tenant::NewTenant;
    use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

    async fn tenant_in_period(db: &DatabaseConnection, period: &str, used: i64) -> TenantModel {
        let tenant = TenantRepository::new(db)
            .create(NewTenant {
                name: format!("Tenant {period}"),
                domain: None,
                subdomain: None,
                plan_type: "starter".into(),
                tokens_monthly_limit: 10_000,
                status: None,
                theme_config: None,
                brand_config: None,
                features: None,
            })
            .await
            .unwrap();
        let mut active: TenantActiveModel = tenant.into_active_model();
        active.usage_period = Set(period.to_string());
        active.tokens_used_current = Set(used);
        active.update(db).await.unwrap()
    }

    #[test]
    fn month_bounds_handle_december() {
        let (from, to) = month_bounds("2025-12").unwrap();
        assert_eq!(from.to_rfc3339(), "2025-12-01T00:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert!(month_bounds("december").is_none());
    }

    #[tokio::test]
    async fn stale_tenants_are_archived_and_reset_once() {
        let db = test_connection().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let stale = tenant_in_period(&db, "2026-02", 4_200).await;
        let current = tenant_in_period(&db, "2026-03", 900).await;

        let task = UsageResetTask::new(db.clone(), UsageResetConfig::default());
        let stats = task.tick(now).await.unwrap();
        assert_eq!(stats.tenants_reset, 1);

        let tenants = TenantRepository::new(&db);
        let reset = tenants.get(stale.id).await.unwrap();
        assert_eq!(reset.tokens_used_current, 0);
        assert_eq!(reset.usage_period, "2026-03");
        assert_eq!(tenants.get(current.id).await.unwrap().tokens_used_current, 900);

        let history = UsageHistoryRepository::new(&db)
            .recent(stale.id, 12)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].month, "2026-02");
        assert_eq!(history[0].tokens_used, 4_200);
        assert_eq!(history[0].pages_generated, 0);

        let again = task.tick(now).await.unwrap();
        assert_eq!(again, ResetStats::default());
    }

    #[tokio::test]
    async fn tokens_charged_after_snapshot_are_archived() {
        let db = test_connection().await;
        let snapshot = tenant_in_period(&db, "2026-02", 4_200).await;
        TenantRepository::add_token_usage(&db, snapshot.id, 300).await.unwrap();

        let task = UsageResetTask::new(db.clone(), UsageResetConfig::default());
        assert!(task.close_out(&snapshot, "2026-03").await.unwrap());

        let reset = TenantRepository::new(&db).get(snapshot.id).await.unwrap();
        assert_eq!(reset.tokens_used_current, 0);
        assert_eq!(reset.usage_period, "2026-03");

        let history = UsageHistoryRepository::new(&db)
            .recent(snapshot.id, 12)
            .await
            .unwrap();
        assert_eq!(history[0].tokens_used, 4_500);

        assert!(!task.close_out(&snapshot, "2026-03").await.unwrap());
    }
}
