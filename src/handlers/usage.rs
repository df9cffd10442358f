//! # Usage and Dashboard Handlers
//!
//! Per-tenant token accounting and the aggregate numbers behind the tenant
//! dashboard.

use std::collections::BTreeMap;

use axum::{extract::State, response::Json};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::TenantContext;
use crate::error::ApiError;
use crate::models::content_generation::GenerationStatus;
use crate::models::usage_history;
use crate::repositories::{
    ApiKeyRepository, ContentGenerationRepository, PageRepository, PromptRepository,
    UsageHistoryRepository,
};
use crate::server::AppState;

const HISTORY_MONTHS: u64 = 12;
const TREND_MONTHS: u32 = 6;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageMonth {
    #[schema(example = "2026-02")]
    pub month: String,
    pub tokens_used: i64,
    pub pages_generated: i32,
    pub api_calls: i32,
}

impl From<usage_history::Model> for UsageMonth {
    fn from(model: usage_history::Model) -> Self {
        Self {
            month: model.month,
            tokens_used: model.tokens_used,
            pages_generated: model.pages_generated,
            api_calls: model.api_calls,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageResponse {
    pub plan_type: String,
    pub usage_period: String,
    pub tokens_monthly_limit: i64,
    pub tokens_used_current: i64,
    pub remaining_tokens: i64,
    pub usage_percent: f64,
    /// Closed months, newest first
    pub history: Vec<UsageMonth>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CountsByStatus {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PromptCounts {
    pub total: u64,
    pub active: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerationStats {
    #[serde(flatten)]
    pub counts: CountsByStatus,
    /// Completed share in percent, one decimal
    pub success_rate: f64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenStats {
    pub used_this_period: i64,
    pub monthly_limit: i64,
    pub remaining: i64,
    pub usage_percent: f64,
    pub total_all_time: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct KeyStats {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct TrendPoint {
    #[schema(example = "2026-03")]
    pub month: String,
    pub count: u64,
    pub tokens: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub pages: CountsByStatus,
    pub prompts: PromptCounts,
    pub generations: GenerationStats,
    pub tokens: TokenStats,
    pub api_keys: KeyStats,
    /// Oldest month first
    pub trend: Vec<TrendPoint>,
}

impl CountsByStatus {
    pub fn from_pairs(pairs: Vec<(String, i64)>) -> Self {
        let by_status: BTreeMap<String, i64> = pairs.into_iter().collect();
        Self {
            total: by_status.values().sum(),
            by_status,
        }
    }

    pub fn get(&self, status: &str) -> i64 {
        self.by_status.get(status).copied().unwrap_or(0)
    }
}

/// `YYYY-MM` labels of the `count` months ending with the month of `now`,
/// oldest first, plus the first instant of the oldest one.
pub fn trailing_months(now: DateTime<Utc>, count: u32) -> (Vec<String>, DateTime<Utc>) {
    let mut year = now.year();
    let mut month = now.month();
    let mut labels = Vec::with_capacity(count as usize);
    for i in 0..count.max(1) {
        if i > 0 {
            if month == 1 {
                month = 12;
                year -= 1;
            } else {
                month -= 1;
            }
        }
        labels.push(format!("{year:04}-{month:02}"));
    }
    labels.reverse();

    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now);
    (labels, start)
}

/// Bucket `(created_at, tokens)` rows into the given month labels.
pub fn build_trend<Tz: TimeZone>(
    months: &[String],
    activity: &[(DateTime<Tz>, i64)],
) -> Vec<TrendPoint> {
    months
        .iter()
        .map(|label| {
            let in_month: Vec<i64> = activity
                .iter()
                .filter(|(at, _)| {
                    let utc = at.with_timezone(&Utc);
                    format!("{:04}-{:02}", utc.year(), utc.month()) == *label
                })
                .map(|(_, tokens)| *tokens)
                .collect();
            TrendPoint {
                month: label.clone(),
                count: in_month.len() as u64,
                tokens: in_month.iter().sum(),
            }
        })
        .collect()
}

/// Current token usage and monthly history
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Token usage", body = UsageResponse)
    ),
    tag = "usage"
)]
pub async fn get_usage(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Json<UsageResponse>, ApiError> {
    let history = UsageHistoryRepository::new(&state.db)
        .recent(ctx.id(), HISTORY_MONTHS)
        .await?;
    let tenant = ctx.tenant;

    Ok(Json(UsageResponse {
        remaining_tokens: tenant.remaining_tokens(),
        usage_percent: tenant.usage_percent(),
        plan_type: tenant.plan_type,
        usage_period: tenant.usage_period,
        tokens_monthly_limit: tenant.tokens_monthly_limit,
        tokens_used_current: tenant.tokens_used_current,
        history: history.into_iter().map(UsageMonth::from).collect(),
    }))
}

/// Tenant dashboard statistics
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard statistics", body = DashboardResponse)
    ),
    tag = "usage"
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Json<DashboardResponse>, ApiError> {
    let now = Utc::now();
    let tenant_id = ctx.id();
    let generations_repo = ContentGenerationRepository::new(&state.db);
    let prompts_repo = PromptRepository::new(&state.db);

    let pages = CountsByStatus::from_pairs(
        PageRepository::new(&state.db)
            .count_by_status(tenant_id)
            .await?,
    );
    let prompts = PromptCounts {
        total: prompts_repo.count(tenant_id, false).await?,
        active: prompts_repo.count(tenant_id, true).await?,
    };

    let generation_counts =
        CountsByStatus::from_pairs(generations_repo.count_by_status(Some(tenant_id)).await?);
    let completed = generation_counts.get(GenerationStatus::Completed.as_str());
    let success_rate = if generation_counts.total == 0 {
        0.0
    } else {
        (completed as f64 / generation_counts.total as f64 * 1000.0).round() / 10.0
    };

    let key_stats = ApiKeyRepository::new(&state.db)
        .stats(tenant_id, now)
        .await?;

    let (months, since) = trailing_months(now, TREND_MONTHS);
    let activity = generations_repo.activity_since(tenant_id, since).await?;
    let trend = build_trend(&months, &activity);

    let tenant = &ctx.tenant;
    Ok(Json(DashboardResponse {
        pages,
        prompts,
        generations: GenerationStats {
            counts: generation_counts,
            success_rate,
        },
        tokens: TokenStats {
            used_this_period: tenant.tokens_used_current,
            monthly_limit: tenant.tokens_monthly_limit,
            remaining: tenant.remaining_tokens(),
            usage_percent: tenant.usage_percent(),
            total_all_time: generations_repo.tokens_total(tenant_id).await?,
        },
        api_keys: KeyStats {
            total: key_stats.total,
            active: key_stats.active,
            expired: key_stats.expired,
        },
        trend,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_months_cross_year_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 2, 14, 9, 30, 0).unwrap();
        let (months, since) = trailing_months(now, 6);
        assert_eq!(
            months,
            vec!["2025-09", "2025-10", "2025-11", "2025-12", "2026-01", "2026-02"]
        );
        assert_eq!(since.to_rfc3339(), "2025-09-01T00:00:00+00:00");
    }

    #[test]
    fn trend_buckets_by_month() {
        let months = vec!["2026-01".to_string(), "2026-02".to_string()];
        let activity = vec![
            (Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap(), 100),
            (Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(), 40),
            (Utc.with_ymd_and_hms(2026, 2, 27, 0, 0, 0).unwrap(), 60),
        ];
        let trend = build_trend(&months, &activity);
        assert_eq!(trend[0], TrendPoint { month: "2026-01".into(), count: 1, tokens: 100 });
        assert_eq!(trend[1], TrendPoint { month: "2026-02".into(), count: 2, tokens: 100 });
    }
}
