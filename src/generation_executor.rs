//! Generation Executor
//!
//! Background worker that claims due content generations, renders the final
//! prompt, calls the AI provider and records the outcome with token
//! accounting, retry backoff and notification mails.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use rand::{Rng, thread_rng};
use sea_orm::{DatabaseConnection, TransactionTrait};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::ai::{AiError, AiService};
use crate::config::WorkerConfig;
use crate::error::{ApiError, RepositoryError, provider_error, quota_exceeded};
use crate::mail::{Notifier, crosses_high_usage};
use crate::models::content_generation::Model as GenerationModel;
use crate::models::page::Model as PageModel;
use crate::models::tenant::Model as TenantModel;
use crate::repositories::{
    ContentGenerationRepository, PageRepository, PromptRepository, TenantRepository,
    UserRepository,
};
use crate::templating::{build_generation_prompt, estimate_tokens};

/// Share of the computed backoff added as random jitter.
const JITTER_FACTOR: f64 = 0.2;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Page not found")]
    PageMissing,
    #[error("Prompt not found")]
    PromptMissing,
    #[error("Tenant not found")]
    TenantMissing,
    #[error("Monthly token limit exceeded")]
    QuotaExceeded,
    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl GenerationError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Ai(err) => err.is_retryable(),
            GenerationError::Timeout(_) | GenerationError::Repository(_) => true,
            GenerationError::PageMissing
            | GenerationError::PromptMissing
            | GenerationError::TenantMissing
            | GenerationError::QuotaExceeded => false,
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(error: GenerationError) -> Self {
        match error {
            GenerationError::Ai(err) => err.into(),
            GenerationError::Repository(err) => err.into(),
            GenerationError::QuotaExceeded => quota_exceeded("Monthly token limit exceeded"),
            other => provider_error(&format!("Content generation failed: {other}")),
        }
    }
}

/// Facts gathered before the provider call.
struct PreparedJob {
    page: PageModel,
    tenant: TenantModel,
    prompt: String,
}

/// Runs pending generations in the background and inline for sync requests.
#[derive(Clone)]
pub struct GenerationExecutor {
    db: DatabaseConnection,
    ai: AiService,
    notifier: Notifier,
    config: WorkerConfig,
}

impl GenerationExecutor {
    pub fn new(
        db: DatabaseConnection,
        ai: AiService,
        notifier: Notifier,
        config: WorkerConfig,
    ) -> Self {
        Self {
            db,
            ai,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Claim loop; returns once `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(config = ?self.config, "Starting generation executor");
        let tick = Duration::from_millis(self.config.tick_ms);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Generation executor shutdown requested");
                    break;
                }
                _ = sleep(tick) => {
                    match self.claim_and_run().await {
                        Ok(0) => {}
                        Ok(count) => debug!(count, "Executed generation jobs"),
                        Err(err) => error!(error = %err, "Error executing generation jobs"),
                    }
                }
            }
        }

        info!("Generation executor stopped");
    }

    /// Claim one batch of due generations and run them to completion.
    #[instrument(skip(self), fields(batch_size = self.config.claim_batch))]
    pub async fn claim_and_run(&self) -> Result<usize, RepositoryError> {
        let started = Instant::now();
        let repo = ContentGenerationRepository::new(&self.db);
        let now = Utc::now();
        let lease = self.stale_after();

        let abandoned = repo
            .fail_abandoned(now, lease, self.config.max_attempts)
            .await?;
        if abandoned > 0 {
            counter!("generation_jobs_total", "status" => "failed").increment(abandoned);
            warn!(count = abandoned, "Failed generations abandoned mid-run");
        }

        let jobs = repo
            .claim_due(now, lease, self.config.max_attempts, self.config.claim_batch)
            .await?;
        let count = jobs.len();
        if count == 0 {
            return Ok(0);
        }

        info!(count, "Claimed generation jobs");
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(count);

        for job in jobs {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                warn!("Generation semaphore closed");
                break;
            };
            let executor = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                executor.run_claimed(job).await;
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Generation task panicked");
            }
        }

        info!(
            count,
            elapsed_seconds = started.elapsed().as_secs_f64(),
            "Completed generation batch"
        );
        Ok(count)
    }

    /// Execute a claimed row, retrying or failing it on error.
    #[instrument(skip_all, fields(generation_id = %generation.id, attempt = generation.attempts))]
    pub async fn run_claimed(&self, generation: GenerationModel) {
        let started = Instant::now();
        let result = self.execute(&generation).await;
        histogram!("generation_job_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(completed) => {
                counter!("generation_jobs_total", "status" => "completed").increment(1);
                info!(tokens = completed.tokens_used, "Generation completed");
            }
            Err(err) => {
                if let Err(record_err) = self.handle_failure(generation, &err).await {
                    error!(error = %record_err, "Failed to record generation failure");
                }
            }
        }
    }

    /// Execute a row created in `processing` state for a synchronous request.
    /// Failures are recorded as terminal.
    pub async fn run_inline(
        &self,
        generation: GenerationModel,
    ) -> Result<GenerationModel, GenerationError> {
        let started = Instant::now();
        let result = self.execute(&generation).await;
        histogram!("generation_job_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(completed) => {
                counter!("generation_jobs_total", "status" => "completed").increment(1);
                Ok(completed)
            }
            Err(err) => {
                counter!("generation_jobs_total", "status" => "failed").increment(1);
                warn!(generation_id = %generation.id, error = %err, "Inline generation failed");
                ContentGenerationRepository::new(&self.db)
                    .record_failure(generation, err.to_string(), None)
                    .await?;
                Err(err)
            }
        }
    }

    /// The generation pipeline: prompt, provider call, persistence and mails.
    pub async fn execute(
        &self,
        generation: &GenerationModel,
    ) -> Result<GenerationModel, GenerationError> {
        let job = self.prepare(generation).await?;

        let limit = self.config.max_run_seconds;
        let content = tokio::time::timeout(
            Duration::from_secs(limit),
            self.ai.generate_simple_content(&job.prompt),
        )
        .await
        .map_err(|_| GenerationError::Timeout(limit))??;

        let tokens = estimate_tokens(&format!("{}{}", job.prompt, content));

        let txn = self.db.begin().await.map_err(RepositoryError::from)?;
        let completed =
            ContentGenerationRepository::mark_completed(&txn, generation.clone(), content, tokens)
                .await?;
        let tenant = TenantRepository::add_token_usage(&txn, job.tenant.id, tokens).await?;
        txn.commit().await.map_err(RepositoryError::from)?;

        counter!("tenant_tokens_consumed_total").increment(tokens.max(0) as u64);

        self.notify_success(&completed, &job.page, &tenant, tokens)
            .await;
        Ok(completed)
    }

    async fn prepare(&self, generation: &GenerationModel) -> Result<PreparedJob, GenerationError> {
        let page = PageRepository::new(&self.db)
            .find_by_id(generation.page_id)
            .await?
            .ok_or(GenerationError::PageMissing)?;

        let Some(prompt_id) = generation.prompt_id else {
            return Err(GenerationError::PromptMissing);
        };
        PromptRepository::new(&self.db)
            .find_by_id(prompt_id)
            .await?
            .ok_or(GenerationError::PromptMissing)?;

        let tenant = TenantRepository::new(&self.db)
            .find_by_id(generation.tenant_id)
            .await?
            .ok_or(GenerationError::TenantMissing)?;
        if tenant.remaining_tokens() == 0 {
            return Err(GenerationError::QuotaExceeded);
        }

        let variables: BTreeMap<String, String> = generation.variable_pairs().into_iter().collect();
        let prompt = build_generation_prompt(
            &generation.prompt_template,
            &variables,
            &page,
            generation.additional_instructions.as_deref(),
        );

        Ok(PreparedJob {
            page,
            tenant,
            prompt,
        })
    }

    async fn notify_success(
        &self,
        generation: &GenerationModel,
        page: &PageModel,
        tenant: &TenantModel,
        tokens: i64,
    ) {
        self.notify_creator(generation, page, true).await;

        let after = tenant.tokens_used_current;
        if crosses_high_usage(after - tokens, after, tenant.tokens_monthly_limit) {
            self.notifier.notify_high_usage(tenant).await;
        }
    }

    async fn notify_creator(&self, generation: &GenerationModel, page: &PageModel, success: bool) {
        let Some(user_id) = generation.created_by else {
            return;
        };
        match UserRepository::new(&self.db).find_by_id(user_id).await {
            Ok(Some(user)) => {
                self.notifier
                    .send_generation_result(&user, generation, page, success)
                    .await;
            }
            Ok(None) => debug!(%user_id, "Generation creator no longer exists"),
            Err(err) => warn!(error = %err, "Failed to load generation creator"),
        }
    }

    async fn handle_failure(
        &self,
        generation: GenerationModel,
        err: &GenerationError,
    ) -> Result<(), RepositoryError> {
        let repo = ContentGenerationRepository::new(&self.db);
        let attempts = generation.attempts;

        if err.is_retryable() && attempts < self.config.max_attempts {
            let retry_at = self.retry_at(attempts, err);
            counter!("generation_jobs_total", "status" => "retried").increment(1);
            warn!(
                attempts,
                retry_at = %retry_at,
                error = %err,
                "Generation failed, scheduling retry"
            );
            repo.record_failure(generation, err.to_string(), Some(retry_at))
                .await?;
            return Ok(());
        }

        let message = if err.is_retryable() {
            format!("Job failed after maximum retry attempts: {err}")
        } else {
            err.to_string()
        };
        counter!("generation_jobs_total", "status" => "failed").increment(1);
        error!(attempts, error = %err, "Generation failed permanently");

        let failed = repo.record_failure(generation, message, None).await?;
        if let Ok(Some(page)) = PageRepository::new(&self.db).find_by_id(failed.page_id).await {
            self.notify_creator(&failed, &page, false).await;
        }
        Ok(())
    }

    /// A `processing` row older than this has lost its worker. Twice the
    /// run timeout, so a live run always finishes first.
    fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.max_run_seconds.saturating_mul(2) as i64)
    }

    fn retry_at(&self, attempts: i32, err: &GenerationError) -> DateTime<Utc> {
        let mut delay = backoff_seconds(self.config.backoff_base_seconds, attempts);
        if let GenerationError::Ai(AiError::RateLimited {
            retry_after: Some(retry_after),
        }) = err
        {
            delay = delay.max(*retry_after as f64);
        }
        if delay > 0.0 {
            delay += thread_rng().gen_range(0.0..JITTER_FACTOR * delay);
        }
        Utc::now() + chrono::Duration::milliseconds((delay * 1_000.0) as i64)
    }
}

/// `base × 2^(attempts-1)` seconds, before jitter.
pub fn backoff_seconds(base: u64, attempts: i32) -> f64 {
    let exponent = attempts.saturating_sub(1).clamp(0, 16);
    base as f64 * 2_f64.powi(exponent)
}
