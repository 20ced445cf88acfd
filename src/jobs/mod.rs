//! Scheduled Jobs
//!
//! Background maintenance: rate-limit bucket cleanup, refresh-token purging,
//! and surfacing cash transactions whose passcode expired without being
//! confirmed.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

/// Revoked and expired refresh tokens are kept this long for auditability
const TOKEN_RETENTION_DAYS: i32 = 7;

// =========================================================================
// Rate Limit Bucket Cleanup Job
// =========================================================================

/// Clean up expired rate limit buckets.
/// Removes buckets older than 2 minutes to prevent unbounded growth.
pub async fn cleanup_rate_limit_buckets(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM rate_limit_buckets
        WHERE window_start < NOW() - INTERVAL '2 minutes'
        "#,
    )
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            "Cleaned up expired rate limit buckets"
        );
    }

    Ok(rows_deleted)
}

// =========================================================================
// Refresh Token Purge Job
// =========================================================================

/// Delete refresh tokens that expired or were revoked more than the
/// retention window ago. Active tokens are never touched.
pub async fn purge_refresh_tokens(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM refresh_tokens
        WHERE expires_at < NOW() - ($1 * INTERVAL '1 day')
           OR revoked_at < NOW() - ($1 * INTERVAL '1 day')
        "#,
    )
    .bind(TOKEN_RETENTION_DAYS)
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Purged old refresh tokens");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Stale Cash Transaction Report Job
// =========================================================================

/// Count cash transactions still pending after their passcode expired.
/// The confirm path already rejects expired passcodes, so these rows are
/// inert; the count is surfaced for operators watching agent follow-through.
pub async fn report_stale_cash_transactions(pool: &PgPool) -> Result<i64, JobError> {
    let stale: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM agent_transactions
        WHERE status = 'pending' AND otp_expires_at < NOW()
        "#,
    )
    .fetch_one(pool)
    .await?;

    if stale > 0 {
        tracing::warn!(
            stale_count = stale,
            "Cash transactions pending past passcode expiry"
        );
    }

    Ok(stale)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for rate limit cleanup (default: 1 minute)
    pub rate_limit_cleanup_interval: Duration,
    /// Interval for refresh token purge (default: 1 hour)
    pub token_purge_interval: Duration,
    /// Interval for stale cash transaction report (default: 5 minutes)
    pub stale_cash_report_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            rate_limit_cleanup_interval: Duration::from_secs(60),
            token_purge_interval: Duration::from_secs(3600),
            stale_cash_report_interval: Duration::from_secs(300),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job scheduler in the background.
    /// Returns a handle that can be used to abort the scheduler.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut rate_limit_interval = interval(self.config.rate_limit_cleanup_interval);
        let mut token_interval = interval(self.config.token_purge_interval);
        let mut stale_cash_interval = interval(self.config.stale_cash_report_interval);

        loop {
            tokio::select! {
                _ = rate_limit_interval.tick() => {
                    if let Err(e) = cleanup_rate_limit_buckets(&self.pool).await {
                        tracing::error!(error = %e, "Rate limit cleanup failed");
                    }
                }
                _ = token_interval.tick() => {
                    if let Err(e) = purge_refresh_tokens(&self.pool).await {
                        tracing::error!(error = %e, "Refresh token purge failed");
                    }
                }
                _ = stale_cash_interval.tick() => {
                    if let Err(e) = report_stale_cash_transactions(&self.pool).await {
                        tracing::error!(error = %e, "Stale cash transaction report failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match cleanup_rate_limit_buckets(&self.pool).await {
            Ok(count) => report.rate_limit_buckets_cleaned = count,
            Err(e) => report.errors.push(format!("Rate limit cleanup: {}", e)),
        }

        match purge_refresh_tokens(&self.pool).await {
            Ok(count) => report.refresh_tokens_purged = count,
            Err(e) => report.errors.push(format!("Refresh token purge: {}", e)),
        }

        match report_stale_cash_transactions(&self.pool).await {
            Ok(count) => report.stale_cash_transactions = count,
            Err(e) => report.errors.push(format!("Stale cash report: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub rate_limit_buckets_cleaned: u64,
    pub refresh_tokens_purged: u64,
    pub stale_cash_transactions: i64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
