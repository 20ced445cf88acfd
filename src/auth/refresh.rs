//! Refresh tokens
//!
//! Opaque refresh tokens rotated on every use. Only a sha256 digest of the
//! token is stored; the plaintext exists once, in the response that issued
//! it. Rotation revokes the presented token and inserts its replacement in
//! one database transaction, and the revocation is a conditional update so
//! two concurrent uses of the same token cannot both succeed.

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// Refresh tokens expire after 30 days.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Raw token length in bytes before hex encoding
const TOKEN_BYTES: usize = 48;

/// Result of a successful rotation
#[derive(Debug)]
pub struct RotatedToken {
    pub user_id: Uuid,
    pub token: String,
}

/// Refresh-token persistence and rotation
pub struct RefreshTokenService {
    pool: PgPool,
}

impl RefreshTokenService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Issue a new refresh token for the user and return the plaintext.
    pub async fn create(&self, user_id: Uuid) -> Result<String, AppError> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token_hash(&token))
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// Rotate the presented token: revoke it and issue a replacement.
    ///
    /// Fails with `InvalidRefresh` if the token is unknown, already revoked,
    /// or expired. The revoking UPDATE is guarded on `revoked_at IS NULL`,
    /// so a concurrent rotation of the same token loses.
    pub async fn rotate(&self, token: &str) -> Result<RotatedToken, AppError> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            RETURNING user_id
            "#,
        )
        .bind(token_hash(token))
        .fetch_optional(&mut *tx)
        .await?;

        let user_id = user_id.ok_or(AppError::InvalidRefresh)?;

        let new_token = generate_token();
        let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token_hash(&new_token))
        .bind(user_id)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RotatedToken {
            user_id,
            token: new_token,
        })
    }

    /// Revoke the presented token without issuing a replacement (logout).
    /// Idempotent: revoking an unknown or already-revoked token is a no-op.
    pub async fn revoke(&self, token: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token_hash(token))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
