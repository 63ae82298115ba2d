//! Exactly-once admission for pay-and-convert requests.
//!
//! A request is admitted by inserting a `PENDING` attempt row under the
//! client's key. The unique index on the key is the only lock: when two
//! first-time requests race, one insert wins and the other surfaces as a
//! conflict. The winner later moves the row to `COMPLETED` (caching the
//! response body) or `FAILED`.

use chrono::{Duration, Utc};
use entity::conversion_attempt::{self, Status};
use platform_db::is_unique_violation;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EnrollmentError, EnrollmentResult};

pub const MAX_KEY_LEN: usize = 128;

/// What the caller should do with an incoming request.
#[derive(Debug)]
pub enum Admission {
    /// A previous request with this key completed; answer with its body.
    Replay(Value),
    /// A fresh attempt row was inserted; run the workflow.
    Proceed(conversion_attempt::Model),
}

/// Trim and bound a client-supplied idempotency key.
pub fn normalize_key(raw: &str) -> EnrollmentResult<String> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(EnrollmentError::validation("idempotencyKey is required"));
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(EnrollmentError::validation(format!(
            "idempotencyKey must be at most {MAX_KEY_LEN} characters"
        )));
    }
    Ok(key.to_string())
}

#[derive(Clone, Debug)]
pub struct IdempotencyGuard {
    stale_after: Duration,
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::new(Duration::minutes(15))
    }
}

impl IdempotencyGuard {
    /// `stale_after` bounds how long a `PENDING` attempt blocks its key; an
    /// older one is assumed abandoned by a crashed worker.
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    pub async fn admit<C: ConnectionTrait>(
        &self,
        db: &C,
        key: &str,
        invoice_id: Uuid,
    ) -> EnrollmentResult<Admission> {
        let existing = conversion_attempt::Entity::find()
            .filter(conversion_attempt::Column::IdempotencyKey.eq(key))
            .one(db)
            .await?;

        if let Some(attempt) = existing {
            match attempt.status {
                Status::Completed => {
                    if attempt.invoice_id != invoice_id {
                        return Err(EnrollmentError::conflict(
                            "idempotency key was already used for a different invoice",
                        ));
                    }
                    let body = attempt.result.ok_or_else(|| {
                        EnrollmentError::Internal(format!(
                            "completed attempt {} has no cached result",
                            attempt.id
                        ))
                    })?;
                    tracing::info!(attempt_id = %attempt.id, "replaying completed conversion");
                    return Ok(Admission::Replay(body));
                }
                Status::Pending => {
                    let age = Utc::now() - attempt.updated_at.with_timezone(&Utc);
                    if age < self.stale_after {
                        return Err(EnrollmentError::conflict(
                            "a conversion with this idempotency key is already in progress",
                        ));
                    }
                    tracing::warn!(attempt_id = %attempt.id, "reclaiming stale pending attempt");
                    self.discard(db, attempt.id, Status::Pending).await?;
                }
                Status::Failed => {
                    self.discard(db, attempt.id, Status::Failed).await?;
                }
            }
        }

        let now = Utc::now();
        let attempt_id = Uuid::new_v4();
        let row = conversion_attempt::ActiveModel {
            id: Set(attempt_id),
            idempotency_key: Set(key.to_string()),
            invoice_id: Set(invoice_id),
            status: Set(Status::Pending),
            result: Set(None),
            error_message: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        match conversion_attempt::Entity::insert(row)
            .exec_without_returning(db)
            .await
        {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(EnrollmentError::conflict(
                    "a conversion with this idempotency key is already in progress",
                ));
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Admission::Proceed(conversion_attempt::Model {
            id: attempt_id,
            idempotency_key: key.to_string(),
            invoice_id,
            status: Status::Pending,
            result: None,
            error_message: None,
            created_at: now.into(),
            updated_at: now.into(),
        }))
    }

    /// Delete a finished or abandoned attempt, but only if nobody else
    /// reclaimed it first.
    async fn discard<C: ConnectionTrait>(
        &self,
        db: &C,
        attempt_id: Uuid,
        expected: Status,
    ) -> EnrollmentResult<()> {
        let res = conversion_attempt::Entity::delete_many()
            .filter(conversion_attempt::Column::Id.eq(attempt_id))
            .filter(conversion_attempt::Column::Status.eq(expected))
            .exec(db)
            .await?;
        if res.rows_affected == 0 {
            return Err(EnrollmentError::conflict(
                "a conversion with this idempotency key is already in progress",
            ));
        }
        Ok(())
    }

    pub async fn complete<C: ConnectionTrait>(
        &self,
        db: &C,
        attempt_id: Uuid,
        result: &Value,
    ) -> EnrollmentResult<()> {
        self.finish(db, attempt_id, Status::Completed, Some(result.clone()), None)
            .await
    }

    pub async fn fail<C: ConnectionTrait>(
        &self,
        db: &C,
        attempt_id: Uuid,
        message: &str,
    ) -> EnrollmentResult<()> {
        self.finish(db, attempt_id, Status::Failed, None, Some(message.to_string()))
            .await
    }

    async fn finish<C: ConnectionTrait>(
        &self,
        db: &C,
        attempt_id: Uuid,
        status: Status,
        result: Option<Value>,
        error_message: Option<String>,
    ) -> EnrollmentResult<()> {
        let patch = conversion_attempt::ActiveModel {
            status: Set(status),
            result: Set(result),
            error_message: Set(error_message),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        let res = conversion_attempt::Entity::update_many()
            .set(patch)
            .filter(conversion_attempt::Column::Id.eq(attempt_id))
            .filter(conversion_attempt::Column::Status.eq(Status::Pending))
            .exec(db)
            .await?;
        if res.rows_affected == 0 {
            tracing::warn!(%attempt_id, ?status, "attempt was no longer pending");
        }
        Ok(())
    }
}
