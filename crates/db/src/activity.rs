//! SQL-backed activity gateway. Reminders live in the `activity` table and
//! the chatter/event log in `request_event`; the event log doubles as the
//! durable record the notification throttle searches.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use signoff_core::domain::ids::{ActivityId, RequestId, UserId};
use signoff_core::engine::EventKind;
use signoff_core::errors::AuthorizationError;
use signoff_core::guard::{ReminderPolicy, ReminderRef};
use signoff_core::notify::{ActivityGateway, GatewayError};

use crate::DbPool;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("reminder `{0}` was not found")]
    NotFound(String),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct SqlActivityGateway {
    pool: DbPool,
}

impl SqlActivityGateway {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_reminder(
        &self,
        id: &ActivityId,
    ) -> Result<(ReminderRef, String), ActivityError> {
        let row = sqlx::query(
            "SELECT user_id, created_by, context, state FROM activity WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ActivityError::NotFound(id.0.clone()))?;

        let reminder = ReminderRef {
            created_by: UserId(row.get::<String, _>("created_by")),
            assigned_to: UserId(row.get::<String, _>("user_id")),
            context: row.get::<String, _>("context"),
        };
        Ok((reminder, row.get::<String, _>("state")))
    }

    /// Mark a reminder done, subject to the reminder policy.
    pub async fn complete_reminder(
        &self,
        policy: &ReminderPolicy,
        id: &ActivityId,
        actor: &UserId,
    ) -> Result<(), ActivityError> {
        let (reminder, _state) = self.load_reminder(id).await?;
        policy.can_complete(actor, &reminder)?;

        sqlx::query("UPDATE activity SET state = 'done', closed_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cancel a reminder, subject to the reminder policy.
    pub async fn cancel_reminder(
        &self,
        policy: &ReminderPolicy,
        id: &ActivityId,
        actor: &UserId,
    ) -> Result<(), ActivityError> {
        let (reminder, _state) = self.load_reminder(id).await?;
        policy.can_cancel(actor, &reminder)?;

        sqlx::query("UPDATE activity SET state = 'cancelled', closed_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn gateway_error(error: sqlx::Error) -> GatewayError {
    GatewayError(error.to_string())
}

#[async_trait]
impl ActivityGateway for SqlActivityGateway {
    async fn schedule_reminder(
        &self,
        request: &RequestId,
        user: &UserId,
        summary: &str,
    ) -> Result<ActivityId, GatewayError> {
        let id = ActivityId(Uuid::new_v4().to_string());
        sqlx::query(
            "INSERT INTO activity (id, request_id, user_id, created_by, summary, context,
                                   state, created_at)
             VALUES (?, ?, ?, ?, ?, 'approval_request', 'open', ?)",
        )
        .bind(&id.0)
        .bind(&request.0)
        .bind(&user.0)
        .bind(&user.0)
        .bind(summary)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(gateway_error)?;

        Ok(id)
    }

    async fn open_reminder_exists(
        &self,
        request: &RequestId,
        user: &UserId,
    ) -> Result<bool, GatewayError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM activity
             WHERE request_id = ? AND user_id = ? AND state = 'open'",
        )
        .bind(&request.0)
        .bind(&user.0)
        .fetch_one(&self.pool)
        .await
        .map_err(gateway_error)?;

        Ok(count > 0)
    }

    async fn close_reminders(
        &self,
        request: &RequestId,
        user: &UserId,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE activity SET state = 'done', closed_at = ?
             WHERE request_id = ? AND user_id = ? AND state = 'open'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&request.0)
        .bind(&user.0)
        .execute(&self.pool)
        .await
        .map_err(gateway_error)?;

        Ok(())
    }

    async fn cancel_all_reminders(&self, request: &RequestId) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE activity SET state = 'cancelled', closed_at = ?
             WHERE request_id = ? AND state = 'open'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&request.0)
        .execute(&self.pool)
        .await
        .map_err(gateway_error)?;

        Ok(())
    }

    async fn post_event(
        &self,
        request: &RequestId,
        kind: EventKind,
        body: &str,
        audience: &[UserId],
    ) -> Result<(), GatewayError> {
        let audience_json = serde_json::to_string(
            &audience.iter().map(|user| user.0.as_str()).collect::<Vec<_>>(),
        )
        .map_err(|e| GatewayError(e.to_string()))?;

        sqlx::query(
            "INSERT INTO request_event (id, request_id, kind, body, audience, posted_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&request.0)
        .bind(kind.as_str())
        .bind(body)
        .bind(&audience_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(gateway_error)?;

        Ok(())
    }

    async fn recent_event_exists(
        &self,
        request: &RequestId,
        user: &UserId,
        kind: EventKind,
        within_minutes: u32,
    ) -> Result<bool, GatewayError> {
        let cutoff = (Utc::now() - Duration::minutes(i64::from(within_minutes))).to_rfc3339();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM request_event
             WHERE request_id = ? AND kind = ? AND posted_at >= ?
               AND EXISTS (
                   SELECT 1 FROM json_each(request_event.audience)
                   WHERE json_each.value = ?
               )",
        )
        .bind(&request.0)
        .bind(kind.as_str())
        .bind(&cutoff)
        .bind(&user.0)
        .fetch_one(&self.pool)
        .await
        .map_err(gateway_error)?;

        Ok(count > 0)
    }
}
