//! The boundary service. Every state transition runs in one transaction:
//! read the request and its lines, run the pure engine, write the changes
//! back with state-guarded line updates, commit, then dispatch side effects
//! through the notifier. A guard miss on a pending decision means another
//! transaction decided the line first and surfaces as `NotCurrentApprover`
//! rather than a double-applied decision.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{Row, SqliteConnection};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use signoff_core::directory::Directory;
use signoff_core::domain::ids::{LineId, RequestId, UserId};
use signoff_core::domain::line::{Line, LineState};
use signoff_core::domain::request::{NewRequest, Request, RequestPatch, StepOverview};
use signoff_core::engine::{self, TransitionOutcome};
use signoff_core::errors::{ApprovalError, AuthorizationError, ValidationError};
use signoff_core::notify::{ActivityGateway, Notifier};

use crate::repositories::request::{
    delete_request, fetch_request, replace_lines, store_request_row, update_line_state_guarded,
    row_to_line,
};
use crate::repositories::rule::fetch_rule;
use crate::repositories::RepositoryError;
use crate::DbPool;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("request `{0}` was not found")]
    RequestNotFound(String),
    #[error("rule `{0}` was not found")]
    RuleNotFound(String),
    #[error("the request was modified by a concurrent transaction")]
    Conflict,
}

impl From<sqlx::Error> for WorkflowError {
    fn from(error: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(error))
    }
}

pub struct ApprovalWorkflow<G> {
    pool: DbPool,
    notifier: Notifier<G>,
    directory: Arc<dyn Directory>,
}

impl<G> ApprovalWorkflow<G>
where
    G: ActivityGateway,
{
    pub fn new(pool: DbPool, notifier: Notifier<G>, directory: Arc<dyn Directory>) -> Self {
        Self { pool, notifier, directory }
    }

    pub fn notifier(&self) -> &Notifier<G> {
        &self.notifier
    }

    /// Create a draft request with a fresh per-company display code. The
    /// department defaults from the selected rule when the caller leaves it
    /// unset.
    pub async fn create_request(&self, mut spec: NewRequest) -> Result<Request, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        if spec.department_id.is_none() {
            if let Some(rule_id) = &spec.rule_id {
                if let Some(rule) = fetch_rule(&mut tx, rule_id).await? {
                    spec.department_id = rule.department_id;
                }
            }
        }

        let next: i64 = sqlx::query_scalar(
            "INSERT INTO request_sequence (company_id, last_value) VALUES (?, 1)
             ON CONFLICT(company_id) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
        )
        .bind(&spec.company_id.0)
        .fetch_one(&mut *tx)
        .await?;

        let request =
            Request::create(RequestId(Uuid::new_v4().to_string()), format!("APR-{next:05}"), spec);
        store_request_row(&mut tx, &request).await?;
        tx.commit().await?;

        info!(request = %request.code, "request created");
        Ok(request)
    }

    /// Apply a critical-field edit. Draft-only and requester-only, enforced
    /// by the domain.
    pub async fn update_request(
        &self,
        id: &RequestId,
        patch: RequestPatch,
        actor: &UserId,
    ) -> Result<Request, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let mut request = self.load(&mut tx, id).await?;

        request.apply_patch(patch, actor).map_err(ApprovalError::from)?;

        store_request_row(&mut tx, &request).await?;
        tx.commit().await?;
        Ok(request)
    }

    pub async fn submit(&self, id: &RequestId, actor: &UserId) -> Result<Request, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let mut request = self.load(&mut tx, id).await?;

        if actor != &request.requester {
            return Err(ApprovalError::from(AuthorizationError::NotRequester {
                action: "submit",
            })
            .into());
        }
        let rule_id = request
            .rule_id
            .clone()
            .ok_or(ApprovalError::Validation(ValidationError::NoRuleSelected))?;
        let rule = fetch_rule(&mut tx, &rule_id)
            .await?
            .ok_or_else(|| WorkflowError::RuleNotFound(rule_id.0.clone()))?;

        let outcome = engine::submit(&mut request, &rule, self.directory.as_ref())?;
        let actions = match outcome {
            TransitionOutcome::Ignored => return Ok(request),
            TransitionOutcome::Applied { actions } => actions,
            TransitionOutcome::Stalled { actions, .. } => actions,
        };

        store_request_row(&mut tx, &request).await?;
        replace_lines(&mut tx, &request).await?;
        tx.commit().await?;

        info!(request = %request.code, revision = request.revision, "request submitted");
        self.notifier.dispatch(&request, &actions).await;
        Ok(request)
    }

    pub async fn approve(
        &self,
        id: &RequestId,
        actor: &UserId,
        note: Option<String>,
    ) -> Result<Request, WorkflowError> {
        let (request, stall) = self.run_decision(id, |request| {
            engine::approve(request, actor, note.clone())
        })
        .await?;

        if let Some(notice) = stall {
            return Err(ApprovalError::ConfigurationInvariant(notice).into());
        }
        Ok(request)
    }

    pub async fn reject(
        &self,
        id: &RequestId,
        actor: &UserId,
        note: Option<String>,
    ) -> Result<Request, WorkflowError> {
        let (request, _) = self
            .run_decision(id, |request| engine::reject(request, actor, note.clone()))
            .await?;
        Ok(request)
    }

    /// Withdrawing is allowed to leave the chain unresolvable; the stall is
    /// reported through the operator alert, not as an error to the actor.
    pub async fn opt_out(&self, id: &RequestId, actor: &UserId) -> Result<Request, WorkflowError> {
        let (request, _) = self.run_decision(id, |request| engine::opt_out(request, actor)).await?;
        Ok(request)
    }

    pub async fn revert_approval(
        &self,
        id: &RequestId,
        actor: &UserId,
    ) -> Result<Request, WorkflowError> {
        let (request, _) = self
            .run_decision(id, |request| engine::revert_approval(request, actor))
            .await?;
        Ok(request)
    }

    pub async fn revise(&self, id: &RequestId, actor: &UserId) -> Result<Request, WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let mut request = self.load(&mut tx, id).await?;

        let outcome = engine::revise(&mut request, actor)?;
        let actions = match outcome {
            TransitionOutcome::Ignored => return Ok(request),
            TransitionOutcome::Applied { actions } => actions,
            TransitionOutcome::Stalled { actions, .. } => actions,
        };

        store_request_row(&mut tx, &request).await?;
        replace_lines(&mut tx, &request).await?;
        tx.commit().await?;

        info!(request = %request.code, revision = request.revision, "request reset for revision");
        self.notifier.dispatch(&request, &actions).await;
        Ok(request)
    }

    pub async fn delete(&self, id: &RequestId, actor: &UserId) -> Result<(), WorkflowError> {
        let mut tx = self.pool.begin().await?;
        let request = self.load(&mut tx, id).await?;

        request.can_delete(actor).map_err(ApprovalError::from)?;

        delete_request(&mut tx, id).await?;
        tx.commit().await?;

        info!(request = %request.code, "request deleted");
        Ok(())
    }

    pub async fn is_current_approver(
        &self,
        id: &RequestId,
        actor: &UserId,
    ) -> Result<bool, WorkflowError> {
        let mut conn = self.pool.acquire().await?;
        let request = fetch_request(&mut conn, id)
            .await?
            .ok_or_else(|| WorkflowError::RequestNotFound(id.0.clone()))?;
        Ok(request.is_current_approver(actor))
    }

    pub async fn steps_overview(
        &self,
        id: &RequestId,
    ) -> Result<Vec<StepOverview>, WorkflowError> {
        let mut conn = self.pool.acquire().await?;
        let request = fetch_request(&mut conn, id)
            .await?
            .ok_or_else(|| WorkflowError::RequestNotFound(id.0.clone()))?;
        Ok(request.steps_overview())
    }

    /// Every line currently waiting on `actor`, across all in-review
    /// requests.
    pub async fn pending_lines_for(
        &self,
        actor: &UserId,
    ) -> Result<Vec<(RequestId, Line)>, WorkflowError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            "SELECT l.id, l.request_id, l.sequence, l.name, l.approver_id, l.required,
                    l.state, l.note
             FROM approval_line l
             JOIN approval_request r ON r.id = l.request_id
             WHERE l.approver_id = ? AND l.state = 'pending' AND r.state = 'in_review'
             ORDER BY r.code ASC, l.position ASC",
        )
        .bind(&actor.0)
        .fetch_all(&mut *conn)
        .await?;

        rows.iter()
            .map(|row| {
                let request_id: String = row
                    .try_get("request_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok((RequestId(request_id), row_to_line(row)?))
            })
            .collect::<Result<Vec<_>, RepositoryError>>()
            .map_err(WorkflowError::from)
    }

    async fn load(
        &self,
        conn: &mut SqliteConnection,
        id: &RequestId,
    ) -> Result<Request, WorkflowError> {
        fetch_request(conn, id)
            .await?
            .ok_or_else(|| WorkflowError::RequestNotFound(id.0.clone()))
    }

    /// Shared path for per-line decisions (approve, reject, opt out,
    /// revert). Returns the stall notice, if any, for the caller to map.
    async fn run_decision<F>(
        &self,
        id: &RequestId,
        decide: F,
    ) -> Result<(Request, Option<String>), WorkflowError>
    where
        F: FnOnce(&mut Request) -> Result<TransitionOutcome, ApprovalError>,
    {
        let mut tx = self.pool.begin().await?;
        let mut request = self.load(&mut tx, id).await?;
        let before = line_snapshot(&request);

        let outcome = decide(&mut request)?;
        let (actions, stall) = match outcome {
            TransitionOutcome::Ignored => return Ok((request, None)),
            TransitionOutcome::Applied { actions } => (actions, None),
            TransitionOutcome::Stalled { actions, notice } => (actions, Some(notice)),
        };

        apply_line_diff(&mut tx, &request, &before).await?;
        store_request_row(&mut tx, &request).await?;
        tx.commit().await?;

        self.notifier.dispatch(&request, &actions).await;
        Ok((request, stall))
    }
}

fn line_snapshot(request: &Request) -> HashMap<LineId, LineState> {
    request.lines.iter().map(|line| (line.id.clone(), line.state)).collect()
}

/// Write back every line whose state moved, guarded on the state it was
/// read at. A lost pending decision is an authorization failure for the
/// actor; any other guard miss is a plain conflict.
async fn apply_line_diff(
    conn: &mut SqliteConnection,
    request: &Request,
    before: &HashMap<LineId, LineState>,
) -> Result<(), WorkflowError> {
    for line in &request.lines {
        let previous = match before.get(&line.id) {
            Some(previous) if *previous != line.state => *previous,
            _ => continue,
        };

        let touched = update_line_state_guarded(
            conn,
            &line.id,
            previous,
            line.state,
            line.note.as_deref(),
        )
        .await?;
        if touched == 0 {
            if previous == LineState::Pending && line.state.is_decided() {
                return Err(ApprovalError::Authorization(
                    AuthorizationError::NotCurrentApprover,
                )
                .into());
            }
            return Err(WorkflowError::Conflict);
        }
    }
    Ok(())
}
