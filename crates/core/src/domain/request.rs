use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ids::{CompanyId, DepartmentId, RequestId, RuleId, UserId};
use crate::domain::line::{Line, LineState};
use crate::errors::{ApprovalError, AuthorizationError, StateError, ValidationError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Draft,
    InReview,
    Approved,
    Rejected,
}

/// Creation input for a request. The id and display code are assigned by
/// the workflow service, everything else comes from the requester.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRequest {
    pub company_id: CompanyId,
    pub department_id: Option<DepartmentId>,
    pub requester: UserId,
    pub title: String,
    pub amount: Decimal,
    pub currency: String,
    pub rule_id: Option<RuleId>,
}

/// Critical-field edit surface. Anything here is frozen once the request
/// leaves draft; the revise path resets to draft first instead of bypassing
/// the freeze.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestPatch {
    pub title: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub department_id: Option<DepartmentId>,
    pub rule_id: Option<RuleId>,
}

impl RequestPatch {
    fn first_field(&self) -> Option<&'static str> {
        if self.title.is_some() {
            Some("title")
        } else if self.amount.is_some() {
            Some("amount")
        } else if self.currency.is_some() {
            Some("currency")
        } else if self.department_id.is_some() {
            Some("department")
        } else if self.rule_id.is_some() {
            Some("rule")
        } else {
            None
        }
    }
}

/// Read-only rendering of the full approval chain, shown to every
/// participant regardless of which line is theirs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOverview {
    pub sequence: u32,
    pub name: String,
    pub approver: UserId,
    pub required: bool,
    pub state: LineState,
    pub note: Option<String>,
}

/// A workflow instance: requester, amount, routing selection, lifecycle
/// state, and the generated approval lines (owned; discarded together on
/// revise).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub code: String,
    pub title: String,
    pub company_id: CompanyId,
    pub department_id: Option<DepartmentId>,
    pub requester: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub rule_id: Option<RuleId>,
    pub state: RequestState,
    pub revision: u32,
    pub revised_by: Option<UserId>,
    pub revised_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub lines: Vec<Line>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn create(id: RequestId, code: impl Into<String>, spec: NewRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            code: code.into(),
            title: spec.title,
            company_id: spec.company_id,
            department_id: spec.department_id,
            requester: spec.requester,
            amount: spec.amount,
            currency: spec.currency,
            rule_id: spec.rule_id,
            state: RequestState::Draft,
            revision: 0,
            revised_by: None,
            revised_at: None,
            submitted_at: None,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_transition_to(&self, next: RequestState) -> bool {
        matches!(
            (self.state, next),
            (RequestState::Draft, RequestState::InReview)
                | (RequestState::InReview, RequestState::Approved)
                | (RequestState::InReview, RequestState::Rejected)
                // Revert of the final approval pulls the request back.
                | (RequestState::Approved, RequestState::InReview)
                // Revise re-entry.
                | (RequestState::InReview, RequestState::Draft)
                | (RequestState::Approved, RequestState::Draft)
                | (RequestState::Rejected, RequestState::Draft)
        )
    }

    pub fn transition_to(&mut self, next: RequestState, action: &'static str) -> Result<(), StateError> {
        if self.can_transition_to(next) {
            self.state = next;
            self.updated_at = Utc::now();
            return Ok(());
        }
        Err(StateError::InvalidState { action, state: self.state })
    }

    pub fn pending_lines(&self) -> Vec<&Line> {
        self.lines.iter().filter(|line| line.state == LineState::Pending).collect()
    }

    pub fn pending_line_for(&self, actor: &UserId) -> Option<&Line> {
        self.lines
            .iter()
            .find(|line| line.state == LineState::Pending && &line.approver == actor)
    }

    pub fn is_current_approver(&self, actor: &UserId) -> bool {
        self.pending_line_for(actor).is_some()
    }

    pub fn steps_overview(&self) -> Vec<StepOverview> {
        self.lines
            .iter()
            .map(|line| StepOverview {
                sequence: line.sequence,
                name: line.name.clone(),
                approver: line.approver.clone(),
                required: line.required,
                state: line.state,
                note: line.note.clone(),
            })
            .collect()
    }

    /// Apply a critical-field edit. Requester-only, draft-only.
    pub fn apply_patch(&mut self, patch: RequestPatch, actor: &UserId) -> Result<(), ApprovalError> {
        if actor != &self.requester {
            return Err(AuthorizationError::NotRequester { action: "edit" }.into());
        }
        if let Some(field) = patch.first_field() {
            if self.state != RequestState::Draft {
                return Err(ValidationError::EditOutsideDraft { field }.into());
            }
        }

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(currency) = patch.currency {
            self.currency = currency;
        }
        if let Some(department_id) = patch.department_id {
            self.department_id = Some(department_id);
        }
        if let Some(rule_id) = patch.rule_id {
            self.rule_id = Some(rule_id);
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Deletion is requester-only and limited to draft/rejected requests.
    pub fn can_delete(&self, actor: &UserId) -> Result<(), ApprovalError> {
        if actor != &self.requester {
            return Err(AuthorizationError::NotRequester { action: "delete" }.into());
        }
        match self.state {
            RequestState::Draft | RequestState::Rejected => Ok(()),
            state => Err(StateError::InvalidState { action: "delete", state }.into()),
        }
    }
}
