use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::request::RequestState;

/// User-correctable input problems. Surfaced directly to the caller with no
/// partial effect.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no approval rule selected")]
    NoRuleSelected,
    #[error("rule `{rule}` has no approvers defined")]
    NoApprovers { rule: String },
    #[error("amount {amount} is below the rule minimum {min_amount}")]
    AmountBelowMinimum { amount: Decimal, min_amount: Decimal },
    #[error("rule `{rule}` belongs to another company")]
    CompanyMismatch { rule: String },
    #[error("rule `{rule}` belongs to another department")]
    DepartmentMismatch { rule: String },
    #[error("`{field}` can only be changed while the request is a draft")]
    EditOutsideDraft { field: &'static str },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("you are not the current approver")]
    NotCurrentApprover,
    #[error("only the requester may {action} this request")]
    NotRequester { action: &'static str },
    #[error("only the creator of this reminder may {action} it")]
    NotReminderOwner { action: &'static str },
    #[error("only the assignee or creator of this reminder may mark it done")]
    NotReminderAssignee,
}

/// Lifecycle misuse that is raised explicitly. Approve/reject/submit in the
/// wrong state are silent no-ops instead, so repeated button clicks stay
/// harmless.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("cannot {action} a request in state {state:?}")]
    InvalidState { action: &'static str, state: RequestState },
    #[error("you have no approved step to revert")]
    NothingToRevert,
    #[error("a later approval step has already acted")]
    LaterStepActed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("approval configuration invariant violated: {0}")]
    ConfigurationInvariant(String),
}
