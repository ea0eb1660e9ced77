use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ids::{LineId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineState {
    Waiting,
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl LineState {
    /// A decided line has been acted on and will not become pending again
    /// through normal level advance.
    pub fn is_decided(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Withdrawn)
    }
}

/// A concrete, request-bound instantiation of a rule step. The approver is
/// immutable once the line is generated; only the state and note move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub sequence: u32,
    pub name: String,
    pub approver: UserId,
    pub required: bool,
    pub state: LineState,
    pub note: Option<String>,
}

impl Line {
    pub fn new(sequence: u32, name: impl Into<String>, approver: UserId) -> Self {
        Self {
            id: LineId(Uuid::new_v4().to_string()),
            sequence,
            name: name.into(),
            approver,
            required: true,
            state: LineState::Waiting,
            note: None,
        }
    }
}
