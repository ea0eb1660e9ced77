use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ids::{CompanyId, DepartmentId, RuleId, UserId};

/// One entry in a rule's approver sequence. Lower `sequence` values come
/// first; steps sharing a `sequence` form one parallel approval level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub sequence: u32,
    pub approver: UserId,
    pub name: Option<String>,
}

/// A named routing template: company/department scope, an optional amount
/// threshold, and the ordered approver sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub company_id: Option<CompanyId>,
    pub department_id: Option<DepartmentId>,
    pub min_amount: Option<Decimal>,
    pub currency: String,
    pub active: bool,
    pub steps: Vec<Step>,
}

impl Rule {
    /// Steps in routing order: ascending sequence, insertion order as the
    /// tie-break within a level.
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|step| step.sequence);
        steps
    }
}
