//! Line generation. Turns a rule's approver sequence into concrete approval
//! lines for one request, with the first level activated.

use crate::directory::Directory;
use crate::domain::line::{Line, LineState};
use crate::domain::request::Request;
use crate::domain::rule::Rule;
use crate::errors::ValidationError;

/// Build the approval lines for `request` from `rule`.
///
/// Scope guards run first: a rule bound to a company or department only
/// routes requests inside that scope, and an amount threshold rejects
/// requests below it. Steps are walked in sequence order; steps with a blank
/// approver id are dropped rather than producing an unassignable line. The
/// line name prefers the step label, then the directory entry for the
/// approver, then the raw approver id. Every line in the lowest sequence
/// level starts pending, the rest start waiting.
pub fn build_lines(
    request: &Request,
    rule: &Rule,
    directory: &dyn Directory,
) -> Result<Vec<Line>, ValidationError> {
    if let Some(company_id) = &rule.company_id {
        if company_id != &request.company_id {
            return Err(ValidationError::CompanyMismatch { rule: rule.name.clone() });
        }
    }
    if let (Some(rule_department), Some(request_department)) =
        (&rule.department_id, &request.department_id)
    {
        if rule_department != request_department {
            return Err(ValidationError::DepartmentMismatch { rule: rule.name.clone() });
        }
    }
    if let Some(min_amount) = rule.min_amount {
        if request.amount < min_amount {
            return Err(ValidationError::AmountBelowMinimum {
                amount: request.amount,
                min_amount,
            });
        }
    }

    let mut lines = Vec::new();
    for step in rule.ordered_steps() {
        if step.approver.0.trim().is_empty() {
            continue;
        }
        let name = step
            .name
            .clone()
            .or_else(|| directory.display_name(&step.approver))
            .unwrap_or_else(|| step.approver.0.clone());
        lines.push(Line::new(step.sequence, name, step.approver.clone()));
    }

    if lines.is_empty() {
        return Err(ValidationError::NoApprovers { rule: rule.name.clone() });
    }

    let first_level = lines.iter().map(|line| line.sequence).min().unwrap_or(0);
    for line in lines.iter_mut().filter(|line| line.sequence == first_level) {
        line.state = LineState::Pending;
    }

    Ok(lines)
}
