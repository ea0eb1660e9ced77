//! Pure approval state machine. Operations mutate the request in memory and
//! return the side effects for the service layer to dispatch after the
//! transition is persisted.

use crate::directory::Directory;
use crate::domain::ids::UserId;
use crate::domain::line::LineState;
use crate::domain::request::{Request, RequestState};
use crate::domain::rule::Rule;
use crate::errors::{ApprovalError, AuthorizationError, StateError};
use crate::routing::build_lines;

/// Durable event-log entry kinds. `as_str` is the storage encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Submitted,
    StepApproved,
    StepRejected,
    StepWithdrawn,
    ApprovalReverted,
    RequestApproved,
    RequestRejected,
    ApprovalsReset,
    ApprovalNeeded,
    Diagnostic,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::StepApproved => "step_approved",
            Self::StepRejected => "step_rejected",
            Self::StepWithdrawn => "step_withdrawn",
            Self::ApprovalReverted => "approval_reverted",
            Self::RequestApproved => "request_approved",
            Self::RequestRejected => "request_rejected",
            Self::ApprovalsReset => "approvals_reset",
            Self::ApprovalNeeded => "approval_needed",
            Self::Diagnostic => "diagnostic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "submitted" => Some(Self::Submitted),
            "step_approved" => Some(Self::StepApproved),
            "step_rejected" => Some(Self::StepRejected),
            "step_withdrawn" => Some(Self::StepWithdrawn),
            "approval_reverted" => Some(Self::ApprovalReverted),
            "request_approved" => Some(Self::RequestApproved),
            "request_rejected" => Some(Self::RequestRejected),
            "approvals_reset" => Some(Self::ApprovalsReset),
            "approval_needed" => Some(Self::ApprovalNeeded),
            "diagnostic" => Some(Self::Diagnostic),
            _ => None,
        }
    }
}

/// Side effects a transition asks the service layer to perform. Dispatch is
/// best-effort and happens after the transition is committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    NotifyApprovers(Vec<UserId>),
    NotifyRequester(UserId),
    CloseActorReminders(UserId),
    CancelAllReminders,
    PostEvent { kind: EventKind, body: String, audience: Vec<UserId> },
    OperatorAlert(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied; dispatch the actions.
    Applied { actions: Vec<Action> },
    /// Wrong-state approve/reject/submit. Nothing changed, nothing to do.
    Ignored,
    /// The chain ran out of levels without every required line approved.
    /// The actor's decision is kept and the request stays in review; an
    /// operator has to untangle the configuration.
    Stalled { actions: Vec<Action>, notice: String },
}

enum LevelAdvance {
    PeersOpen,
    NextActivated { approvers: Vec<UserId> },
    Finalized,
    Exhausted { notice: String },
}

/// Submit a draft for review. Lines are rebuilt from the rule on every
/// submit, so a revised request routes against the rule's current steps.
pub fn submit(
    request: &mut Request,
    rule: &Rule,
    directory: &dyn Directory,
) -> Result<TransitionOutcome, ApprovalError> {
    if request.state != RequestState::Draft {
        return Ok(TransitionOutcome::Ignored);
    }

    let lines = build_lines(request, rule, directory)?;
    request.lines = lines;
    request.submitted_at = Some(chrono::Utc::now());
    request.transition_to(RequestState::InReview, "submit")?;

    let first_level: Vec<UserId> = request
        .pending_lines()
        .iter()
        .map(|line| line.approver.clone())
        .collect();
    let mut audience: Vec<UserId> = request.lines.iter().map(|l| l.approver.clone()).collect();
    audience.push(request.requester.clone());

    Ok(TransitionOutcome::Applied {
        actions: vec![
            Action::PostEvent {
                kind: EventKind::Submitted,
                body: format!("{} submitted for approval by {}", request.code, request.requester.0),
                audience,
            },
            Action::NotifyApprovers(first_level),
        ],
    })
}

/// Record the actor's approval and advance the chain.
pub fn approve(
    request: &mut Request,
    actor: &UserId,
    note: Option<String>,
) -> Result<TransitionOutcome, ApprovalError> {
    if request.state != RequestState::InReview {
        return Ok(TransitionOutcome::Ignored);
    }

    let level = decide_line(request, actor, LineState::Approved, note)?;
    let mut actions = vec![
        Action::CloseActorReminders(actor.clone()),
        Action::PostEvent {
            kind: EventKind::StepApproved,
            body: format!("{} approved a step on {}", actor.0, request.code),
            audience: vec![request.requester.clone()],
        },
    ];

    match advance_level(request, level) {
        LevelAdvance::PeersOpen => Ok(TransitionOutcome::Applied { actions }),
        LevelAdvance::NextActivated { approvers } => {
            actions.push(Action::NotifyApprovers(approvers));
            Ok(TransitionOutcome::Applied { actions })
        }
        LevelAdvance::Finalized => {
            request.transition_to(RequestState::Approved, "approve")?;
            actions.push(Action::PostEvent {
                kind: EventKind::RequestApproved,
                body: format!("{} is fully approved", request.code),
                audience: participants(request),
            });
            actions.push(Action::NotifyRequester(request.requester.clone()));
            Ok(TransitionOutcome::Applied { actions })
        }
        LevelAdvance::Exhausted { notice } => {
            actions.push(Action::OperatorAlert(notice.clone()));
            Ok(TransitionOutcome::Stalled { actions, notice })
        }
    }
}

/// Record the actor's rejection. A single rejection is terminal: every
/// outstanding reminder is cancelled and none is left open, so the outcome
/// reaches the requester through the event log only.
pub fn reject(
    request: &mut Request,
    actor: &UserId,
    note: Option<String>,
) -> Result<TransitionOutcome, ApprovalError> {
    if request.state != RequestState::InReview {
        return Ok(TransitionOutcome::Ignored);
    }

    decide_line(request, actor, LineState::Rejected, note)?;
    request.transition_to(RequestState::Rejected, "reject")?;

    Ok(TransitionOutcome::Applied {
        actions: vec![
            Action::CloseActorReminders(actor.clone()),
            Action::CancelAllReminders,
            Action::PostEvent {
                kind: EventKind::StepRejected,
                body: format!("{} rejected a step on {}", actor.0, request.code),
                audience: vec![request.requester.clone()],
            },
            Action::PostEvent {
                kind: EventKind::RequestRejected,
                body: format!("{} rejected {}", actor.0, request.code),
                audience: participants(request),
            },
        ],
    })
}

/// Pull a submitted request back to draft, discarding every line. Valid
/// from any post-draft state so a rejected or even approved request can be
/// corrected and rerouted.
pub fn revise(request: &mut Request, actor: &UserId) -> Result<TransitionOutcome, ApprovalError> {
    if actor != &request.requester {
        return Err(AuthorizationError::NotRequester { action: "revise" }.into());
    }

    let prior_participants = participants(request);
    request.transition_to(RequestState::Draft, "revise")?;
    request.lines.clear();
    request.submitted_at = None;
    request.revision += 1;
    request.revised_by = Some(actor.clone());
    request.revised_at = Some(chrono::Utc::now());

    Ok(TransitionOutcome::Applied {
        actions: vec![
            Action::CancelAllReminders,
            Action::PostEvent {
                kind: EventKind::ApprovalsReset,
                body: format!(
                    "{} reset for revision {} by {}",
                    request.code, request.revision, actor.0
                ),
                audience: prior_participants,
            },
        ],
    })
}

/// Undo the actor's own approval, provided nobody downstream has acted yet.
/// Lines promoted past the actor fall back to waiting. Only an in-review or
/// approved request can be pulled back; terminal rejection and draft raise.
pub fn revert_approval(
    request: &mut Request,
    actor: &UserId,
) -> Result<TransitionOutcome, ApprovalError> {
    if !matches!(request.state, RequestState::InReview | RequestState::Approved) {
        return Err(StateError::InvalidState { action: "revert", state: request.state }.into());
    }

    let index = request
        .lines
        .iter()
        .rposition(|line| &line.approver == actor && line.state == LineState::Approved)
        .ok_or(StateError::NothingToRevert)?;

    if request.lines[index + 1..].iter().any(|line| line.state.is_decided()) {
        return Err(StateError::LaterStepActed.into());
    }

    let mut demoted = Vec::new();
    for line in request.lines[index + 1..].iter_mut() {
        if line.state == LineState::Pending {
            line.state = LineState::Waiting;
            demoted.push(line.approver.clone());
        }
    }
    request.lines[index].state = LineState::Pending;

    if request.state == RequestState::Approved {
        request.transition_to(RequestState::InReview, "revert")?;
    }

    let mut actions: Vec<Action> =
        demoted.into_iter().map(Action::CloseActorReminders).collect();
    actions.push(Action::PostEvent {
        kind: EventKind::ApprovalReverted,
        body: format!("{} reverted their approval on {}", actor.0, request.code),
        audience: vec![request.requester.clone()],
    });

    Ok(TransitionOutcome::Applied { actions })
}

/// Withdraw from the actor's pending step without deciding it. The level
/// advances as if the line were resolved, but a withdrawn required line can
/// never finalize the request.
pub fn opt_out(request: &mut Request, actor: &UserId) -> Result<TransitionOutcome, ApprovalError> {
    if request.state != RequestState::InReview {
        return Ok(TransitionOutcome::Ignored);
    }

    let level = decide_line(request, actor, LineState::Withdrawn, None)?;
    let mut actions = vec![
        Action::CloseActorReminders(actor.clone()),
        Action::PostEvent {
            kind: EventKind::StepWithdrawn,
            body: format!("{} opted out of a step on {}", actor.0, request.code),
            audience: vec![request.requester.clone()],
        },
    ];

    match advance_level(request, level) {
        LevelAdvance::PeersOpen => Ok(TransitionOutcome::Applied { actions }),
        LevelAdvance::NextActivated { approvers } => {
            actions.push(Action::NotifyApprovers(approvers));
            Ok(TransitionOutcome::Applied { actions })
        }
        LevelAdvance::Finalized => {
            request.transition_to(RequestState::Approved, "approve")?;
            actions.push(Action::PostEvent {
                kind: EventKind::RequestApproved,
                body: format!("{} is fully approved", request.code),
                audience: participants(request),
            });
            actions.push(Action::NotifyRequester(request.requester.clone()));
            Ok(TransitionOutcome::Applied { actions })
        }
        LevelAdvance::Exhausted { notice } => {
            actions.push(Action::OperatorAlert(notice.clone()));
            Ok(TransitionOutcome::Stalled { actions, notice })
        }
    }
}

fn decide_line(
    request: &mut Request,
    actor: &UserId,
    state: LineState,
    note: Option<String>,
) -> Result<u32, ApprovalError> {
    let line = request
        .lines
        .iter_mut()
        .find(|line| line.state == LineState::Pending && &line.approver == actor)
        .ok_or(AuthorizationError::NotCurrentApprover)?;
    line.state = state;
    line.note = note;
    Ok(line.sequence)
}

fn advance_level(request: &mut Request, level: u32) -> LevelAdvance {
    let peers_open = request
        .lines
        .iter()
        .any(|line| line.sequence == level && line.state == LineState::Pending && line.required);
    if peers_open {
        return LevelAdvance::PeersOpen;
    }

    let next = request
        .lines
        .iter()
        .filter(|line| line.state == LineState::Waiting)
        .map(|line| line.sequence)
        .min();
    if let Some(next) = next {
        let mut approvers = Vec::new();
        for line in request
            .lines
            .iter_mut()
            .filter(|line| line.state == LineState::Waiting && line.sequence == next)
        {
            line.state = LineState::Pending;
            approvers.push(line.approver.clone());
        }
        return LevelAdvance::NextActivated { approvers };
    }

    let unresolved: Vec<&str> = request
        .lines
        .iter()
        .filter(|line| line.required && line.state != LineState::Approved)
        .map(|line| line.approver.0.as_str())
        .collect();
    if unresolved.is_empty() {
        LevelAdvance::Finalized
    } else {
        LevelAdvance::Exhausted {
            notice: format!(
                "{} exhausted its approval chain with unresolved required steps for: {}",
                request.code,
                unresolved.join(", ")
            ),
        }
    }
}

fn participants(request: &Request) -> Vec<UserId> {
    let mut audience = vec![request.requester.clone()];
    for line in &request.lines {
        if !audience.contains(&line.approver) {
            audience.push(line.approver.clone());
        }
    }
    audience
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::directory::InMemoryDirectory;
    use crate::domain::ids::{CompanyId, RequestId, RuleId, UserId};
    use crate::domain::line::LineState;
    use crate::domain::request::{NewRequest, Request, RequestState};
    use crate::domain::rule::{Rule, Step};
    use crate::errors::{ApprovalError, AuthorizationError, StateError, ValidationError};

    use super::{approve, opt_out, reject, revert_approval, revise, submit};
    use super::{Action, EventKind, TransitionOutcome};

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn rule(steps: &[(u32, &str)]) -> Rule {
        Rule {
            id: RuleId("rule-1".to_string()),
            name: "Purchasing".to_string(),
            company_id: None,
            department_id: None,
            min_amount: None,
            currency: "USD".to_string(),
            active: true,
            steps: steps
                .iter()
                .map(|(sequence, approver)| Step {
                    sequence: *sequence,
                    approver: user(approver),
                    name: None,
                })
                .collect(),
        }
    }

    fn draft_request() -> Request {
        Request::create(
            RequestId("req-1".to_string()),
            "APR-00001",
            NewRequest {
                company_id: CompanyId("acme".to_string()),
                department_id: None,
                requester: user("dana"),
                title: "New laptops".to_string(),
                amount: Decimal::new(50_000, 2),
                currency: "USD".to_string(),
                rule_id: Some(RuleId("rule-1".to_string())),
            },
        )
    }

    fn submitted(rule: &Rule) -> Request {
        let mut request = draft_request();
        submit(&mut request, rule, &InMemoryDirectory::new()).expect("submit");
        request
    }

    fn assert_applied(outcome: TransitionOutcome) -> Vec<Action> {
        match outcome {
            TransitionOutcome::Applied { actions } => actions,
            other => panic!("expected an applied transition, got {other:?}"),
        }
    }

    fn line_states(request: &Request) -> Vec<(&str, LineState)> {
        request.lines.iter().map(|l| (l.approver.0.as_str(), l.state)).collect()
    }

    #[test]
    fn sequential_chain_approves_level_by_level() {
        let rule = rule(&[(10, "alice"), (20, "bob")]);
        let mut request = submitted(&rule);

        assert_eq!(request.state, RequestState::InReview);
        assert!(request.is_current_approver(&user("alice")));
        assert!(!request.is_current_approver(&user("bob")));

        let actions =
            assert_applied(approve(&mut request, &user("alice"), None).expect("alice approves"));
        assert!(actions.contains(&Action::NotifyApprovers(vec![user("bob")])));
        assert_eq!(request.state, RequestState::InReview);
        assert!(request.is_current_approver(&user("bob")));

        let actions =
            assert_applied(approve(&mut request, &user("bob"), None).expect("bob approves"));
        assert_eq!(request.state, RequestState::Approved);
        assert!(actions.contains(&Action::NotifyRequester(user("dana"))));
        assert!(actions.iter().any(|action| matches!(
            action,
            Action::PostEvent { kind: EventKind::RequestApproved, .. }
        )));
    }

    #[test]
    fn parallel_peers_must_all_approve_before_the_level_advances() {
        let rule = rule(&[(10, "alice"), (10, "bob"), (20, "carol")]);
        let mut request = submitted(&rule);

        let actions =
            assert_applied(approve(&mut request, &user("alice"), None).expect("alice approves"));
        assert!(!actions.iter().any(|a| matches!(a, Action::NotifyApprovers(_))));
        assert!(request.is_current_approver(&user("bob")));
        assert!(!request.is_current_approver(&user("carol")));

        assert_applied(approve(&mut request, &user("bob"), None).expect("bob approves"));
        assert!(request.is_current_approver(&user("carol")));
    }

    #[test]
    fn out_of_turn_and_replayed_approvals_are_refused() {
        let rule = rule(&[(10, "alice"), (20, "bob")]);
        let mut request = submitted(&rule);

        let error = approve(&mut request, &user("bob"), None).expect_err("not bob's turn");
        assert_eq!(
            error,
            ApprovalError::Authorization(AuthorizationError::NotCurrentApprover)
        );

        assert_applied(approve(&mut request, &user("alice"), None).expect("alice approves"));
        let error = approve(&mut request, &user("alice"), None).expect_err("already acted");
        assert_eq!(
            error,
            ApprovalError::Authorization(AuthorizationError::NotCurrentApprover)
        );
    }

    #[test]
    fn single_rejection_is_terminal() {
        let rule = rule(&[(10, "alice"), (20, "bob")]);
        let mut request = submitted(&rule);

        let actions = assert_applied(
            reject(&mut request, &user("alice"), Some("over budget".to_string()))
                .expect("alice rejects"),
        );

        assert_eq!(request.state, RequestState::Rejected);
        assert_eq!(request.lines[0].state, LineState::Rejected);
        assert_eq!(request.lines[0].note.as_deref(), Some("over budget"));
        assert_eq!(request.lines[1].state, LineState::Waiting);
        assert!(actions.contains(&Action::CancelAllReminders));
        assert!(actions.iter().any(|action| matches!(
            action,
            Action::PostEvent { kind: EventKind::StepRejected, .. }
        )));
        assert!(actions.iter().any(|action| matches!(
            action,
            Action::PostEvent { kind: EventKind::RequestRejected, .. }
        )));
        // No reminder is left open after a terminal rejection.
        assert!(!actions.iter().any(|action| matches!(action, Action::NotifyRequester(_))));
    }

    #[test]
    fn wrong_state_submit_approve_reject_are_silent_noops() {
        let rule = rule(&[(10, "alice")]);
        let directory = InMemoryDirectory::new();
        let mut request = submitted(&rule);

        assert_eq!(
            submit(&mut request, &rule, &directory).expect("double submit"),
            TransitionOutcome::Ignored
        );

        assert_applied(approve(&mut request, &user("alice"), None).expect("approve"));
        assert_eq!(request.state, RequestState::Approved);
        assert_eq!(
            approve(&mut request, &user("alice"), None).expect("approve after final"),
            TransitionOutcome::Ignored
        );
        assert_eq!(
            reject(&mut request, &user("alice"), None).expect("reject after final"),
            TransitionOutcome::Ignored
        );
    }

    #[test]
    fn revise_resets_to_draft_and_resubmit_regenerates_lines() {
        let rule = rule(&[(10, "alice"), (20, "bob")]);
        let mut request = submitted(&rule);
        assert_applied(approve(&mut request, &user("alice"), None).expect("alice approves"));

        let actions = assert_applied(revise(&mut request, &user("dana")).expect("revise"));
        assert_eq!(request.state, RequestState::Draft);
        assert_eq!(request.revision, 1);
        assert!(request.lines.is_empty());
        assert!(request.submitted_at.is_none());
        assert!(actions.contains(&Action::CancelAllReminders));
        assert!(actions.iter().any(|action| matches!(
            action,
            Action::PostEvent { kind: EventKind::ApprovalsReset, .. }
        )));

        assert_applied(
            submit(&mut request, &rule, &InMemoryDirectory::new()).expect("resubmit"),
        );
        assert_eq!(
            line_states(&request),
            vec![("alice", LineState::Pending), ("bob", LineState::Waiting)]
        );
    }

    #[test]
    fn revise_is_requester_only_and_refused_from_draft() {
        let rule = rule(&[(10, "alice")]);
        let mut request = submitted(&rule);

        let error = revise(&mut request, &user("alice")).expect_err("not the requester");
        assert_eq!(
            error,
            ApprovalError::Authorization(AuthorizationError::NotRequester { action: "revise" })
        );

        let mut draft = draft_request();
        let error = revise(&mut draft, &user("dana")).expect_err("nothing to revise");
        assert_eq!(
            error,
            ApprovalError::State(StateError::InvalidState {
                action: "revise",
                state: RequestState::Draft,
            })
        );
    }

    #[test]
    fn revert_restores_pending_and_demotes_the_promoted_level() {
        let rule = rule(&[(10, "alice"), (20, "bob")]);
        let mut request = submitted(&rule);
        assert_applied(approve(&mut request, &user("alice"), None).expect("alice approves"));

        assert_applied(revert_approval(&mut request, &user("alice")).expect("revert"));
        assert_eq!(
            line_states(&request),
            vec![("alice", LineState::Pending), ("bob", LineState::Waiting)]
        );
        assert_eq!(request.state, RequestState::InReview);
    }

    #[test]
    fn revert_is_blocked_once_a_later_step_acted() {
        let rule = rule(&[(10, "alice"), (20, "bob")]);
        let mut request = submitted(&rule);
        assert_applied(approve(&mut request, &user("alice"), None).expect("alice approves"));
        assert_applied(approve(&mut request, &user("bob"), None).expect("bob approves"));

        let error = revert_approval(&mut request, &user("alice")).expect_err("bob already acted");
        assert_eq!(error, ApprovalError::State(StateError::LaterStepActed));
    }

    #[test]
    fn final_approver_can_revert_a_fully_approved_request() {
        let rule = rule(&[(10, "alice"), (20, "bob")]);
        let mut request = submitted(&rule);
        assert_applied(approve(&mut request, &user("alice"), None).expect("alice approves"));
        assert_applied(approve(&mut request, &user("bob"), None).expect("bob approves"));
        assert_eq!(request.state, RequestState::Approved);

        assert_applied(revert_approval(&mut request, &user("bob")).expect("revert final"));
        assert_eq!(request.state, RequestState::InReview);
        assert!(request.is_current_approver(&user("bob")));
    }

    #[test]
    fn revert_is_refused_once_the_request_is_rejected() {
        let rule = rule(&[(10, "bob"), (10, "alice")]);
        let mut request = submitted(&rule);
        assert_applied(approve(&mut request, &user("alice"), None).expect("alice approves"));
        assert_applied(
            reject(&mut request, &user("bob"), None).expect("bob rejects"),
        );
        assert_eq!(request.state, RequestState::Rejected);

        let error = revert_approval(&mut request, &user("alice"))
            .expect_err("terminal request cannot be pulled back");
        assert_eq!(
            error,
            ApprovalError::State(StateError::InvalidState {
                action: "revert",
                state: RequestState::Rejected,
            })
        );
        assert_eq!(request.state, RequestState::Rejected);
        assert_eq!(
            line_states(&request),
            vec![("bob", LineState::Rejected), ("alice", LineState::Approved)]
        );
        assert!(request.pending_lines().is_empty());
    }

    #[test]
    fn revert_without_an_approved_line_reports_nothing_to_revert() {
        let rule = rule(&[(10, "alice")]);
        let mut request = submitted(&rule);

        let error = revert_approval(&mut request, &user("alice")).expect_err("nothing approved");
        assert_eq!(error, ApprovalError::State(StateError::NothingToRevert));
    }

    #[test]
    fn opt_out_with_remaining_peer_keeps_the_level_open() {
        let rule = rule(&[(10, "alice"), (10, "bob"), (20, "carol")]);
        let mut request = submitted(&rule);

        assert_applied(opt_out(&mut request, &user("alice")).expect("alice opts out"));
        assert_eq!(request.lines[0].state, LineState::Withdrawn);
        assert!(request.is_current_approver(&user("bob")));
        assert!(!request.is_current_approver(&user("carol")));
    }

    #[test]
    fn opt_out_on_the_last_required_line_stalls_instead_of_approving() {
        let rule = rule(&[(10, "alice")]);
        let mut request = submitted(&rule);

        let outcome = opt_out(&mut request, &user("alice")).expect("alice opts out");
        match outcome {
            TransitionOutcome::Stalled { actions, notice } => {
                assert!(notice.contains("alice"));
                assert!(actions
                    .iter()
                    .any(|action| matches!(action, Action::OperatorAlert(_))));
            }
            other => panic!("expected a stalled outcome, got {other:?}"),
        }
        assert_eq!(request.state, RequestState::InReview);
        assert_eq!(request.lines[0].state, LineState::Withdrawn);
    }

    #[test]
    fn submit_with_zero_approver_rule_fails_before_any_state_change() {
        let rule = rule(&[]);
        let mut request = draft_request();

        let error = submit(&mut request, &rule, &InMemoryDirectory::new())
            .expect_err("no approvers to route to");
        assert_eq!(
            error,
            ApprovalError::Validation(ValidationError::NoApprovers {
                rule: "Purchasing".to_string()
            })
        );
        assert_eq!(request.state, RequestState::Draft);
        assert!(request.lines.is_empty());
        assert!(request.submitted_at.is_none());
    }

    #[test]
    fn pending_set_is_always_the_lowest_undecided_level() {
        let rule = rule(&[(5, "alice"), (10, "bob"), (10, "carol"), (30, "erin")]);
        let mut request = submitted(&rule);

        assert_applied(approve(&mut request, &user("alice"), None).expect("alice"));
        assert_applied(approve(&mut request, &user("carol"), None).expect("carol"));

        let pending: Vec<&str> =
            request.pending_lines().iter().map(|l| l.approver.0.as_str()).collect();
        assert_eq!(pending, vec!["bob"]);

        assert_applied(approve(&mut request, &user("bob"), None).expect("bob"));
        let pending: Vec<&str> =
            request.pending_lines().iter().map(|l| l.approver.0.as_str()).collect();
        assert_eq!(pending, vec!["erin"]);
    }

    #[test]
    fn event_kind_round_trips_through_its_storage_encoding() {
        for kind in [
            EventKind::Submitted,
            EventKind::StepApproved,
            EventKind::ApprovalNeeded,
            EventKind::Diagnostic,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("unknown"), None);
    }
}
