//! Notification side effects. The `ActivityGateway` trait is the narrow
//! messaging boundary; `Notifier` layers throttling and reminder dedup on
//! top of it and interprets engine actions. Everything here is best-effort:
//! a gateway failure is logged and swallowed, never propagated into a
//! workflow transition.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{NotifyConfig, NotifyMode};
use crate::domain::ids::{ActivityId, RequestId, UserId};
use crate::domain::request::Request;
use crate::engine::{Action, EventKind};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("activity gateway failure: {0}")]
pub struct GatewayError(pub String);

#[async_trait]
pub trait ActivityGateway: Send + Sync {
    async fn schedule_reminder(
        &self,
        request: &RequestId,
        user: &UserId,
        summary: &str,
    ) -> Result<ActivityId, GatewayError>;

    async fn open_reminder_exists(
        &self,
        request: &RequestId,
        user: &UserId,
    ) -> Result<bool, GatewayError>;

    async fn close_reminders(&self, request: &RequestId, user: &UserId)
        -> Result<(), GatewayError>;

    async fn cancel_all_reminders(&self, request: &RequestId) -> Result<(), GatewayError>;

    async fn post_event(
        &self,
        request: &RequestId,
        kind: EventKind,
        body: &str,
        audience: &[UserId],
    ) -> Result<(), GatewayError>;

    async fn recent_event_exists(
        &self,
        request: &RequestId,
        user: &UserId,
        kind: EventKind,
        within_minutes: u32,
    ) -> Result<bool, GatewayError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderRecord {
    pub id: ActivityId,
    pub request: RequestId,
    pub user: UserId,
    pub summary: String,
    pub open: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub request: RequestId,
    pub kind: EventKind,
    pub body: String,
    pub audience: Vec<UserId>,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct GatewayState {
    reminders: Vec<ReminderRecord>,
    events: Vec<EventRecord>,
}

/// Map-backed gateway for tests and embedded use.
#[derive(Clone, Default)]
pub struct InMemoryActivityGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl InMemoryActivityGateway {
    pub fn reminders(&self) -> Vec<ReminderRecord> {
        match self.state.lock() {
            Ok(state) => state.reminders.clone(),
            Err(poisoned) => poisoned.into_inner().reminders.clone(),
        }
    }

    pub fn events(&self) -> Vec<EventRecord> {
        match self.state.lock() {
            Ok(state) => state.events.clone(),
            Err(poisoned) => poisoned.into_inner().events.clone(),
        }
    }

    /// Shift every recorded event into the past. Lets throttle-window tests
    /// age the log without sleeping.
    pub fn backdate_events(&self, minutes: i64) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for event in state.events.iter_mut() {
            event.posted_at -= Duration::minutes(minutes);
        }
    }
}

#[async_trait]
impl ActivityGateway for InMemoryActivityGateway {
    async fn schedule_reminder(
        &self,
        request: &RequestId,
        user: &UserId,
        summary: &str,
    ) -> Result<ActivityId, GatewayError> {
        let id = ActivityId(Uuid::new_v4().to_string());
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.reminders.push(ReminderRecord {
            id: id.clone(),
            request: request.clone(),
            user: user.clone(),
            summary: summary.to_string(),
            open: true,
        });
        Ok(id)
    }

    async fn open_reminder_exists(
        &self,
        request: &RequestId,
        user: &UserId,
    ) -> Result<bool, GatewayError> {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(state
            .reminders
            .iter()
            .any(|r| r.open && &r.request == request && &r.user == user))
    }

    async fn close_reminders(
        &self,
        request: &RequestId,
        user: &UserId,
    ) -> Result<(), GatewayError> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for reminder in state
            .reminders
            .iter_mut()
            .filter(|r| &r.request == request && &r.user == user)
        {
            reminder.open = false;
        }
        Ok(())
    }

    async fn cancel_all_reminders(&self, request: &RequestId) -> Result<(), GatewayError> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for reminder in state.reminders.iter_mut().filter(|r| &r.request == request) {
            reminder.open = false;
        }
        Ok(())
    }

    async fn post_event(
        &self,
        request: &RequestId,
        kind: EventKind,
        body: &str,
        audience: &[UserId],
    ) -> Result<(), GatewayError> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.events.push(EventRecord {
            request: request.clone(),
            kind,
            body: body.to_string(),
            audience: audience.to_vec(),
            posted_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_event_exists(
        &self,
        request: &RequestId,
        user: &UserId,
        kind: EventKind,
        within_minutes: u32,
    ) -> Result<bool, GatewayError> {
        let cutoff = Utc::now() - Duration::minutes(i64::from(within_minutes));
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(state.events.iter().any(|event| {
            &event.request == request
                && event.kind == kind
                && event.posted_at >= cutoff
                && event.audience.contains(user)
        }))
    }
}

/// Throttled notification dispatcher over a gateway.
pub struct Notifier<G> {
    gateway: G,
    config: NotifyConfig,
}

impl<G> Notifier<G>
where
    G: ActivityGateway,
{
    pub fn new(gateway: G, config: NotifyConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Nudge every approver whose line is currently pending.
    pub async fn notify_pending(&self, request: &Request) {
        let users: Vec<UserId> =
            request.pending_lines().iter().map(|line| line.approver.clone()).collect();
        self.notify_users(request, &users).await;
    }

    /// Nudge specific approvers. Skips anyone already pinged inside the
    /// throttle window and never schedules a second open reminder.
    pub async fn notify_users(&self, request: &Request, users: &[UserId]) {
        for user in users {
            let throttled = self
                .gateway
                .recent_event_exists(
                    &request.id,
                    user,
                    EventKind::ApprovalNeeded,
                    self.config.throttle_minutes,
                )
                .await;
            match throttled {
                Ok(true) => {
                    debug!(request = %request.code, user = %user.0, "notification throttled");
                    continue;
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(request = %request.code, %error, "throttle lookup failed, skipping nudge");
                    continue;
                }
            }

            match self.gateway.open_reminder_exists(&request.id, user).await {
                Ok(true) => {}
                Ok(false) => {
                    let summary = format!("Approve {}: {}", request.code, request.title);
                    if let Err(error) =
                        self.gateway.schedule_reminder(&request.id, user, &summary).await
                    {
                        warn!(request = %request.code, user = %user.0, %error, "reminder scheduling failed");
                    }
                }
                Err(error) => {
                    warn!(request = %request.code, user = %user.0, %error, "reminder lookup failed");
                }
            }

            let body = match self.config.mode {
                NotifyMode::Activity => format!("approval requested on {}", request.code),
                NotifyMode::Message => format!(
                    "Your approval is requested on {} ({})",
                    request.code, request.title
                ),
            };
            let audience = [user.clone()];
            if let Err(error) = self
                .gateway
                .post_event(&request.id, EventKind::ApprovalNeeded, &body, &audience)
                .await
            {
                warn!(request = %request.code, user = %user.0, %error, "event posting failed");
            }
        }
    }

    /// Interpret the side effects emitted by an engine transition.
    pub async fn dispatch(&self, request: &Request, actions: &[Action]) {
        for action in actions {
            match action {
                Action::NotifyApprovers(users) => self.notify_users(request, users).await,
                Action::NotifyRequester(user) => {
                    if self.config.mode == NotifyMode::Activity {
                        self.ensure_requester_reminder(request, user).await;
                    }
                }
                Action::CloseActorReminders(user) => {
                    if let Err(error) = self.gateway.close_reminders(&request.id, user).await {
                        warn!(request = %request.code, user = %user.0, %error, "reminder close failed");
                    }
                }
                Action::CancelAllReminders => {
                    if let Err(error) = self.gateway.cancel_all_reminders(&request.id).await {
                        warn!(request = %request.code, %error, "reminder cancellation failed");
                    }
                }
                Action::PostEvent { kind, body, audience } => {
                    if let Err(error) =
                        self.gateway.post_event(&request.id, *kind, body, audience).await
                    {
                        warn!(request = %request.code, %error, "event posting failed");
                    }
                }
                Action::OperatorAlert(notice) => {
                    warn!(request = %request.code, notice, "approval chain needs operator attention");
                    if let Err(error) = self
                        .gateway
                        .post_event(&request.id, EventKind::Diagnostic, notice, &[])
                        .await
                    {
                        warn!(request = %request.code, %error, "diagnostic posting failed");
                    }
                }
            }
        }
    }

    async fn ensure_requester_reminder(&self, request: &Request, user: &UserId) {
        match self.gateway.open_reminder_exists(&request.id, user).await {
            Ok(true) => {}
            Ok(false) => {
                let summary = format!("Review the outcome of {}", request.code);
                if let Err(error) = self.gateway.schedule_reminder(&request.id, user, &summary).await
                {
                    warn!(request = %request.code, user = %user.0, %error, "reminder scheduling failed");
                }
            }
            Err(error) => {
                warn!(request = %request.code, user = %user.0, %error, "reminder lookup failed");
            }
        }
    }
}
