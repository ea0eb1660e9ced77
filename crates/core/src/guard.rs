//! Reminder mutation policy. Every entrypoint that edits, completes, or
//! cancels a reminder consults this policy: the creator controls the
//! reminder, the assignee may only mark it done, and configured manager
//! users bypass the checks. Contexts on the exclusion list are exempt
//! entirely.

use std::collections::HashSet;

use crate::config::GuardConfig;
use crate::domain::ids::UserId;
use crate::errors::AuthorizationError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderRef {
    pub created_by: UserId,
    pub assigned_to: UserId,
    pub context: String,
}

#[derive(Clone, Debug)]
pub struct ReminderPolicy {
    managers: HashSet<String>,
    excluded_contexts: HashSet<String>,
}

impl ReminderPolicy {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            managers: config.manager_users.iter().cloned().collect(),
            excluded_contexts: config.excluded_contexts.iter().cloned().collect(),
        }
    }

    pub fn can_edit(
        &self,
        actor: &UserId,
        reminder: &ReminderRef,
    ) -> Result<(), AuthorizationError> {
        if self.exempt(actor, reminder) || actor == &reminder.created_by {
            return Ok(());
        }
        Err(AuthorizationError::NotReminderOwner { action: "edit" })
    }

    pub fn can_cancel(
        &self,
        actor: &UserId,
        reminder: &ReminderRef,
    ) -> Result<(), AuthorizationError> {
        if self.exempt(actor, reminder) || actor == &reminder.created_by {
            return Ok(());
        }
        Err(AuthorizationError::NotReminderOwner { action: "cancel" })
    }

    pub fn can_complete(
        &self,
        actor: &UserId,
        reminder: &ReminderRef,
    ) -> Result<(), AuthorizationError> {
        if self.exempt(actor, reminder)
            || actor == &reminder.assigned_to
            || actor == &reminder.created_by
        {
            return Ok(());
        }
        Err(AuthorizationError::NotReminderAssignee)
    }

    fn exempt(&self, actor: &UserId, reminder: &ReminderRef) -> bool {
        self.managers.contains(&actor.0) || self.excluded_contexts.contains(&reminder.context)
    }
}
