pub mod activity;
pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod workflow;

pub use activity::{ActivityError, SqlActivityGateway};
pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryRequestRepository, InMemoryRuleRepository, RepositoryError, RequestRepository,
    RuleRepository, SqlRequestRepository, SqlRuleRepository,
};
pub use workflow::{ApprovalWorkflow, WorkflowError};
