pub mod config;
pub mod directory;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod guard;
pub mod notify;
pub mod routing;

pub use config::{
    AppConfig, ConfigError, ConfigOverrides, DatabaseConfig, GuardConfig, LoadOptions, LogFormat,
    LoggingConfig, NotifyConfig, NotifyMode,
};
pub use directory::{Directory, InMemoryDirectory};
pub use domain::ids::{
    ActivityId, CompanyId, DepartmentId, LineId, RequestId, RuleId, UserId,
};
pub use domain::line::{Line, LineState};
pub use domain::request::{NewRequest, Request, RequestPatch, RequestState, StepOverview};
pub use domain::rule::{Rule, Step};
pub use engine::{Action, EventKind, TransitionOutcome};
pub use errors::{ApprovalError, AuthorizationError, StateError, ValidationError};
pub use guard::{ReminderPolicy, ReminderRef};
pub use notify::{
    ActivityGateway, EventRecord, GatewayError, InMemoryActivityGateway, Notifier, ReminderRecord,
};
pub use routing::build_lines;
