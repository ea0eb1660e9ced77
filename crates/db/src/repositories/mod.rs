use async_trait::async_trait;
use thiserror::Error;

use signoff_core::domain::ids::{RequestId, RuleId};
use signoff_core::domain::request::Request;
use signoff_core::domain::rule::Rule;

pub mod memory;
pub mod request;
pub mod rule;

pub use memory::{InMemoryRequestRepository, InMemoryRuleRepository};
pub use request::SqlRequestRepository;
pub use rule::SqlRuleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<Rule>, RepositoryError>;
    async fn save(&self, rule: Rule) -> Result<(), RepositoryError>;
    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;
    async fn save(&self, request: Request) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &RequestId) -> Result<(), RepositoryError>;
}
