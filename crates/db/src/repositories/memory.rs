use std::collections::HashMap;

use tokio::sync::RwLock;

use signoff_core::domain::ids::{RequestId, RuleId};
use signoff_core::domain::request::Request;
use signoff_core::domain::rule::Rule;

use super::{RepositoryError, RequestRepository, RuleRepository};

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<HashMap<String, Rule>>,
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<Rule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&id.0).cloned())
    }

    async fn save(&self, rule: Rule) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError> {
        let rules = self.rules.read().await;
        let mut active: Vec<Rule> = rules.values().filter(|rule| rule.active).cloned().collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }
}

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, Request>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.remove(&id.0);
        Ok(())
    }
}
