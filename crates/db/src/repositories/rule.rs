use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};

use signoff_core::domain::ids::{CompanyId, DepartmentId, RuleId, UserId};
use signoff_core::domain::rule::{Rule, Step};

use super::{RepositoryError, RuleRepository};
use crate::DbPool;

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<Rule, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: Option<String> =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department_id: Option<String> =
        row.try_get("department_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let min_amount_str: Option<String> =
        row.try_get("min_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: i64 = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let min_amount = match min_amount_str {
        Some(raw) => Some(
            raw.parse::<Decimal>()
                .map_err(|e| RepositoryError::Decode(format!("min_amount `{raw}`: {e}")))?,
        ),
        None => None,
    };

    Ok(Rule {
        id: RuleId(id),
        name,
        company_id: company_id.map(CompanyId),
        department_id: department_id.map(DepartmentId),
        min_amount,
        currency,
        active: active != 0,
        steps: Vec::new(),
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<Step, RepositoryError> {
    let sequence: i64 =
        row.try_get("sequence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_id: String =
        row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: Option<String> =
        row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Step { sequence: sequence as u32, approver: UserId(approver_id), name })
}

async fn load_steps(
    conn: &mut SqliteConnection,
    rule_id: &str,
) -> Result<Vec<Step>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT sequence, approver_id, name
         FROM approval_rule_step WHERE rule_id = ? ORDER BY position ASC",
    )
    .bind(rule_id)
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_step).collect()
}

/// Load a rule and its steps on the caller's connection, so the workflow
/// can read it inside an open transaction.
pub(crate) async fn fetch_rule(
    conn: &mut SqliteConnection,
    id: &RuleId,
) -> Result<Option<Rule>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, name, company_id, department_id, min_amount, currency, active
         FROM approval_rule WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(ref row) => {
            let mut rule = row_to_rule(row)?;
            rule.steps = load_steps(conn, &rule.id.0).await?;
            Ok(Some(rule))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl RuleRepository for SqlRuleRepository {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<Rule>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_rule(&mut conn, id).await
    }

    async fn save(&self, rule: Rule) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO approval_rule (id, name, company_id, department_id, min_amount,
                                        currency, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 company_id = excluded.company_id,
                 department_id = excluded.department_id,
                 min_amount = excluded.min_amount,
                 currency = excluded.currency,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(rule.company_id.as_ref().map(|c| c.0.as_str()))
        .bind(rule.department_id.as_ref().map(|d| d.0.as_str()))
        .bind(rule.min_amount.map(|amount| amount.to_string()))
        .bind(&rule.currency)
        .bind(i64::from(rule.active))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        // Steps are replaced wholesale; position preserves insertion order
        // inside a level.
        sqlx::query("DELETE FROM approval_rule_step WHERE rule_id = ?")
            .bind(&rule.id.0)
            .execute(&mut *tx)
            .await?;

        for (position, step) in rule.steps.iter().enumerate() {
            sqlx::query(
                "INSERT INTO approval_rule_step (rule_id, position, sequence, approver_id, name)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&rule.id.0)
            .bind(position as i64)
            .bind(i64::from(step.sequence))
            .bind(&step.approver.0)
            .bind(step.name.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            "SELECT id, name, company_id, department_id, min_amount, currency, active
             FROM approval_rule WHERE active = 1 ORDER BY name ASC",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut rule = row_to_rule(row)?;
            rule.steps = load_steps(&mut conn, &rule.id.0).await?;
            rules.push(rule);
        }
        Ok(rules)
    }
}
