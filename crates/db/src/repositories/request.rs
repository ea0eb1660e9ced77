use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};

use signoff_core::domain::ids::{CompanyId, DepartmentId, LineId, RequestId, RuleId, UserId};
use signoff_core::domain::line::{Line, LineState};
use signoff_core::domain::request::{Request, RequestState};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn request_state_as_str(state: RequestState) -> &'static str {
    match state {
        RequestState::Draft => "draft",
        RequestState::InReview => "in_review",
        RequestState::Approved => "approved",
        RequestState::Rejected => "rejected",
    }
}

fn parse_request_state(value: &str) -> Result<RequestState, RepositoryError> {
    match value {
        "draft" => Ok(RequestState::Draft),
        "in_review" => Ok(RequestState::InReview),
        "approved" => Ok(RequestState::Approved),
        "rejected" => Ok(RequestState::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown request state `{other}`"))),
    }
}

pub(crate) fn line_state_as_str(state: LineState) -> &'static str {
    match state {
        LineState::Waiting => "waiting",
        LineState::Pending => "pending",
        LineState::Approved => "approved",
        LineState::Rejected => "rejected",
        LineState::Withdrawn => "withdrawn",
    }
}

fn parse_line_state(value: &str) -> Result<LineState, RepositoryError> {
    match value {
        "waiting" => Ok(LineState::Waiting),
        "pending" => Ok(LineState::Pending),
        "approved" => Ok(LineState::Approved),
        "rejected" => Ok(LineState::Rejected),
        "withdrawn" => Ok(LineState::Withdrawn),
        other => Err(RepositoryError::Decode(format!("unknown line state `{other}`"))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("timestamp `{raw}`: {e}")))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let code: String = row.try_get("code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department_id: Option<String> =
        row.try_get("department_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requester_id: String =
        row.try_get("requester_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_str: String =
        row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rule_id: Option<String> =
        row.try_get("rule_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state_str: String =
        row.try_get("state").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let revision: i64 =
        row.try_get("revision").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let revised_by: Option<String> =
        row.try_get("revised_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let revised_at_str: Option<String> =
        row.try_get("revised_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submitted_at_str: Option<String> =
        row.try_get("submitted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let amount = amount_str
        .parse::<Decimal>()
        .map_err(|e| RepositoryError::Decode(format!("amount `{amount_str}`: {e}")))?;
    let revised_at = revised_at_str.as_deref().map(parse_timestamp).transpose()?;
    let submitted_at = submitted_at_str.as_deref().map(parse_timestamp).transpose()?;

    Ok(Request {
        id: RequestId(id),
        code,
        title,
        company_id: CompanyId(company_id),
        department_id: department_id.map(DepartmentId),
        requester: UserId(requester_id),
        amount,
        currency,
        rule_id: rule_id.map(RuleId),
        state: parse_request_state(&state_str)?,
        revision: revision as u32,
        revised_by: revised_by.map(UserId),
        revised_at,
        submitted_at,
        lines: Vec::new(),
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

pub(crate) fn row_to_line(row: &sqlx::sqlite::SqliteRow) -> Result<Line, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sequence: i64 =
        row.try_get("sequence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_id: String =
        row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let required: i64 =
        row.try_get("required").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state_str: String =
        row.try_get("state").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let note: Option<String> =
        row.try_get("note").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Line {
        id: LineId(id),
        sequence: sequence as u32,
        name,
        approver: UserId(approver_id),
        required: required != 0,
        state: parse_line_state(&state_str)?,
        note,
    })
}

/// Load a request and its lines inside the caller's transaction.
pub(crate) async fn fetch_request(
    conn: &mut SqliteConnection,
    id: &RequestId,
) -> Result<Option<Request>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, code, title, company_id, department_id, requester_id, amount, currency,
                rule_id, state, revision, revised_by, revised_at, submitted_at,
                created_at, updated_at
         FROM approval_request WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?;

    let mut request = match row {
        Some(ref row) => row_to_request(row)?,
        None => return Ok(None),
    };

    let line_rows = sqlx::query(
        "SELECT id, sequence, name, approver_id, required, state, note
         FROM approval_line WHERE request_id = ? ORDER BY position ASC",
    )
    .bind(&id.0)
    .fetch_all(&mut *conn)
    .await?;

    request.lines = line_rows.iter().map(row_to_line).collect::<Result<Vec<_>, _>>()?;
    Ok(Some(request))
}

/// Upsert the request header. Lines are written separately so decision
/// updates can stay guarded.
pub(crate) async fn store_request_row(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval_request (id, code, title, company_id, department_id, requester_id,
                                       amount, currency, rule_id, state, revision, revised_by,
                                       revised_at, submitted_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             department_id = excluded.department_id,
             amount = excluded.amount,
             currency = excluded.currency,
             rule_id = excluded.rule_id,
             state = excluded.state,
             revision = excluded.revision,
             revised_by = excluded.revised_by,
             revised_at = excluded.revised_at,
             submitted_at = excluded.submitted_at,
             updated_at = excluded.updated_at",
    )
    .bind(&request.id.0)
    .bind(&request.code)
    .bind(&request.title)
    .bind(&request.company_id.0)
    .bind(request.department_id.as_ref().map(|d| d.0.as_str()))
    .bind(&request.requester.0)
    .bind(request.amount.to_string())
    .bind(&request.currency)
    .bind(request.rule_id.as_ref().map(|r| r.0.as_str()))
    .bind(request_state_as_str(request.state))
    .bind(i64::from(request.revision))
    .bind(request.revised_by.as_ref().map(|u| u.0.as_str()))
    .bind(request.revised_at.map(|dt| dt.to_rfc3339()))
    .bind(request.submitted_at.map(|dt| dt.to_rfc3339()))
    .bind(request.created_at.to_rfc3339())
    .bind(request.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Replace the full line set. Used when lines are regenerated (submit,
/// revise) rather than decided.
pub(crate) async fn replace_lines(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM approval_line WHERE request_id = ?")
        .bind(&request.id.0)
        .execute(&mut *conn)
        .await?;

    for (position, line) in request.lines.iter().enumerate() {
        sqlx::query(
            "INSERT INTO approval_line (id, request_id, position, sequence, name, approver_id,
                                        required, state, note)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&line.id.0)
        .bind(&request.id.0)
        .bind(position as i64)
        .bind(i64::from(line.sequence))
        .bind(&line.name)
        .bind(&line.approver.0)
        .bind(i64::from(line.required))
        .bind(line_state_as_str(line.state))
        .bind(line.note.as_deref())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Move one line between states, guarded on the expected previous state.
/// Returns the number of rows touched; zero means another transaction got
/// there first.
pub(crate) async fn update_line_state_guarded(
    conn: &mut SqliteConnection,
    line_id: &LineId,
    previous: LineState,
    next: LineState,
    note: Option<&str>,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE approval_line SET state = ?, note = ? WHERE id = ? AND state = ?",
    )
    .bind(line_state_as_str(next))
    .bind(note)
    .bind(&line_id.0)
    .bind(line_state_as_str(previous))
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn delete_request(
    conn: &mut SqliteConnection,
    id: &RequestId,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM approval_request WHERE id = ?")
        .bind(&id.0)
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_request(&mut conn, id).await
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        store_request_row(&mut tx, &request).await?;
        replace_lines(&mut tx, &request).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        delete_request(&mut conn, id).await
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use signoff_core::domain::ids::{CompanyId, LineId, RequestId, RuleId, UserId};
    use signoff_core::domain::line::{Line, LineState};
    use signoff_core::domain::request::{NewRequest, Request, RequestState};

    use super::{update_line_state_guarded, SqlRequestRepository};
    use crate::repositories::RequestRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_request() -> Request {
        let mut request = Request::create(
            RequestId("req-1".to_string()),
            "APR-00001",
            NewRequest {
                company_id: CompanyId("acme".to_string()),
                department_id: None,
                requester: UserId("dana".to_string()),
                title: "New laptops".to_string(),
                amount: Decimal::new(50_000, 2),
                currency: "USD".to_string(),
                rule_id: Some(RuleId("rule-1".to_string())),
            },
        );
        request.state = RequestState::InReview;
        let mut first = Line::new(10, "alice", UserId("alice".to_string()));
        first.state = LineState::Pending;
        request.lines = vec![first, Line::new(20, "bob", UserId("bob".to_string()))];
        request
    }

    #[tokio::test]
    async fn save_and_find_round_trips_request_with_lines() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = sample_request();

        repo.save(request.clone()).await.expect("save");

        let loaded = repo
            .find_by_id(&RequestId("req-1".to_string()))
            .await
            .expect("find")
            .expect("request exists");
        assert_eq!(loaded, request);
    }

    #[tokio::test]
    async fn guarded_line_update_applies_once() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = sample_request();
        let line_id = LineId(request.lines[0].id.0.clone());
        repo.save(request).await.expect("save");

        let mut conn = pool.acquire().await.expect("acquire");
        let first = update_line_state_guarded(
            &mut conn,
            &line_id,
            LineState::Pending,
            LineState::Approved,
            None,
        )
        .await
        .expect("first update");
        assert_eq!(first, 1);

        let replay = update_line_state_guarded(
            &mut conn,
            &line_id,
            LineState::Pending,
            LineState::Approved,
            None,
        )
        .await
        .expect("replayed update");
        assert_eq!(replay, 0);
    }

    #[tokio::test]
    async fn delete_cascades_into_lines() {
        let pool = setup().await;
        let repo = SqlRequestRepository::new(pool.clone());
        repo.save(sample_request()).await.expect("save");

        repo.delete(&RequestId("req-1".to_string())).await.expect("delete");

        assert!(repo
            .find_by_id(&RequestId("req-1".to_string()))
            .await
            .expect("find")
            .is_none());
        let line_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM approval_line WHERE request_id = 'req-1'")
                .fetch_one(&pool)
                .await
                .expect("count lines");
        assert_eq!(line_count, 0);
    }
}
