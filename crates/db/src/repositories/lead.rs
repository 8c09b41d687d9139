use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use leadline_core::domain::ids::{LeadId, WorkspaceId};
use leadline_core::domain::lead::{Lead, LeadStatus};

use super::{decode_enum, parse_timestamp, ts, RepositoryError};
use crate::DbPool;

const LEAD_COLUMNS: &str = "id, workspace_id, name, phone, email, source, status, owner_user_id,
    created_at, updated_at";

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(conn: &mut SqliteConnection, lead: &Lead) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO lead (
                id, workspace_id, name, phone, email, source, status, owner_user_id,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id.0)
        .bind(&lead.workspace_id.0)
        .bind(&lead.name)
        .bind(lead.phone.as_deref())
        .bind(lead.email.as_deref())
        .bind(&lead.source)
        .bind(lead.status.as_str())
        .bind(lead.owner_user_id.as_deref())
        .bind(ts(lead.created_at))
        .bind(ts(lead.updated_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn find(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM lead WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(lead_from_row).transpose()
    }

    /// Lead lookup scoped to a workspace; other workspaces' leads read as absent.
    pub async fn find_in_workspace(
        &self,
        workspace_id: &WorkspaceId,
        id: &LeadId,
    ) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM lead WHERE id = ? AND workspace_id = ?"
        ))
        .bind(&id.0)
        .bind(&workspace_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(lead_from_row).transpose()
    }

    pub async fn list_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
        status: Option<LeadStatus>,
        limit: u32,
    ) -> Result<Vec<Lead>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {LEAD_COLUMNS} FROM lead
                     WHERE workspace_id = ? AND status = ?
                     ORDER BY created_at DESC, id ASC
                     LIMIT ?"
                ))
                .bind(&workspace_id.0)
                .bind(status.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {LEAD_COLUMNS} FROM lead
                     WHERE workspace_id = ?
                     ORDER BY created_at DESC, id ASC
                     LIMIT ?"
                ))
                .bind(&workspace_id.0)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(lead_from_row).collect()
    }

    /// Moves ownership only if the lead is still owned by `expected_owner`.
    pub async fn reassign_owner(
        conn: &mut SqliteConnection,
        id: &LeadId,
        expected_owner: Option<&str>,
        new_owner: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE lead
             SET owner_user_id = ?, updated_at = ?
             WHERE id = ? AND owner_user_id IS ?",
        )
        .bind(new_owner)
        .bind(ts(at))
        .bind(&id.0)
        .bind(expected_owner)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Status transition guarded on the expected current status.
    pub async fn transition_status(
        conn: &mut SqliteConnection,
        id: &LeadId,
        from: LeadStatus,
        to: LeadStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE lead SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(ts(at))
                .bind(&id.0)
                .bind(from.as_str())
                .execute(&mut *conn)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn lead_from_row(row: SqliteRow) -> Result<Lead, RepositoryError> {
    Ok(Lead {
        id: LeadId(row.try_get("id")?),
        workspace_id: WorkspaceId(row.try_get("workspace_id")?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        source: row.try_get("source")?,
        status: decode_enum("status", row.try_get("status")?, LeadStatus::parse)?,
        owner_user_id: row.try_get("owner_user_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use leadline_core::domain::ids::{LeadId, WorkspaceId};
    use leadline_core::domain::lead::{Lead, LeadStatus};

    use super::SqlLeadRepository;
    use crate::repositories::test_support::{insert_workspace, parse_ts, setup_pool};

    fn lead(id: &str, workspace: &str, created_at: &str) -> Lead {
        Lead {
            id: LeadId::from(id),
            workspace_id: WorkspaceId::from(workspace),
            name: "Dana Buyer".to_owned(),
            phone: Some("+15550100".to_owned()),
            email: None,
            source: "website".to_owned(),
            status: LeadStatus::New,
            owner_user_id: Some("agent-1".to_owned()),
            created_at: parse_ts(created_at),
            updated_at: parse_ts(created_at),
        }
    }

    #[tokio::test]
    async fn lead_lookup_is_workspace_scoped() {
        let pool = setup_pool().await;
        insert_workspace(&pool, "W-1").await;
        insert_workspace(&pool, "W-2").await;
        let repo = SqlLeadRepository::new(pool.clone());

        let mut conn = pool.acquire().await.expect("acquire");
        let first = lead("L-1", "W-1", "2026-03-02T09:00:00Z");
        SqlLeadRepository::insert(&mut conn, &first).await.expect("insert");
        SqlLeadRepository::insert(&mut conn, &lead("L-2", "W-1", "2026-03-02T09:05:00Z"))
            .await
            .expect("insert");
        drop(conn);

        assert_eq!(repo.find(&first.id).await.expect("find"), Some(first.clone()));
        assert_eq!(
            repo.find_in_workspace(&WorkspaceId::from("W-2"), &first.id).await.expect("scoped"),
            None
        );

        let listed = repo
            .list_for_workspace(&WorkspaceId::from("W-1"), None, 10)
            .await
            .expect("list");
        assert_eq!(listed.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(), vec!["L-2", "L-1"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn reassignment_is_guarded_on_previous_owner() {
        let pool = setup_pool().await;
        insert_workspace(&pool, "W-1").await;
        let repo = SqlLeadRepository::new(pool.clone());
        let first = lead("L-1", "W-1", "2026-03-02T09:00:00Z");
        let at = parse_ts("2026-03-02T09:10:00Z");

        let mut conn = pool.acquire().await.expect("acquire");
        SqlLeadRepository::insert(&mut conn, &first).await.expect("insert");

        let moved = SqlLeadRepository::reassign_owner(&mut conn, &first.id, Some("agent-1"), "agent-2", at)
            .await
            .expect("reassign");
        let stale = SqlLeadRepository::reassign_owner(&mut conn, &first.id, Some("agent-1"), "agent-3", at)
            .await
            .expect("stale reassign");
        drop(conn);

        assert!(moved);
        assert!(!stale);
        let stored = repo.find(&first.id).await.expect("find").expect("lead");
        assert_eq!(stored.owner_user_id.as_deref(), Some("agent-2"));

        pool.close().await;
    }
}
