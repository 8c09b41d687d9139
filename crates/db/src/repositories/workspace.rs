use sqlx::{sqlite::SqliteRow, Row};

use leadline_core::domain::ids::WorkspaceId;
use leadline_core::domain::workspace::{MemberRole, Workspace, WorkspaceMember};

use super::{decode_enum, parse_timestamp, parse_u32, ts, RepositoryError};
use crate::DbPool;

pub struct SqlWorkspaceRepository {
    pool: DbPool,
}

impl SqlWorkspaceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, workspace: &Workspace) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workspace (id, name, company_name, sla_minutes, autopilot_enabled, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                company_name = excluded.company_name,
                sla_minutes = excluded.sla_minutes,
                autopilot_enabled = excluded.autopilot_enabled",
        )
        .bind(&workspace.id.0)
        .bind(&workspace.name)
        .bind(&workspace.company_name)
        .bind(i64::from(workspace.sla_minutes))
        .bind(workspace.autopilot_enabled)
        .bind(ts(workspace.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find(&self, id: &WorkspaceId) -> Result<Option<Workspace>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, company_name, sla_minutes, autopilot_enabled, created_at
             FROM workspace
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(workspace_from_row).transpose()
    }

    pub async fn list_ids(&self) -> Result<Vec<WorkspaceId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM workspace ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(WorkspaceId).collect())
    }

    pub async fn save_member(&self, member: &WorkspaceMember) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workspace_member (workspace_id, user_id, display_name, role, phone, is_available)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(workspace_id, user_id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                phone = excluded.phone,
                is_available = excluded.is_available",
        )
        .bind(&member.workspace_id.0)
        .bind(&member.user_id)
        .bind(&member.display_name)
        .bind(member.role.as_str())
        .bind(member.phone.as_deref())
        .bind(member.is_available)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_availability(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &str,
        is_available: bool,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE workspace_member SET is_available = ? WHERE workspace_id = ? AND user_id = ?",
        )
        .bind(is_available)
        .bind(&workspace_id.0)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Members ordered by role seniority and then user id, so target selection is stable.
    pub async fn list_members(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<WorkspaceMember>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT workspace_id, user_id, display_name, role, phone, is_available
             FROM workspace_member
             WHERE workspace_id = ?
             ORDER BY CASE role
                        WHEN 'OWNER' THEN 0
                        WHEN 'ADMIN' THEN 1
                        WHEN 'MANAGER' THEN 2
                        ELSE 3
                      END ASC,
                      user_id ASC",
        )
        .bind(&workspace_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(member_from_row).collect()
    }
}

fn workspace_from_row(row: SqliteRow) -> Result<Workspace, RepositoryError> {
    Ok(Workspace {
        id: WorkspaceId(row.try_get("id")?),
        name: row.try_get("name")?,
        company_name: row.try_get("company_name")?,
        sla_minutes: parse_u32("sla_minutes", row.try_get("sla_minutes")?)?,
        autopilot_enabled: row.try_get("autopilot_enabled")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn member_from_row(row: SqliteRow) -> Result<WorkspaceMember, RepositoryError> {
    Ok(WorkspaceMember {
        workspace_id: WorkspaceId(row.try_get("workspace_id")?),
        user_id: row.try_get("user_id")?,
        display_name: row.try_get("display_name")?,
        role: decode_enum("role", row.try_get("role")?, MemberRole::parse)?,
        phone: row.try_get("phone")?,
        is_available: row.try_get("is_available")?,
    })
}

#[cfg(test)]
mod tests {
    use leadline_core::domain::ids::WorkspaceId;
    use leadline_core::domain::workspace::{MemberRole, Workspace, WorkspaceMember};

    use super::SqlWorkspaceRepository;
    use crate::repositories::test_support::{parse_ts, setup_pool};

    fn member(user_id: &str, role: MemberRole) -> WorkspaceMember {
        WorkspaceMember {
            workspace_id: WorkspaceId::from("W-1"),
            user_id: user_id.to_owned(),
            display_name: user_id.to_uppercase(),
            role,
            phone: Some("+15550111".to_owned()),
            is_available: true,
        }
    }

    #[tokio::test]
    async fn workspace_and_members_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlWorkspaceRepository::new(pool.clone());
        let workspace = Workspace {
            id: WorkspaceId::from("W-1"),
            name: "North Office".to_owned(),
            company_name: "Acme Realty".to_owned(),
            sla_minutes: 10,
            autopilot_enabled: true,
            created_at: parse_ts("2026-03-02T09:00:00Z"),
        };

        repo.save(&workspace).await.expect("save workspace");
        repo.save_member(&member("agent-b", MemberRole::Agent)).await.expect("save agent");
        repo.save_member(&member("owner-a", MemberRole::Owner)).await.expect("save owner");

        assert_eq!(repo.find(&workspace.id).await.expect("find"), Some(workspace.clone()));
        assert_eq!(repo.list_ids().await.expect("ids"), vec![workspace.id.clone()]);

        let members = repo.list_members(&workspace.id).await.expect("members");
        assert_eq!(
            members.iter().map(|m| m.user_id.as_str()).collect::<Vec<_>>(),
            vec!["owner-a", "agent-b"]
        );

        assert!(repo.set_availability(&workspace.id, "agent-b", false).await.expect("toggle"));
        assert!(!repo.set_availability(&workspace.id, "ghost", false).await.expect("missing"));
        let members = repo.list_members(&workspace.id).await.expect("members");
        assert!(!members[1].is_available);

        pool.close().await;
    }
}
