//! Database repository for profile, family, rule and child documents.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqlitePool};

use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{
    Child, Family, Membership, NewChild, ParentRole, ScheduleRule, StoredRule,
    UpdateProfileRequest, User,
};
use crate::rules;

/// Database repository for plain document operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, email, display_name, role, family_id, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Return the caller's user document, creating a minimal one on first visit.
    pub async fn ensure_user(&self, identity: &Identity) -> Result<User, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO users (id, email, display_name, role, family_id, created_at, updated_at)
               VALUES (?, ?, ?, NULL, NULL, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(&identity.user_id)
        .bind(&identity.email)
        .bind(&identity.display_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_user(&identity.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", identity.user_id)))
    }

    /// Update display name and role. A linked user's membership snapshot is merged
    /// in the same transaction. The family link itself is never touched here.
    pub async fn update_profile(
        &self,
        identity: &Identity,
        request: &UpdateProfileRequest,
    ) -> Result<User, AppError> {
        let display_name = request.display_name.trim();
        if display_name.is_empty() {
            return Err(AppError::Validation("Display name is required".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"INSERT INTO users (id, email, display_name, role, family_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, NULL, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   display_name = excluded.display_name,
                   role = excluded.role,
                   email = COALESCE(users.email, excluded.email),
                   updated_at = excluded.updated_at
               RETURNING id, email, display_name, role, family_id, created_at, updated_at"#,
        )
        .bind(&identity.user_id)
        .bind(&identity.email)
        .bind(display_name)
        .bind(request.role.as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;
        let user = user_from_row(&row);

        if let Some(family_id) = &user.family_id {
            sqlx::query(
                "UPDATE memberships SET role = ?, display_name = ? WHERE family_id = ? AND user_id = ?",
            )
            .bind(request.role.as_str())
            .bind(display_name)
            .bind(family_id)
            .bind(&identity.user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    // ==================== FAMILY OPERATIONS ====================

    /// Get a family by ID.
    pub async fn get_family(&self, id: &str) -> Result<Option<Family>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, timezone, owners, created_at, updated_at FROM families WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(family_from_row))
    }

    /// List the members of a family.
    pub async fn list_members(&self, family_id: &str) -> Result<Vec<Membership>, AppError> {
        let rows = sqlx::query(
            "SELECT family_id, user_id, role, display_name, joined_at FROM memberships WHERE family_id = ? ORDER BY joined_at, user_id",
        )
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(membership_from_row).collect())
    }

    /// Whether the user holds a membership in the family.
    pub async fn is_member(&self, family_id: &str, user_id: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM memberships WHERE family_id = ? AND user_id = ?")
            .bind(family_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    // ==================== RULE OPERATIONS ====================

    /// Get the family's active schedule rule.
    pub async fn get_rule(&self, family_id: &str) -> Result<Option<StoredRule>, AppError> {
        let row = sqlx::query(
            "SELECT family_id, document, created_at, updated_at FROM schedule_rules WHERE family_id = ?",
        )
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let document: String = row.get("document");
        let rule: ScheduleRule = serde_json::from_str(&document)?;

        Ok(Some(StoredRule {
            family_id: row.get("family_id"),
            rule,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Replace the family's active rule with `rule`.
    ///
    /// The whole document is overwritten, so switching variants never leaves
    /// fields of the previous variant behind. Invalid rules are refused before
    /// the store is touched.
    pub async fn save_rule(
        &self,
        family_id: &str,
        rule: &ScheduleRule,
    ) -> Result<StoredRule, AppError> {
        rules::validate(rule)?;

        let now = Utc::now().to_rfc3339();
        let document = serde_json::to_string(rule)?;

        let row = sqlx::query(
            r#"INSERT INTO schedule_rules (family_id, rule_type, document, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(family_id) DO UPDATE SET
                   rule_type = excluded.rule_type,
                   document = excluded.document,
                   updated_at = excluded.updated_at
               RETURNING created_at, updated_at"#,
        )
        .bind(family_id)
        .bind(rule.type_name())
        .bind(&document)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            family_id = %family_id,
            rule_type = rule.type_name(),
            week_start = ?rule.week_start(),
            "Schedule rule saved"
        );

        Ok(StoredRule {
            family_id: family_id.to_string(),
            rule: rule.clone(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    // ==================== CHILD OPERATIONS ====================

    /// List a family's children, youngest last.
    pub async fn list_children(&self, family_id: &str) -> Result<Vec<Child>, AppError> {
        let rows = sqlx::query(
            "SELECT id, family_id, name, birthdate, color, created_at, updated_at FROM children WHERE family_id = ? ORDER BY birthdate, name",
        )
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(child_from_row).collect())
    }

    /// Get a child within a family.
    pub async fn get_child(&self, family_id: &str, id: &str) -> Result<Option<Child>, AppError> {
        let row = sqlx::query(
            "SELECT id, family_id, name, birthdate, color, created_at, updated_at FROM children WHERE family_id = ? AND id = ?",
        )
        .bind(family_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(child_from_row))
    }

    /// Create a child.
    pub async fn create_child(&self, family_id: &str, child: &NewChild) -> Result<Child, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO children (id, family_id, name, birthdate, color, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(family_id)
        .bind(&child.name)
        .bind(child.birthdate.to_string())
        .bind(&child.color)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Child {
            id,
            family_id: family_id.to_string(),
            name: child.name.clone(),
            birthdate: child.birthdate,
            color: child.color.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Replace a child's fields.
    pub async fn update_child(
        &self,
        family_id: &str,
        id: &str,
        child: &NewChild,
    ) -> Result<Child, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE children SET name = ?, birthdate = ?, color = ?, updated_at = ? WHERE family_id = ? AND id = ?",
        )
        .bind(&child.name)
        .bind(child.birthdate.to_string())
        .bind(&child.color)
        .bind(&now)
        .bind(family_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Child {} not found", id)));
        }

        self.get_child(family_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Child {} not found", id)))
    }

    /// Delete a child.
    pub async fn delete_child(&self, family_id: &str, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM children WHERE family_id = ? AND id = ?")
            .bind(family_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Child {} not found", id)));
        }
        Ok(())
    }
}

// Helper functions for row conversion

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    let role: Option<String> = row.get("role");
    User {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: role.as_deref().and_then(ParentRole::from_str),
        family_id: row.get("family_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn family_from_row(row: &sqlx::sqlite::SqliteRow) -> Family {
    let owners: String = row.get("owners");
    Family {
        id: row.get("id"),
        name: row.get("name"),
        timezone: row.get("timezone"),
        owners: serde_json::from_str(&owners).unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn membership_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<Membership> {
    let role: String = row.get("role");
    Some(Membership {
        family_id: row.get("family_id"),
        user_id: row.get("user_id"),
        role: ParentRole::from_str(&role)?,
        display_name: row.get("display_name"),
        joined_at: row.get("joined_at"),
    })
}

fn child_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<Child> {
    let birthdate: String = row.get("birthdate");
    Some(Child {
        id: row.get("id"),
        family_id: row.get("family_id"),
        name: row.get("name"),
        birthdate: NaiveDate::parse_from_str(&birthdate, "%Y-%m-%d").ok()?,
        color: row.get("color"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
