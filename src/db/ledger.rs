//! Membership ledger.
//!
//! Owns the rule that a user belongs to at most one family. The user's
//! `family_id` is claimed with a conditional upsert that only succeeds while it
//! is still empty, and every multi-document change runs inside one
//! transaction. The transactional primitives take the caller's connection so
//! the acceptance flow can run them inside its own unit of work.

use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{Family, ParentRole};

/// Longest accepted family name, in characters.
const MAX_FAMILY_NAME: usize = 100;

/// Result of trying to bind a user to a family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyLink {
    /// The user is now bound to the requested family
    Linked {
        role: Option<ParentRole>,
        display_name: Option<String>,
    },
    /// The user was already bound to `family_id`
    Existing {
        family_id: String,
        role: Option<ParentRole>,
    },
}

/// Bind `identity` to `family_id` unless the user already has a family.
///
/// Creates the user document if it does not exist yet. Existing role, email and
/// display name are preserved; `role` only fills an empty role.
pub async fn claim_family_link(
    conn: &mut SqliteConnection,
    identity: &Identity,
    family_id: &str,
    role: ParentRole,
) -> Result<FamilyLink, AppError> {
    let now = Utc::now().to_rfc3339();

    let row = sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, family_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
               family_id = excluded.family_id,
               role = COALESCE(users.role, excluded.role),
               email = COALESCE(users.email, excluded.email),
               display_name = COALESCE(users.display_name, excluded.display_name),
               updated_at = excluded.updated_at
           WHERE users.family_id IS NULL
           RETURNING role, display_name"#,
    )
    .bind(&identity.user_id)
    .bind(&identity.email)
    .bind(&identity.display_name)
    .bind(role.as_str())
    .bind(family_id)
    .bind(&now)
    .bind(&now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = row {
        let role: Option<String> = row.get("role");
        return Ok(FamilyLink::Linked {
            role: role.as_deref().and_then(ParentRole::from_str),
            display_name: row.get("display_name"),
        });
    }

    let existing = sqlx::query("SELECT family_id, role FROM users WHERE id = ?")
        .bind(&identity.user_id)
        .fetch_optional(&mut *conn)
        .await?
        .and_then(|row| {
            let family_id: Option<String> = row.get("family_id");
            let role: Option<String> = row.get("role");
            family_id.map(|family_id| FamilyLink::Existing {
                family_id,
                role: role.as_deref().and_then(ParentRole::from_str),
            })
        });

    existing.ok_or_else(|| {
        AppError::Internal(format!(
            "User {} neither linked nor linkable",
            identity.user_id
        ))
    })
}

/// Give a user `role` unless they already have one. Returns the role the user
/// ends up with.
pub async fn settle_user_role(
    conn: &mut SqliteConnection,
    user_id: &str,
    role: ParentRole,
) -> Result<ParentRole, AppError> {
    let now = Utc::now().to_rfc3339();

    let current: Option<String> = sqlx::query(
        r#"UPDATE users SET role = COALESCE(role, ?), updated_at = ?
           WHERE id = ?
           RETURNING role"#,
    )
    .bind(role.as_str())
    .bind(&now)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .and_then(|row| row.get("role"));

    current
        .as_deref()
        .and_then(ParentRole::from_str)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

/// Role recorded on a membership, if the user is a member.
pub async fn member_role(
    conn: &mut SqliteConnection,
    family_id: &str,
    user_id: &str,
) -> Result<Option<ParentRole>, AppError> {
    let role: Option<String> =
        sqlx::query_scalar("SELECT role FROM memberships WHERE family_id = ? AND user_id = ?")
            .bind(family_id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(role.as_deref().and_then(ParentRole::from_str))
}

/// Idempotent membership upsert. Repeated calls merge into the same row and keep
/// the original join time.
pub async fn link_member(
    conn: &mut SqliteConnection,
    family_id: &str,
    user_id: &str,
    role: ParentRole,
    display_name: Option<&str>,
) -> Result<(), AppError> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO memberships (family_id, user_id, role, display_name, joined_at)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(family_id, user_id) DO UPDATE SET
               role = excluded.role,
               display_name = COALESCE(excluded.display_name, memberships.display_name)"#,
    )
    .bind(family_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(display_name)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Check family creation input before any store access.
pub fn validate_family_input(name: &str, timezone: &str) -> Result<(), AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Family name is required".to_string()));
    }
    if name.chars().count() > MAX_FAMILY_NAME {
        return Err(AppError::Validation(format!(
            "Family name is too long (max {})",
            MAX_FAMILY_NAME
        )));
    }
    // The zone name is opaque here; only reject values that cannot be a zone id.
    let timezone = timezone.trim();
    if timezone.is_empty() || timezone.len() > 64 || timezone.contains(char::is_whitespace) {
        return Err(AppError::Validation(
            "Timezone must be an IANA zone name".to_string(),
        ));
    }
    Ok(())
}

/// Creates families and links their creators atomically.
#[derive(Clone)]
pub struct MembershipLedger {
    pool: SqlitePool,
}

impl MembershipLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a family owned by `creator` and link the creator to it.
    ///
    /// The user link, family document and creator membership are written in one
    /// transaction. A creator who already has a family gets `AlreadyLinked` and
    /// nothing is written.
    pub async fn create_family(
        &self,
        creator: &Identity,
        name: &str,
        timezone: &str,
    ) -> Result<Family, AppError> {
        validate_family_input(name, timezone)?;

        let family_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let owners = vec![creator.user_id.clone()];

        let mut tx = self.pool.begin().await?;

        // The claim is the first statement so the transaction holds the write lock
        // before it reads anything.
        let link =
            claim_family_link(&mut tx, creator, &family_id, ParentRole::ParentA).await?;
        let (role, display_name) = match link {
            FamilyLink::Linked { role, display_name } => {
                (role.unwrap_or(ParentRole::ParentA), display_name)
            }
            FamilyLink::Existing {
                family_id: existing,
                ..
            } => {
                tx.rollback().await?;
                tracing::warn!(
                    user_id = %creator.user_id,
                    family_id = %existing,
                    "Family creation refused, user already linked"
                );
                return Err(AppError::AlreadyLinked {
                    family_id: existing,
                });
            }
        };

        sqlx::query(
            "INSERT INTO families (id, name, timezone, owners, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&family_id)
        .bind(name.trim())
        .bind(timezone.trim())
        .bind(serde_json::to_string(&owners)?)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        link_member(
            &mut tx,
            &family_id,
            &creator.user_id,
            role,
            display_name.as_deref(),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %creator.user_id, family_id = %family_id, "Family created");

        Ok(Family {
            id: family_id,
            name: name.trim().to_string(),
            timezone: timezone.trim().to_string(),
            owners,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}
