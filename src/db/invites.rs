//! Invite broker.
//!
//! One invite document per (family, normalized email). Issuing refuses to rotate
//! a pending token; re-inviting after acceptance overwrites the same document
//! with a fresh token and a bumped version.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::{Invite, InviteLink, InvitePreview, InviteStatus, ParentRole};

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Storage key for a normalized email.
pub fn email_key(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Single-use invite token: two v4 UUIDs, 244 random bits, hex encoded.
pub fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Shareable acceptance link for a token.
pub fn invite_url(base_url: &str, family_id: &str, token: &str) -> String {
    format!(
        "{}/accept-invite?family={}&token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(family_id),
        urlencoding::encode(token)
    )
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9_%+-]+(\.[a-z0-9_%+-]+)*@([a-z0-9]([a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}$")
        .expect("valid email regex")
});

/// Checks a normalized (trimmed, lowercased) address.
fn validate_email(normalized: &str) -> Result<(), AppError> {
    if EMAIL_RE.is_match(normalized) {
        Ok(())
    } else {
        Err(AppError::Validation("Enter a valid email address".to_string()))
    }
}

/// Find an invite by token within one family, whatever its status.
pub async fn find_by_token(
    conn: &mut SqliteConnection,
    family_id: &str,
    token: &str,
) -> Result<Option<Invite>, AppError> {
    if token.is_empty() {
        return Ok(None);
    }

    // Plain equality is fine: tokens carry 244 random bits, so response timing
    // gives no usable signal for guessing one.
    let row = sqlx::query(
        r#"SELECT family_id, email_key, email, role_suggested, token, status, version,
                  created_by, created_at, updated_at, accepted_by, accepted_at
           FROM invites WHERE family_id = ? AND token = ?"#,
    )
    .bind(family_id)
    .bind(token)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().and_then(invite_from_row))
}

/// Consume a pending invite. Returns the suggested role, or `None` when no
/// pending invite carries this token.
pub async fn claim_invite(
    conn: &mut SqliteConnection,
    family_id: &str,
    token: &str,
    acceptor_id: &str,
) -> Result<Option<ParentRole>, AppError> {
    let now = Utc::now().to_rfc3339();

    // Same equality match as `find_by_token`; the token is unguessable.
    let row = sqlx::query(
        r#"UPDATE invites
           SET status = 'accepted', accepted_by = ?, accepted_at = ?, updated_at = ?
           WHERE family_id = ? AND token = ? AND status = 'pending'
           RETURNING role_suggested"#,
    )
    .bind(acceptor_id)
    .bind(&now)
    .bind(&now)
    .bind(family_id)
    .bind(token)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.and_then(|row| {
        let role: String = row.get("role_suggested");
        ParentRole::from_str(&role)
    }))
}

/// Issues and resolves invite tokens.
#[derive(Clone)]
pub struct InviteBroker {
    pool: SqlitePool,
    public_url: String,
}

impl InviteBroker {
    pub fn new(pool: SqlitePool, public_url: impl Into<String>) -> Self {
        Self {
            pool,
            public_url: public_url.into(),
        }
    }

    /// Invite `email` to `family_id`.
    ///
    /// Fails with `AlreadyPending` while an earlier invite to the same address is
    /// unconsumed. Two re-invites racing each other may both produce links; only
    /// the token written last stays consumable.
    pub async fn issue(
        &self,
        family_id: &str,
        email: &str,
        role_suggested: ParentRole,
        creator: &Identity,
    ) -> Result<InviteLink, AppError> {
        let normalized = normalize_email(email);
        validate_email(&normalized)?;
        let key = email_key(&normalized);

        let existing = sqlx::query("SELECT status FROM invites WHERE family_id = ? AND email_key = ?")
            .bind(family_id)
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = existing {
            let status: String = row.get("status");
            if InviteStatus::from_str(&status) == Some(InviteStatus::Pending) {
                return Err(AppError::AlreadyPending { email: normalized });
            }
        }

        let token = generate_token();
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            r#"INSERT INTO invites (family_id, email_key, email, role_suggested, token, status,
                                   version, created_by, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, 'pending', 1, ?, ?, ?)
               ON CONFLICT(family_id, email_key) DO UPDATE SET
                   email = excluded.email,
                   role_suggested = excluded.role_suggested,
                   token = excluded.token,
                   status = 'pending',
                   version = invites.version + 1,
                   created_by = excluded.created_by,
                   updated_at = excluded.updated_at,
                   accepted_by = NULL,
                   accepted_at = NULL
               WHERE invites.status <> 'pending'
               RETURNING version"#,
        )
        .bind(family_id)
        .bind(&key)
        .bind(&normalized)
        .bind(role_suggested.as_str())
        .bind(&token)
        .bind(&creator.user_id)
        .bind(&now)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        // A concurrent issue got there first
        let Some(row) = row else {
            return Err(AppError::AlreadyPending { email: normalized });
        };
        let version: i64 = row.get("version");

        tracing::info!(
            family_id = %family_id,
            created_by = %creator.user_id,
            version,
            "Invite issued"
        );

        Ok(InviteLink {
            family_id: family_id.to_string(),
            url: invite_url(&self.public_url, family_id, &token),
            email: normalized,
            version,
        })
    }

    /// Find the pending invite carrying `token`. Consumed or unknown tokens are
    /// `NotFound`.
    pub async fn lookup(&self, family_id: &str, token: &str) -> Result<Invite, AppError> {
        match self.resolve(family_id, token).await? {
            Some(invite) if invite.status == InviteStatus::Pending => Ok(invite),
            _ => Err(AppError::NotFound(
                "Invite not found or no longer valid".to_string(),
            )),
        }
    }

    /// Find the invite carrying `token` regardless of status.
    pub async fn resolve(&self, family_id: &str, token: &str) -> Result<Option<Invite>, AppError> {
        let mut conn = self.pool.acquire().await?;
        find_by_token(&mut conn, family_id, token).await
    }

    /// What the sign-up page may show for a pending token.
    pub async fn preview(&self, family_id: &str, token: &str) -> Result<InvitePreview, AppError> {
        let invite = self.lookup(family_id, token).await?;
        Ok(InvitePreview {
            family_id: invite.family_id,
            email: invite.email,
            role_suggested: invite.role_suggested,
        })
    }
}

fn invite_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<Invite> {
    let role: String = row.get("role_suggested");
    let status: String = row.get("status");
    Some(Invite {
        family_id: row.get("family_id"),
        email_key: row.get("email_key"),
        email: row.get("email"),
        role_suggested: ParentRole::from_str(&role)?,
        token: row.get("token"),
        status: InviteStatus::from_str(&status)?,
        version: row.get("version"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        accepted_by: row.get("accepted_by"),
        accepted_at: row.get("accepted_at"),
    })
}
