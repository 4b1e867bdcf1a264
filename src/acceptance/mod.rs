//! Invite acceptance.
//!
//! Each attempt walks `Unauthenticated -> Resolving -> Accepting` and ends in
//! `Accepted` or `Failed`. Accepting runs in one transaction: the invite is
//! claimed first, then the user is linked, then the membership is merged. A
//! refused or aborted attempt leaves the invite pending.

use std::time::Duration;

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::auth::Identity;
use crate::db::{claim_family_link, claim_invite, find_by_token, invite_url, link_member};
use crate::db::{member_role, settle_user_role};
use crate::db::{FamilyLink, InviteBroker};
use crate::errors::AppError;
use crate::models::{Invite, InviteParams, InviteStatus, ParentRole};

/// Store aborts are retried from `Resolving` this many times in total.
const MAX_ATTEMPTS: u32 = 3;

/// Pause before the first retry; later retries wait proportionally longer.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// A completed acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    pub family_id: String,
    pub user_id: String,
    pub role: ParentRole,
    /// The invite had already been consumed by this same user
    pub replayed: bool,
}

/// Why an acceptance attempt ended without linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptFailure {
    InviteInvalid,
    AlreadyAccepted,
    AlreadyLinkedElsewhere { family_id: String },
}

impl From<AcceptFailure> for AppError {
    fn from(failure: AcceptFailure) -> Self {
        match failure {
            AcceptFailure::InviteInvalid => {
                AppError::InviteInvalid("This invite link is invalid or has expired".to_string())
            }
            AcceptFailure::AlreadyAccepted => AppError::AlreadyAccepted,
            AcceptFailure::AlreadyLinkedElsewhere { family_id } => {
                AppError::AlreadyLinkedElsewhere { family_id }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptanceState {
    /// No identity yet; the caller must sign in and come back to `redirect`
    Unauthenticated {
        params: InviteParams,
        redirect: String,
    },
    Resolving {
        params: InviteParams,
        identity: Identity,
    },
    Accepting {
        params: InviteParams,
        identity: Identity,
        invite: Invite,
    },
    Accepted(Acceptance),
    Failed(AcceptFailure),
}

impl AcceptanceState {
    pub fn name(&self) -> &'static str {
        match self {
            AcceptanceState::Unauthenticated { .. } => "unauthenticated",
            AcceptanceState::Resolving { .. } => "resolving",
            AcceptanceState::Accepting { .. } => "accepting",
            AcceptanceState::Accepted(_) => "accepted",
            AcceptanceState::Failed(_) => "failed",
        }
    }

    /// States the coordinator cannot advance on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcceptanceState::Unauthenticated { .. }
                | AcceptanceState::Accepted(_)
                | AcceptanceState::Failed(_)
        )
    }
}

/// Sign-up page URL that resumes the same acceptance after sign-in.
pub fn signin_redirect(params: &InviteParams) -> String {
    let next = invite_url("", &params.family, &params.token);
    format!(
        "/invite-signup?next={}&invite={}&family={}",
        urlencoding::encode(&next),
        urlencoding::encode(&params.token),
        urlencoding::encode(&params.family)
    )
}

/// Decide the outcome for a token that can no longer be claimed.
fn settle_consumed(invite: Option<Invite>, identity: &Identity) -> AcceptanceState {
    match invite {
        Some(invite) if invite.status == InviteStatus::Accepted => {
            if invite.accepted_by.as_deref() == Some(identity.user_id.as_str()) {
                AcceptanceState::Accepted(Acceptance {
                    family_id: invite.family_id,
                    user_id: identity.user_id.clone(),
                    role: invite.role_suggested,
                    replayed: true,
                })
            } else {
                AcceptanceState::Failed(AcceptFailure::AlreadyAccepted)
            }
        }
        _ => AcceptanceState::Failed(AcceptFailure::InviteInvalid),
    }
}

/// A replayed acceptance reports the role the membership holds, which may
/// differ from the invite's suggestion.
async fn with_member_role(
    conn: &mut SqliteConnection,
    state: AcceptanceState,
) -> Result<AcceptanceState, AppError> {
    match state {
        AcceptanceState::Accepted(mut acceptance) if acceptance.replayed => {
            if let Some(role) =
                member_role(conn, &acceptance.family_id, &acceptance.user_id).await?
            {
                acceptance.role = role;
            }
            Ok(AcceptanceState::Accepted(acceptance))
        }
        other => Ok(other),
    }
}

/// Drives acceptance attempts against the invite and membership documents.
#[derive(Clone)]
pub struct AcceptanceCoordinator {
    pool: SqlitePool,
    invites: InviteBroker,
    retry_delay: Duration,
}

impl AcceptanceCoordinator {
    pub fn new(pool: SqlitePool, invites: InviteBroker) -> Self {
        Self {
            pool,
            invites,
            retry_delay: RETRY_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Run one acceptance attempt to a terminal state.
    ///
    /// Domain refusals come back as `Ok(AcceptanceState::Failed(..))`. `Err` is
    /// reserved for store failures that persisted across retries.
    pub async fn run(
        &self,
        identity: Option<Identity>,
        params: InviteParams,
    ) -> Result<AcceptanceState, AppError> {
        let Some(identity) = identity else {
            tracing::info!(family_id = %params.family, "Invite acceptance needs sign-in");
            return Ok(AcceptanceState::Unauthenticated {
                redirect: signin_redirect(&params),
                params,
            });
        };

        let mut attempt = 1;
        let mut state = AcceptanceState::Resolving {
            params: params.clone(),
            identity: identity.clone(),
        };

        while !state.is_terminal() {
            let from = state.name();
            match self.step(state).await {
                Ok(next) => {
                    tracing::info!(
                        family_id = %params.family,
                        user_id = %identity.user_id,
                        from,
                        to = next.name(),
                        "Acceptance transition"
                    );
                    state = next;
                }
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(
                        family_id = %params.family,
                        user_id = %identity.user_id,
                        attempt,
                        error = %err,
                        "Acceptance aborted, retrying from resolving"
                    );
                    tokio::time::sleep(self.retry_delay * (attempt - 1)).await;
                    state = AcceptanceState::Resolving {
                        params: params.clone(),
                        identity: identity.clone(),
                    };
                }
                Err(err) => return Err(err),
            }
        }

        if let AcceptanceState::Failed(reason) = &state {
            tracing::warn!(
                family_id = %params.family,
                user_id = %identity.user_id,
                ?reason,
                "Invite acceptance failed"
            );
        }
        Ok(state)
    }

    async fn step(&self, state: AcceptanceState) -> Result<AcceptanceState, AppError> {
        match state {
            AcceptanceState::Resolving { params, identity } => {
                match self.invites.resolve(&params.family, &params.token).await? {
                    Some(invite) if invite.status == InviteStatus::Pending => {
                        Ok(AcceptanceState::Accepting {
                            params,
                            identity,
                            invite,
                        })
                    }
                    other => match settle_consumed(other, &identity) {
                        settled @ AcceptanceState::Accepted(_) => {
                            let mut conn = self.pool.acquire().await?;
                            with_member_role(&mut conn, settled).await
                        }
                        settled => Ok(settled),
                    },
                }
            }
            AcceptanceState::Accepting {
                params,
                identity,
                invite,
            } => self.accept(&params, &identity, &invite).await,
            terminal => Ok(terminal),
        }
    }

    async fn accept(
        &self,
        params: &InviteParams,
        identity: &Identity,
        invite: &Invite,
    ) -> Result<AcceptanceState, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(suggested) =
            claim_invite(&mut tx, &params.family, &params.token, &identity.user_id).await?
        else {
            // Consumed or rotated since it was resolved
            let current = find_by_token(&mut tx, &params.family, &params.token).await?;
            let settled = settle_consumed(current, identity);
            let settled = with_member_role(&mut tx, settled).await?;
            tx.rollback().await?;
            return Ok(settled);
        };

        // A role the user already holds wins over the invite's suggestion, so the
        // user document and the membership always agree.
        let (role, display_name) =
            match claim_family_link(&mut tx, identity, &invite.family_id, suggested).await? {
                FamilyLink::Linked { role, display_name } => {
                    (role.unwrap_or(suggested), display_name)
                }
                FamilyLink::Existing { family_id, role } if family_id == invite.family_id => {
                    let role = match role {
                        Some(role) => role,
                        None => settle_user_role(&mut tx, &identity.user_id, suggested).await?,
                    };
                    (role, identity.display_name.clone())
                }
                FamilyLink::Existing { family_id, .. } => {
                    tx.rollback().await?;
                    return Ok(AcceptanceState::Failed(
                        AcceptFailure::AlreadyLinkedElsewhere { family_id },
                    ));
                }
            };

        link_member(
            &mut tx,
            &invite.family_id,
            &identity.user_id,
            role,
            display_name.as_deref(),
        )
        .await?;

        tx.commit().await?;

        Ok(AcceptanceState::Accepted(Acceptance {
            family_id: invite.family_id.clone(),
            user_id: identity.user_id.clone(),
            role,
            replayed: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database_with_busy_timeout, test_pool, MembershipLedger, Repository};
    use crate::models::{InviteLink, UpdateProfileRequest};

    struct Harness {
        pool: SqlitePool,
        repo: Repository,
        ledger: MembershipLedger,
        invites: InviteBroker,
        coordinator: AcceptanceCoordinator,
        dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let (pool, dir) = test_pool().await;
        let invites = InviteBroker::new(pool.clone(), "http://localhost:5173");
        Harness {
            pool: pool.clone(),
            repo: Repository::new(pool.clone()),
            ledger: MembershipLedger::new(pool.clone()),
            coordinator: AcceptanceCoordinator::new(pool, invites.clone()),
            invites,
            dir,
        }
    }

    fn params_of(link: &InviteLink) -> InviteParams {
        let token = link.url.split("token=").nth(1).expect("token in link");
        InviteParams {
            family: link.family_id.clone(),
            token: token.to_string(),
        }
    }

    /// Family owned by uid-a with a pending invite for bob.
    async fn family_with_invite(h: &Harness) -> (String, InviteParams) {
        let owner = Identity::new("uid-a");
        let family = h.ledger.create_family(&owner, "Home", "UTC").await.unwrap();
        let link = h
            .invites
            .issue(&family.id, "bob@example.com", ParentRole::ParentB, &owner)
            .await
            .unwrap();
        (family.id, params_of(&link))
    }

    #[test]
    fn test_signin_redirect_carries_params() {
        let params = InviteParams {
            family: "fam-1".to_string(),
            token: "tok".to_string(),
        };
        assert_eq!(
            signin_redirect(&params),
            "/invite-signup?next=%2Faccept-invite%3Ffamily%3Dfam-1%26token%3Dtok&invite=tok&family=fam-1"
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_keeps_params() {
        let h = harness().await;
        let (_, params) = family_with_invite(&h).await;

        let state = h.coordinator.run(None, params.clone()).await.unwrap();
        match state {
            AcceptanceState::Unauthenticated {
                params: kept,
                redirect,
            } => {
                assert_eq!(kept, params);
                assert!(redirect.contains(&params.token));
            }
            other => panic!("unexpected state {:?}", other),
        }

        // Nothing was consumed
        assert!(h.invites.lookup(&params.family, &params.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_accept_links_user_and_consumes_invite() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;
        let bob = Identity::new("uid-b").with_display_name("Bob");

        let state = h.coordinator.run(Some(bob.clone()), params.clone()).await.unwrap();
        assert_eq!(
            state,
            AcceptanceState::Accepted(Acceptance {
                family_id: family_id.clone(),
                user_id: "uid-b".to_string(),
                role: ParentRole::ParentB,
                replayed: false,
            })
        );

        let user = h.repo.get_user("uid-b").await.unwrap().unwrap();
        assert_eq!(user.family_id.as_deref(), Some(family_id.as_str()));
        assert_eq!(user.role, Some(ParentRole::ParentB));

        let members = h.repo.list_members(&family_id).await.unwrap();
        assert_eq!(members.len(), 2);
        let bob_member = members.iter().find(|m| m.user_id == "uid-b").unwrap();
        assert_eq!(bob_member.role, ParentRole::ParentB);
        assert_eq!(bob_member.display_name.as_deref(), Some("Bob"));

        let invite = h
            .invites
            .resolve(&params.family, &params.token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invite.status, InviteStatus::Accepted);
        assert_eq!(invite.accepted_by.as_deref(), Some("uid-b"));
    }

    #[tokio::test]
    async fn test_replay_by_same_user_is_accepted() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;
        let bob = Identity::new("uid-b");

        h.coordinator.run(Some(bob.clone()), params.clone()).await.unwrap();
        let again = h.coordinator.run(Some(bob), params).await.unwrap();
        assert_eq!(
            again,
            AcceptanceState::Accepted(Acceptance {
                family_id: family_id.clone(),
                user_id: "uid-b".to_string(),
                role: ParentRole::ParentB,
                replayed: true,
            })
        );
        assert_eq!(h.repo.list_members(&family_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_identity_gets_already_accepted() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;

        h.coordinator
            .run(Some(Identity::new("uid-b")), params.clone())
            .await
            .unwrap();
        let state = h
            .coordinator
            .run(Some(Identity::new("uid-c")), params)
            .await
            .unwrap();
        assert_eq!(state, AcceptanceState::Failed(AcceptFailure::AlreadyAccepted));

        let carol = h.repo.get_user("uid-c").await.unwrap();
        assert!(carol.map_or(true, |u| u.family_id.is_none()));
        assert_eq!(h.repo.list_members(&family_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_user_in_other_family_is_refused_and_invite_stays_pending() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;
        let bob = Identity::new("uid-b");
        let own = h.ledger.create_family(&bob, "Bob's", "UTC").await.unwrap();

        let state = h.coordinator.run(Some(bob), params.clone()).await.unwrap();
        assert_eq!(
            state,
            AcceptanceState::Failed(AcceptFailure::AlreadyLinkedElsewhere {
                family_id: own.id.clone()
            })
        );

        let user = h.repo.get_user("uid-b").await.unwrap().unwrap();
        assert_eq!(user.family_id.as_deref(), Some(own.id.as_str()));
        assert_eq!(h.repo.list_members(&family_id).await.unwrap().len(), 1);
        let invite = h.invites.lookup(&params.family, &params.token).await.unwrap();
        assert_eq!(invite.status, InviteStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_or_rotated_token_is_invalid() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;
        let bob = Identity::new("uid-b");

        let bogus = InviteParams {
            family: family_id.clone(),
            token: "not-a-token".to_string(),
        };
        let state = h.coordinator.run(Some(bob.clone()), bogus).await.unwrap();
        assert_eq!(state, AcceptanceState::Failed(AcceptFailure::InviteInvalid));

        // Consume, then re-invite: the first token no longer exists
        h.coordinator
            .run(Some(Identity::new("uid-c")), params.clone())
            .await
            .unwrap();
        h.invites
            .issue(&family_id, "bob@example.com", ParentRole::ParentB, &Identity::new("uid-a"))
            .await
            .unwrap();
        let state = h.coordinator.run(Some(bob), params).await.unwrap();
        assert_eq!(state, AcceptanceState::Failed(AcceptFailure::InviteInvalid));
    }

    #[tokio::test]
    async fn test_concurrent_acceptances_consume_once() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;

        let (b, c) = tokio::join!(
            h.coordinator.run(Some(Identity::new("uid-b")), params.clone()),
            h.coordinator.run(Some(Identity::new("uid-c")), params.clone())
        );
        let outcomes = [b.unwrap(), c.unwrap()];

        let accepted = outcomes
            .iter()
            .filter(|s| matches!(s, AcceptanceState::Accepted(_)))
            .count();
        assert_eq!(accepted, 1);
        assert!(outcomes
            .iter()
            .any(|s| *s == AcceptanceState::Failed(AcceptFailure::AlreadyAccepted)));
        assert_eq!(h.repo.list_members(&family_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_creator_accepting_own_invite_keeps_role_in_sync() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;

        let state = h
            .coordinator
            .run(Some(Identity::new("uid-a")), params.clone())
            .await
            .unwrap();
        assert_eq!(
            state,
            AcceptanceState::Accepted(Acceptance {
                family_id: family_id.clone(),
                user_id: "uid-a".to_string(),
                role: ParentRole::ParentA,
                replayed: false,
            })
        );

        let user = h.repo.get_user("uid-a").await.unwrap().unwrap();
        assert_eq!(user.role, Some(ParentRole::ParentA));
        let members = h.repo.list_members(&family_id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, ParentRole::ParentA);

        let invite = h.invites.resolve(&params.family, &params.token).await.unwrap().unwrap();
        assert_eq!(invite.status, InviteStatus::Accepted);

        let replay = h
            .coordinator
            .run(Some(Identity::new("uid-a")), params)
            .await
            .unwrap();
        match replay {
            AcceptanceState::Accepted(acceptance) => {
                assert!(acceptance.replayed);
                assert_eq!(acceptance.role, ParentRole::ParentA);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_profile_role_wins_over_suggested_role() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;
        let bob = Identity::new("uid-b");
        h.repo
            .update_profile(
                &bob,
                &UpdateProfileRequest {
                    display_name: "Bob".to_string(),
                    role: ParentRole::ParentA,
                },
            )
            .await
            .unwrap();

        let state = h.coordinator.run(Some(bob), params).await.unwrap();
        match state {
            AcceptanceState::Accepted(acceptance) => {
                assert_eq!(acceptance.role, ParentRole::ParentA)
            }
            other => panic!("unexpected state {:?}", other),
        }

        let user = h.repo.get_user("uid-b").await.unwrap().unwrap();
        let members = h.repo.list_members(&family_id).await.unwrap();
        let member = members.iter().find(|m| m.user_id == "uid-b").unwrap();
        assert_eq!(user.role, Some(member.role));
    }

    /// Coordinator on a pool that gives up on SQLite's write lock after 20ms,
    /// plus a connection on the harness pool holding that lock.
    async fn locked_store(
        h: &Harness,
        retry_delay: Duration,
    ) -> (AcceptanceCoordinator, sqlx::pool::PoolConnection<sqlx::Sqlite>) {
        let impatient = init_database_with_busy_timeout(
            &h.dir.path().join("test.sqlite"),
            Duration::from_millis(20),
        )
        .await
        .unwrap();
        let invites = InviteBroker::new(impatient.clone(), "http://localhost:5173");
        let coordinator =
            AcceptanceCoordinator::new(impatient, invites).with_retry_delay(retry_delay);

        let mut blocker = h.pool.acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *blocker)
            .await
            .unwrap();
        (coordinator, blocker)
    }

    #[tokio::test]
    async fn test_store_abort_leaves_no_partial_writes() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;
        let (coordinator, mut blocker) = locked_store(&h, Duration::from_millis(5)).await;

        let err = coordinator
            .run(Some(Identity::new("uid-b")), params.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();

        let invite = h.invites.lookup(&params.family, &params.token).await.unwrap();
        assert_eq!(invite.status, InviteStatus::Pending);
        assert!(invite.accepted_by.is_none());
        let bob = h.repo.get_user("uid-b").await.unwrap();
        assert!(bob.map_or(true, |u| u.family_id.is_none()));
        assert_eq!(h.repo.list_members(&family_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_abort_is_retried_until_accepted() {
        let h = harness().await;
        let (family_id, params) = family_with_invite(&h).await;
        let (coordinator, mut blocker) = locked_store(&h, Duration::from_millis(150)).await;

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
        });

        let state = coordinator
            .run(Some(Identity::new("uid-b")), params.clone())
            .await
            .unwrap();
        release.await.unwrap();

        assert_eq!(
            state,
            AcceptanceState::Accepted(Acceptance {
                family_id: family_id.clone(),
                user_id: "uid-b".to_string(),
                role: ParentRole::ParentB,
                replayed: false,
            })
        );

        let invite = h.invites.resolve(&params.family, &params.token).await.unwrap().unwrap();
        assert_eq!(invite.status, InviteStatus::Accepted);
        assert_eq!(invite.accepted_by.as_deref(), Some("uid-b"));
        let accepted: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM invites WHERE status = 'accepted'")
                .fetch_one(&h.pool)
                .await
                .unwrap();
        assert_eq!(accepted, 1);

        let members = h.repo.list_members(&family_id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(
            members.iter().filter(|m| m.user_id == "uid-b").count(),
            1
        );
    }

    #[test]
    fn test_failures_map_to_app_errors() {
        let err: AppError = AcceptFailure::AlreadyLinkedElsewhere {
            family_id: "fam-9".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "ALREADY_LINKED_ELSEWHERE");
        let err: AppError = AcceptFailure::InviteInvalid.into();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }
}
