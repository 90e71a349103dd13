//! User verification over HTTP Basic and session cookies, admin-gated user
//! management (spec §4.1), grounded on
//! `original_source/cc-agency/cc_agency/broker/jwt_token.py` (session-secret
//! policy) and `.../routes/admin.py` (the create/remove/set_password shape —
//! the Auth type itself performs the mutation; the caller decides whether
//! the acting user is an admin).

mod blocklist;
mod cookie;
mod error;
mod password;
mod secret_key;

use std::sync::Arc;

use chrono::Utc;
use common::model::User;
use store::Store;
use tracing::{info, warn};

pub use blocklist::BlocklistPolicy;
pub use error::{AuthError, Result};
pub use secret_key::resolve_session_secret;

const DEFAULT_COOKIE_TTL_SECS: i64 = 900;

pub struct AuthedUser {
    pub username: String,
    pub is_admin: bool,
    /// Echo this back to the client (refreshed basic-auth login, or the
    /// cookie that was already valid) the way the original's
    /// `create_flask_response` re-attaches `user.authentication_cookie`.
    pub authentication_cookie: Option<String>,
}

pub struct Auth {
    store: Arc<dyn Store>,
    session_secret: Vec<u8>,
    cookie_ttl_secs: i64,
    blocklist: BlocklistPolicy,
}

impl Auth {
    pub fn new(store: Arc<dyn Store>, session_secret: Vec<u8>) -> Self {
        Self {
            store,
            session_secret,
            cookie_ttl_secs: DEFAULT_COOKIE_TTL_SECS,
            blocklist: BlocklistPolicy::default(),
        }
    }

    pub fn with_cookie_ttl_secs(mut self, secs: i64) -> Self {
        self.cookie_ttl_secs = secs;
        self
    }

    pub fn with_blocklist_policy(mut self, policy: BlocklistPolicy) -> Self {
        self.blocklist = policy;
        self
    }

    /// Accepts a valid cookie outright; otherwise requires Basic auth,
    /// throttled by the blocklist. On success, issues a fresh cookie.
    pub async fn verify_user(
        &self,
        basic_auth: Option<(&str, &str)>,
        cookie: Option<&str>,
        remote_addr: &str,
    ) -> Result<AuthedUser> {
        let now = Utc::now();

        if let Some(c) = cookie {
            if let Some(username) = cookie::verify(&self.session_secret, c, now, self.cookie_ttl_secs) {
                let user = self
                    .store
                    .get_user(&username)
                    .await?
                    .ok_or(AuthError::Unauthorized)?;
                return Ok(AuthedUser {
                    username: user.username,
                    is_admin: user.is_admin,
                    authentication_cookie: Some(c.to_string()),
                });
            }
        }

        let Some((username, password)) = basic_auth else {
            return Err(AuthError::Unauthorized);
        };

        if self
            .blocklist
            .is_blocked(&*self.store, remote_addr, username, now)
            .await?
        {
            warn!(%username, %remote_addr, "auth blocked: too many recent failures");
            return Err(AuthError::TooManyAttempts);
        }

        let user = self.store.get_user(username).await?;
        let verified = user
            .as_ref()
            .map(|u| password::verify_password(password, &u.salt, &u.verifier))
            .unwrap_or(false);

        if !verified {
            self.blocklist
                .record_failure(&*self.store, remote_addr, username, now)
                .await?;
            return Err(AuthError::Unauthorized);
        }

        self.blocklist.clear(&*self.store, remote_addr, username).await?;
        let user = user.expect("verified implies a user was found");
        let new_cookie = cookie::sign(&self.session_secret, &user.username, now);

        Ok(AuthedUser {
            username: user.username,
            is_admin: user.is_admin,
            authentication_cookie: Some(new_cookie),
        })
    }

    pub async fn create_user(&self, username: &str, password: &str, is_admin: bool) -> Result<()> {
        let salt = password::generate_salt();
        let verifier = password::derive_verifier(password, &salt);
        self.store
            .create_user(&User {
                username: username.to_string(),
                verifier,
                salt,
                is_admin,
            })
            .await?;
        info!(%username, "user created");
        Ok(())
    }

    pub async fn remove_user(&self, username: &str) -> Result<()> {
        self.store.remove_user(username).await?;
        info!(%username, "user removed");
        Ok(())
    }

    pub async fn set_password(&self, username: &str, password: &str) -> Result<()> {
        let salt = password::generate_salt();
        let verifier = password::derive_verifier(password, &salt);
        let existed = self.store.set_password(username, &verifier, &salt).await?;
        if !existed {
            return Err(AuthError::NoSuchUser(username.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::MemoryStore;

    fn auth() -> Auth {
        Auth::new(Arc::new(MemoryStore::new()), b"test-secret".to_vec())
    }

    #[tokio::test]
    async fn create_then_verify_with_basic_auth() {
        let auth = auth();
        auth.create_user("alice", "hunter2", false).await.unwrap();

        let authed = auth
            .verify_user(Some(("alice", "hunter2")), None, "127.0.0.1")
            .await
            .unwrap();
        assert_eq!(authed.username, "alice");
        assert!(authed.authentication_cookie.is_some());
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let auth = auth();
        auth.create_user("alice", "hunter2", false).await.unwrap();

        let err = auth
            .verify_user(Some(("alice", "wrong")), None, "127.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn repeated_failures_trip_the_blocklist() {
        let auth = auth();
        auth.create_user("alice", "hunter2", false).await.unwrap();

        for _ in 0..3 {
            let _ = auth.verify_user(Some(("alice", "wrong")), None, "10.0.0.1").await;
        }

        let err = auth
            .verify_user(Some(("alice", "hunter2")), None, "10.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TooManyAttempts));
    }

    #[tokio::test]
    async fn issued_cookie_is_accepted_without_password() {
        let auth = auth();
        auth.create_user("alice", "hunter2", false).await.unwrap();
        let first = auth
            .verify_user(Some(("alice", "hunter2")), None, "127.0.0.1")
            .await
            .unwrap();
        let cookie = first.authentication_cookie.unwrap();

        let second = auth
            .verify_user(None, Some(&cookie), "127.0.0.1")
            .await
            .unwrap();
        assert_eq!(second.username, "alice");
    }
}
