//! crates/job_board_core/src/session.rs
//!
//! The session manager. A background listener task is the only writer of the
//! signed-in [`Principal`]; the sign-in/sign-up/sign-out operations act on the
//! identity provider and the profile store and let the listener publish the result.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::{
    role_from_fields, AuthUser, Fields, Principal, Role, UserProfile, ROLE_FIELD,
    ROLE_PENDING_FIELD, USERS_COLLECTION,
};
use crate::ports::{AuthError, DocumentStore, IdentityProvider};

/// What views see of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub principal: Option<Principal>,
    /// True until the listener has resolved the initial auth state once.
    pub loading: bool,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            principal: None,
            loading: true,
        }
    }
}

pub struct SessionManager {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    snapshot: watch::Receiver<SessionSnapshot>,
    refresh: mpsc::UnboundedSender<()>,
    listener: JoinHandle<()>,
}

impl SessionManager {
    /// Subscribes to the identity provider and starts the listener task.
    pub fn start(identity: Arc<dyn IdentityProvider>, store: Arc<dyn DocumentStore>) -> Self {
        let (snapshot_tx, snapshot) = watch::channel(SessionSnapshot::initial());
        let (refresh, refresh_rx) = mpsc::unbounded_channel();
        let listener = tokio::spawn(listen(
            identity.subscribe(),
            refresh_rx,
            store.clone(),
            snapshot_tx,
        ));
        Self {
            identity,
            store,
            snapshot,
            refresh,
            listener,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.snapshot.borrow().principal.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.borrow().loading
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Waits for the first resolution of the auth state.
    pub async fn ready(&self) -> SessionSnapshot {
        let mut rx = self.snapshot.clone();
        let resolved = rx.wait_for(|s| !s.loading).await.map(|s| s.clone());
        resolved.unwrap_or_else(|_| self.snapshot())
    }

    /// Federated sign-in. A first-time user gets a profile with the default role,
    /// flagged as pending selection. Failures are logged, not returned.
    pub async fn sign_in_with_google(&self) {
        if let Err(e) = self.try_sign_in_with_google().await {
            error!("Error signing in with Google: {}", e);
        }
    }

    async fn try_sign_in_with_google(&self) -> Result<(), AuthError> {
        let user = self.identity.sign_in_with_popup().await?;
        let existing = self
            .store
            .get(USERS_COLLECTION, &user.uid)
            .await
            .map_err(|e| AuthError::ProfileRead(e.to_string()))?;

        if existing.is_none() {
            let profile = UserProfile {
                email: user.email.clone(),
                name: user.display_name.clone(),
                photo_url: user.photo_url.clone(),
                role: Role::default(),
                created_at: Utc::now(),
                role_pending: true,
            };
            self.write_profile(&user, &profile).await?;
            info!(uid = %user.uid, "Created profile for first federated sign-in");
        }
        Ok(())
    }

    /// Creates a credential account and its profile with the given role.
    pub async fn sign_up_with_email(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<(), AuthError> {
        let result = async {
            let user = self
                .identity
                .create_user_with_email_and_password(email, password)
                .await?;
            let profile = UserProfile {
                email: user.email.clone(),
                name: None,
                photo_url: None,
                role,
                created_at: Utc::now(),
                role_pending: false,
            };
            self.write_profile(&user, &profile).await
        }
        .await;

        if let Err(e) = &result {
            error!("Error signing up with email: {}", e);
        }
        result
    }

    pub async fn login_with_email(&self, email: &str, password: &str) -> Result<(), AuthError> {
        match self
            .identity
            .sign_in_with_email_and_password(email, password)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Error logging in with email: {}", e);
                Err(e)
            }
        }
    }

    pub async fn logout(&self) {
        if let Err(e) = self.identity.sign_out().await {
            error!("Error signing out: {}", e);
        }
    }

    /// Sets the signed-in user's role and clears any pending selection. The other
    /// fields of an existing profile are kept as stored.
    pub async fn select_role(&self, role: Role) -> Result<(), AuthError> {
        let user = self.identity.current_user().ok_or(AuthError::NotSignedIn)?;
        let stored = self
            .store
            .get(USERS_COLLECTION, &user.uid)
            .await
            .map_err(|e| AuthError::ProfileRead(e.to_string()))?;

        let mut fields = match stored {
            Some(doc) => doc.fields,
            None => UserProfile {
                email: user.email.clone(),
                name: user.display_name.clone(),
                photo_url: user.photo_url.clone(),
                role,
                created_at: Utc::now(),
                role_pending: false,
            }
            .to_fields()
            .map_err(|e| AuthError::ProfileWrite(e.to_string()))?,
        };
        fields.insert(ROLE_FIELD.to_string(), Value::from(role.as_str()));
        fields.insert(ROLE_PENDING_FIELD.to_string(), Value::Bool(false));
        self.write_fields(&user, fields).await?;
        info!(uid = %user.uid, %role, "Role selected");
        Ok(())
    }

    async fn write_profile(&self, user: &AuthUser, profile: &UserProfile) -> Result<(), AuthError> {
        let fields = profile
            .to_fields()
            .map_err(|e| AuthError::ProfileWrite(e.to_string()))?;
        self.write_fields(user, fields).await
    }

    /// Writes the profile record and asks the listener to re-read it.
    async fn write_fields(&self, user: &AuthUser, fields: Fields) -> Result<(), AuthError> {
        self.store
            .set(USERS_COLLECTION, &user.uid, fields)
            .await
            .map_err(|e| AuthError::ProfileWrite(e.to_string()))?;
        // The listener only exits when the manager is dropped.
        let _ = self.refresh.send(());
        Ok(())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// The single writer of the session snapshot.
async fn listen(
    mut auth: watch::Receiver<Option<AuthUser>>,
    mut refresh: mpsc::UnboundedReceiver<()>,
    store: Arc<dyn DocumentStore>,
    snapshot: watch::Sender<SessionSnapshot>,
) {
    loop {
        let user = auth.borrow_and_update().clone();
        let principal = match user {
            Some(user) => Some(resolve_principal(store.as_ref(), &user).await),
            None => None,
        };

        // A newer auth state arrived while the profile was being read; resolve that one instead.
        if !matches!(auth.has_changed(), Ok(true)) {
            snapshot.send_replace(SessionSnapshot {
                principal,
                loading: false,
            });
        }

        tokio::select! {
            changed = auth.changed() => {
                if changed.is_err() {
                    warn!("Identity provider closed its auth-state channel");
                    break;
                }
            }
            request = refresh.recv() => {
                if request.is_none() {
                    break;
                }
            }
        }
    }
}

async fn resolve_principal(store: &dyn DocumentStore, user: &AuthUser) -> Principal {
    match store.get(USERS_COLLECTION, &user.uid).await {
        Ok(Some(doc)) => {
            if doc.fields.contains_key(ROLE_FIELD) && role_from_fields(&doc.fields).is_none() {
                warn!(uid = %user.uid, "Ignoring unrecognised role in profile");
            }
            Principal::new(user, Some(&doc.fields))
        }
        Ok(None) => Principal::new(user, None),
        Err(e) => {
            error!(uid = %user.uid, "Failed to read profile: {}", e);
            Principal::new(user, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryAccounts, InMemoryDocumentStore, InMemoryIdentity};
    use crate::ports::PortError;

    struct Harness {
        accounts: Arc<InMemoryAccounts>,
        store: Arc<InMemoryDocumentStore>,
        identity: Arc<InMemoryIdentity>,
        session: SessionManager,
    }

    fn harness() -> Harness {
        let accounts = InMemoryAccounts::new();
        let store = Arc::new(InMemoryDocumentStore::new());
        let identity = Arc::new(InMemoryIdentity::new(accounts.clone()));
        let session = SessionManager::start(identity.clone(), store.clone());
        Harness {
            accounts,
            store,
            identity,
            session,
        }
    }

    fn google_user(uid: &str) -> AuthUser {
        AuthUser {
            uid: uid.to_string(),
            email: Some(format!("{}@gmail.com", uid)),
            display_name: Some("Ada".to_string()),
            photo_url: Some("https://img/ada.png".to_string()),
        }
    }

    #[tokio::test]
    async fn starts_loading_then_resolves_to_signed_out() {
        let h = harness();
        let ready = h.session.ready().await;
        assert!(!ready.loading);
        assert_eq!(ready.principal, None);
        assert!(!h.session.is_loading());
    }

    #[tokio::test]
    async fn sign_up_publishes_principal_with_role() {
        let h = harness();
        h.session.ready().await;
        h.session
            .sign_up_with_email("boss@corp.com", "hunter22", Role::Employer)
            .await
            .unwrap();

        let mut rx = h.session.subscribe();
        let snapshot = rx
            .wait_for(|s| s.principal.as_ref().and_then(|p| p.role).is_some())
            .await
            .unwrap()
            .clone();
        let principal = snapshot.principal.unwrap();
        assert_eq!(principal.email.as_deref(), Some("boss@corp.com"));
        assert_eq!(principal.role, Some(Role::Employer));
        assert!(!principal.pending_role_selection);
    }

    #[tokio::test]
    async fn weak_password_fails_without_writing_a_profile() {
        let h = harness();
        let err = h
            .session
            .sign_up_with_email("a@b.com", "short", Role::Employee)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::WeakPassword);
        assert_eq!(h.store.len(USERS_COLLECTION).await, 0);
        assert_eq!(h.accounts.account_count().await, 0);
    }

    #[tokio::test]
    async fn login_errors_are_returned() {
        let h = harness();
        assert_eq!(
            h.session.login_with_email("ghost@b.com", "whatever").await,
            Err(AuthError::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn first_google_sign_in_defaults_to_employee_pending_selection() {
        let h = harness();
        h.accounts.queue_popup(Ok(google_user("g1"))).await;
        h.session.sign_in_with_google().await;

        let mut rx = h.session.subscribe();
        let principal = rx
            .wait_for(|s| s.principal.as_ref().and_then(|p| p.role).is_some())
            .await
            .unwrap()
            .principal
            .clone()
            .unwrap();
        assert_eq!(principal.role, Some(Role::Employee));
        assert!(principal.pending_role_selection);
        assert_eq!(principal.display_name.as_deref(), Some("Ada"));

        h.session.select_role(Role::Employer).await.unwrap();
        let principal = rx
            .wait_for(|s| s.principal.as_ref().map_or(false, |p| !p.pending_role_selection))
            .await
            .unwrap()
            .principal
            .clone()
            .unwrap();
        assert_eq!(principal.role, Some(Role::Employer));
    }

    #[tokio::test]
    async fn returning_google_user_keeps_existing_profile() {
        let h = harness();
        h.accounts.queue_popup(Ok(google_user("g2"))).await;
        h.session.sign_in_with_google().await;
        h.session.select_role(Role::Employer).await.unwrap();
        h.session.logout().await;

        h.accounts.queue_popup(Ok(google_user("g2"))).await;
        h.session.sign_in_with_google().await;

        let stored = h.store.get(USERS_COLLECTION, "g2").await.unwrap().unwrap();
        let profile = UserProfile::from_fields(stored.fields).unwrap();
        assert_eq!(profile.role, Role::Employer);
        assert!(!profile.role_pending);

        let mut rx = h.session.subscribe();
        rx.wait_for(|s| {
            s.principal.as_ref().map_or(false, |p| {
                p.role == Some(Role::Employer) && !p.pending_role_selection
            })
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn google_failures_are_swallowed() {
        let h = harness();
        h.session.ready().await;
        h.session.sign_in_with_google().await;
        assert_eq!(h.session.principal(), None);
    }

    #[tokio::test]
    async fn logout_clears_principal_but_keeps_profile() {
        let h = harness();
        h.session
            .sign_up_with_email("a@b.com", "secret1", Role::Employee)
            .await
            .unwrap();
        let mut rx = h.session.subscribe();
        rx.wait_for(|s| s.principal.is_some()).await.unwrap();

        h.session.logout().await;
        rx.wait_for(|s| s.principal.is_none()).await.unwrap();
        assert_eq!(h.store.len(USERS_COLLECTION).await, 1);
    }

    #[tokio::test]
    async fn profile_read_failure_publishes_principal_without_role() {
        let h = harness();
        h.session.ready().await;
        h.store.fail_with(PortError::store("unavailable", "offline")).await;
        h.accounts.queue_popup(Ok(google_user("g3"))).await;
        // The profile lookup fails too, so no profile is created.
        h.session.sign_in_with_google().await;

        let mut rx = h.session.subscribe();
        let principal = rx
            .wait_for(|s| s.principal.is_some())
            .await
            .unwrap()
            .principal
            .clone()
            .unwrap();
        assert_eq!(principal.uid, "g3");
        assert_eq!(principal.role, None);
    }

    #[tokio::test]
    async fn select_role_requires_a_signed_in_user() {
        let h = harness();
        assert_eq!(
            h.session.select_role(Role::Employer).await,
            Err(AuthError::NotSignedIn)
        );
    }

    #[tokio::test]
    async fn token_refresh_re_reads_the_profile() {
        let h = harness();
        h.session
            .sign_up_with_email("a@b.com", "secret1", Role::Employee)
            .await
            .unwrap();
        let mut rx = h.session.subscribe();
        rx.wait_for(|s| s.principal.as_ref().and_then(|p| p.role) == Some(Role::Employee))
            .await
            .unwrap();

        // Change the profile behind the manager's back, then refresh the token.
        let uid = h.identity.current_user().unwrap().uid;
        let mut profile = UserProfile::from_fields(
            h.store.get(USERS_COLLECTION, &uid).await.unwrap().unwrap().fields,
        )
        .unwrap();
        profile.role = Role::Employer;
        h.store
            .insert(USERS_COLLECTION, &uid, profile.to_fields().unwrap())
            .await;
        h.identity.refresh_token();

        rx.wait_for(|s| s.principal.as_ref().and_then(|p| p.role) == Some(Role::Employer))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn partial_profile_keeps_its_role_and_can_be_updated() {
        let h = harness();
        let mut fields = Fields::new();
        fields.insert("email".to_string(), Value::from("u1@gmail.com"));
        fields.insert("role".to_string(), Value::from("employer"));
        h.store.insert(USERS_COLLECTION, "u1", fields).await;

        h.accounts.queue_popup(Ok(google_user("u1"))).await;
        h.session.sign_in_with_google().await;

        let mut rx = h.session.subscribe();
        let principal = rx
            .wait_for(|s| s.principal.is_some())
            .await
            .unwrap()
            .principal
            .clone()
            .unwrap();
        assert_eq!(principal.role, Some(Role::Employer));
        assert!(!principal.pending_role_selection);

        h.session.select_role(Role::Employee).await.unwrap();
        let stored = h.store.get(USERS_COLLECTION, "u1").await.unwrap().unwrap();
        assert_eq!(stored.fields["role"], "employee");
        assert_eq!(stored.fields["rolePending"], false);
        assert_eq!(stored.fields["email"], "u1@gmail.com");
        assert!(!stored.fields.contains_key("createdAt"));

        rx.wait_for(|s| s.principal.as_ref().and_then(|p| p.role) == Some(Role::Employee))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn select_role_reports_profile_lookup_failures_as_reads() {
        let h = harness();
        h.accounts.queue_popup(Ok(google_user("g4"))).await;
        h.session.sign_in_with_google().await;
        h.store.fail_with(PortError::store("unavailable", "offline")).await;

        let err = h.session.select_role(Role::Employer).await.unwrap_err();
        assert!(matches!(err, AuthError::ProfileRead(_)));
        assert_eq!(err.code(), "auth/profile-read-failed");
    }
}
