//! crates/job_board_core/src/memory.rs
//!
//! In-process implementations of the `DocumentStore` and `IdentityProvider` ports.
//! They back the service when no database is configured and stand in for the
//! remote systems in tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::domain::{AuthUser, Document, Fields, QueryCondition};
use crate::ports::{
    validate_new_credentials, AuthError, DocumentStore, IdentityProvider, PortError, PortResult,
};

//=========================================================================================
// Document store
//=========================================================================================

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// A document store held in memory. Documents within a collection are returned
/// in identifier order.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<Collections>,
    failure: RwLock<Option<PortError>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a seed of the shape `{ "collection": { "id": { ...fields } } }`.
    pub fn from_seed(seed: Value) -> PortResult<Self> {
        let Value::Object(seed) = seed else {
            return Err(PortError::Unexpected(
                "seed must be an object of collections".to_string(),
            ));
        };
        let mut collections = Collections::new();
        for (name, docs) in seed {
            let Value::Object(docs) = docs else {
                return Err(PortError::Unexpected(format!(
                    "seed collection '{}' must be an object of documents",
                    name
                )));
            };
            let mut stored = BTreeMap::new();
            for (id, fields) in docs {
                let Value::Object(fields) = fields else {
                    return Err(PortError::Unexpected(format!(
                        "seed document '{}/{}' must be an object",
                        name, id
                    )));
                };
                stored.insert(id, fields);
            }
            collections.insert(name, stored);
        }
        Ok(Self {
            collections: RwLock::new(collections),
            failure: RwLock::new(None),
        })
    }

    pub async fn insert(&self, collection: &str, id: &str, fields: Fields) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Makes every subsequent operation fail with `err` until [`clear_failure`](Self::clear_failure).
    pub async fn fail_with(&self, err: PortError) {
        *self.failure.write().await = Some(err);
    }

    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
    }

    async fn check_failure(&self) -> PortResult<()> {
        match self.failure.read().await.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query(
        &self,
        collection: &str,
        conditions: &[QueryCondition],
    ) -> PortResult<Vec<Document>> {
        self.check_failure().await?;
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, fields)| conditions.iter().all(|c| c.matches(fields)))
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect())
    }

    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        self.check_failure().await?;
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()> {
        self.check_failure().await?;
        self.insert(collection, id, fields).await;
        Ok(())
    }

    async fn probe(&self) -> PortResult<()> {
        self.check_failure().await
    }
}

//=========================================================================================
// Identity provider
//=========================================================================================

struct Account {
    user: AuthUser,
    /// `None` for accounts created through federated sign-in.
    password: Option<String>,
}

/// The account registry shared by every [`InMemoryIdentity`] client.
#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: Mutex<HashMap<String, Account>>,
    popup_results: Mutex<VecDeque<Result<AuthUser, AuthError>>>,
}

impl InMemoryAccounts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts the outcome of the next federated popup sign-in.
    pub async fn queue_popup(&self, outcome: Result<AuthUser, AuthError>) {
        self.popup_results.lock().await.push_back(outcome);
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.lock().await.len()
    }
}

/// One client session against [`InMemoryAccounts`].
pub struct InMemoryIdentity {
    accounts: Arc<InMemoryAccounts>,
    current: watch::Sender<Option<AuthUser>>,
}

impl InMemoryIdentity {
    pub fn new(accounts: Arc<InMemoryAccounts>) -> Self {
        let (current, _) = watch::channel(None);
        Self { accounts, current }
    }

    /// Re-announces the current user, as a token refresh would.
    pub fn refresh_token(&self) {
        self.current.send_modify(|_| {});
    }

    fn publish(&self, user: &AuthUser) {
        self.current.send_replace(Some(user.clone()));
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    async fn sign_in_with_popup(&self) -> Result<AuthUser, AuthError> {
        let federated = self
            .accounts
            .popup_results
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(AuthError::PopupClosed))?;

        let user = {
            let mut accounts = self.accounts.accounts.lock().await;
            accounts
                .entry(federated.uid.clone())
                .or_insert_with(|| Account {
                    user: federated.clone(),
                    password: None,
                })
                .user
                .clone()
        };
        self.publish(&user);
        Ok(user)
    }

    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        validate_new_credentials(email, password)?;

        let user = {
            let mut accounts = self.accounts.accounts.lock().await;
            let taken = accounts.values().any(|a| {
                a.user
                    .email
                    .as_deref()
                    .map_or(false, |e| e.eq_ignore_ascii_case(email))
            });
            if taken {
                return Err(AuthError::EmailAlreadyInUse);
            }
            let user = AuthUser {
                uid: Uuid::new_v4().simple().to_string(),
                email: Some(email.to_string()),
                display_name: None,
                photo_url: None,
            };
            accounts.insert(
                user.uid.clone(),
                Account {
                    user: user.clone(),
                    password: Some(password.to_string()),
                },
            );
            user
        };
        info!(uid = %user.uid, "Created credential account");
        self.publish(&user);
        Ok(user)
    }

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        let user = {
            let accounts = self.accounts.accounts.lock().await;
            accounts
                .values()
                .find(|a| {
                    a.password.as_deref() == Some(password)
                        && a.user
                            .email
                            .as_deref()
                            .map_or(false, |e| e.eq_ignore_ascii_case(email))
                })
                .map(|a| a.user.clone())
                .ok_or(AuthError::InvalidCredential)?
        };
        self.publish(&user);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.current.send_replace(None);
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FilterOp;
    use serde_json::json;

    #[tokio::test]
    async fn seeded_store_answers_queries() {
        let store = InMemoryDocumentStore::from_seed(json!({
            "companies": {
                "c1": { "name": "Acme", "size": 40 },
                "c2": { "name": "Globex", "size": 900 }
            }
        }))
        .unwrap();

        let large = store
            .query("companies", &[QueryCondition::new("size", FilterOp::Gt, 100)])
            .await
            .unwrap();
        assert_eq!(large.len(), 1);
        assert_eq!(large[0].id, "c2");
        assert!(store.query("nothing-here", &[]).await.unwrap().is_empty());
    }

    #[test]
    fn malformed_seed_is_rejected() {
        assert!(InMemoryDocumentStore::from_seed(json!(["not", "a", "map"])).is_err());
        assert!(InMemoryDocumentStore::from_seed(json!({ "jobs": { "j1": 3 } })).is_err());
    }

    #[tokio::test]
    async fn injected_failures_affect_every_operation() {
        let store = InMemoryDocumentStore::new();
        store.fail_with(PortError::store("unavailable", "down")).await;
        assert!(store.probe().await.is_err());
        assert!(store.get("jobs", "j1").await.is_err());
        store.clear_failure().await;
        assert!(store.probe().await.is_ok());
    }

    #[tokio::test]
    async fn credential_accounts() {
        let accounts = InMemoryAccounts::new();
        let client = InMemoryIdentity::new(accounts.clone());

        assert_eq!(
            client.create_user_with_email_and_password("nope", "secret1").await,
            Err(AuthError::InvalidEmail)
        );
        assert_eq!(
            client.create_user_with_email_and_password("a@b.com", "short").await,
            Err(AuthError::WeakPassword)
        );

        let created = client
            .create_user_with_email_and_password("a@b.com", "secret1")
            .await
            .unwrap();
        assert_eq!(client.current_user(), Some(created.clone()));
        assert_eq!(
            client.create_user_with_email_and_password("A@B.com", "secret2").await,
            Err(AuthError::EmailAlreadyInUse)
        );

        let other_tab = InMemoryIdentity::new(accounts.clone());
        assert_eq!(other_tab.current_user(), None);
        assert_eq!(
            other_tab.sign_in_with_email_and_password("a@b.com", "wrong!!").await,
            Err(AuthError::InvalidCredential)
        );
        assert_eq!(
            other_tab
                .sign_in_with_email_and_password("a@b.com", "secret1")
                .await
                .unwrap(),
            created
        );
        assert_eq!(accounts.account_count().await, 1);
    }

    #[tokio::test]
    async fn popup_without_a_scripted_result_is_closed() {
        let client = InMemoryIdentity::new(InMemoryAccounts::new());
        assert_eq!(client.sign_in_with_popup().await, Err(AuthError::PopupClosed));
    }
}
