//! End-to-end flows through the session manager and the data-access facade,
//! wired to the in-memory backends.

use job_board_core::domain::USERS_COLLECTION;
use job_board_core::memory::{InMemoryAccounts, InMemoryDocumentStore, InMemoryIdentity};
use job_board_core::{
    authorize, Access, AuthError, ConnectivityMonitor, DataAccessFacade, FilterOp, NetworkEvent,
    OfflineNotice, PortError, QueryCondition, Role, SessionManager,
};
use serde_json::json;
use std::sync::Arc;

fn seeded_store() -> Arc<InMemoryDocumentStore> {
    Arc::new(
        InMemoryDocumentStore::from_seed(json!({
            "jobs": {
                "job-a": { "userId": "u1", "title": "Line Cook", "skills": ["grill"] },
                "job-b": { "userId": "u1", "title": "Sous Chef", "skills": ["menu", "grill"] },
                "job-c": { "userId": "u2", "title": "Barista", "skills": ["coffee"] }
            },
            "companies": {
                "acme": { "name": "Acme Foods", "employees": 120 }
            }
        }))
        .expect("valid seed"),
    )
}

#[tokio::test]
async fn employer_signs_up_and_lists_their_jobs() {
    let store = seeded_store();
    let accounts = InMemoryAccounts::new();
    let session = SessionManager::start(
        Arc::new(InMemoryIdentity::new(accounts.clone())),
        store.clone(),
    );
    let facade = DataAccessFacade::new(store.clone(), ConnectivityMonitor::default());

    assert_eq!(authorize(&session.ready().await, None), Access::SignInRequired);

    session
        .sign_up_with_email("owner@acme.com", "s3cret!", Role::Employer)
        .await
        .expect("sign-up succeeds");
    let mut rx = session.subscribe();
    let snapshot = rx
        .wait_for(|s| s.principal.as_ref().and_then(|p| p.role).is_some())
        .await
        .unwrap()
        .clone();
    assert_eq!(
        authorize(&snapshot, Some(&[Role::Employer][..])),
        Access::Granted
    );

    let jobs = facade
        .fetch_collection("jobs", &[QueryCondition::new("userId", FilterOp::Eq, "u1")])
        .await;
    assert!(jobs.error.is_none());
    assert_eq!(jobs.data.len(), 2);
    assert!(jobs.data.iter().all(|d| !d.id.is_empty()));
    assert!(!facade.is_loading());

    let profile = facade
        .fetch_document(USERS_COLLECTION, &snapshot.principal.unwrap().uid)
        .await
        .data
        .expect("profile exists");
    assert_eq!(profile.fields.get("role"), Some(&json!("employer")));
}

#[tokio::test]
async fn duplicate_sign_up_is_rejected() {
    let store = seeded_store();
    let accounts = InMemoryAccounts::new();
    let first_tab = SessionManager::start(
        Arc::new(InMemoryIdentity::new(accounts.clone())),
        store.clone(),
    );
    let second_tab = SessionManager::start(
        Arc::new(InMemoryIdentity::new(accounts.clone())),
        store.clone(),
    );

    first_tab
        .sign_up_with_email("dup@b.com", "secret1", Role::Employee)
        .await
        .unwrap();
    assert_eq!(
        second_tab
            .sign_up_with_email("dup@b.com", "secret2", Role::Employer)
            .await,
        Err(AuthError::EmailAlreadyInUse)
    );
    assert_eq!(store.len(USERS_COLLECTION).await, 1);
}

#[tokio::test]
async fn lost_connectivity_turns_failures_into_offline_notices() {
    let store = seeded_store();
    let monitor = ConnectivityMonitor::new(Some(true));
    let facade = DataAccessFacade::new(store.clone(), monitor.clone());

    monitor.handle(NetworkEvent::Offline);
    store
        .fail_with(PortError::store("network-request-failed", "fetch failed"))
        .await;

    let outcome = facade
        .fetch_collection(
            "jobs",
            &[QueryCondition::new("skills", FilterOp::ArrayContains, "grill")],
        )
        .await;
    assert!(outcome.data.is_empty());
    let error = facade.error().expect("error recorded");
    assert!(error.is_offline_error);
    assert!(matches!(
        OfflineNotice::select(Some(&error), monitor.is_online()),
        OfflineNotice::DataUnavailable { .. }
    ));

    // Retry once the connection is back.
    monitor.handle(NetworkEvent::Online);
    store.clear_failure().await;
    let retried = facade
        .fetch_collection(
            "jobs",
            &[QueryCondition::new("skills", FilterOp::ArrayContains, "grill")],
        )
        .await;
    assert_eq!(retried.data.len(), 2);
    assert_eq!(
        OfflineNotice::select(facade.error().as_ref(), monitor.is_online()),
        OfflineNotice::None
    );
}
