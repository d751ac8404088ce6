//! crates/job_board_core/src/data_access.rs
//!
//! The data-access facade: generic reads against the document store that never
//! fail loudly. Failures are classified into a [`FetchError`], handed back with the
//! call's outcome and mirrored into the facade's shared error field.

use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

use crate::connectivity::ConnectivityMonitor;
use crate::domain::{Document, FetchError, QueryCondition};
use crate::ports::{DocumentStore, PortError, PortResult};

/// The result of one fetch. `error` is `Some` exactly when the read failed, in which
/// case `data` is the empty value (an empty list or `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub data: T,
    pub error: Option<FetchError>,
}

impl<T> FetchOutcome<T> {
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// The facade's shared state, as observed by views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacadeStatus {
    /// Number of reads currently in flight.
    pub in_flight: usize,
    /// The most recent failure, until cleared.
    pub error: Option<FetchError>,
}

impl FacadeStatus {
    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }
}

/// Tags an error as connectivity-related.
///
/// The message check is a heuristic carried over from the client SDK's error texts;
/// the code checks are authoritative.
pub fn classify_error(err: &PortError, online: bool) -> FetchError {
    let message = match err.to_string() {
        m if m.is_empty() => "Unknown error occurred".to_string(),
        m => m,
    };
    let code = match err.code() {
        "" => "unknown".to_string(),
        c => c.to_string(),
    };
    let is_offline_error =
        message.contains("offline") || code == "unavailable" || (!online && code.contains("network"));
    FetchError {
        message,
        code,
        is_offline_error,
    }
}

/// Generic reads over a [`DocumentStore`].
pub struct DataAccessFacade {
    store: Arc<dyn DocumentStore>,
    connectivity: ConnectivityMonitor,
    status: watch::Sender<FacadeStatus>,
}

/// Decrements the in-flight count when a read settles, however it settles.
struct InFlight<'a>(&'a watch::Sender<FacadeStatus>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));
    }
}

impl DataAccessFacade {
    pub fn new(store: Arc<dyn DocumentStore>, connectivity: ConnectivityMonitor) -> Self {
        let (status, _) = watch::channel(FacadeStatus::default());
        Self {
            store,
            connectivity,
            status,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status.borrow().is_loading()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.status.borrow().error.clone()
    }

    pub fn clear_error(&self) {
        self.status.send_if_modified(|s| s.error.take().is_some());
    }

    pub fn subscribe(&self) -> watch::Receiver<FacadeStatus> {
        self.status.subscribe()
    }

    /// Reads a collection, filtered by `conditions` when any are given.
    pub async fn fetch_collection(
        &self,
        collection: &str,
        conditions: &[QueryCondition],
    ) -> FetchOutcome<Vec<Document>> {
        self.run(Vec::new(), || self.read_collection(collection, conditions))
            .await
    }

    /// Reads one document. A missing document is `None` with no error.
    pub async fn fetch_document(&self, collection: &str, id: &str) -> FetchOutcome<Option<Document>> {
        self.run(None, || self.read_document(collection, id)).await
    }

    /// Like [`fetch_collection`](Self::fetch_collection), decoding each record
    /// (identifier included) into `T`.
    pub async fn fetch_collection_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        conditions: &[QueryCondition],
    ) -> FetchOutcome<Vec<T>> {
        self.run(Vec::new(), || async {
            self.read_collection(collection, conditions)
                .await?
                .into_iter()
                .map(decode)
                .collect()
        })
        .await
    }

    pub async fn fetch_document_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> FetchOutcome<Option<T>> {
        self.run(None, || async {
            self.read_document(collection, id).await?.map(decode).transpose()
        })
        .await
    }

    async fn read_collection(
        &self,
        collection: &str,
        conditions: &[QueryCondition],
    ) -> PortResult<Vec<Document>> {
        check_collection_name(collection)?;
        for condition in conditions {
            condition.validate()?;
        }
        self.store.query(collection, conditions).await
    }

    async fn read_document(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        check_collection_name(collection)?;
        if id.is_empty() {
            return Err(PortError::store(
                "invalid-argument",
                "document id must not be empty",
            ));
        }
        self.store.get(collection, id).await
    }

    async fn run<T, F, Fut>(&self, empty: T, read: F) -> FetchOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        self.status.send_modify(|s| {
            s.in_flight += 1;
            s.error = None;
        });
        let _in_flight = InFlight(&self.status);

        match read().await {
            Ok(data) => FetchOutcome { data, error: None },
            Err(e) => {
                error!("Document store error: {:?}", e);
                let classified = classify_error(&e, self.connectivity.is_online());
                self.status
                    .send_modify(|s| s.error = Some(classified.clone()));
                FetchOutcome {
                    data: empty,
                    error: Some(classified),
                }
            }
        }
    }
}

fn check_collection_name(collection: &str) -> PortResult<()> {
    if collection.is_empty() || collection.contains('/') {
        return Err(PortError::store(
            "invalid-argument",
            format!("invalid collection name '{}'", collection),
        ));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(doc: Document) -> PortResult<T> {
    let id = doc.id.clone();
    serde_json::from_value(doc.into_json()).map_err(|e| {
        PortError::store(
            "invalid-argument",
            format!("document '{}' has an unexpected shape: {}", id, e),
        )
    })
}
