//! crates/job_board_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core depends on.
//! A document store and an identity provider are the only two external systems;
//! concrete adapters live in `memory` (in-process) and in the `api` service (Postgres).

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{
    is_well_formed_email, AuthUser, Document, Fields, QueryCondition, MIN_PASSWORD_LEN,
};

//=========================================================================================
// Error Types
//=========================================================================================

/// Failures reported by the identity provider for credential and federated flows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("The email address is badly formatted.")]
    InvalidEmail,
    #[error("Password should be at least 6 characters.")]
    WeakPassword,
    #[error("The email address is already in use by another account.")]
    EmailAlreadyInUse,
    #[error("The supplied credentials are incorrect.")]
    InvalidCredential,
    #[error("This sign-in method is not enabled.")]
    OperationNotAllowed,
    #[error("The sign-in popup was closed before completing.")]
    PopupClosed,
    #[error("No user is signed in.")]
    NotSignedIn,
    #[error("Failed to read the profile record: {0}")]
    ProfileRead(String),
    #[error("Failed to write the profile record: {0}")]
    ProfileWrite(String),
    #[error("Identity provider error: {0}")]
    Provider(String),
}

impl AuthError {
    /// The provider-style error code, e.g. `auth/weak-password`.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail => "auth/invalid-email",
            AuthError::WeakPassword => "auth/weak-password",
            AuthError::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthError::InvalidCredential => "auth/invalid-credential",
            AuthError::OperationNotAllowed => "auth/operation-not-allowed",
            AuthError::PopupClosed => "auth/popup-closed-by-user",
            AuthError::NotSignedIn => "auth/no-current-user",
            AuthError::ProfileRead(_) => "auth/profile-read-failed",
            AuthError::ProfileWrite(_) => "auth/profile-write-failed",
            AuthError::Provider(_) => "auth/internal-error",
        }
    }
}

/// The checks every identity backend applies before creating a credential account.
pub fn validate_new_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if !is_well_formed_email(email) {
        return Err(AuthError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

/// A generic error type for all port operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// A failure from the document store, tagged with the store's error code
    /// (`unavailable`, `permission-denied`, `invalid-argument`, ...).
    #[error("{message}")]
    Store { code: String, message: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn store(code: impl Into<String>, message: impl Into<String>) -> Self {
        PortError::Store {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The machine-readable code used when this error is recorded as a fetch error.
    pub fn code(&self) -> &str {
        match self {
            PortError::NotFound(_) => "not-found",
            PortError::Unauthorized => "permission-denied",
            PortError::Store { code, .. } => code,
            PortError::Auth(e) => e.code(),
            PortError::Unexpected(_) => "unknown",
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// One-shot reads and writes against a schemaless collection/document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns every document in `collection` matching all `conditions`.
    /// An empty condition list reads the whole collection.
    async fn query(
        &self,
        collection: &str,
        conditions: &[QueryCondition],
    ) -> PortResult<Vec<Document>>;

    /// Looks up one document. A missing document is `Ok(None)`, not an error.
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>>;

    /// Creates or replaces a document.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()>;

    /// Cheap round trip used to decide whether the store is reachable.
    async fn probe(&self) -> PortResult<()>;
}

/// A client of the identity provider. Each client tracks one signed-in user and
/// publishes every change of it through [`IdentityProvider::subscribe`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Federated sign-in (the popup flow). Returns the signed-in user.
    async fn sign_in_with_popup(&self) -> Result<AuthUser, AuthError>;

    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError>;

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    fn current_user(&self) -> Option<AuthUser>;

    /// A receiver holding the current user; it is marked changed on every
    /// sign-in, sign-out and token refresh.
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;
}
