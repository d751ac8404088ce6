//! services/api/src/adapters/identity.rs
//!
//! The Postgres implementation of the `IdentityProvider` port. Accounts are shared
//! through the `accounts` table; each `PgIdentity` is one client session tracking
//! its own signed-in user.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use job_board_core::domain::{is_well_formed_email, AuthUser};
use job_board_core::ports::{validate_new_credentials, AuthError, IdentityProvider};
use sqlx::{FromRow, PgPool};
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

pub struct PgIdentity {
    pool: PgPool,
    current: watch::Sender<Option<AuthUser>>,
}

impl PgIdentity {
    pub fn new(pool: PgPool) -> Self {
        let (current, _) = watch::channel(None);
        Self { pool, current }
    }

    fn publish(&self, user: &AuthUser) {
        self.current.send_replace(Some(user.clone()));
    }
}

#[derive(FromRow)]
struct AccountRecord {
    uid: String,
    email: Option<String>,
    password_hash: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
}

impl AccountRecord {
    fn to_domain(self) -> AuthUser {
        AuthUser {
            uid: self.uid,
            email: self.email,
            display_name: self.display_name,
            photo_url: self.photo_url,
        }
    }
}

fn provider_error(e: sqlx::Error) -> AuthError {
    error!("Identity store error: {:?}", e);
    AuthError::Provider(e.to_string())
}

#[async_trait]
impl IdentityProvider for PgIdentity {
    async fn sign_in_with_popup(&self) -> Result<AuthUser, AuthError> {
        // Federated sign-in needs a browser popup; this backend only serves credentials.
        Err(AuthError::OperationNotAllowed)
    }

    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        validate_new_credentials(email, password)?;

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                error!("Failed to hash password: {:?}", e);
                AuthError::Provider("Failed to hash password".to_string())
            })?
            .to_string();

        let uid = Uuid::new_v4().simple().to_string();
        let record = sqlx::query_as::<_, AccountRecord>(
            "INSERT INTO accounts (uid, email, password_hash) VALUES ($1, $2, $3) \
             RETURNING uid, email, password_hash, display_name, photo_url",
        )
        .bind(&uid)
        .bind(email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AuthError::EmailAlreadyInUse;
                }
            }
            provider_error(e)
        })?;

        let user = record.to_domain();
        info!(uid = %user.uid, "Created credential account");
        self.publish(&user);
        Ok(user)
    }

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        if !is_well_formed_email(email) {
            return Err(AuthError::InvalidEmail);
        }

        let record = sqlx::query_as::<_, AccountRecord>(
            "SELECT uid, email, password_hash, display_name, photo_url \
             FROM accounts WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(provider_error)?
        .ok_or(AuthError::InvalidCredential)?;

        let stored = record
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredential)?;
        let parsed_hash = PasswordHash::new(stored).map_err(|e| {
            error!("Failed to parse password hash: {:?}", e);
            AuthError::Provider("Authentication error".to_string())
        })?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredential)?;

        let user = record.to_domain();
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
