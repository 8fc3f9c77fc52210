use async_trait::async_trait;
use thiserror::Error;

use crate::models::Identity;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Both fields must be filled in before anything is sent
    pub fn check_filled(&self) -> Result<(), AuthError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(AuthError::MissingFields);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please fill in both email and password")]
    MissingFields,
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("Password should be at least {0} characters")]
    WeakPassword(usize),
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

/// The identity provider, reduced to what the note engine needs
#[async_trait]
pub trait SessionGate: Send + Sync {
    async fn active_identity(&self) -> Result<Option<Identity>, AuthError>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    async fn sign_up(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}
