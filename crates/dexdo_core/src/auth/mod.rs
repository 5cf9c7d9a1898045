//! Identity provider contracts and error mapping.
//!
//! # Responsibility
//! - Define the sign-in/sign-up/sign-out surface consumed by the app.
//! - Map provider error codes to user-facing messages.
//! - Bind session changes to the live task feed.
//!
//! # Invariants
//! - Auth errors are the only failures surfaced to users as retryable
//!   messages; unknown codes fall back to the provider's own text.

mod local;
mod session;

pub use local::{LocalIdentityProvider, LOCKOUT_WINDOW};
pub use session::SessionController;

use crate::model::task::UserId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Known provider error codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    InvalidEmail,
    WrongPassword,
    UserNotFound,
    UserDisabled,
    EmailAlreadyInUse,
    WeakPassword,
    TooManyRequests,
    NetworkRequestFailed,
    /// Any code this build does not recognise, kept verbatim.
    Other(String),
}

impl AuthErrorCode {
    /// Parses a provider code such as `ERROR_WRONG_PASSWORD`.
    ///
    /// Matching ignores case and accepts the `auth/wrong-password` style too.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw
            .trim()
            .trim_start_matches("auth/")
            .trim_start_matches("ERROR_")
            .trim_start_matches("error_")
            .replace('-', "_")
            .to_ascii_uppercase();
        match normalized.as_str() {
            "INVALID_EMAIL" => Self::InvalidEmail,
            "WRONG_PASSWORD" => Self::WrongPassword,
            "USER_NOT_FOUND" => Self::UserNotFound,
            "USER_DISABLED" => Self::UserDisabled,
            "EMAIL_ALREADY_IN_USE" => Self::EmailAlreadyInUse,
            "WEAK_PASSWORD" => Self::WeakPassword,
            "TOO_MANY_REQUESTS" => Self::TooManyRequests,
            "NETWORK_REQUEST_FAILED" => Self::NetworkRequestFailed,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    /// Canonical `ERROR_*` spelling of this code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidEmail => "ERROR_INVALID_EMAIL",
            Self::WrongPassword => "ERROR_WRONG_PASSWORD",
            Self::UserNotFound => "ERROR_USER_NOT_FOUND",
            Self::UserDisabled => "ERROR_USER_DISABLED",
            Self::EmailAlreadyInUse => "ERROR_EMAIL_ALREADY_IN_USE",
            Self::WeakPassword => "ERROR_WEAK_PASSWORD",
            Self::TooManyRequests => "ERROR_TOO_MANY_REQUESTS",
            Self::NetworkRequestFailed => "ERROR_NETWORK_REQUEST_FAILED",
            Self::Other(code) => code.as_str(),
        }
    }

    fn known_message(&self) -> Option<&'static str> {
        match self {
            Self::InvalidEmail => Some("The email address is badly formatted."),
            Self::WrongPassword => Some("Incorrect password. Please try again."),
            Self::UserNotFound => Some("No account exists for this email."),
            Self::UserDisabled => Some("This account has been disabled."),
            Self::EmailAlreadyInUse => Some("An account already exists for this email."),
            Self::WeakPassword => Some("Password must be at least 6 characters."),
            Self::TooManyRequests => Some("Too many attempts. Try again later."),
            Self::NetworkRequestFailed => Some("Network error. Check your connection."),
            Self::Other(_) => None,
        }
    }
}

/// Typed provider failure with the provider's own description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Builds an error from a raw provider code and text.
    pub fn from_provider(code: &str, message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::parse(code), message)
    }

    /// Text to show the user: fixed copy for known codes, provider text
    /// otherwise.
    pub fn user_message(&self) -> String {
        match self.code.known_message() {
            Some(message) => message.to_string(),
            None if self.message.trim().is_empty() => {
                format!("Authentication failed ({}).", self.code.as_str())
            }
            None => self.message.clone(),
        }
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;

/// Signed-in user session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    /// `None` for federated accounts without an email.
    pub email: Option<String>,
}

/// Identity provider consumed as an opaque collaborator.
pub trait IdentityProvider: Send + Sync {
    fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;
    /// Signs in with an external account identified by `(provider_id, subject)`.
    fn sign_in_federated(&self, provider_id: &str, subject: &str) -> AuthResult<Session>;
    fn sign_up(&self, email: &str, password: &str) -> AuthResult<Session>;
    fn sign_out(&self) -> AuthResult<()>;
    fn current_session(&self) -> Option<Session>;
}
