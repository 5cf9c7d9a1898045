//! In-process identity provider over the local database.
//!
//! # Responsibility
//! - Register and authenticate email/password accounts.
//! - Map federated `(provider, subject)` pairs to stable local users.
//!
//! # Invariants
//! - Passwords are only persisted as Argon2 PHC strings.
//! - Failures carry the same `ERROR_*` codes a hosted provider returns.

use super::{AuthError, AuthErrorCode, AuthResult, IdentityProvider, Session};
use crate::db::{open_db_in_memory, DbError};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

const MIN_PASSWORD_CHARS: usize = 6;
const MAX_FAILED_ATTEMPTS: u32 = 5;
/// Failures older than this no longer count toward the lockout.
pub const LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

type Clock = Box<dyn Fn() -> Instant + Send + Sync>;

/// Failed sign-ins for one email within the current window.
struct FailedAttempts {
    count: u32,
    first_failure: Instant,
}

struct ProviderState {
    session: Option<Session>,
    failed_attempts: HashMap<String, FailedAttempts>,
}

/// Identity provider backed by the `users` table.
///
/// Five wrong passwords within `LOCKOUT_WINDOW` block the email until the
/// window that started with the first failure has passed.
pub struct LocalIdentityProvider {
    conn: Mutex<Connection>,
    state: Mutex<ProviderState>,
    clock: Clock,
}

impl LocalIdentityProvider {
    /// Wraps an already-migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            state: Mutex::new(ProviderState {
                session: None,
                failed_attempts: HashMap::new(),
            }),
            clock: Box::new(Instant::now),
        }
    }

    /// Replaces the time source used for lockout bookkeeping.
    pub fn with_clock(mut self, clock: impl Fn() -> Instant + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Enables or disables an account; returns whether it existed.
    pub fn set_disabled(&self, email: &str, disabled: bool) -> AuthResult<bool> {
        let changed = self
            .conn()
            .execute(
                "UPDATE users SET disabled = ?1 WHERE email = ?2;",
                params![disabled, normalize_email(email)],
            )
            .map_err(storage_error)?;
        Ok(changed > 0)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_session(&self, session: Session) -> Session {
        self.state().session = Some(session.clone());
        info!("event=auth_sign_in module=auth status=ok");
        session
    }

    /// Returns whether `email` is locked out, forgetting expired windows.
    fn is_locked_out(&self, email: &str) -> bool {
        let now = (self.clock)();
        let mut state = self.state();
        state.failed_attempts.retain(|_, attempts| {
            now.saturating_duration_since(attempts.first_failure) < LOCKOUT_WINDOW
        });
        state
            .failed_attempts
            .get(email)
            .is_some_and(|attempts| attempts.count >= MAX_FAILED_ATTEMPTS)
    }

    fn record_failure(&self, email: &str) {
        let now = (self.clock)();
        self.state()
            .failed_attempts
            .entry(email.to_string())
            .or_insert(FailedAttempts {
                count: 0,
                first_failure: now,
            })
            .count += 1;
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let email = normalize_email(email);
        validate_email(&email)?;

        if self.is_locked_out(&email) {
            warn!("event=auth_sign_in module=auth status=error error_code=too_many_requests");
            return Err(AuthError::new(
                AuthErrorCode::TooManyRequests,
                "Access temporarily blocked after repeated failures.",
            ));
        }

        let row = self
            .conn()
            .query_row(
                "SELECT uid, password_hash, disabled FROM users WHERE email = ?1;",
                [email.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(storage_error)?;

        let Some((uid, password_hash, disabled)) = row else {
            return Err(AuthError::new(
                AuthErrorCode::UserNotFound,
                "There is no user record corresponding to this identifier.",
            ));
        };
        if disabled {
            return Err(AuthError::new(
                AuthErrorCode::UserDisabled,
                "The user account has been disabled.",
            ));
        }

        let verified = match password_hash {
            Some(hash) => verify_password(password, &hash)?,
            None => false,
        };
        if !verified {
            self.record_failure(&email);
            warn!("event=auth_sign_in module=auth status=error error_code=wrong_password");
            return Err(AuthError::new(
                AuthErrorCode::WrongPassword,
                "The password is invalid.",
            ));
        }

        self.state().failed_attempts.remove(&email);
        Ok(self.start_session(Session {
            user_id: uid,
            email: Some(email),
        }))
    }

    fn sign_in_federated(&self, provider_id: &str, subject: &str) -> AuthResult<Session> {
        let provider_id = provider_id.trim();
        let subject = subject.trim();
        if provider_id.is_empty() || subject.is_empty() {
            return Err(AuthError::from_provider(
                "ERROR_INVALID_CREDENTIAL",
                "Federated credential is missing provider or subject.",
            ));
        }
        let federated_key = format!("{provider_id}:{subject}");

        let conn = self.conn();
        let existing = conn
            .query_row(
                "SELECT uid, disabled FROM users WHERE federated_key = ?1;",
                [federated_key.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()
            .map_err(storage_error)?;

        let uid = match existing {
            Some((_, true)) => {
                return Err(AuthError::new(
                    AuthErrorCode::UserDisabled,
                    "The user account has been disabled.",
                ));
            }
            Some((uid, false)) => uid,
            None => {
                let uid = Uuid::new_v4().simple().to_string();
                conn.execute(
                    "INSERT INTO users (uid, federated_key) VALUES (?1, ?2);",
                    params![uid, federated_key],
                )
                .map_err(storage_error)?;
                uid
            }
        };
        drop(conn);

        Ok(self.start_session(Session {
            user_id: uid,
            email: None,
        }))
    }

    fn sign_up(&self, email: &str, password: &str) -> AuthResult<Session> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::new(
                AuthErrorCode::WeakPassword,
                "Password should be at least 6 characters.",
            ));
        }

        let password_hash = hash_password(password)?;
        let uid = Uuid::new_v4().simple().to_string();
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO users (uid, email, password_hash) VALUES (?1, ?2, ?3);",
                params![uid, email, password_hash],
            )
            .map_err(storage_error)?;
        if inserted == 0 {
            return Err(AuthError::new(
                AuthErrorCode::EmailAlreadyInUse,
                "The email address is already in use by another account.",
            ));
        }

        Ok(self.start_session(Session {
            user_id: uid,
            email: Some(email),
        }))
    }

    fn sign_out(&self) -> AuthResult<()> {
        self.state().session = None;
        info!("event=auth_sign_out module=auth status=ok");
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.state().session.clone()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> AuthResult<()> {
    if EMAIL_RE.is_match(email) {
        return Ok(());
    }
    Err(AuthError::new(
        AuthErrorCode::InvalidEmail,
        "The email address is badly formatted.",
    ))
}

fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes()).map_err(hash_error)?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(hash_error)
}

fn verify_password(password: &str, stored: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(hash_error)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn hash_error(err: argon2::password_hash::Error) -> AuthError {
    AuthError::from_provider("ERROR_INTERNAL", format!("credential hashing failed: {err}"))
}

fn storage_error(err: rusqlite::Error) -> AuthError {
    AuthError::from_provider("ERROR_INTERNAL", format!("identity storage failed: {err}"))
}
