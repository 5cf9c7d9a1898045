//! Session controller tying identity changes to the task feed.

use super::{AuthResult, IdentityProvider, Session};
use crate::feed::TaskFeed;
use log::warn;
use std::sync::Arc;

/// Routes sign-in/out through the provider and rebinds the feed.
///
/// # Invariants
/// - After a successful sign-in the feed listens to that user only.
/// - After sign-out the feed is unbound and its views are empty.
pub struct SessionController {
    provider: Arc<dyn IdentityProvider>,
    feed: Arc<TaskFeed>,
}

impl SessionController {
    pub fn new(provider: Arc<dyn IdentityProvider>, feed: Arc<TaskFeed>) -> Self {
        Self { provider, feed }
    }

    /// Binds the feed to an already-active provider session, if any.
    pub fn restore(&self) -> Option<Session> {
        let session = self.provider.current_session();
        self.bind(session.as_ref());
        session
    }

    pub fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let session = self.provider.sign_in_with_password(email, password)?;
        self.bind(Some(&session));
        Ok(session)
    }

    pub fn sign_in_federated(&self, provider_id: &str, subject: &str) -> AuthResult<Session> {
        let session = self.provider.sign_in_federated(provider_id, subject)?;
        self.bind(Some(&session));
        Ok(session)
    }

    pub fn sign_up(&self, email: &str, password: &str) -> AuthResult<Session> {
        let session = self.provider.sign_up(email, password)?;
        self.bind(Some(&session));
        Ok(session)
    }

    /// Signs out and clears the feed, even if the provider call fails.
    pub fn sign_out(&self) -> AuthResult<()> {
        let result = self.provider.sign_out();
        self.bind(None);
        result
    }

    fn bind(&self, session: Option<&Session>) {
        let user_id = session.map(|session| session.user_id.as_str());
        // A failed listener leaves the feed unbound; sign-in itself stands.
        if let Err(err) = self.feed.bind_user(user_id) {
            warn!("event=session_bind module=auth status=error error={err}");
        }
    }
}
