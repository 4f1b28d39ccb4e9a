//! Credentials that select a remote session.

use crate::protocol::{ConnectionUrl, Environment};

/// Remote session credentials.
///
/// `session_id` and `environment` may be absent for implicit flows such as
/// QuickConnect; the session then falls back to the stored connection or
/// to production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Remote session id.
    pub session_id: Option<String>,
    /// Session token (PIN).
    pub token: String,
    /// Deployment environment.
    pub environment: Option<Environment>,
}

impl SessionIdentity {
    /// Creates an identity from a token alone.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            session_id: None,
            token: token.into(),
            environment: None,
        }
    }

    /// Sets the remote session id.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Rebuilds the identity a stored connection URL was created from.
    ///
    /// The environment is recovered by matching the URL host against every
    /// environment variant of `base_domain`.
    #[must_use]
    pub fn from_connection(url: &ConnectionUrl, base_domain: &str) -> Self {
        let environment = [
            Environment::Production,
            Environment::Stage,
            Environment::Qa,
            Environment::Dev,
        ]
        .into_iter()
        .find(|env| env.host(base_domain) == url.host);

        Self {
            session_id: Some(url.session_id.clone()).filter(|id| !id.is_empty()),
            token: url.token.clone(),
            environment,
        }
    }
}
