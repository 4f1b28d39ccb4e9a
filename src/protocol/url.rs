//! Connection URL construction and parsing.
//!
//! # Format
//!
//! ```text
//! wss://<host>/client/v1?sessionId=<id>&token=<pin>&orgId=<org>&clientId=<client>
//! ```
//!
//! `<host>` is the base domain, prefixed with `stage.`, `qa.` or `dev.` for
//! non-production environments.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Path of the client socket endpoint.
const CLIENT_PATH: &str = "/client/v1";

// ============================================================================
// Environment
// ============================================================================

/// Deployment environment selecting the host variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    /// Production (no host prefix).
    #[default]
    Production,
    /// Staging.
    Stage,
    /// QA.
    Qa,
    /// Development.
    Dev,
}

impl Environment {
    /// Returns the host prefix, or `None` for production.
    #[inline]
    #[must_use]
    pub const fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Production => None,
            Self::Stage => Some("stage"),
            Self::Qa => Some("qa"),
            Self::Dev => Some("dev"),
        }
    }

    /// Prepends this environment's prefix to a base domain.
    #[must_use]
    pub fn host(self, base_domain: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{prefix}.{base_domain}"),
            None => base_domain.to_string(),
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "prod" | "production" => Ok(Self::Production),
            "stage" | "staging" => Ok(Self::Stage),
            "qa" => Ok(Self::Qa),
            "dev" => Ok(Self::Dev),
            other => Err(Error::config(format!("unknown environment: {other}"))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().unwrap_or("production"))
    }
}

// ============================================================================
// ConnectionUrl
// ============================================================================

/// Fully resolved parameters of a session socket URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    /// Socket host including any environment prefix.
    pub host: String,
    /// Remote session id.
    pub session_id: String,
    /// Session token (PIN).
    pub token: String,
    /// Organization id.
    pub org_id: String,
    /// Client installation id.
    pub client_id: String,
}

impl ConnectionUrl {
    /// Renders the socket URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the host is not a valid URL host.
    pub fn to_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("wss://{}{CLIENT_PATH}", self.host))?;
        url.query_pairs_mut()
            .append_pair("sessionId", &self.session_id)
            .append_pair("token", &self.token)
            .append_pair("orgId", &self.org_id)
            .append_pair("clientId", &self.client_id);
        Ok(url)
    }

    /// Parses a previously rendered socket URL.
    ///
    /// Missing query parameters become empty strings.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the text is not a URL
    /// - [`Error::Protocol`] if it is not a client socket URL
    pub fn parse(text: &str) -> Result<Self> {
        let url = Url::parse(text)?;

        if url.path() != CLIENT_PATH {
            return Err(Error::protocol(format!("not a client socket URL: {text}")));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::protocol(format!("socket URL has no host: {text}")))?
            .to_string();

        let query = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        };

        Ok(Self {
            host,
            session_id: query("sessionId"),
            token: query("token"),
            org_id: query("orgId"),
            client_id: query("clientId"),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(host: &str) -> ConnectionUrl {
        ConnectionUrl {
            host: host.to_string(),
            session_id: "sess-1".into(),
            token: "123456".into(),
            org_id: "org-9".into(),
            client_id: "client-7".into(),
        }
    }

    #[test]
    fn test_url_shape() {
        let url = sample("inspect.example.com").to_url().expect("url");
        assert_eq!(
            url.as_str(),
            "wss://inspect.example.com/client/v1?sessionId=sess-1&token=123456&orgId=org-9&clientId=client-7"
        );
    }

    #[test]
    fn test_environment_host_prefix() {
        assert_eq!(Environment::Production.host("inspect.example.com"), "inspect.example.com");
        assert_eq!(Environment::Stage.host("inspect.example.com"), "stage.inspect.example.com");
        assert_eq!(Environment::Qa.host("inspect.example.com"), "qa.inspect.example.com");
        assert_eq!(Environment::Dev.host("inspect.example.com"), "dev.inspect.example.com");
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("STAGE".parse::<Environment>().ok(), Some(Environment::Stage));
        assert_eq!("".parse::<Environment>().ok(), Some(Environment::Production));
        assert!("moon".parse::<Environment>().is_err());
    }

    #[test]
    fn test_parse_rendered_url() {
        let original = sample("stage.inspect.example.com");
        let text = original.to_url().expect("url").to_string();
        assert_eq!(ConnectionUrl::parse(&text).expect("parse"), original);
    }

    #[test]
    fn test_parse_rejects_other_paths() {
        assert!(ConnectionUrl::parse("wss://inspect.example.com/admin?orgId=x").is_err());
        assert!(ConnectionUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_parse_missing_params_are_empty() {
        let parsed = ConnectionUrl::parse("wss://inspect.example.com/client/v1?orgId=o")
            .expect("parse");
        assert_eq!(parsed.org_id, "o");
        assert_eq!(parsed.session_id, "");
    }
}
