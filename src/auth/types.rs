//! Auth configuration types

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Default Google OAuth2 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Authentication configuration
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    /// No authentication
    #[default]
    None,

    /// Bearer token authentication (GitHub, Stripe, Salesforce session)
    Bearer {
        /// The bearer token
        token: String,
    },

    /// JWT authentication (service account style)
    Jwt {
        /// Token issuer (iss claim)
        issuer: String,
        /// Token subject (sub claim, optional)
        subject: Option<String>,
        /// Token audience (aud claim)
        audience: String,
        /// RSA private key for RS256 signing (PEM)
        private_key: String,
        /// Token lifetime in seconds
        token_lifetime_seconds: u64,
        /// Additional claims, e.g. `scope`
        claims: HashMap<String, String>,
        /// Token endpoint for the two-step exchange (Google)
        token_url: Option<String>,
    },
}

impl AuthConfig {
    /// Bearer auth from an optional token; empty tokens mean no auth
    pub fn bearer(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some(t) if !t.is_empty() => AuthConfig::Bearer {
                token: t.to_string(),
            },
            _ => AuthConfig::None,
        }
    }

    /// JWT auth for a Google service account, exchanged for an access token
    pub fn service_account(key: &ServiceAccountKey, scope: &str) -> Self {
        let token_url = key
            .token_uri
            .clone()
            .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string());

        let mut claims = HashMap::new();
        claims.insert("scope".to_string(), scope.to_string());

        AuthConfig::Jwt {
            issuer: key.client_email.clone(),
            subject: None,
            audience: token_url.clone(),
            private_key: key.private_key.clone(),
            token_lifetime_seconds: 3600,
            claims,
            token_url: Some(token_url),
        }
    }

    /// Whether requests carry no credentials
    pub fn is_none(&self) -> bool {
        matches!(self, AuthConfig::None)
    }
}

/// The fields of a service account JSON key that the JWT flow needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    /// Read a key file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::auth(format!(
                "Failed to read service account key '{}': {e}",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        let expires_at = Utc::now() + chrono::Duration::seconds(seconds);
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Check if the token is expired (with 30 second buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = chrono::Duration::seconds(30);
                Utc::now() + buffer >= expires_at
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod type_tests {
    use super::*;

    #[test]
    fn test_cached_token_expiry() {
        assert!(!CachedToken::expires_in("t".to_string(), 3600).is_expired());
        assert!(CachedToken::expires_in("t".to_string(), -100).is_expired());
        assert!(!CachedToken::new("t".to_string(), None).is_expired());
    }

    #[test]
    fn test_bearer_from_optional_token() {
        assert!(AuthConfig::bearer(None).is_none());
        assert!(AuthConfig::bearer(Some("  ")).is_none());
        assert!(matches!(
            AuthConfig::bearer(Some("ghp_abc")),
            AuthConfig::Bearer { token } if token == "ghp_abc"
        ));
    }

    #[test]
    fn test_service_account_defaults_token_url() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email": "loader@proj.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .unwrap();

        match AuthConfig::service_account(&key, "https://www.googleapis.com/auth/bigquery") {
            AuthConfig::Jwt {
                issuer,
                audience,
                token_url,
                claims,
                ..
            } => {
                assert_eq!(issuer, "loader@proj.iam.gserviceaccount.com");
                assert_eq!(audience, GOOGLE_TOKEN_URL);
                assert_eq!(token_url.as_deref(), Some(GOOGLE_TOKEN_URL));
                assert_eq!(
                    claims.get("scope").map(String::as_str),
                    Some("https://www.googleapis.com/auth/bigquery")
                );
            }
            other => panic!("Expected Jwt auth, got {other:?}"),
        }
    }
}
