//! Access tokens for the catalog API.
//!
//! Catalog lookups use the client-credentials grant; per-user endpoints
//! (recently played) need a token obtained from the user's refresh token.
//! Tokens are cached in memory and refreshed shortly before they expire.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use super::{RemoteError, dto};

/// Refresh this long before the advertised expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// How the client authenticates against the accounts service.
#[derive(Clone)]
pub enum Credentials {
    /// App-only access; enough for catalog lookups.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    /// Access on behalf of a user who linked their account.
    AuthorizationCode {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

impl Credentials {
    fn client(&self) -> (&str, &str) {
        match self {
            Credentials::ClientCredentials {
                client_id,
                client_secret,
            }
            | Credentials::AuthorizationCode {
                client_id,
                client_secret,
                ..
            } => (client_id, client_secret),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Credentials::ClientCredentials { .. } => "ClientCredentials",
            Credentials::AuthorizationCode { .. } => "AuthorizationCode",
        };
        f.debug_struct(kind)
            .field("client_id", &self.client().0)
            .finish_non_exhaustive()
    }
}

/// An access token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    /// Latest refresh token, if the grant uses one
    pub refresh_token: Option<String>,
}

impl Token {
    /// Usable at `now`, with the refresh margin applied.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(EXPIRY_MARGIN_SECS) > now
    }

    fn from_response(
        response: dto::TokenResponse,
        now: DateTime<Utc>,
        previous_refresh: Option<&str>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            expires_at: now + ChronoDuration::seconds(response.expires_in as i64),
            refresh_token: response
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_owned)),
        }
    }
}

/// Hands out access tokens, requesting new ones when needed.
pub struct TokenSource {
    http: reqwest::Client,
    token_url: String,
    credentials: Credentials,
    state: Mutex<Option<Token>>,
}

impl TokenSource {
    pub fn new(http: reqwest::Client, accounts_url: &str, credentials: Credentials) -> Self {
        Self {
            http,
            token_url: format!("{}/api/token", accounts_url.trim_end_matches('/')),
            credentials,
            state: Mutex::new(None),
        }
    }

    /// Start from a previously stored token.
    pub fn seed(&self, token: Token) {
        *self.state.lock() = Some(token);
    }

    /// Current token state, for persisting rotated credentials.
    pub fn snapshot(&self) -> Option<Token> {
        self.state.lock().clone()
    }

    /// Drop the cached token so the next call requests a new one.
    pub fn invalidate(&self) {
        if let Some(token) = self.state.lock().as_mut() {
            token.expires_at = DateTime::UNIX_EPOCH;
        }
    }

    /// A valid access token, refreshed if necessary.
    pub async fn access_token(&self) -> Result<String, RemoteError> {
        let now = Utc::now();
        let previous_refresh = {
            let state = self.state.lock();
            if let Some(token) = state.as_ref().filter(|t| t.is_fresh(now)) {
                return Ok(token.access_token.clone());
            }
            state.as_ref().and_then(|t| t.refresh_token.clone())
        };

        let token = self.request(previous_refresh).await?;
        let access = token.access_token.clone();
        *self.state.lock() = Some(token);
        Ok(access)
    }

    async fn request(&self, previous_refresh: Option<String>) -> Result<Token, RemoteError> {
        let (client_id, client_secret) = self.credentials.client();
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(RemoteError::MissingCredentials);
        }

        let form: Vec<(&str, &str)> = match &self.credentials {
            Credentials::ClientCredentials { .. } => vec![("grant_type", "client_credentials")],
            Credentials::AuthorizationCode { refresh_token, .. } => vec![
                ("grant_type", "refresh_token"),
                (
                    "refresh_token",
                    previous_refresh.as_deref().unwrap_or(refresh_token),
                ),
            ],
        };

        tracing::debug!(target: "remote", "Requesting access token");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if let Ok(err) = response.json::<dto::AuthErrorDto>().await {
                return Err(RemoteError::Auth(
                    err.error_description.unwrap_or(err.error),
                ));
            }
            return Err(RemoteError::Auth(format!("HTTP {}", status)));
        }

        let body: dto::TokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        let fallback_refresh = match &self.credentials {
            Credentials::AuthorizationCode { refresh_token, .. } => {
                Some(previous_refresh.unwrap_or_else(|| refresh_token.clone()))
            }
            Credentials::ClientCredentials { .. } => None,
        };
        Ok(Token::from_response(
            body,
            Utc::now(),
            fallback_refresh.as_deref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: DateTime<Utc>) -> Token {
        Token {
            access_token: "abc".into(),
            expires_at,
            refresh_token: None,
        }
    }

    #[test]
    fn test_freshness_margin() {
        let now = Utc::now();
        assert!(token(now + ChronoDuration::seconds(3600)).is_fresh(now));
        assert!(!token(now + ChronoDuration::seconds(30)).is_fresh(now));
        assert!(!token(now - ChronoDuration::seconds(1)).is_fresh(now));
    }

    #[test]
    fn test_rotated_refresh_token_wins() {
        let now = Utc::now();
        let response = dto::TokenResponse {
            access_token: "new".into(),
            token_type: Some("Bearer".into()),
            expires_in: 3600,
            refresh_token: Some("rotated".into()),
        };
        let t = Token::from_response(response, now, Some("old"));
        assert_eq!(t.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(t.expires_at, now + ChronoDuration::seconds(3600));

        let response = dto::TokenResponse {
            access_token: "new".into(),
            token_type: None,
            expires_in: 3600,
            refresh_token: None,
        };
        let t = Token::from_response(response, now, Some("old"));
        assert_eq!(t.refresh_token.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_seeded_token_is_reused() {
        let source = TokenSource::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Credentials::ClientCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
        );
        source.seed(token(Utc::now() + ChronoDuration::seconds(3600)));
        assert_eq!(source.access_token().await.unwrap(), "abc");

        source.invalidate();
        assert!(!source.snapshot().unwrap().is_fresh(Utc::now()));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let source = TokenSource::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Credentials::ClientCredentials {
                client_id: String::new(),
                client_secret: String::new(),
            },
        );
        let err = source.access_token().await.unwrap_err();
        assert!(matches!(err, RemoteError::MissingCredentials));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::AuthorizationCode {
            client_id: "id".into(),
            client_secret: "hunter2".into(),
            refresh_token: "refresh".into(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("id"));
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("refresh"));
    }
}
