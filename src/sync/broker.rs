//! Per-user access to the remote play history.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::config::RemoteConfig;
use crate::db::listening::{self, Credential, LinkedUser};
use crate::error::{Result, ResultExt};
use crate::remote::auth::Token;
use crate::remote::{CatalogClient, Credentials, PlayHistory};

/// Turns a stored credential into a usable play-history source.
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// Establish (and refresh if needed) the user's remote session.
    async fn connect(&self, user: &LinkedUser) -> Result<Box<dyn PlayHistory>>;
}

/// Broker backed by the catalog API's refresh-token grant.
///
/// Refreshed access tokens, and refresh tokens the server rotates, are
/// written back to the users table.
pub struct CatalogBroker {
    pool: SqlitePool,
    client_id: String,
    client_secret: String,
    settings: RemoteConfig,
}

impl CatalogBroker {
    pub fn new(
        pool: SqlitePool,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        settings: RemoteConfig,
    ) -> Self {
        Self {
            pool,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            settings,
        }
    }
}

#[async_trait]
impl CredentialBroker for CatalogBroker {
    async fn connect(&self, user: &LinkedUser) -> Result<Box<dyn PlayHistory>> {
        let stored = &user.credential;
        let client = CatalogClient::new(
            Credentials::AuthorizationCode {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                refresh_token: stored.refresh_token.clone(),
            },
            &self.settings,
        )?;

        if let (Some(access_token), Some(expires_at)) = (&stored.access_token, stored.expires_at) {
            client.tokens().seed(Token {
                access_token: access_token.clone(),
                expires_at,
                refresh_token: Some(stored.refresh_token.clone()),
            });
        }

        client
            .tokens()
            .access_token()
            .await
            .with_context(format!("refreshing token of {}", user.username))?;

        if let Some(token) = client.tokens().snapshot() {
            let current = Credential {
                refresh_token: token
                    .refresh_token
                    .unwrap_or_else(|| stored.refresh_token.clone()),
                access_token: Some(token.access_token),
                expires_at: Some(token.expires_at),
            };
            if current != *stored {
                listening::store_tokens(&self.pool, user.id, &current).await?;
                tracing::debug!(target: "sync", user = %user.username, "Stored refreshed token");
            }
        }

        Ok(Box::new(client))
    }
}
