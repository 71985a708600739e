//! Crate-wide error types.
//!
//! Library modules return [`Error`] via `thiserror`, while the CLI in
//! `main.rs` uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error::NotFound`]: the cache-miss signal. The fallback provider only
//!   consults the remote catalog when it sees this variant.
//! - [`Error::Database`] / [`Error::Remote`]: store and transport failures,
//!   always propagated unchanged and never treated as a miss.
//!
//! # Example
//!
//! ```ignore
//! use music_mirror::error::{Error, Result};
//!
//! match local.track_by_id("4uLU6hMCjMI75M1A2tKUQC").await {
//!     Ok(track) => Ok(track),
//!     Err(e) if e.is_not_found() => remote.track_by_id(id).await,
//!     Err(e) => Err(e),
//! }
//! ```

use std::fmt;

use crate::remote::RemoteError;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of resource a lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Track,
    Album,
    Artist,
    Discography,
    Tracklist,
    User,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Track => "track",
            ResourceKind::Album => "album",
            ResourceKind::Artist => "artist",
            ResourceKind::Discography => "discography",
            ResourceKind::Tracklist => "tracklist",
            ResourceKind::User => "user",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level crate error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested resource is not available from this provider
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    /// Local store error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Remote catalog error (transport, HTTP status, rate limit, decoding)
    #[error("Remote catalog error: {0}")]
    Remote(#[from] RemoteError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error is the not-found (cache miss) signal.
    ///
    /// Context wrappers are looked through, so adding context never turns a
    /// miss into a hard failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, RemoteError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Remote(e).context(ctx))
    }
}
