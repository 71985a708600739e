//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `lookup`: catalog reads through the cache, and explicit preserve
//! - `listening`: users, play-history sync and scrobble import
//! - `settings`: config file inspection and creation

mod listening;
mod lookup;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db;
use crate::lastfm::ScrobbleResolver;
use crate::model::AlbumType;
use crate::preserve::Preserver;
use crate::provider::{FallbackProvider, LocalProvider, ResourceProvider};
use crate::remote::{CatalogClient, Credentials};

pub use listening::{cmd_import_lastfm, cmd_sync, cmd_user};
pub use lookup::{
    cmd_album, cmd_artist, cmd_discography, cmd_preserve, cmd_search, cmd_track, cmd_tracklist,
};
pub use settings::cmd_config;

/// Music Mirror CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path (default: music_mirror.db, or the config file's setting)
    #[arg(long, global = true, env = "MUSIC_MIRROR_DB")]
    pub db: Option<PathBuf>,

    /// Config file (default: the OS config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog API client id (or set MUSIC_MIRROR_CLIENT_ID env var)
    #[arg(long, global = true, env = "MUSIC_MIRROR_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Catalog API client secret (or set MUSIC_MIRROR_CLIENT_SECRET env var)
    #[arg(long, global = true, env = "MUSIC_MIRROR_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Answer from the local cache only
    #[arg(long, global = true)]
    pub offline: bool,

    /// Do not store remote results locally
    #[arg(long, global = true)]
    pub no_write_through: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Entity kinds addressable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    Track,
    Album,
    Artist,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Look up tracks by id
    Track {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Look up albums by id
    Album {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Include each album's tracklist
        #[arg(long)]
        tracks: bool,
    },
    /// Look up an artist by id
    Artist {
        id: String,
        /// Discography depth: 0 none, 1 albums, 2 albums with tracklists
        #[arg(long, default_value_t = 0)]
        fill: u8,
        /// Album types for the discography (album, single, compilation)
        #[arg(long, value_delimiter = ',')]
        types: Vec<AlbumType>,
    },
    /// Best match for a free-text query
    Search {
        #[arg(value_enum)]
        kind: Kind,
        query: String,
    },
    /// List an album's tracks
    Tracklist { album_id: String },
    /// List an artist's albums
    Discography {
        artist_id: String,
        /// Album types to include (album, single, compilation)
        #[arg(long, value_delimiter = ',')]
        types: Vec<AlbumType>,
    },
    /// Fetch an entity from the catalog and store it locally
    Preserve {
        #[arg(value_enum)]
        kind: Kind,
        id: String,
        /// Store only the entity and its direct references, not tracklists
        /// or discographies
        #[arg(long)]
        no_recurse: bool,
        /// Album types of the discography when preserving an artist
        #[arg(long, value_delimiter = ',')]
        types: Vec<AlbumType>,
    },
    /// Sync the play history of all linked users
    Sync {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Manage local users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Import a user's full Last.fm scrobble history as plays
    ImportLastfm {
        /// Local user to import into
        user: String,
        /// Last.fm account name (default: same as the local user)
        #[arg(long)]
        lastfm_user: Option<String>,
        /// Last.fm API key (or set LASTFM_API_KEY env var)
        #[arg(long, env = "LASTFM_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create a user
    Add { username: String },
    /// Link a user's remote account with a refresh token
    Link {
        username: String,
        /// Refresh token from the authorization-code flow
        refresh_token: String,
    },
    /// List users and their sync state
    List,
    /// Show a user's most recent plays
    Plays {
        username: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Print the effective configuration
    Show,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Config { command } = &cli.command {
        return cmd_config(cli.config.as_deref(), command);
    }

    let rt = Runtime::new()?;
    let ctx = rt.block_on(Context::open(&cli))?;

    match cli.command {
        Commands::Track { ids } => cmd_track(&rt, &ctx, &ids),
        Commands::Album { ids, tracks } => cmd_album(&rt, &ctx, &ids, tracks),
        Commands::Artist { id, fill, types } => cmd_artist(&rt, &ctx, &id, fill.into(), &types),
        Commands::Search { kind, query } => cmd_search(&rt, &ctx, kind, &query),
        Commands::Tracklist { album_id } => cmd_tracklist(&rt, &ctx, &album_id),
        Commands::Discography { artist_id, types } => {
            cmd_discography(&rt, &ctx, &artist_id, &types)
        }
        Commands::Preserve {
            kind,
            id,
            no_recurse,
            types,
        } => cmd_preserve(&rt, &ctx, kind, &id, !no_recurse, &types),
        Commands::Sync { once } => cmd_sync(&rt, &ctx, once),
        Commands::User { command } => cmd_user(&rt, &ctx, command),
        Commands::ImportLastfm {
            user,
            lastfm_user,
            api_key,
        } => cmd_import_lastfm(&rt, &ctx, &user, lastfm_user.as_deref(), api_key),
        Commands::Config { .. } => Ok(()),
    }
}

// ============================================================================
// Shared command context
// ============================================================================

/// Configuration and store handle shared by all commands.
pub struct Context {
    pub config: Config,
    pub pool: SqlitePool,
    pub offline: bool,
}

impl Context {
    async fn open(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => config::load_from(path),
            None => config::load(),
        };

        // Command line and environment win over the file
        if cli.client_id.is_some() {
            config.credentials.client_id = cli.client_id.clone();
        }
        if cli.client_secret.is_some() {
            config.credentials.client_secret = cli.client_secret.clone();
        }
        if cli.db.is_some() {
            config.database.path = cli.db.clone();
        }
        if cli.no_write_through {
            config.cache.write_through = false;
        }

        let db_url = db::db_url(config.database.path.as_deref());
        let pool = db::init_db(&db_url)
            .await
            .with_context(|| format!("Failed to open database {}", db_url))?;
        tracing::debug!(%db_url, "Database ready");

        Ok(Self {
            config,
            pool,
            offline: cli.offline,
        })
    }

    /// Client id and secret, or an error explaining how to provide them.
    pub fn client_credentials(&self) -> anyhow::Result<(String, String)> {
        let creds = &self.config.credentials;
        match (creds.client_id.as_deref(), creds.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Ok((id.to_string(), secret.to_string()))
            }
            _ => anyhow::bail!(
                "Catalog API credentials required.\n\
                 Use --client-id/--client-secret, set MUSIC_MIRROR_CLIENT_ID and \
                 MUSIC_MIRROR_CLIENT_SECRET, or add them to the config file.\n\
                 Pass --offline to read only the local cache."
            ),
        }
    }

    /// App-level catalog client.
    pub fn catalog_client(&self) -> anyhow::Result<CatalogClient> {
        let (client_id, client_secret) = self.client_credentials()?;
        let client = CatalogClient::new(
            Credentials::ClientCredentials {
                client_id,
                client_secret,
            },
            &self.config.remote,
        )?;
        Ok(client)
    }

    /// Preserver, downloading images when configured to.
    pub fn preserver(&self) -> anyhow::Result<Preserver> {
        let preserver = Preserver::new(self.pool.clone());
        if self.config.cache.download_images && !self.offline {
            return Ok(preserver.with_image_fetcher(Arc::new(self.catalog_client()?)));
        }
        Ok(preserver)
    }

    /// The cache alone when offline, otherwise cache with remote fallback.
    pub fn provider(&self) -> anyhow::Result<Box<dyn ResourceProvider>> {
        let local = LocalProvider::new(self.pool.clone());
        if self.offline {
            return Ok(Box::new(local));
        }
        Ok(Box::new(FallbackProvider::new(
            local,
            self.catalog_client()?,
            self.preserver()?,
            self.config.cache.write_through,
        )))
    }

    /// Scrobble resolution: exact cache hits, then the remote search unless
    /// offline.
    pub fn scrobble_resolver(&self) -> anyhow::Result<Box<dyn ScrobbleResolver>> {
        let local = LocalProvider::new(self.pool.clone());
        if self.offline {
            return Ok(Box::new(local));
        }
        Ok(Box::new(FallbackProvider::new(
            local,
            self.catalog_client()?,
            self.preserver()?,
            self.config.cache.write_through,
        )))
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
