//! Users, play-history sync and scrobble import commands.

use anyhow::Context as _;
use serde_json::json;
use tokio::runtime::Runtime;

use super::{Context, UserCommand, print_json};
use crate::db::listening;
use crate::lastfm::{LastFmClient, import_scrobbles};
use crate::preserve::Preserver;
use crate::sync::{CatalogBroker, Synchronizer};

/// Run the synchronizer, once or until ctrl-c
pub fn cmd_sync(rt: &Runtime, ctx: &Context, once: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        if ctx.offline {
            anyhow::bail!("sync needs the remote catalog; drop --offline");
        }
        let (client_id, client_secret) = ctx.client_credentials()?;
        let broker = CatalogBroker::new(
            ctx.pool.clone(),
            client_id,
            client_secret,
            ctx.config.remote.clone(),
        );
        let preserver: Preserver = ctx.preserver()?;
        let sync = Synchronizer::new(ctx.pool.clone(), broker, ctx.config.sync.clone())
            .with_preserver(preserver);

        if once {
            let summary = sync.run_pass().await?;
            return print_json(&summary);
        }

        tokio::select! {
            _ = sync.run() => {}
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for ctrl-c")?;
                tracing::info!(target: "sync", "Shutting down");
            }
        }
        Ok(())
    })
}

pub fn cmd_user(rt: &Runtime, ctx: &Context, command: UserCommand) -> anyhow::Result<()> {
    rt.block_on(async {
        match command {
            UserCommand::Add { username } => {
                let id = listening::create_user(&ctx.pool, &username)
                    .await
                    .with_context(|| format!("Failed to create user {}", username))?;
                print_json(&json!({ "id": id, "username": username }))
            }
            UserCommand::Link {
                username,
                refresh_token,
            } => {
                let user = find_user(ctx, &username).await?;
                listening::link_user(&ctx.pool, user.id, &refresh_token).await?;
                print_json(&json!({ "id": user.id, "username": username, "linked": true }))
            }
            UserCommand::List => {
                let users: Vec<_> = listening::list_users(&ctx.pool)
                    .await?
                    .into_iter()
                    .map(|u| {
                        json!({
                            "id": u.id,
                            "username": u.username,
                            "linked": u.refresh_token.as_deref().is_some_and(|t| !t.is_empty()),
                            "last_synced_at": u.last_synced().map(|t| t.to_rfc3339()),
                        })
                    })
                    .collect();
                print_json(&users)
            }
            UserCommand::Plays { username, limit } => {
                let user = find_user(ctx, &username).await?;
                let plays: Vec<_> = listening::recent_plays(&ctx.pool, user.id, limit)
                    .await?
                    .into_iter()
                    .map(|(track_id, played_at)| {
                        json!({ "track_id": track_id, "played_at": played_at.to_rfc3339() })
                    })
                    .collect();
                print_json(&plays)
            }
        }
    })
}

/// Import a Last.fm history into a local user's plays
pub fn cmd_import_lastfm(
    rt: &Runtime,
    ctx: &Context,
    user: &str,
    lastfm_user: Option<&str>,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let Some(api_key) = api_key.or_else(|| ctx.config.credentials.lastfm_api_key.clone()) else {
            anyhow::bail!(
                "Last.fm API key required.\n\
                 Get one at: https://www.last.fm/api/account/create\n\
                 Then use: --api-key YOUR_KEY or set LASTFM_API_KEY env var"
            );
        };

        let local = find_user(ctx, user).await?;
        let lastfm_user = lastfm_user.unwrap_or(user);

        let client = LastFmClient::new(api_key, ctx.config.remote.timeout())?;
        let scrobbles = client.all_scrobbles(lastfm_user).await?;
        tracing::info!(
            target: "lastfm",
            count = scrobbles.len(),
            user = lastfm_user,
            "Fetched scrobbles"
        );

        let resolver = ctx.scrobble_resolver()?;
        let summary = import_scrobbles(resolver.as_ref(), &ctx.pool, local.id, &scrobbles).await?;
        print_json(&summary)
    })
}

async fn find_user(ctx: &Context, username: &str) -> anyhow::Result<listening::UserRow> {
    listening::get_user_by_name(&ctx.pool, username)
        .await?
        .with_context(|| format!("No such user: {} (create it with `user add`)", username))
}
