//! Catalog lookup and preserve commands.

use serde_json::json;
use tokio::runtime::Runtime;

use super::{Context, Kind, print_json};
use crate::model::{AlbumType, FillLevel, ResourceRef};
use crate::provider::{ResourceProvider, fill_discography, fill_tracklist};

/// Look up one or more tracks
pub fn cmd_track(rt: &Runtime, ctx: &Context, ids: &[String]) -> anyhow::Result<()> {
    rt.block_on(async {
        let provider = ctx.provider()?;
        if let [id] = ids {
            print_json(&provider.track_by_id(id).await?)
        } else {
            print_json(&provider.several_tracks_by_id(ids).await?)
        }
    })
}

/// Look up one or more albums, optionally with tracklists
pub fn cmd_album(
    rt: &Runtime,
    ctx: &Context,
    ids: &[String],
    with_tracks: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let provider = ctx.provider()?;
        let mut albums = provider.several_albums_by_id(ids).await?;
        if with_tracks {
            for album in &mut albums {
                fill_tracklist(provider.as_ref(), album).await?;
            }
        }

        if let [album] = albums.as_slice() {
            print_json(album)
        } else {
            print_json(&albums)
        }
    })
}

pub fn cmd_artist(
    rt: &Runtime,
    ctx: &Context,
    id: &str,
    fill: FillLevel,
    types: &[AlbumType],
) -> anyhow::Result<()> {
    rt.block_on(async {
        let provider = ctx.provider()?;
        print_json(&provider.artist_by_id(id, fill, types).await?)
    })
}

/// Best match for a free-text query
pub fn cmd_search(rt: &Runtime, ctx: &Context, kind: Kind, query: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let provider = ctx.provider()?;
        match kind {
            Kind::Track => print_json(&provider.track_by_match(query).await?),
            Kind::Album => print_json(&provider.album_by_match(query).await?),
            Kind::Artist => {
                print_json(&provider.artist_by_match(query, FillLevel::Bare, &[]).await?)
            }
        }
    })
}

pub fn cmd_tracklist(rt: &Runtime, ctx: &Context, album_id: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let provider = ctx.provider()?;
        let album = provider.album_by_id(album_id).await?;
        print_json(&provider.album_tracklist(&album).await?)
    })
}

pub fn cmd_discography(
    rt: &Runtime,
    ctx: &Context,
    artist_id: &str,
    types: &[AlbumType],
) -> anyhow::Result<()> {
    rt.block_on(async {
        let provider = ctx.provider()?;
        let artist = provider.artist_by_id(artist_id, FillLevel::Bare, &[]).await?;
        print_json(&provider.artist_discography(&artist, types).await?)
    })
}

/// Fetch an entity from the catalog and preserve it
///
/// Always reads from the remote catalog so the stored rows are refreshed.
/// With `recurse`, albums are stored with their tracklists and artists with
/// their discography (including tracklists).
pub fn cmd_preserve(
    rt: &Runtime,
    ctx: &Context,
    kind: Kind,
    id: &str,
    recurse: bool,
    types: &[AlbumType],
) -> anyhow::Result<()> {
    rt.block_on(async {
        if ctx.offline {
            anyhow::bail!("preserve needs the remote catalog; drop --offline");
        }
        let client = ctx.catalog_client()?;
        let preserver = ctx.preserver()?;

        match kind {
            Kind::Track => {
                let track = client.track_by_id(id).await?;
                preserver.preserve(ResourceRef::Track(&track), recurse).await?;
            }
            Kind::Album => {
                let mut album = client.album_by_id(id).await?;
                if recurse {
                    fill_tracklist(&client, &mut album).await?;
                }
                preserver.preserve(ResourceRef::Album(&album), recurse).await?;
            }
            Kind::Artist => {
                let mut artist = client.artist_by_id(id, FillLevel::Bare, types).await?;
                if recurse {
                    fill_discography(&client, &mut artist, types, FillLevel::Tracklists).await?;
                }
                preserver.preserve(ResourceRef::Artist(&artist), recurse).await?;
                if recurse {
                    preserver.record_discography(&artist.id, types).await?;
                }
            }
        }

        tracing::info!(?kind, id, recurse, "Preserved");
        let kind = format!("{:?}", kind).to_lowercase();
        print_json(&json!({ "kind": kind, "id": id, "preserved": true }))
    })
}
