use crate::commands::CommandError;
use crate::data::Track;
use crate::helpers::catalog::{Catalog, CatalogTrack, PlaylistInfo};
use crate::players::session::SessionHandle;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

/// Playlist entries requested per catalog call
pub const PAGE_SIZE: usize = 50;

/// Pages fetched concurrently; results are still queued in page order
const CONCURRENT_PAGES: usize = 4;

/// Outcome of a playlist import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub pages: usize,
    pub failed_pages: usize,
    pub added: usize,
    /// Entries already queued
    pub duplicates: usize,
    pub null_tracks: usize,
    pub unplayable_tracks: usize,
    pub local_tracks: usize,
}

impl ImportStats {
    pub fn dropped(&self) -> usize {
        self.null_tracks + self.unplayable_tracks + self.local_tracks
    }
}

/// Keep the playable entries of a page, attributed to `requester_id`
pub fn filter_page(entries: Vec<Option<CatalogTrack>>, requester_id: &str, stats: &mut ImportStats) -> Vec<Track> {
    let mut tracks = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(entry) = entry else {
            stats.null_tracks += 1;
            continue;
        };
        if !entry.is_playable {
            stats.unplayable_tracks += 1;
            continue;
        }
        if entry.is_local {
            stats.local_tracks += 1;
            continue;
        }
        tracks.push(entry.track.with_requester(requester_id));
    }
    tracks
}

/// Queue every playable entry of a playlist
///
/// Each non-empty page is queued with one bulk enqueue. A single forced
/// publish follows once all pages are in, so the summary always reflects the
/// import even if it coincidentally matches the previous snapshot.
pub async fn import_playlist(
    catalog: &dyn Catalog,
    session: &SessionHandle,
    playlist: &PlaylistInfo,
    requester_id: &str,
) -> Result<ImportStats, CommandError> {
    let total_pages = playlist.total.div_ceil(PAGE_SIZE);
    info!("Importing {} tracks of playlist '{}' in {} pages", playlist.total, playlist.name, total_pages);

    let mut stats = ImportStats { pages: total_pages, ..Default::default() };
    let mut pages = stream::iter(0..total_pages)
        .map(|page| async move {
            let result = catalog.get_playlist_page(&playlist.id, page * PAGE_SIZE, PAGE_SIZE).await;
            (page, result)
        })
        .buffered(CONCURRENT_PAGES);

    while let Some((page, result)) = pages.next().await {
        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to fetch page {} of playlist {}: {}", page, playlist.id, e);
                stats.failed_pages += 1;
                continue;
            }
        };

        let tracks = filter_page(entries, requester_id, &mut stats);
        if tracks.is_empty() {
            debug!("No tracks to add from page {}", page);
            continue;
        }
        let offered = tracks.len();
        let added = session.enqueue_bulk(tracks).await?;
        stats.added += added;
        stats.duplicates += offered - added;
    }

    session.publish(true).await?;
    info!("Playlist '{}' imported: {} added, {} dropped, {} pages failed",
        playlist.name, stats.added, stats.dropped(), stats.failed_pages);
    Ok(stats)
}
