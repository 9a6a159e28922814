use crate::data::Track;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use log::{debug, info};
use thiserror::Error;

/// Errors returned by catalog lookups
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One entry of a playlist page
///
/// Playlists may contain entries the remote player cannot play; those are
/// filtered by the importer, not by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub track: Track,
    #[serde(default = "default_playable")]
    pub is_playable: bool,
    #[serde(default)]
    pub is_local: bool,
}

fn default_playable() -> bool {
    true
}

impl CatalogTrack {
    pub fn playable(track: Track) -> Self {
        Self { track, is_playable: true, is_local: false }
    }
}

/// Playlist header; the entries are fetched page by page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub tracks: Vec<Track>,
}

/// Track, album and playlist lookups against the remote catalog service
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Free-text track search returning at most `limit` results
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError>;

    async fn get_track(&self, id: &str) -> Result<Option<Track>, CatalogError>;

    async fn get_album(&self, id: &str) -> Result<Option<Album>, CatalogError>;

    async fn get_playlist(&self, id: &str) -> Result<Option<PlaylistInfo>, CatalogError>;

    /// One page of playlist entries
    ///
    /// `None` entries stand for items the service returned without track data.
    async fn get_playlist_page(
        &self,
        id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Option<CatalogTrack>>, CatalogError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredPlaylist {
    id: String,
    name: String,
    #[serde(default)]
    entries: Vec<Option<CatalogTrack>>,
}

/// On-disk layout of a [`MemoryCatalog`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tracks: Vec<Track>,
    #[serde(default)]
    albums: Vec<Album>,
    #[serde(default)]
    playlists: Vec<StoredPlaylist>,
}

/// Catalog served from memory, optionally loaded from a JSON file
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tracks: Vec<Track>,
    albums: HashMap<String, Album>,
    playlists: HashMap<String, StoredPlaylist>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&content)?;
        let mut catalog = Self::new();
        for track in file.tracks {
            catalog.add_track(track);
        }
        for album in file.albums {
            catalog.add_album(album);
        }
        for playlist in file.playlists {
            catalog.playlists.insert(playlist.id.clone(), playlist);
        }
        info!("Loaded catalog from {}: {} tracks, {} albums, {} playlists",
            path.display(), catalog.tracks.len(), catalog.albums.len(), catalog.playlists.len());
        Ok(catalog)
    }

    pub fn add_track(&mut self, track: Track) {
        if !self.tracks.contains(&track) {
            self.tracks.push(track);
        }
    }

    pub fn add_album(&mut self, album: Album) {
        self.albums.insert(album.id.clone(), album);
    }

    pub fn add_playlist(&mut self, id: &str, name: &str, entries: Vec<Option<CatalogTrack>>) {
        self.playlists.insert(id.to_string(), StoredPlaylist {
            id: id.to_string(),
            name: name.to_string(),
            entries,
        });
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError> {
        let needle = query.to_lowercase();
        let found: Vec<Track> = self.tracks.iter()
            .filter(|t| t.name.to_lowercase().contains(&needle) || t.artist.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect();
        debug!("Catalog search '{}' returned {} tracks", query, found.len());
        Ok(found)
    }

    async fn get_track(&self, id: &str) -> Result<Option<Track>, CatalogError> {
        Ok(self.tracks.iter().find(|t| t.id == id).cloned())
    }

    async fn get_album(&self, id: &str) -> Result<Option<Album>, CatalogError> {
        Ok(self.albums.get(id).cloned())
    }

    async fn get_playlist(&self, id: &str) -> Result<Option<PlaylistInfo>, CatalogError> {
        Ok(self.playlists.get(id).map(|p| PlaylistInfo {
            id: p.id.clone(),
            name: p.name.clone(),
            total: p.entries.len(),
        }))
    }

    async fn get_playlist_page(
        &self,
        id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Option<CatalogTrack>>, CatalogError> {
        let playlist = self.playlists.get(id)
            .ok_or_else(|| CatalogError::Unavailable(format!("playlist {} not found", id)))?;
        Ok(playlist.entries.iter().skip(offset).take(limit).cloned().collect())
    }
}
