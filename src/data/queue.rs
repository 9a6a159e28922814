use std::collections::{HashSet, VecDeque};
use rand::seq::SliceRandom;
use log::trace;

use super::track::Track;

/// Ordered, duplicate-suppressing collection of tracks
///
/// Insertion order is significant. A track whose id is already present is
/// never added a second time.
#[derive(Debug, Clone, Default)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    ids: HashSet<String>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Append a track at the tail
    ///
    /// Returns `false` (and leaves the queue untouched) if a track with the
    /// same id is already queued.
    pub fn push_back(&mut self, track: Track) -> bool {
        if !self.ids.insert(track.id.clone()) {
            trace!("Track {} already queued, not adding", track.id);
            return false;
        }
        self.items.push_back(track);
        true
    }

    /// Insert a track at the head, with the same duplicate rule as `push_back`
    pub fn push_front(&mut self, track: Track) -> bool {
        if !self.ids.insert(track.id.clone()) {
            trace!("Track {} already queued, not requeueing at front", track.id);
            return false;
        }
        self.items.push_front(track);
        true
    }

    /// Append all tracks in order, returning how many were actually added
    pub fn extend<I: IntoIterator<Item = Track>>(&mut self, tracks: I) -> usize {
        let mut added = 0;
        for track in tracks {
            if self.push_back(track) {
                added += 1;
            }
        }
        added
    }

    pub fn pop_front(&mut self) -> Option<Track> {
        let track = self.items.pop_front()?;
        self.ids.remove(&track.id);
        Some(track)
    }

    pub fn pop_back(&mut self) -> Option<Track> {
        let track = self.items.pop_back()?;
        self.ids.remove(&track.id);
        Some(track)
    }

    /// Remove the track with the given id, returning it if it was queued
    pub fn remove(&mut self, id: &str) -> Option<Track> {
        if !self.ids.remove(id) {
            return None;
        }
        let position = self.items.iter().position(|t| t.id == id)?;
        self.items.remove(position)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
    }

    /// Shuffle the current order in place (Fisher-Yates)
    pub fn shuffle(&mut self) {
        self.items.make_contiguous().shuffle(&mut rand::thread_rng());
    }

    pub fn front(&self) -> Option<&Track> {
        self.items.front()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Copy of the current order, used for index/name resolution
    pub fn snapshot(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    /// `"<name> - <artist>"` lines for the first `count` tracks
    pub fn preview(&self, count: usize) -> Vec<String> {
        self.items.iter().take(count).map(|t| t.summary_line()).collect()
    }
}

/// Previously played tracks, most recent last
#[derive(Debug, Clone, Default)]
pub struct TrackHistory {
    items: Vec<Track>,
}

impl TrackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, track: Track) {
        self.items.push(track);
    }

    pub fn pop(&mut self) -> Option<Track> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Empty the history, oldest first
    pub fn drain(&mut self) -> Vec<Track> {
        std::mem::take(&mut self.items)
    }
}
