//! Track manifest
//!
//! The playlist comes from a JSON array of track entries. Only `src` is
//! required; missing (or empty) fields get their defaults once, at load time,
//! so the rest of the crate only ever sees a fully populated [`Track`].

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::formats::ExtractedCover;
use crate::transport::{Transport, TransportError};

/// Cover shown until (or unless) embedded art is found.
pub const PLACEHOLDER_COVER: &str = "assets/img/cover-placeholder.png";
pub const DEFAULT_ARTIST: &str = "Unknown";
/// Where the manifest is fetched from when the host doesn't say otherwise.
pub const DEFAULT_MANIFEST_LOCATOR: &str = "assets/music/tracks.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Manifest fetch error: {0}")]
    Transport(#[from] TransportError),
}

/// Horizontal offset applied to the cover background.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CoverShift {
    /// A bare number, in pixels.
    Pixels(f64),
    /// Any CSS length, passed through untouched.
    Css(String),
}

impl CoverShift {
    pub fn css_value(&self) -> String {
        match self {
            CoverShift::Pixels(px) => format!("{px}px"),
            CoverShift::Css(len) => len.clone(),
        }
    }
}

/// Where a track's cover image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverSource {
    Url(String),
    Embedded(Arc<ExtractedCover>),
}

impl CoverSource {
    /// Placeholder covers are the ones worth replacing with embedded art.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, CoverSource::Url(url) if url.contains("cover-placeholder"))
    }
}

/// One playlist entry with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub src: String,
    pub title: String,
    pub artist: String,
    pub cover: CoverSource,
    pub cover_shift: Option<CoverShift>,
}

/// Entry as it appears in the JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackEntry {
    src: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    cover_shift: Option<CoverShift>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TrackEntry {
    /// `position` is zero-based; default titles count from one.
    fn into_track(self, position: usize) -> Track {
        Track {
            title: non_empty(self.title).unwrap_or_else(|| format!("Track {}", position + 1)),
            artist: non_empty(self.artist).unwrap_or_else(|| DEFAULT_ARTIST.to_string()),
            cover: CoverSource::Url(
                non_empty(self.cover).unwrap_or_else(|| PLACEHOLDER_COVER.to_string()),
            ),
            cover_shift: self.cover_shift,
            src: self.src,
        }
    }
}

/// Ordered list of tracks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    tracks: Vec<Track>,
}

impl Manifest {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    /// Parse a JSON array of track entries. An empty array is a valid, empty manifest.
    pub fn from_json_str(json: &str) -> Result<Self, ManifestError> {
        let entries: Vec<TrackEntry> = serde_json::from_str(json.trim())?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_json_slice(json: &[u8]) -> Result<Self, ManifestError> {
        let entries: Vec<TrackEntry> = serde_json::from_slice(json)?;
        Ok(Self::from_entries(entries))
    }

    fn from_entries(entries: Vec<TrackEntry>) -> Self {
        let tracks = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| entry.into_track(i))
            .collect();
        Self { tracks }
    }

    /// Fetch and parse the manifest at `locator`.
    pub async fn fetch(transport: &dyn Transport, locator: &str) -> Result<Self, ManifestError> {
        let data = transport.fetch(locator).await?;
        Self::from_json_slice(&data)
    }

    /// Load the playlist the way the player does on startup: the fetched manifest
    /// first, then the inline copy embedded in the page, then nothing.
    pub async fn load(transport: &dyn Transport, locator: &str, inline: Option<&str>) -> Self {
        match Self::fetch(transport, locator).await {
            Ok(manifest) if !manifest.is_empty() => return manifest,
            Ok(_) => tracing::debug!(locator, "fetched manifest is empty"),
            Err(e) => tracing::debug!(locator, error = %e, "manifest fetch failed"),
        }

        if let Some(inline) = inline {
            match Self::from_json_str(inline) {
                Ok(manifest) if !manifest.is_empty() => return manifest,
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "inline manifest is not valid"),
            }
        }

        tracing::warn!("no tracks loaded");
        Self::default()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }
}
