// Player context module
// Holds the playlist cursor, playback flag and settings for one player instance.
// State changes are announced as typed events over a channel instead of a
// string-keyed bus; the receiver is handed out once, at construction.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::CoverExtractor;
use crate::manifest::{CoverSource, Manifest, Track};

/// Everything a player can announce.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackChanged { index: usize },
    PlaybackToggled { playing: bool },
    VolumeChanged { volume: f32 },
    /// The track's placeholder cover was replaced by embedded art.
    CoverResolved { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSettings {
    /// 0.0 to 1.0
    pub music_volume: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self { music_volume: 0.7 }
    }
}

pub struct PlayerContext {
    tracks: Vec<Track>,
    index: usize,
    playing: bool,
    settings: PlayerSettings,
    extractor: CoverExtractor,
    // None after shutdown
    events: Option<mpsc::UnboundedSender<PlayerEvent>>,
}

impl PlayerContext {
    pub fn new(
        manifest: Manifest,
        settings: PlayerSettings,
        extractor: CoverExtractor,
    ) -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Self {
            tracks: manifest.into_tracks(),
            index: 0,
            playing: false,
            settings: PlayerSettings {
                music_volume: settings.music_volume.clamp(0.0, 1.0),
            },
            extractor,
            events: Some(tx),
        };
        (ctx, rx)
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(tx) = &self.events {
            // a dropped receiver just means nobody is listening
            let _ = tx.send(event);
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.index)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn settings(&self) -> PlayerSettings {
        self.settings
    }

    /// Select a track; the index wraps around the playlist.
    pub fn load_track(&mut self, index: usize) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }
        self.index = index % self.tracks.len();
        self.emit(PlayerEvent::TrackChanged { index: self.index });
        self.tracks.get(self.index)
    }

    pub fn next_track(&mut self) -> Option<&Track> {
        self.load_track(self.index + 1)
    }

    pub fn prev_track(&mut self) -> Option<&Track> {
        let len = self.tracks.len().max(1);
        self.load_track(self.index + len - 1)
    }

    pub fn toggle_play(&mut self) -> bool {
        if self.tracks.is_empty() {
            return false;
        }
        self.playing = !self.playing;
        self.emit(PlayerEvent::PlaybackToggled { playing: self.playing });
        self.playing
    }

    /// Clamp to 0.0..=1.0. Non-finite values are ignored.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        if volume.is_finite() {
            self.settings.music_volume = volume.clamp(0.0, 1.0);
            self.emit(PlayerEvent::VolumeChanged {
                volume: self.settings.music_volume,
            });
        }
        self.settings.music_volume
    }

    fn apply_cover(&mut self, index: usize, cover: crate::formats::ExtractedCover) {
        if let Some(track) = self.tracks.get_mut(index) {
            track.cover = CoverSource::Embedded(Arc::new(cover));
            self.emit(PlayerEvent::CoverResolved { index });
        }
    }

    /// Replace a placeholder cover with the track's embedded art, if it has any.
    /// Returns whether the cover changed.
    pub async fn resolve_cover(&mut self, index: usize) -> bool {
        let Some(track) = self.tracks.get(index) else {
            return false;
        };
        if !track.cover.is_placeholder() {
            return false;
        }
        let src = track.src.clone();
        match self.extractor.extract_cover(&src).await {
            Some(cover) => {
                self.apply_cover(index, cover);
                true
            }
            None => false,
        }
    }

    pub async fn resolve_current_cover(&mut self) -> bool {
        self.resolve_cover(self.index).await
    }

    /// Resolve every placeholder cover concurrently. Returns how many changed.
    pub async fn resolve_all_covers(&mut self) -> usize {
        let pending: Vec<(usize, String)> = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.cover.is_placeholder())
            .map(|(i, t)| (i, t.src.clone()))
            .collect();
        let sources: Vec<&str> = pending.iter().map(|(_, src)| src.as_str()).collect();
        let covers = self.extractor.extract_many(&sources).await;

        let mut resolved = 0;
        for ((index, _), cover) in pending.iter().zip(covers) {
            if let Some(cover) = cover {
                self.apply_cover(*index, cover);
                resolved += 1;
            }
        }
        resolved
    }

    /// Close the event channel. Receivers see `None` once drained.
    pub fn shutdown(&mut self) {
        self.playing = false;
        self.events = None;
    }
}
