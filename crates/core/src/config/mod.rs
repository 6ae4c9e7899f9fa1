use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    notation::ContinuationPolicy,
    pattern::{self, Track},
    playback::DEFAULT_TEMPO_DEBOUNCE,
    render::Detection,
    store::PatternState,
    timing::{self, Resolution},
    Result,
};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    /// Parses a JSON document. Missing sections and fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Initial editing state and timing behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub bpm: f32,
    pub resolution: Resolution,
    pub tracks: Vec<Track>,
    pub tempo_debounce_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bpm: timing::DEFAULT_BPM,
            resolution: Resolution::default(),
            tracks: pattern::default_tracks(),
            tempo_debounce_ms: DEFAULT_TEMPO_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl SessionConfig {
    pub fn tempo_debounce(&self) -> Duration {
        Duration::from_millis(self.tempo_debounce_ms)
    }

    /// An empty pattern for the configured tracks and resolution. The store
    /// normalizes it on construction.
    pub fn initial_state(&self) -> PatternState {
        PatternState {
            tracks: self.tracks.clone(),
            resolution: self.resolution,
            pattern: Default::default(),
            bpm: self.bpm,
            current_step: None,
        }
    }
}

/// Configuration specific to notation rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub detection: Detection,
    pub continuations: ContinuationPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PatternStore;

    #[test]
    fn empty_document_gives_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.session.tempo_debounce(), Duration::from_millis(120));
        assert_eq!(config.render.detection, Detection::Revision);
        assert_eq!(config.render.continuations, ContinuationPolicy::Hide);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = AppConfig::from_json_str(
            r#"{
                "session": {
                    "bpm": 90,
                    "resolution": { "bars": 2 },
                    "tracks": [{ "id": "cp", "label": "Clap" }]
                },
                "render": { "detection": "signature", "continuations": "show" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.session.bpm, 90.0);
        assert_eq!(config.session.resolution.steps(), 32);
        assert_eq!(config.session.tracks[0].id, "cp");
        assert_eq!(config.session.tempo_debounce_ms, 120);
        assert_eq!(config.render.detection, Detection::Signature);
        assert_eq!(config.render.continuations, ContinuationPolicy::Show);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = AppConfig::from_json_str(r#"{ "session": { "bpm": "fast" } }"#).unwrap_err();
        assert!(format!("{err}").starts_with("invalid JSON"));
    }

    #[test]
    fn initial_state_is_normalized_by_the_store() {
        let config = SessionConfig {
            bpm: 999.0,
            resolution: Resolution {
                bars: 0,
                beats_per_bar: 3,
                steps_per_beat: 4,
            },
            ..SessionConfig::default()
        };
        let store = PatternStore::with_state(config.initial_state());
        assert_eq!(store.bpm(), 240.0);
        assert_eq!(store.steps(), 12);
        assert_eq!(store.state().pattern["bd"].len(), 12);
    }
}
