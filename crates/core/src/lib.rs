//! Core library for the Stepscore step sequencer.
//!
//! The crate holds the parts of the editor with real invariants: the pattern
//! store that owns the grid and its timing, the transcription of step arrays
//! into notated rhythm, and the render gate that decides when a transcription
//! is worth running. Audio, input handling and drawing live outside and talk to
//! the core through the traits exported here.

pub mod config;
pub mod error;
pub mod notation;
pub mod pattern;
pub mod playback;
pub mod render;
pub mod session;
pub mod store;
pub mod timing;

pub use config::{AppConfig, RenderConfig, SessionConfig};
pub use error::{Result, StepscoreError};
pub use notation::{
    transcribe_all, transcribe_track, ContinuationPolicy, DurationClass, NotationEvent, Score,
    TrackNotation,
};
pub use pattern::{PatternMap, Track};
pub use playback::{PlaybackEngine, TempoDebouncer};
pub use render::{
    ChangeDetector, Detection, FrameOutcome, FrameRequest, NotationSurface, PatternSource,
    RenderGate, RevisionDetector, RevisionSource, SignatureDetector,
};
pub use session::Session;
pub use store::{ChangeKind, PatternState, PatternStore, StatePatch, StateSnapshot, StoreEvent};
pub use timing::{Resolution, ResolutionPatch};
