use std::{cell::Cell, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    notation::{self, Score},
    pattern::{self, Track},
    timing::Resolution,
};

/// Read access to a pattern, as needed by transcription and signature checks.
pub trait PatternSource {
    fn resolution(&self) -> Resolution;
    fn tracks(&self) -> &[Track];
    fn track_steps(&self, track_id: &str) -> Option<&[bool]>;
}

/// A pattern source that also counts its content changes.
pub trait RevisionSource: PatternSource {
    fn pattern_revision(&self) -> u32;
}

/// Decides whether the source changed since the last call.
pub trait ChangeDetector<S: ?Sized> {
    /// Returns `true` when `source` differs from what was last observed and
    /// records the new observation.
    fn observe(&mut self, source: &S) -> bool;
}

/// Compares the pattern revision counter.
#[derive(Debug, Clone, Default)]
pub struct RevisionDetector {
    last_seen: Option<u32>,
}

impl<S: RevisionSource + ?Sized> ChangeDetector<S> for RevisionDetector {
    fn observe(&mut self, source: &S) -> bool {
        let revision = source.pattern_revision();
        let changed = self.last_seen != Some(revision);
        self.last_seen = Some(revision);
        changed
    }
}

/// Compares a content signature, for sources without a revision counter.
#[derive(Debug, Clone, Default)]
pub struct SignatureDetector {
    last_seen: Option<String>,
}

impl<S: PatternSource + ?Sized> ChangeDetector<S> for SignatureDetector {
    fn observe(&mut self, source: &S) -> bool {
        let signature = pattern_signature(source);
        let changed = self.last_seen.as_deref() != Some(signature.as_str());
        self.last_seen = Some(signature);
        changed
    }
}

/// Deterministic description of everything transcription depends on: the
/// resolution, the track order and the active step indices of each track.
/// Track ids are quoted so that separators inside an id cannot collide.
pub fn pattern_signature<S: PatternSource + ?Sized>(source: &S) -> String {
    let resolution = source.resolution();
    let mut signature = format!(
        "{}x{}x{}={}",
        resolution.bars,
        resolution.beats_per_bar,
        resolution.steps_per_beat,
        resolution.steps()
    );
    for track in source.tracks() {
        let steps = source.track_steps(&track.id).unwrap_or_default();
        let hits: Vec<String> = pattern::active_steps(steps)
            .map(|index| index.to_string())
            .collect();
        signature.push_str(&format!(";{:?}:{}", track.id, hits.join(",")));
    }
    signature
}

/// Which change detector a gate is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detection {
    #[default]
    Revision,
    Signature,
}

/// Detector chosen once, from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredDetector {
    Revision(RevisionDetector),
    Signature(SignatureDetector),
}

impl ConfiguredDetector {
    pub fn new(detection: Detection) -> Self {
        match detection {
            Detection::Revision => Self::Revision(RevisionDetector::default()),
            Detection::Signature => Self::Signature(SignatureDetector::default()),
        }
    }
}

impl<S: RevisionSource + ?Sized> ChangeDetector<S> for ConfiguredDetector {
    fn observe(&mut self, source: &S) -> bool {
        match self {
            Self::Revision(detector) => detector.observe(source),
            Self::Signature(detector) => detector.observe(source),
        }
    }
}

/// Shared "redraw wanted" flag. Any number of requests made before a frame
/// collapse into a single pending one.
#[derive(Debug, Clone, Default)]
pub struct FrameRequest {
    pending: Rc<Cell<bool>>,
}

impl FrameRequest {
    pub fn request(&self) {
        self.pending.set(true);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    fn take(&self) -> bool {
        self.pending.replace(false)
    }
}

/// Drawing backend that receives the transcribed score.
pub trait NotationSurface {
    fn draw(&mut self, score: &Score);
}

/// What a frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing was requested since the last frame.
    Idle,
    /// A frame was requested but the pattern had not changed.
    Unchanged,
    /// The pattern was transcribed and handed to the surface.
    Redrawn,
}

/// Runs transcription and redraw at most once per frame, and only when the
/// pattern actually changed.
///
/// Callers mark work through the [`FrameRequest`] returned by
/// [`RenderGate::frame_request`] and call [`RenderGate::on_frame`] once per
/// display frame. The frame reads the state as it is when the frame runs, so a
/// burst of edits inside one frame costs one transcription.
#[derive(Debug)]
pub struct RenderGate<D> {
    detector: D,
    request: FrameRequest,
    forced: bool,
    transcriptions: u64,
}

impl RenderGate<RevisionDetector> {
    pub fn with_revisions() -> Self {
        Self::new(RevisionDetector::default())
    }
}

impl RenderGate<SignatureDetector> {
    pub fn with_signatures() -> Self {
        Self::new(SignatureDetector::default())
    }
}

impl RenderGate<ConfiguredDetector> {
    pub fn configured(detection: Detection) -> Self {
        Self::new(ConfiguredDetector::new(detection))
    }
}

impl<D> RenderGate<D> {
    /// The first frame always draws.
    pub fn new(detector: D) -> Self {
        let request = FrameRequest::default();
        request.request();
        Self {
            detector,
            request,
            forced: false,
            transcriptions: 0,
        }
    }

    /// Handle to mark a redraw as wanted, typically captured by a store
    /// subscriber.
    pub fn frame_request(&self) -> FrameRequest {
        self.request.clone()
    }

    /// Number of times the gate let transcription run.
    pub fn transcriptions(&self) -> u64 {
        self.transcriptions
    }

    /// Runs the pending frame, if any.
    pub fn on_frame<S, N>(&mut self, source: &S, surface: &mut N) -> FrameOutcome
    where
        D: ChangeDetector<S>,
        S: PatternSource + ?Sized,
        N: NotationSurface + ?Sized,
    {
        if !self.request.take() {
            return FrameOutcome::Idle;
        }

        let forced = std::mem::take(&mut self.forced);
        if !self.detector.observe(source) && !forced {
            tracing::trace!("frame requested but pattern unchanged");
            return FrameOutcome::Unchanged;
        }

        let score = notation::transcribe_all(source);
        self.transcriptions += 1;
        tracing::trace!(
            tracks = score.tracks.len(),
            events = score.total_events(),
            "redrawing notation"
        );
        surface.draw(&score);
        FrameOutcome::Redrawn
    }

    /// Forces the next frame to transcribe and draw, e.g. after the surface was
    /// recreated.
    pub fn invalidate(&mut self) {
        self.forced = true;
        self.request.request();
    }
}
