//! Authoritative pattern state.
//!
//! [`PatternStore`] is the single writer of the tracks, resolution, hit grid,
//! tempo and playhead. Every public mutator ends by re-normalizing the state so
//! that the tracks, the step count and the per-track arrays always agree.
//! Readers borrow the state or take an owned [`StateSnapshot`]; interested
//! parties subscribe to [`StoreEvent`]s.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    pattern::{self, PatternMap, Track},
    render::{PatternSource, RevisionSource},
    timing::{self, Resolution, ResolutionPatch},
};

/// Notification class carried by a [`StoreEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Hit values changed.
    Pattern,
    /// The track list or the resolution changed.
    Structure,
    /// The playback cursor moved.
    Playhead,
    /// The tempo changed.
    Tempo,
}

impl ChangeKind {
    /// Whether this kind of change can alter the transcribed notation.
    pub fn affects_notation(self) -> bool {
        matches!(self, Self::Pattern | Self::Structure)
    }
}

/// Delivered to subscribers after a mutation has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: ChangeKind,
    /// Pattern revision after the mutation.
    pub revision: u32,
}

/// Handle returned by [`PatternStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&StoreEvent)>;

/// The editable rhythm. Fields are public so that [`PatternStore::update`]
/// mutators can reach them, but outside of a mutator the state is only ever
/// handed out by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternState {
    pub tracks: Vec<Track>,
    pub resolution: Resolution,
    pub pattern: PatternMap,
    pub bpm: f32,
    pub current_step: Option<usize>,
}

impl Default for PatternState {
    fn default() -> Self {
        let tracks = pattern::default_tracks();
        let resolution = Resolution::default();
        let pattern = pattern::empty_pattern(&tracks, resolution.steps());
        Self {
            tracks,
            resolution,
            pattern,
            bpm: timing::DEFAULT_BPM,
            current_step: None,
        }
    }
}

impl PatternState {
    /// Derived step count.
    pub fn steps(&self) -> usize {
        self.resolution.steps()
    }

    /// The hit array of `track_id`, if the track exists.
    pub fn track_steps(&self, track_id: &str) -> Option<&[bool]> {
        self.pattern.get(track_id).map(Vec::as_slice)
    }

    pub fn has_track(&self, track_id: &str) -> bool {
        self.tracks.iter().any(|track| track.id == track_id)
    }

    /// Playhead in the `-1`-for-stopped encoding used by some collaborators.
    pub fn current_step_index(&self) -> i64 {
        self.current_step.map_or(-1, |step| step as i64)
    }

    fn normalize(&mut self) {
        self.resolution = self.resolution.normalized();
        self.bpm = timing::clamp_bpm(self.bpm);
        self.tracks = pattern::dedup_tracks(std::mem::take(&mut self.tracks));
        let steps = self.steps();
        self.pattern = pattern::normalize_pattern(&self.pattern, &self.tracks, steps);
        if self.current_step.is_some_and(|step| step >= steps) {
            self.current_step = None;
        }
    }
}

/// Owned copy of the store state, including the pattern revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub tracks: Vec<Track>,
    pub resolution: Resolution,
    pub steps: usize,
    pub pattern: PatternMap,
    pub bpm: f32,
    pub current_step: Option<usize>,
    pub pattern_revision: u32,
}

/// Partial state change for [`PatternStore::set`]. Unset fields are left
/// alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub tracks: Option<Vec<Track>>,
    pub resolution: ResolutionPatch,
    /// Merged per track id over the current pattern.
    pub pattern: Option<PatternMap>,
    pub bpm: Option<f32>,
    pub current_step: Option<Option<usize>>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(mut self, tracks: Vec<Track>) -> Self {
        self.tracks = Some(tracks);
        self
    }

    pub fn resolution(mut self, resolution: ResolutionPatch) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn pattern(mut self, pattern: PatternMap) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn bpm(mut self, bpm: f32) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn current_step(mut self, step: Option<usize>) -> Self {
        self.current_step = Some(step);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bump {
    IfChanged,
    Always(ChangeKind),
}

/// Single source of truth for the editable rhythm.
pub struct PatternStore {
    state: PatternState,
    revision: u32,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternStore {
    /// Default tracks, 16 steps, empty pattern, 120 BPM.
    pub fn new() -> Self {
        Self::with_state(PatternState::default())
    }

    /// Builds a store around the provided state after normalizing it.
    pub fn with_state(mut state: PatternState) -> Self {
        state.normalize();
        Self {
            state,
            revision: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn state(&self) -> &PatternState {
        &self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.state.clone();
        StateSnapshot {
            steps: state.steps(),
            tracks: state.tracks,
            resolution: state.resolution,
            pattern: state.pattern,
            bpm: state.bpm,
            current_step: state.current_step,
            pattern_revision: self.revision,
        }
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn steps(&self) -> usize {
        self.state.steps()
    }

    pub fn resolution(&self) -> Resolution {
        self.state.resolution
    }

    pub fn tracks(&self) -> &[Track] {
        &self.state.tracks
    }

    pub fn bpm(&self) -> f32 {
        self.state.bpm
    }

    pub fn current_step(&self) -> Option<usize> {
        self.state.current_step
    }

    /// Registers a callback for every subsequent [`StoreEvent`].
    pub fn subscribe(&mut self, subscriber: impl FnMut(&StoreEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// Applies a partial change, then re-normalizes. Tracks that survive a track
    /// change keep their hits; a resolution change resizes every array in place.
    pub fn set(&mut self, patch: StatePatch) {
        let before = self.state.clone();

        if let Some(tracks) = patch.tracks {
            self.state.tracks = tracks;
        }
        if !patch.resolution.is_empty() {
            self.state.resolution = self.state.resolution.with_patch(patch.resolution);
        }
        if let Some(pattern) = patch.pattern {
            self.state.pattern.extend(pattern);
        }
        if let Some(bpm) = patch.bpm {
            self.state.bpm = bpm;
        }
        if let Some(step) = patch.current_step {
            self.state.current_step = step;
        }

        self.commit(&before, Bump::IfChanged);
    }

    /// Runs `mutator` against the state, then re-normalizes.
    pub fn update(&mut self, mutator: impl FnOnce(&mut PatternState)) {
        let before = self.state.clone();
        mutator(&mut self.state);
        self.commit(&before, Bump::IfChanged);
    }

    /// Clears every hit. The playhead is cleared as well unless `keep_playhead`.
    pub fn reset_pattern(&mut self, keep_playhead: bool) {
        let before = self.state.clone();
        self.state.pattern = pattern::empty_pattern(&self.state.tracks, self.state.steps());
        if !keep_playhead {
            self.state.current_step = None;
        }
        self.commit(&before, Bump::Always(ChangeKind::Pattern));
    }

    /// Replaces the whole pattern. Unknown ids are dropped, missing ids start
    /// empty and every array is resized to the current step count.
    pub fn set_pattern(&mut self, next: PatternMap, reset_playhead: bool) {
        let before = self.state.clone();
        self.state.pattern = next;
        if reset_playhead {
            self.state.current_step = None;
        }
        self.commit(&before, Bump::Always(ChangeKind::Pattern));
    }

    /// Flips a step, or forces it to `force` when given.
    ///
    /// Returns the stored value afterwards, or `None` when the track is unknown
    /// or the index is out of range.
    pub fn toggle_step(&mut self, track_id: &str, step: usize, force: Option<bool>) -> Option<bool> {
        let current = self.get_step(track_id, step)?;
        let next = force.unwrap_or(!current);
        self.write_step(track_id, step, next)?;
        Some(next)
    }

    /// Writes a single step. Returns the previous value, or `None` when the
    /// target does not exist.
    pub fn set_step(&mut self, track_id: &str, step: usize, value: bool) -> Option<bool> {
        self.write_step(track_id, step, value)
    }

    pub fn get_step(&self, track_id: &str, step: usize) -> Option<bool> {
        let value = self
            .state
            .pattern
            .get(track_id)
            .and_then(|row| row.get(step))
            .copied();
        if value.is_none() {
            tracing::debug!(track_id, step, "step lookup missed");
        }
        value
    }

    fn write_step(&mut self, track_id: &str, step: usize, value: bool) -> Option<bool> {
        let Some(cell) = self
            .state
            .pattern
            .get_mut(track_id)
            .and_then(|row| row.get_mut(step))
        else {
            tracing::debug!(track_id, step, "ignoring edit of unknown step");
            return None;
        };

        let previous = std::mem::replace(cell, value);
        if previous != value {
            self.bump();
            self.emit(ChangeKind::Pattern);
        }
        Some(previous)
    }

    /// Records the step the playback engine is sounding. Out-of-range input
    /// clears the playhead.
    pub fn set_current_step(&mut self, step: Option<usize>) {
        let step = step.filter(|step| *step < self.state.steps());
        if self.state.current_step != step {
            self.state.current_step = step;
            self.emit(ChangeKind::Playhead);
        }
    }

    /// Sets the tempo, clamped to the supported range. Returns the stored value.
    pub fn set_bpm(&mut self, bpm: f32) -> f32 {
        let bpm = timing::clamp_bpm(bpm);
        if self.state.bpm != bpm {
            self.state.bpm = bpm;
            self.emit(ChangeKind::Tempo);
        }
        bpm
    }

    /// Replaces the track list. With `preserve_pattern` the hits of surviving
    /// ids are kept; otherwise every track starts empty.
    pub fn set_tracks(&mut self, tracks: Vec<Track>, preserve_pattern: bool) {
        let before = self.state.clone();
        self.state.tracks = tracks;
        if !preserve_pattern {
            self.state.pattern.clear();
        }
        self.commit(&before, Bump::Always(ChangeKind::Structure));
        tracing::info!(
            tracks = self.state.tracks.len(),
            preserve_pattern,
            "track list replaced"
        );
    }

    /// Changes any of the resolution factors, keeping every hit that still fits.
    pub fn set_resolution(&mut self, patch: ResolutionPatch) {
        let before = self.state.clone();
        self.state.resolution = self.state.resolution.with_patch(patch);
        self.commit(&before, Bump::Always(ChangeKind::Structure));
        tracing::info!(
            bars = self.state.resolution.bars,
            beats_per_bar = self.state.resolution.beats_per_bar,
            steps_per_beat = self.state.resolution.steps_per_beat,
            steps = self.state.steps(),
            "resolution changed"
        );
    }

    fn commit(&mut self, before: &PatternState, bump: Bump) {
        self.state.normalize();

        let structural =
            before.tracks != self.state.tracks || before.resolution != self.state.resolution;
        let content = before.pattern != self.state.pattern;

        let kind = match bump {
            _ if structural => Some(ChangeKind::Structure),
            Bump::Always(kind) => Some(kind),
            Bump::IfChanged if content => Some(ChangeKind::Pattern),
            Bump::IfChanged => None,
        };

        if let Some(kind) = kind {
            self.bump();
            self.emit(kind);
        }
        if before.current_step != self.state.current_step {
            self.emit(ChangeKind::Playhead);
        }
        if before.bpm != self.state.bpm {
            self.emit(ChangeKind::Tempo);
        }
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn emit(&mut self, kind: ChangeKind) {
        let event = StoreEvent {
            kind,
            revision: self.revision,
        };
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
    }

    #[cfg(test)]
    fn force_revision(&mut self, revision: u32) {
        self.revision = revision;
    }
}

impl fmt::Debug for PatternStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternStore")
            .field("state", &self.state)
            .field("revision", &self.revision)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl PatternSource for PatternStore {
    fn resolution(&self) -> Resolution {
        self.state.resolution
    }

    fn tracks(&self) -> &[Track] {
        &self.state.tracks
    }

    fn track_steps(&self, track_id: &str) -> Option<&[bool]> {
        self.state.track_steps(track_id)
    }
}

impl RevisionSource for PatternStore {
    fn pattern_revision(&self) -> u32 {
        self.revision
    }
}
