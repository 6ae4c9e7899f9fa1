use std::{fmt, time::Instant};

use crate::{
    config::AppConfig,
    notation::ContinuationPolicy,
    playback::{PlaybackEngine, TempoDebouncer},
    render::{ConfiguredDetector, FrameOutcome, NotationSurface, RenderGate},
    store::PatternStore,
};

/// One editor: a pattern store, the render gate that watches it and the
/// optional playback engine that follows its tempo.
///
/// The gate is only woken by pattern and structure changes. Playhead ticks
/// update the store and nothing else, so they stay cheap at playback rate.
pub struct Session {
    store: PatternStore,
    gate: RenderGate<ConfiguredDetector>,
    tempo: TempoDebouncer,
    engine: Option<Box<dyn PlaybackEngine>>,
    continuations: ContinuationPolicy,
}

impl Session {
    pub fn new(config: &AppConfig) -> Self {
        let mut store = PatternStore::with_state(config.session.initial_state());
        let gate = RenderGate::configured(config.render.detection);

        let request = gate.frame_request();
        store.subscribe(move |event| {
            if event.kind.affects_notation() {
                request.request();
            }
        });

        Self {
            store,
            gate,
            tempo: TempoDebouncer::new(config.session.tempo_debounce()),
            engine: None,
            continuations: config.render.continuations,
        }
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    /// Mutable access for editing. The render gate stays subscribed.
    pub fn store_mut(&mut self) -> &mut PatternStore {
        &mut self.store
    }

    pub fn continuations(&self) -> ContinuationPolicy {
        self.continuations
    }

    /// Number of transcriptions the gate has let through.
    pub fn transcriptions(&self) -> u64 {
        self.gate.transcriptions()
    }

    pub fn attach_engine(&mut self, engine: Box<dyn PlaybackEngine>) {
        self.engine = Some(engine);
    }

    /// Detaches the engine and drops any tempo still waiting for it.
    pub fn detach_engine(&mut self) -> Option<Box<dyn PlaybackEngine>> {
        self.tempo.cancel();
        self.engine.take()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Per-tick callback for the playback engine.
    pub fn on_playback_tick(&mut self, step: Option<usize>) {
        self.store.set_current_step(step);
    }

    /// Stores the tempo right away and forwards it to the engine, debounced
    /// while the engine is playing. Returns the stored (clamped) value.
    /// A tempo equal to the stored one is not forwarded.
    pub fn set_bpm(&mut self, bpm: f32, now: Instant) -> f32 {
        let previous = self.store.bpm();
        let bpm = self.store.set_bpm(bpm);
        if bpm == previous {
            return bpm;
        }
        match self.engine.as_mut() {
            Some(engine) => {
                if let Some(bpm) = self.tempo.push(bpm, now, engine.is_playing()) {
                    engine.apply_tempo(bpm);
                }
            }
            None => tracing::debug!(bpm, "no playback engine attached, tempo kept locally"),
        }
        bpm
    }

    /// Delivers a debounced tempo whose delay has elapsed.
    pub fn poll(&mut self, now: Instant) {
        let Some(bpm) = self.tempo.poll(now) else {
            return;
        };
        match self.engine.as_mut() {
            Some(engine) => engine.apply_tempo(bpm),
            None => tracing::warn!(bpm, "dropping debounced tempo, playback engine is gone"),
        }
    }

    /// Runs one display frame.
    pub fn frame<N: NotationSurface + ?Sized>(&mut self, surface: &mut N) -> FrameOutcome {
        self.gate.on_frame(&self.store, surface)
    }

    /// Makes the next frame redraw even if nothing changed.
    pub fn invalidate(&mut self) {
        self.gate.invalidate();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .field("gate", &self.gate)
            .field("tempo", &self.tempo)
            .field("engine", &self.engine.is_some())
            .field("continuations", &self.continuations)
            .finish()
    }
}
