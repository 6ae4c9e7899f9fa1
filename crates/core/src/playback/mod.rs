use std::time::{Duration, Instant};

/// Trailing-edge delay applied to tempo changes while playback is running.
pub const DEFAULT_TEMPO_DEBOUNCE: Duration = Duration::from_millis(120);

/// The external engine that owns wall-clock timing.
///
/// The engine reports the step it is sounding through
/// [`crate::Session::on_playback_tick`]; the core only tells it about tempo
/// changes.
pub trait PlaybackEngine {
    fn is_playing(&self) -> bool;
    fn apply_tempo(&mut self, bpm: f32);
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingTempo {
    bpm: f32,
    due: Instant,
}

/// Holds back tempo changes during playback so that dragging a tempo control
/// does not flood the scheduler. A newer value replaces a pending one and
/// restarts the delay.
#[derive(Debug, Clone)]
pub struct TempoDebouncer {
    delay: Duration,
    pending: Option<PendingTempo>,
}

impl Default for TempoDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO_DEBOUNCE)
    }
}

impl TempoDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Offers a new tempo. Returns it straight back when it should be applied
    /// now (playback stopped); otherwise it is held until [`Self::poll`]
    /// releases it.
    pub fn push(&mut self, bpm: f32, now: Instant, playing: bool) -> Option<f32> {
        if !playing {
            self.pending = None;
            return Some(bpm);
        }

        self.pending = Some(PendingTempo {
            bpm,
            due: now + self.delay,
        });
        None
    }

    /// Releases the pending tempo once its delay has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<f32> {
        match self.pending {
            Some(pending) if now >= pending.due => {
                self.pending = None;
                Some(pending.bpm)
            }
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<f32> {
        self.pending.map(|pending| pending.bpm)
    }

    /// Drops the pending tempo, if any.
    pub fn cancel(&mut self) -> Option<f32> {
        self.pending.take().map(|pending| pending.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn applies_immediately_when_stopped() {
        let mut debouncer = TempoDebouncer::default();
        assert_eq!(debouncer.push(100.0, Instant::now(), false), Some(100.0));
        assert_eq!(debouncer.pending(), None);
    }

    #[test]
    fn holds_back_while_playing() {
        let mut debouncer = TempoDebouncer::default();
        let start = Instant::now();

        assert_eq!(debouncer.push(100.0, start, true), None);
        assert_eq!(debouncer.poll(start + ms(119)), None);
        assert_eq!(debouncer.poll(start + ms(120)), Some(100.0));
        assert_eq!(debouncer.poll(start + ms(500)), None);
    }

    #[test]
    fn newer_value_supersedes_pending_one() {
        let mut debouncer = TempoDebouncer::new(ms(120));
        let start = Instant::now();

        debouncer.push(100.0, start, true);
        debouncer.push(110.0, start + ms(80), true);
        debouncer.push(130.0, start + ms(160), true);

        assert_eq!(debouncer.poll(start + ms(200)), None);
        assert_eq!(debouncer.poll(start + ms(280)), Some(130.0));
    }

    #[test]
    fn stopping_flushes_pending_value() {
        let mut debouncer = TempoDebouncer::default();
        let start = Instant::now();
        debouncer.push(100.0, start, true);
        assert_eq!(debouncer.push(90.0, start + ms(10), false), Some(90.0));
        assert_eq!(debouncer.poll(start + ms(1_000)), None);
    }

    #[test]
    fn cancel_drops_pending_value() {
        let mut debouncer = TempoDebouncer::default();
        let start = Instant::now();
        debouncer.push(100.0, start, true);
        assert_eq!(debouncer.cancel(), Some(100.0));
        assert_eq!(debouncer.poll(start + ms(1_000)), None);
    }
}
