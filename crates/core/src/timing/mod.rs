use serde::{Deserialize, Serialize};

/// Lowest tempo the store accepts.
pub const BPM_MIN: f32 = 40.0;
/// Highest tempo the store accepts.
pub const BPM_MAX: f32 = 240.0;
/// Tempo used when no (finite) value is provided.
pub const DEFAULT_BPM: f32 = 120.0;

pub const DEFAULT_BARS: u32 = 1;
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;
pub const DEFAULT_STEPS_PER_BEAT: u32 = 4;

pub const MAX_BARS: u32 = 64;
pub const MAX_BEATS_PER_BAR: u32 = 16;
pub const MAX_STEPS_PER_BEAT: u32 = 16;

/// Total number of steps for the given factors.
pub fn total_steps(bars: u32, beats_per_bar: u32, steps_per_beat: u32) -> usize {
    bars as usize * beats_per_bar as usize * steps_per_beat as usize
}

/// Clamps a tempo to [`BPM_MIN`, `BPM_MAX`]. Non-finite input yields
/// [`DEFAULT_BPM`].
pub fn clamp_bpm(bpm: f32) -> f32 {
    if bpm.is_finite() {
        bpm.clamp(BPM_MIN, BPM_MAX)
    } else {
        DEFAULT_BPM
    }
}

fn coerce_factor(value: u32, default: u32, max: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value.min(max)
    }
}

/// The (bars, beats per bar, steps per beat) triple that defines the grid.
///
/// The step count is always derived from the three factors; there is no way to
/// set it independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Resolution {
    pub bars: u32,
    pub beats_per_bar: u32,
    pub steps_per_beat: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            bars: DEFAULT_BARS,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
            steps_per_beat: DEFAULT_STEPS_PER_BEAT,
        }
    }
}

impl Resolution {
    /// Builds a resolution, replacing zero factors with their defaults and
    /// capping oversized ones.
    pub fn new(bars: u32, beats_per_bar: u32, steps_per_beat: u32) -> Self {
        Self {
            bars,
            beats_per_bar,
            steps_per_beat,
        }
        .normalized()
    }

    /// Returns a copy with every factor brought back into its legal range.
    pub fn normalized(self) -> Self {
        Self {
            bars: coerce_factor(self.bars, DEFAULT_BARS, MAX_BARS),
            beats_per_bar: coerce_factor(
                self.beats_per_bar,
                DEFAULT_BEATS_PER_BAR,
                MAX_BEATS_PER_BAR,
            ),
            steps_per_beat: coerce_factor(
                self.steps_per_beat,
                DEFAULT_STEPS_PER_BEAT,
                MAX_STEPS_PER_BEAT,
            ),
        }
    }

    /// Applies the provided factors on top of this resolution.
    pub fn with_patch(self, patch: ResolutionPatch) -> Self {
        Self::new(
            patch.bars.unwrap_or(self.bars),
            patch.beats_per_bar.unwrap_or(self.beats_per_bar),
            patch.steps_per_beat.unwrap_or(self.steps_per_beat),
        )
    }

    pub fn steps(&self) -> usize {
        total_steps(self.bars, self.beats_per_bar, self.steps_per_beat)
    }

    pub fn steps_per_bar(&self) -> usize {
        self.beats_per_bar as usize * self.steps_per_beat as usize
    }

    pub fn steps_per_beat(&self) -> usize {
        self.steps_per_beat.max(1) as usize
    }

    /// Index of the beat that contains `step`, counted from the pattern start.
    pub fn beat_of(&self, step: usize) -> usize {
        step / self.steps_per_beat()
    }

    pub fn bar_of(&self, step: usize) -> usize {
        step / self.steps_per_bar().max(1)
    }

    pub fn is_beat_start(&self, step: usize) -> bool {
        step % self.steps_per_beat() == 0
    }

    /// First step index after the beat that contains `step`.
    pub fn beat_end(&self, step: usize) -> usize {
        (self.beat_of(step) + 1) * self.steps_per_beat()
    }

    pub fn contains(&self, step: usize) -> bool {
        step < self.steps()
    }
}

/// Partial resolution update. Missing factors keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionPatch {
    pub bars: Option<u32>,
    pub beats_per_bar: Option<u32>,
    pub steps_per_beat: Option<u32>,
}

impl ResolutionPatch {
    pub fn bars(bars: u32) -> Self {
        Self {
            bars: Some(bars),
            ..Self::default()
        }
    }

    pub fn steps_per_beat(steps_per_beat: u32) -> Self {
        Self {
            steps_per_beat: Some(steps_per_beat),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_none() && self.beats_per_bar.is_none() && self.steps_per_beat.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolution_has_sixteen_steps() {
        let resolution = Resolution::default();
        assert_eq!(resolution.steps(), 16);
        assert_eq!(resolution.steps_per_bar(), 16);
    }

    #[test]
    fn steps_follow_factors() {
        for bars in 1..=4 {
            for beats in 1..=7 {
                for per_beat in 1..=8 {
                    let resolution = Resolution::new(bars, beats, per_beat);
                    assert_eq!(
                        resolution.steps(),
                        (bars * beats * per_beat) as usize,
                        "{resolution:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn zero_factors_fall_back_to_defaults() {
        let resolution = Resolution::new(0, 0, 0);
        assert_eq!(resolution, Resolution::default());
    }

    #[test]
    fn oversized_factors_are_capped() {
        let resolution = Resolution::new(1_000, 99, 128);
        assert_eq!(resolution.bars, MAX_BARS);
        assert_eq!(resolution.beats_per_bar, MAX_BEATS_PER_BAR);
        assert_eq!(resolution.steps_per_beat, MAX_STEPS_PER_BEAT);
    }

    #[test]
    fn patch_only_touches_given_factors() {
        let resolution = Resolution::default().with_patch(ResolutionPatch::bars(2));
        assert_eq!(resolution.bars, 2);
        assert_eq!(resolution.beats_per_bar, 4);
        assert_eq!(resolution.steps(), 32);
    }

    #[test]
    fn beat_helpers() {
        let resolution = Resolution::new(2, 3, 4);
        assert_eq!(resolution.beat_of(5), 1);
        assert_eq!(resolution.beat_end(5), 8);
        assert!(resolution.is_beat_start(8));
        assert!(!resolution.is_beat_start(9));
        assert_eq!(resolution.bar_of(11), 0);
        assert_eq!(resolution.bar_of(12), 1);
    }

    #[test]
    fn bpm_is_clamped() {
        assert_eq!(clamp_bpm(10.0), BPM_MIN);
        assert_eq!(clamp_bpm(400.0), BPM_MAX);
        assert_eq!(clamp_bpm(96.0), 96.0);
        assert_eq!(clamp_bpm(f32::NAN), DEFAULT_BPM);
        assert_eq!(clamp_bpm(f32::INFINITY), DEFAULT_BPM);
    }
}
