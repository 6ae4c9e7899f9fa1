//! Transcription of boolean step arrays into rhythmic notation.
//!
//! A track is read one beat at a time. Inside a beat the steps before the first
//! hit are a rest; every hit starts a run that absorbs the hits directly after
//! it and then sustains through the silent steps until the next hit or the end
//! of the beat. There is no note-off in a step grid, so a hit lasts until
//! something else happens. Beats longer than a quarter on the sixteenth grid are
//! read in quarter-sized chunks, each treated like a beat of its own.
//!
//! Run lengths are split greedily over the supported duration classes, largest
//! first, which makes the output canonical. The first piece of a hit run is its
//! head and carries the value the run is notated with. Later pieces are
//! continuations: they keep the time accounting of the measure exact and are
//! what a renderer hides when it draws without ties.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{pattern::Track, render::PatternSource, timing::Resolution};

/// Notated note or rest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationClass {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl DurationClass {
    /// Longest first.
    pub const ALL: [Self; 6] = [
        Self::Whole,
        Self::Half,
        Self::Quarter,
        Self::Eighth,
        Self::Sixteenth,
        Self::ThirtySecond,
    ];

    /// Length in thirty-second notes.
    pub fn units(self) -> u32 {
        match self {
            Self::Whole => 32,
            Self::Half => 16,
            Self::Quarter => 8,
            Self::Eighth => 4,
            Self::Sixteenth => 2,
            Self::ThirtySecond => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Whole => "whole",
            Self::Half => "half",
            Self::Quarter => "quarter",
            Self::Eighth => "eighth",
            Self::Sixteenth => "sixteenth",
            Self::ThirtySecond => "thirty_second",
        }
    }
}

impl fmt::Display for DurationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Length of one step in thirty-second notes.
///
/// Beats split into 1, 2, 4 or 8 steps map onto plain note values. Any other
/// split is read on the sixteenth grid, which is the finest grain the notation
/// offers for a 16-step bar.
pub fn step_units(steps_per_beat: usize) -> u32 {
    match steps_per_beat {
        1 => 8,
        2 => 4,
        4 => 2,
        8 => 1,
        _ => 2,
    }
}

/// Most steps one transcription chunk may span, so that no event is notated
/// longer than a quarter. Plain splits always fit a whole beat.
pub fn chunk_steps(steps_per_beat: usize, step_units: u32) -> usize {
    let per_quarter = (DurationClass::Quarter.units() / step_units.max(1)).max(1) as usize;
    per_quarter.min(steps_per_beat.max(1))
}

/// Greedy largest-first split of `len` steps into `(steps, class)` pieces.
pub fn decompose(len: usize, step_units: u32) -> Vec<(usize, DurationClass)> {
    let step_units = step_units.max(1);
    let mut pieces = Vec::new();
    let mut remaining = len as u32 * step_units;

    while remaining > 0 {
        let Some(class) = DurationClass::ALL
            .into_iter()
            .find(|class| class.units() >= step_units && class.units() <= remaining)
        else {
            break;
        };
        pieces.push(((class.units() / step_units) as usize, class));
        remaining -= class.units();
    }

    pieces
}

/// A derived note or rest. Never stored; recomputed from the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotationEvent {
    pub track_id: String,
    pub start_step: usize,
    /// Steps this event accounts for in the measure.
    pub length_in_steps: usize,
    pub duration: DurationClass,
    pub is_rest: bool,
    pub is_continuation: bool,
}

impl NotationEvent {
    pub fn end_step(&self) -> usize {
        self.start_step + self.length_in_steps
    }

    /// Hits that start a run.
    pub fn is_head(&self) -> bool {
        !self.is_rest && !self.is_continuation
    }
}

impl fmt::Display for NotationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.is_rest {
            "rest"
        } else if self.is_continuation {
            "cont"
        } else {
            "hit"
        };
        write!(f, "{tag}:{}@{}", self.duration, self.start_step)
    }
}

/// Whether continuation events reach the drawing surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuationPolicy {
    #[default]
    Hide,
    Show,
}

/// Transcribes one track.
pub fn transcribe_track(
    track_id: &str,
    steps: &[bool],
    resolution: &Resolution,
) -> Vec<NotationEvent> {
    let per_beat = resolution.steps_per_beat();
    let units = step_units(per_beat);
    let chunk = chunk_steps(per_beat, units);
    let mut out = Vec::new();

    let mut beat_start = 0;
    while beat_start < steps.len() {
        let beat_end = (beat_start + per_beat).min(steps.len());
        let mut chunk_start = beat_start;
        while chunk_start < beat_end {
            let chunk_end = (chunk_start + chunk).min(beat_end);
            transcribe_chunk(track_id, steps, chunk_start, chunk_end, units, &mut out);
            chunk_start = chunk_end;
        }
        beat_start = beat_end;
    }

    out
}

fn transcribe_chunk(
    track_id: &str,
    steps: &[bool],
    start: usize,
    end: usize,
    units: u32,
    out: &mut Vec<NotationEvent>,
) {
    let first_hit = (start..end).find(|&index| steps[index]).unwrap_or(end);
    push_rest(track_id, start, first_hit, units, out);

    let mut run_start = first_hit;
    while run_start < end {
        let mut onsets_end = run_start;
        while onsets_end < end && steps[onsets_end] {
            onsets_end += 1;
        }
        let mut run_end = onsets_end;
        while run_end < end && !steps[run_end] {
            run_end += 1;
        }

        push_hit_run(track_id, run_start, onsets_end, run_end, units, out);
        run_start = run_end;
    }
}

fn push_rest(track_id: &str, start: usize, end: usize, units: u32, out: &mut Vec<NotationEvent>) {
    let mut at = start;
    for (len, duration) in decompose(end - start, units) {
        out.push(NotationEvent {
            track_id: track_id.to_string(),
            start_step: at,
            length_in_steps: len,
            duration,
            is_rest: true,
            is_continuation: false,
        });
        at += len;
    }
}

/// Emits the run `[start, end)` whose hits occupy `[start, onsets_end)`.
fn push_hit_run(
    track_id: &str,
    start: usize,
    onsets_end: usize,
    end: usize,
    units: u32,
    out: &mut Vec<NotationEvent>,
) {
    let notated = decompose(end - start, units);
    let Some(&(_, head)) = notated.first() else {
        return;
    };

    // Segments start at every greedy piece boundary and at every absorbed onset.
    let mut cuts: BTreeSet<usize> = (start + 1..onsets_end).collect();
    let mut at = start;
    for (len, _) in &notated {
        at += len;
        if at < end {
            cuts.insert(at);
        }
    }
    cuts.insert(end);

    let mut segment_start = start;
    let mut first = true;
    for cut in cuts {
        let mut at = segment_start;
        for (len, duration) in decompose(cut - segment_start, units) {
            out.push(NotationEvent {
                track_id: track_id.to_string(),
                start_step: at,
                length_in_steps: len,
                duration: if first { head } else { duration },
                is_rest: false,
                is_continuation: !first,
            });
            first = false;
            at += len;
        }
        segment_start = cut;
    }
}

/// The notation of a single track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackNotation {
    pub track: Track,
    pub events: Vec<NotationEvent>,
}

impl TrackNotation {
    /// Events a renderer should draw under `policy`.
    pub fn visible_events(
        &self,
        policy: ContinuationPolicy,
    ) -> impl Iterator<Item = &NotationEvent> + '_ {
        self.events
            .iter()
            .filter(move |event| policy == ContinuationPolicy::Show || !event.is_continuation)
    }
}

/// Notation for every track, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Score {
    pub resolution: Resolution,
    pub tracks: Vec<TrackNotation>,
}

impl Score {
    pub fn track(&self, track_id: &str) -> Option<&TrackNotation> {
        self.tracks.iter().find(|notation| notation.track.id == track_id)
    }

    pub fn total_events(&self) -> usize {
        self.tracks.iter().map(|notation| notation.events.len()).sum()
    }
}

/// Transcribes every track the source exposes.
pub fn transcribe_all<S: PatternSource + ?Sized>(source: &S) -> Score {
    let resolution = source.resolution();
    let tracks = source
        .tracks()
        .iter()
        .map(|track| {
            let steps = source.track_steps(&track.id).unwrap_or_default();
            TrackNotation {
                track: track.clone(),
                events: transcribe_track(&track.id, steps, &resolution),
            }
        })
        .collect();

    Score { resolution, tracks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pattern::parse_steps, store::PatternStore};

    fn events(grid: &str) -> Vec<NotationEvent> {
        events_with(grid, Resolution::default())
    }

    fn events_with(grid: &str, resolution: Resolution) -> Vec<NotationEvent> {
        let steps = parse_steps(grid).unwrap();
        transcribe_track("t", &steps, &resolution)
    }

    fn render(events: &[NotationEvent]) -> Vec<String> {
        events.iter().map(ToString::to_string).collect()
    }

    fn assert_accounting(events: &[NotationEvent], len: usize) {
        let mut expected_start = 0;
        for event in events {
            assert!(event.length_in_steps > 0, "{event}");
            assert_eq!(event.start_step, expected_start, "{event}");
            expected_start = event.end_step();
        }
        assert_eq!(expected_start, len);
    }

    #[test]
    fn greedy_decomposition_is_largest_first() {
        assert_eq!(decompose(4, 2), [(4, DurationClass::Quarter)]);
        assert_eq!(
            decompose(3, 2),
            [(2, DurationClass::Eighth), (1, DurationClass::Sixteenth)]
        );
        assert_eq!(
            decompose(7, 2),
            [
                (4, DurationClass::Quarter),
                (2, DurationClass::Eighth),
                (1, DurationClass::Sixteenth),
            ]
        );
        assert_eq!(decompose(16, 2), [(16, DurationClass::Whole)]);
        assert!(decompose(0, 2).is_empty());
    }

    #[test]
    fn all_rests_give_one_quarter_rest_per_beat() {
        let events = events("................");
        assert_eq!(
            render(&events),
            [
                "rest:quarter@0",
                "rest:quarter@4",
                "rest:quarter@8",
                "rest:quarter@12"
            ]
        );
        assert!(events.iter().all(|event| event.is_rest && !event.is_continuation));
    }

    #[test]
    fn all_hits_give_a_quarter_head_and_three_continuations_per_beat() {
        let events = events("xxxxxxxxxxxxxxxx");
        assert_eq!(events.len(), 16);

        let heads: Vec<_> = events.iter().filter(|event| event.is_head()).collect();
        assert_eq!(heads.len(), 4);
        for (beat, head) in heads.iter().enumerate() {
            assert_eq!(head.start_step, beat * 4);
            assert_eq!(head.duration, DurationClass::Quarter);
        }

        let continuations: Vec<_> = events.iter().filter(|event| event.is_continuation).collect();
        assert_eq!(continuations.len(), 12);
        assert!(continuations
            .iter()
            .all(|event| event.duration == DurationClass::Sixteenth && !event.is_rest));

        for beat in events.chunks(4) {
            assert!(beat[0].is_head());
            assert!(beat[1..].iter().all(|event| event.is_continuation));
        }
        assert_accounting(&events, 16);
    }

    #[test]
    fn single_hit_sustains_to_the_end_of_its_beat() {
        assert_eq!(
            render(&events("x...............")),
            [
                "hit:quarter@0",
                "rest:quarter@4",
                "rest:quarter@8",
                "rest:quarter@12"
            ]
        );
    }

    #[test]
    fn offbeat_hits_split_the_beat() {
        let events = events("x.x..x...xxx....");
        assert_eq!(
            render(&events),
            [
                "hit:eighth@0",
                "hit:eighth@2",
                "rest:sixteenth@4",
                "hit:eighth@5",
                "cont:sixteenth@7",
                "rest:sixteenth@8",
                "hit:eighth@9",
                "cont:sixteenth@10",
                "cont:sixteenth@11",
                "rest:quarter@12",
            ]
        );
        assert_accounting(&events, 16);
    }

    #[test]
    fn held_hits_keep_their_notated_head_value() {
        let events = events("xx..");
        assert_eq!(
            render(&events),
            ["hit:quarter@0", "cont:eighth@1", "cont:sixteenth@3"]
        );
        assert_eq!(events[0].length_in_steps, 1);
        assert_accounting(&events, 4);
    }

    #[test]
    fn runs_never_cross_a_beat() {
        let events = events("..xx|xx..|....|...x");
        for event in &events {
            let beat_start = event.start_step / 4 * 4;
            assert!(event.end_step() <= beat_start + 4, "{event}");
        }
        assert_eq!(events[1].to_string(), "hit:eighth@2");
        assert_eq!(events[3].to_string(), "hit:quarter@4");
        assert_accounting(&events, 16);
    }

    #[test]
    fn coarser_grids_use_longer_values() {
        let eighths = Resolution::new(1, 4, 2);
        assert_eq!(
            render(&events_with("x.x.x...", eighths)),
            [
                "hit:quarter@0",
                "hit:quarter@2",
                "hit:quarter@4",
                "rest:quarter@6"
            ]
        );

        let quarters = Resolution::new(1, 4, 1);
        assert_eq!(
            render(&events_with("x..x", quarters)),
            [
                "hit:quarter@0",
                "rest:quarter@1",
                "rest:quarter@2",
                "hit:quarter@3"
            ]
        );
    }

    #[test]
    fn thirty_second_grid() {
        let fine = Resolution::new(1, 1, 8);
        assert_eq!(
            render(&events_with("x...x.x.", fine)),
            ["hit:eighth@0", "hit:sixteenth@4", "hit:sixteenth@6"]
        );
    }

    #[test]
    fn irregular_beat_falls_back_to_sixteenth_grain() {
        let triplets = Resolution::new(1, 2, 3);
        let events = events_with("x..xx.", triplets);
        assert_eq!(
            render(&events),
            ["hit:eighth@0", "cont:sixteenth@2", "hit:eighth@3", "cont:sixteenth@4", "cont:sixteenth@5"]
        );
        assert_accounting(&events, 6);
    }

    #[test]
    fn six_step_beats_split_at_the_quarter() {
        let sixes = Resolution::new(1, 2, 6);
        let rests = events_with("......|......", sixes);
        assert_eq!(
            render(&rests),
            ["rest:quarter@0", "rest:eighth@4", "rest:quarter@6", "rest:eighth@10"]
        );
        assert_accounting(&rests, 12);

        let hits = events_with("x.....|....x.", sixes);
        assert_eq!(
            render(&hits),
            ["hit:quarter@0", "rest:eighth@4", "rest:quarter@6", "hit:eighth@10"]
        );
        assert_accounting(&hits, 12);
    }

    #[test]
    fn sixteen_step_beats_never_exceed_a_quarter() {
        let fine = Resolution::new(1, 4, 16);
        let steps = vec![false; fine.steps()];
        let events = transcribe_track("t", &steps, &fine);
        assert_eq!(events.len(), 16);
        assert!(events
            .iter()
            .all(|event| event.duration == DurationClass::Quarter && event.length_in_steps == 4));
        assert_accounting(&events, 64);
    }

    #[test]
    fn chunks_fit_one_quarter() {
        assert_eq!(chunk_steps(4, step_units(4)), 4);
        assert_eq!(chunk_steps(8, step_units(8)), 8);
        assert_eq!(chunk_steps(1, step_units(1)), 1);
        assert_eq!(chunk_steps(3, step_units(3)), 3);
        assert_eq!(chunk_steps(6, step_units(6)), 4);
        assert_eq!(chunk_steps(16, step_units(16)), 4);
    }

    #[test]
    fn partial_trailing_beat_is_transcribed() {
        let events = events("x...x.");
        assert_eq!(render(&events), ["hit:quarter@0", "hit:eighth@4"]);
        assert_accounting(&events, 6);
    }

    #[test]
    fn transcription_is_deterministic() {
        let steps = parse_steps("x.xx..x.|...x|xxxx|.x.x").unwrap();
        let resolution = Resolution::default();
        let first = transcribe_track("t", &steps, &resolution);
        for _ in 0..10 {
            assert_eq!(transcribe_track("t", &steps, &resolution), first);
        }
    }

    #[test]
    fn hiding_continuations_keeps_heads_and_rests() {
        let notation = TrackNotation {
            track: Track::new("t", "T"),
            events: events("xxxx....xx.x...."),
        };
        let hidden: Vec<_> = notation
            .visible_events(ContinuationPolicy::Hide)
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            hidden,
            [
                "hit:quarter@0",
                "rest:quarter@4",
                "hit:eighth@8",
                "hit:sixteenth@11",
                "rest:quarter@12"
            ]
        );
        assert_eq!(
            notation.visible_events(ContinuationPolicy::Show).count(),
            notation.events.len()
        );
    }

    #[test]
    fn end_to_end_kick_and_snare() {
        let mut store = PatternStore::new();
        store.toggle_step("bd", 0, Some(true));
        store.toggle_step("sn", 4, Some(true));

        let score = transcribe_all(&store);
        assert_eq!(score.tracks.len(), 3);
        assert_eq!(
            render(&score.track("bd").unwrap().events),
            [
                "hit:quarter@0",
                "rest:quarter@4",
                "rest:quarter@8",
                "rest:quarter@12"
            ]
        );
        assert_eq!(
            render(&score.track("sn").unwrap().events),
            [
                "rest:quarter@0",
                "hit:quarter@4",
                "rest:quarter@8",
                "rest:quarter@12"
            ]
        );
        assert_eq!(score.total_events(), 12);
    }
}
