use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BEATS: u32 = 4;
pub const DEFAULT_SUBDIVISION: f64 = 1.0;

pub(crate) const GRID_EPSILON: f64 = 1e-9;

/// One bar of a track: `beats` main beats, each split into `subdivision`
/// sub-beats. `subdivision` may be fractional (0.5 plays every other main
/// beat). `rests` holds sub-beat indices that fire silently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub beats: u32,
    pub subdivision: f64,
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub rests: HashSet<u32>,
}

impl Default for Bar {
    fn default() -> Bar {
        Bar {
            beats: DEFAULT_BEATS,
            subdivision: DEFAULT_SUBDIVISION,
            rests: HashSet::new(),
        }
    }
}

impl Bar {
    /// Number of schedulable sub-beat slots in this bar. Never zero.
    pub fn sub_beats(&self) -> u32 {
        let n = (self.beats as f64 * self.subdivision).round() as i64;
        n.max(1) as u32
    }

    pub(crate) fn sub_interval(&self, seconds_per_main_beat: f64) -> f64 {
        seconds_per_main_beat / self.subdivision
    }

    /// A sub-beat lands on a main beat when its index is a multiple of the
    /// subdivision.
    pub(crate) fn is_accent(&self, beat: u32) -> bool {
        let rem = (beat as f64).rem_euclid(self.subdivision);
        rem < GRID_EPSILON || self.subdivision - rem < GRID_EPSILON
    }

    pub(crate) fn is_rest(&self, beat: u32) -> bool {
        self.rests.contains(&beat)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: u32,
    pub bars: Vec<Bar>,
    pub current_bar: usize,
    pub current_beat: u32,
    /// Audio-clock time the pending sub-beat fires at. `None` whenever the
    /// track is not scheduled.
    pub next_beat_time: Option<f64>,
}

impl Track {
    pub(crate) fn new(id: u32) -> Track {
        Track::with_bars(id, vec![Bar::default()])
    }

    pub(crate) fn with_bars(id: u32, bars: Vec<Bar>) -> Track {
        Track {
            id,
            bars,
            current_bar: 0,
            current_beat: 0,
            next_beat_time: None,
        }
    }

    pub(crate) fn bar(&self) -> Option<&Bar> {
        self.bars.get(self.current_bar)
    }

    /// Move to the next sub-beat, wrapping to the next bar (modulo the bar
    /// list) at the end of the current one. Returns false when there are no
    /// bars to advance into.
    pub(crate) fn advance(&mut self) -> bool {
        let sub_beats = match self.bar() {
            Some(bar) => bar.sub_beats(),
            None => return false,
        };
        self.current_beat += 1;
        if self.current_beat >= sub_beats {
            self.current_beat = 0;
            self.current_bar = (self.current_bar + 1) % self.bars.len();
        }
        true
    }

    /// Restore the position invariants after a structural edit. An
    /// out-of-range beat wraps forward to the start of the next bar.
    pub(crate) fn wrap_position(&mut self) {
        if self.bars.is_empty() {
            self.current_bar = 0;
            self.current_beat = 0;
            return;
        }
        self.current_bar %= self.bars.len();
        if self.current_beat >= self.bars[self.current_bar].sub_beats() {
            self.current_beat = 0;
            self.current_bar = (self.current_bar + 1) % self.bars.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(beats: u32, subdivision: f64) -> Bar {
        Bar {
            beats,
            subdivision,
            rests: HashSet::new(),
        }
    }

    #[test]
    fn advance_wraps_bar() {
        // 4 beats split in 2 -> 8 sub-beats per bar.
        let mut t = Track::with_bars(0, vec![bar(4, 2.0), bar(3, 1.0)]);
        t.current_beat = 7;
        assert!(t.advance());
        assert_eq!(t.current_beat, 0);
        assert_eq!(t.current_bar, 1);

        t.current_beat = 2;
        assert!(t.advance());
        assert_eq!(t.current_beat, 0);
        assert_eq!(t.current_bar, 0);
    }

    #[test]
    fn advance_without_bars() {
        let mut t = Track::with_bars(0, vec![]);
        assert!(!t.advance());
    }

    #[test]
    fn sub_beats_fractional_subdivision() {
        assert_eq!(bar(4, 0.5).sub_beats(), 2);
        assert_eq!(bar(3, 2.0).sub_beats(), 6);
        assert_eq!(bar(1, 0.25).sub_beats(), 1);
    }

    #[test]
    fn accents_fall_on_main_beats() {
        let b = bar(4, 2.0);
        let accents: Vec<bool> = (0..8).map(|i| b.is_accent(i)).collect();
        assert_eq!(
            accents,
            vec![true, false, true, false, true, false, true, false]
        );

        // Sparse subdivision: every slot is a main beat.
        let b = bar(4, 0.5);
        assert!(b.is_accent(0));
        assert!(b.is_accent(1));
    }

    #[test]
    fn wrap_position_after_shrink() {
        let mut t = Track::with_bars(0, vec![bar(4, 1.0), bar(4, 1.0)]);
        t.current_bar = 0;
        t.current_beat = 3;
        t.bars[0].beats = 2;
        t.wrap_position();
        assert_eq!(t.current_bar, 1);
        assert_eq!(t.current_beat, 0);
    }
}
