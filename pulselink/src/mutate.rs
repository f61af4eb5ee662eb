//! Structural and tempo edits applied to in-flight tracks. Every operation
//! computes the elapsed fraction of the current main beat before mutating,
//! then re-quantizes that phase onto the new grid, so an edit never drops or
//! replays time the listener has already heard.

use log::warn;

use crate::message::Message;
use crate::session::{SessionCore, TEMPO_MAX, TEMPO_MIN};
use crate::track::{Track, GRID_EPSILON};

// Fields of the reference track a new or re-homed track aligns against.
struct RefAlign {
    nbt: f64,
    bar: usize,
    beat: u32,
    subdivision: f64,
}

impl RefAlign {
    fn of(track: &Track) -> Option<RefAlign> {
        Some(RefAlign {
            nbt: track.next_beat_time?,
            bar: track.current_bar,
            beat: track.current_beat,
            subdivision: track.bar()?.subdivision,
        })
    }
}

// Place `track` on the reference's grid. On a main beat the position is
// copied outright; mid-subdivision the track starts at the reference's next
// main beat, so it always enters audibly on a main beat.
fn align_track(track: &mut Track, r: &RefAlign, spb: f64) {
    if track.bars.is_empty() {
        track.next_beat_time = None;
        return;
    }
    let sub_idx = (r.beat as f64).rem_euclid(r.subdivision);
    let main = (r.beat as f64 / r.subdivision).floor();
    track.current_bar = r.bar % track.bars.len();
    if sub_idx < GRID_EPSILON {
        track.next_beat_time = Some(r.nbt);
        place_at_main_beat(track, main);
    } else {
        let delay = (r.subdivision - sub_idx) * (spb / r.subdivision);
        track.next_beat_time = Some(r.nbt + delay);
        place_at_main_beat(track, main + 1.0);
    }
}

fn place_at_main_beat(track: &mut Track, main: f64) {
    let bar = &track.bars[track.current_bar];
    let beat = (main * bar.subdivision).round() as i64;
    if beat < 0 || beat >= bar.sub_beats() as i64 {
        track.current_beat = 0;
        track.current_bar = (track.current_bar + 1) % track.bars.len();
    } else {
        track.current_beat = beat as u32;
    }
}

impl SessionCore {
    /// Tempo change. While playing, every track's pending wait is scaled by
    /// `old/new`, which keeps the elapsed fraction of the current main beat
    /// and the relative phase across tracks numerically unchanged.
    pub(crate) fn set_tempo(&mut self, now: f64, bpm: u32) {
        let bpm = bpm.clamp(TEMPO_MIN, TEMPO_MAX);
        let old = self.session.tempo;
        if bpm == old {
            return;
        }
        self.session.tempo = bpm;
        if !self.session.playing {
            return;
        }
        let ratio = old as f64 / bpm as f64;
        for t in &mut self.tracks {
            if let Some(nbt) = t.next_beat_time {
                t.next_beat_time = Some(now + (nbt - now) * ratio);
            }
        }
    }

    /// Change one bar's subdivision. If that bar is currently playing, the
    /// in-flight position is re-quantized: the next sub-beat lands on the
    /// first new-grid slot at or after the elapsed phase, never before it.
    pub(crate) fn set_subdivision_for_bar(
        &mut self,
        track_id: u32,
        bar_index: usize,
        value: f64,
    ) -> bool {
        if value <= 0.0 {
            warn!(target: "pulselink", "rejecting subdivision {} for track {}", value, track_id);
            return false;
        }
        let playing = self.session.playing;
        let spb = self.session.seconds_per_main_beat();
        let track = match self.tracks.iter_mut().find(|t| t.id == track_id) {
            Some(t) => t,
            None => {
                warn!(target: "pulselink", "no such track {}", track_id);
                return false;
            }
        };
        let old = match track.bars.get(bar_index) {
            Some(b) => b.subdivision,
            None => {
                warn!(target: "pulselink", "track {} has no bar {}", track_id, bar_index);
                return false;
            }
        };
        if (old - value).abs() < GRID_EPSILON {
            return true;
        }
        track.bars[bar_index].subdivision = value;

        let nbt = match track.next_beat_time {
            Some(t) if playing && track.current_bar == bar_index => t,
            _ => {
                track.wrap_position();
                return true;
            }
        };

        // Elapsed main beats within the bar; `phase` is the fraction of the
        // current main beat already behind us.
        let elapsed = track.current_beat as f64 / old;
        let main = elapsed.floor();
        let phase = elapsed - main;
        let new_idx = (phase * value).ceil();

        let delay = if new_idx >= value {
            // The phase rounds up past the main-beat boundary.
            place_at_main_beat(track, main + 1.0);
            (1.0 - phase) * spb
        } else {
            track.current_beat = (main * value + new_idx).round() as u32;
            (new_idx / value - phase) * spb
        };
        track.next_beat_time = Some(nbt + delay);
        true
    }

    /// Change one bar's main-beat count. If the active bar shrinks past the
    /// current position, the track wraps to the next bar immediately rather
    /// than leaving an out-of-range index for the scheduler to trip on.
    pub(crate) fn set_beats_for_bar(&mut self, track_id: u32, bar_index: usize, beats: u32) -> bool {
        if beats == 0 {
            warn!(target: "pulselink", "rejecting zero beats for track {}", track_id);
            return false;
        }
        let track = match self.tracks.iter_mut().find(|t| t.id == track_id) {
            Some(t) => t,
            None => {
                warn!(target: "pulselink", "no such track {}", track_id);
                return false;
            }
        };
        match track.bars.get_mut(bar_index) {
            Some(b) => b.beats = beats,
            None => {
                warn!(target: "pulselink", "track {} has no bar {}", track_id, bar_index);
                return false;
            }
        }
        track.wrap_position();
        true
    }

    pub(crate) fn set_rests_for_bar(
        &mut self,
        track_id: u32,
        bar_index: usize,
        rests: std::collections::HashSet<u32>,
    ) -> bool {
        let track = match self.tracks.iter_mut().find(|t| t.id == track_id) {
            Some(t) => t,
            None => return false,
        };
        match track.bars.get_mut(bar_index) {
            Some(b) => {
                b.rests = rests;
                true
            }
            None => false,
        }
    }

    /// Grow or shrink a track's bar list. Growth repeats the last bar's
    /// settings. Truncation that removes the playing bar re-homes the track:
    /// onto another playing track's grid when one exists, else back to bar 0
    /// on its own schedule.
    pub(crate) fn set_bar_count(&mut self, track_id: u32, count: usize, out: &mut Vec<Message>) -> bool {
        let spb = self.session.seconds_per_main_beat();
        let playing = self.session.playing;
        let reference = self
            .tracks
            .iter()
            .find(|t| t.id != track_id && !t.bars.is_empty() && t.next_beat_time.is_some())
            .and_then(RefAlign::of);
        let track = match self.tracks.iter_mut().find(|t| t.id == track_id) {
            Some(t) => t,
            None => {
                warn!(target: "pulselink", "no such track {}", track_id);
                return false;
            }
        };

        if count > track.bars.len() {
            let template = track.bars.last().cloned().unwrap_or_default();
            track.bars.resize(count, template);
            return true;
        }

        let was_scheduled = track.next_beat_time.is_some();
        let removed_active = count <= track.current_bar;
        track.bars.truncate(count);

        if count == 0 {
            track.current_bar = 0;
            track.current_beat = 0;
            track.next_beat_time = None;
            if was_scheduled {
                out.push(Message::TrackStopped(track.id));
            }
            return true;
        }

        if removed_active {
            if playing && was_scheduled {
                match &reference {
                    Some(r) => align_track(track, r, spb),
                    None => {
                        track.current_bar = 0;
                        track.current_beat = 0;
                    }
                }
            } else {
                track.current_bar = 0;
                track.current_beat = 0;
            }
        } else {
            track.wrap_position();
        }
        true
    }

    /// Add a track. While playing it aligns to the reference track so its
    /// first audible event lands on a main beat; with nothing to align to it
    /// starts its own grid at `now`.
    pub(crate) fn add_track(&mut self, now: f64, out: &mut Vec<Message>) -> u32 {
        let id = self.next_track_id;
        self.next_track_id += 1;
        let mut track = Track::new(id);
        if self.session.playing {
            match self.reference_track().and_then(RefAlign::of) {
                Some(r) => align_track(&mut track, &r, self.session.seconds_per_main_beat()),
                None => track.next_beat_time = Some(now),
            }
        }
        self.tracks.push(track);
        out.push(Message::TrackAdded(id));
        id
    }

    pub(crate) fn remove_track(&mut self, track_id: u32, out: &mut Vec<Message>) -> bool {
        let before = self.tracks.len();
        self.tracks.retain(|t| t.id != track_id);
        if self.tracks.len() == before {
            warn!(target: "pulselink", "no such track {}", track_id);
            return false;
        }
        out.push(Message::TrackRemoved(track_id));
        true
    }
}
