use crate::persist::Snapshot;
use crate::track::Track;

pub const TEMPO_MIN: u32 = 20;
pub const TEMPO_MAX: u32 = 300;

/// Shared playback state for all tracks on one device. Always passed
/// explicitly; there is no global tempo.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSession {
    pub tempo: u32,
    pub playing: bool,
}

impl PlaybackSession {
    pub fn new(tempo: u32) -> PlaybackSession {
        PlaybackSession {
            tempo: tempo.clamp(TEMPO_MIN, TEMPO_MAX),
            playing: false,
        }
    }

    pub fn seconds_per_main_beat(&self) -> f64 {
        60.0 / self.tempo as f64
    }
}

/// The device-local whole: session flags plus every track. All scheduler,
/// mutation and sync operations go through here, from a single task, so no
/// pass ever observes a half-applied edit.
pub(crate) struct SessionCore {
    pub session: PlaybackSession,
    pub tracks: Vec<Track>,
    pub(crate) next_track_id: u32,
}

impl SessionCore {
    pub(crate) fn new(tempo: u32) -> SessionCore {
        SessionCore {
            session: PlaybackSession::new(tempo),
            tracks: vec![Track::new(0)],
            next_track_id: 1,
        }
    }

    pub(crate) fn track_mut(&mut self, id: u32) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// The track other tracks align to: the lowest-id scheduled track with
    /// a non-empty bar list.
    pub(crate) fn reference_track(&self) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|t| !t.bars.is_empty() && t.next_beat_time.is_some())
    }

    /// Sub-beat interval of the reference track's current bar.
    pub(crate) fn reference_sub_interval(&self) -> Option<f64> {
        let spb = self.session.seconds_per_main_beat();
        self.reference_track()
            .and_then(|t| t.bar())
            .map(|b| b.sub_interval(spb))
    }

    /// Pending position of the reference track: (next beat audio time,
    /// bar, beat).
    pub(crate) fn sync_position(&self) -> Option<(f64, usize, u32)> {
        let t = self.reference_track()?;
        let nbt = t.next_beat_time?;
        Some((nbt, t.current_bar, t.current_beat))
    }

    /// Begin playback from the top of every track at audio time `at`.
    pub(crate) fn start_all(&mut self, at: f64) {
        self.session.playing = true;
        for t in &mut self.tracks {
            if t.bars.is_empty() {
                t.next_beat_time = None;
                continue;
            }
            t.current_bar = 0;
            t.current_beat = 0;
            t.next_beat_time = Some(at);
        }
    }

    /// Begin playback at audio time `at` with every track placed at the
    /// given position, wrapped into each track's own bar range.
    pub(crate) fn start_synced(&mut self, at: f64, bar: usize, beat: u32) {
        self.session.playing = true;
        for t in &mut self.tracks {
            if t.bars.is_empty() {
                t.next_beat_time = None;
                continue;
            }
            t.current_bar = bar % t.bars.len();
            t.current_beat = if beat < t.bars[t.current_bar].sub_beats() {
                beat
            } else {
                0
            };
            t.next_beat_time = Some(at);
        }
    }

    /// Stop everything. Every pending beat time is invalidated so no stale
    /// event can fire on a later pass.
    pub(crate) fn stop_all(&mut self) {
        self.session.playing = false;
        for t in &mut self.tracks {
            t.next_beat_time = None;
        }
    }

    /// Shift every scheduled track by `delta` seconds, keeping relative
    /// phase between tracks intact.
    pub(crate) fn shift_all(&mut self, delta: f64) {
        for t in &mut self.tracks {
            if let Some(nbt) = t.next_beat_time {
                t.next_beat_time = Some(nbt + delta);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            tempo: self.session.tempo,
            tracks: self.tracks.iter().map(|t| t.bars.clone()).collect(),
        }
    }

    /// Replace the track set from a snapshot. Playback stops: positions are
    /// session-local and the restored bar lists invalidate them.
    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        self.stop_all();
        self.session.tempo = snapshot.tempo.clamp(TEMPO_MIN, TEMPO_MAX);
        self.tracks = snapshot
            .tracks
            .into_iter()
            .enumerate()
            .map(|(i, bars)| Track::with_bars(i as u32, bars))
            .collect();
        self.next_track_id = self.tracks.len() as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Bar;

    #[test]
    fn tempo_is_clamped() {
        assert_eq!(PlaybackSession::new(5).tempo, TEMPO_MIN);
        assert_eq!(PlaybackSession::new(1000).tempo, TEMPO_MAX);
        assert_eq!(PlaybackSession::new(120).tempo, 120);
    }

    #[test]
    fn seconds_per_main_beat() {
        assert!((PlaybackSession::new(120).seconds_per_main_beat() - 0.5).abs() < 1e-12);
        assert!((PlaybackSession::new(60).seconds_per_main_beat() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stop_invalidates_all_beat_times() {
        let mut core = SessionCore::new(120);
        core.start_all(1.0);
        assert!(core.tracks[0].next_beat_time.is_some());
        core.stop_all();
        assert!(!core.session.playing);
        assert!(core.tracks.iter().all(|t| t.next_beat_time.is_none()));
    }

    #[test]
    fn start_synced_wraps_out_of_range_position() {
        let mut core = SessionCore::new(120);
        core.tracks[0].bars = vec![Bar::default(), Bar::default()];
        core.start_synced(2.0, 5, 17);
        let t = &core.tracks[0];
        assert_eq!(t.current_bar, 1);
        assert_eq!(t.current_beat, 0);
        assert_eq!(t.next_beat_time, Some(2.0));
    }

    #[test]
    fn restore_stops_and_replaces_tracks() {
        let mut core = SessionCore::new(120);
        core.start_all(0.0);
        let snapshot = Snapshot {
            tempo: 90,
            tracks: vec![vec![Bar::default()], vec![Bar::default(), Bar::default()]],
        };
        core.restore(snapshot);
        assert!(!core.session.playing);
        assert_eq!(core.session.tempo, 90);
        assert_eq!(core.tracks.len(), 2);
        assert_eq!(core.tracks[1].bars.len(), 2);
        assert_eq!(core.next_track_id, 2);
    }
}
