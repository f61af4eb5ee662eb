use std::time::Duration;

use log::{debug, info, warn};
use strum::Display;

use crate::clock::Clock;
use crate::message::Message;
use crate::offset::{OffsetWindow, BURST_COUNT, BURST_SPACING, STEADY_PERIOD};
use crate::proto::Envelope;
use crate::session::SessionCore;
use crate::Dest;

/// Lead between a local play command on the host and the first beat, giving
/// peers time to receive the schedule.
pub(crate) const PLAY_LEAD: f64 = 0.2;

/// Pulse broadcast period while the host is playing.
pub(crate) const PULSE_PERIOD: Duration = Duration::from_secs(2);

// A single pulse correction never exceeds this fraction of a sub-beat
// interval, whatever the configured cap.
const NUDGE_SUB_BEAT_FRACTION: f64 = 0.1;

#[derive(Clone, Debug, PartialEq, Display)]
pub enum SyncState {
    Idle,
    AwaitingResponse,
    ScheduledToStart {
        target_wall_ms: f64,
        bar: usize,
        beat: u32,
    },
    Playing,
}

/// Side effects a protocol handler wants performed: envelopes to put on the
/// wire and messages for the local consumer. The engine task flushes both
/// after the handler returns.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub wire: Vec<(Dest, Envelope)>,
    pub events: Vec<Message>,
}

/// One side of the playback-synchronization protocol. The host runs
/// [`Authority`] (answers, broadcasts); every other device runs
/// [`Follower`] (estimates offset, converges on the host).
pub(crate) trait Role: Send {
    fn on_connected(&mut self, core: &mut SessionCore, clock: &dyn Clock, peer: u8, fx: &mut Effects);
    fn on_disconnected(&mut self, core: &mut SessionCore, peer: u8);
    fn on_message(
        &mut self,
        core: &mut SessionCore,
        clock: &dyn Clock,
        peer: u8,
        env: Envelope,
        fx: &mut Effects,
    );
    /// Periodic duty while peers are attached: pulse broadcast for the
    /// authority, offset pings for a follower.
    fn on_beacon(&mut self, core: &mut SessionCore, clock: &dyn Clock, fx: &mut Effects);
    fn beacon_period(&self) -> Duration;
    /// Runs right before every scheduler pass.
    fn on_pass(&mut self, core: &mut SessionCore, clock: &dyn Clock, fx: &mut Effects);
    fn on_local_play(&mut self, core: &mut SessionCore, clock: &dyn Clock, fx: &mut Effects);
    fn on_local_stop(&mut self, core: &mut SessionCore, fx: &mut Effects);
}

pub(crate) struct Authority;

impl Authority {
    /// Playback position translated to the host wall clock:
    /// `wall_now + (next_beat_audio - audio_now) * 1000`.
    fn sync_tuple(core: &SessionCore, clock: &dyn Clock) -> (bool, Option<f64>, usize, u32) {
        if !core.session.playing {
            return (false, None, 0, 0);
        }
        match core.sync_position() {
            Some((nbt, bar, beat)) => {
                let wall = clock.wall_now_ms() + (nbt - clock.audio_now()) * 1000.0;
                (true, Some(wall), bar, beat)
            }
            None => (false, None, 0, 0),
        }
    }
}

impl Role for Authority {
    fn on_connected(&mut self, _core: &mut SessionCore, _clock: &dyn Clock, peer: u8, _fx: &mut Effects) {
        // Peers pull state with a request; nothing to push eagerly.
        info!(target: "pulselink", "peer {} attached", peer);
    }

    fn on_disconnected(&mut self, _core: &mut SessionCore, peer: u8) {
        info!(target: "pulselink", "peer {} detached", peer);
    }

    fn on_message(
        &mut self,
        core: &mut SessionCore,
        clock: &dyn Clock,
        peer: u8,
        env: Envelope,
        fx: &mut Effects,
    ) {
        match env {
            Envelope::TimeSync { t0 } => {
                fx.wire.push((
                    Dest::Peer(peer),
                    Envelope::TimeSyncResponse {
                        t0,
                        t1: clock.wall_now_ms(),
                    },
                ));
            }
            Envelope::PlaybackSyncRequest => {
                let (is_playing, wall, bar, beat) = Self::sync_tuple(core, clock);
                fx.wire.push((
                    Dest::Peer(peer),
                    Envelope::PlaybackSyncResponse {
                        is_playing,
                        host_next_beat_wall_time: wall,
                        current_bar: bar,
                        current_beat: beat,
                    },
                ));
            }
            other => {
                debug!(target: "pulselink", "host ignoring {:?} from peer {}", other, peer);
            }
        }
    }

    fn on_beacon(&mut self, core: &mut SessionCore, clock: &dyn Clock, fx: &mut Effects) {
        if let (true, Some(wall), bar, beat) = Self::sync_tuple(core, clock) {
            fx.wire.push((
                Dest::All,
                Envelope::PlaybackSyncPulse {
                    host_next_beat_wall_time: wall,
                    current_bar: bar,
                    current_beat: beat,
                },
            ));
        }
    }

    fn beacon_period(&self) -> Duration {
        PULSE_PERIOD
    }

    fn on_pass(&mut self, _core: &mut SessionCore, _clock: &dyn Clock, _fx: &mut Effects) {}

    fn on_local_play(&mut self, core: &mut SessionCore, clock: &dyn Clock, fx: &mut Effects) {
        core.start_all(clock.audio_now() + PLAY_LEAD);
        fx.wire.push((
            Dest::All,
            Envelope::PlayScheduled {
                scheduled_start_wall_time: clock.wall_now_ms() + PLAY_LEAD * 1000.0,
            },
        ));
        fx.events.push(Message::Started);
    }

    fn on_local_stop(&mut self, core: &mut SessionCore, fx: &mut Effects) {
        core.stop_all();
        fx.wire.push((Dest::All, Envelope::StopSync));
        fx.events.push(Message::Stopped);
    }
}

pub(crate) struct Follower {
    state: SyncState,
    window: OffsetWindow,
    burst_left: u32,
    /// Audio-clock time the scheduled start lands on, kept alongside the
    /// wall target so the transition uses the same clock the scheduler does.
    pending_start_audio: Option<f64>,
    max_correction: f64,
}

impl Follower {
    pub(crate) fn new(max_correction: f64) -> Follower {
        Follower {
            state: SyncState::Idle,
            window: OffsetWindow::new(),
            burst_left: 0,
            pending_start_audio: None,
            max_correction: max_correction.max(0.0),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &SyncState {
        &self.state
    }

    fn offset(&self) -> Option<f64> {
        self.window.best()
    }

    /// Convert a host wall-clock target into the local timeline and point
    /// every track at it. With no offset sample yet the wall clocks are
    /// taken at face value; the first steady pulse corrects the residue.
    fn schedule(
        &mut self,
        core: &mut SessionCore,
        clock: &dyn Clock,
        host_wall_ms: f64,
        bar: usize,
        beat: u32,
        fx: &mut Effects,
    ) {
        let offset = self.offset().unwrap_or(0.0);
        let target_wall_ms = host_wall_ms - offset;
        let mut delta = (target_wall_ms - clock.wall_now_ms()) / 1000.0;
        if delta < 0.0 {
            // Target already passed (late join or a slow request); start at
            // the given position now and let pulses trim the residual error.
            debug!(
                target: "pulselink",
                "sync target {:.0}ms in the past, starting immediately",
                -delta * 1000.0
            );
            delta = 0.0;
        }
        let at = clock.audio_now() + delta;
        core.start_synced(at, bar, beat);
        self.pending_start_audio = Some(at);
        debug!(
            target: "pulselink",
            "{} -> ScheduledToStart at bar {} beat {}, {:.0}ms out",
            self.state, bar, beat, delta * 1000.0
        );
        self.state = SyncState::ScheduledToStart {
            target_wall_ms,
            bar,
            beat,
        };
        fx.events.push(Message::SyncScheduled { target_wall_ms });
    }

    /// Drift correction from a pulse while playing: move toward the
    /// host-implied beat time, at most `max_correction` (and never more
    /// than a tenth of a sub-beat) per step. A pulse more than a main beat
    /// out is a desync, not jitter, and reschedules outright.
    fn nudge(
        &mut self,
        core: &mut SessionCore,
        clock: &dyn Clock,
        host_wall_ms: f64,
        bar: usize,
        beat: u32,
        fx: &mut Effects,
    ) {
        let offset = match self.offset() {
            Some(o) => o,
            None => return,
        };
        let implied = clock.audio_now() + (host_wall_ms - offset - clock.wall_now_ms()) / 1000.0;
        let nbt = match core.sync_position() {
            Some((nbt, _, _)) => nbt,
            None => return,
        };
        let drift = implied - nbt;
        if drift.abs() > core.session.seconds_per_main_beat() {
            warn!(
                target: "pulselink",
                "{:.0}ms out of phase with host, rescheduling",
                drift * 1000.0
            );
            self.schedule(core, clock, host_wall_ms, bar, beat, fx);
            return;
        }
        let mut cap = self.max_correction;
        if let Some(interval) = core.reference_sub_interval() {
            cap = cap.min(interval * NUDGE_SUB_BEAT_FRACTION);
        }
        core.shift_all(drift.clamp(-cap, cap));
    }

    fn force_stop(&mut self, core: &mut SessionCore, fx: &mut Effects) {
        let was_active = core.session.playing || self.pending_start_audio.is_some();
        core.stop_all();
        self.pending_start_audio = None;
        self.state = SyncState::Idle;
        if was_active {
            fx.events.push(Message::Stopped);
        }
    }
}

impl Role for Follower {
    fn on_connected(&mut self, core: &mut SessionCore, clock: &dyn Clock, peer: u8, fx: &mut Effects) {
        info!(target: "pulselink", "connected to host {}", peer);
        self.window.clear();
        self.burst_left = BURST_COUNT.saturating_sub(1);
        // First ping goes out immediately; the beacon keeps the burst going.
        fx.wire.push((
            Dest::Peer(peer),
            Envelope::TimeSync {
                t0: clock.wall_now_ms(),
            },
        ));
        // One outstanding request at a time.
        if self.state != SyncState::AwaitingResponse {
            fx.wire.push((Dest::Peer(peer), Envelope::PlaybackSyncRequest));
            if !core.session.playing {
                self.state = SyncState::AwaitingResponse;
            }
        }
    }

    fn on_disconnected(&mut self, _core: &mut SessionCore, peer: u8) {
        info!(target: "pulselink", "lost host {}", peer);
        // The window belongs to that peer; a reconnect starts fresh.
        self.window.clear();
        self.burst_left = 0;
        if self.state == SyncState::AwaitingResponse {
            self.state = SyncState::Idle;
        }
    }

    fn on_message(
        &mut self,
        core: &mut SessionCore,
        clock: &dyn Clock,
        _peer: u8,
        env: Envelope,
        fx: &mut Effects,
    ) {
        match env {
            Envelope::TimeSyncResponse { t0, t1 } => {
                let s = self.window.record(t0, t1, clock.wall_now_ms());
                debug!(
                    target: "pulselink",
                    "offset sample {:.1}ms (rtt {:.1}ms)", s.offset_ms, s.rtt_ms
                );
            }
            Envelope::PlaybackSyncResponse {
                is_playing,
                host_next_beat_wall_time,
                current_bar,
                current_beat,
            } => {
                if is_playing {
                    if let Some(wall) = host_next_beat_wall_time {
                        self.schedule(core, clock, wall, current_bar, current_beat, fx);
                    }
                } else {
                    if self.state == SyncState::Idle && !core.session.playing {
                        // Stopped on both ends: nothing to do.
                        return;
                    }
                    info!(target: "pulselink", "host is stopped, stopping locally");
                    self.force_stop(core, fx);
                }
            }
            Envelope::PlaybackSyncPulse {
                host_next_beat_wall_time,
                current_bar,
                current_beat,
            } => match self.state {
                SyncState::Playing => self.nudge(
                    core,
                    clock,
                    host_next_beat_wall_time,
                    current_bar,
                    current_beat,
                    fx,
                ),
                // Not playing yet: a pulse carries everything a response
                // does, and the latest information wins.
                _ => self.schedule(
                    core,
                    clock,
                    host_next_beat_wall_time,
                    current_bar,
                    current_beat,
                    fx,
                ),
            },
            Envelope::PlayScheduled {
                scheduled_start_wall_time,
            } => {
                self.schedule(core, clock, scheduled_start_wall_time, 0, 0, fx);
            }
            Envelope::StopSync => {
                self.force_stop(core, fx);
            }
            other => {
                debug!(target: "pulselink", "follower ignoring {:?}", other);
            }
        }
    }

    fn on_beacon(&mut self, _core: &mut SessionCore, clock: &dyn Clock, fx: &mut Effects) {
        fx.wire.push((
            Dest::All,
            Envelope::TimeSync {
                t0: clock.wall_now_ms(),
            },
        ));
        self.burst_left = self.burst_left.saturating_sub(1);
    }

    fn beacon_period(&self) -> Duration {
        if self.burst_left > 0 {
            BURST_SPACING
        } else {
            STEADY_PERIOD
        }
    }

    fn on_pass(&mut self, _core: &mut SessionCore, clock: &dyn Clock, fx: &mut Effects) {
        if let Some(at) = self.pending_start_audio {
            if clock.audio_now() >= at {
                self.pending_start_audio = None;
                self.state = SyncState::Playing;
                fx.events.push(Message::Started);
            }
        }
    }

    fn on_local_play(&mut self, core: &mut SessionCore, clock: &dyn Clock, fx: &mut Effects) {
        core.start_all(clock.audio_now() + PLAY_LEAD);
        self.pending_start_audio = None;
        self.state = SyncState::Playing;
        fx.events.push(Message::Started);
    }

    fn on_local_stop(&mut self, core: &mut SessionCore, fx: &mut Effects) {
        core.stop_all();
        self.pending_start_audio = None;
        self.state = SyncState::Idle;
        fx.events.push(Message::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test::TestClock;

    fn wire(fx: &Effects) -> &[(Dest, Envelope)] {
        &fx.wire
    }

    fn follower_with_offset(offset_ms: f64) -> Follower {
        let mut f = Follower::new(0.005);
        // One clean zero-rtt sample: offset = t1 - t0.
        f.window.record(0.0, offset_ms, 0.0);
        f
    }

    #[test]
    fn authority_echoes_time_sync() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut auth = Authority;
        let mut fx = Effects::default();
        auth.on_message(&mut core, &clock, 3, Envelope::TimeSync { t0: 99_990.0 }, &mut fx);
        assert_eq!(
            wire(&fx),
            &[(
                Dest::Peer(3),
                Envelope::TimeSyncResponse {
                    t0: 99_990.0,
                    t1: 100_000.0,
                }
            )]
        );
    }

    #[test]
    fn authority_response_translates_beat_time_to_wall_clock() {
        let mut core = SessionCore::new(120);
        core.start_all(5.4); // next beat 0.4s past audio-now
        let clock = TestClock::new(5.0, 100_000.0);
        let mut auth = Authority;
        let mut fx = Effects::default();
        auth.on_message(&mut core, &clock, 1, Envelope::PlaybackSyncRequest, &mut fx);
        match &fx.wire[0].1 {
            Envelope::PlaybackSyncResponse {
                is_playing,
                host_next_beat_wall_time,
                ..
            } => {
                assert!(is_playing);
                assert!((host_next_beat_wall_time.unwrap() - 100_400.0).abs() < 1e-9);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn authority_reports_stopped_when_idle() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut auth = Authority;
        let mut fx = Effects::default();
        auth.on_message(&mut core, &clock, 1, Envelope::PlaybackSyncRequest, &mut fx);
        assert_eq!(
            wire(&fx),
            &[(
                Dest::Peer(1),
                Envelope::PlaybackSyncResponse {
                    is_playing: false,
                    host_next_beat_wall_time: None,
                    current_bar: 0,
                    current_beat: 0,
                }
            )]
        );
    }

    #[test]
    fn authority_pulses_only_while_playing() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut auth = Authority;
        let mut fx = Effects::default();
        auth.on_beacon(&mut core, &clock, &mut fx);
        assert!(fx.wire.is_empty());

        core.start_all(5.5);
        auth.on_beacon(&mut core, &clock, &mut fx);
        assert!(matches!(
            fx.wire[0],
            (Dest::All, Envelope::PlaybackSyncPulse { .. })
        ));
    }

    #[test]
    fn follower_schedules_through_its_offset() {
        let mut core = SessionCore::new(120);
        core.tracks[0].bars.push(Default::default());
        let clock = TestClock::new(5.0, 100_000.0);
        // Host clock runs 250ms ahead of ours.
        let mut f = follower_with_offset(250.0);
        let mut fx = Effects::default();
        // Host says its next beat is at host-wall 101_000.
        f.on_message(
            &mut core,
            &clock,
            0,
            Envelope::PlaybackSyncResponse {
                is_playing: true,
                host_next_beat_wall_time: Some(101_000.0),
                current_bar: 1,
                current_beat: 2,
            },
            &mut fx,
        );
        // Local target 100_750 -> 0.75s out -> audio 5.75.
        let t = &core.tracks[0];
        assert!((t.next_beat_time.unwrap() - 5.75).abs() < 1e-9);
        assert_eq!(t.current_bar, 1);
        assert_eq!(t.current_beat, 2);
        assert!(core.session.playing);
        assert!(matches!(
            f.state(),
            SyncState::ScheduledToStart { bar: 1, beat: 2, .. }
        ));
        assert!(fx
            .events
            .iter()
            .any(|m| matches!(m, Message::SyncScheduled { .. })));
    }

    #[test]
    fn follower_reaches_playing_when_the_start_arrives() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut f = follower_with_offset(0.0);
        let mut fx = Effects::default();
        f.on_message(
            &mut core,
            &clock,
            0,
            Envelope::PlayScheduled {
                scheduled_start_wall_time: 100_200.0,
            },
            &mut fx,
        );
        f.on_pass(&mut core, &clock, &mut fx);
        assert!(matches!(f.state(), SyncState::ScheduledToStart { .. }));

        clock.advance(0.25);
        f.on_pass(&mut core, &clock, &mut fx);
        assert_eq!(*f.state(), SyncState::Playing);
        assert!(fx.events.contains(&Message::Started));
    }

    #[test]
    fn stopped_response_on_stopped_peer_is_a_no_op() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut f = Follower::new(0.005);
        let mut fx = Effects::default();
        f.on_message(
            &mut core,
            &clock,
            0,
            Envelope::PlaybackSyncResponse {
                is_playing: false,
                host_next_beat_wall_time: None,
                current_bar: 0,
                current_beat: 0,
            },
            &mut fx,
        );
        assert_eq!(*f.state(), SyncState::Idle);
        assert!(fx.events.is_empty());
        assert!(core.tracks[0].next_beat_time.is_none());
    }

    #[test]
    fn stopped_response_forces_a_playing_peer_to_stop() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut f = Follower::new(0.005);
        let mut fx = Effects::default();
        f.on_local_play(&mut core, &clock, &mut fx);
        fx.events.clear();
        f.on_message(
            &mut core,
            &clock,
            0,
            Envelope::PlaybackSyncResponse {
                is_playing: false,
                host_next_beat_wall_time: None,
                current_bar: 0,
                current_beat: 0,
            },
            &mut fx,
        );
        assert_eq!(*f.state(), SyncState::Idle);
        assert!(!core.session.playing);
        assert!(fx.events.contains(&Message::Stopped));
    }

    #[test]
    fn pulse_nudges_no_more_than_the_cap() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut f = follower_with_offset(0.0);
        let mut fx = Effects::default();
        f.on_local_play(&mut core, &clock, &mut fx);
        let before = core.tracks[0].next_beat_time.unwrap();

        // Host implies the beat lands 50ms later than we have it.
        let host_wall = 100_000.0 + (before - 5.0) * 1000.0 + 50.0;
        f.on_message(
            &mut core,
            &clock,
            0,
            Envelope::PlaybackSyncPulse {
                host_next_beat_wall_time: host_wall,
                current_bar: 0,
                current_beat: 0,
            },
            &mut fx,
        );
        let after = core.tracks[0].next_beat_time.unwrap();
        assert!((after - before - 0.005).abs() < 1e-9);
    }

    #[test]
    fn pulse_without_samples_applies_no_correction() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut f = Follower::new(0.005);
        let mut fx = Effects::default();
        f.on_local_play(&mut core, &clock, &mut fx);
        let before = core.tracks[0].next_beat_time.unwrap();
        f.on_message(
            &mut core,
            &clock,
            0,
            Envelope::PlaybackSyncPulse {
                host_next_beat_wall_time: 100_950.0,
                current_bar: 0,
                current_beat: 0,
            },
            &mut fx,
        );
        assert_eq!(core.tracks[0].next_beat_time, Some(before));
    }

    #[test]
    fn pulse_far_out_of_phase_reschedules() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut f = follower_with_offset(0.0);
        let mut fx = Effects::default();
        f.on_local_play(&mut core, &clock, &mut fx);

        // Two seconds off: beyond a main beat, so no nudge can close it.
        f.on_message(
            &mut core,
            &clock,
            0,
            Envelope::PlaybackSyncPulse {
                host_next_beat_wall_time: 102_200.0,
                current_bar: 3,
                current_beat: 0,
            },
            &mut fx,
        );
        assert!(matches!(f.state(), SyncState::ScheduledToStart { .. }));
        assert!((core.tracks[0].next_beat_time.unwrap() - 7.2).abs() < 1e-9);
    }

    #[test]
    fn pulse_while_awaiting_schedules_directly() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(5.0, 100_000.0);
        let mut f = follower_with_offset(0.0);
        let mut fx = Effects::default();
        f.on_connected(&mut core, &clock, 0, &mut fx);
        assert_eq!(*f.state(), SyncState::AwaitingResponse);
        f.on_message(
            &mut core,
            &clock,
            0,
            Envelope::PlaybackSyncPulse {
                host_next_beat_wall_time: 100_500.0,
                current_bar: 0,
                current_beat: 1,
            },
            &mut fx,
        );
        assert!(matches!(f.state(), SyncState::ScheduledToStart { .. }));
    }

    #[test]
    fn stop_sync_stops_from_any_state() {
        let clock = TestClock::new(5.0, 100_000.0);
        for playing in [false, true].iter() {
            let mut core = SessionCore::new(120);
            let mut f = Follower::new(0.005);
            let mut fx = Effects::default();
            if *playing {
                f.on_local_play(&mut core, &clock, &mut fx);
            }
            f.on_message(&mut core, &clock, 0, Envelope::StopSync, &mut fx);
            assert_eq!(*f.state(), SyncState::Idle);
            assert!(!core.session.playing);
        }
    }

    #[test]
    fn burst_then_steady_ping_cadence() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(0.0, 0.0);
        let mut f = Follower::new(0.005);
        let mut fx = Effects::default();
        f.on_connected(&mut core, &clock, 0, &mut fx);
        // First ping went out on connect.
        assert!(matches!(fx.wire[0], (_, Envelope::TimeSync { .. })));
        let mut beacons = 0;
        while f.beacon_period() == BURST_SPACING {
            f.on_beacon(&mut core, &clock, &mut fx);
            beacons += 1;
            assert!(beacons <= BURST_COUNT);
        }
        assert_eq!(beacons, BURST_COUNT - 1);
        assert_eq!(f.beacon_period(), STEADY_PERIOD);
    }

    #[test]
    fn request_is_not_repeated_while_outstanding() {
        let mut core = SessionCore::new(120);
        let clock = TestClock::new(0.0, 0.0);
        let mut f = Follower::new(0.005);
        let mut fx = Effects::default();
        f.on_connected(&mut core, &clock, 0, &mut fx);
        let requests = |fx: &Effects| {
            fx.wire
                .iter()
                .filter(|(_, e)| matches!(e, Envelope::PlaybackSyncRequest))
                .count()
        };
        assert_eq!(requests(&fx), 1);
        // Reconnect before any response: still just the one outstanding.
        f.on_connected(&mut core, &clock, 0, &mut fx);
        assert_eq!(requests(&fx), 1);
    }
}
