/// One scheduled sub-beat, emitted ahead of its audible time. Consumers
/// trigger sound at `at` on their own audio clock and must not block.
#[derive(Clone, Debug, PartialEq)]
pub struct Fire {
    pub track: u32,
    pub bar: usize,
    pub beat: u32,
    /// Audio-clock time this sub-beat is due.
    pub at: f64,
    /// The sub-beat falls on a main beat.
    pub accent: bool,
    /// The sub-beat is marked silent in its bar.
    pub rest: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Fire(Fire),
    /// Local playback became active (local play, or a scheduled sync start
    /// was reached).
    Started,
    /// Local playback stopped, whether locally or forced by the host.
    Stopped,
    /// A sync target was accepted; playback will begin at the given local
    /// wall time.
    SyncScheduled { target_wall_ms: f64 },
    TrackAdded(u32),
    TrackRemoved(u32),
    /// A track's bar list emptied out mid-flight and it left the schedule.
    TrackStopped(u32),
    PeerJoined(u8),
    PeerLeft(u8),
}
