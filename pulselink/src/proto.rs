use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Messages crossing the peer channel. The transport hands over an
/// established, reliable, ordered channel; everything on it is one of these
/// envelopes as a JSON object tagged by `type`. Wall-clock fields are
/// milliseconds since the unix epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// Peer -> host: offset ping carrying the sender's send time.
    TimeSync { t0: f64 },
    /// Host -> peer: immediate reply, echoing `t0` and stamping host time.
    TimeSyncResponse { t0: f64, t1: f64 },
    /// Peer -> host: where is playback right now?
    PlaybackSyncRequest,
    #[serde(rename_all = "camelCase")]
    PlaybackSyncResponse {
        is_playing: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host_next_beat_wall_time: Option<f64>,
        current_bar: usize,
        current_beat: u32,
    },
    /// Host -> peers: periodic drift-correction pulse while playing.
    #[serde(rename_all = "camelCase")]
    PlaybackSyncPulse {
        host_next_beat_wall_time: f64,
        current_bar: usize,
        current_beat: u32,
    },
    /// Host -> peers: playback starts at this wall time.
    #[serde(rename_all = "camelCase")]
    PlayScheduled { scheduled_start_wall_time: f64 },
    /// Host -> peers: stop immediately, regardless of local state.
    StopSync,
}

impl Envelope {
    pub fn parse(data: &str) -> Result<Envelope> {
        serde_json::from_str(data).map_err(|e| anyhow!("error parsing envelope: {}", e).into())
    }

    pub fn write(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}
