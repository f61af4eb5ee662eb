use std::time::Duration;

use log::warn;

use crate::message::{Fire, Message};
use crate::session::SessionCore;

/// How far past the audio clock each pass schedules.
pub(crate) const LOOKAHEAD: f64 = 0.1;

/// Pass period. Must stay well under LOOKAHEAD so scheduling survives timer
/// jitter.
pub(crate) const TICK_PERIOD: Duration = Duration::from_millis(25);

// A track this far behind the clock (e.g. after the process was suspended)
// rejoins the clock instead of replaying every missed sub-beat.
const STALL_LIMIT: f64 = 1.0;

impl SessionCore {
    /// One lookahead pass: emit every sub-beat due before `now + LOOKAHEAD`
    /// and advance the tracks past them.
    pub(crate) fn schedule_pass(&mut self, now: f64, out: &mut Vec<Message>) {
        if !self.session.playing {
            return;
        }
        let spb = self.session.seconds_per_main_beat();

        for track in &mut self.tracks {
            if track.bars.is_empty() {
                continue;
            }
            if let Some(nbt) = track.next_beat_time {
                if now - nbt > STALL_LIMIT {
                    warn!(
                        target: "pulselink",
                        "track {} is {:.2}s behind, rejoining clock",
                        track.id,
                        now - nbt
                    );
                    track.next_beat_time = Some(now);
                }
            }

            loop {
                let nbt = match track.next_beat_time {
                    Some(t) if t < now + LOOKAHEAD => t,
                    _ => break,
                };
                let (accent, rest, interval) = match track.bar() {
                    Some(bar) => (
                        bar.is_accent(track.current_beat),
                        bar.is_rest(track.current_beat),
                        bar.sub_interval(spb),
                    ),
                    None => {
                        track.next_beat_time = None;
                        out.push(Message::TrackStopped(track.id));
                        break;
                    }
                };
                out.push(Message::Fire(Fire {
                    track: track.id,
                    bar: track.current_bar,
                    beat: track.current_beat,
                    at: nbt,
                    accent,
                    rest,
                }));
                // The interval just completed belongs to the pre-advance bar.
                if !track.advance() {
                    track.next_beat_time = None;
                    out.push(Message::TrackStopped(track.id));
                    break;
                }
                track.next_beat_time = Some(nbt + interval);
            }
        }
    }
}
