use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::track::Bar;
use crate::Result;

/// Everything worth keeping across sessions: the bar layout of every track
/// and the shared tempo. Positions and beat times are session-local and are
/// not part of the snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tempo: u32,
    pub tracks: Vec<Vec<Bar>>,
}

pub fn save<W: Write>(w: W, snapshot: &Snapshot) -> Result<()> {
    serde_json::to_writer_pretty(w, snapshot).map_err(Into::into)
}

pub fn load<R: Read>(r: R) -> Result<Snapshot> {
    serde_json::from_reader(r).map_err(Into::into)
}
