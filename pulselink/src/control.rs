use std::collections::HashSet;

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};

use crate::persist::Snapshot;
use crate::Result;

/// Mutation inputs, applied by the engine task between scheduler passes so
/// a pass never observes a half-applied edit.
#[derive(Debug)]
pub enum Command {
    Play,
    Stop,
    SetTempo(u32),
    AddTrack,
    RemoveTrack(u32),
    SetBarCount {
        track: u32,
        count: usize,
    },
    SetBeatsForBar {
        track: u32,
        bar: usize,
        beats: u32,
    },
    SetSubdivisionForBar {
        track: u32,
        bar: usize,
        subdivision: f64,
    },
    SetRestsForBar {
        track: u32,
        bar: usize,
        rests: HashSet<u32>,
    },
    Snapshot(oneshot::Sender<Snapshot>),
    Restore(Snapshot),
}

/// Cloneable handle for feeding commands to a running engine.
#[derive(Clone)]
pub struct Controller {
    tx: mpsc::Sender<Command>,
}

impl Controller {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Controller {
        Controller { tx }
    }

    pub async fn play(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    pub async fn set_tempo(&self, bpm: u32) -> Result<()> {
        self.send(Command::SetTempo(bpm)).await
    }

    pub async fn add_track(&self) -> Result<()> {
        self.send(Command::AddTrack).await
    }

    pub async fn remove_track(&self, track: u32) -> Result<()> {
        self.send(Command::RemoveTrack(track)).await
    }

    pub async fn set_bar_count(&self, track: u32, count: usize) -> Result<()> {
        self.send(Command::SetBarCount { track, count }).await
    }

    pub async fn set_beats_for_bar(&self, track: u32, bar: usize, beats: u32) -> Result<()> {
        self.send(Command::SetBeatsForBar { track, bar, beats }).await
    }

    pub async fn set_subdivision_for_bar(
        &self,
        track: u32,
        bar: usize,
        subdivision: f64,
    ) -> Result<()> {
        self.send(Command::SetSubdivisionForBar {
            track,
            bar,
            subdivision,
        })
        .await
    }

    pub async fn set_rests_for_bar(&self, track: u32, bar: usize, rests: HashSet<u32>) -> Result<()> {
        self.send(Command::SetRestsForBar { track, bar, rests }).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Snapshot(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| anyhow!("engine task has terminated").into())
    }

    pub async fn restore(&self, snapshot: Snapshot) -> Result<()> {
        self.send(Command::Restore(snapshot)).await
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).await.map_err(Into::into)
    }
}
