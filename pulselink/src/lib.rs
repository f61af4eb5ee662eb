use anyhow::anyhow;
use log::{error, info};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

mod clock;
pub mod control;
pub mod message;
mod mutate;
mod offset;
pub mod persist;
pub mod proto;
mod sched;
mod session;
mod sync;
mod tasks;
pub mod track;

use tasks::engine::EngineTask;

pub use control::{Command, Controller};
pub use message::{Fire, Message};
pub use offset::OffsetSample;
pub use persist::Snapshot;
pub use proto::Envelope;
pub use session::{PlaybackSession, TEMPO_MAX, TEMPO_MIN};
pub use track::Bar;

#[derive(Error, Debug)]
pub enum PulselinkError {
    #[error("terminating")]
    Terminating,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SystemTime(#[from] std::time::SystemTimeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    MessageSendError(#[from] mpsc::error::SendError<Message>),
    #[error(transparent)]
    CommandSendError(#[from] mpsc::error::SendError<Command>),
}

pub type Result<T> = std::result::Result<T, PulselinkError>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RoleKind {
    /// Authoritative device: answers sync requests, broadcasts pulses.
    Host,
    /// Reactive device: estimates the host clock offset and converges on
    /// the host's playback position.
    Peer,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub name: String,
    pub device_num: u8,
    pub role: RoleKind,
    /// Initial tempo in beats per minute.
    pub tempo: u32,
    /// Upper bound, in seconds, on a single pulse drift correction.
    pub max_pulse_correction: f64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            name: "pulselink".to_string(),
            device_num: 0,
            role: RoleKind::Host,
            tempo: 120,
            max_pulse_correction: 0.005,
        }
    }
}

/// Where an outbound envelope goes. The transport collaborator resolves
/// peer numbers to real connections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dest {
    Peer(u8),
    All,
}

/// What the transport collaborator feeds in: connection lifecycle plus
/// decoded envelopes, tagged with the sending peer's number.
#[derive(Clone, Debug)]
pub enum PeerEvent {
    Connected(u8),
    Disconnected(u8),
    Message(u8, Envelope),
}

/// The peer message channel, as handed over by the transport collaborator
/// once a reliable, ordered, bidirectional link exists.
pub struct Channel {
    pub tx: mpsc::Sender<(Dest, Envelope)>,
    pub rx: mpsc::Receiver<PeerEvent>,
}

pub struct Pulselink {
    child_tasks: Vec<JoinHandle<()>>,
    msg_rx: mpsc::Receiver<Message>,
    cmd_tx: mpsc::Sender<Command>,
}

impl Pulselink {
    /// Spawn the engine for this device. Must be called from within a tokio
    /// runtime.
    pub fn start(config: Config, channel: Channel) -> Pulselink {
        info!(
            target: "pulselink",
            "starting {} as device {} ({:?})", config.name, config.device_num, config.role
        );
        let (msg_tx, msg_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let engine = EngineTask::new(&config, channel, msg_tx, cmd_rx);
        let engine_handle = tokio::spawn(async move {
            if let Err(e) = engine.run().await {
                error!(target: "pulselink", "engine task error: {}", e);
            }
        });

        Pulselink {
            child_tasks: vec![engine_handle],
            msg_rx,
            cmd_tx,
        }
    }

    pub fn controller(&self) -> Controller {
        Controller::new(self.cmd_tx.clone())
    }

    pub async fn next(&mut self) -> Result<Message> {
        self.msg_rx
            .recv()
            .await
            .ok_or(anyhow!("engine task has terminated").into())
    }

    pub async fn terminate(self) {
        // Dropping the message receiver tells the engine we are done.
        drop(self.msg_rx);
        drop(self.cmd_tx);
        for t in self.child_tasks {
            let _ = tokio::join!(t);
        }
    }
}
