use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use pulselink::{persist, Channel, Config, Controller, Dest, Envelope, Message, PeerEvent, Pulselink, RoleKind};
use tokio::{
    fs,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
};

enum SockIn {
    Line(u8, String),
    Gone(u8),
}

async fn read_lines(peer: u8, read: OwnedReadHalf, tx: mpsc::Sender<SockIn>) {
    let mut lines = BufReader::new(read).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(SockIn::Line(peer, line)).await.is_err() {
                    return;
                }
            }
            _ => {
                let _ = tx.send(SockIn::Gone(peer)).await;
                return;
            }
        }
    }
}

// Host transport: every accepted socket becomes a numbered peer speaking
// newline-delimited JSON envelopes.
async fn serve(
    addr: SocketAddr,
    mut wire_rx: mpsc::Receiver<(Dest, Envelope)>,
    event_tx: mpsc::Sender<PeerEvent>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", addr);
    let (sock_tx, mut sock_rx) = mpsc::channel(64);
    let mut writers: HashMap<u8, OwnedWriteHalf> = HashMap::new();
    let mut next_peer = 1u8;

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, remote) = res?;
                let peer = next_peer;
                next_peer = next_peer.wrapping_add(1);
                let (read, write) = stream.into_split();
                writers.insert(peer, write);
                tokio::spawn(read_lines(peer, read, sock_tx.clone()));
                info!("peer {} connected from {}", peer, remote);
                event_tx.send(PeerEvent::Connected(peer)).await?;
            }
            out = wire_rx.recv() => {
                match out {
                    Some((dest, env)) => {
                        let line = format!("{}\n", env.write()?);
                        match dest {
                            Dest::Peer(peer) => {
                                if let Some(w) = writers.get_mut(&peer) {
                                    let _ = w.write_all(line.as_bytes()).await;
                                }
                            }
                            Dest::All => {
                                for w in writers.values_mut() {
                                    let _ = w.write_all(line.as_bytes()).await;
                                }
                            }
                        }
                    }
                    None => return Ok(()),
                }
            }
            Some(ev) = sock_rx.recv() => {
                match ev {
                    SockIn::Line(peer, line) => match Envelope::parse(&line) {
                        Ok(env) => event_tx.send(PeerEvent::Message(peer, env)).await?,
                        Err(e) => debug!("bad envelope from peer {}: {}", peer, e),
                    },
                    SockIn::Gone(peer) => {
                        writers.remove(&peer);
                        event_tx.send(PeerEvent::Disconnected(peer)).await?;
                    }
                }
            }
        }
    }
}

// Peer transport: one connection to the host, which is peer number 0.
async fn connect(
    addr: SocketAddr,
    mut wire_rx: mpsc::Receiver<(Dest, Envelope)>,
    event_tx: mpsc::Sender<PeerEvent>,
) -> Result<()> {
    let stream = TcpStream::connect(addr).await?;
    info!("connected to {}", addr);
    let (read, mut write) = stream.into_split();
    let (sock_tx, mut sock_rx) = mpsc::channel(64);
    tokio::spawn(read_lines(0, read, sock_tx));
    event_tx.send(PeerEvent::Connected(0)).await?;

    loop {
        tokio::select! {
            out = wire_rx.recv() => {
                match out {
                    Some((_, env)) => {
                        write.write_all(format!("{}\n", env.write()?).as_bytes()).await?;
                    }
                    None => return Ok(()),
                }
            }
            ev = sock_rx.recv() => {
                match ev {
                    Some(SockIn::Line(_, line)) => match Envelope::parse(&line) {
                        Ok(env) => event_tx.send(PeerEvent::Message(0, env)).await?,
                        Err(e) => debug!("bad envelope from host: {}", e),
                    },
                    _ => {
                        let _ = event_tx.send(PeerEvent::Disconnected(0)).await;
                        return Err(anyhow!("host connection closed"));
                    }
                }
            }
        }
    }
}

async fn control(ctl: Controller) -> Result<()> {
    println!(
        "commands: play | stop | tempo <bpm> | add | rm <track> | bars <track> <n> \
         | beats <track> <bar> <n> | sub <track> <bar> <x> | save <file> | load <file>"
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["play"] => ctl.play().await?,
            ["stop"] => ctl.stop().await?,
            ["tempo", bpm] => ctl.set_tempo(bpm.parse()?).await?,
            ["add"] => ctl.add_track().await?,
            ["rm", track] => ctl.remove_track(track.parse()?).await?,
            ["bars", track, n] => ctl.set_bar_count(track.parse()?, n.parse()?).await?,
            ["beats", track, bar, n] => {
                ctl.set_beats_for_bar(track.parse()?, bar.parse()?, n.parse()?)
                    .await?
            }
            ["sub", track, bar, x] => {
                ctl.set_subdivision_for_bar(track.parse()?, bar.parse()?, x.parse()?)
                    .await?
            }
            ["save", path] => {
                let snapshot = ctl.snapshot().await?;
                let mut buf = Vec::new();
                persist::save(&mut buf, &snapshot)?;
                fs::write(path, buf).await?;
                println!("saved {}", path);
            }
            ["load", path] => {
                let data = fs::read(path).await?;
                ctl.restore(persist::load(data.as_slice())?).await?;
                println!("loaded {}", path);
            }
            [] => {}
            _ => println!("?"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let (role, addr) = match args.as_slice() {
        [_, mode, addr] => {
            let addr: SocketAddr = addr.parse()?;
            match mode.as_str() {
                "host" => (RoleKind::Host, addr),
                "peer" => (RoleKind::Peer, addr),
                _ => return Err(anyhow!("usage: pulselink-util <host|peer> <addr>")),
            }
        }
        _ => return Err(anyhow!("usage: pulselink-util <host|peer> <addr>")),
    };

    let (wire_tx, wire_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(64);
    let mut link = Pulselink::start(
        Config {
            name: "pulselink-util".to_string(),
            device_num: if role == RoleKind::Peer { 1 } else { 0 },
            role,
            ..Config::default()
        },
        Channel {
            tx: wire_tx,
            rx: event_rx,
        },
    );

    match role {
        RoleKind::Host => {
            tokio::spawn(async move {
                if let Err(e) = serve(addr, wire_rx, event_tx).await {
                    warn!("transport error: {}", e);
                }
            });
        }
        RoleKind::Peer => {
            tokio::spawn(async move {
                if let Err(e) = connect(addr, wire_rx, event_tx).await {
                    warn!("transport error: {}", e);
                }
            });
        }
    }

    let ctl = link.controller();
    tokio::spawn(async move {
        if let Err(e) = control(ctl).await {
            warn!("control error: {}", e);
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            res = link.next() => {
                match res {
                    Ok(Message::Fire(f)) => {
                        let mark = if f.rest {
                            "   ."
                        } else if f.accent {
                            "TOCK"
                        } else {
                            "tick"
                        };
                        println!("track {} [{}:{:>2}] {}", f.track, f.bar, f.beat, mark);
                    }
                    Ok(msg) => info!("{:?}", msg),
                    Err(_) => break,
                }
            }
        }
    }
    println!("terminating");
    link.terminate().await;

    Ok(())
}
