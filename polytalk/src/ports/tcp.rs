//! TCP tunnel ports. Two bridges exchange EtherTalk frames over a stream,
//! each frame preceded by a 32-bit big-endian length. A dialed connection
//! is one port; a listener mints a new port per accepted connection.

use crate::shutdown::Shutdown;
use futures::StreamExt;
use log::{error, info, warn};
use polytalk_packets::{EthertalkPacket, AARP_PROTO, APPLETALK_PROTO};
use polytalk_runtime::hub::HubHandle;
use polytalk_runtime::link::{packet_channel, PacketReceiver, PacketSender, Port, TokioRunnable};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Frames above this are corrupt; the peer has lost the framing, so the
/// connection is unrecoverable.
const MAX_FRAME_SIZE: u32 = 4096;

pub struct TcpPort {
    peer: String,
    stream: TcpStream,
}

impl TcpPort {
    /// Dials a remote bridge.
    pub async fn dial(addr: &str) -> io::Result<TcpPort> {
        let stream = TcpStream::connect(addr).await?;
        Ok(TcpPort {
            peer: addr.to_string(),
            stream,
        })
    }

    pub fn start(self, shutdown: Shutdown) -> (Port, Vec<TokioRunnable>) {
        stream_port(self.stream, self.peer, shutdown)
    }
}

/// Wires an established stream up as a port.
fn stream_port(
    stream: TcpStream,
    peer: String,
    shutdown: Shutdown,
) -> (Port, Vec<TokioRunnable>) {
    let (rd, wr) = stream.into_split();
    let (in_tx, in_rx) = packet_channel(1);
    let (out_tx, out_rx) = packet_channel(1);

    let read: TokioRunnable = Box::pin(read_loop(rd, in_tx, shutdown, peer.clone()));
    let write: TokioRunnable = Box::pin(write_loop(wr, out_rx, peer));

    (
        Port {
            inbound: Box::new(in_rx),
            outbound: out_tx,
        },
        vec![read, write],
    )
}

/// Reads one length-prefixed frame. `Ok(None)` is a clean end of stream;
/// an oversized length is an error, which callers treat as fatal.
async fn read_frame<R: AsyncRead + Unpin>(rd: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match rd.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid length {}", len),
        ));
    }

    let mut data = vec![0u8; len as usize];
    rd.read_exact(&mut data).await?;
    Ok(Some(data))
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut rd: R,
    in_tx: PacketSender<EthertalkPacket>,
    mut shutdown: Shutdown,
    peer: String,
) {
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut rd) => frame,
            _ = shutdown.wait() => break,
        };
        match frame {
            Ok(Some(bytes)) => {
                let packet = match EthertalkPacket::decode(&bytes) {
                    Ok(packet) => packet,
                    Err(err) => {
                        error!("tcp {} recv: {}", peer, err);
                        continue;
                    }
                };
                // Only AppleTalk and AARP frames belong on the bridge; a
                // confused peer does not get to pollute the other wires.
                if packet.snap != APPLETALK_PROTO && packet.snap != AARP_PROTO {
                    continue;
                }
                if !in_tx.send(packet).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                error!("tcp {} recv: {}", peer, err);
                break;
            }
        }
    }
    in_tx.close();
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut wr: W,
    mut out_rx: PacketReceiver<EthertalkPacket>,
    peer: String,
) {
    while let Some(packet) = out_rx.next().await {
        let bin = packet.encode();
        let mut msg = Vec::with_capacity(4 + bin.len());
        msg.extend_from_slice(&(bin.len() as u32).to_be_bytes());
        msg.extend_from_slice(&bin);
        if let Err(err) = wr.write_all(&msg).await {
            error!("tcp {} send: {}", peer, err);
        }
    }
}

pub struct TcpListenerPort {
    addr: String,
    listener: TcpListener,
}

impl TcpListenerPort {
    pub async fn listen(addr: &str) -> io::Result<TcpListenerPort> {
        let listener = TcpListener::bind(addr).await?;
        Ok(TcpListenerPort {
            addr: addr.to_string(),
            listener,
        })
    }

    /// The bound address; useful when listening on port 0.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until shutdown; each one joins the hub as its
    /// own port with its own worker tasks.
    pub fn serve(self, hub: HubHandle, shutdown: Shutdown) -> TokioRunnable {
        let TcpListenerPort { addr, listener } = self;
        let mut accept_shutdown = shutdown.clone();
        Box::pin(async move {
            loop {
                let accepted = tokio::select! {
                    accepted = listener.accept() => accepted,
                    _ = accept_shutdown.wait() => break,
                };
                match accepted {
                    Ok((stream, remote)) => {
                        info!("tcp {}: opened", remote);
                        let (port, runnables) =
                            stream_port(stream, remote.to_string(), shutdown.clone());
                        tokio::spawn(hub.attach(port));
                        for runnable in runnables {
                            tokio::spawn(runnable);
                        }
                    }
                    Err(err) => {
                        warn!("tcp {} accept: {}", addr, err);
                    }
                }
            }
        })
    }
}
