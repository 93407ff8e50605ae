//! Raw EtherTalk port: an AF_PACKET capture/transmit pair on one Ethernet
//! interface, filtered down to AppleTalk and AARP traffic.

use crate::shutdown::Shutdown;
use afpacket::{appletalk_filter, AsyncBoundSocket, Socket};
use futures::StreamExt;
use log::error;
use polytalk_packets::{EthertalkPacket, MacAddr};
use polytalk_runtime::link::{packet_channel, PacketSender, Port, TokioRunnable};
use std::collections::HashSet;
use std::ffi::CString;
use std::io;

const CAPTURE_BUFFER_SIZE: usize = 4096;

pub struct EtherTalkPort {
    dev: String,
    mac: MacAddr,
    capture: AsyncBoundSocket,
    transmit: AsyncBoundSocket,
}

impl EtherTalkPort {
    /// Opens capture and transmit sockets on the interface. Must run inside
    /// the runtime, since the sockets register with the reactor.
    pub fn open(dev: &str) -> io::Result<EtherTalkPort> {
        let iface = CString::new(dev).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

        let mut capture_sock = Socket::new()?;
        capture_sock.attach_filter(&appletalk_filter())?;
        capture_sock.set_nonblocking(true)?;
        let mac = MacAddr::new(capture_sock.hardware_addr(&iface)?);
        let mut capture_bound = capture_sock.bind(&iface)?;
        capture_bound.set_promiscuous(true)?;
        let capture = AsyncBoundSocket::new(capture_bound)?;

        let mut transmit_sock = Socket::new()?;
        transmit_sock.set_nonblocking(true)?;
        let transmit = AsyncBoundSocket::new(transmit_sock.bind(&iface)?)?;

        Ok(EtherTalkPort {
            dev: dev.to_string(),
            mac,
            capture,
            transmit,
        })
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn start(self, shutdown: Shutdown) -> (Port, Vec<TokioRunnable>) {
        let (in_tx, in_rx) = packet_channel(1);
        let (out_tx, out_rx) = packet_channel(1);

        let capture: TokioRunnable = Box::pin(capture_loop(
            self.capture,
            self.mac,
            in_tx,
            shutdown,
            self.dev.clone(),
        ));
        let transmit: TokioRunnable =
            Box::pin(transmit_loop(self.transmit, self.mac, out_rx, self.dev));

        (
            Port {
                inbound: Box::new(in_rx),
                outbound: out_tx,
            },
            vec![capture, transmit],
        )
    }
}

/// Decides whether a captured frame crosses the bridge, updating the
/// local-address set as traffic is observed.
fn should_forward(
    packet: &EthertalkPacket,
    bridge_mac: MacAddr,
    local_addrs: &mut HashSet<MacAddr>,
) -> bool {
    // Frames carrying our own source are the bridge's transmissions coming
    // back off the wire; forwarding them again is how loops happen.
    if packet.src == bridge_mac {
        return false;
    }

    // If the destination is an address we have seen originate here, the
    // recipient hears it natively; the bridge has nothing to add.
    if local_addrs.contains(&packet.dst) {
        return false;
    }

    local_addrs.insert(packet.src);
    true
}

async fn capture_loop(
    mut sock: AsyncBoundSocket,
    mac: MacAddr,
    in_tx: PacketSender<EthertalkPacket>,
    mut shutdown: Shutdown,
    dev: String,
) {
    let mut local_addrs = HashSet::new();
    let mut buf = vec![0u8; CAPTURE_BUFFER_SIZE];
    loop {
        let n = tokio::select! {
            result = sock.recv(&mut buf) => match result {
                Ok(n) => n,
                Err(err) => {
                    error!("{}: read packet failed: {}", dev, err);
                    break;
                }
            },
            _ = shutdown.wait() => break,
        };

        let packet = match EthertalkPacket::decode(&buf[..n]) {
            Ok(packet) => packet,
            Err(err) => {
                error!("{}: unmarshal failed: {}", dev, err);
                continue;
            }
        };

        if !should_forward(&packet, mac, &mut local_addrs) {
            continue;
        }
        if !in_tx.send(packet).await {
            break;
        }
    }
    in_tx.close();
}

async fn transmit_loop(
    mut sock: AsyncBoundSocket,
    mac: MacAddr,
    mut out_rx: polytalk_runtime::link::PacketReceiver<EthertalkPacket>,
    dev: String,
) {
    while let Some(mut packet) = out_rx.next().await {
        // Stamp our own source address so the capture side recognizes the
        // frame when the NIC loops it back.
        packet.src = mac;
        let bin = packet.encode();
        if let Err(err) = sock.send(&bin).await {
            error!("{}: write packet: {}", dev, err);
        }
    }
}
