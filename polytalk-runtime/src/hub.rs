//! The fan-out hub.
//!
//! One control future owns the set of attached ports, so the set needs no
//! locks. Each attachment installs a small intake channel that the port's
//! inbound stream drains into; the hub pulls packets from those intakes
//! round-robin and copies each one to every other port's outbound channel.
//! Before pulling a packet the hub verifies that every peer has room, and
//! parks on the first full peer otherwise: a stalled peer stalls the bridge
//! rather than dropping or queueing unboundedly, which keeps the raw
//! Ethernet adapter's loop-suppression window narrow.

use crate::link::{packet_channel, PacketReceiver, PacketSender, Port, Take, TaskPark, TokioRunnable};
use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use futures::task::{Context, Poll};
use futures::{Future, StreamExt};
use log::{debug, error, log_enabled, Level};
use polytalk_packets::{
    ddp_proto_name, AarpPacket, EthertalkPacket, ExtDdpPacket, AARP_PROBE, AARP_PROTO,
    AARP_REQUEST, AARP_RESPONSE, APPLETALK_PROTO,
};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Waker;

/// Capacity of the per-port intake and outbound channels. One packet keeps
/// backpressure tight against the wire.
const PORT_QUEUE_CAPACITY: usize = 1;

struct AttachedPort {
    id: u64,
    inbound: PacketReceiver<EthertalkPacket>,
    outbound: PacketSender<EthertalkPacket>,
}

/// Builds a hub and the handle used to attach ports to it. The hub future
/// completes once every attached port has detached and every handle clone
/// has been dropped.
pub fn hub() -> (Hub, HubHandle) {
    let (control_tx, control_rx) = unbounded();
    let control_park = TaskPark::new();
    (
        Hub {
            control: control_rx,
            control_park: control_park.clone(),
            control_open: true,
            ports: Vec::new(),
            cursor: 0,
        },
        HubHandle {
            control: control_tx,
            control_park,
            next_id: Arc::new(AtomicU64::new(0)),
        },
    )
}

#[derive(Clone)]
pub struct HubHandle {
    control: Sender<AttachedPort>,
    control_park: TaskPark,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Registers a port and returns the intake worker that drains the
    /// port's inbound stream. The port stays attached until that stream
    /// ends, at which point the hub closes the port's outbound channel and
    /// forgets it.
    pub fn attach(&self, port: Port) -> TokioRunnable {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (intake_tx, intake_rx) = packet_channel(PORT_QUEUE_CAPACITY);

        let attached = AttachedPort {
            id,
            inbound: intake_rx,
            outbound: port.outbound,
        };
        // The hub drops its receiver only after every handle is gone, and
        // attach is never called after that.
        self.control
            .send(attached)
            .expect("hub control channel closed while a handle was live");
        self.control_park.notify();

        let mut inbound = port.inbound;
        Box::pin(async move {
            while let Some(packet) = inbound.next().await {
                if !intake_tx.send(packet).await {
                    break;
                }
            }
            intake_tx.close();
        })
    }
}

pub struct Hub {
    control: Receiver<AttachedPort>,
    control_park: TaskPark,
    control_open: bool,
    ports: Vec<AttachedPort>,
    cursor: usize,
}

enum Step {
    Broadcast(u64, EthertalkPacket),
    Detach(u64),
    Idle,
}

impl Hub {
    fn drain_control(&mut self) {
        loop {
            match self.control.try_recv() {
                Ok(port) => self.ports.push(port),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.control_open = false;
                    break;
                }
            }
        }
    }

    /// Copies `packet` to every attached port except the source. The
    /// backpressure gate has already reserved room on every peer, so a
    /// refused send means the peer vanished; those are detached.
    fn broadcast(&mut self, source: u64, packet: EthertalkPacket) {
        log_packet(&packet);
        let mut dead = Vec::new();
        for port in &self.ports {
            if port.id == source {
                continue;
            }
            if !port.outbound.try_send(packet.clone()) {
                dead.push(port.id);
            }
        }
        for id in dead {
            self.detach(id);
        }
    }

    fn detach(&mut self, id: u64) {
        if let Some(index) = self.ports.iter().position(|p| p.id == id) {
            let port = self.ports.remove(index);
            port.outbound.close();
            if self.cursor > index {
                self.cursor -= 1;
            }
        }
    }

    /// Pulls at most one packet, round-robin starting after the previous
    /// source. A closed intake is reported for detachment instead.
    fn pull_one(&mut self) -> Step {
        for offset in 0..self.ports.len() {
            let index = (self.cursor + offset) % self.ports.len();
            match self.ports[index].inbound.try_take() {
                Take::Item(packet) => {
                    self.cursor = (index + 1) % self.ports.len();
                    return Step::Broadcast(self.ports[index].id, packet);
                }
                Take::Closed => return Step::Detach(self.ports[index].id),
                Take::Empty => continue,
            }
        }
        Step::Idle
    }
}

impl Unpin for Hub {}

impl Future for Hub {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let hub = &mut *self;
        loop {
            hub.drain_control();

            if hub.ports.is_empty() {
                if !hub.control_open {
                    return Poll::Ready(());
                }
            } else {
                // Backpressure gate: every peer must have room for one more
                // packet before anything is pulled off an intake. A full
                // channel whose adapter died will never drain; detach it.
                let mut vanished = None;
                for port in &hub.ports {
                    if port.outbound.is_closed() {
                        vanished = Some(port.id);
                        break;
                    }
                    if port.outbound.is_full() {
                        port.outbound.park(cx.waker().clone());
                        return Poll::Pending;
                    }
                }
                if let Some(id) = vanished {
                    hub.detach(id);
                    continue;
                }
            }

            match hub.pull_one() {
                Step::Broadcast(source, packet) => {
                    hub.broadcast(source, packet);
                    continue;
                }
                Step::Detach(id) => {
                    hub.detach(id);
                    continue;
                }
                Step::Idle => {}
            }

            // Nothing to do: park one shared waker across every intake and
            // the control channel, then recheck in case a packet or an
            // attachment slipped in while we were parking.
            let slot: Arc<AtomicCell<Option<Waker>>> =
                Arc::new(AtomicCell::new(Some(cx.waker().clone())));
            // A dead intake park means that channel will never signal again;
            // count it as an arrival so the closed intake is collected.
            let mut dead_intake = false;
            for port in &hub.ports {
                if !port.inbound.park_indirect(Arc::clone(&slot)) {
                    dead_intake = true;
                }
            }
            hub.control_park.park_indirect(Arc::clone(&slot));

            let arrivals = dead_intake
                || !hub.control.is_empty()
                || hub.ports.iter().any(|p| !p.inbound.is_empty());
            if arrivals && slot.swap(None).is_some() {
                continue;
            }
            // If the waker is already gone, something woke us; either way
            // the runtime will poll again.
            return Poll::Pending;
        }
    }
}

fn log_packet(packet: &EthertalkPacket) {
    if !log_enabled!(Level::Debug) {
        return;
    }
    if packet.snap == AARP_PROTO {
        match AarpPacket::decode(&packet.data) {
            Ok(a) => {
                let op = match a.opcode {
                    AARP_REQUEST => "request".to_string(),
                    AARP_RESPONSE => "response".to_string(),
                    AARP_PROBE => "probe".to_string(),
                    other => format!("{:#04x}", other),
                };
                debug!(
                    "aarp {} {}/{} -> {}/{}",
                    op, a.src.hardware, a.src.proto, a.dst.hardware, a.dst.proto,
                );
            }
            Err(err) => error!("aarp unmarshal failed: {}", err),
        }
    } else if packet.snap == APPLETALK_PROTO {
        match ExtDdpPacket::decode(&packet.data) {
            Ok(d) => {
                let proto = ddp_proto_name(d.proto)
                    .map(str::to_string)
                    .unwrap_or_else(|| d.proto.to_string());
                debug!(
                    "ddp {}.{}.{} <- {}.{}.{} proto {} cksum {:#06x} data {}",
                    d.dst_net,
                    d.dst_node,
                    d.dst_socket,
                    d.src_net,
                    d.src_node,
                    d.src_socket,
                    proto,
                    d.cksum,
                    hex(&d.data),
                );
            }
            Err(err) => error!("ddp unmarshal failed: {}", err),
        }
    }
}

/// Payload bytes in groups of four, the way AppleTalk captures are usually
/// read.
fn hex(data: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(data.len() * 2 + data.len() / 4);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 && i % 4 == 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
