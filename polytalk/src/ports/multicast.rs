//! LocalTalk-over-UDP port: LLAP frames wrapped in LToU datagrams on the
//! well-known multicast group, bound to one interface.

use crate::ifaddr;
use crate::shutdown::Shutdown;
use log::error;
use polytalk_packets::{ltou_group_addr, LtouPacket, MacAddr, LTOU_GROUP, LTOU_PORT};
use polytalk_runtime::link::{packet_channel, LlapPort, TokioRunnable};
use std::io;
use std::mem;
use std::net::IpAddr;
use std::os::unix::io::FromRawFd;
use std::sync::Arc;
use tokio::net::UdpSocket;

const RECV_BUFFER_SIZE: usize = 700;

pub struct MulticastPort {
    dev: String,
    mac: MacAddr,
    socket: Arc<UdpSocket>,
    pid: u32,
    local_addrs: Vec<IpAddr>,
}

impl MulticastPort {
    /// Joins the LToU group on the named interface. Must run inside the
    /// runtime.
    pub fn open(dev: &str) -> io::Result<MulticastPort> {
        let local_addrs = ifaddr::interface_addrs(dev)?;
        let join_on = ifaddr::interface_ipv4(dev)?;
        let mac = ifaddr::hardware_addr(dev)?;

        let std_socket = reuse_addr_socket()?;
        std_socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std_socket)?;
        socket.join_multicast_v4(LTOU_GROUP, join_on)?;

        Ok(MulticastPort {
            dev: dev.to_string(),
            mac,
            socket: Arc::new(socket),
            pid: std::process::id(),
            local_addrs,
        })
    }

    /// The interface's hardware address, stamped by the translator onto
    /// frames fabricated for nodes behind this port.
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn start(self, shutdown: Shutdown) -> (LlapPort, Vec<TokioRunnable>) {
        let (in_tx, in_rx) = packet_channel(1);
        let (out_tx, out_rx) = packet_channel(1);

        let capture: TokioRunnable = Box::pin(capture_loop(
            Arc::clone(&self.socket),
            self.pid,
            self.local_addrs,
            in_tx,
            shutdown,
            self.dev.clone(),
        ));
        let transmit: TokioRunnable =
            Box::pin(transmit_loop(self.socket, self.pid, out_rx, self.dev));

        (
            LlapPort {
                inbound: Box::new(in_rx),
                outbound: out_tx,
            },
            vec![capture, transmit],
        )
    }
}

/// Multiple bridges on one machine all bind the LToU port, so the socket
/// needs SO_REUSEADDR before bind; std sockets cannot express that, hence
/// the raw construction.
fn reuse_addr_socket() -> io::Result<std::net::UdpSocket> {
    // FFI believed safe: the fd is owned by the returned socket on success
    // and closed on every error path.
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let one: libc::c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        ) < 0
        {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        let mut sin: libc::sockaddr_in = mem::zeroed();
        sin.sin_family = libc::AF_INET as libc::sa_family_t;
        sin.sin_port = LTOU_PORT.to_be();
        if libc::bind(
            fd,
            &sin as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        ) < 0
        {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(std::net::UdpSocket::from_raw_fd(fd))
    }
}

/// The kernel loops our own multicast sends back to us. A datagram is our
/// own echo only when both the sender pid matches and the source address
/// belongs to this interface; a pid collision with a remote bridge must
/// not suppress its traffic.
fn is_self_echo(sender_pid: u32, our_pid: u32, source: IpAddr, our_addrs: &[IpAddr]) -> bool {
    sender_pid == our_pid && our_addrs.contains(&source)
}

async fn capture_loop(
    socket: Arc<UdpSocket>,
    pid: u32,
    local_addrs: Vec<IpAddr>,
    in_tx: polytalk_runtime::link::PacketSender<polytalk_packets::LlapPacket>,
    mut shutdown: Shutdown,
    dev: String,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let (n, from) = tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok(x) => x,
                Err(err) => {
                    error!("udp {}: recv: {}", dev, err);
                    break;
                }
            },
            _ = shutdown.wait() => break,
        };

        let packet = match LtouPacket::decode(&buf[..n]) {
            Ok(packet) => packet,
            Err(err) => {
                error!("udp {} <- {}: {}", dev, from, err);
                continue;
            }
        };

        if is_self_echo(packet.pid, pid, from.ip(), &local_addrs) {
            continue;
        }
        if !in_tx.send(packet.llap).await {
            break;
        }
    }
    in_tx.close();
}

async fn transmit_loop(
    socket: Arc<UdpSocket>,
    pid: u32,
    mut out_rx: polytalk_runtime::link::PacketReceiver<polytalk_packets::LlapPacket>,
    dev: String,
) {
    use futures::StreamExt;

    while let Some(llap) = out_rx.next().await {
        let bin = LtouPacket::new(pid, llap).encode();
        if let Err(err) = socket.send_to(&bin, ltou_group_addr()).await {
            error!("udp {}: send: {}", dev, err);
        }
    }
}
