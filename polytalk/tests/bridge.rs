//! End-to-end bridge tests over real localhost TCP connections: a hub, a
//! TCP listener port, and raw peers speaking the length-prefixed frame
//! protocol, with a translated LLAP port alongside.

use polytalk::ports::tcp::TcpListenerPort;
use polytalk::shutdown;
use polytalk_packets::{
    AarpPacket, DdpPacket, EthertalkPacket, LlapPacket, MacAddr, AARP_PROBE, AARP_PROTO,
};
use polytalk_runtime::hub::hub;
use polytalk_runtime::link::{packet_channel, LlapPort, PacketReceiver};
use polytalk_runtime::translate::{extend, Translator};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

fn sample_frame(tag: u8) -> EthertalkPacket {
    let ddp = DdpPacket {
        size: 6,
        dst_socket: 2,
        src_socket: 3,
        proto: 2,
        data: vec![tag],
    };
    EthertalkPacket::appletalk(MacAddr::new([2, 0, 0, 0, 0, tag]), &ddp.to_ext(0xff00, 1, 2))
}

fn message(packet: &EthertalkPacket) -> Vec<u8> {
    let bin = packet.encode();
    let mut msg = Vec::with_capacity(4 + bin.len());
    msg.extend_from_slice(&(bin.len() as u32).to_be_bytes());
    msg.extend_from_slice(&bin);
    msg
}

async fn read_message(stream: &mut TcpStream) -> EthertalkPacket {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let mut data = vec![0u8; u32::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut data).await.unwrap();
    EthertalkPacket::decode(&data).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn frames_cross_between_tcp_peers() {
    let (shutdown_handle, shutdown) = shutdown::channel();
    let (hub, handle) = hub();
    let hub_task = tokio::spawn(hub);

    let listener = TcpListenerPort::listen("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.serve(handle.clone(), shutdown.clone()));
    drop(handle);

    let mut peer_a = TcpStream::connect(addr).await.unwrap();
    let mut peer_b = TcpStream::connect(addr).await.unwrap();
    // Give the accept loop a beat to attach both ports.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A speaks; B hears it; A does not hear itself.
    let frame = sample_frame(0x11);
    peer_a.write_all(&message(&frame)).await.unwrap();
    let heard = timeout(Duration::from_secs(5), read_message(&mut peer_b))
        .await
        .unwrap();
    assert_eq!(heard, frame);

    // And the reverse direction.
    let reply = sample_frame(0x22);
    peer_b.write_all(&message(&reply)).await.unwrap();
    let heard = timeout(Duration::from_secs(5), read_message(&mut peer_a))
        .await
        .unwrap();
    assert_eq!(heard, reply);

    shutdown_handle.trigger();
    timeout(Duration::from_secs(5), hub_task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_peer_is_dropped_without_stopping_the_bridge() {
    let (shutdown_handle, shutdown) = shutdown::channel();
    let (hub, handle) = hub();
    let hub_task = tokio::spawn(hub);

    let listener = TcpListenerPort::listen("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.serve(handle.clone(), shutdown.clone()));
    drop(handle);

    let mut corrupt = TcpStream::connect(addr).await.unwrap();
    let mut peer_a = TcpStream::connect(addr).await.unwrap();
    let mut peer_b = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A frame length beyond the cap closes that connection. The close may
    // surface as EOF or as a reset, depending on what was left unread.
    corrupt.write_all(&4097u32.to_be_bytes()).await.unwrap();
    corrupt.write_all(&vec![0u8; 4097]).await.unwrap();
    let mut probe = [0u8; 1];
    let closed = timeout(Duration::from_secs(5), corrupt.read(&mut probe))
        .await
        .unwrap();
    assert!(
        matches!(closed, Ok(0) | Err(_)),
        "the bridge should close a corrupt connection"
    );

    // The surviving peers still bridge traffic.
    let frame = sample_frame(0x33);
    peer_a.write_all(&message(&frame)).await.unwrap();
    let heard = timeout(Duration::from_secs(5), read_message(&mut peer_b))
        .await
        .unwrap();
    assert_eq!(heard, frame);

    shutdown_handle.trigger();
    timeout(Duration::from_secs(5), hub_task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn llap_port_probes_reach_tcp_peers_as_aarp() {
    let (shutdown_handle, shutdown) = shutdown::channel();
    let (hub, handle) = hub();
    let hub_task = tokio::spawn(hub);

    let listener = TcpListenerPort::listen("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.serve(handle.clone(), shutdown.clone()));

    // A LocalTalk-flavored port, driven directly through its channels the
    // way a serial or multicast adapter would.
    let translator = Translator::new(MacAddr::new([0x08, 0x00, 0x07, 0xb4, 0xb1, 0xce]), 0xff00);
    let (llap_in_tx, llap_in_rx) = packet_channel::<LlapPacket>(1);
    let (llap_out_tx, llap_out_rx): (_, PacketReceiver<LlapPacket>) = packet_channel(1);
    let llap_port = LlapPort {
        inbound: Box::new(llap_in_rx),
        outbound: llap_out_tx,
    };
    let (port, workers) = extend(llap_port, translator);
    tokio::spawn(handle.attach(port));
    for worker in workers {
        tokio::spawn(worker);
    }
    drop(handle);

    let mut peer = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // A node-ID probe on the LocalTalk side surfaces at the TCP peer as an
    // AARP probe for (network, node).
    assert!(llap_in_tx.send(LlapPacket::enq(2, 0)).await);
    let heard = timeout(Duration::from_secs(5), read_message(&mut peer))
        .await
        .unwrap();
    assert_eq!(heard.snap, AARP_PROTO);
    let probe = AarpPacket::decode(&heard.data).unwrap();
    assert_eq!(probe.opcode, AARP_PROBE);
    assert_eq!(probe.dst.proto.network, 0xff00);
    assert_eq!(probe.dst.proto.node, 2);

    llap_in_tx.close();
    drop(llap_out_rx);
    shutdown_handle.trigger();
    timeout(Duration::from_secs(5), hub_task)
        .await
        .unwrap()
        .unwrap();
}
