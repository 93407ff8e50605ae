//! TashTalk serial port: LLAP frames over a microcontroller that handles
//! the LocalTalk line discipline, spoken at 1 Mbaud.

use crate::shutdown::Shutdown;
use futures::StreamExt;
use log::error;
use polytalk_packets::{Accumulator, Encoder, LlapPacket, NodeSet};
use polytalk_runtime::link::{packet_channel, LlapPort, PacketReceiver, PacketSender, TokioRunnable};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

const BAUD_RATE: u32 = 1_000_000;
const READ_CHUNK_SIZE: usize = 1024;

pub struct SerialTashPort {
    device: String,
    stream: SerialStream,
}

impl SerialTashPort {
    pub fn open(device: &str) -> io::Result<SerialTashPort> {
        let stream = tokio_serial::new(device, BAUD_RATE)
            .open_native_async()
            .map_err(io::Error::from)?;
        Ok(SerialTashPort {
            device: device.to_string(),
            stream,
        })
    }

    pub fn start(self, shutdown: Shutdown) -> (LlapPort, Vec<TokioRunnable>) {
        let (rd, wr) = tokio::io::split(self.stream);
        let (in_tx, in_rx) = packet_channel(1);
        let (out_tx, out_rx) = packet_channel(1);

        let capture: TokioRunnable =
            Box::pin(capture_loop(rd, in_tx, shutdown, self.device.clone()));
        let transmit: TokioRunnable = Box::pin(transmit_loop(wr, out_rx, self.device));

        (
            LlapPort {
                inbound: Box::new(in_rx),
                outbound: out_tx,
            },
            vec![capture, transmit],
        )
    }
}

async fn capture_loop(
    mut rd: ReadHalf<SerialStream>,
    in_tx: PacketSender<LlapPacket>,
    mut shutdown: Shutdown,
    device: String,
) {
    let mut accumulator = Accumulator::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    'outer: loop {
        let n = tokio::select! {
            result = rd.read(&mut buf) => match result {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    error!("tash {}: read failed: {}", device, err);
                    break;
                }
            },
            _ = shutdown.wait() => break,
        };

        for packet in accumulator.feed_slice(&buf[..n]) {
            if !in_tx.send(packet).await {
                break 'outer;
            }
        }
    }
    in_tx.close();
}

async fn transmit_loop(
    mut wr: WriteHalf<SerialStream>,
    mut out_rx: PacketReceiver<LlapPacket>,
    device: String,
) {
    let mut encoder = Encoder::new();

    // Start from a known device state: the reset preamble this first write
    // carries drives the command parser to idle, and an empty responder
    // set keeps TashTalk from defending node IDs it no longer owns.
    let setup = encoder.node_ids(&NodeSet::new());
    if let Err(err) = wr.write_all(&setup).await {
        error!("tash {}: setup failed: {}", device, err);
        encoder.write_failed();
    }

    while let Some(packet) = out_rx.next().await {
        let bytes = match encoder.frame(&packet) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("tash {}: {}", device, err);
                continue;
            }
        };
        if let Err(err) = wr.write_all(&bytes).await {
            error!("tash {}: send failed: {}", device, err);
            encoder.write_failed();
        }
    }
}
