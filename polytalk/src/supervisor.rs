//! Builds the configured ports, binds them to the hub, and runs the
//! bridge until interrupted.

use crate::config::Config;
use crate::ports::ether::EtherTalkPort;
use crate::ports::multicast::MulticastPort;
use crate::ports::serial::SerialTashPort;
use crate::ports::tcp::{TcpListenerPort, TcpPort};
use crate::shutdown;
use log::info;
use polytalk_packets::MacAddr;
use polytalk_runtime::hub::hub;
use polytalk_runtime::link::TokioRunnable;
use polytalk_runtime::translate::{extend, Translator};
use std::error::Error;
use tokio::runtime;

pub fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(bridge(config))
}

async fn bridge(config: Config) -> Result<(), Box<dyn Error>> {
    let (shutdown_handle, shutdown) = shutdown::channel();
    let (hub, handle) = hub();
    let mut runnables: Vec<TokioRunnable> = Vec::new();

    for dev in &config.ether {
        let port = EtherTalkPort::open(dev).map_err(|err| format!("interface {}: {}", dev, err))?;
        info!("ethertalk {}: opened as {}", dev, port.mac());
        let (port, mut tasks) = port.start(shutdown.clone());
        runnables.push(handle.attach(port));
        runnables.append(&mut tasks);
    }

    for dev in &config.multicast {
        let port = MulticastPort::open(dev).map_err(|err| format!("interface {}: {}", dev, err))?;
        let translator = Translator::new(port.mac(), config.network);
        info!("multicast {}: opened as {}", dev, port.mac());
        let (llap_port, mut tasks) = port.start(shutdown.clone());
        let (port, mut translate_tasks) = extend(llap_port, translator);
        runnables.push(handle.attach(port));
        runnables.append(&mut tasks);
        runnables.append(&mut translate_tasks);
    }

    for device in &config.serial {
        let port =
            SerialTashPort::open(device).map_err(|err| format!("tash open {}: {}", device, err))?;
        let mac = fabricated_mac(device);
        let translator = Translator::new(mac, config.network);
        info!("tash {}: opened as {}", device, mac);
        let (llap_port, mut tasks) = port.start(shutdown.clone());
        let (port, mut translate_tasks) = extend(llap_port, translator);
        runnables.push(handle.attach(port));
        runnables.append(&mut tasks);
        runnables.append(&mut translate_tasks);
    }

    for addr in &config.tcp_client {
        let port = TcpPort::dial(addr)
            .await
            .map_err(|err| format!("dial {}: {}", addr, err))?;
        info!("tcp {}: connected", addr);
        let (port, mut tasks) = port.start(shutdown.clone());
        runnables.push(handle.attach(port));
        runnables.append(&mut tasks);
    }

    for addr in &config.tcp_server {
        let listener = TcpListenerPort::listen(addr)
            .await
            .map_err(|err| format!("listen {}: {}", addr, err))?;
        info!("tcp {}: listening", addr);
        runnables.push(listener.serve(handle.clone(), shutdown.clone()));
    }

    for runnable in runnables {
        tokio::spawn(runnable);
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt: shutting down");
        }
        shutdown_handle.trigger();
    });

    // With every attach handle released, the hub winds down once the last
    // port detaches.
    drop(handle);
    hub.await;
    Ok(())
}

/// A stable MAC for ports with no hardware address of their own (serial),
/// derived from the device path under Apple's OUI so collisions across
/// bridges on one segment are unlikely.
fn fabricated_mac(seed: &str) -> MacAddr {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in seed.as_bytes().iter().chain(std::process::id().to_be_bytes().iter()) {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    let tail = hash.to_be_bytes();
    MacAddr::new([0x08, 0x00, 0x07, tail[5], tail[6], tail[7]])
}
