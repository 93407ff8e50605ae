use crate::sockets;
use std::io;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

/// A [`sockets::BoundSocket`] registered with the tokio reactor. The
/// underlying socket must be non-blocking before it is bound.
pub struct AsyncBoundSocket {
    fd: AsyncFd<sockets::BoundSocket>,
}

impl AsyncBoundSocket {
    /// Wraps a bound, non-blocking socket. Must be called from within a
    /// tokio runtime.
    pub fn new(socket: sockets::BoundSocket) -> io::Result<Self> {
        Ok(Self {
            fd: AsyncFd::with_interest(socket, Interest::READABLE | Interest::WRITABLE)?,
        })
    }

    /// Joins or leaves promiscuous mode on the bound interface.
    pub fn set_promiscuous(&mut self, enabled: bool) -> io::Result<()> {
        self.fd.get_mut().set_promiscuous(enabled)
    }

    /// Sends one frame, waiting for the NIC to accept it.
    pub async fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.writable_mut().await?;
            match guard.try_io(|inner| inner.get_mut().send(frame)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Receives one frame, waiting until the NIC delivers one that passes
    /// the socket's filter.
    pub async fn recv(&mut self, frame: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable_mut().await?;
            match guard.try_io(|inner| inner.get_mut().recv(frame)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}
