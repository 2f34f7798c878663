//! Datagram transport used by the exchange engine.
//!
//! The engine only needs to send a datagram to the agent and await the next
//! datagram the agent sends back; deadlines are applied by the caller.

use std::{future::Future, io, net::SocketAddr};

use tokio::net::UdpSocket;

/// Largest datagram accepted from an agent.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Send/receive capability consumed by the exchange engine.
pub trait Transport: Send + Sync {
    /// Sends one datagram to the agent.
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Waits for the next datagram from the agent and returns it as one owned
    /// buffer.
    fn recv(&self) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

/// UDP transport bound once per session.
pub struct UdpTransport {
    socket: UdpSocket,
    agent_addr: SocketAddr,
}

impl UdpTransport {
    /// Binds the local socket and targets the given agent.
    pub async fn bind(local_addr: SocketAddr, agent_addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local_addr).await?;
        log::debug!(
            "Bound SNMP socket on {} for agent {}",
            socket.local_addr()?,
            agent_addr
        );
        Ok(Self { socket, agent_addr })
    }

    /// Returns the agent address requests are sent to.
    pub fn agent_addr(&self) -> SocketAddr {
        self.agent_addr
    }

    /// Retargets subsequent requests to another agent.
    pub fn set_agent_addr(&mut self, agent_addr: SocketAddr) {
        self.agent_addr = agent_addr;
    }

    /// Returns the local address of the bound socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Replaces the socket with one bound on `local_addr`.
    ///
    /// The current socket is kept if binding fails.
    pub async fn rebind(&mut self, local_addr: SocketAddr) -> io::Result<()> {
        let socket = UdpSocket::bind(local_addr).await?;
        log::debug!(
            "Rebound SNMP socket from {} to {}",
            self.socket.local_addr()?,
            socket.local_addr()?
        );
        self.socket = socket;
        Ok(())
    }
}

impl Transport for UdpTransport {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(datagram, self.agent_addr).await?;
        if sent != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, datagram.len()),
            ));
        }
        Ok(())
    }

    async fn recv(&self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            if src != self.agent_addr {
                log::debug!(
                    "Dropping {} bytes from {}, expecting {}",
                    len,
                    src,
                    self.agent_addr
                );
                continue;
            }
            log::trace!("Received {} bytes from {}", len, src);
            buf.truncate(len);
            return Ok(buf);
        }
    }
}
