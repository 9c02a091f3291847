use crate::error::TransportResult;
use crate::logging;
use std::net::UdpSocket;

const RECV_BUF_SIZE: usize = 65_536;

/// Non-blocking bind/send/recv over unreliable unicast datagrams. Intentionally thin: it performs
/// no allocation beyond per-call temporaries and never interprets the bytes it moves.
pub struct DatagramEndpoint {
    socket: UdpSocket,
    log: logging::Logger,
}

impl DatagramEndpoint {
    #[inline]
    pub fn bind(port: u16) -> TransportResult<DatagramEndpoint> {
        Self::bind_with_logger(port, logging::Logger::root(logging::Discard, logging::o!()))
    }

    pub fn bind_with_logger(port: u16, log: logging::Logger) -> TransportResult<DatagramEndpoint> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;

        logging::debug!(log, "endpoint bound"; "context" => "bind", "port" => port);

        Ok(DatagramEndpoint { socket, log })
    }

    /// Attempts a single non-blocking sendto. Returns whether the OS accepted the whole buffer;
    /// no retry happens at this layer.
    pub fn send(&self, bytes: &[u8], host: &str, port: u16) -> bool {
        let accepted = match self.socket.send_to(bytes, (host, port)) {
            Ok(sent) => sent == bytes.len(),
            Err(_) => false,
        };

        logging::trace!(self.log, "send attempted";
            "context" => "send", "host" => host, "port" => port, "bytes" => bytes.len(), "accepted" => accepted);

        accepted
    }

    /// Non-blocking receive. Returns `None` immediately when no datagram is available; never
    /// blocks or loops internally.
    pub fn recv(&self) -> Option<(Vec<u8>, String, u16)> {
        let mut buf = [0u8; RECV_BUF_SIZE];

        match self.socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                logging::trace!(self.log, "datagram received"; "context" => "recv", "peer" => %addr, "bytes" => len);
                Some((buf[..len].to_vec(), addr.ip().to_string(), addr.port()))
            }
            Err(_) => None,
        }
    }

    #[inline]
    pub fn local_port(&self) -> Option<u16> {
        self.socket.local_addr().ok().map(|addr| addr.port())
    }
}
