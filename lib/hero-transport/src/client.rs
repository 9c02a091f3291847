use crate::endpoint::DatagramEndpoint;
use crate::error::TransportResult;
use crate::logging;
use hero_proto::fragment::{DEFAULT_FRAGMENT_PACING, DEFAULT_REASSEMBLY_TIMEOUT};
use hero_proto::{Flag, FragmentEngine, Packet, CHUNK_CAPACITY};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ClientState {
    Idle,
    Connecting,
    Connected,
    Closed,
}

/// Client-side connection state machine plus the public facade (C6) over it: `connect`, `send`,
/// `receive`, `ping`, `keep_alive`, `disconnect`.
pub struct HeroClient {
    endpoint: DatagramEndpoint,
    host: String,
    port: u16,
    state: ClientState,
    seq: u16,
    fragments: FragmentEngine,
    rtt_ms: Option<u64>,
    last_ping: Instant,
    pending_ping: Option<(u16, Instant)>,
    log: logging::Logger,
}

impl HeroClient {
    #[inline]
    pub fn new() -> TransportResult<HeroClient> {
        Self::with_logger(logging::Logger::root(logging::Discard, logging::o!()))
    }

    pub fn with_logger(log: logging::Logger) -> TransportResult<HeroClient> {
        Ok(HeroClient {
            endpoint: DatagramEndpoint::bind_with_logger(0, log.clone())?,
            host: String::new(),
            port: 0,
            state: ClientState::Idle,
            seq: 0,
            fragments: FragmentEngine::with_timeout(DEFAULT_REASSEMBLY_TIMEOUT),
            rtt_ms: None,
            last_ping: Instant::now(),
            pending_ping: None,
            log,
        })
    }

    #[inline]
    fn next_seq(&mut self) -> u16 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Updates RTT from a PONG's `seq` if it matches the in-flight PING, clearing it either way.
    /// Returns whether it matched.
    fn note_pong(&mut self, seq: u16) -> bool {
        match self.pending_ping {
            Some((ping_seq, sent_at)) if ping_seq == seq => {
                let rtt = Instant::now().saturating_duration_since(sent_at);
                self.rtt_ms = Some(rtt.as_millis() as u64);
                self.pending_ping = None;
                logging::debug!(self.log, "pong received"; "context" => "ping", "rtt_ms" => self.rtt_ms);
                true
            }
            _ => false,
        }
    }

    /// Performs the handshake: sends CONN and waits up to `DEFAULT_CONNECT_TIMEOUT` for a SEEN.
    /// Returns whether the connection was established.
    pub fn connect(&mut self, host: &str, port: u16, pubkey: &[u8]) -> bool {
        self.host = host.to_string();
        self.port = port;
        self.state = ClientState::Connecting;

        let seq = self.next_seq();
        let conn = Packet::new(Flag::Conn, seq, pubkey.to_vec(), Vec::new());
        self.endpoint.send(&conn.encode(), &self.host, self.port);

        let deadline = Instant::now() + DEFAULT_CONNECT_TIMEOUT;

        while Instant::now() < deadline {
            if let Some((bytes, from_host, from_port)) = self.endpoint.recv() {
                if from_host != self.host || from_port != self.port {
                    continue;
                }

                if let Ok(packet) = Packet::decode(&bytes) {
                    if packet.flag == Flag::Seen {
                        self.state = ClientState::Connected;
                        self.last_ping = Instant::now();
                        logging::debug!(self.log, "connected"; "context" => "connect", "host" => &self.host, "port" => self.port);
                        return true;
                    }
                }
                continue;
            }

            thread::sleep(POLL_INTERVAL);
        }

        self.state = ClientState::Closed;
        false
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    #[inline]
    pub fn ping_ms(&self) -> Option<u64> {
        self.rtt_ms
    }

    #[inline]
    pub fn sequence(&self) -> u16 {
        self.seq
    }

    /// Sends a raw payload as a GIVE, fragmenting automatically if it exceeds the chunk capacity.
    /// Returns `false` immediately, without touching the network, when not connected.
    pub fn send(&mut self, payload: &[u8], recipient_key: Option<&[u8]>) -> bool {
        if self.state != ClientState::Connected {
            return false;
        }

        if payload.len() <= CHUNK_CAPACITY {
            let seq = self.next_seq();
            let requirements = recipient_key.map(|key| key.to_vec()).unwrap_or_default();
            let packet = Packet::new(Flag::Give, seq, requirements, payload.to_vec());
            return self.endpoint.send(&packet.encode(), &self.host, self.port);
        }

        let fragments = self.fragments.split(Flag::Give, payload);
        let mut success = true;
        let last = fragments.len().saturating_sub(1);

        for (index, fragment) in fragments.iter().enumerate() {
            success &= self.endpoint.send(&fragment.encode(), &self.host, self.port);
            if index != last {
                thread::sleep(DEFAULT_FRAGMENT_PACING);
            }
        }

        success
    }

    #[inline]
    pub fn send_text(&mut self, text: &str) -> bool {
        self.send(text.as_bytes(), None)
    }

    #[inline]
    pub fn send_command(&mut self, mnemonic: &str, args: &[&str]) -> bool {
        self.send(&hero_proto::encode_command(mnemonic, args), None)
    }

    /// Polls up to `timeout` for the next application-visible packet, acking it (SEEN) before
    /// returning it. PONGs are consumed internally to update RTT; malformed datagrams are
    /// dropped silently.
    pub fn receive(&mut self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some((bytes, from_host, from_port)) = self.endpoint.recv() {
                if from_host != self.host || from_port != self.port {
                    continue;
                }

                let decoded = match Packet::decode(&bytes) {
                    Ok(packet) => packet,
                    Err(_) => continue,
                };

                let packet = if decoded.flag == Flag::Frag {
                    match self.fragments.feed(&decoded, Instant::now()) {
                        Some(reassembled) => reassembled,
                        None => continue,
                    }
                } else {
                    decoded
                };

                match packet.flag {
                    Flag::Pong => {
                        self.note_pong(packet.seq);
                        continue;
                    }
                    Flag::Seen => continue,
                    _ => {
                        let seen = Packet::new(Flag::Seen, packet.seq, Vec::new(), Vec::new());
                        self.endpoint.send(&seen.encode(), &self.host, self.port);
                        return Some(packet);
                    }
                }
            }

            if Instant::now() >= deadline {
                return None;
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Sends a PING and waits up to `DEFAULT_PING_TIMEOUT` for the matching PONG, updating RTT.
    pub fn ping(&mut self) -> bool {
        let seq = self.next_seq();
        let sent_at = Instant::now();
        self.last_ping = sent_at;
        self.pending_ping = Some((seq, sent_at));

        let ping = Packet::new(Flag::Ping, seq, Vec::new(), Vec::new());
        self.endpoint.send(&ping.encode(), &self.host, self.port);

        let deadline = sent_at + DEFAULT_PING_TIMEOUT;

        while Instant::now() < deadline {
            if let Some((bytes, from_host, from_port)) = self.endpoint.recv() {
                if from_host == self.host && from_port == self.port {
                    if let Ok(packet) = Packet::decode(&bytes) {
                        if packet.flag == Flag::Pong && self.note_pong(packet.seq) {
                            return true;
                        }
                    }
                }
                continue;
            }

            thread::sleep(POLL_INTERVAL);
        }

        false
    }

    /// Invokes `ping` if more than `DEFAULT_KEEPALIVE_INTERVAL` has elapsed since the last one.
    pub fn keep_alive(&mut self) -> bool {
        if Instant::now().duration_since(self.last_ping) >= DEFAULT_KEEPALIVE_INTERVAL {
            return self.ping();
        }

        true
    }

    /// Emits STOP and transitions to `Closed`. Does not wait for an ack.
    pub fn disconnect(&mut self) {
        if self.state == ClientState::Connected {
            let seq = self.next_seq();
            let stop = Packet::new(Flag::Stop, seq, Vec::new(), Vec::new());
            self.endpoint.send(&stop.encode(), &self.host, self.port);
        }

        self.state = ClientState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_client_is_not_connected() {
        let client = HeroClient::new().unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.ping_ms(), None);
    }

    #[test]
    fn test_send_before_connect_returns_false_without_touching_the_network() {
        let mut client = HeroClient::new().unwrap();
        assert!(!client.send(b"hi", None));
    }

    #[test]
    fn test_connect_to_nothing_times_out_and_closes() {
        // Port 1 is reserved and nothing answers on loopback; connect must time out rather than hang.
        let mut client = HeroClient::new().unwrap();
        let started = Instant::now();
        assert!(!client.connect("127.0.0.1", 1, &[1, 2, 3, 4]));
        assert!(started.elapsed() >= DEFAULT_CONNECT_TIMEOUT);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_note_pong_updates_rtt_only_for_the_matching_ping() {
        let mut client = HeroClient::new().unwrap();
        assert!(!client.note_pong(0));
        assert_eq!(client.ping_ms(), None);

        client.pending_ping = Some((7, Instant::now()));
        assert!(!client.note_pong(8));
        assert_eq!(client.ping_ms(), None);

        assert!(client.note_pong(7));
        assert!(client.ping_ms().is_some());
        assert!(client.pending_ping.is_none());
    }

    #[test]
    fn test_sequence_numbers_increment_and_wrap() {
        let mut client = HeroClient::new().unwrap();
        assert_eq!(client.next_seq(), 0);
        assert_eq!(client.next_seq(), 1);
        client.seq = u16::MAX;
        assert_eq!(client.next_seq(), u16::MAX);
        assert_eq!(client.sequence(), 0);
    }
}
