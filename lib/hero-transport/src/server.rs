use crate::endpoint::DatagramEndpoint;
use crate::error::TransportResult;
use crate::logging;
use hero_proto::fragment::{DEFAULT_FRAGMENT_PACING, DEFAULT_REASSEMBLY_TIMEOUT};
use hero_proto::{Flag, FragmentEngine, Packet, CHUNK_CAPACITY};
use indexmap::IndexMap;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_PEER_STALE_TIMEOUT: Duration = Duration::from_secs(30);

struct Peer {
    pubkey: Vec<u8>,
    last_seen: Instant,
    last_ping: Instant,
    seq: u16,
    fragments: FragmentEngine,
}

impl Peer {
    fn new(pubkey: Vec<u8>, now: Instant) -> Peer {
        Peer {
            pubkey,
            last_seen: now,
            last_ping: now,
            seq: 0,
            fragments: FragmentEngine::with_timeout(DEFAULT_REASSEMBLY_TIMEOUT),
        }
    }

    #[inline]
    fn next_seq(&mut self) -> u16 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }
}

/// Non-owning capability handed to the `poll` handler so it can reply to the packet it was just
/// given, without the packet holding a back-reference into the server.
pub struct ReplyHandle<'a> {
    endpoint: &'a DatagramEndpoint,
    host: String,
    port: u16,
    peer: &'a mut Peer,
}

impl<'a> ReplyHandle<'a> {
    /// Sends `payload` back to the peer that triggered this handler call, fragmenting
    /// automatically if it exceeds the chunk capacity.
    pub fn reply(&mut self, payload: &[u8]) -> bool {
        send_give(self.endpoint, self.peer, &self.host, self.port, payload)
    }
}

fn send_give(endpoint: &DatagramEndpoint, peer: &mut Peer, host: &str, port: u16, payload: &[u8]) -> bool {
    if payload.len() <= CHUNK_CAPACITY {
        let seq = peer.next_seq();
        let packet = Packet::new(Flag::Give, seq, Vec::new(), payload.to_vec());
        return endpoint.send(&packet.encode(), host, port);
    }

    let fragments = peer.fragments.split(Flag::Give, payload);
    let mut success = true;
    let last = fragments.len().saturating_sub(1);

    for (index, fragment) in fragments.iter().enumerate() {
        success &= endpoint.send(&fragment.encode(), host, port);
        if index != last {
            thread::sleep(DEFAULT_FRAGMENT_PACING);
        }
    }

    success
}

/// Server-side per-peer state machine plus the public facade (C6) over it: `poll`, `send_to`,
/// `broadcast`, and peer-registry introspection. Peers are keyed by `"<host>:<port>"`.
pub struct HeroServer {
    endpoint: DatagramEndpoint,
    peers: IndexMap<String, Peer>,
    running: bool,
    last_sweep: Instant,
    log: logging::Logger,
}

impl HeroServer {
    #[inline]
    pub fn start(port: u16) -> TransportResult<HeroServer> {
        Self::start_with_logger(port, logging::Logger::root(logging::Discard, logging::o!()))
    }

    pub fn start_with_logger(port: u16, log: logging::Logger) -> TransportResult<HeroServer> {
        Ok(HeroServer {
            endpoint: DatagramEndpoint::bind_with_logger(port, log.clone())?,
            peers: IndexMap::new(),
            running: true,
            last_sweep: Instant::now(),
            log,
        })
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn local_port(&self) -> Option<u16> {
        self.endpoint.local_port()
    }

    #[inline]
    pub fn stop(&mut self) {
        self.running = false;
    }

    #[inline]
    pub fn client_count(&self) -> usize {
        self.peers.len()
    }

    #[inline]
    pub fn peer_pubkey(&self, host: &str, port: u16) -> Option<&[u8]> {
        self.peers.get(&peer_key(host, port)).map(|peer| peer.pubkey.as_slice())
    }

    /// Returns the next outgoing sequence number for a peer, i.e. the running sequence counter
    /// `send_to`/`broadcast` will stamp on the next packet sent to it.
    #[inline]
    pub fn peer_sequence(&self, host: &str, port: u16) -> Option<u16> {
        self.peers.get(&peer_key(host, port)).map(|peer| peer.seq)
    }

    /// Drains every currently-available datagram, dispatching application packets to `handler`,
    /// then runs the per-peer fragment sweep and the peer-stale sweep.
    pub fn poll<F: FnMut(&Packet, &str, u16, &mut ReplyHandle)>(&mut self, mut handler: F) {
        while let Some((bytes, host, port)) = self.endpoint.recv() {
            self.handle_datagram(&bytes, &host, port, &mut handler);
        }

        let now = Instant::now();
        for peer in self.peers.values_mut() {
            peer.fragments.sweep(now);
        }

        self.cleanup_stale_clients(DEFAULT_PEER_STALE_TIMEOUT);
        self.last_sweep = now;
    }

    fn handle_datagram<F: FnMut(&Packet, &str, u16, &mut ReplyHandle)>(
        &mut self,
        bytes: &[u8],
        host: &str,
        port: u16,
        handler: &mut F,
    ) {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(_) => return,
        };

        let key = peer_key(host, port);
        let now = Instant::now();

        match packet.flag {
            Flag::Conn => {
                self.peers.insert(key, Peer::new(packet.requirements.clone(), now));
                self.ack(host, port, packet.seq);
                logging::debug!(self.log, "peer connected"; "context" => "conn", "peer" => format!("{}:{}", host, port));
            }
            Flag::Stop => {
                self.ack(host, port, packet.seq);
                self.peers.shift_remove(&key);
                logging::debug!(self.log, "peer stopped"; "context" => "stop", "peer" => format!("{}:{}", host, port));
            }
            Flag::Ping => {
                if let Some(peer) = self.peers.get_mut(&key) {
                    peer.last_ping = now;
                    let pong = Packet::new(Flag::Pong, packet.seq, Vec::new(), Vec::new());
                    self.endpoint.send(&pong.encode(), host, port);
                }
            }
            Flag::Frag => {
                let reassembled = match self.peers.get_mut(&key) {
                    Some(peer) => peer.fragments.feed(&packet, now),
                    None => None,
                };

                if let Some(reassembled) = reassembled {
                    self.ack(host, port, reassembled.seq);
                    self.dispatch(&reassembled, host, port, handler);
                }
            }
            Flag::Seen | Flag::Pong => {}
            Flag::Give | Flag::Take => {
                if self.peers.contains_key(&key) {
                    self.ack(host, port, packet.seq);
                    self.dispatch(&packet, host, port, handler);
                }
            }
        }
    }

    fn dispatch<F: FnMut(&Packet, &str, u16, &mut ReplyHandle)>(
        &mut self,
        packet: &Packet,
        host: &str,
        port: u16,
        handler: &mut F,
    ) {
        let key = peer_key(host, port);
        if let Some(peer) = self.peers.get_mut(&key) {
            peer.last_seen = Instant::now();

            let mut reply = ReplyHandle {
                endpoint: &self.endpoint,
                host: host.to_string(),
                port,
                peer,
            };

            handler(packet, host, port, &mut reply);
        }
    }

    fn ack(&self, host: &str, port: u16, seq: u16) {
        let seen = Packet::new(Flag::Seen, seq, Vec::new(), Vec::new());
        self.endpoint.send(&seen.encode(), host, port);
    }

    /// Sends `payload` to a specific peer as a GIVE, fragmenting automatically. Returns `false`
    /// without touching the network if the peer is not registered.
    pub fn send_to(&mut self, host: &str, port: u16, payload: &[u8]) -> bool {
        let key = peer_key(host, port);
        match self.peers.get_mut(&key) {
            Some(peer) => send_give(&self.endpoint, peer, host, port, payload),
            None => false,
        }
    }

    /// Sends `payload` to every registered peer. Returns whether every send succeeded.
    pub fn broadcast(&mut self, payload: &[u8]) -> bool {
        let peers: Vec<String> = self.peers.keys().cloned().collect();
        let mut success = true;

        for key in peers {
            if let Some((host, port)) = split_peer_key(&key) {
                success &= self.send_to(&host, port, payload);
            }
        }

        success
    }

    /// Evicts every peer whose `last_seen` is older than `timeout`. Returns the number evicted.
    pub fn cleanup_stale_clients(&mut self, timeout: Duration) -> usize {
        let now = Instant::now();
        let before = self.peers.len();

        self.peers.retain(|_, peer| now.duration_since(peer.last_seen) < timeout);

        before - self.peers.len()
    }
}

#[inline]
fn peer_key(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

fn split_peer_key(key: &str) -> Option<(String, u16)> {
    let (host, port) = key.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}
