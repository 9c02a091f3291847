use crate::packet::{Flag, Packet};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hashbrown::HashMap;
use std::convert::TryFrom;
use std::time::{Duration, Instant};

/// Size of the sub-header carried inside every FRAG packet's payload: msg_id, fragment index,
/// total fragment count (all little-endian u16) and the original flag byte.
pub const FRAGMENT_HEADER_SIZE: usize = 7;

/// Logical payload bytes carried per fragment, chosen to stay well under the ~65 507-byte UDP
/// payload limit once the fragment sub-header and the top-level packet header are added.
pub const CHUNK_CAPACITY: usize = 60_000;

pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FRAGMENT_PACING: Duration = Duration::from_millis(1);

struct Reassembly {
    total_fragments: u16,
    original_flag: Flag,
    chunks: HashMap<u16, Vec<u8>>,
    last_seq: u16,
    last_update: Instant,
}

/// Splits oversize payloads into FRAG packets at the sender, and reassembles them at the
/// receiver. One engine instance owns one reassembly table; it is never shared across endpoints.
pub struct FragmentEngine {
    next_msg_id: u16,
    reassembly_timeout: Duration,
    reassembly: HashMap<u16, Reassembly>,
}

impl FragmentEngine {
    #[inline]
    pub fn new() -> FragmentEngine {
        FragmentEngine::with_timeout(DEFAULT_REASSEMBLY_TIMEOUT)
    }

    #[inline]
    pub fn with_timeout(reassembly_timeout: Duration) -> FragmentEngine {
        FragmentEngine {
            next_msg_id: 0,
            reassembly_timeout,
            reassembly: HashMap::new(),
        }
    }

    /// Splits `payload` into FRAG packets carrying `original_flag`, ready to be sent in order.
    /// The caller is expected to pace the sends (see `DEFAULT_FRAGMENT_PACING`).
    pub fn split(&mut self, original_flag: Flag, payload: &[u8]) -> Vec<Packet> {
        let msg_id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);

        let total_fragments = ((payload.len() + CHUNK_CAPACITY - 1) / CHUNK_CAPACITY).max(1) as u16;

        payload
            .chunks(CHUNK_CAPACITY)
            .enumerate()
            .map(|(index, chunk)| {
                let mut body = Vec::with_capacity(FRAGMENT_HEADER_SIZE + chunk.len());
                body.write_u16::<LittleEndian>(msg_id).expect("write to Vec cannot fail");
                body.write_u16::<LittleEndian>(index as u16).expect("write to Vec cannot fail");
                body.write_u16::<LittleEndian>(total_fragments)
                    .expect("write to Vec cannot fail");
                body.write_u8(original_flag.into()).expect("write to Vec cannot fail");
                body.extend_from_slice(chunk);

                Packet::new(Flag::Frag, index as u16, Vec::new(), body)
            })
            .collect()
    }

    /// Feeds one inbound FRAG packet to the reassembly table. Returns the synthesized logical
    /// packet once every fragment of its message has arrived; malformed or inconsistent fragments
    /// are dropped silently.
    pub fn feed(&mut self, packet: &Packet, now: Instant) -> Option<Packet> {
        debug_assert_eq!(packet.flag, Flag::Frag);

        if packet.payload.len() < FRAGMENT_HEADER_SIZE {
            return None;
        }

        let mut cursor = &packet.payload[..];
        let msg_id = cursor.read_u16::<LittleEndian>().ok()?;
        let fragment_index = cursor.read_u16::<LittleEndian>().ok()?;
        let total_fragments = cursor.read_u16::<LittleEndian>().ok()?;
        let original_flag = Flag::try_from(cursor.read_u8().ok()?).ok()?;
        let data = &packet.payload[FRAGMENT_HEADER_SIZE..];

        if fragment_index >= total_fragments {
            return None;
        }

        let record = self.reassembly.entry(msg_id).or_insert_with(|| Reassembly {
            total_fragments,
            original_flag,
            chunks: HashMap::new(),
            last_seq: packet.seq,
            last_update: now,
        });

        if record.total_fragments != total_fragments {
            return None;
        }

        record.chunks.insert(fragment_index, data.to_vec());
        record.last_seq = packet.seq;
        record.last_update = now;

        if record.chunks.len() != record.total_fragments as usize {
            return None;
        }

        let record = self.reassembly.remove(&msg_id).expect("just inserted above");

        let mut payload = Vec::new();
        for index in 0..record.total_fragments {
            payload.extend_from_slice(record.chunks.get(&index).expect("length matched total_fragments"));
        }

        Some(Packet::new(record.original_flag, record.last_seq, Vec::new(), payload))
    }

    /// Destroys every reassembly record whose last update is older than the reassembly timeout.
    pub fn sweep(&mut self, now: Instant) {
        let timeout = self.reassembly_timeout;
        self.reassembly
            .retain(|_, record| now.duration_since(record.last_update) < timeout);
    }

    #[inline]
    pub fn pending_messages(&self) -> usize {
        self.reassembly.len()
    }
}

impl Default for FragmentEngine {
    #[inline]
    fn default() -> Self {
        FragmentEngine::new()
    }
}
