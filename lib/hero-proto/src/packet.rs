use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::TryFrom;
use std::io::Cursor;

/// Protocol version this codec speaks. A peer stamping a different byte in the header is treated
/// as incompatible rather than as a candidate for fallback decoding.
pub const VERSION: u8 = 2;

pub const HEADER_SIZE: usize = 8;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum Flag {
    Conn = 0,
    Give = 1,
    Take = 2,
    Seen = 3,
    Stop = 4,
    Frag = 5,
    Ping = 6,
    Pong = 7,
}

impl From<Flag> for u8 {
    #[inline]
    fn from(flag: Flag) -> Self {
        flag as u8
    }
}

impl TryFrom<u8> for Flag {
    type Error = CodecError;

    #[inline]
    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            0 => Flag::Conn,
            1 => Flag::Give,
            2 => Flag::Take,
            3 => Flag::Seen,
            4 => Flag::Stop,
            5 => Flag::Frag,
            6 => Flag::Ping,
            7 => Flag::Pong,
            _ => return Err(CodecError::UnknownFlag),
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum CodecError {
    TooSmall,
    Truncated,
    UnknownFlag,
    VersionMismatch,
}

/// A single HERO packet: the unit the fragment engine and connection core manipulate. Decoding
/// never surfaces a partial packet, and a decoded packet re-encodes to the exact same bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub flag: Flag,
    pub version: u8,
    pub seq: u16,
    pub requirements: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Packet {
    #[inline]
    pub fn new(flag: Flag, seq: u16, requirements: Vec<u8>, payload: Vec<u8>) -> Packet {
        Packet {
            flag,
            version: VERSION,
            seq,
            requirements,
            payload,
        }
    }

    /// Encodes the packet into a freshly allocated buffer. Always succeeds.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.requirements.len() + self.payload.len());

        buf.write_u8(self.flag.into()).expect("write to Vec cannot fail");
        buf.write_u8(self.version).expect("write to Vec cannot fail");
        buf.write_u16::<BigEndian>(self.seq).expect("write to Vec cannot fail");
        buf.write_u16::<BigEndian>(self.payload.len() as u16)
            .expect("write to Vec cannot fail");
        buf.write_u16::<BigEndian>(self.requirements.len() as u16)
            .expect("write to Vec cannot fail");
        buf.extend_from_slice(&self.requirements);
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Decodes a packet, rejecting it outright if the version byte does not match `VERSION`.
    pub fn decode(bytes: &[u8]) -> Result<Packet, CodecError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::TooSmall);
        }

        let mut cursor = Cursor::new(bytes);

        let flag = Flag::try_from(cursor.read_u8().expect("length checked above"))?;
        let version = cursor.read_u8().expect("length checked above");

        if version != VERSION {
            return Err(CodecError::VersionMismatch);
        }

        let seq = cursor.read_u16::<BigEndian>().expect("length checked above");
        let payload_len = cursor.read_u16::<BigEndian>().expect("length checked above") as usize;
        let requirements_len = cursor.read_u16::<BigEndian>().expect("length checked above") as usize;

        let body = &bytes[HEADER_SIZE..];
        if body.len() != requirements_len + payload_len {
            return Err(CodecError::Truncated);
        }

        let requirements = body[..requirements_len].to_vec();
        let payload = body[requirements_len..].to_vec();

        Ok(Packet {
            flag,
            version,
            seq,
            requirements,
            payload,
        })
    }
}
