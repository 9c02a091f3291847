//! Wire-level building blocks for the HERO datagram protocol: packet framing, large-message
//! fragmentation and the command-mnemonic payload codec. Nothing in this crate touches a socket.

pub mod command;
pub mod fragment;
pub mod packet;

pub use command::{decode as decode_command, encode as encode_command, register as register_mnemonic};
pub use fragment::{FragmentEngine, CHUNK_CAPACITY};
pub use packet::{CodecError, Flag, Packet, VERSION};
