//! The client and server facades over the HERO wire protocol: a non-blocking UDP endpoint, the
//! connection lifecycle state machines, and the peer registry. Built on top of `hero_proto`.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod server;

pub use client::HeroClient;
pub use endpoint::DatagramEndpoint;
pub use error::{ErrorUtils, TransportError, TransportResult};
pub use server::{HeroServer, ReplyHandle};
