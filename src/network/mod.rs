//! Network Module
//!
//! Wire protocol, the transport abstraction, and its UDP and in-memory
//! implementations.

mod interfaces;
mod memory;
mod message;
mod transport;
mod udp;

pub use interfaces::{broadcast_address, lan_interface, LanInterface};
pub use memory::{MemoryEndpoint, MemoryNetwork};
pub use message::{Heartbeat, Message, MAX_DATAGRAM_SIZE};
pub use transport::{DatagramHandler, Transport};
pub use udp::UdpTransport;
