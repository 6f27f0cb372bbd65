//! Network Layer
//!
//! Wire header, game descriptor and the transport contract.
//! This layer is **non-deterministic** - ordering guarantees come from the
//! transport, state changes happen in `session/`.

pub mod descriptor;
pub mod header;
pub mod loopback;
pub mod transport;

pub use descriptor::{DescriptorError, GameDescriptor};
pub use header::{
    build_packet, check_body_len, parse_packet, HeaderError, PacketHeader, Tile, Vitals, HEADER_SIZE,
    MAX_PACKET_SIZE,
};
pub use loopback::{LoopbackHub, LoopbackTransport};
pub use transport::{
    EventKind, Inbound, PeerLink, Target, Transport, TransportError, TransportEvent, TurnRound,
};
