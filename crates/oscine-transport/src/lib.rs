//! Oscine Transport Layer
//!
//! Async OSC transports over TCP and UDP, built on tokio:
//!
//! - TCP client and server with a choice of stream framing
//!   (length-prefixed or SLIP)
//! - UDP unicast client, server with reply-to-sender, bidirectional peer,
//!   and multicast group membership
//!
//! Every transport decodes incoming traffic into `oscine_core` packets and
//! exposes it as finite [`EventStream`]s. Bytes that fail to deframe or
//! decode are dropped at the ingress boundary: they never reach the event
//! stream and never close the underlying connection.

pub mod error;
pub mod events;
pub mod framing;
pub mod multicast;
pub mod tcp;
pub mod udp;

pub use error::{Result, TransportError};
pub use events::{ConnectionEvent, ConnectionId, ConnectionState, EventStream, SenderEndpoint};
pub use framing::{frame, Deframer, Framing, PlhDeframer, SlipDeframer};
pub use multicast::UdpMulticast;
pub use tcp::{TcpClient, TcpServer};
pub use udp::{UdpClient, UdpPeer, UdpServer};
