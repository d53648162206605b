//! Oscine Core
//!
//! OSC 1.0 primitives for show-control and live-performance systems.
//!
//! This crate provides:
//! - The argument and packet data model ([`Value`], [`Message`], [`Bundle`], [`Packet`])
//! - The binary wire codec ([`encode`], [`decode`])
//! - Address pattern matching ([`pattern::matches`])
//! - A dispatching handler registry ([`AddressSpace`])
//!
//! Codec and matcher functions never suspend; the async transports live in
//! `oscine-transport`.

pub mod decode;
pub mod encode;
pub mod error;
pub mod message;
pub mod pattern;
pub mod space;
pub mod time;
pub mod value;

pub use decode::decode;
pub use encode::{encode, encode_bundle, encode_message};
pub use error::{Error, Result};
pub use message::{Bundle, Message, Packet};
pub use space::{AddressSpace, Handler, HandlerId};
pub use time::TimeTag;
pub use value::{Color, MidiMessage, Value};
