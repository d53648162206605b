//! Core data model: messages, bundles, packets

use crate::time::TimeTag;
use crate::value::Value;

/// An OSC message: an address pattern and its arguments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    /// Destination address pattern, e.g. `/eos/out/active/chan`
    pub address: String,
    /// Arguments in wire order
    pub args: Vec<Value>,
}

impl Message {
    /// Create a message with no arguments
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Create a message with arguments
    pub fn with_args(address: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Append an argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// An OSC bundle: a time tag over an ordered group of packets
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    /// Carried verbatim; this library does not schedule
    pub time_tag: TimeTag,
    /// Elements, each itself a message or a nested bundle
    pub content: Vec<Packet>,
}

impl Bundle {
    /// Create an empty bundle dispatched immediately
    pub fn new(time_tag: TimeTag) -> Self {
        Self {
            time_tag,
            content: Vec::new(),
        }
    }

    /// Create a bundle from its elements
    pub fn with_content(time_tag: TimeTag, content: Vec<Packet>) -> Self {
        Self { time_tag, content }
    }

    /// Append an element
    pub fn packet(mut self, packet: impl Into<Packet>) -> Self {
        self.content.push(packet.into());
        self
    }
}

impl Default for Bundle {
    fn default() -> Self {
        Self::new(TimeTag::IMMEDIATE)
    }
}

/// A message or a bundle
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Message(Message),
    Bundle(Bundle),
}

impl From<Message> for Packet {
    fn from(m: Message) -> Self {
        Packet::Message(m)
    }
}

impl From<Bundle> for Packet {
    fn from(b: Bundle) -> Self {
        Packet::Bundle(b)
    }
}
