//! TCP stream framing
//!
//! TCP carries no record boundaries, so OSC-over-TCP needs one of two
//! framings:
//!
//! - **Length-prefixed** (a.k.a. Packet Length Header): a 4-byte big-endian
//!   payload length before each packet. Self-synchronising only while every
//!   sender honors the header.
//! - **SLIP**: 0xC0 frame boundaries with 0xDB escaping, per RFC 1055.
//!   Resynchronises on the next boundary byte regardless of damage.
//!
//! Deframers are single-writer; each transport feeds one from exactly one
//! task.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};

const SLIP_END: u8 = 0xC0;
const SLIP_ESC: u8 = 0xDB;
const SLIP_ESC_END: u8 = 0xDC;
const SLIP_ESC_ESC: u8 = 0xDD;

/// Framing selection for the TCP transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// 4-byte big-endian length prefix
    #[default]
    LengthPrefixed,
    /// END/ESC byte stuffing
    Slip,
}

/// Frame one payload for the wire
pub fn frame(framing: Framing, payload: &[u8]) -> Bytes {
    match framing {
        Framing::LengthPrefixed => {
            let mut buf = BytesMut::with_capacity(4 + payload.len());
            buf.put_u32(payload.len() as u32);
            buf.put_slice(payload);
            buf.freeze()
        }
        Framing::Slip => {
            let mut buf = BytesMut::with_capacity(2 + payload.len());
            buf.put_u8(SLIP_END);
            for &b in payload {
                match b {
                    SLIP_END => buf.put_slice(&[SLIP_ESC, SLIP_ESC_END]),
                    SLIP_ESC => buf.put_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
                    other => buf.put_u8(other),
                }
            }
            buf.put_u8(SLIP_END);
            buf.freeze()
        }
    }
}

/// Incremental deframer over an arbitrarily chunked byte stream
#[derive(Debug)]
pub enum Deframer {
    LengthPrefixed(PlhDeframer),
    Slip(SlipDeframer),
}

impl Deframer {
    pub fn new(framing: Framing) -> Self {
        match framing {
            Framing::LengthPrefixed => Deframer::LengthPrefixed(PlhDeframer::new()),
            Framing::Slip => Deframer::Slip(SlipDeframer::new()),
        }
    }

    /// Append raw stream bytes
    pub fn feed(&mut self, bytes: &[u8]) {
        match self {
            Deframer::LengthPrefixed(d) => d.feed(bytes),
            Deframer::Slip(d) => d.feed(bytes),
        }
    }

    /// Drain the next complete payload, if one has arrived
    pub fn next_packet(&mut self) -> Option<Bytes> {
        match self {
            Deframer::LengthPrefixed(d) => d.next_packet(),
            Deframer::Slip(d) => d.next_packet(),
        }
    }
}

/// Length-prefix deframer
///
/// Partial frames are never discarded; a header whose declared length has
/// not fully arrived stays buffered until it has.
#[derive(Debug, Default)]
pub struct PlhDeframer {
    buf: BytesMut,
}

impl PlhDeframer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_packet(&mut self) -> Option<Bytes> {
        if self.buf.len() < 4 {
            return None;
        }
        let declared = u32::from_be_bytes(self.buf[..4].try_into().expect("4 bytes")) as usize;
        // A zero-length frame would drain nothing forever; report not-ready
        // instead of spinning on an empty payload
        if declared == 0 {
            return None;
        }
        if self.buf.len() < 4 + declared {
            return None;
        }
        self.buf.advance(4);
        Some(self.buf.split_to(declared).freeze())
    }

    /// Bytes currently held back as an incomplete frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// SLIP deframer
///
/// Empty frames between END bytes are ignored, which lets peers flush line
/// noise with a leading END. An unknown escape passes the raw byte through
/// rather than poisoning the stream.
#[derive(Debug, Default)]
pub struct SlipDeframer {
    partial: BytesMut,
    escaped: bool,
    complete: VecDeque<Bytes>,
}

impl SlipDeframer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.escaped {
                match b {
                    SLIP_ESC_END => self.partial.put_u8(SLIP_END),
                    SLIP_ESC_ESC => self.partial.put_u8(SLIP_ESC),
                    other => self.partial.put_u8(other),
                }
                self.escaped = false;
            } else {
                match b {
                    SLIP_END => {
                        if !self.partial.is_empty() {
                            self.complete.push_back(self.partial.split().freeze());
                        }
                    }
                    SLIP_ESC => self.escaped = true,
                    other => self.partial.put_u8(other),
                }
            }
        }
    }

    pub fn next_packet(&mut self) -> Option<Bytes> {
        self.complete.pop_front()
    }

    /// Bytes of the current partial payload
    pub fn buffered(&self) -> usize {
        self.partial.len()
    }
}
