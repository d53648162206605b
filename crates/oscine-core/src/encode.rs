//! OSC wire encoder
//!
//! The encoder is total over well-formed in-memory values: any packet the
//! data model can represent produces bytes, with two exceptions surfaced as
//! errors (an address without a leading '/', a non-ASCII char argument).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::message::{Bundle, Message, Packet};
use crate::value::Value;

/// The literal first 8 bytes of every bundle
pub(crate) const BUNDLE_HEADER: &[u8; 8] = b"#bundle\0";

/// Encode a packet to OSC wire bytes
pub fn encode(packet: &Packet) -> Result<Bytes> {
    match packet {
        Packet::Message(msg) => encode_message(msg),
        Packet::Bundle(bundle) => encode_bundle(bundle),
    }
}

/// Encode a single message
pub fn encode_message(message: &Message) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(estimate_message_size(message));
    write_message(&mut buf, message)?;
    Ok(buf.freeze())
}

/// Encode a single bundle
pub fn encode_bundle(bundle: &Bundle) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64);
    write_bundle(&mut buf, bundle)?;
    Ok(buf.freeze())
}

fn write_message(buf: &mut BytesMut, message: &Message) -> Result<()> {
    if !message.address.starts_with('/') {
        return Err(Error::InvalidAddress);
    }

    write_padded_str(buf, &message.address);

    let mut tags = String::with_capacity(1 + message.args.len());
    tags.push(',');
    for arg in &message.args {
        push_tags(&mut tags, arg)?;
    }
    write_padded_str(buf, &tags);

    for arg in &message.args {
        write_value(buf, arg)?;
    }

    Ok(())
}

fn write_bundle(buf: &mut BytesMut, bundle: &Bundle) -> Result<()> {
    buf.put_slice(BUNDLE_HEADER);
    buf.put_u64(bundle.time_tag.raw());

    for element in &bundle.content {
        let encoded = encode(element)?;
        buf.put_i32(encoded.len() as i32);
        buf.put_slice(&encoded);
    }

    Ok(())
}

/// Append the tag characters for one argument, recursing into arrays.
/// Brackets carry the array structure; the payload stays flat.
fn push_tags(tags: &mut String, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => {
            tags.push('[');
            for item in items {
                push_tags(tags, item)?;
            }
            tags.push(']');
        }
        Value::Char(c) if !c.is_ascii() => return Err(Error::InvalidCharacter(*c)),
        other => {
            // Every non-array variant reports a scalar tag
            tags.push(other.type_tag().expect("scalar value has a tag"));
        }
    }
    Ok(())
}

fn write_value(buf: &mut BytesMut, value: &Value) -> Result<()> {
    match value {
        Value::Int32(v) => buf.put_i32(*v),
        Value::Int64(v) => buf.put_i64(*v),
        Value::Float32(v) => buf.put_f32(*v),
        Value::Float64(v) => buf.put_f64(*v),
        Value::String(s) | Value::Symbol(s) => write_padded_str(buf, s),
        Value::Blob(bytes) => {
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(bytes);
            let pad = (4 - bytes.len() % 4) % 4;
            buf.put_bytes(0, pad);
        }
        Value::Bool(_) | Value::Nil | Value::Impulse => {}
        Value::TimeTag(tag) => buf.put_u64(tag.raw()),
        Value::Char(c) => {
            if !c.is_ascii() {
                return Err(Error::InvalidCharacter(*c));
            }
            buf.put_u32(*c as u32);
        }
        Value::Color(c) => {
            buf.put_slice(&[c.red, c.green, c.blue, c.alpha]);
        }
        Value::Midi(m) => {
            buf.put_slice(&[m.port, m.status, m.data1, m.data2]);
        }
        Value::Array(items) => {
            for item in items {
                write_value(buf, item)?;
            }
        }
    }
    Ok(())
}

/// Write a NUL-terminated string zero-padded to a 4-byte boundary
fn write_padded_str(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    let pad = 4 - s.len() % 4;
    buf.put_bytes(0, pad);
}

fn estimate_message_size(msg: &Message) -> usize {
    let payload: usize = msg
        .args
        .iter()
        .map(|arg| match arg {
            Value::String(s) | Value::Symbol(s) => s.len() + 4,
            Value::Blob(b) => b.len() + 8,
            _ => 8,
        })
        .sum();
    msg.address.len() + 4 + msg.args.len() + 4 + payload
}
