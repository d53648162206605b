//! Wire codec tests: literal byte vectors, round-trips, failure modes

use oscine_core::{
    decode, encode, encode_bundle, encode_message, Bundle, Color, Error, Message, MidiMessage,
    Packet, TimeTag, Value,
};

fn roundtrip(packet: Packet) -> Packet {
    let bytes = encode(&packet).expect("encode failed");
    decode(&bytes).expect("decode failed")
}

#[test]
fn test_empty_message_exact_bytes() {
    let bytes = encode_message(&Message::new("/test")).unwrap();
    assert_eq!(
        bytes.as_ref(),
        &[0x2F, 0x74, 0x65, 0x73, 0x74, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00]
    );
}

#[test]
fn test_int32_message_exact_bytes() {
    let msg = Message::new("/v").arg(256i32);
    let bytes = encode_message(&msg).unwrap();
    assert_eq!(bytes.len(), 12);
    assert_eq!(&bytes[8..], &[0x00, 0x00, 0x01, 0x00]);

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, Packet::Message(msg));
}

#[test]
fn test_bundle_exact_bytes() {
    let bundle = Bundle::new(TimeTag::IMMEDIATE).packet(Message::new("/a").arg(42i32));
    let bytes = encode_bundle(&bundle).unwrap();

    // header + time tag + element length + 12-byte message
    assert_eq!(bytes.len(), 32);
    assert_eq!(&bytes[..8], b"#bundle\0");
    assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0, 0, 0, 1]);
    assert_eq!(&bytes[16..20], &[0, 0, 0, 0x0C]);
    assert_eq!(&bytes[20..], b"/a\0\0,i\0\0\x00\x00\x00\x2A");
    assert_eq!(decode(&bytes).unwrap(), Packet::Bundle(bundle));
}

#[test]
fn test_int_boundaries_roundtrip() {
    for v in [i32::MIN, 0, i32::MAX] {
        let packet = Packet::Message(Message::new("/i").arg(v));
        assert_eq!(roundtrip(packet.clone()), packet);
    }
    for v in [i64::MIN, 0, i64::MAX] {
        let packet = Packet::Message(Message::new("/h").arg(v));
        assert_eq!(roundtrip(packet.clone()), packet);
    }
}

#[test]
fn test_float_boundaries_roundtrip() {
    for v in [0.0f32, -0.0, 1.0, -1.0, f32::INFINITY, f32::NEG_INFINITY] {
        let packet = Packet::Message(Message::new("/f").arg(v));
        match roundtrip(packet) {
            Packet::Message(msg) => {
                assert_eq!(msg.args[0].as_f32().unwrap().to_bits(), v.to_bits());
            }
            _ => panic!("expected message"),
        }
    }
    for v in [0.0f64, -0.0, 1.0, -1.0, f64::INFINITY, f64::NEG_INFINITY] {
        let packet = Packet::Message(Message::new("/d").arg(v));
        match roundtrip(packet) {
            Packet::Message(msg) => {
                assert_eq!(msg.args[0].as_f64().unwrap().to_bits(), v.to_bits());
            }
            _ => panic!("expected message"),
        }
    }
}

#[test]
fn test_nan_preserved_by_bit_pattern() {
    let quiet = f32::NAN;
    let packet = Packet::Message(Message::new("/f").arg(quiet));
    match roundtrip(packet) {
        Packet::Message(msg) => {
            assert_eq!(msg.args[0].as_f32().unwrap().to_bits(), quiet.to_bits());
        }
        _ => panic!("expected message"),
    }

    let signalling_bits = 0x7FF0_0000_0000_0001u64;
    let packet = Packet::Message(Message::new("/d").arg(f64::from_bits(signalling_bits)));
    match roundtrip(packet) {
        Packet::Message(msg) => {
            assert_eq!(msg.args[0].as_f64().unwrap().to_bits(), signalling_bits);
        }
        _ => panic!("expected message"),
    }
}

#[test]
fn test_string_roundtrip() {
    for s in ["", "x", "abc", "abcd", "four four four"] {
        let packet = Packet::Message(Message::new("/s").arg(s));
        assert_eq!(roundtrip(packet.clone()), packet);
    }
}

#[test]
fn test_symbol_distinct_from_string() {
    let packet = Packet::Message(Message::with_args(
        "/sym",
        vec![Value::Symbol("preset".into())],
    ));
    let bytes = encode(&packet).unwrap();
    assert_eq!(&bytes[8..10], b",S");
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn test_blob_roundtrip_and_padding() {
    // 257 bytes exercises a multi-word blob with 3 bytes of padding
    let blob: Vec<u8> = (0..=256).map(|i| (i % 256) as u8).collect();
    let packet = Packet::Message(Message::new("/b").arg(blob.clone()));
    let bytes = encode(&packet).unwrap();
    assert_eq!(bytes.len() % 4, 0);
    assert_eq!(roundtrip(packet.clone()), packet);

    for len in 0..=5usize {
        let packet = Packet::Message(Message::new("/b").arg(vec![0xAB; len]));
        let bytes = encode(&packet).unwrap();
        assert_eq!(bytes.len() % 4, 0, "blob len {len}");
        assert_eq!(roundtrip(packet.clone()), packet);
    }
}

#[test]
fn test_every_ascii_char_roundtrip() {
    for code in 0u8..=127 {
        let c = code as char;
        let packet = Packet::Message(Message::new("/c").arg(c));
        assert_eq!(roundtrip(packet.clone()), packet, "char {code:#x}");
    }
}

#[test]
fn test_char_value_lives_in_low_byte() {
    // the three high bytes carry no value and are not validated
    let high_bytes_set = decode(b"/c\0\0,c\0\0\x00\x00\x01\x00").unwrap();
    assert_eq!(
        high_bytes_set,
        Packet::Message(Message::with_args("/c", vec![Value::Char('\0')]))
    );

    let nonzero_low = decode(b"/c\0\0,c\0\0\xFF\x00\x01\x41").unwrap();
    assert_eq!(
        nonzero_low,
        Packet::Message(Message::with_args("/c", vec![Value::Char('A')]))
    );
}

#[test]
fn test_extended_types_roundtrip() {
    let packet = Packet::Message(Message::with_args(
        "/ext",
        vec![
            Value::Bool(true),
            Value::Bool(false),
            Value::Nil,
            Value::Impulse,
            Value::TimeTag(TimeTag::new(3_900_000_000, 0x8000_0000)),
            Value::Color(Color::new(255, 128, 0, 64)),
            Value::Midi(MidiMessage::new(0, 0x90, 60, 100)),
        ],
    ));
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn test_nested_array_roundtrip() {
    let packet = Packet::Message(Message::with_args(
        "/arr",
        vec![
            Value::Int32(1),
            Value::Array(vec![
                Value::String("in".into()),
                Value::Array(vec![Value::Int64(2), Value::Array(vec![])]),
                Value::Float32(0.5),
            ]),
            Value::Bool(true),
        ],
    ));
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn test_deeply_nested_bundles_roundtrip() {
    let mut packet: Packet = Message::new("/leaf").arg(1i32).into();
    for depth in 0..8 {
        packet = Bundle::new(TimeTag::new(3_800_000_000 + depth, depth))
            .packet(packet)
            .packet(Message::new("/sibling").arg(depth as i64))
            .into();
    }
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn test_mixed_bundle_roundtrip() {
    let bundle = Bundle::new(TimeTag::now())
        .packet(Message::new("/a"))
        .packet(Bundle::new(TimeTag::IMMEDIATE).packet(Message::new("/b").arg("x")))
        .packet(Message::new("/c").arg(vec![0u8, 1, 2]));
    let packet = Packet::Bundle(bundle);
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn test_decoder_failure_kinds() {
    let cases: &[(&[u8], Error)] = &[
        (b"", Error::Truncated),
        (b"zzzz", Error::InvalidPacket),
        (b"/abc", Error::UnterminatedString),
        (b"/a\0\0i\0\0\0", Error::MissingTypeTag),
        (b"/a\0\0,i\0\0\x00\x01", Error::Truncated),
        (b"/a\0\0,x\0\0", Error::UnknownTypeTag('x')),
        (b"/a\0\0,]\0\0", Error::UnmatchedArrayClose),
        (b"/a\0\0,[i\0\x00\x00\x00\x01", Error::UnmatchedArrayClose),
        (b"/a\0\0,c\0\0\x00\x00\x00\x80", Error::InvalidPacket),
        (b"/a\0\0,c\0\0\x00\x00\x01\x80", Error::InvalidPacket),
        (b"#bundle\0\0\0\0\0", Error::Truncated),
    ];
    for (bytes, expected) in cases {
        assert_eq!(decode(bytes).unwrap_err(), *expected, "input {bytes:02X?}");
    }
}

#[test]
fn test_invalid_utf8_address() {
    let bytes = [0x2F, 0xFF, 0xFE, 0x00, 0x2C, 0x00, 0x00, 0x00];
    assert_eq!(decode(&bytes).unwrap_err(), Error::UnterminatedString);
}

#[test]
fn test_bundle_with_invalid_inner_packet() {
    // a declared element that is itself undecodable propagates its error
    let mut bytes = Vec::from(&b"#bundle\0"[..]);
    bytes.extend_from_slice(&1u64.to_be_bytes());
    bytes.extend_from_slice(&4i32.to_be_bytes());
    bytes.extend_from_slice(b"zzzz");
    assert_eq!(decode(&bytes).unwrap_err(), Error::InvalidPacket);
}

#[test]
fn test_platform_int_encoding_rule() {
    let small = Message::new("/n").arg(40_000isize);
    assert_eq!(small.args[0], Value::Int32(40_000));

    let big = Message::new("/n").arg(1isize << 40);
    assert_eq!(big.args[0], Value::Int64(1 << 40));

    let bytes = encode_message(&big).unwrap();
    assert_eq!(&bytes[4..6], b",h");
}
