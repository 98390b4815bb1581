use bytes::Bytes;
use serde_json::json;

use btp_tunnel::error::BtpError;
use btp_tunnel::protocol_data::{CUSTOM_PROTOCOL, ILP_PROTOCOL};
use btp_tunnel::{
    decode_protocol_data, encode_protocol_data, ContentType, ProtocolMap, ProtocolValue,
    SubProtocol,
};

#[test]
fn ilp_survives_encode_decode() {
    let samples = [
        Bytes::new(),
        Bytes::from_static(b"\x00"),
        Bytes::from((0u8..=255).collect::<Vec<u8>>()),
        Bytes::from(vec![0xffu8; 4096]),
    ];
    for ilp in samples {
        let encoded = encode_protocol_data(Some(&ilp), None, None).unwrap();
        let decoded = decode_protocol_data(&encoded).unwrap();
        assert_eq!(decoded.ilp, Some(ilp));
        assert_eq!(decoded.custom, None);
    }
}

#[test]
fn entries_follow_ilp_extra_custom_order() {
    let ilp = Bytes::from_static(b"packet");
    let custom = json!({"memo": "hi"});
    let mut extra = ProtocolMap::new();
    extra.insert("a", "s");

    let encoded = encode_protocol_data(Some(&ilp), Some(&custom), Some(&extra)).unwrap();
    let names: Vec<&str> = encoded.iter().map(|p| p.protocol_name.as_str()).collect();
    assert_eq!(names, vec![ILP_PROTOCOL, "a", CUSTOM_PROTOCOL]);

    assert_eq!(encoded[0].content_type, ContentType::Binary);
    assert_eq!(encoded[1].content_type, ContentType::Utf8Text);
    assert_eq!(encoded[1].data.as_ref(), b"s");
    assert_eq!(encoded[2].content_type, ContentType::Json);

    let decoded = decode_protocol_data(&encoded).unwrap();
    assert_eq!(decoded.ilp, Some(ilp));
    assert_eq!(decoded.custom, Some(custom));
    assert_eq!(
        decoded.protocol_map.get("a"),
        Some(&ProtocolValue::Text("s".to_string()))
    );
}

#[test]
fn custom_alone_is_the_only_entry() {
    let encoded = encode_protocol_data(None, Some(&json!([1, 2])), None).unwrap();
    assert_eq!(encoded.len(), 1);
    assert_eq!(encoded[0].protocol_name, CUSTOM_PROTOCOL);
}

#[test]
fn malformed_json_entry_is_a_decode_error() {
    let entries = vec![
        SubProtocol::new(ILP_PROTOCOL, ContentType::Binary, Bytes::from_static(b"ok")),
        SubProtocol::new("broken", ContentType::Json, Bytes::from_static(b"{not json")),
    ];
    let err = decode_protocol_data(&entries).unwrap_err();
    assert!(matches!(err, BtpError::Decode(message) if message.contains("broken")));
}

#[test]
fn invalid_utf8_text_entry_is_a_decode_error() {
    let entries = vec![SubProtocol::new(
        "memo",
        ContentType::Utf8Text,
        Bytes::from_static(&[0xff, 0xfe]),
    )];
    let err = decode_protocol_data(&entries).unwrap_err();
    assert!(matches!(err, BtpError::Decode(message) if message.contains("memo")));
}

#[test]
fn decode_reads_each_content_type() {
    let entries = vec![
        SubProtocol::new("bin", ContentType::Binary, Bytes::from_static(&[9, 8])),
        SubProtocol::new("txt", ContentType::Utf8Text, Bytes::from_static(b"hello")),
        SubProtocol::new("obj", ContentType::Json, Bytes::from_static(br#"{"n":1}"#)),
        SubProtocol::new(CUSTOM_PROTOCOL, ContentType::Utf8Text, Bytes::from_static(b"note")),
    ];
    let decoded = decode_protocol_data(&entries).unwrap();

    assert_eq!(decoded.protocol_map.len(), 4);
    assert_eq!(
        decoded.protocol_map.get("bin"),
        Some(&ProtocolValue::Binary(Bytes::from_static(&[9, 8])))
    );
    assert_eq!(
        decoded.protocol_map.get("obj"),
        Some(&ProtocolValue::Json(json!({"n": 1})))
    );
    assert_eq!(decoded.ilp, None);
    assert_eq!(decoded.custom, Some(json!("note")));
}

#[test]
fn later_duplicate_name_wins() {
    let entries = vec![
        SubProtocol::new(ILP_PROTOCOL, ContentType::Binary, Bytes::from_static(b"first")),
        SubProtocol::new(ILP_PROTOCOL, ContentType::Binary, Bytes::from_static(b"second")),
    ];
    let decoded = decode_protocol_data(&entries).unwrap();
    assert_eq!(decoded.protocol_map.len(), 1);
    assert_eq!(decoded.ilp, Some(Bytes::from_static(b"second")));
}
