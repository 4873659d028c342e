use super::*;
use crate::protocol::{Header, Options};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
struct Payload {
    a: i64,
    b: String,
    items: Vec<u32>,
}

fn sample() -> Payload {
    Payload {
        a: -42,
        b: "hello".to_string(),
        items: vec![1, 2, 3],
    }
}

#[test]
fn json_codec_round_trip() {
    let header = Header::new("Arith.Sum", 9);
    let bytes = CodecKind::Json.encode(&header).unwrap();
    let decoded: Header = CodecKind::Json.decode(&bytes).unwrap();
    assert_eq!(header, decoded);

    let body = sample();
    let bytes = CodecKind::Json.encode(&body).unwrap();
    let decoded: Payload = CodecKind::Json.decode(&bytes).unwrap();
    assert_eq!(body, decoded);
}

#[test]
fn binary_codec_round_trip() {
    let header = Header::with_error("Arith.Div", 3, "divide by zero");
    let bytes = CodecKind::Binary.encode(&header).unwrap();
    let decoded: Header = CodecKind::Binary.decode(&bytes).unwrap();
    assert_eq!(header, decoded);

    let body = sample();
    let bytes = CodecKind::Binary.encode(&body).unwrap();
    let decoded: Payload = CodecKind::Binary.decode(&bytes).unwrap();
    assert_eq!(body, decoded);
}

#[test]
fn codec_kind_tag_round_trip() {
    // the tag itself rides inside the JSON handshake record
    let options = Options {
        codec: CodecKind::Binary,
        ..Options::default()
    };
    let bytes = serde_json::to_vec(&options).unwrap();
    let decoded: Options = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(decoded.codec, CodecKind::Binary);
}

#[test]
fn decode_rejects_garbage() {
    let result: crate::Result<Header> = CodecKind::Json.decode(b"not json");
    assert!(result.is_err());
}

#[tokio::test]
async fn frame_round_trip() {
    let mut buf = Vec::new();
    frame::write_frame(&mut buf, b"first").await.unwrap();
    frame::write_frame(&mut buf, b"").await.unwrap();
    frame::write_frame(&mut buf, b"third").await.unwrap();

    let mut reader = buf.as_slice();
    assert_eq!(frame::read_frame(&mut reader).await.unwrap(), b"first");
    assert_eq!(frame::read_frame(&mut reader).await.unwrap(), b"");
    assert_eq!(frame::read_frame(&mut reader).await.unwrap(), b"third");
}

#[tokio::test]
async fn frame_discard_preserves_framing() {
    let mut buf = Vec::new();
    frame::write_frame(&mut buf, b"skipped").await.unwrap();
    frame::write_frame(&mut buf, b"kept").await.unwrap();

    let mut reader = buf.as_slice();
    frame::discard_frame(&mut reader).await.unwrap();
    assert_eq!(frame::read_frame(&mut reader).await.unwrap(), b"kept");
}

#[tokio::test]
async fn frame_rejects_oversized_prefix() {
    let mut buf = Vec::new();
    let len = (MAX_FRAME_SIZE as u32) + 1;
    buf.extend_from_slice(&len.to_be_bytes());

    let mut reader = buf.as_slice();
    let err = frame::read_frame(&mut reader).await.unwrap_err();
    assert!(err.to_string().contains("frame too large"));
}

#[tokio::test]
async fn frame_truncated_stream_errors() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&8u32.to_be_bytes());
    buf.extend_from_slice(b"half");

    let mut reader = buf.as_slice();
    assert!(frame::read_frame(&mut reader).await.is_err());
}
