use crate::{Arg, ProtocolError, Reader, ServerError, Value, Writer};
use chrono::{TimeZone, Utc};
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr};

fn reader_for(bytes: &[u8]) -> Reader<Cursor<Vec<u8>>> {
    Reader::new(Cursor::new(bytes.to_vec()))
}

#[test]
fn writer_encodes_heterogeneous_args() {
    let mut wr = Writer::new();
    wr.write_element(&[
        Arg::from("string"),
        Arg::from(12),
        Arg::from(34.56),
        Arg::from(b"bytes".as_slice()),
        Arg::from(true),
        Arg::Nil,
    ]);

    let expected = b"~6\n6\nstring\n2\n12\n5\n34.56\n5\nbytes\n1\n1\n0\n\n";
    assert_eq!(wr.bytes(), expected.as_slice());
}

#[test]
fn writer_encodes_single_command_frame() {
    let mut wr = Writer::new();
    wr.write_meta_frame(1);
    wr.write_element(&[Arg::from("SET"), Arg::from("key"), Arg::from("value")]);
    assert_eq!(wr.bytes(), b"*1\n~3\n3\nSET\n3\nkey\n5\nvalue\n".as_slice());
}

#[test]
fn writer_encodes_pipelined_frame() {
    let mut wr = Writer::new();
    wr.write_meta_frame(2);
    wr.write_element(&[Arg::from("HEYA"), Arg::from("0")]);
    wr.write_element(&[Arg::from("HEYA"), Arg::from("1")]);
    assert_eq!(
        wr.bytes(),
        b"*2\n~2\n4\nHEYA\n1\n0\n~2\n4\nHEYA\n1\n1\n".as_slice()
    );
}

#[test]
fn writer_encodes_ip_as_sixteen_bytes() {
    let mut wr = Writer::new();
    let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));
    wr.write_element(&[Arg::from(ip)]);

    let bytes = wr.bytes();
    assert!(bytes.starts_with(b"~1\n16\n"));
    // 16-byte mapped address, trailing newline
    assert_eq!(bytes.len(), b"~1\n16\n".len() + 16 + 1);
}

#[test]
fn writer_encodes_timestamp_rfc3339_nanos() {
    let ts = Utc.with_ymd_and_hms(2019, 1, 1, 9, 45, 10).unwrap();
    let mut wr = Writer::new();
    wr.write_element(&[Arg::from(ts)]);
    assert_eq!(
        wr.bytes(),
        b"~1\n30\n2019-01-01T09:45:10.000000000Z\n".as_slice()
    );
}

#[test]
fn float32_args_keep_shortest_form() {
    assert_eq!(Arg::Float32(34.56).payload(), b"34.56".to_vec());
    assert_eq!(Arg::Float64(34.56).payload(), b"34.56".to_vec());
}

#[tokio::test]
async fn reads_ok_status() {
    let mut rd = reader_for(b"!1\n0\n");
    rd.read_status().await.unwrap();
}

#[tokio::test]
async fn reads_nil_status_as_sentinel() {
    let mut rd = reader_for(b"!1\n1\n");
    let err = rd.read_status().await.unwrap_err();
    assert_eq!(err.server_error(), Some(ServerError::Nil));
    assert!(err.server_error().unwrap().is_nil());
}

#[tokio::test]
async fn reads_known_and_unknown_status_codes() {
    let mut rd = reader_for(b"!1\n2\n!2\n10\n!2\n13\n");
    assert_eq!(
        rd.read_status().await.unwrap_err().server_error(),
        Some(ServerError::Overwrite)
    );
    assert_eq!(
        rd.read_status().await.unwrap_err().server_error(),
        Some(ServerError::BadCredentials)
    );
    assert_eq!(
        rd.read_status().await.unwrap_err().server_error(),
        Some(ServerError::Unknown(13))
    );
}

#[tokio::test]
async fn reads_int_reply() {
    let mut rd = reader_for(b":2\n10\n");
    assert_eq!(rd.read_int().await.unwrap(), 10);
}

#[tokio::test]
async fn reads_float_reply_and_infinities() {
    let mut rd = reader_for(b"%7\n123.456\n%3\ninf\n%4\n-inf\n");
    assert_eq!(rd.read_float().await.unwrap(), 123.456);
    assert_eq!(rd.read_float().await.unwrap(), f32::INFINITY);
    assert_eq!(rd.read_float().await.unwrap(), f32::NEG_INFINITY);
}

#[tokio::test]
async fn reads_string_and_blob_replies() {
    let mut rd = reader_for(b"+5\nhello\n?5\nworld\n");
    assert_eq!(rd.read_text().await.unwrap(), Value::Str("hello".into()));
    assert_eq!(rd.read_text().await.unwrap(), Value::Bin(b"world".to_vec()));
}

#[tokio::test]
async fn blob_payload_may_contain_newlines() {
    let mut rd = reader_for(b"?5\na\nb\r\n\n");
    assert_eq!(rd.read_text().await.unwrap(), Value::Bin(b"a\nb\r\n".to_vec()));
}

#[tokio::test]
async fn reads_meta_frame() {
    let mut rd = reader_for(b"*10\n");
    assert_eq!(rd.read_meta_frame().await.unwrap(), 10);
}

#[tokio::test]
async fn rejects_bad_meta_frame() {
    let mut rd = reader_for(b"+1\na\n");
    assert!(matches!(
        rd.read_meta_frame().await.unwrap_err(),
        ProtocolError::InvalidMetaFrame(_)
    ));
}

#[tokio::test]
async fn reads_string_array() {
    let mut rd = reader_for(b"&2\n+5\nhello\n+5\nworld\n");
    assert_eq!(
        rd.read_string_slice().await.unwrap(),
        vec!["hello".to_owned(), "world".to_owned()]
    );
}

#[tokio::test]
async fn any_array_parses_like_array() {
    let mut rd = reader_for(b"~1\n+2\nok\n");
    assert_eq!(rd.read_string_slice().await.unwrap(), vec!["ok".to_owned()]);
}

#[tokio::test]
async fn array_slots_hold_nested_errors() {
    let mut rd = reader_for(b"&3\n+5\nhello\n!1\n1\n!1\n2\n");
    let values = rd.read_slice().await.unwrap();
    assert_eq!(
        values,
        vec![
            Value::Str("hello".into()),
            Value::Nil,
            Value::Err(ServerError::Overwrite),
        ]
    );
}

#[tokio::test]
async fn nested_arrays_parse_recursively() {
    let mut rd = reader_for(b"&2\n&1\n:1\n7\n+2\nhi\n");
    let values = rd.read_slice().await.unwrap();
    assert_eq!(
        values,
        vec![
            Value::Array(vec![Value::Int(7)]),
            Value::Str("hi".into()),
        ]
    );
}

#[tokio::test]
async fn line_longer_than_internal_buffer_still_parses() {
    let big = "a".repeat(8 * 1024);
    let frame = format!("+{}\n{}\n", big.len(), big);
    let mut rd = Reader::with_capacity(64, Cursor::new(frame.into_bytes()));
    assert_eq!(rd.read_text().await.unwrap(), Value::Str(big));
}

#[tokio::test]
async fn truncated_stream_reports_eof() {
    let mut rd = reader_for(b"+5\nhel");
    let err = rd.read_text().await.unwrap_err();
    assert!(err.is_eof(), "{err:?}");

    let mut rd = reader_for(b"+5");
    assert!(rd.read_text().await.unwrap_err().is_eof());

    let mut rd = reader_for(b"");
    assert!(rd.read_text().await.unwrap_err().is_eof());
}

#[tokio::test]
async fn empty_line_is_invalid() {
    let mut rd = reader_for(b"\n");
    assert!(matches!(
        rd.read_value().await.unwrap_err(),
        ProtocolError::InvalidReply(_)
    ));
}

#[tokio::test]
async fn unknown_lead_byte_is_invalid() {
    let mut rd = reader_for(b"@3\nabc\n");
    assert!(matches!(
        rd.read_value().await.unwrap_err(),
        ProtocolError::InvalidReply(_)
    ));
}

#[tokio::test]
async fn bad_length_header_is_invalid() {
    let mut rd = reader_for(b"+abc\nxyz\n");
    assert!(matches!(
        rd.read_value().await.unwrap_err(),
        ProtocolError::InvalidReply(_)
    ));
}

#[tokio::test]
async fn oversized_length_header_is_rejected() {
    let mut rd = reader_for(b"+999999999999\nx\n");
    assert!(matches!(
        rd.read_value().await.unwrap_err(),
        ProtocolError::PayloadTooLarge { .. }
    ));
}

#[tokio::test]
async fn invalid_reply_snippet_is_capped() {
    // A junk line far longer than the reader's internal buffer: the line
    // accumulator grows to take it, the quoted snippet does not.
    let junk = format!("@{}\n", "x".repeat(500));
    let mut rd = Reader::with_capacity(64, Cursor::new(junk.into_bytes()));
    match rd.read_value().await.unwrap_err() {
        ProtocolError::InvalidReply(snippet) => assert!(snippet.len() <= 100),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn status_in_typed_position_surfaces_server_error() {
    let mut rd = reader_for(b"!1\n5\n");
    assert_eq!(
        rd.read_int().await.unwrap_err().server_error(),
        Some(ServerError::Server)
    );

    // Status 0 where an integer was expected is a type mismatch.
    let mut rd = reader_for(b"!1\n0\n");
    assert!(matches!(
        rd.read_int().await.unwrap_err(),
        ProtocolError::UnexpectedType { .. }
    ));
}

#[test]
fn encoded_args_round_trip_bytewise() {
    let args = [
        Arg::from("SET"),
        Arg::from("key"),
        Arg::from(b"a\nb\r\n".as_slice()),
    ];
    let mut wr = Writer::new();
    wr.write_element(&args);

    // Walk the element back out: `~<K>\n` then K length-prefixed payloads.
    let bytes = wr.bytes();
    let mut pos = 0;
    let mut next_line = |pos: &mut usize| {
        let nl = bytes[*pos..].iter().position(|&b| b == b'\n').unwrap() + *pos;
        let line = &bytes[*pos..nl];
        *pos = nl + 1;
        line.to_vec()
    };

    let header = next_line(&mut pos);
    assert_eq!(header, b"~3");
    for arg in &args {
        let len: usize = String::from_utf8(next_line(&mut pos)).unwrap().parse().unwrap();
        let payload = &bytes[pos..pos + len];
        assert_eq!(payload, arg.payload());
        pos += len;
        assert_eq!(bytes[pos], b'\n');
        pos += 1;
    }
    assert_eq!(pos, bytes.len());
}

#[test]
fn value_accessors() {
    assert_eq!(Value::Str("x".into()).as_text().as_deref(), Some("x"));
    assert_eq!(Value::Bin(b"x".to_vec()).as_bytes(), Some(b"x".as_slice()));
    assert_eq!(Value::Int(3).as_int(), Some(3));
    assert!(Value::Nil.is_nil());
    assert_eq!(Value::from(ServerError::Nil), Value::Nil);
    assert_eq!(
        Value::from(ServerError::Server),
        Value::Err(ServerError::Server)
    );
}
