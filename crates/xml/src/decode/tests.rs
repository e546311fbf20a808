use super::*;

fn decode_all(decoder: &mut dyn IncrementalDecoder, input: &[u8], chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    let mut rest = input;
    loop {
        let d = decoder.decode(rest, &mut buf).unwrap();
        out.extend_from_slice(&buf[..d.written]);
        rest = &rest[d.consumed..];
        if rest.is_empty() && d.written < buf.len() {
            break;
        }
        if d.consumed == 0 && d.written == 0 {
            break;
        }
    }
    decoder.finish().unwrap();
    out
}

#[test]
fn base64_any_output_size() {
    for chunk in [1, 3, 100] {
        let mut decoder = Base64Decoder::new();
        assert_eq!(decode_all(&mut decoder, b"aGVsbG8=", chunk), b"hello");
    }
}

#[test]
fn base64_across_input_slices() {
    let mut decoder = Base64Decoder::new();
    let mut out = [0u8; 16];
    let first = decoder.decode(b"aGV", &mut out).unwrap();
    assert_eq!(first.consumed, 3);
    assert_eq!(&out[..first.written], b"he");
    let second = decoder.decode(b"sb G8=\n", &mut out).unwrap();
    assert_eq!(second.consumed, 7);
    assert_eq!(&out[..second.written], b"llo");
}

#[test]
fn base64_rejects_garbage_and_data_after_padding() {
    let mut out = [0u8; 8];
    let err = Base64Decoder::new().decode(b"ab!c", &mut out).unwrap_err();
    assert_eq!(
        err,
        ErrorKind::Conversion {
            value: "!".into(),
            target: "base64"
        }
    );
    assert!(Base64Decoder::new().decode(b"aA==QQ", &mut out).is_err());
}

#[test]
fn base64_finish_reports_dropped_bits() {
    let mut out = [0u8; 8];
    let mut decoder = Base64Decoder::new();
    decoder.decode(b"aGVsbG8", &mut out).unwrap();
    assert!(decoder.finish().is_ok());

    let mut decoder = Base64Decoder::new();
    let d = decoder.decode(b"aGVsb", &mut out).unwrap();
    assert_eq!(&out[..d.written], b"hel");
    assert_eq!(
        decoder.finish(),
        Err(ErrorKind::Conversion {
            value: "incomplete base64 quantum".into(),
            target: "base64"
        })
    );

    let mut decoder = Base64Decoder::new();
    decoder.decode(b"aGVsbG9=", &mut out).unwrap();
    assert!(decoder.finish().is_err());
    decoder.reset();
    assert!(decoder.finish().is_ok());
}

#[test]
fn binhex_pairs_and_odd_digits() {
    let mut decoder = BinHexDecoder::new();
    assert_eq!(decode_all(&mut decoder, b"68 65 6C6c6F", 2), b"hello");

    let mut decoder = BinHexDecoder::new();
    let mut out = [0u8; 4];
    decoder.decode(b"ABC", &mut out).unwrap();
    assert!(decoder.finish().is_err());
    decoder.reset();
    assert!(decoder.finish().is_ok());
}

#[test]
fn binhex_holds_digit_when_output_full() {
    let mut decoder = BinHexDecoder::new();
    let mut out = [0u8; 1];
    let d = decoder.decode(b"0102", &mut out).unwrap();
    assert_eq!(d, Decoded { consumed: 3, written: 1 });
    let d = decoder.decode(b"2", &mut out).unwrap();
    assert_eq!(d, Decoded { consumed: 1, written: 1 });
    assert_eq!(out[0], 2);
}

#[test]
fn active_decoder_kinds() {
    let mut active = ActiveDecoder::new(DecoderKind::BinHex);
    assert_eq!(active.kind(), DecoderKind::BinHex);
    let mut out = [0u8; 1];
    assert_eq!(active.get_mut().decode(b"ff", &mut out).unwrap().written, 1);
}
