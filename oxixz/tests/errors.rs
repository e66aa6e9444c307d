//! Error statuses: usage violations, corrupt input, memory ceilings.

use oxixz::xz::{StreamFlags, encode_stream_header};
use oxixz::{
    Action, CheckKind, CoderState, DecoderConfig, DecoderFlags, EncoderConfig, MAX_THREADS,
    Preset, Status, XzError, compress_all,
};

fn xz(data: &[u8], check: CheckKind) -> Vec<u8> {
    compress_all(data, &EncoderConfig::new(Preset::DEFAULT).with_check(check)).unwrap()
}

fn decoder(flags: DecoderFlags) -> CoderState {
    let mut state = CoderState::new();
    assert_eq!(
        state.init_decoder_with(&DecoderConfig::new().with_flags(flags)),
        Status::Ok
    );
    state
}

/// Run to the first status that is neither OK nor informational.
fn decode_status(state: &mut CoderState, mut input: &[u8]) -> Status {
    let mut out = vec![0u8; 1 << 16];
    loop {
        let result = state.run(Action::Finish, input, &mut out);
        input = &input[result.consumed..];
        match result.status {
            Status::Ok | Status::NoCheck | Status::UnsupportedCheck | Status::GetCheck => {}
            other => return other,
        }
    }
}

#[test]
fn test_run_after_stream_end() {
    let mut state = CoderState::new();
    assert_eq!(state.init_encoder(6, CheckKind::Crc64, 1), Status::Ok);
    let mut out = [0u8; 256];
    assert_eq!(state.run(Action::Finish, b"abc", &mut out).status, Status::StreamEnd);
    for action in Action::ALL {
        let result = state.run(action, b"more", &mut out);
        assert_eq!(result.status, Status::ProgError);
        assert_eq!(result.consumed, 0);
    }

    let stream = xz(b"abc", CheckKind::Crc32);
    let mut dec = decoder(DecoderFlags::empty());
    assert_eq!(decode_status(&mut dec, &stream), Status::StreamEnd);
    assert_eq!(dec.run(Action::Run, &[], &mut out).status, Status::ProgError);
}

#[test]
fn test_invalid_encoder_options() {
    let mut state = CoderState::new();
    assert_eq!(state.init_encoder(10, CheckKind::Crc64, 1), Status::OptionsError);
    assert_eq!(
        state.init_encoder(6 | 0x100, CheckKind::Crc64, 1),
        Status::OptionsError
    );
    assert_eq!(
        state.init_encoder(6, CheckKind::Crc64, MAX_THREADS + 1),
        Status::OptionsError
    );
    assert!(matches!(state.last_error(), Some(XzError::Options { .. })));
    assert_eq!(
        state.init_encoder(6 | oxixz::PRESET_EXTREME, CheckKind::Crc64, 2),
        Status::Ok
    );
}

#[test]
fn test_switching_action_mid_flush() {
    let mut state = CoderState::new();
    assert_eq!(state.init_encoder(1, CheckKind::Crc64, 1), Status::Ok);
    let data = vec![0x5Au8; 50_000];
    let mut tiny = [0u8; 8];
    assert_eq!(state.run(Action::FullFlush, &data, &mut tiny).status, Status::Ok);
    assert_eq!(state.run(Action::Run, &[], &mut tiny).status, Status::ProgError);
    // The state is unusable afterwards.
    let mut big = vec![0u8; 1 << 16];
    assert_eq!(state.run(Action::FullFlush, &[], &mut big).status, Status::ProgError);
}

#[test]
fn test_decoder_rejects_flush_actions() {
    let mut dec = decoder(DecoderFlags::empty());
    let mut out = [0u8; 16];
    assert_eq!(dec.run(Action::SyncFlush, &[], &mut out).status, Status::ProgError);
}

#[test]
fn test_not_xz() {
    let mut dec = decoder(DecoderFlags::empty());
    assert_eq!(
        decode_status(&mut dec, b"PK\x03\x04 this is a zip file"),
        Status::FormatError
    );
}

#[test]
fn test_corrupt_payload() {
    let data: Vec<u8> = (0..20_000u32).map(|i| (i * 31 % 256) as u8).collect();
    let mut stream = xz(&data, CheckKind::Crc64);
    let middle = stream.len() / 2;
    stream[middle] ^= 0x55;

    let mut dec = decoder(DecoderFlags::empty());
    assert_eq!(decode_status(&mut dec, &stream), Status::DataError);
    assert!(dec.last_error().is_some());
}

#[test]
fn test_corrupt_header_crc() {
    let mut stream = xz(b"abc", CheckKind::Crc64);
    stream[8] ^= 0x01;
    let mut dec = decoder(DecoderFlags::empty());
    assert_eq!(decode_status(&mut dec, &stream), Status::DataError);
}

#[test]
fn test_truncated_stream_reports_buf_error() {
    let stream = xz(b"truncated stream", CheckKind::Crc32);
    let cut = &stream[..stream.len() - 5];
    let mut dec = decoder(DecoderFlags::empty());
    let mut out = [0u8; 256];
    let first = dec.run(Action::Finish, cut, &mut out);
    assert_eq!(first.status, Status::Ok);
    assert_eq!(first.consumed, cut.len());
    assert_eq!(&out[..first.produced], b"truncated stream");

    let second = dec.run(Action::Finish, &[], &mut out);
    assert_eq!(second.status, Status::BufError);
    // BUF_ERROR is recoverable: the rest of the stream still decodes.
    let rest = dec.run(Action::Finish, &stream[cut.len()..], &mut out);
    assert_eq!(rest.status, Status::StreamEnd);
}

#[test]
fn test_check_statuses() {
    let mut dec = decoder(DecoderFlags::TELL_NO_CHECK);
    let stream = xz(b"no check here", CheckKind::None);
    let mut out = [0u8; 64];
    assert_eq!(dec.run(Action::Run, &stream, &mut out).status, Status::NoCheck);
    assert_eq!(dec.check(), Some(CheckKind::None));
    assert_eq!(
        dec.run(Action::Run, &stream[12..], &mut out).status,
        Status::StreamEnd
    );

    // A reserved check ID (0x0F, 64 bytes) is skipped unverified.
    let mut stream = xz(b"", CheckKind::None);
    let header = encode_stream_header(StreamFlags::decode([0x00, 0x0F]).unwrap());
    stream[..12].copy_from_slice(&header);
    let mut dec = decoder(DecoderFlags::TELL_UNSUPPORTED_CHECK);
    assert_eq!(
        dec.run(Action::Run, &stream, &mut out).status,
        Status::UnsupportedCheck
    );
    assert_eq!(dec.check(), None);
}

#[test]
fn test_memlimit_then_retry() {
    let data = vec![7u8; 10_000];
    let stream = xz(&data, CheckKind::Crc64);

    let mut state = CoderState::new();
    assert_eq!(state.init_decoder(1 << 20, false, 0), Status::Ok);
    let mut out = vec![0u8; 1 << 16];
    let first = state.run(Action::Finish, &stream, &mut out);
    assert_eq!(first.status, Status::MemlimitError);
    assert!(state.memusage() > 1 << 20);
    assert_eq!(state.memlimit(), 1 << 20);

    assert_eq!(state.set_memlimit(state.memusage()), Status::Ok);
    let rest = state.run(Action::Finish, &stream[first.consumed..], &mut out);
    assert_eq!(rest.status, Status::StreamEnd);
    assert_eq!(&out[..rest.produced], &data[..]);
}

#[test]
fn test_memlimit_zero_means_one() {
    let mut state = CoderState::new();
    assert_eq!(state.init_decoder(0, true, 0), Status::Ok);
    assert_eq!(state.memlimit(), 1);
    let stream = xz(b"x", CheckKind::Crc32);
    assert_eq!(decode_status(&mut state, &stream), Status::MemlimitError);
}

#[test]
fn test_index_tampering() {
    let mut stream = xz(b"index will lie", CheckKind::Crc32);
    // Bump the uncompressed size in the only index record and fix the CRC.
    let index_at = stream.len() - 12 - 8;
    stream[index_at + 3] += 1;
    let crc = oxixz_core::Crc32::compute(&stream[index_at..index_at + 4]);
    stream[index_at + 4..index_at + 8].copy_from_slice(&crc.to_le_bytes());

    let mut dec = decoder(DecoderFlags::empty());
    assert_eq!(decode_status(&mut dec, &stream), Status::DataError);
    assert!(matches!(dec.last_error(), Some(XzError::IndexMismatch { .. })));
}
