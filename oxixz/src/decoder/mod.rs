//! Decoders: XZ, and the legacy `.lzma` format behind auto-detection.

mod xz;

pub use xz::XzDecoder;

use crate::config::{DecoderConfig, DecoderFlags};
use crate::xz::XZ_MAGIC;
use oxixz_core::check::CheckKind;
use oxixz_core::error::{Result, XzError};
use oxixz_core::status::{Action, Status};
use oxixz_core::traits::StreamCoder;
use oxixz_lzma::AloneDecoder;

enum Inner {
    /// Waiting for the first byte to pick a format.
    Detect,
    Xz(XzDecoder),
    Alone {
        decoder: AloneDecoder,
        told_no_check: bool,
        tail: AloneTail,
    },
}

/// Where a `.lzma` stream is relative to its end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AloneTail {
    Decoding,
    /// Payload is complete; with CONCATENATED the stream only ends on
    /// FINISH, and any further input is trailing garbage.
    AwaitFinish,
    Ended,
}

/// Decoder selected by [`DecoderConfig`]: XZ only, or XZ and `.lzma` by
/// auto-detection.
pub struct Decoder {
    config: DecoderConfig,
    inner: Inner,
}

impl Decoder {
    /// Create a decoder.
    pub fn new(config: &DecoderConfig) -> Self {
        let inner = if config.auto_detect {
            Inner::Detect
        } else {
            Inner::Xz(XzDecoder::new(config))
        };
        Self {
            config: *config,
            inner,
        }
    }

    /// Pick the format from the first input byte.
    fn detect(&mut self, first: u8) -> Result<()> {
        self.inner = if first == XZ_MAGIC[0] {
            tracing::debug!("auto-detected XZ input");
            Inner::Xz(XzDecoder::new(&self.config))
        } else {
            tracing::debug!(memlimit = self.config.memlimit, "auto-detected .lzma input");
            Inner::Alone {
                decoder: AloneDecoder::new(self.config.memlimit)?,
                told_no_check: false,
                tail: AloneTail::Decoding,
            }
        };
        Ok(())
    }
}

impl StreamCoder for Decoder {
    fn code(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Status> {
        if !matches!(action, Action::Run | Action::Finish) {
            return Err(XzError::program(format!(
                "decoders only accept Run and Finish, got {action:?}"
            )));
        }

        if let Inner::Detect = self.inner {
            let Some(&first) = input.first() else {
                return Ok(Status::Ok);
            };
            self.detect(first)?;
        }

        let tell_no_check = self.config.flags.contains(DecoderFlags::TELL_NO_CHECK);
        let concatenated = self.config.flags.contains(DecoderFlags::CONCATENATED);
        match &mut self.inner {
            Inner::Detect => Ok(Status::Ok),
            Inner::Xz(decoder) => decoder.code(input, output, action),
            Inner::Alone {
                decoder,
                told_no_check,
                tail,
            } => {
                if *tail == AloneTail::Ended {
                    return Err(XzError::program("the stream has already ended"));
                }
                if tell_no_check && !*told_no_check {
                    *told_no_check = true;
                    return Ok(Status::NoCheck);
                }

                let mut consumed = 0;
                if *tail == AloneTail::Decoding {
                    let progress = decoder.process(input, output, action)?;
                    consumed = progress.consumed;
                    if !progress.finished {
                        return Ok(Status::Ok);
                    }
                    if !concatenated {
                        *tail = AloneTail::Ended;
                        return Ok(Status::StreamEnd);
                    }
                    *tail = AloneTail::AwaitFinish;
                }

                if consumed < input.len() {
                    return Err(XzError::corrupted(
                        decoder.total_in(),
                        "trailing data after the .lzma stream",
                    ));
                }
                if action == Action::Finish {
                    *tail = AloneTail::Ended;
                    Ok(Status::StreamEnd)
                } else {
                    Ok(Status::Ok)
                }
            }
        }
    }

    fn total_in(&self) -> u64 {
        match &self.inner {
            Inner::Detect => 0,
            Inner::Xz(decoder) => decoder.total_in(),
            Inner::Alone { decoder, .. } => decoder.total_in(),
        }
    }

    fn total_out(&self) -> u64 {
        match &self.inner {
            Inner::Detect => 0,
            Inner::Xz(decoder) => decoder.total_out(),
            Inner::Alone { decoder, .. } => decoder.total_out(),
        }
    }

    fn is_blocked(&self, input_empty: bool, output_empty: bool) -> bool {
        match &self.inner {
            Inner::Detect => input_empty,
            Inner::Xz(decoder) => decoder.is_blocked(input_empty, output_empty),
            Inner::Alone { tail, .. } => match tail {
                AloneTail::Decoding => input_empty || output_empty,
                AloneTail::AwaitFinish => input_empty,
                AloneTail::Ended => false,
            },
        }
    }

    fn check(&self) -> Option<CheckKind> {
        match &self.inner {
            Inner::Detect => None,
            Inner::Xz(decoder) => decoder.check(),
            Inner::Alone { .. } => Some(CheckKind::None),
        }
    }

    fn memusage(&self) -> u64 {
        match &self.inner {
            Inner::Detect => 0,
            Inner::Xz(decoder) => decoder.memusage(),
            Inner::Alone { decoder, .. } => decoder.memusage(),
        }
    }

    fn memlimit(&self) -> u64 {
        match &self.inner {
            Inner::Detect => self.config.memlimit,
            Inner::Xz(decoder) => decoder.memlimit(),
            Inner::Alone { decoder, .. } => decoder.memlimit(),
        }
    }

    fn set_memlimit(&mut self, limit: u64) -> Result<()> {
        let limit = limit.max(1);
        match &mut self.inner {
            Inner::Detect => {}
            Inner::Xz(decoder) => decoder.set_memlimit(limit)?,
            Inner::Alone { decoder, .. } => decoder.set_memlimit(limit)?,
        }
        self.config.memlimit = limit;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liblzma::stream::{LzmaOptions, Stream};

    fn lzma_alone(data: &[u8]) -> Vec<u8> {
        let options = LzmaOptions::new_preset(1).unwrap();
        let mut stream = Stream::new_lzma_encoder(&options).unwrap();
        let mut out = Vec::with_capacity(data.len() + 64);
        loop {
            let consumed = stream.total_in() as usize;
            let status = stream
                .process_vec(&data[consumed..], &mut out, liblzma::stream::Action::Finish)
                .unwrap();
            if matches!(status, liblzma::stream::Status::StreamEnd) {
                return out;
            }
            out.reserve(4096);
        }
    }

    fn run(decoder: &mut Decoder, input: &[u8]) -> (Vec<Status>, Vec<u8>) {
        let mut statuses = Vec::new();
        let mut out = vec![0u8; 4096];
        let mut rest = input;
        loop {
            let in_before = decoder.total_in();
            let out_before = decoder.total_out() as usize;
            let status = decoder.code(rest, &mut out[out_before..], Action::Finish).unwrap();
            rest = &rest[(decoder.total_in() - in_before) as usize..];
            statuses.push(status);
            if status == Status::StreamEnd {
                out.truncate(decoder.total_out() as usize);
                return (statuses, out);
            }
        }
    }

    #[test]
    fn test_detects_lzma_alone() {
        let payload = b"legacy container payload";
        let config = DecoderConfig::new()
            .with_auto_detect(true)
            .with_flags(DecoderFlags::TELL_NO_CHECK);
        let mut decoder = Decoder::new(&config);
        let (statuses, out) = run(&mut decoder, &lzma_alone(payload));
        assert_eq!(statuses.first(), Some(&Status::NoCheck));
        assert_eq!(out, payload);
        assert_eq!(decoder.check(), Some(CheckKind::None));
    }

    #[test]
    fn test_concatenated_lzma_alone_ends_on_finish() {
        let config = DecoderConfig::new()
            .with_auto_detect(true)
            .with_flags(DecoderFlags::CONCATENATED);
        let mut decoder = Decoder::new(&config);
        let stream = lzma_alone(b"one stream only");
        let mut out = [0u8; 256];

        let status = decoder.code(&stream, &mut out, Action::Run).unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(decoder.total_in(), stream.len() as u64);
        assert_eq!(&out[..decoder.total_out() as usize], b"one stream only");

        assert_eq!(decoder.code(&[], &mut out, Action::Run).unwrap(), Status::Ok);
        assert!(decoder.is_blocked(true, false));
        assert_eq!(
            decoder.code(&[], &mut out, Action::Finish).unwrap(),
            Status::StreamEnd
        );
    }

    #[test]
    fn test_concatenated_lzma_alone_rejects_trailing_data() {
        let config = DecoderConfig::new()
            .with_auto_detect(true)
            .with_flags(DecoderFlags::CONCATENATED);
        let mut decoder = Decoder::new(&config);
        let mut stream = lzma_alone(b"payload");
        stream.extend_from_slice(&[0u8; 4]);
        let mut out = [0u8; 256];
        let err = decoder.code(&stream, &mut out, Action::Finish).unwrap_err();
        assert_eq!(err.status(), Status::DataError);
        assert_eq!(&out[..decoder.total_out() as usize], b"payload");
    }

    #[test]
    fn test_lzma_alone_counts_header_on_memlimit() {
        let config = DecoderConfig::new()
            .with_auto_detect(true)
            .with_memlimit(4096);
        let mut decoder = Decoder::new(&config);
        let stream = lzma_alone(b"abc");
        let mut out = [0u8; 64];
        let err = decoder.code(&stream, &mut out, Action::Run).unwrap_err();
        assert_eq!(err.status(), Status::MemlimitError);
        assert_eq!(decoder.total_in(), 13);
        assert!(decoder.memusage() > decoder.memlimit());
    }

    #[test]
    fn test_xz_only_rejects_lzma_alone() {
        let mut decoder = Decoder::new(&DecoderConfig::new());
        let mut out = [0u8; 64];
        let err = decoder
            .code(&lzma_alone(b"abc"), &mut out, Action::Run)
            .unwrap_err();
        assert_eq!(err.status(), Status::FormatError);
    }

    #[test]
    fn test_flush_actions_rejected() {
        let mut decoder = Decoder::new(&DecoderConfig::new());
        let mut out = [0u8; 8];
        for action in [Action::SyncFlush, Action::FullFlush, Action::FullBarrier] {
            let err = decoder.code(&[], &mut out, action).unwrap_err();
            assert_eq!(err.status(), Status::ProgError);
        }
    }

    #[test]
    fn test_detect_waits_for_input() {
        let mut decoder = Decoder::new(&DecoderConfig::new().with_auto_detect(true));
        let mut out = [0u8; 8];
        assert_eq!(decoder.code(&[], &mut out, Action::Run).unwrap(), Status::Ok);
        assert!(decoder.is_blocked(true, false));
        assert_eq!(decoder.check(), None);
    }
}
