//! Stream framing for syslog over TCP (RFC 6587).
//!
//! Two framings are in common use and senders don't announce which one they
//! speak, so each frame is classified by its first byte: a digit starts an
//! octet-counted frame (`<len> <msg>`), anything else is a message terminated
//! by LF.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::Decoder;

/// Longest accepted length prefix ("65535" is 5 digits; allow some slack).
const MAX_LENGTH_DIGITS: usize = 10;

/// Errors that end a framed stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid octet count: {0:?}")]
    InvalidLength(String),

    #[error("frame of {length} bytes exceeds limit of {max}")]
    TooLarge { length: usize, max: usize },

    #[error("stream closed inside an octet-counted frame")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits a byte stream into individual syslog messages.
#[derive(Debug, Clone)]
pub struct SyslogFrameCodec {
    max_frame_length: usize,
}

impl SyslogFrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    fn decode_octet_counted(&self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        let Some(space) = src.iter().position(|b| *b == b' ') else {
            if src.len() > MAX_LENGTH_DIGITS {
                return Err(FrameError::InvalidLength(
                    String::from_utf8_lossy(&src[..MAX_LENGTH_DIGITS]).into_owned(),
                ));
            }
            return Ok(None);
        };

        let prefix = &src[..space];
        if prefix.len() > MAX_LENGTH_DIGITS || !prefix.iter().all(u8::is_ascii_digit) {
            return Err(FrameError::InvalidLength(
                String::from_utf8_lossy(prefix).into_owned(),
            ));
        }
        let length: usize = std::str::from_utf8(prefix)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                FrameError::InvalidLength(String::from_utf8_lossy(prefix).into_owned())
            })?;

        if length > self.max_frame_length {
            return Err(FrameError::TooLarge {
                length,
                max: self.max_frame_length,
            });
        }

        let total = space + 1 + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(space + 1);
        Ok(Some(src.split_to(length)))
    }

    fn decode_line(&self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        match src.iter().position(|b| *b == b'\n') {
            Some(end) => {
                let frame = src.split_to(end);
                src.advance(1);
                Ok(Some(frame))
            }
            None if src.len() > self.max_frame_length => Err(FrameError::TooLarge {
                length: src.len(),
                max: self.max_frame_length,
            }),
            None => Ok(None),
        }
    }
}

impl Decoder for SyslogFrameCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Separators left over from the previous frame
        let skip = src
            .iter()
            .take_while(|b| matches!(b, b'\n' | b'\r' | b'\0'))
            .count();
        src.advance(skip);

        match src.first() {
            None => Ok(None),
            Some(b) if b.is_ascii_digit() => self.decode_octet_counted(src),
            Some(_) => self.decode_line(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        match src.first() {
            None => Ok(None),
            Some(b) if b.is_ascii_digit() => {
                src.clear();
                Err(FrameError::Truncated)
            }
            // Last message without a trailing newline
            Some(_) => Ok(Some(src.split())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(input: &[u8]) -> Vec<String> {
        let mut codec = SyslogFrameCodec::new(1024);
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode_eof(&mut buf).unwrap() {
            out.push(String::from_utf8(frame.to_vec()).unwrap());
        }
        out
    }

    #[test]
    fn test_newline_framing() {
        assert_eq!(
            frames(b"<14>one\n<14>two\r\n<14>three"),
            vec!["<14>one", "<14>two\r", "<14>three"]
        );
    }

    #[test]
    fn test_octet_counting() {
        assert_eq!(
            frames(b"7 <14>one9 <14>two\n!"),
            vec!["<14>one", "<14>two\n!"]
        );
    }

    #[test]
    fn test_mixed_framing_on_one_stream() {
        assert_eq!(
            frames(b"<14>lf\n8 <14>oct!<14>lf2\n"),
            vec!["<14>lf", "<14>oct!", "<14>lf2"]
        );
    }

    #[test]
    fn test_partial_octet_frame_waits_for_more() {
        let mut codec = SyslogFrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"9 <14>he"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"<14>hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_line_waits_for_more() {
        let mut codec = SyslogFrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"<14>hel"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"lo\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"<14>hello");
    }

    #[test]
    fn test_oversized_frames_rejected() {
        let mut codec = SyslogFrameCodec::new(8);
        let mut buf = BytesMut::from(&b"100 <14>x"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::TooLarge { length: 100, max: 8 })
        ));

        let mut buf = BytesMut::from(&b"<14>a very long line"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_invalid_length_prefix() {
        let mut codec = SyslogFrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"12a <14>x"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_truncated_octet_frame_at_eof() {
        let mut codec = SyslogFrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"20 <14>short"[..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::Truncated)
        ));
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        use futures::StreamExt;
        use tokio_util::codec::FramedRead;

        let stream = tokio_test::io::Builder::new()
            .read(b"7 <14>o")
            .read(b"ne<14>tw")
            .read(b"o\n<14>three")
            .build();
        let mut frames = FramedRead::new(stream, SyslogFrameCodec::new(1024));

        let mut out = Vec::new();
        while let Some(frame) = frames.next().await {
            out.push(String::from_utf8(frame.unwrap().to_vec()).unwrap());
        }
        assert_eq!(out, vec!["<14>one", "<14>two", "<14>three"]);
    }
}
