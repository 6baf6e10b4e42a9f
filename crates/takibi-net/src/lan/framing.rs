//! Length-prefixed frame codec for TCP sessions.
//!
//! Frames are laid out as:
//! - 4 bytes: frame magic
//! - 4 bytes: big-endian payload length
//! - N bytes: payload (JSON wire message or control signal)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use takibi_shared::constants::MAX_FRAME_SIZE;

/// Frame magic bytes.
pub const FRAME_MAGIC: [u8; 4] = *b"TKBI";

/// Header size: 4 bytes magic + 4 bytes length.
const HEADER_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid frame magic")]
    InvalidMagic,

    #[error("frame of {size} bytes exceeds the {max} byte cap")]
    TooLarge { size: usize, max: usize },
}

/// Codec for length-prefixed frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Payload length of the current frame, once the header has been read.
    current_length: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if self.current_length.is_none() {
            if src.len() < HEADER_SIZE {
                return Ok(None);
            }

            if src[0..4] != FRAME_MAGIC {
                return Err(FramingError::InvalidMagic);
            }

            let mut length_bytes = [0u8; 4];
            length_bytes.copy_from_slice(&src[4..8]);
            let length = u32::from_be_bytes(length_bytes) as usize;

            if length > MAX_FRAME_SIZE {
                return Err(FramingError::TooLarge {
                    size: length,
                    max: MAX_FRAME_SIZE,
                });
            }

            self.current_length = Some(length);
        }

        let length = match self.current_length {
            Some(length) => length,
            None => return Ok(None),
        };

        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(length).freeze();
        self.current_length = None;
        Ok(Some(payload))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FramingError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), FramingError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FramingError::TooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_slice(&FRAME_MAGIC);
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(Bytes::from_static(b"hello"), &mut buf)
            .unwrap();
        codec
            .encode(Bytes::from_static(b"world!"), &mut buf)
            .unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "hello");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "world!");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"payload"), &mut buf)
            .unwrap();

        let mut partial = buf.split_to(6);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(buf);
        assert_eq!(codec.decode(&mut partial).unwrap().unwrap(), "payload");
    }

    #[test]
    fn test_bad_magic() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"XXXX\x00\x00\x00\x01a"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FramingError::InvalidMagic)
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&FRAME_MAGIC);
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FramingError::TooLarge { .. })
        ));
    }
}
