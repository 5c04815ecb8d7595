//! Inbound line codec
//!
//! `LinesCodec` reports an over-long line as an error, and `FramedRead`
//! stops yielding items after any decoder error. `ChatLineCodec` swallows
//! that one error so the offending line is discarded and the connection
//! keeps going.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

/// Newline-delimited UTF-8 decoder that drops lines over `max_length` bytes
#[derive(Debug)]
pub struct ChatLineCodec {
    inner: LinesCodec,
}

impl ChatLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }
}

impl Decoder for ChatLineCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        loop {
            match self.inner.decode(buf) {
                // The inner codec is now discarding up to the next newline
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("Discarding over-long line");
                }
                other => return other,
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        loop {
            match self.inner.decode_eof(buf) {
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("Discarding over-long line");
                }
                other => return other,
            }
        }
    }
}
