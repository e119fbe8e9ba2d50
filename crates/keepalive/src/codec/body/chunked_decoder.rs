//! `Transfer-Encoding: chunked` payloads, see
//! [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//!
//! Chunk extensions are ignored and trailer fields are read and discarded; the decoder
//! only has to find where the body ends so the connection can carry the next message.

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

/// Longest size or trailer line accepted before giving up on the peer.
const MAX_LINE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// `<hex-size>[;ext]\r\n`
    Size,
    /// Chunk data with the bytes still owed
    Data(u64),
    /// The `\r\n` closing a chunk's data
    DataEnd,
    /// Trailer fields up to the final empty line
    Trailer,
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size }
    }

    pub fn is_finish(&self) -> bool {
        self.state == State::End
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { State::Trailer } else { State::Data(size) };
                }

                State::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = remaining.min(src.len() as u64);
                    #[allow(clippy::cast_possible_truncation, reason = "len is bounded by src.len()")]
                    let bytes = src.split_to(len as usize).freeze();
                    self.state = if remaining == len { State::DataEnd } else { State::Data(remaining - len) };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                State::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(&src[..2] == b"\r\n", ParseError::invalid_chunk("missing CRLF after chunk data"));
                    src.advance(2);
                    self.state = State::Size;
                }

                State::Trailer => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        trace!("finished reading chunked data");
                        self.state = State::End;
                    }
                }

                State::End => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

/// Splits off one CRLF-terminated line, without the terminator.
fn take_line(src: &mut BytesMut) -> Result<Option<Bytes>, ParseError> {
    match src.windows(2).position(|window| window == b"\r\n") {
        Some(end) => {
            let line = src.split_to(end).freeze();
            src.advance(2);
            Ok(Some(line))
        }
        None => {
            ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_chunk("chunk line too long"));
            Ok(None)
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let size = match line.iter().position(|b| *b == b';') {
        Some(ext) => &line[..ext],
        None => line,
    }
    .trim_ascii();

    ensure!(!size.is_empty(), ParseError::invalid_chunk("empty chunk size"));
    ensure!(size.len() <= 16, ParseError::invalid_chunk("chunk size overflow"));
    ensure!(size.iter().all(u8::is_ascii_hexdigit), ParseError::invalid_chunk("chunk size is not hex"));

    // all bytes are ascii hex digits, so both conversions succeed
    let digits = std::str::from_utf8(size).map_err(ParseError::invalid_chunk)?;
    u64::from_str_radix(digits, 16).map_err(ParseError::invalid_chunk)
}
