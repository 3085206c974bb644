//! Line framing: encoder and decoder for request lines and responses.

use crate::error::ProtocolError;
use crate::message::Request;
use crate::{MAX_LINE_BYTES, RESPONSE_TERMINATOR};
use bytes::{BufMut, BytesMut};

/// Encodes requests and responses for the wire.
pub struct Encoder;

impl Encoder {
    /// Encodes a request as a single newline-terminated line.
    pub fn encode_request(request: &Request) -> BytesMut {
        Self::encode_line(&request.to_line())
    }

    /// Encodes a raw line, appending the newline.
    pub fn encode_line(line: &str) -> BytesMut {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut buf = BytesMut::with_capacity(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        buf
    }

    /// Encodes a response body followed by the empty-line terminator.
    ///
    /// Blank lines inside the body are dropped so the first empty line a client
    /// sees is always the terminator.
    pub fn encode_response(text: &str) -> BytesMut {
        let mut buf = BytesMut::with_capacity(text.len() + RESPONSE_TERMINATOR.len());
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            buf.put_slice(line.trim_end().as_bytes());
            buf.put_u8(b'\n');
        }
        buf.put_u8(b'\n');
        buf
    }
}

/// Splits an incoming byte stream into request lines.
///
/// Bytes are accumulated until a `\n` arrives, so a request split across reads
/// or several requests in a single read are both handled.
pub struct Decoder {
    buffer: BytesMut,
    max_line_bytes: usize,
    /// Set while skipping the remainder of an overlong line.
    discarding: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(2048),
            max_line_bytes,
            discarding: false,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete line.
    ///
    /// Returns `Ok(None)` when no full line is buffered yet. A trailing `\r` is
    /// stripped. Errors consume the offending line, so decoding can continue
    /// with the next call.
    pub fn decode_line(&mut self) -> Result<Option<String>, ProtocolError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > self.max_line_bytes {
                    let len = self.buffer.len();
                    self.buffer.clear();
                    let already_reported = std::mem::replace(&mut self.discarding, true);
                    if already_reported {
                        return Ok(None);
                    }
                    return Err(ProtocolError::LineTooLong {
                        len,
                        max: self.max_line_bytes,
                    });
                }
                if self.discarding {
                    self.buffer.clear();
                }
                return Ok(None);
            };

            let frame = self.buffer.split_to(pos + 1);

            if self.discarding {
                // Tail of a line that was already rejected
                self.discarding = false;
                continue;
            }

            let mut line = &frame[..pos];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }

            if line.len() > self.max_line_bytes {
                return Err(ProtocolError::LineTooLong {
                    len: line.len(),
                    max: self.max_line_bytes,
                });
            }

            let text = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
            return Ok(Some(text.to_string()));
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
