//! Length-prefixed frame encoding and incremental decoding.
//!
//! # Frame Format
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Payload Length (big-endian)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Payload...                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The payload is raw bytes: no escaping, no checksum, no text encoding.

use core::fmt;
use std::io::{self, Read};
use std::mem;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encodes `payload` into a single buffer holding prefix and payload.
///
/// Returns `None` if the payload length does not fit the 32-bit prefix.
pub fn encode_frame(payload: &[u8]) -> Option<Vec<u8>> {
    let len = u32::try_from(payload.len()).ok()?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Some(buf)
}

/// Failure while decoding a frame.
#[derive(Debug)]
pub enum FrameError {
    /// The peer announced a payload above the configured limit.
    TooLarge { len: usize, max: usize },
    /// The stream failed or reached end of file.
    Io(io::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooLarge { len, max } => {
                write!(f, "Frame of {} bytes exceeds limit of {} bytes", len, max)
            }
            FrameError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

/// Incremental frame decoder.
///
/// Bytes already read from the stream are kept between calls, so a frame
/// that arrives in pieces across several non-blocking polls is reassembled
/// instead of being lost or stalling the caller.
#[derive(Debug)]
pub struct FrameReader {
    header: [u8; LENGTH_PREFIX_SIZE],
    header_len: usize,
    sized: bool,
    payload: Vec<u8>,
    payload_len: usize,
    max_payload_size: usize,
}

impl FrameReader {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            header: [0u8; LENGTH_PREFIX_SIZE],
            header_len: 0,
            sized: false,
            payload: Vec::new(),
            payload_len: 0,
            max_payload_size,
        }
    }

    /// Returns true if part of a frame has been consumed from the stream.
    pub fn is_partial(&self) -> bool {
        self.header_len > 0
    }

    /// Reads from `reader` until one frame is complete.
    ///
    /// Returns `Ok(None)` when the reader would block; whatever was read so
    /// far is kept for the next call. End of stream is reported as an
    /// `UnexpectedEof` I/O error.
    pub fn read_frame<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<Vec<u8>>, FrameError> {
        while self.header_len < LENGTH_PREFIX_SIZE {
            match read_some(reader, &mut self.header[self.header_len..])? {
                Some(n) => self.header_len += n,
                None => return Ok(None),
            }
        }

        if !self.sized {
            let len = u32::from_be_bytes(self.header) as usize;
            if len > self.max_payload_size {
                return Err(FrameError::TooLarge {
                    len,
                    max: self.max_payload_size,
                });
            }
            self.payload = vec![0u8; len];
            self.payload_len = 0;
            self.sized = true;
        }

        while self.payload_len < self.payload.len() {
            match read_some(reader, &mut self.payload[self.payload_len..])? {
                Some(n) => self.payload_len += n,
                None => return Ok(None),
            }
        }

        let frame = mem::take(&mut self.payload);
        self.header_len = 0;
        self.payload_len = 0;
        self.sized = false;

        log::trace!("Decoded frame of {} bytes", frame.len());
        Ok(Some(frame))
    }
}

/// One read attempt. `Ok(None)` means would-block.
fn read_some<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<Option<usize>> {
    loop {
        match reader.read(buf) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => return Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Hands out scripted chunks; an empty chunk means "would block".
    struct Chunked {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Chunked {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(chunk) if chunk.is_empty() => Err(io::ErrorKind::WouldBlock.into()),
                Some(mut chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(chunk.split_off(n));
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn test_encode_hello() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(
            frame,
            [0x00, 0x00, 0x00, 0x05, 0x68, 0x65, 0x6C, 0x6C, 0x6F]
        );
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode_frame(b"").unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_back_to_back() {
        let mut wire = encode_frame(b"first").unwrap();
        wire.extend(encode_frame(b"").unwrap());
        wire.extend(encode_frame(&[0x00, 0xFF, 0x7F]).unwrap());

        let mut reader = FrameReader::new(1024);
        let mut src = Chunked::new(&[wire.as_slice()]);

        assert_eq!(reader.read_frame(&mut src).unwrap().unwrap(), b"first");
        assert_eq!(reader.read_frame(&mut src).unwrap().unwrap(), b"");
        assert_eq!(reader.read_frame(&mut src).unwrap().unwrap(), [0x00, 0xFF, 0x7F]);
        assert!(!reader.is_partial());
    }

    #[test]
    fn test_decode_across_would_block() {
        let mut reader = FrameReader::new(1024);
        let mut src = Chunked::new(&[&[0, 0], &[], &[0, 3, b'a'], &[], &[b'b', b'c']]);

        assert!(reader.read_frame(&mut src).unwrap().is_none());
        assert!(reader.is_partial());
        assert!(reader.read_frame(&mut src).unwrap().is_none());
        assert_eq!(reader.read_frame(&mut src).unwrap().unwrap(), b"abc");
        assert!(!reader.is_partial());
    }

    #[test]
    fn test_decode_too_large() {
        let mut reader = FrameReader::new(4);
        let mut src = Chunked::new(&[&[0, 0, 0, 5]]);

        match reader.read_frame(&mut src) {
            Err(FrameError::TooLarge { len: 5, max: 4 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_eof_mid_frame() {
        let mut reader = FrameReader::new(1024);
        let mut src = Chunked::new(&[&[0, 0, 0, 9, 1, 2]]);

        match reader.read_frame(&mut src) {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
