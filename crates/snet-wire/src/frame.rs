//! ---
//! snet_section: "02-wire-protocol"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Frame, flat object and message codecs."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
//! Length-prefixed framing.
//!
//! Every frame is a 4-byte unsigned big-endian length followed by exactly that
//! many payload bytes. Readers block until the whole frame is present; a short
//! read is never handed to the caller.

use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Result, WireError};

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 4;

/// Build a complete frame for `payload` in memory.
///
/// Fails with [`WireError::FrameTooLarge`] when the length does not fit the
/// 4-byte header.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let len = header_len(payload.len())?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

fn header_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| WireError::FrameTooLarge {
        size: len,
        limit: u32::MAX as usize,
    })
}

/// Write one frame and flush the writer.
///
/// The header and payload are written as a single buffer so a frame is never
/// split across two `write_all` calls.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame with no upper bound on its declared length.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    read_frame_inner(reader, None)
}

/// Read one frame, rejecting declared lengths above `limit` before allocating.
pub fn read_frame_limited<R: Read + ?Sized>(reader: &mut R, limit: usize) -> Result<Vec<u8>> {
    read_frame_inner(reader, Some(limit))
}

fn read_frame_inner<R: Read + ?Sized>(reader: &mut R, limit: Option<usize>) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    let got = fill(reader, &mut header)?;
    if got == 0 {
        return Err(WireError::Closed);
    }
    if got < HEADER_LEN {
        return Err(WireError::Truncated {
            expected: HEADER_LEN,
            received: got,
        });
    }

    let len = u32::from_be_bytes(header) as usize;
    if let Some(limit) = limit {
        if len > limit {
            return Err(WireError::FrameTooLarge { size: len, limit });
        }
    }

    let mut payload = vec![0u8; len];
    let got = fill(reader, &mut payload)?;
    if got < len {
        return Err(WireError::Truncated {
            expected: len,
            received: got,
        });
    }
    Ok(payload)
}

/// Read until `buf` is full or the stream ends, returning the bytes read.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Reader handing out at most `chunk` bytes per call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = (self.pos + self.chunk).min(self.data.len());
            let n = (end - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn header_is_big_endian_length() {
        let frame = encode_frame(b"abc").expect("encode");
        assert_eq!(&frame[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn lengths_beyond_the_header_are_rejected() {
        assert_eq!(header_len(u32::MAX as usize).expect("fits"), u32::MAX);
        let err = header_len(u32::MAX as usize + 1).expect_err("does not fit");
        assert!(matches!(
            err,
            WireError::FrameTooLarge { size, limit }
                if size == u32::MAX as usize + 1 && limit == u32::MAX as usize
        ));
    }

    #[test]
    fn frames_survive_write_then_read() {
        let large = vec![0u8; 70_000];
        let payloads: [&[u8]; 4] = [b"", b"x", br#"{"type":"HEARTBEAT"}"#, &large];
        for payload in payloads {
            let mut wire = Vec::new();
            write_frame(&mut wire, payload).expect("write");
            let read = read_frame(&mut Cursor::new(wire)).expect("read");
            assert_eq!(read, payload);
        }
    }

    #[test]
    fn short_reads_are_accumulated() {
        let mut data = Vec::new();
        write_frame(&mut data, b"hello world").expect("write");
        write_frame(&mut data, b"second").expect("write");
        let mut reader = Trickle {
            data,
            pos: 0,
            chunk: 1,
        };
        assert_eq!(read_frame(&mut reader).expect("first"), b"hello world");
        assert_eq!(read_frame(&mut reader).expect("second"), b"second");
        assert!(matches!(read_frame(&mut reader), Err(WireError::Closed)));
    }

    #[test]
    fn truncated_header_and_payload_are_reported() {
        let err = read_frame(&mut Cursor::new(vec![0u8, 0])).expect_err("short header");
        assert!(matches!(
            err,
            WireError::Truncated {
                expected: 4,
                received: 2
            }
        ));

        let mut wire = encode_frame(b"abcdef").expect("encode").to_vec();
        wire.truncate(HEADER_LEN + 3);
        let err = read_frame(&mut Cursor::new(wire)).expect_err("short payload");
        assert!(matches!(
            err,
            WireError::Truncated {
                expected: 6,
                received: 3
            }
        ));
    }

    #[test]
    fn limit_rejects_oversized_frames_before_reading_payload() {
        let wire = encode_frame(&[7u8; 32]).expect("encode").to_vec();
        let err = read_frame_limited(&mut Cursor::new(wire.clone()), 16).expect_err("too large");
        assert!(matches!(
            err,
            WireError::FrameTooLarge {
                size: 32,
                limit: 16
            }
        ));
        assert_eq!(
            read_frame_limited(&mut Cursor::new(wire), 32).expect("within limit"),
            vec![7u8; 32]
        );
    }
}
