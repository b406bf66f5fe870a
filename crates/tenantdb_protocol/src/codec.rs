//! Frame codec.
//!
//! A frame is a 2-byte big-endian type code, a 4-byte big-endian payload
//! length, then the CBOR payload.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::ProtocolMessage;
use std::io::{self, Read, Write};

/// Bytes in a frame header.
pub const FRAME_HEADER_LEN: usize = 6;

/// Largest payload accepted by the decoder.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encodes a message into a complete frame.
///
/// # Errors
///
/// Returns `Encode` if the payload cannot be serialized, or `FrameTooLarge`
/// if it exceeds [`MAX_FRAME_SIZE`].
pub fn encode_frame(message: &ProtocolMessage) -> ProtocolResult<Vec<u8>> {
    let payload = message.encode_payload()?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: payload.len(),
        max: MAX_FRAME_SIZE,
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&message.type_code().to_be_bytes());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes one complete frame.
///
/// Returns the message and the number of bytes consumed.
///
/// # Errors
///
/// Returns `Truncated` if `bytes` holds less than one frame.
pub fn decode_frame(bytes: &[u8]) -> ProtocolResult<(ProtocolMessage, usize)> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(ProtocolError::Truncated {
            expected: FRAME_HEADER_LEN,
            actual: bytes.len(),
        });
    }
    let (type_code, len) = parse_header(&bytes[..FRAME_HEADER_LEN])?;
    let end = FRAME_HEADER_LEN + len;
    if bytes.len() < end {
        return Err(ProtocolError::Truncated {
            expected: end,
            actual: bytes.len(),
        });
    }
    let message = ProtocolMessage::decode(type_code, &bytes[FRAME_HEADER_LEN..end])?;
    Ok((message, end))
}

/// Writes one frame and flushes the writer.
///
/// # Errors
///
/// Returns an encoding error or the writer's I/O error.
pub fn write_frame<W: Write>(writer: &mut W, message: &ProtocolMessage) -> ProtocolResult<()> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` if the stream ended cleanly before a new frame.
///
/// # Errors
///
/// Returns `Truncated` if the stream ends inside a frame, or a decoding or
/// I/O error.
pub fn read_frame<R: Read>(reader: &mut R) -> ProtocolResult<Option<ProtocolMessage>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let read = read_full(reader, &mut header)?;
    if read == 0 {
        return Ok(None);
    }
    if read < FRAME_HEADER_LEN {
        return Err(ProtocolError::Truncated {
            expected: FRAME_HEADER_LEN,
            actual: read,
        });
    }

    let (type_code, len) = parse_header(&header)?;
    let mut payload = vec![0u8; len];
    let read = read_full(reader, &mut payload)?;
    if read < len {
        return Err(ProtocolError::Truncated {
            expected: len,
            actual: read,
        });
    }
    ProtocolMessage::decode(type_code, &payload).map(Some)
}

fn parse_header(header: &[u8]) -> ProtocolResult<(u16, usize)> {
    let type_code = u16::from_be_bytes([header[0], header[1]]);
    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok((type_code, len))
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
