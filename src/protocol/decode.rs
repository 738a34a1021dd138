//! Protocol message decoding

use super::constants::{flags, sections, HEADER_LEN, MAX_MESSAGE_SIZE, OP_MSG};
use super::message::{MessageHeader, OpMsg};
use bson::Document;
use bytes::BytesMut;
use std::io;

/// Decode one `OP_MSG` from the front of `data` without consuming it
///
/// # Returns
/// `Ok((header, msg, consumed))` - Message and number of bytes consumed
/// `Err(e)` - `UnexpectedEof` if more bytes are needed, `InvalidData` otherwise
///
/// The caller must advance the buffer by `consumed` after a successful decode.
pub fn decode_message(data: &BytesMut) -> io::Result<(MessageHeader, OpMsg, usize)> {
    if data.len() < HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete message header",
        ));
    }

    let header = MessageHeader {
        length: read_i32(&data[0..4]),
        request_id: read_i32(&data[4..8]),
        response_to: read_i32(&data[8..12]),
        op_code: read_i32(&data[12..16]),
    };

    if header.length < (HEADER_LEN + 5) as i32 {
        return Err(invalid(format!("message length {} too small", header.length)));
    }
    let len = header.length as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(invalid(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_SIZE
        )));
    }
    if header.op_code != OP_MSG {
        return Err(invalid(format!("unsupported opcode {}", header.op_code)));
    }

    if data.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete message body",
        ));
    }

    let flag_bits = u32::from_le_bytes([data[16], data[17], data[18], data[19]]);
    let mut sections_end = len;
    if flag_bits & flags::CHECKSUM_PRESENT != 0 {
        sections_end = sections_end
            .checked_sub(4)
            .filter(|end| *end >= HEADER_LEN + 4)
            .ok_or_else(|| invalid("checksum flag set on truncated message".into()))?;
    }

    let body = decode_sections(&data[HEADER_LEN + 4..sections_end])?;

    Ok((
        header,
        OpMsg {
            flags: flag_bits,
            body,
        },
        len,
    ))
}

fn decode_sections(mut data: &[u8]) -> io::Result<Document> {
    let mut body = None;

    while !data.is_empty() {
        let kind = data[0];
        data = &data[1..];
        match kind {
            sections::BODY => {
                let doc_len = bson_length(data)?;
                let doc = Document::from_reader(&mut &data[..doc_len])
                    .map_err(|e| invalid(format!("invalid body document: {}", e)))?;
                if body.replace(doc).is_some() {
                    return Err(invalid("more than one body section".into()));
                }
                data = &data[doc_len..];
            }
            sections::DOCUMENT_SEQUENCE => {
                // Sequences only appear in replies to exhaust/bulk requests; skip them.
                let seq_len = bson_length(data)?;
                data = &data[seq_len..];
            }
            other => return Err(invalid(format!("unknown section kind: {}", other))),
        }
    }

    body.ok_or_else(|| invalid("message has no body section".into()))
}

/// Length prefix of a BSON document or document sequence, bounds-checked
fn bson_length(data: &[u8]) -> io::Result<usize> {
    if data.len() < 4 {
        return Err(invalid("truncated section length".into()));
    }
    let len = read_i32(&data[0..4]);
    if len < 5 || len as usize > data.len() {
        return Err(invalid(format!("section length {} out of bounds", len)));
    }
    Ok(len as usize)
}

fn read_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
