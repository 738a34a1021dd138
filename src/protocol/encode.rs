//! Protocol message encoding

use super::constants::{sections, HEADER_LEN, MAX_MESSAGE_SIZE, OP_MSG};
use super::message::OpMsg;
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode an `OP_MSG` request with the given request id
pub fn encode_message(request_id: i32, msg: &OpMsg) -> io::Result<BytesMut> {
    let mut body = Vec::new();
    msg.body
        .to_writer(&mut body)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let len = HEADER_LEN + 4 + 1 + body.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "message length {} exceeds maximum allowed {}",
                len, MAX_MESSAGE_SIZE
            ),
        ));
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.put_i32_le(len as i32);
    buf.put_i32_le(request_id);
    buf.put_i32_le(0);
    buf.put_i32_le(OP_MSG);
    buf.put_u32_le(msg.flags);
    buf.put_u8(sections::BODY);
    buf.put_slice(&body);

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_header_layout() {
        let msg = OpMsg::command(doc! { "ping": 1, "$db": "admin" });
        let buf = encode_message(7, &msg).unwrap();

        let len = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len());
        assert_eq!(i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]), 7);
        assert_eq!(i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]), 0);
        assert_eq!(i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]), OP_MSG);
        // flags, then the body section kind
        assert_eq!(&buf[16..20], &[0, 0, 0, 0]);
        assert_eq!(buf[20], sections::BODY);
    }

    #[test]
    fn test_body_is_bson_document() {
        let msg = OpMsg::command(doc! { "hello": 1, "$db": "admin" });
        let buf = encode_message(1, &msg).unwrap();

        let body = bson::Document::from_reader(&mut &buf[21..]).unwrap();
        assert_eq!(body.get_i32("hello").unwrap(), 1);
        assert_eq!(body.get_str("$db").unwrap(), "admin");
    }
}
