#![no_main]

use bytes::{Buf, BytesMut};
use libfuzzer_sys::fuzz_target;
use mongo_rbac::protocol::decode::decode_message;
use mongo_rbac::protocol::check_command_reply;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several frames may arrive in one read
    while !buf.is_empty() {
        match decode_message(&buf) {
            Ok((_, msg, consumed)) => {
                let _ = check_command_reply(msg.body);
                if consumed == 0 {
                    break;
                }
                buf.advance(consumed);
            }
            Err(_) => break,
        }
    }
});
