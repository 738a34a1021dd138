//! MongoDB wire protocol: `OP_MSG` framing and command reply checks
//!
//! Only what a command client needs is implemented: a single body section
//! out, a body section (plus any document sequences, which are skipped) in.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;
pub mod reply;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{MessageHeader, OpMsg};
pub use reply::check_command_reply;
