//! Protocol message types

use bson::Document;

/// Standard header preceding every wire message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message length, header included
    pub length: i32,
    /// Identifier chosen by the sender
    pub request_id: i32,
    /// Request this message answers (0 for requests)
    pub response_to: i32,
    /// Opcode
    pub op_code: i32,
}

/// An `OP_MSG` carrying a single command or reply document
#[derive(Debug, Clone, PartialEq)]
pub struct OpMsg {
    /// Flag bits
    pub flags: u32,
    /// Body section
    pub body: Document,
}

impl OpMsg {
    /// Command message with no flags set
    pub fn command(body: Document) -> Self {
        Self { flags: 0, body }
    }

    /// Name of the command, i.e. the first key of the body
    pub fn command_name(&self) -> Option<&str> {
        self.body.keys().next().map(String::as_str)
    }
}
