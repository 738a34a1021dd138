//! Wire protocol constants

/// `OP_MSG` opcode
pub const OP_MSG: i32 = 2013;

/// Standard message header length (four little-endian i32 fields)
pub const HEADER_LEN: usize = 16;

/// Largest message the client will accept; matches the server's default
/// `maxMessageSizeBytes`.
pub const MAX_MESSAGE_SIZE: usize = 48_000_000;

/// `OP_MSG` flag bits
pub mod flags {
    /// A CRC-32C checksum trails the message
    pub const CHECKSUM_PRESENT: u32 = 1;

    /// Sender will send another message without waiting for a reply
    pub const MORE_TO_COME: u32 = 1 << 1;

    /// Client is prepared for multiple replies
    pub const EXHAUST_ALLOWED: u32 = 1 << 16;
}

/// `OP_MSG` section kinds
pub mod sections {
    /// Single BSON body document
    pub const BODY: u8 = 0;

    /// Identified sequence of BSON documents
    pub const DOCUMENT_SEQUENCE: u8 = 1;
}

/// Name of the field carrying the target database in a command document
pub const DB_FIELD: &str = "$db";
