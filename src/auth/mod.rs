//! Authentication mechanisms

pub mod scram;

pub use scram::{ScramClient, ScramError, ScramState};

/// Mechanism name sent in `saslStart`
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";
