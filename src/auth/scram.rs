//! SCRAM-SHA-256 authentication implementation
//!
//! Implements the SCRAM-SHA-256 (Salted Challenge Response Authentication Mechanism)
//! as defined in RFC 5802 / RFC 7677, carried over the server's `saslStart` and
//! `saslContinue` commands. No channel binding is used (`n,,` GS2 header).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Servers reject iteration counts below this
const MIN_ITERATIONS: u32 = 4096;

/// GS2 header without channel binding
const GS2_HEADER: &str = "n,,";

/// SCRAM authentication error types
#[derive(Debug, Clone)]
pub enum ScramError {
    /// Invalid proof from server
    InvalidServerProof(String),
    /// Invalid server message format
    InvalidServerMessage(String),
    /// Base64 decoding error
    Base64Error(String),
    /// HMAC key setup failed
    KeyError(String),
}

impl fmt::Display for ScramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScramError::InvalidServerProof(msg) => write!(f, "invalid server proof: {}", msg),
            ScramError::InvalidServerMessage(msg) => write!(f, "invalid server message: {}", msg),
            ScramError::Base64Error(msg) => write!(f, "Base64 error: {}", msg),
            ScramError::KeyError(msg) => write!(f, "key error: {}", msg),
        }
    }
}

impl std::error::Error for ScramError {}

/// Internal state carried between the client-final and server-final steps
#[derive(Clone, Debug)]
pub struct ScramState {
    /// Combined authentication message (for verification)
    auth_message: Vec<u8>,
    /// Server key (for verification calculation)
    server_key: Vec<u8>,
}

/// SCRAM-SHA-256 client implementation
pub struct ScramClient {
    username: String,
    password: String,
    nonce: String,
}

impl fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramClient")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ScramClient {
    /// Create a new SCRAM client with a random nonce
    pub fn new(username: String, password: String) -> Self {
        let mut rng = rand::thread_rng();
        let nonce_bytes: Vec<u8> = (0..24).map(|_| rng.gen()).collect();
        let nonce = BASE64.encode(&nonce_bytes);

        Self {
            username,
            password,
            nonce,
        }
    }

    /// `n=<user>,r=<nonce>`, the part of client-first that enters the auth message
    fn client_first_bare(&self) -> String {
        format!("n={},r={}", escape_username(&self.username), self.nonce)
    }

    /// Generate client first message
    pub fn client_first(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    /// Process server first message and generate client final message
    ///
    /// Returns (client_final_message, internal_state)
    pub fn client_final(&mut self, server_first: &str) -> Result<(String, ScramState), ScramError> {
        let (server_nonce, salt, iterations) = parse_server_first(server_first)?;

        if !server_nonce.starts_with(&self.nonce) || server_nonce.len() == self.nonce.len() {
            return Err(ScramError::InvalidServerMessage(
                "server nonce doesn't extend client nonce".to_string(),
            ));
        }

        let salt_bytes = BASE64
            .decode(&salt)
            .map_err(|_| ScramError::Base64Error("invalid salt encoding".to_string()))?;
        let iterations = iterations
            .parse::<u32>()
            .map_err(|_| ScramError::InvalidServerMessage("invalid iteration count".to_string()))?;
        if iterations < MIN_ITERATIONS {
            return Err(ScramError::InvalidServerMessage(format!(
                "iteration count {} below minimum {}",
                iterations, MIN_ITERATIONS
            )));
        }

        // c = base64("n,,")
        let client_final_without_proof =
            format!("c={},r={}", BASE64.encode(GS2_HEADER), server_nonce);

        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            client_final_without_proof
        );

        let salted_password = salt_password(&self.password, &salt_bytes, iterations);
        let proof = calculate_client_proof(&salted_password, auth_message.as_bytes())?;
        let server_key = hmac(&salted_password, b"Server Key")?;

        let client_final = format!("{},p={}", client_final_without_proof, BASE64.encode(&proof));

        let state = ScramState {
            auth_message: auth_message.into_bytes(),
            server_key,
        };

        Ok((client_final, state))
    }

    /// Verify server final message and confirm authentication
    pub fn verify_server_final(
        &self,
        server_final: &str,
        state: &ScramState,
    ) -> Result<(), ScramError> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(ScramError::InvalidServerProof(format!(
                "server reported error: {}",
                err
            )));
        }

        let server_sig_encoded = server_final
            .split(',')
            .find_map(|part| part.strip_prefix("v="))
            .ok_or_else(|| ScramError::InvalidServerMessage("missing 'v=' attribute".to_string()))?;

        let server_signature = BASE64.decode(server_sig_encoded).map_err(|_| {
            ScramError::Base64Error("invalid server signature encoding".to_string())
        })?;

        let expected_signature = hmac(&state.server_key, &state.auth_message)?;

        if constant_time_compare(&server_signature, &expected_signature) {
            Ok(())
        } else {
            Err(ScramError::InvalidServerProof(
                "server signature verification failed".to_string(),
            ))
        }
    }
}

/// RFC 5802 saslname escaping
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

/// Parse server first message format: r=<nonce>,s=<salt>,i=<iterations>
fn parse_server_first(msg: &str) -> Result<(String, String, String), ScramError> {
    if msg.starts_with("m=") {
        return Err(ScramError::InvalidServerMessage(
            "mandatory extensions are not supported".to_string(),
        ));
    }

    let mut nonce = String::new();
    let mut salt = String::new();
    let mut iterations = String::new();

    for part in msg.split(',') {
        if let Some(value) = part.strip_prefix("r=") {
            nonce = value.to_string();
        } else if let Some(value) = part.strip_prefix("s=") {
            salt = value.to_string();
        } else if let Some(value) = part.strip_prefix("i=") {
            iterations = value.to_string();
        }
    }

    if nonce.is_empty() || salt.is_empty() || iterations.is_empty() {
        return Err(ScramError::InvalidServerMessage(
            "missing required fields in server first message".to_string(),
        ));
    }

    Ok((nonce, salt, iterations))
}

/// SaltedPassword := PBKDF2(password, salt, iterations, HMAC-SHA256)
fn salt_password(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut salted_password = vec![0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut salted_password);
    salted_password
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ScramError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| ScramError::KeyError("HMAC key error".to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// ClientProof := ClientKey XOR HMAC(SHA256(ClientKey), AuthMessage)
fn calculate_client_proof(
    salted_password: &[u8],
    auth_message: &[u8],
) -> Result<Vec<u8>, ScramError> {
    let client_key = hmac(salted_password, b"Client Key")?;
    let stored_key = Sha256::digest(&client_key);
    let client_signature = hmac(&stored_key, auth_message)?;

    let mut proof = client_key;
    for (proof_byte, sig_byte) in proof.iter_mut().zip(client_signature.iter()) {
        *proof_byte ^= sig_byte;
    }

    Ok(proof)
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_nonce(username: &str, password: &str, nonce: &str) -> ScramClient {
        ScramClient {
            username: username.to_string(),
            password: password.to_string(),
            nonce: nonce.to_string(),
        }
    }

    #[test]
    fn test_scram_client_creation() {
        let client = ScramClient::new("user".to_string(), "password".to_string());
        assert_eq!(client.username, "user");
        assert_eq!(client.password, "password");
        assert!(!client.nonce.is_empty());
    }

    #[test]
    fn test_client_first_message_format() {
        let client = ScramClient::new("alice".to_string(), "secret".to_string());
        let first = client.client_first();

        assert!(first.starts_with("n,,n=alice,r="));
        assert!(first.len() > 20);
    }

    #[test]
    fn test_username_is_escaped() {
        let client = with_nonce("a=b,c", "pw", "abc");
        assert_eq!(client.client_first(), "n,,n=a=3Db=2Cc,r=abc");
    }

    #[test]
    fn test_rfc7677_exchange() {
        // Test vector from RFC 7677 section 3
        let mut client = with_nonce("user", "pencil", "rOprNGfwEbeRWgbNEkqO");
        assert_eq!(client.client_first(), "n,,n=user,r=rOprNGfwEbeRWgbNEkqO");

        let server_first = concat!(
            "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,",
            "s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
        );
        let (client_final, state) = client.client_final(server_first).unwrap();
        assert_eq!(
            client_final,
            concat!(
                "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,",
                "p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=",
            )
        );

        client
            .verify_server_final("v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=", &state)
            .unwrap();
    }

    #[test]
    fn test_parse_server_first_valid() {
        let server_first = "r=client_nonce_server_nonce,s=aW1hZ2luYXJ5c2FsdA==,i=4096";
        let (nonce, salt, iterations) = parse_server_first(server_first).unwrap();

        assert_eq!(nonce, "client_nonce_server_nonce");
        assert_eq!(salt, "aW1hZ2luYXJ5c2FsdA==");
        assert_eq!(iterations, "4096");
    }

    #[test]
    fn test_parse_server_first_invalid() {
        assert!(parse_server_first("r=abc,s=def").is_err());
        assert!(parse_server_first("m=ext,r=abc,s=def,i=4096").is_err());
    }

    #[test]
    fn test_foreign_nonce_rejected() {
        let mut client = with_nonce("user", "pencil", "clientnonce");
        let err = client
            .client_final("r=othernonce123,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap_err();
        assert!(matches!(err, ScramError::InvalidServerMessage(_)));
    }

    #[test]
    fn test_low_iteration_count_rejected() {
        let mut client = with_nonce("user", "pencil", "abc");
        assert!(client
            .client_final("r=abcdef,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=1")
            .is_err());
    }

    #[test]
    fn test_wrong_server_signature_rejected() {
        let mut client = with_nonce("user", "pencil", "rOprNGfwEbeRWgbNEkqO");
        let (_, state) = client
            .client_final("r=rOprNGfwEbeRWgbNEkqOxyz,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap();
        let err = client
            .verify_server_final("v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=", &state)
            .unwrap_err();
        assert!(matches!(err, ScramError::InvalidServerProof(_)));
    }

    #[test]
    fn test_server_error_attribute() {
        let client = with_nonce("user", "pencil", "abc");
        let state = ScramState {
            auth_message: Vec::new(),
            server_key: vec![0; 32],
        };
        assert!(client
            .verify_server_final("e=invalid-proof", &state)
            .is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"ab"));
    }
}
