//! Encrypted conversation log envelopes
//!
//! A conversation log travels and rests as one opaque blob:
//!
//! ```text
//! +---------------+----------------------------+
//! | nonce (12 B)  | ciphertext + tag (16 B)    |
//! +---------------+----------------------------+
//! ```
//!
//! where the plaintext is the canonical JSON form `{"messages": [...]}`.
//! Because the remote store holds JSON-compatible values, the blob is
//! embedded base64-encoded under a single well-known field ([`SealedLog`]).

use serde::{Deserialize, Serialize};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::crypto::{LogCrypto, SharedKey};
use crate::error::{ChatError, ChatResult};
use crate::types::Message;

/// Canonical plaintext structure of a sealed log
#[derive(Serialize, Deserialize)]
struct LogPayload {
    messages: Vec<Message>,
}

/// Serialize and encrypt a message list into an opaque blob.
///
/// Draws a fresh random nonce per call; sealing the same list twice yields
/// different blobs that open to the same messages.
pub fn seal(key: &SharedKey, messages: &[Message]) -> ChatResult<Vec<u8>> {
    let payload = LogPayload {
        messages: messages.to_vec(),
    };
    let plaintext = serde_json::to_vec(&payload)
        .map_err(|e| ChatError::Serialization(format!("Failed to encode log: {}", e)))?;
    LogCrypto::new(key).encrypt(&plaintext)
}

/// Decrypt and parse an opaque blob back into a message list.
///
/// # Errors
///
/// [`ChatError::DecryptionFailed`] on tag mismatch (wrong key, corrupted
/// blob, or tampering); [`ChatError::MalformedPayload`] if the decrypted
/// bytes do not parse as a log. A blob that fails to open yields zero
/// messages plus the error, never a partial decode.
pub fn open(key: &SharedKey, blob: &[u8]) -> ChatResult<Vec<Message>> {
    let plaintext = LogCrypto::new(key).decrypt(blob)?;
    let payload: LogPayload = serde_json::from_slice(&plaintext)
        .map_err(|e| ChatError::MalformedPayload(format!("Log does not parse: {}", e)))?;
    Ok(payload.messages)
}

/// Store-facing wrapper: the sealed blob base64-embedded in a JSON document.
#[derive(Debug, Serialize, Deserialize)]
pub struct SealedLog {
    /// base64 of `nonce || ciphertext+tag`
    pub sealed: String,
}

impl SealedLog {
    /// Seal a message list and wrap it for the store.
    pub fn encode(key: &SharedKey, messages: &[Message]) -> ChatResult<Vec<u8>> {
        let blob = seal(key, messages)?;
        let doc = Self {
            sealed: BASE64.encode(blob),
        };
        serde_json::to_vec(&doc)
            .map_err(|e| ChatError::Serialization(format!("Failed to encode sealed log: {}", e)))
    }

    /// Unwrap a store value and open the sealed blob inside it.
    pub fn decode(key: &SharedKey, json: &[u8]) -> ChatResult<Vec<Message>> {
        let doc: Self = serde_json::from_slice(json)
            .map_err(|e| ChatError::MalformedPayload(format!("Bad sealed log document: {}", e)))?;
        let blob = BASE64
            .decode(&doc.sealed)
            .map_err(|e| ChatError::MalformedPayload(format!("Bad sealed log base64: {}", e)))?;
        open(key, &blob)
    }
}
