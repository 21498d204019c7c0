//! Asymmetric key material and pairwise key agreement
//!
//! Each party holds a NIST P-384 key pair. The public half is published as a
//! plain JSON document at a well-known store path; the private half is
//! written to a path the store keeps under its own at-rest encryption. The
//! pairwise symmetric key is the P-384 ECDH agreement run through
//! HKDF-SHA256: deterministic, and identical regardless of which party
//! computes it.
//!
//! There is no sender authentication beyond path ownership plus the AEAD
//! tag: whoever can write to a log path authored its contents. This is a
//! deliberate, documented limitation of the protocol.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p384::{ecdh, PublicKey, SecretKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto::SharedKey;
use crate::error::{ChatError, ChatResult};
use crate::store::{Fetch, LogStore, PRIVATE_KEY_PATH, PUBLIC_KEY_PATH};
use crate::types::UserId;

const CURVE_NAME: &str = "P-384";

/// Published public key document (plain JSON, world-readable)
#[derive(Serialize, Deserialize)]
struct PublicKeyDoc {
    curve: String,
    /// SEC1-encoded point, base64
    sec1: String,
}

/// Stored private key document (store-side at-rest encryption)
#[derive(Serialize, Deserialize)]
struct PrivateKeyDoc {
    curve: String,
    /// Raw scalar bytes, base64
    scalar: String,
}

/// A party's P-384 ECDH key pair.
pub struct ChatKeypair {
    secret: SecretKey,
    public: PublicKey,
}

impl ChatKeypair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Get the public half.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Publish both halves to the store.
    ///
    /// The public key lands at [`PUBLIC_KEY_PATH`] readable by anyone; the
    /// private key at [`PRIVATE_KEY_PATH`], which the store encrypts at
    /// rest. Both writes are full overwrites.
    pub async fn publish(&self, store: &dyn LogStore) -> ChatResult<()> {
        let public_doc = PublicKeyDoc {
            curve: CURVE_NAME.to_string(),
            sec1: BASE64.encode(self.public.to_sec1_bytes()),
        };
        let private_doc = PrivateKeyDoc {
            curve: CURVE_NAME.to_string(),
            scalar: BASE64.encode(self.secret.to_bytes()),
        };

        let public_json = serde_json::to_vec(&public_doc)
            .map_err(|e| ChatError::Serialization(format!("Failed to encode public key: {}", e)))?;
        let private_json = serde_json::to_vec(&private_doc)
            .map_err(|e| ChatError::Serialization(format!("Failed to encode private key: {}", e)))?;

        store.put_own(PUBLIC_KEY_PATH, public_json).await?;
        store.put_own(PRIVATE_KEY_PATH, private_json).await?;

        info!("Published key pair");
        Ok(())
    }

    /// Load the key pair previously published to the store.
    ///
    /// Returns `Ok(None)` if either half has not been published yet; the
    /// caller decides whether that means "generate one" or
    /// [`ChatError::KeyUnavailable`].
    pub async fn load(store: &dyn LogStore) -> ChatResult<Option<Self>> {
        let Some(public_json) = store.get_own(PUBLIC_KEY_PATH).await? else {
            return Ok(None);
        };
        let Some(private_json) = store.get_own(PRIVATE_KEY_PATH).await? else {
            return Ok(None);
        };

        let public_doc: PublicKeyDoc = serde_json::from_slice(&public_json)
            .map_err(|e| ChatError::MalformedPayload(format!("Bad public key document: {}", e)))?;
        let private_doc: PrivateKeyDoc = serde_json::from_slice(&private_json)
            .map_err(|e| ChatError::MalformedPayload(format!("Bad private key document: {}", e)))?;

        let public = decode_public_doc(&public_doc)?;

        if private_doc.curve != CURVE_NAME {
            return Err(ChatError::Crypto(format!(
                "Unsupported curve in private key: {}",
                private_doc.curve
            )));
        }
        let scalar_bytes = BASE64
            .decode(&private_doc.scalar)
            .map_err(|e| ChatError::MalformedPayload(format!("Bad private key base64: {}", e)))?;
        let secret = SecretKey::from_slice(&scalar_bytes)
            .map_err(|e| ChatError::Crypto(format!("Invalid private key scalar: {}", e)))?;

        // The published public half must belong to this private key
        if secret.public_key() != public {
            return Err(ChatError::Crypto(
                "Published public key does not match private key".to_string(),
            ));
        }

        Ok(Some(Self { secret, public }))
    }
}

impl std::fmt::Debug for ChatKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sec1 = self.public.to_sec1_bytes();
        f.debug_struct("ChatKeypair")
            .field("public", &hex::encode(&sec1[..8.min(sec1.len())]))
            .finish_non_exhaustive()
    }
}

fn decode_public_doc(doc: &PublicKeyDoc) -> ChatResult<PublicKey> {
    if doc.curve != CURVE_NAME {
        return Err(ChatError::Crypto(format!(
            "Unsupported curve in public key: {}",
            doc.curve
        )));
    }
    let sec1_bytes = BASE64
        .decode(&doc.sec1)
        .map_err(|e| ChatError::MalformedPayload(format!("Bad public key base64: {}", e)))?;
    PublicKey::from_sec1_bytes(&sec1_bytes)
        .map_err(|e| ChatError::Crypto(format!("Invalid public key point: {}", e)))
}

/// Fetch another identity's published public key.
///
/// `Absent` and `Unreachable` are both surfaced to callers as the
/// counterparty-not-connected state; a key that exists but does not parse
/// is an error, not an absence.
pub async fn fetch_public_key(
    store: &dyn LogStore,
    owner: &UserId,
) -> ChatResult<Fetch<PublicKey>> {
    match store.get_other(owner, PUBLIC_KEY_PATH).await {
        Fetch::Found(json) => {
            let doc: PublicKeyDoc = serde_json::from_slice(&json).map_err(|e| {
                ChatError::MalformedPayload(format!("Bad public key document: {}", e))
            })?;
            Ok(Fetch::Found(decode_public_doc(&doc)?))
        }
        Fetch::Absent => Ok(Fetch::Absent),
        Fetch::Unreachable => Ok(Fetch::Unreachable),
    }
}

/// Derive the pairwise symmetric key from my key pair and their public key.
///
/// ECDH commutativity means both parties derive the identical
/// [`SharedKey`] without either transmitting it.
pub fn derive_shared_key(mine: &ChatKeypair, theirs: &PublicKey) -> SharedKey {
    let shared = ecdh::diffie_hellman(mine.secret.to_nonzero_scalar(), theirs.as_affine());
    SharedKey::from_ecdh_secret(shared.raw_secret_bytes())
}
