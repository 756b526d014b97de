use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;

use crate::did::{Did, PUBLIC_KEY_LENGTH};
use crate::validate::NucError;

/// Length of a compact ECDSA signature (r || s).
pub const SIGNATURE_LENGTH: usize = 64;

/// A secp256k1 signing identity.
///
/// Every principal in the system (node, builder, user, authority) is a
/// keypair; its [`Did`] is derived from the compressed public key.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        loop {
            rand::rng().fill_bytes(&mut bytes);
            // A 32-byte string is outside the scalar field with negligible
            // probability; retry rather than bias the distribution.
            if let Ok(signing_key) = SigningKey::from_slice(&bytes) {
                return Self { signing_key };
            }
        }
    }

    /// Construct from a 32-byte secret scalar.
    ///
    /// # Errors
    /// Fails when the bytes are not a valid secp256k1 scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, NucError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| NucError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Construct from hex-encoded secret key material.
    ///
    /// # Errors
    /// Fails when the input is not hex or not a valid scalar.
    pub fn from_hex(hex_str: &str) -> Result<Self, NucError> {
        let bytes = hex::decode(hex_str).map_err(|_| NucError::InvalidSecretKey)?;
        Self::from_secret_bytes(&bytes)
    }

    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// Compressed SEC1 public key bytes.
    #[must_use]
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let point = self.verifying_key().to_encoded_point(true);
        let mut out = [0u8; PUBLIC_KEY_LENGTH];
        out.copy_from_slice(point.as_bytes());
        out
    }

    #[must_use]
    pub fn did(&self) -> Did {
        Did::new(self.public_key())
    }

    /// Sign a message, returning the compact 64-byte signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        let signature: Signature = self.signing_key.sign(message);
        let mut out = [0u8; SIGNATURE_LENGTH];
        out.copy_from_slice(&signature.to_bytes());
        out
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material.
        f.debug_struct("Keypair").field("did", &self.did()).finish()
    }
}

/// Verify a compact signature against a DID's embedded public key.
///
/// # Errors
/// Returns [`NucError::InvalidSignature`] when the signature does not verify,
/// or a DID error when the identifier does not hold a valid curve point.
pub fn verify_signature(did: &Did, message: &[u8], signature: &[u8]) -> Result<(), NucError> {
    let key = did.verifying_key()?;
    let signature = Signature::from_slice(signature).map_err(|_| NucError::InvalidSignature)?;
    key.verify(message, &signature)
        .map_err(|_| NucError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"payload");
        verify_signature(&keypair.did(), b"payload", &signature).unwrap();
    }

    #[test]
    fn rejects_wrong_message_and_wrong_key() {
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let signature = keypair.sign(b"payload");
        assert!(verify_signature(&keypair.did(), b"tampered", &signature).is_err());
        assert!(verify_signature(&other.did(), b"payload", &signature).is_err());
    }

    #[test]
    fn secret_roundtrip_through_hex() {
        let keypair = Keypair::generate();
        let hex_secret = hex::encode(keypair.signing_key.to_bytes());
        let restored = Keypair::from_hex(&hex_secret).unwrap();
        assert_eq!(restored.did(), keypair.did());
    }
}
