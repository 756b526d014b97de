use std::fmt;
use std::str::FromStr;

use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::validate::NucError;

/// Length of a compressed SEC1 secp256k1 public key.
pub const PUBLIC_KEY_LENGTH: usize = 33;

const DID_PREFIX: &str = "did:nil:";

/// A decentralized identifier of the form `did:nil:<public-key-hex>`.
///
/// The method-specific part is the hex encoding of a compressed secp256k1
/// public key, so a `Did` is always a verifiable principal: the key needed to
/// check signatures is embedded in the identifier itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did {
    public_key: [u8; PUBLIC_KEY_LENGTH],
}

impl Did {
    #[must_use]
    pub fn new(public_key: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { public_key }
    }

    /// The compressed public key bytes backing this identifier.
    #[must_use]
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public_key
    }

    /// Recover the verifying key for signature checks.
    ///
    /// # Errors
    /// Fails if the embedded bytes are not a valid curve point.
    pub fn verifying_key(&self) -> Result<VerifyingKey, NucError> {
        VerifyingKey::from_sec1_bytes(&self.public_key)
            .map_err(|_| NucError::MalformedDid(self.to_string()))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DID_PREFIX}{}", hex::encode(self.public_key))
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({self})")
    }
}

impl FromStr for Did {
    type Err = NucError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix(DID_PREFIX)
            .ok_or_else(|| NucError::MalformedDid(s.into()))?;
        let bytes = hex::decode(hex_part).map_err(|_| NucError::MalformedDid(s.into()))?;
        let public_key: [u8; PUBLIC_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| NucError::MalformedDid(s.into()))?;
        Ok(Self { public_key })
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::Keypair;

    #[test]
    fn roundtrips_through_text() {
        let did = Keypair::generate().did();
        let text = did.to_string();
        assert!(text.starts_with("did:nil:"));
        assert_eq!(text.len(), DID_PREFIX.len() + PUBLIC_KEY_LENGTH * 2);
        assert_eq!(text.parse::<Did>().unwrap(), did);
    }

    #[test]
    fn rejects_foreign_methods_and_bad_hex() {
        assert!("did:key:z6Mk".parse::<Did>().is_err());
        assert!("did:nil:zz".parse::<Did>().is_err());
        assert!("did:nil:ab".parse::<Did>().is_err());
    }

    #[test]
    fn serde_uses_textual_form() {
        let did = Keypair::generate().did();
        let json = serde_json::to_string(&did).unwrap();
        assert_eq!(json, format!("\"{did}\""));
        let back: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(back, did);
    }
}
