use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::keypair::{verify_signature, SIGNATURE_LENGTH};
use crate::token::{NucToken, TokenHeader, TOKEN_ALGORITHM};
use crate::validate::NucError;

/// Upper bound on delegation depth; longer chains are rejected outright.
pub const MAX_CHAIN_LENGTH: usize = 16;

/// A token together with its signed wire form.
///
/// The base64 segments are kept verbatim so signature checks cover exactly
/// the bytes the issuer signed, independent of JSON key ordering.
#[derive(Debug, Clone)]
pub struct SignedToken {
    token: NucToken,
    header_b64: String,
    payload_b64: String,
    signature: [u8; SIGNATURE_LENGTH],
}

impl SignedToken {
    pub(crate) fn new(
        token: NucToken,
        header_b64: String,
        payload_b64: String,
        signature: [u8; SIGNATURE_LENGTH],
    ) -> Self {
        Self {
            token,
            header_b64,
            payload_b64,
            signature,
        }
    }

    #[must_use]
    pub fn token(&self) -> &NucToken {
        &self.token
    }

    #[must_use]
    pub fn signature(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.signature
    }

    /// Hex form of the signature, as referenced by a child token's `prf`.
    #[must_use]
    pub fn signature_hex(&self) -> String {
        hex::encode(self.signature)
    }

    /// Stable identifier: sha-256 over the compact form. Revocations are
    /// journalled under this id.
    #[must_use]
    pub fn token_id(&self) -> String {
        hex::encode(Sha256::digest(self.compact().as_bytes()))
    }

    /// `header.payload.signature`, each segment base64url without padding.
    #[must_use]
    pub fn compact(&self) -> String {
        format!(
            "{}.{}.{}",
            self.header_b64,
            self.payload_b64,
            URL_SAFE_NO_PAD.encode(self.signature)
        )
    }

    /// Check the signature against the issuer's embedded public key.
    ///
    /// # Errors
    /// Returns [`NucError::InvalidSignature`] on mismatch.
    pub fn verify(&self) -> Result<(), NucError> {
        let message = format!("{}.{}", self.header_b64, self.payload_b64);
        verify_signature(&self.token.issuer, message.as_bytes(), &self.signature)
    }

    /// Decode one compact token. The signature is not checked here.
    ///
    /// # Errors
    /// Fails on malformed segments, unknown algorithms, or invalid payloads.
    pub fn parse(compact: &str) -> Result<Self, NucError> {
        let mut parts = compact.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(NucError::MalformedToken(
                "expected three dot-separated segments".into(),
            ));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| NucError::MalformedToken("header is not base64url".into()))?;
        let header: TokenHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| NucError::MalformedToken(format!("bad header: {e}")))?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(NucError::MalformedToken(format!(
                "unsupported algorithm '{}'",
                header.alg
            )));
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| NucError::MalformedToken("payload is not base64url".into()))?;
        let token: NucToken = serde_json::from_slice(&payload_bytes)
            .map_err(|e| NucError::MalformedToken(format!("bad payload: {e}")))?;

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| NucError::MalformedToken("signature is not base64url".into()))?;
        let signature: [u8; SIGNATURE_LENGTH] = sig_bytes
            .try_into()
            .map_err(|_| NucError::MalformedToken("signature must be 64 bytes".into()))?;

        Ok(Self {
            token,
            header_b64: header_b64.into(),
            payload_b64: payload_b64.into(),
            signature,
        })
    }
}

/// An ordered chain of signed tokens, root first, invocation last.
#[derive(Debug, Clone)]
pub struct NucEnvelope {
    tokens: Vec<SignedToken>,
}

impl NucEnvelope {
    /// Assemble an envelope from already-signed tokens.
    ///
    /// # Errors
    /// Fails on an empty or oversized chain.
    pub fn from_tokens(tokens: Vec<SignedToken>) -> Result<Self, NucError> {
        if tokens.is_empty() {
            return Err(NucError::MalformedToken("empty token chain".into()));
        }
        if tokens.len() > MAX_CHAIN_LENGTH {
            return Err(NucError::ChainTooLong(tokens.len()));
        }
        Ok(Self { tokens })
    }

    /// Decode a bearer envelope: compact tokens joined by `/`.
    ///
    /// Base64url segments never contain `/`, so the separator is unambiguous.
    ///
    /// # Errors
    /// Fails on any malformed token or a chain outside the size bounds.
    pub fn parse(envelope: &str) -> Result<Self, NucError> {
        let tokens = envelope
            .split('/')
            .map(SignedToken::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_tokens(tokens)
    }

    /// Encode back to the bearer form.
    #[must_use]
    pub fn encode(&self) -> String {
        let parts: Vec<String> = self.tokens.iter().map(SignedToken::compact).collect();
        parts.join("/")
    }

    #[must_use]
    pub fn tokens(&self) -> &[SignedToken] {
        &self.tokens
    }

    /// The root of the chain: the token revocation is checked against.
    #[must_use]
    pub fn root(&self) -> &SignedToken {
        // Invariant: constructors reject empty chains.
        &self.tokens[0]
    }

    /// The presented token: the last of the chain.
    #[must_use]
    pub fn presented(&self) -> &SignedToken {
        &self.tokens[self.tokens.len() - 1]
    }
}
