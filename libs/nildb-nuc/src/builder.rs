use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde_json::{Map, Value};

use crate::command::Command;
use crate::did::Did;
use crate::envelope::SignedToken;
use crate::keypair::Keypair;
use crate::policy::Policy;
use crate::token::{NucToken, TokenBody, TokenHeader};
use crate::validate::NucError;

/// Builder for minting signed tokens.
///
/// The issuer is always the signing keypair; subject and audience must be
/// set before [`NucTokenBuilder::sign`]. Used by the node's own tooling and
/// extensively by tests.
#[derive(Debug, Clone)]
pub struct NucTokenBuilder {
    body: TokenBody,
    command: Result<Command, NucError>,
    subject: Option<Did>,
    audience: Option<Did>,
    expires_at: Option<DateTime<Utc>>,
    proof: Option<String>,
}

impl NucTokenBuilder {
    #[must_use]
    pub fn delegation(policies: Vec<Policy>) -> Self {
        Self::new(TokenBody::Delegation(policies))
    }

    #[must_use]
    pub fn invocation(arguments: Map<String, Value>) -> Self {
        Self::new(TokenBody::Invocation(arguments))
    }

    fn new(body: TokenBody) -> Self {
        Self {
            body,
            command: Ok(Command::root()),
            subject: None,
            audience: None,
            expires_at: None,
            proof: None,
        }
    }

    /// Set the command namespace from its textual form.
    #[must_use]
    pub fn command(mut self, command: &str) -> Self {
        self.command = command.parse();
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: Did) -> Self {
        self.subject = Some(subject);
        self
    }

    #[must_use]
    pub fn audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    #[must_use]
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Link this token to its parent in the chain.
    #[must_use]
    pub fn proof_of(mut self, parent: &SignedToken) -> Self {
        self.proof = Some(parent.signature_hex());
        self
    }

    /// Sign and produce the wire-form token.
    ///
    /// # Errors
    /// Fails when the command literal was invalid or subject/audience were
    /// not set.
    pub fn sign(self, issuer: &Keypair) -> Result<SignedToken, NucError> {
        let command = self.command?;
        let subject = self
            .subject
            .ok_or_else(|| NucError::MalformedToken("subject not set".into()))?;
        let audience = self
            .audience
            .ok_or_else(|| NucError::MalformedToken("audience not set".into()))?;

        let mut nonce = [0u8; 16];
        rand::rng().fill_bytes(&mut nonce);

        let token = NucToken {
            issuer: issuer.did(),
            audience,
            subject,
            command,
            body: self.body,
            expires_at: self.expires_at,
            nonce: hex::encode(nonce),
            proof: self.proof,
        };

        let header = serde_json::to_vec(&TokenHeader::es256k())
            .map_err(|e| NucError::MalformedToken(e.to_string()))?;
        let payload =
            serde_json::to_vec(&token).map_err(|e| NucError::MalformedToken(e.to_string()))?;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
        let message = format!("{header_b64}.{payload_b64}");
        let signature = issuer.sign(message.as_bytes());

        Ok(SignedToken::new(token, header_b64, payload_b64, signature))
    }
}
