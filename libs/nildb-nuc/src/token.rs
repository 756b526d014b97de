use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::command::Command;
use crate::did::Did;
use crate::policy::Policy;
use crate::validate::NucError;

/// The JOSE-style header every token carries.
pub const TOKEN_ALGORITHM: &str = "ES256K";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenHeader {
    pub alg: String,
}

impl TokenHeader {
    pub(crate) fn es256k() -> Self {
        Self {
            alg: TOKEN_ALGORITHM.into(),
        }
    }
}

/// The body of a token: what kind of capability statement it makes.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenBody {
    /// Grants the audience the command, optionally constrained by policies.
    Delegation(Vec<Policy>),
    /// Exercises the capability with concrete arguments.
    Invocation(Map<String, Value>),
}

/// A single decoded capability token.
///
/// Tokens are immutable once signed; construction goes through
/// [`crate::builder::NucTokenBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPayload", into = "RawPayload")]
pub struct NucToken {
    pub issuer: Did,
    pub audience: Did,
    pub subject: Did,
    pub command: Command,
    pub body: TokenBody,
    pub expires_at: Option<DateTime<Utc>>,
    pub nonce: String,
    /// Hex of the previous token's compact signature; absent on the root.
    pub proof: Option<String>,
}

/// Wire shape of the payload segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPayload {
    iss: Did,
    aud: Did,
    sub: Did,
    cmd: Command,
    #[serde(skip_serializing_if = "Option::is_none")]
    pol: Option<Vec<Policy>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prf: Option<String>,
}

impl TryFrom<RawPayload> for NucToken {
    type Error = NucError;

    fn try_from(raw: RawPayload) -> Result<Self, Self::Error> {
        let body = match (raw.pol, raw.args) {
            (Some(policies), None) => TokenBody::Delegation(policies),
            (None, Some(args)) => TokenBody::Invocation(args),
            _ => {
                return Err(NucError::MalformedToken(
                    "token must carry exactly one of 'pol' or 'args'".into(),
                ))
            }
        };
        let expires_at = match raw.exp {
            Some(secs) => Some(
                DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| NucError::MalformedToken("invalid 'exp' timestamp".into()))?,
            ),
            None => None,
        };
        Ok(Self {
            issuer: raw.iss,
            audience: raw.aud,
            subject: raw.sub,
            command: raw.cmd,
            body,
            expires_at,
            nonce: raw.nonce,
            proof: raw.prf,
        })
    }
}

impl From<NucToken> for RawPayload {
    fn from(token: NucToken) -> Self {
        let (pol, args) = match token.body {
            TokenBody::Delegation(policies) => (Some(policies), None),
            TokenBody::Invocation(arguments) => (None, Some(arguments)),
        };
        Self {
            iss: token.issuer,
            aud: token.audience,
            sub: token.subject,
            cmd: token.command,
            pol,
            args,
            exp: token.expires_at.map(|t| t.timestamp()),
            nonce: token.nonce,
            prf: token.proof,
        }
    }
}

impl NucToken {
    #[must_use]
    pub fn is_invocation(&self) -> bool {
        matches!(self.body, TokenBody::Invocation(_))
    }

    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        match &self.body {
            TokenBody::Delegation(policies) => policies,
            TokenBody::Invocation(_) => &[],
        }
    }
}
