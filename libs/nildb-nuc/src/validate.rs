use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::command::Command;
use crate::did::Did;
use crate::envelope::NucEnvelope;
use crate::token::TokenBody;

/// Failures raised while decoding or validating a capability chain.
///
/// Every variant maps to an authentication failure at the service boundary;
/// the distinctions exist for logs and tests, not for callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NucError {
    #[error("malformed DID: {0}")]
    MalformedDid(String),
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("invalid secret key material")]
    InvalidSecretKey,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("token chain too long: {0}")]
    ChainTooLong(usize),
    #[error("broken proof chain: {0}")]
    BrokenChain(String),
    #[error("chain tokens disagree on subject")]
    SubjectMismatch,
    #[error("chain root issued by untrusted party")]
    UntrustedRoot,
    #[error("token audience is not this node")]
    AudienceMismatch,
    #[error("token expired")]
    Expired,
    #[error("delegation widens the command namespace")]
    CommandWidened,
    #[error("request does not satisfy a delegation policy")]
    PolicyViolation,
    #[error("presented token is not an invocation")]
    NotAnInvocation,
}

/// The outcome of successful chain validation.
///
/// Revocation (step 7 of the protocol) is not covered here: it needs the
/// journal, which lives behind the persistence gateway. Callers check
/// `root_token_id` against it before trusting the chain.
#[derive(Debug, Clone)]
pub struct ValidatedChain {
    /// The chain's single subject: the principal the request acts as.
    pub subject: Did,
    /// The effective (narrowest) command the chain grants.
    pub command: Command,
    /// Id of the root token, for the revocation check.
    pub root_token_id: String,
    /// Issuer of the final token: the principal that signed the invocation.
    pub invoked_by: Did,
}

/// Validate a capability chain presented to `node`.
///
/// Steps, in protocol order: per-token signatures; proof/issuer chain links;
/// single-subject discipline with a trusted root; audience; expiration;
/// command attenuation; policy predicates against `context`.
///
/// # Errors
/// Returns the first failure encountered, in step order.
pub fn validate_chain(
    envelope: &NucEnvelope,
    node: &Did,
    authority: Option<&Did>,
    context: &Value,
) -> Result<ValidatedChain, NucError> {
    let tokens = envelope.tokens();

    // 1. Shape and signatures.
    for signed in tokens {
        signed.verify()?;
    }
    for pair in tokens.windows(2) {
        let (parent, child) = (&pair[0], &pair[1]);
        match &child.token().proof {
            Some(proof) if *proof == parent.signature_hex() => {}
            Some(_) => {
                return Err(NucError::BrokenChain(
                    "proof does not match parent signature".into(),
                ))
            }
            None => return Err(NucError::BrokenChain("missing proof link".into())),
        }
        if child.token().issuer != parent.token().audience {
            return Err(NucError::BrokenChain(
                "issuer is not the parent's audience".into(),
            ));
        }
    }
    let root = envelope.root().token();
    if root.proof.is_some() {
        return Err(NucError::BrokenChain("root token carries a proof".into()));
    }
    for signed in &tokens[..tokens.len() - 1] {
        if let TokenBody::Invocation(_) = signed.token().body {
            return Err(NucError::BrokenChain(
                "invocation token inside the chain".into(),
            ));
        }
    }
    if !envelope.presented().token().is_invocation() {
        return Err(NucError::NotAnInvocation);
    }

    // 2. Subject discipline: one subject, rooted by itself or the authority.
    let subject = root.subject;
    if tokens.iter().any(|t| t.token().subject != subject) {
        return Err(NucError::SubjectMismatch);
    }
    let root_trusted = root.issuer == subject || authority.is_some_and(|a| *a == root.issuer);
    if !root_trusted {
        return Err(NucError::UntrustedRoot);
    }

    // 3. Audience: the invocation must be addressed to this node.
    if envelope.presented().token().audience != *node {
        return Err(NucError::AudienceMismatch);
    }

    // 4. Expiration.
    let now = Utc::now();
    for signed in tokens {
        if let Some(expires_at) = signed.token().expires_at {
            if expires_at <= now {
                return Err(NucError::Expired);
            }
        }
    }

    // 5. Command attenuation: each link may only narrow. The effective
    //    command is therefore the final token's.
    for pair in tokens.windows(2) {
        let (parent, child) = (&pair[0], &pair[1]);
        if !parent
            .token()
            .command
            .is_prefix_of(&child.token().command)
        {
            return Err(NucError::CommandWidened);
        }
    }
    let command = envelope.presented().token().command.clone();

    // 6. Policy predicates from every delegation in the chain.
    for signed in tokens {
        for policy in signed.token().policies() {
            if !policy.evaluate(context) {
                return Err(NucError::PolicyViolation);
            }
        }
    }

    Ok(ValidatedChain {
        subject,
        command,
        root_token_id: envelope.root().token_id(),
        invoked_by: envelope.presented().token().issuer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NucTokenBuilder;
    use crate::envelope::SignedToken;
    use crate::keypair::Keypair;
    use crate::policy::Policy;
    use chrono::Duration;
    use serde_json::{json, Map};

    struct Principals {
        authority: Keypair,
        builder: Keypair,
        node: Keypair,
    }

    fn principals() -> Principals {
        Principals {
            authority: Keypair::generate(),
            builder: Keypair::generate(),
            node: Keypair::generate(),
        }
    }

    fn ctx() -> Value {
        json!({"req": {"method": "POST", "path": "/v1/data/find", "headers": {"origin": "good.com"}}})
    }

    fn self_invocation(p: &Principals, command: &str) -> NucEnvelope {
        let token = NucTokenBuilder::invocation(Map::new())
            .command(command)
            .subject(p.builder.did())
            .audience(p.node.did())
            .sign(&p.builder)
            .unwrap();
        NucEnvelope::from_tokens(vec![token]).unwrap()
    }

    fn delegated_chain(p: &Principals, root_cmd: &str, leaf_cmd: &str) -> NucEnvelope {
        let root = NucTokenBuilder::delegation(vec![])
            .command(root_cmd)
            .subject(p.builder.did())
            .audience(p.builder.did())
            .sign(&p.authority)
            .unwrap();
        let leaf = NucTokenBuilder::invocation(Map::new())
            .command(leaf_cmd)
            .subject(p.builder.did())
            .audience(p.node.did())
            .proof_of(&root)
            .sign(&p.builder)
            .unwrap();
        NucEnvelope::from_tokens(vec![root, leaf]).unwrap()
    }

    #[test]
    fn accepts_self_signed_invocation() {
        let p = principals();
        let envelope = self_invocation(&p, "nil/db/builders/read");
        let chain =
            validate_chain(&envelope, &p.node.did(), Some(&p.authority.did()), &ctx()).unwrap();
        assert_eq!(chain.subject, p.builder.did());
        assert_eq!(chain.command, "nil/db/builders/read".parse().unwrap());
    }

    #[test]
    fn accepts_authority_rooted_chain() {
        let p = principals();
        let envelope = delegated_chain(&p, "nil/db", "nil/db/data/read");
        let chain =
            validate_chain(&envelope, &p.node.did(), Some(&p.authority.did()), &ctx()).unwrap();
        assert_eq!(chain.command, "nil/db/data/read".parse().unwrap());
        assert_eq!(chain.root_token_id, envelope.root().token_id());
    }

    #[test]
    fn rejects_untrusted_root() {
        let p = principals();
        let envelope = delegated_chain(&p, "nil/db", "nil/db/data/read");
        // No authority configured: the root issuer is neither subject nor trusted.
        let err = validate_chain(&envelope, &p.node.did(), None, &ctx()).unwrap_err();
        assert_eq!(err, NucError::UntrustedRoot);
    }

    #[test]
    fn rejects_wrong_audience() {
        let p = principals();
        let envelope = self_invocation(&p, "nil/db/data/read");
        let other_node = Keypair::generate().did();
        let err = validate_chain(&envelope, &other_node, None, &ctx()).unwrap_err();
        assert_eq!(err, NucError::AudienceMismatch);
    }

    #[test]
    fn rejects_expired_token() {
        let p = principals();
        let token = NucTokenBuilder::invocation(Map::new())
            .command("nil/db/data/read")
            .subject(p.builder.did())
            .audience(p.node.did())
            .expires_at(Utc::now() - Duration::minutes(1))
            .sign(&p.builder)
            .unwrap();
        let envelope = NucEnvelope::from_tokens(vec![token]).unwrap();
        let err = validate_chain(&envelope, &p.node.did(), None, &ctx()).unwrap_err();
        assert_eq!(err, NucError::Expired);
    }

    #[test]
    fn rejects_widened_command() {
        let p = principals();
        // Root grants queries; the leaf tries to invoke under data.
        let root = NucTokenBuilder::delegation(vec![])
            .command("nil/db/queries")
            .subject(p.builder.did())
            .audience(p.builder.did())
            .sign(&p.authority)
            .unwrap();
        let leaf = NucTokenBuilder::invocation(Map::new())
            .command("nil/db/data/read")
            .subject(p.builder.did())
            .audience(p.node.did())
            .proof_of(&root)
            .sign(&p.builder)
            .unwrap();
        let envelope = NucEnvelope::from_tokens(vec![root, leaf]).unwrap();
        let err = validate_chain(&envelope, &p.node.did(), Some(&p.authority.did()), &ctx())
            .unwrap_err();
        assert_eq!(err, NucError::CommandWidened);
    }

    #[test]
    fn rejects_broken_proof_link() {
        let p = principals();
        let root = NucTokenBuilder::delegation(vec![])
            .command("nil/db")
            .subject(p.builder.did())
            .audience(p.builder.did())
            .sign(&p.authority)
            .unwrap();
        let unrelated = NucTokenBuilder::delegation(vec![])
            .command("nil/db")
            .subject(p.builder.did())
            .audience(p.builder.did())
            .sign(&p.authority)
            .unwrap();
        let leaf = NucTokenBuilder::invocation(Map::new())
            .command("nil/db/data/read")
            .subject(p.builder.did())
            .audience(p.node.did())
            .proof_of(&unrelated)
            .sign(&p.builder)
            .unwrap();
        let envelope = NucEnvelope::from_tokens(vec![root, leaf]).unwrap();
        let err = validate_chain(&envelope, &p.node.did(), Some(&p.authority.did()), &ctx())
            .unwrap_err();
        assert!(matches!(err, NucError::BrokenChain(_)));
    }

    #[test]
    fn rejects_subject_drift() {
        let p = principals();
        let outsider = Keypair::generate();
        let root = NucTokenBuilder::delegation(vec![])
            .command("nil/db")
            .subject(p.builder.did())
            .audience(p.builder.did())
            .sign(&p.authority)
            .unwrap();
        let leaf = NucTokenBuilder::invocation(Map::new())
            .command("nil/db/data/read")
            .subject(outsider.did())
            .audience(p.node.did())
            .proof_of(&root)
            .sign(&p.builder)
            .unwrap();
        let envelope = NucEnvelope::from_tokens(vec![root, leaf]).unwrap();
        let err = validate_chain(&envelope, &p.node.did(), Some(&p.authority.did()), &ctx())
            .unwrap_err();
        assert_eq!(err, NucError::SubjectMismatch);
    }

    #[test]
    fn enforces_delegation_policies() {
        let p = principals();
        let root = NucTokenBuilder::delegation(vec![Policy::Eq {
            path: "$.req.headers.origin".into(),
            value: json!("good.com"),
        }])
        .command("nil/db")
        .subject(p.builder.did())
        .audience(p.builder.did())
        .sign(&p.authority)
        .unwrap();
        let leaf = NucTokenBuilder::invocation(Map::new())
            .command("nil/db/data/read")
            .subject(p.builder.did())
            .audience(p.node.did())
            .proof_of(&root)
            .sign(&p.builder)
            .unwrap();
        let envelope = NucEnvelope::from_tokens(vec![root, leaf]).unwrap();

        validate_chain(&envelope, &p.node.did(), Some(&p.authority.did()), &ctx()).unwrap();

        let bad_ctx = json!({"req": {"headers": {"origin": "evil.com"}}});
        let err = validate_chain(&envelope, &p.node.did(), Some(&p.authority.did()), &bad_ctx)
            .unwrap_err();
        assert_eq!(err, NucError::PolicyViolation);
    }

    #[test]
    fn rejects_delegation_presented_as_leaf() {
        let p = principals();
        let token = NucTokenBuilder::delegation(vec![])
            .command("nil/db")
            .subject(p.builder.did())
            .audience(p.node.did())
            .sign(&p.builder)
            .unwrap();
        let envelope = NucEnvelope::from_tokens(vec![token]).unwrap();
        let err = validate_chain(&envelope, &p.node.did(), None, &ctx()).unwrap_err();
        assert_eq!(err, NucError::NotAnInvocation);
    }

    #[test]
    fn rejects_tampered_payload() {
        let p = principals();
        let envelope = self_invocation(&p, "nil/db/data/read");
        let compact = envelope.encode();
        // Flip a character inside the payload segment.
        let mut chars: Vec<char> = compact.chars().collect();
        let dot = compact.find('.').unwrap() + 2;
        chars[dot] = if chars[dot] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        match NucEnvelope::parse(&tampered) {
            Ok(parsed) => {
                let err =
                    validate_chain(&parsed, &p.node.did(), None, &ctx()).unwrap_err();
                assert!(matches!(
                    err,
                    NucError::InvalidSignature | NucError::MalformedDid(_)
                ));
            }
            // Tampering may also break base64/JSON decoding outright.
            Err(err) => assert!(matches!(err, NucError::MalformedToken(_))),
        }
    }
}
