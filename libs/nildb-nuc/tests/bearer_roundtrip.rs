//! End-to-end checks over the public surface: mint a chain, encode it as a
//! bearer envelope, re-parse and validate it as the node would.

use nildb_nuc::{validate_chain, Keypair, NucEnvelope, NucTokenBuilder, Policy};
use serde_json::{json, Map};

#[test]
fn delegated_bearer_envelope_validates_after_reencoding() {
    let authority = Keypair::generate();
    let builder = Keypair::generate();
    let delegate = Keypair::generate();
    let node = Keypair::generate();

    let root = NucTokenBuilder::delegation(vec![])
        .command("nil/db")
        .subject(builder.did())
        .audience(builder.did())
        .sign(&authority)
        .unwrap();
    let middle = NucTokenBuilder::delegation(vec![Policy::Eq {
        path: "$.req.method".into(),
        value: json!("POST"),
    }])
    .command("nil/db/queries")
    .subject(builder.did())
    .audience(delegate.did())
    .proof_of(&root)
    .sign(&builder)
    .unwrap();
    let leaf = NucTokenBuilder::invocation(Map::new())
        .command("nil/db/queries/execute")
        .subject(builder.did())
        .audience(node.did())
        .proof_of(&middle)
        .sign(&delegate)
        .unwrap();

    let bearer = NucEnvelope::from_tokens(vec![root, middle, leaf])
        .unwrap()
        .encode();

    let parsed = NucEnvelope::parse(&bearer).unwrap();
    let context = json!({"req": {"method": "POST", "path": "/v1/queries/run", "headers": {}}});
    let chain = validate_chain(&parsed, &node.did(), Some(&authority.did()), &context).unwrap();

    assert_eq!(chain.subject, builder.did());
    assert_eq!(chain.invoked_by, delegate.did());
    assert_eq!(chain.command, "nil/db/queries/execute".parse().unwrap());

    // The id used for revocation is stable across encode/parse cycles.
    let reparsed = NucEnvelope::parse(&bearer).unwrap();
    assert_eq!(
        chain.root_token_id,
        reparsed.root().token_id()
    );

    // The required route command must be covered by the effective command.
    let required: nildb_nuc::Command = "nil/db/queries".parse().unwrap();
    assert!(required.is_prefix_of(&chain.command));
    let other: nildb_nuc::Command = "nil/db/data/read".parse().unwrap();
    assert!(!other.is_prefix_of(&chain.command));
}

#[test]
fn policy_violation_is_rejected_at_validation_time() {
    let builder = Keypair::generate();
    let node = Keypair::generate();

    let root = NucTokenBuilder::delegation(vec![Policy::Eq {
        path: "$.req.headers.origin".into(),
        value: json!("good.com"),
    }])
    .command("nil/db")
    .subject(builder.did())
    .audience(builder.did())
    .sign(&builder)
    .unwrap();
    let leaf = NucTokenBuilder::invocation(Map::new())
        .command("nil/db/data/read")
        .subject(builder.did())
        .audience(node.did())
        .proof_of(&root)
        .sign(&builder)
        .unwrap();
    let bearer = NucEnvelope::from_tokens(vec![root, leaf]).unwrap().encode();

    let parsed = NucEnvelope::parse(&bearer).unwrap();
    let context = json!({"req": {"headers": {"origin": "evil.com"}}});
    assert!(validate_chain(&parsed, &node.did(), None, &context).is_err());
}
