//! NUC capability tokens.
//!
//! A NUC is a chained, secp256k1-signed capability: an ordered sequence of
//! delegation tokens ending in a single invocation token. Each token names an
//! issuer, audience and subject [`Did`], carries a hierarchical [`Command`]
//! namespace, and may attach [`Policy`] predicates evaluated against the
//! incoming request. Chain validation lives in [`validate`]; minting lives in
//! [`builder`].

pub mod builder;
pub mod command;
pub mod did;
pub mod envelope;
pub mod keypair;
pub mod policy;
pub mod token;
pub mod validate;

pub use builder::NucTokenBuilder;
pub use command::Command;
pub use did::Did;
pub use envelope::{NucEnvelope, SignedToken};
pub use keypair::Keypair;
pub use policy::Policy;
pub use token::{NucToken, TokenBody};
pub use validate::{validate_chain, NucError, ValidatedChain};
