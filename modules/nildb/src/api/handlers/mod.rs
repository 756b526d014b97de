//! Thin HTTP handlers: DTO in, service call, envelope out.
//!
//! Handlers never touch the store; the middleware has already attached the
//! validated identity to the request extensions.

pub mod builders;
pub mod collections;
pub mod data;
pub mod queries;
pub mod system;
pub mod users;

use crate::domain::error::Error;
use crate::domain::model::{Builder, Caller, UserRecord};

/// The middleware loads the caller kind the route table demands; a mismatch
/// here is a routing bug, reported as an authentication failure rather than
/// a panic.
pub(crate) fn as_builder(caller: &Caller) -> Result<&Builder, Error> {
    match caller {
        Caller::Builder(builder) => Ok(builder),
        Caller::User(_) => Err(Error::authentication("route requires a builder caller")),
    }
}

pub(crate) fn as_user(caller: &Caller) -> Result<&UserRecord, Error> {
    match caller {
        Caller::User(user) => Ok(user),
        Caller::Builder(_) => Err(Error::authentication("route requires a user caller")),
    }
}
