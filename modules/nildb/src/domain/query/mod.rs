//! Query definition validation, variable checking and injection.
//!
//! Everything here is pure: the run state machine and store execution live
//! in the service and runner layers.

pub mod inject;
pub mod path;
pub mod validate;

pub use inject::{inject_variables, validate_variables};
pub use validate::{validate_query, VarType};
