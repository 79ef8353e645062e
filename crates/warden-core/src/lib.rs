//! Warden Core
//!
//! Shared vocabulary for the Warden authorization engine: typed
//! identifiers, timestamps, snapshot versions, and the attribute values
//! carried by subjects, resources, and environments.

pub mod attribute;
pub mod types;

pub use attribute::*;
pub use types::*;
